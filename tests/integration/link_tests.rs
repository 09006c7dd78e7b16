#![cfg(unix)]

use filesweeper::duplicates::{DuplicateFinder, FinderConfig};
use filesweeper::scanner::{FilterConfig, PathFilter, Walker, WalkerConfig};
use std::fs::{self, File};
use std::io::Write;
use std::os::unix::fs::symlink;
use std::path::Path;
use tempfile::tempdir;

fn walker(root: &Path, follow_symlinks: bool) -> Walker {
    Walker::new(root, PathFilter::new(&FilterConfig::default())).with_config(WalkerConfig {
        follow_symlinks,
        ..WalkerConfig::default()
    })
}

#[test]
fn test_symlinks_not_followed_by_default() {
    let dir = tempdir().unwrap();
    let original = dir.path().join("original.txt");
    File::create(&original)
        .unwrap()
        .write_all(b"content")
        .unwrap();
    symlink(&original, dir.path().join("symlink.txt")).unwrap();

    let (records, _) = walker(dir.path(), false).scan().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].path, original);
}

#[test]
fn test_symlinks_followed_when_enabled() {
    let dir = tempdir().unwrap();
    let original = dir.path().join("original.txt");
    File::create(&original)
        .unwrap()
        .write_all(b"content")
        .unwrap();
    symlink(&original, dir.path().join("symlink.txt")).unwrap();

    let (records, _) = walker(dir.path(), true).scan().unwrap();
    assert_eq!(records.len(), 2);

    let (groups, _) = DuplicateFinder::new(FinderConfig::default())
        .find_in_records(records)
        .unwrap();
    assert_eq!(groups.len(), 1, "a followed link reads the same bytes");
}

#[test]
fn test_symlink_cycle_is_skipped_not_fatal() {
    let dir = tempdir().unwrap();
    let sub = dir.path().join("sub");
    fs::create_dir(&sub).unwrap();
    File::create(sub.join("data.bin"))
        .unwrap()
        .write_all(b"payload")
        .unwrap();
    symlink(dir.path(), sub.join("loop")).unwrap();

    let (records, summary) = walker(dir.path(), true).scan().unwrap();
    assert_eq!(records.len(), 1);
    assert!(summary.skipped >= 1);

    let (records, summary) = walker(dir.path(), false).scan().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(summary.skipped, 0);
}

#[test]
fn test_hardlinks_are_reported_as_duplicates() {
    let dir = tempdir().unwrap();
    let original = dir.path().join("original.txt");
    File::create(&original)
        .unwrap()
        .write_all(b"identical content")
        .unwrap();
    fs::hard_link(&original, dir.path().join("hardlink.txt")).unwrap();

    let (records, _) = walker(dir.path(), false).scan().unwrap();
    let (groups, _) = DuplicateFinder::new(FinderConfig::default())
        .find_in_records(records)
        .unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].len(), 2);
}
