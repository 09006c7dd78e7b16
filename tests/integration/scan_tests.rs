use filesweeper::duplicates::{
    to_duplicate_map, DuplicateFinder, FindSummary, FinderConfig, HashGroup,
};
use filesweeper::scanner::{
    hash_to_hex, FilterConfig, HashMode, Hasher, PathFilter, Walker, WalkerConfig,
};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

fn write_file(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
    let path = dir.join(name);
    File::create(&path).unwrap().write_all(content).unwrap();
    path
}

fn scan_and_find(root: &Path, config: FinderConfig) -> (Vec<HashGroup>, FindSummary) {
    let walker = Walker::new(root, PathFilter::new(&FilterConfig::default()));
    let (records, _) = walker.scan().unwrap();
    DuplicateFinder::new(config).find_in_records(records).unwrap()
}

#[test]
fn test_scan_empty_directory() {
    let dir = tempdir().unwrap();
    let (groups, summary) = scan_and_find(dir.path(), FinderConfig::default());

    assert!(groups.is_empty());
    assert_eq!(summary.input_files, 0);
    assert_eq!(summary.duplicate_groups, 0);
}

#[test]
fn test_scan_unique_files() {
    let dir = tempdir().unwrap();
    write_file(dir.path(), "a.txt", b"content a");
    write_file(dir.path(), "b.txt", b"content b");
    write_file(dir.path(), "c.txt", b"content c");

    let (groups, summary) = scan_and_find(dir.path(), FinderConfig::default());

    assert!(groups.is_empty());
    assert_eq!(summary.input_files, 3);
    assert_eq!(summary.hashed_files, 3);
}

#[test]
fn test_scan_nested_duplicates() {
    let dir = tempdir().unwrap();
    let sub = dir.path().join("subdir");
    fs::create_dir(&sub).unwrap();
    let a = write_file(dir.path(), "a.txt", b"nested duplicate");
    let b = write_file(&sub, "b.txt", b"nested duplicate");

    let (groups, summary) = scan_and_find(dir.path(), FinderConfig::default());

    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].paths, vec![a, b]);
    assert_eq!(summary.duplicate_files, 1);
    assert_eq!(summary.reclaimable_space, 16);
}

#[test]
fn test_mixed_sizes_and_hashes_scenario() {
    // A, B: 500 bytes, same content. C: 500 bytes, different content.
    // D: 300 bytes sharing A's first 100 bytes, so under a 100-byte prefix
    // hash it has A's hash but a different size.
    let dir = tempdir().unwrap();
    let mut body = vec![b'a'; 500];
    body[499] = b'z';
    let a = write_file(dir.path(), "A", &body);
    let b = write_file(dir.path(), "B", &body);
    write_file(dir.path(), "C", &[b'c'; 500]);
    write_file(dir.path(), "D", &body[..300]);

    let mode = HashMode::fast_bytes(100);
    let (groups, summary) = scan_and_find(dir.path(), FinderConfig::default().with_mode(mode));
    let map = to_duplicate_map(&groups);

    let h1 = hash_to_hex(&Hasher::new().hash_file(&a, mode).unwrap());
    assert_eq!(map.len(), 1);
    assert_eq!(map[&h1], vec![a, b]);
    assert_eq!(summary.eliminated_by_size, 1);
}

#[test]
fn test_fast_scan_reports_prefix_duplicates() {
    let dir = tempdir().unwrap();
    let mut first = vec![7u8; 4096];
    let mut second = first.clone();
    first[4000] = 1;
    second[4000] = 2;
    let a = write_file(dir.path(), "a.bin", &first);
    let b = write_file(dir.path(), "b.bin", &second);

    let (full, _) = scan_and_find(dir.path(), FinderConfig::default());
    assert!(full.is_empty(), "full hashing must tell the files apart");

    let (fast, _) = scan_and_find(
        dir.path(),
        FinderConfig::default().with_mode(HashMode::fast_bytes(1024)),
    );
    assert_eq!(fast.len(), 1, "files equal in their prefix are reported as duplicates");
    assert_eq!(fast[0].paths, vec![a, b]);
}

#[test]
fn test_empty_files_are_duplicates_of_each_other() {
    let dir = tempdir().unwrap();
    write_file(dir.path(), "empty1", b"");
    write_file(dir.path(), "empty2", b"");

    let (groups, summary) = scan_and_find(dir.path(), FinderConfig::default());
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].size, 0);
    assert_eq!(
        groups[0].paths,
        vec![dir.path().join("empty1"), dir.path().join("empty2")]
    );
    assert_eq!(groups[0].wasted_space(), 0);
    assert_eq!(summary.empty_files, 2);
    assert_eq!(summary.hashed_files, 2);
}

#[test]
fn test_many_buckets_on_pool() {
    let dir = tempdir().unwrap();
    for i in 0..40 {
        let size = 10 + (i % 8);
        write_file(dir.path(), &format!("file{i:02}"), &vec![b'q'; size]);
    }

    let sequential = scan_and_find(
        dir.path(),
        FinderConfig::default().with_sequential_threshold(usize::MAX),
    );
    let pooled = scan_and_find(dir.path(), FinderConfig::default().with_sequential_threshold(0));

    assert_eq!(sequential.0, pooled.0);
    assert_eq!(pooled.0.len(), 8);
    assert!(pooled.0.iter().all(|g| g.len() == 5));
    assert!(pooled.0.windows(2).all(|w| w[0].size > w[1].size));
}

#[test]
fn test_walker_config_defaults() {
    let config = WalkerConfig::default();
    assert!(!config.follow_symlinks);
    assert!(config.progress_interval > 0);
}
