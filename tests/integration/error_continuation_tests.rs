use filesweeper::duplicates::{DuplicateFinder, FinderConfig, FinderError};
use filesweeper::scanner::{FileRecord, FilterConfig, PathFilter, ScanError, Walker};
use std::fs;
use std::path::PathBuf;
use tempfile::tempdir;

#[test]
fn test_vanished_inputs_are_skipped() {
    let dir = tempdir().unwrap();
    let a = dir.path().join("a.txt");
    let b = dir.path().join("b.txt");
    fs::write(&a, "same").unwrap();
    fs::write(&b, "same").unwrap();
    let ghost = dir.path().join("ghost.txt");

    let finder = DuplicateFinder::new(FinderConfig::default());
    let (groups, summary) = finder.find_duplicates(&[a, ghost, b]).unwrap();

    assert_eq!(groups.len(), 1);
    assert_eq!(summary.skipped_inputs, 1);
}

#[test]
fn test_hash_failure_excludes_only_that_file() {
    let dir = tempdir().unwrap();
    let mut records = Vec::new();
    for name in ["a", "b", "c", "d"] {
        let path = dir.path().join(name);
        fs::write(&path, "shared!").unwrap();
        records.push(FileRecord::from_path(&path).unwrap().unwrap());
    }
    fs::remove_file(dir.path().join("c")).unwrap();

    let finder = DuplicateFinder::new(FinderConfig::default().with_sequential_threshold(0));
    let (groups, summary) = finder.find_in_records(records).unwrap();

    assert_eq!(groups.len(), 1);
    assert_eq!(
        groups[0].paths,
        vec![dir.path().join("a"), dir.path().join("b"), dir.path().join("d")]
    );
    assert_eq!(summary.failed_files, 1);
    assert_eq!(summary.hashed_files, 3);
}

#[test]
fn test_missing_root_fails_immediately() {
    let dir = tempdir().unwrap();
    let walker = Walker::new(
        &dir.path().join("missing"),
        PathFilter::new(&FilterConfig::default()),
    );
    let err = walker.scan().unwrap_err();
    assert!(matches!(err, ScanError::NotFound(_)));
    assert!(matches!(FinderError::from(err), FinderError::PathNotFound(_)));
}

#[test]
fn test_file_root_is_not_a_directory() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("plain.txt");
    fs::write(&file, "x").unwrap();

    let walker = Walker::new(&file, PathFilter::new(&FilterConfig::default()));
    assert!(matches!(walker.scan(), Err(ScanError::NotADirectory(p)) if p == file));
}

#[cfg(unix)]
#[test]
fn test_unreadable_subdirectory_is_skipped() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempdir().unwrap();
    let locked = dir.path().join("locked");
    fs::create_dir(&locked).unwrap();
    fs::write(locked.join("hidden.txt"), "secret").unwrap();
    fs::write(dir.path().join("visible.txt"), "public").unwrap();
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

    if fs::read_dir(&locked).is_ok() {
        // Running as root; permissions are not enforced.
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
        return;
    }

    let walker = Walker::new(dir.path(), PathFilter::new(&FilterConfig::default()));
    let result = walker.scan();
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

    let (records, summary) = result.unwrap();
    let paths: Vec<PathBuf> = records.into_iter().map(|r| r.path).collect();
    assert_eq!(paths, vec![dir.path().join("visible.txt")]);
    assert_eq!(summary.skipped, 1);
}
