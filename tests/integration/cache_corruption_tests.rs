use filesweeper::cache::{CacheSettings, HashCache};
use filesweeper::duplicates::{DuplicateFinder, FinderConfig};
use std::fs;
use std::sync::Arc;
use tempfile::tempdir;

#[test]
fn test_garbage_cache_file_is_replaced() {
    let dir = tempdir().unwrap();
    let cache_path = dir.path().join("hashes.json");
    fs::write(&cache_path, b"not json at all \x00\x01").unwrap();

    let cache = Arc::new(HashCache::open(&cache_path, CacheSettings::default()));
    assert!(cache.is_empty());

    let a = dir.path().join("a");
    let b = dir.path().join("b");
    fs::write(&a, "same").unwrap();
    fs::write(&b, "same").unwrap();
    let finder = DuplicateFinder::new(FinderConfig::default().with_cache(cache));
    let (groups, _) = finder.find_duplicates(&[a, b]).unwrap();
    assert_eq!(groups.len(), 1);

    let reopened = HashCache::open(&cache_path, CacheSettings::default());
    assert_eq!(reopened.len(), 2);
}

#[test]
fn test_non_object_json_loads_empty() {
    let dir = tempdir().unwrap();
    let cache_path = dir.path().join("hashes.json");
    fs::write(&cache_path, "[1, 2, 3]").unwrap();

    let cache = HashCache::open(&cache_path, CacheSettings::default());
    assert!(cache.is_empty());
}

#[test]
fn test_truncated_file_loads_empty() {
    let dir = tempdir().unwrap();
    let cache_path = dir.path().join("hashes.json");
    fs::write(&cache_path, r#"{"10_1.000000000_false_4194304": {"path": "/a", "ha"#).unwrap();

    let cache = HashCache::open(&cache_path, CacheSettings::default());
    assert!(cache.is_empty());
}

#[test]
fn test_bad_entries_dropped_individually() {
    let dir = tempdir().unwrap();
    let cache_path = dir.path().join("hashes.json");
    let content = r#"{
        "good": {"path": "/a", "hash": "900150983cd24fb0d6963f7d28e17f72", "computed_at": "2030-01-01T00:00:00Z"},
        "bad_hash": {"path": "/b", "hash": "xyz", "computed_at": "2030-01-01T00:00:00Z"},
        "missing_fields": {"path": "/c"},
        "wrong_type": 42
    }"#;
    fs::write(&cache_path, content).unwrap();

    let cache = HashCache::open(&cache_path, CacheSettings::default());
    assert_eq!(cache.len(), 1);
}

#[cfg(unix)]
#[test]
fn test_unwritable_cache_does_not_fail_the_run() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempdir().unwrap();
    let locked = dir.path().join("locked");
    fs::create_dir(&locked).unwrap();
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o555)).unwrap();
    if fs::write(locked.join("canary"), b"x").is_ok() {
        // Running as root; permissions are not enforced.
        return;
    }

    let cache = Arc::new(HashCache::open(
        &locked.join("hashes.json"),
        CacheSettings::default(),
    ));
    let a = dir.path().join("a");
    let b = dir.path().join("b");
    fs::write(&a, "same").unwrap();
    fs::write(&b, "same").unwrap();

    let finder = DuplicateFinder::new(FinderConfig::default().with_cache(cache.clone()));
    let (groups, _) = finder.find_duplicates(&[a, b]).unwrap();
    assert_eq!(groups.len(), 1);
    assert!(cache.save().is_err());

    fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
}
