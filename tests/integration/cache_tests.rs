use filesweeper::cache::{CacheSettings, HashCache};
use filesweeper::duplicates::{DuplicateFinder, FinderConfig};
use filesweeper::scanner::{HashMode, Hasher};
use filetime::{set_file_mtime, FileTime};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tempfile::tempdir;

fn make_files(dir: &Path) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    for (name, content) in [
        ("a.txt", "duplicate content"),
        ("b.txt", "duplicate content"),
        ("c.txt", "something unique!"),
        ("d.txt", "short"),
    ] {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        paths.push(path);
    }
    paths
}

#[test]
fn test_second_run_is_served_from_cache() {
    let dir = tempdir().unwrap();
    let cache_path = dir.path().join("cache").join("hashes.json");
    let files = make_files(dir.path());

    let first_cache = Arc::new(HashCache::open(&cache_path, CacheSettings::default()));
    let finder = DuplicateFinder::new(FinderConfig::default().with_cache(first_cache));
    let (first_groups, first) = finder.find_duplicates(&files).unwrap();
    assert_eq!(first.cache_hits, 0);
    assert_eq!(first.cache_misses, 3);
    assert!(cache_path.exists(), "cache is saved when the run ends");

    let second_cache = Arc::new(HashCache::open(&cache_path, CacheSettings::default()));
    assert_eq!(second_cache.len(), 3);
    let finder = DuplicateFinder::new(FinderConfig::default().with_cache(second_cache));
    let (second_groups, second) = finder.find_duplicates(&files).unwrap();

    assert_eq!(first_groups, second_groups);
    assert_eq!(second.cache_hits, 3);
    assert_eq!(second.cache_misses, 0);
    assert!((second.cache_hit_rate() - 1.0).abs() < f64::EPSILON);
}

#[test]
fn test_copies_with_identical_mtime_both_hit() {
    let dir = tempdir().unwrap();
    let a = dir.path().join("a.bin");
    let b = dir.path().join("b.bin");
    fs::write(&a, "preserved copy").unwrap();
    fs::write(&b, "preserved copy").unwrap();
    let stamp = FileTime::from_unix_time(1_700_000_000, 0);
    set_file_mtime(&a, stamp).unwrap();
    set_file_mtime(&b, stamp).unwrap();

    let cache = Arc::new(HashCache::in_memory(CacheSettings::default()));
    let finder = DuplicateFinder::new(FinderConfig::default().with_cache(cache.clone()));
    let files = vec![a, b];

    let (_, first) = finder.find_duplicates(&files).unwrap();
    assert_eq!(first.cache_misses, 2);
    assert_eq!(cache.len(), 2);

    let (groups, second) = finder.find_duplicates(&files).unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(second.cache_hits, 2);
    assert_eq!(second.cache_misses, 0);
}

#[test]
fn test_modified_file_is_rehashed() {
    let dir = tempdir().unwrap();
    let files = make_files(dir.path());
    let cache = Arc::new(HashCache::in_memory(CacheSettings::default()));
    let finder = DuplicateFinder::new(FinderConfig::default().with_cache(cache.clone()));

    let (groups, _) = finder.find_duplicates(&files).unwrap();
    assert_eq!(groups.len(), 1);

    fs::write(&files[1], "duplicate CONTENT").unwrap();
    set_file_mtime(&files[1], FileTime::from_unix_time(1_000_000_000, 0)).unwrap();

    let (groups, summary) = finder.find_duplicates(&files).unwrap();
    assert!(groups.is_empty());
    assert_eq!(summary.cache_hits, 2);
    assert_eq!(summary.cache_misses, 1);
}

#[test]
fn test_mode_is_part_of_the_key() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("file.bin");
    fs::write(&path, vec![1u8; 2048]).unwrap();
    let mtime = fs::metadata(&path).unwrap().modified().unwrap();

    let cache = HashCache::in_memory(CacheSettings::default());
    let full = Hasher::new().hash_file(&path, HashMode::full()).unwrap();
    cache.put(&path, 2048, mtime, HashMode::full(), &full);

    assert_eq!(cache.get(&path, 2048, mtime, HashMode::full()), Some(full));
    assert_eq!(cache.get(&path, 2048, mtime, HashMode::fast_bytes(1024)), None);
}

#[test]
fn test_same_key_other_path_is_a_miss() {
    let cache = HashCache::in_memory(CacheSettings::default());
    let mtime = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
    cache.put(Path::new("/a/one.bin"), 10, mtime, HashMode::full(), &[3u8; 16]);

    assert!(cache
        .get(Path::new("/a/two.bin"), 10, mtime, HashMode::full())
        .is_none());
    assert_eq!(cache.stats().misses, 1);
}

#[test]
fn test_round_trip_and_ceiling() {
    let dir = tempdir().unwrap();
    let cache_path = dir.path().join("hashes.json");
    let settings = CacheSettings {
        max_entries: 50,
        prune_to: 20,
        ..CacheSettings::default()
    };
    let cache = HashCache::open(&cache_path, settings.clone());
    let mtime = SystemTime::now();

    for i in 0..120u64 {
        let path = PathBuf::from(format!("/data/file{i}"));
        cache.put(&path, i + 1, mtime, HashMode::full(), &[i as u8; 16]);
        assert!(cache.len() <= settings.max_entries);
    }
    cache.save().unwrap();

    let reloaded = HashCache::open(&cache_path, settings);
    assert_eq!(reloaded.len(), cache.len());
    for i in 0..120u64 {
        let path = PathBuf::from(format!("/data/file{i}"));
        let before = cache.get(&path, i + 1, mtime, HashMode::full());
        let after = reloaded.get(&path, i + 1, mtime, HashMode::full());
        assert_eq!(before, after);
    }
    assert!(
        reloaded
            .get(Path::new("/data/file119"), 120, mtime, HashMode::full())
            .is_some(),
        "the newest entry survives pruning"
    );
}

#[test]
fn test_cache_disabled_saves_nothing() {
    let dir = tempdir().unwrap();
    let files = make_files(dir.path());

    let finder = DuplicateFinder::new(FinderConfig::default());
    let (groups, summary) = finder.find_duplicates(&files).unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(summary.cache_hits, 0);
    assert_eq!(summary.cache_misses, 3);
}
