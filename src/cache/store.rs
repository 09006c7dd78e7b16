//! JSON-file backed hash cache.
//!
//! The whole cache lives in memory behind an `RwLock`; lookups take a read
//! lock and can proceed in parallel from hashing workers, inserts take the
//! write lock. The backing file is a single JSON object mapping composite
//! keys to [`CacheEntry`] values and is rewritten atomically on
//! [`HashCache::save`].

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, SystemTime};

use chrono::Utc;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use super::entry::{CacheEntry, CacheKey};
use crate::scanner::{Hash, HashMode};

/// File name of the cache inside the cache directory.
pub const CACHE_FILE_NAME: &str = "filesweeper_hash_cache.json";

/// Errors raised by cache persistence.
#[derive(thiserror::Error, Debug)]
pub enum CacheError {
    /// Reading or writing the cache file failed.
    #[error("Cache I/O error for {path}: {source}")]
    Io {
        /// Cache file path
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },

    /// The cache file is not a JSON object.
    #[error("Cache file {path} is corrupt: {source}")]
    Corrupt {
        /// Cache file path
        path: PathBuf,
        /// The parse error
        #[source]
        source: serde_json::Error,
    },

    /// Encoding the cache failed.
    #[error("Failed to serialize cache: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The cache is memory-only and cannot be saved.
    #[error("Cache has no backing file")]
    NoBackingFile,
}

/// Result alias for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Bounds and lifetime of cached hashes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Entry count above which the cache is pruned.
    pub max_entries: usize,
    /// Entry count kept after pruning (oldest entries go first).
    pub prune_to: usize,
    /// Maximum entry age in hours, `0` disables expiry.
    pub max_age_hours: u64,
    /// Cache file location, defaults to the per-user cache directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_entries: 5000,
            prune_to: 2000,
            max_age_hours: 24,
            path: None,
        }
    }
}

impl CacheSettings {
    fn max_age(&self) -> Option<Duration> {
        (self.max_age_hours > 0).then(|| Duration::from_secs(self.max_age_hours * 3600))
    }

    /// `prune_to` clamped so pruning always makes room.
    fn prune_target(&self) -> usize {
        self.prune_to.min(self.max_entries)
    }

    /// Resolved cache file path.
    #[must_use]
    pub fn resolved_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(default_cache_path)
    }
}

/// Default per-user cache file location.
///
/// Falls back to the system temp directory when no home directory can be
/// determined.
#[must_use]
pub fn default_cache_path() -> PathBuf {
    ProjectDirs::from("com", "filesweeper", "filesweeper")
        .map(|dirs| dirs.cache_dir().join(CACHE_FILE_NAME))
        .unwrap_or_else(|| std::env::temp_dir().join(CACHE_FILE_NAME))
}

/// Hit/miss counters and size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Entries currently held.
    pub entries: usize,
    /// Successful lookups since creation or the last reset.
    pub hits: usize,
    /// Failed lookups since creation or the last reset.
    pub misses: usize,
}

impl CacheStats {
    /// Fraction of lookups that hit, `0.0` when there were none.
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Persistent, bounded hash cache.
#[derive(Debug)]
pub struct HashCache {
    path: Option<PathBuf>,
    settings: CacheSettings,
    entries: RwLock<HashMap<String, CacheEntry>>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl HashCache {
    /// Create an empty cache with no backing file.
    #[must_use]
    pub fn in_memory(settings: CacheSettings) -> Self {
        Self {
            path: None,
            settings,
            entries: RwLock::new(HashMap::new()),
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        }
    }

    /// Open the cache at `path`, loading any existing entries.
    ///
    /// Never fails: a missing file yields an empty cache, a corrupt file is
    /// logged and replaced on the next save.
    #[must_use]
    pub fn open(path: &Path, settings: CacheSettings) -> Self {
        let mut cache = Self::in_memory(settings);
        cache.path = Some(path.to_path_buf());
        cache.load();
        cache
    }

    /// Open the cache at the location named by `settings`.
    #[must_use]
    pub fn open_default(settings: CacheSettings) -> Self {
        let path = settings.resolved_path();
        Self::open(&path, settings)
    }

    /// Backing file, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Active settings.
    #[must_use]
    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    /// Replace the in-memory contents with the backing file.
    ///
    /// Failures reset the cache to empty and are logged.
    pub fn load(&self) {
        let Some(path) = self.path.as_deref() else {
            return;
        };
        let loaded = match read_entries(path) {
            Ok(entries) => entries,
            Err(e) => {
                log::warn!("Ignoring hash cache: {}", e);
                HashMap::new()
            }
        };

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        *entries = loaded;
        if entries.len() > self.settings.max_entries {
            prune_oldest(&mut entries, self.settings.prune_target());
        }
        log::debug!(
            "Loaded {} cached hashes from {}",
            entries.len(),
            path.display()
        );
    }

    /// Write the cache to its backing file.
    ///
    /// The file is written to a sibling temporary path and renamed into
    /// place, so readers never observe a half-written cache.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the cache has no backing file or cannot be
    /// written. Callers in the scan pipeline log and continue.
    pub fn save(&self) -> CacheResult<()> {
        let path = self.path.as_deref().ok_or(CacheError::NoBackingFile)?;
        let json = {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            serde_json::to_vec(&*entries)?
        };

        let io_err = |source| CacheError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(io_err)?;
        fs::rename(&tmp, path).map_err(io_err)?;

        log::debug!("Saved {} cached hashes to {}", self.len(), path.display());
        Ok(())
    }

    /// Look up the hash of `path` under `mode`.
    ///
    /// Returns a hit only if the stored entry was computed for the same
    /// path and is within the freshness window.
    pub fn get(
        &self,
        path: &Path,
        size: u64,
        modified: SystemTime,
        mode: HashMode,
    ) -> Option<Hash> {
        let key = CacheKey::new(path, size, modified, mode);
        let found = {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            entries
                .get(key.as_str())
                .filter(|entry| entry.matches_path(path))
                .filter(|entry| entry.is_fresh(self.settings.max_age(), Utc::now()))
                .and_then(CacheEntry::digest)
        };

        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    /// Record the hash of `path`, pruning if the ceiling is exceeded.
    pub fn put(&self, path: &Path, size: u64, modified: SystemTime, mode: HashMode, hash: &Hash) {
        let key = CacheKey::new(path, size, modified, mode);
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.into(), CacheEntry::new(path, hash));
        if entries.len() > self.settings.max_entries {
            prune_oldest(&mut entries, self.settings.prune_target());
        }
    }

    /// Number of entries held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry. The backing file is untouched until the next save.
    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Reset hit/miss counters.
    pub fn reset_stats(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }
}

/// Read the cache file, dropping entries that fail to parse individually.
fn read_entries(path: &Path) -> CacheResult<HashMap<String, CacheEntry>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(HashMap::new()),
        Err(source) => {
            return Err(CacheError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let raw: serde_json::Map<String, serde_json::Value> =
        serde_json::from_slice(&bytes).map_err(|source| CacheError::Corrupt {
            path: path.to_path_buf(),
            source,
        })?;

    let total = raw.len();
    let entries: HashMap<String, CacheEntry> = raw
        .into_iter()
        .filter_map(|(key, value)| {
            serde_json::from_value::<CacheEntry>(value)
                .ok()
                .filter(|entry| entry.digest().is_some())
                .map(|entry| (key, entry))
        })
        .collect();

    if entries.len() < total {
        log::warn!(
            "Dropped {} unreadable cache entries from {}",
            total - entries.len(),
            path.display()
        );
    }
    Ok(entries)
}

/// Evict the oldest entries by `computed_at` until `target` remain.
fn prune_oldest(entries: &mut HashMap<String, CacheEntry>, target: usize) {
    if entries.len() <= target {
        return;
    }
    let excess = entries.len() - target;
    let mut by_age: Vec<(chrono::DateTime<Utc>, String)> = entries
        .iter()
        .map(|(key, entry)| (entry.computed_at, key.clone()))
        .collect();
    by_age.sort_unstable();

    for (_, key) in by_age.into_iter().take(excess) {
        entries.remove(&key);
    }
    log::debug!("Pruned {} old cache entries, {} remain", excess, entries.len());
}
