//! Cache entry and key definitions.

use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::scanner::{hash_to_hex, hex_to_hash, Hash, HashMode};

/// Composite cache key: size, modification time, hashing mode and path.
///
/// Rendered as `"{size}_{mtime}_{fast}_{prefix}_{path}"`, where `mtime` is
/// seconds since the Unix epoch with nanosecond precision. Any change to
/// size, mtime or mode produces a different key, so stale hashes are never
/// returned for a modified file. Copies that share size and mtime (`cp -p`,
/// `rsync -a`) still get one slot each.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Build the key for a file.
    #[must_use]
    pub fn new(path: &Path, size: u64, modified: SystemTime, mode: HashMode) -> Self {
        Self(format!(
            "{}_{}_{}_{}_{}",
            size,
            mtime_component(modified),
            mode.fast_scan,
            mode.prefix_bytes,
            path.to_string_lossy()
        ))
    }

    /// The key as stored in the cache file.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<CacheKey> for String {
    fn from(key: CacheKey) -> Self {
        key.0
    }
}

fn mtime_component(modified: SystemTime) -> String {
    match modified.duration_since(UNIX_EPOCH) {
        Ok(d) => format!("{}.{:09}", d.as_secs(), d.subsec_nanos()),
        Err(before) => {
            let d = before.duration();
            format!("-{}.{:09}", d.as_secs(), d.subsec_nanos())
        }
    }
}

/// A single hash stored in the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Path the hash was computed for.
    pub path: String,
    /// Lowercase hex digest.
    pub hash: String,
    /// When the hash was computed.
    pub computed_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Create an entry stamped with the current time.
    #[must_use]
    pub fn new(path: &Path, hash: &Hash) -> Self {
        Self {
            path: path.to_string_lossy().into_owned(),
            hash: hash_to_hex(hash),
            computed_at: Utc::now(),
        }
    }

    /// Whether this entry belongs to `path`.
    #[must_use]
    pub fn matches_path(&self, path: &Path) -> bool {
        self.path == path.to_string_lossy()
    }

    /// Whether the entry is younger than `max_age` at `now`.
    ///
    /// Entries stamped in the future (clock changes) count as fresh.
    #[must_use]
    pub fn is_fresh(&self, max_age: Option<Duration>, now: DateTime<Utc>) -> bool {
        let Some(max_age) = max_age else {
            return true;
        };
        match (now - self.computed_at).to_std() {
            Ok(age) => age <= max_age,
            Err(_) => true,
        }
    }

    /// Decoded digest, `None` if the stored hex is malformed.
    #[must_use]
    pub fn digest(&self) -> Option<Hash> {
        hex_to_hash(&self.hash)
    }
}
