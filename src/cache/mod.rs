//! Hash caching module.
//!
//! Stores computed hashes between runs so unchanged files are not re-read.
//!
//! # Architecture
//!
//! * [`store`]: the in-memory map, its bounds and JSON file persistence.
//! * [`entry`]: the composite key and the stored record.
//!
//! # Cache Invalidation
//!
//! An entry is used only when all of these match the current lookup:
//! * File size and modification time (part of the key)
//! * Fast-scan flag and prefix size (part of the key)
//! * File path (stored in the entry)
//! * Age within the freshness window (24 hours by default)
//!
//! When the entry count exceeds the ceiling, the oldest entries are evicted
//! down to the prune target.

pub mod entry;
pub mod store;

pub use entry::{CacheEntry, CacheKey};
pub use store::{
    default_cache_path, CacheError, CacheResult, CacheSettings, CacheStats, HashCache,
    CACHE_FILE_NAME,
};
