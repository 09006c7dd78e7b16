//! Duplicate detection module.
//!
//! This module provides functionality for:
//! - Size-based file grouping
//! - Content hashing on a bounded worker pool, backed by the hash cache
//! - Hash grouping into the final duplicate map

pub mod finder;
pub mod groups;
pub mod pool;

pub use finder::{
    DuplicateFinder, FindSummary, FinderConfig, FinderError, Schedule,
    DEFAULT_SEQUENTIAL_THRESHOLD, PARALLEL_MIN_FILES,
};
pub use groups::{
    group_by_hash, group_by_size, sort_groups, to_duplicate_map, DuplicateMap, GroupingStats,
    HashGroup, SizeGroup,
};
pub use pool::{worker_count, Platform, SystemProfile, WorkerMode, WorkerPool};
