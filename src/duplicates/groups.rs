//! Size and hash grouping.
//!
//! # Overview
//!
//! Size grouping is the cheap first pass: files with different byte sizes
//! cannot be duplicates, so only buckets holding two or more files of the
//! same size go on to hashing. Hash grouping then splits each bucket by
//! content hash and keeps groups of two or more.
//!
//! Because hash groups are formed inside a size bucket, two files of
//! different sizes never share a group, even in fast-scan mode where only a
//! prefix is hashed.
//!
//! # Example
//!
//! ```
//! use filesweeper::scanner::FileRecord;
//! use filesweeper::duplicates::group_by_size;
//! use std::path::PathBuf;
//! use std::time::SystemTime;
//!
//! let files = vec![
//!     FileRecord::new(PathBuf::from("/file1.txt"), 1024, SystemTime::now()),
//!     FileRecord::new(PathBuf::from("/file2.txt"), 1024, SystemTime::now()),
//!     FileRecord::new(PathBuf::from("/file3.txt"), 2048, SystemTime::now()),
//! ];
//!
//! let (groups, stats) = group_by_size(files);
//!
//! assert_eq!(stats.total_files, 3);
//! assert_eq!(stats.potential_duplicates, 2);
//! assert_eq!(groups.len(), 1);
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use serde::Serialize;

use crate::scanner::{hash_to_hex, FileRecord, Hash};

/// Files sharing one exact byte size.
#[derive(Debug, Clone)]
pub struct SizeGroup {
    /// File size in bytes (shared by all files in this group)
    pub size: u64,
    /// Files with this exact size
    pub files: Vec<FileRecord>,
}

impl SizeGroup {
    /// Create a size group with initial files.
    #[must_use]
    pub fn with_files(size: u64, files: Vec<FileRecord>) -> Self {
        Self { size, files }
    }

    /// Number of files in this group.
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Check if this group is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Confirmed duplicates: files of one size sharing one content hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HashGroup {
    /// Content hash (of the prefix in fast-scan mode)
    #[serde(serialize_with = "serialize_hash")]
    pub hash: Hash,
    /// File size in bytes
    pub size: u64,
    /// Paths in lexical order
    pub paths: Vec<PathBuf>,
}

fn serialize_hash<S: serde::Serializer>(hash: &Hash, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&hash_to_hex(hash))
}

impl HashGroup {
    /// Hex form of the hash.
    #[must_use]
    pub fn hash_hex(&self) -> String {
        hash_to_hex(&self.hash)
    }

    /// Number of files in this group.
    #[must_use]
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Check if this group is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Bytes freed by keeping one copy.
    #[must_use]
    pub fn wasted_space(&self) -> u64 {
        self.size * (self.paths.len().saturating_sub(1)) as u64
    }
}

/// Final result: hex hash to the paths sharing it.
pub type DuplicateMap = BTreeMap<String, Vec<PathBuf>>;

/// Statistics from size grouping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupingStats {
    /// Files fed into grouping
    pub total_files: usize,
    /// Combined size of those files
    pub total_size: u64,
    /// Zero-byte files seen (grouped like any other size)
    pub empty_files: usize,
    /// Distinct sizes seen
    pub unique_sizes: usize,
    /// Files dropped because no other file had their size
    pub eliminated_unique: usize,
    /// Files in buckets of two or more
    pub potential_duplicates: usize,
    /// Buckets of two or more
    pub size_groups: usize,
}

/// Bucket files by exact size and drop singleton buckets.
///
/// Zero-byte files form an ordinary bucket. Groups come back largest size
/// first, with files in path order.
pub fn group_by_size(
    files: impl IntoIterator<Item = FileRecord>,
) -> (Vec<SizeGroup>, GroupingStats) {
    let mut all_groups: HashMap<u64, Vec<FileRecord>> = HashMap::new();
    let mut stats = GroupingStats::default();

    for file in files {
        stats.total_files += 1;
        stats.total_size += file.size;

        if file.size == 0 {
            stats.empty_files += 1;
            log::trace!("Empty file encountered: {}", file.path.display());
        }

        all_groups.entry(file.size).or_default().push(file);
    }

    if stats.empty_files > 0 {
        log::info!("Found {} empty file(s)", stats.empty_files);
    }

    stats.unique_sizes = all_groups.len();

    let mut groups: Vec<SizeGroup> = all_groups
        .into_iter()
        .filter_map(|(size, mut files)| {
            if files.len() == 1 {
                stats.eliminated_unique += 1;
                log::trace!("Eliminated unique size {}: {}", size, files[0].path.display());
                return None;
            }
            stats.potential_duplicates += files.len();
            stats.size_groups += 1;
            log::debug!("Size group {} bytes: {} candidates", size, files.len());
            files.sort_by(|a, b| a.path.cmp(&b.path));
            Some(SizeGroup::with_files(size, files))
        })
        .collect();

    groups.sort_by(|a, b| b.size.cmp(&a.size));

    log::info!(
        "Size grouping: {} files -> {} candidates in {} groups ({} eliminated)",
        stats.total_files,
        stats.potential_duplicates,
        stats.size_groups,
        stats.eliminated_unique
    );

    (groups, stats)
}

/// Split one size bucket by hash, keeping groups of two or more.
pub fn group_by_hash(
    size: u64,
    hashed: impl IntoIterator<Item = (Hash, PathBuf)>,
) -> Vec<HashGroup> {
    let mut by_hash: HashMap<Hash, Vec<PathBuf>> = HashMap::new();
    for (hash, path) in hashed {
        by_hash.entry(hash).or_default().push(path);
    }

    by_hash
        .into_iter()
        .filter(|(_, paths)| paths.len() > 1)
        .map(|(hash, mut paths)| {
            paths.sort();
            HashGroup { hash, size, paths }
        })
        .collect()
}

/// Sort hash groups deterministically: largest size first, then by hash.
pub fn sort_groups(groups: &mut [HashGroup]) {
    groups.sort_by(|a, b| b.size.cmp(&a.size).then_with(|| a.hash.cmp(&b.hash)));
}

/// Flatten hash groups into the hex-keyed result map.
///
/// Keys are the hex hash. Two groups can only share a hash when a prefix
/// hash matched across different sizes (fast-scan mode); those keys get a
/// `-{size}` suffix so neither group is lost.
#[must_use]
pub fn to_duplicate_map(groups: &[HashGroup]) -> DuplicateMap {
    let mut occurrences: HashMap<Hash, usize> = HashMap::new();
    for group in groups {
        *occurrences.entry(group.hash).or_default() += 1;
    }

    groups
        .iter()
        .map(|group| {
            let key = if occurrences.get(&group.hash).copied().unwrap_or(0) > 1 {
                format!("{}-{}", group.hash_hex(), group.size)
            } else {
                group.hash_hex()
            };
            (key, group.paths.clone())
        })
        .collect()
}
