//! Duplicate finder: size grouping followed by parallel content hashing.
//!
//! # Overview
//!
//! 1. **Size grouping**: bucket candidates by exact size, drop singletons
//!    (see [`crate::duplicates::groups`]).
//! 2. **Hashing**: hash every file in every remaining bucket, consulting
//!    the [`HashCache`] first. Small workloads run on the calling thread,
//!    larger ones on a [`WorkerPool`].
//! 3. **Hash grouping**: split each bucket by hash and keep groups of two
//!    or more.
//!
//! The cache is saved when the run ends, whether it completed, failed or
//! was cancelled.
//!
//! # Example
//!
//! ```no_run
//! use filesweeper::duplicates::{DuplicateFinder, FinderConfig};
//! use std::path::PathBuf;
//!
//! let finder = DuplicateFinder::new(FinderConfig::default());
//! let files = vec![PathBuf::from("a.bin"), PathBuf::from("b.bin")];
//! let (groups, summary) = finder.find_duplicates(&files).unwrap();
//! println!("{} groups, {} reclaimable", groups.len(), summary.reclaimable_display());
//! ```

use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;

use super::groups::{group_by_hash, group_by_size, sort_groups, HashGroup};
use super::pool::{worker_count, SystemProfile, WorkerMode, WorkerPool};
use crate::cache::HashCache;
use crate::config::OptimizationConfig;
use crate::progress::{ProgressCallback, PHASE_GROUP, PHASE_HASH};
use crate::scanner::{FileRecord, Hash, HashError, HashMode, Hasher, ScanError};

/// Total candidate count at or below which hashing stays on the calling
/// thread.
pub const DEFAULT_SEQUENTIAL_THRESHOLD: usize = 16;

/// Candidate count above which the parallel tier is used when requested.
pub const PARALLEL_MIN_FILES: usize = 100;

/// Configuration for the duplicate finder.
#[derive(Clone)]
pub struct FinderConfig {
    /// How much of each file is hashed.
    pub mode: HashMode,
    /// Memory-map files above the mmap threshold.
    pub use_mmap: bool,
    /// Prefer the parallel tier for large workloads.
    pub use_parallel: bool,
    /// Candidate count at or below which no pool is started.
    pub sequential_threshold: usize,
    /// Resource snapshot for worker sizing; detected when `None`.
    pub profile: Option<SystemProfile>,
    /// Optional hash cache shared across runs.
    pub cache: Option<Arc<HashCache>>,
    /// Optional shutdown flag for cooperative cancellation.
    pub shutdown_flag: Option<Arc<AtomicBool>>,
    /// Optional progress callback.
    pub progress_callback: Option<Arc<dyn ProgressCallback>>,
}

impl fmt::Debug for FinderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FinderConfig")
            .field("mode", &self.mode)
            .field("use_mmap", &self.use_mmap)
            .field("use_parallel", &self.use_parallel)
            .field("sequential_threshold", &self.sequential_threshold)
            .field("profile", &self.profile)
            .field("cache", &self.cache.as_ref().map(|_| "<cache>"))
            .field("shutdown_flag", &self.shutdown_flag)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}

impl Default for FinderConfig {
    fn default() -> Self {
        Self {
            mode: HashMode::full(),
            use_mmap: true,
            use_parallel: false,
            sequential_threshold: DEFAULT_SEQUENTIAL_THRESHOLD,
            profile: None,
            cache: None,
            shutdown_flag: None,
            progress_callback: None,
        }
    }
}

impl FinderConfig {
    /// Build a configuration from user-facing optimization settings.
    ///
    /// The cache is not attached here; see [`FinderConfig::with_cache`].
    #[must_use]
    pub fn from_optimization(options: &OptimizationConfig) -> Self {
        Self {
            mode: options.hash_mode(),
            use_mmap: options.use_mmap,
            use_parallel: options.use_multiprocessing,
            ..Self::default()
        }
    }

    /// Set the hashing mode.
    #[must_use]
    pub fn with_mode(mut self, mode: HashMode) -> Self {
        self.mode = mode;
        self
    }

    /// Enable or disable the parallel tier.
    #[must_use]
    pub fn with_parallel(mut self, enabled: bool) -> Self {
        self.use_parallel = enabled;
        self
    }

    /// Set the sequential threshold.
    #[must_use]
    pub fn with_sequential_threshold(mut self, files: usize) -> Self {
        self.sequential_threshold = files;
        self
    }

    /// Use a fixed resource profile instead of probing.
    #[must_use]
    pub fn with_profile(mut self, profile: SystemProfile) -> Self {
        self.profile = Some(profile);
        self
    }

    /// Set the hash cache.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<HashCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Set the shutdown flag for cooperative cancellation.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    /// Set the progress callback.
    #[must_use]
    pub fn with_progress_callback(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }
}

/// How hashing was scheduled for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Schedule {
    /// Nothing to hash.
    #[default]
    Idle,
    /// On the calling thread.
    Sequential,
    /// On a worker pool.
    Pool {
        /// Tier used
        mode: WorkerMode,
        /// Threads in the pool
        workers: usize,
    },
}

/// Summary statistics from a duplicate search.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FindSummary {
    /// Paths handed to the finder
    pub input_files: usize,
    /// Inputs that could not be stat'ed or were not regular files
    pub skipped_inputs: usize,
    /// Combined size of the stat'ed inputs
    pub total_size: u64,
    /// Zero-byte inputs (bucketed like any other size)
    pub empty_files: usize,
    /// Files eliminated because their size was unique
    pub eliminated_by_size: usize,
    /// Size buckets that went to hashing
    pub size_groups: usize,
    /// Files hashed or served from cache
    pub hashed_files: usize,
    /// Files whose hash could not be computed
    pub failed_files: usize,
    /// Hashes served from cache
    pub cache_hits: usize,
    /// Hashes computed from disk
    pub cache_misses: usize,
    /// Confirmed duplicate groups
    pub duplicate_groups: usize,
    /// Duplicate files beyond the first of each group
    pub duplicate_files: usize,
    /// Bytes freed by keeping one copy per group
    pub reclaimable_space: u64,
    /// How hashing was scheduled
    pub schedule: Schedule,
    /// Wall-clock duration
    pub duration: Duration,
}

impl FindSummary {
    /// Format reclaimable space as a human-readable string.
    #[must_use]
    pub fn reclaimable_display(&self) -> String {
        bytesize::ByteSize(self.reclaimable_space).to_string()
    }

    /// Fraction of hashes served from cache, `0.0` if nothing was hashed.
    #[must_use]
    pub fn cache_hit_rate(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / total as f64
        }
    }
}

/// Errors that can occur during duplicate finding.
#[derive(thiserror::Error, Debug)]
pub enum FinderError {
    /// The run was cancelled.
    #[error("Scan interrupted by user")]
    Interrupted,

    /// The provided path does not exist.
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    /// The provided path is not a directory.
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    /// The root directory cannot be read.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// The hashing thread pool could not be started.
    #[error("Failed to start worker pool: {0}")]
    Pool(String),

    /// Any other traversal failure.
    #[error(transparent)]
    Scan(ScanError),
}

impl From<ScanError> for FinderError {
    fn from(err: ScanError) -> Self {
        match err {
            ScanError::Interrupted => Self::Interrupted,
            ScanError::NotFound(path) => Self::PathNotFound(path),
            ScanError::NotADirectory(path) => Self::NotADirectory(path),
            ScanError::PermissionDenied(path) => Self::PermissionDenied(path),
            other => Self::Scan(other),
        }
    }
}

/// Result of hashing a single file.
#[derive(Debug)]
enum HashOutcome {
    Hashed { hash: Hash, cache_hit: bool },
    Failed(HashError),
    Interrupted,
}

/// Hashing work unit: files of one bucket, identified by its index.
type HashTask = (usize, Vec<FileRecord>);
type TaskResult = (usize, Vec<(FileRecord, HashOutcome)>);

/// Duplicate finder over a list of files.
pub struct DuplicateFinder {
    config: FinderConfig,
    hasher: Hasher,
}

impl fmt::Debug for DuplicateFinder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DuplicateFinder")
            .field("config", &self.config)
            .field("hasher", &self.hasher)
            .finish()
    }
}

impl DuplicateFinder {
    /// Create a new duplicate finder with the given configuration.
    #[must_use]
    pub fn new(config: FinderConfig) -> Self {
        let hasher = Hasher::new().with_mmap(config.use_mmap);
        Self { config, hasher }
    }

    /// Replace the hasher (thresholds are mostly useful in tests).
    #[must_use]
    pub fn with_hasher(mut self, hasher: Hasher) -> Self {
        self.hasher = hasher;
        self
    }

    /// Find duplicates among `paths`.
    ///
    /// Each path is stat'ed first; paths that vanished or are not regular
    /// files are skipped with a warning.
    ///
    /// # Errors
    ///
    /// [`FinderError::Interrupted`] if the shutdown flag was raised, or
    /// [`FinderError::Pool`] if worker threads cannot be started.
    pub fn find_duplicates(
        &self,
        paths: &[PathBuf],
    ) -> Result<(Vec<HashGroup>, FindSummary), FinderError> {
        let mut records = Vec::with_capacity(paths.len());
        let mut skipped = 0;
        for path in paths {
            if self.config.is_shutdown_requested() {
                self.save_cache();
                return Err(FinderError::Interrupted);
            }
            match FileRecord::from_path(path) {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {
                    skipped += 1;
                    log::debug!("Not a regular file, skipping: {}", path.display());
                }
                Err(e) => {
                    skipped += 1;
                    log::warn!("Skipping {}: {}", path.display(), e);
                    self.message(&format!("Skipped {}: {}", path.display(), e));
                }
            }
        }

        let (groups, mut summary) = self.find_in_records(records)?;
        summary.input_files += skipped;
        summary.skipped_inputs = skipped;
        Ok((groups, summary))
    }

    /// Find duplicates among already stat'ed files.
    ///
    /// # Errors
    ///
    /// See [`DuplicateFinder::find_duplicates`].
    pub fn find_in_records(
        &self,
        records: Vec<FileRecord>,
    ) -> Result<(Vec<HashGroup>, FindSummary), FinderError> {
        let result = self.run(records);
        self.save_cache();
        result
    }

    fn run(&self, records: Vec<FileRecord>) -> Result<(Vec<HashGroup>, FindSummary), FinderError> {
        let start = Instant::now();
        let mut summary = FindSummary {
            input_files: records.len(),
            ..Default::default()
        };

        // Size grouping
        if let Some(ref callback) = self.config.progress_callback {
            callback.on_phase_start(PHASE_GROUP, records.len());
        }
        let (size_groups, grouping) = group_by_size(records);
        summary.total_size = grouping.total_size;
        summary.empty_files = grouping.empty_files;
        summary.eliminated_by_size = grouping.eliminated_unique;
        summary.size_groups = grouping.size_groups;
        if let Some(ref callback) = self.config.progress_callback {
            callback.on_progress(grouping.total_files, "Grouped files by size");
            callback.on_phase_end(PHASE_GROUP);
        }
        if self.config.is_shutdown_requested() {
            return Err(FinderError::Interrupted);
        }

        // Hashing
        let total_buckets = size_groups.len();
        let candidates: usize = size_groups.iter().map(|g| g.len()).sum();
        if let Some(ref callback) = self.config.progress_callback {
            callback.on_phase_start(PHASE_HASH, total_buckets);
        }
        log::info!(
            "Hashing {} candidates in {} size groups",
            candidates,
            total_buckets
        );

        let sizes: Vec<u64> = size_groups.iter().map(|g| g.size).collect();
        let mut remaining: Vec<usize> = size_groups.iter().map(|g| g.len()).collect();
        let mut hashed: Vec<Vec<(Hash, PathBuf)>> = vec![Vec::new(); total_buckets];
        let mut completed = 0usize;
        let mut interrupted = false;

        let mut collect = |(bucket, outcomes): TaskResult| {
            for (record, outcome) in outcomes {
                remaining[bucket] -= 1;
                match outcome {
                    HashOutcome::Hashed { hash, cache_hit } => {
                        summary.hashed_files += 1;
                        if cache_hit {
                            summary.cache_hits += 1;
                        } else {
                            summary.cache_misses += 1;
                        }
                        hashed[bucket].push((hash, record.path));
                    }
                    HashOutcome::Failed(e) => {
                        summary.failed_files += 1;
                        log::warn!("Failed to hash {}: {}", record.path.display(), e);
                        if !interrupted {
                            self.message(&format!("Skipped {}: {}", record.path.display(), e));
                        }
                    }
                    HashOutcome::Interrupted => interrupted = true,
                }
            }
            if self.config.is_shutdown_requested() {
                interrupted = true;
            }
            if remaining[bucket] == 0 {
                completed += 1;
                if !interrupted {
                    if let Some(ref callback) = self.config.progress_callback {
                        callback.on_progress(
                            completed,
                            &format!("Processed {completed}/{total_buckets} groups"),
                        );
                    }
                }
            }
        };

        summary.schedule = self.dispatch(size_groups, candidates, &mut collect)?;
        if interrupted || self.config.is_shutdown_requested() {
            log::info!("Hashing interrupted by shutdown signal");
            return Err(FinderError::Interrupted);
        }

        let mut groups: Vec<HashGroup> = sizes
            .into_iter()
            .zip(hashed)
            .flat_map(|(size, pairs)| group_by_hash(size, pairs))
            .collect();
        sort_groups(&mut groups);

        for group in &groups {
            log::debug!(
                "Duplicate group {}: {} files, {} bytes each",
                group.hash_hex(),
                group.len(),
                group.size
            );
        }

        summary.duplicate_groups = groups.len();
        summary.duplicate_files = groups.iter().map(|g| g.len() - 1).sum();
        summary.reclaimable_space = groups.iter().map(HashGroup::wasted_space).sum();
        summary.duration = start.elapsed();

        if let Some(ref callback) = self.config.progress_callback {
            callback.on_phase_end(PHASE_HASH);
        }
        log::info!(
            "Found {} duplicate groups, {} duplicate files, {} reclaimable ({} cache hits, {} misses, {} failed)",
            summary.duplicate_groups,
            summary.duplicate_files,
            summary.reclaimable_display(),
            summary.cache_hits,
            summary.cache_misses,
            summary.failed_files
        );

        Ok((groups, summary))
    }

    /// Schedule hashing of every bucket and stream results into `collect`.
    fn dispatch(
        &self,
        size_groups: Vec<super::SizeGroup>,
        candidates: usize,
        collect: &mut dyn FnMut(TaskResult),
    ) -> Result<Schedule, FinderError> {
        if size_groups.is_empty() {
            return Ok(Schedule::Idle);
        }

        let buckets = size_groups.len();
        let bucket_tasks = size_groups
            .into_iter()
            .enumerate()
            .map(|(index, group)| (index, group.files));

        if candidates <= self.config.sequential_threshold {
            log::debug!("Hashing {} files sequentially", candidates);
            for task in bucket_tasks {
                collect(self.hash_task(task));
            }
            return Ok(Schedule::Sequential);
        }

        let mode = if self.config.use_parallel && candidates > PARALLEL_MIN_FILES {
            WorkerMode::Parallel
        } else {
            WorkerMode::Threaded
        };
        let tasks: Vec<HashTask> = match mode {
            WorkerMode::Threaded => bucket_tasks.collect(),
            WorkerMode::Parallel => bucket_tasks
                .flat_map(|(index, files)| files.into_iter().map(move |f| (index, vec![f])))
                .collect(),
        };

        let profile = self.config.profile.unwrap_or_else(SystemProfile::detect);
        let workers = worker_count(mode, &profile, tasks.len());
        log::debug!(
            "Hashing {} tasks from {} buckets on {} workers ({:?}) with {}",
            tasks.len(),
            buckets,
            workers,
            mode,
            profile
        );

        let pool = WorkerPool::new(workers)?;
        pool.run(tasks, |task| self.hash_task(task), collect);
        Ok(Schedule::Pool { mode, workers })
    }

    fn hash_task(&self, (bucket, files): HashTask) -> TaskResult {
        let outcomes = files
            .into_iter()
            .map(|record| {
                let outcome = self.hash_record(&record);
                (record, outcome)
            })
            .collect();
        (bucket, outcomes)
    }

    fn hash_record(&self, record: &FileRecord) -> HashOutcome {
        if self.config.is_shutdown_requested() {
            return HashOutcome::Interrupted;
        }

        let mode = self.config.mode;
        if let Some(ref cache) = self.config.cache {
            if let Some(hash) = cache.get(&record.path, record.size, record.modified, mode) {
                log::trace!("Cache hit: {}", record.path.display());
                return HashOutcome::Hashed {
                    hash,
                    cache_hit: true,
                };
            }
            log::trace!("Cache miss: {}", record.path.display());
        }

        match self.hasher.hash_file(&record.path, mode) {
            Ok(hash) => {
                if let Some(ref cache) = self.config.cache {
                    cache.put(&record.path, record.size, record.modified, mode, &hash);
                }
                HashOutcome::Hashed {
                    hash,
                    cache_hit: false,
                }
            }
            Err(e) => HashOutcome::Failed(e),
        }
    }

    fn message(&self, message: &str) {
        if let Some(ref callback) = self.config.progress_callback {
            callback.on_message(message);
        }
    }

    fn save_cache(&self) {
        let Some(ref cache) = self.config.cache else {
            return;
        };
        if cache.path().is_none() {
            return;
        }
        if let Err(e) = cache.save() {
            log::warn!("Failed to save hash cache: {}", e);
        }
    }
}
