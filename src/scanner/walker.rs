//! Directory walker producing filtered candidate files.
//!
//! # Overview
//!
//! [`Walker`] traverses a directory tree on the calling thread using
//! [`walkdir`], applies a [`PathFilter`] to every regular file and collects
//! the survivors as [`FileRecord`]s.
//!
//! - Children are visited in file-name order, so output is deterministic.
//! - Symlinks are not followed unless [`WalkerConfig::follow_symlinks`] is
//!   set; when following, link cycles are detected by walkdir and reported
//!   as skipped entries.
//! - Unreadable entries below the root are skipped with a warning and a
//!   progress message. Only root-level failures abort the walk.
//! - The shutdown flag is checked before every entry, directory or file.
//!
//! # Example
//!
//! ```no_run
//! use filesweeper::scanner::{PathFilter, Walker};
//! use std::path::Path;
//! use std::sync::atomic::AtomicBool;
//! use std::sync::Arc;
//!
//! let cancel = Arc::new(AtomicBool::new(false));
//! let walker = Walker::new(Path::new("/home/user/Downloads"), PathFilter::default())
//!     .with_shutdown_flag(cancel);
//! let (files, _summary) = walker.scan().unwrap();
//! ```

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use walkdir::WalkDir;

use super::{FileRecord, PathFilter, ScanError};
use crate::progress::{ProgressCallback, PHASE_WALK};

/// Default number of files between two progress reports.
pub const DEFAULT_PROGRESS_INTERVAL: usize = 500;

/// Walk behavior that is independent of the filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkerConfig {
    /// Follow symbolic links during traversal.
    pub follow_symlinks: bool,
    /// Emit a progress report every this many files, in addition to one
    /// per directory.
    pub progress_interval: usize,
}

impl Default for WalkerConfig {
    fn default() -> Self {
        Self {
            follow_symlinks: false,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }
}

/// Counters collected during a walk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalkSummary {
    /// Directories visited, including the root.
    pub directories: usize,
    /// Regular files evaluated against the filter.
    pub files_seen: usize,
    /// Files that passed the filter.
    pub files_accepted: usize,
    /// Entries skipped because they could not be read.
    pub skipped: usize,
    /// Wall-clock duration of the walk.
    pub duration: Duration,
}

/// Single-threaded directory walker.
pub struct Walker {
    root: PathBuf,
    filter: PathFilter,
    config: WalkerConfig,
    shutdown_flag: Option<Arc<AtomicBool>>,
    progress_callback: Option<Arc<dyn ProgressCallback>>,
}

impl fmt::Debug for Walker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Walker")
            .field("root", &self.root)
            .field("filter", &self.filter)
            .field("config", &self.config)
            .field("shutdown_flag", &self.shutdown_flag)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}

impl Walker {
    /// Create a walker for `root` with default walk behavior.
    #[must_use]
    pub fn new(root: &Path, filter: PathFilter) -> Self {
        Self {
            root: root.to_path_buf(),
            filter,
            config: WalkerConfig::default(),
            shutdown_flag: None,
            progress_callback: None,
        }
    }

    /// Replace the walk behavior.
    #[must_use]
    pub fn with_config(mut self, config: WalkerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the shutdown flag checked before every entry.
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

    /// Check that the root exists, is a directory and can be listed.
    ///
    /// # Errors
    ///
    /// [`ScanError::NotFound`], [`ScanError::NotADirectory`] or
    /// [`ScanError::PermissionDenied`] for the root itself.
    pub fn validate_root(&self) -> Result<(), ScanError> {
        let metadata = fs::metadata(&self.root).map_err(|e| ScanError::from_io(&self.root, e))?;
        if !metadata.is_dir() {
            return Err(ScanError::NotADirectory(self.root.clone()));
        }
        fs::read_dir(&self.root).map_err(|e| ScanError::from_io(&self.root, e))?;
        Ok(())
    }

    /// Walk the tree and return every file accepted by the filter.
    ///
    /// # Errors
    ///
    /// - Root-level failures from [`Walker::validate_root`]
    /// - [`ScanError::Interrupted`] if the shutdown flag was raised; no
    ///   progress is reported after that point
    pub fn scan(&self) -> Result<(Vec<FileRecord>, WalkSummary), ScanError> {
        let start = Instant::now();
        self.validate_root()?;

        if let Some(ref callback) = self.progress_callback {
            callback.on_phase_start(PHASE_WALK, 0);
        }
        log::info!("Scanning {}", self.root.display());

        let mut files = Vec::new();
        let mut summary = WalkSummary::default();
        let interval = self.config.progress_interval.max(1);

        let walk = WalkDir::new(&self.root)
            .follow_links(self.config.follow_symlinks)
            .sort_by_file_name();

        for entry in walk {
            if self.is_shutdown_requested() {
                log::debug!("Walker: shutdown requested, stopping traversal");
                return Err(ScanError::Interrupted);
            }

            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    if err.depth() == 0 {
                        return Err(self.root_failure(err));
                    }
                    summary.skipped += 1;
                    self.report_skip(&err);
                    continue;
                }
            };

            let file_type = entry.file_type();
            if file_type.is_dir() {
                summary.directories += 1;
                self.report(summary.files_accepted, entry.path());
                continue;
            }
            if !file_type.is_file() {
                log::trace!("Skipping non-regular entry: {}", entry.path().display());
                continue;
            }

            summary.files_seen += 1;
            let metadata = match entry.metadata() {
                Ok(metadata) => metadata,
                Err(err) => {
                    summary.skipped += 1;
                    self.report_skip(&err);
                    continue;
                }
            };

            let size = metadata.len();
            if self.filter.include(entry.path(), size) {
                let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
                files.push(FileRecord::new(entry.into_path(), size, modified));
                summary.files_accepted += 1;
            } else {
                log::trace!("Filtered out: {}", entry.path().display());
            }

            if summary.files_seen % interval == 0 {
                if let Some(ref callback) = self.progress_callback {
                    callback.on_message(&format!("Scanned {} files", summary.files_seen));
                }
            }
        }

        summary.duration = start.elapsed();
        if let Some(ref callback) = self.progress_callback {
            callback.on_phase_end(PHASE_WALK);
        }
        log::info!(
            "Scan complete: {} candidates from {} files in {} directories ({} skipped) in {:.2?}",
            summary.files_accepted,
            summary.files_seen,
            summary.directories,
            summary.skipped,
            summary.duration
        );

        Ok((files, summary))
    }

    fn report(&self, accepted: usize, dir: &Path) {
        if let Some(ref callback) = self.progress_callback {
            callback.on_progress(accepted, dir.to_string_lossy().as_ref());
        }
    }

    fn report_skip(&self, err: &walkdir::Error) {
        let path = err
            .path()
            .map_or_else(|| self.root.clone(), Path::to_path_buf);
        let reason = if err.loop_ancestor().is_some() {
            "symlink loop".to_string()
        } else {
            match err.io_error().map(std::io::Error::kind) {
                Some(std::io::ErrorKind::PermissionDenied) => "permission denied".to_string(),
                _ => err.to_string(),
            }
        };
        log::warn!("Skipping {}: {}", path.display(), reason);
        if let Some(ref callback) = self.progress_callback {
            callback.on_message(&format!("Skipped {}: {}", path.display(), reason));
        }
    }

    fn root_failure(&self, err: walkdir::Error) -> ScanError {
        let path = err
            .path()
            .map_or_else(|| self.root.clone(), Path::to_path_buf);
        match err.into_io_error() {
            Some(io) => ScanError::from_io(&path, io),
            None => ScanError::Io {
                path,
                source: std::io::Error::other("walk failed at root"),
            },
        }
    }
}
