//! Background pipelines with event streams.
//!
//! [`ScanController`] is the entry point for front ends. Each operation
//! runs on its own background thread and returns a channel of
//! [`PipelineEvent`]s:
//!
//! - `Started` is always first
//! - any number of `Progress { percent, message }` follow, with `percent`
//!   never decreasing
//! - exactly one terminal event (`Finished`, `Cancelled` or `Error`) ends
//!   the stream, after which the channel disconnects
//!
//! No `Progress` is sent once cancellation has been observed.
//!
//! # Example
//!
//! ```no_run
//! use filesweeper::config::OptimizationConfig;
//! use filesweeper::controller::{PipelineEvent, ScanController};
//! use filesweeper::scanner::FilterConfig;
//! use std::path::Path;
//!
//! let controller = ScanController::new();
//! let events = controller.run_pipeline(
//!     Path::new("/data"),
//!     FilterConfig::default(),
//!     OptimizationConfig::default(),
//! );
//! for event in events {
//!     match event {
//!         PipelineEvent::Progress { percent, message } => println!("{percent:>3}% {message}"),
//!         PipelineEvent::Finished(report) => println!("{} groups", report.duplicates.len()),
//!         _ => {}
//!     }
//! }
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::Serialize;

use crate::cache::HashCache;
use crate::config::{Config, OptimizationConfig};
use crate::duplicates::{
    to_duplicate_map, DuplicateFinder, DuplicateMap, FindSummary, FinderConfig, FinderError,
    HashGroup, SystemProfile,
};
use crate::progress::{ProgressCallback, ProgressPlan, PHASE_GROUP, PHASE_HASH, PHASE_WALK};
use crate::scanner::{FilterConfig, PathFilter, Walker, WalkerConfig};
use crate::signal::CancelToken;

/// One event of a pipeline stream.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent<T> {
    /// The pipeline thread is running.
    Started,
    /// Progress within the overall 0-100 budget.
    Progress {
        /// Overall completion percent
        percent: u8,
        /// Human-readable status
        message: String,
    },
    /// Completed with a result.
    Finished(T),
    /// Stopped by a cancellation request.
    Cancelled,
    /// Stopped by an unrecoverable failure.
    Error(String),
}

impl<T> PipelineEvent<T> {
    /// Whether this event ends the stream.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished(_) | Self::Cancelled | Self::Error(_))
    }
}

/// Result of a duplicate search.
#[derive(Debug, Clone, Serialize)]
pub struct FindReport {
    /// Hex hash to duplicate paths
    pub duplicates: DuplicateMap,
    /// The same groups with their file size, largest first
    pub groups: Vec<HashGroup>,
    /// Counters for the run
    pub summary: FindSummary,
}

impl PartialEq for FindReport {
    fn eq(&self, other: &Self) -> bool {
        self.duplicates == other.duplicates && self.groups == other.groups
    }
}

/// Events of [`ScanController::start_scan`].
pub type ScanEvent = PipelineEvent<Vec<PathBuf>>;

/// Events of [`ScanController::find_duplicates`] and
/// [`ScanController::run_pipeline`].
pub type FindEvent = PipelineEvent<FindReport>;

/// Lifecycle of the most recently started pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PipelineState {
    /// Nothing has run yet.
    Idle = 0,
    /// Walking the directory tree.
    Traversing = 1,
    /// Bucketing candidates by size.
    SizeGrouping = 2,
    /// Hashing candidates.
    Hashing = 3,
    /// Finished successfully.
    Done = 4,
    /// Stopped by cancellation.
    Cancelled = 5,
    /// Stopped by an error.
    Errored = 6,
}

impl PipelineState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Traversing,
            2 => Self::SizeGrouping,
            3 => Self::Hashing,
            4 => Self::Done,
            5 => Self::Cancelled,
            6 => Self::Errored,
            _ => Self::Idle,
        }
    }

    /// Whether the state is `Done`, `Cancelled` or `Errored`.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Cancelled | Self::Errored)
    }
}

/// Runs scans and duplicate searches off the caller's thread.
pub struct ScanController {
    cache: Option<Arc<HashCache>>,
    walker_config: WalkerConfig,
    profile: Option<SystemProfile>,
    scan_token: Mutex<CancelToken>,
    find_token: Mutex<CancelToken>,
    state: Arc<AtomicU8>,
}

impl fmt::Debug for ScanController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanController")
            .field("cache", &self.cache.as_ref().and_then(|c| c.path()))
            .field("walker_config", &self.walker_config)
            .field("profile", &self.profile)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Default for ScanController {
    fn default() -> Self {
        Self::new()
    }
}

impl ScanController {
    /// Controller without a hash cache, using default traversal settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            cache: None,
            walker_config: WalkerConfig::default(),
            profile: None,
            scan_token: Mutex::new(CancelToken::new()),
            find_token: Mutex::new(CancelToken::new()),
            state: Arc::new(AtomicU8::new(PipelineState::Idle as u8)),
        }
    }

    /// Controller configured from application settings.
    ///
    /// Opens (and loads) the persistent hash cache named by the settings.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let cache = HashCache::open_default(config.cache.clone());
        log::debug!(
            "Hash cache at {} holds {} entries",
            config.cache.resolved_path().display(),
            cache.len()
        );
        Self::new()
            .with_cache(Arc::new(cache))
            .with_walker_config(config.walker_config())
    }

    /// Use `cache` for searches with `cache_hashes` enabled.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<HashCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Set traversal options.
    #[must_use]
    pub fn with_walker_config(mut self, config: WalkerConfig) -> Self {
        self.walker_config = config;
        self
    }

    /// Use a fixed resource profile for worker sizing.
    #[must_use]
    pub fn with_profile(mut self, profile: SystemProfile) -> Self {
        self.profile = Some(profile);
        self
    }

    /// The shared hash cache, if any.
    #[must_use]
    pub fn cache(&self) -> Option<&Arc<HashCache>> {
        self.cache.as_ref()
    }

    /// State of the most recently started pipeline.
    #[must_use]
    pub fn state(&self) -> PipelineState {
        PipelineState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Walk `root` and stream the accepted file paths.
    pub fn start_scan(&self, root: &Path, filter: FilterConfig) -> Receiver<ScanEvent> {
        let token = CancelToken::new();
        replace_token(&self.scan_token, &token);

        let walker = self.walker(root, &filter, &token);
        self.spawn(token, ProgressPlan::SCAN_ONLY, move |progress| {
            let (records, _) = walker.with_progress_callback(progress).scan()?;
            Ok(records.into_iter().map(|r| r.path).collect())
        })
    }

    /// Request cancellation of the running scan.
    pub fn stop_scan(&self) {
        log::debug!("Scan cancellation requested");
        current_token(&self.scan_token).cancel();
    }

    /// Find duplicates among `files` and stream the report.
    pub fn find_duplicates(
        &self,
        files: Vec<PathBuf>,
        options: OptimizationConfig,
    ) -> Receiver<FindEvent> {
        let token = CancelToken::new();
        replace_token(&self.find_token, &token);

        let finder_config = self.finder_config(&options, &token);
        self.spawn(token, ProgressPlan::FIND_ONLY, move |progress| {
            let finder = DuplicateFinder::new(finder_config.with_progress_callback(progress));
            let (groups, summary) = finder.find_duplicates(&files)?;
            Ok(report(groups, summary))
        })
    }

    /// Request cancellation of the running duplicate search.
    pub fn stop_find(&self) {
        log::debug!("Duplicate search cancellation requested");
        current_token(&self.find_token).cancel();
    }

    /// Walk `root` and find duplicates among the accepted files in one run.
    ///
    /// Either [`ScanController::stop_scan`] or
    /// [`ScanController::stop_find`] cancels it.
    pub fn run_pipeline(
        &self,
        root: &Path,
        filter: FilterConfig,
        options: OptimizationConfig,
    ) -> Receiver<FindEvent> {
        let token = CancelToken::new();
        replace_token(&self.scan_token, &token);
        replace_token(&self.find_token, &token);

        let walker = self.walker(root, &filter, &token);
        let finder_config = self.finder_config(&options, &token);
        self.spawn(token, ProgressPlan::COMBINED, move |progress| {
            let (records, _) = walker.with_progress_callback(Arc::clone(&progress)).scan()?;
            let finder = DuplicateFinder::new(finder_config.with_progress_callback(progress));
            let (groups, summary) = finder.find_in_records(records)?;
            Ok(report(groups, summary))
        })
    }

    fn walker(&self, root: &Path, filter: &FilterConfig, token: &CancelToken) -> Walker {
        Walker::new(root, PathFilter::new(filter))
            .with_config(self.walker_config.clone())
            .with_shutdown_flag(token.flag())
    }

    fn finder_config(&self, options: &OptimizationConfig, token: &CancelToken) -> FinderConfig {
        let mut config = FinderConfig::from_optimization(options).with_shutdown_flag(token.flag());
        if let Some(profile) = self.profile {
            config = config.with_profile(profile);
        }
        if options.cache_hashes {
            if let Some(ref cache) = self.cache {
                config = config.with_cache(Arc::clone(cache));
            }
        }
        config
    }

    /// Run `job` on a new thread, framing its outcome with `Started` and
    /// one terminal event.
    fn spawn<T, F>(
        &self,
        token: CancelToken,
        plan: ProgressPlan,
        job: F,
    ) -> Receiver<PipelineEvent<T>>
    where
        T: Send + 'static,
        F: FnOnce(Arc<dyn ProgressCallback>) -> Result<T, FinderError> + Send + 'static,
    {
        let (tx, rx) = unbounded();
        let state = Arc::clone(&self.state);
        state.store(PipelineState::Idle as u8, Ordering::SeqCst);

        let worker_tx = tx.clone();
        let spawned = thread::Builder::new()
            .name("filesweeper-pipeline".to_string())
            .spawn(move || {
                let _ = worker_tx.send(PipelineEvent::Started);
                let progress = Arc::new(EventProgress::new(
                    worker_tx.clone(),
                    plan,
                    token.clone(),
                    Arc::clone(&state),
                ));
                let outcome = job(progress);
                let terminal = terminal_event(outcome, &token);
                let final_state = match terminal {
                    PipelineEvent::Finished(_) => PipelineState::Done,
                    PipelineEvent::Cancelled => PipelineState::Cancelled,
                    _ => PipelineState::Errored,
                };
                state.store(final_state as u8, Ordering::SeqCst);
                let _ = worker_tx.send(terminal);
            });

        if let Err(e) = spawned {
            log::error!("Failed to start pipeline thread: {}", e);
            self.state
                .store(PipelineState::Errored as u8, Ordering::SeqCst);
            let _ = tx.send(PipelineEvent::Started);
            let _ = tx.send(PipelineEvent::Error(format!(
                "Failed to start pipeline thread: {e}"
            )));
        }
        rx
    }
}

fn report(groups: Vec<HashGroup>, summary: FindSummary) -> FindReport {
    FindReport {
        duplicates: to_duplicate_map(&groups),
        groups,
        summary,
    }
}

fn terminal_event<T>(outcome: Result<T, FinderError>, token: &CancelToken) -> PipelineEvent<T> {
    match outcome {
        Ok(_) if token.is_cancelled() => {
            log::info!("Pipeline cancelled after completion, discarding result");
            PipelineEvent::Cancelled
        }
        Ok(result) => PipelineEvent::Finished(result),
        Err(FinderError::Interrupted) => {
            log::info!("Pipeline cancelled");
            PipelineEvent::Cancelled
        }
        Err(e) => {
            log::error!("Pipeline failed: {}", e);
            PipelineEvent::Error(e.to_string())
        }
    }
}

fn replace_token(slot: &Mutex<CancelToken>, token: &CancelToken) {
    *slot.lock().unwrap_or_else(PoisonError::into_inner) = token.clone();
}

fn current_token(slot: &Mutex<CancelToken>) -> CancelToken {
    slot.lock().unwrap_or_else(PoisonError::into_inner).clone()
}

/// Translates phase callbacks into percent events.
struct EventProgress<T> {
    tx: Sender<PipelineEvent<T>>,
    plan: ProgressPlan,
    token: CancelToken,
    state: Arc<AtomicU8>,
    phase: Mutex<(&'static str, usize)>,
    last_percent: AtomicU8,
}

impl<T> EventProgress<T> {
    fn new(
        tx: Sender<PipelineEvent<T>>,
        plan: ProgressPlan,
        token: CancelToken,
        state: Arc<AtomicU8>,
    ) -> Self {
        Self {
            tx,
            plan,
            token,
            state,
            phase: Mutex::new(("", 0)),
            last_percent: AtomicU8::new(0),
        }
    }

    fn emit(&self, percent: u8, message: String) {
        if self.token.is_cancelled() {
            return;
        }
        let percent = self.last_percent.fetch_max(percent, Ordering::SeqCst).max(percent);
        let _ = self.tx.send(PipelineEvent::Progress { percent, message });
    }

    fn current_phase(&self) -> (&'static str, usize) {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn known_phase(phase: &str) -> Option<(&'static str, PipelineState, &'static str)> {
    match phase {
        PHASE_WALK => Some((PHASE_WALK, PipelineState::Traversing, "Scanning files")),
        PHASE_GROUP => Some((PHASE_GROUP, PipelineState::SizeGrouping, "Grouping files by size")),
        PHASE_HASH => Some((PHASE_HASH, PipelineState::Hashing, "Hashing candidates")),
        _ => None,
    }
}

impl<T: Send> ProgressCallback for EventProgress<T> {
    fn on_phase_start(&self, phase: &str, total: usize) {
        let Some((name, state, label)) = known_phase(phase) else {
            return;
        };
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner) = (name, total);
        self.state.store(state as u8, Ordering::SeqCst);

        let message = if total > 0 {
            format!("{label} ({total})")
        } else {
            format!("{label}...")
        };
        self.emit(self.plan.range(name).0, message);
    }

    fn on_progress(&self, current: usize, item: &str) {
        let (phase, total) = self.current_phase();
        let message = if phase == PHASE_WALK {
            format!("Scanning {item}")
        } else {
            item.to_string()
        };
        self.emit(self.plan.percent(phase, current, total), message);
    }

    fn on_phase_end(&self, phase: &str) {
        let Some((name, _, label)) = known_phase(phase) else {
            return;
        };
        self.emit(self.plan.range(name).1, format!("{label} complete"));
    }

    fn on_message(&self, message: &str) {
        self.emit(self.last_percent.load(Ordering::SeqCst), message.to_string());
    }
}
