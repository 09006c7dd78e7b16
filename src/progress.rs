//! Progress reporting.
//!
//! Core components report through the [`ProgressCallback`] trait in phase
//! terms: a phase starts with a known (or unknown, `0`) total, items are
//! reported by ordinal, free-form messages can be attached. A
//! [`ProgressPlan`] maps each phase onto a slice of a 0-100 percent budget,
//! which is what event consumers see.
//!
//! [`ConsoleProgress`] renders percent updates as an indicatif bar for the
//! command-line driver.

use std::sync::Mutex;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

/// Phase name for directory traversal.
pub const PHASE_WALK: &str = "walking";
/// Phase name for size bucketing.
pub const PHASE_GROUP: &str = "grouping";
/// Phase name for content hashing.
pub const PHASE_HASH: &str = "hashing";

/// Progress callback for pipeline phases.
///
/// Implement this trait to receive progress updates during traversal and
/// duplicate detection.
pub trait ProgressCallback: Send + Sync {
    /// Called when a phase starts.
    ///
    /// # Arguments
    ///
    /// * `phase` - One of [`PHASE_WALK`], [`PHASE_GROUP`], [`PHASE_HASH`]
    /// * `total` - Number of units in the phase, `0` when unknown
    fn on_phase_start(&self, phase: &str, total: usize);

    /// Called when a unit of work completes.
    ///
    /// # Arguments
    ///
    /// * `current` - Units completed so far
    /// * `item` - Path or label of the unit
    fn on_progress(&self, current: usize, item: &str);

    /// Called when a phase completes.
    fn on_phase_end(&self, phase: &str);

    /// Called with a free-form status message (skipped files, counts).
    fn on_message(&self, _message: &str) {}
}

/// Percent budget assigned to each phase, as `(start, end)` pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressPlan {
    /// Range for [`PHASE_WALK`].
    pub walk: (u8, u8),
    /// Range for [`PHASE_GROUP`].
    pub group: (u8, u8),
    /// Range for [`PHASE_HASH`].
    pub hash: (u8, u8),
}

impl ProgressPlan {
    /// Traversal alone.
    pub const SCAN_ONLY: Self = Self {
        walk: (0, 100),
        group: (100, 100),
        hash: (100, 100),
    };

    /// Duplicate detection over an existing file list.
    pub const FIND_ONLY: Self = Self {
        walk: (0, 0),
        group: (0, 30),
        hash: (30, 100),
    };

    /// Traversal followed by duplicate detection.
    pub const COMBINED: Self = Self {
        walk: (0, 40),
        group: (40, 50),
        hash: (50, 100),
    };

    /// Range for a phase name; unknown phases map to an empty range at 0.
    #[must_use]
    pub fn range(&self, phase: &str) -> (u8, u8) {
        match phase {
            PHASE_WALK => self.walk,
            PHASE_GROUP => self.group,
            PHASE_HASH => self.hash,
            _ => (0, 0),
        }
    }

    /// Percent for `current` of `total` units within `phase`.
    ///
    /// An unknown total (`0`) pins the value to the start of the range.
    #[must_use]
    pub fn percent(&self, phase: &str, current: usize, total: usize) -> u8 {
        let (start, end) = self.range(phase);
        if total == 0 || end <= start {
            return start;
        }
        let span = u64::from(end - start);
        let done = current.min(total) as u64;
        let offset = span * done / total as u64;
        start + u8::try_from(offset).unwrap_or(end - start)
    }
}

/// Terminal progress bar driven by percent updates.
pub struct ConsoleProgress {
    bar: Mutex<Option<ProgressBar>>,
    quiet: bool,
}

impl ConsoleProgress {
    /// Create a new console reporter.
    ///
    /// # Examples
    ///
    /// ```
    /// use filesweeper::progress::ConsoleProgress;
    ///
    /// let progress = ConsoleProgress::new(true);
    /// progress.update(10, "Scanning");
    /// progress.finish("done");
    /// ```
    #[must_use]
    pub fn new(quiet: bool) -> Self {
        Self {
            bar: Mutex::new(None),
            quiet,
        }
    }

    fn style() -> ProgressStyle {
        ProgressStyle::with_template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>3}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█>-")
    }

    /// Move the bar to `percent` and show `message`.
    pub fn update(&self, percent: u8, message: &str) {
        if self.quiet {
            return;
        }
        let Ok(mut guard) = self.bar.lock() else {
            return;
        };
        let bar = guard.get_or_insert_with(|| {
            let bar = ProgressBar::new(100);
            bar.set_style(Self::style());
            bar.enable_steady_tick(Duration::from_millis(120));
            bar
        });
        bar.set_position(u64::from(percent.min(100)));
        bar.set_message(truncate_path(message, 60));
    }

    /// Complete the bar with a final message.
    pub fn finish(&self, message: &str) {
        if let Ok(mut guard) = self.bar.lock() {
            if let Some(bar) = guard.take() {
                bar.set_position(100);
                bar.finish_with_message(message.to_string());
            }
        }
    }

    /// Stop the bar where it is (cancellation or error).
    pub fn abandon(&self, message: &str) {
        if let Ok(mut guard) = self.bar.lock() {
            if let Some(bar) = guard.take() {
                bar.abandon_with_message(message.to_string());
            }
        }
    }
}

/// Truncate a path-like message for display in the progress bar.
fn truncate_path(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        return text.to_string();
    }

    let file_name = std::path::Path::new(text)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let name_len = file_name.chars().count();
    if file_name.is_empty() || name_len >= max_len {
        let tail: String = text.chars().skip(text.chars().count() - (max_len - 3)).collect();
        return format!("...{tail}");
    }

    format!(".../{file_name}")
}
