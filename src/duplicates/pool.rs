//! Worker pool for hash computation.
//!
//! Hash tasks run on a dedicated rayon thread pool whose size comes from a
//! policy over CPU count, operating system and installed memory. Results
//! are sent back over a channel and handed to the caller in completion
//! order, on the caller's thread.

use std::fmt;

use crossbeam_channel::unbounded;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::Serialize;
use sysinfo::System;

use super::FinderError;

const GIB: u64 = 1024 * 1024 * 1024;

/// Operating system family, as far as the worker policy cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Platform {
    /// macOS
    MacOs,
    /// Windows
    Windows,
    /// Linux and other Unix-likes
    Other,
}

impl Platform {
    /// Platform of the running binary.
    #[must_use]
    pub fn current() -> Self {
        if cfg!(target_os = "macos") {
            Self::MacOs
        } else if cfg!(windows) {
            Self::Windows
        } else {
            Self::Other
        }
    }
}

/// Snapshot of the resources relevant to worker sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SystemProfile {
    /// Logical CPUs available to this process
    pub cpus: usize,
    /// Installed memory in bytes
    pub total_memory: u64,
    /// Memory currently available in bytes
    pub available_memory: u64,
    /// OS family
    pub platform: Platform,
}

impl SystemProfile {
    /// Detect the resources of the running machine.
    #[must_use]
    pub fn detect() -> Self {
        let cpus = std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
        let mut system = System::new();
        system.refresh_memory();
        Self {
            cpus,
            total_memory: system.total_memory(),
            available_memory: system.available_memory(),
            platform: Platform::current(),
        }
    }
}

impl fmt::Display for SystemProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} CPUs, {} total / {} available memory, {:?}",
            self.cpus,
            bytesize::ByteSize(self.total_memory),
            bytesize::ByteSize(self.available_memory),
            self.platform
        )
    }
}

/// Scheduling tier for hashing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum WorkerMode {
    /// One task per size bucket on `max(4, cpus)` threads.
    #[default]
    Threaded,
    /// One task per file on an OS and memory aware number of threads.
    Parallel,
}

/// Number of workers to use for `tasks` queued units of work.
///
/// - `Threaded`: `max(4, cpus)`
/// - `Parallel`: macOS `min(cpus, 4)`, Windows `min(cpus + 2, 8)`, others
///   `min(cpus + 2, 12)` with more than 8 GiB of memory, else `min(cpus, 6)`
///
/// The result never exceeds the task count and is at least 1. A threaded
/// schedule queues one task per size bucket, a parallel one a task per file.
#[must_use]
pub fn worker_count(mode: WorkerMode, profile: &SystemProfile, tasks: usize) -> usize {
    let cpus = profile.cpus.max(1);
    let policy = match mode {
        WorkerMode::Threaded => cpus.max(4),
        WorkerMode::Parallel => match profile.platform {
            Platform::MacOs => cpus.min(4),
            Platform::Windows => (cpus + 2).min(8),
            Platform::Other if profile.total_memory > 8 * GIB => (cpus + 2).min(12),
            Platform::Other => cpus.min(6),
        },
    };
    policy.min(tasks).max(1)
}

/// Bounded pool of hashing threads.
pub struct WorkerPool {
    pool: ThreadPool,
    workers: usize,
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("workers", &self.workers)
            .finish_non_exhaustive()
    }
}

impl WorkerPool {
    /// Build a pool with `workers` threads.
    ///
    /// # Errors
    ///
    /// Returns [`FinderError::Pool`] if the threads cannot be spawned.
    pub fn new(workers: usize) -> Result<Self, FinderError> {
        let workers = workers.max(1);
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("filesweeper-hash-{i}"))
            .build()
            .map_err(|e| FinderError::Pool(e.to_string()))?;
        Ok(Self { pool, workers })
    }

    /// Number of worker threads.
    #[must_use]
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run `job` over every task and feed each result to `collect` as soon
    /// as it completes.
    ///
    /// `collect` runs on the calling thread, never concurrently with
    /// itself. Returns once every task has reported.
    pub fn run<T, R, F, C>(&self, tasks: Vec<T>, job: F, mut collect: C)
    where
        T: Send,
        R: Send,
        F: Fn(T) -> R + Send + Sync,
        C: FnMut(R),
    {
        let (tx, rx) = unbounded();
        let job = &job;
        self.pool.in_place_scope(|scope| {
            for task in tasks {
                let tx = tx.clone();
                scope.spawn(move |_| {
                    // The receiver outlives the scope, so send cannot fail.
                    let _ = tx.send(job(task));
                });
            }
            drop(tx);
            for result in rx.iter() {
                collect(result);
            }
        });
    }
}
