//! FileSweeper - content-based duplicate file detection.
//!
//! The library walks a directory tree, filters candidates by size and type,
//! buckets them by size, hashes the surviving buckets on a bounded worker
//! pool (backed by a persistent hash cache) and reports files sharing a
//! content hash. [`controller::ScanController`] runs these pipelines in the
//! background and streams progress events; the `filesweeper` binary is a
//! thin terminal front end over it.

pub mod cache;
pub mod cli;
pub mod config;
pub mod controller;
pub mod duplicates;
pub mod error;
pub mod logging;
pub mod progress;
pub mod scanner;
pub mod signal;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError};

use crate::cache::HashCache;
use crate::cli::{
    CacheAction, CacheArgs, Cli, Commands, ConfigAction, ConfigArgs, OutputFormat, ScanArgs,
};
use crate::config::Config;
use crate::controller::{FindReport, PipelineEvent, ScanController};
use crate::duplicates::FinderError;
use crate::error::ExitCode;
use crate::progress::ConsoleProgress;
use crate::signal::{install_ctrlc_handler, CancelToken};

const EVENT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Run the command described by `cli`.
///
/// # Errors
///
/// Returns an error for invalid roots, failed pipelines, interruption
/// ([`FinderError::Interrupted`]) and cache or config file failures.
pub fn run_app(cli: Cli) -> Result<ExitCode> {
    logging::init_logging(cli.verbose, cli.quiet);
    let mut config = load_config(cli.config.as_deref());

    match cli.command {
        Commands::Scan(ref args) => {
            args.apply_to(&mut config);
            handle_scan(args, &config, cli.quiet)
        }
        Commands::Cache(ref args) => handle_cache(args, &config),
        Commands::Config(ref args) => handle_config(args, &config, cli.config.as_deref()),
    }
}

fn load_config(explicit: Option<&Path>) -> Config {
    let loaded = match explicit {
        Some(path) => Config::load_from_path(Some(path)),
        None => Config::load(),
    };
    match loaded {
        Ok(config) => config,
        Err(e) => {
            log::warn!("{:#}; using default settings", e);
            Config::default()
        }
    }
}

fn handle_scan(args: &ScanArgs, config: &Config, quiet: bool) -> Result<ExitCode> {
    let token = match install_ctrlc_handler() {
        Ok(token) => token,
        Err(e) => {
            log::warn!("{}; Ctrl+C will terminate immediately", e);
            CancelToken::new()
        }
    };

    let controller = if config.optimization.cache_hashes {
        ScanController::from_config(config)
    } else {
        ScanController::new().with_walker_config(config.walker_config())
    };
    log::info!(
        "Scanning {} (filter: {}, fast scan: {})",
        args.path.display(),
        config.filter.file_type,
        config.optimization.fast_scan_mode
    );

    let events = controller.run_pipeline(
        &args.path,
        config.filter.clone(),
        config.optimization.clone(),
    );
    let progress = ConsoleProgress::new(quiet || args.output == OutputFormat::Json);
    let mut stop_requested = false;

    loop {
        let Some(event) = next_event(&events, &token, &mut stop_requested, || {
            controller.stop_scan();
        }) else {
            bail!("Pipeline ended without a result");
        };

        match event {
            PipelineEvent::Started => log::debug!("Pipeline started"),
            PipelineEvent::Progress { percent, message } => progress.update(percent, &message),
            PipelineEvent::Finished(report) => {
                progress.finish("Done");
                print_report(&report, args.output)?;
                return Ok(if report.duplicates.is_empty() {
                    ExitCode::NoDuplicates
                } else {
                    ExitCode::Success
                });
            }
            PipelineEvent::Cancelled => {
                progress.abandon("Cancelled");
                return Err(FinderError::Interrupted.into());
            }
            PipelineEvent::Error(message) => {
                progress.abandon("Failed");
                bail!(message);
            }
        }
    }
}

/// Wait for the next pipeline event, calling `stop` once as soon as `token`
/// is cancelled. Returns `None` when the stream disconnects.
fn next_event<T>(
    events: &Receiver<PipelineEvent<T>>,
    token: &CancelToken,
    stop_requested: &mut bool,
    stop: impl Fn(),
) -> Option<PipelineEvent<T>> {
    loop {
        if token.is_cancelled() && !*stop_requested {
            stop();
            *stop_requested = true;
        }
        match events.recv_timeout(EVENT_POLL_INTERVAL) {
            Ok(event) => return Some(event),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => return None,
        }
    }
}

fn print_report(report: &FindReport, format: OutputFormat) -> Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    match format {
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut out, report).context("Failed to write report")?;
            writeln!(out)?;
        }
        OutputFormat::Text => {
            for group in &report.groups {
                writeln!(
                    out,
                    "{} ({} files, {} each)",
                    group.hash_hex(),
                    group.len(),
                    bytesize::ByteSize(group.size)
                )?;
                for path in &group.paths {
                    writeln!(out, "  {}", path.display())?;
                }
                writeln!(out)?;
            }
            let summary = &report.summary;
            writeln!(
                out,
                "{} duplicate groups, {} duplicate files, {} reclaimable ({} files scanned in {:.2?})",
                summary.duplicate_groups,
                summary.duplicate_files,
                summary.reclaimable_display(),
                summary.input_files,
                summary.duration
            )?;
            if summary.failed_files > 0 {
                writeln!(out, "{} files could not be read", summary.failed_files)?;
            }
        }
    }
    Ok(())
}

fn handle_cache(args: &CacheArgs, config: &Config) -> Result<ExitCode> {
    let mut settings = config.cache.clone();
    if let Some(ref path) = args.cache_file {
        settings.path = Some(path.clone());
    }
    let path: PathBuf = settings.resolved_path();
    let cache = HashCache::open(&path, settings);

    match args.action {
        CacheAction::Info => {
            let on_disk = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
            println!("Cache file: {}", path.display());
            println!("Entries:    {}", cache.len());
            println!("Size:       {}", bytesize::ByteSize(on_disk));
            println!(
                "Limits:     {} entries (pruned to {}), {} h freshness",
                cache.settings().max_entries,
                cache.settings().prune_to,
                cache.settings().max_age_hours
            );
        }
        CacheAction::Clear => {
            let removed = cache.len();
            cache.clear();
            cache
                .save()
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Removed {} entries from {}", removed, path.display());
        }
    }
    Ok(ExitCode::Success)
}

fn handle_config(args: &ConfigArgs, config: &Config, explicit: Option<&Path>) -> Result<ExitCode> {
    let path = explicit.map(Path::to_path_buf).or_else(Config::config_path);

    match args.action {
        ConfigAction::Path => match path {
            Some(path) => println!("{}", path.display()),
            None => bail!("No configuration directory available"),
        },
        ConfigAction::Show => {
            let content =
                toml::to_string_pretty(config).context("Failed to render configuration")?;
            print!("{content}");
        }
        ConfigAction::Init { force } => {
            let Some(path) = path else {
                bail!("No configuration directory available; pass --config");
            };
            if path.exists() && !force {
                bail!("{} already exists; use --force to overwrite", path.display());
            }
            Config::default().save(&path)?;
            log::info!("Wrote default configuration to {}", path.display());
            println!("Wrote {}", path.display());
        }
    }
    Ok(ExitCode::Success)
}
