//! Command-line interface definitions.
//!
//! Flags given on the command line override the layered configuration
//! (see [`crate::config`]); flags that are not given leave it untouched.
//!
//! # Example
//!
//! ```bash
//! # Find duplicates among images of at least 16 KB
//! filesweeper scan ~/Pictures --type image --min-size-kb 16
//!
//! # Fast scan, JSON output for scripting
//! filesweeper scan ~/Downloads --fast-scan --output json
//!
//! # Inspect or drop the hash cache
//! filesweeper cache info
//! filesweeper cache clear
//!
//! # Write a default config.toml, then print the effective settings
//! filesweeper config init
//! filesweeper config show
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::config::Config;
use crate::scanner::FileTypeFilter;

/// Content-based duplicate file finder.
#[derive(Debug, Parser)]
#[command(name = "filesweeper")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Configuration file (defaults to the per-user config.toml)
    #[arg(long, value_name = "FILE", global = true, env = "FILESWEEPER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Report errors as JSON on stderr
    #[arg(long, global = true)]
    pub json_errors: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Scan a directory for duplicate files
    Scan(ScanArgs),
    /// Inspect or clear the hash cache
    Cache(CacheArgs),
    /// Create or inspect the configuration file
    Config(ConfigArgs),
}

/// Arguments for the scan subcommand.
#[derive(Debug, Args)]
pub struct ScanArgs {
    /// Directory to scan
    #[arg(value_name = "PATH")]
    pub path: PathBuf,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,

    /// Minimum file size in KB (0 = no lower bound)
    #[arg(long, value_name = "KB")]
    pub min_size_kb: Option<u64>,

    /// Maximum file size in KB (0 = no upper bound)
    #[arg(long, value_name = "KB")]
    pub max_size_kb: Option<u64>,

    /// Only consider files of this category
    #[arg(long = "type", value_enum, value_name = "TYPE")]
    pub file_type: Option<FileTypeFilter>,

    /// Comma separated extensions for `--type custom` (e.g. "jpg,png,raw")
    #[arg(long, value_name = "LIST")]
    pub extensions: Option<String>,

    /// Follow symbolic links to directories
    #[arg(long)]
    pub follow_symlinks: bool,

    /// Hash only the first part of each file
    ///
    /// Files that agree in their first MB but differ later are reported as
    /// duplicates in this mode.
    #[arg(long)]
    pub fast_scan: bool,

    /// Prefix size in MB for --fast-scan
    #[arg(long, value_name = "MB")]
    pub fast_scan_size_mb: Option<u64>,

    /// Hash large workloads file by file on a wider worker pool
    #[arg(long)]
    pub parallel: bool,

    /// Never memory-map files
    #[arg(long)]
    pub no_mmap: bool,

    /// Neither read nor update the hash cache
    #[arg(long)]
    pub no_cache: bool,

    /// Use this cache file instead of the default location
    #[arg(long, value_name = "FILE", conflicts_with = "no_cache")]
    pub cache_file: Option<PathBuf>,
}

impl ScanArgs {
    /// Apply the flags that were given on top of `config`.
    pub fn apply_to(&self, config: &mut Config) {
        if self.follow_symlinks {
            config.follow_symlinks = true;
        }

        let filter = &mut config.filter;
        if let Some(kb) = self.min_size_kb {
            filter.min_size_kb = kb;
        }
        if let Some(kb) = self.max_size_kb {
            filter.max_size_kb = kb;
        }
        if let Some(ref list) = self.extensions {
            filter.custom_extensions = list.clone();
            filter.file_type = FileTypeFilter::Custom;
        }
        if let Some(file_type) = self.file_type {
            filter.file_type = file_type;
        }

        let optimization = &mut config.optimization;
        if self.fast_scan {
            optimization.fast_scan_mode = true;
        }
        if let Some(mb) = self.fast_scan_size_mb {
            optimization.fast_scan_size_mb = mb;
        }
        if self.parallel {
            optimization.use_multiprocessing = true;
        }
        if self.no_mmap {
            optimization.use_mmap = false;
        }
        if self.no_cache {
            optimization.cache_hashes = false;
        }
        if let Some(ref path) = self.cache_file {
            config.cache.path = Some(path.clone());
        }
    }
}

/// Arguments for the cache subcommand.
#[derive(Debug, Args)]
pub struct CacheArgs {
    /// Cache operation
    #[command(subcommand)]
    pub action: CacheAction,

    /// Use this cache file instead of the default location
    #[arg(long, value_name = "FILE", global = true)]
    pub cache_file: Option<PathBuf>,
}

/// Cache operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum CacheAction {
    /// Show location and entry count
    Info,
    /// Remove every entry
    Clear,
}

/// Arguments for the config subcommand.
#[derive(Debug, Args)]
pub struct ConfigArgs {
    /// Configuration operation
    #[command(subcommand)]
    pub action: ConfigAction,
}

/// Configuration file operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum ConfigAction {
    /// Write the default settings to the config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the effective settings as TOML
    Show,
    /// Print the config file location
    Path,
}

/// Result output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable listing
    Text,
    /// Machine-readable report
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}
