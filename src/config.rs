//! Layered application configuration.
//!
//! Settings are merged from, lowest priority first:
//!
//! 1. Built-in defaults
//! 2. A TOML file (the per-user config file, or `--config`)
//! 3. `FILESWEEPER_`-prefixed environment variables, with `__` separating
//!    nested keys (`FILESWEEPER_OPTIMIZATION__FAST_SCAN_MODE=true`)
//!
//! Command-line flags are applied on top by the binary.
//!
//! ```toml
//! follow_symlinks = false
//!
//! [filter]
//! min_size_kb = 4
//! file_type = "custom"
//! custom_extensions = "jpg,png,raw"
//!
//! [optimization]
//! fast_scan_mode = true
//! fast_scan_size_mb = 8
//!
//! [cache]
//! max_age_hours = 48
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::cache::CacheSettings;
use crate::scanner::{FilterConfig, HashMode, WalkerConfig, DEFAULT_FAST_SCAN_MB};

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "FILESWEEPER_";

/// Config file name inside the per-user config directory.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Hashing and scheduling options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizationConfig {
    /// Hash only a prefix of each file.
    pub fast_scan_mode: bool,
    /// Prefix size in MB for fast-scan mode.
    pub fast_scan_size_mb: u64,
    /// Use the per-file parallel hashing tier for large workloads.
    pub use_multiprocessing: bool,
    /// Memory-map very large files.
    pub use_mmap: bool,
    /// Read and write the persistent hash cache.
    pub cache_hashes: bool,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            fast_scan_mode: false,
            fast_scan_size_mb: DEFAULT_FAST_SCAN_MB,
            use_multiprocessing: false,
            use_mmap: true,
            cache_hashes: true,
        }
    }
}

impl OptimizationConfig {
    /// Hashing mode selected by these options.
    #[must_use]
    pub fn hash_mode(&self) -> HashMode {
        HashMode::from_settings(self.fast_scan_mode, self.fast_scan_size_mb)
    }
}

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Follow symbolic links to directories during traversal.
    pub follow_symlinks: bool,
    /// Size and type filters.
    pub filter: FilterConfig,
    /// Hashing options.
    pub optimization: OptimizationConfig,
    /// Hash cache bounds and location.
    pub cache: CacheSettings,
}

impl Config {
    /// Load from the per-user config file and the environment.
    ///
    /// # Errors
    ///
    /// Fails if the file or an environment variable holds a value of the
    /// wrong type.
    pub fn load() -> Result<Self> {
        Self::load_from_path(Self::config_path().as_deref())
    }

    /// Load from `path` (skipped if `None` or missing) and the environment.
    ///
    /// # Errors
    ///
    /// See [`Config::load`].
    pub fn load_from_path(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = path {
            log::debug!("Reading configuration from {}", path.display());
            figment = figment.merge(Toml::file(path));
        }
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config: Self = figment.extract().context("Invalid configuration")?;
        log::debug!("Loaded configuration: {:?}", config);
        Ok(config)
    }

    /// Write this configuration as TOML to `path`, creating parent
    /// directories as needed.
    ///
    /// # Errors
    ///
    /// Fails on serialization or I/O errors.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    /// Per-user config file path, `None` if no home directory is known.
    #[must_use]
    pub fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "filesweeper", "filesweeper")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    /// Traversal options derived from this configuration.
    #[must_use]
    pub fn walker_config(&self) -> WalkerConfig {
        WalkerConfig {
            follow_symlinks: self.follow_symlinks,
            ..WalkerConfig::default()
        }
    }
}
