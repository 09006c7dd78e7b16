//! Path filtering by size bounds and file type.
//!
//! [`PathFilter`] is a pure predicate: given a path and a byte size it
//! decides whether the file is a duplicate candidate. It performs no I/O,
//! so it is safe to call from any thread and trivially testable.
//!
//! # Example
//!
//! ```
//! use filesweeper::scanner::{FileTypeFilter, FilterConfig, PathFilter};
//! use std::path::Path;
//!
//! let config = FilterConfig {
//!     min_size_kb: 1,
//!     file_type: FileTypeFilter::Image,
//!     ..Default::default()
//! };
//! let filter = PathFilter::new(&config);
//!
//! assert!(filter.include(Path::new("holiday.PNG"), 4096));
//! assert!(!filter.include(Path::new("notes.txt"), 4096));
//! assert!(!filter.include(Path::new("icon.png"), 100));
//! ```

use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Image extensions matched by [`FileTypeFilter::Image`].
pub const IMAGE_EXTENSIONS: &[&str] = &[
    ".jpg", ".jpeg", ".png", ".gif", ".bmp", ".tiff", ".webp", ".ico",
];

/// Document extensions matched by [`FileTypeFilter::Document`].
pub const DOCUMENT_EXTENSIONS: &[&str] = &[
    ".txt", ".doc", ".docx", ".pdf", ".md", ".rtf", ".odt", ".xls", ".xlsx", ".ppt", ".pptx",
    ".csv", ".xlsm", ".xlsb", ".xltx", ".xltm", ".yaml", ".json", ".xml", ".yml",
];

/// Audio extensions matched by [`FileTypeFilter::Audio`].
pub const AUDIO_EXTENSIONS: &[&str] = &[".mp3", ".wav", ".flac", ".aac", ".ogg", ".wma", ".m4a"];

/// Video extensions matched by [`FileTypeFilter::Video`].
pub const VIDEO_EXTENSIONS: &[&str] = &[
    ".mp4", ".avi", ".mkv", ".mov", ".wmv", ".flv", ".webm", ".m4v",
];

/// File type category selected by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FileTypeFilter {
    /// Every file regardless of extension.
    #[default]
    All,
    /// Common raster image formats.
    Image,
    /// Office documents, text and structured data files.
    Document,
    /// Audio formats.
    Audio,
    /// Video formats.
    Video,
    /// User-supplied extension list (see [`FilterConfig::custom_extensions`]).
    Custom,
}

impl FileTypeFilter {
    /// Fixed extension set for the category, `None` for `All` and `Custom`.
    #[must_use]
    pub fn extensions(self) -> Option<&'static [&'static str]> {
        match self {
            Self::All | Self::Custom => None,
            Self::Image => Some(IMAGE_EXTENSIONS),
            Self::Document => Some(DOCUMENT_EXTENSIONS),
            Self::Audio => Some(AUDIO_EXTENSIONS),
            Self::Video => Some(VIDEO_EXTENSIONS),
        }
    }
}

impl fmt::Display for FileTypeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::All => "all",
            Self::Image => "image",
            Self::Document => "document",
            Self::Audio => "audio",
            Self::Video => "video",
            Self::Custom => "custom",
        };
        f.write_str(name)
    }
}

/// User-facing filter settings.
///
/// Sizes are in KB (1 KB = 1024 bytes); `0` disables the bound.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Minimum file size in KB, `0` for no lower bound.
    pub min_size_kb: u64,
    /// Maximum file size in KB, `0` for no upper bound.
    pub max_size_kb: u64,
    /// Category of files to keep.
    pub file_type: FileTypeFilter,
    /// Comma separated extensions used when `file_type` is `Custom`,
    /// e.g. `"jpg, .PNG,raw"`.
    pub custom_extensions: String,
}

/// Which extensions a [`PathFilter`] accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ExtensionRule {
    Any,
    Only(HashSet<String>),
}

/// Resolved, immutable filter predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathFilter {
    min_bytes: Option<u64>,
    max_bytes: Option<u64>,
    extensions: ExtensionRule,
}

impl Default for PathFilter {
    fn default() -> Self {
        Self::new(&FilterConfig::default())
    }
}

impl PathFilter {
    /// Resolve a [`FilterConfig`] into a predicate.
    #[must_use]
    pub fn new(config: &FilterConfig) -> Self {
        let kb_to_bytes = |kb: u64| (kb > 0).then(|| kb.saturating_mul(1024));

        let extensions = match config.file_type {
            FileTypeFilter::All => ExtensionRule::Any,
            FileTypeFilter::Custom => {
                let set = parse_extension_list(&config.custom_extensions);
                if set.is_empty() {
                    log::warn!(
                        "Custom file type selected with no extensions; every file will be excluded"
                    );
                }
                ExtensionRule::Only(set)
            }
            category => ExtensionRule::Only(
                category
                    .extensions()
                    .unwrap_or_default()
                    .iter()
                    .map(|ext| (*ext).to_string())
                    .collect(),
            ),
        };

        Self {
            min_bytes: kb_to_bytes(config.min_size_kb),
            max_bytes: kb_to_bytes(config.max_size_kb),
            extensions,
        }
    }

    /// Whether a file of `size` bytes at `path` is a candidate.
    #[must_use]
    pub fn include(&self, path: &Path, size: u64) -> bool {
        self.passes_size(size) && self.passes_extension(path)
    }

    fn passes_size(&self, size: u64) -> bool {
        if self.min_bytes.is_some_and(|min| size < min) {
            return false;
        }
        if self.max_bytes.is_some_and(|max| size > max) {
            return false;
        }
        true
    }

    fn passes_extension(&self, path: &Path) -> bool {
        match &self.extensions {
            ExtensionRule::Any => true,
            ExtensionRule::Only(set) => {
                dotted_extension(path).is_some_and(|ext| set.contains(&ext))
            }
        }
    }
}

/// Lowercased extension of `path` with a leading dot, e.g. `".png"`.
fn dotted_extension(path: &Path) -> Option<String> {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
}

/// Normalize a comma separated extension list.
///
/// Tokens are trimmed and lowercased, empty tokens are dropped and a leading
/// `.` is added where missing.
#[must_use]
pub fn parse_extension_list(raw: &str) -> HashSet<String> {
    raw.split(',')
        .map(|token| token.trim().to_lowercase())
        .filter(|token| !token.is_empty() && token != ".")
        .map(|token| {
            if token.starts_with('.') {
                token
            } else {
                format!(".{token}")
            }
        })
        .collect()
}
