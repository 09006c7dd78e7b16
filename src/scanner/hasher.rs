//! MD5 content hasher with size-tiered read strategies.
//!
//! # Overview
//!
//! [`Hasher`] fingerprints a single file. The read strategy is chosen from the
//! file size so that small files cost one syscall and huge files never need
//! to be buffered in memory:
//!
//! | file size                          | strategy               |
//! |------------------------------------|------------------------|
//! | `size <= chunk_threshold`          | single read            |
//! | `chunk_threshold < size <= mmap`   | 64 KiB chunked reads   |
//! | `size > mmap_threshold`            | read-only memory map   |
//!
//! In fast-scan mode only the first `prefix_bytes` of a file are digested,
//! so two files that share a prefix but differ later hash equal. That is an
//! accepted accuracy trade-off for speed on large media libraries.
//!
//! The digest is MD5. It is used as a content fingerprint, not for security.
//!
//! # Example
//!
//! ```no_run
//! use filesweeper::scanner::{hash_to_hex, HashMode, Hasher};
//! use std::path::Path;
//!
//! let hasher = Hasher::new();
//! let hash = hasher.hash_file(Path::new("movie.mkv"), HashMode::fast(4)).unwrap();
//! println!("{}", hash_to_hex(&hash));
//! ```

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use md5::{Digest, Md5};
use memmap2::Mmap;

use super::HashError;

/// 128-bit MD5 digest.
pub type Hash = [u8; 16];

/// Read buffer size for chunked hashing (64 KiB).
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Files above this size are read in chunks (100 MiB).
pub const DEFAULT_CHUNK_THRESHOLD: u64 = 100 * 1024 * 1024;

/// Files above this size are memory-mapped (1 GiB).
pub const DEFAULT_MMAP_THRESHOLD: u64 = 1024 * 1024 * 1024;

/// Default fast-scan prefix in megabytes.
pub const DEFAULT_FAST_SCAN_MB: u64 = 4;

const BYTES_PER_MB: u64 = 1024 * 1024;

/// How much of each file contributes to its hash.
///
/// The prefix size is part of the mode even when fast scan is disabled,
/// because it is part of the hash cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HashMode {
    /// Only hash the first `prefix_bytes` of files larger than that.
    pub fast_scan: bool,
    /// Prefix length in bytes for fast-scan mode.
    pub prefix_bytes: u64,
}

impl Default for HashMode {
    fn default() -> Self {
        Self::full()
    }
}

impl HashMode {
    /// Hash whole files.
    #[must_use]
    pub fn full() -> Self {
        Self {
            fast_scan: false,
            prefix_bytes: DEFAULT_FAST_SCAN_MB * BYTES_PER_MB,
        }
    }

    /// Hash only the first `prefix_mb` megabytes.
    #[must_use]
    pub fn fast(prefix_mb: u64) -> Self {
        Self::fast_bytes(prefix_mb.saturating_mul(BYTES_PER_MB))
    }

    /// Hash only the first `prefix_bytes` bytes.
    #[must_use]
    pub fn fast_bytes(prefix_bytes: u64) -> Self {
        Self {
            fast_scan: true,
            prefix_bytes,
        }
    }

    /// Build a mode from the user-facing flag and megabyte count.
    #[must_use]
    pub fn from_settings(fast_scan: bool, prefix_mb: u64) -> Self {
        Self {
            fast_scan,
            prefix_bytes: prefix_mb.saturating_mul(BYTES_PER_MB),
        }
    }

    /// Number of bytes to digest for a file of `size` bytes.
    #[must_use]
    pub fn read_size(&self, size: u64) -> u64 {
        if self.fast_scan && size > self.prefix_bytes {
            self.prefix_bytes
        } else {
            size
        }
    }
}

/// Read strategy selected for a given file size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStrategy {
    /// One read of the whole (or prefix) range.
    Whole,
    /// Fixed-size chunked reads.
    Chunked,
    /// Read-only memory map.
    Mapped,
}

/// File content hasher.
///
/// Cheap to clone and share; it holds only thresholds.
#[derive(Debug, Clone)]
pub struct Hasher {
    /// `None` disables memory mapping entirely.
    mmap_threshold: Option<u64>,
    chunk_threshold: u64,
    chunk_size: usize,
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new()
    }
}

impl Hasher {
    /// Create a hasher with default thresholds and memory mapping enabled.
    #[must_use]
    pub fn new() -> Self {
        Self {
            mmap_threshold: Some(DEFAULT_MMAP_THRESHOLD),
            chunk_threshold: DEFAULT_CHUNK_THRESHOLD,
            chunk_size: CHUNK_SIZE,
        }
    }

    /// Enable or disable the memory-mapped tier.
    #[must_use]
    pub fn with_mmap(mut self, enabled: bool) -> Self {
        self.mmap_threshold = if enabled {
            Some(self.mmap_threshold.unwrap_or(DEFAULT_MMAP_THRESHOLD))
        } else {
            None
        };
        self
    }

    /// Set the size above which files are memory-mapped.
    #[must_use]
    pub fn with_mmap_threshold(mut self, bytes: u64) -> Self {
        self.mmap_threshold = Some(bytes);
        self
    }

    /// Set the size above which files are read in chunks.
    #[must_use]
    pub fn with_chunk_threshold(mut self, bytes: u64) -> Self {
        self.chunk_threshold = bytes;
        self
    }

    /// Set the chunk buffer size. Clamped to at least 1 byte.
    #[must_use]
    pub fn with_chunk_size(mut self, bytes: usize) -> Self {
        self.chunk_size = bytes.max(1);
        self
    }

    /// Whether the memory-mapped tier is enabled.
    #[must_use]
    pub fn mmap_enabled(&self) -> bool {
        self.mmap_threshold.is_some()
    }

    /// Strategy used for a file of `size` bytes.
    #[must_use]
    pub fn strategy_for(&self, size: u64) -> ReadStrategy {
        if self.mmap_threshold.is_some_and(|threshold| size > threshold) {
            ReadStrategy::Mapped
        } else if size > self.chunk_threshold {
            ReadStrategy::Chunked
        } else {
            ReadStrategy::Whole
        }
    }

    /// Hash the entire content of a file.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] if the file cannot be opened or read.
    pub fn full_hash(&self, path: &Path) -> Result<Hash, HashError> {
        self.hash_file(path, HashMode::full())
    }

    /// Hash a file under the given mode.
    ///
    /// The size used for strategy selection is taken from the open file
    /// handle, not from an earlier directory listing.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] if the file cannot be opened or read.
    pub fn hash_file(&self, path: &Path, mode: HashMode) -> Result<Hash, HashError> {
        let file = File::open(path).map_err(|e| HashError::from_io(path, e))?;
        let size = file
            .metadata()
            .map_err(|e| HashError::from_io(path, e))?
            .len();
        let read_size = mode.read_size(size);

        let mut digest = Md5::new();
        match self.strategy_for(size) {
            ReadStrategy::Mapped => {
                // SAFETY: read-only map, dropped before the file handle.
                match unsafe { Mmap::map(&file) } {
                    Ok(mmap) => {
                        let end = usize::try_from(read_size)
                            .unwrap_or(usize::MAX)
                            .min(mmap.len());
                        digest.update(&mmap[..end]);
                    }
                    Err(e) => {
                        log::debug!(
                            "Memory map failed for {}, falling back to chunked read: {}",
                            path.display(),
                            e
                        );
                        self.digest_chunked(file, read_size, &mut digest)
                            .map_err(|e| HashError::from_io(path, e))?;
                    }
                }
            }
            ReadStrategy::Chunked => {
                self.digest_chunked(file, read_size, &mut digest)
                    .map_err(|e| HashError::from_io(path, e))?;
            }
            ReadStrategy::Whole => {
                let mut buffer = Vec::with_capacity(usize::try_from(read_size).unwrap_or(0));
                file.take(read_size)
                    .read_to_end(&mut buffer)
                    .map_err(|e| HashError::from_io(path, e))?;
                digest.update(&buffer);
            }
        }

        let mut hash = [0u8; 16];
        hash.copy_from_slice(&digest.finalize());
        Ok(hash)
    }

    fn digest_chunked(&self, file: File, read_size: u64, digest: &mut Md5) -> io::Result<()> {
        let mut reader = file.take(read_size);
        let mut buffer = vec![0u8; self.chunk_size];
        loop {
            let n = match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            digest.update(&buffer[..n]);
        }
        Ok(())
    }
}

/// Lowercase hex encoding of a hash.
#[must_use]
pub fn hash_to_hex(hash: &Hash) -> String {
    use std::fmt::Write;
    hash.iter().fold(String::with_capacity(32), |mut out, byte| {
        let _ = write!(out, "{byte:02x}");
        out
    })
}

/// Parse a 32 character hex string into a hash.
#[must_use]
pub fn hex_to_hash(hex: &str) -> Option<Hash> {
    if hex.len() != 32 || !hex.is_ascii() {
        return None;
    }
    let mut hash = [0u8; 16];
    for (i, byte) in hash.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).ok()?;
    }
    Some(hash)
}
