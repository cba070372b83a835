//! Utility functions for snapwatch
//!
//! Small helpers shared by the store, the detector and the command-line tool:
//! - SHA-256 hashing of arbitrary data (used for store keys)
//! - Atomic file writing
//! - Human-readable byte counts
//!
//! ## Example Usage
//!
//! ```rust
//! use snapwatch::utils::{format_bytes, hash_data};
//!
//! assert_eq!(hash_data(b"/srv/drop").len(), 64);
//! assert_eq!(format_bytes(1536), "1.50 KB");
//! ```

use crate::error::Result;
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Hash arbitrary data with SHA-256, hex-encoded
///
/// # Example
///
/// ```rust
/// use snapwatch::utils::hash_data;
///
/// let hash = hash_data(b"Hello, world!");
/// assert_eq!(hash.len(), 64); // SHA-256 is 64 hex characters
/// assert_eq!(hash, hash_data(b"Hello, world!"));
/// ```
pub fn hash_data(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Format bytes as a human-readable string
///
/// Values under 1024 are whole numbers with "B"; larger values use binary
/// units with two decimals.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", size as u64, UNITS[unit_idx])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}

/// Atomic file write (write to a temp file in the same directory, then rename)
///
/// The target is either the complete new content or untouched; a crash midway
/// leaves at most a stray temp file, which is removed when its handle drops.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
