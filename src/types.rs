//! Core data types used throughout the snapwatch library
//!
//! This module contains the value types shared by the entry model, the
//! detector and the status task:
//! - **Attributes**: `EntryAttributes` - what an entry looked like when observed
//! - **Events**: `ChangeKind` - the three leaf notifications
//! - **Configuration**: `DetectorConfig` - scalar settings injected by the host
//! - **Reporting**: `PassSummary`, `StatusReport` - diagnostics
//!
//! ## Examples
//!
//! ```rust
//! use snapwatch::types::DetectorConfig;
//!
//! let config = DetectorConfig {
//!     poll_interval_ms: 2_000,
//!     ignore_patterns: vec!["*.part".to_string()],
//!     ..Default::default()
//! };
//! assert!(config.validate().is_ok());
//! assert!(config.retry_window().is_some());
//! ```

use crate::error::{Result, WatchError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Attributes of an entry as of one observation
///
/// The same type holds both the committed snapshot and the live observation
/// of a [`SnapshotEntry`](crate::entry::SnapshotEntry); change detection is a
/// field-by-field comparison of the two.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryAttributes {
    /// Whether the entry exists
    pub exists: bool,
    /// Whether the entry is a directory (or WebDAV collection)
    pub is_directory: bool,
    /// Last modification time, if known
    pub last_modified: Option<DateTime<Utc>>,
    /// Size in bytes (0 for directories)
    pub length: u64,
    /// Opaque entity tag, remote entries only
    pub etag: Option<String>,
}

impl EntryAttributes {
    /// Attributes of an entry that does not exist
    pub fn missing() -> Self {
        Self::default()
    }

    /// Attributes of an existing regular file
    pub fn file(last_modified: Option<DateTime<Utc>>, length: u64) -> Self {
        Self {
            exists: true,
            is_directory: false,
            last_modified,
            length,
            etag: None,
        }
    }

    /// Attributes of an existing directory
    pub fn directory(last_modified: Option<DateTime<Utc>>) -> Self {
        Self {
            exists: true,
            is_directory: true,
            last_modified,
            length: 0,
            etag: None,
        }
    }

    /// Attach an entity tag
    pub fn with_etag(mut self, etag: Option<String>) -> Self {
        self.etag = etag;
        self
    }

    /// Read attributes from filesystem metadata
    pub fn from_metadata(metadata: &std::fs::Metadata) -> Self {
        let last_modified = metadata.modified().ok().map(DateTime::<Utc>::from);
        if metadata.is_dir() {
            Self::directory(last_modified)
        } else {
            Self::file(last_modified, metadata.len())
        }
    }
}

/// Kind of leaf notification dispatched to a listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    /// A file appeared
    Create,
    /// A known file's attributes changed
    Change,
    /// A known file disappeared
    Delete,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeKind::Create => write!(f, "create"),
            ChangeKind::Change => write!(f, "change"),
            ChangeKind::Delete => write!(f, "delete"),
        }
    }
}

/// Configuration for a change detector
///
/// All values are plain scalars owned by the surrounding component. Durations
/// are expressed in milliseconds, except the retry window which is in seconds
/// and may be zero or negative to disable the periodic retry entirely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Interval between poll attempts
    pub poll_interval_ms: u64,
    /// Delay before the first poll and the first status tick
    pub initial_delay_ms: u64,
    /// How long failure records suppress redispatch (<= 0 disables clearing)
    pub retry_window_secs: i64,
    /// Interval between status/retry ticks
    pub status_interval_ms: u64,
    /// Gitignore-style globs, matched against paths relative to a local root
    pub ignore_patterns: Vec<String>,
    /// Whether local listings follow symbolic links
    pub follow_symlinks: bool,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 5_000,
            initial_delay_ms: 1_000,
            retry_window_secs: 12 * 60 * 60,
            status_interval_ms: 60_000,
            ignore_patterns: Vec::new(),
            follow_symlinks: false,
        }
    }
}

impl DetectorConfig {
    /// Load configuration from a JSON file
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config: DetectorConfig = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for values the detector cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(WatchError::InvalidConfiguration(
                "poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.status_interval_ms == 0 {
            return Err(WatchError::InvalidConfiguration(
                "status_interval_ms must be greater than zero".to_string(),
            ));
        }
        for pattern in &self.ignore_patterns {
            globset::Glob::new(pattern)?;
        }
        Ok(())
    }

    /// Poll interval as a duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Initial delay as a duration
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    /// Status interval as a duration
    pub fn status_interval(&self) -> Duration {
        Duration::from_millis(self.status_interval_ms)
    }

    /// Retry window, or `None` when retry is disabled
    pub fn retry_window(&self) -> Option<Duration> {
        if self.retry_window_secs <= 0 {
            None
        } else {
            Some(Duration::from_secs(self.retry_window_secs as u64))
        }
    }
}

/// Counts gathered during one diff pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassSummary {
    /// Create notifications dispatched
    pub created: usize,
    /// Change notifications dispatched
    pub changed: usize,
    /// Delete notifications dispatched
    pub deleted: usize,
    /// Dispatches skipped because of a matching failure record
    pub suppressed: usize,
    /// Directory listings that failed and were skipped
    pub listing_errors: usize,
    /// Whether delete inference was aborted because the root was unreachable
    pub aborted_deletes: bool,
    /// Wall-clock time of the diff in milliseconds
    pub duration_ms: u64,
}

impl PassSummary {
    /// Total notifications dispatched
    pub fn dispatched(&self) -> usize {
        self.created + self.changed + self.deleted
    }
}

/// Diagnostic snapshot emitted by the status task
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusReport {
    /// When the report was taken
    pub taken_at: DateTime<Utc>,
    /// Identities with an unresolved completion
    pub in_flight: Vec<String>,
    /// Identities with a failure record
    pub failed: Vec<String>,
    /// Whether this tick cleared the failure records
    pub retry_cleared: bool,
}

/// Where a local detector keeps its snapshot by default
pub fn default_state_dir(root: &Path) -> PathBuf {
    root.join(".snapwatch")
}
