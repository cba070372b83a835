//! Error types for the snapwatch library
//!
//! This module defines the errors that can surface from detector setup,
//! persistence, listing sources and listener completions. Per-entry problems
//! met during a diff pass are logged and never propagated; only setup errors
//! reach the caller.

use std::path::PathBuf;
use thiserror::Error;

/// Type alias for Results in the snapwatch library
pub type Result<T> = std::result::Result<T, WatchError>;

/// Main error type for all snapwatch operations
#[derive(Debug, Error)]
pub enum WatchError {
    /// I/O errors during file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors during JSON serialization/deserialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Errors during bincode serialization/deserialization
    #[error("Bincode error: {0}")]
    Bincode(String),

    /// The monitored root cannot be enumerated
    #[error("Root unavailable: {location} ({reason})")]
    RootUnavailable {
        /// Identity of the root
        location: String,
        /// Why the root could not be listed
        reason: String,
    },

    /// Remote listing or transfer failure
    #[error("Remote error: {0}")]
    Remote(String),

    /// Snapshot store failure
    #[error("Store error: {0}")]
    Store(String),

    /// Persisted snapshot does not match what the detector expects
    #[error("Incompatible snapshot: {0}")]
    IncompatibleSnapshot(String),

    /// Entry content cannot be copied to a local file
    #[error("Cannot materialize {0:?}")]
    NotMaterializable(PathBuf),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Pattern parsing error
    #[error("Invalid ignore pattern: {0}")]
    InvalidPattern(#[from] globset::Error),

    /// URL parsing error
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

// Implement conversions for bincode 2.0 error types
impl From<bincode::error::DecodeError> for WatchError {
    fn from(err: bincode::error::DecodeError) -> Self {
        WatchError::Bincode(err.to_string())
    }
}

impl From<bincode::error::EncodeError> for WatchError {
    fn from(err: bincode::error::EncodeError) -> Self {
        WatchError::Bincode(err.to_string())
    }
}

impl WatchError {
    /// Create a remote error with a custom message
    pub fn remote(msg: impl Into<String>) -> Self {
        WatchError::Remote(msg.into())
    }

    /// Create a store error with a custom message
    pub fn store(msg: impl Into<String>) -> Self {
        WatchError::Store(msg.into())
    }

    /// Create an internal error with a custom message
    pub fn internal(msg: impl Into<String>) -> Self {
        WatchError::Internal(msg.into())
    }

    /// Create a root-unavailable error
    pub fn root_unavailable(location: impl Into<String>, reason: impl ToString) -> Self {
        WatchError::RootUnavailable {
            location: location.into(),
            reason: reason.to_string(),
        }
    }

    /// Check if this error is likely to clear up on a later pass
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            WatchError::Io(_) | WatchError::Remote(_) | WatchError::RootUnavailable { .. }
        )
    }

    /// Get a user-friendly error message with suggestions
    pub fn user_message(&self) -> String {
        match self {
            WatchError::RootUnavailable { location, .. } => {
                format!("Cannot list {}. Check that it exists and is reachable, then retry.", location)
            }
            WatchError::InvalidConfiguration(msg) => {
                format!("Invalid configuration: {}. Fix the setting and restart the watcher.", msg)
            }
            _ => self.to_string(),
        }
    }
}

/// Failure reported by a [`ChangeListener`](crate::listener::ChangeListener)
/// when resolving a completion
#[derive(Debug, Error)]
pub enum ListenerError {
    /// The completion was dropped without being resolved
    #[error("completion dropped without a result")]
    Abandoned,

    /// The pipeline refused or failed to ingest the file
    #[error("rejected: {0}")]
    Rejected(String),

    /// I/O failure while processing the file
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Detector-side error surfaced to the listener (e.g. materialization)
    #[error(transparent)]
    Watch(#[from] WatchError),
}

impl ListenerError {
    /// Create a rejection with a custom message
    pub fn rejected(msg: impl Into<String>) -> Self {
        ListenerError::Rejected(msg.into())
    }
}
