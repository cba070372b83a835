//! # snapwatch - Durable poll-driven change detection
//!
//! Watches a directory tree, local or on a WebDAV-style server, and reports
//! created, modified and deleted files to an ingestion pipeline exactly once,
//! surviving crashes and transient failures.
//!
//! ## Overview
//!
//! snapwatch keeps a snapshot of the tree it watches and compares it with the
//! live tree on every poll:
//! - Files that appear, change or disappear are handed to a [`ChangeListener`]
//! - The snapshot only moves forward once the listener confirms success, so
//!   a crash between "noticed" and "ingested" re-reports the file
//! - The snapshot is saved whenever a pass has fully drained
//! - A file the listener failed on is skipped until it changes again, or
//!   until the retry window clears the failure records
//!
//! ## Architecture
//!
//! - **Snapshot entries** ([`SnapshotEntry`]): one node per file or directory,
//!   holding committed and live attributes
//! - **Sources** ([`TreeSource`]): produce live listings. [`LocalSource`] reads
//!   the filesystem; [`RemoteSource`] asks a [`RemoteListing`] client
//! - **Detector** ([`ChangeDetector`]): merges snapshot and listing, gates
//!   passes, commits on completion
//! - **Stores** ([`PersistentStore`]): keep the committed tree between runs
//! - **Tasks** ([`spawn_poller`], [`StatusTask`]): tokio interval tasks for
//!   polling and retry clearing
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use snapwatch::{spawn_poller, ChangedFile, DetectorBuilder, FnListener, StatusTask};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let listener = Arc::new(FnListener::new(|file: &ChangedFile| {
//!     println!("{} {}", file.kind(), file.identity());
//!     Ok(())
//! }));
//!
//! let detector = DetectorBuilder::new()
//!     .poll_interval(Duration::from_secs(5))
//!     .ignore_patterns(vec!["*.part".to_string()])
//!     .build_local("/srv/drop", listener)?;
//!
//! let poller = spawn_poller(detector.clone());
//! let status = StatusTask::new(detector.clone()).spawn();
//!
//! tokio::signal::ctrl_c().await?;
//! poller.stop().await;
//! status.stop().await;
//! detector.stop();
//! # Ok(())
//! # }
//! ```
//!
//! ## Acknowledging Asynchronously
//!
//! A listener does not have to finish its work inside the callback. The
//! [`Completion`] can be moved to a worker and resolved later; no new pass
//! starts until every completion of the current one has resolved.
//!
//! ```rust
//! use snapwatch::{ChangeListener, ChangedFile, Completion};
//! use std::sync::mpsc::Sender;
//! use std::sync::Mutex;
//!
//! struct Queue(Mutex<Sender<(ChangedFile, Completion)>>);
//!
//! impl ChangeListener for Queue {
//!     fn on_file_create(&self, file: ChangedFile, completion: Completion) {
//!         let _ = self.0.lock().unwrap().send((file, completion));
//!     }
//!     fn on_file_change(&self, file: ChangedFile, completion: Completion) {
//!         let _ = self.0.lock().unwrap().send((file, completion));
//!     }
//!     fn on_file_delete(&self, file: ChangedFile, completion: Completion) {
//!         let _ = self.0.lock().unwrap().send((file, completion));
//!     }
//! }
//! ```
//!
//! ## Error Handling
//!
//! Setup operations return `Result<T, WatchError>`. Nothing that goes wrong
//! during a pass is returned to the caller: listing failures skip a branch,
//! an unreachable root suppresses deletes, listener failures are recorded,
//! and save failures are logged.
//!
//! ## Module Organization
//!
//! - [`entry`]: Snapshot tree nodes
//! - [`source`]: Listing sources and the local filesystem source
//! - [`remote`]: Remote listing source
//! - [`listener`]: Listener trait and completions
//! - [`detector`]: The change detector and its builder
//! - [`store`]: Snapshot persistence
//! - [`retry`]: Failure retry and status reporting
//! - [`schedule`]: Periodic tokio tasks
//! - [`types`]: Common types and configuration
//! - [`error`]: Error types and handling

// Public API modules
pub mod detector;
pub mod entry;
pub mod error;
pub mod listener;
pub mod remote;
pub mod retry;
pub mod schedule;
pub mod source;
pub mod store;
pub mod types;
pub mod utils;

// Internal modules (not part of public API)
mod collections;

// Re-export main types for convenience
pub use detector::{ChangeDetector, DetectorBuilder, DetectorState};
pub use entry::{EntryLocation, SnapshotEntry, SnapshotRecord};
pub use error::{ListenerError, Result, WatchError};
pub use listener::{ChangeListener, ChangedFile, Completion, FnListener};
pub use remote::{RemoteListing, RemoteResource, RemoteSource};
pub use retry::StatusTask;
pub use schedule::{spawn_poller, PeriodicTask};
pub use source::{LocalSource, TreeSource};
pub use store::{store_key, FileStore, MemoryStore, PersistedTree, PersistentStore, TreeStats};
pub use types::*;
