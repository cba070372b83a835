//! Listener contract between the detector and the ingestion pipeline
//!
//! Every leaf change found by a pass is handed to a [`ChangeListener`]
//! together with a [`Completion`]. The detector commits the change to its
//! snapshot only once the completion resolves successfully, so a pipeline
//! that crashes mid-ingest sees the same file again after restart.
//!
//! A completion is a one-shot value: [`Completion::succeed`] and
//! [`Completion::fail`] consume it, so it cannot be resolved twice. Dropping
//! it unresolved counts as a failure with [`ListenerError::Abandoned`].
//!
//! ## Example
//!
//! ```rust
//! use snapwatch::listener::{ChangedFile, FnListener};
//!
//! let listener = FnListener::new(|file: &ChangedFile| {
//!     println!("{} {}", file.kind(), file.identity());
//!     Ok(())
//! });
//! # let _ = listener;
//! ```

use crate::detector::ChangeDetector;
use crate::entry::{EntryLocation, SnapshotEntry};
use crate::error::{ListenerError, Result, WatchError};
use crate::source::TreeSource;
use crate::types::{ChangeKind, EntryAttributes};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Pipeline-side receiver of change notifications
///
/// Notifications may arrive on the polling thread; implementations that do
/// slow work should hand the completion to a worker and return quickly.
/// Holding a [`ChangeDetector`] clone from `on_start` keeps the detector
/// alive until `on_stop`.
pub trait ChangeListener: Send + Sync {
    /// Called once when the detector has been opened
    fn on_start(&self, _detector: &ChangeDetector) {}

    /// Called once when the detector is stopped
    fn on_stop(&self, _detector: &ChangeDetector) {}

    /// A file appeared
    fn on_file_create(&self, file: ChangedFile, completion: Completion);

    /// A known file's attributes changed
    fn on_file_change(&self, file: ChangedFile, completion: Completion);

    /// A known file disappeared
    fn on_file_delete(&self, file: ChangedFile, completion: Completion);
}

/// The file a notification is about
#[derive(Clone)]
pub struct ChangedFile {
    entry: Arc<SnapshotEntry>,
    source: Arc<dyn TreeSource>,
    kind: ChangeKind,
}

impl ChangedFile {
    pub(crate) fn new(entry: Arc<SnapshotEntry>, source: Arc<dyn TreeSource>, kind: ChangeKind) -> Self {
        Self { entry, source, kind }
    }

    /// What happened to the file
    pub fn kind(&self) -> ChangeKind {
        self.kind
    }

    /// Identity (path or escaped URL)
    pub fn identity(&self) -> &str {
        self.entry.identity()
    }

    /// Where the file lives
    pub fn location(&self) -> &EntryLocation {
        self.entry.location()
    }

    /// Display name
    pub fn name(&self) -> String {
        self.entry.name()
    }

    /// Attributes as just observed
    pub fn attributes(&self) -> EntryAttributes {
        self.entry.live()
    }

    /// Attributes as of the last committed snapshot
    ///
    /// All fields are empty for a create.
    pub fn previous(&self) -> EntryAttributes {
        self.entry.committed()
    }

    /// A local file holding the content
    ///
    /// Local trees return the file itself. Remote trees download the content
    /// into a temporary file the first time this is called; the copy is
    /// deleted once the completion resolves. Deleted files have no content.
    pub fn local_path(&self) -> Result<PathBuf> {
        if self.kind == ChangeKind::Delete {
            return Err(WatchError::NotMaterializable(PathBuf::from(self.identity())));
        }
        self.source.materialize(&self.entry)
    }

    /// The underlying snapshot entry
    pub fn entry(&self) -> &Arc<SnapshotEntry> {
        &self.entry
    }
}

impl fmt::Debug for ChangedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangedFile")
            .field("kind", &self.kind)
            .field("identity", &self.identity())
            .finish()
    }
}

type Resolver = Box<dyn FnOnce(std::result::Result<(), ListenerError>) + Send>;

/// One-shot acknowledgement of a notification
#[must_use = "a completion resolves as a failure when dropped"]
pub struct Completion {
    identity: String,
    resolver: Option<Resolver>,
}

impl Completion {
    /// Create a completion that runs `resolver` exactly once
    pub fn new<F>(identity: impl Into<String>, resolver: F) -> Self
    where
        F: FnOnce(std::result::Result<(), ListenerError>) + Send + 'static,
    {
        Self {
            identity: identity.into(),
            resolver: Some(Box::new(resolver)),
        }
    }

    /// Identity of the file this completion acknowledges
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// The file was processed; commit it to the snapshot
    pub fn succeed(self) {
        self.resolve(Ok(()))
    }

    /// The file could not be processed
    pub fn fail(self, error: impl Into<ListenerError>) {
        self.resolve(Err(error.into()))
    }

    /// Resolve from a result
    pub fn resolve(mut self, result: std::result::Result<(), ListenerError>) {
        if let Some(resolver) = self.resolver.take() {
            resolver(result);
        }
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if let Some(resolver) = self.resolver.take() {
            tracing::warn!("Completion for {} dropped without being resolved", self.identity);
            resolver(Err(ListenerError::Abandoned));
        }
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("identity", &self.identity)
            .field("resolved", &self.resolver.is_none())
            .finish()
    }
}

/// Listener that handles every notification synchronously with a closure
///
/// The closure's result resolves the completion.
pub struct FnListener<F> {
    handler: F,
}

impl<F> FnListener<F>
where
    F: Fn(&ChangedFile) -> std::result::Result<(), ListenerError> + Send + Sync,
{
    /// Wrap a closure
    pub fn new(handler: F) -> Self {
        Self { handler }
    }

    fn handle(&self, file: ChangedFile, completion: Completion) {
        completion.resolve((self.handler)(&file));
    }
}

impl<F> ChangeListener for FnListener<F>
where
    F: Fn(&ChangedFile) -> std::result::Result<(), ListenerError> + Send + Sync,
{
    fn on_file_create(&self, file: ChangedFile, completion: Completion) {
        self.handle(file, completion)
    }

    fn on_file_change(&self, file: ChangedFile, completion: Completion) {
        self.handle(file, completion)
    }

    fn on_file_delete(&self, file: ChangedFile, completion: Completion) {
        self.handle(file, completion)
    }
}
