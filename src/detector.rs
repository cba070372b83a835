//! Main change detector
//!
//! [`ChangeDetector`] owns the snapshot tree of one monitored root and turns
//! polls into listener notifications. Each call to [`ChangeDetector::poll`]
//! runs at most one diff pass:
//!
//! 1. The committed children of every directory are merged, in identity
//!    order, against the live listing of that directory.
//! 2. Entries only in the listing are creates, entries only in the snapshot
//!    are deletes, entries in both are checked for changes.
//! 3. Every file change goes to the [`ChangeListener`] with a [`Completion`];
//!    directories are handled internally and never reported.
//! 4. A change is committed to the snapshot only when its completion
//!    succeeds. Once every completion of the pass has resolved, the tree is
//!    saved to the [`PersistentStore`].
//!
//! ## Pass gate
//!
//! ```text
//!            poll() with nothing in flight
//!   Idle ─────────────────────────────────► DiffRunning
//!    ▲                                          │
//!    │ nothing in flight: save                  │ completions outstanding
//!    ├──────────────────────────────────────────┤
//!    │                                          ▼
//!    └────────── last completion: save ─── Draining
//! ```
//!
//! A poll that finds the detector busy returns `false` without queueing.
//!
//! ## Example
//!
//! ```rust,no_run
//! use snapwatch::{DetectorBuilder, FnListener};
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let listener = Arc::new(FnListener::new(|file: &snapwatch::ChangedFile| {
//!     println!("{} {}", file.kind(), file.identity());
//!     Ok(())
//! }));
//! let detector = DetectorBuilder::new()
//!     .ignore_patterns(vec!["*.part".to_string()])
//!     .build_local("/srv/drop", listener)?;
//!
//! detector.poll();
//! # Ok(())
//! # }
//! ```

use crate::collections::{identity_map, IdentityMap};
use crate::entry::SnapshotEntry;
use crate::error::{ListenerError, Result, WatchError};
use crate::listener::{ChangeListener, ChangedFile, Completion};
use crate::remote::{RemoteListing, RemoteSource};
use crate::source::{LocalSource, TreeSource};
use crate::store::{store_key, FileStore, PersistedTree, PersistentStore};
use crate::types::{default_state_dir, ChangeKind, DetectorConfig, EntryAttributes, PassSummary};
use parking_lot::{Condvar, Mutex};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, trace, warn};
use url::Url;

/// Pass gate state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorState {
    /// No pass running, nothing in flight
    Idle,
    /// A diff pass is running
    DiffRunning,
    /// The diff finished; waiting for completions before saving
    Draining,
}

struct Gate {
    state: DetectorState,
    stopped: bool,
    last_summary: Option<PassSummary>,
}

struct Shared {
    config: DetectorConfig,
    source: Arc<dyn TreeSource>,
    store: Arc<dyn PersistentStore>,
    listener: Arc<dyn ChangeListener>,
    root: Arc<SnapshotEntry>,
    key: String,
    /// Identities with an unresolved completion
    processing: IdentityMap<ChangeKind>,
    /// Identity -> live attributes at the failed attempt
    failed_files: IdentityMap<EntryAttributes>,
    gate: Mutex<Gate>,
    idle: Condvar,
    passes: AtomicU64,
}

impl Shared {
    fn persist(&self) {
        let tree = PersistedTree::new(self.root.to_record());
        match self.store.store(&self.key, &tree) {
            Ok(()) => trace!("Persisted snapshot of {}", self.root.identity()),
            Err(e) => warn!("Failed to persist snapshot of {}: {}", self.root.identity(), e),
        }
    }

    fn complete(
        &self,
        entry: Arc<SnapshotEntry>,
        parent: Arc<SnapshotEntry>,
        kind: ChangeKind,
        result: std::result::Result<(), ListenerError>,
    ) {
        let identity = entry.identity().to_string();
        match result {
            Ok(()) => {
                match kind {
                    ChangeKind::Create => {
                        entry.commit();
                        parent.add_child(Arc::clone(&entry));
                    }
                    ChangeKind::Change => entry.commit(),
                    ChangeKind::Delete => {
                        parent.remove_child(&identity);
                        detach_if_drained(&parent);
                    }
                }
                self.failed_files.remove(&identity);
                trace!("Committed {} of {}", kind, identity);
            }
            Err(e) => match kind {
                ChangeKind::Create | ChangeKind::Change => {
                    self.failed_files.insert(identity.clone(), entry.live());
                    warn!("Listener failed {} of {}: {}", kind, identity, e);
                }
                ChangeKind::Delete => {
                    warn!("Listener failed delete of {}: {}; retrying next pass", identity, e);
                }
            },
        }
        entry.release_local_copy();
        self.processing.remove(&identity);

        let mut gate = self.gate.lock();
        if gate.state == DetectorState::Draining && self.processing.is_empty() {
            debug!("Pass drained, saving snapshot");
            self.persist();
            gate.state = DetectorState::Idle;
            self.idle.notify_all();
        }
    }
}

/// Detach a deleted directory once its last child is gone, then its parent
/// if that was waiting on it too
fn detach_if_drained(dir: &Arc<SnapshotEntry>) {
    let mut current = Arc::clone(dir);
    while current.is_pending_removal() && current.child_count() == 0 {
        let parent = match current.parent() {
            Some(parent) => parent,
            None => break,
        };
        if parent.remove_child(current.identity()).is_some() {
            debug!("Removed directory {}", current.identity());
        }
        current = parent;
    }
}

/// Durable, poll-driven change detector for one tree
///
/// Cheap to clone; clones share the same tree and gate.
#[derive(Clone)]
pub struct ChangeDetector {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for ChangeDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeDetector")
            .field("root", &self.shared.root.identity())
            .field("state", &self.state())
            .field("in_flight", &self.shared.processing.len())
            .field("failed", &self.shared.failed_files.len())
            .finish()
    }
}

impl ChangeDetector {
    /// Open a detector with the default configuration
    pub fn open(
        source: Arc<dyn TreeSource>,
        store: Arc<dyn PersistentStore>,
        listener: Arc<dyn ChangeListener>,
    ) -> Result<Self> {
        Self::open_with_config(source, store, listener, DetectorConfig::default())
    }

    /// Open a detector
    ///
    /// Restores the last saved snapshot of the root when there is one;
    /// otherwise (or when it cannot be read) starts from an empty tree, so
    /// every file is reported as created on the first pass.
    ///
    /// # Errors
    ///
    /// - [`WatchError::RootUnavailable`] if the root cannot be enumerated
    /// - [`WatchError::InvalidConfiguration`] if `config` does not validate
    #[instrument(skip_all, fields(root = %source.root_identity()))]
    pub fn open_with_config(
        source: Arc<dyn TreeSource>,
        store: Arc<dyn PersistentStore>,
        listener: Arc<dyn ChangeListener>,
        config: DetectorConfig,
    ) -> Result<Self> {
        config.validate()?;
        let root_identity = source.root_identity();
        info!("Opening change detector for {}", root_identity);

        let fresh = source.root()?;
        let key = store_key(&root_identity);

        let root = match store.load(&key) {
            Ok(Some(tree)) => match tree.validate_for(&root_identity) {
                Ok(()) => {
                    let saved_at = tree.saved_at;
                    let root = SnapshotEntry::from_record(tree.root);
                    root.observe_from(&fresh);
                    let (files, dirs) = root.count();
                    info!(
                        "Restored snapshot from {}: {} files, {} directories",
                        saved_at, files, dirs
                    );
                    root
                }
                Err(e) => {
                    warn!("Ignoring saved snapshot: {}", e);
                    fresh
                }
            },
            Ok(None) => {
                info!("No saved snapshot, starting fresh");
                fresh
            }
            Err(e) => {
                warn!("Failed to load snapshot, starting fresh: {}", e);
                fresh
            }
        };
        root.refresh();

        let detector = Self {
            shared: Arc::new(Shared {
                config,
                source,
                store,
                listener,
                root,
                key,
                processing: identity_map(),
                failed_files: identity_map(),
                gate: Mutex::new(Gate {
                    state: DetectorState::Idle,
                    stopped: false,
                    last_summary: None,
                }),
                idle: Condvar::new(),
                passes: AtomicU64::new(0),
            }),
        };

        detector.shared.listener.on_start(&detector);
        Ok(detector)
    }

    /// Run one diff pass if the detector is idle
    ///
    /// Returns `true` iff a pass actually ran. Returns `false` without doing
    /// anything while a pass is running or draining, after [`stop`](Self::stop),
    /// or when the root is unreachable.
    #[instrument(skip(self), fields(root = %self.shared.root.identity()))]
    pub fn poll(&self) -> bool {
        {
            let mut gate = self.shared.gate.lock();
            if gate.stopped {
                trace!("Detector stopped, skipping poll");
                return false;
            }
            if gate.state != DetectorState::Idle || !self.shared.processing.is_empty() {
                trace!(
                    "Pass still active ({:?}, {} in flight), skipping poll",
                    gate.state,
                    self.shared.processing.len()
                );
                return false;
            }
            gate.state = DetectorState::DiffRunning;
        }

        // Check reachability with the gate released; completions must not wait on the network
        if !self.shared.source.is_reachable(&self.shared.root) {
            debug!("Root unreachable, skipping poll");
            let mut gate = self.shared.gate.lock();
            gate.state = DetectorState::Idle;
            self.shared.idle.notify_all();
            return false;
        }

        let started = Instant::now();
        let mut pass = Pass {
            shared: &self.shared,
            summary: PassSummary::default(),
        };
        pass.run();
        let mut summary = pass.summary;
        summary.duration_ms = started.elapsed().as_millis() as u64;
        self.shared.passes.fetch_add(1, Ordering::Relaxed);

        if summary.dispatched() > 0 || summary.aborted_deletes {
            debug!(
                "Pass finished in {}ms: {} created, {} changed, {} deleted, {} suppressed",
                summary.duration_ms, summary.created, summary.changed, summary.deleted, summary.suppressed
            );
        } else {
            trace!("Pass finished in {}ms with no changes", summary.duration_ms);
        }

        let mut gate = self.shared.gate.lock();
        gate.last_summary = Some(summary);
        if self.shared.processing.is_empty() {
            self.shared.persist();
            gate.state = DetectorState::Idle;
            self.shared.idle.notify_all();
        } else {
            gate.state = DetectorState::Draining;
        }
        true
    }

    /// Block until the detector is idle with nothing in flight
    ///
    /// Returns `false` if `timeout` elapsed first.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut gate = self.shared.gate.lock();
        loop {
            if gate.state == DetectorState::Idle && self.shared.processing.is_empty() {
                return true;
            }
            if self.shared.idle.wait_until(&mut gate, deadline).timed_out() {
                return gate.state == DetectorState::Idle && self.shared.processing.is_empty();
            }
        }
    }

    /// Stop accepting polls and notify the listener
    ///
    /// Outstanding completions still commit normally.
    pub fn stop(&self) {
        {
            let mut gate = self.shared.gate.lock();
            if gate.stopped {
                return;
            }
            gate.stopped = true;
        }
        info!("Stopping change detector for {}", self.shared.root.identity());
        self.shared.listener.on_stop(self);
    }

    /// Whether [`stop`](Self::stop) was called
    pub fn is_stopped(&self) -> bool {
        self.shared.gate.lock().stopped
    }

    /// Current gate state
    pub fn state(&self) -> DetectorState {
        self.shared.gate.lock().state
    }

    /// Configuration the detector was opened with
    pub fn config(&self) -> &DetectorConfig {
        &self.shared.config
    }

    /// Root of the snapshot tree
    pub fn root(&self) -> Arc<SnapshotEntry> {
        Arc::clone(&self.shared.root)
    }

    /// Identity of the monitored root
    pub fn root_identity(&self) -> &str {
        self.shared.root.identity()
    }

    /// Key of this root's snapshot in the store
    pub fn store_key(&self) -> &str {
        &self.shared.key
    }

    /// The listing source
    pub fn source(&self) -> &Arc<dyn TreeSource> {
        &self.shared.source
    }

    /// Identities with an unresolved completion, sorted
    pub fn in_flight(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.shared.processing.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Number of unresolved completions
    pub fn in_flight_count(&self) -> usize {
        self.shared.processing.len()
    }

    /// Identities with a failure record, sorted
    pub fn failed(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.shared.failed_files.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Number of failure records
    pub fn failed_count(&self) -> usize {
        self.shared.failed_files.len()
    }

    /// Live attributes recorded when `identity` last failed
    pub fn failure_record(&self, identity: &str) -> Option<EntryAttributes> {
        self.shared.failed_files.get(identity).map(|r| r.clone())
    }

    /// Drop every failure record, so failed files are dispatched again
    pub fn clear_failures(&self) -> usize {
        let count = self.shared.failed_files.len();
        self.shared.failed_files.clear();
        count
    }

    /// Summary of the most recent pass
    pub fn last_summary(&self) -> Option<PassSummary> {
        self.shared.gate.lock().last_summary.clone()
    }

    /// Number of passes run since open
    pub fn passes(&self) -> u64 {
        self.shared.passes.load(Ordering::Relaxed)
    }
}

/// Classification of one child during a merge
enum Step {
    /// Only in the live listing
    Create(Arc<SnapshotEntry>),
    /// Committed child and its live observation
    Match(Arc<SnapshotEntry>, Arc<SnapshotEntry>),
    /// Only in the snapshot
    Missing(Arc<SnapshotEntry>),
}

/// State of one diff pass
struct Pass<'a> {
    shared: &'a Arc<Shared>,
    summary: PassSummary,
}

impl Pass<'_> {
    fn run(&mut self) {
        let root = Arc::clone(&self.shared.root);
        if let Some(live) = self.list(&root) {
            self.merge(&root, live, false);
        }
    }

    /// Live children sorted by identity, or `None` if the listing failed
    fn list(&mut self, dir: &Arc<SnapshotEntry>) -> Option<Vec<Arc<SnapshotEntry>>> {
        match self.shared.source.list(dir) {
            Ok(mut live) => {
                live.sort();
                live.dedup_by(|a, b| a.identity() == b.identity());
                Some(live)
            }
            Err(e) => {
                if e.is_transient() {
                    debug!("Listing {} failed, skipping branch: {}", dir.identity(), e);
                } else {
                    warn!("Listing {} failed, skipping branch: {}", dir.identity(), e);
                }
                self.summary.listing_errors += 1;
                None
            }
        }
    }

    /// Merge the committed children of `node` against `live`
    ///
    /// The whole level is classified before anything is dispatched or
    /// recursed into. `forced` means `node` itself is gone, so every child
    /// is deleted without probing the network again.
    fn merge(&mut self, node: &Arc<SnapshotEntry>, live: Vec<Arc<SnapshotEntry>>, forced: bool) {
        for step in self.classify(node, live, forced) {
            match step {
                Step::Create(candidate) => self.dispatch_create(node, candidate),
                Step::Match(existing, observed) => self.dispatch_match(node, &existing, &observed),
                Step::Missing(existing) => self.dispatch_missing(node, &existing),
            }
        }
    }

    /// Sorted merge of one level into create, match and missing steps
    ///
    /// Stops at the first missing entry whose root turns out unreachable;
    /// the steps before it are still returned.
    fn classify(&mut self, node: &Arc<SnapshotEntry>, live: Vec<Arc<SnapshotEntry>>, forced: bool) -> Vec<Step> {
        let previous = node.children();
        let mut steps = Vec::with_capacity(previous.len().max(live.len()));
        let mut live = live.into_iter().peekable();

        for existing in previous {
            while let Some(candidate) = live.next_if(|l| l.identity() < existing.identity()) {
                steps.push(Step::Create(candidate));
            }
            match live.next_if(|l| l.identity() == existing.identity()) {
                Some(observed) => steps.push(Step::Match(existing, observed)),
                None => {
                    if !forced && !existing.check_network(self.shared.source.as_ref()) {
                        warn!(
                            "{} missing but root is unreachable; not inferring deletes under {}",
                            existing.identity(),
                            node.identity()
                        );
                        self.summary.aborted_deletes = true;
                        return steps;
                    }
                    steps.push(Step::Missing(existing));
                }
            }
        }

        steps.extend(live.map(Step::Create));
        steps
    }

    fn dispatch_create(&mut self, node: &Arc<SnapshotEntry>, candidate: Arc<SnapshotEntry>) {
        if candidate.is_live_directory() {
            candidate.refresh();
            node.add_child(Arc::clone(&candidate));
            debug!("Added directory {}", candidate.identity());
            if let Some(live) = self.list(&candidate) {
                self.merge(&candidate, live, false);
            }
        } else if !self.suppressed(&candidate) {
            self.dispatch(node, candidate, ChangeKind::Create);
        }
    }

    fn dispatch_match(&mut self, node: &Arc<SnapshotEntry>, existing: &Arc<SnapshotEntry>, observed: &SnapshotEntry) {
        match (existing.is_directory(), observed.is_live_directory()) {
            (true, true) => {
                existing.observe_from(observed);
                existing.clear_pending_removal();
                if existing.has_changed() {
                    existing.refresh();
                }
                if let Some(live) = self.list(existing) {
                    self.merge(existing, live, false);
                }
            }
            (false, false) => {
                existing.observe_from(observed);
                if existing.has_changed() && !self.suppressed(existing) {
                    self.dispatch(node, Arc::clone(existing), ChangeKind::Change);
                }
            }
            (false, true) => {
                // The directory is picked up as a create on the next pass
                debug!("{} turned from a file into a directory", existing.identity());
                existing.observe(EntryAttributes::missing());
                self.dispatch(node, Arc::clone(existing), ChangeKind::Delete);
            }
            (true, false) => {
                debug!("{} turned from a directory into a file", existing.identity());
                self.merge(existing, Vec::new(), true);
                self.remove_directory(existing);
            }
        }
    }

    fn dispatch_missing(&mut self, node: &Arc<SnapshotEntry>, existing: &Arc<SnapshotEntry>) {
        if existing.is_directory() {
            self.merge(existing, Vec::new(), true);
            self.remove_directory(existing);
        } else {
            existing.observe(EntryAttributes::missing());
            self.dispatch(node, Arc::clone(existing), ChangeKind::Delete);
        }
    }

    fn remove_directory(&mut self, dir: &Arc<SnapshotEntry>) {
        dir.mark_pending_removal();
        trace!("Directory {} pending removal ({} children)", dir.identity(), dir.child_count());
        detach_if_drained(dir);
    }

    /// Whether a failure record for `entry` still applies
    ///
    /// The record applies while the modification signal (time, length and
    /// entity tag) is the one seen at the failed attempt. A stale record is
    /// dropped.
    fn suppressed(&mut self, entry: &SnapshotEntry) -> bool {
        let live = entry.live();
        let unchanged = match self.shared.failed_files.get(entry.identity()) {
            Some(record) => *record == live,
            None => return false,
        };
        if unchanged {
            trace!("Suppressing {}: unchanged since last failure", entry.identity());
            self.summary.suppressed += 1;
            true
        } else {
            debug!("{} modified since last failure, retrying", entry.identity());
            self.shared.failed_files.remove(entry.identity());
            false
        }
    }

    fn dispatch(&mut self, node: &Arc<SnapshotEntry>, entry: Arc<SnapshotEntry>, kind: ChangeKind) {
        match kind {
            ChangeKind::Create => self.summary.created += 1,
            ChangeKind::Change => self.summary.changed += 1,
            ChangeKind::Delete => self.summary.deleted += 1,
        }
        let identity = entry.identity().to_string();
        trace!("Dispatching {} of {}", kind, identity);
        self.shared.processing.insert(identity.clone(), kind);

        let shared = Arc::clone(self.shared);
        let parent = Arc::clone(node);
        let target = Arc::clone(&entry);
        let completion = Completion::new(identity, move |result| {
            shared.complete(target, parent, kind, result)
        });

        let file = ChangedFile::new(entry, Arc::clone(&self.shared.source), kind);
        let listener = &self.shared.listener;
        match kind {
            ChangeKind::Create => listener.on_file_create(file, completion),
            ChangeKind::Change => listener.on_file_change(file, completion),
            ChangeKind::Delete => listener.on_file_delete(file, completion),
        }
    }
}

/// Builder for configuring and opening a [`ChangeDetector`]
///
/// # Default Values
///
/// - configuration: [`DetectorConfig::default`]
/// - store: a [`FileStore`] in the state directory
/// - state directory: `<root>/.snapwatch` for local roots; required for
///   remote roots unless a store is given
#[derive(Debug, Default)]
pub struct DetectorBuilder {
    config: DetectorConfig,
    state_dir: Option<PathBuf>,
    store: Option<Arc<dyn PersistentStore>>,
}

impl DetectorBuilder {
    /// Create a new builder with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: DetectorConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the poll interval
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set the failure retry window; zero disables clearing
    pub fn retry_window(mut self, window: Duration) -> Self {
        self.config.retry_window_secs = i64::try_from(window.as_secs()).unwrap_or(i64::MAX);
        self
    }

    /// Set ignore patterns
    ///
    /// Patterns are gitignore-style globs relative to a local root. The state
    /// directory is always skipped.
    pub fn ignore_patterns(mut self, patterns: Vec<String>) -> Self {
        self.config.ignore_patterns = patterns;
        self
    }

    /// Set whether to follow symbolic links in local trees
    pub fn follow_symlinks(mut self, follow: bool) -> Self {
        self.config.follow_symlinks = follow;
        self
    }

    /// Keep snapshots in this directory
    pub fn state_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.state_dir = Some(dir.into());
        self
    }

    /// Use a custom store instead of a [`FileStore`]
    pub fn store(mut self, store: Arc<dyn PersistentStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Open a detector over a local directory
    ///
    /// Relative roots and state directories are resolved against the
    /// current directory, so the root identity does not depend on how the
    /// path was spelled and the state directory is always excluded.
    pub fn build_local(self, root: impl Into<PathBuf>, listener: Arc<dyn ChangeListener>) -> Result<ChangeDetector> {
        self.config.validate()?;
        let root = std::path::absolute(root.into())?;
        let state_dir = match self.state_dir {
            Some(dir) => std::path::absolute(dir)?,
            None => default_state_dir(&root),
        };
        let source = LocalSource::new(&root)
            .with_ignore_patterns(&self.config.ignore_patterns)?
            .with_follow_symlinks(self.config.follow_symlinks)
            .exclude(&state_dir);
        let store = match self.store {
            Some(store) => store,
            None => Arc::new(FileStore::new(state_dir)),
        };
        ChangeDetector::open_with_config(Arc::new(source), store, listener, self.config)
    }

    /// Open a detector over a remote collection
    pub fn build_remote<L: RemoteListing + 'static>(
        self,
        root: Url,
        client: L,
        listener: Arc<dyn ChangeListener>,
    ) -> Result<ChangeDetector> {
        let store: Arc<dyn PersistentStore> = match (self.store, self.state_dir) {
            (Some(store), _) => store,
            (None, Some(dir)) => Arc::new(FileStore::new(dir)),
            (None, None) => {
                return Err(WatchError::InvalidConfiguration(
                    "a remote root needs a state directory or a store".to_string(),
                ))
            }
        };
        let source = RemoteSource::new(root, client)?;
        ChangeDetector::open_with_config(Arc::new(source), store, listener, self.config)
    }

    /// Open a detector over any source
    pub fn build(self, source: Arc<dyn TreeSource>, listener: Arc<dyn ChangeListener>) -> Result<ChangeDetector> {
        let store: Arc<dyn PersistentStore> = match (self.store, self.state_dir) {
            (Some(store), _) => store,
            (None, Some(dir)) => Arc::new(FileStore::new(dir)),
            (None, None) => {
                return Err(WatchError::InvalidConfiguration(
                    "no state directory or store configured".to_string(),
                ))
            }
        };
        ChangeDetector::open_with_config(source, store, listener, self.config)
    }
}
