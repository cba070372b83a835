//! Snapshot entries: the nodes of a monitored tree
//!
//! A [`SnapshotEntry`] is one file or directory of a watched tree. It carries
//! two sets of [`EntryAttributes`]:
//!
//! - the **committed** attributes, written only by [`SnapshotEntry::refresh`]
//!   (or its alias [`SnapshotEntry::commit`]) once a change was accepted, and
//! - the **live** attributes, the latest observation made by a listing.
//!
//! [`SnapshotEntry::has_changed`] compares the two. Because the committed side
//! only moves forward on success, an entry whose commit never ran is reported
//! again on the next pass; this is what makes detection crash-safe.
//!
//! ## Tree shape
//!
//! Children are kept in a `BTreeMap` keyed by identity, so iteration is always
//! sorted and duplicates are impossible. Each child holds a `Weak` back-pointer
//! to its parent. The back-pointer is not part of [`SnapshotRecord`]; after a
//! record is loaded, [`SnapshotEntry::relink`] walks the tree and restores it.
//!
//! ## Thread Safety
//!
//! Every mutable field sits behind a `parking_lot` lock so that the diff
//! thread can read children while completion threads add or remove them.

use crate::error::Result;
use crate::source::TreeSource;
use crate::types::EntryAttributes;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering as CmpOrdering;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tempfile::TempPath;
use tracing::trace;
use url::Url;

/// Where an entry lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryLocation {
    /// A path on the local filesystem
    Local(PathBuf),
    /// A fully-qualified remote (WebDAV) URL
    Remote(Url),
}

impl EntryLocation {
    /// Identity string used for ordering and lookups
    ///
    /// Remote identities are the serialized URL, which is percent-escaped.
    pub fn identity(&self) -> String {
        match self {
            EntryLocation::Local(path) => path.to_string_lossy().into_owned(),
            EntryLocation::Remote(url) => url.as_str().to_string(),
        }
    }

    /// Last path segment (still escaped for remote locations)
    pub fn name(&self) -> String {
        match self {
            EntryLocation::Local(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.to_string_lossy().into_owned()),
            EntryLocation::Remote(url) => url
                .path_segments()
                .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
                .map(str::to_string)
                .unwrap_or_else(|| url.as_str().to_string()),
        }
    }

    /// Local path, if this is a local location
    pub fn as_path(&self) -> Option<&Path> {
        match self {
            EntryLocation::Local(path) => Some(path),
            EntryLocation::Remote(_) => None,
        }
    }

    /// Remote URL, if this is a remote location
    pub fn as_url(&self) -> Option<&Url> {
        match self {
            EntryLocation::Local(_) => None,
            EntryLocation::Remote(url) => Some(url),
        }
    }
}

impl fmt::Display for EntryLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryLocation::Local(path) => write!(f, "{}", path.display()),
            EntryLocation::Remote(url) => write!(f, "{}", url),
        }
    }
}

/// A node of a monitored tree
pub struct SnapshotEntry {
    location: EntryLocation,
    identity: String,
    committed: RwLock<EntryAttributes>,
    live: RwLock<EntryAttributes>,
    children: RwLock<BTreeMap<String, Arc<SnapshotEntry>>>,
    parent: RwLock<Weak<SnapshotEntry>>,
    /// Deleted directory waiting for its last child to be detached
    pending_removal: AtomicBool,
    /// Temporary local copy of remote content
    local_copy: Mutex<Option<TempPath>>,
}

impl SnapshotEntry {
    /// Create a fresh entry with the given live attributes
    ///
    /// The committed attributes start out as "missing", so a fresh entry
    /// reports itself as changed until it is refreshed.
    pub fn new(location: EntryLocation, live: EntryAttributes) -> Arc<Self> {
        let identity = location.identity();
        Arc::new(Self {
            location,
            identity,
            committed: RwLock::new(EntryAttributes::missing()),
            live: RwLock::new(live),
            children: RwLock::new(BTreeMap::new()),
            parent: RwLock::new(Weak::new()),
            pending_removal: AtomicBool::new(false),
            local_copy: Mutex::new(None),
        })
    }

    /// Create a local entry
    pub fn local(path: impl Into<PathBuf>, live: EntryAttributes) -> Arc<Self> {
        Self::new(EntryLocation::Local(path.into()), live)
    }

    /// Create a remote entry
    pub fn remote(url: Url, live: EntryAttributes) -> Arc<Self> {
        Self::new(EntryLocation::Remote(url), live)
    }

    /// Location of this entry
    pub fn location(&self) -> &EntryLocation {
        &self.location
    }

    /// Identity string (path or escaped URL)
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Display name (last segment)
    pub fn name(&self) -> String {
        self.location.name()
    }

    /// Committed snapshot attributes
    pub fn committed(&self) -> EntryAttributes {
        self.committed.read().clone()
    }

    /// Latest live observation
    pub fn live(&self) -> EntryAttributes {
        self.live.read().clone()
    }

    /// Record a live observation
    pub fn observe(&self, attributes: EntryAttributes) {
        *self.live.write() = attributes;
    }

    /// Copy the live observation of another entry with the same identity
    pub fn observe_from(&self, other: &SnapshotEntry) {
        debug_assert_eq!(self.identity, other.identity);
        self.observe(other.live());
    }

    /// Overwrite the committed attributes with the live ones
    pub fn refresh(&self) {
        let live = self.live.read().clone();
        *self.committed.write() = live;
    }

    /// Accept the current live state as the new snapshot
    pub fn commit(&self) {
        trace!("Committing {}", self.identity);
        self.refresh();
    }

    /// Whether the live observation differs from the committed snapshot
    pub fn has_changed(&self) -> bool {
        *self.live.read() != *self.committed.read()
    }

    /// Whether the committed snapshot says this entry exists
    pub fn exists(&self) -> bool {
        self.committed.read().exists
    }

    /// Whether the committed snapshot says this entry is a directory
    pub fn is_directory(&self) -> bool {
        self.committed.read().is_directory
    }

    /// Whether the live observation says this entry is a directory
    pub fn is_live_directory(&self) -> bool {
        self.live.read().is_directory
    }

    /// Children in identity order
    pub fn children(&self) -> Vec<Arc<SnapshotEntry>> {
        self.children.read().values().cloned().collect()
    }

    /// Look up a direct child by identity
    pub fn child(&self, identity: &str) -> Option<Arc<SnapshotEntry>> {
        self.children.read().get(identity).cloned()
    }

    /// Number of direct children
    pub fn child_count(&self) -> usize {
        self.children.read().len()
    }

    /// Attach a child, replacing any child with the same identity
    pub fn add_child(self: &Arc<Self>, child: Arc<SnapshotEntry>) {
        *child.parent.write() = Arc::downgrade(self);
        self.children.write().insert(child.identity.clone(), child);
    }

    /// Detach a child and drop its own subtree
    ///
    /// Returns the removed child, if it was attached.
    pub fn remove_child(&self, identity: &str) -> Option<Arc<SnapshotEntry>> {
        let removed = self.children.write().remove(identity);
        if let Some(child) = &removed {
            *child.parent.write() = Weak::new();
            child.clear_children();
        }
        removed
    }

    /// Drop every child (and, transitively, their subtrees)
    pub fn clear_children(&self) {
        let drained: Vec<_> = std::mem::take(&mut *self.children.write()).into_values().collect();
        for child in drained {
            *child.parent.write() = Weak::new();
            child.clear_children();
        }
    }

    /// Parent entry, if attached and still alive
    pub fn parent(&self) -> Option<Arc<SnapshotEntry>> {
        self.parent.read().upgrade()
    }

    /// Walk parent pointers up to the top-most ancestor
    pub fn root_ancestor(self: &Arc<Self>) -> Arc<SnapshotEntry> {
        let mut current = Arc::clone(self);
        while let Some(parent) = current.parent() {
            current = parent;
        }
        current
    }

    /// Check the root ancestor as a proxy for "is the transport up"
    ///
    /// Used before inferring a delete, so that a lost connection is never
    /// mistaken for the disappearance of a whole subtree.
    pub fn check_network(self: &Arc<Self>, source: &dyn TreeSource) -> bool {
        let root = self.root_ancestor();
        source.is_reachable(&root)
    }

    /// Mark a deleted directory as waiting for its children to drain
    pub fn mark_pending_removal(&self) {
        self.pending_removal.store(true, Ordering::Release);
    }

    /// Whether this directory was deleted and awaits detachment
    pub fn is_pending_removal(&self) -> bool {
        self.pending_removal.load(Ordering::Acquire)
    }

    /// Clear the pending-removal mark (the directory reappeared)
    pub fn clear_pending_removal(&self) {
        self.pending_removal.store(false, Ordering::Release);
    }

    /// Path of the temporary local copy, if one was materialized
    pub fn local_copy(&self) -> Option<PathBuf> {
        self.local_copy.lock().as_ref().map(|p| p.to_path_buf())
    }

    /// Take ownership of a temporary local copy
    pub fn set_local_copy(&self, path: TempPath) -> PathBuf {
        let out = path.to_path_buf();
        *self.local_copy.lock() = Some(path);
        out
    }

    /// Delete the temporary local copy, if any
    pub fn release_local_copy(&self) {
        if let Some(path) = self.local_copy.lock().take() {
            trace!("Releasing local copy {:?} of {}", path, self.identity);
            if let Err(e) = path.close() {
                tracing::warn!("Failed to delete local copy for {}: {}", self.identity, e);
            }
        }
    }

    /// Count (files, directories) in this subtree, excluding self
    pub fn count(&self) -> (usize, usize) {
        let mut files = 0;
        let mut dirs = 0;
        for child in self.children() {
            if child.is_directory() {
                dirs += 1;
                let (f, d) = child.count();
                files += f;
                dirs += d;
            } else {
                files += 1;
            }
        }
        (files, dirs)
    }

    /// Serialize the committed, parent-free tree
    pub fn to_record(&self) -> SnapshotRecord {
        SnapshotRecord {
            location: self.location.clone(),
            attributes: self.committed(),
            children: self.children().iter().map(|c| c.to_record()).collect(),
        }
    }

    /// Rebuild a tree from a record and restore parent pointers
    ///
    /// Loaded entries start with live attributes equal to their committed
    /// ones; the next listing overwrites them.
    pub fn from_record(record: SnapshotRecord) -> Arc<Self> {
        let root = Self::build_unlinked(record);
        root.relink();
        root
    }

    fn build_unlinked(record: SnapshotRecord) -> Arc<Self> {
        let entry = Self::new(record.location, record.attributes.clone());
        *entry.committed.write() = record.attributes;
        {
            let mut children = entry.children.write();
            for child in record.children {
                let child = Self::build_unlinked(child);
                children.insert(child.identity.clone(), child);
            }
        }
        entry
    }

    /// Re-link every descendant to its parent
    pub fn relink(self: &Arc<Self>) {
        for child in self.children() {
            *child.parent.write() = Arc::downgrade(self);
            child.relink();
        }
    }
}

impl fmt::Debug for SnapshotEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnapshotEntry")
            .field("identity", &self.identity)
            .field("committed", &*self.committed.read())
            .field("children", &self.child_count())
            .field("pending_removal", &self.is_pending_removal())
            .finish()
    }
}

impl PartialEq for SnapshotEntry {
    fn eq(&self, other: &Self) -> bool {
        self.identity == other.identity
    }
}

impl Eq for SnapshotEntry {}

impl PartialOrd for SnapshotEntry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for SnapshotEntry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.identity.cmp(&other.identity)
    }
}

/// Persisted form of a snapshot tree
///
/// Holds only committed attributes and children; parent pointers are rebuilt
/// on load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    /// Entry location
    pub location: EntryLocation,
    /// Committed attributes
    pub attributes: EntryAttributes,
    /// Child records in identity order
    pub children: Vec<SnapshotRecord>,
}

impl SnapshotRecord {
    /// Identity of the recorded entry
    pub fn identity(&self) -> String {
        self.location.identity()
    }
}

/// Make sure a remote collection URL ends in `/`, so that joining child names
/// and comparing identities behave consistently
pub fn collection_url(url: &Url) -> Result<Url> {
    if url.path().ends_with('/') {
        Ok(url.clone())
    } else {
        Ok(Url::parse(&format!("{}/", url.as_str()))?)
    }
}
