//! Snapshot persistence
//!
//! The detector saves its committed tree whenever a pass has fully drained,
//! and loads it back on startup. Only the parent-free [`SnapshotRecord`] is
//! saved; parent pointers are rebuilt after load.
//!
//! Stores are keyed by [`store_key`], the hex SHA-256 of the root identity,
//! so one store can hold the snapshots of many roots.
//!
//! ## Storage Layout ([`FileStore`])
//!
//! ```text
//! <state-dir>/
//! ├── 3f5a…e1.bin     # bincode-encoded PersistedTree for one root
//! └── 9c02…4b.bin
//! ```
//!
//! Files are replaced atomically, so a crash during a save leaves the
//! previous snapshot intact.

use crate::collections::{identity_map, IdentityMap};
use crate::entry::SnapshotRecord;
use crate::error::{Result, WatchError};
use crate::utils::{atomic_write, hash_data};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Current on-disk format version
pub const FORMAT_VERSION: u32 = 1;

/// Key under which the snapshot of a root is stored
pub fn store_key(root_identity: &str) -> String {
    hash_data(root_identity.as_bytes())
}

/// A saved snapshot tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedTree {
    /// Format version the tree was written with
    pub format_version: u32,
    /// Identity of the monitored root
    pub root_identity: String,
    /// When the tree was saved
    pub saved_at: DateTime<Utc>,
    /// The committed tree
    pub root: SnapshotRecord,
}

impl PersistedTree {
    /// Wrap a record with the current format version and time
    pub fn new(root: SnapshotRecord) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            root_identity: root.identity(),
            saved_at: Utc::now(),
            root,
        }
    }

    /// Check that this tree can be used for the given root
    pub fn validate_for(&self, root_identity: &str) -> Result<()> {
        if self.format_version != FORMAT_VERSION {
            return Err(WatchError::IncompatibleSnapshot(format!(
                "format version {} (expected {})",
                self.format_version, FORMAT_VERSION
            )));
        }
        if self.root_identity != root_identity {
            return Err(WatchError::IncompatibleSnapshot(format!(
                "snapshot is for {} not {}",
                self.root_identity, root_identity
            )));
        }
        Ok(())
    }

    /// Totals over the saved tree
    pub fn stats(&self) -> TreeStats {
        let mut stats = TreeStats::default();
        fn walk(record: &SnapshotRecord, stats: &mut TreeStats) {
            for child in &record.children {
                if child.attributes.is_directory {
                    stats.directories += 1;
                    walk(child, stats);
                } else {
                    stats.files += 1;
                    stats.total_bytes += child.attributes.length;
                }
            }
        }
        walk(&self.root, &mut stats);
        stats
    }

    /// Encode to bytes
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serde::encode_to_vec(self, bincode::config::standard())?)
    }

    /// Decode from bytes
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let (tree, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())?;
        Ok(tree)
    }
}

/// Counts over a saved tree
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeStats {
    /// Number of files
    pub files: usize,
    /// Number of directories below the root
    pub directories: usize,
    /// Sum of file lengths
    pub total_bytes: u64,
}

/// Key/value persistence of snapshot trees
pub trait PersistentStore: Send + Sync + fmt::Debug {
    /// Save a tree, replacing any previous value under `key`
    fn store(&self, key: &str, tree: &PersistedTree) -> Result<()>;

    /// Load the tree under `key`, or `None` if nothing was ever stored
    fn load(&self, key: &str) -> Result<Option<PersistedTree>>;
}

/// Store that keeps one file per key in a directory
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Use (and create on first save) the given directory
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the snapshot files
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File that holds the tree for `key`
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.bin", key))
    }
}

impl PersistentStore for FileStore {
    fn store(&self, key: &str, tree: &PersistedTree) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .map_err(|e| WatchError::store(format!("creating {:?}: {}", self.dir, e)))?;
        let bytes = tree.encode()?;
        let path = self.path_for(key);
        atomic_write(&path, &bytes).map_err(|e| WatchError::store(format!("writing {:?}: {}", path, e)))?;
        debug!("Saved snapshot of {} ({} bytes) to {:?}", tree.root_identity, bytes.len(), path);
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Option<PersistedTree>> {
        let path = self.path_for(key);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                trace!("No snapshot at {:?}", path);
                return Ok(None);
            }
            Err(e) => return Err(WatchError::store(format!("reading {:?}: {}", path, e))),
        };
        Ok(Some(PersistedTree::decode(&bytes)?))
    }
}

/// In-memory store, for tests and embedding
#[derive(Debug)]
pub struct MemoryStore {
    entries: IdentityMap<Vec<u8>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self { entries: identity_map() }
    }

    /// Number of stored trees
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing was stored yet
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Raw bytes stored under `key`
    pub fn raw(&self, key: &str) -> Option<Vec<u8>> {
        self.entries.get(key).map(|v| v.clone())
    }

    /// Overwrite the raw bytes under `key`
    pub fn put_raw(&self, key: &str, bytes: Vec<u8>) {
        self.entries.insert(key.to_string(), bytes);
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PersistentStore for MemoryStore {
    fn store(&self, key: &str, tree: &PersistedTree) -> Result<()> {
        self.entries.insert(key.to_string(), tree.encode()?);
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Option<PersistedTree>> {
        match self.entries.get(key) {
            Some(bytes) => Ok(Some(PersistedTree::decode(&bytes)?)),
            None => Ok(None),
        }
    }
}
