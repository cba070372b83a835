//! Live listing sources
//!
//! A [`TreeSource`] is where the detector gets the *live* view of a tree: the
//! current children of a directory, the reachability of the root, and (for
//! remote trees) a local copy of a file's content. The detector never touches
//! the filesystem or network directly; it only talks to a source.
//!
//! Two sources ship with the crate:
//!
//! - [`LocalSource`] - a directory on the local filesystem
//! - [`RemoteSource`](crate::remote::RemoteSource) - a WebDAV-style hierarchy
//!   reached through a [`RemoteListing`](crate::remote::RemoteListing) client
//!
//! ## Ignore patterns
//!
//! `LocalSource` accepts gitignore-style globs. A pattern matches a path
//! relative to the root; a pattern naming a directory also hides everything
//! below it. Paths registered with [`LocalSource::exclude`] (typically the
//! detector's own state directory) are always skipped.

use crate::entry::SnapshotEntry;
use crate::error::{Result, WatchError};
use crate::types::EntryAttributes;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, trace};

/// Provider of live listings for a monitored tree
pub trait TreeSource: Send + Sync + fmt::Debug {
    /// Identity of the monitored root
    fn root_identity(&self) -> String;

    /// Observe the root and return a fresh entry for it
    ///
    /// Fails with [`WatchError::RootUnavailable`] when the root cannot be
    /// enumerated; the detector refuses to start in that case.
    fn root(&self) -> Result<Arc<SnapshotEntry>>;

    /// List the live children of a directory entry
    ///
    /// Entries come back with their live attributes set. Order is not
    /// significant; the detector sorts by identity.
    fn list(&self, dir: &SnapshotEntry) -> Result<Vec<Arc<SnapshotEntry>>>;

    /// Whether the given root entry is currently reachable
    fn is_reachable(&self, root: &SnapshotEntry) -> bool;

    /// Produce a local file holding the entry's content
    fn materialize(&self, entry: &SnapshotEntry) -> Result<PathBuf>;
}

/// Listing source backed by the local filesystem
#[derive(Debug, Clone)]
pub struct LocalSource {
    /// Root directory being watched
    root_path: PathBuf,
    /// Compiled ignore patterns
    ignore: Option<GlobSet>,
    /// Absolute paths that are never listed
    excluded: Vec<PathBuf>,
    /// Whether to follow symbolic links
    follow_symlinks: bool,
}

impl LocalSource {
    /// Create a source for the given root with no ignore patterns
    pub fn new(root_path: impl Into<PathBuf>) -> Self {
        Self {
            root_path: root_path.into(),
            ignore: None,
            excluded: Vec::new(),
            follow_symlinks: false,
        }
    }

    /// Set gitignore-style ignore patterns
    pub fn with_ignore_patterns(mut self, patterns: &[String]) -> Result<Self> {
        self.ignore = build_ignore_set(patterns)?;
        Ok(self)
    }

    /// Set whether symbolic links are followed
    pub fn with_follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }

    /// Never list the given path (or anything below it)
    pub fn exclude(mut self, path: impl Into<PathBuf>) -> Self {
        self.excluded.push(path.into());
        self
    }

    /// Root directory of this source
    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    fn is_ignored(&self, path: &Path) -> bool {
        if self.excluded.iter().any(|ex| path.starts_with(ex)) {
            return true;
        }
        match (&self.ignore, path.strip_prefix(&self.root_path)) {
            (Some(set), Ok(relative)) => set.is_match(relative),
            _ => false,
        }
    }

    fn stat(&self, path: &Path) -> std::io::Result<fs::Metadata> {
        if self.follow_symlinks {
            fs::metadata(path)
        } else {
            fs::symlink_metadata(path)
        }
    }
}

impl TreeSource for LocalSource {
    fn root_identity(&self) -> String {
        self.root_path.to_string_lossy().into_owned()
    }

    fn root(&self) -> Result<Arc<SnapshotEntry>> {
        let metadata = fs::metadata(&self.root_path)
            .map_err(|e| WatchError::root_unavailable(self.root_identity(), e))?;
        if !metadata.is_dir() {
            return Err(WatchError::root_unavailable(self.root_identity(), "not a directory"));
        }
        // Fail now rather than on the first pass if the root is unreadable
        fs::read_dir(&self.root_path)
            .map_err(|e| WatchError::root_unavailable(self.root_identity(), e))?;
        Ok(SnapshotEntry::local(
            self.root_path.clone(),
            EntryAttributes::from_metadata(&metadata),
        ))
    }

    fn list(&self, dir: &SnapshotEntry) -> Result<Vec<Arc<SnapshotEntry>>> {
        let path = dir
            .location()
            .as_path()
            .ok_or_else(|| WatchError::internal(format!("{} is not a local entry", dir.identity())))?;

        let mut entries = Vec::new();
        for item in fs::read_dir(path)? {
            let item = item?;
            let child_path = item.path();
            if self.is_ignored(&child_path) {
                trace!("Ignoring {:?}", child_path);
                continue;
            }
            // A file can vanish between readdir and stat; it simply isn't there
            let metadata = match self.stat(&child_path) {
                Ok(m) => m,
                Err(e) => {
                    trace!("Skipping {:?}: {}", child_path, e);
                    continue;
                }
            };
            entries.push(SnapshotEntry::local(child_path, EntryAttributes::from_metadata(&metadata)));
        }
        Ok(entries)
    }

    fn is_reachable(&self, root: &SnapshotEntry) -> bool {
        root.location()
            .as_path()
            .map(|p| p.is_dir())
            .unwrap_or(false)
    }

    fn materialize(&self, entry: &SnapshotEntry) -> Result<PathBuf> {
        match entry.location().as_path() {
            Some(path) => Ok(path.to_path_buf()),
            None => Err(WatchError::NotMaterializable(PathBuf::from(entry.identity()))),
        }
    }
}

/// Compile gitignore-style patterns into a glob set
///
/// A trailing `/` is dropped and every pattern also matches everything below
/// what it names.
pub fn build_ignore_set(patterns: &[String]) -> Result<Option<GlobSet>> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let trimmed = pattern.trim().trim_end_matches('/');
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        builder.add(Glob::new(trimmed)?);
        builder.add(Glob::new(&format!("{}/**", trimmed))?);
    }
    let set = builder.build()?;
    debug!("Compiled {} ignore patterns", patterns.len());
    Ok(Some(set))
}
