//! Remote (WebDAV-style) listing source
//!
//! [`RemoteSource`] runs the same diff over a remote hierarchy. The wire
//! protocol is not part of this crate: callers plug in a [`RemoteListing`]
//! client that can list one collection (a depth-1 `PROPFIND`, typically) and
//! download one resource.
//!
//! Differences from the local source:
//!
//! - Change detection uses the entity tag, last-modified time and content
//!   length reported by the listing.
//! - Identities are fully-qualified, percent-escaped URLs; collections always
//!   end in `/`.
//! - Root reachability is tested by listing the root collection.
//! - Content is fetched on demand into a temporary file owned by the entry
//!   and deleted once the listener resolves the notification.
//!
//! ## Example
//!
//! ```rust
//! use snapwatch::remote::{RemoteListing, RemoteResource, RemoteSource};
//! use snapwatch::Result;
//! use std::io::Write;
//! use url::Url;
//!
//! #[derive(Debug)]
//! struct EmptyServer;
//!
//! impl RemoteListing for EmptyServer {
//!     fn list(&self, _collection: &Url) -> Result<Vec<RemoteResource>> {
//!         Ok(Vec::new())
//!     }
//!
//!     fn fetch(&self, _resource: &Url, _sink: &mut dyn Write) -> Result<u64> {
//!         Ok(0)
//!     }
//! }
//!
//! # fn main() -> Result<()> {
//! let root = Url::parse("https://dav.example.com/inbox/")?;
//! let source = RemoteSource::new(root, EmptyServer)?;
//! # Ok(())
//! # }
//! ```

use crate::entry::{collection_url, SnapshotEntry};
use crate::error::{Result, WatchError};
use crate::source::TreeSource;
use crate::types::EntryAttributes;
use chrono::{DateTime, Utc};
use std::fmt;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, trace, warn};
use url::Url;

/// One resource reported by a remote collection listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteResource {
    /// Location of the resource; may be absolute or relative to the collection
    pub href: String,
    /// Whether the resource is a collection (directory)
    pub is_collection: bool,
    /// Entity tag, if the server reports one
    pub etag: Option<String>,
    /// Last modification time, if reported
    pub last_modified: Option<DateTime<Utc>>,
    /// Content length in bytes
    pub content_length: u64,
}

impl RemoteResource {
    /// A plain file resource
    pub fn file(href: impl Into<String>, etag: Option<&str>, content_length: u64) -> Self {
        Self {
            href: href.into(),
            is_collection: false,
            etag: etag.map(str::to_string),
            last_modified: None,
            content_length,
        }
    }

    /// A collection resource
    pub fn collection(href: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            is_collection: true,
            etag: None,
            last_modified: None,
            content_length: 0,
        }
    }

    /// Set the modification time
    pub fn modified(mut self, at: DateTime<Utc>) -> Self {
        self.last_modified = Some(at);
        self
    }

    fn attributes(&self) -> EntryAttributes {
        if self.is_collection {
            EntryAttributes::directory(self.last_modified)
        } else {
            EntryAttributes::file(self.last_modified, self.content_length)
                .with_etag(self.etag.clone())
        }
    }
}

/// Client for a remote hierarchy
///
/// Implementations own the transport (HTTP, authentication, XML parsing).
pub trait RemoteListing: Send + Sync + fmt::Debug {
    /// List the members of a collection
    ///
    /// The collection itself may appear in the result (as WebDAV servers
    /// return it for depth-1 listings); it is filtered out.
    fn list(&self, collection: &Url) -> Result<Vec<RemoteResource>>;

    /// Stream a resource's content into `sink`, returning the byte count
    fn fetch(&self, resource: &Url, sink: &mut dyn Write) -> Result<u64>;
}

impl<T: RemoteListing + ?Sized> RemoteListing for Arc<T> {
    fn list(&self, collection: &Url) -> Result<Vec<RemoteResource>> {
        (**self).list(collection)
    }

    fn fetch(&self, resource: &Url, sink: &mut dyn Write) -> Result<u64> {
        (**self).fetch(resource, sink)
    }
}

/// Listing source for a remote hierarchy
#[derive(Debug)]
pub struct RemoteSource<L: RemoteListing> {
    root: Url,
    client: L,
}

impl<L: RemoteListing> RemoteSource<L> {
    /// Create a source rooted at the given collection URL
    pub fn new(root: Url, client: L) -> Result<Self> {
        match root.scheme() {
            "http" | "https" | "dav" | "davs" | "webdav" | "memory" => {}
            other => {
                return Err(WatchError::InvalidConfiguration(format!(
                    "unsupported scheme '{}' for remote root {}",
                    other, root
                )))
            }
        }
        Ok(Self {
            root: collection_url(&root)?,
            client,
        })
    }

    /// Root collection URL
    pub fn root_url(&self) -> &Url {
        &self.root
    }

    /// The underlying client
    pub fn client(&self) -> &L {
        &self.client
    }

    fn resolve(&self, collection: &Url, resource: &RemoteResource) -> Result<Url> {
        let url = collection.join(&resource.href)?;
        if resource.is_collection {
            collection_url(&url)
        } else {
            Ok(url)
        }
    }
}

impl<L: RemoteListing> TreeSource for RemoteSource<L> {
    fn root_identity(&self) -> String {
        self.root.as_str().to_string()
    }

    fn root(&self) -> Result<Arc<SnapshotEntry>> {
        self.client
            .list(&self.root)
            .map_err(|e| WatchError::root_unavailable(self.root_identity(), e))?;
        Ok(SnapshotEntry::remote(self.root.clone(), EntryAttributes::directory(None)))
    }

    fn list(&self, dir: &SnapshotEntry) -> Result<Vec<Arc<SnapshotEntry>>> {
        let collection = dir
            .location()
            .as_url()
            .ok_or_else(|| WatchError::internal(format!("{} is not a remote entry", dir.identity())))?;
        let collection = collection_url(collection)?;

        let resources = self.client.list(&collection)?;
        let mut entries = Vec::with_capacity(resources.len());
        for resource in resources {
            let url = match self.resolve(&collection, &resource) {
                Ok(url) => url,
                Err(e) => {
                    warn!("Skipping unresolvable href {:?} in {}: {}", resource.href, collection, e);
                    continue;
                }
            };
            if url == collection {
                continue;
            }
            trace!("Listed {}", url);
            entries.push(SnapshotEntry::remote(url, resource.attributes()));
        }
        Ok(entries)
    }

    fn is_reachable(&self, root: &SnapshotEntry) -> bool {
        let url = match root.location().as_url() {
            Some(url) => url,
            None => return false,
        };
        match self.client.list(url) {
            Ok(_) => true,
            Err(e) => {
                debug!("Root {} unreachable: {}", url, e);
                false
            }
        }
    }

    fn materialize(&self, entry: &SnapshotEntry) -> Result<PathBuf> {
        if let Some(path) = entry.local_copy() {
            return Ok(path);
        }
        let url = entry
            .location()
            .as_url()
            .ok_or_else(|| WatchError::NotMaterializable(PathBuf::from(entry.identity())))?;

        let mut file = tempfile::Builder::new()
            .prefix("snapwatch-")
            .suffix(&format!("-{}", sanitize(&entry.name())))
            .tempfile()?;
        let bytes = self.client.fetch(url, file.as_file_mut())?;
        file.as_file_mut().flush()?;
        debug!("Fetched {} bytes of {} into {:?}", bytes, url, file.path());
        Ok(entry.set_local_copy(file.into_temp_path()))
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' { c } else { '_' })
        .collect()
}
