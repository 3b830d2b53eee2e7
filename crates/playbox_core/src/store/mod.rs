//! Store abstractions: the remote durable store and the local recovery cache.
//!
//! Both collaborators are narrow, object-safe async traits so the sync
//! coordinators can hold them behind `Arc<dyn ...>` and tests can substitute
//! scripted implementations. The remote store is treated as possibly slow
//! and possibly failing; the local store is assumed always available, and
//! its failures are logged rather than retried since it is already the
//! fallback of last resort.
//!
//! ## Object safety
//!
//! All async methods return boxed futures ([`BoxFuture`]) so the traits can
//! be used behind `dyn`.

mod memory;

pub use memory::MemoryLocalStore;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};

use crate::cancel::CancellationToken;
use crate::error::Result;
use crate::file::{FileCollection, LazyFile};
use crate::project::ProjectMetadata;

/// A boxed future for object-safe async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A project as the remote store sees it: metadata plus a full snapshot.
#[derive(Debug, Clone)]
pub struct RemoteProject {
    /// Server-confirmed metadata (ids, timestamps, version).
    pub metadata: ProjectMetadata,
    /// The project's files.
    pub files: FileCollection,
}

/// The remote durable store collaborator.
///
/// Implementations must honor cancellation by aborting the in-flight
/// transfer and returning [`PlayboxError::Cancelled`](crate::PlayboxError::Cancelled),
/// so a superseded save is distinguishable from a broken one.
pub trait RemoteStore: Send + Sync {
    /// Persist metadata and files remotely. Returns the server-confirmed
    /// project (assigned ids, advanced version, timestamps).
    fn save<'a>(
        &'a self,
        metadata: &'a ProjectMetadata,
        files: &'a FileCollection,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<RemoteProject>>;

    /// Fetch a project by owner and name keys.
    fn load<'a>(
        &'a self,
        owner: &'a str,
        name: &'a str,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<RemoteProject>>;
}

/// The local, always-available recovery cache collaborator.
pub trait LocalStore: Send + Sync {
    /// Write a full recovery snapshot under `key`, replacing any prior one.
    fn save<'a>(&'a self, key: &'a str, snapshot: &'a CachedProject) -> BoxFuture<'a, Result<()>>;

    /// Read the recovery snapshot stored under `key`, if any.
    fn load<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<CachedProject>>>;

    /// Drop the recovery snapshot stored under `key`.
    fn clear<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<()>>;
}

/// A single file inside a [`CachedProject`], with its content inlined.
///
/// Content is base64-encoded so the whole snapshot serializes as JSON-safe
/// text for stores like IndexedDB or a key-value table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedFile {
    /// Normalized project-relative path.
    pub path: String,
    /// MIME type of the content.
    pub mime_type: String,
    /// Base64-encoded file content.
    pub data: String,
}

/// A fully-materialized project snapshot as stored in the local cache.
///
/// Unlike a live [`FileCollection`], every file's content is loaded and
/// inlined: the cache must be readable later without any loaders around.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedProject {
    /// Project metadata at the time of the snapshot.
    pub metadata: ProjectMetadata,
    /// All files with inlined content.
    pub files: Vec<CachedFile>,
}

impl CachedProject {
    /// Materialize a snapshot from a live collection, loading every file.
    pub async fn from_collection(
        metadata: ProjectMetadata,
        files: &FileCollection,
        cancel: &CancellationToken,
    ) -> Result<Self> {
        let mut cached = Vec::with_capacity(files.len());
        for (path, file) in files.iter() {
            let bytes = file.content(cancel).await?;
            cached.push(CachedFile {
                path: path.to_string(),
                mime_type: file.mime_type().to_string(),
                data: BASE64.encode(bytes.as_slice()),
            });
        }
        Ok(Self {
            metadata,
            files: cached,
        })
    }

    /// Rebuild a live collection from the inlined content.
    pub fn into_collection(self) -> Result<(ProjectMetadata, FileCollection)> {
        let mut files = FileCollection::new();
        for cached in self.files {
            let bytes = BASE64.decode(cached.data.as_bytes())?;
            let name = cached
                .path
                .rsplit('/')
                .next()
                .unwrap_or(cached.path.as_str())
                .to_string();
            files.insert(&cached.path, LazyFile::from_bytes(name, cached.mime_type, bytes))?;
        }
        Ok((self.metadata, files))
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

// Blanket implementations for Arc-wrapped stores.
impl<T: RemoteStore + ?Sized> RemoteStore for Arc<T> {
    fn save<'a>(
        &'a self,
        metadata: &'a ProjectMetadata,
        files: &'a FileCollection,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<RemoteProject>> {
        (**self).save(metadata, files, cancel)
    }

    fn load<'a>(
        &'a self,
        owner: &'a str,
        name: &'a str,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<RemoteProject>> {
        (**self).load(owner, name, cancel)
    }
}

impl<T: LocalStore + ?Sized> LocalStore for Arc<T> {
    fn save<'a>(&'a self, key: &'a str, snapshot: &'a CachedProject) -> BoxFuture<'a, Result<()>> {
        (**self).save(key, snapshot)
    }

    fn load<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<CachedProject>>> {
        (**self).load(key)
    }

    fn clear<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<()>> {
        (**self).clear(key)
    }
}
