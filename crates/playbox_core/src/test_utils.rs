//! Shared test doubles: a gateable file loader, a scriptable remote store,
//! and a minimal in-memory project model.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use chrono::Utc;
use tokio::sync::watch;

use crate::cancel::CancellationToken;
use crate::error::{PlayboxError, Result};
use crate::file::{FileCollection, FileLoader, LazyFile};
use crate::project::{ProjectMetadata, ProjectModel};
use crate::store::{BoxFuture, RemoteProject, RemoteStore};

/// A [`FileLoader`] whose completion the test controls.
///
/// Three modes: resolve immediately (`new`), block until [`release`]
/// (`gated`), or fail the first invocation and succeed afterwards
/// (`failing_once`). Tracks invocation and cancellation observations.
///
/// [`release`]: GatedLoader::release
pub struct GatedLoader {
    payload: Vec<u8>,
    gated: bool,
    release_tx: watch::Sender<bool>,
    cancelled_tx: watch::Sender<bool>,
    invocations: AtomicUsize,
    failures_remaining: AtomicUsize,
}

impl GatedLoader {
    /// A loader that resolves as soon as it is polled.
    pub fn new(payload: Vec<u8>) -> Self {
        Self::build(payload, false, 0)
    }

    /// A loader that blocks until [`release`](GatedLoader::release).
    pub fn gated(payload: Vec<u8>) -> Self {
        Self::build(payload, true, 0)
    }

    /// A loader whose first invocation fails; later ones succeed.
    pub fn failing_once(payload: Vec<u8>) -> Self {
        Self::build(payload, false, 1)
    }

    fn build(payload: Vec<u8>, gated: bool, failures: usize) -> Self {
        Self {
            payload,
            gated,
            release_tx: watch::channel(false).0,
            cancelled_tx: watch::channel(false).0,
            invocations: AtomicUsize::new(0),
            failures_remaining: AtomicUsize::new(failures),
        }
    }

    /// Unblock every in-flight gated load.
    pub fn release(&self) {
        self.release_tx.send_replace(true);
    }

    /// How many times `load` has been invoked.
    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }

    /// Whether an in-flight load observed cancellation.
    pub fn saw_cancellation(&self) -> bool {
        *self.cancelled_tx.borrow()
    }

    /// Wait until an in-flight load observes cancellation.
    pub async fn wait_cancelled(&self) {
        let mut rx = self.cancelled_tx.subscribe();
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl FileLoader for GatedLoader {
    fn load<'a>(&'a self, cancel: &'a CancellationToken) -> BoxFuture<'a, Result<Vec<u8>>> {
        Box::pin(async move {
            self.invocations.fetch_add(1, Ordering::SeqCst);
            if self.gated {
                let mut rx = self.release_tx.subscribe();
                tokio::select! {
                    _ = cancel.cancelled() => {
                        self.cancelled_tx.send_replace(true);
                        return Err(PlayboxError::Cancelled);
                    }
                    released = rx.wait_for(|released| *released) => {
                        let _ = released;
                    }
                }
            }
            cancel.check()?;
            if self.failures_remaining.load(Ordering::SeqCst) > 0 {
                self.failures_remaining.fetch_sub(1, Ordering::SeqCst);
                return Err(PlayboxError::Remote("simulated fetch failure".into()));
            }
            Ok(self.payload.clone())
        })
    }
}

/// A scriptable [`RemoteStore`].
///
/// `new` succeeds immediately, `gated` blocks saves until
/// [`release`](MockRemoteStore::release), `failing(n)` fails the next `n`
/// saves. Successful saves record the confirmed project and echo it back
/// with an assigned id, a bumped version, and fresh timestamps.
pub struct MockRemoteStore {
    gated: bool,
    release_tx: watch::Sender<bool>,
    save_count: AtomicUsize,
    failures_remaining: AtomicUsize,
    last_saved: Mutex<Option<RemoteProject>>,
}

impl MockRemoteStore {
    /// A store whose saves succeed immediately.
    pub fn new() -> Self {
        Self::build(false, 0)
    }

    /// A store whose saves block until [`release`](MockRemoteStore::release).
    pub fn gated() -> Self {
        Self::build(true, 0)
    }

    /// A store whose next `failures` saves fail with a remote error.
    pub fn failing(failures: usize) -> Self {
        Self::build(false, failures)
    }

    fn build(gated: bool, failures: usize) -> Self {
        Self {
            gated,
            release_tx: watch::channel(false).0,
            save_count: AtomicUsize::new(0),
            failures_remaining: AtomicUsize::new(failures),
            last_saved: Mutex::new(None),
        }
    }

    /// Unblock every in-flight gated save.
    pub fn release(&self) {
        self.release_tx.send_replace(true);
    }

    /// How many save attempts reached the store.
    pub fn save_count(&self) -> usize {
        self.save_count.load(Ordering::SeqCst)
    }

    /// The last successfully-saved project, if any.
    pub fn last_saved(&self) -> Option<RemoteProject> {
        self.last_saved.lock().unwrap().clone()
    }
}

impl RemoteStore for MockRemoteStore {
    fn save<'a>(
        &'a self,
        metadata: &'a ProjectMetadata,
        files: &'a FileCollection,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<RemoteProject>> {
        Box::pin(async move {
            self.save_count.fetch_add(1, Ordering::SeqCst);
            if self.gated {
                let mut rx = self.release_tx.subscribe();
                tokio::select! {
                    _ = cancel.cancelled() => return Err(PlayboxError::Cancelled),
                    released = rx.wait_for(|released| *released) => {
                        let _ = released;
                    }
                }
            }
            cancel.check()?;
            if self.failures_remaining.load(Ordering::SeqCst) > 0 {
                self.failures_remaining.fetch_sub(1, Ordering::SeqCst);
                return Err(PlayboxError::Remote("simulated outage".into()));
            }

            let mut confirmed = metadata.clone();
            if confirmed.id.is_none() {
                confirmed.id = Some("p-1".into());
            }
            confirmed.version += 1;
            let now = Utc::now();
            confirmed.created_at.get_or_insert(now);
            confirmed.updated_at = Some(now);

            let project = RemoteProject {
                metadata: confirmed,
                files: files.clone(),
            };
            *self.last_saved.lock().unwrap() = Some(project.clone());
            Ok(project)
        })
    }

    fn load<'a>(
        &'a self,
        _owner: &'a str,
        name: &'a str,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<RemoteProject>> {
        Box::pin(async move {
            cancel.check()?;
            self.last_saved
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| PlayboxError::Remote(format!("project '{name}' not found")))
        })
    }
}

/// A [`ProjectModel`] holding its files directly in memory.
pub struct MockModel {
    files: Mutex<FileCollection>,
    load_count: AtomicUsize,
    thumbnail_count: AtomicUsize,
}

impl MockModel {
    /// A model seeded with a single preloaded file.
    pub fn with_file(path: &str, bytes: Vec<u8>) -> Self {
        let mut files = FileCollection::new();
        files
            .insert(path, LazyFile::from_bytes(path, "application/octet-stream", bytes))
            .unwrap();
        Self {
            files: Mutex::new(files),
            load_count: AtomicUsize::new(0),
            thumbnail_count: AtomicUsize::new(0),
        }
    }

    /// Overwrite (or add) a file's content, as an editor mutation would.
    pub fn set_file(&self, path: &str, bytes: Vec<u8>) {
        self.files
            .lock()
            .unwrap()
            .insert(path, LazyFile::from_bytes(path, "application/octet-stream", bytes))
            .unwrap();
    }

    /// Insert a pre-built file, e.g. a lazy one with a gated loader.
    pub fn insert_file(&self, path: &str, file: LazyFile) {
        self.files.lock().unwrap().insert(path, file).unwrap();
    }

    /// A file's cached content, for assertions.
    pub fn file_content(&self, path: &str) -> Option<Vec<u8>> {
        self.files
            .lock()
            .unwrap()
            .get(path)
            .and_then(|file| file.cached_content())
            .map(|bytes| bytes.as_ref().clone())
    }

    /// How many snapshots have been loaded back into the model.
    pub fn load_count(&self) -> usize {
        self.load_count.load(Ordering::SeqCst)
    }

    /// How many times a thumbnail refresh was requested.
    pub fn thumbnail_count(&self) -> usize {
        self.thumbnail_count.load(Ordering::SeqCst)
    }
}

impl ProjectModel for MockModel {
    fn export_files(&self) -> FileCollection {
        self.files.lock().unwrap().clone()
    }

    fn load<'a>(
        &'a self,
        _metadata: Option<ProjectMetadata>,
        files: FileCollection,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            *self.files.lock().unwrap() = files;
            self.load_count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    fn ensure_thumbnail<'a>(&'a self, cancel: &'a CancellationToken) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            cancel.check()?;
            self.thumbnail_count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }
}

impl Default for MockRemoteStore {
    fn default() -> Self {
        Self::new()
    }
}
