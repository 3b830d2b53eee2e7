//! Lazily-loaded, content-addressable project files.
//!
//! A [`LazyFile`] is an immutable-identity binary blob with a user-supplied
//! loader. Content is loaded at most once: concurrent readers share a single
//! in-flight loader invocation, and each reader can abandon interest through
//! its own cancellation token without stalling the others. The loader's own
//! token is only cancelled once *every* attached reader has cancelled.
//!
//! On success the content is cached for all future calls. On failure nothing
//! is cached: the next call starts a fresh loader invocation, so a transient
//! loader error never poisons the file.
//!
//! # Example
//!
//! ```ignore
//! use playbox_core::cancel::CancellationToken;
//! use playbox_core::file::LazyFile;
//!
//! let file = LazyFile::from_bytes("a.png", "image/png", png_bytes);
//! let bytes = file.content(&CancellationToken::new()).await?;
//! ```

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::watch;

use crate::cancel::CancellationToken;
use crate::error::{PlayboxError, Result};
use crate::hash;
use crate::store::BoxFuture;

/// Counter for per-instance file identities.
static NEXT_FILE_ID: AtomicU64 = AtomicU64::new(1);

/// Loader for a [`LazyFile`]'s content.
///
/// Implementations must honor the cancellation token by aborting the
/// in-flight transfer and returning [`PlayboxError::Cancelled`]. The token
/// passed here belongs to the shared load, not to any individual caller; it
/// fires only when no caller remains interested.
pub trait FileLoader: Send + Sync {
    /// Fetch the file's content.
    fn load<'a>(&'a self, cancel: &'a CancellationToken) -> BoxFuture<'a, Result<Vec<u8>>>;
}

// Blanket implementation so plain closures can act as loaders.
impl<F> FileLoader for F
where
    F: for<'a> Fn(&'a CancellationToken) -> BoxFuture<'a, Result<Vec<u8>>> + Send + Sync,
{
    fn load<'a>(&'a self, cancel: &'a CancellationToken) -> BoxFuture<'a, Result<Vec<u8>>> {
        self(cancel)
    }
}

/// Loader backing files constructed directly from bytes. Never actually
/// invoked because the content starts out cached.
struct StaticLoader(Arc<Vec<u8>>);

impl FileLoader for StaticLoader {
    fn load<'a>(&'a self, _cancel: &'a CancellationToken) -> BoxFuture<'a, Result<Vec<u8>>> {
        let bytes = self.0.as_ref().clone();
        Box::pin(async move { Ok(bytes) })
    }
}

/// Outcome broadcast to every caller attached to a shared load.
type LoadOutcome = std::result::Result<Arc<Vec<u8>>, Arc<PlayboxError>>;

/// A shared in-flight load operation.
#[derive(Clone)]
struct InFlight {
    /// Monotonic id distinguishing this load from later restarts.
    epoch: u64,
    /// Completion channel; `None` until the driver task finishes.
    done: watch::Receiver<Option<LoadOutcome>>,
    /// Number of attached callers that have not cancelled.
    interested: Arc<AtomicUsize>,
    /// Token handed to the loader itself.
    loader_cancel: CancellationToken,
}

enum LoadState {
    /// No content and no load in flight.
    Idle,
    /// A shared load is in flight.
    Loading(InFlight),
    /// Content is cached; the loader will never run again.
    Cached(Arc<Vec<u8>>),
}

struct FileInner {
    id: u64,
    name: String,
    mime_type: String,
    loader: Arc<dyn FileLoader>,
    state: Mutex<LoadState>,
    next_epoch: AtomicU64,
    digest: Mutex<Option<String>>,
}

/// An immutable-identity, lazily-loaded binary blob.
///
/// Cloning a `LazyFile` is cheap and preserves identity: clones share the
/// same content cache and the same [`LazyFile::id`]. Identity is by
/// instance, not by content; the same instance may be shared across many
/// [`FileCollection`](super::FileCollection) snapshots.
#[derive(Clone)]
pub struct LazyFile {
    inner: Arc<FileInner>,
}

impl LazyFile {
    /// Create a file whose content is fetched on demand by `loader`.
    pub fn new(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        loader: Arc<dyn FileLoader>,
    ) -> Self {
        Self {
            inner: Arc::new(FileInner {
                id: NEXT_FILE_ID.fetch_add(1, Ordering::SeqCst),
                name: name.into(),
                mime_type: mime_type.into(),
                loader,
                state: Mutex::new(LoadState::Idle),
                next_epoch: AtomicU64::new(1),
                digest: Mutex::new(None),
            }),
        }
    }

    /// Create a file whose content is already in memory.
    pub fn from_bytes(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        let bytes = Arc::new(bytes);
        let file = Self::new(name, mime_type, Arc::new(StaticLoader(bytes.clone())));
        *file.inner.state.lock().unwrap() = LoadState::Cached(bytes);
        file
    }

    /// Per-instance identity, stable across clones.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// File name (typically the last path component).
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// MIME type of the content.
    pub fn mime_type(&self) -> &str {
        &self.inner.mime_type
    }

    /// Whether the content is cached in memory.
    pub fn is_loaded(&self) -> bool {
        matches!(*self.inner.state.lock().unwrap(), LoadState::Cached(_))
    }

    /// Cached content, if any, without triggering a load.
    pub fn cached_content(&self) -> Option<Arc<Vec<u8>>> {
        match &*self.inner.state.lock().unwrap() {
            LoadState::Cached(bytes) => Some(bytes.clone()),
            _ => None,
        }
    }

    /// Get the file's content, loading it if necessary.
    ///
    /// Concurrent callers share a single loader invocation. Cancelling
    /// `cancel` rejects only this caller; the shared load keeps running for
    /// the remaining callers and is itself cancelled only once every caller
    /// has cancelled. Cached content is returned immediately regardless of
    /// the token's state.
    pub async fn content(&self, cancel: &CancellationToken) -> Result<Arc<Vec<u8>>> {
        let inflight = {
            let mut state = self.inner.state.lock().unwrap();
            match &*state {
                LoadState::Cached(bytes) => return Ok(bytes.clone()),
                LoadState::Loading(inflight) if !inflight.loader_cancel.is_cancelled() => {
                    if cancel.is_cancelled() {
                        return Err(PlayboxError::Cancelled);
                    }
                    inflight.interested.fetch_add(1, Ordering::SeqCst);
                    inflight.clone()
                }
                _ => {
                    // Idle, or a fully-cancelled load that has not yet been
                    // cleaned up by its driver task: start fresh.
                    if cancel.is_cancelled() {
                        return Err(PlayboxError::Cancelled);
                    }
                    let inflight = self.start_load();
                    *state = LoadState::Loading(inflight.clone());
                    inflight
                }
            }
        };

        let mut done = inflight.done.clone();
        let outcome = tokio::select! {
            _ = cancel.cancelled() => {
                // Withdraw this caller's interest. The last one out cancels
                // the loader itself.
                if inflight.interested.fetch_sub(1, Ordering::SeqCst) == 1 {
                    inflight.loader_cancel.cancel();
                }
                return Err(PlayboxError::Cancelled);
            }
            outcome = Self::wait_outcome(&mut done) => outcome,
        };

        match outcome {
            Ok(bytes) => Ok(bytes),
            Err(source) => Err(PlayboxError::FileLoad {
                path: self.inner.name.clone(),
                source,
            }),
        }
    }

    async fn wait_outcome(done: &mut watch::Receiver<Option<LoadOutcome>>) -> LoadOutcome {
        loop {
            if let Some(outcome) = done.borrow_and_update().clone() {
                return outcome;
            }
            if done.changed().await.is_err() {
                // Driver task dropped without sending; treat as cancelled.
                return Err(Arc::new(PlayboxError::Cancelled));
            }
        }
    }

    /// Start a shared load and spawn the driver that runs the loader exactly
    /// once. Caller must store the returned in-flight handle into `state`.
    fn start_load(&self) -> InFlight {
        let epoch = self.inner.next_epoch.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = watch::channel(None);
        let loader_cancel = CancellationToken::new();
        let inflight = InFlight {
            epoch,
            done: rx,
            interested: Arc::new(AtomicUsize::new(1)),
            loader_cancel: loader_cancel.clone(),
        };

        let file = self.clone();
        tokio::spawn(async move {
            let result = file.inner.loader.load(&loader_cancel).await;
            let outcome = match result {
                Ok(bytes) => {
                    let bytes = Arc::new(bytes);
                    let mut state = file.inner.state.lock().unwrap();
                    // Cache even if this load was superseded; content is
                    // content. Never clobber an already-cached value.
                    match &*state {
                        LoadState::Cached(_) => {}
                        _ => *state = LoadState::Cached(bytes.clone()),
                    }
                    Ok(bytes)
                }
                Err(err) => {
                    let mut state = file.inner.state.lock().unwrap();
                    // Only clear our own in-flight slot; a newer load may
                    // already be running.
                    if let LoadState::Loading(cur) = &*state
                        && cur.epoch == epoch
                    {
                        *state = LoadState::Idle;
                    }
                    Err(Arc::new(err))
                }
            };
            let _ = tx.send(Some(outcome));
        });

        inflight
    }

    /// Content digest, memoized on the file once computed.
    ///
    /// Loads the content if it is not already cached. Large binary content is
    /// hashed at most once per instance regardless of how many snapshots the
    /// file appears in.
    pub async fn content_digest(&self, cancel: &CancellationToken) -> Result<String> {
        if let Some(digest) = self.inner.digest.lock().unwrap().clone() {
            return Ok(digest);
        }
        let bytes = self.content(cancel).await?;
        let digest = hash::digest_bytes(&bytes);
        *self.inner.digest.lock().unwrap() = Some(digest.clone());
        Ok(digest)
    }

    /// Content digest if it has already been computed.
    pub fn cached_digest(&self) -> Option<String> {
        self.inner.digest.lock().unwrap().clone()
    }
}

impl std::fmt::Debug for LazyFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LazyFile")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("mime_type", &self.inner.mime_type)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}
