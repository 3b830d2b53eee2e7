//! Local recovery-cache coordinator.
//!
//! A debounced safety net that mirrors the current project (metadata +
//! files) into the local, always-available store. When cloud autosave is
//! active it degrades to merely touching every file, so subsequent lazy
//! loads are cheap without writing local storage. Local-store failures are
//! logged and not retried; this is already the fallback of last resort.

use std::sync::{Arc, Mutex};

use crate::cancel::CancellationToken;
use crate::config::{AutosaveMode, SyncSettings};
use crate::error::Result;
use crate::events::{CallbackRegistry, ProjectEvent};
use crate::project::{ProjectMetadata, ProjectModel};
use crate::store::{CachedProject, LocalStore};

use super::Debouncer;

/// Debounced mirror of the project into the local recovery cache.
pub struct LocalCacheSyncCoordinator {
    inner: Arc<LocalInner>,
}

struct LocalInner {
    model: Arc<dyn ProjectModel>,
    store: Arc<dyn LocalStore>,
    metadata: Arc<Mutex<ProjectMetadata>>,
    events: Arc<CallbackRegistry>,
    mode: Mutex<AutosaveMode>,
    /// Cache key: the server project id once assigned, a generated draft
    /// key before that.
    draft_key: String,
    /// Key the last recovery snapshot was written under. The server may
    /// assign an id between a write and the matching clear, which changes
    /// the current cache key; the written key is what must be dropped.
    written_key: Mutex<Option<String>>,
    debounce: Debouncer,
    teardown: CancellationToken,
}

impl LocalInner {
    fn cache_key(&self) -> String {
        let metadata = self.metadata.lock().unwrap();
        match &metadata.id {
            Some(id) => format!("project-{id}"),
            None => self.draft_key.clone(),
        }
    }
}

impl LocalCacheSyncCoordinator {
    /// Create a coordinator. `teardown` is the owning project's root token;
    /// when it cancels, pending debounced writes are discarded, not flushed.
    pub fn new(
        model: Arc<dyn ProjectModel>,
        store: Arc<dyn LocalStore>,
        metadata: Arc<Mutex<ProjectMetadata>>,
        events: Arc<CallbackRegistry>,
        settings: &SyncSettings,
        teardown: CancellationToken,
    ) -> Self {
        Self {
            inner: Arc::new(LocalInner {
                model,
                store,
                metadata,
                events,
                mode: Mutex::new(settings.autosave),
                draft_key: format!("draft-{}", uuid::Uuid::new_v4()),
                written_key: Mutex::new(None),
                debounce: Debouncer::new(settings.cache_debounce(), teardown.clone()),
                teardown,
            }),
        }
    }

    /// Change the autosave destination (e.g., after sign-in).
    pub fn set_mode(&self, mode: AutosaveMode) {
        *self.inner.mode.lock().unwrap() = mode;
    }

    /// The key the recovery snapshot is stored under.
    pub fn cache_key(&self) -> String {
        self.inner.cache_key()
    }

    /// Report that project content changed. Schedules a debounced mirror
    /// write (local-cache mode) or file touch (cloud mode). No-op once the
    /// owning project is torn down.
    pub fn notify_changed(&self) {
        if self.inner.teardown.is_cancelled() {
            return;
        }
        let inner = Arc::clone(&self.inner);
        self.inner.debounce.schedule(async move {
            let mode = *inner.mode.lock().unwrap();
            match mode {
                AutosaveMode::LocalCache => {
                    if let Err(err) = LocalInner::persist(&inner).await {
                        if !err.is_cancelled() {
                            log::warn!("[LocalCache] debounced write failed: {err}");
                        }
                    }
                }
                AutosaveMode::Cloud => {
                    // Force files into memory so later exports and saves
                    // don't stall on lazy loads.
                    let files = inner.model.export_files();
                    if let Err(err) = files.touch_all(&inner.teardown).await {
                        if !err.is_cancelled() {
                            log::debug!("[LocalCache] touch failed: {err}");
                        }
                    }
                }
                AutosaveMode::Off => {}
            }
        });
    }

    /// Write a recovery snapshot immediately, bypassing the debounce.
    ///
    /// Used by the cloud coordinator when a remote save fails.
    pub async fn persist_now(&self) -> Result<()> {
        LocalInner::persist(&self.inner).await
    }

    /// Drop the recovery snapshot: the changes it guarded are now safely
    /// remote (or were resolved out-of-band).
    ///
    /// Clears the key the snapshot was actually written under as well as
    /// the current key; a save that assigns the server id flips the key
    /// from draft to project between the write and this clear.
    pub async fn clear(&self) {
        let current = self.inner.cache_key();
        let written = self.inner.written_key.lock().unwrap().take();
        let mut cleared = true;
        for key in std::iter::once(current.clone()).chain(written.filter(|key| *key != current)) {
            if let Err(err) = self.inner.store.clear(&key).await {
                log::warn!("[LocalCache] clear failed for '{key}': {err}");
                cleared = false;
            }
        }
        if cleared {
            self.inner.events.emit(&ProjectEvent::CacheCleared);
        }
    }

    /// Load the recovery snapshot, if one exists.
    pub async fn restore(&self) -> Result<Option<CachedProject>> {
        let key = self.inner.cache_key();
        self.inner.store.load(&key).await
    }
}

impl LocalInner {
    async fn persist(inner: &Arc<LocalInner>) -> Result<()> {
        inner.teardown.check()?;
        let (metadata, files) = {
            let metadata = inner.metadata.lock().unwrap().clone();
            (metadata, inner.model.export_files())
        };
        let snapshot = CachedProject::from_collection(metadata, &files, &inner.teardown).await?;
        let key = inner.cache_key();
        inner.store.save(&key, &snapshot).await?;
        *inner.written_key.lock().unwrap() = Some(key.clone());
        log::debug!(
            "[LocalCache] wrote recovery snapshot '{}' ({} files)",
            key,
            snapshot.files.len()
        );
        inner.events.emit(&ProjectEvent::CacheSaved);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryLocalStore;
    use crate::test_utils::MockModel;
    use std::time::Duration;

    type Setup = (
        LocalCacheSyncCoordinator,
        MemoryLocalStore,
        Arc<Mutex<ProjectMetadata>>,
        CancellationToken,
    );

    fn setup(mode: AutosaveMode) -> Setup {
        let model = Arc::new(MockModel::with_file("a.png", vec![1, 2, 3]));
        let store = MemoryLocalStore::new();
        let metadata = Arc::new(Mutex::new(ProjectMetadata::new("platformer")));
        let settings = SyncSettings {
            autosave: mode,
            cache_debounce_ms: 50,
            ..SyncSettings::default()
        };
        let teardown = CancellationToken::new();
        let coordinator = LocalCacheSyncCoordinator::new(
            model,
            Arc::new(store.clone()),
            metadata.clone(),
            Arc::new(CallbackRegistry::new()),
            &settings,
            teardown.clone(),
        );
        (coordinator, store, metadata, teardown)
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounced_write_in_local_cache_mode() {
        let (coordinator, store, _metadata, _teardown) = setup(AutosaveMode::LocalCache);

        coordinator.notify_changed();
        coordinator.notify_changed();
        assert!(store.is_empty());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(store.len(), 1);

        let snapshot = coordinator.restore().await.unwrap().unwrap();
        assert_eq!(snapshot.files.len(), 1);
        assert_eq!(snapshot.files[0].path, "a.png");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cloud_mode_touches_without_writing() {
        let (coordinator, store, _metadata, _teardown) = setup(AutosaveMode::Cloud);

        coordinator.notify_changed();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_discards_pending_write() {
        let (coordinator, store, _metadata, teardown) = setup(AutosaveMode::LocalCache);

        coordinator.notify_changed();
        teardown.cancel();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(store.is_empty());

        // Further notifications are no-ops.
        coordinator.notify_changed();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_persist_now_and_clear() {
        let (coordinator, store, _metadata, _teardown) = setup(AutosaveMode::Cloud);

        coordinator.persist_now().await.unwrap();
        assert_eq!(store.len(), 1);

        coordinator.clear().await;
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_clear_drops_snapshot_written_under_draft_key() {
        let (coordinator, store, metadata, _teardown) = setup(AutosaveMode::Cloud);

        // Snapshot lands under the draft key while the project has no id.
        coordinator.persist_now().await.unwrap();
        assert_eq!(store.len(), 1);

        // A later remote save assigns the server id, flipping the current
        // cache key to project-{id}. The draft snapshot must still go.
        metadata.lock().unwrap().id = Some("p-1".into());

        coordinator.clear().await;
        assert!(store.is_empty());
    }
}
