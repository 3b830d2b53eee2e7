//! Cloud sync coordinator.
//!
//! A debounced, retryable, cancellable state machine that pushes the current
//! project snapshot to the remote store and tracks whether the last push
//! succeeded. See [`SyncState`] for the transitions.
//!
//! Ordering guarantees:
//!
//! - At most one physical remote-save call is outstanding per project. A
//!   newer save request cancels the older one rather than queuing behind it
//!   (last-writer-wins, not FIFO); the superseded attempt's future resolves
//!   with [`PlayboxError::Cancelled`], never a generic failure.
//! - `last_synced_files_hash` only advances to the digest that was actually
//!   sent, so edits made while a save is in flight stay unsynced and re-arm
//!   the coordinator immediately after the save completes.
//! - Failures from the remote store are converted into state transitions
//!   here; they never escape as unhandled errors from background tasks.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::cancel::CancellationToken;
use crate::config::SyncSettings;
use crate::error::{PlayboxError, Result};
use crate::events::{CallbackRegistry, ProjectEvent};
use crate::hash;
use crate::project::{ProjectMetadata, ProjectModel};
use crate::store::RemoteStore;

use super::{Debouncer, LocalCacheSyncCoordinator, SyncState};

/// Debounced, retryable push of the project to the remote store.
///
/// Exactly one instance exists per open project. Armed explicitly through
/// [`notify_changed`](CloudSyncCoordinator::notify_changed); flushed either
/// by the debounce timer or an explicit
/// [`save_to_cloud`](CloudSyncCoordinator::save_to_cloud).
pub struct CloudSyncCoordinator {
    inner: Arc<CloudInner>,
}

struct CloudInner {
    model: Arc<dyn ProjectModel>,
    remote: Arc<dyn RemoteStore>,
    local_cache: Arc<LocalCacheSyncCoordinator>,
    metadata: Arc<Mutex<ProjectMetadata>>,
    events: Arc<CallbackRegistry>,
    state: Mutex<SyncState>,
    /// Explicit network-status input; auto-save is skipped while offline.
    online: AtomicBool,
    /// Serializes physical remote writes.
    save_gate: tokio::sync::Mutex<()>,
    /// Cancellation token of the attempt currently owning (or waiting for)
    /// the gate, keyed by a save id so a finished attempt only clears its
    /// own slot.
    active_save: Mutex<Option<(u64, CancellationToken)>>,
    next_save_id: AtomicU64,
    save_debounce: Debouncer,
    retry_debounce: Debouncer,
    teardown: CancellationToken,
}

impl CloudSyncCoordinator {
    /// Create a coordinator for a freshly-opened project.
    pub fn new(
        model: Arc<dyn ProjectModel>,
        remote: Arc<dyn RemoteStore>,
        local_cache: Arc<LocalCacheSyncCoordinator>,
        metadata: Arc<Mutex<ProjectMetadata>>,
        events: Arc<CallbackRegistry>,
        settings: &SyncSettings,
        teardown: CancellationToken,
    ) -> Self {
        Self {
            inner: Arc::new(CloudInner {
                model,
                remote,
                local_cache,
                metadata,
                events,
                state: Mutex::new(SyncState::Saved),
                online: AtomicBool::new(true),
                save_gate: tokio::sync::Mutex::new(()),
                active_save: Mutex::new(None),
                next_save_id: AtomicU64::new(1),
                save_debounce: Debouncer::new(settings.save_debounce(), teardown.clone()),
                retry_debounce: Debouncer::new(settings.retry_delay(), teardown.clone()),
                teardown,
            }),
        }
    }

    /// Current state of the save state machine.
    pub fn state(&self) -> SyncState {
        *self.inner.state.lock().unwrap()
    }

    /// Whether the current snapshot digest differs from the last one
    /// confirmed saved.
    pub fn has_unsynced_changes(&self) -> bool {
        self.inner.metadata.lock().unwrap().has_unsynced_changes()
    }

    /// Report network status. Going online with unsynced changes re-arms
    /// the coordinator.
    pub fn set_online(&self, online: bool) {
        self.inner.online.store(online, Ordering::SeqCst);
        if online && self.has_unsynced_changes() {
            CloudInner::arm(&self.inner);
        }
    }

    /// Report that project content may have changed.
    ///
    /// Recomputes the snapshot digest; if it differs from the last synced
    /// digest the coordinator is armed (state becomes `Pending` unless a
    /// save is already running). If a `Failed` project turns out to have no
    /// unsynced changes anymore, the failure is cleared and the local
    /// safety copy dropped.
    pub async fn notify_changed(&self) -> Result<()> {
        let inner = &self.inner;
        if inner.teardown.is_cancelled() {
            return Ok(());
        }

        let files = inner.model.export_files();
        let digest = hash::hash_collection(&files, &inner.teardown).await?;
        let unsynced = {
            let mut metadata = inner.metadata.lock().unwrap();
            metadata.set_files_hash(digest);
            metadata.has_unsynced_changes()
        };

        if unsynced {
            CloudInner::arm(inner);
        } else if self.state() == SyncState::Failed {
            // Resolved out-of-band; nothing left to retry.
            inner.set_state(SyncState::Saved);
            inner.local_cache.clear().await;
        }
        Ok(())
    }

    /// Save immediately, bypassing the debounce window.
    ///
    /// If another save is physically in flight it is cancelled and this
    /// attempt takes over (last-writer-wins). The superseded caller gets
    /// [`PlayboxError::Cancelled`].
    pub async fn save_to_cloud(&self) -> Result<()> {
        self.inner.save_debounce.cancel_pending();
        CloudInner::flush(Arc::clone(&self.inner)).await
    }
}

impl CloudInner {
    fn set_state(&self, next: SyncState) {
        let mut state = self.state.lock().unwrap();
        if *state != next {
            log::debug!("[CloudSync] {:?} -> {:?}", *state, next);
            *state = next;
            drop(state);
            self.events.emit(&ProjectEvent::SyncStateChanged(next));
        }
    }

    /// Move to `Pending` (unless a save is running) and schedule a
    /// debounced flush. Does not schedule while offline; `set_online`
    /// re-arms when connectivity returns.
    fn arm(inner: &Arc<CloudInner>) {
        {
            let mut state = inner.state.lock().unwrap();
            match *state {
                SyncState::Saving | SyncState::Pending => {}
                _ => {
                    log::debug!("[CloudSync] {:?} -> Pending", *state);
                    *state = SyncState::Pending;
                    drop(state);
                    inner
                        .events
                        .emit(&ProjectEvent::SyncStateChanged(SyncState::Pending));
                }
            }
        }

        if !inner.online.load(Ordering::SeqCst) {
            log::debug!("[CloudSync] offline, holding auto-save");
            return;
        }

        let flush_inner = Arc::clone(inner);
        inner.save_debounce.schedule(async move {
            if let Err(err) = CloudInner::flush(flush_inner).await
                && !err.is_cancelled()
            {
                log::debug!("[CloudSync] debounced save failed: {err}");
            }
        });
    }

    /// One logical save attempt.
    async fn flush(inner: Arc<CloudInner>) -> Result<()> {
        inner.teardown.check()?;

        let my_id = inner.next_save_id.fetch_add(1, Ordering::SeqCst);
        let my_token = inner.teardown.child_token();
        {
            let mut active = inner.active_save.lock().unwrap();
            if let Some((_, prev)) = active.replace((my_id, my_token.clone())) {
                // Last-writer-wins: supersede the older attempt. It unblocks
                // promptly and resolves with Cancelled, not a failure.
                prev.cancel();
            }
        }

        // At most one physical remote write at a time. Waiting attempts that
        // were themselves superseded bail out here without ever touching the
        // remote store, which bounds restart storms under rapid editing.
        let gate = inner.save_gate.lock().await;
        if my_token.is_cancelled() {
            return Err(PlayboxError::Cancelled);
        }

        inner.set_state(SyncState::Saving);
        let result = CloudInner::perform_save(&inner, &my_token).await;
        drop(gate);

        {
            let mut active = inner.active_save.lock().unwrap();
            if matches!(&*active, Some((id, _)) if *id == my_id) {
                *active = None;
            }
        }

        match result {
            Ok(sent_digest) => {
                let still_dirty = inner.metadata.lock().unwrap().has_unsynced_changes();
                if still_dirty {
                    // Edits arrived during the save; re-arm right away.
                    inner.set_state(SyncState::Pending);
                    CloudInner::arm(&inner);
                } else {
                    inner.set_state(SyncState::Saved);
                    inner.local_cache.clear().await;
                }
                log::info!("[CloudSync] saved snapshot {sent_digest}");
                Ok(())
            }
            Err(err) if err.is_cancelled() => {
                // Superseded (the newer attempt flushes itself) or torn
                // down. Deliberately not a state-machine failure.
                Err(PlayboxError::Cancelled)
            }
            Err(err) => {
                log::warn!("[CloudSync] save failed: {err}");
                inner.set_state(SyncState::Failed);
                if let Err(cache_err) = inner.local_cache.persist_now().await
                    && !cache_err.is_cancelled()
                {
                    log::warn!("[CloudSync] safety-net write failed: {cache_err}");
                }
                CloudInner::schedule_retry(&inner);
                Err(err)
            }
        }
    }

    /// The body of a save attempt: thumbnail, export, hash, remote call,
    /// metadata merge.
    async fn perform_save(inner: &Arc<CloudInner>, cancel: &CancellationToken) -> Result<String> {
        inner.model.ensure_thumbnail(cancel).await?;

        let files = inner.model.export_files();
        let sent_digest = hash::hash_collection(&files, cancel).await?;
        // The digest goes on a private snapshot only. Writing it into the
        // shared metadata here would clobber a fresher files_hash set by a
        // concurrent edit and make the project look clean.
        let metadata_snapshot = {
            let mut snapshot = inner.metadata.lock().unwrap().clone();
            snapshot.set_files_hash(sent_digest.clone());
            snapshot
        };

        let response = inner.remote.save(&metadata_snapshot, &files, cancel).await?;

        {
            let mut metadata = inner.metadata.lock().unwrap();
            metadata.merge_remote(&response.metadata);
            // Advance to the digest that was actually sent, not whatever the
            // snapshot hashes to by now.
            metadata.mark_synced(sent_digest.clone());
        }
        inner.events.emit(&ProjectEvent::MetadataSynced);
        Ok(sent_digest)
    }

    /// Debounced retry: fires only while still `Failed`, and only if
    /// unsynced changes still exist.
    fn schedule_retry(inner: &Arc<CloudInner>) {
        let retry_inner = Arc::clone(inner);
        inner.retry_debounce.schedule(async move {
            if *retry_inner.state.lock().unwrap() != SyncState::Failed {
                return;
            }
            let dirty = retry_inner.metadata.lock().unwrap().has_unsynced_changes();
            if !dirty {
                // Resolved out-of-band; drop the safety copy.
                retry_inner.set_state(SyncState::Saved);
                retry_inner.local_cache.clear().await;
                return;
            }
            if !retry_inner.online.load(Ordering::SeqCst) {
                // set_online re-arms when connectivity returns.
                return;
            }
            if let Err(err) = CloudInner::flush(Arc::clone(&retry_inner)).await
                && !err.is_cancelled()
            {
                log::debug!("[CloudSync] retry failed: {err}");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AutosaveMode;
    use crate::file::LazyFile;
    use crate::store::MemoryLocalStore;
    use crate::test_utils::{GatedLoader, MockModel, MockRemoteStore};
    use std::time::Duration;

    struct Fixture {
        cloud: Arc<CloudSyncCoordinator>,
        model: Arc<MockModel>,
        remote: Arc<MockRemoteStore>,
        local_store: MemoryLocalStore,
        teardown: CancellationToken,
    }

    fn fixture(remote: MockRemoteStore) -> Fixture {
        let model = Arc::new(MockModel::with_file("a.png", vec![1, 2, 3]));
        let remote = Arc::new(remote);
        let local_store = MemoryLocalStore::new();
        let metadata = Arc::new(Mutex::new(ProjectMetadata::new("platformer")));
        let events = Arc::new(CallbackRegistry::new());
        let settings = SyncSettings {
            autosave: AutosaveMode::Cloud,
            save_debounce_ms: 100,
            retry_delay_ms: 1_000,
            ..SyncSettings::default()
        };
        let teardown = CancellationToken::new();
        let local_cache = Arc::new(LocalCacheSyncCoordinator::new(
            model.clone() as Arc<dyn ProjectModel>,
            Arc::new(local_store.clone()),
            metadata.clone(),
            events.clone(),
            &settings,
            teardown.clone(),
        ));
        let cloud = Arc::new(CloudSyncCoordinator::new(
            model.clone() as Arc<dyn ProjectModel>,
            remote.clone() as Arc<dyn RemoteStore>,
            local_cache,
            metadata,
            events,
            &settings,
            teardown.clone(),
        ));
        Fixture {
            cloud,
            model,
            remote,
            local_store,
            teardown,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_edit_debounce_save_cycle() {
        let fx = fixture(MockRemoteStore::new());

        // Edit a costume -> digest changes -> coordinator armed.
        fx.model.set_file("a.png", vec![9, 9, 9]);
        fx.cloud.notify_changed().await.unwrap();
        assert_eq!(fx.cloud.state(), SyncState::Pending);
        assert!(fx.cloud.has_unsynced_changes());
        assert_eq!(fx.remote.save_count(), 0);

        // Debounce elapses -> one remote save -> Saved, digests agree.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(fx.remote.save_count(), 1);
        assert_eq!(fx.cloud.state(), SyncState::Saved);
        assert!(!fx.cloud.has_unsynced_changes());
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_of_edits_coalesces_into_one_save() {
        let fx = fixture(MockRemoteStore::new());

        for byte in 0..5u8 {
            fx.model.set_file("a.png", vec![byte]);
            fx.cloud.notify_changed().await.unwrap();
            tokio::time::advance(Duration::from_millis(10)).await;
        }
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(fx.remote.save_count(), 1);
        assert_eq!(fx.cloud.state(), SyncState::Saved);
    }

    #[tokio::test(start_paused = true)]
    async fn test_supersession_rejects_older_save() {
        let fx = fixture(MockRemoteStore::gated());

        fx.model.set_file("a.png", vec![1]);
        fx.cloud.notify_changed().await.unwrap();

        let first = {
            let cloud = fx.cloud.clone();
            tokio::spawn(async move { cloud.save_to_cloud().await })
        };
        tokio::task::yield_now().await;
        assert_eq!(fx.cloud.state(), SyncState::Saving);

        let second = {
            let cloud = fx.cloud.clone();
            tokio::spawn(async move { cloud.save_to_cloud().await })
        };
        tokio::task::yield_now().await;
        fx.remote.release();

        // The first attempt rejects with a cancellation error, the second
        // resolves normally; the remote store saw both attempts.
        let first = first.await.unwrap();
        assert!(first.unwrap_err().is_cancelled());
        second.await.unwrap().unwrap();
        assert_eq!(fx.remote.save_count(), 2);
        assert_eq!(fx.cloud.state(), SyncState::Saved);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_writes_safety_copy_then_retry_succeeds() {
        let fx = fixture(MockRemoteStore::failing(1));

        fx.model.set_file("a.png", vec![4]);
        fx.cloud.notify_changed().await.unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(fx.cloud.state(), SyncState::Failed);
        assert!(fx.cloud.has_unsynced_changes());
        // Safety copy landed in the local cache.
        assert_eq!(fx.local_store.len(), 1);

        // Debounced retry fires and succeeds; the safety copy is dropped.
        tokio::time::sleep(Duration::from_millis(1_100)).await;
        assert_eq!(fx.cloud.state(), SyncState::Saved);
        assert!(!fx.cloud.has_unsynced_changes());
        assert!(fx.local_store.is_empty());
        assert_eq!(fx.remote.save_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_noop_after_out_of_band_resolution() {
        let fx = fixture(MockRemoteStore::failing(1));

        fx.model.set_file("a.png", vec![4]);
        fx.cloud.notify_changed().await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(fx.cloud.state(), SyncState::Failed);

        // The change is resolved out-of-band (e.g., the snapshot reverted).
        {
            let mut metadata = fx.cloud.inner.metadata.lock().unwrap();
            let digest = metadata.files_hash.clone().unwrap();
            metadata.mark_synced(digest);
        }

        tokio::time::sleep(Duration::from_millis(1_100)).await;
        assert_eq!(fx.cloud.state(), SyncState::Saved);
        assert!(fx.local_store.is_empty());
        assert_eq!(fx.remote.save_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_offline_holds_autosave_until_online() {
        let fx = fixture(MockRemoteStore::new());
        fx.cloud.set_online(false);

        fx.model.set_file("a.png", vec![6]);
        fx.cloud.notify_changed().await.unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(fx.cloud.state(), SyncState::Pending);
        assert_eq!(fx.remote.save_count(), 0);

        fx.cloud.set_online(true);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(fx.cloud.state(), SyncState::Saved);
        assert_eq!(fx.remote.save_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_edits_during_save_rearm_immediately() {
        let fx = fixture(MockRemoteStore::gated());

        fx.model.set_file("a.png", vec![1]);
        fx.cloud.notify_changed().await.unwrap();

        let save = {
            let cloud = fx.cloud.clone();
            tokio::spawn(async move { cloud.save_to_cloud().await })
        };
        tokio::task::yield_now().await;

        // Edit while the save is in flight.
        fx.model.set_file("a.png", vec![2]);
        fx.cloud.notify_changed().await.unwrap();
        assert_eq!(fx.cloud.state(), SyncState::Saving);

        fx.remote.release();
        save.await.unwrap().unwrap();

        // The sent digest is stale, so the save re-arms instead of settling.
        assert!(fx.cloud.has_unsynced_changes());
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(fx.cloud.state(), SyncState::Saved);
        assert_eq!(fx.remote.save_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_edit_while_save_hashes_keeps_unsynced_digest() {
        let fx = fixture(MockRemoteStore::new());

        // An unloaded file whose fetch the test controls: the save attempt
        // blocks inside its digest pass, after any edit notifications that
        // race with it have already recorded their digests.
        let loader = Arc::new(GatedLoader::gated(vec![7, 7]));
        fx.model.insert_file(
            "b.bin",
            LazyFile::new("b.bin", "application/octet-stream", loader.clone()),
        );

        let save = {
            let cloud = fx.cloud.clone();
            tokio::spawn(async move { cloud.save_to_cloud().await })
        };
        tokio::task::yield_now().await;
        assert_eq!(fx.cloud.state(), SyncState::Saving);

        // Replace the blocked file while the save is still hashing its own
        // snapshot; the fresh content hashes immediately.
        fx.model.set_file("b.bin", vec![8]);
        fx.cloud.notify_changed().await.unwrap();
        assert!(fx.cloud.has_unsynced_changes());

        loader.release();
        save.await.unwrap().unwrap();

        // The save finished hashing after the edit; the digest it sent must
        // not displace the edit's, so the project stays dirty and re-arms.
        assert!(fx.cloud.has_unsynced_changes());
        assert_eq!(fx.cloud.state(), SyncState::Pending);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(fx.cloud.state(), SyncState::Saved);
        assert_eq!(fx.remote.save_count(), 2);
        assert!(!fx.cloud.has_unsynced_changes());
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_discards_pending_save() {
        let fx = fixture(MockRemoteStore::new());

        fx.model.set_file("a.png", vec![3]);
        fx.cloud.notify_changed().await.unwrap();
        fx.teardown.cancel();

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(fx.remote.save_count(), 0);
        assert!(
            fx.cloud
                .save_to_cloud()
                .await
                .unwrap_err()
                .is_cancelled()
        );
    }
}
