//! The per-project facade.
//!
//! A [`ProjectSession`] owns one open project: its metadata, its sync
//! coordinators, and its undo history, wired to the host-supplied model and
//! store collaborators. The host reports edits through
//! [`notify_changed`](ProjectSession::notify_changed) (or the
//! history-logging [`do_action`](ProjectSession::do_action)); everything
//! downstream of that — hashing, debouncing, saving, recovery snapshots —
//! happens here.

use std::future::Future;
use std::sync::{Arc, Mutex};

use crate::archive::{self, ArchiveCodec};
use crate::cancel::CancellationToken;
use crate::config::{AutosaveMode, SyncSettings};
use crate::error::Result;
use crate::events::{CallbackRegistry, EventCallback, ProjectEvent, SubscriptionId};
use crate::hash;
use crate::history::{Action, HistoryManager};
use crate::project::{ProjectMetadata, ProjectModel};
use crate::sync::{CloudSyncCoordinator, LocalCacheSyncCoordinator, SyncState};
use crate::store::{LocalStore, RemoteStore};

/// One open project: model, metadata, sync coordinators, and history.
///
/// Closing the session ([`close`](ProjectSession::close)) cancels all
/// outstanding work; pending debounced saves are discarded, not flushed.
pub struct ProjectSession {
    model: Arc<dyn ProjectModel>,
    remote: Arc<dyn RemoteStore>,
    metadata: Arc<Mutex<ProjectMetadata>>,
    events: Arc<CallbackRegistry>,
    local: Arc<LocalCacheSyncCoordinator>,
    cloud: CloudSyncCoordinator,
    history: HistoryManager,
    autosave: AutosaveMode,
    teardown: CancellationToken,
}

impl ProjectSession {
    /// Open a project over the given collaborators.
    pub fn new(
        model: Arc<dyn ProjectModel>,
        remote: Arc<dyn RemoteStore>,
        local_store: Arc<dyn LocalStore>,
        metadata: ProjectMetadata,
        settings: SyncSettings,
    ) -> Self {
        let metadata = Arc::new(Mutex::new(metadata));
        let events = Arc::new(CallbackRegistry::new());
        let teardown = CancellationToken::new();
        let local = Arc::new(LocalCacheSyncCoordinator::new(
            model.clone(),
            local_store,
            metadata.clone(),
            events.clone(),
            &settings,
            teardown.clone(),
        ));
        let cloud = CloudSyncCoordinator::new(
            model.clone(),
            remote.clone(),
            local.clone(),
            metadata.clone(),
            events.clone(),
            &settings,
            teardown.clone(),
        );
        let history = HistoryManager::new(model.clone(), settings.max_undo);
        Self {
            model,
            remote,
            metadata,
            events,
            local,
            cloud,
            history,
            autosave: settings.autosave,
            teardown,
        }
    }

    /// Subscribe to project events. Returns an id for
    /// [`unsubscribe`](ProjectSession::unsubscribe).
    pub fn subscribe(&self, callback: EventCallback) -> SubscriptionId {
        self.events.subscribe(callback)
    }

    /// Remove a subscription.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    /// A snapshot of the current metadata.
    pub fn metadata(&self) -> ProjectMetadata {
        self.metadata.lock().unwrap().clone()
    }

    /// Current cloud sync state.
    pub fn sync_state(&self) -> SyncState {
        self.cloud.state()
    }

    /// Whether the current snapshot differs from the last confirmed save.
    pub fn has_unsynced_changes(&self) -> bool {
        self.cloud.has_unsynced_changes()
    }

    /// Report network status; going online with unsynced changes re-arms
    /// autosave.
    pub fn set_online(&self, online: bool) {
        self.cloud.set_online(online);
    }

    /// Report that project content may have changed.
    ///
    /// Recomputes the snapshot digest and, depending on the autosave mode,
    /// arms the cloud coordinator and/or the local cache mirror. With
    /// autosave off the digest is still refreshed so
    /// [`has_unsynced_changes`](ProjectSession::has_unsynced_changes) stays
    /// accurate.
    pub async fn notify_changed(&self) -> Result<()> {
        match self.autosave {
            AutosaveMode::Cloud => {
                self.cloud.notify_changed().await?;
                self.local.notify_changed();
            }
            AutosaveMode::LocalCache => {
                self.refresh_hash().await?;
                self.local.notify_changed();
            }
            AutosaveMode::Off => {
                self.refresh_hash().await?;
            }
        }
        Ok(())
    }

    /// Log `action` in the history, run its mutator, then report the change
    /// to the sync coordinators.
    pub async fn do_action<F, Fut, T>(&self, action: Action, mutator: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let result = self.history.do_action(action, mutator).await;
        // A failed mutator may still have partially mutated the model (the
        // history keeps that state undoable), so the change notification
        // runs on the error path too.
        if let Err(err) = self.notify_changed().await {
            if result.is_ok() {
                return Err(err);
            }
            log::warn!("[Session] change notification failed after action error: {err}");
        }
        result
    }

    /// Undo one step. Returns `false` if no step was reachable.
    ///
    /// A navigation reloads the model and then flows through the normal
    /// change-notification path: undo is a mutation like any other, not a
    /// persistence bypass.
    pub async fn undo(&self) -> Result<bool> {
        let navigated = self.history.undo().await?;
        if navigated {
            self.notify_changed().await?;
        }
        Ok(navigated)
    }

    /// Redo one step. Returns `false` if no step was reachable.
    pub async fn redo(&self) -> Result<bool> {
        let navigated = self.history.redo().await?;
        if navigated {
            self.notify_changed().await?;
        }
        Ok(navigated)
    }

    /// The action an undo would revert, for menu labels.
    pub fn undo_action(&self) -> Option<Action> {
        self.history.undo_action()
    }

    /// The action a redo would reapply, for menu labels.
    pub fn redo_action(&self) -> Option<Action> {
        self.history.redo_action()
    }

    /// Save to the remote store immediately, bypassing the debounce window.
    pub async fn save_to_cloud(&self) -> Result<()> {
        self.cloud.save_to_cloud().await
    }

    /// Replace the session's content with a project fetched from the remote
    /// store.
    pub async fn load_from_cloud(&self, owner: &str, name: &str) -> Result<()> {
        let cancel = self.teardown.child_token();
        let project = self.remote.load(owner, name, &cancel).await?;
        let digest = hash::hash_collection(&project.files, &cancel).await?;

        let metadata_snapshot = {
            let mut metadata = self.metadata.lock().unwrap();
            metadata.merge_remote(&project.metadata);
            metadata.set_files_hash(digest.clone());
            metadata.mark_synced(digest);
            metadata.clone()
        };
        self.model.load(Some(metadata_snapshot), project.files).await?;
        self.events.emit(&ProjectEvent::MetadataSynced);
        Ok(())
    }

    /// Restore the recovery snapshot from the local cache, if one exists.
    ///
    /// Recovered content counts as unsynced: the change-notification path
    /// runs afterwards, so with cloud autosave active the recovered changes
    /// get saved remotely.
    pub async fn restore_from_cache(&self) -> Result<bool> {
        let Some(snapshot) = self.local.restore().await? else {
            return Ok(false);
        };
        let (cached_metadata, files) = snapshot.into_collection()?;
        {
            let mut metadata = self.metadata.lock().unwrap();
            *metadata = cached_metadata.clone();
        }
        self.model.load(Some(cached_metadata), files).await?;
        self.notify_changed().await?;
        Ok(true)
    }

    /// Export the project as one portable archive blob.
    pub async fn export_archive(&self, codec: &dyn ArchiveCodec) -> Result<Vec<u8>> {
        let metadata = self.metadata();
        let files = self.model.export_files();
        let cancel = self.teardown.child_token();
        archive::export_archive(codec, metadata, &files, &cancel).await
    }

    /// Replace the session's content with an imported archive.
    ///
    /// Sync bookkeeping is reset: imported content has never been saved
    /// under this project, so it starts out unsynced.
    pub async fn import_archive(&self, codec: &dyn ArchiveCodec, bytes: &[u8]) -> Result<()> {
        let (archived_metadata, files) = archive::import_archive(codec, bytes)?;
        let metadata_snapshot = {
            let mut metadata = self.metadata.lock().unwrap();
            metadata.name = archived_metadata.name;
            metadata.files_hash = None;
            metadata.last_synced_files_hash = None;
            metadata.clone()
        };
        self.model.load(Some(metadata_snapshot), files).await?;
        self.notify_changed().await?;
        Ok(())
    }

    /// Close the session: cancel all outstanding coordinator work and
    /// discard (not flush) pending debounced saves.
    pub fn close(&self) {
        log::info!("[Session] closing '{}'", self.describe());
        self.teardown.cancel();
    }

    fn describe(&self) -> String {
        let metadata = self.metadata.lock().unwrap();
        metadata
            .name
            .clone()
            .or_else(|| metadata.id.clone())
            .unwrap_or_else(|| "untitled".into())
    }

    async fn refresh_hash(&self) -> Result<()> {
        let files = self.model.export_files();
        let digest = hash::hash_collection(&files, &self.teardown).await?;
        self.metadata.lock().unwrap().set_files_hash(digest);
        Ok(())
    }
}
