//! Sync coordinators: keeping the remote store and the local recovery cache
//! eventually consistent with the in-memory project.
//!
//! # Architecture
//!
//! ```text
//!    Remote store (durable)          Local store (recovery cache)
//!            ↑                                  ↑
//!    CloudSyncCoordinator  ──safety net──►  LocalCacheSyncCoordinator
//!            ↑                                  ↑
//!        notify_changed (explicit, from the host editor)
//!            ↑
//!    ProjectModel::export_files + ContentHasher
//! ```
//!
//! # Key Components
//!
//! - [`CloudSyncCoordinator`] - debounced, retryable, cancellable push of
//!   the current snapshot to the remote store
//! - [`LocalCacheSyncCoordinator`] - debounced mirror into the local store,
//!   used for recovery when the remote push fails or is disabled
//! - [`SyncState`] - the cloud coordinator's observable state machine

mod cloud;
mod debounce;
mod local;

pub use cloud::CloudSyncCoordinator;
pub use debounce::Debouncer;
pub use local::LocalCacheSyncCoordinator;

use serde::{Deserialize, Serialize};

/// Observable state of the cloud sync coordinator.
///
/// Transitions: `Saved -> Pending -> Saving -> {Saved | Failed}`, and
/// `Failed -> Pending` on retry or on a new unsynced change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    /// The last push succeeded and nothing has changed since.
    Saved,
    /// Unsynced changes exist; a save is armed behind the debounce window.
    Pending,
    /// A save attempt is in flight.
    Saving,
    /// The last push failed; a retry is scheduled and a recovery snapshot
    /// sits in the local cache.
    Failed,
}

impl SyncState {
    /// Get a human-readable description of this state.
    pub fn description(&self) -> &'static str {
        match self {
            SyncState::Saved => "All changes saved",
            SyncState::Pending => "Unsaved changes",
            SyncState::Saving => "Saving...",
            SyncState::Failed => "Couldn't save - will retry",
        }
    }
}
