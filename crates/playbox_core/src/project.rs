//! Project identity, sync bookkeeping, and the host-editor model seam.
//!
//! [`ProjectMetadata`] carries a project's identity plus the two digests the
//! sync pipeline compares: `files_hash` (recomputed whenever the exported
//! snapshot changes) and `last_synced_files_hash` (only advanced on a
//! confirmed successful remote save). The invariant
//! `has_unsynced_changes := files_hash != None && files_hash != last_synced_files_hash`
//! drives the whole coordinator.
//!
//! [`ProjectModel`] is the narrow interface the live editor model implements:
//! export a snapshot, re-hydrate from one, and (optionally) make sure a
//! thumbnail exists before a save.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cancel::CancellationToken;
use crate::error::Result;
use crate::file::FileCollection;
use crate::store::BoxFuture;

/// Who can see a project on the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// Visible only to the owner.
    #[default]
    Private,
    /// Reachable by link, not listed.
    Unlisted,
    /// Publicly listed.
    Public,
}

/// Project identity and sync bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ProjectMetadata {
    /// Server-assigned project id, absent until the first successful save.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Owner's user key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,

    /// Project display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Monotonic version, advanced by the server on each save.
    #[serde(default)]
    pub version: u32,

    /// Server-reported creation time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    /// Server-reported last-update time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,

    /// Project visibility on the remote store.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visibility: Option<Visibility>,

    /// Digest of the currently-exported file snapshot.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files_hash: Option<String>,

    /// Digest of the snapshot that was last confirmed saved remotely.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_synced_files_hash: Option<String>,
}

impl ProjectMetadata {
    /// Create metadata for a brand-new, never-saved project.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            version: 1,
            ..Self::default()
        }
    }

    /// Whether the current snapshot differs from the last one confirmed
    /// saved remotely.
    pub fn has_unsynced_changes(&self) -> bool {
        match &self.files_hash {
            None => false,
            Some(hash) => self.last_synced_files_hash.as_ref() != Some(hash),
        }
    }

    /// Record a freshly-computed snapshot digest.
    pub fn set_files_hash(&mut self, hash: impl Into<String>) {
        self.files_hash = Some(hash.into());
    }

    /// Advance the synced digest after a confirmed successful remote save.
    ///
    /// `sent_hash` must be the digest that was actually sent, not whatever
    /// the snapshot hashes to now; edits made during the save stay unsynced.
    pub fn mark_synced(&mut self, sent_hash: impl Into<String>) {
        self.last_synced_files_hash = Some(sent_hash.into());
    }

    /// Merge server-confirmed fields from a save/load response.
    ///
    /// Identity and timestamps come from the server; the local digests and
    /// display name are preserved.
    pub fn merge_remote(&mut self, remote: &ProjectMetadata) {
        if remote.id.is_some() {
            self.id = remote.id.clone();
        }
        if remote.owner.is_some() {
            self.owner = remote.owner.clone();
        }
        if remote.version != 0 {
            self.version = remote.version;
        }
        if remote.created_at.is_some() {
            self.created_at = remote.created_at;
        }
        if remote.updated_at.is_some() {
            self.updated_at = remote.updated_at;
        }
        if remote.visibility.is_some() {
            self.visibility = remote.visibility;
        }
    }
}

/// The mutation API the live editor model exposes to the persistence engine.
///
/// Object-safe: all async methods return boxed futures so the engine can
/// hold the model behind `Arc<dyn ProjectModel>`.
pub trait ProjectModel: Send + Sync {
    /// Recompute the full file snapshot from the live model objects.
    fn export_files(&self) -> FileCollection;

    /// Re-hydrate the live model from a snapshot.
    ///
    /// Used by history navigation and cache/cloud restore. Re-entering the
    /// normal load path means a reload re-triggers hash recomputation and,
    /// if auto-save is armed, a fresh sync cycle.
    fn load<'a>(
        &'a self,
        metadata: Option<ProjectMetadata>,
        files: FileCollection,
    ) -> BoxFuture<'a, Result<()>>;

    /// Make sure a thumbnail/derived asset exists before a save exports the
    /// snapshot. Defaults to a no-op.
    fn ensure_thumbnail<'a>(&'a self, _cancel: &'a CancellationToken) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move { Ok(()) })
    }
}
