//! Portable project archives.
//!
//! An archive is one self-contained byte blob holding metadata plus every
//! file's content, for download/upload style transfer. The container format
//! is pluggable through [`ArchiveCodec`]; the codec itself is a pure
//! transform with no concurrency concerns, so only the content-resolving
//! export step is async.

use crate::cancel::CancellationToken;
use crate::error::Result;
use crate::file::FileCollection;
use crate::project::ProjectMetadata;
use crate::store::CachedProject;

/// A container format for portable project archives.
pub trait ArchiveCodec: Send + Sync {
    /// Serialize a fully-materialized snapshot into one byte blob.
    fn encode(&self, snapshot: &CachedProject) -> Result<Vec<u8>>;

    /// Parse a byte blob back into a materialized snapshot.
    fn decode(&self, bytes: &[u8]) -> Result<CachedProject>;
}

/// The default container: the snapshot as UTF-8 JSON, content base64-inlined.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonArchiveCodec;

impl ArchiveCodec for JsonArchiveCodec {
    fn encode(&self, snapshot: &CachedProject) -> Result<Vec<u8>> {
        Ok(snapshot.to_json()?.into_bytes())
    }

    fn decode(&self, bytes: &[u8]) -> Result<CachedProject> {
        let json = std::str::from_utf8(bytes)
            .map_err(|err| crate::PlayboxError::Archive(format!("archive is not UTF-8: {err}")))?;
        CachedProject::from_json(json)
    }
}

/// Materialize the project and encode it with `codec`.
///
/// Loads every file's content, so this suspends and honors cancellation.
pub async fn export_archive(
    codec: &dyn ArchiveCodec,
    metadata: ProjectMetadata,
    files: &FileCollection,
    cancel: &CancellationToken,
) -> Result<Vec<u8>> {
    let snapshot = CachedProject::from_collection(metadata, files, cancel).await?;
    codec.encode(&snapshot)
}

/// Decode an archive into metadata plus a live collection.
pub fn import_archive(
    codec: &dyn ArchiveCodec,
    bytes: &[u8],
) -> Result<(ProjectMetadata, FileCollection)> {
    codec.decode(bytes)?.into_collection()
}
