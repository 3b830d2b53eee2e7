#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

/// Portable project archives (export/import)
pub mod archive;

/// Cancellation tokens threaded through every suspendable operation
pub mod cancel;

/// Settings for the persistence engine
pub mod config;

/// Error (common error types)
pub mod error;

/// Project event notifications
pub mod events;

/// Project files (lazy blobs and collections)
pub mod file;

/// Content digests over project snapshots
pub mod hash;

/// Undo/redo history
pub mod history;

/// Project metadata and the host model trait
pub mod project;

/// The per-project facade
pub mod session;

/// Store collaborator traits and the local cache snapshot format
pub mod store;

/// Sync coordinators (cloud and local cache)
pub mod sync;

#[cfg(test)]
pub mod test_utils;

pub use cancel::CancellationToken;
pub use error::{PlayboxError, Result};
pub use file::{FileCollection, FileLoader, LazyFile};
pub use history::Action;
pub use project::{ProjectMetadata, ProjectModel};
pub use session::ProjectSession;
pub use sync::SyncState;
