//! Project file model.
//!
//! A project's content is a [`FileCollection`]: a mapping from normalized
//! project-relative path to [`LazyFile`], a lazily-loaded binary blob.
//! Collections are effectively copy-on-write: cloning one shares the
//! unchanged `LazyFile` entries by reference, so taking a snapshot never
//! duplicates (or reloads) file content.

mod collection;
mod lazy;

pub use collection::{FileCollection, normalize_path};
pub use lazy::{FileLoader, LazyFile};
