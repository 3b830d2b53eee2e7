//! Path-keyed snapshots of project content.

use indexmap::IndexMap;

use super::LazyFile;
use crate::cancel::CancellationToken;
use crate::error::{PlayboxError, Result};

/// Normalize a project-relative path.
///
/// Strips `.` components, collapses repeated separators, converts `\` to `/`.
/// Rejects empty paths, absolute paths, and `..` components.
pub fn normalize_path(path: &str) -> Result<String> {
    let cleaned = path.replace('\\', "/");
    if cleaned.starts_with('/') {
        return Err(PlayboxError::InvalidPath(path.to_string()));
    }
    let mut parts = Vec::new();
    for part in cleaned.split('/') {
        match part {
            "" | "." => continue,
            ".." => return Err(PlayboxError::InvalidPath(path.to_string())),
            other => parts.push(other),
        }
    }
    if parts.is_empty() {
        return Err(PlayboxError::InvalidPath(path.to_string()));
    }
    Ok(parts.join("/"))
}

/// One full snapshot of project content: a mapping from normalized relative
/// path to [`LazyFile`].
///
/// Absence of a path means "file removed", distinct from an entry whose
/// content is empty. Cloning shares the `LazyFile` entries by reference
/// (copy-on-write of the map, not of the blobs), so unchanged files are
/// never reloaded or re-hashed across snapshots.
#[derive(Clone, Default)]
pub struct FileCollection {
    files: IndexMap<String, LazyFile>,
}

impl FileCollection {
    /// Create an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a file under `path`, normalizing it first.
    ///
    /// Returns the previously-stored file if the normalized path was already
    /// present. No two entries can share a normalized path.
    pub fn insert(&mut self, path: &str, file: LazyFile) -> Result<Option<LazyFile>> {
        let path = normalize_path(path)?;
        Ok(self.files.insert(path, file))
    }

    /// Remove the file at `path`, if present.
    pub fn remove(&mut self, path: &str) -> Option<LazyFile> {
        let path = normalize_path(path).ok()?;
        self.files.shift_remove(&path)
    }

    /// Get the file at `path`, if present.
    pub fn get(&self, path: &str) -> Option<&LazyFile> {
        let path = normalize_path(path).ok()?;
        self.files.get(&path)
    }

    /// Whether `path` is present.
    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    /// Number of files in the snapshot.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether the snapshot is empty.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Iterate over `(path, file)` entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &LazyFile)> {
        self.files.iter().map(|(path, file)| (path.as_str(), file))
    }

    /// All normalized paths in the snapshot.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    /// Force every file's content into memory.
    ///
    /// Used when cloud autosave is active so subsequent exports and saves
    /// don't stall on lazy loads.
    pub async fn touch_all(&self, cancel: &CancellationToken) -> Result<()> {
        for (_, file) in self.iter() {
            file.content(cancel).await?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for FileCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.files.iter().map(|(path, file)| (path, file.id())))
            .finish()
    }
}
