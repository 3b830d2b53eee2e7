//! Content hashing for change detection.
//!
//! A project snapshot's digest is a cheap equality test for "has anything
//! changed". Input paths are sorted before hashing so insertion order never
//! affects the result, and the digest carries a version prefix so the
//! encoding can change later without ambiguity.

use sha2::{Digest, Sha256};

use crate::cancel::CancellationToken;
use crate::error::Result;
use crate::file::FileCollection;

/// Version tag prefixed to every snapshot digest.
pub const DIGEST_VERSION: &str = "h1:";

/// Hex SHA-256 of raw bytes. Used for per-file digests.
pub fn digest_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Digest of a raw path -> opaque-reference map.
///
/// Entries are sorted lexicographically by path and fed through a canonical
/// serialization (path, NUL, reference, newline), so two maps hash equal iff
/// their path -> reference mappings are identical regardless of key order.
pub fn hash_refs<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> String
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut pairs: Vec<(String, String)> = entries
        .into_iter()
        .map(|(k, v)| (k.as_ref().to_string(), v.as_ref().to_string()))
        .collect();
    pairs.sort();

    let mut hasher = Sha256::new();
    for (path, reference) in &pairs {
        hasher.update(path.as_bytes());
        hasher.update([0u8]);
        hasher.update(reference.as_bytes());
        hasher.update([b'\n']);
    }
    format!("{}{:x}", DIGEST_VERSION, hasher.finalize())
}

/// Digest of a full [`FileCollection`] snapshot.
///
/// Per-file digests are memoized on each `LazyFile`, so unchanged files
/// shared across snapshots are hashed at most once even though this walks
/// the whole collection.
pub async fn hash_collection(files: &FileCollection, cancel: &CancellationToken) -> Result<String> {
    let mut refs = Vec::with_capacity(files.len());
    for (path, file) in files.iter() {
        let digest = file.content_digest(cancel).await?;
        refs.push((path.to_string(), digest));
    }
    Ok(hash_refs(refs))
}
