//! In-memory local store, useful for tests and as a default cache backend
//! in environments without durable local storage.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::{BoxFuture, CachedProject, LocalStore};
use crate::error::Result;

/// A [`LocalStore`] backed by a process-local map.
///
/// Snapshots are kept as serialized JSON, matching what a real key-value
/// backend would hold, so serialization problems surface in tests too.
#[derive(Clone, Default)]
pub struct MemoryLocalStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryLocalStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored snapshots (for test assertions).
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    /// Whether the store holds no snapshots.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }

    /// Whether a snapshot is stored under `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.lock().unwrap().contains_key(key)
    }
}

impl LocalStore for MemoryLocalStore {
    fn save<'a>(&'a self, key: &'a str, snapshot: &'a CachedProject) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let json = snapshot.to_json()?;
            self.entries.lock().unwrap().insert(key.to_string(), json);
            Ok(())
        })
    }

    fn load<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<CachedProject>>> {
        Box::pin(async move {
            let json = self.entries.lock().unwrap().get(key).cloned();
            match json {
                Some(json) => Ok(Some(CachedProject::from_json(&json)?)),
                None => Ok(None),
            }
        })
    }

    fn clear<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.entries.lock().unwrap().remove(key);
            Ok(())
        })
    }
}
