//! Undo/redo history.
//!
//! An append-only log of full project snapshots paired with the action that
//! produced them, plus a cursor. Snapshots are shallow: unchanged
//! [`LazyFile`](crate::LazyFile) entries are shared by reference across
//! slots, so logging an action never re-reads or re-hashes content.
//!
//! Slot `i` holds the project state as it was while slot `i` was current;
//! the slot's snapshot is refreshed when the cursor leaves it, so redo
//! restores exactly what was undone, including in-place edits made after the
//! last logged action. Slot `i`'s action is the one that moved the project
//! from slot `i - 1` to slot `i`.

use std::future::Future;
use std::sync::{Arc, Mutex};

use crate::error::Result;
use crate::file::FileCollection;
use crate::project::ProjectModel;

/// Descriptor of one logged mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    /// Human-readable name, shown in undo/redo menus.
    pub name: String,
    /// Mergeable actions collapse with an immediately-preceding action of
    /// the same name into a single undo step. Used for continuous edits
    /// like typing or dragging.
    pub mergeable: bool,
}

impl Action {
    /// A discrete, non-mergeable action.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mergeable: false,
        }
    }

    /// A mergeable action (see [`Action::mergeable`]).
    pub fn mergeable(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mergeable: true,
        }
    }
}

struct HistorySlot {
    files: FileCollection,
    /// `None` only for the baseline slot.
    action: Option<Action>,
}

struct HistoryLog {
    slots: Vec<HistorySlot>,
    cursor: usize,
}

/// Undo/redo log over a [`ProjectModel`].
///
/// All mutation entry points serialize on one lock: an in-flight
/// [`do_action`](HistoryManager::do_action) mutator can never interleave
/// with another action or with undo/redo navigation.
pub struct HistoryManager {
    model: Arc<dyn ProjectModel>,
    log: Mutex<HistoryLog>,
    action_lock: tokio::sync::Mutex<()>,
    /// Retained slot count: `max_undo` reachable undo steps plus the
    /// baseline.
    max_slots: usize,
}

impl HistoryManager {
    /// Create a log whose baseline is the model's current snapshot.
    pub fn new(model: Arc<dyn ProjectModel>, max_undo: usize) -> Self {
        let baseline = HistorySlot {
            files: model.export_files(),
            action: None,
        };
        Self {
            model,
            log: Mutex::new(HistoryLog {
                slots: vec![baseline],
                cursor: 0,
            }),
            action_lock: tokio::sync::Mutex::new(()),
            max_slots: max_undo.saturating_add(1),
        }
    }

    /// Whether an undo step is reachable.
    pub fn can_undo(&self) -> bool {
        self.log.lock().unwrap().cursor > 0
    }

    /// Whether a redo step is reachable.
    pub fn can_redo(&self) -> bool {
        let log = self.log.lock().unwrap();
        log.cursor + 1 < log.slots.len()
    }

    /// The action an [`undo`](HistoryManager::undo) would revert.
    pub fn undo_action(&self) -> Option<Action> {
        let log = self.log.lock().unwrap();
        if log.cursor == 0 {
            return None;
        }
        log.slots[log.cursor].action.clone()
    }

    /// The action a [`redo`](HistoryManager::redo) would reapply.
    pub fn redo_action(&self) -> Option<Action> {
        let log = self.log.lock().unwrap();
        log.slots.get(log.cursor + 1).and_then(|slot| slot.action.clone())
    }

    /// Log `action` and run its mutator under the history lock.
    ///
    /// Any redo branch beyond the cursor is truncated first. The current
    /// snapshot is captured before the mutator runs, so one undo reverts
    /// the whole mutation even when the mutator suspends between internal
    /// steps. If the mutator fails its slot is kept: the partial mutation
    /// remains undoable, and the error propagates to the caller.
    pub async fn do_action<F, Fut, T>(&self, action: Action, mutator: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let _guard = self.action_lock.lock().await;
        {
            let mut log = self.log.lock().unwrap();
            let cursor = log.cursor;
            log.slots.truncate(cursor + 1);

            let merge = action.mergeable
                && log.slots[cursor]
                    .action
                    .as_ref()
                    .is_some_and(|prev| prev.mergeable && prev.name == action.name);
            if merge {
                log::debug!("[History] merging '{}' into previous step", action.name);
            } else {
                // Refresh the slot we are leaving, then open the new one
                // with the same pre-action snapshot.
                let snapshot = self.model.export_files();
                log.slots[cursor].files = snapshot.clone();
                log.slots.push(HistorySlot {
                    files: snapshot,
                    action: Some(action),
                });
                log.cursor += 1;

                if log.slots.len() > self.max_slots {
                    let excess = log.slots.len() - self.max_slots;
                    log.slots.drain(..excess);
                    log.cursor -= excess;
                }
            }
        }
        mutator().await
    }

    /// Step back one slot and reload the model from it.
    ///
    /// Returns `false` when no undo step is reachable. The slot being left
    /// is refreshed with the live snapshot first, so a later redo restores
    /// it exactly.
    pub async fn undo(&self) -> Result<bool> {
        let _guard = self.action_lock.lock().await;
        let files = {
            let mut log = self.log.lock().unwrap();
            if log.cursor == 0 {
                return Ok(false);
            }
            let cursor = log.cursor;
            log.slots[cursor].files = self.model.export_files();
            log.cursor -= 1;
            log.slots[cursor - 1].files.clone()
        };
        self.model.load(None, files).await?;
        Ok(true)
    }

    /// Step forward one slot and reload the model from it.
    ///
    /// Returns `false` when no redo step is reachable.
    pub async fn redo(&self) -> Result<bool> {
        let _guard = self.action_lock.lock().await;
        let files = {
            let mut log = self.log.lock().unwrap();
            if log.cursor + 1 >= log.slots.len() {
                return Ok(false);
            }
            log.cursor += 1;
            log.slots[log.cursor].files.clone()
        };
        self.model.load(None, files).await?;
        Ok(true)
    }
}
