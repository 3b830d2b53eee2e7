//! Project event notifications.
//!
//! The persistence engine does not rely on implicit reactivity: mutations are
//! reported explicitly via `notify_changed`, and state changes flow back out
//! through this callback registry. A UI subscribes here to render the
//! non-blocking "unsaved" indicator without ever seeing a false failure for
//! a routine superseded save.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::sync::SyncState;

/// A unique identifier for a subscription.
pub type SubscriptionId = u64;

/// Events published by the persistence engine.
#[derive(Debug, Clone, PartialEq)]
pub enum ProjectEvent {
    /// The cloud sync coordinator changed state.
    SyncStateChanged(SyncState),
    /// Server-confirmed metadata (ids, timestamps) was merged in after a
    /// successful save.
    MetadataSynced,
    /// A recovery snapshot was written to the local cache.
    CacheSaved,
    /// The recovery snapshot was dropped (changes are safely remote).
    CacheCleared,
}

/// Callback function type for project events.
///
/// Callbacks receive a reference to the event and should not block for
/// extended periods.
pub type EventCallback = Arc<dyn Fn(&ProjectEvent) + Send + Sync>;

/// Thread-safe registry for managing event subscriptions.
///
/// # Example
///
/// ```ignore
/// use playbox_core::events::{CallbackRegistry, ProjectEvent};
/// use std::sync::Arc;
///
/// let registry = CallbackRegistry::new();
/// let id = registry.subscribe(Arc::new(|event| {
///     println!("Event: {:?}", event);
/// }));
/// registry.unsubscribe(id);
/// ```
#[derive(Default)]
pub struct CallbackRegistry {
    /// Map of subscription IDs to callbacks.
    callbacks: RwLock<HashMap<SubscriptionId, EventCallback>>,
    /// Counter for generating unique subscription IDs.
    next_id: AtomicU64,
}

impl CallbackRegistry {
    /// Create a new empty callback registry.
    pub fn new() -> Self {
        Self {
            callbacks: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Subscribe to project events.
    ///
    /// Returns a subscription ID that can be used to unsubscribe later.
    pub fn subscribe(&self, callback: EventCallback) -> SubscriptionId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.callbacks.write().unwrap().insert(id, callback);
        id
    }

    /// Unsubscribe from project events.
    ///
    /// Returns `true` if the subscription was found and removed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.callbacks.write().unwrap().remove(&id).is_some()
    }

    /// Emit an event to all registered callbacks.
    ///
    /// Callbacks are invoked synchronously in an undefined order. A
    /// panicking callback does not affect the others.
    pub fn emit(&self, event: &ProjectEvent) {
        let callbacks = self.callbacks.read().unwrap();
        for callback in callbacks.values() {
            let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                callback(event);
            }));
        }
    }

    /// Get the number of active subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.callbacks.read().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_subscribe_emit_unsubscribe() {
        let registry = CallbackRegistry::new();
        let seen: Arc<Mutex<Vec<ProjectEvent>>> = Arc::new(Mutex::new(Vec::new()));

        let id = {
            let seen = seen.clone();
            registry.subscribe(Arc::new(move |event| {
                seen.lock().unwrap().push(event.clone());
            }))
        };
        assert_eq!(registry.subscriber_count(), 1);

        registry.emit(&ProjectEvent::SyncStateChanged(SyncState::Pending));
        assert_eq!(
            *seen.lock().unwrap(),
            vec![ProjectEvent::SyncStateChanged(SyncState::Pending)]
        );

        assert!(registry.unsubscribe(id));
        registry.emit(&ProjectEvent::CacheCleared);
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_panicking_callback_does_not_break_others() {
        let registry = CallbackRegistry::new();
        let seen = Arc::new(Mutex::new(0usize));

        registry.subscribe(Arc::new(|_| panic!("bad subscriber")));
        {
            let seen = seen.clone();
            registry.subscribe(Arc::new(move |_| {
                *seen.lock().unwrap() += 1;
            }));
        }

        registry.emit(&ProjectEvent::MetadataSynced);
        assert_eq!(*seen.lock().unwrap(), 1);
    }
}
