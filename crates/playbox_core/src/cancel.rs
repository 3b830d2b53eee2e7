//! Cancellation tokens for cooperative async operations.
//!
//! Every suspendable operation in this crate (file loads, hash computation,
//! remote saves, local-store writes, debounce timers) takes an explicit
//! [`CancellationToken`]. Cancelling a token signals that the operation's
//! result is no longer wanted; operations observe the token at their
//! suspension points and bail out with [`PlayboxError::Cancelled`].
//!
//! Tokens form a tree: a child token is cancelled when either it or any of
//! its ancestors is cancelled, so tearing down a project cancels every
//! coordinator and in-flight save hanging off the project's root token.
//!
//! # Example
//!
//! ```ignore
//! use playbox_core::cancel::CancellationToken;
//!
//! let root = CancellationToken::new();
//! let save = root.child_token();
//!
//! tokio::select! {
//!     _ = save.cancelled() => { /* superseded */ }
//!     result = do_save() => { /* finished */ }
//! }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::Notify;

use crate::error::{PlayboxError, Result};

/// An explicit, propagatable signal that an in-progress operation's result
/// is no longer wanted.
///
/// Cloning a token produces another handle to the same signal; use
/// [`CancellationToken::child_token`] for a token that can also be cancelled
/// independently.
#[derive(Clone, Default)]
pub struct CancellationToken {
    state: Arc<TokenState>,
}

#[derive(Default)]
struct TokenState {
    cancelled: AtomicBool,
    notify: Notify,
    children: Mutex<Vec<Weak<TokenState>>>,
}

impl CancellationToken {
    /// Create a new, uncancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation. Idempotent; wakes every pending
    /// [`cancelled`](Self::cancelled) future and cancels all child tokens.
    pub fn cancel(&self) {
        TokenState::cancel(&self.state);
    }

    /// Whether cancellation has been signalled.
    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::SeqCst)
    }

    /// Return `Err(Cancelled)` if cancellation has been signalled.
    ///
    /// Convenience for checking the token at a suspension point with `?`.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(PlayboxError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Wait until cancellation is signalled.
    ///
    /// Resolves immediately if the token is already cancelled.
    pub async fn cancelled(&self) {
        loop {
            // Register interest before checking the flag so a concurrent
            // cancel() cannot slip between the check and the await.
            let notified = self.state.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    /// Create a child token that is cancelled when either this token or the
    /// child itself is cancelled.
    pub fn child_token(&self) -> Self {
        let child = CancellationToken::new();
        if self.is_cancelled() {
            child.cancel();
            return child;
        }
        self.state
            .children
            .lock()
            .unwrap()
            .push(Arc::downgrade(&child.state));
        // cancel() may have run between the check above and the push.
        if self.is_cancelled() {
            child.cancel();
        }
        child
    }
}

impl TokenState {
    fn cancel(state: &Arc<TokenState>) {
        if state.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        state.notify.notify_waiters();
        let children = std::mem::take(&mut *state.children.lock().unwrap());
        for child in children {
            if let Some(child) = child.upgrade() {
                TokenState::cancel(&child);
            }
        }
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
