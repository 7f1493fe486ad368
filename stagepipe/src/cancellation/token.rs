//! Cancellation token shared by every stage of a pipeline run.

use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use thiserror::Error;
use tokio::sync::Notify;
use tracing::warn;

/// A callback type for cancellation notifications.
pub type CancelCallback = Box<dyn FnOnce() + Send>;

type CallbackList = Mutex<Vec<(u64, CancelCallback)>>;

/// The condition a stage reports when it stops because its token was cancelled.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cancelled: {reason}")]
pub struct Cancelled {
    /// The reason recorded on the token.
    pub reason: String,
}

/// A token for cooperative cancellation.
///
/// Cancellation is one-shot: only the first reason is kept and a cancelled
/// token stays cancelled.
#[derive(Default)]
pub struct CancellationToken {
    /// Whether cancellation has been requested.
    cancelled: AtomicBool,
    /// The reason for cancellation (first one wins).
    reason: Arc<RwLock<Option<String>>>,
    /// Callbacks to invoke on cancellation, keyed by registration id.
    callbacks: Arc<CallbackList>,
    next_id: AtomicU64,
    /// The parent's callback list and this token's entry in it.
    parent: Mutex<Option<(Weak<CallbackList>, u64)>>,
    /// Wakes tasks parked in [`CancellationToken::cancelled`].
    notify: Notify,
}

impl CancellationToken {
    /// Creates a new cancellation token.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Derives a token that is cancelled whenever `self` is.
    ///
    /// Cancelling the child leaves the parent untouched. A parent that is
    /// already cancelled yields an already-cancelled child carrying the
    /// parent's reason. The child's registration on the parent is removed
    /// once the child is cancelled or dropped.
    #[must_use]
    pub fn child_token(&self) -> Arc<Self> {
        let child = Self::new();
        let weak: Weak<Self> = Arc::downgrade(&child);
        let parent_reason = Arc::clone(&self.reason);
        let registered = self.register(Box::new(move || {
            if let Some(child) = weak.upgrade() {
                let reason = parent_reason
                    .read()
                    .clone()
                    .unwrap_or_else(|| "parent cancelled".to_string());
                child.cancel(reason);
            }
        }));
        if let Some(id) = registered {
            *child.parent.lock() = Some((Arc::downgrade(&self.callbacks), id));
        }
        child
    }

    /// Requests cancellation with a reason.
    ///
    /// This is idempotent - only the first reason is kept.
    /// Callbacks are invoked immediately. Panics in callbacks are logged and suppressed.
    pub fn cancel(&self, reason: impl Into<String>) {
        if self
            .cancelled
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        *self.reason.write() = Some(reason.into());
        self.detach();

        let callbacks = std::mem::take(&mut *self.callbacks.lock());
        for (_, callback) in callbacks {
            run_callback(callback);
        }
        self.notify.notify_waiters();
    }

    /// Registers a callback to be invoked on cancellation.
    ///
    /// If already cancelled, the callback is invoked immediately.
    pub fn on_cancel<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.register(Box::new(callback));
    }

    /// Stores `callback` and returns its id, or runs it at once and returns
    /// `None` when the token is already cancelled.
    fn register(&self, callback: CancelCallback) -> Option<u64> {
        {
            // Checked under the lock so a concurrent `cancel` either sees the
            // pushed callback or we see its flag.
            let mut callbacks = self.callbacks.lock();
            if !self.is_cancelled() {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                callbacks.push((id, callback));
                return Some(id);
            }
        }
        run_callback(callback);
        None
    }

    /// Removes this token's callback from its parent, if any.
    fn detach(&self) {
        let link = self.parent.lock().take();
        if let Some((callbacks, id)) = link {
            if let Some(callbacks) = callbacks.upgrade() {
                callbacks.lock().retain(|(entry, _)| *entry != id);
            }
        }
    }

    /// Returns whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns the cancellation reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.reason.read().clone()
    }

    /// Returns `Err(Cancelled)` once the token has been cancelled.
    pub fn check(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            Err(Cancelled {
                reason: self.reason().unwrap_or_default(),
            })
        } else {
            Ok(())
        }
    }

    /// Waits until the token is cancelled.
    pub async fn cancelled(&self) {
        let notified = self.notify.notified();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }
}

fn run_callback(callback: CancelCallback) {
    if let Err(e) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(callback)) {
        warn!("Cancellation callback panicked: {:?}", e);
    }
}

impl Drop for CancellationToken {
    fn drop(&mut self) {
        self.detach();
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .field("reason", &self.reason())
            .finish()
    }
}
