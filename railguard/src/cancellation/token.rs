//! Cancellation token for cooperative cancellation.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Notify;

/// Marker error for work abandoned because its token was cancelled.
///
/// Collaborators return this (directly or somewhere in their cause chain)
/// so the retry classifier can tell an abort from a transient fault.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Operation cancelled: {reason}")]
pub struct Cancelled {
    /// The cancellation reason.
    pub reason: String,
}

impl Cancelled {
    /// Creates a new cancellation marker.
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[derive(Default)]
struct TokenState {
    cancelled: AtomicBool,
    reason: RwLock<Option<String>>,
    notify: Notify,
}

/// A token for cooperative cancellation.
///
/// Clones share state: cancelling any clone cancels all of them.
/// Cancellation is idempotent - only the first cancellation reason is kept.
#[derive(Clone, Default)]
pub struct CancellationToken {
    state: Arc<TokenState>,
}

impl CancellationToken {
    /// Creates a new cancellation token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation with a reason.
    ///
    /// This is idempotent - only the first reason is kept.
    /// Waiters are woken once.
    pub fn cancel(&self, reason: impl Into<String>) {
        {
            let mut slot = self.state.reason.write();
            if self.state.cancelled.load(Ordering::SeqCst) {
                return;
            }
            *slot = Some(reason.into());
            self.state.cancelled.store(true, Ordering::SeqCst);
        }

        self.state.notify.notify_waiters();
    }

    /// Returns whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::SeqCst)
    }

    /// Returns the cancellation reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.state.reason.read().clone()
    }

    /// Returns `Err(Cancelled)` once cancellation has been requested.
    pub fn ensure_active(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            Err(Cancelled::new(self.reason().unwrap_or_default()))
        } else {
            Ok(())
        }
    }

    /// Resolves once cancellation has been requested.
    pub async fn cancelled(&self) {
        // `notify_waiters` reaches futures created before the call, even unpolled ones.
        let notified = self.state.notify.notified();
        if self.is_cancelled() {
            return;
        }
        notified.await;
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
