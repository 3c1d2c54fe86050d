//! Cooperative cancellation
//!
//! A [`CancellationToken`] is shared between the caller of a pipeline run and
//! every suspension point inside it. Tokens form a tree: cancelling a parent
//! cancels all of its children, never the reverse.
//!
//! Used for:
//! - The caller's run-wide token
//! - Scoped tokens for concurrent stage groups (child + timeout)
//! - Durable uploads that should give up when the run is abandoned

use parking_lot::Mutex;
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Shared cancellation signal
#[derive(Debug, Clone)]
pub struct CancellationToken {
    state: Arc<TokenState>,
}

#[derive(Debug)]
struct TokenState {
    signal: watch::Sender<bool>,
    children: Mutex<Vec<Weak<TokenState>>>,
}

impl TokenState {
    fn new() -> Self {
        let (signal, _) = watch::channel(false);
        Self {
            signal,
            children: Mutex::new(Vec::new()),
        }
    }

    fn is_cancelled(&self) -> bool {
        *self.signal.borrow()
    }

    fn cancel(&self) {
        // Flag first, then drain children under the lock so a concurrent
        // `child_token` either sees the flag or lands in the drained list.
        if self.signal.send_replace(true) {
            return;
        }
        let children = std::mem::take(&mut *self.children.lock());
        for child in children {
            if let Some(child) = child.upgrade() {
                child.cancel();
            }
        }
    }
}

impl CancellationToken {
    /// Create new, uncancelled token
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(TokenState::new()),
        }
    }

    /// Create a token that is cancelled whenever `self` is
    ///
    /// Cancelling the child has no effect on the parent.
    #[must_use]
    pub fn child_token(&self) -> Self {
        let child = Self::new();
        let mut children = self.state.children.lock();
        if self.state.is_cancelled() {
            drop(children);
            child.cancel();
        } else {
            children.retain(|weak| weak.strong_count() > 0);
            children.push(Arc::downgrade(&child.state));
        }
        child
    }

    /// Signal cancellation to this token and all of its descendants
    #[inline]
    pub fn cancel(&self) {
        self.state.cancel();
    }

    /// Check whether cancellation has been signalled
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.state.is_cancelled()
    }

    /// Resolve once the token is cancelled
    pub async fn cancelled(&self) {
        let mut rx = self.state.signal.subscribe();
        // The sender lives inside `self.state`, so the channel cannot close
        // while this future is alive.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }

    /// Cancel this token once `delay` elapses
    ///
    /// The timer is tied to the returned guard: dropping the guard disarms it.
    /// Must be called from within a tokio runtime.
    #[must_use = "dropping the guard disarms the timer"]
    pub fn cancel_after(&self, delay: Duration) -> TimeoutGuard {
        let state: Weak<TokenState> = Arc::downgrade(&self.state);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(state) = state.upgrade() {
                state.cancel();
            }
        });
        TimeoutGuard { handle }
    }

    /// Drive `fut` to completion unless the token fires first
    ///
    /// Returns `None` when cancelled. Cancellation wins ties.
    pub async fn run_until_cancelled<F>(&self, fut: F) -> Option<F::Output>
    where
        F: Future,
    {
        tokio::select! {
            biased;
            () = self.cancelled() => None,
            out = fut => Some(out),
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Armed timer created by [`CancellationToken::cancel_after`]
#[derive(Debug)]
pub struct TimeoutGuard {
    handle: JoinHandle<()>,
}

impl TimeoutGuard {
    /// Disarm the timer without cancelling the token
    #[inline]
    pub fn disarm(self) {
        drop(self);
    }
}

impl Drop for TimeoutGuard {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
