//! # Scaler Context
//!
//! Cooperative cancellation and deadline propagation for scaler calls.
//!
//! Every backend call a scaler makes runs under a [`ScalerContext`]: the
//! adapter cancels the token when the orchestrator abandons a query, and the
//! deadline caps how long a single backend round-trip may take. Child
//! contexts may tighten the deadline but never widen it.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::scaler::error::ScalerError;

/// Cancellation token plus optional deadline handed to every scaler call
#[derive(Debug, Clone)]
pub struct ScalerContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl ScalerContext {
    /// Context without deadline that is only cancelled explicitly
    #[must_use]
    pub fn background() -> Self {
        Self {
            cancel: CancellationToken::new(),
            deadline: None,
        }
    }

    /// Context that expires `timeout` from now
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            cancel: CancellationToken::new(),
            deadline: Some(Instant::now() + timeout),
        }
    }

    /// Child context with a tightened deadline: `min(parent deadline, now + timeout)`.
    /// Cancelling the parent cancels the child; not the other way around.
    #[must_use]
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(parent) => Some(parent.min(candidate)),
            None => Some(candidate),
        };
        Self {
            cancel: self.cancel.child_token(),
            deadline,
        }
    }

    /// Cancel the context and all children derived from it
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// True once the token is cancelled or the deadline has passed
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        if self.cancel.is_cancelled() {
            return true;
        }
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// The underlying token, for push scalers that select on it directly
    #[must_use]
    pub const fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Remaining time until the deadline, if one is set
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Run a fallible future under this context.
    ///
    /// An already-cancelled context returns [`ScalerError::Cancelled`] without
    /// polling the future, so no backend call is started. Otherwise the future
    /// races cancellation and the deadline.
    ///
    /// # Errors
    ///
    /// Returns [`ScalerError::Cancelled`] on cancellation or deadline expiry,
    /// or the future's own error.
    pub async fn run<T, F>(&self, fut: F) -> Result<T, ScalerError>
    where
        F: Future<Output = Result<T, ScalerError>>,
    {
        if self.is_cancelled() {
            return Err(ScalerError::Cancelled);
        }
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    () = self.cancel.cancelled() => Err(ScalerError::Cancelled),
                    result = tokio::time::timeout_at(deadline, fut) => {
                        result.map_err(|_elapsed| ScalerError::Cancelled)?
                    }
                }
            }
            None => {
                tokio::select! {
                    () = self.cancel.cancelled() => Err(ScalerError::Cancelled),
                    result = fut => result,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_already_cancelled_context_skips_backend_call() {
        let ctx = ScalerContext::background();
        ctx.cancel();

        let polled = Arc::new(AtomicBool::new(false));
        let probe = Arc::clone(&polled);
        let result = ctx
            .run(async move {
                probe.store(true, Ordering::SeqCst);
                Ok(42)
            })
            .await;

        assert!(matches!(result, Err(ScalerError::Cancelled)));
        assert!(!polled.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_deadline_expiry_cancels_slow_call() {
        let ctx = ScalerContext::with_timeout(Duration::from_millis(50));
        let result = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(1)
            })
            .await;
        assert!(matches!(result, Err(ScalerError::Cancelled)));
    }

    #[tokio::test]
    async fn test_successful_call_passes_through() {
        let ctx = ScalerContext::with_timeout(Duration::from_secs(5));
        let result = ctx.run(async { Ok::<_, ScalerError>("value") }).await;
        assert_eq!(result.unwrap(), "value");
    }

    #[tokio::test]
    async fn test_child_deadline_never_widens() {
        let parent = ScalerContext::with_timeout(Duration::from_millis(50));
        let child = parent.child_with_timeout(Duration::from_secs(60));
        let parent_deadline = parent.deadline.unwrap();
        let child_deadline = child.deadline.unwrap();
        assert!(child_deadline <= parent_deadline);
    }

    #[tokio::test]
    async fn test_parent_cancel_propagates_to_child() {
        let parent = ScalerContext::background();
        let child = parent.child_with_timeout(Duration::from_secs(60));
        parent.cancel();
        assert!(child.is_cancelled());
    }
}
