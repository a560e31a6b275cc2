//! Cooperative cancellation token shared by one job's whole call chain.
//!
//! One token per job, discarded with the job, never reused. Cancellation is
//! observed at suspension points only: an in-flight network call is not
//! aborted, its result is discarded once control returns.

use std::sync::Arc;
use std::sync::OnceLock;

use tokio_util::sync::WaitForCancellationFuture;

use crate::domain::error::SyncError;

/// Shareable cancellation flag with a human-readable reason.
///
/// The first `cancel` wins and records the reason; later calls are no-ops.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: tokio_util::sync::CancellationToken,
    reason: Arc<OnceLock<String>>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Idempotent: only the first reason is kept.
    pub fn cancel(&self, reason: impl Into<String>) {
        if self.reason.set(reason.into()).is_ok() {
            tracing::warn!(reason = %self.reason.get().map(String::as_str).unwrap_or(""), "cancellation requested");
            self.inner.cancel();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.is_cancelled()
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.get().map(String::as_str)
    }

    /// Suspension-point check. Fails with the distinguished cancelled kind
    /// once the token has fired; the saved-count annotation is filled in by
    /// the job owner.
    pub fn check(&self) -> Result<(), SyncError> {
        if self.is_cancelled() {
            Err(SyncError::Cancelled {
                reason: self.reason().unwrap_or("cancelled").to_string(),
                saved_count: 0,
            })
        } else {
            Ok(())
        }
    }

    /// Awaitable used to race in-flight requests against cancellation.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.inner.cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_token_passes_check() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        assert!(token.check().is_ok());
        assert!(token.reason().is_none());
    }

    #[test]
    fn first_cancel_wins() {
        let token = CancellationToken::new();
        token.cancel("operator request");
        token.cancel("second call loses");

        assert!(token.is_cancelled());
        assert_eq!(token.reason(), Some("operator request"));
    }

    #[test]
    fn check_fails_with_reason_after_cancel() {
        let token = CancellationToken::new();
        token.cancel("shutting down");

        match token.check() {
            Err(SyncError::Cancelled { reason, .. }) => assert_eq!(reason, "shutting down"),
            other => panic!("expected cancelled error, got {other:?}"),
        }
    }

    #[test]
    fn clones_share_state() {
        let token = CancellationToken::new();
        let clone = token.clone();
        clone.cancel("from clone");

        assert!(token.is_cancelled());
        assert_eq!(token.reason(), Some("from clone"));
    }

    #[tokio::test]
    async fn cancelled_future_resolves() {
        let token = CancellationToken::new();
        let waiter = token.clone();
        let handle = tokio::spawn(async move { waiter.cancelled().await });
        token.cancel("wake the waiter");
        handle.await.expect("waiter task panicked");
    }
}
