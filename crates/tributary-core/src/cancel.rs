//! Request-scoped cancellation
//!
//! A [`CancelSignal`] combines an explicit cancellation token with an
//! optional deadline. Long-running stream operations observe it at every
//! suspension point.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why a [`CancelSignal`] fired
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// The token was cancelled explicitly
    Requested,
    /// The deadline elapsed
    DeadlineExceeded,
}

/// Cancellation token plus optional deadline
#[derive(Debug, Clone)]
pub struct CancelSignal {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new(CancellationToken::new())
    }
}

impl CancelSignal {
    /// Bind to an existing token with no deadline
    pub const fn new(token: CancellationToken) -> Self {
        Self { token, deadline: None }
    }

    /// Set an absolute deadline
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Set a deadline relative to now
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Underlying token
    pub const fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Configured deadline, if any
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Cancel explicitly
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether the token was cancelled or the deadline has passed
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Token that is cancelled whenever this signal's token is, and can also be
    /// cancelled on its own without affecting the parent
    pub fn child_token(&self) -> CancellationToken {
        self.token.child_token()
    }

    /// Wait until the signal fires
    ///
    /// An explicit cancellation wins when both conditions are ready.
    pub async fn cancelled(&self) -> CancelReason {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    biased;
                    () = self.token.cancelled() => CancelReason::Requested,
                    () = tokio::time::sleep_until(deadline) => CancelReason::DeadlineExceeded,
                }
            }
            None => {
                self.token.cancelled().await;
                CancelReason::Requested
            }
        }
    }
}
