//! Cancellation/deadline context for blocking calls.
//!
//! Every suspending operation (`connect`, `disconnect`, `join_room`,
//! `leave`, `ask`, `dial`) takes a `Ctx`. Cancelling only stops the local
//! wait; a message already written is not retracted.

use tokio::time::{sleep_until, Duration, Instant};
use tokio_util::sync::CancellationToken;

use wsmux_core::WsMuxError;

#[derive(Debug, Clone, Default)]
pub struct Ctx {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Ctx {
    /// Never times out; only explicit cancellation ends the wait.
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: Some(deadline),
        }
    }

    /// Bind to an existing token, e.g. a server-wide shutdown token.
    pub fn with_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_done(&self) -> bool {
        self.token.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Resolves once the context is cancelled or its deadline passes, with
    /// the matching error.
    pub async fn done(&self) -> WsMuxError {
        match self.deadline {
            Some(deadline) => tokio::select! {
                _ = self.token.cancelled() => WsMuxError::Cancelled,
                _ = sleep_until(deadline) => WsMuxError::Timeout,
            },
            None => {
                self.token.cancelled().await;
                WsMuxError::Cancelled
            }
        }
    }
}
