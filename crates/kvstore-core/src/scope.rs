//! Cancellation and deadline scope carried by every storage handle

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{KvError, KvResult};

/// Cancellation token plus an optional deadline.
///
/// Scopes form a tree: a scope derived with [`Scope::child`],
/// [`Scope::with_timeout`] or [`Scope::with_deadline`] is canceled when its
/// parent is, and never inherits a later deadline than its parent.
#[derive(Debug, Clone)]
pub struct Scope {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Default for Scope {
    fn default() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
        }
    }
}

impl Scope {
    /// A scope that is never canceled and has no deadline
    pub fn background() -> Self {
        Self::default()
    }

    /// Derive a scope canceled together with this one
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Derive a scope that expires after `timeout`, or earlier if this one does
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Derive a scope that expires at `deadline`, or earlier if this one does
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(current) => current.min(deadline),
            None => deadline,
        };
        Self {
            token: self.token.child_token(),
            deadline: Some(deadline),
        }
    }

    /// Cancel this scope and every scope derived from it
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_canceled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, `None` when there is no deadline
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Fail if the scope is already canceled or past its deadline
    pub fn check(&self) -> KvResult<()> {
        if self.token.is_cancelled() {
            return Err(KvError::Canceled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(KvError::DeadlineExceeded),
            _ => Ok(()),
        }
    }

    /// Drive `fut` until it completes, the scope is canceled, or the deadline passes.
    ///
    /// When the scope wins, `fut` is dropped, which releases whatever it held.
    pub async fn run<F>(&self, fut: F) -> KvResult<F::Output>
    where
        F: Future,
    {
        self.check()?;

        let expired = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(KvError::Canceled),
            _ = expired => Err(KvError::DeadlineExceeded),
            output = fut => Ok(output),
        }
    }
}
