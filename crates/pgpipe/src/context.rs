//! Cooperative cancellation for pipeline runs.

use crate::error::{PipeError, PipeResult};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// Shared cancellation flag.
///
/// Clones observe the same flag, so a token handed to a pipeline run can be
/// cancelled from another task.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Cancellation token plus optional deadline, checked between statements.
///
/// A statement that has started always runs to completion; the check happens
/// before the next one starts.
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl RunContext {
    /// A context that never cancels.
    pub fn new() -> Self {
        Self::default()
    }

    /// Observe `token` for cancellation.
    pub fn with_token(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    /// Stop before any statement that would start at or after `deadline`.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Deadline `timeout` from now.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Err if the run should stop before starting another statement.
    pub fn check(&self) -> PipeResult<()> {
        if self.token.is_cancelled() {
            return Err(PipeError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(PipeError::DeadlineExceeded),
            _ => Ok(()),
        }
    }
}
