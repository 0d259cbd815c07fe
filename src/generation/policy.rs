//! Bounded retry policy and session errors

use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::types::{GenerationRequest, DEFAULT_MAX_ATTEMPTS};

/// Errors a session can surface to its caller.
///
/// Only raised when no attempt was scored; otherwise the caller always gets
/// a best-attempt result.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("all {attempts} attempts failed to generate (last error: {last_error})")]
    AllAttemptsFailed { attempts: u32, last_error: String },

    #[error("session cancelled before any attempt was scored")]
    Cancelled,

    #[error("session deadline of {0:?} passed before any attempt was scored")]
    DeadlineExceeded(Duration),
}

/// Attempt budget, deadlines and the cancellation signal for a session
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Deadline for one generate + analyze cycle
    pub attempt_timeout: Option<Duration>,
    /// Deadline for the whole session
    pub session_timeout: Option<Duration>,
    pub cancel: CancellationToken,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS)
    }
}

impl RetryPolicy {
    /// Policy with no deadlines
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            attempt_timeout: None,
            session_timeout: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }

    pub fn with_session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = Some(timeout);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Copy of this policy using the request's attempt budget (at least one)
    pub fn for_request(&self, request: &GenerationRequest) -> Self {
        Self {
            max_attempts: request.max_attempts.max(1),
            ..self.clone()
        }
    }

    /// Session deadline measured from `start`
    pub fn session_deadline(&self, start: Instant) -> Option<Instant> {
        self.session_timeout.map(|t| start + t)
    }

    /// Deadline for an attempt starting now, capped by the session deadline
    pub fn attempt_deadline(&self, session_deadline: Option<Instant>) -> Option<Instant> {
        let attempt = self.attempt_timeout.map(|t| Instant::now() + t);
        match (attempt, session_deadline) {
            (Some(a), Some(s)) => Some(a.min(s)),
            (a, s) => a.or(s),
        }
    }
}
