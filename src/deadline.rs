//! Per-operation deadlines.
//!
//! Long recomputations check the deadline between steps. Expiry returns
//! [`EngineError::DeadlineExceeded`], the session is dropped uncommitted, and
//! the store is left exactly as it was before the operation started.

use std::time::{Duration, Instant};

use crate::error::EngineError;

/// A point in time after which an operation is abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    expires_at: Option<Instant>,
}

impl Deadline {
    /// A deadline that never expires.
    pub fn none() -> Self {
        Self { expires_at: None }
    }

    /// Expire `timeout` from now.
    pub fn after(timeout: Duration) -> Self {
        Self {
            expires_at: Some(Instant::now() + timeout),
        }
    }

    /// Expire `timeout` from now, or never when `timeout` is `None`.
    pub fn from_timeout(timeout: Option<Duration>) -> Self {
        timeout.map(Self::after).unwrap_or_else(Self::none)
    }

    /// Whether the deadline has passed.
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }

    /// Time left, or `None` for an unbounded deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.expires_at
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    /// Fail with [`EngineError::DeadlineExceeded`] if the deadline has passed.
    pub fn check(&self, operation: &'static str) -> Result<(), EngineError> {
        if self.is_expired() {
            tracing::warn!(operation, "Deadline exceeded, abandoning operation");
            return Err(EngineError::DeadlineExceeded { operation });
        }
        Ok(())
    }
}

impl Default for Deadline {
    fn default() -> Self {
        Self::none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unbounded_never_expires() {
        let deadline = Deadline::none();
        assert!(!deadline.is_expired());
        assert_eq!(deadline.remaining(), None);
        assert!(deadline.check("noop").is_ok());
    }

    #[test]
    fn test_zero_timeout_expires_immediately() {
        let deadline = Deadline::after(Duration::ZERO);
        assert!(deadline.is_expired());
        assert!(matches!(
            deadline.check("recompute"),
            Err(EngineError::DeadlineExceeded { operation: "recompute" })
        ));
    }

    #[test]
    fn test_generous_timeout_has_time_left() {
        let deadline = Deadline::from_timeout(Some(Duration::from_secs(60)));
        assert!(!deadline.is_expired());
        assert!(deadline.remaining().unwrap() > Duration::from_secs(50));
    }
}
