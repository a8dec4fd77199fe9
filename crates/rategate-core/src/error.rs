//! Error types for rate cache operations

use thiserror::Error;

/// How a lock operation failed
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockErrorKind {
    /// Another holder owns the lease
    #[error("already held")]
    NotAcquired,

    /// The lease expired or was taken over while the body ran
    #[error("lease lost")]
    LeaseLost,
}

/// Which bounded wait elapsed
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutKind {
    /// A follower's blocking wait for the leader's result
    #[error("the leader result")]
    FollowerWait,

    /// The hard deadline on one upstream call
    #[error("the upstream call")]
    Upstream,
}

/// Main error type for all engine operations
#[derive(Error, Debug, Clone)]
pub enum RateError {
    /// Upstream oracle returned a non-2xx status
    #[error("upstream returned {code}")]
    Api { code: u16, body: String },

    /// Call rejected locally by the circuit breaker
    #[error("circuit breaker is open")]
    BreakerOpen,

    /// Lock acquisition failed or the lease was lost mid-flight
    #[error("lock {0}")]
    Lock(LockErrorKind),

    /// A bounded wait elapsed
    #[error("timed out waiting for {0}")]
    Timeout(TimeoutKind),

    /// No fresh entry, no stale entry, recovery exhausted
    #[error("no rate available")]
    Unavailable,

    /// Key-value store operation failed
    #[error("store error: {0}")]
    Store(String),

    /// Payload could not be encoded or decoded
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Any other failure
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, RateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RateError::Api {
            code: 502,
            body: "bad gateway".to_string(),
        };
        assert_eq!(err.to_string(), "upstream returned 502");

        let err = RateError::Lock(LockErrorKind::NotAcquired);
        assert_eq!(err.to_string(), "lock already held");

        let err = RateError::Timeout(TimeoutKind::FollowerWait);
        assert_eq!(err.to_string(), "timed out waiting for the leader result");

        let err = RateError::Unavailable;
        assert_eq!(err.to_string(), "no rate available");
    }

    #[test]
    fn test_error_clone() {
        let err = RateError::Timeout(TimeoutKind::Upstream);
        let cloned = err.clone();
        assert_eq!(err.to_string(), cloned.to_string());
    }
}
