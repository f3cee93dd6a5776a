//! Error taxonomy for the driver seam.

use thiserror::Error;

/// What went wrong, independent of the human-readable message.
///
/// The first two kinds are transient driver failures the bootstrap paths
/// retry on; everything else is surfaced to the caller as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CassErrorKind {
    /// The statement did not complete within the driver timeout.
    QueryTimeout,
    /// The driver reported a failure that is safe to re-issue.
    QueryFailedRestartable,
    /// The statement failed and must not be blindly retried.
    QueryFailed,
    /// A row or message that must exist is absent.
    MissData,
    /// An operation was attempted out of sequence (programmer error).
    SeqFailed,
    /// The session or its configuration is unusable.
    Fatal,
}

/// A failure reported through the Cassandra seam.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct CassError {
    kind: CassErrorKind,
    message: String,
}

impl CassError {
    pub fn new(kind: CassErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Transient failure worth a retry (timeout).
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(CassErrorKind::QueryTimeout, message)
    }

    /// Transient failure worth a retry (driver says restartable).
    pub fn restartable(message: impl Into<String>) -> Self {
        Self::new(CassErrorKind::QueryFailedRestartable, message)
    }

    /// Permanent query failure.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::new(CassErrorKind::QueryFailed, message)
    }

    pub fn kind(&self) -> CassErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// True for failures the caller may re-issue the statement after.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            CassErrorKind::QueryTimeout | CassErrorKind::QueryFailedRestartable
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_is_retryable() {
        assert!(CassError::timeout("read timed out").is_retryable());
        assert!(CassError::restartable("coordinator overloaded").is_retryable());
    }

    #[test]
    fn test_permanent_failures_are_not_retryable() {
        assert!(!CassError::failed("syntax error").is_retryable());
        assert!(!CassError::new(CassErrorKind::SeqFailed, "late callback").is_retryable());
        assert!(!CassError::new(CassErrorKind::Fatal, "no session").is_retryable());
    }

    #[test]
    fn test_display_is_the_message() {
        let err = CassError::timeout("read timed out");
        assert_eq!(err.to_string(), "read timed out");
    }
}
