//! Scheduler error types

use std::time::Duration;
use thiserror::Error;

/// Errors a remote operation can fail with
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// The service is saturated or flaky; waiting and retrying may help
    #[error("Transient remote failure: {0}")]
    Transient(String),

    /// A named resource does not exist on the service
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// The service refused the call (bad argument, permission, ...)
    #[error("Remote call rejected: {0}")]
    Rejected(String),
}

impl RemoteError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            RemoteError::Transient(_) => true,
            RemoteError::NotFound(_) => false,
            RemoteError::Rejected(_) => false,
        }
    }

    /// Check if this is a missing-resource error
    pub fn is_not_found(&self) -> bool {
        matches!(self, RemoteError::NotFound(_))
    }
}

/// Errors surfaced to callers of the scheduler
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Timed out after {limit:?}")]
    TimeoutExceeded { limit: Duration },

    #[error("Gave up after {attempts} attempts: {source}")]
    PermanentFailure {
        attempts: u32,
        #[source]
        source: RemoteError,
    },

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error(transparent)]
    Remote(RemoteError),
}

impl SchedulerError {
    /// Check if the call ran out of wall-clock budget
    pub fn is_timeout(&self) -> bool {
        matches!(self, SchedulerError::TimeoutExceeded { .. })
    }

    /// Check if the call ran out of attempts
    pub fn is_permanent(&self) -> bool {
        matches!(self, SchedulerError::PermanentFailure { .. })
    }

    /// Check if a resource identity could not be resolved
    pub fn is_not_found(&self) -> bool {
        matches!(self, SchedulerError::ResourceNotFound(_))
    }
}

impl From<RemoteError> for SchedulerError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::NotFound(what) => SchedulerError::ResourceNotFound(what),
            other => SchedulerError::Remote(other),
        }
    }
}
