//! Shared error taxonomy for the RAG platform.
//!
//! Every crate in the workspace funnels errors through [`CoreError`], the tagged
//! sum type named in the design notes: `Validation | NotFound | Conflict |
//! Transient | Permanent | Cancelled | Internal`. HTTP and gRPC-style
//! boundaries map each variant to a status code; internal code should never
//! match on the error's `Display` string.

use thiserror::Error;

/// Result type used throughout the workspace.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Tagged error sum type for orchestration, retrieval, and gateway failures.
///
/// Only [`CoreError::Internal`] represents a programming error; every other
/// variant is an expected, recoverable condition that callers are expected to
/// branch on.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Malformed input, oversize upload, bad slug, or exceeded field length.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Tenant, document, session, or access_url not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Duplicate slug or a concurrent state transition collided.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Upstream store or LLM is temporarily unavailable; safe to retry.
    #[error("transient upstream failure: {0}")]
    Transient(String),

    /// Upstream returned something structurally wrong (bad schema, corrupt
    /// file); retrying will not help.
    #[error("permanent upstream failure: {0}")]
    Permanent(String),

    /// The caller asked for the operation to stop; not a failure.
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// Serialization error, treated as permanent unless proven otherwise.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error from file or network operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A bug. The only variant that should ever reach an unrecoverable panic
    /// at the top of the call stack.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// True for errors that a stage-level or request-level retry may resolve.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::Transient(_))
    }

    /// True for conditions that should never be retried automatically.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CoreError::Validation(_) | CoreError::Permanent(_) | CoreError::Cancelled(_)
        )
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        CoreError::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        CoreError::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        CoreError::Conflict(msg.into())
    }

    pub fn transient(msg: impl Into<String>) -> Self {
        CoreError::Transient(msg.into())
    }

    pub fn permanent(msg: impl Into<String>) -> Self {
        CoreError::Permanent(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        CoreError::Internal(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_is_retryable() {
        assert!(CoreError::transient("timeout").is_retryable());
        assert!(!CoreError::validation("bad input").is_retryable());
    }

    #[test]
    fn validation_permanent_cancelled_are_terminal() {
        assert!(CoreError::validation("x").is_terminal());
        assert!(CoreError::permanent("x").is_terminal());
        assert!(CoreError::Cancelled("x".into()).is_terminal());
        assert!(!CoreError::transient("x").is_terminal());
        assert!(!CoreError::Internal("x".into()).is_terminal());
    }

    #[test]
    fn display_is_stable_prefix() {
        let err = CoreError::not_found("tenant abc");
        assert_eq!(err.to_string(), "not found: tenant abc");
    }
}
