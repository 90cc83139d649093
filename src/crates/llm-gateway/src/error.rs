//! Error types for LLM provider implementations.

use thiserror::Error;

/// Result type for LLM operations.
pub type Result<T> = std::result::Result<T, LlmError>;

/// Errors that can occur when working with LLM providers.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    #[error("API key not found: {0}")]
    ApiKeyNotFound(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Provider error: {0}")]
    ProviderError(String),

    #[error("{0}")]
    Other(String),
}

impl LlmError {
    /// True for failures the gateway's retry policy should retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LlmError::HttpError(_) | LlmError::ServiceUnavailable(_) | LlmError::RateLimitExceeded(_)
        )
    }
}

impl From<serde_json::Error> for LlmError {
    fn from(err: serde_json::Error) -> Self {
        LlmError::SerializationError(err.to_string())
    }
}

/// Maps provider-level failures onto the shared error taxonomy. Transport and
/// capacity errors become `Transient` (the retry policy will act on them);
/// malformed requests and auth failures become `Permanent` or `Validation`.
impl From<LlmError> for ragcore::CoreError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::HttpError(_) | LlmError::ServiceUnavailable(_) | LlmError::RateLimitExceeded(_) => {
                ragcore::CoreError::transient(err.to_string())
            }
            LlmError::InvalidRequest(_) | LlmError::ApiKeyNotFound(_) => {
                ragcore::CoreError::validation(err.to_string())
            }
            LlmError::AuthenticationError(_)
            | LlmError::SerializationError(_)
            | LlmError::InvalidResponse(_)
            | LlmError::ProviderError(_)
            | LlmError::Other(_) => ragcore::CoreError::permanent(err.to_string()),
        }
    }
}
