//! Error types for LLM provider calls.

use thiserror::Error;

/// Result type for LLM operations.
pub type Result<T> = std::result::Result<T, LlmError>;

/// Errors that can occur when talking to a provider.
#[derive(Debug, Error)]
pub enum LlmError {
    /// HTTP request failed before a status code came back.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// API authentication failed (401). Surfaced to the user.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// No API key configured for the request.
    #[error("API key not found: {0}")]
    ApiKeyNotFound(String),

    /// Model unknown to the provider (404).
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    /// Rate limit exceeded (429). Retry with backoff.
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// Provider-side failure (5xx). Transient.
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Response body did not parse into the expected shape.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Request deadline elapsed.
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// Any other provider error.
    #[error("Provider error: {0}")]
    Provider(String),

    /// Profile storage failure.
    #[error("Profile store error: {0}")]
    ProfileStore(String),
}

impl LlmError {
    /// True when a retry may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::Http(e) => e.is_timeout() || e.is_connect(),
            LlmError::ServiceUnavailable(_)
            | LlmError::Timeout(_)
            | LlmError::RateLimitExceeded(_) => true,
            _ => false,
        }
    }

    /// True when the failure traces back to credentials.
    pub fn is_auth_error(&self) -> bool {
        matches!(
            self,
            LlmError::Authentication(_) | LlmError::ApiKeyNotFound(_)
        )
    }
}

impl From<serde_json::Error> for LlmError {
    fn from(err: serde_json::Error) -> Self {
        LlmError::InvalidResponse(err.to_string())
    }
}
