use std::time::Duration;
use thiserror::Error;

/// Result type for LLM operations.
pub type Result<T> = std::result::Result<T, LlmError>;

/// Errors that can occur when working with LLM providers.
#[derive(Debug, Error)]
pub enum LlmError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// API authentication failed.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// API key not found in environment.
    #[error("API key not found: {0}")]
    ApiKeyNotFound(String),

    /// Rate limit exceeded; `retry_after` carries the server-reported delay
    /// when the provider sent one.
    #[error("rate limit exceeded: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },

    /// Invalid response from provider (missing choices, bad JSON, etc.).
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The model returned output that failed structured-output validation.
    #[error("structured output invalid: {0}")]
    StructuredOutput(String),

    /// General provider error.
    #[error("provider error: {0}")]
    Provider(String),

    /// Retries exhausted without a successful call.
    #[error("retries exhausted after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },
}

impl LlmError {
    /// Whether this error is worth retrying with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LlmError::RateLimited { .. } | LlmError::Http(_))
    }
}
