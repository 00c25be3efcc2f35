//! Error types for the generative service client.

use thiserror::Error;

/// Errors that can occur when calling the generative text service.
#[derive(Debug, Error)]
pub enum GenAiError {
    /// The service returned HTTP 429. `retry_after_ms` says how long to
    /// wait before retrying.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Any other non-success HTTP response (e.g. 401 bad key, 500).
    #[error("API error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    /// The per-call timeout elapsed before a response arrived.
    #[error("request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// Underlying network failure (DNS, refused connection).
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl GenAiError {
    /// Whether a retry at the task level has a chance of succeeding.
    /// Everything except client-side 4xx errors is considered transient.
    pub fn is_transient(&self) -> bool {
        match self {
            GenAiError::RateLimited { .. } | GenAiError::Timeout { .. } => true,
            GenAiError::ApiError { status, .. } => *status >= 500,
            GenAiError::Network(_) => true,
        }
    }
}
