use thiserror::Error;

use crate::genai::GenAiError;
use crate::limiter::LimitKind;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("quota exceeded ({limit}), retry after {retry_after_secs}s")]
    QuotaExceeded {
        limit: LimitKind,
        retry_after_secs: u64,
    },

    #[error("circuit open, retry after {retry_after_secs}s")]
    CircuitOpen { retry_after_secs: u64 },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("task {kind} timed out after {timeout_secs}s")]
    TaskTimeout { kind: String, timeout_secs: u64 },

    #[error("task {kind} failed: {message}")]
    TaskFailed { kind: String, message: String },

    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("generative service error: {0}")]
    GenAi(#[from] GenAiError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl EngineError {
    /// Whether retrying the same operation later could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            EngineError::CircuitOpen { .. } | EngineError::TaskTimeout { .. } => true,
            EngineError::GenAi(e) => e.is_transient(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_exceeded_display_names_the_limit() {
        let err = EngineError::QuotaExceeded {
            limit: LimitKind::PerMinute,
            retry_after_secs: 42,
        };
        assert_eq!(
            err.to_string(),
            "quota exceeded (per-minute), retry after 42s"
        );
    }

    #[test]
    fn circuit_open_is_transient() {
        assert!(
            EngineError::CircuitOpen {
                retry_after_secs: 30
            }
            .is_transient()
        );
        assert!(
            !EngineError::TaskFailed {
                kind: "outline".into(),
                message: "exhausted".into()
            }
            .is_transient()
        );
    }
}
