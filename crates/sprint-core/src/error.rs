//! The error taxonomy surfaced through tool responses (§7).
//!
//! Every kind maps to a stable string (`kind()`) so adapters can serialize
//! it without depending on this enum's `Debug` representation.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize)]
pub enum EngineError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("upstream rejected credentials: {0}")]
    Auth(String),

    #[error("rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    #[error("circuit open for provider `{provider}`")]
    CircuitOpen { provider: String },

    #[error("upstream failure: {0}")]
    UpstreamFailure(String),

    #[error("upstream timed out after retries: {0}")]
    UpstreamTimeout(String),

    #[error("internal error")]
    Internal {
        /// Preserved for logs/telemetry; never placed in the user-facing
        /// `message` field of a response envelope.
        debug: String,
    },
}

impl EngineError {
    /// Stable taxonomy name from §7, used as the `kind` field of a tool
    /// response envelope.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Validation(_) => "ValidationError",
            EngineError::NotFound(_) => "NotFound",
            EngineError::Auth(_) => "AuthError",
            EngineError::RateLimitExceeded(_) => "RateLimitExceeded",
            EngineError::CircuitOpen { .. } => "CircuitOpen",
            EngineError::UpstreamFailure(_) => "UpstreamFailure",
            EngineError::UpstreamTimeout(_) => "UpstreamTimeout",
            EngineError::Internal { .. } => "InternalError",
        }
    }

    /// One-line, user-facing message. Never includes the `debug` trace.
    pub fn user_message(&self) -> String {
        match self {
            EngineError::Internal { .. } => "an internal error occurred".to_string(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_error_redacts_debug_from_user_message() {
        let err = EngineError::Internal {
            debug: "panic at worktree_manager.rs:42".to_string(),
        };
        assert_eq!(err.kind(), "InternalError");
        assert!(!err.user_message().contains("worktree_manager"));
    }

    #[test]
    fn circuit_open_kind() {
        let err = EngineError::CircuitOpen {
            provider: "scm".to_string(),
        };
        assert_eq!(err.kind(), "CircuitOpen");
    }
}
