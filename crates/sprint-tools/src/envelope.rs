//! The tool invocation envelope (§4.E, §6): every dispatch returns this
//! shape regardless of which tool ran or how it failed.

use serde::{Deserialize, Serialize};
use sprint_core::error::EngineError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolError {
    pub kind: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ToolError {
    /// Maps an [`EngineError`] onto the response-level taxonomy (§7),
    /// carrying the user-facing message but never the internal `debug`
    /// trace for `InternalError`.
    pub fn from_engine_error(err: &EngineError) -> Self {
        Self {
            kind: err.kind().to_string(),
            message: err.user_message(),
            details: None,
        }
    }

    pub fn validation(field_errors: Vec<String>) -> Self {
        Self {
            kind: "ValidationError".to_string(),
            message: "one or more input fields are invalid".to_string(),
            details: Some(serde_json::json!({ "fields": field_errors })),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            kind: "NotFound".to_string(),
            message: message.into(),
            details: None,
        }
    }

    pub fn rate_limit_exceeded(message: impl Into<String>) -> Self {
        Self {
            kind: "RateLimitExceeded".to_string(),
            message: message.into(),
            details: None,
        }
    }

    pub fn internal(debug: impl Into<String>) -> Self {
        Self {
            kind: "InternalError".to_string(),
            message: "an internal error occurred".to_string(),
            details: Some(serde_json::json!({ "debug": debug.into() })),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolError>,
    #[serde(rename = "toolName")]
    pub tool_name: String,
    #[serde(rename = "durationMs")]
    pub duration_ms: u64,
}

impl ToolResponse {
    pub fn ok(tool_name: &str, result: serde_json::Value, duration_ms: u64) -> Self {
        Self {
            success: true,
            result: Some(result),
            error: None,
            tool_name: tool_name.to_string(),
            duration_ms,
        }
    }

    pub fn failed(tool_name: &str, error: ToolError, duration_ms: u64) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error),
            tool_name: tool_name.to_string(),
            duration_ms,
        }
    }
}
