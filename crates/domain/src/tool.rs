//! Internal tool call format and the uniform tool error type.
//!
//! Every tool invocation is normalized into a [`ToolCall`]; every handler
//! failure is wrapped into a [`ToolError`] whose identity (not just the
//! message) drives the HTTP surface mapping.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A normalized tool call emitted by the runner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// Tool definition exposed to the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON Schema for the tool's parameters.
    pub parameters: Value,
}

/// The outcome of a dispatched tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    pub name: String,
    pub result: Value,
    pub ok: bool,
}

/// Extract the effective input payload from a tool call body.
///
/// Calls arrive either as `{name, input:{…}}` or `{name, items:[{…},…]}`.
/// When `items` is non-empty its first element wins; otherwise the raw
/// value is treated as a single-item payload.
pub fn normalize_tool_input(raw: &Value) -> Value {
    if let Some(items) = raw.get("items").and_then(|v| v.as_array()) {
        if let Some(first) = items.first() {
            return first.clone();
        }
    }
    if let Some(input) = raw.get("input") {
        return input.clone();
    }
    raw.clone()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ToolError
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Sentinel codes whose identity is matched by the surface mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorCode {
    /// Tool is on the disable list.
    Disabled,
    /// Unknown tool, or the routed handler lacks the required capability.
    NotSupported,
    /// Arguments failed validation or could not be parsed.
    InvalidInput,
    /// The handler timed out (e.g. request_user_input after 15 minutes).
    Timeout,
    /// A required runtime is missing (shell executor, apply_patch binary).
    RuntimeUnavailable,
    /// Escalation or file access denied.
    PermissionDenied,
    /// Duplicate waiter/agent, or a busy agent.
    Conflict,
    /// Handler produced a non-serializable result.
    InvalidResult,
    /// Any other handler failure.
    InvokeFailed,
}

impl ToolErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolErrorCode::Disabled => "tool_disabled",
            ToolErrorCode::NotSupported => "tool_not_supported",
            ToolErrorCode::InvalidInput => "invalid_tool_input",
            ToolErrorCode::Timeout => "tool_timeout",
            ToolErrorCode::RuntimeUnavailable => "tool_runtime_unavailable",
            ToolErrorCode::PermissionDenied => "tool_permission_denied",
            ToolErrorCode::Conflict => "tool_conflict",
            ToolErrorCode::InvalidResult => "tool_invalid_result",
            ToolErrorCode::InvokeFailed => "tool_invoke_failed",
        }
    }
}

/// Uniform error surfaced by the tool dispatcher.
#[derive(thiserror::Error, Debug, Clone)]
#[error("tool_error code={} message={}", .code.as_str(), .message)]
pub struct ToolError {
    pub code: ToolErrorCode,
    pub message: String,
    /// Underlying cause detail (sentinel name, stderr, parse error…).
    pub cause: Option<String>,
}

impl ToolError {
    pub fn new(code: ToolErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            cause: None,
        }
    }

    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    pub fn disabled(name: &str) -> Self {
        Self::new(ToolErrorCode::Disabled, format!("tool {name} is disabled"))
    }

    pub fn not_supported(name: &str) -> Self {
        Self::new(
            ToolErrorCode::NotSupported,
            format!("tool {name} is not supported"),
        )
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ToolErrorCode::InvalidInput, message)
    }

    /// Code reported on the HTTP surface.
    pub fn surface_code(&self) -> &'static str {
        self.code.as_str()
    }

    pub fn http_status(&self) -> u16 {
        match self.code {
            ToolErrorCode::Disabled => 403,
            ToolErrorCode::NotSupported => 400,
            ToolErrorCode::InvalidInput => 400,
            ToolErrorCode::Conflict => 409,
            ToolErrorCode::Timeout => 504,
            ToolErrorCode::RuntimeUnavailable => 502,
            ToolErrorCode::PermissionDenied => 403,
            ToolErrorCode::InvalidResult => 502,
            ToolErrorCode::InvokeFailed => 400,
        }
    }
}
