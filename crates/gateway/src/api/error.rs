//! The HTTP error envelope: `{"error":{"code","message","details?"}}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::{json, Value};

use na_domain::error::Error;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
    pub details: Option<Value>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Build from a stable error code plus message, using the canonical
    /// status mapping. Used for codes carried inside `error` events.
    pub fn from_code(code: &str, message: impl Into<String>) -> Self {
        Self::new(status_for_code(code), code, message)
    }
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self {
            status: StatusCode::from_u16(e.http_status())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            code: e.code().to_owned(),
            message: e.to_string(),
            details: None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut error = json!({
            "code": self.code,
            "message": self.message,
        });
        if let Some(details) = self.details {
            error["details"] = details;
        }
        (self.status, Json(json!({ "error": error }))).into_response()
    }
}

/// Canonical status for a stable error code.
pub fn status_for_code(code: &str) -> StatusCode {
    match code {
        "invalid_json" | "invalid_request" | "invalid_tool_input" | "tool_not_supported"
        | "tool_invoke_failed" | "conflicting_collaboration_event"
        | "collaboration_requires_codex" => StatusCode::BAD_REQUEST,
        "unauthorized" => StatusCode::UNAUTHORIZED,
        "tool_disabled" | "tool_permission_denied" => StatusCode::FORBIDDEN,
        "not_found" | "provider_not_found" | "request_user_input_not_found" => {
            StatusCode::NOT_FOUND
        }
        "tool_conflict" | "request_user_input_mismatch" | "default_chat_protected"
        | "default_cron_protected" => StatusCode::CONFLICT,
        "provider_request_failed" | "provider_invalid_reply" | "channel_dispatch_failed"
        | "tool_runtime_unavailable" | "tool_invalid_result" => StatusCode::BAD_GATEWAY,
        "tool_timeout" | "cron_execution_timeout" => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_table() {
        assert_eq!(status_for_code("invalid_request"), StatusCode::BAD_REQUEST);
        assert_eq!(status_for_code("unauthorized"), StatusCode::UNAUTHORIZED);
        assert_eq!(status_for_code("tool_disabled"), StatusCode::FORBIDDEN);
        assert_eq!(
            status_for_code("request_user_input_not_found"),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for_code("request_user_input_mismatch"),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for_code("provider_request_failed"),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(status_for_code("tool_timeout"), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(
            status_for_code("runner_error"),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn domain_error_maps_through() {
        let api: ApiError = Error::DefaultChatProtected.into();
        assert_eq!(api.status, StatusCode::CONFLICT);
        assert_eq!(api.code, "default_chat_protected");
    }
}
