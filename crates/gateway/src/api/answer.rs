//! Answer submission for `request_user_input` waiters.

use axum::extract::State;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::api::error::ApiError;
use crate::runtime::pending_input::AnswerError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ToolInputAnswerRequest {
    pub request_id: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
    pub answers: Value,
}

/// `POST /agent/tool-input-answer` — matches an outstanding waiter.
/// 404 when no waiter exists, 409 on identity mismatch.
pub async fn tool_input_answer(
    State(state): State<AppState>,
    Json(body): Json<ToolInputAnswerRequest>,
) -> Response {
    let result = state.pending_inputs.answer(
        &body.request_id,
        body.session_id.as_deref(),
        body.user_id.as_deref(),
        body.channel.as_deref(),
        body.answers,
    );

    match result {
        Ok(()) => Json(json!({ "ok": true, "request_id": body.request_id })).into_response(),
        Err(AnswerError::NotFound) => ApiError::from_code(
            "request_user_input_not_found",
            format!("no pending request {}", body.request_id),
        )
        .into_response(),
        Err(AnswerError::Mismatch) => ApiError::from_code(
            "request_user_input_mismatch",
            "identity fields do not match the pending request",
        )
        .into_response(),
    }
}
