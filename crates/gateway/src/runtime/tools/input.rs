//! The request_user_input tool.
//!
//! Plan-mode only. Validates 1-3 structured questions, registers a waiter,
//! and blocks on `(answer | cancellation | timeout)`.

use serde_json::{json, Value};
use std::collections::HashSet;

use na_domain::mode::CollaborationMode;
use na_domain::tool::{ToolError, ToolErrorCode};

use crate::runtime::pending_input::PendingIdentity;
use crate::runtime::tools::ToolCtx;
use crate::state::AppState;

const MAX_QUESTIONS: usize = 3;

fn validate_questions(input: &Value) -> Result<Vec<Value>, ToolError> {
    let questions = input
        .get("questions")
        .and_then(|v| v.as_array())
        .ok_or_else(|| ToolError::invalid_input("missing required field: questions"))?;

    if questions.is_empty() || questions.len() > MAX_QUESTIONS {
        return Err(ToolError::invalid_input(format!(
            "between 1 and {MAX_QUESTIONS} questions required, got {}",
            questions.len()
        )));
    }

    let mut ids = HashSet::new();
    for q in questions {
        let id = q
            .get("id")
            .and_then(|v| v.as_str())
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ToolError::invalid_input("every question requires an id"))?;
        if !ids.insert(id.to_owned()) {
            return Err(ToolError::invalid_input(format!(
                "duplicate question id: {id}"
            )));
        }
        for field in ["header", "question"] {
            if q.get(field)
                .and_then(|v| v.as_str())
                .filter(|s| !s.trim().is_empty())
                .is_none()
            {
                return Err(ToolError::invalid_input(format!(
                    "question {id} requires a non-empty {field}"
                )));
            }
        }
        if let Some(options) = q.get("options").and_then(|v| v.as_array()) {
            for option in options {
                if option.get("label").and_then(|v| v.as_str()).map(str::trim).filter(|s| !s.is_empty()).is_none()
                    || option.get("description").and_then(|v| v.as_str()).is_none()
                {
                    return Err(ToolError::invalid_input(format!(
                        "options on question {id} require label and description"
                    )));
                }
            }
        }
    }

    Ok(questions.clone())
}

/// Block until the user answers, the turn is cancelled, or the timeout
/// elapses.
pub async fn request_user_input(
    state: &AppState,
    ctx: &ToolCtx,
    input: &Value,
) -> Result<Value, ToolError> {
    if ctx.collaboration_mode != CollaborationMode::Plan {
        return Err(ToolError::new(
            ToolErrorCode::PermissionDenied,
            "request_user_input is only available in plan mode",
        ));
    }

    let questions = validate_questions(input)?;
    let request_id = uuid::Uuid::new_v4().to_string();

    let rx = state.pending_inputs.register(
        &request_id,
        PendingIdentity {
            session_id: ctx.session_id.clone(),
            user_id: ctx.user_id.clone(),
            channel: ctx.channel.clone(),
        },
    )?;

    tracing::info!(
        request_id = %request_id,
        questions = questions.len(),
        session_id = %ctx.session_id,
        "request_user_input waiting"
    );

    let timeout =
        std::time::Duration::from_secs(state.config.runtime.request_user_input_timeout_secs);

    let outcome = tokio::select! {
        answer = rx => answer.ok(),
        _ = ctx.cancel.cancelled() => {
            state.pending_inputs.remove(&request_id);
            return Err(ToolError::new(
                ToolErrorCode::InvokeFailed,
                "request_user_input cancelled",
            ));
        }
        _ = tokio::time::sleep(timeout) => {
            state.pending_inputs.remove(&request_id);
            return Err(ToolError::new(
                ToolErrorCode::Timeout,
                "request_user_input timed out waiting for an answer",
            )
            .with_cause("request_user_input_timeout"));
        }
    };

    match outcome {
        Some(answers) => Ok(json!({
            "request_id": request_id,
            "answers": answers,
        })),
        None => {
            state.pending_inputs.remove(&request_id);
            Err(ToolError::new(
                ToolErrorCode::InvokeFailed,
                "answer channel closed",
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn question_validation() {
        let ok = json!({"questions": [
            {"id": "choice", "header": "env", "question": "strict?"}
        ]});
        assert_eq!(validate_questions(&ok).unwrap().len(), 1);

        let empty = json!({"questions": []});
        assert!(validate_questions(&empty).is_err());

        let four = json!({"questions": [
            {"id": "a", "header": "h", "question": "q"},
            {"id": "b", "header": "h", "question": "q"},
            {"id": "c", "header": "h", "question": "q"},
            {"id": "d", "header": "h", "question": "q"}
        ]});
        assert!(validate_questions(&four).is_err());

        let dup = json!({"questions": [
            {"id": "a", "header": "h", "question": "q"},
            {"id": "a", "header": "h", "question": "q"}
        ]});
        assert!(validate_questions(&dup).is_err());

        let bad_option = json!({"questions": [
            {"id": "a", "header": "h", "question": "q", "options": [{"label": "yes"}]}
        ]});
        assert!(validate_questions(&bad_option).is_err());

        let good_option = json!({"questions": [
            {"id": "a", "header": "h", "question": "q",
             "options": [{"label": "yes", "description": "strict mode"}]}
        ]});
        assert!(validate_questions(&good_option).is_ok());
    }
}
