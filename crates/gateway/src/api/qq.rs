//! QQ inbound ingress.
//!
//! Accepts C2C and group events, extracts text/user/target, and forwards
//! them through the same semantics as `/agent/process` on the `qq`
//! channel. The reply is dispatched back through the configured `qq`
//! channel config (console fallback) and also returned in the response.

use axum::extract::State;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;
use serde_json::json;

use na_domain::event::AgentEvent;
use na_domain::message::RuntimeMessage;

use crate::api::error::ApiError;
use crate::runtime::cancel::CancelToken;
use crate::runtime::session_lock::SessionLockMap;
use crate::runtime::{run_turn, TurnInput};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct QqInboundRequest {
    /// Event kind: `c2c` (direct) or `group`.
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub openid: Option<String>,
    #[serde(default)]
    pub group_id: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

/// The extracted routing triple + message text.
#[derive(Debug, PartialEq, Eq)]
pub struct QqExtract {
    pub user_id: String,
    pub session_id: String,
    pub text: String,
}

/// Pull user/target/text out of an inbound event. Group events scope the
/// session to the group; direct chats scope it to the sender.
pub fn extract(req: &QqInboundRequest) -> Result<QqExtract, String> {
    let user_id = req
        .user_id
        .clone()
        .or_else(|| req.openid.clone())
        .filter(|s| !s.trim().is_empty())
        .ok_or("missing user_id/openid")?;

    let text = req
        .content
        .clone()
        .or_else(|| req.text.clone())
        .map(|s| s.trim().to_owned())
        .filter(|s| !s.is_empty())
        .ok_or("missing content/text")?;

    let session_id = match (req.kind.as_str(), &req.group_id) {
        ("group", Some(group)) if !group.trim().is_empty() => format!("qq-group-{group}"),
        _ => format!("qq-c2c-{user_id}"),
    };

    Ok(QqExtract {
        user_id,
        session_id,
        text,
    })
}

/// `POST /channels/qq/inbound`
pub async fn inbound(
    State(state): State<AppState>,
    Json(body): Json<QqInboundRequest>,
) -> Response {
    let extracted = match extract(&body) {
        Ok(e) => e,
        Err(message) => return ApiError::from_code("invalid_request", message).into_response(),
    };

    let lock_key = SessionLockMap::key(&extracted.session_id, &extracted.user_id, "qq");
    let _permit = state.session_locks.acquire(&lock_key).await;

    let input = TurnInput {
        session_id: extracted.session_id.clone(),
        user_id: extracted.user_id.clone(),
        channel: "qq".into(),
        input: vec![RuntimeMessage::user(&extracted.text)],
        biz_params: None,
        depth: 0,
        cancel: CancelToken::new(),
    };

    let mut rx = run_turn(state.clone(), input);
    let mut reply: Option<String> = None;
    let mut error: Option<(String, String)> = None;
    while let Some(event) = rx.recv().await {
        match event {
            AgentEvent::Completed { reply: r, .. } => reply = Some(r),
            AgentEvent::Error { code, message, .. } => error = Some((code, message)),
            _ => {}
        }
    }

    let Some(reply) = reply else {
        let (code, message) =
            error.unwrap_or_else(|| ("internal_error".into(), "no reply".into()));
        return ApiError::from_code(&code, message).into_response();
    };

    // Outbound delivery through the configured qq channel; failures are
    // logged but do not fail the ingress response.
    if let Err(e) = state
        .channels
        .dispatch_by_id(
            &state.store,
            "qq",
            &extracted.user_id,
            &extracted.session_id,
            &reply,
        )
        .await
    {
        tracing::warn!(error = %e, "qq outbound dispatch failed");
    }

    Json(json!({
        "reply": reply,
        "session_id": extracted.session_id,
        "user_id": extracted.user_id,
    }))
    .into_response()
}

/// Log the supervisor toggle once at boot.
pub fn log_supervisor_flag() {
    let disabled = std::env::var("NEXTAI_DISABLE_QQ_INBOUND_SUPERVISOR")
        .map(|v| matches!(v.trim(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false);
    if disabled {
        tracing::warn!("qq inbound supervisor disabled via NEXTAI_DISABLE_QQ_INBOUND_SUPERVISOR");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(kind: &str) -> QqInboundRequest {
        QqInboundRequest {
            kind: kind.into(),
            user_id: Some("u-9".into()),
            openid: None,
            group_id: Some("g-7".into()),
            content: Some("  hello  ".into()),
            text: None,
        }
    }

    #[test]
    fn c2c_scopes_session_to_sender() {
        let out = extract(&request("c2c")).unwrap();
        assert_eq!(out.session_id, "qq-c2c-u-9");
        assert_eq!(out.text, "hello");
    }

    #[test]
    fn group_scopes_session_to_group() {
        let out = extract(&request("group")).unwrap();
        assert_eq!(out.session_id, "qq-group-g-7");
    }

    #[test]
    fn openid_is_a_user_fallback() {
        let mut req = request("c2c");
        req.user_id = None;
        req.openid = Some("open-1".into());
        let out = extract(&req).unwrap();
        assert_eq!(out.user_id, "open-1");
    }

    #[test]
    fn missing_fields_are_rejected() {
        let mut req = request("c2c");
        req.user_id = None;
        req.openid = None;
        assert!(extract(&req).is_err());

        let mut req = request("c2c");
        req.content = None;
        assert!(extract(&req).is_err());
    }
}
