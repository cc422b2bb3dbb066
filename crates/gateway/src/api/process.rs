//! The core agent endpoint.
//!
//! - `POST /agent/process` — non-streaming: `{reply, events}`; streaming:
//!   `text/event-stream` with `data: <json>\n\n` frames and a terminal
//!   `data: [DONE]\n\n`.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Json, Response};
use futures_util::stream::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use na_domain::event::AgentEvent;
use na_domain::message::RuntimeMessage;

use crate::api::error::ApiError;
use crate::runtime::cancel::CancelToken;
use crate::runtime::session_lock::SessionLockMap;
use crate::runtime::{run_turn, TurnInput};
use crate::state::AppState;

pub const DONE_FRAME: &str = "[DONE]";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request / response shapes
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct AgentProcessRequest {
    pub input: Vec<RuntimeMessage>,
    pub session_id: String,
    pub user_id: String,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default)]
    pub biz_params: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct AgentProcessResponse {
    pub reply: String,
    pub events: Vec<AgentEvent>,
}

/// Resolve an ambiguous channel from the `X-Channel-Source` header.
pub fn resolve_channel(explicit: Option<&str>, headers: &HeaderMap) -> String {
    if let Some(channel) = explicit.map(str::trim).filter(|c| !c.is_empty()) {
        return channel.to_owned();
    }
    match headers
        .get("x-channel-source")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
    {
        Some("web") => "web".into(),
        Some("cli") => "cli".into(),
        _ => "console".into(),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /agent/process
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn process(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<AgentProcessRequest>,
) -> Response {
    let channel = resolve_channel(body.channel.as_deref(), &headers);

    let lock_key = SessionLockMap::key(&body.session_id, &body.user_id, &channel);
    let permit = state.session_locks.acquire(&lock_key).await;

    let input = TurnInput {
        session_id: body.session_id,
        user_id: body.user_id,
        channel,
        input: body.input,
        biz_params: body.biz_params,
        depth: 0,
        cancel: CancelToken::new(),
    };

    let rx = run_turn(state.clone(), input);

    if body.stream {
        return Sse::new(sse_stream(rx, permit)).into_response();
    }

    // Drain all events and keep the lock until the turn completes.
    let mut events = Vec::new();
    let mut rx = rx;
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    drop(permit);

    let reply = events.iter().find_map(|e| match e {
        AgentEvent::Completed { reply, .. } => Some(reply.clone()),
        _ => None,
    });

    match reply {
        Some(reply) => Json(AgentProcessResponse { reply, events }).into_response(),
        None => {
            // The turn never completed: surface the terminal error.
            let (code, message) = events
                .iter()
                .rev()
                .find_map(|e| match e {
                    AgentEvent::Error { code, message, .. } => {
                        Some((code.clone(), message.clone()))
                    }
                    _ => None,
                })
                .unwrap_or_else(|| {
                    ("internal_error".into(), "turn produced no reply".into())
                });
            ApiError::from_code(&code, message).into_response()
        }
    }
}

/// Events as `data: <json>\n\n` frames with the `[DONE]` terminator. The
/// session permit rides inside the stream and releases when it ends.
fn sse_stream(
    mut rx: tokio::sync::mpsc::Receiver<AgentEvent>,
    permit: tokio::sync::OwnedSemaphorePermit,
) -> impl Stream<Item = Result<Event, std::convert::Infallible>> {
    async_stream::stream! {
        while let Some(event) = rx.recv().await {
            let data = serde_json::to_string(&event).unwrap_or_default();
            yield Ok(Event::default().data(data));
        }
        yield Ok(Event::default().data(DONE_FRAME));
        drop(permit);
    }
}
