//! Anthropic-compatible `/v1/messages` endpoint.
//!
//! Accepts the standard Messages request shape, flattens system and tool
//! blocks into text, and runs the turn through the orchestrator in
//! `claude` prompt mode. Supports non-streaming responses, the
//! `?count_tokens` estimate, and streaming with the
//! `message_start → content_block_* → message_delta → message_stop`
//! event sequence.

use std::collections::HashMap;

use axum::extract::{Query, State};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Json, Response};
use futures_util::stream::Stream;
use serde::Deserialize;
use serde_json::{json, Value};

use na_domain::event::AgentEvent;
use na_domain::message::RuntimeMessage;

use crate::api::error::ApiError;
use crate::runtime::cancel::CancelToken;
use crate::runtime::{run_turn, TurnInput};
use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request shape
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct MessagesRequest {
    pub model: String,
    #[serde(default)]
    pub system: Option<Value>,
    pub messages: Vec<CompatMessage>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct CompatMessage {
    pub role: String,
    pub content: Value,
}

/// Flatten a content value (string or block array) into plain text.
/// `tool_use` / `tool_result` blocks become text representations.
pub fn flatten_content(content: &Value) -> String {
    match content {
        Value::String(s) => s.clone(),
        Value::Array(blocks) => blocks
            .iter()
            .filter_map(|block| match block.get("type").and_then(|t| t.as_str()) {
                Some("text") => block
                    .get("text")
                    .and_then(|t| t.as_str())
                    .map(|s| s.to_owned()),
                Some("tool_use") => {
                    let name = block.get("name").and_then(|n| n.as_str()).unwrap_or("?");
                    let input = block.get("input").cloned().unwrap_or(Value::Null);
                    Some(format!("[tool_use {name} {input}]"))
                }
                Some("tool_result") => {
                    let body = block
                        .get("content")
                        .map(flatten_content)
                        .unwrap_or_default();
                    Some(format!("[tool_result {body}]"))
                }
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    }
}

/// Turn the compat request into orchestrator input: system blocks become
/// system messages, the final user message is the turn input, and every
/// earlier message becomes history context.
fn build_turn_messages(req: &MessagesRequest) -> Vec<RuntimeMessage> {
    let mut messages = Vec::new();

    if let Some(system) = &req.system {
        let text = flatten_content(system);
        if !text.trim().is_empty() {
            messages.push(RuntimeMessage::system(text));
        }
    }

    for m in &req.messages {
        let text = flatten_content(&m.content);
        if text.trim().is_empty() {
            continue;
        }
        match m.role.as_str() {
            "assistant" => messages.push(RuntimeMessage::assistant(text)),
            "system" => messages.push(RuntimeMessage::system(text)),
            _ => messages.push(RuntimeMessage::user(text)),
        }
    }

    messages
}

fn estimate_input_tokens(req: &MessagesRequest) -> usize {
    let chars: usize = build_turn_messages(req)
        .iter()
        .map(|m| m.text().chars().count())
        .sum();
    chars.div_ceil(4)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/messages (+ ?count_tokens)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn messages(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
    Json(body): Json<MessagesRequest>,
) -> Response {
    if query.contains_key("count_tokens") {
        return Json(json!({ "input_tokens": estimate_input_tokens(&body) })).into_response();
    }

    let turn_messages = build_turn_messages(&body);
    if turn_messages.iter().all(|m| m.text().trim().is_empty()) {
        return ApiError::from_code("invalid_request", "no message content").into_response();
    }

    // Compat turns run in their own ephemeral session.
    let session_id = format!("compat-{}", uuid::Uuid::new_v4());
    let input = TurnInput {
        session_id,
        user_id: "anthropic-compat".into(),
        channel: "web".into(),
        input: turn_messages,
        biz_params: Some(json!({ "prompt_mode": "claude" })),
        depth: 0,
        cancel: CancelToken::new(),
    };

    let model = body.model.clone();
    let rx = run_turn(state.clone(), input);

    if body.stream {
        return Sse::new(message_stream(rx, model)).into_response();
    }

    let mut rx = rx;
    let mut reply: Option<String> = None;
    let mut error: Option<(String, String)> = None;
    while let Some(event) = rx.recv().await {
        match event {
            AgentEvent::Completed { reply: r, .. } => reply = Some(r),
            AgentEvent::Error { code, message, .. } => error = Some((code, message)),
            _ => {}
        }
    }

    match reply {
        Some(text) => {
            let output_tokens = text.chars().count().div_ceil(4);
            Json(json!({
                "id": format!("msg_{}", uuid::Uuid::new_v4().simple()),
                "type": "message",
                "role": "assistant",
                "model": model,
                "content": [{ "type": "text", "text": text }],
                "stop_reason": "end_turn",
                "stop_sequence": null,
                "usage": { "input_tokens": 0, "output_tokens": output_tokens },
            }))
            .into_response()
        }
        None => {
            let (code, message) =
                error.unwrap_or_else(|| ("internal_error".into(), "no reply".into()));
            ApiError::from_code(&code, message).into_response()
        }
    }
}

/// The Anthropic streaming event sequence over the orchestrator events.
fn message_stream(
    mut rx: tokio::sync::mpsc::Receiver<AgentEvent>,
    model: String,
) -> impl Stream<Item = Result<Event, std::convert::Infallible>> {
    let message_id = format!("msg_{}", uuid::Uuid::new_v4().simple());

    async_stream::stream! {
        yield named(
            "message_start",
            json!({
                "type": "message_start",
                "message": {
                    "id": message_id,
                    "type": "message",
                    "role": "assistant",
                    "model": model,
                    "content": [],
                    "stop_reason": null,
                    "usage": { "input_tokens": 0, "output_tokens": 0 },
                }
            }),
        );
        yield named(
            "content_block_start",
            json!({
                "type": "content_block_start",
                "index": 0,
                "content_block": { "type": "text", "text": "" }
            }),
        );

        let mut output_chars = 0usize;
        let mut errored = false;
        while let Some(event) = rx.recv().await {
            match event {
                AgentEvent::AssistantDelta { delta, .. } => {
                    output_chars += delta.chars().count();
                    yield named(
                        "content_block_delta",
                        json!({
                            "type": "content_block_delta",
                            "index": 0,
                            "delta": { "type": "text_delta", "text": delta }
                        }),
                    );
                }
                AgentEvent::Error { code, message, .. } => {
                    errored = true;
                    yield named(
                        "error",
                        json!({
                            "type": "error",
                            "error": { "type": code, "message": message }
                        }),
                    );
                }
                _ => {}
            }
        }

        yield named(
            "content_block_stop",
            json!({ "type": "content_block_stop", "index": 0 }),
        );
        yield named(
            "message_delta",
            json!({
                "type": "message_delta",
                "delta": {
                    "stop_reason": if errored { "error" } else { "end_turn" },
                    "stop_sequence": null
                },
                "usage": { "output_tokens": output_chars.div_ceil(4) }
            }),
        );
        yield named("message_stop", json!({ "type": "message_stop" }));
    }
}

fn named(event: &str, data: Value) -> Result<Event, std::convert::Infallible> {
    Ok(Event::default().event(event).data(data.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flatten_string_content() {
        assert_eq!(flatten_content(&json!("plain")), "plain");
    }

    #[test]
    fn flatten_blocks_with_tool_use_and_result() {
        let blocks = json!([
            { "type": "text", "text": "before" },
            { "type": "tool_use", "name": "shell", "input": { "command": "ls" } },
            { "type": "tool_result", "content": [{ "type": "text", "text": "ok" }] },
        ]);
        let text = flatten_content(&blocks);
        assert!(text.contains("before"));
        assert!(text.contains("[tool_use shell"));
        assert!(text.contains("[tool_result ok]"));
    }

    #[test]
    fn system_blocks_become_system_messages() {
        let req = MessagesRequest {
            model: "claude-sonnet".into(),
            system: Some(json!([{ "type": "text", "text": "be terse" }])),
            messages: vec![CompatMessage {
                role: "user".into(),
                content: json!("hi"),
            }],
            stream: false,
            max_tokens: None,
        };
        let messages = build_turn_messages(&req);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, na_domain::message::Role::System);
        assert_eq!(messages[0].text(), "be terse");
        assert_eq!(messages[1].role, na_domain::message::Role::User);
    }

    #[test]
    fn token_estimate_counts_all_messages() {
        let req = MessagesRequest {
            model: "m".into(),
            system: None,
            messages: vec![CompatMessage {
                role: "user".into(),
                content: json!("abcdefgh"),
            }],
            stream: false,
            max_tokens: None,
        };
        assert_eq!(estimate_input_tokens(&req), 2);
    }
}
