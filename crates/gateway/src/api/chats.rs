//! Chat listing and explicit deletion.

use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;
use serde_json::json;

use crate::api::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatsQuery {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
}

/// `GET /chats?user_id=&channel=`
pub async fn list_chats(
    State(state): State<AppState>,
    Query(query): Query<ChatsQuery>,
) -> Response {
    let chats = state
        .store
        .list_chats(query.user_id.as_deref(), query.channel.as_deref());

    let rendered: Vec<_> = chats
        .iter()
        .map(|c| {
            json!({
                "id": c.id,
                "name": c.name,
                "session_id": c.session_id,
                "user_id": c.user_id,
                "channel": c.channel,
                "created_at": c.created_at,
                "updated_at": c.updated_at,
            })
        })
        .collect();

    Json(json!({ "chats": rendered, "count": rendered.len() })).into_response()
}

/// `DELETE /chats/:id` — the system-default chat is protected.
pub async fn delete_chat(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.store.delete_chat(&id) {
        Ok(()) => Json(json!({ "ok": true, "id": id })).into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}
