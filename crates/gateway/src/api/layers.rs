//! System-layer introspection.
//!
//! `GET /agent/system-layers?prompt_mode=&task_command=&session_id=`
//! returns the ordered layer list with content hashes, previews, and a
//! rough token estimate. Gated by `NEXTAI_SYSTEM_LAYERS_ENDPOINT`.

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;
use serde_json::json;

use na_store::ChatSpec;

use crate::api::error::ApiError;
use crate::runtime::snapshot;
use crate::state::AppState;

const PREVIEW_CHARS: usize = 160;

#[derive(Debug, Deserialize)]
pub struct LayersQuery {
    #[serde(default)]
    pub prompt_mode: Option<String>,
    #[serde(default)]
    pub task_command: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

fn endpoint_enabled() -> bool {
    std::env::var("NEXTAI_SYSTEM_LAYERS_ENDPOINT")
        .map(|v| matches!(v.trim(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

/// Rough token estimate: one token per four characters.
fn estimate_tokens(content: &str) -> usize {
    content.chars().count().div_ceil(4)
}

pub async fn system_layers(
    State(state): State<AppState>,
    Query(query): Query<LayersQuery>,
) -> Response {
    if !endpoint_enabled() {
        return ApiError::from_code("not_found", "system-layers endpoint is disabled")
            .into_response();
    }

    let session_id = query.session_id.as_deref().unwrap_or("inspect");

    // Prefer the real chat's meta when one exists for this session.
    let chat = state
        .store
        .read(|s| {
            s.chats
                .values()
                .find(|c| c.session_id == session_id)
                .cloned()
        })
        .unwrap_or_else(|| ChatSpec::new(session_id, "inspect", "console"));

    let biz = json!({
        "prompt_mode": query.prompt_mode.clone().unwrap_or_default(),
        "task_command": query.task_command.clone().unwrap_or_default(),
    });

    let prompt_mode = query
        .prompt_mode
        .as_deref()
        .and_then(na_domain::mode::PromptMode::parse)
        .unwrap_or_default();
    let slot = state.store.active_llm();

    let snap = snapshot::build(
        &state,
        snapshot::SnapshotInput {
            chat: &chat,
            biz_params: Some(&biz),
            prompt_mode,
            collaboration_mode: Default::default(),
            collaboration_event: None,
            model_slot: &slot,
            depth: 0,
        },
    );

    let layers = match state.assembler.assemble(&snap) {
        Ok(layers) => layers,
        Err(e) => return ApiError::from(na_domain::error::Error::Prompt(e)).into_response(),
    };

    let mut total_tokens = 0usize;
    let rendered: Vec<_> = layers
        .iter()
        .map(|layer| {
            let tokens = estimate_tokens(&layer.content);
            total_tokens += tokens;
            json!({
                "name": layer.name,
                "role": layer.role,
                "layer_hash": layer.content_hash(),
                "preview": layer.content.chars().take(PREVIEW_CHARS).collect::<String>(),
                "est_tokens": tokens,
            })
        })
        .collect();

    Json(json!({
        "prompt_mode": prompt_mode.as_str(),
        "layers": rendered,
        "layer_count": layers.len(),
        "est_tokens_total": total_tokens,
    }))
    .into_response()
}
