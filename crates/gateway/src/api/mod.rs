//! HTTP surface.
//!
//! Routes are split into **public** (`/healthz`, `/version`) and
//! **protected** (everything else, gated behind the API-key middleware).

pub mod answer;
pub mod auth;
pub mod chats;
pub mod claude_compat;
pub mod error;
pub mod layers;
pub mod process;
pub mod qq;
pub mod uploads;

use axum::middleware;
use axum::response::{IntoResponse, Json};
use axum::routing::{delete, get, post};
use axum::Router;
use serde_json::json;

use crate::state::AppState;

/// Build the full API router.
pub fn router(state: AppState) -> Router<AppState> {
    let public = Router::new()
        .route("/healthz", get(healthz))
        .route("/version", get(version));

    let protected = Router::new()
        // Core agent surface
        .route("/agent/process", post(process::process))
        .route("/agent/system-layers", get(layers::system_layers))
        .route("/agent/tool-input-answer", post(answer::tool_input_answer))
        // Chats
        .route("/chats", get(chats::list_chats))
        .route("/chats/:id", delete(chats::delete_chat))
        // Channel ingress
        .route("/channels/qq/inbound", post(qq::inbound))
        // Claude compatibility surface
        .route("/v1/messages", post(claude_compat::messages))
        // Uploads
        .route("/uploads", post(uploads::upload))
        .route_layer(middleware::from_fn_with_state(
            state,
            auth::require_api_key,
        ));

    public
        .merge(protected)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

async fn healthz() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn version() -> impl IntoResponse {
    Json(json!({
        "name": "nextai",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
