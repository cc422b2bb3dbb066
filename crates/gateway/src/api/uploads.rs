//! Upload ingestion with sanitized names.

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;
use serde_json::json;

use crate::api::error::ApiError;
use crate::state::AppState;
use crate::uploads::save_upload;

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    #[serde(default)]
    pub name: Option<String>,
}

/// `POST /uploads?name=<file name>` with the raw body as content.
pub async fn upload(
    State(state): State<AppState>,
    Query(query): Query<UploadQuery>,
    body: Bytes,
) -> Response {
    let name = query.name.unwrap_or_default();
    match save_upload(&state.uploads_root, &name, &body) {
        Ok(path) => Json(json!({
            "ok": true,
            "name": path.file_name().and_then(|n| n.to_str()).unwrap_or_default(),
            "bytes": body.len(),
        }))
        .into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}
