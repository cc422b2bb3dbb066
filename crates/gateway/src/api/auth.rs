//! API-key middleware.
//!
//! The key comes from the env var named by `server.api_key_env` (default
//! `NEXTAI_API_KEY`), read once at startup and cached as a SHA-256
//! digest. Requests present it as `X-API-Key: <key>` or
//! `Authorization: Bearer <key>`. With no key configured the gateway
//! runs in dev mode and allows unauthenticated access.

use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::api::error::ApiError;
use crate::state::AppState;

pub async fn require_api_key(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let expected = match &state.api_key_hash {
        Some(h) => h,
        None => return next.run(req).await,
    };

    let provided = extract_key(&req).unwrap_or_default();
    let provided_hash = Sha256::digest(provided.as_bytes());

    if !bool::from(provided_hash.ct_eq(expected.as_slice())) {
        return ApiError::from_code("unauthorized", "invalid or missing API key").into_response();
    }

    next.run(req).await
}

fn extract_key(req: &Request<Body>) -> Option<&str> {
    if let Some(key) = req.headers().get("x-api-key").and_then(|v| v.to_str().ok()) {
        if !key.is_empty() {
            return Some(key);
        }
    }
    req.headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .filter(|k| !k.is_empty())
}
