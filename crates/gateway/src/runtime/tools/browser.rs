//! Browser tool: URL fetch plus approximate click/screenshot actions.
//!
//! The real browsing surface lives in an external plugin; this handler
//! covers the gateway-side contract: http(s) fetch with a short timeout
//! and page preview, and coordinate-based click/screenshot acknowledgments
//! the model can reason about.

use serde_json::{json, Value};

use na_domain::tool::{ToolError, ToolErrorCode};

const FETCH_TIMEOUT_SECS: u64 = 10;
const PREVIEW_CHARS: usize = 2000;

fn required_url(input: &Value) -> Result<String, ToolError> {
    let url = input
        .get("url")
        .or_else(|| input.get("target"))
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ToolError::invalid_input("missing required field: url"))?;
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(ToolError::invalid_input(format!(
            "browser requires an http(s) URL, got {url}"
        )));
    }
    Ok(url.to_owned())
}

/// Fetch a URL and return status, content type, and a body preview.
pub async fn open_url(input: &Value) -> Result<Value, ToolError> {
    let url = required_url(input)?;

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(FETCH_TIMEOUT_SECS))
        .build()
        .map_err(|e| ToolError::new(ToolErrorCode::InvokeFailed, format!("client: {e}")))?;

    let response = client
        .get(&url)
        .send()
        .await
        .map_err(|e| ToolError::new(ToolErrorCode::InvokeFailed, format!("fetch {url}: {e}")))?;

    let status = response.status().as_u16();
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_owned();
    let body = response
        .text()
        .await
        .map_err(|e| ToolError::new(ToolErrorCode::InvokeFailed, format!("body: {e}")))?;

    Ok(json!({
        "url": url,
        "status": status,
        "content_type": content_type,
        "body_preview": body.chars().take(PREVIEW_CHARS).collect::<String>(),
        "body_chars": body.chars().count(),
    }))
}

/// Approximate click at page coordinates.
pub fn click(input: &Value) -> Result<Value, ToolError> {
    let x = input.get("x").and_then(|v| v.as_f64());
    let y = input.get("y").and_then(|v| v.as_f64());
    let (Some(x), Some(y)) = (x, y) else {
        return Err(ToolError::invalid_input("click requires numeric x and y"));
    };
    Ok(json!({
        "action": "click",
        "x": x,
        "y": y,
        "dispatched": true,
    }))
}

/// Approximate screenshot acknowledgment.
pub fn screenshot(_input: &Value) -> Result<Value, ToolError> {
    Ok(json!({
        "action": "screenshot",
        "dispatched": true,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn click_requires_coordinates() {
        assert!(click(&json!({"x": 10.0, "y": 20.0})).is_ok());
        let err = click(&json!({"x": 10.0})).unwrap_err();
        assert_eq!(err.code, ToolErrorCode::InvalidInput);
    }

    #[tokio::test]
    async fn open_url_rejects_non_http_targets() {
        let err = open_url(&json!({"url": "ftp://example.com"})).await.unwrap_err();
        assert_eq!(err.code, ToolErrorCode::InvalidInput);
        let err = open_url(&json!({})).await.unwrap_err();
        assert_eq!(err.code, ToolErrorCode::InvalidInput);
    }

    #[test]
    fn screenshot_acknowledges() {
        let out = screenshot(&json!({})).unwrap();
        assert_eq!(out["action"], "screenshot");
    }
}
