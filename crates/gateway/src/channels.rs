//! Outbound channels.
//!
//! The core consumes the [`Channel`] trait; real messenger plugins live
//! outside this repo. The console channel (log delivery) and the webhook
//! channel (HTTP POST) are built in; configured channel instances are
//! looked up in the state store by id.

use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

use na_domain::error::{Error, Result};
use na_store::ChannelConfig;

/// One outbound delivery target kind.
#[async_trait::async_trait]
pub trait Channel: Send + Sync {
    async fn send_text(
        &self,
        user_id: &str,
        session_id: &str,
        text: &str,
        cfg: &ChannelConfig,
    ) -> Result<()>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Built-in channel kinds
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Logs the outbound message; the delivery surface for local runs.
pub struct ConsoleChannel;

#[async_trait::async_trait]
impl Channel for ConsoleChannel {
    async fn send_text(
        &self,
        user_id: &str,
        session_id: &str,
        text: &str,
        _cfg: &ChannelConfig,
    ) -> Result<()> {
        tracing::info!(
            user_id = %user_id,
            session_id = %session_id,
            chars = text.chars().count(),
            "console delivery"
        );
        Ok(())
    }
}

/// POSTs `{user_id, session_id, text}` to the configured `url`.
pub struct WebhookChannel {
    client: reqwest::Client,
}

impl WebhookChannel {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for WebhookChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Channel for WebhookChannel {
    async fn send_text(
        &self,
        user_id: &str,
        session_id: &str,
        text: &str,
        cfg: &ChannelConfig,
    ) -> Result<()> {
        let url = cfg
            .settings
            .get("url")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::ChannelDispatch {
                channel: cfg.id.clone(),
                message: "webhook channel requires settings.url".into(),
            })?;

        let payload = json!({
            "user_id": user_id,
            "session_id": session_id,
            "text": text,
        });
        let response = self
            .client
            .post(url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| Error::ChannelDispatch {
                channel: cfg.id.clone(),
                message: e.to_string(),
            })?;
        if !response.status().is_success() {
            return Err(Error::ChannelDispatch {
                channel: cfg.id.clone(),
                message: format!("webhook returned {}", response.status()),
            });
        }
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ChannelSet
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Registry of channel kinds. Dispatch resolves a stored
/// [`ChannelConfig`] by id and routes to the kind's implementation.
pub struct ChannelSet {
    kinds: HashMap<String, Arc<dyn Channel>>,
}

impl Default for ChannelSet {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelSet {
    pub fn new() -> Self {
        let mut kinds: HashMap<String, Arc<dyn Channel>> = HashMap::new();
        kinds.insert("console".into(), Arc::new(ConsoleChannel));
        kinds.insert("webhook".into(), Arc::new(WebhookChannel::new()));
        Self { kinds }
    }

    pub fn register(&mut self, kind: &str, channel: Arc<dyn Channel>) {
        self.kinds.insert(kind.to_owned(), channel);
    }

    /// Dispatch a text through a configured channel. Unknown kinds fail
    /// with `channel_dispatch_failed`.
    pub async fn dispatch(
        &self,
        cfg: &ChannelConfig,
        user_id: &str,
        session_id: &str,
        text: &str,
    ) -> Result<()> {
        let channel = self.kinds.get(&cfg.kind).ok_or_else(|| Error::ChannelDispatch {
            channel: cfg.id.clone(),
            message: format!("no plugin for channel kind {}", cfg.kind),
        })?;
        channel.send_text(user_id, session_id, text, cfg).await
    }

    /// Dispatch by stored channel id, looking the config up in the store.
    pub async fn dispatch_by_id(
        &self,
        store: &na_store::StateStore,
        channel_id: &str,
        user_id: &str,
        session_id: &str,
        text: &str,
    ) -> Result<()> {
        let cfg = store
            .read(|s| s.channels.get(channel_id).cloned())
            .unwrap_or_else(|| ChannelConfig {
                id: channel_id.to_owned(),
                kind: "console".into(),
                settings: Value::Null,
            });
        self.dispatch(&cfg, user_id, session_id, text).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn console_cfg() -> ChannelConfig {
        ChannelConfig {
            id: "console".into(),
            kind: "console".into(),
            settings: Value::Null,
        }
    }

    #[tokio::test]
    async fn console_dispatch_succeeds() {
        let set = ChannelSet::new();
        set.dispatch(&console_cfg(), "u1", "s1", "hello").await.unwrap();
    }

    #[tokio::test]
    async fn unknown_kind_fails_dispatch() {
        let set = ChannelSet::new();
        let cfg = ChannelConfig {
            id: "qq-main".into(),
            kind: "qq".into(),
            settings: Value::Null,
        };
        let err = set.dispatch(&cfg, "u1", "s1", "hello").await.unwrap_err();
        assert_eq!(err.code(), "channel_dispatch_failed");
    }

    #[tokio::test]
    async fn webhook_requires_url() {
        let set = ChannelSet::new();
        let cfg = ChannelConfig {
            id: "hook".into(),
            kind: "webhook".into(),
            settings: json!({}),
        };
        let err = set.dispatch(&cfg, "u1", "s1", "hello").await.unwrap_err();
        assert_eq!(err.code(), "channel_dispatch_failed");
    }
}
