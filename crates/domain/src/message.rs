//! The runtime message model persisted in chat histories and sent to the
//! runner. Content is an ordered list of typed parts; today only `text`
//! parts are produced, but the shape leaves room for richer content.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

/// A single typed content part.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuntimeContent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: String,
}

impl RuntimeContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: "text".into(),
            text: text.into(),
        }
    }
}

/// One message in a chat history or turn input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeMessage {
    pub role: Role,
    #[serde(rename = "type", default = "default_message_type")]
    pub kind: String,
    pub content: Vec<RuntimeContent>,
    /// Free-form metadata. Assistant messages may carry
    /// `provider_response_id` and `tool_call_notices`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
}

fn default_message_type() -> String {
    "message".into()
}

impl RuntimeMessage {
    fn with_role(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            kind: default_message_type(),
            content: vec![RuntimeContent::text(text)],
            metadata: BTreeMap::new(),
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::with_role(Role::System, text)
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::with_role(Role::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, text)
    }

    /// A synthetic tool-result message appended to the in-memory turn
    /// history so the model can observe tool output on the next step.
    pub fn tool_result(call_id: impl Into<String>, text: impl Into<String>) -> Self {
        let mut msg = Self::with_role(Role::Tool, text);
        msg.metadata
            .insert("call_id".into(), Value::String(call_id.into()));
        msg
    }

    /// Join all text parts with `"\n"`. Non-text parts are skipped.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter(|c| c.kind == "text")
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}
