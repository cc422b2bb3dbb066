//! The per-turn runtime snapshot.
//!
//! Built fresh for every turn from chat meta + biz params, consumed by the
//! prompt assembler and the tool dispatcher, and never persisted.

use crate::mode::{CollaborationEvent, CollaborationMode, PromptMode};
use crate::tool::ToolSpec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Mode block resolved for the current turn.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnMode {
    pub prompt_mode: PromptMode,
    pub collaboration_mode: CollaborationMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collaboration_event: Option<CollaborationEvent>,
    #[serde(default)]
    pub review_task: bool,
    #[serde(default)]
    pub compact_task: bool,
    #[serde(default)]
    pub memory_task: bool,
}

/// MCP availability for the current turn.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct McpStatus {
    pub enabled: bool,
    #[serde(default)]
    pub status: String,
}

/// Everything the assembler and dispatcher need to know about one turn.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnRuntimeSnapshot {
    pub mode: TurnMode,
    #[serde(default)]
    pub approval_policy: String,
    #[serde(default)]
    pub sandbox_policy: String,
    /// Ordered, duplicate-free tool names visible to the model this turn.
    pub available_tools: Vec<String>,
    #[serde(default)]
    pub mcp: McpStatus,
    /// Per-turn dynamic tool specs merged from biz params.
    #[serde(default)]
    pub dynamic_tools: Vec<ToolSpec>,
    pub session_id: String,
    #[serde(default)]
    pub model_slug: String,
    #[serde(default)]
    pub personality: String,
    /// Full specs for runtime-registered tools, keyed by name.
    #[serde(default)]
    pub runtime_tool_specs: BTreeMap<String, ToolSpec>,
}

impl TurnRuntimeSnapshot {
    /// Append a tool name preserving order and uniqueness.
    pub fn add_tool(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !self.available_tools.iter().any(|t| *t == name) {
            self.available_tools.push(name);
        }
    }

    /// Sorted, deduplicated app names extracted from `mcp__<app>__*`
    /// entries in the available tool list.
    pub fn mcp_app_names(&self) -> Vec<String> {
        let mut apps: Vec<String> = self
            .available_tools
            .iter()
            .filter_map(|t| {
                let rest = t.strip_prefix("mcp__")?;
                let (app, _) = rest.split_once("__")?;
                Some(app.to_string())
            })
            .collect();
        apps.sort();
        apps.dedup();
        apps
    }
}
