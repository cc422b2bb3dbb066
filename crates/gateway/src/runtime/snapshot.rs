//! Per-turn snapshot construction.
//!
//! Merges the static tool catalog (filtered by the disable list, the
//! collaboration capability gate, and the nesting bound) with MCP and
//! dynamic tools from chat meta and biz params.

use serde_json::Value;

use na_domain::mode::{CollaborationEvent, CollaborationMode, PromptMode};
use na_domain::snapshot::{McpStatus, TurnMode, TurnRuntimeSnapshot};
use na_domain::tool::ToolSpec;
use na_store::{ChatSpec, ModelSlotConfig};

use crate::runtime::subagent::MAX_DEPTH;
use crate::runtime::tools;
use crate::state::AppState;

const SUB_AGENT_TOOLS: &[&str] = &[
    "spawn_agent",
    "send_input",
    "resume_agent",
    "wait",
    "close_agent",
];

pub struct SnapshotInput<'a> {
    pub chat: &'a ChatSpec,
    pub biz_params: Option<&'a Value>,
    pub prompt_mode: PromptMode,
    pub collaboration_mode: CollaborationMode,
    pub collaboration_event: Option<CollaborationEvent>,
    pub model_slot: &'a ModelSlotConfig,
    pub depth: u32,
}

/// Build the ephemeral snapshot for one turn.
pub fn build(state: &AppState, input: SnapshotInput<'_>) -> TurnRuntimeSnapshot {
    let biz = input.biz_params;

    let (review_task, compact_task, memory_task) = task_flags(biz);

    let mut snap = TurnRuntimeSnapshot {
        mode: TurnMode {
            prompt_mode: input.prompt_mode,
            collaboration_mode: input.collaboration_mode,
            collaboration_event: input.collaboration_event,
            review_task,
            compact_task,
            memory_task,
        },
        approval_policy: biz_str(biz, "approval_policy"),
        sandbox_policy: biz_str(biz, "sandbox_policy"),
        session_id: input.chat.session_id.clone(),
        model_slug: input.model_slot.model.clone(),
        personality: biz_str(biz, "personality"),
        ..Default::default()
    };

    // Static catalog, filtered.
    for entry in tools::CATALOG {
        if state.disabled_tools.contains(entry.name) {
            continue;
        }
        if !input.collaboration_mode.allows_tool(entry.name) {
            continue;
        }
        if input.depth >= MAX_DEPTH && SUB_AGENT_TOOLS.contains(&entry.name) {
            continue;
        }
        snap.add_tool(entry.name);
    }

    // MCP tools from session meta, then per-turn biz params.
    for name in string_list(input.chat.meta.get("mcp_tools")) {
        snap.add_tool(name);
    }
    for name in string_list(biz.and_then(|b| b.get("mcp_tools"))) {
        snap.add_tool(name);
    }

    // Dynamic tool specs from biz params.
    if let Some(dynamic) = biz.and_then(|b| b.get("dynamic_tools")).and_then(|v| v.as_array()) {
        for raw in dynamic {
            if let Ok(spec) = serde_json::from_value::<ToolSpec>(raw.clone()) {
                if spec.name.trim().is_empty() {
                    continue;
                }
                snap.add_tool(spec.name.clone());
                snap.dynamic_tools.push(spec.clone());
                snap.runtime_tool_specs.insert(spec.name.clone(), spec);
            }
        }
    }

    let apps = snap.mcp_app_names();
    snap.mcp = McpStatus {
        enabled: !apps.is_empty(),
        status: if apps.is_empty() {
            "none".into()
        } else {
            "connected".into()
        },
    };

    snap
}

fn task_flags(biz: Option<&Value>) -> (bool, bool, bool) {
    let command = biz
        .and_then(|b| b.get("task_command"))
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    (
        command == "review",
        command == "compact",
        command == "memory",
    )
}

fn biz_str(biz: Option<&Value>, key: &str) -> String {
    biz.and_then(|b| b.get(key))
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_owned()
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(|v| v.as_array())
        .map(|a| {
            a.iter()
                .filter_map(|v| v.as_str())
                .filter(|s| !s.trim().is_empty())
                .map(|s| s.to_owned())
                .collect()
        })
        .unwrap_or_default()
}
