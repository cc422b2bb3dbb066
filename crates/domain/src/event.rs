//! Events emitted by the turn orchestrator.
//!
//! The same enum backs the non-streaming `events` array, the native SSE
//! stream, and (after translation) the Claude-compatible event stream.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Sub-object describing an outgoing tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallInfo {
    pub name: String,
    pub input: Value,
    pub id: String,
}

/// Sub-object describing a finished tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResultInfo {
    pub name: String,
    pub result: Value,
    pub ok: bool,
}

/// One orchestrator event. `step` counts generate-or-tool rounds from 1.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    StepStarted {
        step: u32,
    },
    AssistantDelta {
        step: u32,
        delta: String,
    },
    ToolCall {
        step: u32,
        tool_call: ToolCallInfo,
    },
    ToolResult {
        step: u32,
        tool_result: ToolResultInfo,
    },
    Completed {
        step: u32,
        reply: String,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        meta: BTreeMap<String, Value>,
    },
    Error {
        step: u32,
        code: String,
        message: String,
    },
}

impl AgentEvent {
    pub fn step(&self) -> u32 {
        match self {
            AgentEvent::StepStarted { step }
            | AgentEvent::AssistantDelta { step, .. }
            | AgentEvent::ToolCall { step, .. }
            | AgentEvent::ToolResult { step, .. }
            | AgentEvent::Completed { step, .. }
            | AgentEvent::Error { step, .. } => *step,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tagged_serialization() {
        let ev = AgentEvent::ToolCall {
            step: 2,
            tool_call: ToolCallInfo {
                name: "view".into(),
                input: json!({"path": "/tmp/a"}),
                id: "c1".into(),
            },
        };
        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["type"], "tool_call");
        assert_eq!(v["step"], 2);
        assert_eq!(v["tool_call"]["name"], "view");
    }

    #[test]
    fn completed_omits_empty_meta() {
        let ev = AgentEvent::Completed {
            step: 1,
            reply: "done".into(),
            meta: BTreeMap::new(),
        };
        let v = serde_json::to_value(&ev).unwrap();
        assert!(v.get("meta").is_none());
    }

    #[test]
    fn roundtrip() {
        let ev = AgentEvent::Error {
            step: 3,
            code: "runner_error".into(),
            message: "step budget exceeded".into(),
        };
        let json = serde_json::to_string(&ev).unwrap();
        let back: AgentEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.step(), 3);
    }
}
