//! The per-turn notice log.
//!
//! Records raw emission-order events for the assistant message's
//! `tool_call_notices` metadata. Text and tool events carry `text_order`
//! and `tool_order` counters; a pending `tool_call` notice is replaced in
//! place by its `tool_result` with the matching `(step, name)`.

use serde_json::{json, Value};

#[derive(Default)]
pub struct NoticeLog {
    notices: Vec<Value>,
    text_order: u32,
    tool_order: u32,
}

impl NoticeLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an assistant text segment.
    pub fn push_text(&mut self, step: u32, text: &str) {
        self.text_order += 1;
        self.notices.push(json!({
            "kind": "text",
            "step": step,
            "text": text,
            "text_order": self.text_order,
        }));
    }

    /// Record an outgoing tool call as a pending notice.
    pub fn push_tool_call(&mut self, step: u32, name: &str, id: &str, input: &Value) {
        self.tool_order += 1;
        self.notices.push(json!({
            "kind": "tool_call",
            "step": step,
            "name": name,
            "id": id,
            "input": input,
            "tool_order": self.tool_order,
            "text_order": self.text_order,
        }));
    }

    /// Replace the pending `tool_call` notice for `(step, name)` with its
    /// result, preserving position and order indices. Falls back to an
    /// appended notice when no pending entry matches.
    pub fn complete_tool_call(&mut self, step: u32, name: &str, result: &Value, ok: bool) {
        let pending = self.notices.iter().position(|n| {
            n["kind"] == "tool_call"
                && n["step"] == step
                && n["name"] == name
        });
        match pending {
            Some(i) => {
                let tool_order = self.notices[i]["tool_order"].clone();
                let text_order = self.notices[i]["text_order"].clone();
                let id = self.notices[i]["id"].clone();
                self.notices[i] = json!({
                    "kind": "tool_result",
                    "step": step,
                    "name": name,
                    "id": id,
                    "result": result,
                    "ok": ok,
                    "tool_order": tool_order,
                    "text_order": text_order,
                });
            }
            None => {
                self.tool_order += 1;
                self.notices.push(json!({
                    "kind": "tool_result",
                    "step": step,
                    "name": name,
                    "result": result,
                    "ok": ok,
                    "tool_order": self.tool_order,
                    "text_order": self.text_order,
                }));
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.notices.is_empty()
    }

    pub fn into_value(self) -> Value {
        Value::Array(self.notices)
    }

    /// Drain the log into a value, leaving it empty.
    pub fn take(&mut self) -> Value {
        Value::Array(std::mem::take(&mut self.notices))
    }
}
