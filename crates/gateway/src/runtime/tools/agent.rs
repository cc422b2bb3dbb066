//! Sub-agent tools: spawn_agent, send_input, resume_agent, wait,
//! close_agent. Thin adapters over the [`SubAgentManager`].

use serde_json::{json, Value};

use na_domain::tool::ToolError;

use crate::runtime::subagent::SpawnOrigin;
use crate::runtime::tools::ToolCtx;
use crate::state::AppState;

fn required_str<'a>(input: &'a Value, key: &str) -> Result<&'a str, ToolError> {
    input
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ToolError::invalid_input(format!("missing required field: {key}")))
}

pub fn spawn(state: &AppState, ctx: &ToolCtx, input: &Value) -> Result<Value, ToolError> {
    let task = required_str(input, "task")?;
    let origin = SpawnOrigin {
        session_id: ctx.session_id.clone(),
        user_id: ctx.user_id.clone(),
        channel: ctx.channel.clone(),
        prompt_mode: ctx.prompt_mode,
        collaboration_mode: ctx.collaboration_mode,
        depth: ctx.depth,
    };
    let agent_id = state
        .agents
        .spawn(state.clone(), &origin, task, Some(input))?;
    Ok(json!({ "agent_id": agent_id, "status": "running" }))
}

pub fn send_input(state: &AppState, input: &Value) -> Result<Value, ToolError> {
    let agent_id = required_str(input, "agent_id")?;
    let text = required_str(input, "input")?;
    let interrupt = input
        .get("interrupt")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    state.agents.send_input(agent_id, text, interrupt)?;
    let pending = state
        .agents
        .snapshot(agent_id)
        .map(|s| s.pending_inputs)
        .unwrap_or(0);
    Ok(json!({ "agent_id": agent_id, "queued": true, "pending_inputs": pending }))
}

pub fn resume(state: &AppState, input: &Value) -> Result<Value, ToolError> {
    let agent_id = required_str(input, "agent_id")?;
    let status = state.agents.resume(state.clone(), agent_id)?;
    Ok(json!({ "agent_id": agent_id, "status": status.as_str() }))
}

pub async fn wait(state: &AppState, input: &Value) -> Result<Value, ToolError> {
    let mut ids: Vec<String> = input
        .get("ids")
        .and_then(|v| v.as_array())
        .map(|a| {
            a.iter()
                .filter_map(|v| v.as_str())
                .map(|s| s.to_owned())
                .collect()
        })
        .unwrap_or_default();
    if let Some(single) = input.get("agent_id").and_then(|v| v.as_str()) {
        if !ids.iter().any(|i| i == single) {
            ids.push(single.to_owned());
        }
    }
    if ids.is_empty() {
        return Err(ToolError::invalid_input("wait requires ids or agent_id"));
    }

    let runtime = &state.config.runtime;
    let timeout_ms = input
        .get("timeout_ms")
        .and_then(|v| v.as_u64())
        .unwrap_or(runtime.wait_default_ms)
        .min(runtime.wait_max_ms);

    let result = state.agents.wait(&ids, timeout_ms).await;
    serde_json::to_value(&result)
        .map_err(|e| ToolError::new(na_domain::tool::ToolErrorCode::InvalidResult, e.to_string()))
}

pub fn close(state: &AppState, input: &Value) -> Result<Value, ToolError> {
    let agent_id = required_str(input, "agent_id")?;
    state.agents.close(agent_id)?;
    Ok(json!({ "agent_id": agent_id, "closed": true }))
}
