//! Gateway self-introspection tool.

use serde_json::{json, Value};

use na_domain::tool::ToolError;

use crate::state::AppState;

/// Report gateway state: providers, chats, sub-agents, active model.
pub fn run(state: &AppState, input: &Value) -> Result<Value, ToolError> {
    let action = input
        .get("action")
        .and_then(|v| v.as_str())
        .unwrap_or("status");

    match action {
        "status" | "exit_plan_mode" => {
            let (chats, providers) = state
                .store
                .read(|s| (s.chats.len(), s.providers.len()));
            let active = state.store.active_llm();
            Ok(json!({
                "chats": chats,
                "providers": providers,
                "sub_agents": state.agents.len(),
                "pending_user_inputs": state.pending_inputs.len(),
                "active_llm": {
                    "provider_id": active.provider_id,
                    "model": active.model,
                },
            }))
        }
        "providers" => {
            let mut providers: Vec<Value> = state.store.read(|s| {
                s.providers
                    .iter()
                    .map(|(id, p)| {
                        json!({
                            "id": id,
                            "display_name": p.display_name,
                            "enabled": p.enabled,
                            "has_api_key": !p.api_key.is_empty(),
                        })
                    })
                    .collect()
            });
            providers.sort_by_key(|p| p["id"].as_str().unwrap_or_default().to_owned());
            Ok(json!({ "providers": providers }))
        }
        other => Err(ToolError::invalid_input(format!(
            "unknown self_ops action: {other}"
        ))),
    }
}
