//! Tool registry and dispatcher.
//!
//! The catalog maps normalized tool names to handlers with capability
//! tags. Routing consults capabilities rather than name coincidence:
//! `open` lands on `view` (needs `open_local`) or `browser` (needs
//! `open_url`), and `click`/`screenshot` require the approximate-input
//! capabilities on `browser`. Claude-compat aliases are remapped to their
//! native counterparts before routing.

pub mod agent;
pub mod browser;
pub mod claude_alias;
pub mod files;
pub mod input;
pub mod plan;
pub mod self_ops;
pub mod shell;

use serde_json::{json, Value};

use na_domain::mode::{CollaborationMode, PromptMode};
use na_domain::snapshot::TurnRuntimeSnapshot;
use na_domain::tool::{normalize_tool_input, ToolError, ToolErrorCode, ToolSpec};

use crate::runtime::cancel::CancelToken;
use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ToolCtx — per-turn identity threaded into handlers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Clone)]
pub struct ToolCtx {
    pub chat_id: String,
    pub session_id: String,
    pub user_id: String,
    pub channel: String,
    pub prompt_mode: PromptMode,
    pub collaboration_mode: CollaborationMode,
    pub depth: u32,
    pub cancel: CancelToken,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Catalog
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct ToolEntry {
    pub name: &'static str,
    pub capabilities: &'static [&'static str],
    pub description: &'static str,
}

/// The static tool catalog, in presentation order.
pub const CATALOG: &[ToolEntry] = &[
    ToolEntry {
        name: "view",
        capabilities: &["open_local"],
        description: "Read a window of lines from an absolute local file path.",
    },
    ToolEntry {
        name: "edit",
        capabilities: &[],
        description: "Write a file, or replace an exact string within it.",
    },
    ToolEntry {
        name: "shell",
        capabilities: &[],
        description: "Run a shell command and return exit code, stdout, and stderr.",
    },
    ToolEntry {
        name: "browser",
        capabilities: &["open_url", "approx_click", "approx_screenshot"],
        description: "Fetch an http(s) URL and return a page preview.",
    },
    ToolEntry {
        name: "search",
        capabilities: &[],
        description: "Search file contents under a directory with a regex.",
    },
    ToolEntry {
        name: "find",
        capabilities: &[],
        description: "Find files by name substring under a directory.",
    },
    ToolEntry {
        name: "open",
        capabilities: &[],
        description: "Open a target: http(s) URLs route to browser, absolute paths to view.",
    },
    ToolEntry {
        name: "click",
        capabilities: &[],
        description: "Approximate click at page coordinates (routed to browser).",
    },
    ToolEntry {
        name: "screenshot",
        capabilities: &[],
        description: "Approximate page screenshot (routed to browser).",
    },
    ToolEntry {
        name: "self_ops",
        capabilities: &[],
        description: "Gateway introspection: providers, chats, agents.",
    },
    ToolEntry {
        name: "apply_patch",
        capabilities: &[],
        description: "Apply a patch via the external apply_patch binary.",
    },
    ToolEntry {
        name: "request_user_input",
        capabilities: &[],
        description: "Ask the user 1-3 structured questions (plan mode only).",
    },
    ToolEntry {
        name: "update_plan",
        capabilities: &[],
        description: "Persist the current plan snapshot into chat meta.",
    },
    ToolEntry {
        name: "spawn_agent",
        capabilities: &[],
        description: "Spawn a sub-agent running a task in the background.",
    },
    ToolEntry {
        name: "send_input",
        capabilities: &[],
        description: "Queue input for a sub-agent, optionally interrupting its turn.",
    },
    ToolEntry {
        name: "resume_agent",
        capabilities: &[],
        description: "Reopen a closed sub-agent and drain its queue.",
    },
    ToolEntry {
        name: "wait",
        capabilities: &[],
        description: "Wait for sub-agents to finish, with a deadline.",
    },
    ToolEntry {
        name: "close_agent",
        capabilities: &[],
        description: "Cancel and close a sub-agent.",
    },
];

pub fn entry(name: &str) -> Option<&'static ToolEntry> {
    CATALOG.iter().find(|e| e.name == name)
}

pub fn has_capability(name: &str, capability: &str) -> bool {
    entry(name).is_some_and(|e| e.capabilities.contains(&capability))
}

fn require_capability(name: &str, capability: &str) -> Result<(), ToolError> {
    if has_capability(name, capability) {
        Ok(())
    } else {
        Err(ToolError::not_supported(name)
            .with_cause(format!("missing capability {capability}")))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tool specs for the runner
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// JSON-schema parameter shapes for the built-in tools.
fn parameters_for(name: &str) -> Value {
    match name {
        "view" => json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Absolute file path" },
                "start": { "type": "integer", "description": "First line (1-based)" },
                "end": { "type": "integer", "description": "Last line (inclusive)" }
            },
            "required": ["path"]
        }),
        "edit" => json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Absolute file path" },
                "content": { "type": "string", "description": "Full file content to write" },
                "old_string": { "type": "string", "description": "Exact text to replace" },
                "new_string": { "type": "string", "description": "Replacement text" }
            },
            "required": ["path"]
        }),
        "shell" => json!({
            "type": "object",
            "properties": {
                "command": { "type": "string", "description": "Shell command to execute" },
                "workdir": { "type": "string", "description": "Working directory" },
                "timeout_seconds": { "type": "integer", "description": "Hard timeout in seconds" }
            },
            "required": ["command"]
        }),
        "browser" | "open" => json!({
            "type": "object",
            "properties": {
                "target": { "type": "string", "description": "URL or absolute path" },
                "url": { "type": "string", "description": "URL to open" },
                "path": { "type": "string", "description": "Absolute local path" },
                "start": { "type": "integer" },
                "end": { "type": "integer" }
            }
        }),
        "search" => json!({
            "type": "object",
            "properties": {
                "pattern": { "type": "string", "description": "Regex pattern" },
                "path": { "type": "string", "description": "Directory to search (default cwd)" }
            },
            "required": ["pattern"]
        }),
        "find" => json!({
            "type": "object",
            "properties": {
                "pattern": { "type": "string", "description": "Filename substring" },
                "path": { "type": "string", "description": "Directory to search (default cwd)" }
            },
            "required": ["pattern"]
        }),
        "click" => json!({
            "type": "object",
            "properties": {
                "x": { "type": "number" },
                "y": { "type": "number" }
            },
            "required": ["x", "y"]
        }),
        "screenshot" | "self_ops" => json!({
            "type": "object",
            "properties": {
                "action": { "type": "string" }
            }
        }),
        "apply_patch" => json!({
            "type": "object",
            "properties": {
                "patch": { "type": "string", "description": "Patch body" },
                "workdir": { "type": "string" }
            },
            "required": ["patch"]
        }),
        "request_user_input" => json!({
            "type": "object",
            "properties": {
                "questions": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "id": { "type": "string" },
                            "header": { "type": "string" },
                            "question": { "type": "string" },
                            "options": {
                                "type": "array",
                                "items": {
                                    "type": "object",
                                    "properties": {
                                        "label": { "type": "string" },
                                        "description": { "type": "string" }
                                    },
                                    "required": ["label", "description"]
                                }
                            }
                        },
                        "required": ["id", "header", "question"]
                    }
                }
            },
            "required": ["questions"]
        }),
        "update_plan" => json!({
            "type": "object",
            "properties": {
                "explanation": { "type": "string" },
                "plan": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "step": { "type": "string" },
                            "status": { "type": "string", "enum": ["pending", "in_progress", "completed"] }
                        },
                        "required": ["step", "status"]
                    }
                }
            },
            "required": ["plan"]
        }),
        "spawn_agent" => json!({
            "type": "object",
            "properties": {
                "task": { "type": "string", "description": "Task for the sub-agent" },
                "session_id": { "type": "string" },
                "user_id": { "type": "string" },
                "channel": { "type": "string" }
            },
            "required": ["task"]
        }),
        "send_input" => json!({
            "type": "object",
            "properties": {
                "agent_id": { "type": "string" },
                "input": { "type": "string" },
                "interrupt": { "type": "boolean" }
            },
            "required": ["agent_id", "input"]
        }),
        "resume_agent" | "close_agent" => json!({
            "type": "object",
            "properties": {
                "agent_id": { "type": "string" }
            },
            "required": ["agent_id"]
        }),
        "wait" => json!({
            "type": "object",
            "properties": {
                "ids": { "type": "array", "items": { "type": "string" } },
                "agent_id": { "type": "string" },
                "timeout_ms": { "type": "integer" }
            }
        }),
        _ => json!({ "type": "object", "properties": {}, "additionalProperties": true }),
    }
}

/// Build the tool specs handed to the runner for one turn.
pub fn specs_for(snapshot: &TurnRuntimeSnapshot) -> Vec<ToolSpec> {
    snapshot
        .available_tools
        .iter()
        .map(|name| {
            if let Some(spec) = snapshot.runtime_tool_specs.get(name) {
                return spec.clone();
            }
            let description = entry(name)
                .map(|e| e.description.to_owned())
                .unwrap_or_else(|| format!("Runtime tool {name}"));
            ToolSpec {
                name: name.clone(),
                description,
                parameters: parameters_for(name),
            }
        })
        .collect()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Dispatch
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Route one normalized tool call to its handler.
pub async fn dispatch(
    state: &AppState,
    ctx: &ToolCtx,
    name: &str,
    raw_args: &Value,
) -> Result<Value, ToolError> {
    let payload = normalize_tool_input(raw_args);
    let (native, input) = claude_alias::remap(name.trim(), payload);

    if state.disabled_tools.contains(name.trim()) || state.disabled_tools.contains(native.as_str())
    {
        return Err(ToolError::disabled(&native));
    }

    if entry(&native).is_none() {
        return Err(ToolError::not_supported(&native));
    }

    if !ctx.collaboration_mode.allows_tool(&native) {
        return Err(ToolError::new(
            ToolErrorCode::PermissionDenied,
            format!(
                "{native} requires plan mode (current: {})",
                ctx.collaboration_mode.as_str()
            ),
        ));
    }

    match native.as_str() {
        "view" => files::view(&input),
        "edit" => files::edit(&input),
        "search" => files::search(&input),
        "find" => files::find(&input),
        "open" => dispatch_open(&input).await,
        "shell" => shell::run(&input, &ctx.cancel).await,
        "apply_patch" => shell::apply_patch(&input).await,
        "browser" => {
            require_capability("browser", "open_url")?;
            browser::open_url(&input).await
        }
        "click" => {
            require_capability("browser", "approx_click")?;
            browser::click(&input)
        }
        "screenshot" => {
            require_capability("browser", "approx_screenshot")?;
            browser::screenshot(&input)
        }
        "self_ops" => self_ops::run(state, &input),
        "update_plan" => plan::update_plan(state, ctx, &input),
        "request_user_input" => input::request_user_input(state, ctx, &input).await,
        "spawn_agent" => agent::spawn(state, ctx, &input),
        "send_input" => agent::send_input(state, &input),
        "resume_agent" => agent::resume(state, &input),
        "wait" => agent::wait(state, &input).await,
        "close_agent" => agent::close(state, &input),
        other => Err(ToolError::not_supported(other)),
    }
}

/// The `open` router: http(s) targets go to the browser, anything else
/// must be an absolute local path and lands on `view` with the default
/// 200-line window.
async fn dispatch_open(input: &Value) -> Result<Value, ToolError> {
    let target = input
        .get("target")
        .or_else(|| input.get("url"))
        .or_else(|| input.get("path"))
        .and_then(|v| v.as_str())
        .ok_or_else(|| ToolError::invalid_input("open requires a target"))?;

    if target.starts_with("http://") || target.starts_with("https://") {
        require_capability("browser", "open_url")?;
        return browser::open_url(&json!({ "url": target })).await;
    }

    if !target.starts_with('/') {
        return Err(ToolError::invalid_input(format!(
            "open requires an absolute local path or http(s) URL, got {target}"
        )));
    }

    require_capability("view", "open_local")?;
    let start = input.get("start").and_then(|v| v.as_u64()).unwrap_or(1);
    let end = input
        .get("end")
        .and_then(|v| v.as_u64())
        .unwrap_or(start + files::DEFAULT_VIEW_WINDOW - 1);
    files::view(&json!({ "path": target, "start": start, "end": end }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_names_are_unique() {
        let mut names: Vec<_> = CATALOG.iter().map(|e| e.name).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), CATALOG.len());
    }

    #[test]
    fn capability_lookup() {
        assert!(has_capability("view", "open_local"));
        assert!(has_capability("browser", "open_url"));
        assert!(has_capability("browser", "approx_click"));
        assert!(!has_capability("view", "open_url"));
        assert!(!has_capability("shell", "open_local"));
    }

    #[test]
    fn specs_cover_available_tools_and_runtime_specs() {
        let mut snap = TurnRuntimeSnapshot::default();
        snap.add_tool("view");
        snap.add_tool("custom");
        snap.runtime_tool_specs.insert(
            "custom".into(),
            ToolSpec {
                name: "custom".into(),
                description: "dynamic".into(),
                parameters: json!({"type": "object"}),
            },
        );
        let specs = specs_for(&snap);
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].name, "view");
        assert_eq!(specs[1].description, "dynamic");
    }
}
