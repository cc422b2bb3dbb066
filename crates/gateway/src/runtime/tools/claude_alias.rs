//! Claude-compat tool aliases.
//!
//! Maps Anthropic-style tool names onto their native counterparts with
//! field remapping: `file_path` → `path`, `offset`+`limit` → a
//! `start`/`end` line window, and millisecond timeouts → whole seconds
//! (ceiling division).

use serde_json::{Map, Value};

/// Remap an alias to `(native_name, remapped_input)`. Non-alias names
/// pass through untouched.
pub fn remap(name: &str, input: Value) -> (String, Value) {
    let native = match name {
        "Bash" => "shell",
        "Read" | "NotebookRead" => "view",
        "Write" | "Edit" | "MultiEdit" | "NotebookEdit" => "edit",
        "LS" | "Glob" => "find",
        "Grep" | "WebSearch" => "search",
        "WebFetch" => "browser",
        "Task" => "spawn_agent",
        "TodoWrite" | "ExitPlanMode" => "update_plan",
        _ => return (name.to_owned(), input),
    };
    (native.to_owned(), remap_fields(name, input))
}

pub fn is_alias(name: &str) -> bool {
    matches!(
        name,
        "Bash"
            | "Read"
            | "Write"
            | "Edit"
            | "MultiEdit"
            | "LS"
            | "Glob"
            | "Grep"
            | "WebSearch"
            | "WebFetch"
            | "Task"
            | "TodoWrite"
            | "ExitPlanMode"
            | "NotebookRead"
            | "NotebookEdit"
    )
}

fn remap_fields(alias: &str, input: Value) -> Value {
    let mut map = match input {
        Value::Object(m) => m,
        other => return other,
    };

    rename(&mut map, "file_path", "path");
    rename(&mut map, "notebook_path", "path");

    match alias {
        "Bash" => {
            // timeout is milliseconds on the Claude side.
            if let Some(ms) = take_u64(&mut map, "timeout") {
                map.insert("timeout_seconds".into(), Value::from(ms.div_ceil(1000)));
            }
        }
        "Read" | "NotebookRead" => {
            // offset+limit → inclusive start/end line window.
            let offset = take_u64(&mut map, "offset");
            let limit = take_u64(&mut map, "limit");
            if offset.is_some() || limit.is_some() {
                let start = offset.unwrap_or(1).max(1);
                let limit = limit.unwrap_or(super::files::DEFAULT_VIEW_WINDOW);
                map.insert("start".into(), Value::from(start));
                map.insert("end".into(), Value::from(start + limit.saturating_sub(1)));
            }
        }
        "LS" => {
            map.entry("pattern").or_insert_with(|| Value::from(""));
        }
        "Grep" | "Glob" => {
            // Claude sends `pattern` already; nothing further to remap.
        }
        "WebSearch" => {
            rename(&mut map, "query", "pattern");
        }
        "WebFetch" => {
            // `url` passes through.
        }
        "Task" => {
            rename(&mut map, "prompt", "task");
            rename(&mut map, "description", "task_summary");
        }
        "TodoWrite" => {
            // todos[{content,status}] → plan[{step,status}].
            if let Some(Value::Array(todos)) = map.remove("todos") {
                let plan: Vec<Value> = todos
                    .into_iter()
                    .map(|todo| {
                        let step = todo
                            .get("content")
                            .and_then(|v| v.as_str())
                            .unwrap_or_default()
                            .to_owned();
                        let status = todo
                            .get("status")
                            .and_then(|v| v.as_str())
                            .unwrap_or("pending")
                            .to_owned();
                        serde_json::json!({ "step": step, "status": status })
                    })
                    .collect();
                map.insert("plan".into(), Value::Array(plan));
            }
        }
        "ExitPlanMode" => {
            map.entry("plan").or_insert_with(|| Value::Array(Vec::new()));
        }
        _ => {}
    }

    Value::Object(map)
}

fn rename(map: &mut Map<String, Value>, from: &str, to: &str) {
    if let Some(v) = map.remove(from) {
        map.entry(to).or_insert(v);
    }
}

fn take_u64(map: &mut Map<String, Value>, key: &str) -> Option<u64> {
    map.remove(key).and_then(|v| v.as_u64())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bash_timeout_ms_ceils_to_seconds() {
        let (native, input) = remap("Bash", json!({"command": "ls", "timeout": 1500}));
        assert_eq!(native, "shell");
        assert_eq!(input["timeout_seconds"], 2);
        assert!(input.get("timeout").is_none());
    }

    #[test]
    fn bash_exact_seconds_do_not_round_up() {
        let (_, input) = remap("Bash", json!({"command": "ls", "timeout": 2000}));
        assert_eq!(input["timeout_seconds"], 2);
    }

    #[test]
    fn read_offset_limit_becomes_window() {
        let (native, input) = remap(
            "Read",
            json!({"file_path": "/tmp/a.txt", "offset": 10, "limit": 5}),
        );
        assert_eq!(native, "view");
        assert_eq!(input["path"], "/tmp/a.txt");
        assert_eq!(input["start"], 10);
        assert_eq!(input["end"], 14);
    }

    #[test]
    fn read_without_window_passes_path_only() {
        let (_, input) = remap("Read", json!({"file_path": "/tmp/a.txt"}));
        assert_eq!(input["path"], "/tmp/a.txt");
        assert!(input.get("start").is_none());
    }

    #[test]
    fn write_is_edit_with_path() {
        let (native, input) = remap("Write", json!({"file_path": "/tmp/b", "content": "x"}));
        assert_eq!(native, "edit");
        assert_eq!(input["path"], "/tmp/b");
        assert_eq!(input["content"], "x");
    }

    #[test]
    fn todo_write_maps_to_plan() {
        let (native, input) = remap(
            "TodoWrite",
            json!({"todos": [
                {"content": "step one", "status": "in_progress"},
                {"content": "step two", "status": "pending"}
            ]}),
        );
        assert_eq!(native, "update_plan");
        assert_eq!(input["plan"][0]["step"], "step one");
        assert_eq!(input["plan"][0]["status"], "in_progress");
    }

    #[test]
    fn task_maps_to_spawn_agent() {
        let (native, input) = remap("Task", json!({"prompt": "audit the repo"}));
        assert_eq!(native, "spawn_agent");
        assert_eq!(input["task"], "audit the repo");
    }

    #[test]
    fn native_names_pass_through() {
        let (native, input) = remap("view", json!({"path": "/a"}));
        assert_eq!(native, "view");
        assert_eq!(input["path"], "/a");
    }
}
