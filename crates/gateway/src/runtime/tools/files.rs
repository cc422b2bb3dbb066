//! Local file tools: view, edit, search, find.

use serde_json::{json, Value};
use std::path::Path;

use na_domain::tool::{ToolError, ToolErrorCode};

/// Default window height for `view` / `open` when no end line is given.
pub const DEFAULT_VIEW_WINDOW: u64 = 200;

const MAX_MATCHES: usize = 100;
const MAX_FILE_BYTES: u64 = 4 * 1024 * 1024;

fn required_str<'a>(input: &'a Value, key: &str) -> Result<&'a str, ToolError> {
    input
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ToolError::invalid_input(format!("missing required field: {key}")))
}

fn absolute_path<'a>(input: &'a Value) -> Result<&'a Path, ToolError> {
    let path = required_str(input, "path")?;
    let path = Path::new(path);
    if !path.is_absolute() {
        return Err(ToolError::invalid_input(format!(
            "path must be absolute: {}",
            path.display()
        )));
    }
    Ok(path)
}

fn io_error(path: &Path, err: std::io::Error) -> ToolError {
    let code = match err.kind() {
        std::io::ErrorKind::PermissionDenied => ToolErrorCode::PermissionDenied,
        _ => ToolErrorCode::InvokeFailed,
    };
    ToolError::new(code, format!("{}: {err}", path.display()))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// view
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Read a 1-based inclusive line window from an absolute path.
pub fn view(input: &Value) -> Result<Value, ToolError> {
    let path = absolute_path(input)?;
    let raw = std::fs::read_to_string(path).map_err(|e| io_error(path, e))?;

    let lines: Vec<&str> = raw.lines().collect();
    let total = lines.len() as u64;
    let start = input
        .get("start")
        .and_then(|v| v.as_u64())
        .unwrap_or(1)
        .max(1);
    let end = input
        .get("end")
        .and_then(|v| v.as_u64())
        .unwrap_or(start + DEFAULT_VIEW_WINDOW - 1)
        .min(total.max(start));
    if start > end && total > 0 {
        return Err(ToolError::invalid_input(format!(
            "start ({start}) is past end ({end})"
        )));
    }

    let window: Vec<String> = lines
        .iter()
        .enumerate()
        .skip(start.saturating_sub(1) as usize)
        .take((end.saturating_sub(start) + 1) as usize)
        .map(|(i, l)| format!("{:>6}\t{l}", i + 1))
        .collect();

    Ok(json!({
        "path": path.display().to_string(),
        "start": start,
        "end": end.min(total),
        "total_lines": total,
        "content": window.join("\n"),
    }))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// edit
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Write `content` to a file, or replace `old_string` with `new_string`.
/// Replacement requires the old string to occur exactly once.
pub fn edit(input: &Value) -> Result<Value, ToolError> {
    let path = absolute_path(input)?;

    if let Some(content) = input.get("content").and_then(|v| v.as_str()) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| io_error(path, e))?;
        }
        std::fs::write(path, content).map_err(|e| io_error(path, e))?;
        return Ok(json!({
            "path": path.display().to_string(),
            "bytes_written": content.len(),
        }));
    }

    let old = required_str(input, "old_string")?;
    let new = input
        .get("new_string")
        .and_then(|v| v.as_str())
        .unwrap_or_default();
    let raw = std::fs::read_to_string(path).map_err(|e| io_error(path, e))?;

    let occurrences = raw.matches(old).count();
    if occurrences == 0 {
        return Err(ToolError::invalid_input("old_string not found in file"));
    }
    if occurrences > 1 {
        return Err(ToolError::invalid_input(format!(
            "old_string occurs {occurrences} times; it must be unique"
        )));
    }

    let updated = raw.replacen(old, new, 1);
    std::fs::write(path, &updated).map_err(|e| io_error(path, e))?;
    Ok(json!({
        "path": path.display().to_string(),
        "replacements": 1,
    }))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// search / find
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn walk_root(input: &Value) -> Result<std::path::PathBuf, ToolError> {
    let root = input
        .get("path")
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|| std::path::PathBuf::from("."));
    if !root.exists() {
        return Err(ToolError::invalid_input(format!(
            "search root does not exist: {}",
            root.display()
        )));
    }
    Ok(root)
}

fn skippable(entry: &walkdir::DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|name| name.starts_with('.') || name == "target" || name == "node_modules")
        .unwrap_or(false)
}

/// Regex search over file contents under a directory.
pub fn search(input: &Value) -> Result<Value, ToolError> {
    let pattern = required_str(input, "pattern")?;
    let regex = regex::Regex::new(pattern)
        .map_err(|e| ToolError::invalid_input(format!("invalid pattern: {e}")))?;
    let root = walk_root(input)?;

    let mut matches = Vec::new();
    'outer: for entry in walkdir::WalkDir::new(&root)
        .into_iter()
        .filter_entry(|e| !skippable(e))
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        if entry.metadata().map(|m| m.len() > MAX_FILE_BYTES).unwrap_or(true) {
            continue;
        }
        let Ok(content) = std::fs::read_to_string(entry.path()) else {
            continue; // binary or unreadable
        };
        for (lineno, line) in content.lines().enumerate() {
            if regex.is_match(line) {
                matches.push(json!({
                    "path": entry.path().display().to_string(),
                    "line": lineno + 1,
                    "text": line.chars().take(400).collect::<String>(),
                }));
                if matches.len() >= MAX_MATCHES {
                    break 'outer;
                }
            }
        }
    }

    Ok(json!({
        "pattern": pattern,
        "root": root.display().to_string(),
        "matches": matches,
        "truncated": matches.len() >= MAX_MATCHES,
    }))
}

/// Find files by name substring under a directory. An empty pattern
/// lists everything (up to the cap).
pub fn find(input: &Value) -> Result<Value, ToolError> {
    let pattern = input
        .get("pattern")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let root = walk_root(input)?;

    let mut files = Vec::new();
    for entry in walkdir::WalkDir::new(&root)
        .into_iter()
        .filter_entry(|e| !skippable(e))
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let name = entry.file_name().to_string_lossy().to_ascii_lowercase();
        if pattern.is_empty() || name.contains(&pattern) {
            files.push(entry.path().display().to_string());
            if files.len() >= MAX_MATCHES {
                break;
            }
        }
    }

    Ok(json!({
        "pattern": pattern,
        "root": root.display().to_string(),
        "files": files,
        "truncated": files.len() >= MAX_MATCHES,
    }))
}
