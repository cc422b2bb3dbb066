//! Shell execution and the external apply_patch binary.

use serde_json::{json, Value};
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;

use na_domain::tool::{ToolError, ToolErrorCode};

use crate::runtime::cancel::CancelToken;

const DEFAULT_TIMEOUT_SECS: u64 = 60;
const MAX_OUTPUT_CHARS: usize = 16_000;

fn clip(s: &str) -> String {
    if s.chars().count() <= MAX_OUTPUT_CHARS {
        s.to_owned()
    } else {
        let mut out: String = s.chars().take(MAX_OUTPUT_CHARS).collect();
        out.push_str("...(truncated)");
        out
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// shell
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Run a command under `sh -c` with a hard timeout. A missing shell
/// executor surfaces as `tool_runtime_unavailable`.
pub async fn run(input: &Value, cancel: &CancelToken) -> Result<Value, ToolError> {
    let command = input
        .get("command")
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ToolError::invalid_input("missing required field: command"))?;
    let timeout_secs = input
        .get("timeout_seconds")
        .and_then(|v| v.as_u64())
        .unwrap_or(DEFAULT_TIMEOUT_SECS);

    let mut cmd = tokio::process::Command::new("sh");
    cmd.arg("-c")
        .arg(command)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(workdir) = input.get("workdir").and_then(|v| v.as_str()) {
        cmd.current_dir(workdir);
    }

    let child = cmd.spawn().map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ToolError::new(
            ToolErrorCode::RuntimeUnavailable,
            "shell executor is not available",
        )
        .with_cause(e.to_string()),
        _ => ToolError::new(ToolErrorCode::InvokeFailed, format!("spawn failed: {e}")),
    })?;

    let deadline = std::time::Duration::from_secs(timeout_secs);
    let output = tokio::select! {
        result = tokio::time::timeout(deadline, child.wait_with_output()) => match result {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(ToolError::new(
                    ToolErrorCode::InvokeFailed,
                    format!("command failed: {e}"),
                ));
            }
            Err(_) => {
                return Err(ToolError::new(
                    ToolErrorCode::Timeout,
                    format!("command exceeded {timeout_secs}s timeout"),
                ));
            }
        },
        _ = cancel.cancelled() => {
            return Err(ToolError::new(
                ToolErrorCode::InvokeFailed,
                "command cancelled",
            ));
        }
    };

    Ok(json!({
        "exit_code": output.status.code().unwrap_or(-1),
        "stdout": clip(&String::from_utf8_lossy(&output.stdout)),
        "stderr": clip(&String::from_utf8_lossy(&output.stderr)),
    }))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// apply_patch
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Locate the `apply_patch` binary: the `NEXTAI_APPLY_PATCH_BIN` override
/// wins, otherwise PATH is searched.
fn find_apply_patch() -> Option<PathBuf> {
    if let Some(explicit) = std::env::var_os("NEXTAI_APPLY_PATCH_BIN") {
        let explicit = PathBuf::from(explicit);
        return explicit.is_file().then_some(explicit);
    }
    let path_var = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path_var) {
        let candidate = dir.join("apply_patch");
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}

/// Pipe the patch body to the external `apply_patch` binary. A missing
/// binary is the `apply_patch_binary_missing` sentinel; a non-zero exit
/// maps stdout/stderr into the error detail.
pub async fn apply_patch(input: &Value) -> Result<Value, ToolError> {
    let patch = input
        .get("patch")
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ToolError::invalid_input("missing required field: patch"))?;

    let binary = find_apply_patch().ok_or_else(|| {
        ToolError::new(
            ToolErrorCode::RuntimeUnavailable,
            "apply_patch binary not found on PATH",
        )
        .with_cause("apply_patch_binary_missing")
    })?;

    let mut cmd = tokio::process::Command::new(&binary);
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(workdir) = input.get("workdir").and_then(|v| v.as_str()) {
        cmd.current_dir(workdir);
    }

    let mut child = cmd.spawn().map_err(|e| {
        ToolError::new(
            ToolErrorCode::RuntimeUnavailable,
            format!("apply_patch failed to start: {e}"),
        )
    })?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(patch.as_bytes())
            .await
            .map_err(|e| ToolError::new(ToolErrorCode::InvokeFailed, format!("stdin: {e}")))?;
    }

    let output = child
        .wait_with_output()
        .await
        .map_err(|e| ToolError::new(ToolErrorCode::InvokeFailed, format!("apply_patch: {e}")))?;

    let stdout = clip(&String::from_utf8_lossy(&output.stdout));
    let stderr = clip(&String::from_utf8_lossy(&output.stderr));

    if !output.status.success() {
        return Err(ToolError::new(
            ToolErrorCode::InvokeFailed,
            format!("apply_patch exited with {}", output.status.code().unwrap_or(-1)),
        )
        .with_cause(format!("stdout: {stdout}\nstderr: {stderr}")));
    }

    Ok(json!({
        "applied": true,
        "stdout": stdout,
        "stderr": stderr,
    }))
}
