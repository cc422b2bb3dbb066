//! The update_plan tool: persists the plan snapshot into chat meta.

use chrono::Utc;
use serde_json::{json, Value};

use na_domain::tool::{ToolError, ToolErrorCode};
use na_store::{meta, PlanItem, PlanStepStatus, UpdatePlanSnapshot};

use crate::runtime::tools::ToolCtx;
use crate::state::AppState;

fn parse_status(raw: &str) -> Result<PlanStepStatus, ToolError> {
    match raw {
        "pending" => Ok(PlanStepStatus::Pending),
        "in_progress" => Ok(PlanStepStatus::InProgress),
        "completed" => Ok(PlanStepStatus::Completed),
        other => Err(ToolError::invalid_input(format!(
            "unknown plan status: {other}"
        ))),
    }
}

/// Validate and persist the plan under `codex_update_plan`.
pub fn update_plan(state: &AppState, ctx: &ToolCtx, input: &Value) -> Result<Value, ToolError> {
    if ctx.chat_id.is_empty() {
        return Err(ToolError::new(
            ToolErrorCode::PermissionDenied,
            "update_plan requires an owning chat",
        ));
    }

    let raw_plan = input
        .get("plan")
        .and_then(|v| v.as_array())
        .ok_or_else(|| ToolError::invalid_input("missing required field: plan"))?;

    let mut plan = Vec::with_capacity(raw_plan.len());
    for item in raw_plan {
        let step = item
            .get("step")
            .and_then(|v| v.as_str())
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ToolError::invalid_input("plan items require a step"))?;
        let status = item
            .get("status")
            .and_then(|v| v.as_str())
            .unwrap_or("pending");
        plan.push(PlanItem {
            step: step.to_owned(),
            status: parse_status(status)?,
        });
    }

    let snapshot = UpdatePlanSnapshot {
        explanation: input
            .get("explanation")
            .and_then(|v| v.as_str())
            .map(|s| s.to_owned()),
        plan,
        updated_at: Utc::now(),
    };
    snapshot
        .validate()
        .map_err(ToolError::invalid_input)?;

    let value = serde_json::to_value(&snapshot)
        .map_err(|e| ToolError::new(ToolErrorCode::InvalidResult, e.to_string()))?;
    let persisted = value.clone();
    state
        .store
        .update_chat_meta(&ctx.chat_id, move |m| {
            m.insert(meta::UPDATE_PLAN.into(), persisted);
        })
        .map_err(|e| ToolError::new(ToolErrorCode::InvokeFailed, e.to_string()))?;

    Ok(json!({
        "ok": true,
        "steps": snapshot.plan.len(),
        "plan": value,
    }))
}
