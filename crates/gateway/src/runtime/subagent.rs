//! Sub-agent manager.
//!
//! A keyed registry of nestable agents. Each agent owns a FIFO queue of
//! pending inputs drained only by its own runner task, a per-turn cancel
//! token, and a notify handle that wakes `wait` callers on every status
//! change. Nesting is bounded: a sub-agent cannot spawn its own children.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Notify;

use na_domain::message::RuntimeMessage;
use na_domain::mode::{CollaborationMode, PromptMode};
use na_domain::tool::{ToolError, ToolErrorCode};

use crate::runtime::cancel::CancelToken;
use crate::runtime::turn::{run_turn, TurnInput};
use crate::state::AppState;

pub const MAX_DEPTH: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubAgentStatus {
    Idle,
    Running,
    Failed,
    Closed,
}

impl SubAgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubAgentStatus::Idle => "idle",
            SubAgentStatus::Running => "running",
            SubAgentStatus::Failed => "failed",
            SubAgentStatus::Closed => "closed",
        }
    }

    /// Any non-running status is final for `wait` purposes.
    pub fn is_final(&self) -> bool {
        !matches!(self, SubAgentStatus::Running)
    }
}

/// Public snapshot of one agent, returned by `wait` and introspection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubAgentSnapshot {
    pub agent_id: String,
    pub session_id: String,
    pub user_id: String,
    pub channel: String,
    pub prompt_mode: PromptMode,
    pub collaboration_mode: CollaborationMode,
    pub depth: u32,
    pub status: SubAgentStatus,
    pub pending_inputs: usize,
    pub current_input: Option<String>,
    pub last_reply: Option<String>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_completed_at: Option<DateTime<Utc>>,
}

struct AgentEntry {
    snapshot: SubAgentSnapshot,
    pending: VecDeque<String>,
    notify: Arc<Notify>,
    /// Cancel handle for the currently running turn, if any.
    cancel: Option<CancelToken>,
}

impl AgentEntry {
    fn touch(&mut self) {
        self.snapshot.updated_at = Utc::now();
        self.snapshot.pending_inputs = self.pending.len();
    }
}

/// Identity a spawned agent inherits unless overridden.
#[derive(Debug, Clone)]
pub struct SpawnOrigin {
    pub session_id: String,
    pub user_id: String,
    pub channel: String,
    pub prompt_mode: PromptMode,
    pub collaboration_mode: CollaborationMode,
    pub depth: u32,
}

/// Result of a `wait` call.
#[derive(Debug, Clone, Serialize)]
pub struct WaitResult {
    pub status: BTreeMap<String, String>,
    pub agents: BTreeMap<String, Value>,
    pub timed_out: bool,
}

#[derive(Default)]
pub struct SubAgentManager {
    agents: Mutex<HashMap<String, AgentEntry>>,
}

impl SubAgentManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a new agent running `task`. Depth is bounded; the new agent
    /// inherits the parent's identity unless `overrides` supplies
    /// `session_id` / `user_id` / `channel`.
    pub fn spawn(
        &self,
        state: AppState,
        origin: &SpawnOrigin,
        task: &str,
        overrides: Option<&Value>,
    ) -> Result<String, ToolError> {
        if origin.depth >= MAX_DEPTH {
            return Err(ToolError::invalid_input(format!(
                "sub-agent nesting is bounded at depth {MAX_DEPTH}"
            )));
        }
        if task.trim().is_empty() {
            return Err(ToolError::invalid_input("task must not be empty"));
        }

        let pick = |key: &str, fallback: &str| -> String {
            overrides
                .and_then(|o| o.get(key))
                .and_then(|v| v.as_str())
                .filter(|s| !s.trim().is_empty())
                .map(|s| s.to_owned())
                .unwrap_or_else(|| fallback.to_owned())
        };

        let agent_id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        let snapshot = SubAgentSnapshot {
            agent_id: agent_id.clone(),
            session_id: pick("session_id", &origin.session_id),
            user_id: pick("user_id", &origin.user_id),
            channel: pick("channel", &origin.channel),
            prompt_mode: origin.prompt_mode,
            collaboration_mode: origin.collaboration_mode,
            depth: origin.depth + 1,
            status: SubAgentStatus::Running,
            pending_inputs: 0,
            current_input: Some(task.to_owned()),
            last_reply: None,
            last_error: None,
            created_at: now,
            updated_at: now,
            last_completed_at: None,
        };

        self.agents.lock().insert(
            agent_id.clone(),
            AgentEntry {
                snapshot,
                pending: VecDeque::new(),
                notify: Arc::new(Notify::new()),
                cancel: None,
            },
        );

        tracing::info!(agent_id = %agent_id, "sub-agent spawned");
        tokio::spawn(drive_agent(state, agent_id.clone()));
        Ok(agent_id)
    }

    /// Queue input for an agent. `interrupt` cancels the running turn so
    /// the queued input is picked up sooner. Closed agents reject input.
    pub fn send_input(&self, agent_id: &str, input: &str, interrupt: bool) -> Result<(), ToolError> {
        let mut agents = self.agents.lock();
        let entry = agents
            .get_mut(agent_id)
            .ok_or_else(|| ToolError::invalid_input(format!("agent {agent_id} not found")))?;
        if entry.snapshot.status == SubAgentStatus::Closed {
            return Err(ToolError::new(
                ToolErrorCode::Conflict,
                format!("agent {agent_id} is closed"),
            ));
        }
        entry.pending.push_back(input.to_owned());
        if interrupt && entry.snapshot.status == SubAgentStatus::Running {
            if let Some(cancel) = &entry.cancel {
                cancel.cancel();
            }
        }
        entry.touch();
        Ok(())
    }

    /// Reopen a closed agent and drain any queued input.
    pub fn resume(&self, state: AppState, agent_id: &str) -> Result<SubAgentStatus, ToolError> {
        let start_turn = {
            let mut agents = self.agents.lock();
            let entry = agents
                .get_mut(agent_id)
                .ok_or_else(|| ToolError::invalid_input(format!("agent {agent_id} not found")))?;
            if entry.snapshot.status == SubAgentStatus::Running {
                return Ok(SubAgentStatus::Running);
            }
            if entry.snapshot.status == SubAgentStatus::Closed {
                entry.snapshot.status = SubAgentStatus::Idle;
            }
            match entry.pending.pop_front() {
                Some(next) => {
                    entry.snapshot.current_input = Some(next);
                    entry.snapshot.status = SubAgentStatus::Running;
                    entry.touch();
                    entry.notify.notify_waiters();
                    true
                }
                None => {
                    entry.snapshot.current_input = None;
                    entry.touch();
                    entry.notify.notify_waiters();
                    false
                }
            }
        };

        if start_turn {
            tokio::spawn(drive_agent(state, agent_id.to_owned()));
            Ok(SubAgentStatus::Running)
        } else {
            Ok(SubAgentStatus::Idle)
        }
    }

    /// Wait for the named agents to leave `running`. Unknown ids count as
    /// final with status `not_found`. Returns `timed_out=true` with the
    /// latest snapshots when the deadline passes first.
    pub async fn wait(&self, ids: &[String], timeout_ms: u64) -> WaitResult {
        let deadline = tokio::time::Instant::now() + std::time::Duration::from_millis(timeout_ms);

        loop {
            let (all_final, result, notifies) = self.collect_wait_state(ids);
            if all_final {
                return result;
            }

            let sleepers: Vec<_> = notifies
                .into_iter()
                .map(|n| {
                    Box::pin(async move {
                        n.notified().await;
                    })
                })
                .collect();

            // A status change can land between the snapshot above and the
            // select below; the short re-poll tick bounds that window.
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {
                    let (all_final, mut result, _) = self.collect_wait_state(ids);
                    result.timed_out = !all_final;
                    return result;
                }
                _ = futures_util::future::select_all(sleepers) => {}
                _ = tokio::time::sleep(std::time::Duration::from_millis(100)) => {}
            }
        }
    }

    fn collect_wait_state(&self, ids: &[String]) -> (bool, WaitResult, Vec<Arc<Notify>>) {
        let agents = self.agents.lock();
        let mut status = BTreeMap::new();
        let mut snapshots = BTreeMap::new();
        let mut notifies = Vec::new();
        let mut all_final = true;

        for id in ids {
            match agents.get(id) {
                Some(entry) => {
                    status.insert(id.clone(), entry.snapshot.status.as_str().to_owned());
                    snapshots.insert(
                        id.clone(),
                        serde_json::to_value(&entry.snapshot).unwrap_or(Value::Null),
                    );
                    if !entry.snapshot.status.is_final() {
                        all_final = false;
                        notifies.push(entry.notify.clone());
                    }
                }
                None => {
                    status.insert(id.clone(), "not_found".to_owned());
                }
            }
        }

        (
            all_final,
            WaitResult {
                status,
                agents: snapshots,
                timed_out: false,
            },
            notifies,
        )
    }

    /// Cancel any running turn, clear the queue, and close the agent.
    pub fn close(&self, agent_id: &str) -> Result<(), ToolError> {
        let mut agents = self.agents.lock();
        let entry = agents
            .get_mut(agent_id)
            .ok_or_else(|| ToolError::invalid_input(format!("agent {agent_id} not found")))?;
        if let Some(cancel) = entry.cancel.take() {
            cancel.cancel();
        }
        entry.pending.clear();
        entry.snapshot.status = SubAgentStatus::Closed;
        entry.snapshot.current_input = None;
        entry.touch();
        entry.notify.notify_waiters();
        tracing::info!(agent_id = %agent_id, "sub-agent closed");
        Ok(())
    }

    pub fn snapshot(&self, agent_id: &str) -> Option<SubAgentSnapshot> {
        self.agents.lock().get(agent_id).map(|e| e.snapshot.clone())
    }

    pub fn len(&self) -> usize {
        self.agents.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.lock().is_empty()
    }

    // ── Runner-internal hooks ─────────────────────────────────────────

    /// Take the current input and install a fresh cancel token. Returns
    /// `None` when the agent is gone, closed, or has nothing to run.
    fn begin_turn(&self, agent_id: &str) -> Option<(SubAgentSnapshot, CancelToken)> {
        let mut agents = self.agents.lock();
        let entry = agents.get_mut(agent_id)?;
        if entry.snapshot.status == SubAgentStatus::Closed {
            return None;
        }
        entry.snapshot.current_input.as_ref()?;
        let cancel = CancelToken::new();
        entry.cancel = Some(cancel.clone());
        entry.snapshot.status = SubAgentStatus::Running;
        entry.touch();
        Some((entry.snapshot.clone(), cancel))
    }

    /// Record a finished turn. Returns the next queued input, if the agent
    /// should keep running.
    fn finish_turn(&self, agent_id: &str, outcome: Result<String, String>) -> Option<String> {
        let mut agents = self.agents.lock();
        let entry = agents.get_mut(agent_id)?;

        // close() may have raced the turn; closed stays terminal.
        let closed = entry.snapshot.status == SubAgentStatus::Closed;

        match outcome {
            Ok(reply) => {
                entry.snapshot.last_reply = Some(reply);
                entry.snapshot.last_error = None;
                if !closed {
                    entry.snapshot.status = SubAgentStatus::Idle;
                }
            }
            Err(message) => {
                entry.snapshot.last_error = Some(message);
                if !closed {
                    entry.snapshot.status = SubAgentStatus::Failed;
                }
            }
        }
        entry.snapshot.last_completed_at = Some(Utc::now());
        entry.snapshot.current_input = None;
        entry.cancel = None;

        let next = if closed { None } else { entry.pending.pop_front() };
        if let Some(input) = &next {
            entry.snapshot.current_input = Some(input.clone());
            entry.snapshot.status = SubAgentStatus::Running;
        }
        entry.touch();
        entry.notify.notify_waiters();
        next
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Runner task
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Drive one agent: run the current input through the orchestrator's
/// internal port (no HTTP), then drain the pending queue until empty.
async fn drive_agent(state: AppState, agent_id: String) {
    loop {
        let Some((snapshot, cancel)) = state.agents.begin_turn(&agent_id) else {
            return;
        };
        let Some(input_text) = snapshot.current_input.clone() else {
            return;
        };

        let outcome = run_subagent_turn(&state, &snapshot, &input_text, cancel).await;
        match state.agents.finish_turn(&agent_id, outcome) {
            Some(_next) => continue,
            None => return,
        }
    }
}

/// One sub-agent turn through the orchestrator. Collapses the event
/// stream into the final reply or an error message.
async fn run_subagent_turn(
    state: &AppState,
    snapshot: &SubAgentSnapshot,
    input_text: &str,
    cancel: CancelToken,
) -> Result<String, String> {
    let biz = serde_json::json!({
        "prompt_mode": snapshot.prompt_mode.as_str(),
    });
    let input = TurnInput {
        session_id: snapshot.session_id.clone(),
        user_id: snapshot.user_id.clone(),
        channel: snapshot.channel.clone(),
        input: vec![RuntimeMessage::user(input_text)],
        biz_params: Some(biz),
        depth: snapshot.depth,
        cancel,
    };

    let mut rx = run_turn(state.clone(), input);
    let mut reply: Option<String> = None;
    let mut error: Option<String> = None;
    while let Some(event) = rx.recv().await {
        match event {
            na_domain::event::AgentEvent::Completed { reply: r, .. } => reply = Some(r),
            na_domain::event::AgentEvent::Error { message, .. } => error = Some(message),
            _ => {}
        }
    }

    match (reply, error) {
        (Some(r), _) => Ok(r),
        (None, Some(e)) => Err(e),
        (None, None) => Err("sub-agent turn produced no reply".into()),
    }
}
