//! Turn orchestration — the per-request state machine.
//!
//! `INIT → RESOLVE_MODE → ASSEMBLE → GENERATE ⇄ DISPATCH_TOOL → PERSIST`,
//! with a bounded step budget. Events stream out over an mpsc channel;
//! the caller reads them for SSE or drains them for a non-streaming
//! response.

use serde_json::{json, Value};
use tokio::sync::mpsc;

use na_domain::error::{Error, Result};
use na_domain::event::{AgentEvent, ToolCallInfo, ToolResultInfo};
use na_domain::message::{Role, RuntimeMessage};
use na_domain::mode::{CollaborationMode, PromptMode};
use na_providers::{GenerateOutcome, GenerateRequest};
use na_store::{meta, ModelSlotConfig};

use crate::runtime::cancel::CancelToken;
use crate::runtime::notices::NoticeLog;
use crate::runtime::tools::{self, ToolCtx};
use crate::runtime::{collab, snapshot, truncate_runes};
use crate::state::AppState;

/// The reset acknowledgement emitted for the `/new` sentinel.
pub const RESET_REPLY: &str = "上下文已清理";

const BUILTIN_CHANNELS: &[&str] = &["console", "web", "cli", "qq", "webhook"];

/// Input to a single turn.
pub struct TurnInput {
    pub session_id: String,
    pub user_id: String,
    pub channel: String,
    pub input: Vec<RuntimeMessage>,
    pub biz_params: Option<Value>,
    /// Sub-agent nesting depth; 0 for HTTP turns.
    pub depth: u32,
    pub cancel: CancelToken,
}

/// Run one turn. Events arrive on the returned channel; the channel
/// closes when the turn is done. Errors raised before the first generate
/// step surface as a single `error` event with step 0.
pub fn run_turn(state: AppState, input: TurnInput) -> mpsc::Receiver<AgentEvent> {
    let (tx, rx) = mpsc::channel::<AgentEvent>(64);

    let span = tracing::info_span!(
        "turn",
        session_id = %input.session_id,
        user_id = %input.user_id,
        channel = %input.channel,
        depth = input.depth,
    );
    tokio::spawn(tracing::Instrument::instrument(
        async move {
            if let Err(e) = run_turn_inner(&state, &input, &tx).await {
                tracing::warn!(error = %e, code = e.code(), "turn failed");
                let _ = tx
                    .send(AgentEvent::Error {
                        step: 0,
                        code: e.code().to_owned(),
                        message: e.to_string(),
                    })
                    .await;
            }
        },
        span,
    ));

    rx
}

async fn run_turn_inner(
    state: &AppState,
    input: &TurnInput,
    tx: &mpsc::Sender<AgentEvent>,
) -> Result<()> {
    // ── INIT ──────────────────────────────────────────────────────────
    validate_input(state, input)?;

    let full_text = user_text(&input.input);
    if full_text.trim() == "/new" {
        let removed = state
            .store
            .clear_chats(&input.session_id, &input.user_id, &input.channel)?;
        tracing::info!(chats_cleared = removed, "context reset via /new");
        let _ = tx
            .send(AgentEvent::Completed {
                step: 1,
                reply: RESET_REPLY.to_owned(),
                meta: [
                    ("reset".to_owned(), json!(true)),
                    ("chats_cleared".to_owned(), json!(removed)),
                ]
                .into_iter()
                .collect(),
            })
            .await;
        return Ok(());
    }

    let (chat, _is_new) = state
        .store
        .ensure_chat(&input.session_id, &input.user_id, &input.channel)?;

    // ── RESOLVE_MODE ──────────────────────────────────────────────────
    let biz = input.biz_params.as_ref();

    let biz_prompt_mode = biz
        .and_then(|b| b.get("prompt_mode"))
        .and_then(|v| v.as_str())
        .and_then(PromptMode::parse);
    let prompt_mode = biz_prompt_mode
        .or_else(|| chat.meta_str(meta::PROMPT_MODE).and_then(PromptMode::parse))
        .unwrap_or_default();

    let current_collab = chat
        .meta_str(meta::COLLABORATION_MODE)
        .and_then(CollaborationMode::parse)
        .unwrap_or_default();
    let resolution = collab::resolve(prompt_mode, biz, current_collab)?;

    if biz_prompt_mode.is_some() || resolution.event.is_some() {
        let resolution = resolution.clone();
        state.store.update_chat_meta(&chat.id, move |m| {
            if let Some(mode) = biz_prompt_mode {
                m.insert(meta::PROMPT_MODE.into(), json!(mode.as_str()));
            }
            if let Some(event) = resolution.event {
                m.insert(
                    meta::COLLABORATION_MODE.into(),
                    json!(resolution.mode.as_str()),
                );
                m.insert(meta::COLLABORATION_LAST_EVENT.into(), json!(event.as_str()));
                m.insert(
                    meta::COLLABORATION_EVENT_SOURCE.into(),
                    json!(resolution.source),
                );
                m.insert(
                    meta::COLLABORATION_UPDATED_AT.into(),
                    json!(chrono::Utc::now().to_rfc3339()),
                );
            }
        })?;
    }

    // Active model: chat override wins over the global slot.
    let slot = chat
        .meta
        .get(meta::ACTIVE_LLM)
        .and_then(|v| serde_json::from_value::<ModelSlotConfig>(v.clone()).ok())
        .filter(|s| s.is_well_formed() && !s.is_empty())
        .unwrap_or_else(|| state.store.active_llm());
    if slot.is_empty() {
        return Err(Error::ProviderNotFound("no active model slot".into()));
    }
    let (runner, gen_cfg) = state
        .runners
        .resolve(&state.store, &slot.provider_id, &slot.model)?;

    // ── ASSEMBLE ──────────────────────────────────────────────────────
    let snap = snapshot::build(
        state,
        snapshot::SnapshotInput {
            chat: &chat,
            biz_params: biz,
            prompt_mode,
            collaboration_mode: resolution.mode,
            collaboration_event: resolution.event,
            model_slot: &slot,
            depth: input.depth,
        },
    );
    let layers = state.assembler.assemble(&snap)?;
    let specs = tools::specs_for(&snap);

    let ctx = ToolCtx {
        chat_id: chat.id.clone(),
        session_id: input.session_id.clone(),
        user_id: input.user_id.clone(),
        channel: input.channel.clone(),
        prompt_mode,
        collaboration_mode: resolution.mode,
        depth: input.depth,
        cancel: input.cancel.clone(),
    };

    let persisted = state.store.history(&chat.id);
    let previous_response_id = persisted
        .iter()
        .rev()
        .find(|m| m.role == Role::Assistant)
        .and_then(|m| m.metadata.get("provider_response_id"))
        .and_then(|v| v.as_str())
        .map(|s| s.to_owned());

    // ── GENERATE ⇄ DISPATCH_TOOL ──────────────────────────────────────
    let mut turn_messages: Vec<RuntimeMessage> = Vec::new();
    let mut notices = NoticeLog::new();
    let mut provider_response_id: Option<String> = None;
    let max_steps = state.config.runtime.max_steps;

    for step in 1..=max_steps {
        if input.cancel.is_cancelled() {
            let _ = tx
                .send(AgentEvent::Error {
                    step,
                    code: "cancelled".into(),
                    message: "turn cancelled".into(),
                })
                .await;
            return Ok(());
        }

        let _ = tx.send(AgentEvent::StepStarted { step }).await;

        let req = GenerateRequest {
            system_layers: layers.clone(),
            history: persisted
                .iter()
                .chain(turn_messages.iter())
                .cloned()
                .collect(),
            input: input.input.clone(),
            tools: specs.clone(),
            previous_response_id: previous_response_id.clone(),
        };

        let outcome = match runner.generate_reply(req, &gen_cfg).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(error = %e, step, "runner call failed");
                let _ = tx
                    .send(AgentEvent::Error {
                        step,
                        code: e.code().to_owned(),
                        message: e.to_string(),
                    })
                    .await;
                return Ok(());
            }
        };

        match outcome {
            GenerateOutcome::Reply { text, response_id } => {
                if response_id.is_some() {
                    provider_response_id = response_id;
                }
                let _ = tx
                    .send(AgentEvent::AssistantDelta {
                        step,
                        delta: text.clone(),
                    })
                    .await;
                notices.push_text(step, &text);

                // ── PERSIST ───────────────────────────────────────────
                let mut assistant = RuntimeMessage::assistant(&text);
                if let Some(id) = &provider_response_id {
                    assistant
                        .metadata
                        .insert("provider_response_id".into(), json!(id));
                }
                assistant
                    .metadata
                    .insert("tool_call_notices".into(), notices.take());

                let mut to_persist = input.input.clone();
                to_persist.push(assistant);
                state.store.append_history(&chat.id, to_persist)?;

                let _ = tx
                    .send(AgentEvent::Completed {
                        step,
                        reply: text,
                        meta: [(
                            "model_request".to_owned(),
                            json!({
                                "provider_id": gen_cfg.provider_id,
                                "model": gen_cfg.model,
                                "steps": step,
                            }),
                        )]
                        .into_iter()
                        .collect(),
                    })
                    .await;
                return Ok(());
            }

            GenerateOutcome::ToolCalls { calls, response_id } => {
                if response_id.is_some() {
                    provider_response_id = response_id;
                }
                for call in calls {
                    notices.push_tool_call(step, &call.name, &call.id, &call.arguments);
                    let _ = tx
                        .send(AgentEvent::ToolCall {
                            step,
                            tool_call: ToolCallInfo {
                                name: call.name.clone(),
                                input: call.arguments.clone(),
                                id: call.id.clone(),
                            },
                        })
                        .await;

                    let dispatched =
                        tools::dispatch(state, &ctx, &call.name, &call.arguments).await;
                    let (result, ok) = match dispatched {
                        Ok(value) => (value, true),
                        Err(te) => (
                            json!({
                                "error": {
                                    "code": te.code.as_str(),
                                    "message": te.message,
                                    "cause": te.cause,
                                }
                            }),
                            false,
                        ),
                    };

                    notices.complete_tool_call(step, &call.name, &result, ok);
                    let _ = tx
                        .send(AgentEvent::ToolResult {
                            step,
                            tool_result: ToolResultInfo {
                                name: call.name.clone(),
                                result: result.clone(),
                                ok,
                            },
                        })
                        .await;

                    let feedback = serde_json::to_string(&result).unwrap_or_default();
                    turn_messages.push(RuntimeMessage::tool_result(&call.id, feedback));
                }
            }

            GenerateOutcome::InvalidToolCall {
                id,
                name,
                arguments_raw,
                parse_error,
            } => {
                let feedback = invalid_tool_feedback(&parse_error, &arguments_raw);
                let shown_input = json!({ "raw_arguments": truncate_runes(&arguments_raw, 320) });

                notices.push_tool_call(step, &name, &id, &shown_input);
                let _ = tx
                    .send(AgentEvent::ToolCall {
                        step,
                        tool_call: ToolCallInfo {
                            name: name.clone(),
                            input: shown_input,
                            id: id.clone(),
                        },
                    })
                    .await;

                let result = Value::String(feedback.clone());
                notices.complete_tool_call(step, &name, &result, false);
                let _ = tx
                    .send(AgentEvent::ToolResult {
                        step,
                        tool_result: ToolResultInfo {
                            name: name.clone(),
                            result,
                            ok: false,
                        },
                    })
                    .await;

                turn_messages.push(RuntimeMessage::tool_result(&id, feedback));
            }
        }
    }

    let _ = tx
        .send(AgentEvent::Error {
            step: max_steps,
            code: "runner_error".into(),
            message: format!("step budget exceeded ({max_steps} steps)"),
        })
        .await;
    Ok(())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn validate_input(state: &AppState, input: &TurnInput) -> Result<()> {
    if input.session_id.trim().is_empty() || input.user_id.trim().is_empty() {
        return Err(Error::InvalidRequest(
            "session_id and user_id are required".into(),
        ));
    }
    if input.input.is_empty() || input.input.iter().all(|m| m.text().trim().is_empty()) {
        return Err(Error::InvalidRequest("input must not be empty".into()));
    }
    let channel = input.channel.as_str();
    let known = BUILTIN_CHANNELS.contains(&channel)
        || state.store.read(|s| s.channels.contains_key(channel));
    if !known {
        return Err(Error::InvalidRequest(format!("unknown channel: {channel}")));
    }
    Ok(())
}

fn user_text(messages: &[RuntimeMessage]) -> String {
    messages
        .iter()
        .filter(|m| m.role == Role::User)
        .map(|m| m.text())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Build the self-correction feedback for an unparseable tool call. The
/// message is compacted to 160 runes, detail and raw arguments to 320.
fn invalid_tool_feedback(parse_error: &str, arguments_raw: &str) -> String {
    let message = truncate_runes(parse_error.lines().next().unwrap_or(parse_error), 160);
    let detail = truncate_runes(parse_error, 320);
    let raw = truncate_runes(arguments_raw, 320);
    format!("tool_error code=invalid_tool_input message={message} detail={detail} raw_arguments={raw}")
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use na_domain::tool::ToolCall;
    use na_providers::echo::ScriptedRunner;
    use std::sync::Arc;

    pub(crate) struct TestHarness {
        pub state: AppState,
        _dir: tempfile::TempDir,
    }

    pub(crate) fn test_state() -> TestHarness {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(na_store::StateStore::open(dir.path()).unwrap());
        let state = AppState {
            config: Arc::new(na_domain::config::Config::default()),
            store,
            runners: Arc::new(na_providers::RunnerRegistry::with_builtins()),
            assembler: Arc::new(na_prompt::PromptAssembler::default()),
            agents: Arc::new(crate::runtime::subagent::SubAgentManager::new()),
            pending_inputs: Arc::new(crate::runtime::pending_input::PendingInputRegistry::new()),
            session_locks: Arc::new(crate::runtime::session_lock::SessionLockMap::new()),
            channels: Arc::new(crate::channels::ChannelSet::new()),
            api_key_hash: None,
            disabled_tools: Arc::new(Default::default()),
            leases_root: dir.path().join("leases"),
            uploads_root: dir.path().join("uploads"),
        };
        TestHarness { state, _dir: dir }
    }

    fn turn_input(session: &str, user: &str, text: &str) -> TurnInput {
        TurnInput {
            session_id: session.into(),
            user_id: user.into(),
            channel: "console".into(),
            input: vec![RuntimeMessage::user(text)],
            biz_params: None,
            depth: 0,
            cancel: CancelToken::new(),
        }
    }

    async fn drain(mut rx: mpsc::Receiver<AgentEvent>) -> Vec<AgentEvent> {
        let mut events = Vec::new();
        while let Some(ev) = rx.recv().await {
            events.push(ev);
        }
        events
    }

    fn reply_of(events: &[AgentEvent]) -> Option<String> {
        events.iter().find_map(|e| match e {
            AgentEvent::Completed { reply, .. } => Some(reply.clone()),
            _ => None,
        })
    }

    #[tokio::test]
    async fn echo_turn_persists_and_replies() {
        let harness = test_state();
        let rx = run_turn(harness.state.clone(), turn_input("s1", "u1", "hello"));
        let events = drain(rx).await;

        assert_eq!(reply_of(&events).unwrap(), "Echo: hello");
        assert!(matches!(events[0], AgentEvent::StepStarted { step: 1 }));

        let chats = harness.state.store.list_chats(Some("u1"), Some("console"));
        assert_eq!(chats.len(), 1);
        let history = harness.state.store.history(&chats[0].id);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[1].role, Role::Assistant);
        assert!(history[1].metadata.contains_key("tool_call_notices"));
    }

    #[tokio::test]
    async fn second_turn_appends_to_same_chat() {
        let harness = test_state();
        drain(run_turn(harness.state.clone(), turn_input("s1", "u1", "one"))).await;
        drain(run_turn(harness.state.clone(), turn_input("s1", "u1", "two"))).await;

        let chats = harness.state.store.list_chats(Some("u1"), Some("console"));
        assert_eq!(chats.len(), 1);
        assert_eq!(harness.state.store.history(&chats[0].id).len(), 4);
    }

    #[tokio::test]
    async fn new_sentinel_resets_context() {
        let harness = test_state();
        drain(run_turn(
            harness.state.clone(),
            turn_input("s-reset", "u-reset", "hello before reset"),
        ))
        .await;
        assert_eq!(
            harness
                .state
                .store
                .list_chats(Some("u-reset"), Some("console"))
                .len(),
            1
        );

        let events = drain(run_turn(
            harness.state.clone(),
            turn_input("s-reset", "u-reset", " /new "),
        ))
        .await;
        assert!(reply_of(&events).unwrap().contains(RESET_REPLY));
        assert!(harness
            .state
            .store
            .list_chats(Some("u-reset"), Some("console"))
            .is_empty());
    }

    #[tokio::test]
    async fn empty_input_is_invalid_request() {
        let harness = test_state();
        let input = TurnInput {
            input: vec![],
            ..turn_input("s1", "u1", "")
        };
        let events = drain(run_turn(harness.state.clone(), input)).await;
        match &events[0] {
            AgentEvent::Error { code, .. } => assert_eq!(code, "invalid_request"),
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_channel_is_invalid_request() {
        let harness = test_state();
        let mut input = turn_input("s1", "u1", "hi");
        input.channel = "telegraph".into();
        let events = drain(run_turn(harness.state.clone(), input)).await;
        match &events[0] {
            AgentEvent::Error { code, .. } => assert_eq!(code, "invalid_request"),
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn invalid_tool_call_feedback_loop() {
        let harness = test_state();
        // Step 1: unparseable tool call; step 2: the model self-corrects.
        harness.state.runners.register(
            "echo",
            Arc::new(ScriptedRunner::new([
                GenerateOutcome::InvalidToolCall {
                    id: "c1".into(),
                    name: "shell".into(),
                    arguments_raw: "not-json".into(),
                    parse_error: "invalid character 'n' looking for beginning of value".into(),
                },
                GenerateOutcome::Reply {
                    text: "recovered".into(),
                    response_id: None,
                },
            ])),
        );

        let events = drain(run_turn(harness.state.clone(), turn_input("s1", "u1", "go"))).await;

        let tool_calls: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, AgentEvent::ToolCall { .. }))
            .collect();
        assert_eq!(tool_calls.len(), 1);

        let tool_result = events
            .iter()
            .find_map(|e| match e {
                AgentEvent::ToolResult { tool_result, .. } => Some(tool_result.clone()),
                _ => None,
            })
            .unwrap();
        assert!(!tool_result.ok);
        let text = tool_result.result.as_str().unwrap();
        assert!(text.starts_with("tool_error code=invalid_tool_input"));
        assert!(text.contains("raw_arguments=not-json"));

        assert_eq!(reply_of(&events).unwrap(), "recovered");
    }

    #[tokio::test]
    async fn tool_loop_executes_and_records_notices() {
        let harness = test_state();
        harness.state.runners.register(
            "echo",
            Arc::new(ScriptedRunner::new([
                GenerateOutcome::ToolCalls {
                    calls: vec![ToolCall {
                        id: "c1".into(),
                        name: "self_ops".into(),
                        arguments: json!({"action": "status"}),
                    }],
                    response_id: Some("resp-1".into()),
                },
                GenerateOutcome::Reply {
                    text: "done".into(),
                    response_id: Some("resp-2".into()),
                },
            ])),
        );

        let events = drain(run_turn(harness.state.clone(), turn_input("s1", "u1", "go"))).await;
        assert_eq!(reply_of(&events).unwrap(), "done");

        let chats = harness.state.store.list_chats(Some("u1"), Some("console"));
        let history = harness.state.store.history(&chats[0].id);
        let assistant = history.last().unwrap();
        assert_eq!(
            assistant.metadata.get("provider_response_id"),
            Some(&json!("resp-2"))
        );
        let notices = assistant
            .metadata
            .get("tool_call_notices")
            .and_then(|v| v.as_array())
            .unwrap();
        // The pending tool_call was replaced in place by its result.
        let result_notice = notices.iter().find(|n| n["kind"] == "tool_result").unwrap();
        assert_eq!(result_notice["name"], "self_ops");
        assert_eq!(result_notice["ok"], true);
        assert!(notices.iter().all(|n| n["kind"] != "tool_call"));
    }

    #[tokio::test]
    async fn step_budget_exhaustion_reports_runner_error() {
        let harness = test_state();
        let mut config = na_domain::config::Config::default();
        config.runtime.max_steps = 2;
        let state = AppState {
            config: Arc::new(config),
            ..harness.state.clone()
        };
        state.runners.register(
            "echo",
            Arc::new(ScriptedRunner::new((0..4).map(|i| {
                GenerateOutcome::ToolCalls {
                    calls: vec![ToolCall {
                        id: format!("c{i}"),
                        name: "self_ops".into(),
                        arguments: json!({}),
                    }],
                    response_id: None,
                }
            }))),
        );

        let events = drain(run_turn(state, turn_input("s1", "u1", "loop"))).await;
        let last = events.last().unwrap();
        match last {
            AgentEvent::Error { code, message, .. } => {
                assert_eq!(code, "runner_error");
                assert!(message.contains("step budget"));
            }
            other => panic!("expected budget error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn collaboration_event_is_persisted() {
        let harness = test_state();
        let mut input = turn_input("s1", "u1", "plan please");
        input.biz_params = Some(json!({
            "prompt_mode": "codex",
            "collaboration_event": "set_plan"
        }));
        drain(run_turn(harness.state.clone(), input)).await;

        let chat = harness
            .state
            .store
            .find_chat("s1", "u1", "console")
            .unwrap();
        assert_eq!(chat.meta_str(meta::COLLABORATION_MODE), Some("plan"));
        assert_eq!(
            chat.meta_str(meta::COLLABORATION_LAST_EVENT),
            Some("set_plan")
        );
        assert_eq!(chat.meta_str(meta::PROMPT_MODE), Some("codex"));
    }

    #[tokio::test]
    async fn conflicting_collaboration_sources_fail_the_turn() {
        let harness = test_state();
        let mut input = turn_input("s1", "u1", "hi");
        input.biz_params = Some(json!({
            "prompt_mode": "codex",
            "collaboration_event": "plan",
            "collaboration_mode": "execute"
        }));
        let events = drain(run_turn(harness.state.clone(), input)).await;
        match &events[0] {
            AgentEvent::Error { code, .. } => {
                assert_eq!(code, "conflicting_collaboration_event")
            }
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[test]
    fn invalid_feedback_is_truncated() {
        let feedback = invalid_tool_feedback(&"e".repeat(500), &"r".repeat(500));
        assert!(feedback.starts_with("tool_error code=invalid_tool_input message="));
        assert!(feedback.contains("...(truncated)"));
        // message ≤160 + marker, detail/raw ≤320 + marker.
        let raw_section = feedback.split("raw_arguments=").nth(1).unwrap();
        assert_eq!(
            raw_section.chars().count(),
            320 + "...(truncated)".chars().count()
        );
    }
}
