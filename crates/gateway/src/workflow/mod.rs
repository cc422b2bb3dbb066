//! Cron workflow execution.
//!
//! A job's workflow is a validated-acyclic node graph walked from the
//! start node. Text nodes reuse the turn orchestrator through the
//! internal port; delay nodes sleep; if nodes branch on a stored env
//! value. The whole run is bounded by the job's timeout.

pub mod lease;
pub mod runner;

use serde_json::json;

use na_domain::error::{Error, Result};
use na_domain::event::AgentEvent;
use na_domain::message::RuntimeMessage;
use na_domain::workflow::{WorkflowGraph, WorkflowNodeKind};
use na_store::CronJob;

use crate::runtime::cancel::CancelToken;
use crate::runtime::turn::{run_turn, TurnInput};
use crate::state::AppState;

/// Run one cron job to completion, honoring its timeout.
pub async fn execute_job(state: &AppState, job: &CronJob) -> Result<()> {
    job.workflow.validate().map_err(Error::Cron)?;

    let timeout_ms = if job.timeout_ms > 0 {
        job.timeout_ms
    } else {
        state.config.runtime.cron_timeout_ms
    };
    let budget = std::time::Duration::from_millis(timeout_ms);

    tokio::time::timeout(budget, walk_graph(state, job))
        .await
        .map_err(|_| Error::CronExecutionTimeout(timeout_ms))?
}

async fn walk_graph(state: &AppState, job: &CronJob) -> Result<()> {
    let graph = &job.workflow;
    let start = graph
        .start()
        .ok_or_else(|| Error::Cron("workflow has no start node".into()))?;

    let mut current = Some(start.id.clone());
    let mut visited = 0usize;

    while let Some(id) = current.take() {
        visited += 1;
        if visited > graph.nodes.len() {
            // Acyclicity was validated, so this is unreachable in practice.
            return Err(Error::Cron("workflow walk exceeded node count".into()));
        }

        let node = graph
            .node(&id)
            .ok_or_else(|| Error::Cron(format!("unknown node: {id}")))?;

        match &node.kind {
            WorkflowNodeKind::Start => {
                current = first_edge_target(graph, &id);
            }
            WorkflowNodeKind::Text {
                text,
                session_id,
                user_id,
                channel,
            } => {
                run_text_node(
                    state,
                    &job.id,
                    text,
                    session_id.as_deref().unwrap_or("system"),
                    user_id.as_deref().unwrap_or("system"),
                    channel.as_deref().unwrap_or("console"),
                )
                .await?;
                current = first_edge_target(graph, &id);
            }
            WorkflowNodeKind::Delay { duration_ms } => {
                tokio::time::sleep(std::time::Duration::from_millis(*duration_ms)).await;
                current = first_edge_target(graph, &id);
            }
            WorkflowNodeKind::If {
                var,
                equals,
                then_to,
                else_to,
            } => {
                let value = state.store.read(|s| s.envs.get(var).cloned());
                let matched = value.as_deref() == Some(equals.as_str());
                tracing::debug!(job_id = %job.id, var = %var, matched, "workflow if node");
                current = if matched {
                    then_to.clone()
                } else {
                    else_to.clone()
                };
            }
        }
    }

    Ok(())
}

fn first_edge_target(graph: &WorkflowGraph, id: &str) -> Option<String> {
    graph
        .edges
        .iter()
        .find(|e| e.from == id)
        .map(|e| e.to.clone())
}

/// Dispatch one text node through the orchestrator and wait for the turn.
async fn run_text_node(
    state: &AppState,
    job_id: &str,
    text: &str,
    session_id: &str,
    user_id: &str,
    channel: &str,
) -> Result<()> {
    let input = TurnInput {
        session_id: session_id.to_owned(),
        user_id: user_id.to_owned(),
        channel: channel.to_owned(),
        input: vec![RuntimeMessage::user(text)],
        biz_params: Some(json!({ "cron_job_id": job_id })),
        depth: 0,
        cancel: CancelToken::new(),
    };

    let mut rx = run_turn(state.clone(), input);
    let mut failure: Option<String> = None;
    while let Some(event) = rx.recv().await {
        if let AgentEvent::Error { message, .. } = event {
            failure = Some(message);
        }
    }
    match failure {
        Some(message) => Err(Error::Cron(format!("text node failed: {message}"))),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use na_domain::workflow::{WorkflowEdge, WorkflowNode};
    use na_store::CronJob;

    fn job_with(workflow: WorkflowGraph, timeout_ms: u64) -> CronJob {
        CronJob {
            id: "test-job".into(),
            name: "Test".into(),
            enabled: true,
            interval_secs: 60,
            max_concurrency: 1,
            timeout_ms,
            workflow,
            system_default: false,
        }
    }

    fn node(id: &str, kind: WorkflowNodeKind) -> WorkflowNode {
        WorkflowNode {
            id: id.into(),
            kind,
        }
    }

    fn edge(from: &str, to: &str) -> WorkflowEdge {
        WorkflowEdge {
            from: from.into(),
            to: to.into(),
        }
    }

    fn text(text: &str) -> WorkflowNodeKind {
        WorkflowNodeKind::Text {
            text: text.into(),
            session_id: Some("cron-s".into()),
            user_id: Some("cron-u".into()),
            channel: Some("console".into()),
        }
    }

    #[tokio::test]
    async fn linear_workflow_dispatches_text_turns() {
        let harness = crate::runtime::turn::tests::test_state();
        let job = job_with(
            WorkflowGraph {
                nodes: vec![
                    node("start", WorkflowNodeKind::Start),
                    node("t1", text("morning digest")),
                    node("d1", WorkflowNodeKind::Delay { duration_ms: 5 }),
                    node("t2", text("afternoon digest")),
                ],
                edges: vec![edge("start", "t1"), edge("t1", "d1"), edge("d1", "t2")],
            },
            10_000,
        );

        execute_job(&harness.state, &job).await.unwrap();

        let chats = harness
            .state
            .store
            .list_chats(Some("cron-u"), Some("console"));
        assert_eq!(chats.len(), 1);
        // Two turns, two user + two assistant messages.
        assert_eq!(harness.state.store.history(&chats[0].id).len(), 4);
    }

    #[tokio::test]
    async fn if_node_branches_on_env() {
        let harness = crate::runtime::turn::tests::test_state();
        harness
            .state
            .store
            .write(|s| {
                s.envs.insert("digest_mode".into(), "on".into());
                Ok(())
            })
            .unwrap();

        let job = job_with(
            WorkflowGraph {
                nodes: vec![
                    node("start", WorkflowNodeKind::Start),
                    node(
                        "cond",
                        WorkflowNodeKind::If {
                            var: "digest_mode".into(),
                            equals: "on".into(),
                            then_to: Some("yes".into()),
                            else_to: Some("no".into()),
                        },
                    ),
                    node("yes", text("branch taken")),
                    node("no", text("branch skipped")),
                ],
                edges: vec![edge("start", "cond")],
            },
            10_000,
        );

        execute_job(&harness.state, &job).await.unwrap();

        let chats = harness
            .state
            .store
            .list_chats(Some("cron-u"), Some("console"));
        let history = harness.state.store.history(&chats[0].id);
        assert!(history[0].text().contains("branch taken"));
    }

    #[tokio::test]
    async fn timeout_maps_to_cron_execution_timeout() {
        let harness = crate::runtime::turn::tests::test_state();
        let job = job_with(
            WorkflowGraph {
                nodes: vec![
                    node("start", WorkflowNodeKind::Start),
                    node("d", WorkflowNodeKind::Delay { duration_ms: 5_000 }),
                ],
                edges: vec![edge("start", "d")],
            },
            50,
        );

        let err = execute_job(&harness.state, &job).await.unwrap_err();
        assert_eq!(err.code(), "cron_execution_timeout");
    }

    #[tokio::test]
    async fn cyclic_workflow_is_rejected_before_execution() {
        let harness = crate::runtime::turn::tests::test_state();
        let job = job_with(
            WorkflowGraph {
                nodes: vec![
                    node("start", WorkflowNodeKind::Start),
                    node("t1", text("a")),
                ],
                edges: vec![edge("start", "t1"), edge("t1", "t1")],
            },
            10_000,
        );
        let err = execute_job(&harness.state, &job).await.unwrap_err();
        assert_eq!(err.code(), "cron_error");
    }
}
