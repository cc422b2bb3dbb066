//! Local runners that never touch the network.
//!
//! [`EchoRunner`] backs the seeded `echo` provider: it replies with the
//! turn input verbatim, which makes end-to-end smoke tests deterministic.
//! [`ScriptedRunner`] plays back a fixed sequence of outcomes and is used
//! by orchestrator tests to exercise tool loops.

use parking_lot::Mutex;
use std::collections::VecDeque;

use na_domain::error::{Error, Result};
use na_domain::message::Role;

use crate::runner::{GenerateConfig, GenerateOutcome, GenerateRequest, Runner};

/// Replies `Echo: <last user text>`.
#[derive(Debug, Default)]
pub struct EchoRunner;

#[async_trait::async_trait]
impl Runner for EchoRunner {
    async fn generate_reply(
        &self,
        req: GenerateRequest,
        _cfg: &GenerateConfig,
    ) -> Result<GenerateOutcome> {
        let last_user = req
            .input
            .iter()
            .rev()
            .chain(req.history.iter().rev())
            .find(|m| m.role == Role::User)
            .map(|m| m.text())
            .unwrap_or_default();
        Ok(GenerateOutcome::Reply {
            text: format!("Echo: {last_user}"),
            response_id: None,
        })
    }
}

/// Plays a scripted sequence of outcomes, one per generate call.
#[derive(Default)]
pub struct ScriptedRunner {
    outcomes: Mutex<VecDeque<GenerateOutcome>>,
}

impl ScriptedRunner {
    pub fn new(outcomes: impl IntoIterator<Item = GenerateOutcome>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into_iter().collect()),
        }
    }
}

#[async_trait::async_trait]
impl Runner for ScriptedRunner {
    async fn generate_reply(
        &self,
        _req: GenerateRequest,
        cfg: &GenerateConfig,
    ) -> Result<GenerateOutcome> {
        self.outcomes.lock().pop_front().ok_or_else(|| Error::Provider {
            provider: cfg.provider_id.clone(),
            message: "scripted runner exhausted".into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use na_domain::message::RuntimeMessage;

    #[tokio::test]
    async fn echo_replies_with_last_user_text() {
        let runner = EchoRunner;
        let req = GenerateRequest {
            input: vec![RuntimeMessage::user("hello")],
            ..Default::default()
        };
        match runner.generate_reply(req, &GenerateConfig::default()).await.unwrap() {
            GenerateOutcome::Reply { text, .. } => assert_eq!(text, "Echo: hello"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn echo_falls_back_to_history() {
        let runner = EchoRunner;
        let req = GenerateRequest {
            history: vec![
                RuntimeMessage::user("earlier"),
                RuntimeMessage::assistant("reply"),
            ],
            input: vec![],
            ..Default::default()
        };
        match runner.generate_reply(req, &GenerateConfig::default()).await.unwrap() {
            GenerateOutcome::Reply { text, .. } => assert_eq!(text, "Echo: earlier"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn scripted_runner_plays_in_order_then_errors() {
        let runner = ScriptedRunner::new([
            GenerateOutcome::Reply {
                text: "one".into(),
                response_id: None,
            },
            GenerateOutcome::Reply {
                text: "two".into(),
                response_id: None,
            },
        ]);
        let cfg = GenerateConfig::default();
        for expected in ["one", "two"] {
            match runner
                .generate_reply(GenerateRequest::default(), &cfg)
                .await
                .unwrap()
            {
                GenerateOutcome::Reply { text, .. } => assert_eq!(text, expected),
                other => panic!("unexpected outcome: {other:?}"),
            }
        }
        assert!(runner
            .generate_reply(GenerateRequest::default(), &cfg)
            .await
            .is_err());
    }
}
