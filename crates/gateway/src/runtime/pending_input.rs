//! Pending user-input waiters for the `request_user_input` tool.
//!
//! One waiter per live `request_id`; the answer endpoint matches identity
//! fields before delivering and removing the waiter.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;

use na_domain::tool::{ToolError, ToolErrorCode};

/// Identity captured when a waiter registers. All fields are non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingIdentity {
    pub session_id: String,
    pub user_id: String,
    pub channel: String,
}

struct Waiter {
    identity: PendingIdentity,
    tx: oneshot::Sender<Value>,
}

/// Why an answer submission was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerError {
    /// No live waiter with this request id.
    NotFound,
    /// A provided identity field does not match the waiter's.
    Mismatch,
}

#[derive(Default)]
pub struct PendingInputRegistry {
    waiters: Mutex<HashMap<String, Waiter>>,
}

impl PendingInputRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a waiter. Duplicate live request ids are a conflict.
    pub fn register(
        &self,
        request_id: &str,
        identity: PendingIdentity,
    ) -> Result<oneshot::Receiver<Value>, ToolError> {
        let mut waiters = self.waiters.lock();
        if waiters.contains_key(request_id) {
            return Err(ToolError::new(
                ToolErrorCode::Conflict,
                format!("request_user_input waiter {request_id} already exists"),
            ));
        }
        let (tx, rx) = oneshot::channel();
        waiters.insert(request_id.to_owned(), Waiter { identity, tx });
        Ok(rx)
    }

    /// Deliver an answer to a waiter. Provided identity fields must match
    /// the waiter's; omitted fields are not checked.
    pub fn answer(
        &self,
        request_id: &str,
        session_id: Option<&str>,
        user_id: Option<&str>,
        channel: Option<&str>,
        answers: Value,
    ) -> Result<(), AnswerError> {
        let mut waiters = self.waiters.lock();
        let waiter = waiters.get(request_id).ok_or(AnswerError::NotFound)?;

        let mismatched = [
            (session_id, waiter.identity.session_id.as_str()),
            (user_id, waiter.identity.user_id.as_str()),
            (channel, waiter.identity.channel.as_str()),
        ]
        .iter()
        .any(|(provided, expected)| provided.is_some_and(|p| p != *expected));
        if mismatched {
            return Err(AnswerError::Mismatch);
        }

        // The receiver may have gone away (timeout / cancel); the waiter is
        // removed either way so the request id can be reused.
        let waiter = waiters.remove(request_id).ok_or(AnswerError::NotFound)?;
        let _ = waiter.tx.send(answers);
        Ok(())
    }

    /// Drop a waiter without answering (timeout or cancellation path).
    pub fn remove(&self, request_id: &str) {
        self.waiters.lock().remove(request_id);
    }

    pub fn len(&self) -> usize {
        self.waiters.lock().len()
    }

    /// Live request ids, in no particular order.
    pub fn ids(&self) -> Vec<String> {
        self.waiters.lock().keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.waiters.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn identity() -> PendingIdentity {
        PendingIdentity {
            session_id: "s1".into(),
            user_id: "u1".into(),
            channel: "console".into(),
        }
    }

    #[tokio::test]
    async fn answer_reaches_waiter() {
        let registry = PendingInputRegistry::new();
        let rx = registry.register("r1", identity()).unwrap();
        registry
            .answer(
                "r1",
                Some("s1"),
                None,
                None,
                json!({"choice": {"answers": ["yes"]}}),
            )
            .unwrap();
        let answers = rx.await.unwrap();
        assert_eq!(answers["choice"]["answers"][0], "yes");
        assert!(registry.is_empty());
    }

    #[test]
    fn duplicate_request_id_is_conflict() {
        let registry = PendingInputRegistry::new();
        let _rx = registry.register("r1", identity()).unwrap();
        let err = registry.register("r1", identity()).unwrap_err();
        assert_eq!(err.code, ToolErrorCode::Conflict);
    }

    #[test]
    fn unknown_request_id_is_not_found() {
        let registry = PendingInputRegistry::new();
        let err = registry
            .answer("ghost", None, None, None, json!({}))
            .unwrap_err();
        assert_eq!(err, AnswerError::NotFound);
    }

    #[test]
    fn identity_mismatch_is_rejected_and_waiter_survives() {
        let registry = PendingInputRegistry::new();
        let _rx = registry.register("r1", identity()).unwrap();
        let err = registry
            .answer("r1", Some("someone-else"), None, None, json!({}))
            .unwrap_err();
        assert_eq!(err, AnswerError::Mismatch);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn remove_allows_request_id_reuse() {
        let registry = PendingInputRegistry::new();
        let _rx = registry.register("r1", identity()).unwrap();
        registry.remove("r1");
        assert!(registry.register("r1", identity()).is_ok());
    }
}
