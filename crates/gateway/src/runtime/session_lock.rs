//! Per-chat turn serialization.
//!
//! One turn runs per `(session_id, user_id, channel)` triple at a time, so
//! persisted message order within a chat equals real-time turn-completion
//! order.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

pub struct SessionLockMap {
    locks: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl Default for SessionLockMap {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionLockMap {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn key(session_id: &str, user_id: &str, channel: &str) -> String {
        format!("{session_id}\u{1f}{user_id}\u{1f}{channel}")
    }

    /// Acquire the turn lock for a chat key. Waits until the in-flight
    /// turn (if any) completes; the permit releases on drop.
    pub async fn acquire(&self, key: &str) -> OwnedSemaphorePermit {
        let sem = {
            let mut locks = self.locks.lock();
            locks
                .entry(key.to_owned())
                .or_insert_with(|| Arc::new(Semaphore::new(1)))
                .clone()
        };
        // The semaphore is never closed, so acquisition cannot fail.
        sem.acquire_owned().await.unwrap_or_else(|_| unreachable!())
    }

    /// Drop locks no one currently holds.
    pub fn prune_idle(&self) {
        let mut locks = self.locks.lock();
        locks.retain(|_, sem| sem.available_permits() == 0);
    }

    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sequential_access() {
        let map = SessionLockMap::new();
        let key = SessionLockMap::key("s1", "u1", "console");
        let p1 = map.acquire(&key).await;
        drop(p1);
        let p2 = map.acquire(&key).await;
        drop(p2);
    }

    #[tokio::test]
    async fn different_chats_are_independent() {
        let map = SessionLockMap::new();
        let _p1 = map.acquire(&SessionLockMap::key("s1", "u1", "console")).await;
        let _p2 = map.acquire(&SessionLockMap::key("s2", "u1", "console")).await;
        assert_eq!(map.len(), 2);
    }

    #[tokio::test]
    async fn same_chat_waits_for_release() {
        let map = Arc::new(SessionLockMap::new());
        let key = SessionLockMap::key("s1", "u1", "console");
        let p1 = map.acquire(&key).await;

        let map2 = map.clone();
        let key2 = key.clone();
        let handle = tokio::spawn(async move {
            let _p2 = map2.acquire(&key2).await;
            7
        });

        tokio::time::sleep(std::time::Duration::from_millis(30)).await;
        drop(p1);
        assert_eq!(handle.await.unwrap(), 7);
    }

    #[tokio::test]
    async fn prune_removes_idle_locks() {
        let map = SessionLockMap::new();
        let key = SessionLockMap::key("s1", "u1", "console");
        let permit = map.acquire(&key).await;
        map.prune_idle();
        assert_eq!(map.len(), 1);
        drop(permit);
        map.prune_idle();
        assert!(map.is_empty());
    }
}
