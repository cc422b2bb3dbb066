//! The process-wide state store.
//!
//! One `AppStateData` value behind a `parking_lot::RwLock`. Readers see a
//! consistent snapshot within a single `read` call; `write` runs the
//! mutation against a scratch copy and publishes it only on success, so a
//! closure error leaves the visible state untouched. Successful writes
//! schedule an asynchronous JSON snapshot to `snapshot.json`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use na_domain::error::{Error, Result};
use na_domain::message::RuntimeMessage;
use na_domain::workflow::{WorkflowEdge, WorkflowGraph, WorkflowNode, WorkflowNodeKind};

use crate::meta;
use crate::model::{
    ChannelConfig, ChatSpec, CronJob, CronState, ModelSlotConfig, ProviderSetting, Skill,
};

pub const SNAPSHOT_FILE: &str = "snapshot.json";

/// The id of the cron job seeded on first boot.
pub const DEFAULT_CRON_JOB_ID: &str = "system-heartbeat";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// AppStateData
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Everything the store owns, in one serializable value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppStateData {
    /// chat_id → spec.
    #[serde(default)]
    pub chats: HashMap<String, ChatSpec>,
    /// chat_id → ordered history. Owned here, never referenced from chats.
    #[serde(default)]
    pub histories: HashMap<String, Vec<RuntimeMessage>>,
    /// provider_id (lowercase) → settings.
    #[serde(default)]
    pub providers: HashMap<String, ProviderSetting>,
    #[serde(default)]
    pub active_llm: ModelSlotConfig,
    #[serde(default)]
    pub channels: HashMap<String, ChannelConfig>,
    #[serde(default)]
    pub skills: HashMap<String, Skill>,
    #[serde(default)]
    pub envs: HashMap<String, String>,
    #[serde(default)]
    pub cron_jobs: HashMap<String, CronJob>,
    #[serde(default)]
    pub cron_states: HashMap<String, CronState>,
}

impl AppStateData {
    pub fn find_chat(&self, session_id: &str, user_id: &str, channel: &str) -> Option<&ChatSpec> {
        self.chats
            .values()
            .find(|c| c.matches(session_id, user_id, channel))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// StateStore
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct StateStore {
    snapshot_path: PathBuf,
    data: RwLock<AppStateData>,
    /// Error recorded by the async snapshot writer; surfaced (and cleared)
    /// on the next `write` call.
    flush_error: Arc<Mutex<Option<String>>>,
}

impl StateStore {
    /// Load or create the store under `state_dir/snapshot.json`, seeding
    /// the system-default chat and default cron job on first boot.
    pub fn open(state_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(state_dir)?;
        let snapshot_path = state_dir.join(SNAPSHOT_FILE);

        let mut data = if snapshot_path.exists() {
            let raw = std::fs::read_to_string(&snapshot_path)?;
            serde_json::from_str(&raw)
                .map_err(|e| Error::Store(format!("corrupt snapshot: {e}")))?
        } else {
            AppStateData::default()
        };

        let seeded = seed_defaults(&mut data);

        tracing::info!(
            chats = data.chats.len(),
            providers = data.providers.len(),
            cron_jobs = data.cron_jobs.len(),
            seeded,
            path = %snapshot_path.display(),
            "state store loaded"
        );

        let store = Self {
            snapshot_path,
            data: RwLock::new(data),
            flush_error: Arc::new(Mutex::new(None)),
        };
        if seeded {
            store.flush()?;
        }
        Ok(store)
    }

    /// Run a closure against a consistent read snapshot.
    pub fn read<T>(&self, f: impl FnOnce(&AppStateData) -> T) -> T {
        f(&self.data.read())
    }

    /// Serialize a mutation. The closure runs against a scratch copy; on
    /// `Err` the visible state is untouched. On success the new state is
    /// published and a snapshot flush is scheduled.
    pub fn write<T>(&self, f: impl FnOnce(&mut AppStateData) -> Result<T>) -> Result<T> {
        if let Some(err) = self.flush_error.lock().take() {
            return Err(Error::Store(format!("snapshot write failed: {err}")));
        }

        let out = {
            let mut guard = self.data.write();
            let mut next = guard.clone();
            let out = f(&mut next)?;
            *guard = next;
            out
        };

        self.schedule_flush();
        Ok(out)
    }

    /// Write the current state to disk synchronously.
    pub fn flush(&self) -> Result<()> {
        let json = {
            let data = self.data.read();
            serde_json::to_string_pretty(&*data)
                .map_err(|e| Error::Store(format!("serializing snapshot: {e}")))?
        };
        let tmp = self.snapshot_path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| Error::Store(format!("writing snapshot: {e}")))?;
        std::fs::rename(&tmp, &self.snapshot_path)
            .map_err(|e| Error::Store(format!("publishing snapshot: {e}")))?;
        Ok(())
    }

    /// Schedule an asynchronous snapshot write. Outside a tokio runtime
    /// (unit tests, shutdown paths) this degrades to a synchronous flush.
    fn schedule_flush(&self) {
        let json = {
            let data = self.data.read();
            match serde_json::to_string_pretty(&*data) {
                Ok(j) => j,
                Err(e) => {
                    *self.flush_error.lock() = Some(e.to_string());
                    return;
                }
            }
        };
        let path = self.snapshot_path.clone();
        let flush_error = self.flush_error.clone();

        let write = move || {
            let tmp = path.with_extension("json.tmp");
            let result = std::fs::write(&tmp, &json).and_then(|_| std::fs::rename(&tmp, &path));
            if let Err(e) = result {
                tracing::warn!(error = %e, path = %path.display(), "async snapshot write failed");
                *flush_error.lock() = Some(e.to_string());
            }
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(write);
            }
            Err(_) => write(),
        }
    }

    // ── Chat helpers ──────────────────────────────────────────────────

    /// Look up the chat for a `(session_id, user_id, channel)` triple.
    pub fn find_chat(&self, session_id: &str, user_id: &str, channel: &str) -> Option<ChatSpec> {
        self.read(|s| s.find_chat(session_id, user_id, channel).cloned())
    }

    /// Resolve or create the chat for a triple. Returns `(chat, is_new)`.
    pub fn ensure_chat(
        &self,
        session_id: &str,
        user_id: &str,
        channel: &str,
    ) -> Result<(ChatSpec, bool)> {
        if let Some(existing) = self.find_chat(session_id, user_id, channel) {
            return Ok((existing, false));
        }
        let chat = ChatSpec::new(session_id, user_id, channel);
        let created = self.write(|s| {
            // Re-check under the write lock so the triple stays unique.
            if let Some(existing) = s.find_chat(session_id, user_id, channel) {
                return Ok((existing.clone(), false));
            }
            s.chats.insert(chat.id.clone(), chat.clone());
            s.histories.insert(chat.id.clone(), Vec::new());
            Ok((chat.clone(), true))
        })?;
        Ok(created)
    }

    pub fn get_chat(&self, chat_id: &str) -> Option<ChatSpec> {
        self.read(|s| s.chats.get(chat_id).cloned())
    }

    /// List chats, optionally filtered by user and channel. The seeded
    /// system-default chat is excluded from listings.
    pub fn list_chats(&self, user_id: Option<&str>, channel: Option<&str>) -> Vec<ChatSpec> {
        let mut chats = self.read(|s| {
            s.chats
                .values()
                .filter(|c| !c.is_system_default())
                .filter(|c| user_id.map_or(true, |u| c.user_id == u))
                .filter(|c| channel.map_or(true, |ch| c.channel == ch))
                .cloned()
                .collect::<Vec<_>>()
        });
        chats.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        chats
    }

    /// Delete a chat and its history. The system-default chat is protected.
    pub fn delete_chat(&self, chat_id: &str) -> Result<()> {
        self.write(|s| {
            let chat = s
                .chats
                .get(chat_id)
                .ok_or_else(|| Error::NotFound(format!("chat {chat_id}")))?;
            if chat.is_system_default() {
                return Err(Error::DefaultChatProtected);
            }
            s.chats.remove(chat_id);
            s.histories.remove(chat_id);
            Ok(())
        })
    }

    /// Remove every chat matching a triple (the `/new` reset). The
    /// system-default chat is skipped. Returns how many chats were removed.
    pub fn clear_chats(&self, session_id: &str, user_id: &str, channel: &str) -> Result<usize> {
        self.write(|s| {
            let ids: Vec<String> = s
                .chats
                .values()
                .filter(|c| c.matches(session_id, user_id, channel) && !c.is_system_default())
                .map(|c| c.id.clone())
                .collect();
            for id in &ids {
                s.chats.remove(id);
                s.histories.remove(id);
            }
            Ok(ids.len())
        })
    }

    /// Merge updates into a chat's meta map and bump `updated_at`.
    pub fn update_chat_meta(
        &self,
        chat_id: &str,
        f: impl FnOnce(&mut std::collections::BTreeMap<String, Value>),
    ) -> Result<()> {
        self.write(|s| {
            let chat = s
                .chats
                .get_mut(chat_id)
                .ok_or_else(|| Error::NotFound(format!("chat {chat_id}")))?;
            f(&mut chat.meta);
            chat.updated_at = Utc::now();
            Ok(())
        })
    }

    /// Append messages to a chat's history (append-only within a turn).
    pub fn append_history(&self, chat_id: &str, messages: Vec<RuntimeMessage>) -> Result<()> {
        self.write(|s| {
            let chat = s
                .chats
                .get_mut(chat_id)
                .ok_or_else(|| Error::NotFound(format!("chat {chat_id}")))?;
            chat.updated_at = Utc::now();
            s.histories.entry(chat_id.to_owned()).or_default().extend(messages);
            Ok(())
        })
    }

    pub fn history(&self, chat_id: &str) -> Vec<RuntimeMessage> {
        self.read(|s| s.histories.get(chat_id).cloned().unwrap_or_default())
    }

    // ── Provider helpers ──────────────────────────────────────────────

    /// Insert a provider under its lowercased, trimmed id.
    pub fn upsert_provider(&self, id: &str, setting: ProviderSetting) -> Result<()> {
        let id = id.trim().to_ascii_lowercase();
        if id.is_empty() {
            return Err(Error::InvalidRequest("provider id must not be empty".into()));
        }
        self.write(|s| {
            s.providers.insert(id.clone(), setting.normalized());
            Ok(())
        })
    }

    pub fn provider(&self, id: &str) -> Option<ProviderSetting> {
        let id = id.trim().to_ascii_lowercase();
        self.read(|s| s.providers.get(&id).cloned())
    }

    /// Set the global active model slot. When non-empty, the provider must
    /// exist and be enabled.
    pub fn set_active_llm(&self, slot: ModelSlotConfig) -> Result<()> {
        if !slot.is_well_formed() {
            return Err(Error::InvalidRequest(
                "model slot requires both provider_id and model, or neither".into(),
            ));
        }
        self.write(|s| {
            if !slot.is_empty() {
                let provider = s
                    .providers
                    .get(&slot.provider_id)
                    .ok_or_else(|| Error::ProviderNotFound(slot.provider_id.clone()))?;
                if !provider.enabled {
                    return Err(Error::InvalidRequest(format!(
                        "provider {} is disabled",
                        slot.provider_id
                    )));
                }
            }
            s.active_llm = slot.clone();
            Ok(())
        })
    }

    pub fn active_llm(&self) -> ModelSlotConfig {
        self.read(|s| s.active_llm.clone())
    }

    // ── Cron helpers ──────────────────────────────────────────────────

    pub fn cron_jobs(&self) -> Vec<CronJob> {
        self.read(|s| s.cron_jobs.values().cloned().collect())
    }

    pub fn cron_state(&self, job_id: &str) -> CronState {
        self.read(|s| s.cron_states.get(job_id).cloned().unwrap_or_default())
    }

    pub fn update_cron_state(&self, job_id: &str, f: impl FnOnce(&mut CronState)) -> Result<()> {
        self.write(|s| {
            f(s.cron_states.entry(job_id.to_owned()).or_default());
            Ok(())
        })
    }

    /// Delete a cron job. The seeded default job is protected.
    pub fn delete_cron_job(&self, job_id: &str) -> Result<()> {
        self.write(|s| {
            let job = s
                .cron_jobs
                .get(job_id)
                .ok_or_else(|| Error::NotFound(format!("cron job {job_id}")))?;
            if job.system_default {
                return Err(Error::DefaultCronProtected);
            }
            s.cron_jobs.remove(job_id);
            s.cron_states.remove(job_id);
            Ok(())
        })
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Seeding
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Seed the system-default chat, the echo provider + active slot, and the
/// default cron job on first boot. Returns whether anything was created.
fn seed_defaults(data: &mut AppStateData) -> bool {
    let mut seeded = false;

    if !data.chats.values().any(|c| c.is_system_default()) {
        let mut chat = ChatSpec::new("system", "system", "console");
        chat.name = "System Default".into();
        chat.meta
            .insert(meta::SYSTEM_DEFAULT.into(), Value::Bool(true));
        data.histories.insert(chat.id.clone(), Vec::new());
        data.chats.insert(chat.id.clone(), chat);
        seeded = true;
    }

    if data.providers.is_empty() {
        data.providers.insert(
            "echo".into(),
            ProviderSetting {
                display_name: "Echo (local)".into(),
                enabled: true,
                ..Default::default()
            },
        );
        seeded = true;
    }

    if data.active_llm.is_empty() {
        data.active_llm = ModelSlotConfig {
            provider_id: "echo".into(),
            model: "echo-1".into(),
        };
        seeded = true;
    }

    if !data.cron_jobs.contains_key(DEFAULT_CRON_JOB_ID) {
        data.cron_jobs.insert(
            DEFAULT_CRON_JOB_ID.into(),
            CronJob {
                id: DEFAULT_CRON_JOB_ID.into(),
                name: "System heartbeat".into(),
                enabled: false,
                interval_secs: 3600,
                max_concurrency: 1,
                timeout_ms: 30_000,
                workflow: WorkflowGraph {
                    nodes: vec![
                        WorkflowNode {
                            id: "start".into(),
                            kind: WorkflowNodeKind::Start,
                        },
                        WorkflowNode {
                            id: "ping".into(),
                            kind: WorkflowNodeKind::Text {
                                text: "heartbeat".into(),
                                session_id: Some("system".into()),
                                user_id: Some("system".into()),
                                channel: Some("console".into()),
                            },
                        },
                    ],
                    edges: vec![WorkflowEdge {
                        from: "start".into(),
                        to: "ping".into(),
                    }],
                },
                system_default: true,
            },
        );
        seeded = true;
    }

    seeded
}

#[cfg(test)]
mod tests {
    use super::*;
    use na_domain::message::Role;

    fn open_store() -> (StateStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::open(dir.path()).unwrap();
        (store, dir)
    }

    #[test]
    fn seeds_defaults_on_first_boot() {
        let (store, _dir) = open_store();
        assert!(store.read(|s| s.chats.values().any(|c| c.is_system_default())));
        assert!(store.provider("echo").is_some());
        assert_eq!(store.active_llm().provider_id, "echo");
        assert!(store
            .cron_jobs()
            .iter()
            .any(|j| j.id == DEFAULT_CRON_JOB_ID && j.system_default));
    }

    #[test]
    fn triple_is_unique() {
        let (store, _dir) = open_store();
        let (a, new_a) = store.ensure_chat("s1", "u1", "console").unwrap();
        let (b, new_b) = store.ensure_chat("s1", "u1", "console").unwrap();
        assert!(new_a);
        assert!(!new_b);
        assert_eq!(a.id, b.id);
        assert_eq!(store.list_chats(Some("u1"), Some("console")).len(), 1);
    }

    #[test]
    fn clear_chats_removes_triple_and_next_turn_creates_new_id() {
        let (store, _dir) = open_store();
        let (chat, _) = store.ensure_chat("s-reset", "u-reset", "console").unwrap();
        store
            .append_history(&chat.id, vec![RuntimeMessage::user("hello before reset")])
            .unwrap();

        let removed = store.clear_chats("s-reset", "u-reset", "console").unwrap();
        assert_eq!(removed, 1);
        assert!(store.list_chats(Some("u-reset"), Some("console")).is_empty());

        let (next, is_new) = store.ensure_chat("s-reset", "u-reset", "console").unwrap();
        assert!(is_new);
        assert_ne!(next.id, chat.id);
        assert!(store.history(&next.id).is_empty());
    }

    #[test]
    fn default_chat_is_protected() {
        let (store, _dir) = open_store();
        let default_id =
            store.read(|s| s.chats.values().find(|c| c.is_system_default()).unwrap().id.clone());
        let err = store.delete_chat(&default_id).unwrap_err();
        assert_eq!(err.code(), "default_chat_protected");
        assert!(store.get_chat(&default_id).is_some());
    }

    #[test]
    fn default_cron_is_protected() {
        let (store, _dir) = open_store();
        let err = store.delete_cron_job(DEFAULT_CRON_JOB_ID).unwrap_err();
        assert_eq!(err.code(), "default_cron_protected");
    }

    #[test]
    fn write_error_leaves_state_untouched() {
        let (store, _dir) = open_store();
        let before = store.read(|s| s.chats.len());
        let result: Result<()> = store.write(|s| {
            s.chats.insert("ghost".into(), ChatSpec::new("x", "y", "z"));
            Err(Error::InvalidRequest("abort".into()))
        });
        assert!(result.is_err());
        assert_eq!(store.read(|s| s.chats.len()), before);
        assert!(store.get_chat("ghost").is_none());
    }

    #[test]
    fn append_history_preserves_order() {
        let (store, _dir) = open_store();
        let (chat, _) = store.ensure_chat("s1", "u1", "console").unwrap();
        store
            .append_history(
                &chat.id,
                vec![RuntimeMessage::user("q"), RuntimeMessage::assistant("a")],
            )
            .unwrap();
        let history = store.history(&chat.id);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[1].role, Role::Assistant);
    }

    #[test]
    fn snapshot_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = StateStore::open(dir.path()).unwrap();
            let (chat, _) = store.ensure_chat("s1", "u1", "console").unwrap();
            store
                .append_history(&chat.id, vec![RuntimeMessage::user("persisted")])
                .unwrap();
            store.flush().unwrap();
        }
        let store = StateStore::open(dir.path()).unwrap();
        let chat = store.find_chat("s1", "u1", "console").expect("chat survives restart");
        assert_eq!(store.history(&chat.id).len(), 1);
    }

    #[test]
    fn active_llm_requires_known_enabled_provider() {
        let (store, _dir) = open_store();
        let err = store
            .set_active_llm(ModelSlotConfig {
                provider_id: "missing".into(),
                model: "m".into(),
            })
            .unwrap_err();
        assert_eq!(err.code(), "provider_not_found");

        store
            .upsert_provider(
                "OpenAI ",
                ProviderSetting {
                    api_key: "k".into(),
                    enabled: true,
                    ..Default::default()
                },
            )
            .unwrap();
        // Provider ids are lowercased on insert.
        assert!(store.provider("openai").is_some());
        store
            .set_active_llm(ModelSlotConfig {
                provider_id: "openai".into(),
                model: "gpt-4o".into(),
            })
            .unwrap();
        assert_eq!(store.active_llm().model, "gpt-4o");
    }
}
