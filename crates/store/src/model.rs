//! Persisted state models — chats, providers, channels, skills, cron jobs.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use na_domain::workflow::WorkflowGraph;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ChatSpec
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A single chat tracked by the store. Uniquely identified by
/// `(session_id, user_id, channel)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSpec {
    pub id: String,
    pub name: String,
    pub session_id: String,
    pub user_id: String,
    pub channel: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Mode state, plan snapshot, overrides. Keys in [`crate::meta`].
    #[serde(default)]
    pub meta: BTreeMap<String, Value>,
}

impl ChatSpec {
    pub fn new(session_id: &str, user_id: &str, channel: &str) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: format!("{user_id}@{channel}"),
            session_id: session_id.to_owned(),
            user_id: user_id.to_owned(),
            channel: channel.to_owned(),
            created_at: now,
            updated_at: now,
            meta: BTreeMap::new(),
        }
    }

    pub fn matches(&self, session_id: &str, user_id: &str, channel: &str) -> bool {
        self.session_id == session_id && self.user_id == user_id && self.channel == channel
    }

    pub fn is_system_default(&self) -> bool {
        self.meta
            .get(crate::meta::SYSTEM_DEFAULT)
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.meta.get(key).and_then(|v| v.as_str())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Provider / model slot
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn default_true() -> bool {
    true
}

/// Settings for one upstream LLM provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderSetting {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub reasoning_effort: Option<String>,
    /// Defaults to true when absent.
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub store: Option<bool>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub model_aliases: BTreeMap<String, String>,
}

impl ProviderSetting {
    /// Trim string fields and normalize header keys. The provider id
    /// itself is lowercased by the store on insert.
    pub fn normalized(mut self) -> Self {
        self.api_key = self.api_key.trim().to_owned();
        self.base_url = self.base_url.trim().to_owned();
        self.display_name = self.display_name.trim().to_owned();
        self.headers = self
            .headers
            .into_iter()
            .map(|(k, v)| (k.trim().to_owned(), v))
            .filter(|(k, _)| !k.is_empty())
            .collect();
        self
    }
}

/// The active model slot: both fields set, or both empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSlotConfig {
    #[serde(default)]
    pub provider_id: String,
    #[serde(default)]
    pub model: String,
}

impl ModelSlotConfig {
    pub fn is_empty(&self) -> bool {
        self.provider_id.is_empty() && self.model.is_empty()
    }

    /// Both-or-neither shape check.
    pub fn is_well_formed(&self) -> bool {
        self.is_empty() || (!self.provider_id.is_empty() && !self.model.is_empty())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Channels / skills
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Config for one outbound channel instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub id: String,
    /// Channel kind: `console`, `webhook`, `qq`, …
    pub kind: String,
    #[serde(default)]
    pub settings: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Skill {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub content: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Cron jobs
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn default_max_concurrency() -> u32 {
    1
}

fn default_cron_timeout_ms() -> u64 {
    30_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CronJob {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    /// Seconds between runs.
    pub interval_secs: u64,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: u32,
    #[serde(default = "default_cron_timeout_ms")]
    pub timeout_ms: u64,
    pub workflow: WorkflowGraph,
    #[serde(default)]
    pub system_default: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CronState {
    pub last_run_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_status: String,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub run_count: u64,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Update-plan snapshot
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStepStatus {
    Pending,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanItem {
    pub step: String,
    pub status: PlanStepStatus,
}

/// The plan snapshot persisted under `codex_update_plan` in chat meta.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdatePlanSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    pub plan: Vec<PlanItem>,
    pub updated_at: DateTime<Utc>,
}

impl UpdatePlanSnapshot {
    /// At most one item may be in progress.
    pub fn validate(&self) -> Result<(), String> {
        let in_progress = self
            .plan
            .iter()
            .filter(|p| p.status == PlanStepStatus::InProgress)
            .count();
        if in_progress > 1 {
            return Err(format!(
                "at most one plan item may be in_progress, found {in_progress}"
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_normalization_trims() {
        let p = ProviderSetting {
            api_key: "  sk-x  ".into(),
            base_url: " https://api.example.com ".into(),
            headers: BTreeMap::from([
                (" X-Org ".to_string(), "acme".to_string()),
                ("  ".to_string(), "dropped".to_string()),
            ]),
            ..Default::default()
        };
        let p = p.normalized();
        assert_eq!(p.api_key, "sk-x");
        assert_eq!(p.base_url, "https://api.example.com");
        assert_eq!(p.headers.len(), 1);
        assert!(p.headers.contains_key("X-Org"));
    }

    #[test]
    fn provider_enabled_defaults_true() {
        let p: ProviderSetting = serde_json::from_str(r#"{"api_key": "k"}"#).unwrap();
        assert!(p.enabled);
    }

    #[test]
    fn model_slot_shape() {
        assert!(ModelSlotConfig::default().is_well_formed());
        assert!(ModelSlotConfig {
            provider_id: "openai".into(),
            model: "gpt-4o".into()
        }
        .is_well_formed());
        assert!(!ModelSlotConfig {
            provider_id: "openai".into(),
            model: String::new()
        }
        .is_well_formed());
    }

    #[test]
    fn plan_validation_rejects_two_in_progress() {
        let snap = UpdatePlanSnapshot {
            explanation: None,
            plan: vec![
                PlanItem {
                    step: "a".into(),
                    status: PlanStepStatus::InProgress,
                },
                PlanItem {
                    step: "b".into(),
                    status: PlanStepStatus::InProgress,
                },
            ],
            updated_at: Utc::now(),
        };
        assert!(snap.validate().is_err());
    }

    #[test]
    fn plan_validation_accepts_one_in_progress() {
        let snap = UpdatePlanSnapshot {
            explanation: Some("why".into()),
            plan: vec![
                PlanItem {
                    step: "a".into(),
                    status: PlanStepStatus::Completed,
                },
                PlanItem {
                    step: "b".into(),
                    status: PlanStepStatus::InProgress,
                },
                PlanItem {
                    step: "c".into(),
                    status: PlanStepStatus::Pending,
                },
            ],
            updated_at: Utc::now(),
        };
        assert!(snap.validate().is_ok());
    }

    #[test]
    fn chat_matches_triple() {
        let chat = ChatSpec::new("s1", "u1", "console");
        assert!(chat.matches("s1", "u1", "console"));
        assert!(!chat.matches("s1", "u1", "web"));
    }
}
