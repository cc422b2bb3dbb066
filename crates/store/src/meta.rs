//! Chat meta keys. Mode state, plan snapshots, and overrides are kept in
//! `ChatSpec::meta` under these names.

pub const PROMPT_MODE: &str = "prompt_mode";
pub const COLLABORATION_MODE: &str = "collaboration_mode";
pub const COLLABORATION_LAST_EVENT: &str = "collaboration_last_event";
pub const COLLABORATION_EVENT_SOURCE: &str = "collaboration_event_source";
pub const COLLABORATION_UPDATED_AT: &str = "collaboration_updated_at";
pub const UPDATE_PLAN: &str = "codex_update_plan";
pub const ACTIVE_LLM: &str = "active_llm";
pub const SYSTEM_DEFAULT: &str = "system_default";
