//! Shared application state passed to all API handlers.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use na_domain::config::Config;
use na_prompt::PromptAssembler;
use na_providers::RunnerRegistry;
use na_store::StateStore;

use crate::channels::ChannelSet;
use crate::runtime::pending_input::PendingInputRegistry;
use crate::runtime::session_lock::SessionLockMap;
use crate::runtime::subagent::SubAgentManager;

/// Shared application state.
///
/// Fields are grouped by concern:
/// - **Core services** — config, state store, runner registry, assembler
/// - **Runtime** — sub-agents, pending inputs, session locks, channels
/// - **Security & policy** — API key hash, disabled tool set
/// - **Filesystem roots** — cron leases, uploads
#[derive(Clone)]
pub struct AppState {
    // ── Core services ─────────────────────────────────────────────────
    pub config: Arc<Config>,
    pub store: Arc<StateStore>,
    pub runners: Arc<RunnerRegistry>,
    pub assembler: Arc<PromptAssembler>,

    // ── Runtime ───────────────────────────────────────────────────────
    pub agents: Arc<SubAgentManager>,
    pub pending_inputs: Arc<PendingInputRegistry>,
    pub session_locks: Arc<SessionLockMap>,
    pub channels: Arc<ChannelSet>,

    // ── Security & policy (startup-computed) ──────────────────────────
    /// SHA-256 of the API key (read once at startup). `None` = dev mode.
    pub api_key_hash: Option<Vec<u8>>,
    /// Tools disabled via `NEXTAI_DISABLED_TOOLS`.
    pub disabled_tools: Arc<HashSet<String>>,

    // ── Filesystem roots ──────────────────────────────────────────────
    pub leases_root: PathBuf,
    pub uploads_root: PathBuf,
}

impl AppState {
    /// Parse the comma-separated disable list.
    pub fn parse_disabled_tools(raw: &str) -> HashSet<String> {
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| s.to_owned())
            .collect()
    }
}
