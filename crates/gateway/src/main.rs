use std::sync::Arc;

use anyhow::Context;
use axum::http::Method;
use clap::{Parser, Subcommand};
use sha2::{Digest, Sha256};
use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;

use na_domain::config::{Config, ConfigSeverity};
use na_gateway::api;
use na_gateway::channels::ChannelSet;
use na_gateway::runtime::pending_input::PendingInputRegistry;
use na_gateway::runtime::session_lock::SessionLockMap;
use na_gateway::runtime::subagent::SubAgentManager;
use na_gateway::state::AppState;
use na_gateway::workflow::runner::CronRunner;
use na_prompt::PromptAssembler;
use na_providers::RunnerRegistry;
use na_store::StateStore;

#[derive(Parser)]
#[command(name = "nextai", about = "NextAI agent gateway")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to the TOML config file.
    #[arg(long, default_value = "config.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Command {
    /// Run the gateway server (default).
    Serve,
    /// Print the version and exit.
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        None | Some(Command::Serve) => {
            init_tracing();
            let config = load_config(&cli.config)?;
            run_server(Arc::new(config)).await
        }
        Some(Command::Version) => {
            println!("nextai {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Structured JSON tracing for the serve command.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,na_gateway=debug")),
        )
        .json()
        .init();
}

fn load_config(path: &str) -> anyhow::Result<Config> {
    let path = std::path::Path::new(path);
    if !path.exists() {
        return Ok(Config::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

async fn run_server(config: Arc<Config>) -> anyhow::Result<()> {
    tracing::info!("NextAI gateway starting");

    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!("config validation failed");
    }

    // ── State store ──────────────────────────────────────────────────
    let state_dir = config.server.state_path.clone();
    let store = Arc::new(StateStore::open(&state_dir).context("opening state store")?);

    // ── Provider settings (registry file + env fallbacks) ───────────
    na_providers::settings::bootstrap_providers(&store)
        .context("bootstrapping provider settings")?;

    // ── Runner registry ──────────────────────────────────────────────
    let runners = Arc::new(RunnerRegistry::with_builtins());
    {
        let without_adapter: Vec<String> = store.read(|s| {
            s.providers
                .keys()
                .filter(|id| runners.get(id).is_none())
                .cloned()
                .collect()
        });
        for id in without_adapter {
            tracing::warn!(provider = %id, "provider has no runner adapter registered");
        }
    }
    tracing::info!(runners = runners.len(), "runner registry ready");

    // ── Prompt assembler ─────────────────────────────────────────────
    let assembler = Arc::new(PromptAssembler::from_env());
    tracing::info!(
        source = assembler.source.as_str(),
        shadow_compare = assembler.shadow_compare,
        "prompt assembler ready"
    );

    // ── Disabled tools ───────────────────────────────────────────────
    let disabled_tools = Arc::new(AppState::parse_disabled_tools(
        &std::env::var("NEXTAI_DISABLED_TOOLS").unwrap_or_default(),
    ));
    if !disabled_tools.is_empty() {
        tracing::info!(count = disabled_tools.len(), "tools disabled by policy");
    }

    // ── API key (read once, hash for constant-time comparison) ──────
    let api_key_hash = match std::env::var(&config.server.api_key_env) {
        Ok(key) if !key.is_empty() => {
            tracing::info!(env_var = %config.server.api_key_env, "API key auth enabled");
            Some(Sha256::digest(key.as_bytes()).to_vec())
        }
        _ => {
            tracing::warn!(
                env_var = %config.server.api_key_env,
                "API key auth DISABLED — set the env var to enable"
            );
            None
        }
    };

    api::qq::log_supervisor_flag();

    // ── App state ────────────────────────────────────────────────────
    let state = AppState {
        config: config.clone(),
        store: store.clone(),
        runners,
        assembler,
        agents: Arc::new(SubAgentManager::new()),
        pending_inputs: Arc::new(PendingInputRegistry::new()),
        session_locks: Arc::new(SessionLockMap::new()),
        channels: Arc::new(ChannelSet::new()),
        api_key_hash,
        disabled_tools,
        leases_root: state_dir.join("leases"),
        uploads_root: state_dir.join("uploads"),
    };

    // ── Periodic store flush ─────────────────────────────────────────
    {
        let store = store.clone();
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(std::time::Duration::from_secs(30));
            loop {
                interval.tick().await;
                if let Err(e) = store.flush() {
                    tracing::warn!(error = %e, "state store flush failed");
                }
            }
        });
    }

    // ── Periodic session lock pruning ────────────────────────────────
    {
        let locks = state.session_locks.clone();
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(std::time::Duration::from_secs(60));
            loop {
                interval.tick().await;
                locks.prune_idle();
            }
        });
    }

    // ── Cron scheduler ───────────────────────────────────────────────
    {
        let state_for_cron = state.clone();
        let tick = config.runtime.cron_tick_secs.max(1);
        tokio::spawn(async move {
            let runner = CronRunner::new();
            let mut interval =
                tokio::time::interval(std::time::Duration::from_secs(tick));
            loop {
                interval.tick().await;
                runner.tick(&state_for_cron).await;
            }
        });
        tracing::info!(tick_secs = tick, "cron scheduler started");
    }

    // ── Router ───────────────────────────────────────────────────────
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::AUTHORIZATION,
            axum::http::HeaderName::from_static("x-api-key"),
            axum::http::HeaderName::from_static("x-channel-source"),
        ]);

    // Backpressure: cap concurrent in-flight requests.
    let max_concurrent = std::env::var("NEXTAI_MAX_CONCURRENT_REQUESTS")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(256);
    tracing::info!(max_concurrent, "concurrency limit set");

    let app = api::router(state.clone())
        .layer(cors)
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_concurrent))
        .with_state(state);

    // ── Bind ─────────────────────────────────────────────────────────
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;

    tracing::info!(addr = %addr, "NextAI gateway listening");

    axum::serve(listener, app)
        .await
        .context("axum server error")?;

    Ok(())
}
