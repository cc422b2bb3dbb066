//! The runner port: one generate call per orchestrator step.

use na_domain::error::Result;
use na_domain::message::RuntimeMessage;
use na_domain::tool::{ToolCall, ToolSpec};
use na_prompt::SystemPromptLayer;
use std::collections::BTreeMap;

/// Per-call generation config resolved from the active provider setting.
#[derive(Debug, Clone, Default)]
pub struct GenerateConfig {
    pub provider_id: String,
    pub model: String,
    pub reasoning_effort: Option<String>,
    pub store: Option<bool>,
    pub headers: BTreeMap<String, String>,
    pub timeout_ms: Option<u64>,
}

/// One generate request: system layers, prior history, this turn's input,
/// and the tool specs the model may call.
#[derive(Debug, Clone, Default)]
pub struct GenerateRequest {
    pub system_layers: Vec<SystemPromptLayer>,
    pub history: Vec<RuntimeMessage>,
    pub input: Vec<RuntimeMessage>,
    pub tools: Vec<ToolSpec>,
    /// `provider_response_id` from the previous assistant message, passed
    /// through verbatim for stateful providers.
    pub previous_response_id: Option<String>,
}

/// What a runner produced for one step.
#[derive(Debug, Clone)]
pub enum GenerateOutcome {
    /// A terminal text reply.
    Reply {
        text: String,
        response_id: Option<String>,
    },
    /// The model wants tools executed before continuing.
    ToolCalls {
        calls: Vec<ToolCall>,
        response_id: Option<String>,
    },
    /// The model emitted a tool call whose arguments failed to parse. The
    /// orchestrator feeds the parse error back so the model can
    /// self-correct within the same turn.
    InvalidToolCall {
        id: String,
        name: String,
        arguments_raw: String,
        parse_error: String,
    },
}

/// Adapter over one upstream provider.
#[async_trait::async_trait]
pub trait Runner: Send + Sync {
    async fn generate_reply(
        &self,
        req: GenerateRequest,
        cfg: &GenerateConfig,
    ) -> Result<GenerateOutcome>;
}

impl std::fmt::Debug for dyn Runner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn Runner")
    }
}
