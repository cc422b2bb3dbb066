//! Shared error type used across all NextAI crates.
//!
//! Every variant carries a stable machine-readable `code()` that the HTTP
//! layer maps into the `{"error":{"code","message"}}` envelope, and an
//! `http_status()` giving the canonical status for that code.

use crate::tool::ToolError;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("provider not found: {0}")]
    ProviderNotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("store: {0}")]
    Store(String),

    #[error("the system default chat cannot be deleted")]
    DefaultChatProtected,

    #[error("the default cron job cannot be deleted")]
    DefaultCronProtected,

    #[error("provider {provider}: {message}")]
    Provider { provider: String, message: String },

    #[error("provider returned an invalid reply: {0}")]
    ProviderInvalidReply(String),

    #[error("channel {channel}: {message}")]
    ChannelDispatch { channel: String, message: String },

    #[error(transparent)]
    Prompt(#[from] PromptError),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("conflicting collaboration event sources")]
    ConflictingCollaborationEvent,

    #[error("collaboration events require the codex prompt mode")]
    CollaborationRequiresCodex,

    #[error("cron execution timed out after {0}ms")]
    CronExecutionTimeout(u64),

    #[error("cron: {0}")]
    Cron(String),

    #[error("runner: {0}")]
    Runner(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Stable machine-readable error code for the HTTP envelope.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Io(_) => "io_error",
            Error::Json(_) => "invalid_json",
            Error::InvalidRequest(_) => "invalid_request",
            Error::Unauthorized(_) => "unauthorized",
            Error::NotFound(_) => "not_found",
            Error::ProviderNotFound(_) => "provider_not_found",
            Error::Conflict(_) => "tool_conflict",
            Error::Store(_) => "store_error",
            Error::DefaultChatProtected => "default_chat_protected",
            Error::DefaultCronProtected => "default_cron_protected",
            Error::Provider { .. } => "provider_request_failed",
            Error::ProviderInvalidReply(_) => "provider_invalid_reply",
            Error::ChannelDispatch { .. } => "channel_dispatch_failed",
            Error::Prompt(e) => e.code(),
            Error::Tool(e) => e.surface_code(),
            Error::ConflictingCollaborationEvent => "conflicting_collaboration_event",
            Error::CollaborationRequiresCodex => "collaboration_requires_codex",
            Error::CronExecutionTimeout(_) => "cron_execution_timeout",
            Error::Cron(_) => "cron_error",
            Error::Runner(_) => "runner_error",
            Error::Other(_) => "internal_error",
        }
    }

    /// Canonical HTTP status for this error (kept as a bare u16 so this
    /// crate stays transport-agnostic).
    pub fn http_status(&self) -> u16 {
        match self {
            Error::InvalidRequest(_) | Error::Json(_) => 400,
            Error::ConflictingCollaborationEvent | Error::CollaborationRequiresCodex => 400,
            Error::Unauthorized(_) => 401,
            Error::NotFound(_) | Error::ProviderNotFound(_) => 404,
            Error::Conflict(_) => 409,
            Error::DefaultChatProtected | Error::DefaultCronProtected => 409,
            Error::Provider { .. } | Error::ProviderInvalidReply(_) => 502,
            Error::ChannelDispatch { .. } => 502,
            Error::Prompt(_) => 500,
            Error::Tool(e) => e.http_status(),
            Error::CronExecutionTimeout(_) => 504,
            Error::Io(_) | Error::Store(_) | Error::Cron(_) | Error::Runner(_) => 500,
            Error::Other(_) => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Prompt assembly errors
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Errors raised while assembling the system prompt layer stack.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PromptError {
    /// A required layer candidate could not be resolved.
    #[error("prompt layer unavailable: {0}")]
    Unavailable(String),

    /// A rendered layer still contains unresolved template placeholders.
    #[error("layer {layer} has unresolved template vars: {vars:?}")]
    MissingTemplateVars { layer: String, vars: Vec<String> },

    /// A required layer rendered to empty content.
    #[error("layer {0} rendered empty")]
    EmptyLayer(String),
}

impl PromptError {
    pub fn code(&self) -> &'static str {
        match self {
            PromptError::Unavailable(_) => "prompt_unavailable",
            PromptError::MissingTemplateVars { .. } => "layer_missing_template_vars",
            PromptError::EmptyLayer(_) => "layer_empty",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(Error::InvalidRequest("x".into()).code(), "invalid_request");
        assert_eq!(Error::Store("x".into()).code(), "store_error");
        assert_eq!(
            Error::ConflictingCollaborationEvent.code(),
            "conflicting_collaboration_event"
        );
        assert_eq!(Error::DefaultChatProtected.code(), "default_chat_protected");
    }

    #[test]
    fn status_mapping() {
        assert_eq!(Error::Unauthorized("no key".into()).http_status(), 401);
        assert_eq!(Error::NotFound("chat".into()).http_status(), 404);
        assert_eq!(Error::Conflict("dup".into()).http_status(), 409);
        assert_eq!(
            Error::Provider {
                provider: "openai".into(),
                message: "503".into()
            }
            .http_status(),
            502
        );
        assert_eq!(Error::CronExecutionTimeout(30_000).http_status(), 504);
    }

    #[test]
    fn prompt_error_codes() {
        assert_eq!(
            PromptError::Unavailable("base".into()).code(),
            "prompt_unavailable"
        );
        assert_eq!(
            PromptError::MissingTemplateVars {
                layer: "collab".into(),
                vars: vec!["TURN_MODE".into()]
            }
            .code(),
            "layer_missing_template_vars"
        );
        assert_eq!(PromptError::EmptyLayer("base".into()).code(), "layer_empty");
    }
}
