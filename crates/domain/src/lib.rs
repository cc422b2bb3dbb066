//! Shared domain types for the NextAI gateway.
//!
//! Everything here is provider-, transport-, and storage-agnostic: the
//! message/content model, tool call types, the agent event stream, prompt
//! and collaboration modes, the per-turn runtime snapshot, the cron
//! workflow graph, and the shared error type.

pub mod config;
pub mod error;
pub mod event;
pub mod message;
pub mod mode;
pub mod snapshot;
pub mod tool;
pub mod workflow;

pub use error::{Error, Result};
