//! Prompt layer assembly.
//!
//! Builds the ordered list of system layers for a turn from the runtime
//! snapshot: a single base layer in `default` mode, the full conditional
//! stack in `codex` mode, and one template layer in `claude` mode.

pub mod assembler;
pub mod layer;
pub mod templates;

pub use assembler::{PromptAssembler, PromptSource};
pub use layer::{LayerSource, SystemPromptLayer};
