//! Prompt and collaboration modes.
//!
//! The collaboration transition function is total: every event maps every
//! mode to a defined successor, and unknown event strings parse to `None`
//! so callers fall back to the current (or default) mode.

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Prompt mode
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PromptMode {
    #[default]
    Default,
    Codex,
    Claude,
}

impl PromptMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PromptMode::Default => "default",
            PromptMode::Codex => "codex",
            PromptMode::Claude => "claude",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "default" | "" => Some(PromptMode::Default),
            "codex" => Some(PromptMode::Codex),
            "claude" => Some(PromptMode::Claude),
            _ => None,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Collaboration mode & events
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CollaborationMode {
    #[default]
    Default,
    Plan,
    Execute,
    PairProgramming,
}

impl CollaborationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CollaborationMode::Default => "default",
            CollaborationMode::Plan => "plan",
            CollaborationMode::Execute => "execute",
            CollaborationMode::PairProgramming => "pair_programming",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "default" => Some(CollaborationMode::Default),
            "plan" => Some(CollaborationMode::Plan),
            "execute" => Some(CollaborationMode::Execute),
            "pair_programming" => Some(CollaborationMode::PairProgramming),
            _ => None,
        }
    }

    /// All known mode names, in declaration order. Rendered into the
    /// default collaboration layer.
    pub fn known_names() -> &'static [&'static str] {
        &["default", "plan", "execute", "pair_programming"]
    }

    /// Whether a tool is usable under this mode. `request_user_input` is
    /// only available while planning; `pair_programming` shares the
    /// default capability set (review item — see DESIGN.md).
    pub fn allows_tool(&self, tool_name: &str) -> bool {
        match tool_name {
            "request_user_input" => matches!(self, CollaborationMode::Plan),
            _ => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollaborationEvent {
    SetDefault,
    SetPlan,
    SetExecute,
    SetPairProgramming,
}

impl CollaborationEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            CollaborationEvent::SetDefault => "set_default",
            CollaborationEvent::SetPlan => "set_plan",
            CollaborationEvent::SetExecute => "set_execute",
            CollaborationEvent::SetPairProgramming => "set_pair_programming",
        }
    }

    /// Parse an event name or one of its aliases. Unknown strings yield
    /// `None` (invalid events are ignored by the state machine).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "set_default" | "default" | "reset" => Some(CollaborationEvent::SetDefault),
            "set_plan" | "plan" => Some(CollaborationEvent::SetPlan),
            "set_execute" | "execute" => Some(CollaborationEvent::SetExecute),
            "set_pair_programming" | "pair_programming" | "pair" => {
                Some(CollaborationEvent::SetPairProgramming)
            }
            _ => None,
        }
    }

    /// The mode this event transitions to, regardless of the current mode.
    pub fn target(&self) -> CollaborationMode {
        match self {
            CollaborationEvent::SetDefault => CollaborationMode::Default,
            CollaborationEvent::SetPlan => CollaborationMode::Plan,
            CollaborationEvent::SetExecute => CollaborationMode::Execute,
            CollaborationEvent::SetPairProgramming => CollaborationMode::PairProgramming,
        }
    }
}

/// Total transition function: an event always lands on its target mode;
/// no event keeps the current mode.
pub fn apply_collaboration(
    current: CollaborationMode,
    event: Option<CollaborationEvent>,
) -> CollaborationMode {
    match event {
        Some(ev) => ev.target(),
        None => current,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_set_event_lands_on_its_mode() {
        for (ev, mode) in [
            (CollaborationEvent::SetDefault, CollaborationMode::Default),
            (CollaborationEvent::SetPlan, CollaborationMode::Plan),
            (CollaborationEvent::SetExecute, CollaborationMode::Execute),
            (
                CollaborationEvent::SetPairProgramming,
                CollaborationMode::PairProgramming,
            ),
        ] {
            for from in [
                CollaborationMode::Default,
                CollaborationMode::Plan,
                CollaborationMode::Execute,
                CollaborationMode::PairProgramming,
            ] {
                assert_eq!(apply_collaboration(from, Some(ev)), mode);
            }
        }
    }

    #[test]
    fn no_event_keeps_mode() {
        assert_eq!(
            apply_collaboration(CollaborationMode::Plan, None),
            CollaborationMode::Plan
        );
    }

    #[test]
    fn aliases_parse() {
        assert_eq!(
            CollaborationEvent::parse("reset"),
            Some(CollaborationEvent::SetDefault)
        );
        assert_eq!(
            CollaborationEvent::parse("plan"),
            Some(CollaborationEvent::SetPlan)
        );
        assert_eq!(
            CollaborationEvent::parse("PAIR"),
            Some(CollaborationEvent::SetPairProgramming)
        );
        assert_eq!(CollaborationEvent::parse("bogus"), None);
    }

    #[test]
    fn request_user_input_gated_to_plan() {
        assert!(CollaborationMode::Plan.allows_tool("request_user_input"));
        assert!(!CollaborationMode::Default.allows_tool("request_user_input"));
        assert!(!CollaborationMode::Execute.allows_tool("request_user_input"));
        assert!(!CollaborationMode::PairProgramming.allows_tool("request_user_input"));
        assert!(CollaborationMode::Default.allows_tool("view"));
    }

    #[test]
    fn prompt_mode_parse() {
        assert_eq!(PromptMode::parse("codex"), Some(PromptMode::Codex));
        assert_eq!(PromptMode::parse(""), Some(PromptMode::Default));
        assert_eq!(PromptMode::parse("gpt"), None);
    }
}
