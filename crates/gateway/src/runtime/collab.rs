//! Collaboration mode resolution.
//!
//! Reads the requested event (or target mode) from biz params, rejects
//! ambiguous multi-source requests, and applies the total transition
//! function. Mode state is persisted into chat meta by the orchestrator.

use na_domain::error::{Error, Result};
use na_domain::mode::{
    apply_collaboration, CollaborationEvent, CollaborationMode, PromptMode,
};
use serde_json::Value;

/// The outcome of resolving a turn's collaboration transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollabResolution {
    pub mode: CollaborationMode,
    pub event: Option<CollaborationEvent>,
    /// Which biz-param field supplied the event, for persisted audit state.
    pub source: Option<String>,
}

/// Resolve the collaboration transition for one turn.
///
/// Event sources, in inspection order:
/// `collaboration_event`, `collaboration_mode`, `collaboration.event`,
/// `collaboration.mode`. When several sources are present they must agree
/// on the same event. Any explicit event outside codex mode is rejected;
/// unknown event strings are ignored.
pub fn resolve(
    prompt_mode: PromptMode,
    biz_params: Option<&Value>,
    current: CollaborationMode,
) -> Result<CollabResolution> {
    let mut resolved: Option<(CollaborationEvent, String)> = None;

    for (field, value) in event_sources(biz_params) {
        let Some(event) = parse_source(field, &value) else {
            continue;
        };
        match &resolved {
            Some((existing, _)) if *existing != event => {
                return Err(Error::ConflictingCollaborationEvent);
            }
            Some(_) => {}
            None => resolved = Some((event, field.to_owned())),
        }
    }

    if resolved.is_some() && prompt_mode != PromptMode::Codex {
        return Err(Error::CollaborationRequiresCodex);
    }

    let (event, source) = match resolved {
        Some((ev, src)) => (Some(ev), Some(src)),
        None => (None, None),
    };

    Ok(CollabResolution {
        mode: apply_collaboration(current, event),
        event,
        source,
    })
}

fn event_sources(biz_params: Option<&Value>) -> Vec<(&'static str, String)> {
    let Some(biz) = biz_params else {
        return Vec::new();
    };
    let mut out = Vec::new();
    let mut push = |field: &'static str, v: Option<&Value>| {
        if let Some(s) = v.and_then(|v| v.as_str()) {
            if !s.trim().is_empty() {
                out.push((field, s.to_owned()));
            }
        }
    };
    push("collaboration_event", biz.get("collaboration_event"));
    push("collaboration_mode", biz.get("collaboration_mode"));
    let nested = biz.get("collaboration");
    push(
        "collaboration.event",
        nested.and_then(|c| c.get("event")),
    );
    push("collaboration.mode", nested.and_then(|c| c.get("mode")));
    out
}

/// Mode-shaped sources map to the `set_<mode>` event; event-shaped sources
/// parse directly (aliases included).
fn parse_source(field: &str, value: &str) -> Option<CollaborationEvent> {
    if field.ends_with("mode") {
        let mode = CollaborationMode::parse(value)?;
        return CollaborationEvent::parse(mode.as_str());
    }
    CollaborationEvent::parse(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn no_biz_params_keeps_current_mode() {
        let res = resolve(PromptMode::Codex, None, CollaborationMode::Execute).unwrap();
        assert_eq!(res.mode, CollaborationMode::Execute);
        assert!(res.event.is_none());
    }

    #[test]
    fn event_from_flat_field() {
        let biz = json!({"collaboration_event": "set_plan"});
        let res = resolve(PromptMode::Codex, Some(&biz), CollaborationMode::Default).unwrap();
        assert_eq!(res.mode, CollaborationMode::Plan);
        assert_eq!(res.event, Some(CollaborationEvent::SetPlan));
        assert_eq!(res.source.as_deref(), Some("collaboration_event"));
    }

    #[test]
    fn mode_field_maps_to_set_event() {
        let biz = json!({"collaboration": {"mode": "execute"}});
        let res = resolve(PromptMode::Codex, Some(&biz), CollaborationMode::Plan).unwrap();
        assert_eq!(res.mode, CollaborationMode::Execute);
        assert_eq!(res.source.as_deref(), Some("collaboration.mode"));
    }

    #[test]
    fn agreeing_sources_are_fine() {
        let biz = json!({
            "collaboration_event": "plan",
            "collaboration": {"mode": "plan"}
        });
        let res = resolve(PromptMode::Codex, Some(&biz), CollaborationMode::Default).unwrap();
        assert_eq!(res.mode, CollaborationMode::Plan);
    }

    #[test]
    fn conflicting_sources_are_rejected() {
        let biz = json!({
            "collaboration_event": "plan",
            "collaboration_mode": "execute"
        });
        let err = resolve(PromptMode::Codex, Some(&biz), CollaborationMode::Default).unwrap_err();
        assert_eq!(err.code(), "conflicting_collaboration_event");
    }

    #[test]
    fn explicit_event_requires_codex() {
        let biz = json!({"collaboration_event": "set_plan"});
        let err = resolve(PromptMode::Default, Some(&biz), CollaborationMode::Default).unwrap_err();
        assert_eq!(err.code(), "collaboration_requires_codex");
    }

    #[test]
    fn invalid_event_strings_are_ignored() {
        let biz = json!({"collaboration_event": "warp_speed"});
        let res = resolve(PromptMode::Default, Some(&biz), CollaborationMode::Default).unwrap();
        assert_eq!(res.mode, CollaborationMode::Default);
        assert!(res.event.is_none());
    }

    #[test]
    fn reset_alias_lands_on_default() {
        let biz = json!({"collaboration_event": "reset"});
        let res = resolve(PromptMode::Codex, Some(&biz), CollaborationMode::Plan).unwrap();
        assert_eq!(res.mode, CollaborationMode::Default);
    }
}
