//! The prompt assembler.
//!
//! Pure with respect to the snapshot: given the same
//! [`TurnRuntimeSnapshot`] and assembler settings, the same ordered layer
//! list comes out. The only side effect is the shadow-compare log line,
//! which never influences the selected content.

use std::collections::BTreeMap;

use na_domain::error::PromptError;
use na_domain::mode::{CollaborationMode, PromptMode};
use na_domain::snapshot::TurnRuntimeSnapshot;

use crate::layer::{dedup_layers, sha256_hex, LayerSource, SystemPromptLayer};
use crate::templates;

/// Where codex model instructions are resolved from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PromptSource {
    #[default]
    File,
    Catalog,
}

impl PromptSource {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Some(PromptSource::File),
            "catalog" => Some(PromptSource::Catalog),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PromptSource::File => "file",
            PromptSource::Catalog => "catalog",
        }
    }
}

pub struct PromptAssembler {
    pub source: PromptSource,
    pub shadow_compare: bool,
    pub experimental: bool,
}

impl Default for PromptAssembler {
    fn default() -> Self {
        Self {
            source: PromptSource::File,
            shadow_compare: false,
            experimental: false,
        }
    }
}

impl PromptAssembler {
    /// Read assembler settings from `NEXTAI_CODEX_PROMPT_SOURCE`,
    /// `NEXTAI_CODEX_PROMPT_SHADOW_COMPARE`, and
    /// `NEXTAI_CODEX_EXPERIMENTAL`.
    pub fn from_env() -> Self {
        let source = std::env::var("NEXTAI_CODEX_PROMPT_SOURCE")
            .ok()
            .and_then(|v| PromptSource::parse(&v))
            .unwrap_or_default();
        Self {
            source,
            shadow_compare: env_bool("NEXTAI_CODEX_PROMPT_SHADOW_COMPARE"),
            experimental: env_bool("NEXTAI_CODEX_EXPERIMENTAL"),
        }
    }

    /// Build the ordered layer list for one turn.
    pub fn assemble(
        &self,
        snap: &TurnRuntimeSnapshot,
    ) -> Result<Vec<SystemPromptLayer>, PromptError> {
        let layers = match snap.mode.prompt_mode {
            PromptMode::Default => self.assemble_default(snap),
            PromptMode::Codex => self.assemble_codex(snap)?,
            PromptMode::Claude => vec![SystemPromptLayer::new(
                "claude_base",
                LayerSource::Builtin,
                templates::CLAUDE_TEMPLATE,
            )],
        };

        for layer in &layers {
            if layer.content.is_empty() {
                return Err(PromptError::EmptyLayer(layer.name.clone()));
            }
            let unresolved = templates::unresolved_double(&layer.content);
            if !unresolved.is_empty() {
                return Err(PromptError::MissingTemplateVars {
                    layer: layer.name.clone(),
                    vars: unresolved,
                });
            }
        }

        Ok(dedup_layers(layers))
    }

    fn assemble_default(&self, snap: &TurnRuntimeSnapshot) -> Vec<SystemPromptLayer> {
        let mut layers = vec![SystemPromptLayer::new(
            "base",
            LayerSource::Builtin,
            templates::BASE_DEFAULT,
        )];
        if !snap.available_tools.is_empty() {
            layers.push(SystemPromptLayer::new(
                "tool_guide",
                LayerSource::Builtin,
                templates::TOOL_GUIDE,
            ));
        }
        layers
    }

    fn assemble_codex(
        &self,
        snap: &TurnRuntimeSnapshot,
    ) -> Result<Vec<SystemPromptLayer>, PromptError> {
        let mut layers = vec![SystemPromptLayer::new(
            "base",
            LayerSource::Builtin,
            templates::CODEX_BASE,
        )];

        // Orchestrator guidance only when sub-agent tools are in play.
        if snap.available_tools.iter().any(|t| t == "spawn_agent") {
            layers.push(SystemPromptLayer::new(
                "orchestrator",
                LayerSource::Builtin,
                templates::CODEX_ORCHESTRATOR,
            ));
        }

        if let Some(layer) = self.model_instructions(snap) {
            layers.push(layer);
        }

        if snap.mode.review_task {
            layers.push(SystemPromptLayer::new(
                "review_system",
                LayerSource::Builtin,
                templates::REVIEW_SYSTEM,
            ));
            layers.push(SystemPromptLayer::new(
                "review_history_guidance",
                LayerSource::Builtin,
                templates::REVIEW_HISTORY_GUIDANCE,
            ));
        }

        layers.push(self.collaboration_layer(snap));

        if snap.mode.compact_task {
            layers.push(SystemPromptLayer::new(
                "compact_guide",
                LayerSource::Builtin,
                templates::COMPACT_GUIDE,
            ));
        }

        if snap.mode.memory_task {
            layers.push(self.memories_layer(snap));
        }

        if self.experimental {
            layers.push(SystemPromptLayer::new(
                "experimental",
                LayerSource::Builtin,
                templates::EXPERIMENTAL,
            ));
        }

        let apps = snap.mcp_app_names();
        if !apps.is_empty() {
            let vars = BTreeMap::from([("app_names", apps.join(", "))]);
            layers.push(SystemPromptLayer::new(
                "search_tool",
                LayerSource::Builtin,
                templates::render_single(templates::SEARCH_TOOL, &vars),
            ));
        }

        if !snap.sandbox_policy.is_empty() {
            layers.push(SystemPromptLayer::new(
                "local_policy",
                LayerSource::Builtin,
                templates::LOCAL_POLICY,
            ));
        }

        Ok(layers)
    }

    /// Catalog-first or file-first model instructions, per `source`. The
    /// shadow path resolves the other source and logs a stable diff reason
    /// without ever affecting the selection.
    fn model_instructions(&self, snap: &TurnRuntimeSnapshot) -> Option<SystemPromptLayer> {
        if snap.model_slug.is_empty() {
            return None;
        }

        // Reasoning effort rides on the slug as `<model>@<effort>` when a
        // provider override requests it.
        let (slug, effort) = match snap.model_slug.split_once('@') {
            Some((s, e)) => (s.to_owned(), Some(e.to_owned())),
            None => (snap.model_slug.clone(), None),
        };
        let catalog = templates::catalog_resolve(&slug, &snap.personality, effort.as_deref());
        let file = file_model_instructions(&snap.personality);

        let (selected, source) = match self.source {
            PromptSource::Catalog => match catalog.clone() {
                Some(c) => (c, LayerSource::Catalog),
                None => (file.clone(), LayerSource::File),
            },
            PromptSource::File => (file.clone(), LayerSource::File),
        };

        if self.shadow_compare {
            let catalog_sha = catalog.as_deref().map(sha256_hex).unwrap_or_default();
            let file_sha = sha256_hex(&file);
            if catalog_sha != file_sha {
                tracing::info!(
                    model_slug = %snap.model_slug,
                    selected = self.source.as_str(),
                    diff_reason = %format!(
                        "model_instructions_sha_mismatch catalog={} file={}",
                        &catalog_sha.get(..8).unwrap_or("absent"),
                        &file_sha[..8]
                    ),
                    "prompt shadow compare"
                );
            }
        }

        Some(SystemPromptLayer::new("model_instructions", source, selected))
    }

    fn collaboration_layer(&self, snap: &TurnRuntimeSnapshot) -> SystemPromptLayer {
        let mode = snap.mode.collaboration_mode;
        let (name, content) = match mode {
            CollaborationMode::Default => {
                let vars = BTreeMap::from([
                    (
                        "KNOWN_MODE_NAMES",
                        CollaborationMode::known_names().join(", "),
                    ),
                    ("TURN_MODE", mode.as_str().to_string()),
                    (
                        "REQUEST_USER_INPUT_AVAILABLE",
                        mode.allows_tool("request_user_input").to_string(),
                    ),
                ]);
                (
                    "collab_default",
                    templates::render_double(templates::COLLAB_DEFAULT, &vars),
                )
            }
            CollaborationMode::Plan => ("collab_plan", templates::COLLAB_PLAN.to_owned()),
            CollaborationMode::Execute => ("collab_execute", templates::COLLAB_EXECUTE.to_owned()),
            CollaborationMode::PairProgramming => (
                "collab_pair_programming",
                templates::COLLAB_PAIR_PROGRAMMING.to_owned(),
            ),
        };
        SystemPromptLayer::new(name, LayerSource::Builtin, content)
    }

    fn memories_layer(&self, snap: &TurnRuntimeSnapshot) -> SystemPromptLayer {
        let session = &snap.session_id;
        let vars = BTreeMap::from([
            ("memory_root", "~/.nextai/memory".to_string()),
            ("base_path", format!("~/.nextai/memory/{session}")),
            ("memory_summary", "(no stored memories)".to_string()),
            ("rollout_path", format!("~/.nextai/rollouts/{session}.jsonl")),
            ("rollout_cwd", ".".to_string()),
            ("rollout_contents", "(empty)".to_string()),
        ]);
        debug_assert!(templates::MEMORY_VARS.iter().all(|v| vars.contains_key(v)));
        SystemPromptLayer::new(
            "memories_guide",
            LayerSource::Builtin,
            templates::render_single(templates::MEMORIES_GUIDE, &vars),
        )
    }
}

fn file_model_instructions(personality: &str) -> String {
    let personality = if personality.is_empty() {
        "default".to_string()
    } else {
        personality.to_owned()
    };
    let vars = BTreeMap::from([("personality", personality)]);
    templates::render_double(templates::MODEL_INSTRUCTIONS_FILE, &vars)
}

fn env_bool(name: &str) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.trim(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}
