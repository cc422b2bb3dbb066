//! System prompt layers: normalization, hashing, and dedup priorities.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Where a layer's content was resolved from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerSource {
    Builtin,
    Catalog,
    File,
}

/// One system-role prompt fragment with a stable name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemPromptLayer {
    pub name: String,
    pub role: String,
    pub source: LayerSource,
    pub content: String,
}

impl SystemPromptLayer {
    pub fn new(name: impl Into<String>, source: LayerSource, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: "system".into(),
            source,
            content: normalize_content(&content.into()),
        }
    }

    /// SHA-256 of the normalized content, hex-encoded.
    pub fn content_hash(&self) -> String {
        sha256_hex(&self.content)
    }

    /// Dedup priority class. Higher wins when two layers normalize to the
    /// same content.
    pub fn priority(&self) -> u32 {
        priority_for(&self.name)
    }
}

/// CRLF → LF, then trim surrounding whitespace.
pub fn normalize_content(raw: &str) -> String {
    raw.replace("\r\n", "\n").trim().to_owned()
}

pub fn sha256_hex(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

/// Priority classes: core content layers > local policy > tool guide > rest.
pub fn priority_for(name: &str) -> u32 {
    if name == "base"
        || name == "orchestrator"
        || name == "model_instructions"
        || name.starts_with("collab")
        || name.starts_with("compact")
        || name.starts_with("memories")
        || name == "search_tool"
    {
        300
    } else if name == "local_policy" {
        200
    } else if name == "tool_guide" {
        100
    } else {
        0
    }
}

/// Deduplicate layers by normalized content hash, keeping the
/// higher-priority layer at the first occurrence's position.
pub fn dedup_layers(layers: Vec<SystemPromptLayer>) -> Vec<SystemPromptLayer> {
    let mut out: Vec<SystemPromptLayer> = Vec::with_capacity(layers.len());
    let mut index_by_hash: std::collections::HashMap<String, usize> =
        std::collections::HashMap::new();

    for layer in layers {
        let hash = layer.content_hash();
        match index_by_hash.get(&hash) {
            Some(&i) => {
                if layer.priority() > out[i].priority() {
                    out[i] = layer;
                }
            }
            None => {
                index_by_hash.insert(hash, out.len());
                out.push(layer);
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_strips_crlf_and_trims() {
        assert_eq!(normalize_content("  a\r\nb\r\n  "), "a\nb");
    }

    #[test]
    fn hash_is_stable_over_line_endings() {
        let a = SystemPromptLayer::new("base", LayerSource::Builtin, "x\r\ny");
        let b = SystemPromptLayer::new("base", LayerSource::Builtin, "x\ny");
        assert_eq!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn priority_classes() {
        assert_eq!(priority_for("base"), 300);
        assert_eq!(priority_for("collab_plan"), 300);
        assert_eq!(priority_for("memories_guide"), 300);
        assert_eq!(priority_for("search_tool"), 300);
        assert_eq!(priority_for("local_policy"), 200);
        assert_eq!(priority_for("tool_guide"), 100);
        assert_eq!(priority_for("review_system"), 0);
    }

    #[test]
    fn dedup_keeps_higher_priority_at_first_position() {
        let layers = vec![
            SystemPromptLayer::new("tool_guide", LayerSource::Builtin, "same content"),
            SystemPromptLayer::new("other", LayerSource::Builtin, "unique"),
            SystemPromptLayer::new("base", LayerSource::Builtin, "same content"),
        ];
        let out = dedup_layers(layers);
        assert_eq!(out.len(), 2);
        // The duplicate stays at position 0, but the higher-priority layer wins.
        assert_eq!(out[0].name, "base");
        assert_eq!(out[1].name, "other");
    }

    #[test]
    fn dedup_ties_keep_first() {
        let layers = vec![
            SystemPromptLayer::new("base", LayerSource::Builtin, "same"),
            SystemPromptLayer::new("orchestrator", LayerSource::Builtin, "same"),
        ];
        let out = dedup_layers(layers);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].name, "base");
    }
}
