//! Provider settings loading: registry file merge and env fallbacks.
//!
//! At boot the gateway merges `NEXTAI_PROVIDER_REGISTRY_FILE` (a JSON map
//! of provider id → setting) into the store, then fills missing
//! credentials from `<PROVIDER>_API_KEY` / `<PROVIDER>_BASE_URL`.

use std::collections::HashMap;
use std::path::Path;

use na_domain::error::{Error, Result};
use na_store::{ProviderSetting, StateStore};

/// Load a provider registry file: `{ "<provider_id>": ProviderSetting }`.
pub fn load_registry_file(path: &Path) -> Result<HashMap<String, ProviderSetting>> {
    let raw = std::fs::read_to_string(path)?;
    let parsed: HashMap<String, ProviderSetting> = serde_json::from_str(&raw)
        .map_err(|e| Error::InvalidRequest(format!("provider registry file: {e}")))?;
    Ok(parsed
        .into_iter()
        .map(|(id, s)| (id.trim().to_ascii_lowercase(), s.normalized()))
        .collect())
}

/// Fill an empty api key / base url from the provider's env fallbacks,
/// e.g. `OPENAI_API_KEY` and `OPENAI_BASE_URL` for provider id `openai`.
pub fn apply_env_fallbacks(id: &str, setting: &mut ProviderSetting) {
    let prefix = id.trim().to_ascii_uppercase().replace('-', "_");
    if setting.api_key.is_empty() {
        if let Ok(key) = std::env::var(format!("{prefix}_API_KEY")) {
            setting.api_key = key.trim().to_owned();
        }
    }
    if setting.base_url.is_empty() {
        if let Ok(url) = std::env::var(format!("{prefix}_BASE_URL")) {
            setting.base_url = url.trim().to_owned();
        }
    }
}

/// Merge the registry file (if configured) into the store and apply env
/// fallbacks to every stored provider.
pub fn bootstrap_providers(store: &StateStore) -> Result<()> {
    if let Ok(path) = std::env::var("NEXTAI_PROVIDER_REGISTRY_FILE") {
        if !path.trim().is_empty() {
            let registry = load_registry_file(Path::new(path.trim()))?;
            tracing::info!(providers = registry.len(), path = %path, "merging provider registry file");
            for (id, setting) in registry {
                store.upsert_provider(&id, setting)?;
            }
        }
    }

    let ids: Vec<String> = store.read(|s| s.providers.keys().cloned().collect());
    for id in ids {
        if let Some(mut setting) = store.provider(&id) {
            let before = (setting.api_key.clone(), setting.base_url.clone());
            apply_env_fallbacks(&id, &mut setting);
            if (setting.api_key.clone(), setting.base_url.clone()) != before {
                tracing::debug!(provider = %id, "applied env credential fallbacks");
                store.upsert_provider(&id, setting)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn registry_file_lowercases_ids() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"OpenAI": {{"api_key": " sk-1 ", "base_url": "https://api.openai.com"}}}}"#
        )
        .unwrap();
        let registry = load_registry_file(file.path()).unwrap();
        let setting = registry.get("openai").expect("lowercased id");
        assert_eq!(setting.api_key, "sk-1");
    }

    #[test]
    fn env_fallback_fills_only_missing_fields() {
        std::env::set_var("TESTPROV_API_KEY", "env-key");
        std::env::set_var("TESTPROV_BASE_URL", "https://env.example.com");

        let mut setting = ProviderSetting {
            api_key: "explicit".into(),
            ..Default::default()
        };
        apply_env_fallbacks("testprov", &mut setting);
        assert_eq!(setting.api_key, "explicit");
        assert_eq!(setting.base_url, "https://env.example.com");

        std::env::remove_var("TESTPROV_API_KEY");
        std::env::remove_var("TESTPROV_BASE_URL");
    }

    #[test]
    fn env_prefix_uppercases_and_replaces_dashes() {
        std::env::set_var("MY_PROV_API_KEY", "k");
        let mut setting = ProviderSetting::default();
        apply_env_fallbacks("my-prov", &mut setting);
        assert_eq!(setting.api_key, "k");
        std::env::remove_var("MY_PROV_API_KEY");
    }
}
