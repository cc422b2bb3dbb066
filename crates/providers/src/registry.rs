//! Runner registry: provider id → runner instance.
//!
//! Wire adapters are registered by the binary at boot; the orchestrator
//! resolves the active provider here and builds the per-call
//! [`GenerateConfig`] from the stored settings.

use std::collections::HashMap;
use std::sync::Arc;

use na_domain::error::{Error, Result};
use na_store::{ProviderSetting, StateStore};
use parking_lot::RwLock;

use crate::echo::EchoRunner;
use crate::runner::{GenerateConfig, Runner};

pub struct RunnerRegistry {
    runners: RwLock<HashMap<String, Arc<dyn Runner>>>,
}

impl Default for RunnerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RunnerRegistry {
    pub fn new() -> Self {
        Self {
            runners: RwLock::new(HashMap::new()),
        }
    }

    /// A registry with the local echo runner pre-registered.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register("echo", Arc::new(EchoRunner));
        registry
    }

    pub fn register(&self, provider_id: &str, runner: Arc<dyn Runner>) {
        let id = provider_id.trim().to_ascii_lowercase();
        self.runners.write().insert(id, runner);
    }

    pub fn get(&self, provider_id: &str) -> Option<Arc<dyn Runner>> {
        let id = provider_id.trim().to_ascii_lowercase();
        self.runners.read().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.runners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.runners.read().is_empty()
    }

    /// Resolve a runner + per-call config for an enabled provider.
    pub fn resolve(
        &self,
        store: &StateStore,
        provider_id: &str,
        model: &str,
    ) -> Result<(Arc<dyn Runner>, GenerateConfig)> {
        let setting = store
            .provider(provider_id)
            .ok_or_else(|| Error::ProviderNotFound(provider_id.to_owned()))?;
        if !setting.enabled {
            return Err(Error::ProviderNotFound(format!(
                "{provider_id} (disabled)"
            )));
        }
        let runner = self.get(provider_id).ok_or_else(|| Error::Provider {
            provider: provider_id.to_owned(),
            message: "no runner adapter registered".into(),
        })?;
        Ok((runner, build_config(provider_id, model, &setting)))
    }
}

/// Map stored settings into the per-call config, resolving model aliases.
fn build_config(provider_id: &str, model: &str, setting: &ProviderSetting) -> GenerateConfig {
    let model = setting
        .model_aliases
        .get(model)
        .map(String::as_str)
        .unwrap_or(model);
    GenerateConfig {
        provider_id: provider_id.trim().to_ascii_lowercase(),
        model: model.to_owned(),
        reasoning_effort: setting.reasoning_effort.clone(),
        store: setting.store,
        headers: setting.headers.clone().into_iter().collect(),
        timeout_ms: setting.timeout_ms,
    }
}
