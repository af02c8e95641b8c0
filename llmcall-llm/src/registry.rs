use crate::anthropic::AnthropicProvider;
use crate::openai::OpenAiProvider;
use crate::provider::ProviderAdapter;
use crate::types::{Credentials, ModelInfo};
use std::collections::HashSet;
use std::sync::Arc;

/// Read-only list of provider adapters, built once at startup.
#[derive(Clone)]
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    pub fn new(providers: Vec<Arc<dyn ProviderAdapter>>) -> Self {
        Self { providers }
    }

    /// OpenAI and Anthropic sharing one HTTP client.
    pub fn with_default_providers(http: reqwest::Client) -> Self {
        Self::new(vec![
            Arc::new(OpenAiProvider::new(http.clone())),
            Arc::new(AnthropicProvider::new(http)),
        ])
    }

    pub fn providers(&self) -> &[Arc<dyn ProviderAdapter>] {
        &self.providers
    }

    pub fn names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name().to_string()).collect()
    }

    /// Exact, case-sensitive lookup by display name.
    pub fn find(&self, name: &str) -> Option<Arc<dyn ProviderAdapter>> {
        self.providers.iter().find(|p| p.name() == name).cloned()
    }

    /// Static and dynamic models of every enabled provider.
    ///
    /// A provider whose list endpoint fails contributes its static table only.
    #[tracing::instrument(level = "debug", skip_all)]
    pub async fn model_list(&self, credentials: &Credentials) -> Vec<ModelInfo> {
        let mut out = Vec::new();
        for provider in &self.providers {
            if !credentials.provider_enabled(provider.name()) {
                tracing::debug!(provider = provider.name(), "provider disabled by caller");
                continue;
            }

            let static_models = provider.static_models();
            let dynamic_models = match provider.dynamic_models(credentials).await {
                Ok(models) => models,
                Err(e) => {
                    tracing::warn!(
                        provider = provider.name(),
                        error = %e,
                        "dynamic model list failed; using static models"
                    );
                    Vec::new()
                }
            };

            // Static entries carry curated labels and budgets; a vendor entry only adds
            // names the table lacks.
            let mut seen: HashSet<String> = static_models.iter().map(|m| m.name.clone()).collect();
            out.extend(static_models);
            out.extend(
                dynamic_models
                    .into_iter()
                    .filter(|m| seen.insert(m.name.clone())),
            );
        }
        out
    }
}
