use crate::error::Result;
use crate::types::{CallOptions, Credentials, GenerateOutput, ModelInfo};
use async_trait::async_trait;

/// A configured, ready-to-invoke model endpoint.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Display name of the owning provider, e.g. "OpenAI".
    fn provider(&self) -> &str;

    fn model_id(&self) -> &str;

    /// Run one non-streaming generation.
    async fn do_generate(&self, options: CallOptions) -> Result<GenerateOutput>;
}

/// Where and how an adapter reaches its vendor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderEndpoint {
    pub base_url: String,
    pub api_key: Option<String>,
}

#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Display name; requests select a provider by exact match on it.
    fn name(&self) -> &str;

    /// Where users obtain a key for this vendor.
    fn api_key_link(&self) -> &str;

    /// Environment variable holding the server-side key.
    fn api_token_key(&self) -> &str;

    /// Environment variable overriding the vendor base URL.
    fn base_url_key(&self) -> &str;

    fn default_base_url(&self) -> &str;

    fn static_models(&self) -> Vec<ModelInfo>;

    /// Ask the vendor for its current model list.
    /// Adapters without a list endpoint keep the default.
    async fn dynamic_models(&self, _credentials: &Credentials) -> Result<Vec<ModelInfo>> {
        Ok(Vec::new())
    }

    /// Build a model handle for `model`. Missing keys are tolerated; the vendor call
    /// reports them.
    fn model_instance(
        &self,
        model: &str,
        credentials: &Credentials,
    ) -> Result<Box<dyn LanguageModel>>;

    /// Key precedence: caller settings, then caller keys, then server env.
    /// Base URL precedence: caller settings, then server env, then the vendor default.
    ///
    /// A caller-chosen base URL only ever receives a caller-supplied key; the server
    /// env key stays with the server-configured host.
    fn endpoint(&self, credentials: &Credentials) -> ProviderEndpoint {
        let setting = credentials.setting(self.name());
        let caller_base_url = setting.and_then(|s| non_empty(s.base_url.as_deref()));

        let base_url = caller_base_url
            .or_else(|| credentials.server_env.get(self.base_url_key()))
            .unwrap_or_else(|| self.default_base_url());

        let caller_key = setting
            .and_then(|s| non_empty(s.api_key.as_deref()))
            .or_else(|| non_empty(credentials.api_keys.get(self.name()).map(String::as_str)));
        let api_key = match caller_base_url {
            Some(_) => caller_key,
            None => caller_key.or_else(|| credentials.server_env.get(self.api_token_key())),
        }
        .map(str::to_string);

        ProviderEndpoint {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }
}

fn non_empty(v: Option<&str>) -> Option<&str> {
    v.map(str::trim).filter(|s| !s.is_empty())
}

/// Resolve the endpoint and warn when no key could be found.
pub(crate) fn endpoint_or_warn(
    adapter: &dyn ProviderAdapter,
    credentials: &Credentials,
) -> ProviderEndpoint {
    let endpoint = adapter.endpoint(credentials);
    if endpoint.api_key.is_none() {
        tracing::warn!(
            provider = adapter.name(),
            env_var = adapter.api_token_key(),
            "api key is missing; continuing without one"
        );
    }
    endpoint
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ProviderSetting, ServerEnv};
    use std::collections::HashMap;
    use std::sync::Arc;

    struct Fixed;

    #[async_trait]
    impl ProviderAdapter for Fixed {
        fn name(&self) -> &str {
            "Fixed"
        }
        fn api_key_link(&self) -> &str {
            "https://example.invalid/keys"
        }
        fn api_token_key(&self) -> &str {
            "FIXED_API_KEY"
        }
        fn base_url_key(&self) -> &str {
            "FIXED_API_BASE_URL"
        }
        fn default_base_url(&self) -> &str {
            "https://fixed.invalid/v1"
        }
        fn static_models(&self) -> Vec<ModelInfo> {
            Vec::new()
        }
        fn model_instance(
            &self,
            _model: &str,
            _credentials: &Credentials,
        ) -> Result<Box<dyn LanguageModel>> {
            Err(crate::LlmError::InvalidInput("unused".to_string()))
        }
    }

    fn credentials(
        setting: Option<ProviderSetting>,
        cookie_key: Option<&str>,
        env: &[(&str, &str)],
    ) -> Credentials {
        let mut provider_settings = HashMap::new();
        if let Some(s) = setting {
            provider_settings.insert("Fixed".to_string(), s);
        }
        let mut api_keys = HashMap::new();
        if let Some(k) = cookie_key {
            api_keys.insert("Fixed".to_string(), k.to_string());
        }
        Credentials {
            api_keys,
            provider_settings,
            server_env: Arc::new(ServerEnv::from_vars(env.iter().copied())),
        }
    }

    #[test]
    fn settings_key_wins_over_cookie_and_env() {
        let creds = credentials(
            Some(ProviderSetting {
                api_key: Some("from-settings".to_string()),
                ..Default::default()
            }),
            Some("from-cookie"),
            &[("FIXED_API_KEY", "from-env")],
        );
        assert_eq!(
            Fixed.endpoint(&creds).api_key.as_deref(),
            Some("from-settings")
        );
    }

    #[test]
    fn cookie_key_wins_over_env() {
        let creds = credentials(None, Some("from-cookie"), &[("FIXED_API_KEY", "from-env")]);
        assert_eq!(Fixed.endpoint(&creds).api_key.as_deref(), Some("from-cookie"));
    }

    #[test]
    fn env_key_used_when_caller_supplies_none() {
        let creds = credentials(None, Some("  "), &[("FIXED_API_KEY", "from-env")]);
        assert_eq!(Fixed.endpoint(&creds).api_key.as_deref(), Some("from-env"));
    }

    #[test]
    fn missing_key_resolves_to_none() {
        let creds = credentials(None, None, &[]);
        let endpoint = endpoint_or_warn(&Fixed, &creds);
        assert_eq!(endpoint.api_key, None);
        assert_eq!(endpoint.base_url, "https://fixed.invalid/v1");
    }

    #[test]
    fn base_url_precedence_and_trailing_slash() {
        let creds = credentials(None, None, &[("FIXED_API_BASE_URL", "http://env.local/v1/")]);
        assert_eq!(Fixed.endpoint(&creds).base_url, "http://env.local/v1");

        let creds = credentials(
            Some(ProviderSetting {
                base_url: Some("http://settings.local".to_string()),
                ..Default::default()
            }),
            None,
            &[("FIXED_API_BASE_URL", "http://env.local/v1")],
        );
        assert_eq!(Fixed.endpoint(&creds).base_url, "http://settings.local");
    }

    #[test]
    fn caller_base_url_never_gets_server_key() {
        let creds = credentials(
            Some(ProviderSetting {
                base_url: Some("http://caller.local/v1".to_string()),
                ..Default::default()
            }),
            None,
            &[("FIXED_API_KEY", "from-env")],
        );
        let endpoint = Fixed.endpoint(&creds);
        assert_eq!(endpoint.base_url, "http://caller.local/v1");
        assert_eq!(endpoint.api_key, None);

        let creds = credentials(
            Some(ProviderSetting {
                base_url: Some("http://caller.local/v1".to_string()),
                ..Default::default()
            }),
            Some("from-cookie"),
            &[("FIXED_API_KEY", "from-env")],
        );
        assert_eq!(Fixed.endpoint(&creds).api_key.as_deref(), Some("from-cookie"));
    }

    #[test]
    fn server_base_url_keeps_server_key() {
        let creds = credentials(
            None,
            None,
            &[
                ("FIXED_API_BASE_URL", "http://env.local/v1"),
                ("FIXED_API_KEY", "from-env"),
            ],
        );
        assert_eq!(Fixed.endpoint(&creds).api_key.as_deref(), Some("from-env"));
    }
}
