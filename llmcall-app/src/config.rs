//! llmcall configuration loader.
//!
//! The file is optional: without one the server runs on defaults and reads vendor keys
//! from the environment only.

use llmcall_llm::{ProviderAdapter, ServerEnv};
use serde::Deserialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LlmCallConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    /// Keyed by provider display name, e.g. `[providers.OpenAI]`.
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_http_timeout_seconds")]
    pub http_timeout_seconds: u64,
    #[serde(default = "default_http_max_in_flight")]
    pub http_max_in_flight: usize,
}

fn default_bind_addr() -> String {
    "127.0.0.1:5173".to_string()
}

fn default_http_timeout_seconds() -> u64 {
    120
}

fn default_http_max_in_flight() -> usize {
    256
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            http_timeout_seconds: default_http_timeout_seconds(),
            http_max_in_flight: default_http_max_in_flight(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    /// Timeout for each vendor HTTP call.
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
}

fn default_request_timeout_seconds() -> u64 {
    60
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            request_timeout_seconds: default_request_timeout_seconds(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_provider_enabled")]
    pub enabled: bool,
}

fn default_provider_enabled() -> bool {
    true
}

impl LlmCallConfig {
    pub async fn load(path: Option<PathBuf>) -> anyhow::Result<Self> {
        Ok(Self::load_with_path(path).await?.0)
    }

    pub async fn load_with_path(path: Option<PathBuf>) -> anyhow::Result<(Self, PathBuf)> {
        let path = path.unwrap_or_else(default_config_path);
        let mut cfg = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => toml::from_str::<LlmCallConfig>(&contents)
                .map_err(|e| anyhow::anyhow!("parse config {}: {e}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(config_path = %path.display(), "config file not found; using defaults");
                LlmCallConfig::default()
            }
            Err(e) => return Err(anyhow::anyhow!("read config {}: {e}", path.display())),
        };

        cfg.apply_env_overrides(|key| std::env::var(key).ok());
        cfg.validate()?;
        Ok((cfg, path))
    }

    fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("LLMCALL_BIND_ADDR") {
            if !v.trim().is_empty() {
                self.server.bind_addr = v.trim().to_string();
            }
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.bind_addr()?;
        if self.server.http_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("server.http_timeout_seconds must be > 0"));
        }
        if self.server.http_max_in_flight == 0 {
            return Err(anyhow::anyhow!("server.http_max_in_flight must be > 0"));
        }
        if self.llm.request_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("llm.request_timeout_seconds must be > 0"));
        }
        for (name, provider) in &self.providers {
            if let Some(url) = provider.base_url.as_deref() {
                let url = url.trim();
                if !url.is_empty() && !url.starts_with("http://") && !url.starts_with("https://") {
                    return Err(anyhow::anyhow!(
                        "providers.{name}.base_url must start with http:// or https://"
                    ));
                }
            }
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> anyhow::Result<SocketAddr> {
        self.server
            .bind_addr
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("server.bind_addr {:?}: {e}", self.server.bind_addr))
    }

    pub fn provider_enabled(&self, name: &str) -> bool {
        self.providers.get(name).is_none_or(|p| p.enabled)
    }

    /// Configured provider names that match no known adapter.
    pub fn unknown_providers(&self, known: &[String]) -> Vec<String> {
        let mut out = self
            .providers
            .keys()
            .filter(|name| !known.contains(name))
            .cloned()
            .collect::<Vec<_>>();
        out.sort();
        out
    }

    /// Process environment, with configured provider keys and base URLs filling the
    /// variables the environment leaves unset.
    pub fn server_env<I, K, V>(
        &self,
        process_env: I,
        providers: &[Arc<dyn ProviderAdapter>],
    ) -> ServerEnv
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut env = ServerEnv::from_vars(process_env);
        for provider in providers {
            let Some(cfg) = self.providers.get(provider.name()) else {
                continue;
            };
            if let Some(key) = cfg.api_key.as_deref() {
                env.insert_if_absent(provider.api_token_key(), key);
            }
            if let Some(url) = cfg.base_url.as_deref() {
                env.insert_if_absent(provider.base_url_key(), url);
            }
        }
        env
    }
}

pub fn default_config_path() -> PathBuf {
    if let Ok(v) = std::env::var("LLMCALL_CONFIG") {
        if !v.trim().is_empty() {
            return PathBuf::from(v);
        }
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    Path::new(&home).join(".llmcall").join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use llmcall_llm::{AnthropicProvider, OpenAiProvider};
    use uuid::Uuid;

    fn test_config() -> LlmCallConfig {
        toml::from_str(
            r#"
[server]
bind_addr = "0.0.0.0:8080"

[providers.OpenAI]
api_key = "sk-config"
base_url = "http://localhost:9999/v1"

[providers.Anthropic]
enabled = false
"#,
        )
        .expect("parse test config")
    }

    fn adapters() -> Vec<Arc<dyn ProviderAdapter>> {
        vec![
            Arc::new(OpenAiProvider::new(reqwest::Client::new())),
            Arc::new(AnthropicProvider::new(reqwest::Client::new())),
        ]
    }

    #[test]
    fn defaults_fill_missing_sections() {
        let cfg = test_config();
        cfg.validate().expect("valid");
        assert_eq!(cfg.server.http_timeout_seconds, 120);
        assert_eq!(cfg.llm.request_timeout_seconds, 60);
        assert_eq!(cfg.bind_addr().expect("addr").port(), 8080);
        assert!(cfg.provider_enabled("OpenAI"));
        assert!(!cfg.provider_enabled("Anthropic"));
        assert!(cfg.provider_enabled("Unconfigured"));
    }

    #[test]
    fn env_override_replaces_bind_addr() {
        let mut cfg = test_config();
        cfg.apply_env_overrides(|key| {
            (key == "LLMCALL_BIND_ADDR").then(|| "127.0.0.1:3000".to_string())
        });
        assert_eq!(cfg.server.bind_addr, "127.0.0.1:3000");
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut cfg = LlmCallConfig::default();
        cfg.server.bind_addr = "not an addr".to_string();
        assert!(cfg.validate().is_err());

        let mut cfg = LlmCallConfig::default();
        cfg.server.http_max_in_flight = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = test_config();
        if let Some(p) = cfg.providers.get_mut("OpenAI") {
            p.base_url = Some("ftp://nope".to_string());
        }
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn process_env_wins_over_config_keys() {
        let cfg = test_config();
        let env = cfg.server_env([("OPENAI_API_KEY", "sk-env")], &adapters());
        assert_eq!(env.get("OPENAI_API_KEY"), Some("sk-env"));
        assert_eq!(env.get("OPENAI_API_BASE_URL"), Some("http://localhost:9999/v1"));

        let env = cfg.server_env(Vec::<(String, String)>::new(), &adapters());
        assert_eq!(env.get("OPENAI_API_KEY"), Some("sk-config"));
        assert_eq!(env.get("ANTHROPIC_API_KEY"), None);
    }

    #[test]
    fn unknown_providers_are_reported() {
        let mut cfg = test_config();
        cfg.providers.insert(
            "Mistral".to_string(),
            ProviderConfig {
                api_key: None,
                base_url: None,
                enabled: true,
            },
        );
        let known = vec!["OpenAI".to_string(), "Anthropic".to_string()];
        assert_eq!(cfg.unknown_providers(&known), vec!["Mistral".to_string()]);
    }

    #[tokio::test]
    async fn missing_file_loads_defaults() {
        let path = std::env::temp_dir().join(format!("llmcall-missing-{}.toml", Uuid::new_v4()));
        let (cfg, loaded_from) = LlmCallConfig::load_with_path(Some(path.clone()))
            .await
            .expect("defaults");
        assert_eq!(loaded_from, path);
        assert_eq!(cfg.server.http_max_in_flight, 256);
    }

    #[tokio::test]
    async fn unparsable_file_is_an_error() {
        let path = std::env::temp_dir().join(format!("llmcall-bad-{}.toml", Uuid::new_v4()));
        tokio::fs::write(&path, "[server\nbind_addr = ")
            .await
            .expect("write temp config");
        let err = LlmCallConfig::load(Some(path.clone()))
            .await
            .expect_err("parse failure");
        assert!(err.to_string().contains("parse config"));
        let _ = tokio::fs::remove_file(&path).await;
    }
}
