use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Metadata for one callable model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    pub name: String,
    pub label: String,
    pub provider: String,
    pub max_token_allowed: u32,
}

impl ModelInfo {
    pub fn new(name: &str, label: &str, provider: &str, max_token_allowed: u32) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            provider: provider.to_string(),
            max_token_allowed,
        }
    }
}

/// Per-provider overrides supplied by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSetting {
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
}

/// Server-side environment consulted after caller-supplied credentials.
#[derive(Debug, Clone, Default)]
pub struct ServerEnv {
    vars: HashMap<String, String>,
}

impl ServerEnv {
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: vars
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Non-empty value for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        if key.is_empty() {
            return None;
        }
        self.vars
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// Insert `value` unless `key` already holds a non-empty value.
    pub fn insert_if_absent(&mut self, key: &str, value: &str) {
        if self.get(key).is_some() || value.trim().is_empty() {
            return;
        }
        self.vars.insert(key.to_string(), value.to_string());
    }
}

/// Everything an adapter may consult to reach its vendor for one request.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    /// Provider name -> API key, from the caller.
    pub api_keys: HashMap<String, String>,
    /// Provider name -> settings, from the caller.
    pub provider_settings: HashMap<String, ProviderSetting>,
    pub server_env: Arc<ServerEnv>,
}

impl Credentials {
    pub fn setting(&self, provider: &str) -> Option<&ProviderSetting> {
        self.provider_settings.get(provider)
    }

    pub fn provider_enabled(&self, provider: &str) -> bool {
        self.setting(provider)
            .and_then(|s| s.enabled)
            .unwrap_or(true)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolChoice {
    Auto,
    #[default]
    None,
    Required,
}

/// A single generation call as handed to a model handle.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    pub system: Option<String>,
    pub messages: Vec<ChatMessage>,
    /// Overrides the handle's default when set.
    pub max_tokens: Option<u32>,
    pub tool_choice: ToolChoice,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    ToolCalls,
    Error,
    Other,
    Unknown,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMetadata {
    pub id: String,
    pub model_id: String,
    pub timestamp: DateTime<Utc>,
}

/// What a model handle returns for one call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateOutput {
    pub text: String,
    pub finish_reason: FinishReason,
    pub usage: Usage,
    pub response: ResponseMetadata,
    #[serde(default)]
    pub warnings: Vec<String>,
}
