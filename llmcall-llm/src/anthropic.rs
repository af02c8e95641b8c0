use crate::error::{LlmError, Result};
use crate::provider::{LanguageModel, ProviderAdapter, ProviderEndpoint, endpoint_or_warn};
use crate::types::{
    CallOptions, ChatMessage, Credentials, FinishReason, GenerateOutput, ModelInfo,
    ResponseMetadata, Role, Usage,
};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub const ANTHROPIC_PROVIDER_NAME: &str = "Anthropic";
const ANTHROPIC_DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const ANTHROPIC_DYNAMIC_MAX_TOKENS: u32 = 32000;
const ANTHROPIC_DEFAULT_MAX_TOKENS: u32 = 8192;

#[derive(Clone)]
pub struct AnthropicProvider {
    http: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    fn request(
        &self,
        method: reqwest::Method,
        url: &str,
        endpoint: &ProviderEndpoint,
    ) -> reqwest::RequestBuilder {
        authorize(self.http.request(method, url), endpoint)
    }
}

fn authorize(
    builder: reqwest::RequestBuilder,
    endpoint: &ProviderEndpoint,
) -> reqwest::RequestBuilder {
    let builder = builder.header("anthropic-version", ANTHROPIC_VERSION);
    match endpoint.api_key.as_deref() {
        Some(key) => builder.header("x-api-key", key),
        None => builder,
    }
}

#[async_trait]
impl ProviderAdapter for AnthropicProvider {
    fn name(&self) -> &str {
        ANTHROPIC_PROVIDER_NAME
    }

    fn api_key_link(&self) -> &str {
        "https://console.anthropic.com/settings/keys"
    }

    fn api_token_key(&self) -> &str {
        "ANTHROPIC_API_KEY"
    }

    fn base_url_key(&self) -> &str {
        "ANTHROPIC_API_BASE_URL"
    }

    fn default_base_url(&self) -> &str {
        ANTHROPIC_DEFAULT_BASE_URL
    }

    fn static_models(&self) -> Vec<ModelInfo> {
        [
            ("claude-3-5-sonnet-latest", "Claude 3.5 Sonnet (new)"),
            ("claude-3-5-sonnet-20240620", "Claude 3.5 Sonnet (old)"),
            ("claude-3-5-haiku-latest", "Claude 3.5 Haiku (new)"),
            ("claude-3-opus-latest", "Claude 3 Opus"),
            ("claude-3-sonnet-20240229", "Claude 3 Sonnet"),
            ("claude-3-haiku-20240307", "Claude 3 Haiku"),
        ]
        .into_iter()
        .map(|(name, label)| ModelInfo::new(name, label, ANTHROPIC_PROVIDER_NAME, 8000))
        .collect()
    }

    #[tracing::instrument(level = "debug", skip_all)]
    async fn dynamic_models(&self, credentials: &Credentials) -> Result<Vec<ModelInfo>> {
        let endpoint = endpoint_or_warn(self, credentials);
        let url = format!("{}/models", endpoint.base_url);

        let response = self
            .request(reqwest::Method::GET, &url, &endpoint)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(LlmError::Http(format!(
                "anthropic models status={status} body={body}"
            )));
        }

        let parsed: AnthropicModelList = serde_json::from_str(&body)?;
        let known: HashSet<String> = self.static_models().into_iter().map(|m| m.name).collect();
        let models = parsed
            .data
            .into_iter()
            .filter(|m| m.r#type == "model" && !known.contains(&m.id))
            .map(|m| ModelInfo {
                label: m.display_name.unwrap_or_else(|| m.id.clone()),
                provider: ANTHROPIC_PROVIDER_NAME.to_string(),
                max_token_allowed: ANTHROPIC_DYNAMIC_MAX_TOKENS,
                name: m.id,
            })
            .collect::<Vec<_>>();
        tracing::debug!(count = models.len(), "anthropic dynamic models fetched");
        Ok(models)
    }

    fn model_instance(
        &self,
        model: &str,
        credentials: &Credentials,
    ) -> Result<Box<dyn LanguageModel>> {
        if model.trim().is_empty() {
            return Err(LlmError::InvalidInput("model id is empty".to_string()));
        }
        let endpoint = endpoint_or_warn(self, credentials);
        Ok(Box::new(AnthropicChatModel {
            http: self.http.clone(),
            endpoint,
            model: model.to_string(),
        }))
    }
}

#[derive(Debug, Deserialize)]
struct AnthropicModelList {
    #[serde(default)]
    data: Vec<AnthropicModelEntry>,
}

#[derive(Debug, Deserialize)]
struct AnthropicModelEntry {
    id: String,
    #[serde(default)]
    r#type: String,
    #[serde(default)]
    display_name: Option<String>,
}

#[derive(Clone)]
pub struct AnthropicChatModel {
    http: reqwest::Client,
    endpoint: ProviderEndpoint,
    model: String,
}

#[async_trait]
impl LanguageModel for AnthropicChatModel {
    fn provider(&self) -> &str {
        ANTHROPIC_PROVIDER_NAME
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    #[tracing::instrument(level = "info", skip_all, fields(model = %self.model))]
    async fn do_generate(&self, options: CallOptions) -> Result<GenerateOutput> {
        let req = AnthropicRequest::new(&self.model, &options);
        let url = format!("{}/messages", self.endpoint.base_url);

        let response = authorize(self.http.post(&url), &self.endpoint)
            .json(&req)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(LlmError::Http(format!(
                "anthropic chat status={status} body={body}"
            )));
        }

        let parsed: AnthropicResponse = serde_json::from_str(&body)?;
        let mut out = GenerateOutput::from(parsed);
        if out.response.model_id.is_empty() {
            out.response.model_id = self.model.clone();
        }
        Ok(out)
    }
}

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "String::is_empty")]
    system: String,
    messages: Vec<AnthropicMessage>,
}

impl AnthropicRequest {
    fn new(model: &str, options: &CallOptions) -> Self {
        let mut system = options.system.clone().unwrap_or_default();
        let mut messages = Vec::with_capacity(options.messages.len());

        for m in &options.messages {
            match m.role {
                Role::System => {
                    if !system.is_empty() {
                        system.push('\n');
                    }
                    system.push_str(m.content.trim());
                }
                Role::User | Role::Assistant => messages.push(to_anthropic_message(m)),
            }
        }

        Self {
            model: model.to_string(),
            max_tokens: options.max_tokens.unwrap_or(ANTHROPIC_DEFAULT_MAX_TOKENS),
            system,
            messages,
        }
    }
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: Vec<AnthropicContentBlock>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicContentBlock {
    Text {
        text: String,
    },
    #[serde(other)]
    Unsupported,
}

fn to_anthropic_message(m: &ChatMessage) -> AnthropicMessage {
    let role = if m.role == Role::Assistant {
        "assistant"
    } else {
        "user"
    };
    AnthropicMessage {
        role: role.to_string(),
        content: vec![AnthropicContentBlock::Text {
            text: m.content.clone(),
        }],
    }
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    id: String,
    #[serde(default)]
    model: String,
    #[serde(default)]
    content: Vec<AnthropicContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: AnthropicUsage,
}

#[derive(Debug, Default, Deserialize)]
struct AnthropicUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

fn map_stop_reason(reason: Option<&str>) -> FinishReason {
    match reason {
        Some("end_turn") | Some("stop_sequence") => FinishReason::Stop,
        Some("max_tokens") => FinishReason::Length,
        Some("tool_use") => FinishReason::ToolCalls,
        Some(_) => FinishReason::Other,
        None => FinishReason::Unknown,
    }
}

impl From<AnthropicResponse> for GenerateOutput {
    fn from(v: AnthropicResponse) -> Self {
        let text = v
            .content
            .into_iter()
            .filter_map(|block| match block {
                AnthropicContentBlock::Text { text } => Some(text),
                AnthropicContentBlock::Unsupported => None,
            })
            .collect::<String>();

        GenerateOutput {
            text,
            finish_reason: map_stop_reason(v.stop_reason.as_deref()),
            usage: Usage::new(v.usage.input_tokens, v.usage.output_tokens),
            response: ResponseMetadata {
                id: v.id,
                model_id: v.model,
                timestamp: Utc::now(),
            },
            warnings: Vec::new(),
        }
    }
}
