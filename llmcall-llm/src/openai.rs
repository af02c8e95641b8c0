use crate::error::{LlmError, Result};
use crate::provider::{LanguageModel, ProviderAdapter, ProviderEndpoint, endpoint_or_warn};
use crate::types::{
    CallOptions, ChatMessage, Credentials, FinishReason, GenerateOutput, ModelInfo,
    ResponseMetadata, Role, Usage,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const OPENAI_PROVIDER_NAME: &str = "OpenAI";
const OPENAI_DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const OPENAI_DYNAMIC_MAX_TOKENS: u32 = 32000;

/// Generation defaults applied to every OpenAI handle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OpenAiModelSettings {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for OpenAiModelSettings {
    fn default() -> Self {
        Self {
            temperature: 1.2,
            max_tokens: 32000,
        }
    }
}

#[derive(Clone)]
pub struct OpenAiProvider {
    http: reqwest::Client,
    settings: OpenAiModelSettings,
}

impl OpenAiProvider {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            settings: OpenAiModelSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: OpenAiModelSettings) -> Self {
        self.settings = settings;
        self
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiProvider {
    fn name(&self) -> &str {
        OPENAI_PROVIDER_NAME
    }

    fn api_key_link(&self) -> &str {
        "https://platform.openai.com/api-keys"
    }

    fn api_token_key(&self) -> &str {
        "OPENAI_API_KEY"
    }

    fn base_url_key(&self) -> &str {
        "OPENAI_API_BASE_URL"
    }

    fn default_base_url(&self) -> &str {
        OPENAI_DEFAULT_BASE_URL
    }

    fn static_models(&self) -> Vec<ModelInfo> {
        [
            ("gpt-4o", "GPT-4o"),
            ("gpt-4o-mini", "GPT-4o Mini"),
            ("gpt-4-turbo", "GPT-4 Turbo"),
            ("gpt-4", "GPT-4"),
            ("gpt-3.5-turbo", "GPT-3.5 Turbo"),
        ]
        .into_iter()
        .map(|(name, label)| ModelInfo::new(name, label, OPENAI_PROVIDER_NAME, 8000))
        .collect()
    }

    #[tracing::instrument(level = "debug", skip_all)]
    async fn dynamic_models(&self, credentials: &Credentials) -> Result<Vec<ModelInfo>> {
        let endpoint = endpoint_or_warn(self, credentials);
        let url = format!("{}/models", endpoint.base_url);

        let mut req = self.http.get(&url);
        if let Some(key) = endpoint.api_key.as_deref() {
            req = req.bearer_auth(key);
        }
        let response = req.send().await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(LlmError::Http(format!(
                "openai models status={status} body={body}"
            )));
        }

        let parsed: OpenAiModelList = serde_json::from_str(&body)?;
        let models = parsed
            .data
            .into_iter()
            .filter(is_chat_model_entry)
            .map(|m| ModelInfo {
                label: m.id.clone(),
                provider: OPENAI_PROVIDER_NAME.to_string(),
                max_token_allowed: m.context_window.unwrap_or(OPENAI_DYNAMIC_MAX_TOKENS),
                name: m.id,
            })
            .collect::<Vec<_>>();
        tracing::debug!(count = models.len(), "openai dynamic models fetched");
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
        Ok(Box::new(OpenAiChatModel::new(
            self.http.clone(),
            endpoint,
            model,
            self.settings,
        )))
    }
}

fn is_chat_model_entry(m: &OpenAiModelEntry) -> bool {
    m.object == "model"
        && (m.id.starts_with("gpt-") || m.id.starts_with('o') || m.id.starts_with("chatgpt-"))
}

/// o-series reasoning models reject `temperature` and take `max_completion_tokens`.
fn is_reasoning_model(model: &str) -> bool {
    let mut chars = model.chars();
    chars.next() == Some('o') && chars.next().is_some_and(|c| c.is_ascii_digit())
}

#[derive(Debug, Deserialize)]
struct OpenAiModelList {
    #[serde(default)]
    data: Vec<OpenAiModelEntry>,
}

#[derive(Debug, Deserialize)]
struct OpenAiModelEntry {
    id: String,
    #[serde(default)]
    object: String,
    #[serde(default)]
    context_window: Option<u32>,
}

#[derive(Clone)]
pub struct OpenAiChatModel {
    http: reqwest::Client,
    endpoint: ProviderEndpoint,
    model: String,
    settings: OpenAiModelSettings,
}

impl OpenAiChatModel {
    pub fn new(
        http: reqwest::Client,
        endpoint: ProviderEndpoint,
        model: &str,
        settings: OpenAiModelSettings,
    ) -> Self {
        Self {
            http,
            endpoint,
            model: model.to_string(),
            settings,
        }
    }
}

#[async_trait]
impl LanguageModel for OpenAiChatModel {
    fn provider(&self) -> &str {
        OPENAI_PROVIDER_NAME
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    #[tracing::instrument(level = "info", skip_all, fields(model = %self.model))]
    async fn do_generate(&self, options: CallOptions) -> Result<GenerateOutput> {
        let (req, warnings) = OpenAiChatRequest::new(&self.model, &options, self.settings);
        let url = format!("{}/chat/completions", self.endpoint.base_url);

        let mut builder = self.http.post(&url).json(&req);
        if let Some(key) = self.endpoint.api_key.as_deref() {
            builder = builder.bearer_auth(key);
        }
        let response = builder.send().await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(LlmError::Http(format!(
                "openai chat status={status} body={body}"
            )));
        }

        let parsed: OpenAiChatResponse = serde_json::from_str(&body)?;
        let mut out = GenerateOutput::try_from(parsed)?;
        if out.response.model_id.is_empty() {
            out.response.model_id = self.model.clone();
        }
        out.warnings = warnings;
        Ok(out)
    }
}

#[derive(Debug, Serialize)]
struct OpenAiChatRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
}

impl OpenAiChatRequest {
    fn new(
        model: &str,
        options: &CallOptions,
        settings: OpenAiModelSettings,
    ) -> (Self, Vec<String>) {
        let mut warnings = Vec::new();
        let mut messages = Vec::with_capacity(options.messages.len() + 1);
        if let Some(system) = options.system.as_deref() {
            messages.push(OpenAiMessage {
                role: "system".to_string(),
                content: system.to_string(),
            });
        }
        messages.extend(options.messages.iter().map(to_openai_message));

        let max_tokens = options.max_tokens.unwrap_or(settings.max_tokens);
        let mut out = Self {
            model: model.to_string(),
            messages,
            temperature: Some(settings.temperature),
            max_tokens: Some(max_tokens),
            max_completion_tokens: None,
        };

        if is_reasoning_model(model) {
            out.temperature = None;
            out.max_tokens = None;
            out.max_completion_tokens = Some(max_tokens);
            warnings.push("temperature is not supported for reasoning models".to_string());
        }

        (out, warnings)
    }
}

#[derive(Debug, Serialize)]
struct OpenAiMessage {
    role: String,
    content: String,
}

fn to_openai_message(m: &ChatMessage) -> OpenAiMessage {
    let role = match m.role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    };
    OpenAiMessage {
        role: role.to_string(),
        content: m.content.clone(),
    }
}

#[derive(Debug, Deserialize)]
struct OpenAiChatResponse {
    #[serde(default)]
    id: String,
    #[serde(default)]
    model: String,
    #[serde(default)]
    created: Option<i64>,
    choices: Vec<OpenAiChoice>,
    #[serde(default)]
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

fn map_finish_reason(reason: Option<&str>) -> FinishReason {
    match reason {
        Some("stop") => FinishReason::Stop,
        Some("length") => FinishReason::Length,
        Some("content_filter") => FinishReason::ContentFilter,
        Some("tool_calls") | Some("function_call") => FinishReason::ToolCalls,
        Some(_) => FinishReason::Other,
        None => FinishReason::Unknown,
    }
}

impl TryFrom<OpenAiChatResponse> for GenerateOutput {
    type Error = LlmError;

    fn try_from(v: OpenAiChatResponse) -> Result<Self> {
        let choice = v.choices.into_iter().next().ok_or_else(|| {
            LlmError::ResponseFormat("openai response missing choices".to_string())
        })?;

        let usage = v.usage.map_or_else(Usage::default, |u| {
            Usage::new(u.prompt_tokens, u.completion_tokens)
        });
        let timestamp = v
            .created
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
            .unwrap_or_else(Utc::now);

        Ok(GenerateOutput {
            text: choice.message.content.unwrap_or_default(),
            finish_reason: map_finish_reason(choice.finish_reason.as_deref()),
            usage,
            response: ResponseMetadata {
                id: v.id,
                model_id: v.model,
                timestamp,
            },
            warnings: Vec::new(),
        })
    }
}
