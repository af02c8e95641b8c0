use crate::error::{LlmError, Result};
use crate::provider::LanguageModel;
use crate::types::{
    CallOptions, ChatMessage, FinishReason, GenerateOutput, ResponseMetadata, ToolChoice, Usage,
};
use serde::{Deserialize, Serialize};

/// Budget used when a model carries no token limit of its own.
pub const MAX_TOKENS: u32 = 8000;

#[derive(Debug, Clone, Default)]
pub struct GenerateTextOptions {
    pub system: Option<String>,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: Option<u32>,
    pub tool_choice: ToolChoice,
}

/// Result returned to HTTP callers as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateTextResult {
    pub text: String,
    pub finish_reason: FinishReason,
    pub usage: Usage,
    pub response: ResponseMetadata,
    pub warnings: Vec<String>,
}

impl From<GenerateOutput> for GenerateTextResult {
    fn from(out: GenerateOutput) -> Self {
        Self {
            text: out.text,
            finish_reason: out.finish_reason,
            usage: out.usage,
            response: out.response,
            warnings: out.warnings,
        }
    }
}

/// Run one non-streaming generation against `model`.
#[tracing::instrument(level = "info", skip_all, fields(provider = model.provider(), model = model.model_id()))]
pub async fn generate_text(
    model: &dyn LanguageModel,
    options: GenerateTextOptions,
) -> Result<GenerateTextResult> {
    if options.messages.is_empty() {
        return Err(LlmError::InvalidInput(
            "at least one message is required".to_string(),
        ));
    }

    let mut warnings = Vec::new();
    if options.tool_choice != ToolChoice::None {
        warnings.push(format!(
            "tool_choice={:?} ignored: no tools are available",
            options.tool_choice
        ));
    }

    let call = CallOptions {
        system: options.system.filter(|s| !s.trim().is_empty()),
        messages: options.messages,
        max_tokens: options.max_tokens,
        tool_choice: ToolChoice::None,
    };
    tracing::debug!(
        messages = call.messages.len(),
        max_tokens = ?call.max_tokens,
        has_system = call.system.is_some(),
        "dispatching generation"
    );

    let mut out = model.do_generate(call).await?;
    if out.response.id.is_empty() {
        out.response.id = format!("gen-{}", uuid::Uuid::new_v4());
    }
    out.warnings.extend(warnings);

    tracing::info!(
        finish_reason = ?out.finish_reason,
        prompt_tokens = out.usage.prompt_tokens,
        completion_tokens = out.usage.completion_tokens,
        "generation completed"
    );
    Ok(out.into())
}
