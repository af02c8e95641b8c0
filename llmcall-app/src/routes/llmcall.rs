use crate::cookies::credentials_from_headers;
use crate::server::AppState;
use axum::body::Bytes;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Extension, Json};
use llmcall_llm::{
    ChatMessage, Credentials, GenerateTextOptions, GenerateTextResult, LlmError, MAX_TOKENS,
    ToolChoice, generate_text,
};
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LlmCallRequest {
    #[serde(default)]
    system: Option<String>,
    #[serde(default)]
    message: Option<String>,
    /// Kept untyped so a non-string value is reported as a missing model.
    #[serde(default)]
    model: serde_json::Value,
    #[serde(default)]
    provider: serde_json::Value,
    #[serde(default)]
    stream_output: Option<bool>,
}

#[derive(Debug, Error)]
pub enum LlmCallError {
    #[error("Model not found")]
    ModelNotFound,

    #[error("Provider not found")]
    ProviderNotFound,

    #[error(transparent)]
    Llm(#[from] LlmError),
}

impl LlmCallError {
    /// Vendors report key problems only in their message text, so classification
    /// matches on it.
    pub fn is_api_key_error(&self) -> bool {
        self.to_string().contains("API key")
    }

    pub fn status_code(&self) -> StatusCode {
        if self.is_api_key_error() {
            StatusCode::UNAUTHORIZED
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for LlmCallError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = if status == StatusCode::UNAUTHORIZED {
            "Invalid or missing API key"
        } else {
            "Internal Server Error"
        };
        (status, body).into_response()
    }
}

pub fn router() -> axum::Router {
    axum::Router::new().route("/api/llmcall", post(llm_call))
}

#[tracing::instrument(level = "info", skip_all)]
async fn llm_call(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let req: LlmCallRequest = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, "llmcall body rejected");
            return (StatusCode::BAD_REQUEST, "Invalid request body").into_response();
        }
    };

    let Some(model) = non_empty_str(&req.model) else {
        return (StatusCode::BAD_REQUEST, "Invalid or missing model").into_response();
    };
    let Some(provider_name) = req.provider.get("name").and_then(non_empty_str) else {
        return (StatusCode::BAD_REQUEST, "Invalid or missing provider").into_response();
    };

    let credentials = credentials_from_headers(&headers, state.server_env.clone());
    let prompt = Prompt {
        system: req.system,
        message: req.message.unwrap_or_default(),
        stream_output: req.stream_output.unwrap_or(false),
    };

    match run(&state, credentials, model, provider_name, prompt).await {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(e) => {
            tracing::error!(
                error = %e,
                model,
                provider = provider_name,
                status = e.status_code().as_u16(),
                "llmcall failed"
            );
            e.into_response()
        }
    }
}

struct Prompt {
    system: Option<String>,
    message: String,
    stream_output: bool,
}

async fn run(
    state: &AppState,
    credentials: Credentials,
    model: &str,
    provider_name: &str,
    prompt: Prompt,
) -> Result<GenerateTextResult, LlmCallError> {
    let models = state.registry.model_list(&credentials).await;
    let model_details = models
        .into_iter()
        .find(|m| m.name == model)
        .ok_or(LlmCallError::ModelNotFound)?;

    let max_tokens = match model_details.max_token_allowed {
        0 => MAX_TOKENS,
        n => n,
    };
    let provider = state
        .registry
        .find(provider_name)
        .ok_or(LlmCallError::ProviderNotFound)?;

    if prompt.stream_output {
        tracing::debug!("streamOutput requested; answering with a single response");
    }
    tracing::info!(
        provider = provider.name(),
        model = %model_details.name,
        max_tokens,
        "generating response"
    );

    let handle = provider.model_instance(&model_details.name, &credentials)?;
    let result = generate_text(
        handle.as_ref(),
        GenerateTextOptions {
            system: prompt.system,
            messages: vec![ChatMessage::user(prompt.message)],
            max_tokens: Some(max_tokens),
            tool_choice: ToolChoice::None,
        },
    )
    .await?;

    tracing::info!("generated response");
    Ok(result)
}

fn non_empty_str(v: &serde_json::Value) -> Option<&str> {
    v.as_str().filter(|s| !s.is_empty())
}
