use crate::cookies::credentials_from_headers;
use crate::server::AppState;
use axum::http::HeaderMap;
use axum::routing::get;
use axum::{Extension, Json};
use llmcall_llm::ModelInfo;
use std::sync::Arc;

pub fn router() -> axum::Router {
    axum::Router::new().route("/api/models", get(list_models))
}

/// Every model visible with the caller's cookies.
#[tracing::instrument(level = "debug", skip_all)]
async fn list_models(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
) -> Json<Vec<ModelInfo>> {
    let credentials = credentials_from_headers(&headers, state.server_env.clone());
    let models = state.registry.model_list(&credentials).await;
    tracing::debug!(count = models.len(), "model list resolved");
    Json(models)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::header::COOKIE;
    use axum::http::{Request, StatusCode};
    use llmcall_llm::{AnthropicProvider, OpenAiProvider, ProviderRegistry, ServerEnv};
    use serde_json::json;
    use tower::util::ServiceExt;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn lists_static_and_dynamic_models_for_enabled_providers() {
        let vendor = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/models"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{ "id": "gpt-4.1", "object": "model", "context_window": 1000000 }]
            })))
            .mount(&vendor)
            .await;

        let http = reqwest::Client::new();
        let state = Arc::new(AppState {
            registry: ProviderRegistry::new(vec![
                Arc::new(OpenAiProvider::new(http.clone())),
                Arc::new(AnthropicProvider::new(http)),
            ]),
            server_env: Arc::new(ServerEnv::from_vars([(
                "OPENAI_API_BASE_URL",
                vendor.uri(),
            )])),
        });

        let request = Request::builder()
            .uri("/api/models")
            .header(COOKIE, "providers=%7B%22Anthropic%22%3A%7B%22enabled%22%3Afalse%7D%7D")
            .body(Body::empty())
            .expect("request");
        let response = router()
            .layer(Extension(state))
            .oneshot(request)
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let models: Vec<ModelInfo> = serde_json::from_slice(&body).expect("json");
        assert!(models.iter().all(|m| m.provider == "OpenAI"));
        assert!(models.iter().any(|m| m.name == "gpt-4o"));
        let dynamic = models
            .iter()
            .find(|m| m.name == "gpt-4.1")
            .expect("dynamic model listed");
        assert_eq!(dynamic.max_token_allowed, 1_000_000);
    }
}
