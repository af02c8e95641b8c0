//! llmcall HTTP server.
//!
//! Builds the provider registry once and mounts the routes behind the tracing, timeout
//! and concurrency layers.

use crate::config::LlmCallConfig;
use crate::routes;
use anyhow::Result;
use axum::Extension;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::response::Response;
use llmcall_llm::{Credentials, ProviderAdapter, ProviderRegistry, ServerEnv};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::classify::ServerErrorsFailureClass;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

pub struct AppState {
    pub registry: ProviderRegistry,
    pub server_env: Arc<ServerEnv>,
}

impl AppState {
    pub fn from_config(cfg: &LlmCallConfig) -> Result<Self> {
        let http = build_http_client(cfg)?;
        let providers = ProviderRegistry::with_default_providers(http)
            .providers()
            .iter()
            .filter(|p| {
                let enabled = cfg.provider_enabled(p.name());
                if !enabled {
                    tracing::info!(provider = p.name(), "provider disabled by config");
                }
                enabled
            })
            .cloned()
            .collect::<Vec<Arc<dyn ProviderAdapter>>>();
        let server_env = cfg.server_env(std::env::vars(), &providers);
        Ok(Self {
            registry: ProviderRegistry::new(providers),
            server_env: Arc::new(server_env),
        })
    }

    /// Credentials for server-side use, without any caller cookies.
    pub fn server_credentials(&self) -> Credentials {
        Credentials {
            server_env: self.server_env.clone(),
            ..Default::default()
        }
    }
}

fn build_http_client(cfg: &LlmCallConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(cfg.llm.request_timeout_seconds))
        .build()
        .map_err(|e| anyhow::anyhow!("build vendor http client: {e}"))
}

pub async fn doctor(config_path: Option<PathBuf>) -> Result<()> {
    let (cfg, path) = LlmCallConfig::load_with_path(config_path).await?;
    let state = AppState::from_config(&cfg)?;
    let known = ProviderRegistry::with_default_providers(reqwest::Client::new()).names();
    for name in cfg.unknown_providers(&known) {
        tracing::warn!(provider = %name, known = ?known, "config names an unknown provider");
    }
    for provider in state.registry.providers() {
        let endpoint = provider.endpoint(&state.server_credentials());
        tracing::info!(
            provider = provider.name(),
            base_url = %endpoint.base_url,
            server_key_configured = endpoint.api_key.is_some(),
            api_key_link = provider.api_key_link(),
            "provider resolved"
        );
    }
    tracing::info!(
        bind_addr = %cfg.bind_addr()?,
        providers = ?state.registry.names(),
        config_path = %path.display(),
        "config ok"
    );
    Ok(())
}

pub async fn print_models(config_path: Option<PathBuf>) -> Result<()> {
    let cfg = LlmCallConfig::load(config_path).await?;
    let state = AppState::from_config(&cfg)?;
    let models = state.registry.model_list(&state.server_credentials()).await;
    println!("{}", serde_json::to_string_pretty(&models)?);
    Ok(())
}

pub fn build_app(cfg: &LlmCallConfig, state: Arc<AppState>) -> axum::Router {
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|request: &Request<_>| {
            tracing::info_span!(
                "http.request",
                method = %request.method(),
                uri = %request.uri(),
                version = ?request.version(),
                request_id = %request_id_from_headers(request.headers())
            )
        })
        .on_request(|request: &Request<_>, _span: &tracing::Span| {
            tracing::info!(
                method = %request.method(),
                uri = %request.uri(),
                request_id = %request_id_from_headers(request.headers()),
                "http request started"
            );
        })
        .on_response(
            |response: &Response, latency: Duration, _span: &tracing::Span| {
                tracing::info!(
                    status = response.status().as_u16(),
                    latency_ms = latency.as_millis() as u64,
                    "http request completed"
                );
            },
        )
        .on_failure(
            |error: ServerErrorsFailureClass, latency: Duration, _span: &tracing::Span| {
                tracing::error!(
                    error_class = %error,
                    latency_ms = latency.as_millis() as u64,
                    "http request failed"
                );
            },
        );

    routes::router()
        .layer(Extension(state))
        .layer(GlobalConcurrencyLimitLayer::new(
            cfg.server.http_max_in_flight,
        ))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(cfg.server.http_timeout_seconds),
        ))
        .layer(trace_layer)
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

pub async fn serve(config_path: Option<PathBuf>) -> Result<()> {
    let (cfg, cfg_path) = LlmCallConfig::load_with_path(config_path).await?;
    let addr = cfg.bind_addr()?;
    let state = Arc::new(AppState::from_config(&cfg)?);
    tracing::info!(
        bind_addr = %addr,
        config_path = %cfg_path.display(),
        http_timeout_seconds = cfg.server.http_timeout_seconds,
        http_max_in_flight = cfg.server.http_max_in_flight,
        llm_request_timeout_seconds = cfg.llm.request_timeout_seconds,
        providers = ?state.registry.names(),
        "server configuration loaded"
    );
    let listener = preflight_bind_listener(addr).await?;

    let app = build_app(&cfg, state);

    tracing::info!(%addr, "llmcall serving");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("http server shutdown completed");
    Ok(())
}

async fn preflight_bind_listener(addr: SocketAddr) -> Result<tokio::net::TcpListener> {
    tracing::info!(%addr, "preflight bind check starting");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| anyhow::anyhow!("preflight bind failed for {addr}: {e}"))?;
    tracing::info!(%addr, "preflight bind check passed");
    Ok(listener)
}

fn request_id_from_headers(headers: &HeaderMap) -> String {
    headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
        .unwrap_or_else(|| "missing".to_string())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut terminate = match signal(SignalKind::terminate()) {
            Ok(sig) => sig,
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler; falling back to ctrl_c only");
                if let Err(ctrlc_err) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %ctrlc_err, "failed to await ctrl-c signal");
                }
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("received ctrl-c; beginning graceful shutdown");
            }
            _ = terminate.recv() => {
                tracing::warn!("received SIGTERM; beginning graceful shutdown");
            }
        }
    }
    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to await ctrl-c signal");
        } else {
            tracing::warn!("received ctrl-c; beginning graceful shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use tower::util::ServiceExt;

    #[tokio::test]
    async fn app_sets_and_propagates_request_id() {
        let cfg = LlmCallConfig::default();
        let state = Arc::new(AppState::from_config(&cfg).expect("state"));
        let response = build_app(&cfg, state)
            .oneshot(
                Request::builder()
                    .uri("/api/health")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get("x-request-id").is_some());
    }

    #[test]
    fn disabled_config_provider_is_not_registered() {
        let cfg: LlmCallConfig = toml::from_str(
            r#"
[providers.Anthropic]
enabled = false
"#,
        )
        .expect("parse");
        let state = AppState::from_config(&cfg).expect("state");
        assert_eq!(state.registry.names(), vec!["OpenAI".to_string()]);
    }

    #[test]
    fn request_id_falls_back_to_missing() {
        assert_eq!(request_id_from_headers(&HeaderMap::new()), "missing");
    }
}
