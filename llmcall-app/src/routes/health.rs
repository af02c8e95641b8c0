use crate::server::AppState;
use axum::routing::get;
use axum::{Extension, Json};
use chrono::Utc;
use std::sync::Arc;

pub fn router() -> axum::Router {
    axum::Router::new().route("/api/health", get(get_health))
}

#[tracing::instrument(level = "debug", skip_all)]
async fn get_health(Extension(state): Extension<Arc<AppState>>) -> Json<serde_json::Value> {
    let providers = state
        .registry
        .providers()
        .iter()
        .map(|p| {
            serde_json::json!({
                "name": p.name(),
                "api_key_link": p.api_key_link(),
                "server_key_configured": state.server_env.get(p.api_token_key()).is_some(),
            })
        })
        .collect::<Vec<_>>();

    Json(serde_json::json!({
        "status": "ok",
        "checked_at": Utc::now(),
        "providers": providers,
    }))
}
