pub mod health;
pub mod llmcall;
pub mod models;

use axum::Router;

pub fn router() -> Router {
    Router::new()
        .merge(health::router())
        .merge(models::router())
        .merge(llmcall::router())
}
