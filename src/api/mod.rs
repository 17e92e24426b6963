pub mod chat;
pub mod health;
pub mod models;

use std::sync::Arc;

use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use http::StatusCode;

use crate::state::AppState;

/// Build the application router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            "/v1/chat/completions",
            post(chat::handler).options(preflight),
        )
        .route("/v1/models", get(models::handler).options(preflight))
        .route("/health", get(health::handler))
        .with_state(state)
}

/// CORS preflight response shared by both endpoints.
async fn preflight() -> Response {
    (
        StatusCode::OK,
        [
            ("Access-Control-Allow-Origin", "*"),
            ("Access-Control-Allow-Methods", "*"),
            ("Access-Control-Allow-Headers", "*"),
            ("Access-Control-Max-Age", "86400"),
        ],
    )
        .into_response()
}
