use std::sync::Arc;

use axum::extract::State;
use axum::response::Json;
use serde_json::{json, Value};

use crate::protocol::mapping::SUPPORTED_MODELS;
use crate::state::AppState;

/// `GET /v1/models`: the allow-list in OpenAI model-list format.
pub async fn handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let data: Vec<Value> = SUPPORTED_MODELS
        .iter()
        .map(|id| {
            json!({
                "id": id,
                "object": "model",
                "created": state.started_at,
                "owned_by": "default",
            })
        })
        .collect();

    Json(json!({
        "object": "list",
        "data": data,
    }))
}
