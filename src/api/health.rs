use std::sync::Arc;

use axum::extract::State;
use axum::response::Json;
use serde_json::{json, Value};

use crate::state::AppState;

/// Health check handler. Returns JSON with status and a non-secret config
/// summary.
pub async fn handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let config = &state.config;
    Json(json!({
        "status": "vertex-bridge is running",
        "config": {
            "region": config.vertex.region,
            "auth_enabled": !config.private_key.is_empty(),
            "system_merge_mode": config.merge.system_placement,
            "prompt_merge_mode": config.merge.turn_consolidation,
            "ensure_first_mode": config.ensure_first_mode,
            "max_chunk_tokens": config.merge.max_chunk_tokens,
        }
    }))
}
