use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use http::{HeaderMap, StatusCode};
use uuid::Uuid;

use crate::error::BridgeError;
use crate::normalize::NormalizedPayload;
use crate::observability::token_counter::{estimate_request_tokens, log_request_usage};
use crate::protocol::openai::ChatCompletionRequest;
use crate::state::AppState;
use crate::transcode::{
    transcode_completion, transcode_event_stream, CancelFlag, FrameStream, StreamTranscoder,
};

/// `POST /v1/chat/completions`.
///
/// Body extraction is handled inside so a malformed body (invalid JSON,
/// `messages` not an array) gets the same 400 `{message, code}` shape as
/// every other validation failure instead of axum's default 422 rejection.
pub async fn handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    request: Result<Json<ChatCompletionRequest>, JsonRejection>,
) -> Response {
    let request_id = Uuid::new_v4();
    if let Err(err) = state.authenticate(&headers) {
        tracing::warn!(%request_id, "authentication failed: {err}");
        return err.into_response();
    }

    let Json(request) = match request {
        Ok(json) => json,
        Err(rejection) => {
            let err = BridgeError::invalid("invalid_request_body", rejection.body_text());
            tracing::debug!(%request_id, "request rejected: {err}");
            return err.into_response();
        }
    };

    let payload = match state.normalizer.normalize(request) {
        Ok(payload) => payload,
        Err(err) => {
            tracing::debug!(%request_id, "request rejected: {err}");
            return err.into_response();
        }
    };

    tracing::debug!(
        %request_id,
        model = %payload.model,
        stream = payload.stream,
        prompt_tokens_est = estimate_request_tokens(&payload.body),
        "dispatching"
    );
    if payload.stream {
        stream_completion(&state, payload).await
    } else {
        complete_once(&state, payload).await
    }
}

async fn complete_once(state: &AppState, payload: NormalizedPayload) -> Response {
    let start = Instant::now();
    let result = match state
        .backend
        .create_message(&payload.model, &payload.body)
        .await
    {
        Ok(result) => result,
        Err(err) => {
            tracing::error!(model = %payload.model, "backend call failed: {err}");
            return err.into_response();
        }
    };

    let completion = transcode_completion(&result, payload.created, &state.system_fingerprint);
    log_request_usage(
        &completion.model,
        completion.usage.prompt_tokens,
        completion.usage.completion_tokens,
        start.elapsed(),
    );
    Json(completion).into_response()
}

async fn stream_completion(state: &AppState, payload: NormalizedPayload) -> Response {
    let events = match state
        .backend
        .stream_message(&payload.model, &payload.body)
        .await
    {
        Ok(events) => events,
        Err(err) => {
            tracing::error!(model = %payload.model, "backend stream setup failed: {err}");
            return err.into_response();
        }
    };

    let transcoder = StreamTranscoder::new(&payload.model, payload.created, &state.system_fingerprint);
    // FrameStream trips the flag when axum drops the body on client
    // disconnect; dropping the pump also aborts the upstream call.
    let cancel = CancelFlag::new();
    let frames = FrameStream::new(
        transcode_event_stream(events, transcoder, cancel.clone()),
        cancel,
    );

    match Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "text/event-stream")
        .header("Cache-Control", "no-cache")
        .header("Connection", "keep-alive")
        .header("Access-Control-Allow-Origin", "*")
        .body(Body::from_stream(frames))
    {
        Ok(response) => response,
        Err(err) => BridgeError::Internal(format!("failed to build stream response: {err}"))
            .into_response(),
    }
}
