use std::time::Duration;

use tracing::info;

use crate::protocol::anthropic::MessagesRequest;

/// Estimate the number of tokens in `text`.
///
/// Uses a lightweight heuristic (`bytes / 4`) instead of loading the model's
/// BPE tables; turn consolidation only needs the budget to be targeted, not
/// exact.
#[must_use]
pub fn estimate_tokens(text: &str) -> usize {
    estimate_tokens_for_len(text.len())
}

/// Byte-length variant of [`estimate_tokens`], for callers that can add up
/// lengths without building the concatenated string.
#[must_use]
pub fn estimate_tokens_for_len(byte_len: usize) -> usize {
    byte_len.div_ceil(4)
}

/// Estimate the total input tokens of a normalized backend request: system
/// prompt plus every turn's content. A pre-flight estimate only; the backend
/// reports authoritative counts in its usage blocks.
#[must_use]
pub fn estimate_request_tokens(request: &MessagesRequest) -> usize {
    let mut total = 0;
    if let Some(system) = &request.system {
        total += estimate_tokens(system);
    }
    for message in &request.messages {
        total += estimate_tokens(&message.content);
    }
    total
}

/// Log token usage for a completed request at INFO level.
pub fn log_request_usage(
    model: &str,
    prompt_tokens: u64,
    completion_tokens: u64,
    duration: Duration,
) {
    info!(
        model = model,
        prompt_tokens,
        completion_tokens,
        total_tokens = prompt_tokens + completion_tokens,
        duration_seconds = duration.as_secs_f64(),
        "request completed"
    );
}
