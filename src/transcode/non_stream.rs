use crate::protocol::anthropic::{ContentBlock, MessagesResponse};
use crate::protocol::mapping::stop_reason_to_finish_reason;
use crate::protocol::openai::{
    AssistantMessage, ChatCompletion, CompletionChoice, Usage,
};

/// Translate a non-streaming backend result into a `chat.completion` body.
///
/// Each backend content block maps to one choice at its original index.
/// Non-text blocks (tool invocations and the like) render as empty text;
/// this bridge declares no support for them. A missing stop reason defaults
/// to `"stop"`.
#[must_use]
pub fn transcode_completion(
    result: &MessagesResponse,
    created: u64,
    system_fingerprint: &str,
) -> ChatCompletion {
    let finish_reason = stop_reason_to_finish_reason(result.stop_reason.as_deref().unwrap_or("stop"));

    let choices = result
        .content
        .iter()
        .enumerate()
        .map(|(index, block)| {
            let content = match block {
                ContentBlock::Text { text } => text.clone(),
                ContentBlock::Unsupported => String::new(),
            };
            CompletionChoice {
                index: index as u32,
                message: AssistantMessage {
                    role: "assistant",
                    content,
                },
                logprobs: None,
                finish_reason: finish_reason.clone(),
            }
        })
        .collect();

    ChatCompletion {
        id: result.id.clone(),
        object: "chat.completion",
        created,
        model: result.model.clone(),
        system_fingerprint: system_fingerprint.to_string(),
        choices,
        usage: Usage {
            prompt_tokens: result.usage.input_tokens,
            completion_tokens: result.usage.output_tokens,
            total_tokens: result.usage.input_tokens + result.usage.output_tokens,
        },
    }
}
