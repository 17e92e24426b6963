use std::sync::LazyLock;

use rustc_hash::FxHashMap;

use crate::protocol::openai::{ChatMessage, ChatRole};

/// Backend model identifiers accepted by the Vertex deployment.
pub const SUPPORTED_MODELS: &[&str] = &[
    "claude-3-5-sonnet-v2@20241022",
    "claude-3-5-sonnet@20240620",
    "claude-3-opus@20240229",
    "claude-3-sonnet@20240229",
    "claude-3-haiku@20240307",
];

static MODEL_NAME_MAP: LazyLock<FxHashMap<&'static str, &'static str>> = LazyLock::new(|| {
    FxHashMap::from_iter([
        ("claude-3-5-sonnet-20241022", "claude-3-5-sonnet-v2@20241022"),
        ("claude-3-5-sonnet-20240620", "claude-3-5-sonnet@20240620"),
        ("claude-3-opus-20240229", "claude-3-opus@20240229"),
        ("claude-3-sonnet-20240229", "claude-3-sonnet@20240229"),
        ("claude-3-haiku-20240307", "claude-3-haiku@20240307"),
    ])
});

/// Translate a client-facing model name to its backend identifier.
/// Unknown names pass through literally and are caught by the allow-list.
#[must_use]
pub fn map_model_name(client_name: &str) -> &str {
    MODEL_NAME_MAP
        .get(client_name)
        .copied()
        .unwrap_or(client_name)
}

#[must_use]
pub fn is_supported_model(backend_name: &str) -> bool {
    SUPPORTED_MODELS.contains(&backend_name)
}

/// Translate a backend stop reason to the OpenAI `finish_reason` vocabulary.
/// Unrecognized values pass through unchanged.
#[must_use]
pub fn stop_reason_to_finish_reason(stop_reason: &str) -> String {
    match stop_reason {
        "end_turn" => "stop",
        "max_tokens" => "length",
        "stop_sequence" => "content_filter",
        "tool_use" => "tool_calls",
        other => other,
    }
    .to_string()
}

/// Render one message as a protocol-neutral prompt line for turn
/// consolidation.
///
/// `user`/`assistant` render as `"Human: …"` / `"Assistant: …"`; messages
/// annotated as example dialogue (via `name`) use the short `"H:"` / `"A:"`
/// labels; system content renders bare.
#[must_use]
pub fn render_prompt_line(message: &ChatMessage) -> String {
    match message.role {
        ChatRole::System => match message.name.as_deref() {
            Some(name) => match example_label(name) {
                Some(label) => format!("{label}: {}\n\n", message.content),
                None => format!("{}\n\n", message.content),
            },
            None => format!("{}\n\n", message.content),
        },
        ChatRole::User => format!("{}: {}\n\n", role_label(message), message.content),
        ChatRole::Assistant => format!("{}: {}\n\n", role_label(message), message.content),
    }
}

fn role_label(message: &ChatMessage) -> &'static str {
    if let Some(label) = message.name.as_deref().and_then(example_label) {
        return label;
    }
    match message.role {
        ChatRole::User => "Human",
        ChatRole::Assistant => "Assistant",
        ChatRole::System => "",
    }
}

fn example_label(name: &str) -> Option<&'static str> {
    match name {
        "example_user" => Some("H"),
        "example_assistant" => Some("A"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_map_translates_known_names() {
        assert_eq!(
            map_model_name("claude-3-haiku-20240307"),
            "claude-3-haiku@20240307"
        );
    }

    #[test]
    fn test_model_map_passes_unknown_through() {
        assert_eq!(map_model_name("gpt-4o"), "gpt-4o");
        assert!(!is_supported_model("gpt-4o"));
    }

    #[test]
    fn test_backend_names_are_supported_directly() {
        assert!(is_supported_model("claude-3-opus@20240229"));
    }

    #[test]
    fn test_stop_reason_table() {
        assert_eq!(stop_reason_to_finish_reason("end_turn"), "stop");
        assert_eq!(stop_reason_to_finish_reason("max_tokens"), "length");
        assert_eq!(
            stop_reason_to_finish_reason("stop_sequence"),
            "content_filter"
        );
        assert_eq!(stop_reason_to_finish_reason("tool_use"), "tool_calls");
        assert_eq!(stop_reason_to_finish_reason("weird"), "weird");
    }

    #[test]
    fn test_render_prompt_line_labels() {
        let user = ChatMessage::new(ChatRole::User, "hi");
        assert_eq!(render_prompt_line(&user), "Human: hi\n\n");

        let assistant = ChatMessage::new(ChatRole::Assistant, "hello");
        assert_eq!(render_prompt_line(&assistant), "Assistant: hello\n\n");

        let mut example = ChatMessage::new(ChatRole::User, "example");
        example.name = Some("example_user".into());
        assert_eq!(render_prompt_line(&example), "H: example\n\n");

        let system = ChatMessage::new(ChatRole::System, "be brief");
        assert_eq!(render_prompt_line(&system), "be brief\n\n");
    }
}
