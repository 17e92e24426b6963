//! Prompt normalization: reconciles the OpenAI surface's "system messages
//! anywhere, any number of times" with the backend's "system is a single
//! string set once".

use smallvec::SmallVec;

use crate::config::{MergeConfig, SystemPlacement, TurnConsolidation};
use crate::observability::token_counter::estimate_tokens_for_len;
use crate::protocol::mapping::render_prompt_line;
use crate::protocol::openai::{ChatMessage, ChatRole};

/// Result of merging: the single backend system string (possibly empty,
/// which callers treat as "no system prompt") and the remaining non-system
/// messages in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    pub system_prompt: String,
    pub messages: Vec<ChatMessage>,
}

/// Merge a conversation according to the configured system placement and
/// turn consolidation policies. The input is never mutated.
#[must_use]
pub fn merge(messages: &[ChatMessage], config: &MergeConfig) -> MergeOutcome {
    let extracted = extract_system_prompt(messages, config);
    match config.turn_consolidation {
        TurnConsolidation::None => extracted,
        TurnConsolidation::All => MergeOutcome {
            system_prompt: extracted.system_prompt,
            messages: consolidate_turns(&extracted.messages, config),
        },
    }
}

// ---------------------------------------------------------------------------
// Step 1: system extraction
// ---------------------------------------------------------------------------

fn extract_system_prompt(messages: &[ChatMessage], config: &MergeConfig) -> MergeOutcome {
    let mut working: Vec<ChatMessage> = messages.to_vec();
    let separator = config.join_separator.as_str();

    let system_prompt = match config.system_placement {
        SystemPlacement::MergeAll => {
            let parts: SmallVec<[&str; 4]> = working
                .iter()
                .filter(|m| m.role == ChatRole::System)
                .map(|m| m.content.as_str())
                .collect();
            parts.join(separator)
        }
        SystemPlacement::MergeTopUser => {
            merge_top_with(&mut working, ChatRole::User, separator)
        }
        SystemPlacement::MergeTopAssistant => {
            merge_top_with(&mut working, ChatRole::Assistant, separator)
        }
        SystemPlacement::OnlyFirstUser => {
            only_first_with(&mut working, Some(ChatRole::User), separator)
        }
        SystemPlacement::OnlyFirstAssistant => {
            only_first_with(&mut working, Some(ChatRole::Assistant), separator)
        }
        SystemPlacement::OnlyFirstRemove => only_first_with(&mut working, None, separator),
    };

    working.retain(|m| m.role != ChatRole::System);
    MergeOutcome {
        system_prompt,
        messages: working,
    }
}

/// Index of the nearest message of `role` relative to `position`: backward
/// scan first, then forward. Computed over the order captured before any
/// content mutation.
fn nearest_of_role(messages: &[ChatMessage], position: usize, role: ChatRole) -> Option<usize> {
    messages[..position]
        .iter()
        .rposition(|m| m.role == role)
        .or_else(|| {
            messages[position + 1..]
                .iter()
                .position(|m| m.role == role)
                .map(|offset| position + 1 + offset)
        })
}

fn merge_top_with(working: &mut Vec<ChatMessage>, target: ChatRole, separator: &str) -> String {
    // Resolve attachment targets against the original order before any
    // content is appended.
    let attachments: SmallVec<[(usize, Option<usize>); 4]> = working
        .iter()
        .enumerate()
        .filter(|(_, m)| m.role == ChatRole::System)
        .map(|(index, _)| (index, nearest_of_role(working, index, target)))
        .collect();

    let mut in_top = true;
    let mut top_parts: SmallVec<[String; 4]> = SmallVec::new();
    for message in working.iter() {
        if message.role != ChatRole::System {
            in_top = false;
        } else if in_top {
            top_parts.push(message.content.clone());
        }
    }

    // Apply the deferred appends. Content of system messages with no
    // adjacent target on either side is silently dropped (known-lossy).
    for (sys_index, target_index) in attachments {
        if is_in_top_prefix(working, sys_index) {
            continue;
        }
        let Some(target_index) = target_index else {
            continue;
        };
        let suffix = format!("{separator}{}", working[sys_index].content);
        working[target_index].content.push_str(&suffix);
    }

    top_parts.join(separator)
}

fn is_in_top_prefix(messages: &[ChatMessage], index: usize) -> bool {
    messages[..index].iter().all(|m| m.role == ChatRole::System)
}

fn only_first_with(
    working: &mut Vec<ChatMessage>,
    trailing_role: Option<ChatRole>,
    separator: &str,
) -> String {
    let system_contents: Vec<String> = working
        .iter()
        .filter(|m| m.role == ChatRole::System)
        .map(|m| m.content.clone())
        .collect();

    let Some((first, rest)) = system_contents.split_first() else {
        // No system messages at all: empty system string, nothing synthetic.
        return String::new();
    };

    if let Some(role) = trailing_role {
        let suffix = rest.join(separator);
        if !suffix.is_empty() {
            working.push(ChatMessage::new(role, suffix));
        }
    }

    first.clone()
}

// ---------------------------------------------------------------------------
// Step 2: turn consolidation
// ---------------------------------------------------------------------------

/// Merge messages into synthetic user chunks targeting `max_chunk_tokens`.
///
/// The limit is targeted, not guaranteed: one message whose rendered form
/// alone exceeds the budget still becomes its own chunk, never split.
fn consolidate_turns(messages: &[ChatMessage], config: &MergeConfig) -> Vec<ChatMessage> {
    let separator = config.join_separator.as_str();
    let mut merged: Vec<ChatMessage> = Vec::new();
    let mut buffer = String::new();

    for message in messages {
        let line = render_prompt_line(message);
        if buffer.is_empty() {
            buffer = line;
            continue;
        }
        // Token length of buffer + separator + candidate, without building
        // the concatenation: the estimator is byte-length based.
        let combined_bytes = buffer.len() + separator.len() + line.len();
        if estimate_tokens_for_len(combined_bytes) <= config.max_chunk_tokens {
            buffer.push_str(separator);
            buffer.push_str(&line);
        } else {
            merged.push(ChatMessage::new(ChatRole::User, std::mem::take(&mut buffer)));
            buffer = line;
        }
    }

    if !buffer.is_empty() {
        merged.push(ChatMessage::new(ChatRole::User, buffer));
    }
    merged
}
