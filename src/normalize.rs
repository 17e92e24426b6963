//! Inbound request validation and normalization: protocol A request in,
//! backend-ready Messages payload out.

use crate::config::{AppConfig, EnsureFirstMode, MergeConfig};
use crate::error::BridgeError;
use crate::merge::merge;
use crate::protocol::anthropic::{MessagesRequest, TurnMessage, TurnRole, ANTHROPIC_VERSION};
use crate::protocol::mapping::{is_supported_model, map_model_name};
use crate::protocol::openai::{ChatCompletionRequest, ChatMessage, ChatRole, StopField};
use crate::util::unix_now_secs;

// Backend-imposed hard limits, not client-configurable.
const MAX_TOKENS_DEFAULT: u64 = 512;
const MAX_TOKENS_CEILING: u64 = 4096;
const TEMPERATURE_DEFAULT: f64 = 0.75;
const TOP_P_DEFAULT: f64 = 1.0;

/// The backend-ready request: validated, merged, first turn guaranteed to be
/// a user turn and free of system-role entries.
#[derive(Debug, Clone)]
pub struct NormalizedPayload {
    /// Backend model identifier (addressed in the Vertex URL).
    pub model: String,
    /// Stamped before the backend call so response construction echoes a
    /// stable timestamp.
    pub created: u64,
    pub stream: bool,
    pub body: MessagesRequest,
}

/// Validates inbound requests and produces [`NormalizedPayload`]s.
/// Holds its configuration explicitly; no ambient global reads.
#[derive(Debug, Clone)]
pub struct RequestNormalizer {
    merge_config: MergeConfig,
    ensure_first_mode: EnsureFirstMode,
}

impl RequestNormalizer {
    #[must_use]
    pub fn new(config: &AppConfig) -> Self {
        Self {
            merge_config: config.merge.clone(),
            ensure_first_mode: config.ensure_first_mode,
        }
    }

    #[must_use]
    pub fn with_parts(merge_config: MergeConfig, ensure_first_mode: EnsureFirstMode) -> Self {
        Self {
            merge_config,
            ensure_first_mode,
        }
    }

    /// Validate and normalize one inbound request.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::InvalidRequest` with a stable code
    /// (`model_not_supported`, `invalid_temperature`, `invalid_top_p`,
    /// `invalid_max_tokens`, `messages_empty`) before any backend call.
    pub fn normalize(
        &self,
        request: ChatCompletionRequest,
    ) -> Result<NormalizedPayload, BridgeError> {
        let created = unix_now_secs();

        let model = map_model_name(&request.model).to_string();
        if !is_supported_model(&model) {
            return Err(BridgeError::invalid(
                "model_not_supported",
                format!("model {model} is not supported"),
            ));
        }

        let temperature = request.temperature.unwrap_or(TEMPERATURE_DEFAULT);
        if !(0.0..=1.0).contains(&temperature) {
            return Err(BridgeError::invalid(
                "invalid_temperature",
                "temperature should be between 0 and 1",
            ));
        }
        let top_p = request.top_p.unwrap_or(TOP_P_DEFAULT);
        if !(0.0..=1.0).contains(&top_p) {
            return Err(BridgeError::invalid(
                "invalid_top_p",
                "top_p should be between 0 and 1",
            ));
        }
        let max_tokens = request.max_tokens.unwrap_or(MAX_TOKENS_DEFAULT);
        if max_tokens < 1 {
            return Err(BridgeError::invalid(
                "invalid_max_tokens",
                "max_tokens should be greater than 0",
            ));
        }
        if max_tokens > MAX_TOKENS_CEILING {
            return Err(BridgeError::invalid(
                "invalid_max_tokens",
                format!("max_tokens should be less than {MAX_TOKENS_CEILING}"),
            ));
        }

        let outcome = merge(&request.messages, &self.merge_config);
        let messages = self.ensure_first_message_is_user(outcome.messages)?;

        let system = if outcome.system_prompt.is_empty() {
            None
        } else {
            Some(outcome.system_prompt)
        };

        Ok(NormalizedPayload {
            model,
            created,
            stream: request.stream.unwrap_or(false),
            body: MessagesRequest {
                anthropic_version: ANTHROPIC_VERSION.to_string(),
                system,
                messages,
                max_tokens,
                temperature,
                top_p,
                stop_sequences: request.stop.map(StopField::into_sequences),
                stream: None,
            },
        })
    }

    /// Enforce the invariant that the merged list begins with a user turn,
    /// applying the configured recovery strategy.
    fn ensure_first_message_is_user(
        &self,
        mut messages: Vec<ChatMessage>,
    ) -> Result<Vec<TurnMessage>, BridgeError> {
        let starts_with_user = matches!(messages.first(), Some(m) if m.role == ChatRole::User);
        if !starts_with_user {
            match self.ensure_first_mode {
                EnsureFirstMode::Remove => {
                    let first_user = messages.iter().position(|m| m.role == ChatRole::User);
                    match first_user {
                        Some(index) => {
                            messages.drain(..index);
                        }
                        None => messages.clear(),
                    }
                }
                EnsureFirstMode::Continue => {
                    messages.insert(0, ChatMessage::new(ChatRole::User, "continue"));
                }
            }
        }

        if messages.is_empty() {
            return Err(BridgeError::invalid(
                "messages_empty",
                "messages should contain at least one user message",
            ));
        }

        // Defensive: the merger already removed system entries.
        Ok(messages
            .into_iter()
            .filter_map(|m| {
                let role = match m.role {
                    ChatRole::User => TurnRole::User,
                    ChatRole::Assistant => TurnRole::Assistant,
                    ChatRole::System => return None,
                };
                Some(TurnMessage {
                    role,
                    content: m.content,
                })
            })
            .collect())
    }
}
