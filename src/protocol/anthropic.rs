use serde::{Deserialize, Serialize};

/// API version stamp Vertex expects in place of a `model` field in the body.
pub const ANTHROPIC_VERSION: &str = "vertex-2023-10-16";

/// Role of a backend conversation turn. The backend has no inline system
/// role; the system prompt travels in its own top-level field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

/// One backend conversation turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnMessage {
    pub role: TurnRole,
    pub content: String,
}

/// Anthropic Messages request as sent to Vertex (`rawPredict` /
/// `streamRawPredict`). The model is addressed in the URL, not the body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagesRequest {
    pub anthropic_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub messages: Vec<TurnMessage>,
    pub max_tokens: u64,
    pub temperature: f64,
    pub top_p: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
}

/// A content block in a backend response. Only text blocks carry output this
/// bridge supports; anything else renders as empty text downstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Unsupported,
}

/// Backend token usage.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct MessagesUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
}

/// Non-streaming Messages response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagesResponse {
    pub id: String,
    pub model: String,
    pub content: Vec<ContentBlock>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_sequence: Option<String>,
    pub usage: MessagesUsage,
}

/// `message` payload of a `message_start` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageStartBody {
    pub id: String,
    pub model: String,
    pub usage: MessagesUsage,
}

/// Inner variant of a `content_block_delta` event. Only `text_delta`
/// contributes to the outbound stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentDelta {
    #[serde(rename = "text_delta")]
    TextDelta { text: String },
    #[serde(other)]
    Unsupported,
}

/// `delta` payload of a `message_delta` event; carries the stop reason
/// immediately before the terminal event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageDeltaBody {
    #[serde(default)]
    pub stop_reason: Option<String>,
}

/// Usage payload of a `message_delta` event; the backend only reports output
/// tokens here.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct MessageDeltaUsage {
    #[serde(default)]
    pub output_tokens: u64,
}

/// Error payload of an in-stream `error` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamErrorBody {
    #[serde(rename = "type", default)]
    pub type_: String,
    pub message: String,
}

/// One event of the backend turn stream, tagged by `type`.
///
/// A turn is `message_start`, zero or more `content_block_*` events,
/// one `message_delta` carrying the stop reason, then `message_stop`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MessageStreamEvent {
    #[serde(rename = "message_start")]
    MessageStart { message: MessageStartBody },
    #[serde(rename = "content_block_start")]
    ContentBlockStart {
        index: usize,
        content_block: ContentBlock,
    },
    #[serde(rename = "content_block_delta")]
    ContentBlockDelta { index: usize, delta: ContentDelta },
    #[serde(rename = "content_block_stop")]
    ContentBlockStop { index: usize },
    #[serde(rename = "message_delta")]
    MessageDelta {
        delta: MessageDeltaBody,
        usage: MessageDeltaUsage,
    },
    #[serde(rename = "message_stop")]
    MessageStop {},
    #[serde(rename = "ping")]
    Ping {},
    #[serde(rename = "error")]
    Error { error: StreamErrorBody },
}
