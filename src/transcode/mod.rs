//! Response transcoding: backend Messages output in, OpenAI-shaped output
//! out, for both the single-shot and the streaming path.

pub mod non_stream;
pub mod stream;

use bytes::Bytes;

use crate::error::BridgeError;
use crate::protocol::openai::ChatCompletionChunk;

pub use non_stream::transcode_completion;
pub use stream::{transcode_event_stream, CancelFlag, FrameStream, StreamPhase, StreamTranscoder};

/// Terminal sentinel frame of the outbound SSE stream.
pub const SSE_DONE_FRAME: &[u8] = b"data: [DONE]\n\n";

/// Encode one outbound chunk as an SSE `data:` frame.
///
/// # Errors
///
/// Returns `BridgeError::Internal` if the chunk fails to serialize, which
/// indicates a bug rather than bad input.
pub fn sse_data_frame(chunk: &ChatCompletionChunk) -> Result<Bytes, BridgeError> {
    let json = serde_json::to_vec(chunk)
        .map_err(|e| BridgeError::Internal(format!("chunk serialization failed: {e}")))?;
    let mut frame = Vec::with_capacity(6 + json.len() + 2);
    frame.extend_from_slice(b"data: ");
    frame.extend_from_slice(&json);
    frame.extend_from_slice(b"\n\n");
    Ok(Bytes::from(frame))
}

#[must_use]
pub fn sse_done_frame() -> Bytes {
    Bytes::from_static(SSE_DONE_FRAME)
}
