//! Streaming transcoder: consumes the backend's multi-event turn stream and
//! re-emits it as `chat.completion.chunk` SSE frames, one frame at most per
//! backend event, in arrival order.

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::{Stream, StreamExt};

use crate::error::BridgeError;
use crate::protocol::anthropic::{ContentDelta, MessageStreamEvent};
use crate::protocol::mapping::stop_reason_to_finish_reason;
use crate::protocol::openai::{ChatCompletionChunk, ChunkChoice, ChunkDelta, Usage};
use crate::transcode::{sse_data_frame, sse_done_frame};
use crate::util::random_base36_id;

/// Cooperative cancellation flag shared between the connection handler and
/// the event pump. Checked before every backend event pull.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Lifecycle of one streaming response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPhase {
    AwaitingStart,
    Streaming,
    Done,
    Aborted,
}

/// Per-connection transcoder state machine. Owns the turn id, model name and
/// input token count captured from `message_start`; never shared across
/// requests.
#[derive(Debug)]
pub struct StreamTranscoder {
    phase: StreamPhase,
    created: u64,
    system_fingerprint: String,
    turn_id: String,
    model_name: String,
    input_tokens: u64,
}

impl StreamTranscoder {
    /// `model` seeds the chunk model name until the backend reports its own;
    /// the turn id starts as a provisional random id for the same reason.
    #[must_use]
    pub fn new(model: &str, created: u64, system_fingerprint: &str) -> Self {
        Self {
            phase: StreamPhase::AwaitingStart,
            created,
            system_fingerprint: system_fingerprint.to_string(),
            turn_id: random_base36_id(),
            model_name: model.to_string(),
            input_tokens: 0,
        }
    }

    #[must_use]
    pub fn phase(&self) -> StreamPhase {
        self.phase
    }

    /// Feed one backend event; returns the outbound chunk to emit, if any.
    ///
    /// - `message_start`: capture turn id, model and input tokens; emit an
    ///   empty-content role chunk.
    /// - `content_block_delta` with a text variant: emit the fragment.
    ///   Non-text variants are silently skipped.
    /// - `message_delta`: emit the stop-reason chunk with combined usage.
    /// - everything else (`message_stop`, block start/stop, pings): nothing.
    pub fn on_event(&mut self, event: &MessageStreamEvent) -> Option<ChatCompletionChunk> {
        match event {
            MessageStreamEvent::MessageStart { message } => {
                self.turn_id = message.id.clone();
                self.model_name = message.model.clone();
                self.input_tokens = message.usage.input_tokens;
                self.phase = StreamPhase::Streaming;
                Some(self.chunk(String::new(), None, None))
            }
            MessageStreamEvent::ContentBlockDelta { delta, .. } => match delta {
                ContentDelta::TextDelta { text } => Some(self.chunk(text.clone(), None, None)),
                ContentDelta::Unsupported => None,
            },
            MessageStreamEvent::MessageDelta { delta, usage } => {
                let finish_reason = delta
                    .stop_reason
                    .as_deref()
                    .map(stop_reason_to_finish_reason);
                let usage = Usage {
                    prompt_tokens: self.input_tokens,
                    completion_tokens: usage.output_tokens,
                    total_tokens: self.input_tokens + usage.output_tokens,
                };
                Some(self.chunk(String::new(), finish_reason, Some(usage)))
            }
            MessageStreamEvent::MessageStop {} => {
                self.phase = StreamPhase::Done;
                None
            }
            MessageStreamEvent::ContentBlockStart { .. }
            | MessageStreamEvent::ContentBlockStop { .. }
            | MessageStreamEvent::Ping {}
            // Error events are surfaced as stream errors by the backend
            // client before they reach the transcoder.
            | MessageStreamEvent::Error { .. } => None,
        }
    }

    /// Mark the stream finished after the event source is exhausted.
    pub fn finish(&mut self) {
        self.phase = StreamPhase::Done;
    }

    /// Mark the stream aborted after a client disconnect.
    pub fn abort(&mut self) {
        self.phase = StreamPhase::Aborted;
    }

    fn chunk(
        &self,
        content: String,
        finish_reason: Option<String>,
        usage: Option<Usage>,
    ) -> ChatCompletionChunk {
        ChatCompletionChunk {
            id: self.turn_id.clone(),
            object: "chat.completion.chunk",
            created: self.created,
            model: self.model_name.clone(),
            system_fingerprint: self.system_fingerprint.clone(),
            choices: vec![ChunkChoice {
                index: 0,
                delta: ChunkDelta {
                    role: Some("assistant"),
                    content,
                },
                logprobs: None,
                finish_reason,
            }],
            usage,
        }
    }
}

/// Pump backend events through a [`StreamTranscoder`], yielding SSE frames.
///
/// One single-pass cooperative pipeline: events are pulled one at a time and
/// at most one frame is yielded per event, in order. The cancellation flag is
/// checked before every pull; once it is set, the backend event source is
/// dropped (which aborts the upstream call) and the stream ends without a
/// `[DONE]` sentinel. On normal exhaustion the sentinel is the final frame.
/// A backend error is logged and yielded as the terminal item, also without
/// a sentinel.
pub fn transcode_event_stream<S>(
    events: S,
    transcoder: StreamTranscoder,
    cancel: CancelFlag,
) -> impl Stream<Item = Result<Bytes, BridgeError>>
where
    S: Stream<Item = Result<MessageStreamEvent, BridgeError>> + Unpin,
{
    enum Pump<S> {
        Running {
            events: S,
            transcoder: StreamTranscoder,
            cancel: CancelFlag,
        },
        Finished,
    }

    futures_util::stream::unfold(
        Pump::Running {
            events,
            transcoder,
            cancel,
        },
        |pump| async move {
            let Pump::Running {
                mut events,
                mut transcoder,
                cancel,
            } = pump
            else {
                return None;
            };

            loop {
                if cancel.is_cancelled() {
                    transcoder.abort();
                    // Dropping `events` propagates the abort upstream.
                    return None;
                }
                match events.next().await {
                    Some(Ok(event)) => {
                        let Some(chunk) = transcoder.on_event(&event) else {
                            continue;
                        };
                        match sse_data_frame(&chunk) {
                            Ok(frame) => {
                                return Some((
                                    Ok(frame),
                                    Pump::Running {
                                        events,
                                        transcoder,
                                        cancel,
                                    },
                                ));
                            }
                            Err(err) => return Some((Err(err), Pump::Finished)),
                        }
                    }
                    Some(Err(err)) => {
                        tracing::error!("backend stream failed: {err}");
                        return Some((Err(err), Pump::Finished));
                    }
                    None => {
                        transcoder.finish();
                        return Some((Ok(sse_done_frame()), Pump::Finished));
                    }
                }
            }
        },
    )
}

/// Outbound frame stream handed to the response body.
///
/// Ties the cancellation flag to the body's lifetime: axum drops the body
/// when the client disconnects, and dropping this wrapper trips the flag
/// before the inner pump and its backend event source are released. The same
/// flag the pump checks per event is therefore the one the server path trips.
pub struct FrameStream {
    inner: Pin<Box<dyn Stream<Item = Result<Bytes, BridgeError>> + Send>>,
    cancel: CancelFlag,
}

impl FrameStream {
    pub fn new<S>(inner: S, cancel: CancelFlag) -> Self
    where
        S: Stream<Item = Result<Bytes, BridgeError>> + Send + 'static,
    {
        Self {
            inner: Box::pin(inner),
            cancel,
        }
    }
}

impl Stream for FrameStream {
    type Item = Result<Bytes, BridgeError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl Drop for FrameStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::anthropic::{
        MessageDeltaBody, MessageDeltaUsage, MessageStartBody, MessagesUsage,
    };
    use futures_util::stream;

    fn start_event() -> MessageStreamEvent {
        MessageStreamEvent::MessageStart {
            message: MessageStartBody {
                id: "msg_abc".into(),
                model: "claude-3-haiku@20240307".into(),
                usage: MessagesUsage {
                    input_tokens: 12,
                    output_tokens: 0,
                },
            },
        }
    }

    fn text_event(text: &str) -> MessageStreamEvent {
        MessageStreamEvent::ContentBlockDelta {
            index: 0,
            delta: ContentDelta::TextDelta { text: text.into() },
        }
    }

    fn delta_event(stop_reason: Option<&str>, output_tokens: u64) -> MessageStreamEvent {
        MessageStreamEvent::MessageDelta {
            delta: MessageDeltaBody {
                stop_reason: stop_reason.map(str::to_string),
            },
            usage: MessageDeltaUsage { output_tokens },
        }
    }

    fn transcoder() -> StreamTranscoder {
        StreamTranscoder::new("requested-model", 99, "fp-test")
    }

    #[test]
    fn start_event_captures_state_and_emits_empty_chunk() {
        let mut t = transcoder();
        let chunk = t.on_event(&start_event()).expect("chunk");
        assert_eq!(t.phase(), StreamPhase::Streaming);
        assert_eq!(chunk.id, "msg_abc");
        assert_eq!(chunk.model, "claude-3-haiku@20240307");
        assert_eq!(chunk.choices[0].delta.content, "");
        assert_eq!(chunk.choices[0].delta.role, Some("assistant"));
        assert!(chunk.choices[0].finish_reason.is_none());
        assert!(chunk.usage.is_none());
    }

    #[test]
    fn text_delta_passes_fragment_through_exactly() {
        let mut t = transcoder();
        t.on_event(&start_event());
        let chunk = t.on_event(&text_event(" there")).expect("chunk");
        assert_eq!(chunk.choices[0].delta.content, " there");
        assert!(chunk.choices[0].finish_reason.is_none());
    }

    #[test]
    fn non_text_delta_is_skipped() {
        let mut t = transcoder();
        t.on_event(&start_event());
        let event = MessageStreamEvent::ContentBlockDelta {
            index: 0,
            delta: ContentDelta::Unsupported,
        };
        assert!(t.on_event(&event).is_none());
    }

    #[test]
    fn message_delta_carries_finish_reason_and_combined_usage() {
        let mut t = transcoder();
        t.on_event(&start_event());
        let chunk = t.on_event(&delta_event(Some("end_turn"), 7)).expect("chunk");
        assert_eq!(chunk.choices[0].finish_reason.as_deref(), Some("stop"));
        let usage = chunk.usage.expect("usage");
        assert_eq!(usage.prompt_tokens, 12);
        assert_eq!(usage.completion_tokens, 7);
        assert_eq!(usage.total_tokens, 19);
    }

    #[test]
    fn message_delta_without_stop_reason_has_null_finish() {
        let mut t = transcoder();
        t.on_event(&start_event());
        let chunk = t.on_event(&delta_event(None, 3)).expect("chunk");
        assert!(chunk.choices[0].finish_reason.is_none());
    }

    #[test]
    fn message_stop_emits_nothing_and_completes_phase() {
        let mut t = transcoder();
        t.on_event(&start_event());
        assert!(t.on_event(&MessageStreamEvent::MessageStop {}).is_none());
        assert_eq!(t.phase(), StreamPhase::Done);
    }

    #[tokio::test]
    async fn pump_emits_four_chunks_then_sentinel() {
        let events = stream::iter(
            vec![
                start_event(),
                text_event("Hi"),
                text_event(" there"),
                delta_event(Some("end_turn"), 2),
                MessageStreamEvent::MessageStop {},
            ]
            .into_iter()
            .map(Ok),
        );
        let frames: Vec<_> = transcode_event_stream(events, transcoder(), CancelFlag::new())
            .collect()
            .await;

        assert_eq!(frames.len(), 5);
        let texts: Vec<String> = frames
            .into_iter()
            .map(|f| String::from_utf8(f.unwrap().to_vec()).unwrap())
            .collect();
        assert!(texts[0].contains("\"content\":\"\""));
        assert!(texts[1].contains("\"content\":\"Hi\""));
        assert!(texts[2].contains("\"content\":\" there\""));
        assert!(texts[3].contains("\"finish_reason\":\"stop\""));
        assert_eq!(texts[4], "data: [DONE]\n\n");
    }

    #[tokio::test]
    async fn pump_stops_without_sentinel_once_cancelled() {
        let cancel = CancelFlag::new();
        let trip = cancel.clone();
        let mut emitted = 0usize;
        // Trip the flag after the second event is produced.
        let events = stream::iter(vec![
            start_event(),
            text_event("Hi"),
            text_event("never seen"),
            delta_event(Some("end_turn"), 2),
        ])
        .map(move |event| {
            emitted += 1;
            if emitted == 2 {
                trip.cancel();
            }
            Ok(event)
        });

        let frames: Vec<_> =
            transcode_event_stream(Box::pin(events), transcoder(), cancel.clone())
                .collect()
                .await;

        // Start chunk and "Hi" were already pulled; nothing after, no [DONE].
        assert_eq!(frames.len(), 2);
        let last = String::from_utf8(frames[1].as_ref().unwrap().to_vec()).unwrap();
        assert!(last.contains("\"content\":\"Hi\""));
    }

    #[tokio::test]
    async fn dropping_frame_stream_trips_the_shared_flag() {
        let cancel = CancelFlag::new();
        let observer = cancel.clone();
        let events = stream::iter(
            vec![start_event(), text_event("Hi")].into_iter().map(Ok),
        );
        let mut frames = FrameStream::new(
            transcode_event_stream(events, transcoder(), cancel.clone()),
            cancel,
        );

        assert!(frames.next().await.is_some());
        assert!(!observer.is_cancelled());
        drop(frames);
        assert!(observer.is_cancelled());
    }

    #[tokio::test]
    async fn pump_surfaces_backend_error_without_sentinel() {
        let events = stream::iter(vec![
            Ok(start_event()),
            Err(BridgeError::Transport("connection reset".into())),
        ]);
        let frames: Vec<_> = transcode_event_stream(events, transcoder(), CancelFlag::new())
            .collect()
            .await;
        assert_eq!(frames.len(), 2);
        assert!(frames[0].is_ok());
        assert!(matches!(frames[1], Err(BridgeError::Transport(_))));
    }
}
