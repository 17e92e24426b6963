//! Thin Vertex AI client for the Anthropic Messages API. Carries no
//! translation logic; it speaks protocol B and nothing else.

pub mod sse;

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::{Stream, StreamExt};

use crate::config::VertexConfig;
use crate::error::BridgeError;
use crate::protocol::anthropic::{MessageStreamEvent, MessagesRequest, MessagesResponse};
use sse::SseFrameParser;

/// Client for one Vertex AI project/region pair. Cheap to clone.
#[derive(Debug, Clone)]
pub struct VertexClient {
    http: reqwest::Client,
    access_token: String,
    project_id: String,
    region: String,
}

impl VertexClient {
    /// Build the client, wiring in the configured HTTPS proxy if any.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::Config` when the proxy URL is malformed or the
    /// TLS backend fails to initialize.
    pub fn new(config: &VertexConfig) -> Result<Self, BridgeError> {
        let mut builder = reqwest::Client::builder();
        if let Some(proxy) = &config.https_proxy {
            let proxy = reqwest::Proxy::https(proxy)
                .map_err(|e| BridgeError::Config(format!("invalid HTTPS_PROXY: {e}")))?;
            builder = builder.proxy(proxy);
        }
        let http = builder
            .build()
            .map_err(|e| BridgeError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            access_token: config.access_token.clone(),
            project_id: config.project_id.clone(),
            region: config.region.clone(),
        })
    }

    /// Vertex addresses the model in the URL; the body stays model-free.
    fn model_url(&self, model: &str, streaming: bool) -> String {
        let verb = if streaming {
            "streamRawPredict"
        } else {
            "rawPredict"
        };
        format!(
            "https://{region}-aiplatform.googleapis.com/v1/projects/{project}/locations/{region}/publishers/anthropic/models/{model}:{verb}",
            region = self.region,
            project = self.project_id,
        )
    }

    /// One-shot Messages call.
    ///
    /// # Errors
    ///
    /// `BridgeError::Upstream` for non-success backend statuses,
    /// `BridgeError::Transport` for connection-level failures.
    pub async fn create_message(
        &self,
        model: &str,
        body: &MessagesRequest,
    ) -> Result<MessagesResponse, BridgeError> {
        let response = self
            .http
            .post(self.model_url(model, false))
            .bearer_auth(&self.access_token)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(BridgeError::Upstream {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<MessagesResponse>()
            .await
            .map_err(|e| BridgeError::Transport(format!("invalid backend response: {e}")))
    }

    /// Start a streaming Messages call and return the event stream.
    ///
    /// Dropping the returned stream aborts the underlying request, which is
    /// how client-disconnect cancellation reaches the backend.
    ///
    /// # Errors
    ///
    /// `BridgeError::Upstream` for non-success backend statuses,
    /// `BridgeError::Transport` for connection-level failures.
    pub async fn stream_message(
        &self,
        model: &str,
        body: &MessagesRequest,
    ) -> Result<MessageStream, BridgeError> {
        let mut body = body.clone();
        body.stream = Some(true);

        let response = self
            .http
            .post(self.model_url(model, true))
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(BridgeError::Upstream {
                status: status.as_u16(),
                message,
            });
        }

        Ok(MessageStream::new(response.bytes_stream()))
    }
}

/// A finite, non-restartable pull-based sequence of backend stream events.
pub struct MessageStream {
    inner: Pin<Box<dyn Stream<Item = Result<MessageStreamEvent, BridgeError>> + Send>>,
}

impl MessageStream {
    fn new<B>(bytes: B) -> Self
    where
        B: Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send + 'static,
    {
        struct PumpState<B> {
            // Boxed so the event pump can poll it without pin projection.
            bytes: Pin<Box<B>>,
            parser: SseFrameParser,
            pending: VecDeque<MessageStreamEvent>,
            failed: bool,
        }

        let state = PumpState {
            bytes: Box::pin(bytes),
            parser: SseFrameParser::new(),
            pending: VecDeque::new(),
            failed: false,
        };

        let inner = futures_util::stream::unfold(state, |mut state| async move {
            loop {
                if state.failed {
                    return None;
                }
                if let Some(event) = state.pending.pop_front() {
                    // In-stream backend errors surface as stream errors so
                    // the transcoder never has to know about them.
                    if let MessageStreamEvent::Error { error } = event {
                        state.failed = true;
                        return Some((
                            Err(BridgeError::Upstream {
                                status: 500,
                                message: error.message,
                            }),
                            state,
                        ));
                    }
                    return Some((Ok(event), state));
                }

                match state.bytes.next().await {
                    Some(Ok(chunk)) => {
                        let mut payloads = Vec::new();
                        state.parser.feed(&chunk, &mut payloads);
                        for payload in payloads {
                            match serde_json::from_str::<MessageStreamEvent>(&payload) {
                                Ok(event) => state.pending.push_back(event),
                                Err(err) => {
                                    tracing::warn!("skipping unparseable stream frame: {err}");
                                }
                            }
                        }
                    }
                    Some(Err(err)) => {
                        state.failed = true;
                        return Some((Err(BridgeError::Transport(err.to_string())), state));
                    }
                    None => return None,
                }
            }
        });

        Self {
            inner: Box::pin(inner),
        }
    }
}

impl Stream for MessageStream {
    type Item = Result<MessageStreamEvent, BridgeError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}
