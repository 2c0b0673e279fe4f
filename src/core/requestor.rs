//! Drives one streaming completion request from POST to final text.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::{ApiErrorEnvelope, ChatMessage, ChatRequest};
use crate::core::error::StreamError;
use crate::core::stream_decoder::{DecodedFrame, FrameDecoder};
use crate::core::transport::{ChatTransport, HttpChatRequest, TransportResponse};

/// Everything one request needs; built from a conversation snapshot so the
/// worker never touches live conversation state.
#[derive(Debug, Clone)]
pub struct StreamRequest {
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout: Option<Duration>,
}

impl StreamRequest {
    fn into_http(self) -> HttpChatRequest {
        HttpChatRequest {
            url: self.endpoint,
            api_key: self.api_key,
            body: ChatRequest {
                model: self.model,
                messages: self.messages,
                stream: true,
                max_tokens: self.max_tokens,
                temperature: self.temperature,
            },
            timeout: self.timeout,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamOutcome {
    /// `[DONE]` or end of body; all deltas concatenated in arrival order.
    Completed(String),
    /// The cancellation token fired; carries what had arrived so far.
    Cancelled { partial: String },
}

#[derive(Clone)]
pub struct StreamRequestor {
    transport: Arc<dyn ChatTransport>,
}

impl StreamRequestor {
    pub fn new(transport: Arc<dyn ChatTransport>) -> Self {
        Self { transport }
    }

    /// Runs the request to completion, cancellation, or error.
    ///
    /// `on_delta` sees every content delta as it is decoded. Nothing is
    /// retried; the caller owns retry policy.
    pub async fn run<F>(
        &self,
        request: StreamRequest,
        cancel: &CancellationToken,
        mut on_delta: F,
    ) -> Result<StreamOutcome, StreamError>
    where
        F: FnMut(&str),
    {
        if cancel.is_cancelled() {
            return Ok(StreamOutcome::Cancelled {
                partial: String::new(),
            });
        }

        let http_request = request.into_http();
        info!(
            url = %http_request.url,
            model = %http_request.body.model,
            messages = http_request.body.messages.len(),
            "Starting completion stream"
        );

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Stream cancelled before response headers arrived");
                return Ok(StreamOutcome::Cancelled { partial: String::new() });
            }
            response = self.transport.open(&http_request) => response?,
        };

        let (status, mut body) = match response {
            TransportResponse::Stream { status, body } => (status, body),
            TransportResponse::Status { status, body } => {
                let error = status_error(status, &body);
                warn!(status, error = %error, "Completion request rejected");
                return Err(error);
            }
        };

        let mut decoder = FrameDecoder::new();
        let mut accumulated = String::new();

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Ok(cancelled(accumulated));
                }
                next = body.next() => next,
            };

            match next {
                Some(Ok(chunk)) => {
                    decoder.push_bytes(&chunk);
                    while let Some(line) = decoder.next_line() {
                        if cancel.is_cancelled() {
                            return Ok(cancelled(accumulated));
                        }
                        for frame in decoder.decode_line(&line) {
                            if let ControlFlow::Break(result) =
                                apply_frame(frame, status, &mut accumulated, &mut on_delta)
                            {
                                log_dropped(&decoder);
                                return result;
                            }
                        }
                    }
                }
                Some(Err(err)) => {
                    warn!(error = %err, received = accumulated.len(), "Completion stream failed");
                    return Err(err);
                }
                None => {
                    for frame in decoder.finish() {
                        if let ControlFlow::Break(result) =
                            apply_frame(frame, status, &mut accumulated, &mut on_delta)
                        {
                            log_dropped(&decoder);
                            return result;
                        }
                    }
                    log_dropped(&decoder);
                    debug!(received = accumulated.len(), "Stream ended without [DONE]");
                    return Ok(StreamOutcome::Completed(accumulated));
                }
            }
        }
    }
}

/// `status` is the response status, reported for error objects that carry
/// no numeric code of their own.
fn apply_frame<F>(
    frame: DecodedFrame,
    status: u16,
    accumulated: &mut String,
    on_delta: &mut F,
) -> ControlFlow<Result<StreamOutcome, StreamError>>
where
    F: FnMut(&str),
{
    match frame {
        DecodedFrame::Delta(text) => {
            on_delta(&text);
            accumulated.push_str(&text);
            ControlFlow::Continue(())
        }
        DecodedFrame::ApiError { code, message } => {
            warn!(?code, %message, "Error envelope received mid-stream");
            ControlFlow::Break(Err(StreamError::HttpStatus {
                code: code.unwrap_or(status),
                message,
            }))
        }
        DecodedFrame::Done => {
            debug!(received = accumulated.len(), "Stream completed");
            ControlFlow::Break(Ok(StreamOutcome::Completed(std::mem::take(accumulated))))
        }
    }
}

fn cancelled(accumulated: String) -> StreamOutcome {
    debug!(received = accumulated.len(), "Stream cancelled; closing body");
    StreamOutcome::Cancelled {
        partial: accumulated,
    }
}

fn log_dropped(decoder: &FrameDecoder) {
    if decoder.dropped_fragments() > 0 {
        debug!(
            dropped = decoder.dropped_fragments(),
            "Malformed fragments were skipped"
        );
    }
}

/// Maps a non-2xx response to an error, preferring the structured
/// `{"error": {"code", "message"}}` envelope when the body carries one.
pub fn status_error(status: u16, body: &str) -> StreamError {
    if let Ok(envelope) = serde_json::from_str::<ApiErrorEnvelope>(body) {
        return StreamError::HttpStatus {
            code: envelope.error.numeric_code(status),
            message: envelope.error.summary(),
        };
    }

    let trimmed = body.trim();
    StreamError::HttpStatus {
        code: status,
        message: if trimmed.is_empty() {
            "<empty body>".to_string()
        } else {
            trimmed.to_string()
        },
    }
}
