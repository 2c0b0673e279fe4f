//! Error taxonomy for the streaming pipeline and turn lifecycle.

/// Failures surfaced by a single streaming request.
///
/// A malformed JSON fragment is never one of these: the frame decoder drops
/// it and keeps going.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StreamError {
    /// Socket, DNS, TLS, or timeout failure before or while talking to the server.
    #[error("transport error: {0}")]
    Transport(String),

    /// Non-2xx response, or an error envelope delivered inside the stream.
    #[error("API error {code}: {message}")]
    HttpStatus { code: u16, message: String },

    /// The response body could not be read to completion.
    #[error("stream read failed: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for StreamError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            StreamError::Transport(format!("request timed out: {err}"))
        } else {
            StreamError::Transport(err.to_string())
        }
    }
}

/// Reasons a turn could not be started or finished.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TurnError {
    #[error("a reply is still streaming for this conversation")]
    Busy,

    #[error("message is empty")]
    EmptyMessage,

    #[error("there is no unanswered message to retry")]
    NothingToRetry,

    #[error("conversation has no messages yet")]
    EmptyConversation,

    #[error("the server returned an empty reply")]
    EmptyReply,

    #[error(transparent)]
    Stream(#[from] StreamError),
}
