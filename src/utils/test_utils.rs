use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::{stream, StreamExt};
use ratatui::crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use tokio::sync::mpsc;

use crate::api::ChatMessage;
use crate::core::app::{App, AppSetup};
use crate::core::error::StreamError;
use crate::core::requestor::StreamRequest;
use crate::core::store::MemoryStore;
use crate::core::transport::{ChatTransport, HttpChatRequest, TransportResponse};
use crate::core::turn::RequestSettings;

type Feed = mpsc::UnboundedReceiver<Result<Vec<u8>, StreamError>>;

enum Script {
    Chunks(Vec<Result<Vec<u8>, StreamError>>),
    Channel(Mutex<Option<Feed>>),
    Status { status: u16, body: String },
    Failing(StreamError),
}

/// A [`ChatTransport`] that replays canned bytes and records every request.
pub struct ScriptedTransport {
    script: Script,
    recorded: Arc<Mutex<Vec<HttpChatRequest>>>,
}

impl ScriptedTransport {
    fn from_script(script: Script) -> Self {
        Self {
            script,
            recorded: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_chunks(chunks: Vec<Vec<u8>>) -> Self {
        Self::from_script(Script::Chunks(chunks.into_iter().map(Ok).collect()))
    }

    /// Body bytes are pushed by the test through the returned sender; the
    /// stream stays open until the sender is dropped.
    pub fn channel() -> (Self, mpsc::UnboundedSender<Result<Vec<u8>, StreamError>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self::from_script(Script::Channel(Mutex::new(Some(rx)))),
            tx,
        )
    }

    pub fn status(status: u16, body: &str) -> Self {
        Self::from_script(Script::Status {
            status,
            body: body.to_string(),
        })
    }

    pub fn failing(error: StreamError) -> Self {
        Self::from_script(Script::Failing(error))
    }

    pub fn recorded(&self) -> Arc<Mutex<Vec<HttpChatRequest>>> {
        Arc::clone(&self.recorded)
    }
}

#[async_trait]
impl ChatTransport for ScriptedTransport {
    async fn open(&self, request: &HttpChatRequest) -> Result<TransportResponse, StreamError> {
        self.recorded.lock().unwrap().push(request.clone());
        match &self.script {
            Script::Chunks(chunks) => Ok(TransportResponse::Stream {
                status: 200,
                body: stream::iter(chunks.clone()).boxed(),
            }),
            Script::Channel(feed) => {
                let rx = feed
                    .lock()
                    .unwrap()
                    .take()
                    .expect("channel transport opened twice");
                let body = stream::unfold(rx, |mut rx| async move {
                    rx.recv().await.map(|item| (item, rx))
                });
                Ok(TransportResponse::Stream {
                    status: 200,
                    body: body.boxed(),
                })
            }
            Script::Status { status, body } => Ok(TransportResponse::Status {
                status: *status,
                body: body.clone(),
            }),
            Script::Failing(error) => Err(error.clone()),
        }
    }
}

/// One SSE event carrying a single content delta.
pub fn sse_chunk(content: &str) -> String {
    let payload = serde_json::json!({ "choices": [{ "delta": { "content": content } }] });
    format!("data: {payload}\n\n")
}

pub fn test_settings() -> RequestSettings {
    RequestSettings {
        endpoint: "https://api.test.com/v1/chat/completions".to_string(),
        api_key: "test-key".to_string(),
        max_tokens: 128,
        temperature: 0.5,
        timeout: None,
    }
}

pub fn test_stream_request() -> StreamRequest {
    let settings = test_settings();
    StreamRequest {
        endpoint: settings.endpoint,
        api_key: settings.api_key,
        model: "test-model".to_string(),
        messages: vec![ChatMessage {
            role: "user".to_string(),
            content: "Hello".to_string(),
        }],
        max_tokens: settings.max_tokens,
        temperature: settings.temperature,
        timeout: None,
    }
}

pub fn create_test_app() -> App {
    App::new(AppSetup {
        settings: test_settings(),
        default_model: "test-model".to_string(),
        system_prompt: None,
        store: Box::new(MemoryStore::new()),
        auto_title: false,
    })
}

pub fn key(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code, KeyModifiers::NONE)
}

pub fn ctrl(c: char) -> KeyEvent {
    KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL)
}

pub fn type_text(app: &mut App, text: &str) {
    for c in text.chars() {
        let commands = app.handle_key(key(KeyCode::Char(c)));
        assert!(commands.is_empty(), "typing must not start work");
    }
}
