//! HTTP boundary for streaming completions.
//!
//! [`ChatTransport`] is the seam between the requestor and the network: the
//! production [`ReqwestTransport`] posts to a real endpoint, while tests plug
//! in a scripted byte source.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;

use crate::api::ChatRequest;
use crate::core::error::StreamError;
use crate::utils::auth::add_auth_headers;

pub type ByteStream = BoxStream<'static, Result<Vec<u8>, StreamError>>;

#[derive(Debug, Clone)]
pub struct HttpChatRequest {
    pub url: String,
    pub api_key: String,
    pub body: ChatRequest,
    pub timeout: Option<Duration>,
}

pub enum TransportResponse {
    /// 2xx response; the body is handed over unread.
    Stream { status: u16, body: ByteStream },
    /// Non-2xx response with its fully read body.
    Status { status: u16, body: String },
}

#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn open(&self, request: &HttpChatRequest) -> Result<TransportResponse, StreamError>;
}

#[derive(Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    pub fn build(&self, request: &HttpChatRequest) -> reqwest::Result<reqwest::Request> {
        let builder = self
            .client
            .post(&request.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        let mut builder = add_auth_headers(builder, &request.api_key).json(&request.body);
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }
        builder.build()
    }
}

#[async_trait]
impl ChatTransport for ReqwestTransport {
    async fn open(&self, request: &HttpChatRequest) -> Result<TransportResponse, StreamError> {
        let http_request = self.build(request)?;
        let response = self.client.execute(http_request).await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<no body>".to_string());
            return Ok(TransportResponse::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(body_read_error))
            .boxed();
        Ok(TransportResponse::Stream {
            status: status.as_u16(),
            body,
        })
    }
}

fn body_read_error(err: reqwest::Error) -> StreamError {
    if err.is_timeout() {
        StreamError::from(err)
    } else {
        StreamError::Decode(err.to_string())
    }
}
