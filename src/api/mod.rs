//! Wire payloads for OpenAI-compatible chat completion endpoints.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Serialize, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Deserialize, Default)]
pub struct ChatResponseDelta {
    pub content: Option<String>,
}

#[derive(Deserialize)]
pub struct ChatResponseChoice {
    #[serde(default)]
    pub delta: ChatResponseDelta,
}

/// One streamed chunk. Every field is optional so that keep-alive objects
/// and provider-specific extras still parse.
#[derive(Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<ChatResponseChoice>,
    #[serde(default)]
    pub error: Option<ApiErrorBody>,
}

impl ChatResponse {
    /// Content at `choices[0].delta.content`, if present and non-empty.
    pub fn first_delta_content(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|choice| choice.delta.content.as_deref())
            .filter(|content| !content.is_empty())
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub code: Option<Value>,
    #[serde(default)]
    pub message: Option<String>,
}

/// The `{"error": {"code": .., "message": ..}}` envelope returned alongside
/// non-2xx statuses (and occasionally mid-stream).
#[derive(Debug, Deserialize)]
pub struct ApiErrorEnvelope {
    pub error: ApiErrorBody,
}

impl ApiErrorBody {
    /// The code as a number. Numeric strings such as `"429"` count; symbolic
    /// codes such as `"invalid_api_key"` do not.
    pub fn code_number(&self) -> Option<u16> {
        self.code
            .as_ref()
            .and_then(|code| match code {
                Value::Number(n) => n.as_u64(),
                Value::String(s) => s.parse::<u64>().ok(),
                _ => None,
            })
            .and_then(|code| u16::try_from(code).ok())
    }

    /// Numeric error code, falling back to `fallback` when the provider sends
    /// a symbolic code or none at all.
    pub fn numeric_code(&self, fallback: u16) -> u16 {
        self.code_number().unwrap_or(fallback)
    }

    pub fn summary(&self) -> String {
        let text = self.message.as_deref().unwrap_or("unknown error");
        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_expected_fields() {
        let request = ChatRequest {
            model: "gpt-test".into(),
            messages: vec![ChatMessage {
                role: "user".into(),
                content: "hi".into(),
            }],
            stream: true,
            max_tokens: 256,
            temperature: 0.5,
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["model"], "gpt-test");
        assert_eq!(value["stream"], true);
        assert_eq!(value["max_tokens"], 256);
        assert_eq!(value["temperature"], 0.5);
        assert_eq!(value["messages"][0]["role"], "user");
        assert_eq!(value["messages"][0]["content"], "hi");
    }

    #[test]
    fn first_delta_content_skips_empty_and_missing() {
        let with_content: ChatResponse =
            serde_json::from_str(r#"{"choices":[{"delta":{"content":"Hi"}}]}"#).unwrap();
        assert_eq!(with_content.first_delta_content(), Some("Hi"));

        let empty: ChatResponse =
            serde_json::from_str(r#"{"choices":[{"delta":{"content":""}}]}"#).unwrap();
        assert_eq!(empty.first_delta_content(), None);

        let role_only: ChatResponse =
            serde_json::from_str(r#"{"choices":[{"delta":{"role":"assistant"}}]}"#).unwrap();
        assert_eq!(role_only.first_delta_content(), None);

        let no_choices: ChatResponse = serde_json::from_str(r#"{"id":"x"}"#).unwrap();
        assert_eq!(no_choices.first_delta_content(), None);
    }

    #[test]
    fn error_codes_accept_numbers_and_strings() {
        let numeric: ApiErrorEnvelope =
            serde_json::from_str(r#"{"error":{"code":429,"message":"slow  down"}}"#).unwrap();
        assert_eq!(numeric.error.numeric_code(500), 429);
        assert_eq!(numeric.error.summary(), "slow down");

        let textual: ApiErrorEnvelope =
            serde_json::from_str(r#"{"error":{"code":"invalid_api_key","message":"bad key"}}"#)
                .unwrap();
        assert_eq!(textual.error.code_number(), None);
        assert_eq!(textual.error.numeric_code(401), 401);

        let missing: ApiErrorEnvelope =
            serde_json::from_str(r#"{"error":{"message":"?"}}"#).unwrap();
        assert_eq!(missing.error.code_number(), None);
    }
}
