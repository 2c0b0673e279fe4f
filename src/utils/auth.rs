//! Authentication helpers for API requests.

/// Add bearer-token authentication to an outgoing request.
///
/// Every supported endpoint speaks the OpenAI wire format, so the key always
/// travels in an `Authorization: Bearer` header.
pub fn add_auth_headers(
    request: reqwest::RequestBuilder,
    api_key: &str,
) -> reqwest::RequestBuilder {
    request.header(reqwest::header::AUTHORIZATION, format!("Bearer {api_key}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_header_is_attached() {
        let client = reqwest::Client::new();
        let request = add_auth_headers(client.get("https://example.com"), "test-key")
            .build()
            .unwrap();

        assert_eq!(
            request.headers().get("authorization").unwrap(),
            "Bearer test-key"
        );
    }
}
