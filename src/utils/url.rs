//! Endpoint URL construction.
//!
//! Base URLs come from config, the environment, or a CLI flag and are
//! written by hand, so trailing slashes and a missing scheme are common.

pub const CHAT_COMPLETIONS_PATH: &str = "chat/completions";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum UrlError {
    #[error("API base URL is empty")]
    Empty,

    #[error("API base URL must start with http:// or https://, got {0:?}")]
    UnsupportedScheme(String),
}

/// Strips trailing slashes so that joining never produces `//`.
///
/// ```
/// use parley::utils::url::normalize_base_url;
///
/// assert_eq!(normalize_base_url("https://api.example.com/v1///"), "https://api.example.com/v1");
/// ```
pub fn normalize_base_url(base_url: &str) -> String {
    base_url.trim().trim_end_matches('/').to_string()
}

/// Joins a base URL and an endpoint path with exactly one slash.
///
/// ```
/// use parley::utils::url::construct_api_url;
///
/// assert_eq!(
///     construct_api_url("https://api.example.com/v1/", "/chat/completions"),
///     "https://api.example.com/v1/chat/completions"
/// );
/// ```
pub fn construct_api_url(base_url: &str, endpoint: &str) -> String {
    let endpoint = endpoint.trim_start_matches('/');
    format!("{}/{endpoint}", normalize_base_url(base_url))
}

/// The streaming completions endpoint for `base_url`, after checking that
/// the base is an absolute http(s) URL.
pub fn completions_endpoint(base_url: &str) -> Result<String, UrlError> {
    let base = normalize_base_url(base_url);
    if base.is_empty() {
        return Err(UrlError::Empty);
    }
    let lower = base.to_ascii_lowercase();
    if !lower.starts_with("https://") && !lower.starts_with("http://") {
        return Err(UrlError::UnsupportedScheme(base));
    }
    Ok(construct_api_url(&base, CHAT_COMPLETIONS_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slashes_and_whitespace_are_removed() {
        assert_eq!(normalize_base_url("https://api.example.com/v1"), "https://api.example.com/v1");
        assert_eq!(normalize_base_url(" https://api.example.com/ \n"), "https://api.example.com");
        assert_eq!(normalize_base_url("///"), "");
    }

    #[test]
    fn joining_never_doubles_slashes() {
        assert_eq!(
            construct_api_url("http://localhost:11434/v1///", "///chat/completions"),
            "http://localhost:11434/v1/chat/completions"
        );
    }

    #[test]
    fn completions_endpoint_requires_an_http_scheme() {
        assert_eq!(
            completions_endpoint("https://api.openai.com/v1/").unwrap(),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(
            completions_endpoint("HTTP://127.0.0.1:8080").unwrap(),
            "HTTP://127.0.0.1:8080/chat/completions"
        );
        assert_eq!(completions_endpoint("  / "), Err(UrlError::Empty));
        assert!(matches!(
            completions_endpoint("api.openai.com/v1"),
            Err(UrlError::UnsupportedScheme(_))
        ));
    }
}
