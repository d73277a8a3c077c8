pub mod canned;
pub mod http;

pub use canned::{CannedFetcher, CannedResponse};
pub use http::{DelayRange, HttpFetcher};

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL, USER_AGENT};
use std::time::Duration;

const STANDARD_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Free-text transport errors are cut to this many characters before they reach a status.
pub const MAX_ERROR_CHARS: usize = 50;

/// Header set sent with a request. Sites that block non-browser clients get `Browser`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderProfile {
    Standard,
    Browser,
}

impl HeaderProfile {
    pub fn headers(self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        match self {
            HeaderProfile::Standard => {
                headers.insert(USER_AGENT, HeaderValue::from_static(STANDARD_USER_AGENT));
            }
            HeaderProfile::Browser => {
                // Accept-Encoding is left to reqwest so it only advertises what it can decode.
                headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
                headers.insert(
                    ACCEPT,
                    HeaderValue::from_static(
                        "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8",
                    ),
                );
                headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.7"));
                headers.insert("dnt", HeaderValue::from_static("1"));
                headers.insert("upgrade-insecure-requests", HeaderValue::from_static("1"));
                headers.insert("sec-fetch-dest", HeaderValue::from_static("document"));
                headers.insert("sec-fetch-mode", HeaderValue::from_static("navigate"));
                headers.insert("sec-fetch-site", HeaderValue::from_static("none"));
                headers.insert("sec-fetch-user", HeaderValue::from_static("?1"));
                headers.insert(CACHE_CONTROL, HeaderValue::from_static("max-age=0"));
                headers.insert(
                    "sec-ch-ua",
                    HeaderValue::from_static(
                        "\"Not_A Brand\";v=\"8\", \"Chromium\";v=\"120\", \"Google Chrome\";v=\"120\"",
                    ),
                );
                headers.insert("sec-ch-ua-mobile", HeaderValue::from_static("?0"));
                headers.insert("sec-ch-ua-platform", HeaderValue::from_static("\"macOS\""));
            }
        }
        headers
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: String,
    pub profile: HeaderProfile,
    pub timeout: Duration,
    /// Whether the fetcher may pause before sending (when a delay is configured).
    pub polite: bool,
}

/// A fetched response. Non-200 statuses are pages too; the source decides what they mean.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub url: String,
    pub status: u16,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("Request timeout")]
    Timeout,
    #[error("Connection failed")]
    ConnectionFailed,
    #[error("{0}")]
    Other(String),
}

impl FetchError {
    pub fn other(message: impl AsRef<str>) -> Self {
        FetchError::Other(truncate_chars(message.as_ref(), MAX_ERROR_CHARS))
    }

    pub fn label(&self) -> &'static str {
        match self {
            FetchError::Timeout => "Timeout",
            FetchError::ConnectionFailed => "Connection Error",
            FetchError::Other(_) => "Error",
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else if err.is_connect() {
            FetchError::ConnectionFailed
        } else {
            FetchError::other(err.to_string())
        }
    }
}

/// Issues exactly one GET per call. No retries.
#[async_trait::async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> Result<Page, FetchError>;
}

pub fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn other_errors_are_truncated() {
        let long = "x".repeat(120);
        let FetchError::Other(msg) = FetchError::other(&long) else {
            panic!("expected Other");
        };
        assert_eq!(msg.chars().count(), MAX_ERROR_CHARS);
        assert_eq!(FetchError::Timeout.to_string(), "Request timeout");
        assert_eq!(FetchError::ConnectionFailed.to_string(), "Connection failed");
    }

    #[test]
    fn browser_profile_mimics_a_browser() {
        let standard = HeaderProfile::Standard.headers();
        assert_eq!(standard.len(), 1);

        let browser = HeaderProfile::Browser.headers();
        assert!(browser.contains_key("sec-fetch-mode"));
        assert!(browser.contains_key(ACCEPT));
        assert!(!browser.contains_key(reqwest::header::ACCEPT_ENCODING));
    }
}
