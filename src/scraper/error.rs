//! Shared error type for fetching, extraction, and pagination.

use thiserror::Error;

/// Every failure here is fatal for the current run; nothing is retried.
#[derive(Debug, Error)]
pub enum ScraperError {
    #[error("Invalid URL: {input}: {reason}")]
    InvalidUrl { input: String, reason: String },

    #[error("Invalid selector {selector:?}: {reason}")]
    InvalidSelector { selector: String, reason: String },

    // Network family
    #[error("Network error: could not reach {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP {status} when fetching: {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Failed to read response body from {url}: {source}")]
    BodyRead {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Access blocked at {url}: got an anti-bot challenge page ({title:?}).")]
    Blocked { url: String, title: String },

    #[error("No story content found at {url} (page structure not recognized).")]
    ContentNotFound { url: String },

    #[error("Series page {url} lists no chapters.")]
    NoChaptersFound { url: String },
}

impl ScraperError {
    /// True for transport failures and non-2xx responses.
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            ScraperError::Network { .. }
                | ScraperError::HttpStatus { .. }
                | ScraperError::BodyRead { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_is_network() {
        let e = ScraperError::HttpStatus {
            status: 503,
            url: "https://example.com".into(),
        };
        assert!(e.is_network());
        assert_eq!(e.to_string(), "HTTP 503 when fetching: https://example.com");
    }

    #[test]
    fn content_and_blocked_are_not_network() {
        assert!(!ScraperError::ContentNotFound { url: "u".into() }.is_network());
        assert!(!ScraperError::Blocked {
            url: "u".into(),
            title: "Just a moment...".into()
        }
        .is_network());
        assert!(!ScraperError::NoChaptersFound { url: "u".into() }.is_network());
    }
}
