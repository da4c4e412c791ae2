//! Page fetching boundary. Transports return raw HTML; [PageFetcher::fetch] parses it and
//! rejects anti-bot challenge pages.

use crate::scraper::error::ScraperError;
use scraper::{Html, Selector};

/// Title fragments that mark an interstitial challenge page instead of real content.
const CHALLENGE_TITLES: &[&str] = &["Just a moment", "Attention Required"];

/// Source of story pages. Implemented by the HTTP client, the caching wrapper, and test doubles.
pub trait PageFetcher {
    /// Fetch the raw HTML body at `url`. Non-2xx and transport failures are network errors.
    fn fetch_html(&mut self, url: &str) -> Result<String, ScraperError>;

    /// Fetch and parse `url`. Fails with [ScraperError::Blocked] on a challenge page.
    fn fetch(&mut self, url: &str) -> Result<Html, ScraperError> {
        let body = self.fetch_html(url)?;
        parse_page(url, &body)
    }
}

impl<F: PageFetcher + ?Sized> PageFetcher for &mut F {
    fn fetch_html(&mut self, url: &str) -> Result<String, ScraperError> {
        (**self).fetch_html(url)
    }
}

/// Parse a fetched body and make sure it is not a challenge page.
pub fn parse_page(url: &str, body: &str) -> Result<Html, ScraperError> {
    let doc = Html::parse_document(body);
    if let Some(title) = challenge_title(&doc) {
        return Err(ScraperError::Blocked {
            url: url.to_string(),
            title,
        });
    }
    Ok(doc)
}

/// Returns the document title when it looks like an anti-bot challenge.
pub fn challenge_title(doc: &Html) -> Option<String> {
    let sel = Selector::parse("title").ok()?;
    let title = doc
        .select(&sel)
        .next()
        .map(|e| e.text().collect::<String>().trim().to_string())?;
    CHALLENGE_TITLES
        .iter()
        .any(|marker| title.contains(marker))
        .then_some(title)
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedFetcher;
    use super::*;

    #[test]
    fn fetch_parses_normal_page() -> Result<(), ScraperError> {
        let mut f = ScriptedFetcher::new().page(
            "https://example.com/s/a",
            "<html><head><title>A Story</title></head><body></body></html>",
        );
        let doc = f.fetch("https://example.com/s/a")?;
        assert!(challenge_title(&doc).is_none());
        assert_eq!(f.requests, vec!["https://example.com/s/a"]);
        Ok(())
    }

    #[test]
    fn challenge_page_is_blocked() {
        let mut f = ScriptedFetcher::new().page(
            "https://example.com/s/a",
            "<html><head><title>Just a moment...</title></head><body></body></html>",
        );
        match f.fetch("https://example.com/s/a") {
            Err(ScraperError::Blocked { url, title }) => {
                assert_eq!(url, "https://example.com/s/a");
                assert_eq!(title, "Just a moment...");
            }
            other => panic!("expected Blocked, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn missing_page_is_network_error() {
        let mut f = ScriptedFetcher::new();
        let err = f.fetch("https://example.com/missing").unwrap_err();
        assert!(err.is_network());
    }
}
