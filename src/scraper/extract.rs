//! Story page extraction: title, author, and body via ordered selector fallbacks.
//!
//! Each field is an ordered try-list of [Extract] strategies; the first one that yields a
//! value wins. Missing metadata degrades to a placeholder, missing body content is fatal.

use crate::model::BookMetadata;
use crate::scraper::error::ScraperError;
use scraper::{Html, Selector};

pub const UNKNOWN_TITLE: &str = "Unknown Title";
pub const UNKNOWN_AUTHOR: &str = "Unknown Author";

/// Story title candidates, most specific first.
pub const TITLE_CHAIN: &[Extract] = &[
    Extract::Text("h1.j_bm"),
    Extract::Text("div.b-story-header h1"),
    Extract::Text("h1.headline"),
    Extract::Text("h1"),
];

/// Author candidates, most specific first.
pub const AUTHOR_CHAIN: &[Extract] = &[
    Extract::Text("a.y_eU"),
    Extract::Text("div.b-story-user-y a"),
    Extract::Text("span.b-story-user-y a"),
    Extract::Text("a[href*=\"/authors/\"]"),
];

/// Body container candidates. The matched container's inner markup is the page fragment.
pub const CONTENT_CHAIN: &[Extract] = &[
    Extract::InnerHtml("div.aa_ht"),
    Extract::InnerHtml("div.b-story-body-x"),
    Extract::InnerHtml("div.panel.article"),
];

/// Parse a CSS selector or return an error (avoids panics from Selector::parse).
pub(crate) fn parse_selector(sel: &str) -> Result<Selector, ScraperError> {
    Selector::parse(sel).map_err(|e| ScraperError::InvalidSelector {
        selector: sel.to_string(),
        reason: e.to_string(),
    })
}

/// One extraction strategy: a selector plus what to take from its first match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extract {
    /// Trimmed text of the first match; an empty string counts as no match.
    Text(&'static str),
    /// Raw inner markup of the first match.
    InnerHtml(&'static str),
}

impl Extract {
    pub fn apply(&self, doc: &Html) -> Result<Option<String>, ScraperError> {
        match *self {
            Extract::Text(sel) => {
                let sel = parse_selector(sel)?;
                Ok(doc
                    .select(&sel)
                    .next()
                    .map(|e| e.text().collect::<String>().trim().to_string())
                    .filter(|s| !s.is_empty()))
            }
            Extract::InnerHtml(sel) => {
                let sel = parse_selector(sel)?;
                Ok(doc.select(&sel).next().map(|e| e.inner_html()))
            }
        }
    }
}

/// Evaluate `chain` in order and return the first value produced.
pub fn first_match(chain: &[Extract], doc: &Html) -> Result<Option<String>, ScraperError> {
    for strategy in chain {
        if let Some(value) = strategy.apply(doc)? {
            return Ok(Some(value));
        }
    }
    Ok(None)
}

/// Title and author of a story page, falling back to placeholders independently.
pub fn extract_metadata(doc: &Html) -> Result<BookMetadata, ScraperError> {
    let title = first_match(TITLE_CHAIN, doc)?.unwrap_or_else(|| {
        tracing::debug!("story title not found; using placeholder");
        UNKNOWN_TITLE.to_string()
    });
    let author = first_match(AUTHOR_CHAIN, doc)?.unwrap_or_else(|| {
        tracing::debug!("story author not found; using placeholder");
        UNKNOWN_AUTHOR.to_string()
    });
    Ok(BookMetadata { title, author })
}

/// Inner markup of the page's story body. `url` is only used for the error.
pub fn extract_content(doc: &Html, url: &str) -> Result<String, ScraperError> {
    first_match(CONTENT_CHAIN, doc)?.ok_or_else(|| ScraperError::ContentNotFound {
        url: url.to_string(),
    })
}
