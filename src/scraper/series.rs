//! Series landing page: title, author, and the ordered chapter list.

use crate::model::{BookMetadata, SeriesEntry};
use crate::scraper::error::ScraperError;
use crate::scraper::extract::{parse_selector, Extract, UNKNOWN_AUTHOR, UNKNOWN_TITLE};
use reqwest::Url;
use scraper::Html;

/// Origin used to absolutize root-relative chapter links.
pub const SITE_ORIGIN: &str = "https://www.literotica.com";

const SERIES_TITLE: Extract = Extract::Text("div.series__header h1");
const SERIES_AUTHOR: Extract = Extract::Text("div.series__header a.y_eU");
/// Chapter links, in reading order.
const SERIES_ENTRIES: &str = "ul.series__works a.br_rj";

/// Result of reading a series page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesListing {
    pub metadata: BookMetadata,
    pub entries: Vec<SeriesEntry>,
}

/// Resolve a chapter href to an absolute URL. Root-relative links resolve against [SITE_ORIGIN].
pub fn absolutize(href: &str) -> Result<String, ScraperError> {
    let href = href.trim();
    if !href.starts_with('/') {
        return Ok(href.to_string());
    }
    let origin = Url::parse(SITE_ORIGIN).map_err(|e| ScraperError::InvalidUrl {
        input: SITE_ORIGIN.to_string(),
        reason: e.to_string(),
    })?;
    origin
        .join(href)
        .map(|u| u.to_string())
        .map_err(|e| ScraperError::InvalidUrl {
            input: href.to_string(),
            reason: e.to_string(),
        })
}

/// Read metadata and chapter entries from a series page. `url` is only used for errors.
///
/// Links without an `href` are skipped. Fails with [ScraperError::NoChaptersFound] when no
/// usable chapter links remain.
pub fn enumerate_series(doc: &Html, url: &str) -> Result<SeriesListing, ScraperError> {
    let title = SERIES_TITLE.apply(doc)?.unwrap_or_else(|| {
        tracing::warn!(url, "series title not found; using placeholder");
        UNKNOWN_TITLE.to_string()
    });
    let author = SERIES_AUTHOR.apply(doc)?.unwrap_or_else(|| {
        tracing::warn!(url, "series author not found; using placeholder");
        UNKNOWN_AUTHOR.to_string()
    });

    let link_sel = parse_selector(SERIES_ENTRIES)?;
    let mut entries = Vec::new();
    for a in doc.select(&link_sel) {
        let text = a.text().collect::<String>().trim().to_string();
        let href = match a.value().attr("href").map(str::trim) {
            Some(href) if !href.is_empty() => href,
            _ => {
                tracing::warn!(url, link = %text, "chapter link without href; skipping");
                continue;
            }
        };
        entries.push(SeriesEntry {
            chapter_url: absolutize(href)?,
            chapter_title: if text.is_empty() {
                format!("Chapter {}", entries.len() + 1)
            } else {
                text
            },
        });
    }

    if entries.is_empty() {
        return Err(ScraperError::NoChaptersFound {
            url: url.to_string(),
        });
    }
    tracing::info!(url, chapters = entries.len(), "series enumerated");
    Ok(SeriesListing {
        metadata: BookMetadata { title, author },
        entries,
    })
}
