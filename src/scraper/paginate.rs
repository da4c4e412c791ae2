//! Chapter pagination: fetch physical pages in order and stitch their fragments together.
//!
//! Page 1 is the bare URL; page N > 1 is `{base}?page={N}`. A page without a "next" control
//! ends the chapter. At most [MAX_PAGES_PER_CHAPTER] pages are fetched; hitting the bound is
//! a normal stop, not an error.

use crate::model::BookMetadata;
use crate::scraper::error::ScraperError;
use crate::scraper::extract::{extract_content, extract_metadata};
use crate::scraper::fetch::PageFetcher;
use crate::scraper::next_page::find_next_page;
use crate::scraper::pause;
use std::time::Duration;

pub const MAX_PAGES_PER_CHAPTER: u32 = 50;

/// Delay before every page after the first.
pub const DEFAULT_PAGE_DELAY: Duration = Duration::from_millis(300);

/// Inserted between consecutive page fragments of one chapter.
pub const PAGE_SEPARATOR: &str = "\n<hr class=\"page-break\"/>\n";

/// Drop any query string (and fragment) so page addressing starts clean.
pub fn strip_query(url: &str) -> &str {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    &url[..end]
}

/// URL of physical page `page` (1-based) under `base_url`.
pub fn page_url(base_url: &str, page: u32) -> String {
    if page <= 1 {
        base_url.to_string()
    } else {
        format!("{}?page={}", base_url, page)
    }
}

/// A fully stitched chapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginatedChapter {
    /// Title/author read from page 1.
    pub metadata: BookMetadata,
    pub content: String,
    /// Number of physical pages fetched.
    pub pages: u32,
}

/// Pagination state: current page, base URL, accumulated content, continue flag.
#[derive(Debug)]
struct PageCursor {
    base_url: String,
    page: u32,
    content: String,
    has_next: bool,
}

impl PageCursor {
    fn new(start_url: &str) -> Self {
        Self {
            base_url: strip_query(start_url).to_string(),
            page: 1,
            content: String::new(),
            has_next: true,
        }
    }

    fn url(&self) -> String {
        page_url(&self.base_url, self.page)
    }

    fn absorb(&mut self, fragment: &str) {
        if self.page > 1 {
            self.content.push_str(PAGE_SEPARATOR);
        }
        self.content.push_str(fragment);
    }
}

/// Drives fetch, extract, and next-page detection for one chapter.
pub struct ChapterPaginator<'a, F: PageFetcher> {
    fetcher: &'a mut F,
    page_delay: Duration,
    max_pages: u32,
    on_page: Option<&'a dyn Fn(u32)>,
}

impl<'a, F: PageFetcher> ChapterPaginator<'a, F> {
    pub fn new(fetcher: &'a mut F) -> Self {
        Self {
            fetcher,
            page_delay: DEFAULT_PAGE_DELAY,
            max_pages: MAX_PAGES_PER_CHAPTER,
            on_page: None,
        }
    }

    pub fn page_delay(mut self, delay: Duration) -> Self {
        self.page_delay = delay;
        self
    }

    /// Upper bound on pages per chapter (at least 1).
    pub fn max_pages(mut self, n: u32) -> Self {
        self.max_pages = n.max(1);
        self
    }

    /// Called with the page number before each page is fetched.
    pub fn on_page(mut self, cb: &'a dyn Fn(u32)) -> Self {
        self.on_page = Some(cb);
        self
    }

    /// Fetch every page of the chapter starting at `start_url`.
    pub fn paginate(&mut self, start_url: &str) -> Result<PaginatedChapter, ScraperError> {
        let mut cursor = PageCursor::new(start_url);
        let mut metadata = None;

        while cursor.has_next {
            if cursor.page > 1 {
                pause(self.page_delay);
            }
            if let Some(cb) = self.on_page {
                cb(cursor.page);
            }
            let url = cursor.url();
            let doc = self.fetcher.fetch(&url)?;
            if metadata.is_none() {
                metadata = Some(extract_metadata(&doc)?);
            }
            let fragment = extract_content(&doc, &url)?;
            cursor.absorb(&fragment);

            let next = find_next_page(&doc);
            tracing::debug!(
                url = %url,
                page = cursor.page,
                next = next.as_ref().and_then(|n| n.href.as_deref()),
                "fetched page"
            );
            cursor.has_next = next.is_some();
            if cursor.has_next {
                if cursor.page >= self.max_pages {
                    tracing::warn!(
                        base = %cursor.base_url,
                        pages = cursor.page,
                        "page limit reached; stopping pagination"
                    );
                    break;
                }
                cursor.page += 1;
            }
        }

        Ok(PaginatedChapter {
            metadata: metadata.unwrap_or_else(|| BookMetadata {
                title: crate::scraper::extract::UNKNOWN_TITLE.to_string(),
                author: crate::scraper::extract::UNKNOWN_AUTHOR.to_string(),
            }),
            content: cursor.content,
            pages: cursor.page,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scraper::fetch::testing::{story_page, ScriptedFetcher};
    use std::cell::RefCell;
    use std::time::Instant;

    const BASE: &str = "https://www.literotica.com/s/night-shift";

    /// Chain of `k` pages, each advertising a next link except the last.
    fn chain(k: u32) -> ScriptedFetcher {
        let mut f = ScriptedFetcher::new();
        for n in 1..=k {
            f.insert(
                &page_url(BASE, n),
                story_page("Night Shift", &format!("<p>page {}</p>", n), n < k),
            );
        }
        f
    }

    fn paginate(f: &mut ScriptedFetcher, url: &str) -> Result<PaginatedChapter, ScraperError> {
        ChapterPaginator::new(f)
            .page_delay(Duration::ZERO)
            .paginate(url)
    }

    #[test]
    fn strip_query_drops_query_and_fragment() {
        assert_eq!(strip_query("https://x.com/s/a?page=3&x=1"), "https://x.com/s/a");
        assert_eq!(strip_query("https://x.com/s/a#comments"), "https://x.com/s/a");
        assert_eq!(strip_query("https://x.com/s/a"), "https://x.com/s/a");
    }

    #[test]
    fn page_one_has_no_suffix() {
        assert_eq!(page_url(BASE, 1), BASE);
        assert_eq!(page_url(BASE, 4), format!("{}?page=4", BASE));
    }

    #[test]
    fn single_page_chapter() -> Result<(), ScraperError> {
        let mut f = chain(1);
        let ch = paginate(&mut f, BASE)?;
        assert_eq!(ch.pages, 1);
        assert_eq!(ch.content, "<p>page 1</p>");
        assert_eq!(f.requests, vec![BASE.to_string()]);
        assert_eq!(ch.metadata.title, "Night Shift");
        assert_eq!(ch.metadata.author, "Some Author");
        Ok(())
    }

    #[test]
    fn k_pages_fetched_in_order_and_joined_with_separator() -> Result<(), ScraperError> {
        let mut f = chain(3);
        let ch = paginate(&mut f, BASE)?;
        assert_eq!(ch.pages, 3);
        assert_eq!(
            f.requests,
            vec![
                BASE.to_string(),
                format!("{}?page=2", BASE),
                format!("{}?page=3", BASE),
            ]
        );
        let expected = format!(
            "<p>page 1</p>{sep}<p>page 2</p>{sep}<p>page 3</p>",
            sep = PAGE_SEPARATOR
        );
        assert_eq!(ch.content, expected);
        Ok(())
    }

    #[test]
    fn caller_query_does_not_leak_into_page_urls() -> Result<(), ScraperError> {
        let mut f = chain(2);
        paginate(&mut f, &format!("{}?page=7&ref=home", BASE))?;
        assert_eq!(f.requests[0], BASE);
        assert_eq!(f.requests[1], format!("{}?page=2", BASE));
        Ok(())
    }

    #[test]
    fn endless_next_links_stop_at_fifty_pages() -> Result<(), ScraperError> {
        let mut f = chain(60);
        f.insert(
            &page_url(BASE, 50),
            story_page("Night Shift", "<p>page 50</p>", true),
        );
        let ch = paginate(&mut f, BASE)?;
        assert_eq!(f.requests.len(), MAX_PAGES_PER_CHAPTER as usize);
        assert_eq!(ch.pages, MAX_PAGES_PER_CHAPTER);
        assert_eq!(ch.content.matches(PAGE_SEPARATOR).count(), 49);
        assert!(ch.content.starts_with("<p>page 1</p>"));
        assert!(ch.content.ends_with("<p>page 50</p>"));
        Ok(())
    }

    #[test]
    fn custom_page_bound() -> Result<(), ScraperError> {
        let mut f = chain(10);
        let ch = ChapterPaginator::new(&mut f)
            .page_delay(Duration::ZERO)
            .max_pages(4)
            .paginate(BASE)?;
        assert_eq!(ch.pages, 4);
        assert_eq!(f.requests.len(), 4);
        Ok(())
    }

    #[test]
    fn missing_content_on_later_page_aborts() {
        let mut f = chain(2);
        f.insert(
            &page_url(BASE, 2),
            "<html><head><title>x</title></head><body><p>ad wall</p></body></html>",
        );
        match paginate(&mut f, BASE) {
            Err(ScraperError::ContentNotFound { url }) => {
                assert_eq!(url, format!("{}?page=2", BASE))
            }
            other => panic!("expected ContentNotFound, got {:?}", other),
        }
    }

    #[test]
    fn challenge_page_aborts() {
        let mut f = chain(3);
        f.insert(
            &page_url(BASE, 2),
            "<html><head><title>Just a moment...</title></head><body></body></html>",
        );
        let err = paginate(&mut f, BASE).unwrap_err();
        assert!(matches!(err, ScraperError::Blocked { .. }));
        assert_eq!(f.requests.len(), 2);
    }

    #[test]
    fn network_failure_propagates() {
        let mut f = ScriptedFetcher::new();
        let err = paginate(&mut f, BASE).unwrap_err();
        assert!(err.is_network());
    }

    #[test]
    fn delay_runs_between_pages_only() -> Result<(), ScraperError> {
        let mut f = chain(3);
        let start = Instant::now();
        ChapterPaginator::new(&mut f)
            .page_delay(Duration::from_millis(25))
            .paginate(BASE)?;
        assert!(start.elapsed() >= Duration::from_millis(50));
        Ok(())
    }

    #[test]
    fn on_page_reports_each_page() -> Result<(), ScraperError> {
        let seen = RefCell::new(Vec::new());
        let cb = |n: u32| seen.borrow_mut().push(n);
        let mut f = chain(3);
        ChapterPaginator::new(&mut f)
            .page_delay(Duration::ZERO)
            .on_page(&cb)
            .paginate(BASE)?;
        assert_eq!(*seen.borrow(), vec![1, 2, 3]);
        Ok(())
    }
}
