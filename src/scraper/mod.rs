//! Scraping: page fetching, extraction, pagination, series enumeration, and the run orchestrator.

mod cache;
mod client;
mod error;
mod fetch;

pub mod extract;
pub mod next_page;
pub mod paginate;
pub mod series;

pub use cache::{
    is_valid_generation, CacheStore, CachingFetcher, DirStore, MemoryStore, DEFAULT_GENERATION,
};
pub use client::{HttpFetcher, HttpFetcherBuilder};
pub use error::ScraperError;
pub use fetch::{challenge_title, parse_page, PageFetcher};
pub use paginate::{ChapterPaginator, PaginatedChapter, MAX_PAGES_PER_CHAPTER};

#[cfg(test)]
pub(crate) use fetch::testing;

use crate::model::{Book, Chapter};
use std::time::Duration;

/// Delay between chapters in series mode.
pub const DEFAULT_CHAPTER_DELAY: Duration = Duration::from_millis(500);

/// Sleep for `d`; zero is a no-op.
pub(crate) fn pause(d: Duration) {
    if !d.is_zero() {
        std::thread::sleep(d);
    }
}

/// Run mode, chosen from the start URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    SingleStory,
    Series,
}

/// Series landing pages live under `/series/se/`; everything else is treated as a story.
pub fn classify_url(url: &str) -> Mode {
    if url.contains("/series/se/") {
        Mode::Series
    } else {
        Mode::SingleStory
    }
}

/// URL of the first request a run for `url` makes: the series page as given, or page 1 of the
/// story with any query string and fragment dropped.
pub fn entry_url(url: &str) -> &str {
    let url = url.trim();
    match classify_url(url) {
        Mode::Series => url,
        Mode::SingleStory => paginate::strip_query(url),
    }
}

/// Fixed politeness delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delays {
    /// Before each physical page after the first.
    pub page: Duration,
    /// Before each chapter after the first.
    pub chapter: Duration,
}

impl Default for Delays {
    fn default() -> Self {
        Self {
            page: paginate::DEFAULT_PAGE_DELAY,
            chapter: DEFAULT_CHAPTER_DELAY,
        }
    }
}

impl Delays {
    pub fn none() -> Self {
        Self {
            page: Duration::ZERO,
            chapter: Duration::ZERO,
        }
    }
}

/// Status updates emitted as the run advances. Observability only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// Series page read; `total` chapters to fetch.
    SeriesListed { title: String, total: u32 },
    /// Starting chapter `index` (1-based) of `total`.
    Chapter { index: u32, total: u32, title: String },
    /// Fetching physical page `page` of the current chapter.
    Page { chapter: u32, page: u32 },
}

/// Options for a scrape run.
pub struct ScrapeOptions<'a> {
    pub delays: Delays,
    pub max_pages: u32,
    pub progress: Option<&'a dyn Fn(&ProgressEvent)>,
    /// Resolve metadata and chapter list only; chapter contents are left empty.
    pub toc_only: bool,
}

impl Default for ScrapeOptions<'_> {
    fn default() -> Self {
        Self {
            delays: Delays::default(),
            max_pages: MAX_PAGES_PER_CHAPTER,
            progress: None,
            toc_only: false,
        }
    }
}

impl ScrapeOptions<'_> {
    fn emit(&self, event: ProgressEvent) {
        if let Some(p) = self.progress {
            p(&event);
        }
    }
}

/// Scrape `url` into a [Book]. Any error aborts the whole run.
pub fn scrape_book<F: PageFetcher>(
    url: &str,
    fetcher: &mut F,
    options: &ScrapeOptions<'_>,
) -> Result<Book, ScraperError> {
    let url = url.trim();
    let mode = classify_url(url);
    tracing::info!(url, ?mode, "starting scrape");
    let book = match mode {
        Mode::Series => scrape_series(url, fetcher, options)?,
        Mode::SingleStory => scrape_story(url, fetcher, options)?,
    };
    tracing::info!(
        title = %book.title,
        chapters = book.chapters.len(),
        "scrape finished"
    );
    Ok(book)
}

fn paginate_chapter<F: PageFetcher>(
    url: &str,
    chapter: u32,
    fetcher: &mut F,
    options: &ScrapeOptions<'_>,
) -> Result<PaginatedChapter, ScraperError> {
    let on_page = |page: u32| options.emit(ProgressEvent::Page { chapter, page });
    ChapterPaginator::new(fetcher)
        .page_delay(options.delays.page)
        .max_pages(options.max_pages)
        .on_page(&on_page)
        .paginate(url)
}

fn scrape_story<F: PageFetcher>(
    url: &str,
    fetcher: &mut F,
    options: &ScrapeOptions<'_>,
) -> Result<Book, ScraperError> {
    let (metadata, content) = if options.toc_only {
        let doc = fetcher.fetch(entry_url(url))?;
        (extract::extract_metadata(&doc)?, String::new())
    } else {
        let chapter = paginate_chapter(url, 1, fetcher, options)?;
        tracing::info!(pages = chapter.pages, "story fetched");
        (chapter.metadata, chapter.content)
    };
    if metadata.title == extract::UNKNOWN_TITLE || metadata.author == extract::UNKNOWN_AUTHOR {
        tracing::warn!(url, "story metadata incomplete; using placeholders");
    }
    options.emit(ProgressEvent::Chapter {
        index: 1,
        total: 1,
        title: metadata.title.clone(),
    });
    Ok(Book {
        chapters: vec![Chapter {
            title: metadata.title.clone(),
            content,
        }],
        title: metadata.title,
        author: metadata.author,
        source_url: Some(url.to_string()),
    })
}

fn scrape_series<F: PageFetcher>(
    url: &str,
    fetcher: &mut F,
    options: &ScrapeOptions<'_>,
) -> Result<Book, ScraperError> {
    let doc = fetcher.fetch(entry_url(url))?;
    let listing = series::enumerate_series(&doc, url)?;
    drop(doc);
    let total = listing.entries.len() as u32;
    options.emit(ProgressEvent::SeriesListed {
        title: listing.metadata.title.clone(),
        total,
    });

    let mut chapters = Vec::with_capacity(listing.entries.len());
    for (i, entry) in listing.entries.into_iter().enumerate() {
        let index = i as u32 + 1;
        if options.toc_only {
            chapters.push(Chapter {
                title: entry.chapter_title,
                content: String::new(),
            });
            continue;
        }
        if index > 1 {
            pause(options.delays.chapter);
        }
        options.emit(ProgressEvent::Chapter {
            index,
            total,
            title: entry.chapter_title.clone(),
        });
        tracing::info!(index, total, url = %entry.chapter_url, "fetching chapter");
        let chapter = paginate_chapter(&entry.chapter_url, index, fetcher, options)?;
        chapters.push(Chapter {
            title: entry.chapter_title,
            content: chapter.content,
        });
    }

    Ok(Book {
        title: listing.metadata.title,
        author: listing.metadata.author,
        chapters,
        source_url: Some(url.to_string()),
    })
}
