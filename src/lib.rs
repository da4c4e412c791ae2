//! storybind: CLI scraper that stitches paginated web stories and series into EPUB.

pub mod cli;
pub mod config;
pub mod epub;
pub mod model;
mod output;
pub mod scraper;

// Re-exports for CLI and consumers.
pub use crate::scraper::{
    scrape_book, CachingFetcher, Delays, DirStore, HttpFetcher, HttpFetcherBuilder, PageFetcher,
    ProgressEvent, ScrapeOptions, ScraperError,
};
pub use epub::{assemble, write_epub, EpubArchive, EpubError};
pub use model::{Book, Chapter, SeriesEntry};
