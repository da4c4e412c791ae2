//! CLI parsing and orchestration. Parses args, runs scrape -> EPUB or JSON. Maps errors to exit codes.

use crate::config::{self, Config};
use crate::epub::{archive_file_name, assemble, EpubError};
use crate::model::Book;
use crate::output::write_atomically;
use crate::scraper::{
    entry_url, is_valid_generation, scrape_book, CachingFetcher, Delays, DirStore, HttpFetcher,
    PageFetcher, ProgressEvent, ScrapeOptions, ScraperError, DEFAULT_GENERATION,
};
use clap::Parser;
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// CLI error carrying exit code and message.
#[derive(Debug, Error)]
pub enum CliRunError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    Scraper(#[from] ScraperError),

    #[error("{0}")]
    Epub(#[from] EpubError),

    #[error("{0}")]
    Output(String),
}

impl CliRunError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliRunError::InvalidInput(_) => 1,
            CliRunError::Scraper(_) => 2,
            CliRunError::Epub(_) | CliRunError::Output(_) => 3,
        }
    }
}

/// Output format selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Epub,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "storybind")]
#[command(about = "Stitch a paginated web story or series into an EPUB")]
#[command(
    after_help = "Config file keys (output_dir, user_agent, timeout_secs, proxy, page_delay_ms, chapter_delay_ms, cache_dir, cache_generation) are read from ./storybind.toml or the user config dir. CLI flags override config."
)]
pub struct Args {
    /// Story URL, or series URL (contains /series/se/).
    pub url: String,

    /// Output path. Default: {output_dir}/{title}.{ext}.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Output format: epub or json.
    #[arg(long, default_value = "epub", value_parser = parse_format)]
    pub format: OutputFormat,

    /// HTTP User-Agent (overrides config).
    #[arg(long)]
    pub user_agent: Option<String>,

    /// Request timeout in seconds (overrides config; default 30).
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Proxy URL for all requests (overrides config).
    #[arg(long)]
    pub proxy: Option<String>,

    /// Cache fetched pages in this directory (overrides config).
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// Resolve title, author, and chapter list, print them, and exit without writing.
    #[arg(long)]
    pub dry_run: bool,

    /// Suppress progress output (errors only).
    #[arg(short, long)]
    pub quiet: bool,

    /// Verbose logging and full error chain.
    #[arg(long)]
    pub verbose: bool,
}

fn parse_format(s: &str) -> Result<OutputFormat, String> {
    match s.to_lowercase().as_str() {
        "epub" => Ok(OutputFormat::Epub),
        "json" => Ok(OutputFormat::Json),
        _ => Err(format!(
            "Invalid --format value: '{}'. Use epub or json.",
            s
        )),
    }
}

/// Default log level for the given flags; `RUST_LOG` still wins.
fn default_log_filter(quiet: bool, verbose: bool) -> &'static str {
    if quiet {
        "error"
    } else if verbose {
        "info"
    } else {
        "warn"
    }
}

/// Install the stderr tracing subscriber.
pub fn init_logging(args: &Args) {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_log_filter(args.quiet, args.verbose)));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Output path: explicit, or `{output_dir}/{title}.{ext}`.
fn output_path_for(
    explicit: Option<&Path>,
    output_dir: &Path,
    title: &str,
    format: OutputFormat,
) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }
    let epub_name = archive_file_name(title);
    let name = match format {
        OutputFormat::Epub => epub_name,
        OutputFormat::Json => {
            let stem = epub_name.trim_end_matches(".epub");
            format!("{}.json", stem)
        }
    };
    output_dir.join(name)
}

/// Ensure output path parent exists.
fn validate_output_path(path: &Path) -> Result<(), CliRunError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            return Err(CliRunError::InvalidInput(format!(
                "Cannot write output: {}: parent directory does not exist.",
                path.display()
            )));
        }
    }
    Ok(())
}

fn delays_from(config: Option<&Config>) -> Delays {
    let defaults = Delays::default();
    Delays {
        page: config
            .and_then(|c| c.page_delay_ms)
            .map(Duration::from_millis)
            .unwrap_or(defaults.page),
        chapter: config
            .and_then(|c| c.chapter_delay_ms)
            .map(Duration::from_millis)
            .unwrap_or(defaults.chapter),
    }
}

fn build_fetcher(args: &Args, config: Option<&Config>) -> Result<HttpFetcher, CliRunError> {
    let timeout_secs = args
        .timeout
        .or_else(|| config.and_then(|c| c.timeout_secs))
        .unwrap_or(DEFAULT_TIMEOUT_SECS);
    let mut builder = HttpFetcher::builder().timeout_secs(timeout_secs);
    if let Some(ua) = args
        .user_agent
        .clone()
        .or_else(|| config.and_then(|c| c.user_agent.clone()))
    {
        builder = builder.user_agent(ua);
    }
    if let Some(proxy) = args
        .proxy
        .clone()
        .or_else(|| config.and_then(|c| c.proxy.clone()))
    {
        builder = builder.proxy(proxy);
    }
    builder
        .build()
        .map_err(|e| CliRunError::InvalidInput(format!("Failed to create HTTP client: {}", e)))
}

fn render_progress(bar: &RefCell<Option<indicatif::ProgressBar>>, event: &ProgressEvent) {
    let mut state = bar.borrow_mut();
    let pb = state.get_or_insert_with(|| {
        let pb = indicatif::ProgressBar::new_spinner();
        if let Ok(style) = indicatif::ProgressStyle::default_spinner()
            .template("{spinner} {msg} ({elapsed})")
        {
            pb.set_style(style.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"));
        }
        pb.enable_steady_tick(Duration::from_millis(80));
        pb
    });
    match event {
        ProgressEvent::SeriesListed { title, total } => {
            pb.set_message(format!("{}: {} chapters", title, total));
        }
        ProgressEvent::Chapter {
            index,
            total,
            title,
        } => {
            pb.set_message(format!("Chapter {}/{}: {}", index, total, title));
        }
        ProgressEvent::Page { chapter, page } => {
            pb.set_message(format!("Chapter {}, page {}", chapter, page));
        }
    }
}

/// Cache directory: `--cache-dir`, else `cache_dir` from config. None disables caching.
fn cache_dir_for(args: &Args, config: Option<&Config>) -> Option<PathBuf> {
    args.cache_dir
        .clone()
        .or_else(|| config.and_then(|c| c.cache_dir.clone()))
}

/// Put the page cache rooted at `dir` in front of `inner`. Stale generations are evicted
/// and the run's first request is served network-first.
fn cached_fetcher<F: PageFetcher>(
    inner: F,
    dir: PathBuf,
    config: Option<&Config>,
    url: &str,
) -> Result<CachingFetcher<F, DirStore>, CliRunError> {
    let generation = config
        .and_then(|c| c.cache_generation.clone())
        .unwrap_or_else(|| DEFAULT_GENERATION.to_string());
    if !is_valid_generation(&generation) {
        return Err(CliRunError::InvalidInput(format!(
            "Invalid cache_generation '{}': use letters, digits, '.', '-' or '_'.",
            generation
        )));
    }
    tracing::info!(dir = %dir.display(), %generation, "page cache enabled");
    let mut fetcher =
        CachingFetcher::new(inner, DirStore::new(dir), generation).network_first(entry_url(url));
    fetcher.activate();
    Ok(fetcher)
}

fn write_json(book: &Book, path: &Path) -> Result<(), CliRunError> {
    let json = serde_json::to_vec_pretty(book)
        .map_err(|e| CliRunError::Output(format!("Failed to serialize JSON: {}", e)))?;
    write_atomically(path, &json)
        .map_err(|e| CliRunError::Output(format!("Failed to write {}: {}", path.display(), e)))
}

fn scrape_with<F: PageFetcher>(
    url: &str,
    fetcher: &mut F,
    options: &ScrapeOptions<'_>,
) -> Result<Book, CliRunError> {
    Ok(scrape_book(url, fetcher, options)?)
}

/// Entry point for the CLI. Returns Ok(()) on success; Err with exit code and message on failure.
pub fn run(args: &Args) -> Result<(), CliRunError> {
    let url = args.url.trim();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(CliRunError::InvalidInput(format!(
            "Expected a story or series URL starting with http(s)://, got '{}'.",
            url
        )));
    }

    let config = config::load_config().map_err(CliRunError::InvalidInput)?;
    let config = config.as_ref();

    let output_dir: PathBuf = config
        .and_then(|c| c.output_dir.clone())
        .unwrap_or_else(|| PathBuf::from("."));

    let http = build_fetcher(args, config)?;

    let progress_state: RefCell<Option<indicatif::ProgressBar>> = RefCell::new(None);
    let progress_cb = |event: &ProgressEvent| render_progress(&progress_state, event);
    let progress: Option<&dyn Fn(&ProgressEvent)> = if args.quiet || args.dry_run {
        None
    } else {
        Some(&progress_cb)
    };

    let options = ScrapeOptions {
        delays: delays_from(config),
        progress,
        toc_only: args.dry_run,
        ..ScrapeOptions::default()
    };

    let result = match cache_dir_for(args, config) {
        Some(dir) => cached_fetcher(http, dir, config, url)
            .and_then(|mut fetcher| scrape_with(url, &mut fetcher, &options)),
        None => {
            let mut fetcher = http;
            scrape_with(url, &mut fetcher, &options)
        }
    };

    if let Some(pb) = progress_state.borrow_mut().take() {
        pb.finish_and_clear();
    }
    let book = result?;

    let output_path = output_path_for(
        args.output.as_deref(),
        &output_dir,
        &book.title,
        args.format,
    );

    if args.dry_run {
        eprintln!("Title: {}", book.title);
        eprintln!("Author: {}", book.author);
        eprintln!("Chapters: {}", book.chapters.len());
        for (i, ch) in book.chapters.iter().enumerate() {
            eprintln!("  {}. {}", i + 1, ch.title);
        }
        eprintln!("Output: {}", output_path.display());
        return Ok(());
    }

    validate_output_path(&output_path)?;

    match args.format {
        OutputFormat::Epub => {
            let archive = assemble(&book.title, &book.author, &book.chapters)?;
            archive.write_to(&output_path)?;
        }
        OutputFormat::Json => write_json(&book, &output_path)?,
    }

    if !args.quiet {
        eprintln!("Wrote {}", output_path.display());
    }
    Ok(())
}
