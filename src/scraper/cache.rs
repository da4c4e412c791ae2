//! Generation-scoped page cache wrapped around any [PageFetcher].
//!
//! Entries live under a cache generation. Activating a generation deletes every other one.
//! Keys marked network-first go to the network and fall back to the cache on failure; every
//! other key is served from the cache when present and fetched (then stored) when not.
//! Challenge pages are never stored.

use crate::scraper::error::ScraperError;
use crate::scraper::fetch::{challenge_title, PageFetcher};
use scraper::Html;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_GENERATION: &str = "v1";

/// Key-value store partitioned by generation.
pub trait CacheStore {
    fn get(&self, generation: &str, key: &str) -> Option<String>;
    fn put(&mut self, generation: &str, key: &str, value: &str);
    fn generations(&self) -> Vec<String>;
    fn evict_generation(&mut self, generation: &str);
}

/// In-process store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: HashMap<String, HashMap<String, String>>,
}

impl CacheStore for MemoryStore {
    fn get(&self, generation: &str, key: &str) -> Option<String> {
        self.entries.get(generation)?.get(key).cloned()
    }

    fn put(&mut self, generation: &str, key: &str, value: &str) {
        self.entries
            .entry(generation.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
    }

    fn generations(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    fn evict_generation(&mut self, generation: &str) {
        self.entries.remove(generation);
    }
}

/// Subdirectory of the cache root that holds every generation.
const CACHE_SUBDIR: &str = "storybind";
/// Prefix of each generation directory under [CACHE_SUBDIR].
const GENERATION_PREFIX: &str = "gen-";

/// On-disk store: `<root>/storybind/gen-<generation>/<sha256(key)>.html`.
///
/// Only `gen-*` directories inside `<root>/storybind` are ever listed or removed, so the root
/// may be shared with unrelated files. Generation names are limited to ASCII alphanumerics,
/// `.`, `-` and `_`; any other name disables caching for that generation.
/// I/O failures are logged and treated as misses so a broken cache never fails a run.
#[derive(Debug, Clone)]
pub struct DirStore {
    root: PathBuf,
}

impl DirStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn base(&self) -> PathBuf {
        self.root.join(CACHE_SUBDIR)
    }

    fn generation_dir(&self, generation: &str) -> Option<PathBuf> {
        if !is_valid_generation(generation) {
            tracing::warn!(generation, "unusable cache generation name; caching disabled");
            return None;
        }
        Some(self.base().join(format!("{}{}", GENERATION_PREFIX, generation)))
    }

    fn entry_path(&self, generation: &str, key: &str) -> Option<PathBuf> {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        let hash = format!("{:x}", hasher.finalize());
        Some(self.generation_dir(generation)?.join(format!("{}.html", hash)))
    }
}

/// Non-empty, not `.`/`..`, and only `[A-Za-z0-9._-]`.
pub fn is_valid_generation(generation: &str) -> bool {
    !generation.is_empty()
        && generation != "."
        && generation != ".."
        && generation
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
}

impl CacheStore for DirStore {
    fn get(&self, generation: &str, key: &str) -> Option<String> {
        fs::read_to_string(self.entry_path(generation, key)?).ok()
    }

    fn put(&mut self, generation: &str, key: &str, value: &str) {
        let Some(path) = self.entry_path(generation, key) else {
            return;
        };
        if let Some(parent) = path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                tracing::warn!(path = %parent.display(), "cannot create cache dir: {e}");
                return;
            }
        }
        if let Err(e) = fs::write(&path, value) {
            tracing::warn!(path = %path.display(), "cannot write cache entry: {e}");
        }
    }

    fn generations(&self) -> Vec<String> {
        let Ok(dir) = fs::read_dir(self.base()) else {
            return Vec::new();
        };
        dir.filter_map(|e| e.ok())
            .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .filter_map(|e| e.file_name().into_string().ok())
            .filter_map(|name| name.strip_prefix(GENERATION_PREFIX).map(str::to_string))
            .filter(|generation| is_valid_generation(generation))
            .collect()
    }

    fn evict_generation(&mut self, generation: &str) {
        let Some(dir) = self.generation_dir(generation) else {
            return;
        };
        if let Err(e) = fs::remove_dir_all(&dir) {
            tracing::warn!(path = %dir.display(), "cannot evict cache generation: {e}");
        }
    }
}

/// Read-through cache in front of another fetcher.
#[derive(Debug)]
pub struct CachingFetcher<F, S> {
    inner: F,
    store: S,
    generation: String,
    network_first: HashSet<String>,
}

impl<F: PageFetcher, S: CacheStore> CachingFetcher<F, S> {
    pub fn new(inner: F, store: S, generation: impl Into<String>) -> Self {
        Self {
            inner,
            store,
            generation: generation.into(),
            network_first: HashSet::new(),
        }
    }

    /// Serve `url` network-first instead of cache-first.
    pub fn network_first(mut self, url: impl Into<String>) -> Self {
        self.network_first.insert(url.into());
        self
    }

    /// Delete every generation except the current one.
    pub fn activate(&mut self) {
        for generation in self.store.generations() {
            if generation != self.generation {
                tracing::info!(%generation, "evicting stale cache generation");
                self.store.evict_generation(&generation);
            }
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_inner(self) -> F {
        self.inner
    }

    fn fetch_and_store(&mut self, url: &str) -> Result<String, ScraperError> {
        let body = self.inner.fetch_html(url)?;
        if challenge_title(&Html::parse_document(&body)).is_none() {
            self.store.put(&self.generation, url, &body);
        }
        Ok(body)
    }
}

impl<F: PageFetcher, S: CacheStore> PageFetcher for CachingFetcher<F, S> {
    fn fetch_html(&mut self, url: &str) -> Result<String, ScraperError> {
        if self.network_first.contains(url) {
            return match self.fetch_and_store(url) {
                Ok(body) => Ok(body),
                Err(e) => match self.store.get(&self.generation, url) {
                    Some(body) => {
                        tracing::warn!(url, "network failed ({e}); serving cached copy");
                        Ok(body)
                    }
                    None => Err(e),
                },
            };
        }
        if let Some(body) = self.store.get(&self.generation, url) {
            tracing::debug!(url, "cache hit");
            return Ok(body);
        }
        self.fetch_and_store(url)
    }
}
