//! `storybind.toml` settings. A file in the working directory shadows the per-user one at
//! `<config_dir>/storybind/config.toml`; the two are never merged. Command-line flags win over
//! whichever file was loaded.

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// File name looked up in the working directory.
const LOCAL_FILE: &str = "storybind.toml";

/// Settings from the config file. Absent keys leave the built-in defaults in place.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct Config {
    /// Directory for `{title}.epub` / `{title}.json` when `-o` is not given.
    pub output_dir: Option<PathBuf>,
    pub user_agent: Option<String>,
    pub timeout_secs: Option<u64>,
    /// e.g. `http://127.0.0.1:3128`; applied to every page request.
    pub proxy: Option<String>,
    /// Pause before each physical page after the first (default 300).
    pub page_delay_ms: Option<u64>,
    /// Pause before each series chapter after the first (default 500).
    pub chapter_delay_ms: Option<u64>,
    /// Root of the page cache; entries go under `<cache_dir>/storybind/`. Unset disables caching.
    pub cache_dir: Option<PathBuf>,
    /// Active cache generation (default `v1`). Changing it drops pages cached under the old one.
    pub cache_generation: Option<String>,
}

/// Candidate config files, highest precedence first.
fn search_paths(cwd: &Path) -> Vec<PathBuf> {
    let mut paths = vec![cwd.join(LOCAL_FILE)];
    if let Some(d) = dirs::config_dir() {
        paths.push(d.join("storybind").join("config.toml"));
    }
    paths
}

/// Parse one config file.
fn read_config(path: &Path) -> Result<Config, String> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("config file {} is unreadable: {}", path.display(), e))?;
    toml::from_str(&text).map_err(|e| format!("config file {} is not valid: {}", path.display(), e))
}

/// Load the first config file that exists. No file at all is `Ok(None)`; a file that exists
/// but cannot be read or parsed is an error rather than being skipped.
pub fn load_config() -> Result<Option<Config>, String> {
    let cwd = std::env::current_dir()
        .map_err(|e| format!("working directory is unavailable: {}", e))?;
    match search_paths(&cwd).into_iter().find(|p| p.is_file()) {
        Some(path) => {
            let config = read_config(&path)?;
            tracing::debug!(path = %path.display(), "loaded config");
            Ok(Some(config))
        }
        None => Ok(None),
    }
}
