//! Application configuration for the dredger.
//!
//! User config lives at `~/.dredger/dredger.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DredgerError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "dredger.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".dredger";

/// Default database file name inside the config directory.
const DB_FILE_NAME: &str = "dredger.db";

/// User-Agent sent with every page and aggregator fetch.
pub const USER_AGENT: &str = concat!("TheDredger/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Config structs (matching dredger.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Crawl behaviour of the enrichment pipeline.
    #[serde(default)]
    pub dredge: DredgeSection,

    /// Local language-model service.
    #[serde(default)]
    pub ollama: OllamaConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Database path. Defaults to `~/.dredger/dredger.db`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_path: Option<PathBuf>,

    /// Number of concurrent dredge workers.
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            workers: default_workers(),
        }
    }
}

fn default_workers() -> usize {
    4
}

/// `[dredge]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DredgeSection {
    /// Hard timeout for a single page fetch.
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,

    /// Response bodies are truncated to this many bytes before parsing.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Lower bound of the random delay before each fetch.
    #[serde(default = "default_jitter_min")]
    pub jitter_min_ms: u64,

    /// Upper bound (exclusive) of the random delay before each fetch.
    #[serde(default = "default_jitter_max")]
    pub jitter_max_ms: u64,

    /// User-Agent header for page fetches.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for DredgeSection {
    fn default() -> Self {
        Self {
            fetch_timeout_secs: default_fetch_timeout(),
            max_body_bytes: default_max_body_bytes(),
            jitter_min_ms: default_jitter_min(),
            jitter_max_ms: default_jitter_max(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_fetch_timeout() -> u64 {
    10
}
fn default_max_body_bytes() -> usize {
    1 << 20
}
fn default_jitter_min() -> u64 {
    200
}
fn default_jitter_max() -> u64 {
    800
}
fn default_user_agent() -> String {
    USER_AGENT.into()
}

/// `[ollama]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    /// Base URL of the Ollama HTTP API.
    #[serde(default = "default_ollama_url")]
    pub base_url: String,

    /// Model used for summaries and tags.
    #[serde(default = "default_model")]
    pub model: String,

    /// Timeout for one summarize call.
    #[serde(default = "default_ollama_timeout")]
    pub timeout_secs: u64,

    /// Timeout for the health check made before each run.
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout_secs: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: default_ollama_url(),
            model: default_model(),
            timeout_secs: default_ollama_timeout(),
            ping_timeout_secs: default_ping_timeout(),
        }
    }
}

fn default_ollama_url() -> String {
    "http://localhost:11434".into()
}
fn default_model() -> String {
    "gemma3:4b".into()
}
fn default_ollama_timeout() -> u64 {
    60
}
fn default_ping_timeout() -> u64 {
    2
}

// ---------------------------------------------------------------------------
// Dredge config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime pipeline configuration, merged from config file and CLI flags.
#[derive(Debug, Clone)]
pub struct DredgeConfig {
    /// Number of concurrent workers (at least 1).
    pub workers: usize,
    pub fetch_timeout: Duration,
    pub max_body_bytes: usize,
    pub jitter_min: Duration,
    pub jitter_max: Duration,
    pub user_agent: String,
    pub ollama_url: String,
    pub ollama_model: String,
    pub summarize_timeout: Duration,
    pub ping_timeout: Duration,
}

impl Default for DredgeConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for DredgeConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            workers: config.defaults.workers.max(1),
            fetch_timeout: Duration::from_secs(config.dredge.fetch_timeout_secs),
            max_body_bytes: config.dredge.max_body_bytes,
            jitter_min: Duration::from_millis(config.dredge.jitter_min_ms),
            jitter_max: Duration::from_millis(config.dredge.jitter_max_ms),
            user_agent: config.dredge.user_agent.clone(),
            ollama_url: config.ollama.base_url.trim_end_matches('/').to_string(),
            ollama_model: config.ollama.model.clone(),
            summarize_timeout: Duration::from_secs(config.ollama.timeout_secs),
            ping_timeout: Duration::from_secs(config.ollama.ping_timeout_secs),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.dredger/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| DredgerError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.dredger/dredger.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Resolve the database path: the configured one, or `~/.dredger/dredger.db`.
pub fn default_db_path(config: &AppConfig) -> Result<PathBuf> {
    match &config.defaults.db_path {
        Some(path) => Ok(path.clone()),
        None => Ok(config_dir()?.join(DB_FILE_NAME)),
    }
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| DredgerError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| DredgerError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| DredgerError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| DredgerError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| DredgerError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("workers"));
        assert!(toml_str.contains("gemma3:4b"));
        assert!(!toml_str.contains("db_path"));
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[defaults]
workers = 8

[ollama]
model = "llama3.2"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.defaults.workers, 8);
        assert_eq!(config.ollama.model, "llama3.2");
        assert_eq!(config.ollama.base_url, "http://localhost:11434");
        assert_eq!(config.dredge.fetch_timeout_secs, 10);
    }

    #[test]
    fn dredge_config_from_app_config() {
        let app = AppConfig::default();
        let dredge = DredgeConfig::from(&app);
        assert_eq!(dredge.workers, 4);
        assert_eq!(dredge.fetch_timeout, Duration::from_secs(10));
        assert_eq!(dredge.summarize_timeout, Duration::from_secs(60));
        assert_eq!(dredge.ping_timeout, Duration::from_secs(2));
        assert_eq!(dredge.max_body_bytes, 1_048_576);
        assert!(dredge.user_agent.starts_with("TheDredger/"));
    }

    #[test]
    fn zero_workers_is_clamped() {
        let mut app = AppConfig::default();
        app.defaults.workers = 0;
        assert_eq!(DredgeConfig::from(&app).workers, 1);
    }

    #[test]
    fn ollama_url_trailing_slash_is_trimmed() {
        let mut app = AppConfig::default();
        app.ollama.base_url = "http://gpu-box:11434/".into();
        assert_eq!(DredgeConfig::from(&app).ollama_url, "http://gpu-box:11434");
    }

    #[test]
    fn explicit_db_path_wins() {
        let mut app = AppConfig::default();
        app.defaults.db_path = Some(PathBuf::from("/tmp/links.db"));
        assert_eq!(default_db_path(&app).unwrap(), PathBuf::from("/tmp/links.db"));
    }
}
