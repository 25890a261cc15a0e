//! Application configuration for Mojarung.
//!
//! User config lives at `~/.mojarung/mojarung.toml`.
//! CLI flags override config file values, which override defaults.
//! Secrets never live in the file: it only names the environment variables
//! that hold them.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{MojarungError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "mojarung.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".mojarung";

// ---------------------------------------------------------------------------
// Config structs (matching mojarung.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Database location.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Token issuing and cookie settings.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Chat-completions provider.
    #[serde(default)]
    pub llm: LlmConfig,

    /// News scraping.
    #[serde(default)]
    pub parsers: ParsersConfig,

    /// Near-duplicate filtering.
    #[serde(default)]
    pub dedup: DedupSettings,

    /// Company listing enrichment.
    #[serde(default)]
    pub companies: CompaniesConfig,

    /// Brokerage sandbox and social feed endpoints.
    #[serde(default)]
    pub invest: InvestConfig,
}

/// `[server]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Socket address to bind.
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Allowed CORS origins. Empty means any origin.
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            cors_origins: Vec::new(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8000".into()
}

/// `[database]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the libSQL database file (`~` is expanded).
    #[serde(default = "default_database_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

impl DatabaseConfig {
    /// The database path with a leading `~` expanded.
    pub fn resolved_path(&self) -> Result<PathBuf> {
        expand_home(&self.path)
    }
}

fn default_database_path() -> String {
    "~/.mojarung/mojarung.db".into()
}

/// `[auth]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Name of the env var holding the token signing secret.
    #[serde(default = "default_secret_key_env")]
    pub secret_key_env: String,

    /// Access token lifetime.
    #[serde(default = "default_token_expiry")]
    pub access_token_expire_minutes: i64,

    /// Whether the auth cookie carries the `Secure` attribute.
    #[serde(default = "default_true")]
    pub cookie_secure: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret_key_env: default_secret_key_env(),
            access_token_expire_minutes: default_token_expiry(),
            cookie_secure: true,
        }
    }
}

fn default_secret_key_env() -> String {
    "MOJARUNG_SECRET_KEY".into()
}
fn default_token_expiry() -> i64 {
    30
}
fn default_true() -> bool {
    true
}

/// `[llm]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL of an OpenAI-compatible API (without `/chat/completions`).
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    /// Name of the env var holding the API key.
    #[serde(default = "default_llm_api_key_env")]
    pub api_key_env: String,

    /// Default model.
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Default completion budget.
    #[serde(default = "default_llm_max_tokens")]
    pub max_tokens: u32,

    /// Default sampling temperature.
    #[serde(default = "default_llm_temperature")]
    pub temperature: f32,

    /// Request timeout.
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            api_key_env: default_llm_api_key_env(),
            model: default_llm_model(),
            max_tokens: default_llm_max_tokens(),
            temperature: default_llm_temperature(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

fn default_llm_base_url() -> String {
    "https://llm.chutes.ai/v1".into()
}
fn default_llm_api_key_env() -> String {
    "LLM_API_KEY".into()
}
fn default_llm_model() -> String {
    "deepseek-ai/DeepSeek-V3-0324".into()
}
fn default_llm_max_tokens() -> u32 {
    2024
}
fn default_llm_temperature() -> f32 {
    0.7
}
fn default_llm_timeout() -> u64 {
    120
}

/// `[parsers]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsersConfig {
    /// Enabled news sources, in run order.
    #[serde(default = "default_sources")]
    pub sources: Vec<String>,

    /// Maximum articles taken from each listing page.
    #[serde(default = "default_max_articles")]
    pub max_articles: usize,

    /// Pause between article fetches.
    #[serde(default = "default_parser_rate_limit")]
    pub rate_limit_ms: u64,

    /// Per-request timeout.
    #[serde(default = "default_parser_timeout")]
    pub timeout_secs: u64,

    /// Saved BCS Express article page; enables the `bcs` source when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bcs_file: Option<String>,

    /// Directory for `raw_news.json` / `deduplicated_news.json` snapshots.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dump_dir: Option<String>,
}

impl Default for ParsersConfig {
    fn default() -> Self {
        Self {
            sources: default_sources(),
            max_articles: default_max_articles(),
            rate_limit_ms: default_parser_rate_limit(),
            timeout_secs: default_parser_timeout(),
            bcs_file: None,
            dump_dir: None,
        }
    }
}

fn default_sources() -> Vec<String> {
    vec!["rbc".into(), "kommersant".into(), "tradingview".into()]
}
fn default_max_articles() -> usize {
    10
}
fn default_parser_rate_limit() -> u64 {
    500
}
fn default_parser_timeout() -> u64 {
    15
}

/// `[dedup]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupSettings {
    /// Cosine similarity above which two articles are duplicates.
    #[serde(default = "default_threshold")]
    pub threshold: f32,

    /// Neighbours examined per article.
    #[serde(default = "default_neighbors")]
    pub neighbors: usize,

    /// Trees in the nearest-neighbour forest.
    #[serde(default = "default_trees")]
    pub trees: usize,

    /// `"hashing"` (local) or `"remote"` (embeddings API).
    #[serde(default = "default_embedder")]
    pub embedder: String,

    /// Vector size of the hashing embedder.
    #[serde(default = "default_dimension")]
    pub dimension: usize,

    /// Remote embeddings API.
    #[serde(default)]
    pub remote: RemoteEmbedderConfig,
}

impl Default for DedupSettings {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            neighbors: default_neighbors(),
            trees: default_trees(),
            embedder: default_embedder(),
            dimension: default_dimension(),
            remote: RemoteEmbedderConfig::default(),
        }
    }
}

fn default_threshold() -> f32 {
    0.7
}
fn default_neighbors() -> usize {
    5
}
fn default_trees() -> usize {
    10
}
fn default_embedder() -> String {
    "hashing".into()
}
fn default_dimension() -> usize {
    384
}

/// `[dedup.remote]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteEmbedderConfig {
    /// Base URL of an OpenAI-compatible API (without `/embeddings`).
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    /// Embedding model.
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Name of the env var holding the API key.
    #[serde(default = "default_llm_api_key_env")]
    pub api_key_env: String,
}

impl Default for RemoteEmbedderConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            model: default_embedding_model(),
            api_key_env: default_llm_api_key_env(),
        }
    }
}

fn default_embedding_model() -> String {
    "sentence-transformers/all-MiniLM-L6-v2".into()
}

/// `[companies]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompaniesConfig {
    /// Listing page with the Russian stock universe.
    #[serde(default = "default_listing_url")]
    pub listing_url: String,

    /// Pause between companies.
    #[serde(default = "default_companies_rate_limit")]
    pub rate_limit_ms: u64,
}

impl Default for CompaniesConfig {
    fn default() -> Self {
        Self {
            listing_url: default_listing_url(),
            rate_limit_ms: default_companies_rate_limit(),
        }
    }
}

fn default_listing_url() -> String {
    "https://ru.tradingview.com/markets/stocks-russia/market-movers-all-stocks/".into()
}
fn default_companies_rate_limit() -> u64 {
    1000
}

/// `[invest]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvestConfig {
    /// REST gateway of the brokerage sandbox.
    #[serde(default = "default_sandbox_base_url")]
    pub sandbox_base_url: String,

    /// Social feed API.
    #[serde(default = "default_pulse_base_url")]
    pub pulse_base_url: String,

    /// Per-request timeout.
    #[serde(default = "default_invest_timeout")]
    pub timeout_secs: u64,
}

impl Default for InvestConfig {
    fn default() -> Self {
        Self {
            sandbox_base_url: default_sandbox_base_url(),
            pulse_base_url: default_pulse_base_url(),
            timeout_secs: default_invest_timeout(),
        }
    }
}

fn default_sandbox_base_url() -> String {
    "https://sandbox-invest-public-api.tinkoff.ru/rest".into()
}
fn default_pulse_base_url() -> String {
    "https://www.tbank.ru/api/invest-gw/social/v1".into()
}
fn default_invest_timeout() -> u64 {
    30
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.mojarung/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| MojarungError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.mojarung/mojarung.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
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
    let content = std::fs::read_to_string(path).map_err(|e| MojarungError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| MojarungError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| MojarungError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| MojarungError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| MojarungError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_home(path: &str) -> Result<PathBuf> {
    match path.strip_prefix("~/") {
        Some(rest) => {
            let home = dirs::home_dir()
                .ok_or_else(|| MojarungError::config("could not determine home directory"))?;
            Ok(home.join(rest))
        }
        None => Ok(PathBuf::from(path)),
    }
}

fn read_env(var_name: &str) -> Option<String> {
    std::env::var(var_name).ok().filter(|v| !v.is_empty())
}

/// Read the LLM API key from the env var named in config.
pub fn validate_llm_key(config: &AppConfig) -> Result<String> {
    let var_name = &config.llm.api_key_env;
    read_env(var_name).ok_or_else(|| {
        MojarungError::config(format!(
            "LLM API key not found. Set the {var_name} environment variable."
        ))
    })
}

/// Read the token signing secret from the env var named in config.
pub fn secret_key(config: &AppConfig) -> Result<String> {
    let var_name = &config.auth.secret_key_env;
    read_env(var_name).ok_or_else(|| {
        MojarungError::config(format!(
            "token signing secret not found. Set the {var_name} environment variable."
        ))
    })
}

/// Read the remote embeddings key; `None` when the variable is unset.
pub fn embeddings_key(config: &AppConfig) -> Option<String> {
    read_env(&config.dedup.remote.api_key_env)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("MOJARUNG_SECRET_KEY"));
        assert!(toml_str.contains("deepseek-ai/DeepSeek-V3-0324"));
        assert!(!toml_str.contains("dump_dir"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.llm.max_tokens, 2024);
        assert_eq!(parsed.auth.access_token_expire_minutes, 30);
        assert_eq!(parsed.parsers.sources, vec!["rbc", "kommersant", "tradingview"]);
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let toml_str = r#"
[server]
bind = "127.0.0.1:9000"

[dedup]
threshold = 0.85
embedder = "remote"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.server.bind, "127.0.0.1:9000");
        assert!((config.dedup.threshold - 0.85).abs() < f32::EPSILON);
        assert_eq!(config.dedup.neighbors, 5);
        assert_eq!(config.dedup.remote.api_key_env, "LLM_API_KEY");
        assert_eq!(config.parsers.rate_limit_ms, 500);
    }

    #[test]
    fn expand_home_leaves_absolute_paths() {
        let path = expand_home("/var/lib/mojarung.db").expect("expand");
        assert_eq!(path, PathBuf::from("/var/lib/mojarung.db"));
    }

    #[test]
    fn missing_secrets_are_reported() {
        let mut config = AppConfig::default();
        // Unique env var names to avoid interfering with other tests
        config.llm.api_key_env = "MJ_TEST_NONEXISTENT_LLM_KEY_12345".into();
        config.auth.secret_key_env = "MJ_TEST_NONEXISTENT_SECRET_12345".into();

        let err = validate_llm_key(&config).unwrap_err();
        assert!(err.to_string().contains("MJ_TEST_NONEXISTENT_LLM_KEY_12345"));
        assert!(secret_key(&config).is_err());
    }
}
