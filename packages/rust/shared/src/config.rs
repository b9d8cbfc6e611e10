//! Application configuration for sitechat.
//!
//! User config lives at `~/.sitechat/sitechat.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SiteChatError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "sitechat.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".sitechat";

/// Built-in desktop user-agent pool used when none is configured.
pub const DEFAULT_USER_AGENTS: [&str; 5] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
];

// ---------------------------------------------------------------------------
// Config structs (matching sitechat.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Harvester settings.
    #[serde(default)]
    pub harvest: HarvestSection,

    /// Completion provider settings.
    #[serde(default)]
    pub provider: ProviderSection,

    /// Grounding instruction settings.
    #[serde(default)]
    pub grounding: GroundingSection,

    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerSection,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Display name used when `--name` is not given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
}

/// Which render backend the harvester drives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// Headless Chromium over the DevTools protocol (renders client-side script).
    #[default]
    Chromium,
    /// Plain HTTP GET of the served markup.
    Http,
}

/// `[harvest]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestSection {
    #[serde(default)]
    pub engine: EngineKind,

    /// Browser executable for the Chromium engine.
    #[serde(default = "default_browser_path")]
    pub browser_path: String,

    /// Maximum number of pages rendered at once.
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,

    #[serde(default = "default_navigation_timeout")]
    pub navigation_timeout_secs: u64,

    #[serde(default = "default_launch_timeout")]
    pub launch_timeout_secs: u64,

    #[serde(default = "default_viewport_width")]
    pub viewport_width: u32,

    #[serde(default = "default_viewport_height")]
    pub viewport_height: u32,

    /// User-agent pool; one entry is picked at random per page.
    #[serde(default = "default_user_agents")]
    pub user_agents: Vec<String>,

    /// Refuse loopback/private/link-local targets.
    #[serde(default = "default_true")]
    pub block_private_hosts: bool,

    /// Fail session start when any source could not be harvested.
    #[serde(default)]
    pub require_all_sources: bool,
}

impl Default for HarvestSection {
    fn default() -> Self {
        Self {
            engine: EngineKind::default(),
            browser_path: default_browser_path(),
            concurrency: default_concurrency(),
            navigation_timeout_secs: default_navigation_timeout(),
            launch_timeout_secs: default_launch_timeout(),
            viewport_width: default_viewport_width(),
            viewport_height: default_viewport_height(),
            user_agents: default_user_agents(),
            block_private_hosts: true,
            require_all_sources: false,
        }
    }
}

fn default_browser_path() -> String {
    "chromium".into()
}
fn default_concurrency() -> u32 {
    4
}
fn default_navigation_timeout() -> u64 {
    30
}
fn default_launch_timeout() -> u64 {
    20
}
fn default_viewport_width() -> u32 {
    1920
}
fn default_viewport_height() -> u32 {
    1080
}
fn default_user_agents() -> Vec<String> {
    DEFAULT_USER_AGENTS.iter().map(|s| s.to_string()).collect()
}
fn default_true() -> bool {
    true
}

/// `[provider]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSection {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Base URL of the OpenAI-compatible API.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl Default for ProviderSection {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            base_url: default_base_url(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_connect_timeout() -> u64 {
    30
}

/// `[grounding]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroundingSection {
    /// Upper bound on corpus characters placed in the system turn (0 = unbounded).
    #[serde(default = "default_max_corpus_chars")]
    pub max_corpus_chars: usize,
}

impl Default for GroundingSection {
    fn default() -> Self {
        Self {
            max_corpus_chars: default_max_corpus_chars(),
        }
    }
}

fn default_max_corpus_chars() -> usize {
    400_000
}

/// `[server]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_bind")]
    pub bind: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            max_body_size: default_max_body_size(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    3000
}
fn default_max_body_size() -> usize {
    8 * 1024 * 1024
}

// ---------------------------------------------------------------------------
// Runtime configs (merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime harvest configuration.
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    pub engine: EngineKind,
    pub browser_path: String,
    /// Worker-pool cap; always at least 1.
    pub concurrency: usize,
    pub navigation_timeout: Duration,
    pub launch_timeout: Duration,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub user_agents: Vec<String>,
    pub block_private_hosts: bool,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for HarvestConfig {
    fn from(config: &AppConfig) -> Self {
        let h = &config.harvest;
        Self {
            engine: h.engine,
            browser_path: h.browser_path.clone(),
            concurrency: (h.concurrency as usize).max(1),
            navigation_timeout: Duration::from_secs(h.navigation_timeout_secs),
            launch_timeout: Duration::from_secs(h.launch_timeout_secs),
            viewport_width: h.viewport_width,
            viewport_height: h.viewport_height,
            user_agents: h.user_agents.clone(),
            block_private_hosts: h.block_private_hosts,
        }
    }
}

/// Runtime completion-provider configuration.
#[derive(Clone)]
pub struct ProviderConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub connect_timeout: Duration,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

impl ProviderConfig {
    /// Merge the `[provider]` section with an already-resolved API key.
    pub fn from_app(config: &AppConfig, api_key: String) -> Self {
        let p = &config.provider;
        Self {
            api_key,
            base_url: p.base_url.clone(),
            model: p.model.clone(),
            temperature: p.temperature,
            max_tokens: p.max_tokens,
            connect_timeout: Duration::from_secs(p.connect_timeout_secs),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.sitechat/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| SiteChatError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.sitechat/sitechat.toml`).
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
    let content = std::fs::read_to_string(path).map_err(|e| SiteChatError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        SiteChatError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| SiteChatError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let content = toml::to_string_pretty(&AppConfig::default())
        .map_err(|e| SiteChatError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| SiteChatError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Resolve the provider API key from the configured env var.
pub fn validate_api_key(config: &AppConfig) -> Result<String> {
    let var_name = &config.provider.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Ok(val),
        _ => Err(SiteChatError::config(format!(
            "completion provider API key not found. Set the {var_name} environment variable."
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("navigation_timeout_secs"));
        assert!(toml_str.contains("OPENAI_API_KEY"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.harvest.concurrency, 4);
        assert_eq!(parsed.harvest.user_agents.len(), DEFAULT_USER_AGENTS.len());
        assert_eq!(parsed.provider.model, "gpt-4o");
        assert_eq!(parsed.provider.max_tokens, 4096);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[harvest]
engine = "http"
concurrency = 0

[provider]
model = "gpt-4o-mini"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.harvest.engine, EngineKind::Http);
        assert_eq!(config.harvest.navigation_timeout_secs, 30);
        assert_eq!(config.provider.model, "gpt-4o-mini");
        assert_eq!(config.provider.temperature, 0.7);
        assert_eq!(config.server.port, 3000);

        let harvest = HarvestConfig::from(&config);
        assert_eq!(harvest.concurrency, 1);
    }

    #[test]
    fn provider_config_debug_redacts_api_key() {
        let provider = ProviderConfig::from_app(&AppConfig::default(), "sk-secret-123".into());
        let debug = format!("{provider:?}");
        assert!(!debug.contains("sk-secret-123"));
        assert!(debug.contains("<redacted>"));
        assert!(debug.contains("gpt-4o"));
    }

    #[test]
    fn harvest_config_from_app_config() {
        let harvest = HarvestConfig::from(&AppConfig::default());
        assert_eq!(harvest.engine, EngineKind::Chromium);
        assert_eq!(harvest.navigation_timeout, Duration::from_secs(30));
        assert_eq!(harvest.viewport_width, 1920);
        assert_eq!(harvest.viewport_height, 1080);
        assert!(harvest.block_private_hosts);
    }

    #[test]
    fn api_key_validation() {
        let mut config = AppConfig::default();
        // Use a unique env var name to avoid interfering with other tests
        config.provider.api_key_env = "SITECHAT_TEST_NONEXISTENT_KEY_12345".into();
        let result = validate_api_key(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("API key not found"));
    }
}
