//! Configuration management for Crosspost

use secrecy::SecretString;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, Result};
use crate::types::PlatformId;

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub publish: PublishConfig,
    #[serde(default)]
    pub oauth: OAuthConfig,
    pub twitter: Option<PlatformConfig>,
    pub linkedin: Option<PlatformConfig>,
    pub instagram: Option<PlatformConfig>,
    pub facebook: Option<PlatformConfig>,
    pub tiktok: Option<PlatformConfig>,
    pub youtube: Option<PlatformConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PublishConfig {
    /// Upper bound for one platform's whole publish sequence
    #[serde(default = "default_adapter_timeout")]
    pub adapter_timeout_secs: u64,
    /// Timeout for a single vendor HTTP call
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,
    #[serde(default = "default_max_media_bytes")]
    pub max_media_bytes: u64,
    #[serde(default = "default_handle_cache")]
    pub handle_cache_secs: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OAuthConfig {
    #[serde(default = "default_state_ttl")]
    pub state_ttl_secs: u64,
    /// Public base URL the callback routes are reachable at
    #[serde(default = "default_redirect_base")]
    pub redirect_base: String,
}

/// Per-platform application settings
#[derive(Debug, Deserialize)]
pub struct PlatformConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub client_id: String,
    pub client_secret: Option<SecretString>,
    /// Override the vendor API base URL (tests, proxies)
    pub api_base: Option<String>,
    /// Override the OAuth scopes requested at connect time
    pub scopes: Option<Vec<String>>,
    /// Override the OAuth authorization endpoint
    pub authorize_url: Option<String>,
    /// Override the OAuth token endpoint
    pub token_url: Option<String>,
    /// TikTok post privacy level
    pub privacy_level: Option<String>,
    /// Graph API version for Facebook and Instagram
    pub graph_version: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_db_path() -> String {
    "~/.local/share/crosspost/crosspost.db".to_string()
}

fn default_adapter_timeout() -> u64 {
    120
}

fn default_http_timeout() -> u64 {
    60
}

fn default_max_media_bytes() -> u64 {
    512 * 1024 * 1024
}

fn default_handle_cache() -> i64 {
    24 * 60 * 60
}

fn default_state_ttl() -> u64 {
    600
}

fn default_redirect_base() -> String {
    "http://localhost:8080".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

impl PublishConfig {
    /// Largest JSON request body worth accepting: inline media arrives
    /// base64-encoded, so allow for the 4/3 expansion plus captions.
    pub fn request_body_limit(&self) -> usize {
        const ENVELOPE_BYTES: u64 = 64 * 1024;
        let encoded = self.max_media_bytes.saturating_mul(4) / 3;
        usize::try_from(encoded.saturating_add(ENVELOPE_BYTES)).unwrap_or(usize::MAX)
    }
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            adapter_timeout_secs: default_adapter_timeout(),
            http_timeout_secs: default_http_timeout(),
            max_media_bytes: default_max_media_bytes(),
            handle_cache_secs: default_handle_cache(),
        }
    }
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            state_ttl_secs: default_state_ttl(),
            redirect_base: default_redirect_base(),
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        self.bind.parse().map_err(|e: std::net::AddrParseError| {
            ConfigError::InvalidValue {
                field: "server.bind".to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    }
}

impl PublishConfig {
    pub fn adapter_timeout(&self) -> Duration {
        Duration::from_secs(self.adapter_timeout_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

impl OAuthConfig {
    pub fn state_ttl(&self) -> Duration {
        Duration::from_secs(self.state_ttl_secs)
    }

    /// Callback URL registered with the platform's developer app
    pub fn redirect_uri(&self, platform: PlatformId) -> String {
        format!(
            "{}/auth/{}/callback",
            self.redirect_base.trim_end_matches('/'),
            platform
        )
    }
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    /// Configuration with no platforms enabled
    pub fn default_config() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            publish: PublishConfig::default(),
            oauth: OAuthConfig::default(),
            twitter: None,
            linkedin: None,
            instagram: None,
            facebook: None,
            tiktok: None,
            youtube: None,
        }
    }

    pub fn platform(&self, id: PlatformId) -> Option<&PlatformConfig> {
        match id {
            PlatformId::Twitter => self.twitter.as_ref(),
            PlatformId::Linkedin => self.linkedin.as_ref(),
            PlatformId::Instagram => self.instagram.as_ref(),
            PlatformId::Facebook => self.facebook.as_ref(),
            PlatformId::Tiktok => self.tiktok.as_ref(),
            PlatformId::Youtube => self.youtube.as_ref(),
        }
    }

    /// Platforms with a config table and `enabled = true`
    pub fn enabled_platforms(&self) -> Vec<PlatformId> {
        PlatformId::ALL
            .into_iter()
            .filter(|id| self.platform(*id).is_some_and(|p| p.enabled))
            .collect()
    }

    fn validate(&self) -> Result<()> {
        self.server.socket_addr()?;
        if self.publish.adapter_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "publish.adapter_timeout_secs".to_string(),
                reason: "must be greater than zero".to_string(),
            }
            .into());
        }
        for id in self.enabled_platforms() {
            if self.platform(id).is_some_and(|p| p.client_id.trim().is_empty()) {
                return Err(ConfigError::MissingField(format!("{}.client_id", id)).into());
            }
        }
        Ok(())
    }
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("CROSSPOST_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("crosspost").join("config.toml"))
}

/// Expand `~` in a configured path
pub fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).to_string())
}
