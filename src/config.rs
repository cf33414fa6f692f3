//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and `REFERRAL_*` environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub realtime: RealtimeConfig,

    #[serde(default)]
    pub referral: ReferralConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Hosted backend (auth + query) configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    /// Project base URL, e.g. `https://xyzcompany.supabase.co`
    #[serde(default = "default_backend_url")]
    pub url: String,

    /// Public (anon) API key sent as `apikey`
    #[serde(default)]
    pub anon_key: String,

    /// Access token of the signed-in user. Without one the user is
    /// treated as not authenticated.
    #[serde(default)]
    pub access_token: Option<String>,

    /// Table or view holding one stats row per user
    #[serde(default = "default_stats_table")]
    pub stats_table: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_backend_url() -> String {
    "http://localhost:54321".to_string()
}

fn default_stats_table() -> String {
    "user_stats".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: default_backend_url(),
            anon_key: String::new(),
            access_token: None,
            stats_table: default_stats_table(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl BackendConfig {
    /// Base URL without a trailing slash
    pub fn base_url(&self) -> &str {
        self.url.trim_end_matches('/')
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Access token, ignoring an empty string
    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref().filter(|t| !t.is_empty())
    }
}

/// Realtime subscription configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RealtimeConfig {
    /// Channel name
    #[serde(default = "default_channel")]
    pub channel: String,

    #[serde(default = "default_schema")]
    pub schema: String,

    /// Table whose changes trigger a refetch
    #[serde(default = "default_table")]
    pub table: String,

    /// Event mask: `*`, `INSERT`, `UPDATE` or `DELETE`
    #[serde(default = "default_event")]
    pub event: String,

    #[serde(default = "default_heartbeat")]
    pub heartbeat_secs: u64,

    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    /// Merge events arriving within this window into one refetch (0 = off)
    #[serde(default)]
    pub coalesce_window_ms: u64,
}

fn default_channel() -> String {
    "earnings_changes".to_string()
}

fn default_schema() -> String {
    "public".to_string()
}

fn default_table() -> String {
    "earnings".to_string()
}

fn default_event() -> String {
    "*".to_string()
}

fn default_heartbeat() -> u64 {
    30
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            channel: default_channel(),
            schema: default_schema(),
            table: default_table(),
            event: default_event(),
            heartbeat_secs: default_heartbeat(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            coalesce_window_ms: 0,
        }
    }
}

impl RealtimeConfig {
    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs.max(1))
    }

    pub fn coalesce_window(&self) -> Option<Duration> {
        (self.coalesce_window_ms > 0).then(|| Duration::from_millis(self.coalesce_window_ms))
    }
}

/// Referral link configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ReferralConfig {
    #[serde(default = "default_referral_link")]
    pub link: String,
}

fn default_referral_link() -> String {
    "ref.referralpro.com/user123".to_string()
}

impl Default for ReferralConfig {
    fn default() -> Self {
        Self {
            link: default_referral_link(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("referral-dashboard").join("config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                match Self::load_with_env(path) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("REFERRAL_BACKEND_URL") {
            self.backend.url = url;
        }
        if let Ok(key) = std::env::var("REFERRAL_ANON_KEY") {
            self.backend.anon_key = key;
        }
        if let Ok(token) = std::env::var("REFERRAL_ACCESS_TOKEN") {
            self.backend.access_token = Some(token);
        }
        if let Ok(table) = std::env::var("REFERRAL_STATS_TABLE") {
            self.backend.stats_table = table;
        }

        if let Ok(channel) = std::env::var("REFERRAL_CHANNEL") {
            self.realtime.channel = channel;
        }
        if let Ok(table) = std::env::var("REFERRAL_TABLE") {
            self.realtime.table = table;
        }

        if let Ok(link) = std::env::var("REFERRAL_LINK") {
            self.referral.link = link;
        }

        if let Ok(level) = std::env::var("REFERRAL_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("REFERRAL_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Referral Dashboard Configuration
#
# Environment variables override these settings:
# - REFERRAL_BACKEND_URL
# - REFERRAL_ANON_KEY
# - REFERRAL_ACCESS_TOKEN
# - REFERRAL_STATS_TABLE
# - REFERRAL_CHANNEL
# - REFERRAL_TABLE
# - REFERRAL_LINK
# - REFERRAL_LOG_LEVEL
# - REFERRAL_LOG_FORMAT

[backend]
# Project base URL
url = "http://localhost:54321"

# Public anon key
anon_key = ""

# Access token of the signed-in user (leave unset to browse signed out)
# access_token = ""

# Table or view with one stats row per user
stats_table = "user_stats"

# Request timeout in seconds
request_timeout_secs = 30

[realtime]
# Channel name
channel = "earnings_changes"

# Table to watch for changes
schema = "public"
table = "earnings"

# Event mask: "*", "INSERT", "UPDATE" or "DELETE"
event = "*"

# Heartbeat interval in seconds
heartbeat_secs = 30

# Reconnect attempts before the subscription is given up
max_reconnect_attempts = 5

# Merge events arriving within this many milliseconds (0 = refetch per event)
coalesce_window_ms = 0

[referral]
# Link copied by the "Copy" action
link = "ref.referralpro.com/user123"

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.realtime.channel, "earnings_changes");
        assert_eq!(config.realtime.schema, "public");
        assert_eq!(config.realtime.table, "earnings");
        assert_eq!(config.realtime.event, "*");
        assert_eq!(config.realtime.coalesce_window(), None);
        assert_eq!(config.referral.link, "ref.referralpro.com/user123");
        assert_eq!(config.backend.stats_table, "user_stats");
        assert!(config.backend.access_token().is_none());
    }

    #[test]
    fn test_generated_config_parses() {
        let config: Config = toml::from_str(&generate_default_config()).unwrap();
        assert_eq!(config.backend.url, "http://localhost:54321");
        assert_eq!(config.realtime.max_reconnect_attempts, 5);
        assert_eq!(config.logging.format, "pretty");
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[backend]\nurl = \"https://demo.supabase.co/\"\naccess_token = \"\"\n\n[realtime]\ncoalesce_window_ms = 250"
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.backend.base_url(), "https://demo.supabase.co");
        assert!(config.backend.access_token().is_none());
        assert_eq!(
            config.realtime.coalesce_window(),
            Some(Duration::from_millis(250))
        );
        assert_eq!(config.realtime.table, "earnings");
    }

    #[test]
    fn test_load_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[backend\nurl = ").unwrap();

        let result = Config::load(file.path());
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load(Path::new("/nonexistent/referral/config.toml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }
}
