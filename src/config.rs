//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub tibber: TibberConfig,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub collector: CollectorConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Tibber API access
#[derive(Debug, Clone, Deserialize)]
pub struct TibberConfig {
    /// Personal access token; collection is disabled without one
    #[serde(default)]
    pub token: String,

    /// Home used for the real-time subscription
    #[serde(default)]
    pub home_id: Option<String>,

    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_ws_endpoint")]
    pub ws_endpoint: String,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_endpoint() -> String {
    "https://api.tibber.com/v1-beta/gql".to_string()
}

fn default_ws_endpoint() -> String {
    "wss://websocket-api.tibber.com/v1-beta/gql/subscriptions".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

impl Default for TibberConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            home_id: None,
            endpoint: default_endpoint(),
            ws_endpoint: default_ws_endpoint(),
            timeout_secs: default_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

impl TibberConfig {
    pub fn has_token(&self) -> bool {
        !self.token.trim().is_empty()
    }
}

/// API server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Dashboard title reported by the API
    #[serde(default = "default_title")]
    pub title: String,

    #[serde(default = "default_max_live_connections")]
    pub max_live_connections: usize,

    /// Interval between SSE keep-alive comments
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_title() -> String {
    "Energy Dashboard".to_string()
}

fn default_max_live_connections() -> usize {
    1000
}

fn default_keep_alive() -> u64 {
    15
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            title: default_title(),
            max_live_connections: default_max_live_connections(),
            keep_alive_secs: default_keep_alive(),
        }
    }
}

impl ApiConfig {
    /// Get the socket address string
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Energy store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_database")]
    pub database: String,
}

fn default_database() -> String {
    dirs::data_local_dir()
        .map(|p| p.join("wattboard").join("energy.db").to_string_lossy().to_string())
        .unwrap_or_else(|| "./energy_data.db".to_string())
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: default_database(),
        }
    }
}

/// Collection schedule
#[derive(Debug, Clone, Deserialize)]
pub struct CollectorConfig {
    #[serde(default = "default_price_interval")]
    pub price_interval_mins: u64,

    /// Local hour of the nightly energy refresh
    #[serde(default = "default_energy_refresh_hour")]
    pub energy_refresh_hour: u32,

    /// Number of daily consumption/production rows fetched per refresh
    #[serde(default = "default_energy_days")]
    pub energy_days: u32,

    #[serde(default = "default_retention_hours")]
    pub retention_hours: u64,

    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_secs: u64,

    /// Pause between homes when refreshing
    #[serde(default = "default_home_pause")]
    pub home_pause_ms: u64,
}

fn default_price_interval() -> u64 {
    15
}

fn default_energy_refresh_hour() -> u32 {
    2
}

fn default_energy_days() -> u32 {
    7
}

fn default_retention_hours() -> u64 {
    24
}

fn default_reconnect_delay() -> u64 {
    10
}

fn default_home_pause() -> u64 {
    500
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            price_interval_mins: default_price_interval(),
            energy_refresh_hour: default_energy_refresh_hour(),
            energy_days: default_energy_days(),
            retention_hours: default_retention_hours(),
            reconnect_delay_secs: default_reconnect_delay(),
            home_pause_ms: default_home_pause(),
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

    pub file: Option<String>,
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
            file: None,
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

        Self::parse(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
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
            dirs::config_dir().map(|p| p.join("wattboard").join("config.toml")),
            Some(PathBuf::from("/etc/wattboard/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path_opt in config_paths.iter().flatten() {
            if path_opt.exists() {
                match Self::load_with_env(path_opt) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path_opt);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path_opt, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Load from an explicit path when given, otherwise from default locations
    pub fn load_from(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load_with_env(path),
            None => Ok(Self::load_default()),
        }
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from a variable lookup
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        // Tibber overrides
        if let Some(token) = lookup("TIBBER_API_TOKEN") {
            self.tibber.token = token;
        }
        if let Some(home_id) = lookup("TIBBER_HOUSE_ID") {
            if !home_id.is_empty() {
                self.tibber.home_id = Some(home_id);
            }
        }
        if let Some(endpoint) = lookup("TIBBER_API_ENDPOINT") {
            self.tibber.endpoint = endpoint;
        }

        // API overrides
        if let Some(host) = lookup("WATTBOARD_HOST") {
            self.api.host = host;
        }
        if let Some(port) = lookup("PORT") {
            if let Ok(p) = port.parse() {
                self.api.port = p;
            }
        }
        if let Some(title) = lookup("TITLE") {
            self.api.title = title;
        }

        // Storage overrides
        if let Some(database) = lookup("WATTBOARD_DATABASE") {
            self.storage.database = database;
        }

        // Logging overrides
        if let Some(level) = lookup("WATTBOARD_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("WATTBOARD_LOG_FORMAT") {
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
    r#"# Wattboard Configuration
#
# Environment variables override these settings:
# - TIBBER_API_TOKEN
# - TIBBER_HOUSE_ID
# - TIBBER_API_ENDPOINT
# - WATTBOARD_HOST
# - PORT
# - TITLE
# - WATTBOARD_DATABASE
# - WATTBOARD_LOG_LEVEL
# - WATTBOARD_LOG_FORMAT

[tibber]
# Personal access token from developer.tibber.com
token = ""

# Home to subscribe to for live measurements
# home_id = ""

# GraphQL endpoints
endpoint = "https://api.tibber.com/v1-beta/gql"
ws_endpoint = "wss://websocket-api.tibber.com/v1-beta/gql/subscriptions"

# Request timeout in seconds
timeout_secs = 30

# Retries for transport errors and rate limiting
max_retries = 3

[api]
# API server host
host = "0.0.0.0"

# API server port
port = 8080

# Dashboard title
title = "Energy Dashboard"

# Maximum concurrent live data streams
max_live_connections = 1000

# Seconds between keep-alive comments on event streams
keep_alive_secs = 15

[storage]
# SQLite database path
database = "~/.local/share/wattboard/energy.db"

[collector]
# Price refresh interval (minutes)
price_interval_mins = 15

# Local hour of the nightly consumption/production refresh
energy_refresh_hour = 2

# Daily rows fetched per refresh
energy_days = 7

# Real-time measurements older than this are deleted (hours)
retention_hours = 24

# Wait before re-subscribing after the live feed drops (seconds)
reconnect_delay_secs = 10

# Pause between homes during refreshes (ms)
home_pause_ms = 500

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"

# Optional log file path
# file = "/var/log/wattboard/wattboard.log"
"#
    .to_string()
}
