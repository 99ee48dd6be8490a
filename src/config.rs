//! Process settings for Turnstile.
//!
//! Settings are layered: serde defaults, then an optional YAML file, then
//! `TURNSTILE__*` environment variables (`__` separates nested keys, e.g.
//! `TURNSTILE__STORAGE__BACKEND=redis`).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::error::{Result, TurnstileError};
use crate::ratelimit::{LimitConfig, DEFAULT_KEY_PREFIX};

/// Main settings for the Turnstile service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Counter storage configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Initial rate limit and persistence
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_http_addr")]
    pub http_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
        }
    }
}

fn default_http_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

/// Which counter store backs the limiter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Process-local counters
    #[default]
    Memory,
    /// Counters shared through Redis
    Redis,
}

/// Counter storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Store selected at startup
    #[serde(default)]
    pub backend: StorageBackend,

    /// Redis connection URL
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// Prefix for Redis counter keys
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Upper bound on a single Redis round-trip, in milliseconds
    #[serde(default = "default_command_timeout")]
    pub command_timeout_ms: u64,

    /// How often the in-memory store drops expired counters; 0 disables it
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            redis_url: default_redis_url(),
            key_prefix: default_key_prefix(),
            command_timeout_ms: default_command_timeout(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

impl StorageConfig {
    /// Get the Redis command timeout.
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    /// Get the sweep period, or `None` if sweeping is disabled.
    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_secs > 0).then(|| Duration::from_secs(self.sweep_interval_secs))
    }
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_key_prefix() -> String {
    DEFAULT_KEY_PREFIX.to_string()
}

fn default_command_timeout() -> u64 {
    500
}

fn default_sweep_interval() -> u64 {
    60
}

/// Initial rate limit configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Window length in seconds
    #[serde(default = "default_interval")]
    pub interval: u64,

    /// Requests allowed per window
    #[serde(default = "default_limit")]
    pub limit: u64,

    /// File where accepted configurations are saved and reloaded from
    #[serde(default)]
    pub persist_path: Option<PathBuf>,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            limit: default_limit(),
            persist_path: None,
        }
    }
}

impl LimitsConfig {
    /// Get the validated initial limit.
    pub fn initial(&self) -> Result<LimitConfig> {
        LimitConfig::new(self.interval, self.limit)
            .map_err(|e| TurnstileError::Settings(format!("limits: {}", e)))
    }
}

fn default_interval() -> u64 {
    LimitConfig::default().interval
}

fn default_limit() -> u64 {
    LimitConfig::default().limit
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Pretty,
    /// One JSON object per line
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Settings {
    /// Load settings from an optional file plus the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut loader = SettingsLoader::new();
        if let Some(path) = path {
            loader = loader.with_config_path(path);
        }
        loader.load()
    }

    /// Reject settings that would leave the service unable to run.
    pub fn validate(&self) -> Result<()> {
        self.limits.initial()?;

        if self.storage.command_timeout_ms == 0 {
            return Err(TurnstileError::Settings(
                "storage.command_timeout_ms must be positive".into(),
            ));
        }

        if self.storage.backend == StorageBackend::Redis && self.storage.redis_url.is_empty() {
            return Err(TurnstileError::Settings(
                "storage.redis_url is required for the redis backend".into(),
            ));
        }

        Ok(())
    }
}

/// Builds [`Settings`] from file and environment sources.
pub struct SettingsLoader {
    config_path: Option<PathBuf>,
    env_prefix: String,
    env_source: Option<HashMap<String, String>>,
}

impl SettingsLoader {
    /// Create a loader reading `TURNSTILE__*` variables from the process
    /// environment.
    pub fn new() -> Self {
        Self {
            config_path: None,
            env_prefix: "TURNSTILE".to_string(),
            env_source: None,
        }
    }

    /// Set the settings file path. The file must exist.
    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    /// Read variables from `vars` instead of the process environment.
    pub fn with_env_source(mut self, vars: HashMap<String, String>) -> Self {
        self.env_source = Some(vars);
        self
    }

    /// Load and validate settings.
    pub fn load(self) -> Result<Settings> {
        let mut builder = config::Config::builder();

        if let Some(path) = &self.config_path {
            info!(path = %path.display(), "Loading settings file");
            builder = builder.add_source(
                config::File::from(path.as_path()).format(config::FileFormat::Yaml),
            );
        }

        builder = builder.add_source(
            config::Environment::with_prefix(&self.env_prefix)
                .separator("__")
                .try_parsing(true)
                .source(self.env_source),
        );

        let settings: Settings = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| TurnstileError::Settings(e.to_string()))?;

        settings.validate()?;
        Ok(settings)
    }
}

impl Default for SettingsLoader {
    fn default() -> Self {
        Self::new()
    }
}
