// Configuration File Support
//
// This module provides configuration file parsing for the remedy queue service.
// Supports TOML format with environment variable overrides.
// Configuration files are loaded from the XDG config directory: ~/.config/remedy-queue/config.toml

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::queue::{Priority, Strategy};

/// Default HTTP status returned when a request is rejected
pub const DEFAULT_RESPONSE_STATUS_CODE: u16 = 429;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// Metrics configuration
    pub metrics: MetricsConfig,

    /// Gateway listener configuration
    pub server: ServerConfig,

    /// Remedies applied by the gateway
    pub remedies: Vec<RemedyConfig>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, pretty, compact)
    pub format: String,
}

impl LoggingConfig {
    /// Convert the level string to tracing::Level
    pub fn tracing_level(&self) -> Result<tracing::Level> {
        self.level
            .to_lowercase()
            .parse()
            .map_err(|e| anyhow::anyhow!("Failed to parse log level: {}", e))
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MetricsConfig {
    /// Whether to expose the metrics endpoint
    pub enabled: bool,

    /// Port for metrics server
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 9090,
        }
    }
}

/// Gateway listener configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Port for the admission endpoint
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 8040 }
    }
}

/// A named remedy
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemedyConfig {
    /// Remedy name, unique within the configuration
    pub name: String,

    /// Whether the remedy is applied
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Strategy-based queue settings
    #[serde(default)]
    pub strategy_based_queue: Option<StrategyBasedQueueConfig>,
}

fn default_enabled() -> bool {
    true
}

/// Strategy-based queue remedy settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StrategyBasedQueueConfig {
    /// Requests admitted per window
    pub allowed_request_count: u32,

    /// Window length in seconds
    pub window_size_in_seconds: u64,

    /// Maximum time a request may wait for admission
    pub ttl_seconds: u64,

    /// Status code of the rejection response
    #[serde(default = "default_response_status_code")]
    pub response_status_code: u16,

    /// Header-driven priority groups
    #[serde(default)]
    pub prioritization: Option<PrioritizationConfig>,
}

fn default_response_status_code() -> u16 {
    DEFAULT_RESPONSE_STATUS_CODE
}

impl StrategyBasedQueueConfig {
    /// Quota/window policy described by this configuration
    pub fn strategy(&self) -> Strategy {
        Strategy::new(
            self.allowed_request_count,
            Duration::from_secs(self.window_size_in_seconds),
        )
    }

    /// How long a request may wait
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

/// Maps a request header value to a priority
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PrioritizationConfig {
    /// Header that selects the group
    pub group_by: GroupByConfig,

    /// Priority per header value
    #[serde(default)]
    pub groups: HashMap<String, GroupConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GroupByConfig {
    pub header_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GroupConfig {
    pub priority: Priority,
}

impl Config {
    /// Load configuration from the default XDG config directory
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    /// If the config file does not exist, returns default configuration.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed, or
    /// if the resulting configuration (defaults when the file does not
    /// exist) fails validation after environment overrides.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            let config = Self::default().apply_env_overrides();
            config.validate()?;
            return Ok(config);
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file from {:?}", path))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file from {:?}", path))?;

        let config = config.apply_env_overrides();
        config.validate()?;

        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Get the default configuration file path
    ///
    /// Returns `~/.config/remedy-queue/config.toml` on Linux
    pub fn config_path() -> PathBuf {
        if let Some(proj_dirs) = directories::ProjectDirs::from("com", "remedy-queue", "remedy-queue") {
            proj_dirs.config_dir().join("config.toml")
        } else {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".config").join("remedy-queue").join("config.toml")
        }
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Environment variables take precedence over config file values:
    /// - REMEDY_QUEUE_LOG_LEVEL
    /// - REMEDY_QUEUE_LOG_FORMAT
    /// - REMEDY_QUEUE_METRICS_ENABLED
    /// - REMEDY_QUEUE_METRICS_PORT
    /// - REMEDY_QUEUE_SERVER_PORT
    fn apply_env_overrides(mut self) -> Self {
        if let Ok(level) = std::env::var("REMEDY_QUEUE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("REMEDY_QUEUE_LOG_FORMAT") {
            self.logging.format = format;
        }

        if let Ok(enabled) = std::env::var("REMEDY_QUEUE_METRICS_ENABLED") {
            self.metrics.enabled = enabled.parse().unwrap_or(self.metrics.enabled);
        }
        if let Ok(port) = std::env::var("REMEDY_QUEUE_METRICS_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                if port > 0 {
                    self.metrics.port = port;
                }
            }
        }
        if let Ok(port) = std::env::var("REMEDY_QUEUE_SERVER_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                if port > 0 {
                    self.server.port = port;
                }
            }
        }

        self
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<()> {
        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!("Invalid log level: {}. Must be one of: trace, debug, info, warn, error", self.logging.level),
        }

        match self.logging.format.to_lowercase().as_str() {
            "json" | "pretty" | "compact" => {}
            _ => anyhow::bail!("Invalid log format: {}. Must be one of: json, pretty, compact", self.logging.format),
        }

        if self.metrics.port == 0 {
            anyhow::bail!("Metrics port must be > 0");
        }
        if self.server.port == 0 {
            anyhow::bail!("Server port must be > 0");
        }
        if self.metrics.enabled && self.metrics.port == self.server.port {
            anyhow::bail!("Metrics and server ports must differ (both {})", self.server.port);
        }

        let mut names = HashSet::new();
        for remedy in &self.remedies {
            if remedy.name.trim().is_empty() {
                anyhow::bail!("Remedy name must not be empty");
            }
            if !names.insert(remedy.name.as_str()) {
                anyhow::bail!("Duplicate remedy name: {}", remedy.name);
            }
            if let Some(queue) = &remedy.strategy_based_queue {
                queue
                    .validate()
                    .with_context(|| format!("Remedy '{}' is invalid", remedy.name))?;
            }
        }

        Ok(())
    }

    /// Look up an enabled remedy by name
    pub fn remedy(&self, name: &str) -> Option<&RemedyConfig> {
        self.remedies.iter().find(|r| r.enabled && r.name == name)
    }
}

impl StrategyBasedQueueConfig {
    fn validate(&self) -> Result<()> {
        if self.allowed_request_count == 0 {
            anyhow::bail!("allowed_request_count must be > 0");
        }
        if self.window_size_in_seconds == 0 {
            anyhow::bail!("window_size_in_seconds must be > 0");
        }
        if !(100..=599).contains(&self.response_status_code) {
            anyhow::bail!("response_status_code {} is not a valid HTTP status", self.response_status_code);
        }
        if let Some(prioritization) = &self.prioritization {
            if prioritization.group_by.header_name.trim().is_empty() {
                anyhow::bail!("prioritization.group_by.header_name must not be empty");
            }
        }
        Ok(())
    }
}
