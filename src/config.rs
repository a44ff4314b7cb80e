//! YAML configuration for the binaries

use serde::{Deserialize, Serialize};
use snaprpc::{DebouncePolicy, SupervisorBuilder, SupervisorConfig};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

pub const HOST_ENV_VAR: &str = "SNAPCAST_HOST";
pub const PORT_ENV_VAR: &str = "SNAPCAST_PORT";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load config file: {0}")]
    FileError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Snapserver host (overridden by SNAPCAST_HOST)
    #[serde(default = "default_host")]
    pub host: String,
    /// Control port (overridden by SNAPCAST_PORT)
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: f64,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    #[serde(default)]
    pub debounce: DebounceConfig,
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

/// Which notifications are coalesced before a state refresh
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebounceConfig {
    /// Quiet window in milliseconds; 0 refreshes on every notification
    #[serde(default = "default_debounce_ms")]
    pub window_ms: u64,
    #[serde(default = "default_debounced_methods")]
    pub methods: Vec<String>,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            window_ms: default_debounce_ms(),
            methods: default_debounced_methods(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    snaprpc::DEFAULT_PORT
}

fn default_call_timeout_secs() -> f64 {
    snaprpc::DEFAULT_CALL_TIMEOUT.as_secs_f64()
}

fn default_base_delay_ms() -> u64 {
    2_000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_debounce_ms() -> u64 {
    snaprpc::DEFAULT_DEBOUNCE_WINDOW.as_millis() as u64
}

fn default_debounced_methods() -> Vec<String> {
    vec![snaprpc::methods::CLIENT_ON_VOLUME_CHANGED.to_string()]
}

fn default_log_level() -> String {
    "info".to_string()
}

impl MonitorConfig {
    /// Load configuration from a YAML file, then apply environment overrides
    pub fn load(config_path: impl AsRef<Path>) -> Result<Self> {
        let yaml_content = std::fs::read_to_string(config_path)?;
        let mut config = Self::from_yaml(&yaml_content)?;

        config.apply_overrides(
            std::env::var(HOST_ENV_VAR).ok(),
            std::env::var(PORT_ENV_VAR).ok(),
        )?;
        config.validate()?;

        Ok(config)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Replace host and port with the given values, when present
    pub fn apply_overrides(&mut self, host: Option<String>, port: Option<String>) -> Result<()> {
        if let Some(host) = host.filter(|h| !h.trim().is_empty()) {
            info!("Overriding host from {}", HOST_ENV_VAR);
            self.host = host.trim().to_string();
        }

        if let Some(port) = port {
            self.port = port.trim().parse().map_err(|_| {
                ConfigError::ValidationError(format!("{} is not a valid port: {}", PORT_ENV_VAR, port))
            })?;
            info!("Overriding port from {}", PORT_ENV_VAR);
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::ValidationError("host must not be empty".to_string()));
        }

        if self.port == 0 {
            return Err(ConfigError::ValidationError("port must be greater than 0".to_string()));
        }

        self.call_timeout()?;

        if self.reconnect.base_delay_ms == 0 {
            return Err(ConfigError::ValidationError(
                "reconnect.base_delay_ms must be greater than 0".to_string(),
            ));
        }

        if self.reconnect.max_delay_ms < self.reconnect.base_delay_ms {
            return Err(ConfigError::ValidationError(
                "reconnect.max_delay_ms must not be below reconnect.base_delay_ms".to_string(),
            ));
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "log_level must be one of: {}",
                valid_levels.join(", ")
            )));
        }

        Ok(())
    }

    /// Per-call deadline; must be positive and representable as a `Duration`
    pub fn call_timeout(&self) -> Result<Duration> {
        match Duration::try_from_secs_f64(self.call_timeout_secs) {
            Ok(timeout) if !timeout.is_zero() => Ok(timeout),
            _ => Err(ConfigError::ValidationError(format!(
                "call_timeout_secs must be a positive number of seconds, got {}",
                self.call_timeout_secs
            ))),
        }
    }

    pub fn debounce_policy(&self) -> DebouncePolicy {
        DebouncePolicy::new(
            Duration::from_millis(self.debounce.window_ms),
            self.debounce.methods.iter().cloned(),
        )
    }

    /// Settings for the connection supervisor
    pub fn to_supervisor_config(&self) -> Result<SupervisorConfig> {
        self.validate()?;

        SupervisorBuilder::new()
            .host(self.host.clone())
            .port(self.port)
            .call_timeout(self.call_timeout()?)
            .backoff(
                Duration::from_millis(self.reconnect.base_delay_ms),
                Duration::from_millis(self.reconnect.max_delay_ms),
            )
            .debounce(self.debounce_policy())
            .build()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))
    }

    /// Log configuration summary
    pub fn log(&self) {
        info!("Configuration loaded:");
        info!("  Server: {}:{}", self.host, self.port);
        info!("  Call timeout: {} seconds", self.call_timeout_secs);
        info!(
            "  Reconnect backoff: {} ms up to {} ms",
            self.reconnect.base_delay_ms, self.reconnect.max_delay_ms
        );
        info!(
            "  Debounce: {} ms for [{}]",
            self.debounce.window_ms,
            self.debounce.methods.join(", ")
        );
        info!("  Log level: {}", self.log_level);
    }
}
