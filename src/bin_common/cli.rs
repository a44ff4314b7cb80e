//! CLI utilities for binaries
//!
//! A config path given on the command line wins; otherwise the path comes
//! from the config type's environment variable, then its default.

use std::path::PathBuf;

/// Which configuration file a binary reads
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigType {
    /// `config/monitor.yaml`, or `SNAPCTRL_CONFIG_PATH`
    Monitor,
    /// An explicit path
    Custom(String),
}

impl ConfigType {
    pub fn default_path(&self) -> &str {
        match self {
            ConfigType::Monitor => "config/monitor.yaml",
            ConfigType::Custom(path) => path,
        }
    }

    /// Environment variable consulted before the default path
    pub fn env_var_name(&self) -> Option<&'static str> {
        match self {
            ConfigType::Monitor => Some("SNAPCTRL_CONFIG_PATH"),
            ConfigType::Custom(_) => None,
        }
    }

    /// `Custom` when the first argument names a file, `fallback` otherwise
    pub fn from_args(args: &[String], fallback: ConfigType) -> ConfigType {
        match args.first() {
            Some(path) if !path.starts_with('-') => ConfigType::Custom(path.clone()),
            _ => fallback,
        }
    }
}

/// Resolve the configuration path
///
/// # Examples
/// ```
/// use snapctrl::bin_common::{load_config_from_env, ConfigType};
///
/// let path = load_config_from_env(ConfigType::Custom("monitor.yaml".to_string()));
/// assert_eq!(path.to_str(), Some("monitor.yaml"));
/// ```
pub fn load_config_from_env(config_type: ConfigType) -> PathBuf {
    config_type
        .env_var_name()
        .and_then(|name| std::env::var(name).ok())
        .unwrap_or_else(|| config_type.default_path().to_string())
        .into()
}

/// Command line arguments, excluding the program name
pub fn parse_args() -> Vec<String> {
    std::env::args().skip(1).collect()
}
