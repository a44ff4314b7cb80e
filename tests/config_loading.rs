//! Integration test: Configuration utilities
//!
//! Tests config path resolution and YAML loading.

use snapctrl::bin_common::{load_config_from_env, ConfigType};
use snapctrl::config::{ConfigError, MonitorConfig};
use std::env;
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

fn write_config(yaml: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(yaml.as_bytes()).unwrap();
    file
}

#[test]
fn test_monitor_config_default_path() {
    env::remove_var("SNAPCTRL_CONFIG_PATH");

    let config_path = load_config_from_env(ConfigType::Monitor);
    assert_eq!(config_path.to_str().unwrap(), "config/monitor.yaml");
}

#[test]
fn test_custom_config() {
    let custom = ConfigType::Custom("custom/path.yaml".to_string());
    let config_path = load_config_from_env(custom);

    assert_eq!(config_path.to_str().unwrap(), "custom/path.yaml");
}

#[test]
fn test_shipped_config_is_valid() {
    let config = MonitorConfig::from_yaml(include_str!("../config/monitor.yaml")).unwrap();
    config.validate().unwrap();

    assert_eq!(config.port, 1705);
    assert_eq!(config.debounce.methods, vec!["Client.OnVolumeChanged"]);
}

#[test]
fn test_load_from_file() {
    let file = write_config(
        "
host: 10.0.0.5
call_timeout_secs: 4
reconnect:
  base_delay_ms: 250
  max_delay_ms: 1000
debounce:
  window_ms: 150
  methods: [Client.OnVolumeChanged, Group.OnMute]
log_level: debug
",
    );

    let config = MonitorConfig::load(file.path()).unwrap();
    assert_eq!(config.log_level, "debug");

    let supervisor = config.to_supervisor_config().unwrap();
    assert_eq!(supervisor.connection.call_timeout, Duration::from_secs(4));
    assert_eq!(supervisor.reconnect_strategy.next_delay(0), Duration::from_millis(250));
    assert_eq!(supervisor.debounce.window, Duration::from_millis(150));
    assert!(supervisor.debounce.is_debounced("Group.OnMute"));
}

#[test]
fn test_missing_file() {
    let result = MonitorConfig::load("does/not/exist.yaml");
    assert!(matches!(result, Err(ConfigError::FileError(_))));
}

#[test]
fn test_malformed_yaml() {
    let file = write_config("port: [1705");
    assert!(matches!(MonitorConfig::load(file.path()), Err(ConfigError::YamlError(_))));
}

#[test]
fn test_invalid_values_rejected() {
    let file = write_config("log_level: chatty");
    assert!(matches!(
        MonitorConfig::load(file.path()),
        Err(ConfigError::ValidationError(_))
    ));
}
