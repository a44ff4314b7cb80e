//! snapctrl - Snapcast controller
//!
//! ## Architecture
//!
//! - **snaprpc**: JSON-RPC engine and connection supervisor (re-exported from workspace)
//! - **config**: YAML configuration for the binaries
//! - **bin_common**: Common utilities for binary executables (CLI, logging)
//!
//! ## Usage in Binaries
//!
//! ```rust,no_run
//! use snapctrl::bin_common::{load_config_from_env, ConfigType};
//! use snapctrl::config::MonitorConfig;
//!
//! let path = load_config_from_env(ConfigType::Monitor);
//! let config = MonitorConfig::load(path).unwrap();
//! ```

// Re-export workspace libraries for convenience
pub use snaprpc;

pub mod config;

// Binary common utilities
pub mod bin_common {
    //! Common utilities for binary executables

    pub mod cli;
    pub mod logging;

    pub use cli::{load_config_from_env, parse_args, ConfigType};
    pub use logging::init_tracing;
}
