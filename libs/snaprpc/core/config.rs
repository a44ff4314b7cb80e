use crate::debounce::DebouncePolicy;
use crate::error::{Result, SnapError};
use crate::framing::DEFAULT_MAX_FRAME_SIZE;
use crate::traits::*;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Snapcast control port
pub const DEFAULT_PORT: u16 = 1705;

/// Per-call deadline when none is given
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Where and how to reach one server
///
/// `call_timeout` also bounds the TCP connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub call_timeout: Duration,
    pub max_frame_size: usize,
}

impl ConnectionConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// `host:port`
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(SnapError::Configuration("host must not be empty".to_string()));
        }
        if self.port == 0 {
            return Err(SnapError::Configuration("port must be non-zero".to_string()));
        }
        if self.call_timeout.is_zero() {
            return Err(SnapError::Configuration("call timeout must be non-zero".to_string()));
        }
        if self.max_frame_size == 0 {
            return Err(SnapError::Configuration("max frame size must be non-zero".to_string()));
        }
        Ok(())
    }
}

/// Everything a [`Supervisor`](crate::supervisor::Supervisor) needs
///
/// Usually produced by [`SupervisorBuilder`](crate::builder::SupervisorBuilder).
#[derive(Clone)]
pub struct SupervisorConfig {
    pub connection: ConnectionConfig,
    pub reconnect_strategy: Arc<dyn ReconnectionStrategy>,
    pub debounce: DebouncePolicy,
}

impl SupervisorConfig {
    /// Defaults for everything but the host
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            connection: ConnectionConfig::new(host),
            reconnect_strategy: Arc::new(ExponentialBackoff::default()),
            debounce: DebouncePolicy::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.connection.validate()
    }
}

impl fmt::Debug for SupervisorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SupervisorConfig")
            .field("connection", &self.connection)
            .field("first_retry_delay", &self.reconnect_strategy.next_delay(0))
            .field("debounce", &self.debounce)
            .finish()
    }
}
