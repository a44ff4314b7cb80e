pub mod states;

use crate::config::{ConnectionConfig, SupervisorConfig, DEFAULT_CALL_TIMEOUT, DEFAULT_PORT};
use crate::debounce::DebouncePolicy;
use crate::error::Result;
use crate::framing::DEFAULT_MAX_FRAME_SIZE;
use crate::supervisor::Supervisor;
use crate::traits::*;
use states::*;
use std::sync::Arc;
use std::time::Duration;

/// Type-state builder for a [`Supervisor`]
///
/// The host is required; everything else has a sensible default.
///
/// ```ignore
/// let supervisor = SupervisorBuilder::new()
///     .host("snapserver.local")
///     .call_timeout(Duration::from_secs(5))
///     .backoff(Duration::from_secs(1), Duration::from_secs(20))
///     .spawn()?;
/// ```
pub struct SupervisorBuilder<H>
where
    H: HostState,
{
    _state: TypeState<H>,
    host: Option<String>,
    port: u16,
    call_timeout: Duration,
    max_frame_size: usize,
    reconnect_strategy: Option<Arc<dyn ReconnectionStrategy>>,
    debounce: DebouncePolicy,
}

impl SupervisorBuilder<NoHost> {
    /// Create a new builder instance
    pub fn new() -> Self {
        Self {
            _state: TypeState::new(),
            host: None,
            port: DEFAULT_PORT,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            reconnect_strategy: None,
            debounce: DebouncePolicy::default(),
        }
    }

    pub fn host(self, host: impl Into<String>) -> SupervisorBuilder<HasHost> {
        SupervisorBuilder {
            _state: TypeState::new(),
            host: Some(host.into()),
            port: self.port,
            call_timeout: self.call_timeout,
            max_frame_size: self.max_frame_size,
            reconnect_strategy: self.reconnect_strategy,
            debounce: self.debounce,
        }
    }
}

impl Default for SupervisorBuilder<NoHost> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> SupervisorBuilder<H>
where
    H: HostState,
{
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Default deadline for each call (also bounds the TCP connect)
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn max_frame_size(mut self, bytes: usize) -> Self {
        self.max_frame_size = bytes;
        self
    }

    pub fn reconnect_strategy(mut self, strategy: impl ReconnectionStrategy + 'static) -> Self {
        self.reconnect_strategy = Some(Arc::new(strategy));
        self
    }

    /// Shorthand for an [`ExponentialBackoff`] that doubles from `base` up to `max`
    pub fn backoff(self, base: Duration, max: Duration) -> Self {
        self.reconnect_strategy(ExponentialBackoff::new(base, max))
    }

    pub fn debounce(mut self, policy: DebouncePolicy) -> Self {
        self.debounce = policy;
        self
    }
}

impl SupervisorBuilder<HasHost> {
    /// Produce the configuration without starting anything
    pub fn build(self) -> Result<SupervisorConfig> {
        let config = SupervisorConfig {
            connection: ConnectionConfig {
                host: self.host.unwrap_or_default(),
                port: self.port,
                call_timeout: self.call_timeout,
                max_frame_size: self.max_frame_size,
            },
            reconnect_strategy: self
                .reconnect_strategy
                .unwrap_or_else(|| Arc::new(ExponentialBackoff::default())),
            debounce: self.debounce,
        };
        config.validate()?;
        Ok(config)
    }

    /// Build and start the supervisor
    pub fn spawn(self) -> Result<Supervisor> {
        Supervisor::spawn(self.build()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SnapError;

    #[test]
    fn test_builder_defaults() {
        let config = SupervisorBuilder::new().host("10.0.0.2").build().unwrap();

        assert_eq!(config.connection.port, 1705);
        assert_eq!(config.connection.call_timeout, Duration::from_secs(10));
        assert_eq!(config.reconnect_strategy.next_delay(0), Duration::from_secs(2));
        assert_eq!(config.reconnect_strategy.next_delay(10), Duration::from_secs(30));
        assert!(config.debounce.is_debounced("Client.OnVolumeChanged"));
    }

    #[test]
    fn test_builder_overrides() {
        let config = SupervisorBuilder::new()
            .port(1780)
            .host("media")
            .call_timeout(Duration::from_secs(3))
            .reconnect_strategy(FixedDelay::new(Duration::from_millis(250)))
            .debounce(DebouncePolicy::disabled())
            .build()
            .unwrap();

        assert_eq!(config.connection.address(), "media:1780");
        assert_eq!(config.reconnect_strategy.next_delay(7), Duration::from_millis(250));
        assert!(!config.debounce.is_debounced("Client.OnVolumeChanged"));
    }

    #[test]
    fn test_builder_rejects_empty_host() {
        let result = SupervisorBuilder::new().host("").build();
        assert!(matches!(result, Err(SnapError::Configuration(_))));
    }
}
