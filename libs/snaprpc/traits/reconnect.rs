use std::time::Duration;

/// Trait for defining reconnection strategies
///
/// The supervisor counts consecutive failed attempts and asks the strategy
/// how long to wait before the next one. The counter goes back to zero after
/// every successful connection, so `next_delay(0)` is always the base delay.
pub trait ReconnectionStrategy: Send + Sync {
    /// Get the delay before the next reconnection attempt
    ///
    /// # Arguments
    /// * `attempt` - Number of consecutive failures so far (0-indexed)
    fn next_delay(&self, attempt: u32) -> Duration;
}

/// Exponential backoff reconnection strategy
///
/// delay(0) = base, delay(n + 1) = min(delay(n) * factor, max)
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    base_delay: Duration,
    max_delay: Duration,
    factor: f64,
}

impl ExponentialBackoff {
    /// Create a new exponential backoff strategy that doubles each time
    ///
    /// # Arguments
    /// * `base_delay` - The delay before the first reconnect
    /// * `max_delay` - The maximum delay between reconnects
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self::with_factor(base_delay, max_delay, 2.0)
    }

    /// Create a strategy with a custom growth factor
    ///
    /// Factors below 1.0 would shrink the delay and are clamped to 1.0.
    pub fn with_factor(base_delay: Duration, max_delay: Duration, factor: f64) -> Self {
        let factor = if factor.is_finite() { factor.max(1.0) } else { 1.0 };
        Self {
            base_delay: base_delay.min(max_delay),
            max_delay,
            factor,
        }
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    pub fn factor(&self) -> f64 {
        self.factor
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(2), Duration::from_secs(30))
    }
}

impl ReconnectionStrategy for ExponentialBackoff {
    fn next_delay(&self, attempt: u32) -> Duration {
        let mut delay = self.base_delay;
        if self.factor <= 1.0 {
            return delay;
        }
        for _ in 0..attempt {
            if delay >= self.max_delay {
                break;
            }
            delay = Duration::try_from_secs_f64(delay.as_secs_f64() * self.factor)
                .unwrap_or(self.max_delay)
                .min(self.max_delay);
        }
        delay
    }
}

/// Fixed delay reconnection strategy
///
/// Always waits the same amount of time between reconnection attempts
#[derive(Debug, Clone)]
pub struct FixedDelay {
    delay: Duration,
}

impl FixedDelay {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl ReconnectionStrategy for FixedDelay {
    fn next_delay(&self, _attempt: u32) -> Duration {
        self.delay
    }
}
