use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle of a supervised connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SupervisorState {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
    /// Waiting out a backoff delay
    RetryPending = 3,
    /// Terminal
    Stopped = 4,
}

impl SupervisorState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => SupervisorState::Connecting,
            2 => SupervisorState::Connected,
            3 => SupervisorState::RetryPending,
            4 => SupervisorState::Stopped,
            _ => SupervisorState::Disconnected,
        }
    }
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SupervisorState::Disconnected => "disconnected",
            SupervisorState::Connecting => "connecting",
            SupervisorState::Connected => "connected",
            SupervisorState::RetryPending => "retry pending",
            SupervisorState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Lock-free state cell shared between the background task and the handle
#[derive(Debug)]
pub struct AtomicSupervisorState {
    state: AtomicU8,
}

impl AtomicSupervisorState {
    pub fn new(initial: SupervisorState) -> Self {
        Self {
            state: AtomicU8::new(initial as u8),
        }
    }

    pub fn get(&self) -> SupervisorState {
        SupervisorState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Set the state unless already stopped. Returns the previous state.
    pub fn set(&self, new: SupervisorState) -> SupervisorState {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            if current == SupervisorState::Stopped as u8 {
                return SupervisorState::Stopped;
            }
            match self.state.compare_exchange_weak(
                current,
                new as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(prev) => return SupervisorState::from_u8(prev),
                Err(actual) => current = actual,
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        self.get() == SupervisorState::Connected
    }

    pub fn is_stopped(&self) -> bool {
        self.get() == SupervisorState::Stopped
    }
}

impl Default for AtomicSupervisorState {
    fn default() -> Self {
        Self::new(SupervisorState::Disconnected)
    }
}
