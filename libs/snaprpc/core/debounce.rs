//! Refresh scheduling for server pushes
//!
//! Every notification means our snapshot is stale, but some arrive in bursts
//! (a volume slider being dragged sends dozens per second). Those are
//! coalesced: each one restarts a quiet window and a single refresh runs once
//! the window passes without another. Everything else refreshes at once.
//!
//! The debouncer is a plain state machine driven with explicit instants; the
//! supervisor owns the timer.

use crate::methods::CLIENT_ON_VOLUME_CHANGED;
use std::collections::HashSet;
use std::time::Duration;
use tokio::time::Instant;

pub const DEFAULT_DEBOUNCE_WINDOW: Duration = Duration::from_millis(300);

/// Which notifications are coalesced and for how long
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebouncePolicy {
    pub window: Duration,
    pub methods: HashSet<String>,
}

impl DebouncePolicy {
    pub fn new(window: Duration, methods: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            window,
            methods: methods.into_iter().map(Into::into).collect(),
        }
    }

    /// Refresh immediately on every notification
    pub fn disabled() -> Self {
        Self {
            window: Duration::ZERO,
            methods: HashSet::new(),
        }
    }

    pub fn is_debounced(&self, method: &str) -> bool {
        !self.window.is_zero() && self.methods.contains(method)
    }
}

impl Default for DebouncePolicy {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE_WINDOW, [CLIENT_ON_VOLUME_CHANGED])
    }
}

/// What to do about a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshDecision {
    /// Fetch the full state now
    Immediate,
    /// A fetch is scheduled for when the quiet window ends
    Deferred,
}

#[derive(Debug)]
pub struct RefreshDebouncer {
    policy: DebouncePolicy,
    deadline: Option<Instant>,
}

impl RefreshDebouncer {
    pub fn new(policy: DebouncePolicy) -> Self {
        Self {
            policy,
            deadline: None,
        }
    }

    /// Record a notification received at `now`
    ///
    /// An immediate decision leaves a pending deferred refresh in place.
    pub fn on_notification(&mut self, method: &str, now: Instant) -> RefreshDecision {
        if self.policy.is_debounced(method) {
            self.deadline = Some(now + self.policy.window);
            RefreshDecision::Deferred
        } else {
            RefreshDecision::Immediate
        }
    }

    /// When the pending refresh falls due, if one is pending
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// True exactly once per pending refresh, when its window has passed
    pub fn poll_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    /// Drop any pending refresh
    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn policy(&self) -> &DebouncePolicy {
        &self.policy
    }
}
