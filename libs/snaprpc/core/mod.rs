//! # snaprpc core
//!
//! Layered bottom-up:
//!
//! - [`framing`]: newline-delimited JSON over a byte stream
//! - [`message`] and [`routing`]: classify frames, settle replies, forward pushes
//! - [`correlator`]: pending calls keyed by request id
//! - [`client`]: async calls with per-call timeouts and typed Snapcast verbs
//! - [`supervisor`]: background thread that reconnects and keeps state fresh
//!
//! ## Example
//!
//! ```rust,ignore
//! use snaprpc::{SupervisorBuilder, SupervisorEvent};
//!
//! let supervisor = SupervisorBuilder::new().host("snapserver.local").spawn()?;
//!
//! while let Ok(event) = supervisor.recv_event() {
//!     match event {
//!         SupervisorEvent::StateReceived(state) => println!("{} clients", state.client_count()),
//!         SupervisorEvent::Stopped => break,
//!         other => println!("{:?}", other),
//!     }
//! }
//! ```

pub mod builder;
pub mod client;
pub mod config;
pub mod connection_state;
pub mod correlator;
pub mod debounce;
pub mod framing;
pub mod message;
pub mod methods;
pub mod routing;
pub mod supervisor;

// Re-export main types
pub use builder::{states, SupervisorBuilder};
pub use client::{RpcClient, RpcVersion, TimeStats};
pub use config::{ConnectionConfig, SupervisorConfig};
pub use connection_state::{AtomicSupervisorState, SupervisorState};
pub use correlator::CorrelationTable;
pub use debounce::{DebouncePolicy, RefreshDebouncer, RefreshDecision};
pub use framing::FramedTransport;
pub use message::{Inbound, Notification, Request, Response, RpcError};
pub use routing::{LinkEvent, LinkEvents, MessageRouter};
pub use supervisor::{Supervisor, SupervisorEvent};

// Re-export traits for convenience
pub use crate::traits::*;

/// Create a new supervisor builder
pub fn builder() -> SupervisorBuilder<builder::states::NoHost> {
    SupervisorBuilder::new()
}
