//! # snaprpc
//!
//! Control-channel client for Snapcast servers: JSON-RPC 2.0 over a
//! newline-delimited TCP stream, with a supervisor that keeps the link alive
//! and a typed view of the server state.
//!
//! ## Features
//!
//! - **Out-of-order replies**: many calls in flight, each settled exactly once
//! - **Per-call timeouts**: a late reply is discarded, the connection survives
//! - **Self-healing**: exponential backoff reconnection, interruptible at any time
//! - **UI friendly**: a blocking handle on crossbeam channels; all I/O lives on
//!   one background thread
//! - **Debounced refreshes**: bursts of volume pushes cost one status fetch

pub mod traits;
pub mod core;
pub mod models;

// Re-export all traits
pub use traits::*;

// Re-export core functionality
pub use self::core::{
    builder, client, config, connection_state, correlator, debounce, framing, message, methods,
    routing, supervisor,
    builder::{states, SupervisorBuilder},
    client::{RpcClient, RpcVersion, TimeStats},
    config::{ConnectionConfig, SupervisorConfig, DEFAULT_CALL_TIMEOUT, DEFAULT_PORT},
    connection_state::{AtomicSupervisorState, SupervisorState},
    debounce::{DebouncePolicy, DEFAULT_DEBOUNCE_WINDOW},
    framing::DEFAULT_MAX_FRAME_SIZE,
    message::Notification,
    routing::LinkEvent,
    supervisor::{Supervisor, SupervisorEvent},
};

pub use models::{Client, Group, ServerInfo, ServerState, Source, SourceStatus};

// Convenience function
pub use self::core::builder as supervisor_builder;
