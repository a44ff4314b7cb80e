//! # snaprpc traits
//!
//! Core traits and types shared by every layer of the client:
//!
//! - **SnapError**: the error taxonomy for connecting and calling
//! - **FrameSink**: where the transport delivers decoded frames
//! - **ReconnectionStrategy**: how long the supervisor waits between attempts

pub mod error;
pub mod reconnect;
pub mod router;

pub use error::{Result, SnapError};
pub use reconnect::{ExponentialBackoff, FixedDelay, ReconnectionStrategy};
pub use router::{CloseReason, FrameSink};
