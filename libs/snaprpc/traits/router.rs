//! Frame routing seam
//!
//! The transport owns the socket and knows nothing about JSON-RPC. Every
//! decoded frame is handed to a [`FrameSink`], which decides whether it is a
//! reply, a push notification, or garbage.
//!
//! ```text
//! TCP ─► read loop ─► line ─► JSON ─► FrameSink::on_frame
//!                       │                 │
//!                       │                 ├─► response     → correlation table
//!                       │                 └─► notification → supervisor
//!                       │
//!                       └─► EOF / IO error ─► FrameSink::on_closed (exactly once)
//! ```

use crate::error::SnapError;
use std::fmt;

/// Why a transport stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The peer closed the stream (zero-length read)
    PeerClosed,
    /// A read or write failed
    Io(String),
    /// The byte stream could not be decoded (not UTF-8)
    Decode(String),
    /// `close()` was called locally
    Local,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::PeerClosed => write!(f, "connection closed by server"),
            CloseReason::Io(e) => write!(f, "I/O error: {}", e),
            CloseReason::Decode(e) => write!(f, "stream decode error: {}", e),
            CloseReason::Local => write!(f, "connection closed locally"),
        }
    }
}

/// Consumer of decoded frames
///
/// All methods are called from the transport's read task and must not block:
/// anything slow belongs on the other side of a channel.
pub trait FrameSink: Send + Sync + 'static {
    /// A complete, well-formed JSON frame arrived
    fn on_frame(&self, frame: serde_json::Value);

    /// A single frame was unusable but the stream is still intact
    fn on_violation(&self, error: SnapError);

    /// The transport terminated. Called exactly once per transport.
    fn on_closed(&self, reason: CloseReason);
}
