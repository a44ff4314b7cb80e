use std::time::Duration;
use thiserror::Error;

/// Main error type for snaprpc
///
/// Every variant carries owned, cloneable data so a single transport failure
/// can be handed to every call that was waiting on it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SnapError {
    /// The TCP connection could not be established
    #[error("Failed to connect to {address}: {reason}")]
    Connect { address: String, reason: String },

    /// A call was issued while no live connection exists
    #[error("Not connected to server")]
    NotConnected,

    /// No reply arrived within the call deadline
    #[error("Request {id} ({method}) timed out after {timeout:?}")]
    Timeout {
        id: u64,
        method: String,
        timeout: Duration,
    },

    /// The server answered with a JSON-RPC error object
    #[error("Server error {code}: {message}")]
    Remote {
        code: i64,
        message: String,
        data: Option<serde_json::Value>,
    },

    /// The call was outstanding when the connection went away
    #[error("Connection closed: {0}")]
    ConnectionClosed(String),

    /// A frame did not match any known message shape
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Invalid state transition
    #[error("Invalid state transition: {0}")]
    InvalidState(String),
}

impl SnapError {
    /// True for failures that end the connection (as opposed to a single call)
    pub fn is_transport_failure(&self) -> bool {
        matches!(
            self,
            SnapError::Connect { .. } | SnapError::ConnectionClosed(_) | SnapError::NotConnected
        )
    }

    /// True when the server reported "method not found" (-32601)
    pub fn is_method_not_found(&self) -> bool {
        matches!(self, SnapError::Remote { code: -32601, .. })
    }
}

/// Result type for snaprpc operations
pub type Result<T> = std::result::Result<T, SnapError>;
