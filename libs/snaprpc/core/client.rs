use crate::config::ConnectionConfig;
use crate::correlator::{CorrelationTable, ResultSlot};
use crate::error::{Result, SnapError};
use crate::framing::FramedTransport;
use crate::message::Request;
use crate::methods::*;
use crate::models::ServerState;
use crate::routing::{LinkEvents, MessageRouter};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// JSON-RPC protocol version reported by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RpcVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

/// Server-measured timing statistics for one client
///
/// Only some server builds implement `Client.GetTimeStats`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TimeStats {
    pub latency_median_ms: f64,
    pub latency_p95_ms: f64,
    pub jitter_ms: f64,
    pub samples: u64,
    #[serde(default)]
    pub suggested_buffer_ms: Option<f64>,
}

struct ClientInner {
    config: ConnectionConfig,
    transport: FramedTransport,
    table: Arc<CorrelationTable>,
}

/// Async JSON-RPC client for one live connection
///
/// Cheap to clone; all clones share the connection. Many calls may be in
/// flight at once and replies can come back in any order.
///
/// Server pushes and the connection's end are delivered on the
/// [`LinkEvents`] receiver returned by [`connect`](Self::connect).
#[derive(Clone)]
pub struct RpcClient {
    inner: Arc<ClientInner>,
}

impl RpcClient {
    /// Connect to a server
    pub async fn connect(config: &ConnectionConfig) -> Result<(Self, LinkEvents)> {
        config.validate()?;

        let table = Arc::new(CorrelationTable::new());
        let (link_tx, link_rx) = mpsc::unbounded_channel();
        let router = Arc::new(MessageRouter::new(Arc::clone(&table), link_tx));

        let transport = FramedTransport::connect(
            &config.host,
            config.port,
            config.call_timeout,
            config.max_frame_size,
            router,
        )
        .await?;

        info!("Connected to Snapcast server at {}", config.address());
        Ok((Self::assemble(config.clone(), transport, table), link_rx))
    }

    /// Speak the protocol over an already-open stream
    pub fn over_stream<S>(stream: S, config: &ConnectionConfig) -> (Self, LinkEvents)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let table = Arc::new(CorrelationTable::new());
        let (link_tx, link_rx) = mpsc::unbounded_channel();
        let router = Arc::new(MessageRouter::new(Arc::clone(&table), link_tx));
        let transport =
            FramedTransport::from_stream(stream, config.address(), config.max_frame_size, router);

        (Self::assemble(config.clone(), transport, table), link_rx)
    }

    fn assemble(config: ConnectionConfig, transport: FramedTransport, table: Arc<CorrelationTable>) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                config,
                transport,
                table,
            }),
        }
    }

    pub fn is_connected(&self) -> bool {
        !self.inner.transport.is_closed()
    }

    /// Number of calls waiting for a reply
    pub fn pending_calls(&self) -> usize {
        self.inner.table.len()
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.inner.config
    }

    /// Close the connection; outstanding calls fail with `ConnectionClosed`
    pub fn close(&self) {
        if self.is_connected() {
            debug!("Closing connection to {}", self.inner.config.address());
        }
        self.inner.transport.close();
    }

    /// Call a method using the configured timeout
    pub async fn call(&self, method: &str, params: Option<Value>) -> Result<Value> {
        self.call_with_timeout(method, params, self.inner.config.call_timeout)
            .await
    }

    /// Call a method and wait at most `timeout` for its reply
    pub async fn call_with_timeout(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<Value> {
        if !self.is_connected() {
            return Err(SnapError::NotConnected);
        }

        let table = &self.inner.table;
        let id = table.next_id();
        let payload = Request::new(id, method, params.as_ref()).encode()?;

        let mut slot = match table.register(id) {
            Ok(slot) => slot,
            Err(SnapError::ConnectionClosed(_)) => return Err(SnapError::NotConnected),
            Err(e) => return Err(e),
        };

        if let Err(e) = self.inner.transport.send(&payload) {
            table.forget(id);
            return Err(e);
        }
        debug!("Sent {} (id {})", method, id);

        match tokio::time::timeout(timeout, &mut slot).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(SnapError::ConnectionClosed("result slot dropped".to_string())),
            Err(_) => expire(table, id, slot, method, timeout).await,
        }
    }

    // ========================================================================
    // Typed Snapcast verbs
    // ========================================================================

    /// Fetch the full server state
    pub async fn get_status(&self) -> Result<ServerState> {
        let result = self.call(SERVER_GET_STATUS, None).await?;
        ServerState::from_status(result)
    }

    pub async fn get_rpc_version(&self) -> Result<RpcVersion> {
        let result = self.call(SERVER_GET_RPC_VERSION, None).await?;
        serde_json::from_value(result)
            .map_err(|e| SnapError::ProtocolViolation(format!("malformed RPC version: {}", e)))
    }

    pub async fn set_client_volume(&self, client_id: &str, percent: u8, muted: bool) -> Result<()> {
        self.call(CLIENT_SET_VOLUME, Some(client_volume_params(client_id, percent, muted)))
            .await
            .map(drop)
    }

    pub async fn set_client_mute(&self, client_id: &str, muted: bool) -> Result<()> {
        self.call(CLIENT_SET_VOLUME, Some(client_mute_params(client_id, muted)))
            .await
            .map(drop)
    }

    pub async fn set_client_name(&self, client_id: &str, name: &str) -> Result<()> {
        self.call(CLIENT_SET_NAME, Some(client_name_params(client_id, name)))
            .await
            .map(drop)
    }

    pub async fn set_client_latency(&self, client_id: &str, latency_ms: i32) -> Result<()> {
        self.call(CLIENT_SET_LATENCY, Some(client_latency_params(client_id, latency_ms)))
            .await
            .map(drop)
    }

    pub async fn set_group_mute(&self, group_id: &str, muted: bool) -> Result<()> {
        self.call(GROUP_SET_MUTE, Some(group_mute_params(group_id, muted)))
            .await
            .map(drop)
    }

    pub async fn set_group_stream(&self, group_id: &str, stream_id: &str) -> Result<()> {
        self.call(GROUP_SET_STREAM, Some(group_stream_params(group_id, stream_id)))
            .await
            .map(drop)
    }

    pub async fn set_group_name(&self, group_id: &str, name: &str) -> Result<()> {
        self.call(GROUP_SET_NAME, Some(group_name_params(group_id, name)))
            .await
            .map(drop)
    }

    /// Timing statistics for a client, or `None` when the server does not
    /// implement them
    pub async fn get_client_time_stats(&self, client_id: &str) -> Result<Option<TimeStats>> {
        match self
            .call(CLIENT_GET_TIME_STATS, Some(client_id_params(client_id)))
            .await
        {
            Ok(result) => match serde_json::from_value(result) {
                Ok(stats) => Ok(Some(stats)),
                Err(e) => {
                    debug!("Ignoring incomplete time stats for {}: {}", client_id, e);
                    Ok(None)
                }
            },
            Err(e) if e.is_method_not_found() => {
                debug!("Server does not support {}", CLIENT_GET_TIME_STATS);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

/// Resolve a call whose deadline passed
///
/// If the entry is still pending the call times out. Otherwise a settler
/// already removed it and sends outside the table lock, so the slot may not
/// be filled yet; wait for that send rather than peeking.
async fn expire(
    table: &CorrelationTable,
    id: u64,
    slot: ResultSlot,
    method: &str,
    timeout: Duration,
) -> Result<Value> {
    if table.forget(id) {
        warn!("{} (id {}) timed out after {:?}", method, id, timeout);
        return Err(SnapError::Timeout {
            id,
            method: method.to_string(),
            timeout,
        });
    }
    slot.await
        .unwrap_or_else(|_| Err(SnapError::ConnectionClosed("result slot dropped".to_string())))
}
