//! Long-lived, self-healing connection
//!
//! A [`Supervisor`] owns one background OS thread running a single-threaded
//! tokio runtime. That thread connects, keeps a fresh [`ServerState`] coming,
//! and reconnects with backoff whenever the link drops. The foreground never
//! touches the connection directly: it sends commands in and reads
//! [`SupervisorEvent`]s out, so it can be a UI thread that must never block
//! on the network.

use crate::client::{RpcClient, TimeStats};
use crate::config::SupervisorConfig;
use crate::connection_state::{AtomicSupervisorState, SupervisorState};
use crate::debounce::{RefreshDebouncer, RefreshDecision};
use crate::error::{Result, SnapError};
use crate::message::Notification;
use crate::methods::*;
use crate::models::ServerState;
use crate::routing::{LinkEvent, LinkEvents};
use crate::traits::CloseReason;
use crossbeam_channel::{Receiver, Sender};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Everything the background side reports
#[derive(Debug, Clone, PartialEq)]
pub enum SupervisorEvent {
    /// A connection was established
    Connected,
    /// The connection was closed because the caller asked for it
    Disconnected,
    /// The server went away or the link failed
    ConnectionLost,
    /// A connection attempt failed
    ConnectionFailed(SnapError),
    /// Waiting before the next attempt
    Reconnecting { attempt: u32, delay: Duration },
    /// A background request or a fire-and-forget command failed, or the
    /// server sent something unusable
    Error(SnapError),
    /// Raw server push, delivered before any refresh it triggers
    Notification(Notification),
    /// A complete, freshly fetched server state
    StateReceived(ServerState),
    /// Timing statistics from one `fetch_time_stats` request, keyed by
    /// client id. Clients without stats are left out.
    TimeStatsReceived(BTreeMap<String, TimeStats>),
    /// The supervisor has shut down. Always the last event.
    Stopped,
}

type Reply = Sender<Result<Value>>;

enum SupervisorCommand {
    Call {
        method: String,
        params: Option<Value>,
        timeout: Option<Duration>,
        /// `None` for fire-and-forget; failures then surface as an `Error` event
        reply: Option<Reply>,
        /// Fetch the full state once the call succeeds
        refresh_after: bool,
    },
    RefreshStatus,
    FetchTimeStats(Vec<String>),
}

/// Foreground handle to a supervised connection
///
/// Dropping the handle stops the background thread and waits for it.
pub struct Supervisor {
    state: Arc<AtomicSupervisorState>,
    command_tx: mpsc::UnboundedSender<SupervisorCommand>,
    event_rx: Receiver<SupervisorEvent>,
    stop_tx: watch::Sender<bool>,
    thread: Option<JoinHandle<()>>,
}

impl Supervisor {
    /// Start supervising; the first connection attempt begins immediately
    pub fn spawn(config: SupervisorConfig) -> Result<Self> {
        config.validate()?;

        let state = Arc::new(AtomicSupervisorState::default());
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = crossbeam_channel::unbounded();
        let (stop_tx, stop_rx) = watch::channel(false);

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| SnapError::Configuration(format!("failed to build runtime: {}", e)))?;

        let worker = Worker {
            debouncer: RefreshDebouncer::new(config.debounce.clone()),
            config: Arc::new(config),
            state: Arc::clone(&state),
            command_rx,
            event_tx,
            stop_rx,
        };

        let thread = std::thread::Builder::new()
            .name("snapctrl-supervisor".to_string())
            .spawn(move || runtime.block_on(worker.run()))
            .map_err(|e| SnapError::Configuration(format!("failed to spawn supervisor thread: {}", e)))?;

        Ok(Self {
            state,
            command_tx,
            event_rx,
            stop_tx,
            thread: Some(thread),
        })
    }

    pub fn state(&self) -> SupervisorState {
        self.state.get()
    }

    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    /// Try to receive an event (non-blocking)
    pub fn try_recv_event(&self) -> Option<SupervisorEvent> {
        self.event_rx.try_recv().ok()
    }

    /// Receive an event (blocking); errors once the supervisor has stopped
    /// and every event has been drained
    pub fn recv_event(&self) -> std::result::Result<SupervisorEvent, crossbeam_channel::RecvError> {
        self.event_rx.recv()
    }

    pub fn recv_event_timeout(&self, timeout: Duration) -> Option<SupervisorEvent> {
        self.event_rx.recv_timeout(timeout).ok()
    }

    /// The raw event receiver, for use with `crossbeam_channel::select!`
    pub fn events(&self) -> &Receiver<SupervisorEvent> {
        &self.event_rx
    }

    /// Call a method and block until its reply, using the configured timeout
    pub fn call(&self, method: &str, params: Option<Value>) -> Result<Value> {
        self.blocking_call(method, params, None)
    }

    /// Call a method and block for at most `timeout`
    pub fn call_with_timeout(&self, method: &str, params: Option<Value>, timeout: Duration) -> Result<Value> {
        self.blocking_call(method, params, Some(timeout))
    }

    /// Send a call without waiting; a failure is reported as an `Error` event
    pub fn submit(&self, method: &str, params: Option<Value>) -> Result<()> {
        self.submit_inner(method, params, false)
    }

    /// Ask for a fresh `StateReceived`
    pub fn request_status(&self) -> Result<()> {
        self.send_command(SupervisorCommand::RefreshStatus)
    }

    /// Ask for the server's timing statistics of `client_ids`
    ///
    /// Answered by one `TimeStatsReceived` unless no client has any stats.
    /// Per-client failures are only logged; while offline the request is
    /// dropped.
    pub fn fetch_time_stats<I, S>(&self, client_ids: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ids = client_ids.into_iter().map(Into::into).collect();
        self.send_command(SupervisorCommand::FetchTimeStats(ids))
    }

    pub fn set_client_volume(&self, client_id: &str, percent: u8, muted: bool) -> Result<()> {
        self.submit_inner(CLIENT_SET_VOLUME, Some(client_volume_params(client_id, percent, muted)), false)
    }

    pub fn set_client_mute(&self, client_id: &str, muted: bool) -> Result<()> {
        self.submit_inner(CLIENT_SET_VOLUME, Some(client_mute_params(client_id, muted)), false)
    }

    pub fn set_group_mute(&self, group_id: &str, muted: bool) -> Result<()> {
        self.submit_inner(GROUP_SET_MUTE, Some(group_mute_params(group_id, muted)), false)
    }

    // The server does not always push a notification for these, so the
    // state is re-fetched once they succeed.

    pub fn set_group_stream(&self, group_id: &str, stream_id: &str) -> Result<()> {
        self.submit_inner(GROUP_SET_STREAM, Some(group_stream_params(group_id, stream_id)), true)
    }

    pub fn set_client_latency(&self, client_id: &str, latency_ms: i32) -> Result<()> {
        self.submit_inner(CLIENT_SET_LATENCY, Some(client_latency_params(client_id, latency_ms)), true)
    }

    pub fn set_client_name(&self, client_id: &str, name: &str) -> Result<()> {
        self.submit_inner(CLIENT_SET_NAME, Some(client_name_params(client_id, name)), true)
    }

    pub fn set_group_name(&self, group_id: &str, name: &str) -> Result<()> {
        self.submit_inner(GROUP_SET_NAME, Some(group_name_params(group_id, name)), true)
    }

    /// Ask the background thread to stop. Idempotent and non-blocking.
    ///
    /// The connection is closed, outstanding calls fail, and `Stopped` is
    /// the last event delivered.
    pub fn stop(&self) {
        self.stop_tx.send_replace(true);
    }

    /// Stop and wait for the background thread to finish
    pub fn shutdown(mut self) {
        info!("Shutting down supervisor");
        self.stop();
        self.join();
    }

    fn join(&mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Supervisor thread panicked");
            }
        }
    }

    fn blocking_call(&self, method: &str, params: Option<Value>, timeout: Option<Duration>) -> Result<Value> {
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        self.send_command(SupervisorCommand::Call {
            method: method.to_string(),
            params,
            timeout,
            reply: Some(reply_tx),
            refresh_after: false,
        })?;
        reply_rx
            .recv()
            .unwrap_or_else(|_| Err(SnapError::ConnectionClosed("supervisor stopped".to_string())))
    }

    fn submit_inner(&self, method: &str, params: Option<Value>, refresh_after: bool) -> Result<()> {
        self.send_command(SupervisorCommand::Call {
            method: method.to_string(),
            params,
            timeout: None,
            reply: None,
            refresh_after,
        })
    }

    fn send_command(&self, command: SupervisorCommand) -> Result<()> {
        if self.state.is_stopped() {
            return Err(SnapError::NotConnected);
        }
        self.command_tx
            .send(command)
            .map_err(|_| SnapError::NotConnected)
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        self.stop();
        self.join();
    }
}

// ============================================================================
// Background side
// ============================================================================

/// How a connected period ended
enum Served {
    Stopped,
    Lost(CloseReason),
}

struct Worker {
    config: Arc<SupervisorConfig>,
    state: Arc<AtomicSupervisorState>,
    command_rx: mpsc::UnboundedReceiver<SupervisorCommand>,
    event_tx: Sender<SupervisorEvent>,
    stop_rx: watch::Receiver<bool>,
    debouncer: RefreshDebouncer,
}

impl Worker {
    async fn run(mut self) {
        let mut attempt: u32 = 0;
        let address = self.config.connection.address();

        loop {
            if *self.stop_rx.borrow() {
                break;
            }

            self.state.set(SupervisorState::Connecting);
            debug!("Connecting to {}", address);

            let connection = tokio::select! {
                biased;
                _ = self.stop_rx.changed() => break,
                result = RpcClient::connect(&self.config.connection) => result,
            };

            match connection {
                Ok((client, link_events)) => {
                    attempt = 0;
                    self.state.set(SupervisorState::Connected);
                    self.emit(SupervisorEvent::Connected);

                    let served = self.serve(&client, link_events).await;
                    client.close();
                    self.debouncer.cancel();

                    match served {
                        Served::Stopped => {
                            info!("Disconnected from {}", address);
                            self.state.set(SupervisorState::Disconnected);
                            self.emit(SupervisorEvent::Disconnected);
                            break;
                        }
                        Served::Lost(reason) => {
                            warn!("Lost connection to {}: {}", address, reason);
                            self.state.set(SupervisorState::Disconnected);
                            self.emit(SupervisorEvent::ConnectionLost);
                        }
                    }
                }
                Err(e) => {
                    error!("Failed to connect: {}", e);
                    self.state.set(SupervisorState::Disconnected);
                    self.emit(SupervisorEvent::ConnectionFailed(e));
                }
            }

            let delay = self.config.reconnect_strategy.next_delay(attempt);
            attempt = attempt.saturating_add(1);
            info!("Reconnecting in {:?} (attempt {})", delay, attempt);

            self.state.set(SupervisorState::RetryPending);
            self.emit(SupervisorEvent::Reconnecting { attempt, delay });

            if !self.wait_backoff(delay).await {
                break;
            }
        }

        self.state.set(SupervisorState::Stopped);
        self.emit(SupervisorEvent::Stopped);
        info!("Supervisor task exiting");
    }

    /// Drive one connection until it ends or a stop is requested
    async fn serve(&mut self, client: &RpcClient, mut link_events: LinkEvents) -> Served {
        // Initial snapshot; notifications queued meanwhile are handled after it
        let initial = tokio::select! {
            biased;
            _ = self.stop_rx.changed() => return Served::Stopped,
            result = client.get_status() => result,
        };
        match initial {
            Ok(state) => self.emit(SupervisorEvent::StateReceived(state)),
            Err(e) if e.is_transport_failure() => debug!("Initial status fetch aborted: {}", e),
            Err(e) => {
                warn!("Initial status fetch failed: {}", e);
                self.emit(SupervisorEvent::Error(e));
            }
        }

        loop {
            let deadline = self.debouncer.deadline();

            tokio::select! {
                biased;
                _ = self.stop_rx.changed() => return Served::Stopped,
                event = link_events.recv() => match event {
                    Some(LinkEvent::Notification(notification)) => {
                        self.on_notification(client, notification);
                    }
                    Some(LinkEvent::Violation(e)) => self.emit(SupervisorEvent::Error(e)),
                    Some(LinkEvent::Closed(reason)) => return Served::Lost(reason),
                    None => return Served::Lost(CloseReason::PeerClosed),
                },
                command = self.command_rx.recv() => match command {
                    Some(command) => self.dispatch(client, command),
                    // Handle dropped without stop(); treat as a stop
                    None => return Served::Stopped,
                },
                _ = sleep_until_deadline(deadline) => {
                    if self.debouncer.poll_due(Instant::now()) {
                        debug!("Debounce window elapsed, refreshing status");
                        self.spawn_refresh(client);
                    }
                }
            }
        }
    }

    fn on_notification(&mut self, client: &RpcClient, notification: Notification) {
        let decision = self
            .debouncer
            .on_notification(&notification.method, Instant::now());
        debug!("Notification {} -> {:?}", notification.method, decision);

        self.emit(SupervisorEvent::Notification(notification));
        if decision == RefreshDecision::Immediate {
            self.spawn_refresh(client);
        }
    }

    fn dispatch(&self, client: &RpcClient, command: SupervisorCommand) {
        match command {
            SupervisorCommand::Call {
                method,
                params,
                timeout,
                reply,
                refresh_after,
            } => {
                let client = client.clone();
                let event_tx = self.event_tx.clone();
                let timeout = timeout.unwrap_or(client.config().call_timeout);

                tokio::spawn(async move {
                    let result = client.call_with_timeout(&method, params, timeout).await;
                    let succeeded = result.is_ok();

                    match reply {
                        Some(reply) => {
                            let _ = reply.send(result);
                        }
                        None => {
                            if let Err(e) = result {
                                warn!("{} failed: {}", method, e);
                                let _ = event_tx.send(SupervisorEvent::Error(e));
                            }
                        }
                    }

                    if succeeded && refresh_after {
                        refresh_status(&client, &event_tx).await;
                    }
                });
            }
            SupervisorCommand::RefreshStatus => self.spawn_refresh(client),
            SupervisorCommand::FetchTimeStats(ids) => {
                let client = client.clone();
                let event_tx = self.event_tx.clone();
                tokio::spawn(async move { fetch_time_stats(&client, ids, &event_tx).await });
            }
        }
    }

    fn spawn_refresh(&self, client: &RpcClient) {
        let client = client.clone();
        let event_tx = self.event_tx.clone();
        tokio::spawn(async move { refresh_status(&client, &event_tx).await });
    }

    /// Sleep out a backoff delay. Returns false if a stop arrived first.
    async fn wait_backoff(&mut self, delay: Duration) -> bool {
        let deadline = Instant::now() + delay;
        loop {
            tokio::select! {
                biased;
                _ = self.stop_rx.changed() => return false,
                _ = tokio::time::sleep_until(deadline) => return true,
                command = self.command_rx.recv() => match command {
                    Some(command) => self.reject_offline(command),
                    None => return false,
                },
            }
        }
    }

    fn reject_offline(&self, command: SupervisorCommand) {
        match command {
            SupervisorCommand::Call {
                reply: Some(reply), ..
            } => {
                let _ = reply.send(Err(SnapError::NotConnected));
            }
            SupervisorCommand::Call {
                method, reply: None, ..
            } => {
                warn!("{} dropped: not connected", method);
                self.emit(SupervisorEvent::Error(SnapError::NotConnected));
            }
            // The next connection fetches the state anyway
            SupervisorCommand::RefreshStatus => debug!("Status refresh skipped while offline"),
            SupervisorCommand::FetchTimeStats(_) => debug!("Time stats skipped while offline"),
        }
    }

    fn emit(&self, event: SupervisorEvent) {
        if self.event_tx.send(event).is_err() {
            debug!("Event receiver dropped");
        }
    }
}

/// Fetch the state and publish it. Transport failures are left to the
/// connection-level events.
async fn refresh_status(client: &RpcClient, event_tx: &Sender<SupervisorEvent>) {
    match client.get_status().await {
        Ok(state) => {
            let _ = event_tx.send(SupervisorEvent::StateReceived(state));
        }
        Err(e) if e.is_transport_failure() => debug!("Status refresh aborted: {}", e),
        Err(e) => {
            warn!("Status refresh failed: {}", e);
            let _ = event_tx.send(SupervisorEvent::Error(e));
        }
    }
}

/// Query each client in turn and publish whatever was collected
async fn fetch_time_stats(client: &RpcClient, ids: Vec<String>, event_tx: &Sender<SupervisorEvent>) {
    let mut collected = BTreeMap::new();
    for id in ids {
        match client.get_client_time_stats(&id).await {
            Ok(Some(stats)) => {
                collected.insert(id, stats);
            }
            Ok(None) => {}
            Err(e) if e.is_transport_failure() => {
                debug!("Time stats fetch aborted: {}", e);
                break;
            }
            Err(e) => debug!("Time stats for {} failed: {}", id, e),
        }
    }

    if !collected.is_empty() {
        let _ = event_tx.send(SupervisorEvent::TimeStatsReceived(collected));
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
