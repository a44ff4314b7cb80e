//! Common test utilities for snaprpc integration tests
//!
//! Provides an in-process Snapcast control server that speaks
//! newline-delimited JSON-RPC, with scriptable replies and pushes.

#![allow(dead_code)]

use parking_lot::Mutex;
use serde_json::{json, Value};
use snaprpc::{Supervisor, SupervisorEvent};
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, watch};

/// Macro for verbose test output (controlled by TEST_VERBOSE env var)
#[macro_export]
macro_rules! verbose_println {
    ($($arg:tt)*) => {
        if std::env::var("TEST_VERBOSE").is_ok() {
            println!($($arg)*);
        }
    };
}

/// How the mock server answers
#[derive(Debug, Clone, Default)]
pub struct Script {
    /// Methods that never get a reply
    pub silent: HashSet<String>,
    /// Methods answered with an error object
    pub errors: HashMap<String, (i64, String)>,
    /// Methods answered only after a delay
    pub delays: HashMap<String, Duration>,
}

impl Script {
    pub fn silent(mut self, method: &str) -> Self {
        self.silent.insert(method.to_string());
        self
    }

    pub fn error(mut self, method: &str, code: i64, message: &str) -> Self {
        self.errors.insert(method.to_string(), (code, message.to_string()));
        self
    }

    pub fn delay(mut self, method: &str, delay: Duration) -> Self {
        self.delays.insert(method.to_string(), delay);
        self
    }
}

#[derive(Debug, Clone)]
enum Control {
    Push(String),
    DropConnections,
}

#[derive(Default)]
struct Counters {
    connections: AtomicUsize,
    status_requests: AtomicUsize,
    requests: Mutex<Vec<Value>>,
}

/// A mock Snapcast server running on its own thread and runtime, so it can
/// be used from both plain and async tests
pub struct MockSnapServer {
    pub addr: SocketAddr,
    control_tx: broadcast::Sender<Control>,
    shutdown_tx: watch::Sender<bool>,
    counters: Arc<Counters>,
    thread: Option<JoinHandle<()>>,
}

impl MockSnapServer {
    /// Start a server with default behaviour: every request is answered
    pub fn start() -> Self {
        Self::start_with(Script::default())
    }

    pub fn start_with(script: Script) -> Self {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.set_nonblocking(true).unwrap();
        let addr = listener.local_addr().unwrap();

        let (control_tx, _) = broadcast::channel(256);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let counters = Arc::new(Counters::default());

        let thread = {
            let control_tx = control_tx.clone();
            let counters = Arc::clone(&counters);
            let script = Arc::new(script);
            std::thread::spawn(move || {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .unwrap();
                runtime.block_on(accept_loop(listener, script, control_tx, counters, shutdown_rx));
            })
        };

        Self {
            addr,
            control_tx,
            shutdown_tx,
            counters,
            thread: Some(thread),
        }
    }

    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Send a notification to every connected client
    pub fn push(&self, method: &str, params: Value) {
        let line = json!({"jsonrpc": "2.0", "method": method, "params": params}).to_string();
        let _ = self.control_tx.send(Control::Push(line));
    }

    /// Send raw bytes (a full line is expected) to every connected client
    pub fn push_raw(&self, line: &str) {
        let _ = self.control_tx.send(Control::Push(line.to_string()));
    }

    /// Close every open connection; the listener keeps accepting
    pub fn drop_connections(&self) {
        let _ = self.control_tx.send(Control::DropConnections);
    }

    pub fn connections(&self) -> usize {
        self.counters.connections.load(Ordering::SeqCst)
    }

    pub fn status_requests(&self) -> usize {
        self.counters.status_requests.load(Ordering::SeqCst)
    }

    /// Every request received with the given method, in arrival order
    pub fn requests_for(&self, method: &str) -> Vec<Value> {
        self.counters
            .requests
            .lock()
            .iter()
            .filter(|r| r["method"] == method)
            .cloned()
            .collect()
    }

    pub fn shutdown(&mut self) {
        self.shutdown_tx.send_replace(true);
        let _ = self.control_tx.send(Control::DropConnections);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for MockSnapServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn accept_loop(
    listener: std::net::TcpListener,
    script: Arc<Script>,
    control_tx: broadcast::Sender<Control>,
    counters: Arc<Counters>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let listener = TcpListener::from_std(listener).unwrap();
    loop {
        tokio::select! {
            result = listener.accept() => match result {
                Ok((stream, _)) => {
                    counters.connections.fetch_add(1, Ordering::SeqCst);
                    tokio::spawn(handle_connection(
                        stream,
                        Arc::clone(&script),
                        control_tx.subscribe(),
                        Arc::clone(&counters),
                    ));
                }
                Err(e) => {
                    eprintln!("Accept error: {}", e);
                    break;
                }
            },
            _ = shutdown_rx.changed() => break,
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    script: Arc<Script>,
    mut control_rx: broadcast::Receiver<Control>,
    counters: Arc<Counters>,
) {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();

    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => answer(&line, &script, &counters, &out_tx),
                _ => break,
            },
            Some(out) = out_rx.recv() => {
                if write_line(&mut write_half, &out).await.is_err() {
                    break;
                }
            }
            control = control_rx.recv() => match control {
                Ok(Control::Push(line)) => {
                    if write_line(&mut write_half, &line).await.is_err() {
                        break;
                    }
                }
                Ok(Control::DropConnections) => break,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
}

fn answer(line: &str, script: &Script, counters: &Counters, out_tx: &mpsc::UnboundedSender<String>) {
    let Ok(request) = serde_json::from_str::<Value>(line) else {
        return;
    };
    counters.requests.lock().push(request.clone());

    let id = request["id"].clone();
    let method = request["method"].as_str().unwrap_or_default().to_string();
    if method == "Server.GetStatus" {
        counters.status_requests.fetch_add(1, Ordering::SeqCst);
    }
    if script.silent.contains(&method) {
        return;
    }

    let reply = match script.errors.get(&method) {
        Some((code, message)) => json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": {"code": code, "message": message},
        }),
        None => json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": result_for(&method, &request["params"]),
        }),
    }
    .to_string();

    match script.delays.get(&method) {
        Some(delay) => {
            let delay = *delay;
            let out_tx = out_tx.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = out_tx.send(reply);
            });
        }
        None => {
            let _ = out_tx.send(reply);
        }
    }
}

fn result_for(method: &str, params: &Value) -> Value {
    match method {
        "Server.GetStatus" => sample_status(),
        "Server.GetRPCVersion" => json!({"major": 2, "minor": 0, "patch": 0}),
        // Only the first client has measurements; others get an incomplete reply
        "Client.GetTimeStats" if params["id"] == json!("client-1") => json!({
            "latency_median_ms": 12.5,
            "latency_p95_ms": 20.0,
            "jitter_ms": 1.5,
            "samples": 40
        }),
        "Client.GetTimeStats" => json!({}),
        _ => json!({"method": method, "params": params}),
    }
}

async fn write_line(writer: &mut tokio::net::tcp::OwnedWriteHalf, line: &str) -> std::io::Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}

/// A small but complete `Server.GetStatus` result
pub fn sample_status() -> Value {
    json!({
        "server": {
            "server": {
                "snapserver": {"version": "0.28.0"},
                "host": {"name": "mock", "ip": "127.0.0.1", "mac": "00:00:00:00:00:00"}
            },
            "groups": [{
                "id": "group-1",
                "name": "Living room",
                "stream_id": "default",
                "muted": false,
                "clients": [
                    {
                        "id": "client-1",
                        "connected": true,
                        "host": {"ip": "127.0.0.2", "name": "speaker-1"},
                        "config": {"name": "Speaker", "latency": 0, "volume": {"percent": 60, "muted": false}}
                    },
                    {
                        "id": "client-2",
                        "connected": true,
                        "host": {"ip": "127.0.0.3", "name": "speaker-2"},
                        "config": {"volume": {"percent": 20, "muted": true}}
                    }
                ]
            }],
            "streams": [{"id": "default", "status": "playing", "uri": {"query": {"name": "Default"}}}]
        }
    })
}

/// A local port with nothing listening on it
pub fn unused_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Block until `cond` holds or `timeout` passes
pub fn wait_until(timeout: Duration, cond: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    cond()
}

/// Async variant of [`wait_until`] for use inside tokio tests
pub async fn eventually(timeout: Duration, cond: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}

/// Receive events until one matches, panicking after `timeout`
pub fn expect_event(
    supervisor: &Supervisor,
    timeout: Duration,
    matches: impl Fn(&SupervisorEvent) -> bool,
) -> SupervisorEvent {
    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match supervisor.recv_event_timeout(remaining) {
            Some(event) => {
                verbose_println!("  event: {:?}", event);
                if matches(&event) {
                    return event;
                }
            }
            None => panic!("expected event not received within {:?}", timeout),
        }
    }
}

/// Drain whatever events are immediately available
pub fn drain_events(supervisor: &Supervisor) -> Vec<SupervisorEvent> {
    std::iter::from_fn(|| supervisor.try_recv_event()).collect()
}
