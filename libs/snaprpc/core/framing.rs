//! Newline-delimited JSON transport
//!
//! One JSON document per line, UTF-8, `\n` terminated. A transport owns a
//! read task and a write task; both stop when the transport terminates, and
//! the [`FrameSink`] hears about that termination exactly once.

use crate::error::{Result, SnapError};
use crate::traits::{CloseReason, FrameSink};
use bytes::BytesMut;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::io::ErrorKind;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_util::codec::{Decoder, FramedRead, FramedWrite, LinesCodec, LinesCodecError};
use tracing::{debug, trace, warn};

/// Longest line accepted from the server (the full server status of a big
/// installation is a few hundred KiB)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 1024 * 1024;

/// One decoded line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    /// Line text, terminator (and a trailing `\r`) stripped
    Text(String),
    /// The line exceeded the limit and is being skipped up to its terminator
    Oversized,
}

/// [`LinesCodec`] that yields oversized lines as [`Line::Oversized`]
///
/// `FramedRead` ends the stream on a decoder error and only resumes once new
/// bytes arrive, which would strand frames already buffered behind a long
/// line. Reporting the overflow as an item keeps decoding going.
#[derive(Debug)]
pub struct LineCodec {
    lines: LinesCodec,
}

impl LineCodec {
    pub fn new(max_frame_size: usize) -> Self {
        Self {
            lines: LinesCodec::new_with_max_length(max_frame_size),
        }
    }

    pub fn max_frame_size(&self) -> usize {
        self.lines.max_length()
    }
}

fn oversized_as_item(
    decoded: std::result::Result<Option<String>, LinesCodecError>,
) -> std::result::Result<Option<Line>, LinesCodecError> {
    match decoded {
        Ok(line) => Ok(line.map(Line::Text)),
        Err(LinesCodecError::MaxLineLengthExceeded) => Ok(Some(Line::Oversized)),
        Err(e) => Err(e),
    }
}

impl Decoder for LineCodec {
    type Item = Line;
    type Error = LinesCodecError;

    fn decode(&mut self, buf: &mut BytesMut) -> std::result::Result<Option<Line>, LinesCodecError> {
        oversized_as_item(self.lines.decode(buf))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> std::result::Result<Option<Line>, LinesCodecError> {
        oversized_as_item(self.lines.decode_eof(buf))
    }
}

/// Decode one line. Blank lines yield `Ok(None)`.
pub fn decode_line(line: &str) -> serde_json::Result<Option<Value>> {
    let text = line.trim();
    if text.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(text).map(Some)
}

/// Terminal reason for a codec failure. Non-UTF-8 input surfaces from the
/// codec as `InvalidData`; the stream can no longer be trusted after it.
fn close_reason(error: LinesCodecError) -> CloseReason {
    match error {
        LinesCodecError::Io(e) if e.kind() == ErrorKind::InvalidData => {
            CloseReason::Decode(e.to_string())
        }
        other => CloseReason::Io(other.to_string()),
    }
}

struct Shared {
    peer: String,
    closed: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
    sink: Arc<dyn FrameSink>,
}

impl Shared {
    fn terminate(&self, reason: CloseReason) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!("Transport to {} terminated: {}", self.peer, reason);
        self.shutdown_tx.send_replace(true);
        self.sink.on_closed(reason);
    }
}

/// Live line-framed connection
///
/// Dropping the transport closes it.
pub struct FramedTransport {
    shared: Arc<Shared>,
    outbound_tx: mpsc::UnboundedSender<String>,
}

impl FramedTransport {
    /// Open a TCP connection and start the read/write tasks
    ///
    /// Must be called from within a tokio runtime.
    pub async fn connect(
        host: &str,
        port: u16,
        connect_timeout: Duration,
        max_frame_size: usize,
        sink: Arc<dyn FrameSink>,
    ) -> Result<Self> {
        let address = format!("{}:{}", host, port);
        debug!("Connecting to {}", address);

        let stream = match tokio::time::timeout(connect_timeout, TcpStream::connect((host, port))).await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(SnapError::Connect {
                    address,
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                return Err(SnapError::Connect {
                    address,
                    reason: format!("timed out after {:?}", connect_timeout),
                })
            }
        };

        if let Err(e) = stream.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY on {}: {}", address, e);
        }

        Ok(Self::from_stream(stream, address, max_frame_size, sink))
    }

    /// Run the framing over an already-open byte stream
    pub fn from_stream<S>(
        stream: S,
        peer: impl Into<String>,
        max_frame_size: usize,
        sink: Arc<dyn FrameSink>,
    ) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        let shared = Arc::new(Shared {
            peer: peer.into(),
            closed: AtomicBool::new(false),
            shutdown_tx,
            sink,
        });

        tokio::spawn(read_loop(
            FramedRead::new(read_half, LineCodec::new(max_frame_size)),
            Arc::clone(&shared),
            shutdown_rx.clone(),
        ));
        tokio::spawn(write_loop(
            FramedWrite::new(write_half, LinesCodec::new()),
            outbound_rx,
            Arc::clone(&shared),
            shutdown_rx,
        ));

        Self {
            shared,
            outbound_tx,
        }
    }

    /// Queue one payload for writing; the codec appends the terminator
    ///
    /// Frames are written whole and in the order they were queued.
    pub fn send(&self, payload: &str) -> Result<()> {
        if self.is_closed() {
            return Err(SnapError::NotConnected);
        }
        trace!("-> {}", payload);
        self.outbound_tx
            .send(payload.to_string())
            .map_err(|_| SnapError::NotConnected)
    }

    /// Close the connection. Idempotent.
    pub fn close(&self) {
        self.shared.terminate(CloseReason::Local);
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    pub fn peer(&self) -> &str {
        &self.shared.peer
    }
}

impl Drop for FramedTransport {
    fn drop(&mut self) {
        self.close();
    }
}

async fn read_loop<S>(
    mut reader: FramedRead<ReadHalf<S>, LineCodec>,
    shared: Arc<Shared>,
    mut shutdown_rx: watch::Receiver<bool>,
) where
    S: AsyncRead,
{
    let max_frame_size = reader.decoder().max_frame_size();

    let reason = loop {
        let next = tokio::select! {
            biased;
            _ = shutdown_rx.changed() => break None,
            next = reader.next() => next,
        };

        match next {
            Some(Ok(Line::Text(line))) => match decode_line(&line) {
                Ok(Some(frame)) => shared.sink.on_frame(frame),
                Ok(None) => {}
                Err(e) => {
                    debug!("Discarding malformed frame from {}: {}", shared.peer, e);
                    shared
                        .sink
                        .on_violation(SnapError::ProtocolViolation(format!("invalid JSON: {}", e)));
                }
            },
            Some(Ok(Line::Oversized)) => {
                debug!("Discarding frame from {} over {} bytes", shared.peer, max_frame_size);
                shared.sink.on_violation(SnapError::ProtocolViolation(format!(
                    "frame exceeds limit of {} bytes",
                    max_frame_size
                )));
            }
            Some(Err(e)) => break Some(close_reason(e)),
            None => break Some(CloseReason::PeerClosed),
        }
    };

    if let Some(reason) = reason {
        shared.terminate(reason);
    }
    debug!("Read loop for {} exiting", shared.peer);
}

async fn write_loop<S>(
    mut writer: FramedWrite<WriteHalf<S>, LinesCodec>,
    mut outbound_rx: mpsc::UnboundedReceiver<String>,
    shared: Arc<Shared>,
    mut shutdown_rx: watch::Receiver<bool>,
) where
    S: AsyncWrite,
{
    loop {
        let line = tokio::select! {
            biased;
            _ = shutdown_rx.changed() => break,
            line = outbound_rx.recv() => match line {
                Some(line) => line,
                None => break,
            },
        };

        let written = tokio::select! {
            biased;
            _ = shutdown_rx.changed() => break,
            result = writer.send(line) => result,
        };

        if let Err(e) = written {
            shared.terminate(CloseReason::Io(e.to_string()));
            break;
        }
    }

    let _ = SinkExt::<String>::close(&mut writer).await;
    debug!("Write loop for {} exiting", shared.peer);
}
