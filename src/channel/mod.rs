//! Request/response command channel over a persistent WebSocket.
//!
//! The CogServer JSON shell answers each command with one text frame and
//! carries no request identifier, so replies can only be matched to commands
//! by arrival order. [`CommandChannel`] makes that sound by allowing exactly
//! one command in flight: callers queue FIFO on an async mutex, frames that
//! arrive while nobody is waiting are discarded before the next write, and
//! each command waits at most the configured timeout for the next frame.
//!
//! A background reader task owns the read half of the socket and forwards
//! decoded frames into an unbounded queue; the write half sits behind its own
//! lock so `disconnect()` never waits on a pending reply.

mod frame;
mod query;

pub use frame::{MARKER_LEN, trim_trailing_marker};
pub use query::GET_ALL_ATOMS;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::config::BridgeConfig;
use crate::error::{ChannelError, ChannelResult};

use frame::{Inbound, decode_frame};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

/// Connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Connected,
}

impl std::fmt::Display for ChannelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ChannelState::Disconnected => "disconnected",
            ChannelState::Connecting => "connecting",
            ChannelState::Connected => "connected",
        };
        f.write_str(s)
    }
}

/// Lifecycle state plus the id of the connection it describes. A reader task
/// only updates the state while its own connection is current.
#[derive(Debug)]
struct Status {
    state: ChannelState,
    generation: u64,
}

/// One persistent connection to an AtomSpace command endpoint.
pub struct CommandChannel {
    timeout: Duration,
    status: Arc<Mutex<Status>>,
    sink: tokio::sync::Mutex<Option<WsSink>>,
    replies: tokio::sync::Mutex<Option<mpsc::UnboundedReceiver<Inbound>>>,
    reader: Mutex<Option<JoinHandle<()>>>,
    /// Held for the whole of a command exchange; tokio's mutex is FIFO.
    turn: tokio::sync::Mutex<()>,
    next_request: AtomicU64,
}

impl CommandChannel {
    /// A disconnected channel whose commands time out after `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            status: Arc::new(Mutex::new(Status {
                state: ChannelState::Disconnected,
                generation: 0,
            })),
            sink: tokio::sync::Mutex::new(None),
            replies: tokio::sync::Mutex::new(None),
            reader: Mutex::new(None),
            turn: tokio::sync::Mutex::new(()),
            next_request: AtomicU64::new(1),
        }
    }

    pub fn from_config(config: &BridgeConfig) -> Self {
        Self::new(config.command_timeout())
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn state(&self) -> ChannelState {
        self.status().state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ChannelState::Connected
    }

    fn status(&self) -> MutexGuard<'_, Status> {
        self.status.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn timeout_ms(&self) -> u64 {
        self.timeout.as_millis() as u64
    }

    /// Open a connection to `endpoint`, replacing any existing one.
    ///
    /// Resolves once the WebSocket handshake completes; a refused connection,
    /// a failed handshake or a handshake slower than the command timeout is
    /// an error and leaves the channel disconnected.
    pub async fn connect(&self, endpoint: &str) -> ChannelResult<()> {
        self.disconnect().await;

        let generation = {
            let mut status = self.status();
            status.generation += 1;
            status.state = ChannelState::Connecting;
            status.generation
        };
        tracing::info!(endpoint, "connecting to AtomSpace");

        let stream = match tokio::time::timeout(
            self.timeout,
            tokio_tungstenite::connect_async(endpoint),
        )
        .await
        {
            Ok(Ok((stream, _response))) => stream,
            Ok(Err(e)) => {
                mark_disconnected(&self.status, generation);
                tracing::warn!(endpoint, error = %e, "WebSocket connection failed");
                return Err(ChannelError::Transport {
                    message: e.to_string(),
                });
            }
            Err(_) => {
                mark_disconnected(&self.status, generation);
                return Err(ChannelError::ConnectTimeout {
                    endpoint: endpoint.to_string(),
                    timeout_ms: self.timeout_ms(),
                });
            }
        };

        let (sink, stream) = stream.split();
        let (tx, rx) = mpsc::unbounded_channel();
        *self.sink.lock().await = Some(sink);
        *self.replies.lock().await = Some(rx);

        let handle = tokio::spawn(read_frames(
            stream,
            tx,
            Arc::clone(&self.status),
            generation,
        ));
        *self.reader.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);

        {
            let mut status = self.status();
            if status.generation == generation {
                status.state = ChannelState::Connected;
            }
        }
        tracing::info!(endpoint, "connected to AtomSpace");
        Ok(())
    }

    /// Tear the connection down. Safe to call in any state, any number of times.
    pub async fn disconnect(&self) {
        let reader = self.reader.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(reader) = reader {
            reader.abort();
        }

        let sink = self.sink.lock().await.take();
        if let Some(mut sink) = sink {
            // Best effort: the peer may already be gone.
            let _ = tokio::time::timeout(self.timeout, sink.close()).await;
        }

        let mut status = self.status();
        if status.state != ChannelState::Disconnected {
            tracing::info!("connection to AtomSpace closed");
        }
        status.state = ChannelState::Disconnected;
        status.generation += 1;
    }

    /// Send one command and wait for the next inbound frame.
    ///
    /// Concurrent callers are served one at a time in arrival order. A timeout
    /// leaves the connection open; the server is not told to cancel.
    pub async fn send_command(&self, command: &str) -> ChannelResult<Value> {
        let _turn = self.turn.lock().await;
        let request = self.next_request.fetch_add(1, Ordering::Relaxed);

        if !self.is_connected() {
            return Err(ChannelError::NotConnected);
        }

        let mut replies = self.replies.lock().await;
        let replies = replies.as_mut().ok_or(ChannelError::NotConnected)?;

        // Anything already queued answered a command that gave up waiting.
        while let Ok(stale) = replies.try_recv() {
            tracing::warn!(request, frame = ?stale, "discarding frame that arrived with no command waiting");
        }

        tracing::debug!(request, "S> {command}");
        {
            let mut sink = self.sink.lock().await;
            let sink = sink.as_mut().ok_or(ChannelError::NotConnected)?;
            sink.send(Message::Text(command.to_string().into()))
                .await
                .map_err(|e| ChannelError::Transport {
                    message: e.to_string(),
                })?;
        }

        match tokio::time::timeout(self.timeout, replies.recv()).await {
            Ok(Some(Inbound::Reply(value))) => {
                tracing::debug!(request, "R> {value}");
                Ok(value)
            }
            Ok(Some(Inbound::Malformed(message))) => {
                tracing::warn!(request, %message, "unparseable reply");
                Err(ChannelError::MalformedFrame { message })
            }
            Ok(None) => Err(ChannelError::ConnectionClosed),
            Err(_) => {
                tracing::warn!(request, command, timeout_ms = self.timeout_ms(), "command timed out");
                Err(ChannelError::Timeout {
                    command: command.to_string(),
                    timeout_ms: self.timeout_ms(),
                })
            }
        }
    }
}

impl Drop for CommandChannel {
    fn drop(&mut self) {
        let reader = self.reader.get_mut().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(reader) = reader {
            reader.abort();
        }
    }
}

impl std::fmt::Debug for CommandChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandChannel")
            .field("state", &self.state())
            .field("timeout", &self.timeout)
            .finish()
    }
}

fn mark_disconnected(status: &Mutex<Status>, generation: u64) {
    let mut status = status.lock().unwrap_or_else(|e| e.into_inner());
    if status.generation == generation {
        status.state = ChannelState::Disconnected;
    }
}

/// Background task: decode inbound frames until the socket closes or fails.
async fn read_frames(
    mut stream: SplitStream<WsStream>,
    replies: mpsc::UnboundedSender<Inbound>,
    status: Arc<Mutex<Status>>,
    generation: u64,
) {
    while let Some(result) = stream.next().await {
        let inbound = match result {
            Ok(Message::Text(text)) => decode_frame(text.as_str()),
            Ok(Message::Binary(bytes)) => match std::str::from_utf8(&bytes) {
                Ok(text) => decode_frame(text),
                Err(e) => Inbound::Malformed(format!("binary frame is not UTF-8: {e}")),
            },
            Ok(Message::Close(frame)) => {
                tracing::info!(?frame, "server closed the connection");
                break;
            }
            Ok(_) => continue,
            Err(e) => {
                tracing::warn!(error = %e, "WebSocket error");
                break;
            }
        };
        if replies.send(inbound).is_err() {
            break;
        }
    }
    mark_disconnected(&status, generation);
}
