//! # Agent Connection
//!
//! One full-duplex WebSocket connection to the remote agent.
//!
//! ## Connection Lifecycle:
//! 1. **Connect**: open the socket, bounded by the configured handshake timeout
//! 2. **Open**: a writer task drains outbound envelopes, a reader task parses inbound ones
//! 3. **Closed**: explicit `close()`, remote close or transport failure; all three stop sends
//!
//! ## Delivery Semantics:
//! - Outbound sends are fire-and-forget. While the connection is not open they are
//!   dropped and `send` returns `false`; nothing is buffered for later.
//! - The writer queue holds at most [`OUTBOUND_CAPACITY`] envelopes. When the socket
//!   cannot keep up, further sends are dropped instead of queueing stale audio.
//! - Inbound envelopes reach the caller in arrival order through an mpsc channel of
//!   [`ConnectionEvent`]s. Unknown types are skipped, malformed JSON is logged.

use crate::error::{VoiceError, VoiceResult};
use crate::protocol::{parse_inbound, InboundEvent, OutboundEvent};

use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, trace, warn};

/// How long `close()` waits for the close frame to be flushed.
const CLOSE_GRACE: Duration = Duration::from_millis(500);

/// Envelopes waiting for the writer task, about five seconds of capture audio.
pub const OUTBOUND_CAPACITY: usize = 32;

/// What the reader task reports to the connection owner.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// A parsed, recognized envelope
    Envelope(InboundEvent),
    /// The agent closed the connection
    Closed { reason: Option<String> },
    /// The transport failed; the connection is unusable
    Failed(String),
}

enum WriterCommand {
    Send(String),
    Close,
}

/// Cheap handle for sending envelopes, shared with the capture pipeline.
#[derive(Clone)]
pub struct OutboundSender {
    commands: mpsc::Sender<WriterCommand>,
    open: Arc<AtomicBool>,
}

impl OutboundSender {
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Send one envelope. Returns `false` when it was dropped, either because the
    /// connection is not open or because the writer queue is full.
    pub fn send(&self, event: &OutboundEvent) -> bool {
        if !self.is_open() {
            trace!("Dropping outbound event, connection not open");
            return false;
        }

        let json = match serde_json::to_string(event) {
            Ok(json) => json,
            Err(err) => {
                warn!(error = %err, "Failed to serialize outbound event");
                return false;
            }
        };

        match self.commands.try_send(WriterCommand::Send(json)) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                trace!("Dropping outbound event, writer queue full");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }
}

/// An open (or formerly open) connection to the agent.
pub struct ProtocolConnection {
    sender: OutboundSender,
    reader: JoinHandle<()>,
    writer: Option<JoinHandle<()>>,
    closed: bool,
}

impl ProtocolConnection {
    /// Open a connection and start its reader and writer tasks.
    ///
    /// Resolves once the handshake completes; fails with
    /// [`VoiceError::ConnectTimeout`] if that takes longer than `connect_timeout`.
    pub async fn connect(
        url: &str,
        connect_timeout: Duration,
    ) -> VoiceResult<(Self, mpsc::UnboundedReceiver<ConnectionEvent>)> {
        info!(url = %url, "Connecting to voice agent");

        let (socket, _response) = match tokio::time::timeout(connect_timeout, connect_async(url)).await {
            Ok(Ok(connected)) => connected,
            Ok(Err(err)) => {
                error!(url = %url, error = %err, "Voice agent connection failed");
                return Err(VoiceError::Connection(err.to_string()));
            }
            Err(_) => {
                error!(url = %url, timeout_ms = %connect_timeout.as_millis(), "Voice agent connection timed out");
                return Err(VoiceError::ConnectTimeout(connect_timeout));
            }
        };

        info!(url = %url, "Voice agent connection open");

        let (mut sink, mut stream) = socket.split();
        let open = Arc::new(AtomicBool::new(true));
        let (command_tx, mut command_rx) = mpsc::channel::<WriterCommand>(OUTBOUND_CAPACITY);
        let (event_tx, event_rx) = mpsc::unbounded_channel::<ConnectionEvent>();

        let writer_open = open.clone();
        let writer = tokio::spawn(async move {
            while let Some(command) = command_rx.recv().await {
                match command {
                    WriterCommand::Send(json) => {
                        if let Err(err) = sink.send(Message::Text(json)).await {
                            warn!(error = %err, "Failed to write frame, stopping writer");
                            writer_open.store(false, Ordering::SeqCst);
                            break;
                        }
                    }
                    WriterCommand::Close => {
                        let _ = sink.send(Message::Close(None)).await;
                        let _ = sink.close().await;
                        break;
                    }
                }
            }
            debug!("Connection writer finished");
        });

        let reader_open = open.clone();
        let reader = tokio::spawn(async move {
            let reason = loop {
                match stream.next().await {
                    Some(Ok(Message::Text(text))) => match parse_inbound(&text) {
                        Ok(InboundEvent::Unknown) => {
                            trace!("Ignoring unrecognized event type");
                        }
                        Ok(event) => {
                            debug!(event = event.kind(), "Received event");
                            if event_tx.send(ConnectionEvent::Envelope(event)).is_err() {
                                // Nobody is listening anymore
                                break None;
                            }
                        }
                        Err(err) => {
                            warn!(error = %err, bytes = text.len(), "Dropping malformed message");
                        }
                    },
                    Some(Ok(Message::Close(frame))) => {
                        info!(frame = ?frame, "Voice agent closed the connection");
                        break frame.map(|f| f.reason.to_string());
                    }
                    Some(Ok(Message::Binary(data))) => {
                        warn!(bytes = data.len(), "Ignoring unexpected binary frame");
                    }
                    Some(Ok(_)) => {
                        // Ping/pong are answered by tungstenite itself
                    }
                    Some(Err(err)) => {
                        error!(error = %err, "Voice agent connection failed");
                        reader_open.store(false, Ordering::SeqCst);
                        let _ = event_tx.send(ConnectionEvent::Failed(err.to_string()));
                        return;
                    }
                    None => break None,
                }
            };

            reader_open.store(false, Ordering::SeqCst);
            let _ = event_tx.send(ConnectionEvent::Closed { reason });
        });

        let connection = Self {
            sender: OutboundSender {
                commands: command_tx,
                open,
            },
            reader,
            writer: Some(writer),
            closed: false,
        };

        Ok((connection, event_rx))
    }

    pub fn is_open(&self) -> bool {
        !self.closed && self.sender.is_open()
    }

    /// Send one envelope; dropped silently unless the connection is open.
    pub fn send(&self, event: &OutboundEvent) -> bool {
        self.sender.send(event)
    }

    pub fn sender(&self) -> OutboundSender {
        self.sender.clone()
    }

    /// Close the connection. Calling it again is a no-op.
    ///
    /// No [`ConnectionEvent`] is emitted for an explicit close.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        self.sender.open.store(false, Ordering::SeqCst);
        self.reader.abort();

        if let Some(writer) = self.writer.take() {
            let abort = writer.abort_handle();
            let commands = self.sender.commands.clone();
            // The close frame queues behind whatever the writer still holds
            let flush = async move {
                let _ = commands.send(WriterCommand::Close).await;
                let _ = writer.await;
            };
            if tokio::time::timeout(CLOSE_GRACE, flush).await.is_err() {
                debug!("Close frame not flushed in time, aborting writer");
                abort.abort();
            }
        }

        info!("Voice agent connection closed");
    }
}

impl Drop for ProtocolConnection {
    fn drop(&mut self) {
        self.sender.open.store(false, Ordering::SeqCst);
        self.reader.abort();
        if let Some(writer) = self.writer.take() {
            writer.abort();
        }
    }
}
