//! Test doubles shared by the unit tests: a loopback agent endpoint, a scripted
//! microphone and a recording speaker.

use crate::audio::codec::{self, WAV_HEADER_LEN};
use crate::audio::traits::{AudioSink, AudioSource};
use crate::audio::types::{AudioFrame, CaptureConstraints, DecodedAudio};
use crate::error::{CaptureError, PlaybackError};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

enum AgentCommand {
    Frame(Message),
    /// Drop the socket without a closing handshake
    HangUp,
}

/// A WebSocket endpoint on loopback that accepts one client.
pub(crate) struct MockAgent {
    pub url: String,
    outgoing: mpsc::UnboundedSender<AgentCommand>,
    incoming: mpsc::UnboundedReceiver<String>,
}

impl MockAgent {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (outgoing, mut outgoing_rx) = mpsc::unbounded_channel::<AgentCommand>();
        let (incoming_tx, incoming) = mpsc::unbounded_channel::<String>();

        tokio::spawn(async move {
            let Ok((tcp, _)) = listener.accept().await else {
                return;
            };
            let Ok(socket) = accept_async(tcp).await else {
                return;
            };
            let (mut sink, mut stream) = socket.split();

            let reader = tokio::spawn(async move {
                while let Some(Ok(message)) = stream.next().await {
                    if let Message::Text(text) = message {
                        if incoming_tx.send(text).is_err() {
                            break;
                        }
                    }
                }
            });

            while let Some(command) = outgoing_rx.recv().await {
                match command {
                    AgentCommand::Frame(message) => {
                        let closing = matches!(message, Message::Close(_));
                        if sink.send(message).await.is_err() || closing {
                            break;
                        }
                    }
                    AgentCommand::HangUp => {
                        // Both halves must go for the TCP stream to close
                        reader.abort();
                        let _ = reader.await;
                        drop(sink);
                        return;
                    }
                }
            }
        });

        Self {
            url: format!("ws://{}/realtime", addr),
            outgoing,
            incoming,
        }
    }

    pub fn send_json(&self, json: &str) {
        let _ = self.outgoing.send(AgentCommand::Frame(Message::Text(json.to_string())));
    }

    /// Clean close: sends a close frame.
    pub fn close(&self) {
        let _ = self.outgoing.send(AgentCommand::Frame(Message::Close(None)));
    }

    /// Transport failure: the TCP stream ends with no close frame.
    pub fn hang_up(&self) {
        let _ = self.outgoing.send(AgentCommand::HangUp);
    }

    /// Next text frame from the client, or `None` after five seconds.
    pub async fn next_message(&mut self) -> Option<String> {
        tokio::time::timeout(Duration::from_secs(5), self.incoming.recv())
            .await
            .ok()
            .flatten()
    }
}

/// Counters observed from outside a [`ScriptedSource`].
#[derive(Clone, Default)]
pub(crate) struct SourceCounters {
    pub opens: Arc<AtomicUsize>,
    pub closes: Arc<AtomicUsize>,
}

impl SourceCounters {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

/// A microphone that plays back a fixed list of blocks, or refuses access.
pub(crate) struct ScriptedSource {
    frames: Vec<AudioFrame>,
    deny: Option<CaptureError>,
    counters: SourceCounters,
    live: Option<mpsc::Sender<AudioFrame>>,
    feeder: Option<JoinHandle<()>>,
}

impl ScriptedSource {
    pub fn with_frames(frames: Vec<AudioFrame>) -> Self {
        Self {
            frames,
            deny: None,
            counters: SourceCounters::default(),
            live: None,
            feeder: None,
        }
    }

    pub fn denied(error: CaptureError) -> Self {
        Self {
            deny: Some(error),
            ..Self::with_frames(Vec::new())
        }
    }

    pub fn counters(&self) -> SourceCounters {
        self.counters.clone()
    }
}

#[async_trait]
impl AudioSource for ScriptedSource {
    async fn open(
        &mut self,
        _constraints: &CaptureConstraints,
    ) -> Result<mpsc::Receiver<AudioFrame>, CaptureError> {
        if let Some(err) = &self.deny {
            return Err(err.clone());
        }
        self.counters.opens.fetch_add(1, Ordering::SeqCst);

        let (tx, rx) = mpsc::channel(1);
        let frames = self.frames.clone();
        let feeder_tx = tx.clone();
        self.feeder = Some(tokio::spawn(async move {
            for frame in frames {
                if feeder_tx.send(frame).await.is_err() {
                    break;
                }
            }
        }));
        self.live = Some(tx);
        Ok(rx)
    }

    fn close(&mut self) {
        if let Some(feeder) = self.feeder.take() {
            feeder.abort();
        }
        if self.live.take().is_some() {
            self.counters.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// A speaker that records what it was asked to play.
#[derive(Default)]
pub(crate) struct RecordingSink {
    played: Mutex<Vec<Vec<i16>>>,
    poisoned: Mutex<Vec<Vec<u8>>>,
    play_delay: Duration,
    active: AtomicUsize,
    max_active: AtomicUsize,
    stops: AtomicUsize,
}

impl RecordingSink {
    pub fn with_delay(play_delay: Duration) -> Self {
        Self {
            play_delay,
            ..Self::default()
        }
    }

    /// Make decoding fail for this exact PCM payload.
    pub fn poison(&self, pcm: Vec<u8>) {
        self.poisoned.lock().push(pcm);
    }

    pub fn played(&self) -> Vec<Vec<i16>> {
        self.played.lock().clone()
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AudioSink for RecordingSink {
    async fn decode(&self, container: &[u8]) -> Result<DecodedAudio, PlaybackError> {
        let payload = &container[WAV_HEADER_LEN.min(container.len())..];
        if self.poisoned.lock().iter().any(|p| p.as_slice() == payload) {
            return Err(PlaybackError::Decode("poisoned payload".to_string()));
        }
        codec::decode_container(container)
    }

    async fn play(&self, audio: DecodedAudio) -> Result<(), PlaybackError> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        self.played.lock().push(audio.samples);
        tokio::time::sleep(self.play_delay).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}
