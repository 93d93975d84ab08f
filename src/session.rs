//! # Voice Session Controller
//!
//! Orchestrates one voice conversation: it owns the capture manager, the agent
//! connection and the playback queue, folds inbound events into the observable
//! [`VoiceState`], and tears everything down in dependency order.
//!
//! ## Session Lifecycle:
//! 1. **Disconnected**: nothing held except the (idle) microphone handle
//! 2. **Connecting**: `start_listening` opens the connection lazily
//! 3. **Connected / Listening**: a dispatcher task applies inbound events, capture streams frames
//! 4. **Speaking**: the playback queue is draining assistant audio
//! 5. **Error**: a failure was surfaced through `VoiceState::error`
//!
//! ## Teardown Order:
//! dispatcher → capture (forwarder, then device) → connection → pending playback.
//! `disconnect()` and a connection lost underneath the session share this path,
//! and running it twice is harmless.

use crate::audio::capture::CaptureManager;
use crate::audio::playback::PlaybackQueue;
use crate::audio::traits::{AudioSink, AudioSource};
use crate::config::AppConfig;
use crate::connection::{ConnectionEvent, ProtocolConnection};
use crate::error::{VoiceError, VoiceResult, CONNECTION_LOST_MESSAGE};
use crate::protocol::{InboundEvent, OutboundEvent};
use crate::speech;
use crate::state::{Effect, VoiceState};

use chrono::Utc;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Counters for one controller, cumulative across reconnects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    /// Capture frames handed to an open connection
    pub frames_sent: u64,
    /// `response.audio.delta` payloads received
    pub audio_chunks_received: u64,
    /// Received payloads that could not be decoded or played back
    pub audio_chunks_failed: u64,
}

/// Why the session is being torn down.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Teardown {
    /// Caller asked for it; the snapshot goes back to its initial value
    Disconnect,
    /// The agent closed the connection cleanly
    RemoteClosed,
    /// The transport failed
    ConnectionLost,
}

struct SessionResources {
    capture: CaptureManager,
    connection: Option<ProtocolConnection>,
    playback: Option<PlaybackQueue>,
    dispatcher: Option<JoinHandle<()>>,
    /// Bumped per connection so a stale dispatcher cannot tear down its successor
    epoch: u64,
}

struct SessionInner {
    id: Uuid,
    config: AppConfig,
    sink: Arc<dyn AudioSink>,
    state: Arc<watch::Sender<VoiceState>>,
    audio_received: AtomicU64,
    audio_dropped: AtomicU64,
    resources: Mutex<SessionResources>,
}

/// Handle to one voice conversation. Clones share the same session.
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<SessionInner>,
}

impl SessionController {
    pub fn new(config: AppConfig, source: Box<dyn AudioSource>, sink: Arc<dyn AudioSink>) -> Self {
        let (state, _) = watch::channel(VoiceState::default());
        let capture = CaptureManager::new(source, config.capture_constraints());
        let id = Uuid::new_v4();
        debug!(session_id = %id, endpoint = %config.agent.endpoint, "Voice session created");

        Self {
            inner: Arc::new(SessionInner {
                id,
                config,
                sink,
                state: Arc::new(state),
                audio_received: AtomicU64::new(0),
                audio_dropped: AtomicU64::new(0),
                resources: Mutex::new(SessionResources {
                    capture,
                    connection: None,
                    playback: None,
                    dispatcher: None,
                    epoch: 0,
                }),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// Connect if needed, then start streaming the microphone.
    ///
    /// A connection failure sets the fixed connection message and is returned.
    /// A microphone failure only lands in `VoiceState::error`; the connection
    /// stays up and the call may be retried.
    pub async fn start_listening(&self) -> VoiceResult<()> {
        let inner = &self.inner;
        let mut res = inner.resources.lock().await;

        if res.capture.is_active() {
            debug!(session_id = %inner.id, "Already listening");
            return Ok(());
        }
        inner.state.send_modify(|s| s.error = None);

        let connected = res.connection.as_ref().is_some_and(|c| c.is_open());
        if !connected {
            inner.connect(&mut res).await?;
        }

        let Some(sender) = res.connection.as_ref().map(|c| c.sender()) else {
            return Ok(());
        };
        match res.capture.start(sender).await {
            Ok(()) => {
                info!(session_id = %inner.id, "Listening");
                inner.state.send_modify(|s| s.is_listening = true);
            }
            Err(err) => {
                warn!(session_id = %inner.id, error = %err, "Could not start capture");
                inner.state.send_modify(|s| {
                    s.is_listening = false;
                    s.fail(err.to_string());
                });
            }
        }
        Ok(())
    }

    /// Stop the microphone only. The connection and any assistant audio keep going.
    pub async fn stop_listening(&self) {
        let mut res = self.inner.resources.lock().await;
        res.capture.stop();
        self.inner.state.send_modify(|s| s.is_listening = false);
        debug!(session_id = %self.inner.id, "Stopped listening");
    }

    /// Start listening if idle, otherwise stop.
    pub async fn toggle_voice(&self) -> VoiceResult<()> {
        if self.snapshot().is_listening {
            self.stop_listening().await;
            Ok(())
        } else {
            self.start_listening().await
        }
    }

    /// Cut off assistant audio immediately, including the chunk being played.
    pub async fn stop_speaking(&self) {
        let res = self.inner.resources.lock().await;
        if let Some(playback) = &res.playback {
            playback.interrupt();
        }
        self.inner.state.send_modify(|s| s.is_speaking = false);
        debug!(session_id = %self.inner.id, "Assistant audio interrupted");
    }

    /// Have the agent read a text reply aloud, markdown stripped.
    ///
    /// Current assistant audio is cut off first. The synthesized speech comes
    /// back as ordinary audio deltas through the playback queue. Returns
    /// `Ok(false)` when nothing speakable is left.
    pub async fn speak_response(&self, text: &str) -> VoiceResult<bool> {
        let spoken = speech::clean_markdown(text);
        if spoken.is_empty() {
            debug!(session_id = %self.inner.id, "Nothing to speak");
            return Ok(false);
        }

        let res = self.inner.resources.lock().await;
        let Some(connection) = res.connection.as_ref().filter(|c| c.is_open()) else {
            return Err(VoiceError::NotConnected);
        };

        if let Some(playback) = &res.playback {
            playback.interrupt();
        }
        self.inner.state.send_modify(|s| s.is_speaking = false);

        if !connection.send(&OutboundEvent::speak(&spoken)) {
            return Err(VoiceError::NotConnected);
        }
        info!(session_id = %self.inner.id, chars = spoken.chars().count(), "Speaking response");
        Ok(true)
    }

    /// Release everything and return to the initial state. Safe to call repeatedly.
    pub async fn disconnect(&self) {
        self.inner.teardown(Teardown::Disconnect, None).await;
    }

    pub fn snapshot(&self) -> VoiceState {
        self.inner.state.borrow().clone()
    }

    /// Receiver that observes every snapshot change.
    pub fn subscribe(&self) -> watch::Receiver<VoiceState> {
        self.inner.state.subscribe()
    }

    pub async fn stats(&self) -> SessionStats {
        let res = self.inner.resources.lock().await;
        let playback_failures = res.playback.as_ref().map_or(0, |p| p.decode_failures());
        SessionStats {
            frames_sent: res.capture.frames_sent(),
            audio_chunks_received: self.inner.audio_received.load(Ordering::Relaxed),
            audio_chunks_failed: self.inner.audio_dropped.load(Ordering::Relaxed) + playback_failures,
        }
    }
}

impl SessionInner {
    /// Open a fresh connection and wire up playback and the dispatcher.
    async fn connect(self: &Arc<Self>, res: &mut SessionResources) -> VoiceResult<()> {
        // A connection the agent already closed may still be parked here
        if let Some(dispatcher) = res.dispatcher.take() {
            dispatcher.abort();
        }
        if let Some(mut stale) = res.connection.take() {
            stale.close().await;
        }

        self.state.send_modify(|s| s.begin_connecting());

        let (connection, events) = match ProtocolConnection::connect(
            &self.config.agent.endpoint,
            self.config.connect_timeout(),
        )
        .await
        {
            Ok(connected) => connected,
            Err(err) => {
                error!(session_id = %self.id, error = %err, "Could not connect to voice agent");
                self.state.send_modify(|s| {
                    s.mark_disconnected();
                    s.fail(err.user_message());
                });
                return Err(err);
            }
        };

        let playback = res
            .playback
            .get_or_insert_with(|| self.playback_queue())
            .clone();

        res.epoch += 1;
        res.dispatcher = Some(tokio::spawn(dispatch(
            Arc::downgrade(self),
            events,
            playback,
            res.epoch,
        )));
        res.connection = Some(connection);

        self.state.send_modify(|s| s.mark_connected(Utc::now()));
        info!(session_id = %self.id, "Voice session connected");
        Ok(())
    }

    fn playback_queue(&self) -> PlaybackQueue {
        let on_start = self.state.clone();
        let on_end = self.state.clone();
        PlaybackQueue::new(
            self.sink.clone(),
            Arc::new(move || on_start.send_modify(|s| s.is_speaking = true)),
            Arc::new(move || on_end.send_modify(|s| s.is_speaking = false)),
        )
    }

    fn handle_event(&self, event: &InboundEvent, playback: &PlaybackQueue) {
        let mut effect = Effect::None;
        self.state.send_modify(|s| effect = s.apply(event));

        match effect {
            Effect::None => {}
            Effect::Play(pcm) => {
                self.audio_received.fetch_add(1, Ordering::Relaxed);
                playback.enqueue(pcm);
            }
            Effect::DroppedAudio => {
                self.audio_received.fetch_add(1, Ordering::Relaxed);
                self.audio_dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Shared teardown path. `origin` is the epoch of the dispatcher calling
    /// this, or `None` for a caller-initiated disconnect.
    async fn teardown(&self, reason: Teardown, origin: Option<u64>) {
        let mut res = self.resources.lock().await;

        match origin {
            Some(epoch) if epoch != res.epoch => return,
            // The dispatcher is the caller; it returns on its own
            Some(_) => drop(res.dispatcher.take()),
            None => {
                if let Some(dispatcher) = res.dispatcher.take() {
                    dispatcher.abort();
                }
            }
        }

        res.capture.stop();
        if let Some(mut connection) = res.connection.take() {
            connection.close().await;
        }
        if let Some(playback) = &res.playback {
            playback.clear();
        }

        match reason {
            Teardown::Disconnect => {
                self.state.send_replace(VoiceState::default());
            }
            Teardown::RemoteClosed => {
                self.state.send_modify(|s| s.mark_disconnected());
            }
            Teardown::ConnectionLost => {
                self.state.send_modify(|s| {
                    s.mark_disconnected();
                    s.fail(CONNECTION_LOST_MESSAGE);
                });
            }
        }
        info!(session_id = %self.id, reason = ?reason, "Voice session torn down");
    }
}

/// Applies inbound events in arrival order until the connection ends.
async fn dispatch(
    session: Weak<SessionInner>,
    mut events: mpsc::UnboundedReceiver<ConnectionEvent>,
    playback: PlaybackQueue,
    epoch: u64,
) {
    while let Some(event) = events.recv().await {
        let Some(inner) = session.upgrade() else {
            return;
        };

        match event {
            ConnectionEvent::Envelope(event) => inner.handle_event(&event, &playback),
            ConnectionEvent::Closed { reason } => {
                info!(session_id = %inner.id, reason = ?reason, "Voice agent ended the session");
                inner.teardown(Teardown::RemoteClosed, Some(epoch)).await;
                return;
            }
            ConnectionEvent::Failed(detail) => {
                error!(session_id = %inner.id, error = %detail, "Voice session connection lost");
                inner.teardown(Teardown::ConnectionLost, Some(epoch)).await;
                return;
            }
        }
    }
}
