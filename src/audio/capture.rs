//! # Capture Manager
//!
//! Owns the microphone for one session and forwards each captured block to the
//! agent as an `input_audio_buffer.append` envelope.
//!
//! ## Pipeline:
//! 1. **Open**: the [`AudioSource`] is opened with the session's [`CaptureConstraints`]
//! 2. **Forward**: a task receives blocks, encodes them and hands them to the [`OutboundSender`]
//! 3. **Stop**: the forwarder is aborted first, then the source releases the device
//!
//! Blocks are never buffered here. The source channel holds a single block. The
//! outbound sender drops frames while the connection is not open, and once its
//! bounded writer queue is full.

use crate::audio::codec;
use crate::audio::traits::AudioSource;
use crate::audio::types::CaptureConstraints;
use crate::connection::OutboundSender;
use crate::error::CaptureError;
use crate::protocol::OutboundEvent;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub struct CaptureManager {
    source: Box<dyn AudioSource>,
    constraints: CaptureConstraints,
    forwarder: Option<JoinHandle<()>>,
    frames_sent: Arc<AtomicU64>,
}

impl CaptureManager {
    pub fn new(source: Box<dyn AudioSource>, constraints: CaptureConstraints) -> Self {
        Self {
            source,
            constraints,
            forwarder: None,
            frames_sent: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Acquire the microphone and start streaming blocks through `sender`.
    ///
    /// Starting an already active manager is a no-op. On failure nothing is
    /// held and the call may be retried.
    pub async fn start(&mut self, sender: OutboundSender) -> Result<(), CaptureError> {
        if self.is_active() {
            debug!("Capture already active");
            return Ok(());
        }

        let mut frames = match self.source.open(&self.constraints).await {
            Ok(frames) => frames,
            Err(err) => {
                warn!(error = %err, "Microphone acquisition failed");
                self.source.close();
                return Err(err);
            }
        };

        info!(
            sample_rate = self.constraints.sample_rate,
            block_size = self.constraints.block_size,
            "Capture started"
        );

        let frames_sent = self.frames_sent.clone();
        self.forwarder = Some(tokio::spawn(async move {
            while let Some(frame) = frames.recv().await {
                let audio = codec::encode_samples(frame.samples());
                if sender.send(&OutboundEvent::append(audio)) {
                    frames_sent.fetch_add(1, Ordering::Relaxed);
                }
            }
            debug!("Capture stream ended");
        }));

        Ok(())
    }

    /// Stop forwarding and release the microphone. Safe to call repeatedly.
    pub fn stop(&mut self) {
        let Some(forwarder) = self.forwarder.take() else {
            return;
        };
        forwarder.abort();
        self.source.close();
        info!(frames_sent = self.frames_sent(), "Capture stopped");
    }

    pub fn is_active(&self) -> bool {
        self.forwarder
            .as_ref()
            .map(|forwarder| !forwarder.is_finished())
            .unwrap_or(false)
    }

    /// Frames handed to an open connection since this manager was created.
    pub fn frames_sent(&self) -> u64 {
        self.frames_sent.load(Ordering::Relaxed)
    }
}

impl Drop for CaptureManager {
    fn drop(&mut self) {
        self.stop();
    }
}
