//! # cpal Audio Backend
//!
//! Microphone capture and speaker playback on the default host devices.
//!
//! ## Threading:
//! - **Capture**: a dedicated thread owns the `cpal::Stream` (it is not `Send`) and
//!   hands out fixed-size blocks with `try_send`, dropping blocks the consumer missed
//! - **Playback**: each clip plays on a blocking task; `stop()` bumps a counter that
//!   ends the clip early

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BuildStreamError, SampleRate, StreamConfig};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::audio::traits::{AudioSink, AudioSource};
use crate::audio::types::{AudioFrame, CaptureConstraints, DecodedAudio};
use crate::error::{CaptureError, PlaybackError};

fn capture_error(err: BuildStreamError) -> CaptureError {
    match err {
        BuildStreamError::DeviceNotAvailable => CaptureError::NotFound(err.to_string()),
        BuildStreamError::StreamConfigNotSupported | BuildStreamError::InvalidArgument => {
            CaptureError::Unsupported(err.to_string())
        }
        BuildStreamError::BackendSpecific { ref err } => {
            let description = err.description.to_lowercase();
            if description.contains("permission") || description.contains("denied") {
                CaptureError::PermissionDenied(err.description.clone())
            } else if description.contains("busy") {
                CaptureError::Busy(err.description.clone())
            } else {
                CaptureError::Device(err.description.clone())
            }
        }
        other => CaptureError::Device(other.to_string()),
    }
}

/// Signals the capture thread to drop its stream when dropped.
struct StreamHandle {
    stop_tx: std::sync::mpsc::Sender<()>,
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(());
    }
}

/// Default input device, delivering 24kHz mono blocks.
#[derive(Default)]
pub struct CpalSource {
    stream: Option<StreamHandle>,
}

impl CpalSource {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AudioSource for CpalSource {
    /// cpal::Stream is !Send, so a dedicated thread owns it until `close`.
    async fn open(
        &mut self,
        constraints: &CaptureConstraints,
    ) -> Result<mpsc::Receiver<AudioFrame>, CaptureError> {
        self.close();

        if constraints.echo_cancellation || constraints.noise_suppression || constraints.auto_gain_control {
            debug!("Input processing toggles are not provided by cpal and are ignored");
        }

        let (frame_tx, frame_rx) = mpsc::channel(1);
        let (stop_tx, stop_rx) = std::sync::mpsc::channel::<()>();
        let (ready_tx, ready_rx) = oneshot::channel::<Result<(), CaptureError>>();

        let config = StreamConfig {
            channels: constraints.channels,
            sample_rate: SampleRate(constraints.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };
        let block_size = constraints.block_size;

        std::thread::spawn(move || {
            let host = cpal::default_host();
            let Some(device) = host.default_input_device() else {
                let _ = ready_tx.send(Err(CaptureError::NotFound("No input device".to_string())));
                return;
            };
            info!(device = %device.name().unwrap_or_default(), "Opening input device");

            let mut block = Vec::with_capacity(block_size);
            let stream = device.build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    for &sample in data {
                        block.push(sample);
                        if block.len() == block_size {
                            let full = std::mem::replace(&mut block, Vec::with_capacity(block_size));
                            // A block the consumer has no room for is dropped
                            let _ = frame_tx.try_send(AudioFrame::new(full));
                        }
                    }
                },
                |err| error!(error = %err, "Input stream error"),
                None,
            );

            let stream = match stream {
                Ok(stream) => stream,
                Err(err) => {
                    let _ = ready_tx.send(Err(capture_error(err)));
                    return;
                }
            };
            if let Err(err) = stream.play() {
                let _ = ready_tx.send(Err(CaptureError::Device(err.to_string())));
                return;
            }
            let _ = ready_tx.send(Ok(()));

            let _ = stop_rx.recv();
            drop(stream);
            info!("Input device released");
        });

        match ready_rx.await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => return Err(err),
            Err(_) => return Err(CaptureError::Device("Capture thread exited".to_string())),
        }

        self.stream = Some(StreamHandle { stop_tx });
        Ok(frame_rx)
    }

    fn close(&mut self) {
        self.stream.take();
    }
}

/// Default output device. Each clip plays on a blocking task.
#[derive(Default)]
pub struct CpalSink {
    /// Bumped by `stop` so every clip started before it ends early
    stops: Arc<AtomicU64>,
}

impl CpalSink {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AudioSink for CpalSink {
    async fn play(&self, audio: DecodedAudio) -> Result<(), PlaybackError> {
        if audio.samples.is_empty() {
            return Ok(());
        }

        let stops = self.stops.clone();
        let started_at = stops.load(Ordering::SeqCst);

        tokio::task::spawn_blocking(move || {
            let host = cpal::default_host();
            let device = host
                .default_output_device()
                .ok_or_else(|| PlaybackError::Output("No output device".to_string()))?;

            let config = StreamConfig {
                channels: audio.channels,
                sample_rate: SampleRate(audio.sample_rate),
                buffer_size: cpal::BufferSize::Default,
            };
            let duration = Duration::from_secs_f32(audio.duration_secs());
            let samples = audio.to_f32();
            let mut position = 0;

            let stream = device
                .build_output_stream(
                    &config,
                    move |output: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        for sample in output.iter_mut() {
                            *sample = samples.get(position).copied().unwrap_or(0.0);
                            position += 1;
                        }
                    },
                    |err| error!(error = %err, "Output stream error"),
                    None,
                )
                .map_err(|err| PlaybackError::Output(err.to_string()))?;
            stream
                .play()
                .map_err(|err| PlaybackError::Output(err.to_string()))?;

            // Tail margin so the device buffer empties before the stream is dropped
            let deadline = Instant::now() + duration + Duration::from_millis(100);
            while Instant::now() < deadline {
                if stops.load(Ordering::SeqCst) != started_at {
                    debug!("Playback stopped early");
                    break;
                }
                std::thread::sleep(Duration::from_millis(10));
            }
            Ok(())
        })
        .await
        .map_err(|err| {
            warn!(error = %err, "Playback task failed");
            PlaybackError::Output(err.to_string())
        })?
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}
