//! # Duplex Voice Runner
//!
//! Starts one voice session against the configured agent with the default audio
//! backend, logs every state change, and disconnects on Ctrl+C or SIGTERM.
//!
//! ## Environment Variables:
//! - `RUST_LOG`: log filter, defaults to `duplex_voice=debug`
//! - `VOICE_AGENT_URL`, `APP_AGENT__ENDPOINT`, ...: see `config.rs`

use anyhow::Result;                       // Errors at the binary edge
use duplex_voice::audio::default_backend;  // Devices for this build (cpal or dummy)
use duplex_voice::{AppConfig, SessionController, VoiceState};
use tokio_stream::wrappers::WatchStream;   // Turns the state watch into a Stream
use tokio_stream::StreamExt;
use tracing::{error, info, warn};          // Structured logging
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};  // Logging setup

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting duplex-voice v{}", env!("CARGO_PKG_VERSION"));
    info!(endpoint = %config.agent.endpoint, "Configuration loaded");

    let (source, sink) = default_backend();
    let session = SessionController::new(config, source, sink);

    let mut changes = WatchStream::new(session.subscribe());
    let watcher = tokio::spawn(async move {
        let mut last: Option<VoiceState> = None;
        while let Some(state) = changes.next().await {
            log_transition(last.as_ref(), &state);
            last = Some(state);
        }
    });

    if let Err(err) = session.start_listening().await {
        error!(error = %err, "{}", err.user_message());
        watcher.abort();
        return Err(err.into());
    }

    wait_for_shutdown().await;
    info!("Shutdown signal received, disconnecting...");

    session.disconnect().await;
    let stats = session.stats().await;
    info!(
        frames_sent = stats.frames_sent,
        audio_chunks_received = stats.audio_chunks_received,
        audio_chunks_failed = stats.audio_chunks_failed,
        "Session finished"
    );
    watcher.abort();
    Ok(())
}

fn log_transition(last: Option<&VoiceState>, state: &VoiceState) {
    let phase_changed = last.map_or(true, |prev| prev.phase() != state.phase());
    if phase_changed {
        info!(phase = state.phase().as_str(), "Session state changed");
    }

    if let Some(message) = &state.error {
        if last.and_then(|prev| prev.error.as_ref()) != Some(message) {
            warn!(error = %message, "Voice session error");
        }
    }

    if last.map_or(!state.transcript.is_empty(), |prev| prev.transcript != state.transcript) {
        info!(transcript = %state.transcript, "User");
    }

    if state.assistant_final && last.map_or(true, |prev| !prev.assistant_final) {
        info!(transcript = %state.assistant_transcript, "Assistant");
    }
}

/// Initialize the tracing (logging) system.
///
/// ## Rust Concepts:
/// - **registry()**: a subscriber that layers compose onto
/// - **EnvFilter**: reads `RUST_LOG`, falling back to this crate at debug level
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "duplex_voice=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}

/// Resolves on Ctrl+C, or SIGTERM on unix.
async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
