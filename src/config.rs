//! # Configuration Management
//!
//! Loads the voice client configuration from layered sources:
//! - TOML configuration file (config.toml)
//! - Environment variables (with APP_ prefix)
//! - Default values (built into the code)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. `VOICE_AGENT_URL` (deployment shorthand for `agent.endpoint`)
//! 2. Environment variables (`APP_AGENT__ENDPOINT`, `APP_AUDIO__BLOCK_SIZE`, etc.)
//! 3. Configuration file (config.toml)
//! 4. Default values (defined in the Default impl)
//!
//! The wire format (24kHz, mono, 16-bit) is fixed and deliberately not configurable.

use crate::audio::types::{CaptureConstraints, CHANNELS, DEFAULT_BLOCK_SIZE, SAMPLE_RATE};

use anyhow::Result;                 // Better error handling with context
use serde::{Deserialize, Serialize};  // For converting to/from TOML and env values
use std::env;                       // For the VOICE_AGENT_URL shorthand
use std::time::Duration;

/// Main client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub agent: AgentConfig,
    pub audio: AudioConfig,
}

/// Where the remote agent lives and how long to wait for it.
///
/// ## Fields:
/// - `endpoint`: WebSocket URL of the realtime endpoint (`ws://` or `wss://`)
/// - `connect_timeout_ms`: upper bound on the connection handshake
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub endpoint: String,
    pub connect_timeout_ms: u64,
}

/// Microphone settings.
///
/// ## Fields:
/// - `block_size`: samples per capture block (power of two, 256..=16384)
/// - `echo_cancellation`, `noise_suppression`, `auto_gain_control`: processing requested
///   from the platform; backends that cannot provide them ignore them
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    pub block_size: usize,
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            agent: AgentConfig {
                endpoint: "ws://127.0.0.1:8080/realtime".to_string(),
                connect_timeout_ms: 10_000,
            },
            audio: AudioConfig {
                block_size: DEFAULT_BLOCK_SIZE,
                echo_cancellation: true,
                noise_suppression: true,
                auto_gain_control: true,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from all sources in priority order.
    ///
    /// ## Environment Variable Examples:
    /// - `APP_AGENT__ENDPOINT=wss://agent.example.com/realtime`
    /// - `APP_AGENT__CONNECT_TIMEOUT_MS=5000`
    /// - `APP_AUDIO__NOISE_SUPPRESSION=false`
    /// - `VOICE_AGENT_URL=wss://agent.example.com/realtime`
    ///
    /// ## Rust Concepts:
    /// - **Builder chain**: each `add_source` layers on top of the previous one
    /// - **try_deserialize()**: maps the merged key/value tree onto `AppConfig` via serde
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        if let Ok(url) = env::var("VOICE_AGENT_URL") {
            settings = settings.set_override("agent.endpoint", url)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    pub fn validate(&self) -> Result<()> {
        let endpoint = self.agent.endpoint.as_str();
        let host = endpoint
            .strip_prefix("ws://")
            .or_else(|| endpoint.strip_prefix("wss://"));
        match host {
            Some(rest) if !rest.is_empty() && !rest.starts_with('/') => {}
            _ => {
                return Err(anyhow::anyhow!(
                    "Agent endpoint must be a ws:// or wss:// URL, got '{}'",
                    endpoint
                ))
            }
        }

        if self.agent.connect_timeout_ms == 0 {
            return Err(anyhow::anyhow!("Connect timeout must be greater than 0"));
        }

        let block_size = self.audio.block_size;
        if !block_size.is_power_of_two() || !(256..=16384).contains(&block_size) {
            return Err(anyhow::anyhow!(
                "Audio block size must be a power of two between 256 and 16384, got {}",
                block_size
            ));
        }

        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.agent.connect_timeout_ms)
    }

    /// Constraints the microphone is opened with.
    pub fn capture_constraints(&self) -> CaptureConstraints {
        CaptureConstraints {
            sample_rate: SAMPLE_RATE,
            channels: CHANNELS,
            block_size: self.audio.block_size,
            echo_cancellation: self.audio.echo_cancellation,
            noise_suppression: self.audio.noise_suppression,
            auto_gain_control: self.audio.auto_gain_control,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.agent.connect_timeout_ms, 10_000);
        assert_eq!(config.connect_timeout(), Duration::from_secs(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_capture_constraints() {
        let config = AppConfig::default();
        assert_eq!(config.capture_constraints(), CaptureConstraints::default());
    }

    #[test]
    fn test_endpoint_validation() {
        let mut config = AppConfig::default();

        config.agent.endpoint = "wss://agent.example.com/realtime".to_string();
        assert!(config.validate().is_ok());

        for bad in ["http://agent.example.com", "ws://", "agent.example.com", ""] {
            config.agent.endpoint = bad.to_string();
            assert!(config.validate().is_err(), "accepted {:?}", bad);
        }
    }

    #[test]
    fn test_numeric_validation() {
        let mut config = AppConfig::default();
        config.agent.connect_timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        for bad in [0, 100, 3000, 32768] {
            config.audio.block_size = bad;
            assert!(config.validate().is_err(), "accepted block size {}", bad);
        }
        config.audio.block_size = 1024;
        assert!(config.validate().is_ok());
    }
}
