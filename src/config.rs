//! Configuration types for the voice session manager

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Sample rates the Opus codec accepts
const OPUS_SAMPLE_RATES: [u32; 5] = [8000, 12000, 16000, 24000, 48000];

/// Frame durations (milliseconds) the Opus codec accepts
const OPUS_FRAME_DURATIONS_MS: [u32; 4] = [10, 20, 40, 60];

/// Main configuration for a [`SessionManager`](crate::SessionManager)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Backend route that mints the ephemeral session credential
    pub credential_url: String,

    /// Remote realtime session endpoint for the offer/answer exchange
    pub realtime_url: String,

    /// Model identifier appended to the signaling URL as a query parameter
    pub model: String,

    /// Label for the event data channel
    pub event_channel_label: String,

    /// STUN server URLs
    pub stun_servers: Vec<String>,

    /// TURN server configurations (optional)
    pub turn_servers: Vec<TurnServerConfig>,

    /// HTTP request timeout in seconds (credential fetch and signaling)
    pub request_timeout_secs: u64,

    /// Local audio capture/encode parameters
    pub audio: AudioConfig,

    /// Local recording parameters
    pub recording: RecordingConfig,
}

/// TURN server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnServerConfig {
    /// TURN server URL (turn:// or turns://)
    pub url: String,

    /// Username for TURN authentication
    pub username: String,

    /// Credential for TURN authentication
    pub credential: String,
}

/// Audio capture and encoding parameters
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Capture sample rate in Hz (must be an Opus-supported rate)
    pub sample_rate: u32,

    /// Channel count (1 = mono, 2 = stereo)
    pub channels: u16,

    /// Encoded frame duration in milliseconds
    pub frame_duration_ms: u32,

    /// Opus target bitrate in bits/second
    pub bitrate: u32,
}

/// Local recording parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingConfig {
    /// Duration of each recorded chunk in milliseconds
    pub chunk_duration_ms: u64,

    /// Directory for WAV chunk output; when `None`, chunks are only observed
    pub output_dir: Option<PathBuf>,
}

impl SessionConfig {
    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if !self.credential_url.starts_with("http") {
            return Err(Error::InvalidConfig(format!(
                "credential_url must be an HTTP(S) URL, got '{}'",
                self.credential_url
            )));
        }

        if !self.realtime_url.starts_with("http") {
            return Err(Error::InvalidConfig(format!(
                "realtime_url must be an HTTP(S) URL, got '{}'",
                self.realtime_url
            )));
        }

        if self.model.is_empty() {
            return Err(Error::InvalidConfig("model must not be empty".to_string()));
        }

        if self.event_channel_label.is_empty() {
            return Err(Error::InvalidConfig(
                "event_channel_label must not be empty".to_string(),
            ));
        }

        if self.request_timeout_secs == 0 {
            return Err(Error::InvalidConfig(
                "request_timeout_secs must be greater than zero".to_string(),
            ));
        }

        self.audio.validate()?;
        self.recording.validate()?;

        Ok(())
    }
}

impl AudioConfig {
    /// Validate audio parameters against Opus constraints
    pub fn validate(&self) -> Result<()> {
        if !OPUS_SAMPLE_RATES.contains(&self.sample_rate) {
            return Err(Error::InvalidConfig(format!(
                "sample_rate {} is not supported by Opus (expected one of {:?})",
                self.sample_rate, OPUS_SAMPLE_RATES
            )));
        }

        if !(1..=2).contains(&self.channels) {
            return Err(Error::InvalidConfig(format!(
                "channels must be 1 or 2, got {}",
                self.channels
            )));
        }

        if !OPUS_FRAME_DURATIONS_MS.contains(&self.frame_duration_ms) {
            return Err(Error::InvalidConfig(format!(
                "frame_duration_ms {} is not supported by Opus (expected one of {:?})",
                self.frame_duration_ms, OPUS_FRAME_DURATIONS_MS
            )));
        }

        if self.bitrate == 0 {
            return Err(Error::InvalidConfig(
                "bitrate must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    /// Number of interleaved samples in one encoded frame
    pub fn samples_per_frame(&self) -> usize {
        (self.sample_rate as usize * self.frame_duration_ms as usize / 1000)
            * self.channels as usize
    }
}

impl RecordingConfig {
    /// Validate recording parameters
    pub fn validate(&self) -> Result<()> {
        if self.chunk_duration_ms == 0 {
            return Err(Error::InvalidConfig(
                "chunk_duration_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            credential_url: "http://localhost:3000/api/session".to_string(),
            realtime_url: "https://api.openai.com/v1/realtime".to_string(),
            model: "gpt-4o-realtime-preview-2024-12-17".to_string(),
            event_channel_label: "oai-events".to_string(),
            stun_servers: vec!["stun:stun.l.google.com:19302".to_string()],
            turn_servers: Vec::new(),
            request_timeout_secs: 10,
            audio: AudioConfig::default(),
            recording: RecordingConfig::default(),
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channels: 1,
            frame_duration_ms: 20,
            bitrate: 64000,
        }
    }
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            chunk_duration_ms: 5000,
            output_dir: None,
        }
    }
}
