//! Local media capture and playback
//!
//! Bridges hardware audio input/output to the transport. Devices are a
//! capability interface: production capture/playback is backed by cpal,
//! tests use fakes. Capture frames fan out over a broadcast channel so the
//! transport pump and the recording controller can consume the same stream.

pub mod codec;
pub mod cpal_backend;

use crate::config::AudioConfig;
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

pub use codec::{AudioDecoder, AudioEncoder};
pub use cpal_backend::CpalAudioDevices;

/// Broadcast capacity for capture frame fan-out
pub const FRAME_CHANNEL_CAPACITY: usize = 256;

/// One block of captured audio (16-bit PCM, interleaved)
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

/// Audio device access
///
/// Production implementation: [`CpalAudioDevices`]. The test harness
/// provides a deterministic fake.
#[async_trait]
pub trait AudioDevices: Send + Sync {
    /// Open the microphone
    ///
    /// # Errors
    ///
    /// [`crate::Error::MediaAccessError`] when the device is unavailable;
    /// this aborts session start.
    async fn open_capture(&self, config: &AudioConfig) -> Result<Arc<dyn AudioCaptureStream>>;

    /// Open the playback sink for remote audio
    async fn open_playback(&self, config: &AudioConfig) -> Result<Arc<dyn PlaybackSink>>;
}

/// An active local capture stream
#[async_trait]
pub trait AudioCaptureStream: Send + Sync {
    /// Subscribe to the capture frame fan-out
    fn frames(&self) -> broadcast::Receiver<AudioFrame>;

    /// Actual capture sample rate in Hz
    fn sample_rate(&self) -> u32;

    /// Actual capture channel count
    fn channels(&self) -> u16;

    /// Check if the stream is still capturing
    fn is_active(&self) -> bool;

    /// Stop capturing
    ///
    /// Never errors; stopping an already-stopped stream is a no-op.
    async fn stop(&self);
}

/// Playback sink for the remote audio stream
pub trait PlaybackSink: Send + Sync {
    /// Queue decoded samples for playback (best effort)
    fn write(&self, samples: &[i16], sample_rate: u32, channels: u16);

    /// Detach and silence the sink
    ///
    /// Never errors; stopping a stopped sink is a no-op.
    fn stop(&self);
}

/// Local capture and playback for one session
///
/// Owns the local stream for the session's lifetime; the remote stream is
/// owned by the transport and only referenced here for playback attachment.
/// At most one capture stream and one playback sink exist at a time.
pub struct MediaPipeline {
    devices: Arc<dyn AudioDevices>,
    config: AudioConfig,
    capture: Option<Arc<dyn AudioCaptureStream>>,
    playback: Option<Arc<dyn PlaybackSink>>,
}

impl MediaPipeline {
    /// Create a pipeline over the given devices
    pub fn new(devices: Arc<dyn AudioDevices>, config: AudioConfig) -> Self {
        Self {
            devices,
            config,
            capture: None,
            playback: None,
        }
    }

    /// Open (or return the already-open) playback sink
    pub async fn open_playback(&mut self) -> Result<Arc<dyn PlaybackSink>> {
        if let Some(playback) = &self.playback {
            return Ok(Arc::clone(playback));
        }

        let playback = self.devices.open_playback(&self.config).await?;
        self.playback = Some(Arc::clone(&playback));
        Ok(playback)
    }

    /// Open (or return the already-open) microphone capture stream
    pub async fn open_capture(&mut self) -> Result<Arc<dyn AudioCaptureStream>> {
        if let Some(capture) = &self.capture {
            return Ok(Arc::clone(capture));
        }

        let capture = self.devices.open_capture(&self.config).await?;
        debug!(
            "Local capture opened: {} Hz, {} channel(s)",
            capture.sample_rate(),
            capture.channels()
        );
        self.capture = Some(Arc::clone(&capture));
        Ok(capture)
    }

    /// Subscribe to capture frames, if a stream is active
    pub fn frames(&self) -> Option<broadcast::Receiver<AudioFrame>> {
        self.capture.as_ref().map(|capture| capture.frames())
    }

    /// Check if a local capture stream is active
    pub fn has_capture(&self) -> bool {
        self.capture.is_some()
    }

    /// Stop capture and detach the playback sink
    ///
    /// Safe to call repeatedly and when nothing was ever opened.
    pub async fn teardown(&mut self) {
        if let Some(capture) = self.capture.take() {
            capture.stop().await;
            debug!("Local capture stopped");
        }
        if let Some(playback) = self.playback.take() {
            playback.stop();
            debug!("Playback sink detached");
        }
    }
}

/// Average interleaved multi-channel samples down to mono
pub fn downmix_to_mono(samples: &[i16], channels: u16) -> Vec<i16> {
    if channels <= 1 {
        return samples.to_vec();
    }

    let channels = channels as usize;
    samples
        .chunks_exact(channels)
        .map(|frame| {
            let sum: i32 = frame.iter().map(|&s| s as i32).sum();
            (sum / channels as i32) as i16
        })
        .collect()
}

/// Convert f32 samples (-1.0..1.0) to i16 PCM
pub fn f32_to_i16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
        .collect()
}
