//! Opus encode/decode wrappers
//!
//! Thin wrappers over the opus codec with session error mapping. Opus only
//! accepts specific sample rates and frame durations; both are enforced by
//! config validation and again here by the codec itself.

use crate::{Error, Result};

/// Maximum encoded packet size handed to the transport
const MAX_PACKET_SIZE: usize = 1500;

/// Maximum decoded frame: 120 ms at 48 kHz, per channel
const MAX_DECODE_SAMPLES: usize = 5760;

fn channels_of(channels: u16) -> Result<opus::Channels> {
    match channels {
        1 => Ok(opus::Channels::Mono),
        2 => Ok(opus::Channels::Stereo),
        n => Err(Error::InvalidConfig(format!(
            "Opus supports 1 or 2 channels, got {}",
            n
        ))),
    }
}

/// Opus encoder for outgoing audio
#[derive(Debug)]
pub struct AudioEncoder {
    inner: opus::Encoder,
    sample_rate: u32,
    channels: u16,
}

impl AudioEncoder {
    /// Create a voice-tuned encoder
    pub fn new(sample_rate: u32, channels: u16, bitrate: u32) -> Result<Self> {
        let mut inner =
            opus::Encoder::new(sample_rate, channels_of(channels)?, opus::Application::Voip)
                .map_err(|e| {
                    Error::MediaTrackError(format!("failed to create Opus encoder: {}", e))
                })?;

        inner
            .set_bitrate(opus::Bitrate::Bits(bitrate as i32))
            .map_err(|e| Error::MediaTrackError(format!("failed to set Opus bitrate: {}", e)))?;

        Ok(Self {
            inner,
            sample_rate,
            channels,
        })
    }

    /// Encode one PCM frame
    ///
    /// `pcm` must contain exactly one Opus-legal frame of interleaved
    /// samples (see [`AudioConfig::samples_per_frame`](crate::config::AudioConfig::samples_per_frame)).
    pub fn encode(&mut self, pcm: &[i16]) -> Result<Vec<u8>> {
        let mut packet = vec![0u8; MAX_PACKET_SIZE];
        let written = self
            .inner
            .encode(pcm, &mut packet)
            .map_err(|e| Error::MediaTrackError(format!("Opus encode failed: {}", e)))?;
        packet.truncate(written);
        Ok(packet)
    }

    /// Encoder sample rate in Hz
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Encoder channel count
    pub fn channels(&self) -> u16 {
        self.channels
    }
}

/// Opus decoder for incoming audio
pub struct AudioDecoder {
    inner: opus::Decoder,
    channels: u16,
}

impl AudioDecoder {
    /// Create a decoder producing PCM at the given rate
    pub fn new(sample_rate: u32, channels: u16) -> Result<Self> {
        let inner = opus::Decoder::new(sample_rate, channels_of(channels)?).map_err(|e| {
            Error::MediaTrackError(format!("failed to create Opus decoder: {}", e))
        })?;

        Ok(Self { inner, channels })
    }

    /// Decode one packet into interleaved PCM
    pub fn decode(&mut self, packet: &[u8]) -> Result<Vec<i16>> {
        let mut pcm = vec![0i16; MAX_DECODE_SAMPLES * self.channels as usize];
        let samples_per_channel = self
            .inner
            .decode(packet, &mut pcm, false)
            .map_err(|e| Error::MediaTrackError(format!("Opus decode failed: {}", e)))?;
        pcm.truncate(samples_per_channel * self.channels as usize);
        Ok(pcm)
    }
}
