//! Real-time voice sessions with a remote conversational agent
//!
//! This crate establishes a bidirectional, low-latency audio+data
//! connection to a realtime agent endpoint, multiplexes a JSON event
//! protocol over the data channel, and manages local capture and recording
//! alongside the live transport.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  SessionManager                                          │
//! │  ├─ CredentialProvider (ephemeral secret over HTTPS)     │
//! │  ├─ SignalingExchange  (SDP offer/answer over HTTPS)     │
//! │  ├─ PeerTransport      (WebRTC media + data channel)     │
//! │  │   └─ EventChannel   (JSON event protocol)             │
//! │  ├─ MediaPipeline      (microphone ⇄ speaker, Opus)      │
//! │  └─ RecordingController (local WAV chunk capture)        │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use voice_session::{SessionConfig, SessionManager};
//!
//! # async fn example() -> voice_session::Result<()> {
//! let config = SessionConfig::default();
//! let session = SessionManager::new(config, Arc::new(|msg| println!("agent: {msg}")))?;
//!
//! session.start().await?;
//! session.send_text("Summarize my spending this month.").await?;
//! session.end().await;
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]

pub mod channels;
pub mod config;
pub mod credential;
pub mod error;
pub mod media;
pub mod recording;
pub mod session;
pub mod signaling;
pub mod transport;

// Re-exports for public API
pub use channels::event_channel::MessageCallback;
pub use channels::{ChannelEvent, EventChannel, OutboundCommand, ResponseSpec};
pub use config::{AudioConfig, RecordingConfig, SessionConfig, TurnServerConfig};
pub use credential::{CredentialProvider, EphemeralCredential, HttpCredentialFetcher};
pub use error::{Error, Result};
pub use media::{AudioCaptureStream, AudioDevices, AudioFrame, MediaPipeline, PlaybackSink};
pub use recording::{AudioChunk, ChunkSink, RecorderState, RecordingController, WavChunkSink};
pub use session::{ConnectionStatus, SessionManager, SessionStack};
pub use signaling::{HttpSignalingExchange, SdpType, SessionDescription, SignalingExchange};
pub use transport::{EventChannelTransport, PeerTransport, TransportFactory, WebRtcTransportFactory};

/// Get the version of this crate
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
