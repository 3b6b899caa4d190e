//! Transport capability interfaces
//!
//! The real-time transport (peer connection, data channel) is defined as a
//! capability interface with one production implementation over the
//! platform WebRTC stack and fake implementations in the test harness, so
//! state transitions can be exercised without network or hardware.

pub mod webrtc;

use crate::config::SessionConfig;
use crate::media::{AudioCaptureStream, PlaybackSink};
use crate::signaling::SessionDescription;
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;

pub use self::webrtc::WebRtcTransportFactory;

/// Callback slot for raw inbound event-channel frames
pub type InboundFrameHandler = Box<dyn Fn(String) + Send + Sync>;

/// Creates peer transports
#[async_trait]
pub trait TransportFactory: Send + Sync {
    /// Instantiate a new peer transport
    async fn create_peer(&self, config: &SessionConfig) -> Result<Arc<dyn PeerTransport>>;
}

/// One real-time peer transport: media transport plus an ordered, reliable
/// message channel, with offer/answer negotiation primitives
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Register the playback sink for remote audio
    ///
    /// Must be called before negotiation; the remote track may arrive at
    /// any time relative to negotiation completion.
    fn set_remote_audio_sink(&self, sink: Arc<dyn PlaybackSink>);

    /// Attach the local capture stream as an outgoing audio track
    ///
    /// Must be called before [`create_offer`](Self::create_offer) so the
    /// track is included in the offer.
    async fn attach_local_audio(&self, capture: Arc<dyn AudioCaptureStream>) -> Result<()>;

    /// Open the event message channel
    async fn open_event_channel(&self, label: &str) -> Result<Arc<dyn EventChannelTransport>>;

    /// Generate the local offer and set it as the local description
    async fn create_offer(&self) -> Result<SessionDescription>;

    /// Apply the remote answer as the remote description
    async fn apply_remote_answer(&self, answer: SessionDescription) -> Result<()>;

    /// Close the transport and release all track references
    ///
    /// Idempotent: closing an already-closed or never-negotiated transport
    /// is a no-op, not an error.
    async fn close(&self) -> Result<()>;
}

/// The ordered, reliable message channel carried by the peer transport
#[async_trait]
pub trait EventChannelTransport: Send + Sync {
    /// Check if the channel is open and ready for sending
    fn is_open(&self) -> bool;

    /// Transmit one text frame
    ///
    /// Callers must check readiness first; sends on a channel that is not
    /// open fail rather than queue.
    async fn send_text(&self, payload: String) -> Result<()>;

    /// Register the single inbound frame callback
    fn set_message_handler(&self, handler: InboundFrameHandler);

    /// Close the channel
    async fn close(&self) -> Result<()>;
}
