//! Production transport over the webrtc crate
//!
//! One peer connection per session: local microphone audio goes out as an
//! Opus track, remote agent audio comes back on a remote track and is
//! decoded into the playback sink, and a single reliable ordered data
//! channel carries the JSON event protocol.

use super::{EventChannelTransport, InboundFrameHandler, PeerTransport, TransportFactory};
use crate::config::SessionConfig;
use crate::media::{AudioCaptureStream, AudioDecoder, AudioEncoder, PlaybackSink};
use crate::signaling::SessionDescription;
use crate::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::data_channel::data_channel_init::RTCDataChannelInit;
use webrtc::data_channel::data_channel_state::RTCDataChannelState;
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::media::Sample;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTPCodecType};
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

/// Creates [`WebRtcPeer`] transports
pub struct WebRtcTransportFactory;

impl WebRtcTransportFactory {
    /// Create the factory
    pub fn new() -> Self {
        Self
    }
}

impl Default for WebRtcTransportFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TransportFactory for WebRtcTransportFactory {
    async fn create_peer(&self, config: &SessionConfig) -> Result<Arc<dyn PeerTransport>> {
        let peer = WebRtcPeer::new(config).await?;
        Ok(Arc::new(peer))
    }
}

type SinkSlot = Arc<parking_lot::RwLock<Option<Arc<dyn PlaybackSink>>>>;

/// WebRTC peer connection wrapper
pub struct WebRtcPeer {
    /// Unique identifier for this connection instance
    connection_id: String,

    /// Actual WebRTC peer connection
    peer_connection: Arc<RTCPeerConnection>,

    /// Audio parameters for local encode / remote decode
    audio: crate::config::AudioConfig,

    /// Playback sink slot filled before negotiation, read on remote track arrival
    remote_sink: SinkSlot,

    /// Local audio encode pump task
    local_pump: Mutex<Option<tokio::task::JoinHandle<()>>>,

    /// Whether close() already ran
    closed: AtomicBool,
}

impl WebRtcPeer {
    /// Create a new peer connection
    pub async fn new(config: &SessionConfig) -> Result<Self> {
        let connection_id = uuid::Uuid::new_v4().to_string();

        info!("Creating peer connection: connection_id={}", connection_id);

        // Create MediaEngine with default codecs (Opus for audio)
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| Error::PeerConnectionError(format!("Failed to register codecs: {}", e)))?;

        let interceptor_registry =
            register_default_interceptors(Default::default(), &mut media_engine).map_err(|e| {
                Error::PeerConnectionError(format!("Failed to register interceptors: {}", e))
            })?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(interceptor_registry)
            .build();

        // Configure ICE servers (STUN/TURN)
        let ice_servers: Vec<RTCIceServer> = config
            .stun_servers
            .iter()
            .map(|url| RTCIceServer {
                urls: vec![url.clone()],
                ..Default::default()
            })
            .chain(config.turn_servers.iter().map(|turn| {
                #[allow(clippy::needless_update)]
                RTCIceServer {
                    urls: vec![turn.url.clone()],
                    username: turn.username.clone(),
                    credential: turn.credential.clone(),
                    ..Default::default()
                }
            }))
            .collect();

        let rtc_config = RTCConfiguration {
            ice_servers,
            ..Default::default()
        };

        let peer_connection = Arc::new(api.new_peer_connection(rtc_config).await.map_err(|e| {
            Error::PeerConnectionError(format!("Failed to create peer connection: {}", e))
        })?);

        let id_for_log = connection_id.clone();
        peer_connection.on_peer_connection_state_change(Box::new(
            move |state: RTCPeerConnectionState| {
                let id = id_for_log.clone();
                Box::pin(async move {
                    debug!("Peer {} transport state: {}", id, state);
                })
            },
        ));

        let remote_sink: SinkSlot = Arc::new(parking_lot::RwLock::new(None));
        Self::register_track_handler(
            &peer_connection,
            Arc::clone(&remote_sink),
            config.audio,
            connection_id.clone(),
        );

        Ok(Self {
            connection_id,
            peer_connection,
            audio: config.audio,
            remote_sink,
            local_pump: Mutex::new(None),
            closed: AtomicBool::new(false),
        })
    }

    /// Get the connection ID
    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    /// Register the remote track handler
    ///
    /// The remote track may arrive before or after negotiation completes;
    /// the sink slot is read at arrival time, not registration time.
    fn register_track_handler(
        peer_connection: &Arc<RTCPeerConnection>,
        sink_slot: SinkSlot,
        audio: crate::config::AudioConfig,
        connection_id: String,
    ) {
        peer_connection.on_track(Box::new(move |track, _receiver, _transceiver| {
            let sink_slot = Arc::clone(&sink_slot);
            let connection_id = connection_id.clone();
            Box::pin(async move {
                if track.kind() != RTPCodecType::Audio {
                    debug!("Ignoring non-audio remote track");
                    return;
                }

                let sink = match sink_slot.read().clone() {
                    Some(sink) => sink,
                    None => {
                        warn!("Remote track arrived with no playback sink attached");
                        return;
                    }
                };

                info!("Peer {} remote audio track arrived", connection_id);

                tokio::spawn(async move {
                    let mut decoder = match AudioDecoder::new(audio.sample_rate, audio.channels) {
                        Ok(decoder) => decoder,
                        Err(e) => {
                            warn!("Failed to create remote audio decoder: {}", e);
                            return;
                        }
                    };

                    while let Ok((packet, _)) = track.read_rtp().await {
                        if packet.payload.is_empty() {
                            continue;
                        }
                        match decoder.decode(&packet.payload) {
                            Ok(pcm) => sink.write(&pcm, audio.sample_rate, audio.channels),
                            Err(e) => debug!("Dropping undecodable audio packet: {}", e),
                        }
                    }
                    debug!("Remote audio pump stopped");
                });
            })
        }));
    }
}

#[async_trait]
impl PeerTransport for WebRtcPeer {
    fn set_remote_audio_sink(&self, sink: Arc<dyn PlaybackSink>) {
        *self.remote_sink.write() = Some(sink);
    }

    async fn attach_local_audio(&self, capture: Arc<dyn AudioCaptureStream>) -> Result<()> {
        let track = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: "audio/opus".to_string(),
                clock_rate: capture.sample_rate(),
                channels: capture.channels(),
                sdp_fmtp_line: String::new(),
                rtcp_feedback: vec![],
            },
            format!("audio-{}", self.connection_id),
            format!("stream-{}", self.connection_id),
        ));

        self.peer_connection
            .add_track(Arc::clone(&track) as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .map_err(|e| Error::MediaTrackError(format!("Failed to add audio track: {}", e)))?;

        let mut encoder =
            AudioEncoder::new(capture.sample_rate(), capture.channels(), self.audio.bitrate)?;

        // Opus requires exact frame sizes; capture buffers are chunked into
        // frames of the configured duration, at the capture rate.
        let frame_ms = self.audio.frame_duration_ms;
        let frame_samples = (capture.sample_rate() as usize * frame_ms as usize / 1000)
            * capture.channels() as usize;
        let frame_duration = Duration::from_millis(frame_ms as u64);
        let mut rx = capture.frames();

        let handle = tokio::spawn(async move {
            let mut pending: Vec<i16> = Vec::new();
            loop {
                match rx.recv().await {
                    Ok(frame) => {
                        pending.extend_from_slice(&frame.samples);
                        while pending.len() >= frame_samples {
                            let pcm: Vec<i16> = pending.drain(..frame_samples).collect();
                            match encoder.encode(&pcm) {
                                Ok(payload) => {
                                    let sample = Sample {
                                        data: Bytes::from(payload),
                                        duration: frame_duration,
                                        ..Default::default()
                                    };
                                    if let Err(e) = track.write_sample(&sample).await {
                                        debug!("Dropping outgoing audio sample: {}", e);
                                    }
                                }
                                Err(e) => warn!("Audio encode failed: {}", e),
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Local audio pump lagged, skipped {} frames", n);
                        pending.clear();
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            debug!("Local audio pump stopped");
        });

        *self.local_pump.lock().await = Some(handle);

        debug!("Local audio track attached to peer {}", self.connection_id);

        Ok(())
    }

    async fn open_event_channel(&self, label: &str) -> Result<Arc<dyn EventChannelTransport>> {
        let init = RTCDataChannelInit {
            ordered: Some(true),
            ..Default::default()
        };

        let rtc_channel = self
            .peer_connection
            .create_data_channel(label, Some(init))
            .await
            .map_err(|e| Error::DataChannelError(format!("Failed to create data channel: {}", e)))?;

        let channel = WebRtcEventChannel::new(rtc_channel);

        debug!(
            "Event channel '{}' created on peer {}",
            label, self.connection_id
        );

        Ok(Arc::new(channel))
    }

    async fn create_offer(&self) -> Result<SessionDescription> {
        let offer = self
            .peer_connection
            .create_offer(None)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to create offer: {}", e)))?;

        self.peer_connection
            .set_local_description(offer)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to set local description: {}", e)))?;

        let local_desc = self
            .peer_connection
            .local_description()
            .await
            .ok_or_else(|| {
                Error::SdpError("No local description after setting offer".to_string())
            })?;

        debug!("Created SDP offer for peer {}", self.connection_id);

        Ok(SessionDescription::offer(local_desc.sdp))
    }

    async fn apply_remote_answer(&self, answer: SessionDescription) -> Result<()> {
        debug!("Setting remote description for peer {}", self.connection_id);

        let answer = RTCSessionDescription::answer(answer.sdp)
            .map_err(|e| Error::SdpError(format!("Failed to parse answer: {}", e)))?;

        self.peer_connection
            .set_remote_description(answer)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to set remote description: {}", e)))?;

        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        info!("Closing peer connection {}", self.connection_id);

        if let Some(handle) = self.local_pump.lock().await.take() {
            handle.abort();
        }

        self.remote_sink.write().take();

        self.peer_connection
            .close()
            .await
            .map_err(|e| Error::PeerConnectionError(format!("Failed to close connection: {}", e)))
    }
}

/// Data channel wrapper implementing the event channel transport
pub struct WebRtcEventChannel {
    rtc_channel: Arc<RTCDataChannel>,
}

impl WebRtcEventChannel {
    /// Wrap an RTCDataChannel and register open/close logging
    pub fn new(rtc_channel: Arc<RTCDataChannel>) -> Self {
        let label = rtc_channel.label().to_string();
        rtc_channel.on_open(Box::new(move || {
            let label = label.clone();
            Box::pin(async move {
                debug!("Data channel '{}' opened", label);
            })
        }));

        let label = rtc_channel.label().to_string();
        rtc_channel.on_close(Box::new(move || {
            let label = label.clone();
            Box::pin(async move {
                debug!("Data channel '{}' closed", label);
            })
        }));

        let label = rtc_channel.label().to_string();
        rtc_channel.on_error(Box::new(move |err| {
            let label = label.clone();
            Box::pin(async move {
                warn!("Data channel '{}' error: {}", label, err);
            })
        }));

        Self { rtc_channel }
    }
}

#[async_trait]
impl EventChannelTransport for WebRtcEventChannel {
    fn is_open(&self) -> bool {
        self.rtc_channel.ready_state() == RTCDataChannelState::Open
    }

    async fn send_text(&self, payload: String) -> Result<()> {
        self.rtc_channel
            .send_text(payload)
            .await
            .map(|_| ())
            .map_err(|e| Error::DataChannelError(format!("Failed to send message: {}", e)))
    }

    fn set_message_handler(&self, handler: InboundFrameHandler) {
        let label = self.rtc_channel.label().to_string();
        let handler = Arc::new(handler);

        self.rtc_channel.on_message(Box::new(move |msg| {
            let handler = Arc::clone(&handler);
            let label = label.clone();

            let text = if msg.is_string {
                String::from_utf8(msg.data.to_vec()).ok()
            } else {
                None
            };

            Box::pin(async move {
                match text {
                    Some(frame) => handler(frame),
                    None => warn!("Dropping non-text frame on channel '{}'", label),
                }
            })
        }));
    }

    async fn close(&self) -> Result<()> {
        self.rtc_channel
            .close()
            .await
            .map_err(|e| Error::DataChannelError(format!("Failed to close channel: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;

    #[tokio::test]
    async fn test_peer_creation() {
        let config = SessionConfig::default();
        let peer = WebRtcPeer::new(&config).await.unwrap();
        assert!(!peer.connection_id().is_empty());
    }

    #[tokio::test]
    async fn test_create_offer() {
        let config = SessionConfig::default();
        let peer = WebRtcPeer::new(&config).await.unwrap();

        let offer = peer.create_offer().await.unwrap();
        assert!(offer.is_offer());
        assert!(!offer.sdp.is_empty());
    }

    #[tokio::test]
    async fn test_offer_includes_event_channel() {
        let config = SessionConfig::default();
        let peer = WebRtcPeer::new(&config).await.unwrap();

        let channel = peer.open_event_channel("oai-events").await.unwrap();
        assert!(!channel.is_open());

        // data channels appear as an application media section in the SDP
        let offer = peer.create_offer().await.unwrap();
        assert!(offer.sdp.contains("application"));
    }

    #[tokio::test]
    async fn test_send_before_open_fails() {
        let config = SessionConfig::default();
        let peer = WebRtcPeer::new(&config).await.unwrap();

        let channel = peer.open_event_channel("oai-events").await.unwrap();
        let result = channel.send_text("{}".to_string()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let config = SessionConfig::default();
        let peer = WebRtcPeer::new(&config).await.unwrap();

        peer.close().await.unwrap();
        peer.close().await.unwrap();
    }
}
