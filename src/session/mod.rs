//! Session façade
//!
//! [`SessionManager`] composes credential fetch, signaling, the peer
//! transport, the media pipeline, and the recording controller into a
//! single owned object with explicit handles behind accessor methods.
//! Connection status and transcript are observable through watch channels.

use crate::channels::event_channel::MessageCallback;
use crate::channels::EventChannel;
use crate::config::SessionConfig;
use crate::credential::{CredentialProvider, HttpCredentialFetcher};
use crate::media::{AudioDevices, CpalAudioDevices, MediaPipeline};
use crate::recording::{ChunkSink, LogChunkSink, RecordingController, WavChunkSink};
use crate::signaling::{HttpSignalingExchange, SignalingExchange};
use crate::transport::{PeerTransport, TransportFactory, WebRtcTransportFactory};
use crate::{Error, Result};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

/// Connection status of the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// No session active
    Disconnected,
    /// Session start in progress
    Connecting,
    /// Transport negotiated and live
    Connected,
    /// Session start failed
    Error,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Disconnected => write!(f, "disconnected"),
            ConnectionStatus::Connecting => write!(f, "connecting"),
            ConnectionStatus::Connected => write!(f, "connected"),
            ConnectionStatus::Error => write!(f, "error"),
        }
    }
}

/// Pluggable collaborators for a session
///
/// Production wiring comes from [`SessionManager::new`]; tests inject fakes
/// through [`SessionManager::with_stack`].
pub struct SessionStack {
    /// Ephemeral credential source
    pub credentials: Arc<dyn CredentialProvider>,
    /// Offer/answer exchange
    pub signaling: Arc<dyn SignalingExchange>,
    /// Peer transport factory
    pub transports: Arc<dyn TransportFactory>,
    /// Audio device access
    pub audio: Arc<dyn AudioDevices>,
}

/// Resources owned by one active (or in-progress) session
struct SessionResources {
    peer: Option<Arc<dyn PeerTransport>>,
    channel: Option<Arc<EventChannel>>,
    media: MediaPipeline,
    recorder: RecordingController,
}

impl SessionResources {
    fn new(config: &SessionConfig, audio: Arc<dyn AudioDevices>) -> Self {
        let sink: Arc<dyn ChunkSink> = match &config.recording.output_dir {
            Some(dir) => Arc::new(WavChunkSink::new(dir.clone(), "chunk")),
            None => Arc::new(LogChunkSink),
        };

        Self {
            peer: None,
            channel: None,
            media: MediaPipeline::new(audio, config.audio),
            recorder: RecordingController::new(config.recording.chunk_duration_ms, sink),
        }
    }
}

/// Real-time voice session manager
///
/// At most one active peer transport, one event channel, and one local
/// capture stream exist per instance at any time. Starting a new session
/// while one is active is a usage error; callers must [`end`](Self::end)
/// first.
pub struct SessionManager {
    config: SessionConfig,
    stack: SessionStack,
    on_message: MessageCallback,

    /// Epoch counter: `end()` bumps it, in-flight `start()` steps compare
    /// against it at each resumption point
    generation: Arc<AtomicU64>,

    status_tx: Arc<watch::Sender<ConnectionStatus>>,
    status_rx: watch::Receiver<ConnectionStatus>,
    transcript_tx: Arc<watch::Sender<String>>,
    transcript_rx: watch::Receiver<String>,

    active: Mutex<Option<SessionResources>>,
}

impl SessionManager {
    /// Create a session manager with the production stack
    ///
    /// `on_message` receives the textual form of every inbound event.
    pub fn new(config: SessionConfig, on_message: MessageCallback) -> Result<Self> {
        config.validate()?;

        let stack = SessionStack {
            credentials: Arc::new(HttpCredentialFetcher::new(&config)?),
            signaling: Arc::new(HttpSignalingExchange::new(&config)?),
            transports: Arc::new(WebRtcTransportFactory::new()),
            audio: Arc::new(CpalAudioDevices::new()),
        };

        Self::with_stack(config, stack, on_message)
    }

    /// Create a session manager with injected collaborators
    pub fn with_stack(
        config: SessionConfig,
        stack: SessionStack,
        on_message: MessageCallback,
    ) -> Result<Self> {
        config.validate()?;

        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Disconnected);
        let (transcript_tx, transcript_rx) = watch::channel(String::new());

        Ok(Self {
            config,
            stack,
            on_message,
            generation: Arc::new(AtomicU64::new(0)),
            status_tx: Arc::new(status_tx),
            status_rx,
            transcript_tx: Arc::new(transcript_tx),
            transcript_rx,
            active: Mutex::new(None),
        })
    }

    /// Current connection status
    pub fn connection_status(&self) -> ConnectionStatus {
        *self.status_rx.borrow()
    }

    /// Subscribe to connection status changes
    pub fn status_changes(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_rx.clone()
    }

    /// Latest transcript text (overwritten per transcript event, not appended)
    pub fn transcript(&self) -> String {
        self.transcript_rx.borrow().clone()
    }

    /// Subscribe to transcript changes
    pub fn transcript_changes(&self) -> watch::Receiver<String> {
        self.transcript_rx.clone()
    }

    /// Start a session
    ///
    /// Sequentially: fetch credential, create the peer transport, open
    /// playback and capture, attach the local track, open the event
    /// channel, negotiate offer/answer. Fails fast on the first error,
    /// tearing down everything already created before propagating.
    ///
    /// # Errors
    ///
    /// [`Error::SessionActive`] when a session is already active or
    /// starting; setup errors per component otherwise.
    pub async fn start(&self) -> Result<()> {
        // fail fast without waiting on the session lock while another
        // start() is in flight
        let status = self.connection_status();
        if matches!(
            status,
            ConnectionStatus::Connecting | ConnectionStatus::Connected
        ) {
            return Err(Error::SessionActive(status.to_string()));
        }

        let mut active = self.active.lock().await;
        if active.is_some() {
            return Err(Error::SessionActive(self.connection_status().to_string()));
        }

        let generation = self.generation.load(Ordering::SeqCst);
        self.set_status(ConnectionStatus::Connecting);

        let mut resources =
            SessionResources::new(&self.config, Arc::clone(&self.stack.audio));

        match self.establish(generation, &mut resources).await {
            Ok(()) => {
                *active = Some(resources);
                self.set_status(ConnectionStatus::Connected);
                info!("Session started");
                Ok(())
            }
            Err(err) => {
                self.release(&mut resources).await;
                if matches!(err, Error::SessionSuperseded) {
                    debug!("Session start superseded by end()");
                    self.set_status(ConnectionStatus::Disconnected);
                } else {
                    warn!("Session start failed: {}", err);
                    self.set_status(ConnectionStatus::Error);
                }
                Err(err)
            }
        }
    }

    /// End the session
    ///
    /// Tears down the recorder, media pipeline, event channel, and peer
    /// transport, in that order. Always succeeds from the caller's
    /// perspective: internal teardown errors are logged, and the status
    /// always ends at `Disconnected`. Idempotent.
    pub async fn end(&self) {
        // bump the epoch first so a pending start() self-tears-down instead
        // of publishing its results
        self.generation.fetch_add(1, Ordering::SeqCst);

        let mut active = self.active.lock().await;
        if let Some(mut resources) = active.take() {
            self.release(&mut resources).await;
            info!("Session ended");
        }

        self.transcript_tx.send_replace(String::new());
        self.set_status(ConnectionStatus::Disconnected);
    }

    /// Send a text instruction to the agent
    ///
    /// # Errors
    ///
    /// [`Error::ChannelNotReady`] when no session is active or the channel
    /// has not opened yet; the message is not queued.
    pub async fn send_text(&self, message: &str) -> Result<()> {
        let active = self.active.lock().await;
        let channel = active
            .as_ref()
            .and_then(|resources| resources.channel.as_ref())
            .ok_or(Error::ChannelNotReady)?;

        channel.send_text(message).await
    }

    /// Start recording raw audio chunks from the local capture stream
    ///
    /// # Errors
    ///
    /// [`Error::NoMediaStream`] when no local capture stream exists.
    pub async fn start_recording(&self) -> Result<()> {
        let mut active = self.active.lock().await;
        let resources = active.as_mut().ok_or(Error::NoMediaStream)?;
        let frames = resources.media.frames().ok_or(Error::NoMediaStream)?;
        resources.recorder.start(frames)
    }

    /// Stop recording
    ///
    /// A no-op when idle or when no session is active.
    pub async fn stop_recording(&self) {
        let mut active = self.active.lock().await;
        if let Some(resources) = active.as_mut() {
            resources.recorder.stop().await;
        }
    }

    /// Check if a recording is in progress
    pub async fn is_recording(&self) -> bool {
        let active = self.active.lock().await;
        active
            .as_ref()
            .map(|resources| resources.recorder.is_recording())
            .unwrap_or(false)
    }

    async fn establish(&self, generation: u64, resources: &mut SessionResources) -> Result<()> {
        let credential = self.stack.credentials.fetch().await?;
        self.check_generation(generation)?;

        let peer = self.stack.transports.create_peer(&self.config).await?;
        resources.peer = Some(Arc::clone(&peer));
        self.check_generation(generation)?;

        // playback sink must be registered before negotiation: the remote
        // track can arrive at any time relative to start() completing
        let playback = resources.media.open_playback().await?;
        peer.set_remote_audio_sink(playback);

        let capture = resources.media.open_capture().await?;
        self.check_generation(generation)?;

        // local track goes in before the offer so it is negotiated
        peer.attach_local_audio(capture).await?;

        let transport = peer
            .open_event_channel(&self.config.event_channel_label)
            .await?;
        let channel = Arc::new(EventChannel::attach(
            transport,
            Arc::clone(&self.transcript_tx),
            Arc::clone(&self.on_message),
        ));
        resources.channel = Some(channel);
        self.check_generation(generation)?;

        let offer = peer.create_offer().await?;
        self.check_generation(generation)?;

        let answer = self.stack.signaling.exchange(&offer, &credential).await?;
        self.check_generation(generation)?;

        peer.apply_remote_answer(answer).await?;
        self.check_generation(generation)?;

        Ok(())
    }

    /// Tear down session resources in order: recorder, media, channel, peer
    ///
    /// Errors are logged and suppressed; teardown always completes.
    async fn release(&self, resources: &mut SessionResources) {
        resources.recorder.stop().await;
        resources.media.teardown().await;

        if let Some(channel) = resources.channel.take() {
            if let Err(e) = channel.close().await {
                warn!("Event channel close failed: {}", e);
            }
        }

        if let Some(peer) = resources.peer.take() {
            if let Err(e) = peer.close().await {
                warn!("Peer transport close failed: {}", e);
            }
        }
    }

    fn check_generation(&self, generation: u64) -> Result<()> {
        if self.generation.load(Ordering::SeqCst) != generation {
            return Err(Error::SessionSuperseded);
        }
        Ok(())
    }

    fn set_status(&self, status: ConnectionStatus) {
        let previous = self.status_tx.send_replace(status);
        if previous != status {
            debug!("Connection status: {} -> {}", previous, status);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_status_display() {
        assert_eq!(ConnectionStatus::Disconnected.to_string(), "disconnected");
        assert_eq!(ConnectionStatus::Connecting.to_string(), "connecting");
        assert_eq!(ConnectionStatus::Connected.to_string(), "connected");
        assert_eq!(ConnectionStatus::Error.to_string(), "error");
    }
}
