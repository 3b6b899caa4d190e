//! Deterministic fake stack for session tests
//!
//! Fakes for every capability interface (credential, signaling, transport,
//! audio devices), with counters so tests can assert that no resources
//! leak. No network, no hardware.

// each test binary uses a different subset of the harness
#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, Notify};
use voice_session::media::FRAME_CHANNEL_CAPACITY;
use voice_session::transport::InboundFrameHandler;
use voice_session::{
    AudioCaptureStream, AudioConfig, AudioDevices, AudioFrame, CredentialProvider,
    EphemeralCredential, Error, EventChannelTransport, PeerTransport, PlaybackSink, Result,
    SessionConfig, SessionDescription, SessionStack, SignalingExchange, TransportFactory,
};

/// Resource counters shared by all fakes
#[derive(Default)]
pub struct FakeStats {
    pub peers_created: AtomicUsize,
    pub peers_closed: AtomicUsize,
    pub captures_opened: AtomicUsize,
    pub captures_stopped: AtomicUsize,
    pub playbacks_opened: AtomicUsize,
    pub playbacks_stopped: AtomicUsize,
    pub channels_opened: AtomicUsize,
    pub channels_closed: AtomicUsize,
}

impl FakeStats {
    pub fn open_captures(&self) -> usize {
        self.captures_opened.load(Ordering::SeqCst) - self.captures_stopped.load(Ordering::SeqCst)
    }

    pub fn open_channels(&self) -> usize {
        self.channels_opened.load(Ordering::SeqCst) - self.channels_closed.load(Ordering::SeqCst)
    }

    pub fn open_peers(&self) -> usize {
        self.peers_created.load(Ordering::SeqCst) - self.peers_closed.load(Ordering::SeqCst)
    }
}

/// Failure injection and synchronization points
#[derive(Default)]
pub struct Controls {
    pub fail_credential: AtomicBool,
    pub fail_signaling: AtomicBool,
    pub fail_capture: AtomicBool,
    /// When set, `exchange()` parks until [`Controls::release_signaling`]
    pub gate_signaling: AtomicBool,
    pub signaling_reached: Notify,
    signaling_release: Notify,
}

impl Controls {
    pub fn release_signaling(&self) {
        self.signaling_release.notify_one();
    }
}

/// Fake stack plus handles for observation and injection
pub struct Harness {
    pub stats: Arc<FakeStats>,
    pub controls: Arc<Controls>,
    channel_slot: Arc<Mutex<Option<Arc<FakeEventChannel>>>>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            stats: Arc::new(FakeStats::default()),
            controls: Arc::new(Controls::default()),
            channel_slot: Arc::new(Mutex::new(None)),
        }
    }

    /// Build a stack of fakes wired to this harness
    pub fn stack(&self) -> SessionStack {
        SessionStack {
            credentials: Arc::new(FakeCredentials {
                controls: Arc::clone(&self.controls),
            }),
            signaling: Arc::new(FakeSignaling {
                controls: Arc::clone(&self.controls),
            }),
            transports: Arc::new(FakeTransportFactory {
                stats: Arc::clone(&self.stats),
                channel_slot: Arc::clone(&self.channel_slot),
            }),
            audio: Arc::new(FakeAudioDevices {
                stats: Arc::clone(&self.stats),
                controls: Arc::clone(&self.controls),
            }),
        }
    }

    /// Deliver one inbound frame through the registered channel handler
    pub fn inject_frame(&self, frame: &str) {
        let slot = self.channel_slot.lock();
        let channel = slot.as_ref().expect("no event channel open");
        channel.inject(frame);
    }

    /// Frames sent on the current event channel
    pub fn sent_frames(&self) -> Vec<String> {
        self.channel_slot
            .lock()
            .as_ref()
            .map(|channel| channel.sent.lock().clone())
            .unwrap_or_default()
    }

    /// Check whether any event channel was ever opened
    pub fn has_channel(&self) -> bool {
        self.channel_slot.lock().is_some()
    }
}

pub fn test_config() -> SessionConfig {
    SessionConfig {
        recording: voice_session::RecordingConfig {
            chunk_duration_ms: 50,
            output_dir: None,
        },
        ..Default::default()
    }
}

struct FakeCredentials {
    controls: Arc<Controls>,
}

#[async_trait]
impl CredentialProvider for FakeCredentials {
    async fn fetch(&self) -> Result<EphemeralCredential> {
        if self.controls.fail_credential.load(Ordering::SeqCst) {
            return Err(Error::CredentialError("forced failure".to_string()));
        }
        Ok(EphemeralCredential::new("ek_test_secret"))
    }
}

struct FakeSignaling {
    controls: Arc<Controls>,
}

#[async_trait]
impl SignalingExchange for FakeSignaling {
    async fn exchange(
        &self,
        offer: &SessionDescription,
        _credential: &EphemeralCredential,
    ) -> Result<SessionDescription> {
        assert!(offer.is_offer(), "exchange must receive a local offer");

        if self.controls.gate_signaling.load(Ordering::SeqCst) {
            self.controls.signaling_reached.notify_one();
            self.controls.signaling_release.notified().await;
        }

        if self.controls.fail_signaling.load(Ordering::SeqCst) {
            return Err(Error::SignalingError("forced failure".to_string()));
        }

        Ok(SessionDescription::answer("v=0\r\nfake-answer"))
    }
}

struct FakeTransportFactory {
    stats: Arc<FakeStats>,
    channel_slot: Arc<Mutex<Option<Arc<FakeEventChannel>>>>,
}

#[async_trait]
impl TransportFactory for FakeTransportFactory {
    async fn create_peer(&self, _config: &SessionConfig) -> Result<Arc<dyn PeerTransport>> {
        self.stats.peers_created.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FakePeer {
            stats: Arc::clone(&self.stats),
            channel_slot: Arc::clone(&self.channel_slot),
            closed: AtomicBool::new(false),
            sink: Mutex::new(None),
            audio_attached: AtomicBool::new(false),
        }))
    }
}

pub struct FakePeer {
    stats: Arc<FakeStats>,
    channel_slot: Arc<Mutex<Option<Arc<FakeEventChannel>>>>,
    closed: AtomicBool,
    sink: Mutex<Option<Arc<dyn PlaybackSink>>>,
    audio_attached: AtomicBool,
}

#[async_trait]
impl PeerTransport for FakePeer {
    fn set_remote_audio_sink(&self, sink: Arc<dyn PlaybackSink>) {
        *self.sink.lock() = Some(sink);
    }

    async fn attach_local_audio(&self, _capture: Arc<dyn AudioCaptureStream>) -> Result<()> {
        self.audio_attached.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn open_event_channel(&self, _label: &str) -> Result<Arc<dyn EventChannelTransport>> {
        self.stats.channels_opened.fetch_add(1, Ordering::SeqCst);
        let channel = Arc::new(FakeEventChannel {
            stats: Arc::clone(&self.stats),
            open: AtomicBool::new(true),
            sent: Mutex::new(Vec::new()),
            handler: Mutex::new(None),
        });
        *self.channel_slot.lock() = Some(Arc::clone(&channel));
        Ok(channel)
    }

    async fn create_offer(&self) -> Result<SessionDescription> {
        assert!(
            self.audio_attached.load(Ordering::SeqCst),
            "local audio must be attached before the offer"
        );
        Ok(SessionDescription::offer("v=0\r\nfake-offer"))
    }

    async fn apply_remote_answer(&self, answer: SessionDescription) -> Result<()> {
        assert!(!answer.is_offer(), "remote description must be an answer");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.stats.peers_closed.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

pub struct FakeEventChannel {
    stats: Arc<FakeStats>,
    open: AtomicBool,
    pub sent: Mutex<Vec<String>>,
    handler: Mutex<Option<InboundFrameHandler>>,
}

impl FakeEventChannel {
    pub fn inject(&self, frame: &str) {
        let handler = self.handler.lock();
        if let Some(handler) = handler.as_ref() {
            handler(frame.to_string());
        }
    }
}

#[async_trait]
impl EventChannelTransport for FakeEventChannel {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn send_text(&self, payload: String) -> Result<()> {
        if !self.is_open() {
            return Err(Error::DataChannelError("channel closed".to_string()));
        }
        self.sent.lock().push(payload);
        Ok(())
    }

    fn set_message_handler(&self, handler: InboundFrameHandler) {
        *self.handler.lock() = Some(handler);
    }

    async fn close(&self) -> Result<()> {
        if self.open.swap(false, Ordering::SeqCst) {
            self.stats.channels_closed.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

struct FakeAudioDevices {
    stats: Arc<FakeStats>,
    controls: Arc<Controls>,
}

#[async_trait]
impl AudioDevices for FakeAudioDevices {
    async fn open_capture(&self, config: &AudioConfig) -> Result<Arc<dyn AudioCaptureStream>> {
        if self.controls.fail_capture.load(Ordering::SeqCst) {
            return Err(Error::MediaAccessError("forced failure".to_string()));
        }

        self.stats.captures_opened.fetch_add(1, Ordering::SeqCst);

        let (tx, _) = broadcast::channel(FRAME_CHANNEL_CAPACITY);
        let sample_rate = config.sample_rate;
        let channels = config.channels;

        // silence generator, faster than real time so recording tests run quickly
        let generator_tx = tx.clone();
        let generator = tokio::spawn(async move {
            let samples_per_frame = (sample_rate as usize / 100) * channels as usize;
            let mut timestamp_ms = 0u64;
            loop {
                tokio::time::sleep(std::time::Duration::from_millis(2)).await;
                let _ = generator_tx.send(AudioFrame {
                    samples: vec![0i16; samples_per_frame],
                    sample_rate,
                    channels,
                    timestamp_ms,
                });
                timestamp_ms += 10;
            }
        });

        Ok(Arc::new(FakeCapture {
            stats: Arc::clone(&self.stats),
            tx,
            sample_rate,
            channels,
            active: AtomicBool::new(true),
            generator: Mutex::new(Some(generator)),
        }))
    }

    async fn open_playback(&self, _config: &AudioConfig) -> Result<Arc<dyn PlaybackSink>> {
        self.stats.playbacks_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FakeSink {
            stats: Arc::clone(&self.stats),
            stopped: AtomicBool::new(false),
        }))
    }
}

pub struct FakeCapture {
    stats: Arc<FakeStats>,
    tx: broadcast::Sender<AudioFrame>,
    sample_rate: u32,
    channels: u16,
    active: AtomicBool,
    generator: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

#[async_trait]
impl AudioCaptureStream for FakeCapture {
    fn frames(&self) -> broadcast::Receiver<AudioFrame> {
        self.tx.subscribe()
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    async fn stop(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            self.stats.captures_stopped.fetch_add(1, Ordering::SeqCst);
        }
        if let Some(generator) = self.generator.lock().take() {
            generator.abort();
        }
    }
}

struct FakeSink {
    stats: Arc<FakeStats>,
    stopped: AtomicBool,
}

impl PlaybackSink for FakeSink {
    fn write(&self, _samples: &[i16], _sample_rate: u32, _channels: u16) {}

    fn stop(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            self.stats.playbacks_stopped.fetch_add(1, Ordering::SeqCst);
        }
    }
}
