//! cpal-backed audio devices
//!
//! Microphone capture and speaker playback. cpal streams are not `Send`,
//! so each stream lives on a dedicated thread that owns it; the async side
//! talks to it through channels and atomics.

use super::{downmix_to_mono, f32_to_i16, AudioCaptureStream, AudioDevices, AudioFrame,
    PlaybackSink, FRAME_CHANNEL_CAPACITY};
use crate::config::AudioConfig;
use crate::{Error, Result};
use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// How long to wait for a device thread to report readiness
const DEVICE_SETUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Production audio devices backed by the platform's default host
pub struct CpalAudioDevices;

impl CpalAudioDevices {
    /// Create a device handle over the default host
    pub fn new() -> Self {
        Self
    }
}

impl Default for CpalAudioDevices {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AudioDevices for CpalAudioDevices {
    async fn open_capture(&self, config: &AudioConfig) -> Result<Arc<dyn AudioCaptureStream>> {
        let capture = CpalCapture::open(*config).await?;
        Ok(Arc::new(capture))
    }

    async fn open_playback(&self, config: &AudioConfig) -> Result<Arc<dyn PlaybackSink>> {
        let playback = CpalPlayback::open(*config).await?;
        Ok(Arc::new(playback))
    }
}

/// Microphone capture stream on a dedicated thread
pub struct CpalCapture {
    frames_tx: broadcast::Sender<AudioFrame>,
    sample_rate: u32,
    channels: u16,
    active: Arc<AtomicBool>,
    stop_tx: Mutex<Option<mpsc::Sender<()>>>,
}

impl CpalCapture {
    async fn open(config: AudioConfig) -> Result<Self> {
        let (frames_tx, _) = broadcast::channel(FRAME_CHANNEL_CAPACITY);
        let (setup_tx, setup_rx) = mpsc::channel::<Result<(u32, u16)>>();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let active = Arc::new(AtomicBool::new(true));

        let thread_frames_tx = frames_tx.clone();
        let thread_active = Arc::clone(&active);

        std::thread::Builder::new()
            .name("voice-capture".to_string())
            .spawn(move || {
                capture_thread(config, thread_frames_tx, thread_active, setup_tx, stop_rx);
            })
            .map_err(|e| Error::MediaAccessError(format!("failed to spawn capture thread: {}", e)))?;

        // if the thread failed before streaming there is nothing to stop
        let (sample_rate, channels) = await_setup(setup_rx).await?;

        Ok(Self {
            frames_tx,
            sample_rate,
            channels,
            active,
            stop_tx: Mutex::new(Some(stop_tx)),
        })
    }
}

#[async_trait]
impl AudioCaptureStream for CpalCapture {
    fn frames(&self) -> broadcast::Receiver<AudioFrame> {
        self.frames_tx.subscribe()
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
        if let Some(stop_tx) = self.stop_tx.lock().take() {
            // waking the thread drops the stream; disconnect works too
            let _ = stop_tx.send(());
        }
        self.active.store(false, Ordering::SeqCst);
    }
}

/// Wait for a device thread to report its negotiated stream parameters
async fn await_setup(setup_rx: mpsc::Receiver<Result<(u32, u16)>>) -> Result<(u32, u16)> {
    tokio::task::spawn_blocking(move || match setup_rx.recv_timeout(DEVICE_SETUP_TIMEOUT) {
        Ok(result) => result,
        Err(_) => Err(Error::MediaAccessError(
            "audio device did not become ready in time".to_string(),
        )),
    })
    .await
    .map_err(|e| Error::MediaAccessError(format!("device setup task failed: {}", e)))?
}

fn capture_thread(
    config: AudioConfig,
    frames_tx: broadcast::Sender<AudioFrame>,
    active: Arc<AtomicBool>,
    setup_tx: mpsc::Sender<Result<(u32, u16)>>,
    stop_rx: mpsc::Receiver<()>,
) {
    let stream = match build_capture_stream(config, frames_tx) {
        Ok((stream, sample_rate, channels)) => {
            let _ = setup_tx.send(Ok((sample_rate, channels)));
            stream
        }
        Err(e) => {
            active.store(false, Ordering::SeqCst);
            let _ = setup_tx.send(Err(e));
            return;
        }
    };

    // block until stop() fires or the handle is dropped
    let _ = stop_rx.recv();
    drop(stream);
    active.store(false, Ordering::SeqCst);
    debug!("Capture thread exited");
}

fn build_capture_stream(
    config: AudioConfig,
    frames_tx: broadcast::Sender<AudioFrame>,
) -> Result<(cpal::Stream, u32, u16)> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| Error::MediaAccessError("no default input device".to_string()))?;

    let (stream_config, sample_format) = select_input_config(&device, config.sample_rate)?;
    let device_rate = stream_config.sample_rate.0;
    let device_channels = stream_config.channels;
    let downmix = config.channels == 1 && device_channels > 1;
    let out_channels = if downmix { 1 } else { device_channels };

    let mut pump = FramePump {
        frames_tx,
        device_channels,
        downmix,
        sample_rate: device_rate,
        samples_seen: 0,
    };

    let err_fn = |e| warn!("Capture stream error: {}", e);

    let stream = match sample_format {
        cpal::SampleFormat::F32 => device
            .build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    pump.push(f32_to_i16(data));
                },
                err_fn,
                None,
            )
            .map_err(|e| Error::MediaAccessError(format!("failed to open microphone: {}", e)))?,
        cpal::SampleFormat::I16 => device
            .build_input_stream(
                &stream_config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    pump.push(data.to_vec());
                },
                err_fn,
                None,
            )
            .map_err(|e| Error::MediaAccessError(format!("failed to open microphone: {}", e)))?,
        other => {
            return Err(Error::MediaAccessError(format!(
                "unsupported capture sample format {:?}",
                other
            )))
        }
    };

    stream
        .play()
        .map_err(|e| Error::MediaAccessError(format!("failed to start capture: {}", e)))?;

    debug!(
        "Microphone capture started: {} Hz, {} device channel(s)",
        device_rate, device_channels
    );

    Ok((stream, device_rate, out_channels))
}

/// Converts device buffers into broadcast frames
struct FramePump {
    frames_tx: broadcast::Sender<AudioFrame>,
    device_channels: u16,
    downmix: bool,
    sample_rate: u32,
    samples_seen: u64,
}

impl FramePump {
    fn push(&mut self, samples: Vec<i16>) {
        let samples = if self.downmix {
            downmix_to_mono(&samples, self.device_channels)
        } else {
            samples
        };

        let channels = if self.downmix { 1 } else { self.device_channels };
        let frame_samples = samples.len() as u64 / channels as u64;
        let timestamp_ms = self.samples_seen * 1000 / self.sample_rate as u64;
        self.samples_seen += frame_samples;

        // send fails only when no subscriber is listening yet
        let _ = self.frames_tx.send(AudioFrame {
            samples,
            sample_rate: self.sample_rate,
            channels,
            timestamp_ms,
        });
    }
}

fn select_input_config(
    device: &cpal::Device,
    desired_rate: u32,
) -> Result<(cpal::StreamConfig, cpal::SampleFormat)> {
    if let Ok(configs) = device.supported_input_configs() {
        for range in configs {
            if range.min_sample_rate().0 <= desired_rate
                && desired_rate <= range.max_sample_rate().0
            {
                let supported = range.with_sample_rate(cpal::SampleRate(desired_rate));
                let format = supported.sample_format();
                return Ok((supported.config(), format));
            }
        }
    }

    let default = device
        .default_input_config()
        .map_err(|e| Error::MediaAccessError(format!("no usable input config: {}", e)))?;
    warn!(
        "Input device does not support {} Hz, falling back to {} Hz",
        desired_rate,
        default.sample_rate().0
    );
    let format = default.sample_format();
    Ok((default.config(), format))
}

/// Speaker playback sink on a dedicated thread
pub struct CpalPlayback {
    queue: Arc<Mutex<VecDeque<i16>>>,
    device_rate: u32,
    device_channels: u16,
    stopped: AtomicBool,
    stop_tx: Mutex<Option<mpsc::Sender<()>>>,
}

impl CpalPlayback {
    async fn open(config: AudioConfig) -> Result<Self> {
        let queue: Arc<Mutex<VecDeque<i16>>> = Arc::new(Mutex::new(VecDeque::new()));
        let (setup_tx, setup_rx) = mpsc::channel::<Result<(u32, u16)>>();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let thread_queue = Arc::clone(&queue);
        std::thread::Builder::new()
            .name("voice-playback".to_string())
            .spawn(move || {
                playback_thread(config, thread_queue, setup_tx, stop_rx);
            })
            .map_err(|e| Error::MediaAccessError(format!("failed to spawn playback thread: {}", e)))?;

        let (device_rate, device_channels) = await_setup(setup_rx).await?;

        Ok(Self {
            queue,
            device_rate,
            device_channels,
            stopped: AtomicBool::new(false),
            stop_tx: Mutex::new(Some(stop_tx)),
        })
    }
}

impl PlaybackSink for CpalPlayback {
    fn write(&self, samples: &[i16], sample_rate: u32, channels: u16) {
        if self.stopped.load(Ordering::SeqCst) {
            return;
        }

        let mono = downmix_to_mono(samples, channels);
        let resampled = if sample_rate != self.device_rate {
            resample_linear(&mono, sample_rate, self.device_rate)
        } else {
            mono
        };

        let mut queue = self.queue.lock();
        for sample in resampled {
            for _ in 0..self.device_channels {
                queue.push_back(sample);
            }
        }
    }

    fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(stop_tx) = self.stop_tx.lock().take() {
            let _ = stop_tx.send(());
        }
        self.queue.lock().clear();
    }
}

fn playback_thread(
    config: AudioConfig,
    queue: Arc<Mutex<VecDeque<i16>>>,
    setup_tx: mpsc::Sender<Result<(u32, u16)>>,
    stop_rx: mpsc::Receiver<()>,
) {
    let stream = match build_playback_stream(config, queue) {
        Ok((stream, rate, channels)) => {
            let _ = setup_tx.send(Ok((rate, channels)));
            stream
        }
        Err(e) => {
            let _ = setup_tx.send(Err(e));
            return;
        }
    };

    let _ = stop_rx.recv();
    drop(stream);
    debug!("Playback thread exited");
}

fn build_playback_stream(
    config: AudioConfig,
    queue: Arc<Mutex<VecDeque<i16>>>,
) -> Result<(cpal::Stream, u32, u16)> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| Error::MediaAccessError("no default output device".to_string()))?;

    let (stream_config, sample_format) = select_output_config(&device, config.sample_rate)?;
    let device_rate = stream_config.sample_rate.0;
    let device_channels = stream_config.channels;

    let err_fn = |e| warn!("Playback stream error: {}", e);

    let stream = match sample_format {
        cpal::SampleFormat::F32 => {
            let queue = Arc::clone(&queue);
            device
                .build_output_stream(
                    &stream_config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        let mut queue = queue.lock();
                        for slot in data.iter_mut() {
                            *slot = queue
                                .pop_front()
                                .map(|s| s as f32 / i16::MAX as f32)
                                .unwrap_or(0.0);
                        }
                    },
                    err_fn,
                    None,
                )
                .map_err(|e| Error::MediaAccessError(format!("failed to open speaker: {}", e)))?
        }
        cpal::SampleFormat::I16 => {
            let queue = Arc::clone(&queue);
            device
                .build_output_stream(
                    &stream_config,
                    move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                        let mut queue = queue.lock();
                        for slot in data.iter_mut() {
                            *slot = queue.pop_front().unwrap_or(0);
                        }
                    },
                    err_fn,
                    None,
                )
                .map_err(|e| Error::MediaAccessError(format!("failed to open speaker: {}", e)))?
        }
        other => {
            return Err(Error::MediaAccessError(format!(
                "unsupported playback sample format {:?}",
                other
            )))
        }
    };

    stream
        .play()
        .map_err(|e| Error::MediaAccessError(format!("failed to start playback: {}", e)))?;

    debug!(
        "Speaker playback started: {} Hz, {} channel(s)",
        device_rate, device_channels
    );

    Ok((stream, device_rate, device_channels))
}

fn select_output_config(
    device: &cpal::Device,
    desired_rate: u32,
) -> Result<(cpal::StreamConfig, cpal::SampleFormat)> {
    if let Ok(configs) = device.supported_output_configs() {
        for range in configs {
            if range.min_sample_rate().0 <= desired_rate
                && desired_rate <= range.max_sample_rate().0
            {
                let supported = range.with_sample_rate(cpal::SampleRate(desired_rate));
                let format = supported.sample_format();
                return Ok((supported.config(), format));
            }
        }
    }

    let default = device
        .default_output_config()
        .map_err(|e| Error::MediaAccessError(format!("no usable output config: {}", e)))?;
    let format = default.sample_format();
    Ok((default.config(), format))
}

/// Linear-interpolation resampler for playback rate mismatches
fn resample_linear(samples: &[i16], from_rate: u32, to_rate: u32) -> Vec<i16> {
    if samples.is_empty() || from_rate == to_rate {
        return samples.to_vec();
    }

    let out_len = (samples.len() as u64 * to_rate as u64 / from_rate as u64) as usize;
    let mut out = Vec::with_capacity(out_len);
    for i in 0..out_len {
        let pos = i as f64 * (samples.len() - 1) as f64 / out_len.max(2) as f64;
        let idx = pos as usize;
        let frac = pos - idx as f64;
        let a = samples[idx] as f64;
        let b = samples[(idx + 1).min(samples.len() - 1)] as f64;
        out.push((a + (b - a) * frac) as i16);
    }
    out
}
