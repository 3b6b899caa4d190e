//! Local audio chunk recording
//!
//! Captures raw audio chunks from the live capture stream, independent of
//! the agent connection. Chunks are observed by a sink, not retained by the
//! controller; downstream consumption is out of scope.

use crate::media::AudioFrame;
use crate::{Error, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

/// Recording state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    /// Not recording
    Idle,
    /// Accumulating chunks
    Recording,
}

/// One recorded chunk of audio
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Chunk index within this recording, starting at 0
    pub index: u64,
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
}

impl AudioChunk {
    /// Chunk duration in milliseconds
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 || self.channels == 0 {
            return 0;
        }
        self.samples.len() as u64 * 1000 / (self.sample_rate as u64 * self.channels as u64)
    }
}

/// Observer for recorded chunks
pub trait ChunkSink: Send + Sync {
    /// Observe one chunk
    fn on_chunk(&self, chunk: &AudioChunk) -> Result<()>;
}

/// Default sink: logs chunk sizes and drops the data
pub struct LogChunkSink;

impl ChunkSink for LogChunkSink {
    fn on_chunk(&self, chunk: &AudioChunk) -> Result<()> {
        debug!(
            "Recorded chunk {}: {} samples ({} ms)",
            chunk.index,
            chunk.samples.len(),
            chunk.duration_ms()
        );
        Ok(())
    }
}

/// Sink writing each chunk as a WAV file
pub struct WavChunkSink {
    dir: PathBuf,
    prefix: String,
}

impl WavChunkSink {
    /// Write chunks into `dir` as `{prefix}-{index}.wav`
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
        }
    }
}

impl ChunkSink for WavChunkSink {
    fn on_chunk(&self, chunk: &AudioChunk) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;

        let path = self
            .dir
            .join(format!("{}-{:04}.wav", self.prefix, chunk.index));

        let spec = hound::WavSpec {
            channels: chunk.channels,
            sample_rate: chunk.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut writer = hound::WavWriter::create(&path, spec)
            .map_err(|e| Error::RecordingError(format!("failed to create {:?}: {}", path, e)))?;

        for &sample in &chunk.samples {
            writer
                .write_sample(sample)
                .map_err(|e| Error::RecordingError(format!("failed to write sample: {}", e)))?;
        }

        writer
            .finalize()
            .map_err(|e| Error::RecordingError(format!("failed to finalize {:?}: {}", path, e)))?;

        debug!("Wrote chunk {} to {:?}", chunk.index, path);

        Ok(())
    }
}

/// Records raw audio chunks from a capture stream
///
/// Strictly nested within the call lifecycle: the session tears the
/// recorder down before the media pipeline on `end()`.
pub struct RecordingController {
    chunk_duration_ms: u64,
    sink: Arc<dyn ChunkSink>,
    task: Option<tokio::task::JoinHandle<()>>,
    stop_tx: Option<watch::Sender<bool>>,
}

impl RecordingController {
    /// Create an idle controller
    pub fn new(chunk_duration_ms: u64, sink: Arc<dyn ChunkSink>) -> Self {
        Self {
            chunk_duration_ms,
            sink,
            task: None,
            stop_tx: None,
        }
    }

    /// Current state
    pub fn state(&self) -> RecorderState {
        if self.task.is_some() {
            RecorderState::Recording
        } else {
            RecorderState::Idle
        }
    }

    /// Check if a recording is in progress
    pub fn is_recording(&self) -> bool {
        self.state() == RecorderState::Recording
    }

    /// Begin accumulating chunks from the given frame stream
    ///
    /// # Errors
    ///
    /// [`Error::RecordingError`] if a recording is already in progress.
    /// The caller is responsible for the [`Error::NoMediaStream`] gate: a
    /// frame receiver only exists while a capture stream is active.
    pub fn start(&mut self, frames: broadcast::Receiver<AudioFrame>) -> Result<()> {
        if self.task.is_some() {
            return Err(Error::RecordingError(
                "recording already in progress".to_string(),
            ));
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let sink = Arc::clone(&self.sink);
        let chunk_duration_ms = self.chunk_duration_ms;

        let task = tokio::spawn(run_recorder(frames, stop_rx, sink, chunk_duration_ms));

        self.task = Some(task);
        self.stop_tx = Some(stop_tx);

        info!("Recording started ({} ms chunks)", chunk_duration_ms);

        Ok(())
    }

    /// Stop recording and release the capture handle
    ///
    /// Calling `stop()` while idle is a no-op.
    pub async fn stop(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };

        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(true);
        }

        if let Err(e) = task.await {
            warn!("Recorder task join failed: {}", e);
        }

        info!("Recording stopped");
    }
}

async fn run_recorder(
    mut frames: broadcast::Receiver<AudioFrame>,
    mut stop_rx: watch::Receiver<bool>,
    sink: Arc<dyn ChunkSink>,
    chunk_duration_ms: u64,
) {
    let mut pending: Vec<i16> = Vec::new();
    let mut format: Option<(u32, u16)> = None;
    let mut index = 0u64;

    loop {
        tokio::select! {
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    break;
                }
            }
            frame = frames.recv() => match frame {
                Ok(frame) => {
                    format = Some((frame.sample_rate, frame.channels));
                    pending.extend_from_slice(&frame.samples);

                    let target = chunk_target_samples(
                        chunk_duration_ms,
                        frame.sample_rate,
                        frame.channels,
                    );
                    while pending.len() >= target {
                        let samples: Vec<i16> = pending.drain(..target).collect();
                        emit_chunk(&sink, &mut index, samples, frame.sample_rate, frame.channels);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Recorder lagged, skipped {} frames", n);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    // flush the partial chunk
    if let Some((sample_rate, channels)) = format {
        if !pending.is_empty() {
            emit_chunk(&sink, &mut index, pending, sample_rate, channels);
        }
    }

    debug!("Recorder task exited after {} chunk(s)", index);
}

fn chunk_target_samples(chunk_duration_ms: u64, sample_rate: u32, channels: u16) -> usize {
    (sample_rate as u64 * chunk_duration_ms / 1000) as usize * channels as usize
}

fn emit_chunk(
    sink: &Arc<dyn ChunkSink>,
    index: &mut u64,
    samples: Vec<i16>,
    sample_rate: u32,
    channels: u16,
) {
    let chunk = AudioChunk {
        index: *index,
        samples,
        sample_rate,
        channels,
    };
    *index += 1;

    if let Err(e) = sink.on_chunk(&chunk) {
        warn!("Chunk sink failed for chunk {}: {}", chunk.index, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct CollectingSink {
        chunks: Mutex<Vec<AudioChunk>>,
    }

    impl CollectingSink {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                chunks: Mutex::new(Vec::new()),
            })
        }
    }

    impl ChunkSink for CollectingSink {
        fn on_chunk(&self, chunk: &AudioChunk) -> Result<()> {
            self.chunks.lock().push(chunk.clone());
            Ok(())
        }
    }

    fn frame(samples: usize) -> AudioFrame {
        AudioFrame {
            samples: vec![0i16; samples],
            sample_rate: 48000,
            channels: 1,
            timestamp_ms: 0,
        }
    }

    #[test]
    fn test_chunk_target_samples() {
        // 100 ms at 48kHz mono
        assert_eq!(chunk_target_samples(100, 48000, 1), 4800);
        // 100 ms at 16kHz stereo
        assert_eq!(chunk_target_samples(100, 16000, 2), 3200);
    }

    #[test]
    fn test_chunk_duration() {
        let chunk = AudioChunk {
            index: 0,
            samples: vec![0i16; 4800],
            sample_rate: 48000,
            channels: 1,
        };
        assert_eq!(chunk.duration_ms(), 100);
    }

    #[tokio::test]
    async fn test_records_chunks_and_flushes_partial() {
        let sink = CollectingSink::new();
        let mut controller = RecordingController::new(100, Arc::clone(&sink) as _);

        let (tx, rx) = broadcast::channel(16);
        controller.start(rx).unwrap();
        assert!(controller.is_recording());

        // 100 ms chunks at 48kHz mono = 4800 samples; send 2.5 chunks worth
        for _ in 0..12 {
            tx.send(frame(1000)).unwrap();
        }

        // give the recorder task a chance to drain the channel
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        controller.stop().await;
        assert!(!controller.is_recording());

        let chunks = sink.chunks.lock();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].samples.len(), 4800);
        assert_eq!(chunks[1].samples.len(), 4800);
        // the partial flush
        assert_eq!(chunks[2].samples.len(), 2400);
        assert_eq!(chunks[2].index, 2);
    }

    #[tokio::test]
    async fn test_stop_while_idle_is_noop() {
        let sink = CollectingSink::new();
        let mut controller = RecordingController::new(100, sink as _);

        controller.stop().await;
        controller.stop().await;
        assert_eq!(controller.state(), RecorderState::Idle);
    }

    #[tokio::test]
    async fn test_start_while_recording_fails() {
        let sink = CollectingSink::new();
        let mut controller = RecordingController::new(100, sink as _);

        let (_tx, rx) = broadcast::channel(16);
        controller.start(rx).unwrap();

        let (_tx2, rx2) = broadcast::channel::<AudioFrame>(16);
        let err = controller.start(rx2).unwrap_err();
        assert!(matches!(err, Error::RecordingError(_)));

        controller.stop().await;
    }

    #[tokio::test]
    async fn test_recorder_exits_when_stream_closes() {
        let sink = CollectingSink::new();
        let mut controller = RecordingController::new(100, Arc::clone(&sink) as _);

        let (tx, rx) = broadcast::channel(16);
        controller.start(rx).unwrap();

        tx.send(frame(1000)).unwrap();
        drop(tx);

        // the task ends on its own once the capture stream closes
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        controller.stop().await;

        let chunks = sink.chunks.lock();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].samples.len(), 1000);
    }

    #[tokio::test]
    async fn test_wav_chunk_sink_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let sink = WavChunkSink::new(dir.path(), "call");

        let chunk = AudioChunk {
            index: 7,
            samples: vec![0i16, 100, -100, 200],
            sample_rate: 48000,
            channels: 1,
        };
        sink.on_chunk(&chunk).unwrap();

        let path = dir.path().join("call-0007.wav");
        assert!(path.exists());

        let mut reader = hound::WavReader::open(&path).unwrap();
        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, chunk.samples);
    }
}
