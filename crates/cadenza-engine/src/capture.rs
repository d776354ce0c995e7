//! Microphone capture into an in-memory WAV take.
//!
//! The input callback copies each block into a bounded channel. A collector
//! on the blocking pool gathers the blocks until the stream is dropped,
//! then encodes the take as 16-bit PCM WAV at the input device's rate.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{Receiver, SyncSender, TrySendError, sync_channel};

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use cadenza_io::{
    AudioBackend, BackendStreamConfig, DecodedBuffer, StreamHandle, decode_bytes, encode_wav_pcm16,
};

use crate::error::{DecodeError, DeviceError, EngineError};

/// Input blocks buffered between the audio thread and the collector.
const CHUNK_QUEUE: usize = 512;

/// A finished recording.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedTake {
    /// Complete WAV file.
    pub bytes: Vec<u8>,
    /// Rate the take was captured at.
    pub sample_rate: u32,
    /// Channel count.
    pub channels: u16,
    /// Frames captured.
    pub frames: u64,
}

impl RecordedTake {
    /// Length of the take in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames as f64 / f64::from(self.sample_rate)
    }

    /// Decode the take back to planar samples.
    pub fn decode(&self) -> Result<DecodedBuffer, DecodeError> {
        Ok(decode_bytes(&self.bytes, Some("wav"))?)
    }
}

struct ActiveTake {
    stream: StreamHandle,
    collector: JoinHandle<Result<RecordedTake, EngineError>>,
    dropped: Arc<AtomicUsize>,
}

/// Opens input streams and turns them into takes.
pub struct CapturePipeline {
    config: BackendStreamConfig,
    active: Option<ActiveTake>,
}

impl CapturePipeline {
    /// A pipeline opening input streams with `config`.
    pub fn new(config: BackendStreamConfig) -> Self {
        Self { config, active: None }
    }

    /// Whether a take is in progress.
    pub fn is_recording(&self) -> bool {
        self.active.is_some()
    }

    /// Open the input device and start collecting samples.
    ///
    /// Must be called from within a Tokio runtime. `on_error` receives
    /// stream failures reported while the take runs.
    pub fn start(
        &mut self,
        backend: &dyn AudioBackend,
        on_error: SyncSender<String>,
    ) -> Result<(), DeviceError> {
        if self.active.is_some() {
            return Err(DeviceError::AlreadyRecording);
        }
        let sample_rate = backend.actual_sample_rate(&self.config);
        let channels = self.config.channels.max(1);
        let (tx, rx) = sync_channel::<Vec<f32>>(CHUNK_QUEUE);
        let dropped = Arc::new(AtomicUsize::new(0));
        let dropped_in_callback = Arc::clone(&dropped);

        let stream = backend.build_input_stream(
            &self.config,
            Box::new(move |data: &[f32]| match tx.try_send(data.to_vec()) {
                Ok(()) | Err(TrySendError::Disconnected(_)) => {}
                Err(TrySendError::Full(_)) => {
                    dropped_in_callback.fetch_add(1, Ordering::Relaxed);
                }
            }),
            Box::new(move |message: &str| {
                let _ = on_error.try_send(message.to_owned());
            }),
        )?;

        let collector = tokio::task::spawn_blocking(move || collect(&rx, channels, sample_rate));
        self.active = Some(ActiveTake {
            stream,
            collector,
            dropped,
        });
        info!(sample_rate, channels, "recording started");
        Ok(())
    }

    /// Close the input stream and return the take, or `None` when nothing
    /// was being recorded.
    pub async fn stop(&mut self) -> Result<Option<RecordedTake>, EngineError> {
        let Some(active) = self.active.take() else {
            debug!("stop_recording ignored, not recording");
            return Ok(None);
        };
        // Dropping the stream drops the callback and with it the sender,
        // which ends the collector.
        drop(active.stream);
        let take = active
            .collector
            .await
            .map_err(|e| DeviceError::Stream(format!("capture task failed: {e}")))??;
        let dropped = active.dropped.load(Ordering::Relaxed);
        if dropped > 0 {
            warn!(dropped, "input blocks lost while recording");
        }
        info!(
            frames = take.frames,
            seconds = take.duration_secs(),
            "recording stopped"
        );
        Ok(Some(take))
    }
}

impl std::fmt::Debug for CapturePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapturePipeline")
            .field("config", &self.config)
            .field("recording", &self.is_recording())
            .finish()
    }
}

fn collect(
    rx: &Receiver<Vec<f32>>,
    channels: u16,
    sample_rate: u32,
) -> Result<RecordedTake, EngineError> {
    let mut samples = Vec::new();
    while let Ok(chunk) = rx.recv() {
        samples.extend_from_slice(&chunk);
    }
    let width = usize::from(channels);
    // A trailing partial frame cannot be encoded.
    samples.truncate(samples.len() / width * width);
    let frames = (samples.len() / width) as u64;
    let bytes = encode_wav_pcm16(&samples, channels, sample_rate)
        .map_err(|e| DeviceError::Stream(format!("failed to encode take: {e}")))?;
    Ok(RecordedTake {
        bytes,
        sample_rate,
        channels,
        frames,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadenza_io::ManualBackend;

    fn config(channels: u16) -> BackendStreamConfig {
        BackendStreamConfig {
            sample_rate: 16_000,
            channels,
            ..BackendStreamConfig::default()
        }
    }

    #[tokio::test]
    async fn take_contains_pushed_samples() {
        let backend = ManualBackend::new();
        let (errors, _rx) = sync_channel(8);
        let mut capture = CapturePipeline::new(config(1));
        capture.start(&backend, errors).unwrap();
        assert!(backend.push_input(&[0.5; 160]));
        assert!(backend.push_input(&[-0.5; 160]));

        let take = capture.stop().await.unwrap().unwrap();
        assert_eq!(take.frames, 320);
        assert_eq!(take.sample_rate, 16_000);
        assert_eq!(take.channels, 1);
        assert!((take.duration_secs() - 0.02).abs() < 1e-9);
        assert!(!backend.is_input_open());

        let decoded = take.decode().unwrap();
        assert_eq!(decoded.frames(), 320);
        assert!(decoded.channel(0)[0] > 0.49);
        assert!(decoded.channel(0)[319] < -0.49);
    }

    #[tokio::test]
    async fn second_start_is_rejected() {
        let backend = ManualBackend::new();
        let (errors, _rx) = sync_channel(8);
        let mut capture = CapturePipeline::new(config(1));
        capture.start(&backend, errors.clone()).unwrap();
        assert!(matches!(
            capture.start(&backend, errors),
            Err(DeviceError::AlreadyRecording)
        ));
        assert_eq!(backend.input_streams_opened(), 1);
    }

    #[tokio::test]
    async fn denied_input_leaves_pipeline_idle() {
        let backend = ManualBackend::new();
        backend.deny_input();
        let (errors, _rx) = sync_channel(8);
        let mut capture = CapturePipeline::new(config(1));
        assert!(matches!(
            capture.start(&backend, errors),
            Err(DeviceError::PermissionDenied(_))
        ));
        assert!(!capture.is_recording());
        assert!(capture.stop().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn stereo_take_drops_partial_frame() {
        let backend = ManualBackend::new();
        let (errors, _rx) = sync_channel(8);
        let mut capture = CapturePipeline::new(config(2));
        capture.start(&backend, errors).unwrap();
        backend.push_input(&[0.1; 9]);
        let take = capture.stop().await.unwrap().unwrap();
        assert_eq!(take.channels, 2);
        assert_eq!(take.frames, 4);
    }
}
