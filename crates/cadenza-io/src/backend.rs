//! Pluggable audio backend abstraction.
//!
//! The engine never talks to a platform audio API directly. It asks an
//! [`AudioBackend`] for an output stream (driven by the mixer callback) and,
//! while recording, an input stream (feeding the capture pipeline). Two
//! implementations ship with this crate:
//!
//! - [`CpalBackend`](crate::CpalBackend): ALSA, CoreAudio, WASAPI via cpal
//! - [`ManualBackend`](crate::ManualBackend): no hardware; the caller pulls
//!   output blocks and pushes input blocks explicitly, which makes the
//!   realtime path testable and usable headless
//!
//! Callbacks are boxed closures so the trait stays object-safe and the
//! engine can hold a `Box<dyn AudioBackend>`. Streams come back as a
//! type-erased [`StreamHandle`] that stops the stream when dropped.

use crate::Result;

/// Audio device information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioDevice {
    /// Human-readable device name.
    pub name: String,
    /// Whether the device supports audio input.
    pub is_input: bool,
    /// Whether the device supports audio output.
    pub is_output: bool,
    /// Default sample rate in Hz.
    pub default_sample_rate: u32,
}

/// Configuration for building an audio stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendStreamConfig {
    /// Requested sample rate in Hz.
    pub sample_rate: u32,
    /// Preferred buffer size in frames.
    pub buffer_size: u32,
    /// Number of interleaved channels.
    pub channels: u16,
    /// Device name filter (case-insensitive substring). `None` uses the default device.
    pub device_name: Option<String>,
}

impl Default for BackendStreamConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            buffer_size: 512,
            channels: 2,
            device_name: None,
        }
    }
}

/// Type-erased stream handle. The stream runs while the handle is alive.
pub struct StreamHandle {
    _inner: Box<dyn Send>,
}

impl StreamHandle {
    /// Wrap a backend-specific stream object, keeping it alive until drop.
    pub fn new<T: Send + 'static>(stream: T) -> Self {
        Self {
            _inner: Box::new(stream),
        }
    }
}

impl std::fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamHandle").finish_non_exhaustive()
    }
}

/// Output callback, run on the audio thread.
///
/// Receives an interleaved buffer (`[L0, R0, L1, R1, ...]` for stereo) of
/// `frames * channels` samples to fill. Must not allocate, lock or log.
pub type OutputCallback = Box<dyn FnMut(&mut [f32]) + Send>;

/// Input callback, run on the audio thread with interleaved captured samples.
pub type InputCallback = Box<dyn FnMut(&[f32]) + Send>;

/// Called with a human-readable message when a running stream fails.
pub type ErrorCallback = Box<dyn FnMut(&str) + Send>;

/// Device enumeration and stream construction.
pub trait AudioBackend: Send {
    /// Short backend name ("cpal", "manual").
    fn name(&self) -> &str;

    /// List all available audio devices.
    fn list_devices(&self) -> Result<Vec<AudioDevice>>;

    /// The system default output device, if any.
    fn default_output_device(&self) -> Result<Option<AudioDevice>>;

    /// The system default input device, if any.
    fn default_input_device(&self) -> Result<Option<AudioDevice>>;

    /// Build and start an output stream. Dropping the handle stops it.
    fn build_output_stream(
        &self,
        config: &BackendStreamConfig,
        callback: OutputCallback,
        error_callback: ErrorCallback,
    ) -> Result<StreamHandle>;

    /// Build and start an input stream. Dropping the handle stops capture.
    ///
    /// Fails with [`Error::NoDevice`](crate::Error::NoDevice) when there is
    /// no input device and [`Error::PermissionDenied`](crate::Error::PermissionDenied)
    /// when the platform refuses access.
    fn build_input_stream(
        &self,
        config: &BackendStreamConfig,
        callback: InputCallback,
        error_callback: ErrorCallback,
    ) -> Result<StreamHandle>;

    /// The rate the backend will actually run at for `config`.
    fn actual_sample_rate(&self, config: &BackendStreamConfig) -> u32 {
        config.sample_rate
    }
}
