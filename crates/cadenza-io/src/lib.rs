//! Audio I/O layer for the cadenza engine.
//!
//! This crate provides:
//!
//! - **Device backends**: the [`AudioBackend`] trait with a cpal implementation
//!   ([`CpalBackend`]) and a deterministic, hardware-free one ([`ManualBackend`])
//! - **Decoding**: [`decode_bytes`] turns encoded audio (WAV, MP3, FLAC, OGG,
//!   AAC, ...) into planar PCM via hound and symphonia
//! - **Resampling**: [`resample`] converts planar PCM between rates with rubato
//! - **WAV encoding**: [`encode_wav_pcm16`] writes 16-bit PCM WAV into memory
//! - **Source fetching**: [`SourceFetcher`] resolves a [`SourceRef`] to bytes
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use cadenza_io::{DefaultFetcher, SourceFetcher, decode_bytes, resample};
//! use cadenza_core::SourceRef;
//!
//! let source = SourceRef::path("take.flac");
//! let bytes = DefaultFetcher.fetch(&source)?;
//! let decoded = decode_bytes(&bytes, source.extension_hint().as_deref())?;
//! let planar = resample(decoded.channels(), decoded.sample_rate(), 48000)?;
//! ```

pub mod backend;
pub mod cpal_backend;
mod decode;
mod fetch;
pub mod manual;
mod resample;
mod wav;

pub use backend::{
    AudioBackend, AudioDevice, BackendStreamConfig, ErrorCallback, InputCallback, OutputCallback,
    StreamHandle,
};
pub use cadenza_core::SourceRef;
pub use cpal_backend::CpalBackend;
pub use decode::{DecodedBuffer, decode_bytes};
pub use fetch::{DefaultFetcher, SourceFetcher};
pub use manual::ManualBackend;
pub use resample::resample;
pub use wav::{
    WavFormat, WavInfo, WavSpec, encode_wav_pcm16, max_pcm16_frames, read_wav_info,
    read_wav_planar,
};

/// Error types for audio I/O operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// WAV encode/decode error.
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    /// Audio stream setup or runtime error.
    #[error("Audio stream error: {0}")]
    Stream(String),

    /// No audio device available on the system.
    #[error("No audio device available")]
    NoDevice,

    /// The requested audio device was not found.
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// The platform refused access to the device.
    #[error("Device access denied: {0}")]
    PermissionDenied(String),

    /// The container or codec is not supported.
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// The stream is supported but could not be decoded (truncated, corrupt).
    #[error("Decode error: {0}")]
    Decode(String),

    /// Decoding succeeded but produced no audio frames.
    #[error("Decoded stream contains no audio")]
    Empty,

    /// Sample-rate conversion failed.
    #[error("Resample error: {0}")]
    Resample(String),

    /// Source bytes could not be retrieved.
    #[error("Fetch error: {0}")]
    Fetch(String),

    /// Standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type for audio I/O operations.
pub type Result<T> = std::result::Result<T, Error>;
