//! Error types for the engine.

use thiserror::Error;

/// Why a clip source could not be turned into a playable buffer.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The source bytes could not be obtained.
    #[error("fetch failed: {0}")]
    Fetch(String),

    /// No demuxer or codec recognizes the data.
    #[error("unsupported format: {0}")]
    Unsupported(String),

    /// The stream was recognized but is truncated or malformed.
    #[error("corrupt stream: {0}")]
    Corrupt(String),

    /// The source decoded to zero frames.
    #[error("source contains no audio")]
    Empty,

    /// Conversion to the engine sample rate failed.
    #[error("resampling failed: {0}")]
    Resample(String),

    /// The blocking decode task panicked or was cancelled.
    #[error("decode task failed: {0}")]
    Task(String),
}

impl From<cadenza_io::Error> for DecodeError {
    fn from(err: cadenza_io::Error) -> Self {
        use cadenza_io::Error as Io;
        match err {
            Io::Fetch(msg) => DecodeError::Fetch(msg),
            Io::Io(e) => DecodeError::Fetch(e.to_string()),
            Io::UnsupportedFormat(msg) => DecodeError::Unsupported(msg),
            Io::Empty => DecodeError::Empty,
            Io::Resample(msg) => DecodeError::Resample(msg),
            other => DecodeError::Corrupt(other.to_string()),
        }
    }
}

/// Audio device failures.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// No suitable device exists.
    #[error("audio device unavailable: {0}")]
    Unavailable(String),

    /// The platform refused access (typically the microphone).
    #[error("audio device access denied: {0}")]
    PermissionDenied(String),

    /// `start_recording` was called while a take is in progress.
    #[error("already recording")]
    AlreadyRecording,

    /// The stream could not be built or failed while running.
    #[error("audio stream error: {0}")]
    Stream(String),
}

impl From<cadenza_io::Error> for DeviceError {
    fn from(err: cadenza_io::Error) -> Self {
        use cadenza_io::Error as Io;
        match err {
            Io::NoDevice => DeviceError::Unavailable("no device found".to_string()),
            Io::DeviceNotFound(name) => DeviceError::Unavailable(name),
            Io::PermissionDenied(msg) => DeviceError::PermissionDenied(msg),
            other => DeviceError::Stream(other.to_string()),
        }
    }
}

/// Offline render failures.
#[derive(Debug, Error)]
pub enum RenderError {
    /// Duration is not positive, not finite, or exceeds what a WAV file can hold.
    #[error("invalid render duration {seconds}s: {reason}")]
    InvalidDuration {
        /// The requested duration.
        seconds: f64,
        /// What is wrong with it.
        reason: &'static str,
    },

    /// Render rate or channel layout is not supported.
    #[error("invalid render format: {0}")]
    InvalidFormat(String),

    /// WAV encoding failed.
    #[error("encode failed: {0}")]
    Encode(#[from] cadenza_io::Error),

    /// The blocking render task panicked or was cancelled.
    #[error("render task failed: {0}")]
    Task(String),
}

/// Any engine failure.
#[derive(Debug, Error)]
pub enum EngineError {
    /// See [`DecodeError`].
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// See [`DeviceError`].
    #[error(transparent)]
    Device(#[from] DeviceError),

    /// See [`RenderError`].
    #[error(transparent)]
    Render(#[from] RenderError),

    /// Configuration could not be loaded or is invalid.
    #[error(transparent)]
    Config(#[from] cadenza_config::ConfigError),

    /// The session task has shut down.
    #[error("engine session is closed")]
    Closed,
}

/// Result alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_map_to_decode_kinds() {
        assert!(matches!(
            DecodeError::from(cadenza_io::Error::UnsupportedFormat("x".into())),
            DecodeError::Unsupported(_)
        ));
        assert!(matches!(
            DecodeError::from(cadenza_io::Error::Fetch("gone".into())),
            DecodeError::Fetch(_)
        ));
        assert!(matches!(
            DecodeError::from(cadenza_io::Error::Decode("short".into())),
            DecodeError::Corrupt(_)
        ));
        assert!(matches!(
            DecodeError::from(cadenza_io::Error::Empty),
            DecodeError::Empty
        ));
    }

    #[test]
    fn io_errors_map_to_device_kinds() {
        assert!(matches!(
            DeviceError::from(cadenza_io::Error::NoDevice),
            DeviceError::Unavailable(_)
        ));
        assert!(matches!(
            DeviceError::from(cadenza_io::Error::PermissionDenied("mic".into())),
            DeviceError::PermissionDenied(_)
        ));
        assert!(matches!(
            DeviceError::from(cadenza_io::Error::Stream("xrun".into())),
            DeviceError::Stream(_)
        ));
    }

    #[test]
    fn umbrella_is_transparent() {
        let err: EngineError = DeviceError::AlreadyRecording.into();
        assert_eq!(err.to_string(), "already recording");
    }
}
