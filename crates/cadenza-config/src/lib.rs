//! Engine configuration for cadenza.
//!
//! Settings are read from a TOML file, one table per engine area:
//!
//! ```toml
//! [audio]
//! sample_rate = 48000
//! buffer_size = 512
//!
//! [mix]
//! master_volume = 0.8
//! param_smoothing_ms = 5.0
//!
//! [metering]
//! fft_size = 256
//! poll_hz = 30
//!
//! [render]
//! sample_rate = 44100
//! channels = 2
//!
//! [capture]
//! channels = 1
//! ```
//!
//! Missing keys take their defaults, so an empty file is a valid configuration.
//!
//! ```rust,no_run
//! use cadenza_config::EngineConfig;
//!
//! let config = EngineConfig::load_or_default().unwrap();
//! println!("mixing at {} Hz", config.audio.sample_rate);
//! ```

mod engine_config;
mod error;

/// Platform-specific configuration paths.
pub mod paths;

pub use engine_config::{
    AudioConfig, CaptureConfig, EngineConfig, MeteringConfig, MixConfig, RenderConfig,
};
pub use error::ConfigError;
pub use paths::{default_config_path, ensure_user_config_dir, user_config_dir};

/// Result alias for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;
