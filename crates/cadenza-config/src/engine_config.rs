//! Engine settings file.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ConfigError;
use crate::paths;

/// Realtime device settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Requested device sample rate in Hz. The mix runs at whatever rate the
    /// device actually grants.
    pub sample_rate: u32,
    /// Output channel count.
    pub channels: u16,
    /// Requested callback size in frames.
    pub buffer_size: u32,
    /// Output device name; `None` picks the system default.
    pub output_device: Option<String>,
    /// Input device name; `None` picks the system default.
    pub input_device: Option<String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            channels: 2,
            buffer_size: 512,
            output_device: None,
            input_device: None,
        }
    }
}

/// Mix bus settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixConfig {
    /// Linear master gain in `[0, 1]`.
    pub master_volume: f32,
    /// Ramp time for gain and pan changes.
    pub param_smoothing_ms: f32,
    /// Slots in the control-to-audio command ring.
    pub command_queue_capacity: usize,
    /// How far ahead of the playhead clip starts are handed to the audio
    /// thread. Later clips wait on the control side.
    pub schedule_ahead_ms: f32,
}

impl Default for MixConfig {
    fn default() -> Self {
        Self {
            master_volume: 0.8,
            param_smoothing_ms: 5.0,
            command_queue_capacity: 1024,
            schedule_ahead_ms: 1000.0,
        }
    }
}

/// Spectrum meter settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeteringConfig {
    /// FFT length; power of two.
    pub fft_size: usize,
    /// Time smoothing between frames.
    pub smoothing: f32,
    /// Level mapped to byte 0.
    pub min_db: f32,
    /// Level mapped to byte 255.
    pub max_db: f32,
    /// Snapshot publish rate in Hz.
    pub poll_hz: u32,
}

impl Default for MeteringConfig {
    fn default() -> Self {
        Self {
            fft_size: 256,
            smoothing: 0.8,
            min_db: -100.0,
            max_db: -30.0,
            poll_hz: 30,
        }
    }
}

/// Offline mixdown settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Output sample rate in Hz.
    pub sample_rate: u32,
    /// Output channel count, 1 or 2.
    pub channels: u16,
    /// Frames mixed per virtual clock tick.
    pub block_size: usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            channels: 2,
            block_size: 512,
        }
    }
}

/// Recording settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Channels captured from the input device, 1 or 2.
    pub channels: u16,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self { channels: 1 }
    }
}

/// Complete engine configuration, one TOML table per section.
///
/// Every key is optional; missing keys take their defaults.
///
/// ```rust
/// use cadenza_config::EngineConfig;
///
/// let config = EngineConfig::from_toml("[render]\nsample_rate = 48000\n").unwrap();
/// assert_eq!(config.render.sample_rate, 48000);
/// assert_eq!(config.render.channels, 2);
/// assert_eq!(config.audio.sample_rate, 48000);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// `[audio]`
    pub audio: AudioConfig,
    /// `[mix]`
    pub mix: MixConfig,
    /// `[metering]`
    pub metering: MeteringConfig,
    /// `[render]`
    pub render: RenderConfig,
    /// `[capture]`
    pub capture: CaptureConfig,
}

impl EngineConfig {
    /// Load and validate a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
        Self::from_toml(&content)
    }

    /// Parse and validate a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Convert the configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Save the configuration, creating parent directories as needed.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::create_dir(parent, e))?;
        }

        let content = self.to_toml()?;
        std::fs::write(path, content).map_err(|e| ConfigError::write_file(path, e))?;
        Ok(())
    }

    /// Load from the default location, or return defaults if no file exists.
    pub fn load_or_default() -> Result<Self, ConfigError> {
        Self::load_or_default_from(paths::default_config_path())
    }

    /// Load from `path`, or return defaults if it does not exist.
    ///
    /// A file that exists but fails to parse or validate is still an error.
    pub fn load_or_default_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Check every setting against its allowed range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_rate("audio.sample_rate", self.audio.sample_rate)?;
        if self.audio.channels == 0 {
            return Err(ConfigError::invalid("audio.channels", "must be at least 1"));
        }
        if self.audio.buffer_size == 0 {
            return Err(ConfigError::invalid("audio.buffer_size", "must be positive"));
        }

        let mix = &self.mix;
        if !(0.0..=1.0).contains(&mix.master_volume) {
            return Err(ConfigError::invalid("mix.master_volume", "must be in [0, 1]"));
        }
        if !mix.param_smoothing_ms.is_finite() || mix.param_smoothing_ms < 0.0 {
            return Err(ConfigError::invalid(
                "mix.param_smoothing_ms",
                "must be a non-negative number",
            ));
        }
        if mix.command_queue_capacity < 16 {
            return Err(ConfigError::invalid(
                "mix.command_queue_capacity",
                "must be at least 16",
            ));
        }
        if !mix.schedule_ahead_ms.is_finite() || mix.schedule_ahead_ms < 100.0 {
            return Err(ConfigError::invalid(
                "mix.schedule_ahead_ms",
                "must be at least 100",
            ));
        }

        let meter = &self.metering;
        if !meter.fft_size.is_power_of_two() || !(32..=32768).contains(&meter.fft_size) {
            return Err(ConfigError::invalid(
                "metering.fft_size",
                "must be a power of two between 32 and 32768",
            ));
        }
        if !(0.0..1.0).contains(&meter.smoothing) {
            return Err(ConfigError::invalid("metering.smoothing", "must be in [0, 1)"));
        }
        if meter.min_db.is_nan() || meter.max_db.is_nan() || meter.min_db >= meter.max_db {
            return Err(ConfigError::invalid(
                "metering.min_db",
                "must be below metering.max_db",
            ));
        }
        if !(1..=240).contains(&meter.poll_hz) {
            return Err(ConfigError::invalid("metering.poll_hz", "must be in 1..=240"));
        }

        check_rate("render.sample_rate", self.render.sample_rate)?;
        check_channels("render.channels", self.render.channels)?;
        if self.render.block_size == 0 {
            return Err(ConfigError::invalid("render.block_size", "must be positive"));
        }
        check_channels("capture.channels", self.capture.channels)?;
        Ok(())
    }
}

fn check_rate(key: &str, rate: u32) -> Result<(), ConfigError> {
    if (8_000..=384_000).contains(&rate) {
        Ok(())
    } else {
        Err(ConfigError::invalid(key, format!("{rate} Hz is outside 8000..=384000")))
    }
}

fn check_channels(key: &str, channels: u16) -> Result<(), ConfigError> {
    if matches!(channels, 1 | 2) {
        Ok(())
    } else {
        Err(ConfigError::invalid(key, "must be 1 or 2"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = EngineConfig::default();
        assert_eq!(config.audio.sample_rate, 48_000);
        assert_eq!(config.audio.buffer_size, 512);
        assert_eq!(config.mix.master_volume, 0.8);
        assert_eq!(config.mix.param_smoothing_ms, 5.0);
        assert_eq!(config.mix.schedule_ahead_ms, 1000.0);
        assert_eq!(config.metering.fft_size, 256);
        assert_eq!(config.metering.poll_hz, 30);
        assert_eq!(config.render.sample_rate, 44_100);
        assert_eq!(config.render.channels, 2);
        assert_eq!(config.capture.channels, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_toml_is_default() {
        assert_eq!(EngineConfig::from_toml("").unwrap(), EngineConfig::default());
    }

    #[test]
    fn partial_sections_fill_in() {
        let config = EngineConfig::from_toml(
            r#"
            [audio]
            output_device = "Built-in Output"

            [mix]
            master_volume = 0.5
            "#,
        )
        .unwrap();
        assert_eq!(config.audio.output_device.as_deref(), Some("Built-in Output"));
        assert_eq!(config.audio.sample_rate, 48_000);
        assert_eq!(config.mix.master_volume, 0.5);
        assert_eq!(config.mix.command_queue_capacity, 1024);
    }

    #[test]
    fn rejects_surround_render() {
        let err = EngineConfig::from_toml("[render]\nchannels = 6\n").unwrap_err();
        assert!(
            matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "render.channels")
        );
    }

    #[test]
    fn rejects_bad_fft_size() {
        let mut config = EngineConfig::default();
        config.metering.fft_size = 300;
        assert!(config.validate().is_err());
        config.metering.fft_size = 16;
        assert!(config.validate().is_err());
        config.metering.fft_size = 2048;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_inverted_db_range() {
        let mut config = EngineConfig::default();
        config.metering.min_db = -20.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_nan_master() {
        let mut config = EngineConfig::default();
        config.mix.master_volume = f32::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_short_schedule_window() {
        let mut config = EngineConfig::default();
        config.mix.schedule_ahead_ms = 10.0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("mix.schedule_ahead_ms"));
    }

    #[test]
    fn rejects_zero_rate() {
        let mut config = EngineConfig::default();
        config.render.sample_rate = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("render.sample_rate"));
    }

    #[test]
    fn toml_round_trip() {
        let mut config = EngineConfig::default();
        config.audio.input_device = Some("USB Mic".to_string());
        config.capture.channels = 2;
        let text = config.to_toml().unwrap();
        assert!(text.contains("[capture]"));
        assert_eq!(EngineConfig::from_toml(&text).unwrap(), config);
    }
}
