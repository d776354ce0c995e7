//! cpal-based audio backend.
//!
//! [`CpalBackend`] wraps the platform's default cpal host (ALSA on Linux,
//! CoreAudio on macOS, WASAPI on Windows). Devices are selected by a
//! case-insensitive substring of their name, falling back to the system
//! default when no name is configured.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BuildStreamError, Device, Host};

use crate::backend::{
    AudioBackend, AudioDevice, BackendStreamConfig, ErrorCallback, InputCallback, OutputCallback,
    StreamHandle,
};
use crate::{Error, Result};

/// Extract a device's display name (cpal 0.17 `description()`).
fn device_name(device: &Device) -> std::result::Result<String, cpal::DeviceNameError> {
    device.description().map(|d| d.name().to_string())
}

fn describe(device: &Device, is_input: bool, is_output: bool) -> Option<AudioDevice> {
    let name = device_name(device).ok()?;
    let config = if is_input {
        device.default_input_config()
    } else {
        device.default_output_config()
    };
    Some(AudioDevice {
        name,
        is_input,
        is_output,
        default_sample_rate: config.map(|c| c.sample_rate()).unwrap_or(48000),
    })
}

/// Classify a stream construction failure.
fn build_error(err: BuildStreamError) -> Error {
    match err {
        BuildStreamError::DeviceNotAvailable => Error::NoDevice,
        other => {
            let message = other.to_string();
            let lower = message.to_lowercase();
            if lower.contains("permission") || lower.contains("denied") {
                Error::PermissionDenied(message)
            } else {
                Error::Stream(message)
            }
        }
    }
}

/// cpal audio backend on the platform default host.
pub struct CpalBackend {
    host: Host,
}

impl CpalBackend {
    /// Connect to the platform's default audio host.
    pub fn new() -> Self {
        let host = cpal::default_host();
        tracing::info!(host = host.id().name(), "cpal backend initialized");
        Self { host }
    }

    fn find_device(&self, name: Option<&str>, input: bool) -> Result<Device> {
        let kind = if input { "input" } else { "output" };
        let Some(search) = name else {
            let device = if input {
                self.host.default_input_device()
            } else {
                self.host.default_output_device()
            };
            return device.ok_or(Error::NoDevice);
        };

        let search_lower = search.to_lowercase();
        let devices: Vec<Device> = if input {
            self.host.input_devices().map_err(|e| Error::Stream(e.to_string()))?.collect()
        } else {
            self.host.output_devices().map_err(|e| Error::Stream(e.to_string()))?.collect()
        };

        devices
            .into_iter()
            .find(|device| {
                device_name(device).is_ok_and(|n| n.to_lowercase().contains(&search_lower))
            })
            .ok_or_else(|| Error::DeviceNotFound(format!("no {kind} device matching '{search}'")))
    }

    fn stream_config(config: &BackendStreamConfig) -> cpal::StreamConfig {
        cpal::StreamConfig {
            channels: config.channels,
            sample_rate: config.sample_rate,
            buffer_size: cpal::BufferSize::Fixed(config.buffer_size),
        }
    }
}

impl Default for CpalBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioBackend for CpalBackend {
    fn name(&self) -> &'static str {
        "cpal"
    }

    fn list_devices(&self) -> Result<Vec<AudioDevice>> {
        let mut devices = Vec::new();

        if let Ok(inputs) = self.host.input_devices() {
            for device in inputs {
                let is_output = device.default_output_config().is_ok();
                devices.extend(describe(&device, true, is_output));
            }
        }

        if let Ok(outputs) = self.host.output_devices() {
            for device in outputs {
                if let Some(info) = describe(&device, false, true)
                    && !devices.iter().any(|d| d.name == info.name)
                {
                    devices.push(info);
                }
            }
        }

        Ok(devices)
    }

    fn default_output_device(&self) -> Result<Option<AudioDevice>> {
        Ok(self
            .host
            .default_output_device()
            .and_then(|d| describe(&d, false, true)))
    }

    fn default_input_device(&self) -> Result<Option<AudioDevice>> {
        Ok(self
            .host
            .default_input_device()
            .and_then(|d| describe(&d, true, false)))
    }

    fn build_output_stream(
        &self,
        config: &BackendStreamConfig,
        mut callback: OutputCallback,
        mut error_callback: ErrorCallback,
    ) -> Result<StreamHandle> {
        let device = self.find_device(config.device_name.as_deref(), false)?;

        let stream = device
            .build_output_stream(
                &Self::stream_config(config),
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| callback(data),
                move |err| error_callback(&err.to_string()),
                None,
            )
            .map_err(build_error)?;

        stream.play().map_err(|e| Error::Stream(e.to_string()))?;
        tracing::info!(
            channels = config.channels,
            sample_rate = config.sample_rate,
            buffer_size = config.buffer_size,
            "output stream started"
        );

        Ok(StreamHandle::new(stream))
    }

    fn build_input_stream(
        &self,
        config: &BackendStreamConfig,
        mut callback: InputCallback,
        mut error_callback: ErrorCallback,
    ) -> Result<StreamHandle> {
        let device = self.find_device(config.device_name.as_deref(), true)?;

        let stream = device
            .build_input_stream(
                &Self::stream_config(config),
                move |data: &[f32], _: &cpal::InputCallbackInfo| callback(data),
                move |err| error_callback(&err.to_string()),
                None,
            )
            .map_err(build_error)?;

        stream.play().map_err(|e| Error::Stream(e.to_string()))?;
        tracing::info!(
            channels = config.channels,
            sample_rate = config.sample_rate,
            "input stream started"
        );

        Ok(StreamHandle::new(stream))
    }
}
