//! A hardware-free backend driven explicitly by the caller.
//!
//! [`ManualBackend`] stores the callbacks it is given instead of handing them
//! to a device. Output audio is produced only when the owner calls
//! [`render`](ManualBackend::render), and input audio arrives only through
//! [`push_input`](ManualBackend::push_input). Engine time therefore advances
//! exactly as far as the caller says, which makes playback, metering and
//! capture fully deterministic.
//!
//! The backend is cheaply cloneable: give one clone to the engine and keep
//! another to drive it.
//!
//! ```rust
//! use cadenza_io::{AudioBackend, BackendStreamConfig, ManualBackend};
//!
//! let backend = ManualBackend::new();
//! let driver = backend.clone();
//!
//! let _stream = backend
//!     .build_output_stream(
//!         &BackendStreamConfig::default(),
//!         Box::new(|out: &mut [f32]| out.fill(0.25)),
//!         Box::new(|_| {}),
//!     )
//!     .unwrap();
//!
//! let block = driver.render(4).unwrap();
//! assert_eq!(block, vec![0.25; 8]);
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crate::backend::{
    AudioBackend, AudioDevice, BackendStreamConfig, ErrorCallback, InputCallback, OutputCallback,
    StreamHandle,
};
use crate::{Error, Result};

const DEVICE_NAME: &str = "manual";

/// How the simulated platform answers input-stream requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InputAccess {
    Granted,
    Denied,
    Missing,
}

struct Slot<C> {
    id: u64,
    config: BackendStreamConfig,
    callback: C,
}

struct Shared {
    output: Option<Slot<OutputCallback>>,
    input: Option<Slot<InputCallback>>,
    next_id: u64,
    input_access: InputAccess,
    output_opened: usize,
    input_opened: usize,
}

/// Deterministic backend with caller-driven output and input.
#[derive(Clone)]
pub struct ManualBackend {
    shared: Arc<Mutex<Shared>>,
}

/// Keeps a manual stream registered; unregisters it on drop.
struct ManualStream {
    shared: Weak<Mutex<Shared>>,
    id: u64,
    input: bool,
}

impl Drop for ManualStream {
    fn drop(&mut self) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        let mut guard = shared.lock().unwrap_or_else(PoisonError::into_inner);
        let output = if self.input {
            None
        } else {
            guard.output.take_if(|slot| slot.id == self.id)
        };
        let input = if self.input {
            guard.input.take_if(|slot| slot.id == self.id)
        } else {
            None
        };
        // Callbacks are dropped after the lock is released.
        drop(guard);
        drop((output, input));
    }
}

impl ManualBackend {
    /// A backend with input access granted and no streams open.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Mutex::new(Shared {
                output: None,
                input: None,
                next_id: 0,
                input_access: InputAccess::Granted,
                output_opened: 0,
                input_opened: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make subsequent input-stream requests fail as if permission was refused.
    pub fn deny_input(&self) {
        self.lock().input_access = InputAccess::Denied;
    }

    /// Make subsequent input-stream requests fail as if no microphone exists.
    pub fn remove_input_device(&self) {
        self.lock().input_access = InputAccess::Missing;
    }

    /// Restore input access.
    pub fn grant_input(&self) {
        self.lock().input_access = InputAccess::Granted;
    }

    /// Run the output callback for `frames` frames and return the
    /// interleaved block, or `None` when no output stream is open.
    pub fn render(&self, frames: usize) -> Option<Vec<f32>> {
        let mut guard = self.lock();
        let slot = guard.output.as_mut()?;
        let mut block = vec![0.0; frames * usize::from(slot.config.channels)];
        (slot.callback)(&mut block);
        Some(block)
    }

    /// Feed captured samples (interleaved at the input stream's channel
    /// count) to the input callback. Returns `false` when no input stream
    /// is open.
    pub fn push_input(&self, samples: &[f32]) -> bool {
        let mut guard = self.lock();
        match guard.input.as_mut() {
            Some(slot) => {
                (slot.callback)(samples);
                true
            }
            None => false,
        }
    }

    /// Whether an output stream is currently open.
    pub fn is_output_open(&self) -> bool {
        self.lock().output.is_some()
    }

    /// Whether an input stream is currently open.
    pub fn is_input_open(&self) -> bool {
        self.lock().input.is_some()
    }

    /// Total output streams built over the backend's lifetime.
    pub fn output_streams_opened(&self) -> usize {
        self.lock().output_opened
    }

    /// Total input streams built over the backend's lifetime.
    pub fn input_streams_opened(&self) -> usize {
        self.lock().input_opened
    }

    /// Configuration of the open output stream.
    pub fn output_config(&self) -> Option<BackendStreamConfig> {
        self.lock().output.as_ref().map(|s| s.config.clone())
    }

    /// Configuration of the open input stream.
    pub fn input_config(&self) -> Option<BackendStreamConfig> {
        self.lock().input.as_ref().map(|s| s.config.clone())
    }

    fn device(is_input: bool, is_output: bool) -> AudioDevice {
        AudioDevice {
            name: DEVICE_NAME.to_owned(),
            is_input,
            is_output,
            default_sample_rate: 48000,
        }
    }
}

impl Default for ManualBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ManualBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let guard = self.lock();
        f.debug_struct("ManualBackend")
            .field("output_open", &guard.output.is_some())
            .field("input_open", &guard.input.is_some())
            .field("input_access", &guard.input_access)
            .finish()
    }
}

impl AudioBackend for ManualBackend {
    fn name(&self) -> &'static str {
        "manual"
    }

    fn list_devices(&self) -> Result<Vec<AudioDevice>> {
        let has_input = self.lock().input_access != InputAccess::Missing;
        Ok(vec![Self::device(has_input, true)])
    }

    fn default_output_device(&self) -> Result<Option<AudioDevice>> {
        Ok(Some(Self::device(false, true)))
    }

    fn default_input_device(&self) -> Result<Option<AudioDevice>> {
        let has_input = self.lock().input_access != InputAccess::Missing;
        Ok(has_input.then(|| Self::device(true, false)))
    }

    fn build_output_stream(
        &self,
        config: &BackendStreamConfig,
        callback: OutputCallback,
        _error_callback: ErrorCallback,
    ) -> Result<StreamHandle> {
        let mut guard = self.lock();
        let id = guard.next_id;
        guard.next_id += 1;
        guard.output_opened += 1;
        let previous = guard.output.replace(Slot {
            id,
            config: config.clone(),
            callback,
        });
        drop(guard);
        drop(previous);

        Ok(StreamHandle::new(ManualStream {
            shared: Arc::downgrade(&self.shared),
            id,
            input: false,
        }))
    }

    fn build_input_stream(
        &self,
        config: &BackendStreamConfig,
        callback: InputCallback,
        _error_callback: ErrorCallback,
    ) -> Result<StreamHandle> {
        let mut guard = self.lock();
        match guard.input_access {
            InputAccess::Granted => {}
            InputAccess::Denied => {
                return Err(Error::PermissionDenied("input access refused".into()));
            }
            InputAccess::Missing => return Err(Error::NoDevice),
        }
        let id = guard.next_id;
        guard.next_id += 1;
        guard.input_opened += 1;
        let previous = guard.input.replace(Slot {
            id,
            config: config.clone(),
            callback,
        });
        drop(guard);
        drop(previous);

        Ok(StreamHandle::new(ManualStream {
            shared: Arc::downgrade(&self.shared),
            id,
            input: true,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn noop_error() -> ErrorCallback {
        Box::new(|_| {})
    }

    #[test]
    fn render_without_stream_is_none() {
        assert!(ManualBackend::new().render(16).is_none());
    }

    #[test]
    fn render_runs_callback_with_channel_sized_block() {
        let backend = ManualBackend::new();
        let config = BackendStreamConfig {
            channels: 1,
            ..BackendStreamConfig::default()
        };
        let _stream = backend
            .build_output_stream(&config, Box::new(|out| out.fill(1.0)), noop_error())
            .unwrap();
        assert_eq!(backend.render(3).unwrap(), [1.0, 1.0, 1.0]);
    }

    #[test]
    fn dropping_handle_closes_stream() {
        let backend = ManualBackend::new();
        let stream = backend
            .build_output_stream(&BackendStreamConfig::default(), Box::new(|_| {}), noop_error())
            .unwrap();
        assert!(backend.is_output_open());
        drop(stream);
        assert!(!backend.is_output_open());
        assert_eq!(backend.output_streams_opened(), 1);
    }

    #[test]
    fn stale_handle_does_not_close_newer_stream() {
        let backend = ManualBackend::new();
        let first = backend
            .build_output_stream(&BackendStreamConfig::default(), Box::new(|_| {}), noop_error())
            .unwrap();
        let _second = backend
            .build_output_stream(&BackendStreamConfig::default(), Box::new(|_| {}), noop_error())
            .unwrap();
        drop(first);
        assert!(backend.is_output_open());
    }

    #[test]
    fn input_is_forwarded() {
        let backend = ManualBackend::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let _stream = backend
            .build_input_stream(
                &BackendStreamConfig::default(),
                Box::new(move |data| {
                    counter.fetch_add(data.len(), Ordering::Relaxed);
                }),
                noop_error(),
            )
            .unwrap();
        assert!(backend.push_input(&[0.0; 64]));
        assert_eq!(seen.load(Ordering::Relaxed), 64);
    }

    #[test]
    fn denied_and_missing_input() {
        let backend = ManualBackend::new();
        backend.deny_input();
        let err = backend
            .build_input_stream(&BackendStreamConfig::default(), Box::new(|_| {}), noop_error())
            .unwrap_err();
        assert!(matches!(err, Error::PermissionDenied(_)));

        backend.remove_input_device();
        let err = backend
            .build_input_stream(&BackendStreamConfig::default(), Box::new(|_| {}), noop_error())
            .unwrap_err();
        assert!(matches!(err, Error::NoDevice));
        assert!(backend.default_input_device().unwrap().is_none());
        assert!(!backend.push_input(&[0.0; 4]));
    }
}
