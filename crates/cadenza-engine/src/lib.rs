//! Multi-track playback, recording and mixdown engine for cadenza.
//!
//! The engine turns a list of [`Track`](cadenza_core::Track)s into sound:
//!
//! - [`BufferCache`] decodes clip sources once and shares the buffers
//! - [`MixGraph`] owns one gain/pan strip per track and the master bus; the
//!   audio-thread [`Mixer`] it feeds is lock-free
//! - [`TransportClock`] and [`ClipScheduler`] decide which clips sound when
//! - [`CapturePipeline`] records the input device to WAV
//! - [`OfflineRenderer`] mixes faster than realtime to 16-bit WAV
//! - [`Metronome`] adds a click track on the project beat grid
//!
//! [`EngineSession`] owns all of it for one audio backend, and
//! [`spawn_session`] runs a session as a Tokio task driven through an
//! [`EngineHandle`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use cadenza_config::EngineConfig;
//! use cadenza_core::{AudioClip, SourceRef, Track};
//! use cadenza_engine::{EngineSession, spawn_session};
//! use cadenza_io::CpalBackend;
//!
//! # async fn run() -> cadenza_engine::Result<()> {
//! let session = EngineSession::new(EngineConfig::default(), Box::new(CpalBackend::new()))?;
//! let (engine, mut snapshots) = spawn_session(session);
//!
//! let drums = Track::new("drums", "Drums")
//!     .with_clip(AudioClip::new("loop", SourceRef::path("loop.wav"), 0.0, 8.0));
//! engine.play(vec![drums], Some(0.0)).await?;
//!
//! snapshots.changed().await.ok();
//! println!("at {:.2}s", snapshots.borrow().current_time);
//! # Ok(())
//! # }
//! ```

mod actor;
mod buffer_cache;
mod capture;
mod error;
pub mod metronome;
mod mix;
mod mixer;
mod render;
pub mod scheduler;
mod session;
pub mod transport;

pub use actor::{ControlCommand, EngineHandle, spawn_session};
pub use buffer_cache::BufferCache;
pub use capture::{CapturePipeline, RecordedTake};
pub use error::{DecodeError, DeviceError, EngineError, RenderError, Result};
pub use metronome::Metronome;
pub use mix::{GainHandle, MixGraph, StripParams};
pub use mixer::Mixer;
pub use render::{OfflineRenderer, RenderOptions, RenderProgress};
pub use scheduler::{ClipPlan, ClipScheduler, ClipTiming, plan, plan_clip};
pub use session::{EngineSession, EngineSnapshot};
pub use transport::{TransportClock, TransportState};
