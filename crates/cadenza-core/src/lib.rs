//! Cadenza Core - project model and mixing primitives
//!
//! This crate holds everything the engine needs that is independent of audio
//! devices, codecs and threads: the timeline model and the small numeric
//! building blocks shared by the realtime mixer and the offline renderer.
//!
//! # Project Model
//!
//! - [`Project`] - Ordered tracks plus tempo, serializable with serde
//! - [`Track`] - Volume, pan, mute/solo/arm flags and an ordered clip list
//! - [`AudioClip`] - A time-positioned window into a [`SourceRef`]
//! - [`is_effectively_muted`] / [`effective_gain`] - Mute combined with project-wide solo
//! - [`clamp_volume`] / [`clamp_pan`] - The parameter ranges shared with the mix graph
//!
//! Clip editing (split, duplicate, trim, grid snapping) lives on [`AudioClip`]
//! and [`Project`] as pure functions; the engine never edits clips itself.
//!
//! ## Parameter Smoothing
//!
//! - [`SmoothedParam`] - Exponential smoothing for zipper-free gain and pan moves
//!
//! ## Mixing
//!
//! - [`PanLaw`] / [`pan_gains`] - Equal-power stereo positioning
//! - [`StereoSamples`] - Planar stereo block used by the offline renderer
//!
//! ## Utilities
//!
//! - Level conversions: [`db_to_linear`], [`linear_to_db`]
//! - Time conversions: [`seconds_to_frames`], [`frames_to_seconds`]
//! - Display: [`format_timecode`], [`format_bars_beats`]
//!
//! # Example
//!
//! ```rust
//! use cadenza_core::{AudioClip, Project, SourceRef, Track};
//!
//! let clip = AudioClip::new("c1", SourceRef::path("drums.wav"), 2.0, 8.0);
//! let mut track = Track::new("t1", "Drums");
//! track.clips.push(clip);
//!
//! let mut project = Project::new("p1", "Demo");
//! project.tracks.push(track);
//!
//! assert_eq!(project.timeline_end(), 10.0);
//! assert_eq!(project.export_duration(), 30.0);
//! ```

pub mod clip;
pub mod math;
pub mod pan;
pub mod param;
pub mod project;
pub mod stereo_samples;
pub mod timecode;
pub mod track;

pub use clip::{AudioClip, ClipId, DUPLICATE_GAP_SECS, MIN_CLIP_DURATION, SourceRef, snap_to_grid};
pub use math::{db_to_linear, frames_to_seconds, linear_to_db, seconds_to_frames};
pub use pan::{PanLaw, pan_gains};
pub use param::SmoothedParam;
pub use project::{MIN_EXPORT_DURATION, Project};
pub use stereo_samples::StereoSamples;
pub use timecode::{format_bars_beats, format_timecode};
pub use track::{
    Track, TrackId, any_solo, clamp_pan, clamp_volume, effective_gain, is_effectively_muted,
};
