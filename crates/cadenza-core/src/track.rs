//! Tracks and effective-mute resolution.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::clip::AudioClip;

/// Stable identity of a track. Mix strips are keyed by this.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(String);

impl TrackId {
    /// Create an id from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TrackId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for TrackId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

fn default_volume() -> f32 {
    0.8
}

fn default_color() -> String {
    "#5b8def".to_owned()
}

/// A mixer track: level, position, flags and an ordered list of clips.
///
/// `volume` is linear gain in `[0, 1]` and `pan` is in `[-1, 1]`. The setters
/// clamp; deserialized values are clamped by the engine when applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    /// Identity used to key the track's mix strip.
    pub id: TrackId,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Display color. Cosmetic only.
    #[serde(default = "default_color")]
    pub color: String,
    /// Linear gain.
    #[serde(default = "default_volume")]
    pub volume: f32,
    /// Stereo position, -1 (left) to 1 (right).
    #[serde(default)]
    pub pan: f32,
    /// Track mute.
    #[serde(default)]
    pub muted: bool,
    /// Track solo. Any soloed track silences every non-soloed one.
    #[serde(default)]
    pub solo: bool,
    /// Armed for recording.
    #[serde(default)]
    pub armed: bool,
    /// Clips in timeline order as supplied by the caller.
    #[serde(default)]
    pub clips: Vec<AudioClip>,
}

impl Track {
    /// Create an empty track at the default level (0.8) and centered.
    pub fn new(id: impl Into<TrackId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            color: default_color(),
            volume: default_volume(),
            pan: 0.0,
            muted: false,
            solo: false,
            armed: false,
            clips: Vec::new(),
        }
    }

    /// Builder-style clip append.
    pub fn with_clip(mut self, clip: AudioClip) -> Self {
        self.clips.push(clip);
        self
    }

    /// Set the linear gain, clamped to `[0, 1]`.
    pub fn set_volume(&mut self, volume: f32) {
        self.volume = clamp_volume(volume);
    }

    /// Set the stereo position, clamped to `[-1, 1]`.
    pub fn set_pan(&mut self, pan: f32) {
        self.pan = clamp_pan(pan);
    }

    /// End of the last clip on this track, or 0 when empty.
    pub fn end_time(&self) -> f64 {
        self.clips
            .iter()
            .map(AudioClip::end_time)
            .fold(0.0, f64::max)
    }
}

/// Clamp a linear gain to the track range. NaN maps to silence.
#[inline]
pub fn clamp_volume(volume: f32) -> f32 {
    if volume.is_nan() { 0.0 } else { volume.clamp(0.0, 1.0) }
}

/// Clamp a pan position to the track range. NaN maps to center.
#[inline]
pub fn clamp_pan(pan: f32) -> f32 {
    if pan.is_nan() { 0.0 } else { pan.clamp(-1.0, 1.0) }
}

/// Whether any track in the set is soloed.
pub fn any_solo(tracks: &[Track]) -> bool {
    tracks.iter().any(|t| t.solo)
}

/// Whether a track is silent once mute and project-wide solo are combined.
///
/// A track is silent if it is muted, or if some track is soloed and this
/// one is not.
#[inline]
pub fn is_effectively_muted(track: &Track, any_solo: bool) -> bool {
    track.muted || (any_solo && !track.solo)
}

/// Gain the track's strip should run at: zero when effectively muted,
/// the clamped volume otherwise.
#[inline]
pub fn effective_gain(track: &Track, any_solo: bool) -> f32 {
    if is_effectively_muted(track, any_solo) {
        0.0
    } else {
        clamp_volume(track.volume)
    }
}
