//! Audio clips and the sources they read from.
//!
//! An [`AudioClip`] is a window into a decoded source: it starts at
//! `start_time` on the timeline, plays for `duration` seconds, and begins
//! reading `offset` seconds into the source. All times are project seconds
//! as `f64`.
//!
//! The editing operations here are pure: they return new clips or mutate the
//! receiver, and never touch decoded audio.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Gap left between a clip and its duplicate, in seconds.
pub const DUPLICATE_GAP_SECS: f64 = 0.1;

/// Shortest duration a trim may leave behind, in seconds.
pub const MIN_CLIP_DURATION: f64 = 0.01;

/// Stable identity of a clip. Decoded buffers are cached under this key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClipId(String);

impl ClipId {
    /// Create an id from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClipId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for ClipId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Where a clip's encoded audio comes from.
///
/// In project files this is written as `source = { path = "kick.wav" }` or
/// `source = { url = "https://..." }`. In-memory bytes only exist at runtime
/// (for example a freshly recorded take) and are never serialized.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceRef {
    /// A file on the local filesystem.
    Path(PathBuf),
    /// A remote resource fetched over HTTP.
    Url(String),
    /// Encoded bytes already in memory.
    #[serde(skip)]
    Bytes(Arc<[u8]>),
}

impl SourceRef {
    /// Reference a local file.
    pub fn path(path: impl Into<PathBuf>) -> Self {
        Self::Path(path.into())
    }

    /// Reference a remote URL.
    pub fn url(url: impl Into<String>) -> Self {
        Self::Url(url.into())
    }

    /// Wrap encoded bytes that are already in memory.
    pub fn bytes(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self::Bytes(bytes.into())
    }

    /// Lowercased file extension, used as a format hint when probing.
    pub fn extension_hint(&self) -> Option<String> {
        let name = match self {
            Self::Path(path) => path.to_str()?,
            Self::Url(url) => url.split(['?', '#']).next()?,
            Self::Bytes(_) => return None,
        };
        let (_, ext) = name.rsplit_once('.')?;
        if ext.contains('/') || ext.is_empty() {
            return None;
        }
        Some(ext.to_ascii_lowercase())
    }
}

impl fmt::Debug for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => f.debug_tuple("Path").field(path).finish(),
            Self::Url(url) => f.debug_tuple("Url").field(url).finish(),
            Self::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
        }
    }
}

/// A time-positioned region of a source on a track.
///
/// `offset + duration` should not exceed the decoded length of `source`; the
/// engine clamps reads instead of failing when it does.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioClip {
    /// Identity used for buffer caching and voice tracking.
    pub id: ClipId,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Encoded audio this clip plays.
    pub source: SourceRef,
    /// Timeline position of the first audible sample, in seconds.
    pub start_time: f64,
    /// Playable length in seconds.
    pub duration: f64,
    /// Seconds into the source where playback begins.
    #[serde(default)]
    pub offset: f64,
}

impl AudioClip {
    /// Create a clip with zero source offset.
    pub fn new(id: impl Into<ClipId>, source: SourceRef, start_time: f64, duration: f64) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            source,
            start_time,
            duration,
            offset: 0.0,
        }
    }

    /// Builder-style setter for the source offset.
    pub fn with_offset(mut self, offset: f64) -> Self {
        self.offset = offset;
        self
    }

    /// Builder-style setter for the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Timeline position just past the last audible sample.
    #[inline]
    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration
    }

    /// Whether `time` falls inside `[start_time, end_time)`.
    #[inline]
    pub fn contains(&self, time: f64) -> bool {
        time >= self.start_time && time < self.end_time()
    }

    /// Split the clip at a timeline position.
    ///
    /// Returns `None` when `split_time` is on or outside the clip edges.
    /// Otherwise the first half keeps this clip's id and the second half
    /// takes `new_id`, starts at `split_time` and reads further into the
    /// source by the length of the first half.
    ///
    /// ```rust
    /// use cadenza_core::{AudioClip, SourceRef};
    ///
    /// let clip = AudioClip::new("a", SourceRef::path("a.wav"), 2.0, 10.0);
    /// let (first, second) = clip.split_at(6.0, "b").unwrap();
    /// assert_eq!(first.duration, 4.0);
    /// assert_eq!((second.start_time, second.duration, second.offset), (6.0, 6.0, 4.0));
    /// ```
    pub fn split_at(&self, split_time: f64, new_id: impl Into<ClipId>) -> Option<(Self, Self)> {
        let head = split_time - self.start_time;
        if head <= 0.0 || head >= self.duration {
            return None;
        }

        let mut first = self.clone();
        first.duration = head;

        let second = Self {
            id: new_id.into(),
            name: self.name.clone(),
            source: self.source.clone(),
            start_time: split_time,
            duration: self.duration - head,
            offset: self.offset + head,
        };
        Some((first, second))
    }

    /// Copy this clip under a new id, placed just after its end.
    pub fn duplicate(&self, new_id: impl Into<ClipId>) -> Self {
        Self {
            id: new_id.into(),
            start_time: self.end_time() + DUPLICATE_GAP_SECS,
            ..self.clone()
        }
    }

    /// Move the left edge by `delta` seconds (positive shortens the clip).
    ///
    /// The source offset moves with the edge so audio stays aligned to the
    /// timeline. The edge never moves before the start of the source and
    /// never leaves less than [`MIN_CLIP_DURATION`].
    pub fn trim_start(&mut self, delta: f64) {
        let min_delta = -(self.offset.max(0.0));
        let max_delta = (self.duration - MIN_CLIP_DURATION).max(0.0);
        let delta = delta.max(min_delta).min(max_delta);
        self.start_time += delta;
        self.offset += delta;
        self.duration -= delta;
    }

    /// Move the right edge by `delta` seconds (positive lengthens the clip).
    pub fn trim_end(&mut self, delta: f64) {
        self.duration = (self.duration + delta).max(MIN_CLIP_DURATION);
    }
}

/// Round `time` to the nearest multiple of `grid` seconds.
///
/// A non-positive grid disables snapping. Results never go below zero.
///
/// ```rust
/// use cadenza_core::snap_to_grid;
///
/// assert_eq!(snap_to_grid(1.13, 0.25), 1.25);
/// assert_eq!(snap_to_grid(1.12, 0.25), 1.0);
/// ```
pub fn snap_to_grid(time: f64, grid: f64) -> f64 {
    if grid <= 0.0 || !grid.is_finite() {
        return time.max(0.0);
    }
    ((time / grid).round() * grid).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clip() -> AudioClip {
        AudioClip::new("a", SourceRef::path("a.wav"), 2.0, 10.0)
    }

    #[test]
    fn split_in_middle() {
        let (first, second) = clip().split_at(6.0, "b").unwrap();
        assert_eq!(first.id.as_str(), "a");
        assert_eq!(first.start_time, 2.0);
        assert_eq!(first.duration, 4.0);
        assert_eq!(first.offset, 0.0);

        assert_eq!(second.id.as_str(), "b");
        assert_eq!(second.start_time, 6.0);
        assert_eq!(second.duration, 6.0);
        assert_eq!(second.offset, 4.0);
    }

    #[test]
    fn split_carries_existing_offset() {
        let clip = clip().with_offset(1.5);
        let (_, second) = clip.split_at(3.0, "b").unwrap();
        assert_eq!(second.offset, 2.5);
    }

    #[test]
    fn split_on_edges_is_rejected() {
        let clip = clip();
        assert!(clip.split_at(2.0, "b").is_none());
        assert!(clip.split_at(12.0, "b").is_none());
        assert!(clip.split_at(0.5, "b").is_none());
        assert!(clip.split_at(20.0, "b").is_none());
    }

    #[test]
    fn duplicate_lands_after_end() {
        let copy = clip().duplicate("c");
        assert_eq!(copy.id.as_str(), "c");
        assert!((copy.start_time - 12.1).abs() < 1e-12);
        assert_eq!(copy.duration, 10.0);
    }

    #[test]
    fn trim_start_moves_offset_with_edge() {
        let mut clip = clip();
        clip.trim_start(1.0);
        assert_eq!(clip.start_time, 3.0);
        assert_eq!(clip.offset, 1.0);
        assert_eq!(clip.duration, 9.0);
    }

    #[test]
    fn trim_start_cannot_extend_before_source() {
        let mut clip = clip().with_offset(0.5);
        clip.trim_start(-2.0);
        assert_eq!(clip.offset, 0.0);
        assert_eq!(clip.start_time, 1.5);
        assert_eq!(clip.duration, 10.5);
    }

    #[test]
    fn trim_start_tolerates_bad_offsets() {
        // A negative offset can arrive from a hand-edited project file.
        let mut clip = clip().with_offset(-1.0);
        clip.trim_start(-0.5);
        assert_eq!(clip.start_time, 2.0);
        assert_eq!(clip.duration, 10.0);
        clip.trim_start(1.5);
        assert_eq!(clip.start_time, 3.5);
        assert_eq!(clip.offset, 0.5);

        let mut clip = self::clip().with_offset(f64::NAN);
        clip.trim_start(-1.0);
        assert_eq!(clip.start_time, 2.0);
        clip.trim_start(f64::NAN);
        assert_eq!(clip.duration, 10.0);
    }

    #[test]
    fn trims_respect_minimum_duration() {
        let mut clip = clip();
        clip.trim_start(50.0);
        assert!((clip.duration - MIN_CLIP_DURATION).abs() < 1e-12);

        let mut clip = self::clip();
        clip.trim_end(-50.0);
        assert_eq!(clip.duration, MIN_CLIP_DURATION);
    }

    #[test]
    fn contains_is_half_open() {
        let clip = clip();
        assert!(clip.contains(2.0));
        assert!(clip.contains(11.999));
        assert!(!clip.contains(12.0));
        assert!(!clip.contains(1.999));
    }

    #[test]
    fn snapping() {
        assert_eq!(snap_to_grid(0.1, 0.25), 0.0);
        assert_eq!(snap_to_grid(0.13, 0.25), 0.25);
        assert_eq!(snap_to_grid(-3.0, 0.25), 0.0);
        assert_eq!(snap_to_grid(1.3, 0.0), 1.3);
    }

    #[test]
    fn extension_hints() {
        assert_eq!(SourceRef::path("Kick.WAV").extension_hint().as_deref(), Some("wav"));
        assert_eq!(
            SourceRef::url("https://cdn.test/a/b.mp3?sig=1").extension_hint().as_deref(),
            Some("mp3")
        );
        assert_eq!(SourceRef::url("https://cdn.test/raw").extension_hint(), None);
        assert_eq!(SourceRef::bytes(vec![0u8; 4]).extension_hint(), None);
    }

    #[test]
    fn bytes_debug_hides_payload() {
        let source = SourceRef::bytes(vec![1u8, 2, 3]);
        assert_eq!(format!("{source:?}"), "Bytes(3 bytes)");
    }
}
