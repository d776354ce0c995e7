//! The project: tempo plus an ordered list of tracks.
//!
//! The engine receives project snapshots on each transport call and never
//! stores or persists them. Serialization exists so tools can load a
//! project from TOML or JSON.

use serde::{Deserialize, Serialize};

use crate::clip::{AudioClip, ClipId};
use crate::track::{Track, TrackId};

/// Export length used when the timeline is shorter than this, in seconds.
pub const MIN_EXPORT_DURATION: f64 = 30.0;

fn default_bpm() -> f64 {
    120.0
}

/// A multi-track arrangement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    /// Project identity.
    #[serde(default)]
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Tempo in beats per minute, used by the metronome and bar display.
    #[serde(default = "default_bpm")]
    pub bpm: f64,
    /// Tracks in mixer order.
    #[serde(default)]
    pub tracks: Vec<Track>,
}

impl Default for Project {
    fn default() -> Self {
        Self::new("", "")
    }
}

impl Project {
    /// Create an empty project at 120 BPM.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            bpm: default_bpm(),
            tracks: Vec::new(),
        }
    }

    /// Latest clip end across all tracks, or 0 for an empty timeline.
    pub fn timeline_end(&self) -> f64 {
        self.tracks.iter().map(Track::end_time).fold(0.0, f64::max)
    }

    /// Length a full mixdown should cover: the timeline end, but at least
    /// [`MIN_EXPORT_DURATION`].
    pub fn export_duration(&self) -> f64 {
        self.timeline_end().max(MIN_EXPORT_DURATION)
    }

    /// Look up a track by id.
    pub fn track(&self, id: &TrackId) -> Option<&Track> {
        self.tracks.iter().find(|t| &t.id == id)
    }

    /// Look up a track by id for mutation.
    pub fn track_mut(&mut self, id: &TrackId) -> Option<&mut Track> {
        self.tracks.iter_mut().find(|t| &t.id == id)
    }

    /// Find a clip anywhere in the project, with the track that holds it.
    pub fn find_clip(&self, id: &ClipId) -> Option<(&Track, &AudioClip)> {
        self.tracks
            .iter()
            .find_map(|t| t.clips.iter().find(|c| &c.id == id).map(|c| (t, c)))
    }

    /// Split a clip in place; the second half is inserted right after the first.
    ///
    /// Returns `false` (leaving the project untouched) when the clip does not
    /// exist or `split_time` is not strictly inside it.
    pub fn split_clip(
        &mut self,
        clip_id: &ClipId,
        split_time: f64,
        new_id: impl Into<ClipId>,
    ) -> bool {
        for track in &mut self.tracks {
            let Some(index) = track.clips.iter().position(|c| &c.id == clip_id) else {
                continue;
            };
            let Some((first, second)) = track.clips[index].split_at(split_time, new_id) else {
                return false;
            };
            track.clips[index] = first;
            track.clips.insert(index + 1, second);
            return true;
        }
        false
    }

    /// Duplicate a clip onto the same track. Returns the new clip's id.
    pub fn duplicate_clip(
        &mut self,
        clip_id: &ClipId,
        new_id: impl Into<ClipId>,
    ) -> Option<ClipId> {
        let track = self
            .tracks
            .iter_mut()
            .find(|t| t.clips.iter().any(|c| &c.id == clip_id))?;
        let copy = track.clips.iter().find(|c| &c.id == clip_id)?.duplicate(new_id);
        let id = copy.id.clone();
        track.clips.push(copy);
        Some(id)
    }

    /// Remove a clip wherever it lives.
    pub fn remove_clip(&mut self, clip_id: &ClipId) -> Option<AudioClip> {
        self.tracks.iter_mut().find_map(|t| {
            let index = t.clips.iter().position(|c| &c.id == clip_id)?;
            Some(t.clips.remove(index))
        })
    }
}
