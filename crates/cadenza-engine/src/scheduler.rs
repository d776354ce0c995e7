//! Clip scheduling: which clips sound from a seek point, and where.
//!
//! For a start point `t0`, a clip with `start_time + duration > t0` plays
//! after `max(0, start_time - t0)` seconds, reading from
//! `offset + max(0, t0 - start_time)` for `duration - max(0, t0 - start_time)`
//! seconds. The offline renderer uses the same math with `t0 = 0`.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use tracing::{debug, warn};

use cadenza_core::{
    AudioClip, ClipId, Track, TrackId, any_solo, is_effectively_muted, seconds_to_frames,
};
use cadenza_io::DecodedBuffer;

use crate::buffer_cache::BufferCache;
use crate::mix::MixGraph;

/// When and what part of a clip plays, in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipTiming {
    /// Delay from the start point until the clip sounds.
    pub delay: f64,
    /// Position in the source where reading begins.
    pub read_offset: f64,
    /// Playable length remaining.
    pub length: f64,
}

/// [`ClipTiming`] converted to frames at a mix rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameTiming {
    /// Delay in frames.
    pub delay: u64,
    /// Source read position in frames.
    pub read_offset: usize,
    /// Frames to play.
    pub length: usize,
}

impl ClipTiming {
    /// Round every field to frames at `sample_rate`.
    pub fn to_frames(&self, sample_rate: u32) -> FrameTiming {
        let to_usize =
            |secs| usize::try_from(seconds_to_frames(secs, sample_rate)).unwrap_or(usize::MAX);
        FrameTiming {
            delay: seconds_to_frames(self.delay, sample_rate),
            read_offset: to_usize(self.read_offset),
            length: to_usize(self.length),
        }
    }
}

/// Timing of `clip` when playback starts at `t0`, or `None` if the clip
/// has already ended (or has no length).
pub fn plan_clip(clip: &AudioClip, t0: f64) -> Option<ClipTiming> {
    if clip.duration <= 0.0 || clip.end_time() <= t0 {
        return None;
    }
    let elapsed = (t0 - clip.start_time).max(0.0);
    Some(ClipTiming {
        delay: (clip.start_time - t0).max(0.0),
        read_offset: clip.offset.max(0.0) + elapsed,
        length: clip.duration - elapsed,
    })
}

/// One clip to start.
#[derive(Debug, Clone, PartialEq)]
pub struct ClipPlan {
    /// Track the clip belongs to.
    pub track_id: TrackId,
    /// The clip.
    pub clip_id: ClipId,
    /// When and what part of it plays.
    pub timing: ClipTiming,
}

/// Every clip of every audible track that still has material after `t0`.
pub fn plan(tracks: &[Track], t0: f64) -> Vec<ClipPlan> {
    let solo = any_solo(tracks);
    tracks
        .iter()
        .filter(|track| !is_effectively_muted(track, solo))
        .flat_map(|track| plan_track(track, t0))
        .collect()
}

fn plan_track(track: &Track, t0: f64) -> impl Iterator<Item = ClipPlan> + '_ {
    track.clips.iter().filter_map(move |clip| {
        plan_clip(clip, t0).map(|timing| ClipPlan {
            track_id: track.id.clone(),
            clip_id: clip.id.clone(),
            timing,
        })
    })
}

#[derive(Debug, Clone)]
struct ActivePlay {
    clip_id: ClipId,
    track_id: TrackId,
}

/// A clip start waiting for the playhead to come within the window.
#[derive(Debug, Clone)]
struct PendingVoice {
    track_id: TrackId,
    clip_id: ClipId,
    buffer: Arc<DecodedBuffer>,
    start_frame: u64,
    read_offset: usize,
    length: usize,
}

/// Issues clip playback against the mix graph and remembers what it issued.
///
/// Clip starts are handed to the audio thread only once they fall inside
/// the look-ahead window, and only while the command ring has room. The
/// rest wait here, in start order, until [`top_up`](Self::top_up).
#[derive(Debug)]
pub struct ClipScheduler {
    lookahead_frames: u64,
    active: Vec<ActivePlay>,
    pending: VecDeque<PendingVoice>,
    scheduled_tracks: HashSet<TrackId>,
}

impl ClipScheduler {
    /// An idle scheduler issuing clip starts up to `lookahead_frames`
    /// ahead of the playhead.
    pub fn new(lookahead_frames: u64) -> Self {
        Self {
            lookahead_frames,
            active: Vec::new(),
            pending: VecDeque::new(),
            scheduled_tracks: HashSet::new(),
        }
    }

    /// Queue every audible clip from project time `t0`, with `t0` sounding
    /// at engine frame `anchor_frame`, and issue the ones due now. Returns
    /// the number of clips queued.
    ///
    /// Every track gets a mix strip. Clips whose buffer has not been decoded
    /// are skipped.
    pub fn schedule(
        &mut self,
        mix: &mut MixGraph,
        cache: &BufferCache,
        tracks: &[Track],
        t0: f64,
        anchor_frame: u64,
    ) -> usize {
        let solo = any_solo(tracks);
        let mut queued = 0;
        for track in tracks {
            if mix.ensure_track_node(track, solo).is_none() {
                continue;
            }
            if is_effectively_muted(track, solo) {
                debug!(track_id = %track.id, "track silent, not scheduled");
                continue;
            }
            queued += self.queue_track(mix.sample_rate(), cache, track, t0, anchor_frame);
        }
        self.sort_pending();
        self.top_up(mix, anchor_frame);
        queued
    }

    /// Queue tracks that are audible now but were silent when playback
    /// started, from project time `now` at engine frame `now_frame`.
    pub fn resync(
        &mut self,
        mix: &mut MixGraph,
        cache: &BufferCache,
        tracks: &[Track],
        now: f64,
        now_frame: u64,
    ) -> usize {
        let solo = any_solo(tracks);
        let mut queued = 0;
        for track in tracks {
            if is_effectively_muted(track, solo) || self.scheduled_tracks.contains(&track.id) {
                continue;
            }
            if mix.ensure_track_node(track, solo).is_none() {
                continue;
            }
            debug!(track_id = %track.id, now, "track became audible, scheduling");
            queued += self.queue_track(mix.sample_rate(), cache, track, now, now_frame);
        }
        self.sort_pending();
        self.top_up(mix, now_frame);
        queued
    }

    fn queue_track(
        &mut self,
        rate: u32,
        cache: &BufferCache,
        track: &Track,
        t0: f64,
        anchor_frame: u64,
    ) -> usize {
        let mut queued = 0;
        for plan in plan_track(track, t0) {
            let Some(buffer) = cache.get(&plan.clip_id) else {
                warn!(clip_id = %plan.clip_id, track_id = %track.id, "clip not decoded, skipped");
                continue;
            };
            let frames = plan.timing.to_frames(rate);
            self.pending.push_back(PendingVoice {
                track_id: track.id.clone(),
                clip_id: plan.clip_id,
                buffer,
                start_frame: anchor_frame + frames.delay,
                read_offset: frames.read_offset,
                length: frames.length,
            });
            queued += 1;
        }
        self.scheduled_tracks.insert(track.id.clone());
        queued
    }

    fn sort_pending(&mut self) {
        self.pending
            .make_contiguous()
            .sort_by_key(|voice| voice.start_frame);
    }

    /// Hand the audio thread every waiting clip that starts before
    /// `now_frame` plus the look-ahead, as far as the command ring allows.
    /// Returns the number of voices issued.
    pub fn top_up(&mut self, mix: &mut MixGraph, now_frame: u64) -> usize {
        let horizon = now_frame.saturating_add(self.lookahead_frames);
        let mut issued = 0;
        while let Some(next) = self.pending.front() {
            if next.start_frame > horizon || mix.voice_slots() == 0 {
                break;
            }
            let Some(voice) = self.pending.pop_front() else {
                break;
            };
            let end_frame = voice.start_frame.saturating_add(voice.length as u64);
            if end_frame <= now_frame {
                debug!(clip_id = %voice.clip_id, "clip passed before it was issued");
                continue;
            }
            if mix.start_voice(
                &voice.track_id,
                voice.buffer,
                voice.start_frame,
                voice.read_offset,
                voice.length,
            ) {
                debug!(
                    clip_id = %voice.clip_id,
                    start_frame = voice.start_frame,
                    read_offset = voice.read_offset,
                    frames = voice.length,
                    "clip scheduled"
                );
                self.active.push(ActivePlay {
                    clip_id: voice.clip_id,
                    track_id: voice.track_id,
                });
                issued += 1;
            }
        }
        issued
    }

    /// Hard-stop everything this scheduler started and drop what is waiting.
    pub fn stop_all(&mut self, mix: &mut MixGraph) {
        if !self.active.is_empty() || !self.pending.is_empty() {
            debug!(
                voices = self.active.len(),
                waiting = self.pending.len(),
                "stopping scheduled clips"
            );
        }
        mix.stop_all();
        self.active.clear();
        self.pending.clear();
        self.scheduled_tracks.clear();
    }

    /// Forget a released track.
    pub fn forget_track(&mut self, track_id: &TrackId) {
        self.active.retain(|play| &play.track_id != track_id);
        self.pending.retain(|voice| &voice.track_id != track_id);
        self.scheduled_tracks.remove(track_id);
    }

    /// Clips handed to the audio thread since the last stop.
    pub fn active_clips(&self) -> impl Iterator<Item = &ClipId> {
        self.active.iter().map(|play| &play.clip_id)
    }

    /// Clips waiting for the look-ahead window.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Whether `track_id` was scheduled in the current run.
    pub fn is_track_scheduled(&self, track_id: &TrackId) -> bool {
        self.scheduled_tracks.contains(track_id)
    }
}
