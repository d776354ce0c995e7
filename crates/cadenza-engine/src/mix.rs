//! Control side of the mix graph.
//!
//! Each track gets one strip (a gain stage followed by a stereo pan stage)
//! feeding the master bus. Strips are created on first reference to a track
//! id and live until [`MixGraph::release_track`]. Volume, pan and mute are
//! plain atomics in a shared [`StripParams`]; writing them never touches the
//! graph, and the audio thread glides to new values over the configured
//! smoothing time.
//!
//! New strips, voices and metronome changes travel to the audio thread over
//! an `rtrb` ring. Part of the ring is held back from voices so a strip can
//! always be added while clips are queued. Finished voices come back on a
//! second ring and are dropped here, on the control thread.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use rtrb::{Consumer, Producer, RingBuffer};
use tracing::{debug, warn};

use cadenza_analysis::SpectrumAnalyser;
use cadenza_config::MixConfig;
use cadenza_core::{Track, TrackId, clamp_pan, clamp_volume, is_effectively_muted};
use cadenza_io::DecodedBuffer;

use crate::metronome::MetronomeClock;
use crate::mixer::{
    MixCommand, MixCore, Mixer, MixerLinks, Retired, Strip, StripId, VOICE_CAPACITY, Voice,
};

/// Master tap capacity in mono samples.
const TAP_CAPACITY: usize = 1 << 15;

/// An `f32` stored as bits in an [`AtomicU32`].
#[derive(Debug)]
pub(crate) struct AtomicF32(AtomicU32);

impl AtomicF32 {
    pub(crate) fn new(value: f32) -> Self {
        Self(AtomicU32::new(value.to_bits()))
    }

    #[inline]
    pub(crate) fn get(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Acquire))
    }

    #[inline]
    pub(crate) fn set(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Release);
    }
}

/// Live parameters of one track strip, shared with the audio thread.
#[derive(Debug)]
pub struct StripParams {
    volume: AtomicF32,
    pan: AtomicF32,
    muted: AtomicBool,
    released: AtomicBool,
}

impl StripParams {
    /// Parameters with volume clamped to `[0, 1]` and pan to `[-1, 1]`.
    pub fn new(volume: f32, pan: f32, muted: bool) -> Self {
        Self {
            volume: AtomicF32::new(clamp_volume(volume)),
            pan: AtomicF32::new(clamp_pan(pan)),
            muted: AtomicBool::new(muted),
            released: AtomicBool::new(false),
        }
    }

    /// Linear volume.
    pub fn volume(&self) -> f32 {
        self.volume.get()
    }

    /// Set linear volume (clamped to `[0, 1]`, NaN reads as 0).
    pub fn set_volume(&self, volume: f32) {
        self.volume.set(clamp_volume(volume));
    }

    /// Stereo position.
    pub fn pan(&self) -> f32 {
        self.pan.get()
    }

    /// Set stereo position (clamped to `[-1, 1]`, NaN reads as 0).
    pub fn set_pan(&self, pan: f32) {
        self.pan.set(clamp_pan(pan));
    }

    /// Whether the strip is effectively muted.
    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::Acquire)
    }

    /// Apply effective mute (own mute flag or another track's solo).
    pub fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::Release);
    }

    /// Gain the strip applies: 0 when muted or released, otherwise the volume.
    pub fn gain(&self) -> f32 {
        if self.is_muted() || self.is_released() {
            0.0
        } else {
            self.volume()
        }
    }

    /// Whether the strip has been released. The audio thread removes a
    /// released strip, and its voices, at the start of its next block.
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    pub(crate) fn release(&self) {
        self.released.store(true, Ordering::Release);
    }
}

/// Handle for parameter writes on one track strip.
pub type GainHandle = Arc<StripParams>;

struct StripEntry {
    id: StripId,
    params: GainHandle,
}

/// Control-side view of the realtime mix graph.
pub struct MixGraph {
    sample_rate: u32,
    smoothing_ms: f32,
    queue_capacity: usize,
    reserved_slots: usize,
    strips: HashMap<TrackId, StripEntry>,
    next_strip: u32,
    master: Arc<AtomicF32>,
    position: Arc<AtomicU64>,
    stop_generation: Arc<AtomicU64>,
    generation: u64,
    commands: Producer<MixCommand>,
    retired: Consumer<Retired>,
    tap: Consumer<f32>,
}

impl MixGraph {
    /// A graph mixing at `sample_rate`, plus the audio-thread [`Mixer`]
    /// connected to it.
    pub fn new(sample_rate: u32, config: &MixConfig) -> (Self, Mixer) {
        let queue_capacity = config.command_queue_capacity.max(16);
        let (commands, command_rx) = RingBuffer::new(queue_capacity);
        let (retire_tx, retired) = RingBuffer::new(queue_capacity + VOICE_CAPACITY);
        let (tap_tx, tap) = RingBuffer::new(TAP_CAPACITY);
        let master = Arc::new(AtomicF32::new(clamp_volume(config.master_volume)));
        let position = Arc::new(AtomicU64::new(0));
        let stop_generation = Arc::new(AtomicU64::new(0));

        let core = MixCore::new(
            sample_rate,
            config.param_smoothing_ms,
            Arc::clone(&master),
            0,
        );
        let mixer = Mixer::new(
            core,
            MixerLinks {
                commands: command_rx,
                retired: retire_tx,
                tap: tap_tx,
                position: Arc::clone(&position),
                stop_generation: Arc::clone(&stop_generation),
            },
        );
        let graph = Self {
            sample_rate,
            smoothing_ms: config.param_smoothing_ms,
            queue_capacity,
            reserved_slots: queue_capacity / 8 + 1,
            strips: HashMap::new(),
            next_strip: 0,
            master,
            position,
            stop_generation,
            generation: 0,
            commands,
            retired,
            tap,
        };
        (graph, mixer)
    }

    /// Replace the connection to the audio thread with a fresh [`Mixer`]
    /// that already holds every current strip. Used when an output stream
    /// is rebuilt; voices and commands queued for the old mixer are lost.
    pub fn reconnect(&mut self) -> Mixer {
        let (commands, command_rx) = RingBuffer::new(self.queue_capacity);
        let (retire_tx, retired) = RingBuffer::new(self.queue_capacity + VOICE_CAPACITY);
        let (tap_tx, tap) = RingBuffer::new(TAP_CAPACITY);
        self.commands = commands;
        self.retired = retired;
        self.tap = tap;

        let mut core = MixCore::new(
            self.sample_rate,
            self.smoothing_ms,
            Arc::clone(&self.master),
            self.position_frames(),
        );
        let mut entries: Vec<&StripEntry> = self.strips.values().collect();
        entries.sort_by_key(|entry| entry.id);
        for entry in entries {
            core.add_strip(Strip::new(
                entry.id,
                Arc::clone(&entry.params),
                self.sample_rate,
                self.smoothing_ms,
            ));
        }
        Mixer::new(
            core,
            MixerLinks {
                commands: command_rx,
                retired: retire_tx,
                tap: tap_tx,
                position: Arc::clone(&self.position),
                stop_generation: Arc::clone(&self.stop_generation),
            },
        )
    }

    /// Mix sample rate.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Frames the mixer has rendered.
    pub fn position_frames(&self) -> u64 {
        self.position.load(Ordering::Acquire)
    }

    /// Engine time in seconds: frames rendered divided by the sample rate.
    pub fn engine_time(&self) -> f64 {
        self.position_frames() as f64 / f64::from(self.sample_rate)
    }

    /// The strip for `track`, created with the track's current volume, pan
    /// and effective mute if it does not exist yet.
    ///
    /// Returns `None` when a new strip cannot be queued because the audio
    /// thread has stopped draining commands. Nothing is recorded in that
    /// case, so a later call tries again.
    pub fn ensure_track_node(&mut self, track: &Track, any_solo: bool) -> Option<GainHandle> {
        if let Some(entry) = self.strips.get(&track.id) {
            return Some(Arc::clone(&entry.params));
        }

        let id = StripId(self.next_strip);
        let params = Arc::new(StripParams::new(
            track.volume,
            track.pan,
            is_effectively_muted(track, any_solo),
        ));
        let strip = Strip::new(id, Arc::clone(&params), self.sample_rate, self.smoothing_ms);
        if !self.send(MixCommand::AddStrip(strip)) {
            warn!(track_id = %track.id, "mix strip not created, command queue full");
            return None;
        }
        self.next_strip += 1;
        self.strips.insert(
            track.id.clone(),
            StripEntry {
                id,
                params: Arc::clone(&params),
            },
        );
        debug!(track_id = %track.id, "mix strip created");
        Some(params)
    }

    /// Parameter handle for an existing strip.
    pub fn handle(&self, track_id: &TrackId) -> Option<GainHandle> {
        self.strips.get(track_id).map(|entry| Arc::clone(&entry.params))
    }

    /// Whether a strip exists for `track_id`.
    pub fn has_track(&self, track_id: &TrackId) -> bool {
        self.strips.contains_key(track_id)
    }

    /// Number of strips.
    pub fn track_count(&self) -> usize {
        self.strips.len()
    }

    /// Set a strip's volume. Returns `false` if the track has no strip.
    pub fn set_volume(&self, track_id: &TrackId, volume: f32) -> bool {
        self.with_params(track_id, |p| p.set_volume(volume))
    }

    /// Set a strip's pan. Returns `false` if the track has no strip.
    pub fn set_pan(&self, track_id: &TrackId, pan: f32) -> bool {
        self.with_params(track_id, |p| p.set_pan(pan))
    }

    /// Apply effective mute to a strip. Returns `false` if the track has no strip.
    pub fn set_muted(&self, track_id: &TrackId, muted: bool) -> bool {
        self.with_params(track_id, |p| p.set_muted(muted))
    }

    fn with_params(&self, track_id: &TrackId, apply: impl FnOnce(&StripParams)) -> bool {
        match self.strips.get(track_id) {
            Some(entry) => {
                apply(&entry.params);
                true
            }
            None => false,
        }
    }

    /// Drop a track's strip and hard-stop its voices at the next block.
    pub fn release_track(&mut self, track_id: &TrackId) -> bool {
        let Some(entry) = self.strips.remove(track_id) else {
            return false;
        };
        entry.params.release();
        debug!(track_id = %track_id, "mix strip released");
        true
    }

    /// Master bus gain.
    pub fn master_volume(&self) -> f32 {
        self.master.get()
    }

    /// Set master bus gain (clamped to `[0, 1]`).
    pub fn set_master_volume(&self, volume: f32) {
        self.master.set(clamp_volume(volume));
    }

    /// Command slots voices may still take. The rest of the ring stays
    /// free for strips and the metronome.
    pub(crate) fn voice_slots(&self) -> usize {
        self.commands.slots().saturating_sub(self.reserved_slots)
    }

    /// Queue playback of `length` frames of `buffer` from `read_offset`,
    /// sounding at engine frame `start_frame`. Returns `false` when the
    /// track has no strip or the voice could not be queued.
    pub(crate) fn start_voice(
        &mut self,
        track_id: &TrackId,
        buffer: Arc<DecodedBuffer>,
        start_frame: u64,
        read_offset: usize,
        length: usize,
    ) -> bool {
        let Some(entry) = self.strips.get(track_id) else {
            return false;
        };
        let voice = Voice::new(entry.id, buffer, start_frame, read_offset, length);
        self.send(MixCommand::Start {
            voice,
            generation: self.generation,
        })
    }

    /// Hard-stop every voice and the metronome at the next audio block.
    ///
    /// Voices and metronome changes queued before this call are discarded
    /// when they reach the audio thread.
    pub fn stop_all(&mut self) {
        self.generation += 1;
        self.stop_generation.store(self.generation, Ordering::Release);
    }

    pub(crate) fn set_metronome(&mut self, clock: Option<MetronomeClock>) -> bool {
        self.send(MixCommand::Metronome {
            clock,
            generation: self.generation,
        })
    }

    /// Move master-bus samples gathered since the last call into `analyser`.
    pub fn drain_tap(&mut self, analyser: &mut SpectrumAnalyser) {
        let available = self.tap.slots();
        if let Ok(chunk) = self.tap.read_chunk(available) {
            let (first, second) = chunk.as_slices();
            analyser.push_samples(first);
            analyser.push_samples(second);
            chunk.commit_all();
        }
    }

    /// Drop voices and strips the audio thread has finished with.
    pub fn collect_garbage(&mut self) -> usize {
        let mut count = 0;
        while let Ok(item) = self.retired.pop() {
            match item {
                Retired::Voice(voice) => drop(voice),
                Retired::Strip(strip) => drop(strip),
            }
            count += 1;
        }
        count
    }

    fn send(&mut self, command: MixCommand) -> bool {
        self.collect_garbage();
        if self.commands.push(command).is_err() {
            warn!("mix command queue full, command dropped");
            return false;
        }
        true
    }
}

impl std::fmt::Debug for MixGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MixGraph")
            .field("sample_rate", &self.sample_rate)
            .field("tracks", &self.strips.len())
            .field("position", &self.position_frames())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph() -> (MixGraph, Mixer) {
        graph_with_queue(MixConfig::default().command_queue_capacity)
    }

    fn graph_with_queue(command_queue_capacity: usize) -> (MixGraph, Mixer) {
        MixGraph::new(
            48_000,
            &MixConfig {
                master_volume: 1.0,
                param_smoothing_ms: 0.0,
                command_queue_capacity,
                ..MixConfig::default()
            },
        )
    }

    /// A track at unity gain; `Track::new` starts below it.
    fn unity(id: &str) -> Track {
        let mut track = Track::new(id, "Vox");
        track.volume = 1.0;
        track
    }

    fn ones(frames: usize) -> Arc<DecodedBuffer> {
        Arc::new(DecodedBuffer::mono(48_000, vec![1.0; frames]).unwrap())
    }

    /// Queue long voices on `track` until the ring refuses one.
    fn fill_queue(graph: &mut MixGraph, track: &TrackId) -> usize {
        let mut queued = 0;
        while graph.start_voice(track, ones(10_000), 0, 0, 10_000) {
            queued += 1;
            assert!(queued <= 1024, "queue never filled");
        }
        queued
    }

    #[test]
    fn params_clamp() {
        let p = StripParams::new(3.0, -7.0, false);
        assert_eq!(p.volume(), 1.0);
        assert_eq!(p.pan(), -1.0);
        p.set_volume(f32::NAN);
        assert_eq!(p.volume(), 0.0);
        p.set_volume(0.4);
        p.set_muted(true);
        assert_eq!(p.gain(), 0.0);
        p.set_muted(false);
        assert_eq!(p.gain(), 0.4);
        p.release();
        assert_eq!(p.gain(), 0.0);
    }

    #[test]
    fn params_match_track_ranges() {
        for value in [-2.0, -0.5, 0.25, 1.5, f32::NAN] {
            let p = StripParams::new(value, value, false);
            assert_eq!(p.volume().to_bits(), clamp_volume(value).to_bits());
            assert_eq!(p.pan().to_bits(), clamp_pan(value).to_bits());
        }
    }

    #[test]
    fn nodes_are_created_once() {
        let (mut graph, _mixer) = graph();
        let track = Track::new("t1", "Vox");
        let a = graph.ensure_track_node(&track, false).unwrap();
        let b = graph.ensure_track_node(&track, false).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(graph.track_count(), 1);
        assert_eq!(a.volume(), 0.8);
    }

    #[test]
    fn solo_elsewhere_creates_muted_strip() {
        let (mut graph, _mixer) = graph();
        let handle = graph
            .ensure_track_node(&Track::new("t1", "Vox"), true)
            .unwrap();
        assert!(handle.is_muted());
    }

    #[test]
    fn setters_report_missing_tracks() {
        let (mut graph, _mixer) = graph();
        let id = TrackId::new("t1");
        assert!(!graph.set_volume(&id, 0.5));
        graph.ensure_track_node(&Track::new("t1", "Vox"), false);
        assert!(graph.set_volume(&id, 0.5));
        assert!(graph.set_pan(&id, 0.25));
        assert_eq!(graph.handle(&id).unwrap().volume(), 0.5);
    }

    #[test]
    fn voices_play_through_mixer() {
        let (mut graph, mut mixer) = graph();
        let track = unity("t1");
        graph.ensure_track_node(&track, false);
        graph.set_pan(&track.id, -1.0);
        assert!(graph.start_voice(&track.id, ones(64), 0, 0, 64));

        let mut out = vec![0.0; 128];
        mixer.process(&mut out, 2);
        assert_eq!(out[0], 1.0);
        assert_eq!(out[1], 0.0);
        assert_eq!(graph.position_frames(), 64);
        assert!((graph.engine_time() - 64.0 / 48_000.0).abs() < 1e-12);
    }

    #[test]
    fn default_volume_scales_voices() {
        let (mut graph, mut mixer) = graph();
        let track = Track::new("t1", "Vox");
        graph.ensure_track_node(&track, false);
        graph.set_pan(&track.id, -1.0);
        graph.start_voice(&track.id, ones(64), 0, 0, 64);

        let mut out = vec![0.0; 16];
        mixer.process(&mut out, 2);
        assert!((out[0] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn stop_all_silences_next_block() {
        let (mut graph, mut mixer) = graph();
        let track = unity("t1");
        graph.ensure_track_node(&track, false);
        graph.start_voice(&track.id, ones(10_000), 0, 0, 10_000);

        let mut out = vec![0.0; 64];
        mixer.process(&mut out, 2);
        assert!(out.iter().any(|&s| s != 0.0));

        graph.stop_all();
        mixer.process(&mut out, 2);
        assert!(out.iter().all(|&s| s == 0.0));
        assert_eq!(graph.collect_garbage(), 1);
    }

    #[test]
    fn stop_all_works_with_a_full_queue() {
        let (mut graph, mut mixer) = graph_with_queue(16);
        let track = unity("t1");
        graph.ensure_track_node(&track, false);
        graph.start_voice(&track.id, ones(10_000), 0, 0, 10_000);
        let mut out = vec![0.0; 64];
        mixer.process(&mut out, 2);
        assert!(out.iter().any(|&s| s != 0.0));

        fill_queue(&mut graph, &track.id);
        graph.stop_all();
        mixer.process(&mut out, 2);
        assert!(out.iter().all(|&s| s == 0.0));

        // Voices queued after the stop still play.
        let now = graph.position_frames();
        assert!(graph.start_voice(&track.id, ones(64), now, 0, 64));
        mixer.process(&mut out, 2);
        assert!(out.iter().any(|&s| s != 0.0));
    }

    #[test]
    fn metronome_queued_before_stop_is_discarded() {
        let (mut graph, mut mixer) = graph();
        assert!(graph.set_metronome(Some(MetronomeClock {
            metronome: crate::Metronome::new(48_000, 120.0),
            engine_anchor: 0,
            project_anchor: 0,
        })));
        graph.stop_all();
        let mut out = vec![0.0; 256];
        mixer.process(&mut out, 2);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn full_queue_does_not_leave_a_phantom_strip() {
        let (mut graph, mut mixer) = graph_with_queue(16);
        let first = unity("t1");
        graph.ensure_track_node(&first, false);
        fill_queue(&mut graph, &first.id);

        let second = unity("t2");
        assert!(graph.ensure_track_node(&second, false).is_none());
        assert!(!graph.has_track(&second.id));

        let mut out = vec![0.0; 64];
        mixer.process(&mut out, 2);
        graph.set_muted(&first.id, true);
        assert!(graph.ensure_track_node(&second, false).is_some());
        graph.set_pan(&second.id, 1.0);
        let now = graph.position_frames();
        assert!(graph.start_voice(&second.id, ones(64), now, 0, 64));
        mixer.process(&mut out, 2);
        assert_eq!(out[1], 1.0);
    }

    #[test]
    fn voice_slots_keep_room_for_strips() {
        let (mut graph, _mixer) = graph_with_queue(16);
        let track = unity("t1");
        graph.ensure_track_node(&track, false);
        let free = graph.voice_slots();
        assert!(free > 0);
        for _ in 0..free {
            assert!(graph.start_voice(&track.id, ones(8), 0, 0, 8));
        }
        assert_eq!(graph.voice_slots(), 0);
        assert!(graph.ensure_track_node(&unity("t2"), false).is_some());
    }

    #[test]
    fn release_stops_track() {
        let (mut graph, mut mixer) = graph();
        let track = unity("t1");
        graph.ensure_track_node(&track, false);
        graph.start_voice(&track.id, ones(10_000), 0, 0, 10_000);
        assert!(graph.release_track(&track.id));
        assert!(!graph.release_track(&track.id));
        assert!(!graph.start_voice(&track.id, ones(10), 0, 0, 10));

        let mut out = vec![0.0; 64];
        mixer.process(&mut out, 2);
        assert!(out.iter().all(|&s| s == 0.0));
        // The voice that was already queued and the strip itself.
        assert_eq!(graph.collect_garbage(), 2);
    }

    #[test]
    fn release_works_with_a_full_queue() {
        let (mut graph, mut mixer) = graph_with_queue(16);
        let track = unity("t1");
        graph.ensure_track_node(&track, false);
        graph.start_voice(&track.id, ones(10_000), 0, 0, 10_000);
        let mut out = vec![0.0; 64];
        mixer.process(&mut out, 2);

        fill_queue(&mut graph, &track.id);
        assert!(graph.release_track(&track.id));
        mixer.process(&mut out, 2);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn master_volume_scales_output() {
        let (mut graph, mut mixer) = graph();
        let track = unity("t1");
        graph.ensure_track_node(&track, false);
        graph.set_pan(&track.id, -1.0);
        graph.set_master_volume(0.5);
        graph.start_voice(&track.id, ones(64), 0, 0, 64);

        let mut out = vec![0.0; 16];
        mixer.process(&mut out, 2);
        assert_eq!(out[0], 0.5);
    }

    #[test]
    fn mono_output_downmixes() {
        let (mut graph, mut mixer) = graph();
        let track = unity("t1");
        graph.ensure_track_node(&track, false);
        graph.set_pan(&track.id, -1.0);
        graph.start_voice(&track.id, ones(64), 0, 0, 64);

        let mut out = vec![0.0; 8];
        mixer.process(&mut out, 1);
        assert_eq!(out[0], 0.5);
    }

    #[test]
    fn reconnect_keeps_strips_and_position() {
        let (mut graph, mut old) = graph();
        let track = unity("t1");
        graph.ensure_track_node(&track, false);
        graph.set_pan(&track.id, -1.0);
        let mut out = vec![0.0; 64];
        old.process(&mut out, 2);

        let mut mixer = graph.reconnect();
        graph.start_voice(&track.id, ones(64), 32, 0, 64);
        mixer.process(&mut out, 2);
        assert_eq!(out[0], 1.0);
        assert_eq!(graph.position_frames(), 64);
    }

    #[test]
    fn tap_feeds_analyser() {
        let (mut graph, mut mixer) = graph();
        let track = Track::new("t1", "Vox");
        graph.ensure_track_node(&track, false);
        let tone: Vec<f32> = (0..512)
            .map(|i| 0.01 * (i as f32 * std::f32::consts::TAU * 16.0 / 256.0).sin())
            .collect();
        let buffer = Arc::new(DecodedBuffer::mono(48_000, tone).unwrap());
        graph.start_voice(&track.id, buffer, 0, 0, 512);

        let mut out = vec![0.0; 1024];
        mixer.process(&mut out, 2);

        let mut analyser = SpectrumAnalyser::new(Default::default());
        graph.drain_tap(&mut analyser);
        assert!(analyser.byte_frequency_data().iter().any(|&b| b > 0));
    }
}
