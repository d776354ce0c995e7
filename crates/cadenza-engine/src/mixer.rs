//! Audio-thread side of the mix graph.
//!
//! [`MixCore`] is the summing engine shared by realtime playback and the
//! offline renderer: per-track strips (gain, then pan) feeding a master bus
//! with its own gain, plus an optional metronome after the master stage.
//! [`Mixer`] wraps a core with the lock-free rings that connect it to
//! [`MixGraph`](crate::MixGraph) and is what the output callback owns.
//!
//! Nothing here allocates, locks or logs once constructed. Buffers of
//! finished voices and released strips are handed back to the control side
//! through the retire ring so deallocation happens off the audio thread.
//!
//! Hard stops and strip releases do not use the command ring. A stop bumps
//! a shared generation counter the mixer reads before every callback, and
//! a release flags the strip's [`StripParams`]. Both therefore take effect
//! on the next block even when the ring is full. Commands queued before a
//! stop carry the old generation and are discarded on arrival.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use rtrb::{Consumer, Producer};

use cadenza_core::{PanLaw, SmoothedParam};
use cadenza_io::DecodedBuffer;

use crate::metronome::MetronomeClock;
use crate::mix::{AtomicF32, StripParams};

/// Largest block rendered in one pass; longer callbacks are split.
pub(crate) const MAX_BLOCK: usize = 1024;
/// Voices the core holds without reallocating.
pub(crate) const VOICE_CAPACITY: usize = 256;
/// Strips the core holds without reallocating.
pub(crate) const STRIP_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct StripId(pub(crate) u32);

/// One scheduled clip playback.
pub(crate) struct Voice {
    strip: StripId,
    buffer: Arc<DecodedBuffer>,
    /// Engine frame of the first sounding sample.
    start_frame: u64,
    /// Next buffer frame to read.
    position: usize,
    /// One past the last buffer frame to read.
    end: usize,
}

impl Voice {
    /// Reads are clamped to the buffer: a region running past the end of
    /// the decoded audio simply finishes early.
    pub(crate) fn new(
        strip: StripId,
        buffer: Arc<DecodedBuffer>,
        start_frame: u64,
        read_offset: usize,
        length: usize,
    ) -> Self {
        let frames = buffer.frames();
        let position = read_offset.min(frames);
        let end = position.saturating_add(length).min(frames);
        Self {
            strip,
            buffer,
            start_frame,
            position,
            end,
        }
    }
}

/// Gain and pan stage for one track, with scratch accumulators.
pub(crate) struct Strip {
    id: StripId,
    params: Arc<StripParams>,
    gain: SmoothedParam,
    pan: SmoothedParam,
    law: PanLaw,
    mono: Vec<f32>,
    left: Vec<f32>,
    right: Vec<f32>,
    has_mono: bool,
    has_stereo: bool,
}

impl Strip {
    /// A strip whose smoothing starts settled at the current parameters.
    /// Allocates; build it on the control side.
    pub(crate) fn new(
        id: StripId,
        params: Arc<StripParams>,
        sample_rate: u32,
        smoothing_ms: f32,
    ) -> Self {
        let rate = sample_rate as f32;
        let pan = params.pan();
        Self {
            id,
            gain: SmoothedParam::with_config(params.gain(), rate, smoothing_ms),
            pan: SmoothedParam::with_config(pan, rate, smoothing_ms),
            law: PanLaw::new(pan),
            params,
            mono: vec![0.0; MAX_BLOCK],
            left: vec![0.0; MAX_BLOCK],
            right: vec![0.0; MAX_BLOCK],
            has_mono: false,
            has_stereo: false,
        }
    }

    fn clear(&mut self, n: usize) {
        if self.has_mono {
            self.mono[..n].fill(0.0);
        }
        if self.has_stereo {
            self.left[..n].fill(0.0);
            self.right[..n].fill(0.0);
        }
        self.has_mono = false;
        self.has_stereo = false;
    }

    /// Add the part of `voice` that falls in this block. Returns `true`
    /// once the voice has nothing left to play.
    fn accumulate(&mut self, voice: &mut Voice, block_start: u64, n: usize) -> bool {
        let block_end = block_start + n as u64;
        if voice.start_frame >= block_end {
            return false;
        }
        let first = voice.start_frame.saturating_sub(block_start) as usize;
        let count = (n - first).min(voice.end - voice.position);
        let src = voice.position..voice.position + count;
        let dst = first..first + count;

        match voice.buffer.channels() {
            [mono] => {
                add(&mut self.mono[dst], &mono[src]);
                self.has_mono = true;
            }
            [left, right, ..] => {
                add(&mut self.left[dst.clone()], &left[src.clone()]);
                add(&mut self.right[dst], &right[src]);
                self.has_stereo = true;
            }
            [] => {}
        }

        voice.position += count;
        voice.position >= voice.end
    }

    /// Apply gain and pan and sum into the bus.
    fn mix_into(&mut self, out_l: &mut [f32], out_r: &mut [f32]) {
        self.gain.set_target(self.params.gain());
        self.pan.set_target(self.params.pan());

        if !self.has_mono && !self.has_stereo {
            self.gain.snap_to_target();
            self.pan.snap_to_target();
            if self.pan.get() != self.law.pan() {
                self.law = PanLaw::new(self.pan.get());
            }
            return;
        }

        for (i, (l_out, r_out)) in out_l.iter_mut().zip(out_r.iter_mut()).enumerate() {
            let g = self.gain.advance();
            let p = self.pan.advance();
            if p != self.law.pan() {
                self.law = PanLaw::new(p);
            }
            // Mono material joins a stereo bus as L = R = m.
            let (l, r) = if self.has_stereo {
                let m = if self.has_mono { self.mono[i] } else { 0.0 };
                self.law.apply_stereo(self.left[i] + m, self.right[i] + m)
            } else {
                self.law.apply_mono(self.mono[i])
            };
            *l_out += l * g;
            *r_out += r * g;
        }
    }
}

#[inline]
fn add(dst: &mut [f32], src: &[f32]) {
    for (d, s) in dst.iter_mut().zip(src) {
        *d += s;
    }
}

/// Commands from [`MixGraph`](crate::MixGraph) to the audio thread.
///
/// Transport-bound commands carry the stop generation they were issued in.
pub(crate) enum MixCommand {
    AddStrip(Strip),
    Start {
        voice: Voice,
        generation: u64,
    },
    Metronome {
        clock: Option<MetronomeClock>,
        generation: u64,
    },
}

/// Objects sent back for deallocation on the control side.
pub(crate) enum Retired {
    Voice(Voice),
    Strip(Strip),
}

/// Strips, voices and the master bus.
pub(crate) struct MixCore {
    strips: Vec<Strip>,
    removed: Vec<Strip>,
    voices: Vec<Voice>,
    finished: Vec<Voice>,
    master: Arc<AtomicF32>,
    master_gain: SmoothedParam,
    metronome: Option<MetronomeClock>,
    left: Vec<f32>,
    right: Vec<f32>,
    position: u64,
}

impl MixCore {
    pub(crate) fn new(
        sample_rate: u32,
        smoothing_ms: f32,
        master: Arc<AtomicF32>,
        position: u64,
    ) -> Self {
        Self {
            strips: Vec::with_capacity(STRIP_CAPACITY),
            removed: Vec::with_capacity(STRIP_CAPACITY),
            voices: Vec::with_capacity(VOICE_CAPACITY),
            finished: Vec::with_capacity(VOICE_CAPACITY),
            master_gain: SmoothedParam::with_config(
                master.get(),
                sample_rate as f32,
                smoothing_ms,
            ),
            master,
            metronome: None,
            left: vec![0.0; MAX_BLOCK],
            right: vec![0.0; MAX_BLOCK],
            position,
        }
    }

    /// Frames rendered so far.
    pub(crate) fn position(&self) -> u64 {
        self.position
    }

    #[cfg(test)]
    pub(crate) fn voice_count(&self) -> usize {
        self.voices.len()
    }

    pub(crate) fn add_strip(&mut self, strip: Strip) {
        self.strips.push(strip);
    }

    /// Drop strips whose parameters were released, with their voices.
    fn remove_released(&mut self) {
        let mut i = 0;
        while i < self.strips.len() {
            if self.strips[i].params.is_released() {
                let id = self.strips[i].id;
                if let Some(strip) = self.remove_strip(id) {
                    self.removed.push(strip);
                }
            } else {
                i += 1;
            }
        }
    }

    /// Remove a strip; its voices move to the finished list.
    pub(crate) fn remove_strip(&mut self, id: StripId) -> Option<Strip> {
        let index = self.strips.iter().position(|s| s.id == id)?;
        let mut i = 0;
        while i < self.voices.len() {
            if self.voices[i].strip == id {
                self.finished.push(self.voices.swap_remove(i));
            } else {
                i += 1;
            }
        }
        Some(self.strips.remove(index))
    }

    /// Start a voice. A voice whose start frame has already passed skips
    /// the frames it missed so it stays aligned with the transport.
    pub(crate) fn start_voice(&mut self, mut voice: Voice) {
        if !self.strips.iter().any(|s| s.id == voice.strip) {
            self.finished.push(voice);
            return;
        }
        let late = self.position.saturating_sub(voice.start_frame);
        if late > 0 {
            let skip = usize::try_from(late).unwrap_or(usize::MAX);
            voice.position = voice.position.saturating_add(skip).min(voice.end);
            voice.start_frame = self.position;
        }
        self.voices.push(voice);
    }

    pub(crate) fn stop_all(&mut self) {
        self.finished.append(&mut self.voices);
    }

    /// Hand a voice that will never play straight to the finished list.
    pub(crate) fn discard_voice(&mut self, voice: Voice) {
        self.finished.push(voice);
    }

    pub(crate) fn set_metronome(&mut self, clock: Option<MetronomeClock>) {
        self.metronome = clock;
    }

    /// Voices that ended since the last drain.
    pub(crate) fn drain_finished(&mut self) -> std::vec::Drain<'_, Voice> {
        self.finished.drain(..)
    }

    /// Strips released since the last drain.
    pub(crate) fn drain_removed(&mut self) -> std::vec::Drain<'_, Strip> {
        self.removed.drain(..)
    }

    /// Render up to [`MAX_BLOCK`] frames and advance the position.
    ///
    /// `tap` receives the mono master signal before the metronome is added.
    pub(crate) fn render(
        &mut self,
        frames: usize,
        tap: Option<&mut Producer<f32>>,
    ) -> (&[f32], &[f32]) {
        let n = frames.min(MAX_BLOCK);
        let start = self.position;

        self.remove_released();

        for strip in &mut self.strips {
            strip.clear(n);
        }

        let strips = &mut self.strips;
        let mut i = 0;
        while i < self.voices.len() {
            let voice = &mut self.voices[i];
            let done = match strips.iter_mut().find(|s| s.id == voice.strip) {
                Some(strip) => strip.accumulate(voice, start, n),
                None => true,
            };
            if done {
                self.finished.push(self.voices.swap_remove(i));
            } else {
                i += 1;
            }
        }

        let left = &mut self.left[..n];
        let right = &mut self.right[..n];
        left.fill(0.0);
        right.fill(0.0);
        for strip in strips.iter_mut() {
            strip.mix_into(left, right);
        }

        self.master_gain.set_target(self.master.get());
        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            let g = self.master_gain.advance();
            *l *= g;
            *r *= g;
        }

        if let Some(tap) = tap {
            for (l, r) in left.iter().zip(right.iter()) {
                // A full tap only means nobody is reading the meter.
                let _ = tap.push(0.5 * (l + r));
            }
        }

        if let Some(clock) = &self.metronome {
            clock.mix_into(start, left, right);
        }

        self.position += n as u64;
        (&self.left[..n], &self.right[..n])
    }
}

/// Realtime mixer owned by the output stream callback.
pub struct Mixer {
    core: MixCore,
    commands: Consumer<MixCommand>,
    retired: Producer<Retired>,
    tap: Producer<f32>,
    position: Arc<AtomicU64>,
    stop_generation: Arc<AtomicU64>,
    generation: u64,
}

/// Rings and counters a [`Mixer`] shares with its graph.
pub(crate) struct MixerLinks {
    pub(crate) commands: Consumer<MixCommand>,
    pub(crate) retired: Producer<Retired>,
    pub(crate) tap: Producer<f32>,
    pub(crate) position: Arc<AtomicU64>,
    pub(crate) stop_generation: Arc<AtomicU64>,
}

impl Mixer {
    pub(crate) fn new(core: MixCore, links: MixerLinks) -> Self {
        let generation = links.stop_generation.load(Ordering::Acquire);
        Self {
            core,
            commands: links.commands,
            retired: links.retired,
            tap: links.tap,
            position: links.position,
            stop_generation: links.stop_generation,
            generation,
        }
    }

    /// Fill one interleaved output buffer of `channels` channels.
    ///
    /// Mono outputs receive `(L + R) / 2`; channels beyond the second are
    /// silent.
    pub fn process(&mut self, out: &mut [f32], channels: usize) {
        self.observe_stop(self.stop_generation.load(Ordering::Acquire));
        self.apply_commands();

        let channels = channels.max(1);
        let frames = out.len() / channels;
        let mut done = 0;
        while done < frames {
            let n = (frames - done).min(MAX_BLOCK);
            let (left, right) = self.core.render(n, Some(&mut self.tap));
            let block = &mut out[done * channels..(done + n) * channels];
            for ((frame, l), r) in block.chunks_exact_mut(channels).zip(left).zip(right) {
                match frame {
                    [m] => *m = 0.5 * (l + r),
                    [a, b, rest @ ..] => {
                        *a = *l;
                        *b = *r;
                        rest.fill(0.0);
                    }
                    [] => {}
                }
            }
            done += n;
            self.retire_finished();
        }
        out[frames * channels..].fill(0.0);

        self.position.store(self.core.position(), Ordering::Release);
    }

    /// Catch up with stops issued on the control side.
    fn observe_stop(&mut self, generation: u64) {
        if generation > self.generation {
            self.core.stop_all();
            self.core.set_metronome(None);
            self.generation = generation;
        }
    }

    fn apply_commands(&mut self) {
        while let Ok(command) = self.commands.pop() {
            match command {
                MixCommand::AddStrip(strip) => self.core.add_strip(strip),
                MixCommand::Start { voice, generation } => {
                    self.observe_stop(generation);
                    if generation == self.generation {
                        self.core.start_voice(voice);
                    } else {
                        self.core.discard_voice(voice);
                    }
                }
                MixCommand::Metronome { clock, generation } => {
                    self.observe_stop(generation);
                    if generation == self.generation {
                        self.core.set_metronome(clock);
                    }
                }
            }
        }
        self.retire_finished();
    }

    fn retire_finished(&mut self) {
        // If the ring is full the item is dropped here instead.
        for voice in self.core.drain_finished() {
            let _ = self.retired.push(Retired::Voice(voice));
        }
        for strip in self.core.drain_removed() {
            let _ = self.retired.push(Retired::Strip(strip));
        }
    }
}
