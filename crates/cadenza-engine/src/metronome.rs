//! Click track.
//!
//! Clicks sit on the project's beat grid (beat `k` at `k * 60 / bpm` seconds),
//! 4/4 with an accent on the first beat of each bar. Each click is a sine
//! burst starting at 0.3 and decaying exponentially to 0.001 over 100 ms.
//! Output is a pure function of the project frame, so realtime playback,
//! seeks and offline renders all land clicks on the same samples.

use std::f64::consts::TAU;

const BEATS_PER_BAR: u64 = 4;
const ACCENT_HZ: f64 = 1000.0;
const BEAT_HZ: f64 = 800.0;
const START_GAIN: f64 = 0.3;
const END_GAIN: f64 = 0.001;
const CLICK_SECS: f64 = 0.1;

/// Tempo range accepted by [`Metronome::new`].
pub const BPM_RANGE: std::ops::RangeInclusive<f64> = 20.0..=300.0;

/// Click generator for one tempo and sample rate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Metronome {
    sample_rate: f64,
    bpm: f64,
    beat_frames: f64,
    click_frames: f64,
    decay_per_sec: f64,
}

impl Metronome {
    /// A metronome at `bpm` (clamped to [`BPM_RANGE`]; non-finite reads as 120).
    pub fn new(sample_rate: u32, bpm: f64) -> Self {
        let bpm = if bpm.is_finite() {
            bpm.clamp(*BPM_RANGE.start(), *BPM_RANGE.end())
        } else {
            120.0
        };
        let sample_rate = f64::from(sample_rate.max(1));
        Self {
            sample_rate,
            bpm,
            beat_frames: 60.0 / bpm * sample_rate,
            click_frames: CLICK_SECS * sample_rate,
            decay_per_sec: libm::log(START_GAIN / END_GAIN) / CLICK_SECS,
        }
    }

    /// Effective tempo.
    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    /// Click sample at `frame` frames from project time zero.
    pub fn sample_at(&self, frame: u64) -> f32 {
        let n = frame as f64;
        let beat = (n / self.beat_frames).floor();
        let since = n - (beat * self.beat_frames).floor();
        if since >= self.click_frames {
            return 0.0;
        }
        let t = since / self.sample_rate;
        let freq = if (beat as u64) % BEATS_PER_BAR == 0 {
            ACCENT_HZ
        } else {
            BEAT_HZ
        };
        (START_GAIN * libm::exp(-self.decay_per_sec * t) * libm::sin(TAU * freq * t)) as f32
    }

    /// Add clicks for project frames `start..start + left.len()`.
    pub fn mix_into(&self, start: u64, left: &mut [f32], right: &mut [f32]) {
        for (i, (l, r)) in left.iter_mut().zip(right.iter_mut()).enumerate() {
            let click = self.sample_at(start + i as u64);
            *l += click;
            *r += click;
        }
    }
}

/// A metronome pinned to the transport: engine frame `engine_anchor`
/// corresponds to project frame `project_anchor`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetronomeClock {
    /// The click generator.
    pub metronome: Metronome,
    /// Engine frame at which playback started.
    pub engine_anchor: u64,
    /// Project frame playing at `engine_anchor`.
    pub project_anchor: u64,
}

impl MetronomeClock {
    /// Add clicks for the engine frames starting at `engine_frame`.
    pub fn mix_into(&self, engine_frame: u64, left: &mut [f32], right: &mut [f32]) {
        let len = left.len().min(right.len());
        // Frames before the anchor belong to the previous transport run.
        let skip = usize::try_from(self.engine_anchor.saturating_sub(engine_frame))
            .unwrap_or(usize::MAX)
            .min(len);
        if skip == len {
            return;
        }
        let project_start = (engine_frame + skip as u64 - self.engine_anchor) + self.project_anchor;
        self.metronome
            .mix_into(project_start, &mut left[skip..len], &mut right[skip..len]);
    }
}
