//! Offline mixdown to 16-bit PCM WAV.
//!
//! The renderer drives the same [`MixCore`] the output callback uses, on a
//! virtual clock, so a render matches live playback sample for sample apart
//! from parameter smoothing (parameters start settled offline). Clips are
//! scheduled from project time zero with the same offset math as playback.
//! Effectively muted tracks are left out entirely.
//!
//! Rendering is deterministic: identical inputs produce identical bytes.

use std::sync::Arc;

use tracing::{debug, info, warn};

use cadenza_config::RenderConfig;
use cadenza_core::{
    AudioClip, Project, StereoSamples, Track, any_solo, clamp_volume, is_effectively_muted,
    seconds_to_frames,
};
use cadenza_io::{DecodedBuffer, encode_wav_pcm16, max_pcm16_frames};

use crate::buffer_cache::BufferCache;
use crate::error::RenderError;
use crate::metronome::{Metronome, MetronomeClock};
use crate::mix::{AtomicF32, StripParams};
use crate::mixer::{MAX_BLOCK, MixCore, Strip, StripId, Voice};
use crate::scheduler::plan_clip;

/// Progress callback: `(frames_done, frames_total)`.
pub type RenderProgress = Box<dyn FnMut(u64, u64) + Send>;

/// Output format and mix settings for a render.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderOptions {
    /// Output rate in Hz.
    pub sample_rate: u32,
    /// Output channels, 1 or 2. Mono is `(L + R) / 2`.
    pub channels: u16,
    /// Frames mixed per virtual clock tick.
    pub block_size: usize,
    /// Master gain applied to the mix.
    pub master_volume: f32,
    /// Tempo of a click track mixed into the output, if any.
    pub metronome: Option<f64>,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            channels: 2,
            block_size: 512,
            master_volume: 1.0,
            metronome: None,
        }
    }
}

impl From<&RenderConfig> for RenderOptions {
    fn from(config: &RenderConfig) -> Self {
        Self {
            sample_rate: config.sample_rate,
            channels: config.channels,
            block_size: config.block_size,
            ..Self::default()
        }
    }
}

impl RenderOptions {
    fn validate(&self) -> Result<(), RenderError> {
        if self.sample_rate == 0 {
            return Err(RenderError::InvalidFormat("sample rate must be positive".into()));
        }
        if !matches!(self.channels, 1 | 2) {
            return Err(RenderError::InvalidFormat(format!(
                "{} channels requested, only mono and stereo are supported",
                self.channels
            )));
        }
        if self.block_size == 0 {
            return Err(RenderError::InvalidFormat("block size must be positive".into()));
        }
        Ok(())
    }

    /// Frames covering `duration` seconds, or why that cannot be rendered.
    pub fn frames_for(&self, duration: f64) -> Result<u64, RenderError> {
        self.validate()?;
        let invalid = |reason| RenderError::InvalidDuration {
            seconds: duration,
            reason,
        };
        if !duration.is_finite() || duration <= 0.0 {
            return Err(invalid("must be positive and finite"));
        }
        let frames = seconds_to_frames(duration, self.sample_rate);
        if frames == 0 {
            return Err(invalid("shorter than one frame"));
        }
        if frames > max_pcm16_frames(self.channels) {
            return Err(invalid("too long for a WAV file"));
        }
        Ok(frames)
    }
}

/// One audible track with its decoded clips.
struct RenderTrack {
    volume: f32,
    pan: f32,
    clips: Vec<(AudioClip, Arc<DecodedBuffer>)>,
}

/// Renders tracks to WAV, decoding clips at the render rate.
#[derive(Debug, Clone)]
pub struct OfflineRenderer {
    cache: BufferCache,
    options: RenderOptions,
}

impl OfflineRenderer {
    /// A renderer with its own clip cache.
    pub fn new(options: RenderOptions) -> Self {
        Self {
            cache: BufferCache::new(options.sample_rate),
            options,
        }
    }

    /// A renderer decoding through `cache`'s fetcher. Buffers are shared
    /// with `cache` when the rates match.
    pub fn with_cache(cache: &BufferCache, options: RenderOptions) -> Self {
        Self {
            cache: cache.at_rate(options.sample_rate),
            options,
        }
    }

    /// Current options.
    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    /// Replace the options, keeping decoded clips when the rate is unchanged.
    pub fn set_options(&mut self, options: RenderOptions) {
        self.cache = self.cache.at_rate(options.sample_rate);
        self.options = options;
    }

    /// Render `duration` seconds of `tracks` into a WAV file.
    pub async fn render(&self, tracks: &[Track], duration: f64) -> Result<Vec<u8>, RenderError> {
        self.render_with_progress(tracks, duration, Box::new(|_, _| {})).await
    }

    /// [`render`](Self::render), reporting progress after every block.
    pub async fn render_with_progress(
        &self,
        tracks: &[Track],
        duration: f64,
        progress: RenderProgress,
    ) -> Result<Vec<u8>, RenderError> {
        let samples = self.render_block_with_progress(tracks, duration, progress).await?;
        let channels = self.options.channels;
        let sample_rate = self.options.sample_rate;
        let bytes = tokio::task::spawn_blocking(move || {
            encode_wav_pcm16(&samples.to_channels(channels), channels, sample_rate)
        })
        .await
        .map_err(|e| RenderError::Task(e.to_string()))??;
        info!(
            bytes = bytes.len(),
            duration,
            sample_rate,
            channels,
            "render complete"
        );
        Ok(bytes)
    }

    /// Render `duration` seconds of `tracks` to stereo samples.
    pub async fn render_block(
        &self,
        tracks: &[Track],
        duration: f64,
    ) -> Result<StereoSamples, RenderError> {
        self.render_block_with_progress(tracks, duration, Box::new(|_, _| {})).await
    }

    async fn render_block_with_progress(
        &self,
        tracks: &[Track],
        duration: f64,
        progress: RenderProgress,
    ) -> Result<StereoSamples, RenderError> {
        let frames = self.options.frames_for(duration)?;
        let audible = self.load(tracks).await;
        let options = self.options.clone();
        debug!(frames, tracks = audible.len(), "rendering");
        tokio::task::spawn_blocking(move || mix_offline(&audible, frames, &options, progress))
            .await
            .map_err(|e| RenderError::Task(e.to_string()))
    }

    /// Render the whole project: `max(timeline end, 30 s)`.
    pub async fn export_project(&self, project: &Project) -> Result<Vec<u8>, RenderError> {
        self.render(&project.tracks, project.export_duration()).await
    }

    async fn load(&self, tracks: &[Track]) -> Vec<RenderTrack> {
        let solo = any_solo(tracks);
        let mut audible = Vec::new();
        for track in tracks.iter().filter(|t| !is_effectively_muted(t, solo)) {
            let mut clips = Vec::with_capacity(track.clips.len());
            for clip in &track.clips {
                match self.cache.decode(&clip.id, &clip.source).await {
                    Ok(buffer) => clips.push((clip.clone(), buffer)),
                    Err(err) => {
                        warn!(
                            clip_id = %clip.id,
                            track_id = %track.id,
                            error = %err,
                            "clip left out of render"
                        );
                    }
                }
            }
            audible.push(RenderTrack {
                volume: track.volume,
                pan: track.pan,
                clips,
            });
        }
        audible
    }
}

fn mix_offline(
    tracks: &[RenderTrack],
    frames: u64,
    options: &RenderOptions,
    mut progress: RenderProgress,
) -> StereoSamples {
    let rate = options.sample_rate;
    let master = Arc::new(AtomicF32::new(clamp_volume(options.master_volume)));
    let mut core = MixCore::new(rate, 0.0, master, 0);

    for (index, track) in tracks.iter().enumerate() {
        let id = StripId(u32::try_from(index).unwrap_or(u32::MAX));
        let params = Arc::new(StripParams::new(track.volume, track.pan, false));
        core.add_strip(Strip::new(id, params, rate, 0.0));
        for (clip, buffer) in &track.clips {
            let Some(timing) = plan_clip(clip, 0.0) else {
                continue;
            };
            let at = timing.to_frames(rate);
            core.start_voice(Voice::new(
                id,
                Arc::clone(buffer),
                at.delay,
                at.read_offset,
                at.length,
            ));
        }
    }
    if let Some(bpm) = options.metronome {
        core.set_metronome(Some(MetronomeClock {
            metronome: Metronome::new(rate, bpm),
            engine_anchor: 0,
            project_anchor: 0,
        }));
    }

    let total = usize::try_from(frames).unwrap_or(usize::MAX);
    let block = options.block_size.clamp(1, MAX_BLOCK);
    let mut out = StereoSamples {
        left: Vec::with_capacity(total),
        right: Vec::with_capacity(total),
    };
    while out.left.len() < total {
        let n = (total - out.left.len()).min(block);
        let (left, right) = core.render(n, None);
        out.left.extend_from_slice(left);
        out.right.extend_from_slice(right);
        core.drain_finished().for_each(drop);
        progress(out.left.len() as u64, frames);
    }
    out
}
