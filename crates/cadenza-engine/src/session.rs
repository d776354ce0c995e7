//! The engine session: one owner for every piece of audio state.
//!
//! [`EngineSession`] ties the buffer cache, mix graph, transport, scheduler,
//! capture pipeline and offline renderer to one [`AudioBackend`]. It is a
//! plain single-owner value; [`spawn_session`](crate::spawn_session) moves it
//! into a task and exposes it through a command queue.
//!
//! The output stream is opened on the first `play` and then left running,
//! so engine time only advances once playback has been requested.

use std::sync::Arc;
use std::sync::mpsc::{Receiver, SyncSender, sync_channel};

use tracing::{debug, info, warn};

use cadenza_analysis::{AnalyserSettings, SpectrumAnalyser, WaveformBucket};
use cadenza_config::EngineConfig;
use cadenza_core::{
    ClipId, Project, SourceRef, StereoSamples, Track, TrackId, any_solo, frames_to_seconds,
    is_effectively_muted, seconds_to_frames,
};
use cadenza_io::{
    AudioBackend, AudioDevice, BackendStreamConfig, DecodedBuffer, SourceFetcher, StreamHandle,
};

use crate::buffer_cache::BufferCache;
use crate::capture::{CapturePipeline, RecordedTake};
use crate::error::{DecodeError, DeviceError, RenderError, Result};
use crate::metronome::{Metronome, MetronomeClock};
use crate::mix::MixGraph;
use crate::mixer::Mixer;
use crate::render::{OfflineRenderer, RenderOptions};
use crate::scheduler::ClipScheduler;
use crate::transport::TransportClock;

/// Stream error messages buffered between polls.
const ERROR_QUEUE: usize = 64;

/// Observable engine state, published at the metering rate.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EngineSnapshot {
    /// Transport position in project seconds.
    pub current_time: f64,
    /// Whether the transport is playing.
    pub is_playing: bool,
    /// Whether a take is being recorded.
    pub is_recording: bool,
    /// Master spectrum, one byte per frequency bin.
    pub analyser: Vec<u8>,
}

/// Single owner of the engine's audio state.
pub struct EngineSession {
    config: EngineConfig,
    backend: Box<dyn AudioBackend>,
    output_config: BackendStreamConfig,
    cache: BufferCache,
    mix: MixGraph,
    idle_mixer: Option<Mixer>,
    output: Option<StreamHandle>,
    transport: TransportClock,
    scheduler: ClipScheduler,
    capture: CapturePipeline,
    renderer: OfflineRenderer,
    analyser: SpectrumAnalyser,
    metronome_bpm: Option<f64>,
    errors_tx: SyncSender<String>,
    errors_rx: Receiver<String>,
}

impl EngineSession {
    /// A session on `backend`, reading clip sources from the filesystem
    /// (and HTTP with the `http` feature).
    pub fn new(config: EngineConfig, backend: Box<dyn AudioBackend>) -> Result<Self> {
        let rate = backend.actual_sample_rate(&output_config(&config));
        Self::with_cache(config, backend, BufferCache::new(rate))
    }

    /// A session using a custom source fetcher.
    pub fn with_fetcher(
        config: EngineConfig,
        backend: Box<dyn AudioBackend>,
        fetcher: Arc<dyn SourceFetcher>,
    ) -> Result<Self> {
        let rate = backend.actual_sample_rate(&output_config(&config));
        Self::with_cache(config, backend, BufferCache::with_fetcher(rate, fetcher))
    }

    fn with_cache(
        config: EngineConfig,
        backend: Box<dyn AudioBackend>,
        cache: BufferCache,
    ) -> Result<Self> {
        config.validate()?;
        let output_config = output_config(&config);
        let sample_rate = cache.sample_rate();
        let (mix, mixer) = MixGraph::new(sample_rate, &config.mix);
        let capture = CapturePipeline::new(BackendStreamConfig {
            sample_rate: config.audio.sample_rate,
            buffer_size: config.audio.buffer_size,
            channels: config.capture.channels,
            device_name: config.audio.input_device.clone(),
        });
        let renderer = OfflineRenderer::with_cache(&cache, RenderOptions::from(&config.render));
        let lookahead = seconds_to_frames(
            f64::from(config.mix.schedule_ahead_ms) / 1000.0,
            sample_rate,
        );
        let analyser = SpectrumAnalyser::new(AnalyserSettings {
            fft_size: config.metering.fft_size,
            smoothing: config.metering.smoothing,
            min_db: config.metering.min_db,
            max_db: config.metering.max_db,
        });
        let (errors_tx, errors_rx) = sync_channel(ERROR_QUEUE);
        info!(
            backend = backend.name(),
            sample_rate,
            channels = output_config.channels,
            "engine session created"
        );
        Ok(Self {
            config,
            backend,
            output_config,
            cache,
            mix,
            idle_mixer: Some(mixer),
            output: None,
            transport: TransportClock::new(),
            scheduler: ClipScheduler::new(lookahead),
            capture,
            renderer,
            analyser,
            metronome_bpm: None,
            errors_tx,
            errors_rx,
        })
    }

    /// Configuration the session was built with.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Mix rate: the rate the output device actually runs at.
    pub fn sample_rate(&self) -> u32 {
        self.mix.sample_rate()
    }

    /// Decoded clip cache.
    pub fn cache(&self) -> &BufferCache {
        &self.cache
    }

    /// The mix graph.
    pub fn mix(&self) -> &MixGraph {
        &self.mix
    }

    /// Devices the backend can see.
    pub fn devices(&self) -> Result<Vec<AudioDevice>> {
        Ok(self.backend.list_devices().map_err(DeviceError::from)?)
    }

    /// Decode one clip source into the cache.
    pub async fn decode(
        &self,
        clip_id: &ClipId,
        source: &SourceRef,
    ) -> std::result::Result<Arc<DecodedBuffer>, DecodeError> {
        self.cache.decode(clip_id, source).await
    }

    /// Decode every clip of `tracks` concurrently. Failures are logged and
    /// returned; they never stop the other clips from loading.
    pub async fn load_clips(&self, tracks: &[Track]) -> Vec<(ClipId, DecodeError)> {
        self.cache.load_tracks(tracks).await
    }

    /// Peak and average levels of `source` in `bucket_count` buckets.
    pub async fn waveform_summary(
        &self,
        source: &SourceRef,
        bucket_count: usize,
    ) -> std::result::Result<Vec<WaveformBucket>, DecodeError> {
        self.cache.waveform_summary(source, bucket_count).await
    }

    fn engine_now(&self) -> (u64, f64) {
        let frame = self.mix.position_frames();
        (frame, frames_to_seconds(frame, self.sample_rate()))
    }

    fn ensure_output(&mut self) -> std::result::Result<(), DeviceError> {
        if self.output.is_some() {
            return Ok(());
        }
        let mut mixer = match self.idle_mixer.take() {
            Some(mixer) => mixer,
            None => self.mix.reconnect(),
        };
        let channels = usize::from(self.output_config.channels);
        let errors = self.errors_tx.clone();
        let stream = self.backend.build_output_stream(
            &self.output_config,
            Box::new(move |out: &mut [f32]| mixer.process(out, channels)),
            Box::new(move |message: &str| {
                let _ = errors.try_send(message.to_owned());
            }),
        )?;
        info!(
            backend = self.backend.name(),
            sample_rate = self.sample_rate(),
            channels,
            "output stream started"
        );
        self.output = Some(stream);
        Ok(())
    }

    /// Start playback of `tracks` from `from`, or from the resume point
    /// when `from` is `None`. Returns `false` when already playing.
    ///
    /// Only clips already in the cache are played; see
    /// [`load_clips`](Self::load_clips).
    pub fn play(
        &mut self,
        tracks: &[Track],
        from: Option<f64>,
    ) -> std::result::Result<bool, DeviceError> {
        if self.transport.is_playing() {
            debug!("play ignored, already playing");
            return Ok(false);
        }
        self.ensure_output()?;
        self.apply_track_params(tracks);

        let (frame, engine_now) = self.engine_now();
        if let Some(time) = from {
            self.transport.seek(time, engine_now);
        }
        let Some(start) = self.transport.start(engine_now) else {
            return Ok(false);
        };
        let clips = self.scheduler.schedule(&mut self.mix, &self.cache, tracks, start, frame);
        self.push_metronome(frame, start);
        info!(from = start, clips, "playback started");
        Ok(true)
    }

    /// Freeze the transport and silence every voice.
    pub fn pause(&mut self) -> bool {
        let (_, engine_now) = self.engine_now();
        if !self.transport.pause(engine_now) {
            return false;
        }
        self.halt_voices();
        info!(at = self.current_time(), "playback paused");
        true
    }

    /// Stop, keeping the position or resetting it to zero.
    pub fn stop(&mut self, reset: bool) {
        let (_, engine_now) = self.engine_now();
        self.transport.stop(engine_now, reset);
        self.halt_voices();
        info!(at = self.current_time(), reset, "playback stopped");
    }

    /// Move to `time`. While playing, every voice restarts from there.
    pub fn seek(&mut self, time: f64, tracks: &[Track]) -> f64 {
        let (frame, engine_now) = self.engine_now();
        if !self.transport.is_playing() {
            let target = self.transport.seek(time, engine_now);
            debug!(to = target, "seek");
            return target;
        }
        self.halt_voices();
        let target = self.transport.seek(time, engine_now);
        let clips = self.scheduler.schedule(&mut self.mix, &self.cache, tracks, target, frame);
        self.push_metronome(frame, target);
        debug!(to = target, clips, "seek while playing");
        target
    }

    /// Stops voices and the metronome without waiting on the command ring.
    fn halt_voices(&mut self) {
        self.scheduler.stop_all(&mut self.mix);
    }

    /// Project time now.
    pub fn current_time(&self) -> f64 {
        let (_, engine_now) = self.engine_now();
        self.transport.current_time(engine_now)
    }

    /// Whether the transport is playing.
    pub fn is_playing(&self) -> bool {
        self.transport.is_playing()
    }

    fn apply_track_params(&mut self, tracks: &[Track]) {
        let solo = any_solo(tracks);
        for track in tracks {
            let Some(params) = self.mix.ensure_track_node(track, solo) else {
                continue;
            };
            params.set_volume(track.volume);
            params.set_pan(track.pan);
            params.set_muted(is_effectively_muted(track, solo));
        }
    }

    /// Push volume, pan and effective mute of every track to the mix. A
    /// track that becomes audible during playback starts from the current
    /// position.
    pub fn sync_tracks(&mut self, tracks: &[Track]) {
        self.apply_track_params(tracks);
        if self.transport.is_playing() {
            let (frame, engine_now) = self.engine_now();
            let now = self.transport.current_time(engine_now);
            let clips = self.scheduler.resync(&mut self.mix, &self.cache, tracks, now, frame);
            if clips > 0 {
                debug!(clips, at = now, "newly audible tracks joined playback");
            }
        }
    }

    /// Set one track's volume. Returns `false` for an unknown track.
    pub fn set_volume(&mut self, track_id: &TrackId, volume: f32) -> bool {
        self.mix.set_volume(track_id, volume)
    }

    /// Set one track's pan. Returns `false` for an unknown track.
    pub fn set_pan(&mut self, track_id: &TrackId, pan: f32) -> bool {
        self.mix.set_pan(track_id, pan)
    }

    /// Drop a deleted track's strip and stop its voices.
    pub fn release_track(&mut self, track_id: &TrackId) -> bool {
        self.scheduler.forget_track(track_id);
        self.mix.release_track(track_id)
    }

    /// Set master gain (clamped to `[0, 1]`).
    pub fn set_master_volume(&mut self, volume: f32) {
        self.mix.set_master_volume(volume);
    }

    /// Turn the click track on at `bpm`, or off.
    pub fn set_metronome(&mut self, enabled: bool, bpm: f64) {
        self.metronome_bpm = enabled.then(|| Metronome::new(self.sample_rate(), bpm).bpm());
        if self.transport.is_playing() {
            let (frame, engine_now) = self.engine_now();
            let now = self.transport.current_time(engine_now);
            self.push_metronome(frame, now);
        }
        debug!(bpm = ?self.metronome_bpm, "metronome updated");
    }

    fn push_metronome(&mut self, engine_frame: u64, project_time: f64) {
        let rate = self.sample_rate();
        let clock = self.metronome_bpm.map(|bpm| MetronomeClock {
            metronome: Metronome::new(rate, bpm),
            engine_anchor: engine_frame,
            project_anchor: seconds_to_frames(project_time, rate),
        });
        self.mix.set_metronome(clock);
    }

    /// Open the input device and start a take.
    pub async fn start_recording(&mut self) -> std::result::Result<(), DeviceError> {
        let result = self.capture.start(self.backend.as_ref(), self.errors_tx.clone());
        if let Err(err) = &result {
            warn!(error = %err, "recording not started");
        }
        result
    }

    /// Finish the take, or `None` when not recording.
    pub async fn stop_recording(&mut self) -> Result<Option<RecordedTake>> {
        self.capture.stop().await
    }

    /// Whether a take is in progress.
    pub fn is_recording(&self) -> bool {
        self.capture.is_recording()
    }

    /// The offline renderer, sharing this session's source fetcher.
    pub fn renderer(&self) -> &OfflineRenderer {
        &self.renderer
    }

    /// Replace render settings.
    pub fn set_render_options(&mut self, options: RenderOptions) {
        self.renderer.set_options(options);
    }

    /// Render `duration` seconds of `tracks` to WAV bytes.
    pub async fn render(
        &self,
        tracks: &[Track],
        duration: f64,
    ) -> std::result::Result<Vec<u8>, RenderError> {
        self.renderer.render(tracks, duration).await
    }

    /// Render `duration` seconds of `tracks` to stereo samples.
    pub async fn render_block(
        &self,
        tracks: &[Track],
        duration: f64,
    ) -> std::result::Result<StereoSamples, RenderError> {
        self.renderer.render_block(tracks, duration).await
    }

    /// Render the whole project.
    pub async fn export_project(
        &self,
        project: &Project,
    ) -> std::result::Result<Vec<u8>, RenderError> {
        self.renderer.export_project(project).await
    }

    /// Current master spectrum as bytes, one per frequency bin.
    pub fn analyser_data(&mut self) -> Vec<u8> {
        self.mix.drain_tap(&mut self.analyser);
        self.analyser.byte_frequency_data()
    }

    /// Housekeeping plus a state snapshot: frees retired voices, hands
    /// clips entering the look-ahead window to the mixer, logs stream
    /// errors and reads the meter.
    pub fn snapshot(&mut self) -> EngineSnapshot {
        self.mix.collect_garbage();
        if self.transport.is_playing() {
            let frame = self.mix.position_frames();
            self.scheduler.top_up(&mut self.mix, frame);
        }
        while let Ok(message) = self.errors_rx.try_recv() {
            warn!(error = %message, "audio stream error");
        }
        EngineSnapshot {
            current_time: self.current_time(),
            is_playing: self.is_playing(),
            is_recording: self.is_recording(),
            analyser: self.analyser_data(),
        }
    }

    /// Stop everything and close the streams.
    pub async fn shutdown(&mut self) {
        if self.capture.is_recording() {
            if let Err(err) = self.capture.stop().await {
                warn!(error = %err, "discarding take on shutdown");
            }
        }
        self.stop(false);
        self.output = None;
        self.mix.collect_garbage();
        info!("engine session closed");
    }
}

impl std::fmt::Debug for EngineSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineSession")
            .field("backend", &self.backend.name())
            .field("sample_rate", &self.sample_rate())
            .field("output_open", &self.output.is_some())
            .field("transport", &self.transport.state())
            .field("recording", &self.capture.is_recording())
            .finish_non_exhaustive()
    }
}

fn output_config(config: &EngineConfig) -> BackendStreamConfig {
    BackendStreamConfig {
        sample_rate: config.audio.sample_rate,
        buffer_size: config.audio.buffer_size,
        channels: config.audio.channels,
        device_name: config.audio.output_device.clone(),
    }
}
