//! Async front end for an [`EngineSession`].
//!
//! [`spawn_session`] moves the session into a Tokio task that applies
//! [`ControlCommand`]s in arrival order and publishes an [`EngineSnapshot`]
//! on a `watch` channel at the configured metering rate. [`EngineHandle`]
//! is the cloneable sender side; request-style commands carry a oneshot
//! reply.
//!
//! Anything that waits on I/O (clip decoding for `Play` and `LoadClips`,
//! renders) runs in its own task, so snapshots keep their rate and a
//! `Pause` or `Stop` is never queued behind a slow fetch.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use cadenza_core::{ClipId, Project, Track, TrackId};

use crate::capture::RecordedTake;
use crate::error::{DecodeError, DeviceError, EngineError, RenderError, Result};
use crate::session::{EngineSession, EngineSnapshot};

const COMMAND_QUEUE: usize = 256;

/// Replies to one request.
type Reply<T> = oneshot::Sender<T>;

/// Commands accepted by the session task.
#[derive(Debug)]
pub enum ControlCommand {
    /// Decode missing clips, then start playback. Decoding runs off the
    /// session task; a pause or stop that arrives first cancels the start.
    Play {
        /// Tracks to play.
        tracks: Vec<Track>,
        /// Start point; `None` resumes.
        from: Option<f64>,
        /// Whether playback started.
        reply: Reply<std::result::Result<bool, DeviceError>>,
    },
    /// Pause playback.
    Pause,
    /// Stop playback.
    Stop {
        /// Return to zero.
        reset: bool,
    },
    /// Move the transport.
    Seek {
        /// Target time in seconds.
        time: f64,
        /// Tracks to restart when playing.
        tracks: Vec<Track>,
    },
    /// Push volume, pan and effective mute of every track.
    SyncTracks(Vec<Track>),
    /// Set one track's volume.
    SetVolume {
        /// Track to change.
        track_id: TrackId,
        /// New linear gain.
        volume: f32,
    },
    /// Set one track's pan.
    SetPan {
        /// Track to change.
        track_id: TrackId,
        /// New position in `[-1, 1]`.
        pan: f32,
    },
    /// Release a deleted track.
    ReleaseTrack(TrackId),
    /// Set master gain.
    SetMasterVolume(f32),
    /// Turn the click track on or off.
    SetMetronome {
        /// Whether clicks sound.
        enabled: bool,
        /// Tempo.
        bpm: f64,
    },
    /// Decode clips into the cache.
    LoadClips {
        /// Tracks whose clips to decode.
        tracks: Vec<Track>,
        /// Clips that failed.
        reply: Reply<Vec<(ClipId, DecodeError)>>,
    },
    /// Start a take.
    StartRecording {
        /// Outcome.
        reply: Reply<std::result::Result<(), DeviceError>>,
    },
    /// Finish the take.
    StopRecording {
        /// The take, if one was running.
        reply: Reply<Result<Option<RecordedTake>>>,
    },
    /// Render tracks to WAV.
    Render {
        /// Tracks to render.
        tracks: Vec<Track>,
        /// Length in seconds.
        duration: f64,
        /// WAV bytes.
        reply: Reply<std::result::Result<Vec<u8>, RenderError>>,
    },
    /// Render a whole project to WAV.
    Export {
        /// The project.
        project: Box<Project>,
        /// WAV bytes.
        reply: Reply<std::result::Result<Vec<u8>, RenderError>>,
    },
    /// Stop the task.
    Shutdown,
}

/// Cloneable handle to a running session task.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    commands: mpsc::Sender<ControlCommand>,
}

/// Move `session` into a task. Returns the control handle and the snapshot
/// stream. Must be called from within a Tokio runtime.
pub fn spawn_session(session: EngineSession) -> (EngineHandle, watch::Receiver<EngineSnapshot>) {
    let (commands, rx) = mpsc::channel(COMMAND_QUEUE);
    let (snapshots, snapshot_rx) = watch::channel(EngineSnapshot::default());
    let poll_hz = session.config().metering.poll_hz.max(1);
    let period = Duration::from_secs_f64(1.0 / f64::from(poll_hz));
    let (loaded_tx, loaded) = mpsc::unbounded_channel();
    let task = SessionTask {
        session,
        loaded_tx,
        transport_epoch: 0,
    };
    tokio::spawn(task.run(rx, loaded, snapshots, period));
    (EngineHandle { commands }, snapshot_rx)
}

/// A `Play` whose clips finished decoding off the session task.
struct ClipsLoaded {
    tracks: Vec<Track>,
    from: Option<f64>,
    epoch: u64,
    reply: Reply<std::result::Result<bool, DeviceError>>,
}

struct SessionTask {
    session: EngineSession,
    loaded_tx: mpsc::UnboundedSender<ClipsLoaded>,
    /// Bumped by every transport command, so a play that was overtaken
    /// while its clips decoded does not start.
    transport_epoch: u64,
}

impl SessionTask {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<ControlCommand>,
        mut loaded: mpsc::UnboundedReceiver<ClipsLoaded>,
        snapshots: watch::Sender<EngineSnapshot>,
        period: Duration,
    ) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(poll_ms = period.as_millis(), "engine session task started");
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(ControlCommand::Shutdown) | None => break,
                    Some(command) => self.apply(command).await,
                },
                Some(ready) = loaded.recv() => self.start_loaded(ready),
                _ = ticker.tick() => {
                    snapshots.send_replace(self.session.snapshot());
                }
            }
        }
        self.session.shutdown().await;
        snapshots.send_replace(self.session.snapshot());
    }

    async fn apply(&mut self, command: ControlCommand) {
        let session = &mut self.session;
        match command {
            ControlCommand::Play { tracks, from, reply } => {
                if session.is_playing() {
                    debug!("play ignored, already playing");
                    let _ = reply.send(Ok(false));
                    return;
                }
                self.transport_epoch += 1;
                let epoch = self.transport_epoch;
                let cache = session.cache().clone();
                let loaded_tx = self.loaded_tx.clone();
                // Decoding runs beside the session so metering and
                // transport commands keep flowing.
                tokio::spawn(async move {
                    for (clip_id, err) in cache.load_tracks(&tracks).await {
                        debug!(clip_id = %clip_id, error = %err, "clip unavailable for playback");
                    }
                    let _ = loaded_tx.send(ClipsLoaded {
                        tracks,
                        from,
                        epoch,
                        reply,
                    });
                });
            }
            ControlCommand::Pause => {
                self.transport_epoch += 1;
                session.pause();
            }
            ControlCommand::Stop { reset } => {
                self.transport_epoch += 1;
                session.stop(reset);
            }
            ControlCommand::Seek { time, tracks } => {
                session.seek(time, &tracks);
            }
            ControlCommand::SyncTracks(tracks) => session.sync_tracks(&tracks),
            ControlCommand::SetVolume { track_id, volume } => {
                session.set_volume(&track_id, volume);
            }
            ControlCommand::SetPan { track_id, pan } => {
                session.set_pan(&track_id, pan);
            }
            ControlCommand::ReleaseTrack(track_id) => {
                session.release_track(&track_id);
            }
            ControlCommand::SetMasterVolume(volume) => session.set_master_volume(volume),
            ControlCommand::SetMetronome { enabled, bpm } => session.set_metronome(enabled, bpm),
            ControlCommand::LoadClips { tracks, reply } => {
                let cache = session.cache().clone();
                tokio::spawn(async move {
                    let _ = reply.send(cache.load_tracks(&tracks).await);
                });
            }
            ControlCommand::StartRecording { reply } => {
                let _ = reply.send(session.start_recording().await);
            }
            ControlCommand::StopRecording { reply } => {
                let _ = reply.send(session.stop_recording().await);
            }
            ControlCommand::Render {
                tracks,
                duration,
                reply,
            } => {
                // Renders run beside the session so metering keeps flowing.
                let renderer = session.renderer().clone();
                tokio::spawn(async move {
                    let _ = reply.send(renderer.render(&tracks, duration).await);
                });
            }
            ControlCommand::Export { project, reply } => {
                let renderer = session.renderer().clone();
                tokio::spawn(async move {
                    let _ = reply.send(renderer.export_project(&project).await);
                });
            }
            ControlCommand::Shutdown => {}
        }
    }

    fn start_loaded(&mut self, ready: ClipsLoaded) {
        if ready.epoch != self.transport_epoch {
            debug!("play overtaken by a later transport command");
            let _ = ready.reply.send(Ok(false));
            return;
        }
        let _ = ready.reply.send(self.session.play(&ready.tracks, ready.from));
    }
}

impl EngineHandle {
    async fn send(&self, command: ControlCommand) -> Result<()> {
        self.commands.send(command).await.map_err(|_| EngineError::Closed)
    }

    async fn request<T>(&self, command: impl FnOnce(Reply<T>) -> ControlCommand) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.send(command(reply)).await?;
        rx.await.map_err(|_| EngineError::Closed)
    }

    /// Decode missing clips and start playback. Returns `false` when
    /// already playing, or when a pause or stop overtook the start.
    pub async fn play(&self, tracks: Vec<Track>, from: Option<f64>) -> Result<bool> {
        Ok(self
            .request(|reply| ControlCommand::Play { tracks, from, reply })
            .await??)
    }

    /// Pause playback.
    pub async fn pause(&self) -> Result<()> {
        self.send(ControlCommand::Pause).await
    }

    /// Stop playback, optionally returning to zero.
    pub async fn stop(&self, reset: bool) -> Result<()> {
        self.send(ControlCommand::Stop { reset }).await
    }

    /// Move the transport.
    pub async fn seek(&self, time: f64, tracks: Vec<Track>) -> Result<()> {
        self.send(ControlCommand::Seek { time, tracks }).await
    }

    /// Push track state to the mix.
    pub async fn sync_tracks(&self, tracks: Vec<Track>) -> Result<()> {
        self.send(ControlCommand::SyncTracks(tracks)).await
    }

    /// Set one track's volume.
    pub async fn set_volume(&self, track_id: TrackId, volume: f32) -> Result<()> {
        self.send(ControlCommand::SetVolume { track_id, volume }).await
    }

    /// Set one track's pan.
    pub async fn set_pan(&self, track_id: TrackId, pan: f32) -> Result<()> {
        self.send(ControlCommand::SetPan { track_id, pan }).await
    }

    /// Release a deleted track.
    pub async fn release_track(&self, track_id: TrackId) -> Result<()> {
        self.send(ControlCommand::ReleaseTrack(track_id)).await
    }

    /// Set master gain.
    pub async fn set_master_volume(&self, volume: f32) -> Result<()> {
        self.send(ControlCommand::SetMasterVolume(volume)).await
    }

    /// Turn the click track on or off.
    pub async fn set_metronome(&self, enabled: bool, bpm: f64) -> Result<()> {
        self.send(ControlCommand::SetMetronome { enabled, bpm }).await
    }

    /// Decode clips; returns the ones that failed.
    pub async fn load_clips(&self, tracks: Vec<Track>) -> Result<Vec<(ClipId, DecodeError)>> {
        self.request(|reply| ControlCommand::LoadClips { tracks, reply }).await
    }

    /// Start a take.
    pub async fn start_recording(&self) -> Result<()> {
        Ok(self
            .request(|reply| ControlCommand::StartRecording { reply })
            .await??)
    }

    /// Finish the take.
    pub async fn stop_recording(&self) -> Result<Option<RecordedTake>> {
        self.request(|reply| ControlCommand::StopRecording { reply })
            .await?
    }

    /// Render tracks to WAV bytes.
    pub async fn render(&self, tracks: Vec<Track>, duration: f64) -> Result<Vec<u8>> {
        Ok(self
            .request(|reply| ControlCommand::Render {
                tracks,
                duration,
                reply,
            })
            .await??)
    }

    /// Render a whole project to WAV bytes.
    pub async fn export_project(&self, project: Project) -> Result<Vec<u8>> {
        Ok(self
            .request(|reply| ControlCommand::Export {
                project: Box::new(project),
                reply,
            })
            .await??)
    }

    /// Ask the task to stop. Later calls fail with [`EngineError::Closed`].
    pub async fn shutdown(&self) -> Result<()> {
        self.send(ControlCommand::Shutdown).await
    }

    /// Whether the session task has ended.
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }
}
