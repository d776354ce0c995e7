//! Transport clock: maps engine time to project time.
//!
//! While playing, `current_time = engine_now - engine_anchor + project_anchor`.
//! Otherwise the position is frozen at the stored resume point. The clock
//! only tracks state; starting and stopping voices is the session's job.

use tracing::debug;

/// Transport state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransportState {
    /// Not playing; playback resumes from `position`.
    Stopped {
        /// Resume point in project seconds.
        position: f64,
    },
    /// Playing since `engine_anchor` (engine seconds) from `project_anchor`
    /// (project seconds).
    Playing {
        /// Engine time when playback started.
        engine_anchor: f64,
        /// Project time when playback started.
        project_anchor: f64,
    },
    /// Paused; playback resumes from `resume_at`.
    Paused {
        /// Resume point in project seconds.
        resume_at: f64,
    },
}

/// Play/pause/stop/seek state machine.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportClock {
    state: TransportState,
}

impl Default for TransportClock {
    fn default() -> Self {
        Self::new()
    }
}

fn sanitize(time: f64) -> f64 {
    if time.is_finite() { time.max(0.0) } else { 0.0 }
}

impl TransportClock {
    /// Stopped at project time zero.
    pub fn new() -> Self {
        Self {
            state: TransportState::Stopped { position: 0.0 },
        }
    }

    /// Current state.
    pub fn state(&self) -> TransportState {
        self.state
    }

    /// Whether the transport is playing.
    pub fn is_playing(&self) -> bool {
        matches!(self.state, TransportState::Playing { .. })
    }

    /// Project time at engine time `engine_now`.
    ///
    /// Never earlier than the play anchor, so a clock read right after
    /// `start` cannot go backwards.
    pub fn current_time(&self, engine_now: f64) -> f64 {
        match self.state {
            TransportState::Stopped { position } => position,
            TransportState::Paused { resume_at } => resume_at,
            TransportState::Playing {
                engine_anchor,
                project_anchor,
            } => (engine_now - engine_anchor + project_anchor).max(project_anchor),
        }
    }

    /// Begin playing from the resume point. Returns the project time
    /// playback starts from, or `None` if already playing.
    pub fn start(&mut self, engine_now: f64) -> Option<f64> {
        if self.is_playing() {
            debug!("play ignored, already playing");
            return None;
        }
        let from = self.current_time(engine_now);
        self.state = TransportState::Playing {
            engine_anchor: engine_now,
            project_anchor: from,
        };
        Some(from)
    }

    /// Freeze the position. Returns `false` if not playing.
    pub fn pause(&mut self, engine_now: f64) -> bool {
        if !self.is_playing() {
            debug!("pause ignored, not playing");
            return false;
        }
        self.state = TransportState::Paused {
            resume_at: self.current_time(engine_now),
        };
        true
    }

    /// Stop, keeping the position or resetting it to zero.
    pub fn stop(&mut self, engine_now: f64, reset: bool) {
        let position = if reset {
            0.0
        } else {
            self.current_time(engine_now)
        };
        self.state = TransportState::Stopped { position };
    }

    /// Move to `time` (negative and non-finite targets clamp to 0).
    ///
    /// While playing, the anchor is re-established at `engine_now` so the
    /// clock continues from `time`. Returns the clamped target.
    pub fn seek(&mut self, time: f64, engine_now: f64) -> f64 {
        let time = sanitize(time);
        self.state = match self.state {
            TransportState::Playing { .. } => TransportState::Playing {
                engine_anchor: engine_now,
                project_anchor: time,
            },
            TransportState::Paused { .. } => TransportState::Paused { resume_at: time },
            TransportState::Stopped { .. } => TransportState::Stopped { position: time },
        };
        time
    }
}
