//! Realtime playback of a project file.

use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::Ordering;

use anyhow::Context;
use cadenza_config::EngineConfig;
use cadenza_engine::{EngineSession, EngineSnapshot, spawn_session};
use cadenza_io::CpalBackend;
use clap::Args;
use tracing::warn;

use super::common::{interrupt_flag, load_project};

const METER_WIDTH: usize = 30;

#[derive(Args)]
pub struct PlayArgs {
    /// Project file (TOML)
    pub project: PathBuf,

    /// Start position in seconds
    #[arg(long, default_value = "0")]
    pub from: f64,

    /// Output device (case-insensitive substring of its name)
    #[arg(long)]
    pub output_device: Option<String>,

    /// Stop after this many seconds [default: until the timeline ends]
    #[arg(short, long)]
    pub duration: Option<f64>,

    /// Play a click track at the project tempo
    #[arg(long)]
    pub metronome: bool,
}

pub async fn run(args: PlayArgs, mut config: EngineConfig) -> anyhow::Result<()> {
    let project = load_project(&args.project)?;
    if args.output_device.is_some() {
        config.audio.output_device = args.output_device.clone();
    }

    let from = args.from.max(0.0);
    let end = match args.duration {
        Some(d) => from + d.max(0.0),
        None => project.timeline_end(),
    };
    if end <= from {
        anyhow::bail!(
            "nothing to play after {from:.2}s (timeline ends at {:.2}s)",
            project.timeline_end()
        );
    }

    let session = EngineSession::new(config, Box::new(CpalBackend::new()))
        .context("failed to create the engine session")?;
    let (engine, mut snapshots) = spawn_session(session);

    for (clip_id, err) in engine.load_clips(project.tracks.clone()).await? {
        warn!(clip_id = %clip_id, error = %err, "clip will be silent");
    }
    if args.metronome {
        engine.set_metronome(true, project.bpm).await?;
    }

    let running = interrupt_flag()?;
    engine
        .play(project.tracks.clone(), Some(from))
        .await
        .context("failed to start playback")?;
    println!(
        "Playing '{}' from {from:.2}s to {end:.2}s. Press Ctrl+C to stop...",
        args.project.display()
    );

    while running.load(Ordering::SeqCst) {
        if snapshots.changed().await.is_err() {
            break;
        }
        let snapshot = snapshots.borrow_and_update().clone();
        print_status(&snapshot, end);
        if snapshot.current_time >= end {
            break;
        }
    }

    engine.stop(false).await?;
    let stopped_at = snapshots.borrow().current_time;
    engine.shutdown().await?;
    println!("\nStopped at {stopped_at:.2}s");
    Ok(())
}

fn print_status(snapshot: &EngineSnapshot, end: f64) {
    let level = meter_level(&snapshot.analyser);
    let filled = (level * METER_WIDTH as f32).round() as usize;
    let mut out = std::io::stdout().lock();
    let _ = write!(
        out,
        "\r{:>8.2} / {:.2}s [{:<width$}]",
        snapshot.current_time,
        end,
        "#".repeat(filled.min(METER_WIDTH)),
        width = METER_WIDTH
    );
    let _ = out.flush();
}

/// Mean spectrum magnitude in `[0, 1]`.
fn meter_level(bins: &[u8]) -> f32 {
    if bins.is_empty() {
        return 0.0;
    }
    let sum: u32 = bins.iter().map(|&b| u32::from(b)).sum();
    sum as f32 / (bins.len() as f32 * 255.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meter_level_spans_unit_range() {
        assert_eq!(meter_level(&[]), 0.0);
        assert_eq!(meter_level(&[0; 128]), 0.0);
        assert_eq!(meter_level(&[255; 128]), 1.0);
        assert!((meter_level(&[0, 255]) - 0.5).abs() < 1e-6);
    }
}
