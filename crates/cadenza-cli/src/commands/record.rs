//! Record a take from the input device.

use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use anyhow::Context;
use cadenza_config::EngineConfig;
use cadenza_engine::{EngineSession, spawn_session};
use cadenza_io::CpalBackend;
use clap::Args;

use super::common::{interrupt_flag, progress_bar, write_output};

const POLL: Duration = Duration::from_millis(50);

#[derive(Args)]
pub struct RecordArgs {
    /// Output WAV file
    #[arg(short, long)]
    pub output: PathBuf,

    /// Take length in seconds (Ctrl+C ends it early)
    #[arg(short, long, default_value = "10")]
    pub seconds: f64,

    /// Input device (case-insensitive substring of its name)
    #[arg(long)]
    pub input_device: Option<String>,

    /// Channels to capture, 1 or 2 [default: capture.channels from settings]
    #[arg(long)]
    pub channels: Option<u16>,
}

pub async fn run(args: RecordArgs, mut config: EngineConfig) -> anyhow::Result<()> {
    if !args.seconds.is_finite() || args.seconds <= 0.0 {
        anyhow::bail!("--seconds must be a positive number, got {}", args.seconds);
    }
    if args.input_device.is_some() {
        config.audio.input_device = args.input_device.clone();
    }
    if let Some(channels) = args.channels {
        config.capture.channels = channels;
        config.validate().context("invalid --channels")?;
    }

    let session = EngineSession::new(config, Box::new(CpalBackend::new()))
        .context("failed to create the engine session")?;
    let (engine, _snapshots) = spawn_session(session);

    let running = interrupt_flag()?;
    engine
        .start_recording()
        .await
        .context("failed to start recording")?;
    println!("Recording {:.1}s. Press Ctrl+C to stop early...", args.seconds);

    let length = Duration::from_secs_f64(args.seconds);
    let bar = progress_bar(length.as_millis() as u64)?;
    let started = Instant::now();
    while running.load(Ordering::SeqCst) && started.elapsed() < length {
        tokio::time::sleep(POLL).await;
        bar.set_position(started.elapsed().min(length).as_millis() as u64);
    }
    bar.finish_and_clear();

    let take = engine
        .stop_recording()
        .await
        .context("failed to finish recording")?
        .context("no take was captured")?;
    engine.shutdown().await?;

    write_output(&args.output, &take.bytes)?;
    println!(
        "Recorded {:.2}s ({} frames, {} Hz, {} ch) to {}",
        take.duration_secs(),
        take.frames,
        take.sample_rate,
        take.channels,
        args.output.display()
    );
    Ok(())
}
