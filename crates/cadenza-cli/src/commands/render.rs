//! Offline mixdown of a project file.

use std::path::PathBuf;

use anyhow::Context;
use cadenza_config::EngineConfig;
use cadenza_engine::{OfflineRenderer, RenderOptions};
use clap::Args;

use super::common::{load_project, progress_bar, write_output};

#[derive(Args)]
pub struct RenderArgs {
    /// Project file (TOML)
    pub project: PathBuf,

    /// Output WAV file
    #[arg(short, long)]
    pub output: PathBuf,

    /// Length in seconds [default: timeline end, at least 30 s]
    #[arg(short, long)]
    pub duration: Option<f64>,

    /// Mix a click track at the project tempo
    #[arg(long)]
    pub metronome: bool,

    /// Output sample rate in Hz [default: render.sample_rate from settings]
    #[arg(long)]
    pub sample_rate: Option<u32>,

    /// Write a mono file
    #[arg(long)]
    pub mono: bool,
}

pub async fn run(args: RenderArgs, config: EngineConfig) -> anyhow::Result<()> {
    let project = load_project(&args.project)?;

    let mut options = RenderOptions::from(&config.render);
    if let Some(rate) = args.sample_rate {
        options.sample_rate = rate;
    }
    if args.mono {
        options.channels = 1;
    }
    options.metronome = args.metronome.then_some(project.bpm);

    let duration = args.duration.unwrap_or_else(|| project.export_duration());
    let frames = options
        .frames_for(duration)
        .with_context(|| format!("cannot render {duration}s"))?;

    println!(
        "Rendering '{}' ({} track(s), {:.2}s at {} Hz)",
        if project.name.is_empty() { "untitled" } else { project.name.as_str() },
        project.tracks.len(),
        duration,
        options.sample_rate
    );

    let renderer = OfflineRenderer::new(options);
    let bar = progress_bar(frames)?;
    let pb = bar.clone();
    let bytes = renderer
        .render_with_progress(
            &project.tracks,
            duration,
            Box::new(move |done, _| pb.set_position(done)),
        )
        .await
        .with_context(|| format!("failed to render {}", args.project.display()))?;
    bar.finish_and_clear();

    write_output(&args.output, &bytes)?;
    println!("Wrote {} ({} bytes)", args.output.display(), bytes.len());
    Ok(())
}
