//! Cadenza CLI - render, play and record multi-track projects.

mod commands;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cadenza")]
#[command(author, version, about = "Cadenza multi-track audio engine CLI", long_about = None)]
struct Cli {
    /// Engine settings file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log engine internals at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mix a project down to a 16-bit WAV file
    Render(commands::render::RenderArgs),

    /// Play a project through an output device
    Play(commands::play::PlayArgs),

    /// Record from the input device to a WAV file
    Record(commands::record::RecordArgs),

    /// Print a peak/average overview of an audio file
    Waveform(commands::waveform::WaveformArgs),

    /// List audio devices
    Devices(commands::devices::DevicesArgs),

    /// Display audio file metadata
    Info(commands::info::InfoArgs),
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("cadenza=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("cadenza=info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Waveform(args) => commands::waveform::run(&args),
        Commands::Info(args) => commands::info::run(&args),
        Commands::Devices(args) => commands::devices::run(args),
        command => {
            let config = commands::common::load_config(cli.config.as_deref())?;
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("failed to start the async runtime")?;
            runtime.block_on(async move {
                match command {
                    Commands::Render(args) => commands::render::run(args, config).await,
                    Commands::Play(args) => commands::play::run(args, config).await,
                    Commands::Record(args) => commands::record::run(args, config).await,
                    Commands::Waveform(_) | Commands::Info(_) | Commands::Devices(_) => Ok(()),
                }
            })
        }
    }
}
