//! Waveform overview of an audio file.

use std::path::{Path, PathBuf};

use anyhow::Context;
use cadenza_analysis::{WaveformBucket, waveform_summary};
use cadenza_io::{DecodedBuffer, decode_bytes};
use clap::Args;
use serde::Serialize;

#[derive(Args)]
pub struct WaveformArgs {
    /// Audio file (WAV, FLAC, MP3, OGG, ...)
    pub file: PathBuf,

    /// Number of buckets to summarize into
    #[arg(short, long, default_value = "64")]
    pub buckets: usize,

    /// Print JSON instead of a text plot
    #[arg(long)]
    pub json: bool,

    /// Width of the text plot in characters
    #[arg(long, default_value = "60")]
    pub width: usize,
}

#[derive(Serialize)]
struct WaveformReport<'a> {
    file: &'a Path,
    sample_rate: u32,
    channels: usize,
    duration_secs: f64,
    buckets: &'a [WaveformBucket],
}

pub fn run(args: &WaveformArgs) -> anyhow::Result<()> {
    if args.buckets == 0 {
        anyhow::bail!("--buckets must be at least 1");
    }
    let decoded = decode_file(&args.file)?;
    let buckets = waveform_summary(&decoded.to_mono(), args.buckets);

    if args.json {
        let report = WaveformReport {
            file: &args.file,
            sample_rate: decoded.sample_rate(),
            channels: decoded.channel_count(),
            duration_secs: decoded.duration_secs(),
            buckets: &buckets,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!(
        "{} ({:.3}s, {} bucket(s))",
        args.file.display(),
        decoded.duration_secs(),
        buckets.len()
    );
    for (i, bucket) in buckets.iter().enumerate() {
        println!("{i:>5} {}", plot_row(bucket, args.width));
    }
    Ok(())
}

pub(crate) fn decode_file(path: &Path) -> anyhow::Result<DecodedBuffer> {
    let bytes = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let hint = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    decode_bytes(&bytes, hint.as_deref())
        .with_context(|| format!("failed to decode {}", path.display()))
}

/// `#` up to the average, `-` on to the peak.
fn plot_row(bucket: &WaveformBucket, width: usize) -> String {
    let cells = |level: f32| ((level.clamp(0.0, 1.0) * width as f32).round() as usize).min(width);
    let average = cells(bucket.average);
    let peak = cells(bucket.peak).max(average);
    format!("{}{}", "#".repeat(average), "-".repeat(peak - average))
}
