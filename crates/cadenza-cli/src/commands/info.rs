//! Display audio file metadata.

use anyhow::Context;
use cadenza_io::{WavFormat, read_wav_info};
use clap::Args;

use super::waveform::decode_file;

/// Display audio file information.
#[derive(Args)]
pub struct InfoArgs {
    /// Path to the audio file
    pub file: std::path::PathBuf,
}

/// Run the info command.
///
/// WAV headers are read without decoding; other formats are decoded to
/// measure them.
pub fn run(args: &InfoArgs) -> anyhow::Result<()> {
    let is_wav = args
        .file
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("wav"));

    println!("File:        {}", args.file.display());
    if is_wav {
        let info = read_wav_info(&args.file)
            .with_context(|| format!("failed to read {}", args.file.display()))?;
        let format_str = match info.format {
            WavFormat::Pcm => "PCM",
            WavFormat::IeeeFloat => "IEEE Float",
        };
        println!("Format:      WAV {} {}-bit", format_str, info.bits_per_sample);
        println!("Channels:    {}", info.channels);
        println!("Sample Rate: {} Hz", info.sample_rate);
        println!(
            "Duration:    {:.3}s ({} frames)",
            info.duration_secs, info.num_frames
        );
    } else {
        let decoded = decode_file(&args.file)?;
        println!("Channels:    {}", decoded.channel_count());
        println!("Sample Rate: {} Hz", decoded.sample_rate());
        println!(
            "Duration:    {:.3}s ({} frames)",
            decoded.duration_secs(),
            decoded.frames()
        );
    }

    let file_size = std::fs::metadata(&args.file)?.len();
    println!("File Size:   {}", format_bytes(file_size));

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
