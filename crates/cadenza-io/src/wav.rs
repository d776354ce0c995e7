//! WAV reading and 16-bit PCM encoding.
//!
//! Reading goes through hound and yields planar `f32`. Encoding produces a
//! RIFF/WAVE file with 16-bit signed little-endian samples, entirely in
//! memory. Mono and stereo output use the canonical 44-byte header (`fmt `
//! then `data`); hound switches to the extensible format above two channels.

use std::io::Cursor;
use std::path::Path;

use hound::{SampleFormat, WavReader, WavWriter};

use crate::Result;

/// Size of the canonical PCM WAV header (RIFF + `fmt ` + `data` chunk headers).
const PCM_HEADER_BYTES: u64 = 44;

/// WAV audio encoding format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WavFormat {
    /// Linear PCM (integer samples).
    Pcm,
    /// IEEE 754 floating-point samples.
    IeeeFloat,
}

/// WAV metadata read from the header only.
#[derive(Debug, Clone)]
pub struct WavInfo {
    /// Number of audio channels.
    pub channels: u16,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Bit depth per sample.
    pub bits_per_sample: u16,
    /// Sample frames (samples per channel).
    pub num_frames: u64,
    /// Duration in seconds.
    pub duration_secs: f64,
    /// Audio encoding format.
    pub format: WavFormat,
}

/// Read WAV metadata without decoding sample data.
pub fn read_wav_info<P: AsRef<Path>>(path: P) -> Result<WavInfo> {
    let reader = WavReader::open(path)?;
    let spec = reader.spec();
    let num_frames = u64::from(reader.duration());
    let format = match spec.sample_format {
        SampleFormat::Float => WavFormat::IeeeFloat,
        SampleFormat::Int => WavFormat::Pcm,
    };

    Ok(WavInfo {
        channels: spec.channels,
        sample_rate: spec.sample_rate,
        bits_per_sample: spec.bits_per_sample,
        num_frames,
        duration_secs: num_frames as f64 / f64::from(spec.sample_rate),
        format,
    })
}

/// WAV stream parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavSpec {
    /// Number of audio channels.
    pub channels: u16,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Bit depth per sample.
    pub bits_per_sample: u16,
}

impl From<hound::WavSpec> for WavSpec {
    fn from(spec: hound::WavSpec) -> Self {
        Self {
            channels: spec.channels,
            sample_rate: spec.sample_rate,
            bits_per_sample: spec.bits_per_sample,
        }
    }
}

/// Decode an in-memory WAV file to planar `f32`.
///
/// Files with more than two channels keep only the first two.
pub fn read_wav_planar(bytes: &[u8]) -> Result<(Vec<Vec<f32>>, WavSpec)> {
    let reader = WavReader::new(Cursor::new(bytes))?;
    let hound_spec = reader.spec();
    let spec = WavSpec::from(hound_spec);
    let channels = usize::from(spec.channels.max(1));

    let interleaved: Vec<f32> = match hound_spec.sample_format {
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<Vec<_>, _>>()?,
        SampleFormat::Int => {
            let max_val = (1i64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_val))
                .collect::<std::result::Result<Vec<_>, _>>()?
        }
    };

    let kept = channels.min(2);
    let frames = interleaved.len() / channels;
    let mut planar = vec![Vec::with_capacity(frames); kept];
    for frame in interleaved.chunks_exact(channels) {
        for (ch, out) in planar.iter_mut().enumerate() {
            out.push(frame[ch]);
        }
    }

    Ok((planar, spec))
}

/// Largest frame count whose 16-bit data chunk still fits the 32-bit RIFF size fields.
pub fn max_pcm16_frames(channels: u16) -> u64 {
    let bytes_per_frame = u64::from(channels.max(1)) * 2;
    (u64::from(u32::MAX) - PCM_HEADER_BYTES) / bytes_per_frame
}

/// Convert one `f32` sample to 16-bit, clamping to `[-1, 1]`.
///
/// Negative values scale by 32768 and positive by 32767 so both full-scale
/// extremes are reachable.
#[inline]
fn to_pcm16(sample: f32) -> i16 {
    let s = if sample.is_nan() { 0.0 } else { sample.clamp(-1.0, 1.0) };
    if s < 0.0 { (s * 32768.0) as i16 } else { (s * 32767.0) as i16 }
}

/// Encode interleaved samples as a 16-bit PCM WAV file in memory.
///
/// `interleaved.len()` must be a multiple of `channels`; a partial trailing
/// frame is dropped.
pub fn encode_wav_pcm16(interleaved: &[f32], channels: u16, sample_rate: u32) -> Result<Vec<u8>> {
    let channels = channels.max(1);
    let frames = interleaved.len() / usize::from(channels);
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let capacity = PCM_HEADER_BYTES as usize + frames * usize::from(channels) * 2;
    let mut cursor = Cursor::new(Vec::with_capacity(capacity));
    {
        let mut writer = WavWriter::new(&mut cursor, spec)?;
        for &sample in &interleaved[..frames * usize::from(channels)] {
            writer.write_sample(to_pcm16(sample))?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}
