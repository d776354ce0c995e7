//! Sample-rate conversion with rubato.

use rubato::{FastFixedIn, PolynomialDegree, Resampler};

use crate::{Error, Result};

/// Convert planar audio from `from_rate` to `to_rate`.
///
/// The whole input is processed as one chunk, then the resampler is flushed
/// and its latency trimmed so the output starts aligned with the input and
/// holds `round(frames * to_rate / from_rate)` frames. Equal rates return a
/// copy.
pub fn resample(channels: &[Vec<f32>], from_rate: u32, to_rate: u32) -> Result<Vec<Vec<f32>>> {
    if from_rate == 0 || to_rate == 0 {
        return Err(Error::Resample(format!("invalid rates {from_rate} -> {to_rate}")));
    }
    let frames = channels.first().map_or(0, Vec::len);
    if from_rate == to_rate || frames == 0 {
        return Ok(channels.to_vec());
    }

    let ratio = f64::from(to_rate) / f64::from(from_rate);
    let expected = (frames as f64 * ratio).round() as usize;

    let mut resampler =
        FastFixedIn::<f32>::new(ratio, 1.0, PolynomialDegree::Septic, frames, channels.len())
            .map_err(|e| Error::Resample(e.to_string()))?;
    let delay = resampler.output_delay();

    let mut output = resampler
        .process(channels, None)
        .map_err(|e| Error::Resample(e.to_string()))?;

    while output[0].len() < expected + delay {
        let tail = resampler
            .process_partial(None::<&[Vec<f32>]>, None)
            .map_err(|e| Error::Resample(e.to_string()))?;
        if tail[0].is_empty() {
            break;
        }
        for (out, more) in output.iter_mut().zip(tail) {
            out.extend(more);
        }
    }

    for channel in &mut output {
        channel.drain(..delay.min(channel.len()));
        channel.resize(expected, 0.0);
    }

    tracing::debug!(from_rate, to_rate, frames, out_frames = expected, "resampled");
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(rate: u32, freq: f32, frames: usize) -> Vec<f32> {
        (0..frames)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / rate as f32).sin())
            .collect()
    }

    #[test]
    fn same_rate_is_copy() {
        let input = vec![sine(48000, 440.0, 100)];
        assert_eq!(resample(&input, 48000, 48000).unwrap(), input);
    }

    #[test]
    fn output_length_follows_ratio() {
        let input = vec![sine(44100, 440.0, 44100), sine(44100, 220.0, 44100)];
        let output = resample(&input, 44100, 48000).unwrap();
        assert_eq!(output.len(), 2);
        assert_eq!(output[0].len(), 48000);
        assert_eq!(output[1].len(), 48000);
    }

    #[test]
    fn downsampling_preserves_level() {
        let input = vec![sine(48000, 440.0, 48000)];
        let output = resample(&input, 48000, 22050).unwrap();
        assert_eq!(output[0].len(), 22050);
        let mid = &output[0][5000..15000];
        let peak = mid.iter().fold(0.0f32, |a, s| a.max(s.abs()));
        assert!(peak > 0.9 && peak < 1.1, "peak {peak}");
    }

    #[test]
    fn zero_rate_rejected() {
        assert!(resample(&[vec![0.0; 4]], 0, 48000).is_err());
    }
}
