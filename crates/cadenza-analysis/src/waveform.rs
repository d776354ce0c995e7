//! Waveform overviews for clip drawing.

use serde::{Deserialize, Serialize};

/// Absolute amplitude statistics for one slice of a waveform.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct WaveformBucket {
    /// Largest absolute sample in the slice.
    pub peak: f32,
    /// Mean absolute sample in the slice.
    pub average: f32,
}

/// Summarize `samples` into exactly `bucket_count` buckets.
///
/// Bucket `i` covers `[i * len / n, (i + 1) * len / n)`, so every sample is
/// counted once and buckets differ in size by at most one sample. When there
/// are fewer samples than buckets, the empty buckets read as zero.
///
/// ```rust
/// use cadenza_analysis::waveform_summary;
///
/// let buckets = waveform_summary(&[0.5, -1.0, 0.25, 0.25], 2);
/// assert_eq!(buckets[0].peak, 1.0);
/// assert_eq!(buckets[1].average, 0.25);
/// ```
pub fn waveform_summary(samples: &[f32], bucket_count: usize) -> Vec<WaveformBucket> {
    let len = samples.len();
    (0..bucket_count)
        .map(|i| {
            let start = i * len / bucket_count;
            let end = (i + 1) * len / bucket_count;
            let slice = &samples[start..end];
            if slice.is_empty() {
                return WaveformBucket::default();
            }
            let (peak, sum) = slice.iter().fold((0.0f32, 0.0f64), |(peak, sum), s| {
                let a = s.abs();
                (peak.max(a), sum + f64::from(a))
            });
            WaveformBucket {
                peak,
                average: (sum / slice.len() as f64) as f32,
            }
        })
        .collect()
}
