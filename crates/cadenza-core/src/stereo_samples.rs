//! Planar stereo block produced by the offline renderer.
//!
//! [`StereoSamples`] holds a pair of equal-length `Vec<f32>` channels and the
//! conversions needed to hand them to an encoder (mono fold-down,
//! interleaving).

/// A pair of stereo audio buffers (left and right channels).
///
/// # Example
///
/// ```rust
/// use cadenza_core::StereoSamples;
///
/// let samples = StereoSamples::new(vec![1.0; 1024], vec![0.5; 1024]);
/// assert_eq!(samples.len(), 1024);
/// assert_eq!(samples.to_mono()[0], 0.75);
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StereoSamples {
    /// Left channel samples.
    pub left: Vec<f32>,
    /// Right channel samples.
    pub right: Vec<f32>,
}

impl StereoSamples {
    /// Create new stereo samples from left and right channels.
    pub fn new(left: Vec<f32>, right: Vec<f32>) -> Self {
        debug_assert_eq!(left.len(), right.len(), "Channels must have same length");
        Self { left, right }
    }

    /// `frames` of digital silence.
    pub fn silence(frames: usize) -> Self {
        Self {
            left: vec![0.0; frames],
            right: vec![0.0; frames],
        }
    }

    /// Duplicate a mono signal to both channels.
    pub fn from_mono(mono: Vec<f32>) -> Self {
        Self {
            left: mono.clone(),
            right: mono,
        }
    }

    /// Number of frames per channel.
    pub fn len(&self) -> usize {
        self.left.len()
    }

    /// Check if the buffers are empty.
    pub fn is_empty(&self) -> bool {
        self.left.is_empty()
    }

    /// Largest absolute sample across both channels.
    pub fn peak(&self) -> f32 {
        self.left
            .iter()
            .chain(self.right.iter())
            .fold(0.0f32, |acc, s| acc.max(s.abs()))
    }

    /// Mix down to mono by averaging channels.
    pub fn to_mono(&self) -> Vec<f32> {
        self.left
            .iter()
            .zip(self.right.iter())
            .map(|(l, r)| (l + r) * 0.5)
            .collect()
    }

    /// Convert to interleaved format (L, R, L, R, ...).
    pub fn to_interleaved(&self) -> Vec<f32> {
        let mut interleaved = Vec::with_capacity(self.left.len() * 2);
        for (l, r) in self.left.iter().zip(self.right.iter()) {
            interleaved.push(*l);
            interleaved.push(*r);
        }
        interleaved
    }

    /// Interleave for an output with `channels` channels.
    ///
    /// One channel folds down to mono. More than two duplicates the stereo
    /// pair into the first two slots and leaves the rest silent.
    pub fn to_channels(&self, channels: u16) -> Vec<f32> {
        match channels {
            0 => Vec::new(),
            1 => self.to_mono(),
            2 => self.to_interleaved(),
            n => {
                let n = usize::from(n);
                let mut out = vec![0.0; self.len() * n];
                let frames = self.left.iter().zip(&self.right);
                for (frame, (l, r)) in out.chunks_exact_mut(n).zip(frames) {
                    frame[0] = *l;
                    frame[1] = *r;
                }
                out
            }
        }
    }

    /// Create from interleaved format (L, R, L, R, ...). A trailing odd
    /// sample is dropped.
    pub fn from_interleaved(interleaved: &[f32]) -> Self {
        let len = interleaved.len() / 2;
        let mut left = Vec::with_capacity(len);
        let mut right = Vec::with_capacity(len);

        for chunk in interleaved.chunks_exact(2) {
            left.push(chunk[0]);
            right.push(chunk[1]);
        }

        Self { left, right }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interleave_round_trip() {
        let samples = StereoSamples::new(vec![1.0, 2.0], vec![-1.0, -2.0]);
        let inter = samples.to_interleaved();
        assert_eq!(inter, [1.0, -1.0, 2.0, -2.0]);
        assert_eq!(StereoSamples::from_interleaved(&inter), samples);
    }

    #[test]
    fn odd_tail_dropped() {
        let samples = StereoSamples::from_interleaved(&[0.1, 0.2, 0.3]);
        assert_eq!(samples.len(), 1);
    }

    #[test]
    fn channel_layouts() {
        let samples = StereoSamples::new(vec![1.0], vec![0.0]);
        assert_eq!(samples.to_channels(1), [0.5]);
        assert_eq!(samples.to_channels(2), [1.0, 0.0]);
        assert_eq!(samples.to_channels(4), [1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn peak_and_silence() {
        assert_eq!(StereoSamples::silence(16).peak(), 0.0);
        let samples = StereoSamples::new(vec![0.2, -0.9], vec![0.5, 0.1]);
        assert_eq!(samples.peak(), 0.9);
    }
}
