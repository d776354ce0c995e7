//! Equal-power stereo positioning.
//!
//! Mono sources are placed on a quarter-circle so perceived loudness stays
//! constant across the field. Stereo sources are balanced: panning left folds
//! part of the right channel into the left and attenuates the right, and
//! vice versa. At center both laws pass the input through unchanged (mono
//! lands at -3 dB per side).
//!
//! ```rust
//! use cadenza_core::{PanLaw, pan_gains};
//!
//! let (l, r) = pan_gains(0.0);
//! assert!((l - r).abs() < 1e-6);
//!
//! let law = PanLaw::new(-1.0);
//! assert_eq!(law.apply_stereo(0.5, 0.5), (1.0, 0.0));
//! ```

use core::f32::consts::FRAC_PI_2;

use libm::{cosf, sinf};

/// Left/right gains for a mono source at `pan` in `[-1, 1]`.
#[inline]
pub fn pan_gains(pan: f32) -> (f32, f32) {
    let x = (pan.clamp(-1.0, 1.0) + 1.0) * 0.5;
    (cosf(x * FRAC_PI_2), sinf(x * FRAC_PI_2))
}

/// Precomputed coefficients for one pan position.
///
/// Recompute with [`PanLaw::new`] whenever the position changes; the mixer
/// does so only while a pan glide is in progress.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PanLaw {
    pan: f32,
    mono_l: f32,
    mono_r: f32,
    /// Gain on the channel being panned away from.
    keep: f32,
    /// Share of that channel folded into the other side.
    fold: f32,
}

impl PanLaw {
    /// Coefficients for `pan` (clamped to `[-1, 1]`).
    pub fn new(pan: f32) -> Self {
        let pan = pan.clamp(-1.0, 1.0);
        let (mono_l, mono_r) = pan_gains(pan);
        let x = if pan <= 0.0 { pan + 1.0 } else { pan };
        let angle = x * FRAC_PI_2;
        let (keep, fold) = if pan <= 0.0 {
            (sinf(angle), cosf(angle))
        } else {
            (cosf(angle), sinf(angle))
        };
        Self {
            pan,
            mono_l,
            mono_r,
            keep,
            fold,
        }
    }

    /// The clamped position these coefficients were built for.
    pub fn pan(&self) -> f32 {
        self.pan
    }

    /// Place a mono sample.
    #[inline]
    pub fn apply_mono(&self, sample: f32) -> (f32, f32) {
        (sample * self.mono_l, sample * self.mono_r)
    }

    /// Balance a stereo frame.
    #[inline]
    pub fn apply_stereo(&self, left: f32, right: f32) -> (f32, f32) {
        if self.pan <= 0.0 {
            (left + right * self.fold, right * self.keep)
        } else {
            (left * self.keep, right + left * self.fold)
        }
    }
}

impl Default for PanLaw {
    fn default() -> Self {
        Self::new(0.0)
    }
}
