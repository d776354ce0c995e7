//! Smoothed, byte-scaled frequency data for level meters.
//!
//! [`SpectrumAnalyser`] keeps the most recent `fft_size` samples of the
//! master bus. Each time frequency data is requested it:
//!
//! 1. applies a Blackman window to the history, oldest sample first,
//! 2. takes the FFT and normalizes magnitudes by `fft_size`,
//! 3. blends them with the previous frame:
//!    `v[k] = smoothing * v_prev[k] + (1 - smoothing) * |X[k]|`,
//! 4. maps `20 * log10(v[k])` from `[min_db, max_db]` onto `0..=255`.
//!
//! The result has `fft_size / 2` bins (128 for the default size of 256).
//! Silence reads as all zeros.

use rustfft::num_complex::Complex;

use cadenza_core::linear_to_db;

use crate::fft::{Fft, Window};

/// Analyser tuning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalyserSettings {
    /// FFT length; a power of two between 32 and 32768.
    pub fft_size: usize,
    /// Time smoothing between frames, in `[0, 1)`.
    pub smoothing: f32,
    /// Level mapped to byte 0.
    pub min_db: f32,
    /// Level mapped to byte 255.
    pub max_db: f32,
}

impl Default for AnalyserSettings {
    fn default() -> Self {
        Self {
            fft_size: 256,
            smoothing: 0.8,
            min_db: -100.0,
            max_db: -30.0,
        }
    }
}

/// Windowed FFT analyser with per-bin smoothing.
pub struct SpectrumAnalyser {
    settings: AnalyserSettings,
    fft: Fft,
    window: Vec<f32>,
    history: Vec<f32>,
    write_pos: usize,
    smoothed: Vec<f32>,
    frame: Vec<f32>,
    spectrum: Vec<Complex<f32>>,
}

impl SpectrumAnalyser {
    /// Create an analyser. `fft_size` is rounded up to a power of two and
    /// kept within 32..=32768; `smoothing` is clamped to `[0, 1)`.
    pub fn new(settings: AnalyserSettings) -> Self {
        let fft_size = settings.fft_size.clamp(32, 32768).next_power_of_two();
        let settings = AnalyserSettings {
            fft_size,
            smoothing: settings.smoothing.clamp(0.0, 0.999),
            ..settings
        };
        Self {
            settings,
            fft: Fft::new(fft_size),
            window: Window::Blackman.coefficients(fft_size),
            history: vec![0.0; fft_size],
            write_pos: 0,
            smoothed: vec![0.0; fft_size / 2],
            frame: vec![0.0; fft_size],
            spectrum: Vec::with_capacity(fft_size),
        }
    }

    /// Effective settings after clamping.
    pub fn settings(&self) -> AnalyserSettings {
        self.settings
    }

    /// Number of bins returned per frame (`fft_size / 2`).
    pub fn frequency_bin_count(&self) -> usize {
        self.settings.fft_size / 2
    }

    /// Append mono samples to the analysis history.
    pub fn push_samples(&mut self, samples: &[f32]) {
        let size = self.history.len();
        // Only the newest `size` samples can matter.
        let samples = &samples[samples.len().saturating_sub(size)..];
        for &s in samples {
            self.history[self.write_pos] = s;
            self.write_pos = (self.write_pos + 1) % size;
        }
    }

    /// Clear history and smoothing state.
    pub fn reset(&mut self) {
        self.history.fill(0.0);
        self.smoothed.fill(0.0);
        self.write_pos = 0;
    }

    /// Compute one frame of byte frequency data into `out`.
    ///
    /// Writes `min(out.len(), frequency_bin_count())` bins.
    pub fn fill_byte_frequency_data(&mut self, out: &mut [u8]) {
        self.update_smoothed();

        let AnalyserSettings { min_db, max_db, .. } = self.settings;
        let range = (max_db - min_db).max(f32::EPSILON);
        for (byte, &v) in out.iter_mut().zip(&self.smoothed) {
            let db = linear_to_db(v);
            let scaled = 255.0 * (db - min_db) / range;
            *byte = scaled.clamp(0.0, 255.0) as u8;
        }
    }

    /// Compute one frame of byte frequency data.
    pub fn byte_frequency_data(&mut self) -> Vec<u8> {
        let mut out = vec![0u8; self.frequency_bin_count()];
        self.fill_byte_frequency_data(&mut out);
        out
    }

    fn update_smoothed(&mut self) {
        let size = self.history.len();
        let (newer, older) = self.history.split_at(self.write_pos);
        self.frame[..older.len()].copy_from_slice(older);
        self.frame[older.len()..].copy_from_slice(newer);
        for (s, w) in self.frame.iter_mut().zip(&self.window) {
            *s *= w;
        }

        self.fft.forward_into(&self.frame, &mut self.spectrum);

        let tau = self.settings.smoothing;
        let norm = 1.0 / size as f32;
        for (v, c) in self.smoothed.iter_mut().zip(&self.spectrum) {
            let next = tau * *v + (1.0 - tau) * c.norm() * norm;
            *v = if next.is_finite() { next } else { 0.0 };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn tone(freq_bin: usize, size: usize, amplitude: f32) -> Vec<f32> {
        (0..size)
            .map(|i| amplitude * (2.0 * PI * freq_bin as f32 * i as f32 / size as f32).sin())
            .collect()
    }

    #[test]
    fn silence_is_zero() {
        let mut analyser = SpectrumAnalyser::new(AnalyserSettings::default());
        assert_eq!(analyser.byte_frequency_data(), vec![0u8; 128]);
    }

    #[test]
    fn tone_lights_its_bin() {
        let mut analyser = SpectrumAnalyser::new(AnalyserSettings {
            smoothing: 0.0,
            ..AnalyserSettings::default()
        });
        // Quiet enough that only the center bin of the main lobe stays loudest.
        analyser.push_samples(&tone(20, 256, 0.01));
        let data = analyser.byte_frequency_data();

        let loudest = data
            .iter()
            .enumerate()
            .max_by_key(|(_, b)| **b)
            .map(|(i, _)| i);
        assert_eq!(loudest, Some(20));
        assert!(data[20] > 150 && data[20] < 255);
        assert_eq!(data[100], 0);
    }

    #[test]
    fn smoothing_decays_gradually() {
        let mut analyser = SpectrumAnalyser::new(AnalyserSettings::default());
        analyser.push_samples(&tone(8, 256, 0.01));
        for _ in 0..20 {
            analyser.byte_frequency_data();
        }
        let loud = analyser.byte_frequency_data()[8];

        analyser.push_samples(&[0.0; 256]);
        let after_one = analyser.byte_frequency_data()[8];
        assert!(after_one > 0 && after_one < loud);
    }

    #[test]
    fn settings_are_sanitized() {
        let analyser = SpectrumAnalyser::new(AnalyserSettings {
            fft_size: 300,
            smoothing: 4.0,
            ..AnalyserSettings::default()
        });
        assert_eq!(analyser.settings().fft_size, 512);
        assert!(analyser.settings().smoothing < 1.0);
        assert_eq!(analyser.frequency_bin_count(), 256);
    }

    #[test]
    fn long_pushes_keep_newest_samples() {
        let mut analyser = SpectrumAnalyser::new(AnalyserSettings::default());
        let mut samples = tone(8, 256, 1.0);
        samples.extend(std::iter::repeat_n(0.0, 256));
        analyser.push_samples(&samples);
        assert!(analyser.byte_frequency_data().iter().all(|&b| b == 0));
    }
}
