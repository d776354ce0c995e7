//! FFT wrapper with windowing functions

use rustfft::{FftPlanner, num_complex::Complex};
use std::f32::consts::PI;
use std::sync::Arc;

/// Window function types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Window {
    /// Rectangular (no windowing)
    Rectangular,
    /// Hann window (raised cosine)
    Hann,
    /// Classic Blackman window (alpha = 0.16)
    Blackman,
}

impl Window {
    /// Apply window to a buffer
    pub fn apply(&self, buffer: &mut [f32]) {
        let n = buffer.len() as f32;
        match self {
            Window::Rectangular => {}
            Window::Hann => {
                for (i, sample) in buffer.iter_mut().enumerate() {
                    *sample *= 0.5 * (1.0 - (2.0 * PI * i as f32 / n).cos());
                }
            }
            Window::Blackman => {
                for (i, sample) in buffer.iter_mut().enumerate() {
                    let x = 2.0 * PI * i as f32 / n;
                    *sample *= 0.42 - 0.5 * x.cos() + 0.08 * (2.0 * x).cos();
                }
            }
        }
    }

    /// Get window coefficients
    pub fn coefficients(&self, size: usize) -> Vec<f32> {
        let mut coeffs = vec![1.0; size];
        self.apply(&mut coeffs);
        coeffs
    }
}

/// Forward FFT of a fixed size with a reusable plan.
pub struct Fft {
    fft: Arc<dyn rustfft::Fft<f32>>,
    size: usize,
}

impl Fft {
    /// Plan a forward FFT of `size` points.
    pub fn new(size: usize) -> Self {
        let mut planner = FftPlanner::new();
        Self {
            fft: planner.plan_fft_forward(size),
            size,
        }
    }

    /// Get FFT size
    pub fn size(&self) -> usize {
        self.size
    }

    /// Transform real input into `out`, keeping DC through Nyquist
    /// (`size / 2 + 1` bins). Input is zero-padded or truncated to `size`.
    pub fn forward_into(&self, input: &[f32], out: &mut Vec<Complex<f32>>) {
        out.clear();
        out.extend(input.iter().take(self.size).map(|&x| Complex::new(x, 0.0)));
        out.resize(self.size, Complex::new(0.0, 0.0));
        self.fft.process(out);
        out.truncate(self.size / 2 + 1);
    }

    /// Allocating form of [`forward_into`](Self::forward_into).
    pub fn forward(&self, input: &[f32]) -> Vec<Complex<f32>> {
        let mut out = Vec::with_capacity(self.size);
        self.forward_into(input, &mut out);
        out
    }
}
