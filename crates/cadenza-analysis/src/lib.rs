//! Cadenza Analysis - metering and waveform overviews
//!
//! - [`fft`] - FFT wrapper with windowing functions
//! - [`analyser`] - Smoothed byte-scaled frequency data for level meters
//! - [`waveform`] - Peak/average bucket summaries for clip drawing
//!
//! ## Metering
//!
//! ```rust
//! use cadenza_analysis::{AnalyserSettings, SpectrumAnalyser};
//!
//! let mut analyser = SpectrumAnalyser::new(AnalyserSettings::default());
//! analyser.push_samples(&[0.0; 512]);
//! let bins = analyser.byte_frequency_data();
//! assert_eq!(bins.len(), 128);
//! assert!(bins.iter().all(|&b| b == 0));
//! ```

pub mod analyser;
pub mod fft;
pub mod waveform;

pub use analyser::{AnalyserSettings, SpectrumAnalyser};
pub use fft::{Fft, Window};
pub use waveform::{WaveformBucket, waveform_summary};
