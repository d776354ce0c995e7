//! Parameter smoothing for zipper-free gain and pan changes.
//!
//! Track volume and pan are written from the control thread as plain values.
//! The mixer feeds each write into a [`SmoothedParam`] and reads one smoothed
//! value per frame, so a fader jump becomes a short exponential glide instead
//! of a step.
//!
//! ## Usage
//!
//! ```rust
//! use cadenza_core::SmoothedParam;
//!
//! let mut gain = SmoothedParam::with_config(1.0, 48000.0, 5.0);
//! gain.set_target(0.5);
//!
//! for _ in 0..480 {
//!     let _g = gain.advance();
//! }
//! assert!(gain.get() < 1.0);
//! ```

use libm::expf;

/// A parameter with built-in exponential (one-pole) smoothing.
#[derive(Debug, Clone)]
pub struct SmoothedParam {
    /// Current smoothed value
    current: f32,
    /// Target value we're smoothing towards
    target: f32,
    /// Smoothing coefficient (1 = instant)
    coeff: f32,
    sample_rate: f32,
    smoothing_time_ms: f32,
}

impl SmoothedParam {
    /// Create a parameter with smoothing disabled (instant changes).
    pub fn new(initial: f32) -> Self {
        Self {
            current: initial,
            target: initial,
            coeff: 1.0,
            sample_rate: 48000.0,
            smoothing_time_ms: 0.0,
        }
    }

    /// Create a smoothed parameter with full configuration.
    ///
    /// # Arguments
    /// * `initial` - Initial parameter value (already settled)
    /// * `sample_rate` - Sample rate in Hz
    /// * `smoothing_time_ms` - Smoothing time constant in milliseconds
    pub fn with_config(initial: f32, sample_rate: f32, smoothing_time_ms: f32) -> Self {
        let mut param = Self::new(initial);
        param.sample_rate = sample_rate;
        param.smoothing_time_ms = smoothing_time_ms;
        param.recalculate_coeff();
        param
    }

    /// Set the value to glide towards.
    #[inline]
    pub fn set_target(&mut self, target: f32) {
        self.target = target;
    }

    /// Set target and jump to it with no glide.
    #[inline]
    pub fn set_immediate(&mut self, value: f32) {
        self.target = value;
        self.current = value;
    }

    /// Update sample rate and recalculate the coefficient.
    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
        self.recalculate_coeff();
    }

    /// Set smoothing time in milliseconds. 0 disables smoothing.
    pub fn set_smoothing_time_ms(&mut self, time_ms: f32) {
        self.smoothing_time_ms = time_ms;
        self.recalculate_coeff();
    }

    /// Advance by one frame and return the new value.
    #[inline]
    pub fn advance(&mut self) -> f32 {
        // y[n] = y[n-1] + coeff * (target - y[n-1])
        self.current += self.coeff * (self.target - self.current);
        if self.is_settled() {
            self.current = self.target;
        }
        self.current
    }

    /// Current value without advancing.
    #[inline]
    pub fn get(&self) -> f32 {
        self.current
    }

    /// The value being approached.
    #[inline]
    pub fn target(&self) -> f32 {
        self.target
    }

    /// Whether the value has reached its target (within 1e-6).
    #[inline]
    pub fn is_settled(&self) -> bool {
        (self.current - self.target).abs() < 1e-6
    }

    /// Jump to the target immediately.
    #[inline]
    pub fn snap_to_target(&mut self) {
        self.current = self.target;
    }

    /// `coeff = 1 - exp(-1 / (tau * sample_rate))` with `tau` in seconds.
    /// After 5 tau the value is within 0.7% of target.
    fn recalculate_coeff(&mut self) {
        if self.smoothing_time_ms <= 0.0 || self.sample_rate <= 0.0 {
            self.coeff = 1.0;
        } else {
            let samples = self.smoothing_time_ms / 1000.0 * self.sample_rate;
            self.coeff = 1.0 - expf(-1.0 / samples);
        }
    }
}

impl Default for SmoothedParam {
    fn default() -> Self {
        Self::new(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instant_without_smoothing() {
        let mut param = SmoothedParam::new(0.0);
        param.set_target(1.0);
        assert_eq!(param.advance(), 1.0);
    }

    #[test]
    fn converges_within_five_time_constants() {
        let mut param = SmoothedParam::with_config(0.0, 48000.0, 10.0);
        param.set_target(1.0);

        let first = param.advance();
        assert!(first > 0.0 && first < 0.01);

        for _ in 0..2400 {
            param.advance();
        }
        assert!((param.get() - 1.0).abs() < 0.01);
    }

    #[test]
    fn monotonic_approach() {
        let mut param = SmoothedParam::with_config(1.0, 44100.0, 5.0);
        param.set_target(0.0);
        let mut last = param.get();
        for _ in 0..1000 {
            let next = param.advance();
            assert!(next <= last);
            last = next;
        }
    }

    #[test]
    fn snaps_when_close() {
        let mut param = SmoothedParam::with_config(0.0, 48000.0, 1.0);
        param.set_target(0.25);
        for _ in 0..48000 {
            param.advance();
        }
        assert!(param.is_settled());
        assert_eq!(param.get(), 0.25);
    }

    #[test]
    fn set_immediate_and_snap() {
        let mut param = SmoothedParam::with_config(0.0, 48000.0, 50.0);
        param.set_immediate(0.7);
        assert_eq!(param.get(), 0.7);
        param.set_target(0.1);
        param.snap_to_target();
        assert_eq!(param.get(), 0.1);
        assert_eq!(param.target(), 0.1);
    }
}
