//! Transport position display.

/// Format seconds as `MM:SS.cc` (hundredths, truncated).
///
/// ```rust
/// use cadenza_core::format_timecode;
///
/// assert_eq!(format_timecode(75.5), "01:15.50");
/// ```
pub fn format_timecode(seconds: f64) -> String {
    let seconds = if seconds.is_finite() { seconds.max(0.0) } else { 0.0 };
    let centis = (seconds * 100.0).floor() as u64;
    let minutes = centis / 6000;
    let secs = (centis / 100) % 60;
    let hundredths = centis % 100;
    format!("{minutes:02}:{secs:02}.{hundredths:02}")
}

/// Format seconds as a 1-based `bar.beat` position in 4/4 at `bpm`.
///
/// ```rust
/// use cadenza_core::format_bars_beats;
///
/// assert_eq!(format_bars_beats(0.0, 120.0), "1.1");
/// assert_eq!(format_bars_beats(2.5, 120.0), "2.2");
/// ```
pub fn format_bars_beats(seconds: f64, bpm: f64) -> String {
    let beats = if bpm > 0.0 && seconds > 0.0 {
        (seconds * bpm / 60.0).floor() as u64
    } else {
        0
    };
    format!("{}.{}", beats / 4 + 1, beats % 4 + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timecode_formats() {
        assert_eq!(format_timecode(0.0), "00:00.00");
        assert_eq!(format_timecode(59.999), "00:59.99");
        assert_eq!(format_timecode(600.25), "10:00.25");
        assert_eq!(format_timecode(-3.0), "00:00.00");
    }

    #[test]
    fn bars_at_other_tempos() {
        assert_eq!(format_bars_beats(1.0, 60.0), "1.2");
        assert_eq!(format_bars_beats(4.0, 60.0), "2.1");
        assert_eq!(format_bars_beats(10.0, 0.0), "1.1");
    }
}
