//! Property-based tests for clip scheduling and the transport clock.

use cadenza_core::{AudioClip, SourceRef, Track};
use cadenza_engine::{TransportClock, plan, plan_clip};
use proptest::prelude::*;

fn clip(start: f64, duration: f64, offset: f64) -> AudioClip {
    AudioClip::new("c", SourceRef::path("c.wav"), start, duration).with_offset(offset)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// A scheduled clip still ends where it ends on the timeline, and reads
    /// the source exactly as far in as the seek point is past its start.
    #[test]
    fn planned_clip_keeps_timeline_alignment(
        start in 0.0f64..100.0,
        duration in 0.01f64..50.0,
        offset in 0.0f64..10.0,
        t0 in 0.0f64..200.0,
    ) {
        let c = clip(start, duration, offset);
        match plan_clip(&c, t0) {
            Some(timing) => {
                prop_assert!(t0 < c.end_time());
                prop_assert!(timing.delay >= 0.0);
                prop_assert!(timing.length > 0.0 && timing.length <= duration);
                prop_assert!((t0 + timing.delay + timing.length - c.end_time()).abs() < 1e-9);
                let skipped = (t0 - start).max(0.0);
                prop_assert!((timing.read_offset - offset - skipped).abs() < 1e-9);
            }
            None => prop_assert!(t0 >= c.end_time()),
        }
    }

    /// Muted tracks never contribute plans, whatever else is set.
    #[test]
    fn muted_tracks_never_planned(solo in any::<bool>(), t0 in 0.0f64..10.0) {
        let mut track = Track::new("t", "T").with_clip(clip(0.0, 20.0, 0.0));
        track.muted = true;
        track.solo = solo;
        prop_assert!(plan(&[track], t0).is_empty());
    }

    /// Position while playing is seek target plus elapsed engine time.
    #[test]
    fn transport_tracks_elapsed_time(
        target in 0.0f64..1000.0,
        anchor in 0.0f64..1000.0,
        elapsed in 0.0f64..1000.0,
    ) {
        let mut clock = TransportClock::new();
        clock.seek(target, anchor);
        prop_assert_eq!(clock.start(anchor), Some(target));
        prop_assert!((clock.current_time(anchor + elapsed) - (target + elapsed)).abs() < 1e-6);
    }
}
