use proptest::prelude::*;
use quicklook::frame::FrameType;
use quicklook::sequence::{SequenceDetector, SequenceKind};

use crate::integration::support::{heuristic, planned};

fn pattern_type() -> impl Strategy<Value = FrameType> {
    prop_oneof![
        Just(FrameType::Dark),
        Just(FrameType::DomeFlat),
        Just(FrameType::SkyFlat),
        Just(FrameType::Science),
        Just(FrameType::Focus),
    ]
}

proptest! {
    #[test]
    fn full_pattern_closes_once_on_last_exposure(n_exp in 1i32..12, frame_type in pattern_type()) {
        let mut detector = SequenceDetector::default();
        let mut closures = Vec::new();
        for exp_no in 1..=n_exp {
            let outcome = detector.on_frame_arrived(planned(&format!("f{}", exp_no), frame_type, exp_no, n_exp));
            if outcome.closed {
                closures.push((exp_no, outcome.sequence));
            }
        }
        prop_assert_eq!(closures.len(), 1);
        let (closed_at, sequence) = &closures[0];
        prop_assert_eq!(*closed_at, n_exp);
        prop_assert_eq!(sequence.len(), n_exp as usize);
        let exp_numbers: Vec<i32> = sequence.frames.iter().map(|f| f.exp_no).collect();
        prop_assert_eq!(exp_numbers, (1..=n_exp).collect::<Vec<_>>());
        prop_assert!(detector.current_frames().is_empty());
    }

    #[test]
    fn first_exposure_always_starts_a_new_sequence(
        prefix in 0i32..6,
        prefix_type in pattern_type(),
        frame_type in pattern_type(),
    ) {
        let mut detector = SequenceDetector::default();
        // an unfinished pattern of 10 exposures
        for exp_no in 1..=prefix {
            detector.on_frame_arrived(planned(&format!("p{}", exp_no), prefix_type, exp_no, 10));
        }
        let start = planned("start", frame_type, 1, 5);
        let outcome = detector.on_frame_arrived(start.clone());
        prop_assert!(!outcome.closed);
        prop_assert_eq!(detector.current_frames().to_vec(), vec![start]);
    }

    #[test]
    fn compatible_nearby_frames_grow_monotonically(
        offsets in prop::collection::vec((-0.05f64..0.05, -0.05f64..0.05), 1..20),
    ) {
        // consecutive frames stay within about 510 arcsec of each other
        let mut detector = SequenceDetector::default();
        for (i, (d_ra, d_dec)) in offsets.iter().enumerate() {
            let frame = heuristic(&format!("h{}", i), FrameType::Science, 7, 150.0 + d_ra, 2.0 + d_dec);
            let outcome = detector.on_frame_arrived(frame);
            prop_assert!(!outcome.closed);
            prop_assert_eq!(detector.current_frames().len(), i + 1);
        }
    }

    #[test]
    fn ob_id_change_closes_prior_buffer(len in 1usize..10, new_ob in 8i64..100) {
        let mut detector = SequenceDetector::default();
        for i in 0..len {
            detector.on_frame_arrived(heuristic(&format!("h{}", i), FrameType::Science, 7, 150.0, 2.0));
        }
        let differing = heuristic("next", FrameType::Science, new_ob, 150.0, 2.0);
        let outcome = detector.on_frame_arrived(differing.clone());
        prop_assert!(outcome.closed);
        prop_assert_eq!(outcome.sequence.len(), len);
        prop_assert_eq!(detector.current_frames().to_vec(), vec![differing]);
    }
}

#[test]
fn pointing_jump_closes_heuristic_sequence() {
    let mut detector = SequenceDetector::new(1000.0);
    detector.on_frame_arrived(heuristic("a", FrameType::Science, 7, 150.0, 2.0));
    detector.on_frame_arrived(heuristic("b", FrameType::Science, 7, 150.01, 2.0));
    // one degree away
    let outcome = detector.on_frame_arrived(heuristic("c", FrameType::Science, 7, 151.0, 2.0));
    assert!(outcome.closed);
    assert_eq!(outcome.sequence.len(), 2);
    assert_eq!(outcome.sequence_type(), SequenceKind::Science);
    assert_eq!(detector.current_frames().len(), 1);
}

#[test]
fn sky_frames_close_a_science_pattern() {
    let mut detector = SequenceDetector::default();
    detector.on_frame_arrived(planned("s1", FrameType::Science, 1, 3));
    detector.on_frame_arrived(planned("s2", FrameType::Science, 2, 3));
    let outcome = detector.on_frame_arrived(planned("sky", FrameType::Sky, 3, 3));
    assert!(outcome.closed);
    assert_eq!(outcome.sequence.len(), 3);
    assert_eq!(outcome.sequence.kind, SequenceKind::Science);
}

#[test]
fn mixed_sources_share_one_detector() {
    let mut detector = SequenceDetector::default();
    detector.on_frame_arrived(heuristic("h1", FrameType::Dark, 3, 0.0, 0.0));
    // a planned pattern start discards the heuristic buffer
    detector.on_frame_arrived(planned("p1", FrameType::Science, 1, 2));
    let outcome = detector.on_frame_arrived(planned("p2", FrameType::Science, 2, 2));
    assert!(outcome.closed);
    let names: Vec<String> = outcome
        .sequence
        .frames
        .iter()
        .map(|f| f.display_name())
        .collect();
    assert_eq!(names, vec!["p1.fits", "p2.fits"]);
}
