// tests/test_tld.rs — Integration tests for the tracking-learning-detection controller.

use tld_tracker::bbox::BoundingBox;
use tld_tracker::config::TldConfig;
use tld_tracker::error::TldError;
use tld_tracker::image::Image;
use tld_tracker::median_flow::MotionTracker;
use tld_tracker::tld::{fuse_hypotheses, Hypothesis, Tld};

const W: usize = 160;
const H: usize = 120;
const OBJ: usize = 40;

/// Smooth sinusoidal texture on a low-variance gradient background.
fn scene(ox: usize, oy: usize) -> Image<u8> {
    Image::from_fn(W, H, |x, y| {
        if (ox..ox + OBJ).contains(&x) && (oy..oy + OBJ).contains(&y) {
            let u = (x - ox) as f32;
            let v = (y - oy) as f32;
            (128.0 + 60.0 * (u * 0.45).sin() * (v * 0.35).cos() + 40.0 * ((u + 2.0 * v) * 0.2).sin()) as u8
        } else {
            (20 + x / 4 + y / 8) as u8
        }
    })
}

fn object_box(ox: usize, oy: usize) -> BoundingBox {
    BoundingBox::new(ox as f32, oy as f32, OBJ as f32, OBJ as f32)
}

/// A motion tracker that always loses the target.
struct Blind;

impl MotionTracker for Blind {
    fn track(&mut self, _prev: &Image<u8>, _curr: &Image<u8>, _prev_box: &BoundingBox) -> Option<BoundingBox> {
        None
    }
}

/// A motion tracker that always reports the same box.
struct Fixed(BoundingBox);

impl MotionTracker for Fixed {
    fn track(&mut self, _prev: &Image<u8>, _curr: &Image<u8>, _prev_box: &BoundingBox) -> Option<BoundingBox> {
        Some(self.0)
    }
}

// ===== Fusion policy =====

#[test]
fn confident_detector_overrides_weak_tracker() {
    let tracker = Hypothesis {
        bbox: BoundingBox::new(10.0, 10.0, 40.0, 40.0),
        confidence: 0.3,
    };
    let detector = Hypothesis {
        bbox: BoundingBox::new(90.0, 60.0, 40.0, 40.0),
        confidence: 0.9,
    };
    let f = fuse_hypotheses(Some(tracker), Some(detector), false, 0.65, 0.5);
    assert_eq!(f.bounding_box, Some(detector.bbox));
    assert_eq!(f.confidence, 0.9);
}

#[test]
fn tracker_hysteresis() {
    let tracker = Hypothesis {
        bbox: BoundingBox::new(10.0, 10.0, 40.0, 40.0),
        confidence: 0.58,
    };
    assert!(fuse_hypotheses(Some(tracker), None, true, 0.65, 0.5).valid);
    assert!(!fuse_hypotheses(Some(tracker), None, false, 0.65, 0.5).valid);

    let weak = Hypothesis { confidence: 0.45, ..tracker };
    assert!(!fuse_hypotheses(Some(weak), None, true, 0.65, 0.5).valid);
}

// ===== Selection =====

#[test]
fn select_object_is_idempotent() {
    let img = scene(41, 41);
    let bb = object_box(41, 41);
    let mut tld = Tld::new(TldConfig::default(), W, H);

    tld.select_object(&img, &bb).unwrap();
    let min_var = tld.detector().variance_filter.min_var();
    let positives = tld.detector().nn.positives().to_vec();
    let negatives = tld.detector().nn.negatives().to_vec();
    let posteriors = tld.detector().ensemble.posteriors().to_vec();
    assert!(min_var > 0.0);
    assert!(!positives.is_empty());

    tld.select_object(&img, &bb).unwrap();
    assert_eq!(tld.detector().variance_filter.min_var(), min_var);
    assert_eq!(tld.detector().nn.positives(), positives.as_slice());
    assert_eq!(tld.detector().nn.negatives(), negatives.as_slice());
    assert_eq!(tld.detector().ensemble.posteriors(), posteriors.as_slice());
}

#[test]
fn selection_starts_valid() {
    let mut tld = Tld::new(TldConfig::default(), W, H);
    tld.select_object(&scene(41, 41), &object_box(41, 41)).unwrap();
    assert!(tld.is_valid());
    assert_eq!(tld.confidence(), 1.0);
    assert_eq!(tld.current_bb(), Some(object_box(41, 41)));
}

#[test]
fn selection_errors() {
    let mut tld = Tld::new(TldConfig::default(), W, H);
    let err = tld.select_object(&Image::new(80, 60), &object_box(10, 10)).unwrap_err();
    assert_eq!(err, TldError::FrameSize { expected: (W, H), got: (80, 60) });

    let err = tld
        .select_object(&scene(41, 41), &BoundingBox::new(10.0, 10.0, 0.0, 30.0))
        .unwrap_err();
    assert!(matches!(err, TldError::MissingDimensions { .. }));
}

#[test]
fn process_requires_selection() {
    let mut tld = Tld::new(TldConfig::default(), W, H);
    assert_eq!(tld.process_image(&scene(41, 41)).unwrap_err(), TldError::NotInitialised);

    tld.select_object(&scene(41, 41), &object_box(41, 41)).unwrap();
    tld.release();
    assert_eq!(tld.process_image(&scene(41, 41)).unwrap_err(), TldError::NotInitialised);
}

// ===== End to end =====

#[test]
fn follows_moving_target() {
    let mut tld = Tld::new(TldConfig::default(), W, H);
    tld.select_object(&scene(41, 41), &object_box(41, 41)).unwrap();

    for t in 1..=6 {
        let (ox, oy) = (41 + 2 * t, 41 + t);
        let r = tld.process_image(&scene(ox, oy)).unwrap();
        let bb = r.bounding_box.unwrap_or_else(|| panic!("target lost at frame {t}"));
        let overlap = bb.overlap(&object_box(ox, oy));
        assert!(overlap > 0.6, "frame {t}: box {bb:?} overlaps truth by {overlap}");
        assert!(r.valid, "frame {t}: confidence {} not valid", r.confidence);
        assert!(r.learning);
    }
}

#[test]
fn detector_recovers_when_tracker_fails() {
    let mut tld = Tld::with_tracker(TldConfig::default(), W, H, Box::new(Blind));
    tld.select_object(&scene(41, 41), &object_box(41, 41)).unwrap();

    let r = tld.process_image(&scene(81, 61)).unwrap();
    assert_eq!(r.num_clusters, 1);
    let bb = r.bounding_box.expect("detector should re-find the target");
    assert!(bb.overlap(&object_box(81, 61)) > 0.6, "box {bb:?}");
    // A detector-only box is reported but not trusted for learning.
    assert!(!r.valid);
    assert!(!r.learning);
}

#[test]
fn lost_target_reports_nothing() {
    let mut tld = Tld::with_tracker(TldConfig::default(), W, H, Box::new(Blind));
    tld.select_object(&scene(41, 41), &object_box(41, 41)).unwrap();

    let empty = Image::from_fn(W, H, |x, y| (20 + x / 4 + y / 8) as u8);
    let r = tld.process_image(&empty).unwrap();
    assert_eq!(r.bounding_box, None);
    assert_eq!(r.confidence, 0.0);
    assert!(!r.valid);
    assert_eq!(r.num_clusters, 0);
}

#[test]
fn learning_disabled_leaves_model_untouched() {
    let config = TldConfig {
        learning_enabled: false,
        ..Default::default()
    };
    let mut tld = Tld::new(config, W, H);
    tld.select_object(&scene(41, 41), &object_box(41, 41)).unwrap();
    let posteriors = tld.detector().ensemble.posteriors().to_vec();
    let negatives = tld.detector().nn.negatives().len();

    let r = tld.process_image(&scene(43, 42)).unwrap();
    assert!(!r.learning);
    assert_eq!(tld.detector().ensemble.posteriors(), posteriors.as_slice());
    assert_eq!(tld.detector().nn.negatives().len(), negatives);
}

#[test]
fn wrong_frame_size_rejected() {
    let mut tld = Tld::new(TldConfig::default(), W, H);
    tld.select_object(&scene(41, 41), &object_box(41, 41)).unwrap();
    let err = tld.process_image(&Image::new(W + 1, H)).unwrap_err();
    assert_eq!(err, TldError::FrameSize { expected: (W, H), got: (W + 1, H) });
}

// ===== Mode flags =====

#[test]
fn detector_disabled_still_bootstraps_negatives() {
    let enabled = {
        let mut tld = Tld::new(TldConfig::default(), W, H);
        tld.select_object(&scene(41, 41), &object_box(41, 41)).unwrap();
        tld.detector().nn.negatives().len()
    };

    let config = TldConfig {
        detector_enabled: false,
        ..Default::default()
    };
    let background = BoundingBox::new(100.0, 70.0, 40.0, 40.0);
    let mut tld = Tld::with_tracker(config, W, H, Box::new(Fixed(background)));
    tld.select_object(&scene(41, 41), &object_box(41, 41)).unwrap();
    assert!(enabled > 0);
    assert_eq!(tld.detector().nn.negatives().len(), enabled);

    // No per-frame detection, but the tracker box is still scored against
    // a memory that holds negatives.
    let r = tld.process_image(&scene(41, 41)).unwrap();
    assert_eq!(r.bounding_box, Some(background));
    assert!(r.confidence < 1.0, "background scored {}", r.confidence);
    assert!(!r.learning);
    assert!(!tld.detector().result.contains_valid_data);
}

#[test]
fn alternating_mode_learns_every_frame() {
    let config = TldConfig {
        alternating: true,
        ..Default::default()
    };
    let mut tld = Tld::new(config, W, H);
    tld.select_object(&scene(41, 41), &object_box(41, 41)).unwrap();

    for t in 1..=4 {
        let (ox, oy) = (41 + 2 * t, 41 + t);
        let r = tld.process_image(&scene(ox, oy)).unwrap();
        let bb = r.bounding_box.unwrap_or_else(|| panic!("target lost at frame {t}"));
        assert!(bb.overlap(&object_box(ox, oy)) > 0.6, "frame {t}: box {bb:?}");
        assert!(r.valid && r.learning, "frame {t}: {r:?}");
        // Tracking succeeded, so fusion ran without a detection pass; the
        // pass learning needed ran afterwards and is not reported.
        assert_eq!(r.num_clusters, 0, "frame {t}");
        assert!(tld.detector().result.contains_valid_data, "frame {t}");
    }
}

#[test]
fn ensemble_disabled_fills_nn_negatives() {
    let mut config = TldConfig::default();
    config.detector.ensemble_enabled = false;
    let mut tld = Tld::new(config, W, H);
    tld.select_object(&scene(41, 41), &object_box(41, 41)).unwrap();

    for t in 1..=3 {
        let (ox, oy) = (41 + 2 * t, 41 + t);
        let r = tld.process_image(&scene(ox, oy)).unwrap();
        let bb = r.bounding_box.unwrap_or_else(|| panic!("target lost at frame {t}"));
        assert!(bb.overlap(&object_box(ox, oy)) > 0.6, "frame {t}: box {bb:?}");
        assert!(r.learning, "frame {t}: {r:?}");
        // Every window passed the fern stage untouched.
        assert_eq!(tld.detector().result.ensemble_rejected, 0);
    }
    assert!(!tld.detector().nn.negatives().is_empty());
}

// ===== Configuration =====

#[test]
fn partial_config_fills_defaults() {
    let config: TldConfig =
        serde_json::from_str(r#"{ "alternating": true, "detector": { "num_trees": 8, "cluster_box": "span" } }"#)
            .unwrap();
    let defaults = TldConfig::default();
    assert!(config.alternating);
    assert_eq!(config.detector.num_trees, 8);
    assert_eq!(config.detector.cluster_box, tld_tracker::config::ClusterBox::Span);
    assert_eq!(config.detector.theta_tp, defaults.detector.theta_tp);
    assert_eq!(config.median_flow, defaults.median_flow);
    assert_eq!(config.shuffle_seed, defaults.shuffle_seed);
}
