// tests/test_cascade.rs — Integration tests for the detector cascade and its stages.

use tld_tracker::bbox::BoundingBox;
use tld_tracker::cascade::DetectorCascade;
use tld_tracker::config::DetectorConfig;
use tld_tracker::image::Image;
use tld_tracker::nn_classifier::{LabeledPatch, NnClassifier};
use tld_tracker::patch::NormalizedPatch;

const W: usize = 160;
const H: usize = 120;
const OBJ: usize = 40;

/// Smooth sinusoidal texture on a low-variance gradient background.
/// Object origins on 1 + 4k land exactly on grid windows at scale 0.
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

/// Cascade trained on the single window that matches the object exactly.
fn trained_cascade(img: &Image<u8>, bbox: &BoundingBox) -> DetectorCascade {
    let mut c = DetectorCascade::new(DetectorConfig::default(), W, H);
    c.init(OBJ, OBJ).unwrap();

    let patch = NormalizedPatch::extract(img, bbox);
    c.variance_filter.set_min_var_from_patch(patch.variance());

    let overlaps = c.window_overlaps(bbox);
    let exact = overlaps.iter().position(|&o| o == 1.0).expect("object aligned to grid");
    c.learn_window(img, exact, true);
    c.nn.learn([LabeledPatch { patch, positive: true }]);
    c
}

// ===== Pruning =====

#[test]
fn stages_prune_monotonically() {
    let img = scene(41, 41);
    let mut c = trained_cascade(&img, &object_box(41, 41));
    c.detect(&img);

    let r = &c.result;
    assert!(r.contains_valid_data);
    assert!(r.passed_variance() >= r.passed_ensemble());
    assert!(r.passed_ensemble() >= r.passed_nn());
    assert_eq!(r.passed_nn(), r.confident_indices.len());
    assert!(r.variance_rejected > 0, "flat background windows should fail the variance stage");
}

#[test]
fn disabled_variance_stage_rejects_nothing() {
    let img = scene(41, 41);
    let mut c = trained_cascade(&img, &object_box(41, 41));
    c.variance_filter.enabled = false;
    c.detect(&img);
    assert_eq!(c.result.variance_rejected, 0);
    assert!(c.result.passed_variance() >= c.result.passed_ensemble());
}

// ===== Re-detection =====

#[test]
fn finds_object_after_jump() {
    let first = scene(41, 41);
    let mut c = trained_cascade(&first, &object_box(41, 41));

    let moved = scene(81, 61);
    c.detect(&moved);
    assert_eq!(c.result.num_clusters, 1, "confident: {:?}", c.result.confident_indices);
    let bb = c.result.detector_bb.expect("single cluster has a box");
    let overlap = bb.overlap(&object_box(81, 61));
    assert!(overlap > 0.7, "detector box {bb:?} overlaps truth by {overlap}");
}

#[test]
fn empty_frame_has_no_clusters() {
    let first = scene(41, 41);
    let mut c = trained_cascade(&first, &object_box(41, 41));
    let empty = Image::from_fn(W, H, |x, y| (20 + x / 4 + y / 8) as u8);
    c.detect(&empty);
    assert!(c.result.contains_valid_data);
    assert_eq!(c.result.num_clusters, 0);
    assert!(c.result.detector_bb.is_none());
}

#[test]
fn detection_result_is_rebuilt_each_pass() {
    let first = scene(41, 41);
    let mut c = trained_cascade(&first, &object_box(41, 41));
    c.detect(&first);
    assert!(!c.result.confident_indices.is_empty());

    let empty = Image::from_fn(W, H, |x, y| (20 + x / 4 + y / 8) as u8);
    c.detect(&empty);
    assert!(c.result.confident_indices.is_empty());
    assert!(c.result.posteriors.iter().all(|&p| p == 0.0));
}

// ===== Posterior bounds =====

#[test]
fn posteriors_bounded_after_learning() {
    let img = scene(41, 41);
    let mut c = trained_cascade(&img, &object_box(41, 41));
    for i in 0..c.num_windows() {
        c.learn_window(&img, i, i % 5 != 0);
    }
    let max = 1.0 / c.ensemble.num_trees() as f32;
    assert!(c.ensemble.posteriors().iter().all(|&p| (0.0..=max + 1e-6).contains(&p)));
}

// ===== NN classifier =====

#[test]
fn nn_cold_start_is_exact() {
    let img = scene(41, 41);
    let mut nn = NnClassifier::new(&DetectorConfig::default());
    let bb = object_box(41, 41);
    assert_eq!(nn.classify_bb(&img, &bb), 0.0);

    nn.learn([LabeledPatch {
        patch: NormalizedPatch::extract(&img, &bb),
        positive: true,
    }]);
    assert_eq!(nn.classify_bb(&img, &BoundingBox::new(5.0, 5.0, 30.0, 30.0)), 1.0);
}

#[test]
fn nn_confidence_in_unit_interval() {
    let img = scene(41, 41);
    let mut nn = NnClassifier::new(&DetectorConfig::default());
    nn.learn([
        LabeledPatch {
            patch: NormalizedPatch::extract(&img, &object_box(41, 41)),
            positive: true,
        },
        LabeledPatch {
            patch: NormalizedPatch::extract(&img, &BoundingBox::new(60.0, 20.0, 40.0, 40.0)),
            positive: false,
        },
    ]);
    for (x, y) in [(1.0, 1.0), (30.0, 35.0), (45.0, 40.0), (100.0, 70.0)] {
        let c = nn.classify_bb(&img, &BoundingBox::new(x, y, 40.0, 40.0));
        assert!((0.0..=1.0).contains(&c), "confidence {c} at ({x}, {y})");
    }
}
