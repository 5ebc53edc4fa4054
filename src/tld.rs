// tld.rs — Tracking-Learning-Detection controller.
//
// Per frame:
//
//   store previous frame/box → track (motion tracker) → detect (cascade)
//                            → fuse the two hypotheses → learn (P-N)
//
// Fusion picks one box: the tracker's, unless exactly one detector cluster
// exists, the NN memory prefers it, and the two boxes disagree. Validity has
// hysteresis: a weak tracker box stays valid if the previous frame was.
//
// Learning treats the current box as ground truth. Windows overlapping it
// strongly are positives; windows far from it that the ensemble still finds
// plausible are negatives. It only runs on valid frames, so a drifting
// tracker that the NN memory does not trust cannot teach the detector.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::bbox::BoundingBox;
use crate::cascade::DetectorCascade;
use crate::config::TldConfig;
use crate::error::{Result, TldError};
use crate::image::Image;
use crate::median_flow::{MedianFlowTracker, MotionTracker};
use crate::nn_classifier::LabeledPatch;
use crate::patch::NormalizedPatch;

/// Windows above this overlap with the current box are positives.
const POSITIVE_OVERLAP: f32 = 0.6;
/// Windows below this overlap with the current box are negative candidates.
const NEGATIVE_OVERLAP: f32 = 0.2;
/// At most this many positive windows train the ensemble per step.
const MAX_POSITIVES: usize = 10;
/// At most this many shuffled negatives train the NN at selection time.
const MAX_INITIAL_NEGATIVES: usize = 100;
/// Ensemble posterior gate for negatives that train the ensemble.
const ENSEMBLE_NEGATIVE_GATE: f32 = 0.1;
/// Ensemble posterior gate for negatives that train the NN memory.
const NN_NEGATIVE_GATE: f32 = 0.5;
/// Below this overlap the detector and tracker boxes disagree.
const DISAGREEMENT_OVERLAP: f32 = 0.5;

// ---------------------------------------------------------------------------
// Fusion
// ---------------------------------------------------------------------------

/// A candidate box and its NN confidence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hypothesis {
    pub bbox: BoundingBox,
    pub confidence: f32,
}

/// Outcome of fusing the tracker and detector hypotheses.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fusion {
    pub bounding_box: Option<BoundingBox>,
    pub confidence: f32,
    pub valid: bool,
}

/// Combine the motion tracker's box with the detector's single-cluster box.
///
/// `detector` must be `Some` exactly when the detector produced one cluster.
pub fn fuse_hypotheses(
    tracker: Option<Hypothesis>,
    detector: Option<Hypothesis>,
    was_valid: bool,
    theta_tp: f32,
    theta_fp: f32,
) -> Fusion {
    match (tracker, detector) {
        (Some(t), Some(d)) if d.confidence > t.confidence && t.bbox.overlap(&d.bbox) < DISAGREEMENT_OVERLAP => {
            Fusion {
                bounding_box: Some(d.bbox),
                confidence: d.confidence,
                valid: false,
            }
        }
        (Some(t), _) => Fusion {
            bounding_box: Some(t.bbox),
            confidence: t.confidence,
            valid: t.confidence > theta_tp || (was_valid && t.confidence > theta_fp),
        },
        (None, Some(d)) => Fusion {
            bounding_box: Some(d.bbox),
            confidence: d.confidence,
            valid: false,
        },
        (None, None) => Fusion {
            bounding_box: None,
            confidence: 0.0,
            valid: false,
        },
    }
}

// ---------------------------------------------------------------------------
// TrackResult
// ---------------------------------------------------------------------------

/// What the tracker reports for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackResult {
    /// None when the target is lost.
    pub bounding_box: Option<BoundingBox>,
    pub confidence: f32,
    /// The box is trusted enough to learn from.
    pub valid: bool,
    /// A learning step ran on this frame.
    pub learning: bool,
    pub num_clusters: usize,
}

// ---------------------------------------------------------------------------
// Tld
// ---------------------------------------------------------------------------

pub struct Tld {
    config: TldConfig,
    image_width: usize,
    image_height: usize,
    tracker: Box<dyn MotionTracker>,
    detector: DetectorCascade,
    prev_img: Option<Image<u8>>,
    curr_bb: Option<BoundingBox>,
    confidence: f32,
    valid: bool,
    was_valid: bool,
    learning: bool,
}

impl Tld {
    /// Tracker for frames of `image_width × image_height`, using median flow
    /// as the motion tracker.
    pub fn new(config: TldConfig, image_width: usize, image_height: usize) -> Self {
        let tracker = Box::new(MedianFlowTracker::new(config.median_flow.clone()));
        Self::with_tracker(config, image_width, image_height, tracker)
    }

    /// Same as [`Tld::new`] with a caller-supplied motion tracker.
    pub fn with_tracker(
        config: TldConfig,
        image_width: usize,
        image_height: usize,
        tracker: Box<dyn MotionTracker>,
    ) -> Self {
        // `detector_enabled` gates per-frame detection and learning only.
        // The bootstrap pass in `select_object` always runs.
        let detector = DetectorCascade::new(config.detector.clone(), image_width, image_height);
        Tld {
            config,
            image_width,
            image_height,
            tracker,
            detector,
            prev_img: None,
            curr_bb: None,
            confidence: 0.0,
            valid: false,
            was_valid: false,
            learning: false,
        }
    }

    pub fn config(&self) -> &TldConfig {
        &self.config
    }

    pub fn detector(&self) -> &DetectorCascade {
        &self.detector
    }

    pub fn current_bb(&self) -> Option<BoundingBox> {
        self.curr_bb
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn is_learning(&self) -> bool {
        self.learning
    }

    /// Stop tracking and drop the learned model.
    pub fn release(&mut self) {
        self.detector.release();
        self.prev_img = None;
        self.curr_bb = None;
        self.confidence = 0.0;
        self.valid = false;
        self.was_valid = false;
        self.learning = false;
    }

    fn check_frame(&self, img: &Image<u8>) -> Result<()> {
        if img.width() != self.image_width || img.height() != self.image_height {
            return Err(TldError::FrameSize {
                expected: (self.image_width, self.image_height),
                got: (img.width(), img.height()),
            });
        }
        Ok(())
    }

    /// Start tracking `bbox` in `img`, replacing any previous target.
    ///
    /// # Errors
    /// `FrameSize` for a frame of the wrong size; `InvalidConfig` for an
    /// out-of-range fern bank; `MissingDimensions` or
    /// `EmptyWindowGrid` when no scanning window fits the box.
    pub fn select_object(&mut self, img: &Image<u8>, bbox: &BoundingBox) -> Result<()> {
        self.check_frame(img)?;
        self.release();

        let object_width = if bbox.width.is_finite() { bbox.width.max(0.0) as usize } else { 0 };
        let object_height = if bbox.height.is_finite() { bbox.height.max(0.0) as usize } else { 0 };
        self.detector.init(object_width, object_height)?;

        self.curr_bb = Some(*bbox);
        self.confidence = 1.0;
        self.valid = true;
        self.initial_learning(img, bbox);
        self.prev_img = Some(img.clone());

        info!(
            windows = self.detector.num_windows(),
            scales = self.detector.grid().map_or(0, |g| g.num_scales()),
            min_var = self.detector.variance_filter.min_var(),
            positives = self.detector.nn.positives().len(),
            negatives = self.detector.nn.negatives().len(),
            "object selected"
        );
        Ok(())
    }

    /// Process the next frame.
    ///
    /// # Errors
    /// `NotInitialised` before `select_object`; `FrameSize` for a frame of
    /// the wrong size.
    pub fn process_image(&mut self, img: &Image<u8>) -> Result<TrackResult> {
        self.check_frame(img)?;
        let prev_img = self.prev_img.take().ok_or(TldError::NotInitialised)?;

        let prev_bb = self.curr_bb.take();
        self.was_valid = self.valid;
        self.valid = false;
        self.confidence = 0.0;
        self.learning = false;
        self.detector.result.reset();

        let tracker_bb = match prev_bb {
            Some(bb) if self.config.tracker_enabled => self.tracker.track(&prev_img, img, &bb),
            _ => None,
        };

        if self.config.detector_enabled && (!self.config.alternating || tracker_bb.is_none()) {
            self.detector.detect(img);
        }

        self.fuse(img, tracker_bb);
        // Learning may run its own detection pass; report the one fusion saw.
        let num_clusters = self.detector.result.num_clusters;
        self.learn(img);
        self.prev_img = Some(img.clone());

        Ok(TrackResult {
            bounding_box: self.curr_bb,
            confidence: self.confidence,
            valid: self.valid,
            learning: self.learning,
            num_clusters,
        })
    }

    fn fuse(&mut self, img: &Image<u8>, tracker_bb: Option<BoundingBox>) {
        let detector_bb = if self.detector.result.num_clusters == 1 {
            self.detector.result.detector_bb
        } else {
            None
        };

        let nn = &mut self.detector.nn;
        let detector = detector_bb.map(|bbox| Hypothesis {
            bbox,
            confidence: nn.classify_bb(img, &bbox),
        });
        let tracker = tracker_bb.map(|bbox| Hypothesis {
            bbox,
            confidence: nn.classify_bb(img, &bbox),
        });

        let fusion = fuse_hypotheses(tracker, detector, self.was_valid, nn.theta_tp, nn.theta_fp);
        self.curr_bb = fusion.bounding_box;
        self.confidence = fusion.confidence;
        self.valid = fusion.valid;
    }

    /// Bootstrap both classifiers from the selected box.
    fn initial_learning(&mut self, img: &Image<u8>, bbox: &BoundingBox) {
        self.learning = true;
        // Fills the per-window variances used to pick negatives.
        self.detector.detect(img);

        let patch = NormalizedPatch::extract(img, bbox);
        self.detector.variance_filter.set_min_var_from_patch(patch.variance());

        let overlaps = self.detector.window_overlaps(bbox);
        let positives = top_positives(&overlaps);
        let min_var = self.detector.variance_filter.min_var();
        let check_variance = self.detector.variance_filter.enabled;
        let variances = &self.detector.result.variances;
        let mut negatives: Vec<usize> = overlaps
            .iter()
            .enumerate()
            .filter(|&(i, &o)| o < NEGATIVE_OVERLAP && (!check_variance || variances[i] > min_var))
            .map(|(i, _)| i)
            .collect();

        let mut rng = StdRng::seed_from_u64(self.config.shuffle_seed);
        negatives.shuffle(&mut rng);
        negatives.truncate(MAX_INITIAL_NEGATIVES);

        let mut examples = vec![LabeledPatch { patch, positive: true }];
        examples.extend(self.window_patches(img, &negatives, false));

        for &i in &positives {
            self.detector.learn_window(img, i, true);
        }
        self.detector.nn.learn(examples);

        debug!(
            positives = positives.len(),
            negatives = negatives.len(),
            "initial learning"
        );
    }

    /// One P-N learning step against the current box.
    fn learn(&mut self, img: &Image<u8>) {
        let bbox = match self.curr_bb {
            Some(bb) if self.config.learning_enabled && self.valid && self.config.detector_enabled => bb,
            _ => {
                self.learning = false;
                return;
            }
        };
        self.learning = true;

        if !self.detector.result.contains_valid_data {
            self.detector.detect(img);
        }

        let overlaps = self.detector.window_overlaps(&bbox);
        let positives = top_positives(&overlaps);
        let ensemble_enabled = self.detector.ensemble.enabled;
        let posteriors = &self.detector.result.posteriors;

        let mut negatives = Vec::new();
        let mut nn_negatives = Vec::new();
        for (i, &o) in overlaps.iter().enumerate() {
            if o >= NEGATIVE_OVERLAP {
                continue;
            }
            if !ensemble_enabled || posteriors[i] > NN_NEGATIVE_GATE {
                nn_negatives.push(i);
            }
            if !ensemble_enabled || posteriors[i] > ENSEMBLE_NEGATIVE_GATE {
                negatives.push(i);
            }
        }

        let mut examples = vec![LabeledPatch {
            patch: NormalizedPatch::extract(img, &bbox),
            positive: true,
        }];
        examples.extend(self.window_patches(img, &nn_negatives, false));

        // Negatives reached the ensemble this frame, so their stored
        // feature vectors are current.
        for &i in &negatives {
            self.detector.learn_stored_window(i, false);
        }
        for &i in &positives {
            self.detector.learn_window(img, i, true);
        }
        self.detector.nn.learn(examples);

        debug!(
            positives = positives.len(),
            ensemble_negatives = negatives.len(),
            nn_negatives = nn_negatives.len(),
            nn_positive_memory = self.detector.nn.positives().len(),
            nn_negative_memory = self.detector.nn.negatives().len(),
            "learning step"
        );
    }

    /// Normalized patches of the given grid windows, all with one label.
    fn window_patches(&self, img: &Image<u8>, indices: &[usize], positive: bool) -> Vec<LabeledPatch> {
        let Some(grid) = self.detector.grid() else {
            return Vec::new();
        };
        indices
            .iter()
            .map(|&i| LabeledPatch {
                patch: NormalizedPatch::extract(img, &grid.window(i)),
                positive,
            })
            .collect()
    }
}

/// Indices of windows with overlap above the positive threshold, highest
/// overlap first, at most MAX_POSITIVES.
fn top_positives(overlaps: &[f32]) -> Vec<usize> {
    let mut positives: Vec<(usize, f32)> = overlaps
        .iter()
        .enumerate()
        .filter(|&(_, &o)| o > POSITIVE_OVERLAP)
        .map(|(i, &o)| (i, o))
        .collect();
    positives.sort_by(|a, b| b.1.total_cmp(&a.1));
    positives.truncate(MAX_POSITIVES);
    positives.into_iter().map(|(i, _)| i).collect()
}
