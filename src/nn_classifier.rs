// nn_classifier.rs — Cascade stage 3: nearest-neighbour exemplar memory.
//
// Two growing sets of normalized patches. A candidate's confidence is the
// relative similarity
//
//     dP = 1 - max ncc(candidate, positives)
//     dN = 1 - max ncc(candidate, negatives)
//     conf = dN / (dN + dP)
//
// with two cold-start cases: no positives → 0, no negatives → 1.
//
// Exemplars are only admitted when they would change a decision: positives
// the memory does not yet recognise (conf ≤ theta_tp) and negatives it still
// finds plausible (conf ≥ theta_fp). Nothing is ever evicted.

use crate::bbox::BoundingBox;
use crate::config::DetectorConfig;
use crate::image::Image;
use crate::patch::{self, NormalizedPatch, PATCH_LEN};
use crate::window_grid::WindowGrid;

/// A patch paired with its training label.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledPatch {
    pub patch: NormalizedPatch,
    pub positive: bool,
}

#[derive(Debug, Clone)]
pub struct NnClassifier {
    pub enabled: bool,
    pub theta_tp: f32,
    pub theta_fp: f32,
    positives: Vec<NormalizedPatch>,
    negatives: Vec<NormalizedPatch>,
    /// Reused for every window the cascade classifies.
    scratch: Vec<f32>,
}

impl NnClassifier {
    pub fn new(config: &DetectorConfig) -> Self {
        NnClassifier {
            enabled: config.nn_enabled,
            theta_tp: config.theta_tp,
            theta_fp: config.theta_fp,
            positives: Vec::new(),
            negatives: Vec::new(),
            scratch: vec![0.0; PATCH_LEN],
        }
    }

    pub fn release(&mut self) {
        self.positives.clear();
        self.negatives.clear();
    }

    pub fn positives(&self) -> &[NormalizedPatch] {
        &self.positives
    }

    pub fn negatives(&self) -> &[NormalizedPatch] {
        &self.negatives
    }

    /// Relative similarity of normalized values to the exemplar memory, in [0, 1].
    pub fn classify_values(&self, values: &[f32]) -> f32 {
        if self.positives.is_empty() {
            return 0.0;
        }
        if self.negatives.is_empty() {
            return 1.0;
        }

        let max_ncc = |set: &[NormalizedPatch]| {
            set.iter()
                .map(|p| patch::ncc(values, p.values()))
                .fold(0.0f32, f32::max)
        };
        let d_p = 1.0 - max_ncc(&self.positives);
        let d_n = 1.0 - max_ncc(&self.negatives);

        let denom = d_n + d_p;
        if denom <= 0.0 {
            // Identical to both a positive and a negative exemplar.
            return 0.5;
        }
        d_n / denom
    }

    pub fn classify_patch(&self, patch: &NormalizedPatch) -> f32 {
        self.classify_values(patch.values())
    }

    /// Extract `bbox` from `img` into the scratch buffer and classify it.
    pub fn classify_bb(&mut self, img: &Image<u8>, bbox: &BoundingBox) -> f32 {
        let mut scratch = std::mem::take(&mut self.scratch);
        patch::extract_normalized(img, bbox, &mut scratch);
        let conf = self.classify_values(&scratch);
        self.scratch = scratch;
        conf
    }

    /// Stage test for window `i`.
    pub fn filter(&mut self, img: &Image<u8>, grid: &WindowGrid, i: usize) -> bool {
        if !self.enabled {
            return true;
        }
        let conf = self.classify_bb(img, &grid.window(i));
        conf >= self.theta_tp
    }

    /// Admit the examples that would change a decision. Each example is
    /// scored against the memory as it stands after the previous ones.
    pub fn learn(&mut self, examples: impl IntoIterator<Item = LabeledPatch>) {
        for LabeledPatch { patch, positive } in examples {
            let conf = self.classify_patch(&patch);
            if positive && conf <= self.theta_tp {
                self.positives.push(patch);
            } else if !positive && conf >= self.theta_fp {
                self.negatives.push(patch);
            }
        }
    }
}
