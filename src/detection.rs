// detection.rs — Per-frame output of the detector cascade.
//
// Every array is indexed by window (see window_grid.rs). `feature_vectors`
// is flat: window i's fern indices live at [i * num_trees, (i + 1) * num_trees).
//
// The buffer is sized once per window grid and fully reset at the start of
// each detection pass, so nothing from frame t leaks into frame t+1.

use crate::bbox::BoundingBox;

#[derive(Debug, Clone, Default)]
pub struct DetectionResult {
    num_trees: usize,
    /// Window variance, written by the variance filter (0 if not evaluated).
    pub variances: Vec<f32>,
    /// Summed fern posterior, 0 for windows that never reached the ensemble.
    pub posteriors: Vec<f32>,
    pub feature_vectors: Vec<usize>,
    /// Windows that passed every enabled stage, in window order.
    pub confident_indices: Vec<usize>,
    pub num_clusters: usize,
    /// Representative box; only set when exactly one cluster exists.
    pub detector_bb: Option<BoundingBox>,
    /// True once a full detection pass has completed on the current frame.
    pub contains_valid_data: bool,

    pub variance_rejected: usize,
    pub ensemble_rejected: usize,
    pub nn_rejected: usize,
}

impl DetectionResult {
    pub fn new(num_windows: usize, num_trees: usize) -> Self {
        DetectionResult {
            num_trees,
            variances: vec![0.0; num_windows],
            posteriors: vec![0.0; num_windows],
            feature_vectors: vec![0; num_windows * num_trees],
            ..Default::default()
        }
    }

    pub fn num_windows(&self) -> usize {
        self.variances.len()
    }

    pub fn num_trees(&self) -> usize {
        self.num_trees
    }

    /// Fern indices of window `i`.
    #[inline]
    pub fn feature_vector(&self, i: usize) -> &[usize] {
        &self.feature_vectors[i * self.num_trees..(i + 1) * self.num_trees]
    }

    #[inline]
    pub fn feature_vector_mut(&mut self, i: usize) -> &mut [usize] {
        &mut self.feature_vectors[i * self.num_trees..(i + 1) * self.num_trees]
    }

    pub fn reset(&mut self) {
        self.variances.fill(0.0);
        self.posteriors.fill(0.0);
        self.feature_vectors.fill(0);
        self.confident_indices.clear();
        self.num_clusters = 0;
        self.detector_bb = None;
        self.contains_valid_data = false;
        self.variance_rejected = 0;
        self.ensemble_rejected = 0;
        self.nn_rejected = 0;
    }

    /// Windows that survived the variance stage.
    pub fn passed_variance(&self) -> usize {
        self.num_windows() - self.variance_rejected
    }

    /// Windows that survived variance and ensemble stages.
    pub fn passed_ensemble(&self) -> usize {
        self.passed_variance() - self.ensemble_rejected
    }

    /// Windows that survived every stage.
    pub fn passed_nn(&self) -> usize {
        self.passed_ensemble() - self.nn_rejected
    }
}
