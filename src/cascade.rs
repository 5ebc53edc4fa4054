// cascade.rs — Detector cascade: window grid + three stages + clustering.
//
// Per frame:
//
//   reset → (disabled? stop) → rebuild integral tables
//         → for each window: variance → ensemble → NN (first failure stops)
//         → cluster the survivors → contains_valid_data = true
//
// "No detection" is not an error: it shows up as num_clusters == 0 or
// detector_bb == None.
//
// The cascade owns all per-object state (grid, fern tables, exemplar
// memory, detection buffer). `init` builds it for an object size and
// `release` drops it.

use tracing::debug;

use crate::bbox::BoundingBox;
use crate::clustering::Clustering;
use crate::config::DetectorConfig;
use crate::detection::DetectionResult;
use crate::ensemble::EnsembleClassifier;
use crate::error::Result;
use crate::image::Image;
use crate::nn_classifier::NnClassifier;
use crate::variance_filter::VarianceFilter;
use crate::window_grid::WindowGrid;

#[derive(Debug, Clone)]
pub struct DetectorCascade {
    pub enabled: bool,
    config: DetectorConfig,
    image_width: usize,
    image_height: usize,
    grid: Option<WindowGrid>,
    pub variance_filter: VarianceFilter,
    pub ensemble: EnsembleClassifier,
    pub nn: NnClassifier,
    pub clustering: Clustering,
    pub result: DetectionResult,
}

impl DetectorCascade {
    pub fn new(config: DetectorConfig, image_width: usize, image_height: usize) -> Self {
        DetectorCascade {
            enabled: true,
            image_width,
            image_height,
            grid: None,
            variance_filter: VarianceFilter::new(config.variance_enabled),
            ensemble: EnsembleClassifier::new(&config),
            nn: NnClassifier::new(&config),
            clustering: Clustering::new(config.cluster_cutoff, config.cluster_box),
            result: DetectionResult::default(),
            config,
        }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Build the window grid and fern tables for an object size.
    ///
    /// # Errors
    /// `InvalidConfig` for out-of-range fern sizes, otherwise see
    /// [`WindowGrid::new`].
    pub fn init(&mut self, object_width: usize, object_height: usize) -> Result<()> {
        self.release();
        self.config.validate()?;
        let grid = WindowGrid::new(
            self.image_width,
            self.image_height,
            object_width,
            object_height,
            &self.config,
        )?;
        self.ensemble.init(&grid);
        self.result = DetectionResult::new(grid.num_windows(), self.ensemble.num_trees());
        self.grid = Some(grid);
        Ok(())
    }

    /// Forget the object: grid, posteriors, exemplars and `min_var`.
    pub fn release(&mut self) {
        self.grid = None;
        self.variance_filter.release();
        self.ensemble.release();
        self.nn.release();
        self.result = DetectionResult::default();
    }

    pub fn is_initialised(&self) -> bool {
        self.grid.is_some()
    }

    pub fn grid(&self) -> Option<&WindowGrid> {
        self.grid.as_ref()
    }

    pub fn num_windows(&self) -> usize {
        self.grid.as_ref().map_or(0, WindowGrid::num_windows)
    }

    /// Overlap of every window with `bbox`; empty before `init`.
    pub fn window_overlaps(&self, bbox: &BoundingBox) -> Vec<f32> {
        self.grid.as_ref().map_or_else(Vec::new, |g| g.overlaps(bbox))
    }

    /// Train the ensemble on window `i` of `img`, recomputing its features.
    pub fn learn_window(&mut self, img: &Image<u8>, i: usize, positive: bool) {
        let Some(grid) = &self.grid else {
            return;
        };
        let mut fv = vec![0; self.ensemble.num_trees()];
        self.ensemble.feature_vector(img, grid, i, &mut fv);
        self.ensemble.learn(&fv, positive);
    }

    /// Train the ensemble on window `i` with the features stored by the
    /// last detection pass. Only meaningful for windows that reached the
    /// ensemble stage.
    pub fn learn_stored_window(&mut self, i: usize, positive: bool) {
        self.ensemble.learn(self.result.feature_vector(i), positive);
    }

    /// Run one detection pass over `img`.
    pub fn detect(&mut self, img: &Image<u8>) {
        self.result.reset();
        let grid = match (&self.grid, self.enabled) {
            (Some(grid), true) => grid,
            _ => return,
        };

        self.variance_filter.next_iteration(img);

        for i in 0..grid.num_windows() {
            if !self.variance_filter.filter(grid, &mut self.result, i) {
                self.result.variance_rejected += 1;
                continue;
            }
            if !self.ensemble.filter(img, grid, &mut self.result, i) {
                self.result.ensemble_rejected += 1;
                continue;
            }
            if !self.nn.filter(img, grid, i) {
                self.result.nn_rejected += 1;
                continue;
            }
            self.result.confident_indices.push(i);
        }

        self.clustering.cluster_confident_indices(grid, &mut self.result);
        self.result.contains_valid_data = true;

        debug!(
            windows = grid.num_windows(),
            variance_rejected = self.result.variance_rejected,
            ensemble_rejected = self.result.ensemble_rejected,
            nn_rejected = self.result.nn_rejected,
            confident = self.result.confident_indices.len(),
            clusters = self.result.num_clusters,
            "detection pass"
        );
    }
}
