// ensemble.rs — Cascade stage 2: random-fern bank.
//
// Each fern ("tree") turns a window into a `num_features`-bit index by
// comparing `num_features` pairs of raw pixel intensities. The index picks a
// leaf bin holding positive/negative hit counts and a derived posterior
// `pos / (pos + neg) / num_trees`. The window's confidence is the sum of the
// selected bins over all trees, so it lies in [0, 1].
//
// Feature locations are drawn once from a seeded RNG as relative
// coordinates in [0, 1) and then fixed per scale. At scale s each comparison
// is stored as two pixel offsets from the window's top-left pixel in the
// frame buffer, so evaluating a fern is `num_features` pairs of slice reads.
//
// NEW RUST CONCEPTS:
// - rand::rngs::StdRng + SeedableRng for reproducible draws
// - Flat Vec<[usize; 2]> tables indexed by (scale, tree, feature)

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::DetectorConfig;
use crate::detection::DetectionResult;
use crate::image::Image;
use crate::window_grid::WindowGrid;

/// Confidence at or above which the ensemble accepts a window.
pub const ENSEMBLE_THRESHOLD: f32 = 0.5;

#[derive(Debug, Clone)]
pub struct EnsembleClassifier {
    pub enabled: bool,
    num_trees: usize,
    num_features: usize,
    seed: u64,
    /// Frame stride the offsets were computed for.
    stride: usize,
    /// `[offset_a, offset_b]` per (scale, tree, feature).
    offsets: Vec<[usize; 2]>,
    positives: Vec<u32>,
    negatives: Vec<u32>,
    posteriors: Vec<f32>,
}

impl EnsembleClassifier {
    pub fn new(config: &DetectorConfig) -> Self {
        EnsembleClassifier {
            enabled: config.ensemble_enabled,
            num_trees: config.num_trees,
            num_features: config.num_features,
            seed: config.feature_seed,
            stride: 0,
            offsets: Vec::new(),
            positives: Vec::new(),
            negatives: Vec::new(),
            posteriors: Vec::new(),
        }
    }

    /// Draw feature locations for every scale of `grid` and clear the
    /// posterior tables. The same seed always produces the same offsets.
    pub fn init(&mut self, grid: &WindowGrid) {
        let (stride, _) = grid.image_size();
        self.stride = stride;

        let mut rng = StdRng::seed_from_u64(self.seed);
        let relative: Vec<[f32; 4]> = (0..self.num_trees * self.num_features)
            .map(|_| [rng.gen::<f32>(), rng.gen::<f32>(), rng.gen::<f32>(), rng.gen::<f32>()])
            .collect();

        self.offsets.clear();
        self.offsets.reserve(grid.num_scales() * relative.len());
        for scale in grid.scales() {
            let w = (scale.width - 1) as f32;
            let h = (scale.height - 1) as f32;
            for r in &relative {
                let x0 = (w * r[0]) as usize;
                let y0 = (h * r[1]) as usize;
                let x1 = (w * r[2]) as usize;
                let y1 = (h * r[3]) as usize;
                self.offsets.push([y0 * stride + x0, y1 * stride + x1]);
            }
        }

        let bins = self.num_trees * self.num_bins();
        self.positives = vec![0; bins];
        self.negatives = vec![0; bins];
        self.posteriors = vec![0.0; bins];
    }

    pub fn release(&mut self) {
        self.offsets.clear();
        self.positives.clear();
        self.negatives.clear();
        self.posteriors.clear();
    }

    pub fn num_trees(&self) -> usize {
        self.num_trees
    }

    /// Leaf bins per tree: 2^num_features.
    pub fn num_bins(&self) -> usize {
        1 << self.num_features
    }

    /// Every bin's posterior, tree-major.
    pub fn posteriors(&self) -> &[f32] {
        &self.posteriors
    }

    /// Fern indices of window `i` in `img`, one per tree, written to `out`.
    pub fn feature_vector(&self, img: &Image<u8>, grid: &WindowGrid, i: usize, out: &mut [usize]) {
        debug_assert_eq!(img.width(), self.stride);
        debug_assert_eq!(out.len(), self.num_trees);
        let pixels = img.as_slice();
        let (x, y) = grid.origin(i);
        let base = y * self.stride + x;
        let per_scale = self.num_trees * self.num_features;
        let scale_offsets = &self.offsets[grid.scale_index(i) * per_scale..][..per_scale];

        for (tree, fern) in scale_offsets.chunks_exact(self.num_features).enumerate() {
            let mut index = 0usize;
            for &[a, b] in fern {
                index <<= 1;
                if pixels[base + a] > pixels[base + b] {
                    index |= 1;
                }
            }
            out[tree] = index;
        }
    }

    /// Summed posterior for a feature vector.
    pub fn confidence(&self, feature_vector: &[usize]) -> f32 {
        let bins = self.num_bins();
        feature_vector
            .iter()
            .enumerate()
            .map(|(tree, &idx)| self.posteriors[tree * bins + idx])
            .sum()
    }

    /// Stage test for window `i`. Stores the feature vector and confidence
    /// in `result` so the learning step can reuse them.
    pub fn filter(&self, img: &Image<u8>, grid: &WindowGrid, result: &mut DetectionResult, i: usize) -> bool {
        if !self.enabled {
            return true;
        }
        self.feature_vector(img, grid, i, result.feature_vector_mut(i));
        let conf = self.confidence(result.feature_vector(i));
        result.posteriors[i] = conf;
        conf >= ENSEMBLE_THRESHOLD
    }

    /// Add `amount` hits of one label to the selected bin of every tree.
    pub fn update(&mut self, feature_vector: &[usize], positive: bool, amount: u32) {
        let bins = self.num_bins();
        for (tree, &idx) in feature_vector.iter().enumerate() {
            let slot = tree * bins + idx;
            if positive {
                self.positives[slot] += amount;
            } else {
                self.negatives[slot] += amount;
            }
            let pos = self.positives[slot];
            let neg = self.negatives[slot];
            self.posteriors[slot] = if pos == 0 {
                0.0
            } else {
                pos as f32 / (pos + neg) as f32 / self.num_trees as f32
            };
        }
    }

    /// Learn one labelled example, but only when the current confidence
    /// disagrees with the label.
    pub fn learn(&mut self, feature_vector: &[usize], positive: bool) {
        if !self.enabled {
            return;
        }
        let conf = self.confidence(feature_vector);
        if (positive && conf < ENSEMBLE_THRESHOLD) || (!positive && conf > ENSEMBLE_THRESHOLD) {
            self.update(feature_vector, positive, 1);
        }
    }
}
