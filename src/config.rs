// config.rs — Tracker configuration.
//
// Everything here is fixed once tracking starts. Defaults follow the
// reference TLD settings. Every struct is `#[serde(default)]`, so a partial
// document only has to name the fields it changes.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TldError};

/// Upper bound on ferns per ensemble.
pub const MAX_TREES: usize = 64;
/// Upper bound on comparisons per fern (2^16 bins per tree).
pub const MAX_FEATURES: usize = 16;

/// How the single-cluster detector box is built from its member windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterBox {
    /// Rounded mean of the member windows' x, y, width, height.
    Mean,
    /// Smallest rectangle containing every member window.
    Span,
}

/// Detector cascade configuration: window grid, classifiers, clustering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Smallest scale exponent: window size = object size · 1.2^i.
    pub min_scale: i32,
    /// Largest scale exponent.
    pub max_scale: i32,
    /// Windows narrower or shorter than this are discarded.
    pub min_size: usize,
    /// Step proportional to window size (`shift`); otherwise 1 px.
    pub use_shift: bool,
    /// Window step as a fraction of the window size.
    pub shift: f32,
    /// Number of ferns in the ensemble.
    pub num_trees: usize,
    /// Binary comparisons per fern; each fern has 2^num_features bins.
    pub num_features: usize,
    /// Seed for fern feature locations.
    pub feature_seed: u64,
    /// NN acceptance threshold ("this is the target").
    pub theta_tp: f32,
    /// NN hard-negative threshold used while learning.
    pub theta_fp: f32,
    pub variance_enabled: bool,
    pub ensemble_enabled: bool,
    pub nn_enabled: bool,
    /// Confident windows closer than this (1 - overlap) join a cluster.
    pub cluster_cutoff: f32,
    pub cluster_box: ClusterBox,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        DetectorConfig {
            min_scale: -10,
            max_scale: 10,
            min_size: 25,
            use_shift: true,
            shift: 0.1,
            num_trees: 10,
            num_features: 13,
            feature_seed: 0,
            theta_tp: 0.65,
            theta_fp: 0.5,
            variance_enabled: true,
            ensemble_enabled: true,
            nn_enabled: true,
            cluster_cutoff: 0.5,
            cluster_box: ClusterBox::Mean,
        }
    }
}

impl DetectorConfig {
    /// Check the fern-bank sizes before any table is allocated.
    ///
    /// # Errors
    /// `InvalidConfig` when `num_trees` or `num_features` is zero or above
    /// its maximum.
    pub fn validate(&self) -> Result<()> {
        for (name, value, max) in [
            ("num_trees", self.num_trees, MAX_TREES),
            ("num_features", self.num_features, MAX_FEATURES),
        ] {
            if value == 0 || value > max {
                return Err(TldError::InvalidConfig { name, value, max });
            }
        }
        Ok(())
    }
}

/// Median-flow motion tracker configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MedianFlowConfig {
    /// Points per side of the tracking grid (grid_points² points total).
    pub grid_points: usize,
    /// Inset of the point grid from the box border, in pixels.
    pub margin: f32,
    /// Side of the square patch compared by NCC around each point.
    pub ncc_window: usize,
    /// Tracking fails when the median forward-backward error exceeds this.
    pub max_median_fb: f32,
    pub pyramid_levels: usize,
    pub pyramid_sigma: f32,
    /// KLT patch half-size.
    pub klt_window: usize,
    pub klt_max_iter: usize,
    pub klt_epsilon: f32,
}

impl Default for MedianFlowConfig {
    fn default() -> Self {
        MedianFlowConfig {
            grid_points: 10,
            margin: 5.0,
            ncc_window: 10,
            max_median_fb: 10.0,
            pyramid_levels: 3,
            pyramid_sigma: 1.0,
            klt_window: 5,
            klt_max_iter: 20,
            klt_epsilon: 0.03,
        }
    }
}

/// Top-level tracker configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TldConfig {
    pub tracker_enabled: bool,
    pub detector_enabled: bool,
    pub learning_enabled: bool,
    /// Skip detection on frames where the motion tracker succeeded.
    pub alternating: bool,
    /// Seed for the negative-example shuffle during initial learning.
    pub shuffle_seed: u64,
    pub detector: DetectorConfig,
    pub median_flow: MedianFlowConfig,
}

impl Default for TldConfig {
    fn default() -> Self {
        TldConfig {
            tracker_enabled: true,
            detector_enabled: true,
            learning_enabled: true,
            alternating: false,
            shuffle_seed: 1,
            detector: DetectorConfig::default(),
            median_flow: MedianFlowConfig::default(),
        }
    }
}
