// tld_tracker: single-object Tracking-Learning-Detection
//
// A median-flow motion tracker follows the target frame to frame while a
// sliding-window detector cascade (variance → random ferns → nearest
// neighbour) searches the whole frame. The controller fuses both and
// retrains the detector online from its own confident output (P-N learning).
//
// Reference: Kalal, Mikolajczyk, Matas — "Tracking-Learning-Detection"
// (TPAMI 2012)

pub mod error;
pub mod config;

// Image primitives
pub mod image;
pub mod convolution;
pub mod pyramid;
pub mod integral;
pub mod bbox;
pub mod patch;

// Motion tracking
pub mod klt;
pub mod median_flow;

// Detection
pub mod window_grid;
pub mod detection;
pub mod variance_filter;
pub mod ensemble;
pub mod nn_classifier;
pub mod clustering;
pub mod cascade;

// Controller
pub mod tld;

pub use bbox::BoundingBox;
pub use config::{ClusterBox, DetectorConfig, MedianFlowConfig, TldConfig};
pub use error::{Result, TldError};
pub use image::Image;
pub use median_flow::{MedianFlowTracker, MotionTracker};
pub use tld::{fuse_hypotheses, Fusion, Hypothesis, Tld, TrackResult};
