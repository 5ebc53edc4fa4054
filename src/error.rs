// error.rs — Errors surfaced by the tracker.
//
// Only setup mistakes are errors. "No detection", "tracker lost the point
// grid" and "exemplar memory empty" are ordinary per-frame outcomes and are
// reported as data on TrackResult / DetectionResult.

use thiserror::Error;

/// Errors returned by window-grid construction and the tracker controller.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TldError {
    /// Image or object dimensions were not set (zero) when the detector
    /// cascade was initialised.
    #[error(
        "image ({image_width}x{image_height}) or object ({object_width}x{object_height}) dimensions not set"
    )]
    MissingDimensions {
        image_width: usize,
        image_height: usize,
        object_width: usize,
        object_height: usize,
    },

    /// Every scale was discarded: the object is larger than the scan area
    /// or smaller than the minimum window size at every scale.
    #[error("no scanning window fits an object of {object_width}x{object_height} in a {image_width}x{image_height} image")]
    EmptyWindowGrid {
        image_width: usize,
        image_height: usize,
        object_width: usize,
        object_height: usize,
    },

    /// A frame did not match the dimensions the tracker was created for.
    #[error("frame is {got:?}, tracker expects {expected:?}")]
    FrameSize {
        expected: (usize, usize),
        got: (usize, usize),
    },

    /// A fern-bank size outside its supported range.
    #[error("{name} = {value} is outside 1..={max}")]
    InvalidConfig {
        name: &'static str,
        value: usize,
        max: usize,
    },

    /// `process_image` was called before `select_object`.
    #[error("no object selected")]
    NotInitialised,
}

pub type Result<T> = std::result::Result<T, TldError>;
