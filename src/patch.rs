// patch.rs — Size-normalized, mean-centred image patches.
//
// The NN classifier compares everything at a fixed 15×15 resolution:
// whatever the box size, it is resampled (bilinear) to PATCH_SIZE²
// samples and the patch mean is subtracted. Correlation between two
// mean-centred patches is then the Pearson coefficient of the samples.
//
// The resampling grid matches a standard bilinear resize: output sample
// (i, j) reads the source at (x + (i + 0.5) * w / N - 0.5, ...).

use crate::bbox::BoundingBox;
use crate::image::{interpolate_bilinear, Image, Pixel};

/// Side length of a normalized patch.
pub const PATCH_SIZE: usize = 15;

/// Number of samples in a normalized patch.
pub const PATCH_LEN: usize = PATCH_SIZE * PATCH_SIZE;

/// A normalized patch: PATCH_SIZE² mean-centred samples.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedPatch {
    values: Vec<f32>,
}

impl NormalizedPatch {
    /// Resample `bbox` from `img` and subtract the mean.
    pub fn extract<T: Pixel>(img: &Image<T>, bbox: &BoundingBox) -> Self {
        let mut values = vec![0.0; PATCH_LEN];
        extract_normalized(img, bbox, &mut values);
        NormalizedPatch { values }
    }

    /// Wrap values that are already normalized.
    ///
    /// # Panics
    /// Panics if `values.len() != PATCH_LEN`.
    pub fn from_values(values: Vec<f32>) -> Self {
        assert_eq!(values.len(), PATCH_LEN, "patch must have {PATCH_LEN} samples");
        NormalizedPatch { values }
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Sample variance of the patch (values are already zero-mean).
    pub fn variance(&self) -> f32 {
        variance(&self.values)
    }
}

/// Resample `bbox` into `out` (row-major, `N×N` where `N² == out.len()`)
/// and mean-centre it. `out` is the caller's scratch buffer.
///
/// # Panics
/// Panics if `out.len()` is not a perfect square.
pub fn extract_normalized<T: Pixel>(img: &Image<T>, bbox: &BoundingBox, out: &mut [f32]) {
    let n = (out.len() as f32).sqrt().round() as usize;
    assert_eq!(n * n, out.len(), "patch buffer must be square");
    resample(img, bbox, n, n, out);
    mean_center(out);
}

/// Bilinear resample of `bbox` into a `cols × rows` grid.
pub fn resample<T: Pixel>(img: &Image<T>, bbox: &BoundingBox, cols: usize, rows: usize, out: &mut [f32]) {
    debug_assert_eq!(out.len(), cols * rows);
    let sx = bbox.width / cols as f32;
    let sy = bbox.height / rows as f32;
    for j in 0..rows {
        let y = bbox.y + (j as f32 + 0.5) * sy - 0.5;
        for i in 0..cols {
            let x = bbox.x + (i as f32 + 0.5) * sx - 0.5;
            out[j * cols + i] = interpolate_bilinear(img, x, y);
        }
    }
}

/// Subtract the mean from every value.
pub fn mean_center(values: &mut [f32]) {
    if values.is_empty() {
        return;
    }
    let mean = values.iter().sum::<f32>() / values.len() as f32;
    for v in values.iter_mut() {
        *v -= mean;
    }
}

/// Population variance `E[x²] - E[x]²`.
pub fn variance(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f32;
    let mean = values.iter().sum::<f32>() / n;
    let mean_sq = values.iter().map(|v| v * v).sum::<f32>() / n;
    (mean_sq - mean * mean).max(0.0)
}

/// Normalized cross-correlation mapped to [0, 1]: `(cos + 1) / 2`.
///
/// For mean-centred inputs, `cos` is the Pearson coefficient. A flat patch
/// has no direction, so any comparison involving one scores 0.5
/// (uncorrelated).
pub fn ncc(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    let mut corr = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&va, &vb) in a.iter().zip(b) {
        corr += (va * vb) as f64;
        norm_a += (va * va) as f64;
        norm_b += (vb * vb) as f64;
    }
    let denom = (norm_a * norm_b).sqrt();
    if denom <= f64::EPSILON {
        return 0.5;
    }
    (((corr / denom + 1.0) / 2.0) as f32).clamp(0.0, 1.0)
}
