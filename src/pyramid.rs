// pyramid.rs — Gaussian image pyramid for coarse-to-fine point tracking.
//
// Each level: blur the previous level, then keep every other pixel in both
// dimensions. Level 0 is the frame itself converted to f32.
//
// The median-flow tracker builds one pyramid per frame and tracks its point
// grid through it; the detector cascade never touches the pyramid (it scans
// its own window grid at full resolution).

use crate::convolution::{convolve_separable, gaussian_kernel_1d};
use crate::image::{Image, Pixel};

/// A Gaussian image pyramid.
///
/// `levels[0]` is full resolution; `levels[n]` is about `(w / 2^n, h / 2^n)`.
pub struct Pyramid {
    /// Pyramid levels, from finest (index 0) to coarsest.
    pub levels: Vec<Image<f32>>,
}

impl Pyramid {
    /// Build a pyramid with up to `num_levels` levels.
    ///
    /// Construction stops early once a level would shrink below 2×2, so
    /// small frames get fewer levels than requested instead of empty ones.
    ///
    /// # Panics
    /// Panics if `num_levels == 0`.
    pub fn build<T: Pixel>(src: &Image<T>, num_levels: usize, sigma: f32) -> Self {
        assert!(num_levels >= 1, "pyramid must have at least 1 level");

        let half_size = (3.0 * sigma).ceil().max(1.0) as usize;
        let kernel = gaussian_kernel_1d(half_size, sigma);

        let mut levels = Vec::with_capacity(num_levels);
        levels.push(Image::from_fn(src.width(), src.height(), |x, y| src.get(x, y).to_f32()));

        while levels.len() < num_levels {
            let prev = &levels[levels.len() - 1];
            if prev.width() < 4 || prev.height() < 4 {
                break;
            }
            let blurred = convolve_separable(prev, &kernel);
            levels.push(downsample_2x(&blurred));
        }

        Pyramid { levels }
    }

    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    pub fn level(&self, level: usize) -> &Image<f32> {
        &self.levels[level]
    }
}

/// `dst(x, y) = src(2x, 2y)`; odd dimensions drop the last row/column.
fn downsample_2x(src: &Image<f32>) -> Image<f32> {
    Image::from_fn(src.width() / 2, src.height() / 2, |x, y| {
        // SAFETY: 2x < width and 2y < height for x < width/2, y < height/2.
        unsafe { src.get_unchecked(x * 2, y * 2) }
    })
}
