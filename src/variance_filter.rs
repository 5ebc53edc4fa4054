// variance_filter.rs — Cascade stage 1: reject low-variance windows.
//
// Cheapest stage, so it runs first. Each window's variance costs four
// lookups in each of the two integral tables. The threshold is half the
// variance of the initially selected patch and stays fixed afterwards.

use crate::detection::DetectionResult;
use crate::image::Image;
use crate::integral::IntegralImage;
use crate::window_grid::WindowGrid;

#[derive(Debug, Clone)]
pub struct VarianceFilter {
    pub enabled: bool,
    min_var: f32,
    integral: IntegralImage,
}

impl VarianceFilter {
    pub fn new(enabled: bool) -> Self {
        VarianceFilter {
            enabled,
            min_var: 0.0,
            integral: IntegralImage::new(),
        }
    }

    pub fn min_var(&self) -> f32 {
        self.min_var
    }

    /// Set the threshold from the variance of the selected patch.
    pub fn set_min_var_from_patch(&mut self, patch_variance: f32) {
        self.min_var = patch_variance / 2.0;
    }

    pub fn release(&mut self) {
        self.min_var = 0.0;
    }

    /// Rebuild the integral tables for a new frame.
    pub fn next_iteration(&mut self, img: &Image<u8>) {
        if !self.enabled {
            return;
        }
        self.integral.compute(img);
    }

    /// Variance of window `i` in the frame given to the last `next_iteration`.
    #[inline]
    pub fn window_variance(&self, grid: &WindowGrid, i: usize) -> f32 {
        self.integral.box_variance(grid.corners(i), grid.area(i))
    }

    /// Stage test for window `i`. Records the variance in `result`.
    pub fn filter(&self, grid: &WindowGrid, result: &mut DetectionResult, i: usize) -> bool {
        if !self.enabled {
            return true;
        }
        let var = self.window_variance(grid, i);
        result.variances[i] = var;
        var >= self.min_var
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DetectorConfig;

    fn grid_for(w: usize, h: usize) -> WindowGrid {
        let config = DetectorConfig {
            min_scale: 0,
            max_scale: 0,
            min_size: 5,
            ..Default::default()
        };
        WindowGrid::new(w, h, 10, 10, &config).unwrap()
    }

    #[test]
    fn test_matches_brute_force() {
        let img = Image::from_fn(40, 30, |x, y| ((x * 31 + y * 17 + x * y) % 251) as u8);
        let grid = grid_for(40, 30);
        let mut f = VarianceFilter::new(true);
        f.next_iteration(&img);

        for i in [0, grid.num_windows() / 2, grid.num_windows() - 1] {
            let (x0, y0) = grid.origin(i);
            let s = grid.size(i);
            let mut values = Vec::new();
            for y in y0..y0 + s.height {
                for x in x0..x0 + s.width {
                    values.push(img.get(x, y) as f32);
                }
            }
            let brute = crate::patch::variance(&values);
            let fast = f.window_variance(&grid, i);
            assert!(
                (brute - fast).abs() < 1e-2 * brute.max(1.0),
                "window {i}: brute {brute} vs integral {fast}"
            );
        }
    }

    #[test]
    fn test_rejects_flat_windows() {
        let img = Image::from_fn(40, 30, |x, _| if x < 20 { 100 } else { ((x * 53) % 200) as u8 });
        let grid = grid_for(40, 30);
        let mut f = VarianceFilter::new(true);
        f.set_min_var_from_patch(20.0);
        f.next_iteration(&img);
        let mut r = DetectionResult::new(grid.num_windows(), 1);
        // Window 0 sits at (1, 1), fully inside the flat half.
        assert!(!f.filter(&grid, &mut r, 0));
        assert_eq!(r.variances[0], 0.0);
    }

    #[test]
    fn test_disabled_passes_everything() {
        let img = Image::from_vec(40, 30, vec![7u8; 1200]);
        let grid = grid_for(40, 30);
        let mut f = VarianceFilter::new(false);
        f.set_min_var_from_patch(1000.0);
        f.next_iteration(&img);
        let mut r = DetectionResult::new(grid.num_windows(), 1);
        assert!(f.filter(&grid, &mut r, 0));
    }
}
