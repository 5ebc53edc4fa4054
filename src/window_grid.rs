// window_grid.rs — Scale pyramid and sliding-window grid.
//
// Built once per selected object. For every scale 1.2^i (i in
// [min_scale, max_scale]) the object size is scaled, too-small or too-large
// sizes are dropped, and windows are slid across the scan area with a step
// of `max(1, size * shift)`.
//
// The scan area is the image inset by one pixel on the top/left: integral
// image lookups read the row and column just outside each window.
//
// Layout is structure-of-arrays keyed by window index. The cascade's inner
// loop touches `corners[i]` and `area[i]` for every window, and the fern
// stage touches `x[i]`, `y[i]`, `scale_index[i]`; keeping those contiguous
// keeps the scan cache-friendly.

use crate::bbox::BoundingBox;
use crate::config::DetectorConfig;
use crate::error::{Result, TldError};
use crate::integral::box_corners;

/// One retained scale: the window size used at that scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scale {
    pub width: usize,
    pub height: usize,
}

/// Every scanning window for one (image size, object size) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowGrid {
    image_width: usize,
    image_height: usize,
    scales: Vec<Scale>,
    x: Vec<u32>,
    y: Vec<u32>,
    scale_index: Vec<u16>,
    /// Integral-image corner indices, see `integral::box_corners`.
    corners: Vec<[usize; 4]>,
    area: Vec<u32>,
}

impl WindowGrid {
    /// Build the grid.
    ///
    /// # Errors
    /// `MissingDimensions` if any dimension is zero, `EmptyWindowGrid` if
    /// no scale survives the size limits.
    pub fn new(
        image_width: usize,
        image_height: usize,
        object_width: usize,
        object_height: usize,
        config: &DetectorConfig,
    ) -> Result<Self> {
        if image_width == 0 || image_height == 0 || object_width == 0 || object_height == 0 {
            return Err(TldError::MissingDimensions {
                image_width,
                image_height,
                object_width,
                object_height,
            });
        }

        let scan_x = 1usize;
        let scan_y = 1usize;
        let scan_w = image_width - 1;
        let scan_h = image_height - 1;

        let mut scales = Vec::new();
        for i in config.min_scale..=config.max_scale {
            let factor = 1.2f64.powi(i);
            let w = (object_width as f64 * factor) as usize;
            let h = (object_height as f64 * factor) as usize;
            if w < config.min_size || h < config.min_size || w > scan_w || h > scan_h || w == 0 || h == 0 {
                continue;
            }
            scales.push(Scale { width: w, height: h });
        }

        if scales.is_empty() {
            return Err(TldError::EmptyWindowGrid {
                image_width,
                image_height,
                object_width,
                object_height,
            });
        }

        let mut grid = WindowGrid {
            image_width,
            image_height,
            scales,
            x: Vec::new(),
            y: Vec::new(),
            scale_index: Vec::new(),
            corners: Vec::new(),
            area: Vec::new(),
        };

        for (si, scale) in grid.scales.iter().enumerate() {
            let (w, h) = (scale.width, scale.height);
            let (step_x, step_y) = if config.use_shift {
                (
                    ((w as f32 * config.shift) as usize).max(1),
                    ((h as f32 * config.shift) as usize).max(1),
                )
            } else {
                (1, 1)
            };

            let mut y = scan_y;
            while y + h <= scan_y + scan_h {
                let mut x = scan_x;
                while x + w <= scan_x + scan_w {
                    grid.x.push(x as u32);
                    grid.y.push(y as u32);
                    grid.scale_index.push(si as u16);
                    grid.corners.push(box_corners(x, y, w, h, image_width));
                    grid.area.push((w * h) as u32);
                    x += step_x;
                }
                y += step_y;
            }
        }

        Ok(grid)
    }

    #[inline]
    pub fn num_windows(&self) -> usize {
        self.x.len()
    }

    #[inline]
    pub fn num_scales(&self) -> usize {
        self.scales.len()
    }

    pub fn scales(&self) -> &[Scale] {
        &self.scales
    }

    pub fn image_size(&self) -> (usize, usize) {
        (self.image_width, self.image_height)
    }

    /// Top-left corner of window `i`.
    #[inline]
    pub fn origin(&self, i: usize) -> (usize, usize) {
        (self.x[i] as usize, self.y[i] as usize)
    }

    #[inline]
    pub fn scale_index(&self, i: usize) -> usize {
        self.scale_index[i] as usize
    }

    #[inline]
    pub fn size(&self, i: usize) -> Scale {
        self.scales[self.scale_index(i)]
    }

    #[inline]
    pub fn corners(&self, i: usize) -> &[usize; 4] {
        &self.corners[i]
    }

    #[inline]
    pub fn area(&self, i: usize) -> u32 {
        self.area[i]
    }

    /// Window `i` as a bounding box.
    pub fn window(&self, i: usize) -> BoundingBox {
        let s = self.size(i);
        BoundingBox::new(self.x[i] as f32, self.y[i] as f32, s.width as f32, s.height as f32)
    }

    /// Normalized overlap of every window with `bbox`, indexed by window.
    pub fn overlaps(&self, bbox: &BoundingBox) -> Vec<f32> {
        (0..self.num_windows()).map(|i| self.window(i).overlap(bbox)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_scale_count() {
        // One scale, 1 px steps: (W-1 - w + 1) * (H-1 - h + 1) windows.
        let config = DetectorConfig {
            min_scale: 0,
            max_scale: 0,
            use_shift: false,
            ..Default::default()
        };
        let grid = WindowGrid::new(50, 40, 30, 25, &config).unwrap();
        assert_eq!(grid.num_scales(), 1);
        assert_eq!(grid.num_windows(), (49 - 30 + 1) * (39 - 25 + 1));
        assert_eq!(grid.origin(0), (1, 1));
    }

    #[test]
    fn test_scales_respect_limits() {
        let config = DetectorConfig::default();
        let grid = WindowGrid::new(320, 240, 40, 30, &config).unwrap();
        for s in grid.scales() {
            assert!(s.width >= config.min_size && s.height >= config.min_size);
            assert!(s.width <= 319 && s.height <= 239);
        }
        // Scale indices increase with size.
        for pair in grid.scales().windows(2) {
            assert!(pair[1].width >= pair[0].width);
        }
    }

    #[test]
    fn test_missing_dimensions() {
        let err = WindowGrid::new(0, 240, 40, 30, &DetectorConfig::default()).unwrap_err();
        assert!(matches!(err, TldError::MissingDimensions { .. }));
        let err = WindowGrid::new(320, 240, 40, 0, &DetectorConfig::default()).unwrap_err();
        assert!(matches!(err, TldError::MissingDimensions { .. }));
    }

    #[test]
    fn test_object_too_large() {
        let config = DetectorConfig {
            min_scale: 0,
            max_scale: 0,
            ..Default::default()
        };
        let err = WindowGrid::new(50, 50, 60, 60, &config).unwrap_err();
        assert!(matches!(err, TldError::EmptyWindowGrid { .. }));
    }

    #[test]
    fn test_overlaps_peak_on_exact_window() {
        let config = DetectorConfig {
            min_scale: 0,
            max_scale: 0,
            use_shift: false,
            ..Default::default()
        };
        let grid = WindowGrid::new(60, 60, 30, 30, &config).unwrap();
        let target = grid.window(17);
        let overlaps = grid.overlaps(&target);
        assert_eq!(overlaps.len(), grid.num_windows());
        assert_eq!(overlaps[17], 1.0);
        assert!(overlaps.iter().all(|&o| (0.0..=1.0).contains(&o)));
    }
}
