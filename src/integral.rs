// integral.rs — Integral images of intensity and squared intensity.
//
// `sum(x, y)` holds the sum of every pixel in [0, x] × [0, y] (inclusive),
// so any axis-aligned box sum costs four lookups:
//
//     S = ii(x2, y2) - ii(x1-1, y2) - ii(x2, y1-1) + ii(x1-1, y1-1)
//
// The x1-1 / y1-1 terms are why the window grid never places a window on
// row 0 or column 0: there is no ii(-1, ·) to read.
//
// Both tables are u64. A 640×480 frame of 255s sums to ~2e10 in the squared
// table, which overflows u32.

use crate::image::Image;

/// Integral images of one frame, rebuilt every detection pass.
#[derive(Debug, Clone, Default)]
pub struct IntegralImage {
    width: usize,
    height: usize,
    sum: Vec<u64>,
    sq_sum: Vec<u64>,
}

impl IntegralImage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a frame.
    pub fn from_image(img: &Image<u8>) -> Self {
        let mut ii = Self::new();
        ii.compute(img);
        ii
    }

    /// Recompute in place, reusing the buffers when the size is unchanged.
    pub fn compute(&mut self, img: &Image<u8>) {
        let w = img.width();
        let h = img.height();
        self.width = w;
        self.height = h;
        self.sum.clear();
        self.sum.resize(w * h, 0);
        self.sq_sum.clear();
        self.sq_sum.resize(w * h, 0);

        for y in 0..h {
            let row = img.row(y);
            let mut row_sum = 0u64;
            let mut row_sq = 0u64;
            for (x, &v) in row.iter().enumerate() {
                let v = v as u64;
                row_sum += v;
                row_sq += v * v;
                let idx = y * w + x;
                if y == 0 {
                    self.sum[idx] = row_sum;
                    self.sq_sum[idx] = row_sq;
                } else {
                    self.sum[idx] = self.sum[idx - w] + row_sum;
                    self.sq_sum[idx] = self.sq_sum[idx - w] + row_sq;
                }
            }
        }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Sums over a box given its four precomputed corner indices
    /// `[top_left, bottom_left, top_right, bottom_right]`, where the "top"
    /// and "left" corners sit one pixel outside the box.
    ///
    /// Returns `(Σx, Σx²)`.
    #[inline]
    pub fn box_sums(&self, corners: &[usize; 4]) -> (u64, u64) {
        let [tl, bl, tr, br] = *corners;
        let s = self.sum[br] + self.sum[tl] - self.sum[bl] - self.sum[tr];
        let sq = self.sq_sum[br] + self.sq_sum[tl] - self.sq_sum[bl] - self.sq_sum[tr];
        (s, sq)
    }

    /// `E[x²] - E[x]²` over a box of `area` pixels.
    #[inline]
    pub fn box_variance(&self, corners: &[usize; 4], area: u32) -> f32 {
        let (s, sq) = self.box_sums(corners);
        let n = area as f64;
        let mean = s as f64 / n;
        let mean_sq = sq as f64 / n;
        (mean_sq - mean * mean) as f32
    }
}

/// Corner indices for the box `[x, x+w) × [y, y+h)` in a table of
/// `stride` columns. Requires `x >= 1` and `y >= 1`.
pub fn box_corners(x: usize, y: usize, w: usize, h: usize, stride: usize) -> [usize; 4] {
    debug_assert!(x >= 1 && y >= 1, "box must not touch row/column 0");
    let x1 = x - 1;
    let y1 = y - 1;
    let x2 = x + w - 1;
    let y2 = y + h - 1;
    [y1 * stride + x1, y2 * stride + x1, y1 * stride + x2, y2 * stride + x2]
}
