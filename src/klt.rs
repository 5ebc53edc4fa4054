// klt.rs — Pyramidal Lucas-Kanade point tracker.
//
// The median-flow tracker runs this twice per frame: forward (prev → curr)
// on a grid of points inside the box, then backward (curr → prev) on the
// results. Points are independent; the tracker has no memory between calls.
//
// Formulation: forward additive. Gradients are taken at the warped position
// in the current frame, so the 2×2 Hessian is rebuilt every iteration.
// Coarse-to-fine: the displacement found at level L seeds level L-1 (×2).
//
// NEW RUST CONCEPTS:
// - Enums with data (LkResult) to return one of several outcomes.
// - Borrowing two pyramids at once (&prev, &curr) with no copies.

use crate::image::{interpolate_bilinear, Image};
use crate::pyramid::Pyramid;

/// A 2D point in full-resolution pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackPoint {
    pub x: f32,
    pub y: f32,
}

impl TrackPoint {
    pub fn new(x: f32, y: f32) -> Self {
        TrackPoint { x, y }
    }

    pub fn distance(&self, other: &TrackPoint) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// Outcome of tracking one point between two frames.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrackStatus {
    /// Converged (or ran out of iterations) inside the image.
    Tracked,
    /// Singular Hessian: the patch had no usable texture.
    Lost,
    /// The final position left the image.
    OutOfBounds,
}

/// Pyramidal KLT optical flow tracker.
#[derive(Debug, Clone)]
pub struct KltTracker {
    /// Patch half-size; the patch is (2*window_size + 1)².
    pub window_size: usize,
    /// Maximum Gauss-Newton iterations per pyramid level.
    pub max_iterations: usize,
    /// Convergence threshold on the update step, in pixels.
    pub epsilon: f32,
    /// Upper bound on levels used; clipped to the pyramid depth.
    pub max_levels: usize,
}

impl KltTracker {
    pub fn new(window_size: usize, max_iterations: usize, epsilon: f32, max_levels: usize) -> Self {
        KltTracker {
            window_size,
            max_iterations,
            epsilon,
            max_levels,
        }
    }

    /// Track each point from `prev` to `curr`.
    ///
    /// Returns one `(position, status)` per input point, in order.
    pub fn track(
        &self,
        prev: &Pyramid,
        curr: &Pyramid,
        points: &[TrackPoint],
    ) -> Vec<(TrackPoint, TrackStatus)> {
        let num_levels = self.max_levels.min(prev.num_levels()).min(curr.num_levels()).max(1);
        points
            .iter()
            .map(|p| self.track_single(prev, curr, p, num_levels))
            .collect()
    }

    fn track_single(
        &self,
        prev: &Pyramid,
        curr: &Pyramid,
        point: &TrackPoint,
        num_levels: usize,
    ) -> (TrackPoint, TrackStatus) {
        let mut dx = 0.0f32;
        let mut dy = 0.0f32;

        for level in (0..num_levels).rev() {
            let scale = 1.0 / (1u32 << level) as f32;
            let px = point.x * scale;
            let py = point.y * scale;

            match self.lk_forward_additive(prev.level(level), curr.level(level), px, py, dx, dy) {
                LkResult::Converged(ndx, ndy) | LkResult::MaxIter(ndx, ndy) => {
                    dx = ndx;
                    dy = ndy;
                }
                LkResult::Singular => {
                    let lost = TrackPoint::new(point.x + dx / scale, point.y + dy / scale);
                    return (lost, TrackStatus::Lost);
                }
            }

            if level > 0 {
                dx *= 2.0;
                dy *= 2.0;
            }
        }

        let out = TrackPoint::new(point.x + dx, point.y + dy);
        let w = curr.level(0).width() as f32;
        let h = curr.level(0).height() as f32;
        let status = if out.x.is_finite() && out.y.is_finite()
            && out.x >= 0.0 && out.x < w && out.y >= 0.0 && out.y < h
        {
            TrackStatus::Tracked
        } else {
            TrackStatus::OutOfBounds
        };
        (out, status)
    }

    /// Iterative forward-additive Lucas-Kanade at a single pyramid level.
    fn lk_forward_additive(
        &self,
        prev_img: &Image<f32>,
        curr_img: &Image<f32>,
        px: f32,
        py: f32,
        mut dx: f32,
        mut dy: f32,
    ) -> LkResult {
        let half = self.window_size as isize;

        for _ in 0..self.max_iterations {
            let (mut h00, mut h01, mut h11) = (0.0f32, 0.0f32, 0.0f32);
            let (mut b0, mut b1) = (0.0f32, 0.0f32);

            for oy in -half..=half {
                for ox in -half..=half {
                    let tx = px + ox as f32;
                    let ty = py + oy as f32;
                    let wx = tx + dx;
                    let wy = ty + dy;

                    let e = interpolate_bilinear(prev_img, tx, ty)
                        - interpolate_bilinear(curr_img, wx, wy);
                    let gx = 0.5
                        * (interpolate_bilinear(curr_img, wx + 1.0, wy)
                            - interpolate_bilinear(curr_img, wx - 1.0, wy));
                    let gy = 0.5
                        * (interpolate_bilinear(curr_img, wx, wy + 1.0)
                            - interpolate_bilinear(curr_img, wx, wy - 1.0));

                    h00 += gx * gx;
                    h01 += gx * gy;
                    h11 += gy * gy;
                    b0 += gx * e;
                    b1 += gy * e;
                }
            }

            let det = h00 * h11 - h01 * h01;
            if det.abs() < 1e-6 {
                return LkResult::Singular;
            }
            let inv_det = 1.0 / det;
            let step_x = inv_det * (h11 * b0 - h01 * b1);
            let step_y = inv_det * (h00 * b1 - h01 * b0);
            dx += step_x;
            dy += step_y;

            if step_x * step_x + step_y * step_y < self.epsilon * self.epsilon {
                return LkResult::Converged(dx, dy);
            }
        }

        LkResult::MaxIter(dx, dy)
    }
}

/// Result of iterative LK at one pyramid level.
enum LkResult {
    Converged(f32, f32),
    MaxIter(f32, f32),
    Singular,
}
