// median_flow.rs — Short-term motion tracker (forward-backward median flow).
//
// The controller only needs "previous box in, new box out (or nothing)",
// expressed by the MotionTracker trait. The default implementation:
//
//   1. Lay a grid_points × grid_points grid inside the previous box.
//   2. Track it prev → curr with pyramidal KLT, then track the results back
//      curr → prev. The forward-backward error of a point is the distance
//      between where it started and where it came back to.
//   3. Score every point by NCC between small patches around its start and
//      end positions.
//   4. Keep points with FB error ≤ median and NCC ≥ median.
//   5. Shift = median displacement of the survivors. Scale = median ratio of
//      pairwise distances after/before.
//
// Tracking fails when no point survives, when the median FB error is too
// large (the motion is not self-consistent), or when the predicted box is
// degenerate or leaves the frame.
//
// NEW RUST CONCEPTS:
// - Trait objects: the controller stores Box<dyn MotionTracker>.
// - select_nth_unstable_by for O(n) medians.

use tracing::{debug, trace};

use crate::bbox::BoundingBox;
use crate::config::MedianFlowConfig;
use crate::image::Image;
use crate::klt::{KltTracker, TrackPoint, TrackStatus};
use crate::patch;
use crate::pyramid::Pyramid;

/// Produces a box in the current frame from the box in the previous frame.
pub trait MotionTracker {
    fn track(&mut self, prev: &Image<u8>, curr: &Image<u8>, prev_box: &BoundingBox) -> Option<BoundingBox>;
}

#[derive(Debug, Clone)]
pub struct MedianFlowTracker {
    config: MedianFlowConfig,
    klt: KltTracker,
}

impl MedianFlowTracker {
    pub fn new(config: MedianFlowConfig) -> Self {
        let klt = KltTracker::new(
            config.klt_window,
            config.klt_max_iter,
            config.klt_epsilon,
            config.pyramid_levels,
        );
        MedianFlowTracker { config, klt }
    }

    /// Grid points inside `bbox`, inset by the margin.
    fn grid_points(&self, bbox: &BoundingBox) -> Vec<TrackPoint> {
        let n = self.config.grid_points.max(1);
        let m = self.config.margin;
        let x0 = bbox.x + m;
        let y0 = bbox.y + m;
        let x1 = bbox.x + bbox.width - 1.0 - m;
        let y1 = bbox.y + bbox.height - 1.0 - m;
        let (step_x, step_y) = if n > 1 {
            ((x1 - x0) / (n - 1) as f32, (y1 - y0) / (n - 1) as f32)
        } else {
            (0.0, 0.0)
        };

        let mut points = Vec::with_capacity(n * n);
        for j in 0..n {
            for i in 0..n {
                points.push(TrackPoint::new(x0 + i as f32 * step_x, y0 + j as f32 * step_y));
            }
        }
        points
    }

    /// NCC in [0, 1] between the patches centred on `a` in `img_a` and `b` in `img_b`.
    fn point_ncc(&self, img_a: &Image<u8>, a: &TrackPoint, img_b: &Image<u8>, b: &TrackPoint, buf: &mut [Vec<f32>; 2]) -> f32 {
        let n = self.config.ncc_window;
        let half = (n as f32 - 1.0) / 2.0;
        let side = n as f32;
        patch::resample(img_a, &BoundingBox::new(a.x - half, a.y - half, side, side), n, n, &mut buf[0]);
        patch::resample(img_b, &BoundingBox::new(b.x - half, b.y - half, side, side), n, n, &mut buf[1]);
        patch::mean_center(&mut buf[0]);
        patch::mean_center(&mut buf[1]);
        patch::ncc(&buf[0], &buf[1])
    }
}

impl MotionTracker for MedianFlowTracker {
    fn track(&mut self, prev: &Image<u8>, curr: &Image<u8>, prev_box: &BoundingBox) -> Option<BoundingBox> {
        if !prev_box.is_valid() {
            return None;
        }
        let prev_pyr = Pyramid::build(prev, self.config.pyramid_levels.max(1), self.config.pyramid_sigma);
        let curr_pyr = Pyramid::build(curr, self.config.pyramid_levels.max(1), self.config.pyramid_sigma);

        let start = self.grid_points(prev_box);
        let forward = self.klt.track(&prev_pyr, &curr_pyr, &start);
        let forward_points: Vec<TrackPoint> = forward.iter().map(|(p, _)| *p).collect();
        let backward = self.klt.track(&curr_pyr, &prev_pyr, &forward_points);

        let n = self.config.ncc_window;
        let mut buf = [vec![0.0; n * n], vec![0.0; n * n]];

        // (start, end, fb error, ncc) for every point tracked both ways.
        let mut tracked = Vec::with_capacity(start.len());
        for ((p0, (p1, s1)), (pb, sb)) in start.iter().zip(&forward).zip(&backward) {
            if *s1 != TrackStatus::Tracked || *sb != TrackStatus::Tracked {
                continue;
            }
            let fb = p0.distance(pb);
            let ncc = self.point_ncc(prev, p0, curr, p1, &mut buf);
            tracked.push((*p0, *p1, fb, ncc));
        }
        if tracked.is_empty() {
            debug!("median flow: no point tracked both ways");
            return None;
        }

        let med_fb = median(tracked.iter().map(|t| t.2).collect())?;
        let med_ncc = median(tracked.iter().map(|t| t.3).collect())?;
        let survivors: Vec<(TrackPoint, TrackPoint)> = tracked
            .iter()
            .filter(|t| t.2 <= med_fb && t.3 >= med_ncc)
            .map(|t| (t.0, t.1))
            .collect();

        trace!(
            tracked = tracked.len(),
            survivors = survivors.len(),
            median_fb = med_fb,
            median_ncc = med_ncc,
            "median flow points"
        );

        if survivors.is_empty() {
            debug!("median flow: no point passed the FB/NCC filter");
            return None;
        }
        if med_fb > self.config.max_median_fb {
            debug!(median_fb = med_fb, "median flow: forward-backward error too large");
            return None;
        }

        let predicted = predict_box(prev_box, &survivors)?;
        let rounded = BoundingBox::new(
            (predicted.x + 0.5).floor(),
            (predicted.y + 0.5).floor(),
            (predicted.width + 0.5).floor(),
            (predicted.height + 0.5).floor(),
        );
        let frame = BoundingBox::new(0.0, 0.0, curr.width() as f32, curr.height() as f32);
        if !rounded.is_valid() || !frame.contains(&rounded) {
            debug!(?rounded, "median flow: predicted box invalid or outside the frame");
            return None;
        }
        Some(rounded)
    }
}

/// Shift and scale `bbox` by the median motion of point pairs.
fn predict_box(bbox: &BoundingBox, pairs: &[(TrackPoint, TrackPoint)]) -> Option<BoundingBox> {
    let dx = median(pairs.iter().map(|(a, b)| b.x - a.x).collect())?;
    let dy = median(pairs.iter().map(|(a, b)| b.y - a.y).collect())?;

    let mut ratios = Vec::with_capacity(pairs.len() * pairs.len().saturating_sub(1) / 2);
    for i in 0..pairs.len() {
        for j in i + 1..pairs.len() {
            let before = pairs[i].0.distance(&pairs[j].0);
            if before > f32::EPSILON {
                ratios.push(pairs[i].1.distance(&pairs[j].1) / before);
            }
        }
    }
    let scale = median(ratios).unwrap_or(1.0);

    let grow_x = 0.5 * (scale - 1.0) * bbox.width;
    let grow_y = 0.5 * (scale - 1.0) * bbox.height;
    Some(BoundingBox::new(
        bbox.x - grow_x + dx,
        bbox.y - grow_y + dy,
        bbox.width * scale,
        bbox.height * scale,
    ))
}

/// Upper median (element n/2 in sorted order); None when empty.
fn median(mut values: Vec<f32>) -> Option<f32> {
    if values.is_empty() {
        return None;
    }
    let mid = values.len() / 2;
    let (_, m, _) = values.select_nth_unstable_by(mid, |a, b| a.total_cmp(b));
    Some(*m)
}
