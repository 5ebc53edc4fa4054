// clustering.rs — Group confident windows into detection hypotheses.
//
// Agglomerative single-linkage on the distance `1 - overlap`: pairs are
// visited closest first, and every pair within `cutoff` links its two
// windows into one cluster (merging clusters when both already belong to
// one). Windows that never link form singleton clusters.
//
// Only the cluster count matters downstream, plus a representative box
// when there is exactly one cluster. Several clusters mean the detector is
// ambiguous and reports no box.

use crate::bbox::BoundingBox;
use crate::config::ClusterBox;
use crate::detection::DetectionResult;
use crate::window_grid::WindowGrid;

#[derive(Debug, Clone)]
pub struct Clustering {
    pub cutoff: f32,
    pub representative: ClusterBox,
}

impl Clustering {
    pub fn new(cutoff: f32, representative: ClusterBox) -> Self {
        Clustering { cutoff, representative }
    }

    /// Cluster label per box, labels dense in `0..count`. Returns
    /// `(labels, count)`.
    pub fn partition(&self, boxes: &[BoundingBox]) -> (Vec<usize>, usize) {
        let n = boxes.len();
        if n == 0 {
            return (Vec::new(), 0);
        }

        let mut pairs: Vec<(f32, usize, usize)> = Vec::new();
        for i in 0..n {
            for j in i + 1..n {
                let d = 1.0 - boxes[i].overlap(&boxes[j]);
                if d <= self.cutoff {
                    pairs.push((d, i, j));
                }
            }
        }
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut labels: Vec<Option<usize>> = vec![None; n];
        let mut next_label = 0;
        for (_, i, j) in pairs {
            match (labels[i], labels[j]) {
                (None, None) => {
                    labels[i] = Some(next_label);
                    labels[j] = Some(next_label);
                    next_label += 1;
                }
                (Some(l), None) => labels[j] = Some(l),
                (None, Some(l)) => labels[i] = Some(l),
                (Some(a), Some(b)) if a != b => {
                    for l in labels.iter_mut() {
                        if *l == Some(b) {
                            *l = Some(a);
                        }
                    }
                }
                _ => {}
            }
        }
        for l in labels.iter_mut() {
            if l.is_none() {
                *l = Some(next_label);
                next_label += 1;
            }
        }

        // Relabel densely in first-seen order.
        let mut remap: Vec<Option<usize>> = vec![None; next_label];
        let mut count = 0;
        let dense = labels
            .into_iter()
            .flatten()
            .map(|l| {
                *remap[l].get_or_insert_with(|| {
                    count += 1;
                    count - 1
                })
            })
            .collect();
        (dense, count)
    }

    /// Representative box of a group of windows.
    pub fn representative_box(&self, boxes: &[BoundingBox]) -> Option<BoundingBox> {
        let (first, rest) = boxes.split_first()?;
        match self.representative {
            ClusterBox::Span => Some(rest.iter().fold(*first, |acc, b| acc.union(b))),
            ClusterBox::Mean => {
                let n = boxes.len() as f32;
                let mean = |f: fn(&BoundingBox) -> f32| (boxes.iter().map(f).sum::<f32>() / n + 0.5).floor();
                Some(BoundingBox::new(
                    mean(|b| b.x),
                    mean(|b| b.y),
                    mean(|b| b.width),
                    mean(|b| b.height),
                ))
            }
        }
    }

    /// Cluster `result.confident_indices` and fill `num_clusters` /
    /// `detector_bb`.
    pub fn cluster_confident_indices(&self, grid: &WindowGrid, result: &mut DetectionResult) {
        let boxes: Vec<BoundingBox> = result.confident_indices.iter().map(|&i| grid.window(i)).collect();
        let (_, count) = self.partition(&boxes);
        result.num_clusters = count;
        result.detector_bb = if count == 1 { self.representative_box(&boxes) } else { None };
    }
}
