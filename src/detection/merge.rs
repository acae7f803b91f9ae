use imageproc::geometry::convex_hull;
use imageproc::point::Point as HullPoint;
use serde::{Deserialize, Serialize};

use crate::models::{Contour, ContourId, Point};

/// Geometry used to decide whether two contours overlap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlapMode {
    /// Inclusive bounding boxes intersect (after growing by the margin)
    #[default]
    BoundingBox,
    /// Footprints share at least one pixel
    Footprint,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MergePolicy {
    pub overlap: OverlapMode,
    /// Largest depth difference still considered the same object
    pub depth_tolerance: f64,
    /// Extra pixels added around each bounding box before testing overlap
    pub margin: u32,
}

impl Default for MergePolicy {
    fn default() -> Self {
        Self {
            overlap: OverlapMode::BoundingBox,
            depth_tolerance: 2.0,
            margin: 0,
        }
    }
}

impl MergePolicy {
    /// Both depths known and within tolerance, and the regions overlap
    pub fn should_merge(&self, a: &Contour, b: &Contour) -> bool {
        let (Some(da), Some(db)) = (a.depth, b.depth) else {
            return false;
        };
        if (da - db).abs() > self.depth_tolerance {
            return false;
        }
        match self.overlap {
            OverlapMode::BoundingBox => a
                .bbox
                .grow(self.margin)
                .intersects(&b.bbox.grow(self.margin)),
            OverlapMode::Footprint => a.shares_pixels(b),
        }
    }
}

/// Union of two contours under a new id. The boundary is the convex hull of
/// both boundaries; the depth is cleared so it gets searched again.
pub fn merge_pair(a: &Contour, b: &Contour, id: ContourId) -> Option<Contour> {
    let outline: Vec<HullPoint<i64>> = a
        .boundary
        .iter()
        .chain(&b.boundary)
        .map(|p| HullPoint::new(p.x as i64, p.y as i64))
        .collect();
    let boundary: Vec<Point> = convex_hull(outline.as_slice())
        .into_iter()
        .map(|p| Point::new(p.x as u32, p.y as u32))
        .collect();
    Contour::new(id, a.union_pixels(b), boundary)
}

/// One merge pass over all unordered pairs.
///
/// Every contour takes part in at most one merge per pass. A merged contour
/// replaces the first of its two sources in the list and the second source is
/// removed. Returns the number of merges performed.
pub fn merge_contours(contours: &mut Vec<Contour>, policy: &MergePolicy) -> usize {
    let n = contours.len();
    let mut partner: Vec<Option<usize>> = vec![None; n];

    for i in 0..n {
        if partner[i].is_some() {
            continue;
        }
        for j in (i + 1)..n {
            if partner[j].is_some() {
                continue;
            }
            if policy.should_merge(&contours[i], &contours[j]) {
                partner[i] = Some(j);
                partner[j] = Some(i);
                break;
            }
        }
    }

    let mut next_id = contours.iter().map(|c| c.id + 1).max().unwrap_or(0);
    let mut merges = 0;
    let mut slots: Vec<Option<Contour>> = std::mem::take(contours).into_iter().map(Some).collect();

    for i in 0..n {
        match partner[i] {
            Some(j) if j > i => {
                let (Some(a), Some(b)) = (slots[i].take(), slots[j].take()) else {
                    continue;
                };
                match merge_pair(&a, &b, next_id) {
                    Some(merged) => {
                        log::debug!(
                            "merged contours {} ({:?}) and {} ({:?}) into {}",
                            a.id,
                            a.depth,
                            b.id,
                            b.depth,
                            merged.id
                        );
                        contours.push(merged);
                        next_id += 1;
                        merges += 1;
                    }
                    None => {
                        // union of two non-empty footprints is never empty
                        contours.push(a);
                        slots[j] = Some(b);
                    }
                }
            }
            _ => {
                // unmerged, or a second partner that was already consumed
                if let Some(c) = slots[i].take() {
                    contours.push(c);
                }
            }
        }
    }

    merges
}
