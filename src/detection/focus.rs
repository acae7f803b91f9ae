use serde::{Deserialize, Serialize};

use crate::cache::{ImageCache, Region};
use crate::error::SourceError;
use crate::models::Contour;
use crate::source::{ChannelKind, ImageSource};

/// A contour's neighbourhood copied out of one depth slice.
///
/// The region is the contour's bounding box grown by one pixel (clipped to
/// the slice) so gradient metrics see the surroundings of border pixels.
#[derive(Debug, Clone)]
pub struct Patch {
    depth: f64,
    region: Region,
    // row-major over the region, true for contour pixels
    mask: Vec<bool>,
    count: usize,
}

impl Patch {
    pub fn extract<S: ImageSource + ?Sized>(
        cache: &mut ImageCache<S>,
        depth: f64,
        channel: ChannelKind,
        contour: &Contour,
    ) -> Result<Self, SourceError> {
        let region = cache.crop(depth, channel, &contour.bbox.grow(1))?;
        let (width, height) = region.image.dimensions();
        let mut mask = vec![false; (width * height) as usize];
        let mut count = 0;
        for p in contour.pixels() {
            let (Some(lx), Some(ly)) = (p.x.checked_sub(region.x), p.y.checked_sub(region.y))
            else {
                continue;
            };
            if lx < width && ly < height {
                mask[(ly * width + lx) as usize] = true;
                count += 1;
            }
        }
        Ok(Self {
            depth,
            region,
            mask,
            count,
        })
    }

    pub fn depth(&self) -> f64 {
        self.depth
    }

    /// Number of contour pixels inside the slice
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn region(&self) -> &Region {
        &self.region
    }

    /// Samples under the contour footprint
    pub fn values(&self) -> impl Iterator<Item = f32> + '_ {
        self.region
            .image
            .as_raw()
            .iter()
            .zip(&self.mask)
            .filter_map(|(&v, &inside)| inside.then_some(v))
    }

    /// Local coordinates of the footprint pixels
    fn footprint(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        let width = self.region.image.width();
        self.mask
            .iter()
            .enumerate()
            .filter_map(move |(i, &inside)| inside.then(|| (i as u32 % width, i as u32 / width)))
    }

    // Edge-replicated access in local coordinates
    fn at(&self, x: i64, y: i64) -> f64 {
        let (w, h) = self.region.image.dimensions();
        let x = x.clamp(0, w as i64 - 1) as u32;
        let y = y.clamp(0, h as i64 - 1) as u32;
        self.region.image.get_pixel(x, y)[0] as f64
    }
}

/// Anything that turns a patch into a focus score (higher = sharper)
pub trait FocusMeasure {
    fn score(&self, patch: &Patch) -> Option<f64>;
}

impl<F> FocusMeasure for F
where
    F: Fn(&Patch) -> Option<f64>,
{
    fn score(&self, patch: &Patch) -> Option<f64> {
        self(patch)
    }
}

/// Built-in focus metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FocusMetric {
    /// Mean sample value
    Mean,
    /// Sample variance (contrast)
    Variance,
    /// Mean squared sample value
    Energy,
    /// Mean squared Sobel gradient magnitude
    #[default]
    Tenengrad,
}

impl FocusMeasure for FocusMetric {
    fn score(&self, patch: &Patch) -> Option<f64> {
        if patch.is_empty() {
            return None;
        }
        let n = patch.len() as f64;
        let score = match self {
            FocusMetric::Mean => patch.values().map(|v| v as f64).sum::<f64>() / n,
            FocusMetric::Energy => patch.values().map(|v| (v as f64).powi(2)).sum::<f64>() / n,
            FocusMetric::Variance => {
                let mean = patch.values().map(|v| v as f64).sum::<f64>() / n;
                patch.values().map(|v| (v as f64 - mean).powi(2)).sum::<f64>() / n
            }
            FocusMetric::Tenengrad => {
                let total: f64 = patch
                    .footprint()
                    .map(|(x, y)| {
                        let (x, y) = (x as i64, y as i64);
                        let p = |dx: i64, dy: i64| patch.at(x + dx, y + dy);
                        let gx = (p(1, -1) + 2.0 * p(1, 0) + p(1, 1))
                            - (p(-1, -1) + 2.0 * p(-1, 0) + p(-1, 1));
                        let gy = (p(-1, 1) + 2.0 * p(0, 1) + p(1, 1))
                            - (p(-1, -1) + 2.0 * p(0, -1) + p(1, -1));
                        gx * gx + gy * gy
                    })
                    .sum();
                total / n
            }
        };
        score.is_finite().then_some(score)
    }
}
