use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::cache::ImageCache;
use crate::error::SourceError;
use crate::models::{Contour, Point};
use crate::settings::DepthRange;
use crate::source::{ChannelKind, ImageSource};

/// Values of a fixed set of pixels across a depth range
#[derive(Debug, Clone, PartialEq)]
pub struct PixelProfile {
    pub points: Vec<Point>,
    pub depths: Vec<f64>,
    /// `values[d][p]` is the sample of `points[p]` at `depths[d]`
    pub values: Vec<Vec<f32>>,
}

/// Draws random interior pixels of a contour for qualitative inspection.
///
/// The generator is seeded explicitly: the same seed reproduces the same
/// points on every run.
pub struct PhaseSampler {
    rng: StdRng,
}

impl PhaseSampler {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Pick `count` pixels (capped at the contour area) uniformly from the
    /// footprint. Draws are independent, so a pixel may repeat.
    pub fn sample(&mut self, contour: &Contour, count: usize) -> Vec<Point> {
        let pixels = contour.pixels();
        let count = count.min(pixels.len());
        (0..count)
            .map(|_| pixels[self.rng.gen_range(0..pixels.len())])
            .collect()
    }

    /// Read the sampled pixels at every depth of `range`.
    ///
    /// Depths the source cannot produce are left out of the profile.
    pub fn record_profile<S: ImageSource + ?Sized>(
        cache: &mut ImageCache<S>,
        points: &[Point],
        range: &DepthRange,
        channel: ChannelKind,
    ) -> Result<PixelProfile, SourceError> {
        let mut depths = Vec::new();
        let mut values = Vec::new();

        for depth in range.depths() {
            let slice = match cache.get(depth, channel) {
                Ok(slice) => slice,
                Err(e) if e.is_retrieval() => {
                    log::debug!("profile skips depth {depth}: {e}");
                    continue;
                }
                Err(e) => return Err(e),
            };
            let row = points
                .iter()
                .map(|p| slice.value(p.x, p.y).unwrap_or(f32::NAN))
                .collect();
            depths.push(depth);
            values.push(row);
        }

        Ok(PixelProfile {
            points: points.to_vec(),
            depths,
            values,
        })
    }
}
