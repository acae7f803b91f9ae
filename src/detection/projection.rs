use crate::cache::ImageCache;
use crate::error::ProjectionError;
use crate::settings::DepthRange;
use crate::source::{ChannelKind, FloatImage, ImageSource};

/// Per-pixel maximum over a depth stack
#[derive(Debug, Clone, PartialEq)]
pub struct MaxProjection {
    /// Largest sample seen at each pixel
    pub values: FloatImage,
    /// Depth at which that maximum was first reached
    pub depths: FloatImage,
    /// Slices folded in
    pub slices: usize,
    /// Slices the source could not produce
    pub skipped: usize,
}

impl MaxProjection {
    pub fn dimensions(&self) -> (u32, u32) {
        self.values.dimensions()
    }
}

/// Fold every depth of `range` into a maximum projection.
///
/// Each slice is requested exactly once. Slices the source cannot produce are
/// skipped; at least one slice has to be readable.
pub fn generate_max_map<S: ImageSource + ?Sized>(
    cache: &mut ImageCache<S>,
    range: &DepthRange,
    channel: ChannelKind,
) -> Result<MaxProjection, ProjectionError> {
    let mut dims: Option<(u32, u32)> = None;
    let mut values: Vec<f32> = Vec::new();
    let mut depths: Vec<f32> = Vec::new();
    let mut slices = 0usize;
    let mut skipped = 0usize;

    for depth in range.depths() {
        let slice = match cache.get(depth, channel) {
            Ok(slice) => slice,
            Err(e) if e.is_retrieval() => {
                log::warn!("skipping slice: {e}");
                skipped += 1;
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let slice_dims = slice.dimensions();
        match dims {
            None => {
                dims = Some(slice_dims);
                values = slice.data.as_raw().clone();
                depths = vec![depth as f32; values.len()];
            }
            Some(expected) if expected != slice_dims => {
                return Err(ProjectionError::DimensionMismatch {
                    depth,
                    expected,
                    got: slice_dims,
                });
            }
            Some(_) => {
                for ((acc, at), &v) in values
                    .iter_mut()
                    .zip(depths.iter_mut())
                    .zip(slice.data.as_raw())
                {
                    if v > *acc {
                        *acc = v;
                        *at = depth as f32;
                    }
                }
            }
        }
        slices += 1;
    }

    let Some((width, height)) = dims else {
        return Err(ProjectionError::NoSlices {
            min: range.min,
            max: range.max,
        });
    };

    log::info!(
        "max projection over {} slices ({} skipped), {}x{}",
        slices,
        skipped,
        width,
        height
    );

    // lengths match the first slice, so from_raw cannot fail here
    let values = FloatImage::from_raw(width, height, values).ok_or(ProjectionError::NoSlices {
        min: range.min,
        max: range.max,
    })?;
    let depths = FloatImage::from_raw(width, height, depths).ok_or(ProjectionError::NoSlices {
        min: range.min,
        max: range.max,
    })?;

    Ok(MaxProjection {
        values,
        depths,
        slices,
        skipped,
    })
}
