use std::collections::HashMap;

use image::Luma;
use imageproc::contours::{self as traced, BorderType};
use imageproc::region_labelling::{Connectivity, connected_components};
use serde::{Deserialize, Serialize};

use crate::detection::preprocessing;
use crate::models::{BoundingBox, Contour, Point};
use crate::source::FloatImage;

/// How the segmentation level is derived from the maximum projection
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Threshold {
    /// Fixed level in sample units
    Absolute(f32),
    /// mean + k * standard deviation of the projection
    MeanStd(f32),
}

impl Threshold {
    pub fn level(&self, projection: &FloatImage) -> f32 {
        match *self {
            Threshold::Absolute(level) => level,
            Threshold::MeanStd(k) => {
                let (mean, std) = preprocessing::mean_std(projection);
                mean + k * std
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContourParams {
    pub threshold: Threshold,
    /// Regions with fewer pixels are dropped; zero-area regions are always dropped
    pub min_area: u32,
}

impl Default for ContourParams {
    fn default() -> Self {
        Self {
            threshold: Threshold::MeanStd(3.0),
            min_area: 4,
        }
    }
}

/// Segment the projection and turn every connected region into a contour.
///
/// Contours come out ordered top-to-bottom then left-to-right and are
/// numbered from 0 in that order; none has a depth yet.
pub fn find_contours(projection: &FloatImage, params: &ContourParams) -> Vec<Contour> {
    let level = params.threshold.level(projection);
    let mask = preprocessing::binarize(projection, level);

    // Label connected components (foreground = above threshold)
    let labeled = connected_components(&mask, Connectivity::Eight, Luma([0u8]));

    let mut regions: HashMap<u32, Vec<Point>> = HashMap::new();
    for (x, y, label) in labeled.enumerate_pixels() {
        let label_val = label[0];
        if label_val == 0 {
            continue; // Skip background
        }
        regions.entry(label_val).or_default().push(Point::new(x, y));
    }

    // Outer borders, keyed by the component they start on
    let mut boundaries: HashMap<u32, Vec<Point>> = HashMap::new();
    for border in traced::find_contours::<u32>(&mask) {
        if !matches!(border.border_type, BorderType::Outer) {
            continue;
        }
        let Some(first) = border.points.first() else {
            continue;
        };
        let label = labeled.get_pixel(first.x, first.y)[0];
        boundaries
            .entry(label)
            .or_insert_with(|| border.points.iter().map(|p| Point::new(p.x, p.y)).collect());
    }

    let min_area = params.min_area.max(1) as usize;
    let mut kept: Vec<(BoundingBox, u32, Vec<Point>)> = regions
        .into_iter()
        .filter(|(_, pixels)| pixels.len() >= min_area)
        .filter_map(|(label, pixels)| {
            BoundingBox::from_points(&pixels).map(|bbox| (bbox, label, pixels))
        })
        .collect();
    kept.sort_by_key(|(bbox, label, _)| (bbox.min_y, bbox.min_x, bbox.max_y, bbox.max_x, *label));

    let contours: Vec<Contour> = kept
        .into_iter()
        .enumerate()
        .filter_map(|(id, (_, label, pixels))| {
            let boundary = boundaries.remove(&label).unwrap_or_default();
            Contour::new(id as u32, pixels, boundary)
        })
        .collect();

    log::info!(
        "found {} contours above level {:.4} (min area {})",
        contours.len(),
        level,
        min_area
    );
    contours
}
