use anyhow::{Result, anyhow};
use image::DynamicImage;

use crate::detection::contours::{self, ContourParams};
use crate::detection::depth::{DepthDetector, refine_window};
use crate::detection::merge::{self, MergePolicy};
use crate::detection::preprocessing;
use crate::detection::projection;
use crate::error::DepthSearchError;
use crate::models::Contour;
use crate::pipeline::{PipelineContext, PipelineData, PipelineStep};
use crate::report;
use crate::settings::DepthRange;

/// Fold the configured depth range into a maximum projection
pub struct MaxProjectionStep;

impl PipelineStep for MaxProjectionStep {
    fn process(&self, data: &mut PipelineData, context: &mut PipelineContext<'_>) -> Result<()> {
        let range = context.settings.depth;
        let channel = context.settings.detection.channel;
        let projection = projection::generate_max_map(&mut *context.cache, &range, channel)?;

        context.save_debug(
            self.name(),
            "maximum.png",
            &DynamicImage::ImageLuma8(preprocessing::to_display(&projection.values, true)),
        )?;
        context.save_debug(
            self.name(),
            "depth_map.png",
            &DynamicImage::ImageLuma8(preprocessing::to_display(&projection.depths, true)),
        )?;

        data.projection = Some(projection);
        Ok(())
    }

    fn name(&self) -> &str {
        "Max Projection"
    }
}

/// Segment the projection into contours
pub struct ContourExtractionStep {
    pub params: ContourParams,
}

impl PipelineStep for ContourExtractionStep {
    fn process(&self, data: &mut PipelineData, context: &mut PipelineContext<'_>) -> Result<()> {
        let projection = data
            .projection
            .as_ref()
            .ok_or_else(|| anyhow!("Contour extraction needs a maximum projection"))?;

        data.contours = contours::find_contours(&projection.values, &self.params);

        let (width, height) = projection.dimensions();
        context.save_debug(
            self.name(),
            "contours.png",
            &DynamicImage::ImageRgb8(report::render_contours(&data.contours, width, height)),
        )?;
        Ok(())
    }

    fn name(&self) -> &str {
        "Contour Extraction"
    }
}

/// Search the full configured range for every contour
pub struct DepthSearchStep;

impl PipelineStep for DepthSearchStep {
    fn process(&self, data: &mut PipelineData, context: &mut PipelineContext<'_>) -> Result<()> {
        let range = context.settings.depth;
        search_depths(data, context, &range, |_| true)
    }

    fn name(&self) -> &str {
        "Depth Search"
    }
}

/// Merge overlapping contours until a pass merges nothing.
///
/// After every pass that merged something the merged contours get a fresh
/// depth search over the full range.
pub struct MergeStep {
    pub policy: MergePolicy,
}

impl PipelineStep for MergeStep {
    fn process(&self, data: &mut PipelineData, context: &mut PipelineContext<'_>) -> Result<()> {
        let range = context.settings.depth;
        loop {
            let before = data.contours.len();
            let merged = merge::merge_contours(&mut data.contours, &self.policy);
            data.merge_passes += 1;
            log::info!(
                "merge pass {}: {} merges, {} → {} contours",
                data.merge_passes,
                merged,
                before,
                data.contours.len()
            );
            if merged == 0 {
                break;
            }

            let failed = data.failed.clone();
            search_depths(data, context, &range, |c| {
                c.depth.is_none() && !failed.contains(&c.id)
            })?;

            if let Some(projection) = &data.projection {
                let (width, height) = projection.dimensions();
                context.save_debug(
                    self.name(),
                    &format!("pass_{:02}.png", data.merge_passes),
                    &DynamicImage::ImageRgb8(report::render_contours(&data.contours, width, height)),
                )?;
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "Merge Contours"
    }
}

/// Re-search a narrow window around each depth with a finer step
pub struct RefineStep {
    pub divisor: f64,
}

impl PipelineStep for RefineStep {
    fn process(&self, data: &mut PipelineData, context: &mut PipelineContext<'_>) -> Result<()> {
        if !context.cache.source().is_live() {
            log::warn!("refinement skipped: source cannot reconstruct intermediate depths");
            return Ok(());
        }

        let range = context.settings.depth;
        let detector = DepthDetector::from_settings(context.settings);
        for contour in data.contours.iter_mut() {
            let Some(coarse) = contour.depth else {
                continue;
            };
            let window = refine_window(coarse, &range, self.divisor);
            match detector.search_range(&mut *context.cache, contour, &window) {
                Ok(estimate) => log::debug!(
                    "contour {} refined {} → {}",
                    contour.id,
                    coarse,
                    estimate.depth
                ),
                Err(DepthSearchError::Source(e)) if !e.is_retrieval() => return Err(e.into()),
                // the coarse estimate stays in place
                Err(e) => log::warn!("contour {}: refinement failed: {}", contour.id, e),
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "Refine Depths"
    }
}

/// Run a depth search over `range` for every contour matching `select`
fn search_depths<F>(
    data: &mut PipelineData,
    context: &mut PipelineContext<'_>,
    range: &DepthRange,
    select: F,
) -> Result<()>
where
    F: Fn(&Contour) -> bool,
{
    let detector = DepthDetector::from_settings(context.settings);
    let mut failed = Vec::new();

    for contour in data.contours.iter_mut().filter(|c| select(&**c)) {
        match detector.search_range(&mut *context.cache, contour, range) {
            Ok(_) => {}
            Err(DepthSearchError::Source(e)) if !e.is_retrieval() => return Err(e.into()),
            Err(e) => {
                log::warn!("contour {}: no depth assigned: {}", contour.id, e);
                failed.push(contour.id);
            }
        }
    }

    for id in failed {
        data.mark_failed(id);
    }
    Ok(())
}
