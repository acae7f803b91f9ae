pub mod contours;
pub mod depth;
pub mod focus;
pub mod merge;
pub mod preprocessing;
pub mod projection;
pub mod sampling;
pub mod steps;

use crate::pipeline::Pipeline;
use crate::settings::Settings;

/// Build the standard localization pipeline for a settings snapshot:
/// projection, extraction, depth search, then merging and refinement when enabled
pub fn build_standard_pipeline(settings: &Settings) -> Pipeline {
    use crate::detection::steps::*;

    let mut pipeline = Pipeline::new()
        .add_step(Box::new(MaxProjectionStep))
        .add_step(Box::new(ContourExtractionStep {
            params: settings.contour_params(),
        }))
        .add_step(Box::new(DepthSearchStep));

    if settings.merge.enabled {
        pipeline = pipeline.add_step(Box::new(MergeStep {
            policy: settings.merge_policy(),
        }));
    }

    // Refinement re-queries intermediate depths, only a live source can serve them
    if settings.refine_active() {
        pipeline = pipeline.add_step(Box::new(RefineStep {
            divisor: settings.refine.divisor,
        }));
    }

    pipeline
}
