use crate::cache::ImageCache;
use crate::detection::focus::{FocusMeasure, FocusMetric, Patch};
use crate::error::DepthSearchError;
use crate::models::Contour;
use crate::settings::{DepthRange, Settings};
use crate::source::{ChannelKind, ImageSource};

/// Result of a successful focus search
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthEstimate {
    pub depth: f64,
    pub score: f64,
    /// Candidates visited
    pub candidates: usize,
    /// Candidates without a score (missing slice or empty footprint)
    pub skipped: usize,
}

/// Searches a depth interval for the depth at which a contour is best focused
#[derive(Debug, Clone)]
pub struct DepthDetector<M = FocusMetric> {
    pub channel: ChannelKind,
    pub measure: M,
}

impl DepthDetector<FocusMetric> {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            channel: settings.focus.channel,
            measure: settings.focus.metric,
        }
    }
}

impl<M: FocusMeasure> DepthDetector<M> {
    pub fn new(channel: ChannelKind, measure: M) -> Self {
        Self { channel, measure }
    }

    /// Scan `min..=max` in increments of `step` and assign the best-scoring
    /// depth to the contour.
    ///
    /// Ties keep the first (lowest) depth. Candidates whose slice cannot be
    /// retrieved are skipped. When nothing can be scored the contour is left
    /// untouched and an error describes why.
    pub fn find_best_depth<S: ImageSource + ?Sized>(
        &self,
        cache: &mut ImageCache<S>,
        contour: &mut Contour,
        min: f64,
        max: f64,
        step: f64,
    ) -> Result<DepthEstimate, DepthSearchError> {
        let range = DepthRange::new(min, max, step);
        if range.is_empty() {
            return Err(DepthSearchError::EmptyInterval { min, max, step });
        }

        let mut best: Option<(f64, f64)> = None;
        let mut candidates = 0usize;
        let mut skipped = 0usize;

        for depth in range.depths() {
            candidates += 1;
            let patch = match Patch::extract(cache, depth, self.channel, contour) {
                Ok(patch) => patch,
                Err(e) if e.is_retrieval() => {
                    log::debug!("contour {}: no sample at depth {}: {}", contour.id, depth, e);
                    skipped += 1;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            let Some(score) = self.measure.score(&patch) else {
                skipped += 1;
                continue;
            };
            // strict comparison keeps the lowest depth on ties
            if best.is_none_or(|(_, best_score)| score > best_score) {
                best = Some((depth, score));
            }
        }

        let Some((depth, score)) = best else {
            return Err(DepthSearchError::NoScoredCandidate { min, max });
        };

        contour.depth = Some(depth);
        contour.score = Some(score);
        log::debug!(
            "contour {}: best depth {} (score {:.5}, {} candidates, {} skipped)",
            contour.id,
            depth,
            score,
            candidates,
            skipped
        );

        Ok(DepthEstimate {
            depth,
            score,
            candidates,
            skipped,
        })
    }

    /// Search the whole of `range`
    pub fn search_range<S: ImageSource + ?Sized>(
        &self,
        cache: &mut ImageCache<S>,
        contour: &mut Contour,
        range: &DepthRange,
    ) -> Result<DepthEstimate, DepthSearchError> {
        self.find_best_depth(cache, contour, range.min, range.max, range.step)
    }
}

/// Narrow window around a coarse estimate: one coarse step either side,
/// clipped to `range`, scanned with `range.step / divisor`
pub fn refine_window(depth: f64, range: &DepthRange, divisor: f64) -> DepthRange {
    DepthRange::new(
        (depth - range.step).max(range.min),
        (depth + range.step).min(range.max),
        range.step / divisor,
    )
}
