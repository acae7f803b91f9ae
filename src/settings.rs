use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::CacheBudget;
use crate::detection::contours::{ContourParams, Threshold};
use crate::detection::focus::FocusMetric;
use crate::detection::merge::{MergePolicy, OverlapMode};
use crate::error::SettingsError;
use crate::source::{ChannelKind, DEPTH_RESOLUTION};

/// Inclusive depth interval scanned with a fixed step
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DepthRange {
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

impl DepthRange {
    pub fn new(min: f64, max: f64, step: f64) -> Self {
        Self { min, max, step }
    }

    /// Candidate depths `min + k * step` up to `max`; empty for an invalid range
    pub fn depths(&self) -> impl Iterator<Item = f64> + use<> {
        let Self { min, max, step } = *self;
        let count = self.count();
        (0..count).map(move |k| {
            let depth = min + k as f64 * step;
            // keep the last candidate from overshooting by rounding noise
            depth.min(max)
        })
    }

    /// Number of candidate depths
    pub fn count(&self) -> usize {
        if !self.min.is_finite() || !self.max.is_finite() || !self.step.is_finite() {
            return 0;
        }
        if self.step <= 0.0 || self.min > self.max {
            return 0;
        }
        let span = (self.max - self.min) / self.step;
        (span + 1e-9).floor() as usize + 1
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    pub fn contains(&self, depth: f64) -> bool {
        depth >= self.min && depth <= self.max
    }
}

impl Default for DepthRange {
    fn default() -> Self {
        Self {
            min: 0.0,
            max: 100.0,
            step: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Budget in images for pre-recorded sources
    pub max_images: usize,
    /// Budget in cache lines for the live device
    pub max_lines: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_images: 200,
            max_lines: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSettings {
    pub online: bool,
    pub address: String,
    pub timeout_ms: u64,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            online: false,
            address: "127.0.0.1:5000".to_string(),
            timeout_ms: 10_000,
        }
    }
}

impl SourceSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionSettings {
    /// Channel folded into the maximum projection
    pub channel: ChannelKind,
    pub min_area: u32,
    pub threshold: Threshold,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            channel: ChannelKind::Intensity,
            min_area: 4,
            threshold: Threshold::MeanStd(3.0),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FocusSettings {
    pub channel: ChannelKind,
    pub metric: FocusMetric,
}

impl Default for FocusSettings {
    fn default() -> Self {
        Self {
            channel: ChannelKind::Intensity,
            metric: FocusMetric::Tenengrad,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeSettings {
    pub enabled: bool,
    pub depth_tolerance: f64,
    pub overlap: OverlapMode,
    pub margin: u32,
}

impl Default for MergeSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            depth_tolerance: 2.0,
            overlap: OverlapMode::BoundingBox,
            margin: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefineSettings {
    pub enabled: bool,
    /// The refinement step is the coarse step divided by this
    pub divisor: f64,
}

impl Default for RefineSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            divisor: 10.0,
        }
    }
}

/// One phase-sampling request: `samples` points of the contour at `contour`
/// (index into the final contour list), read from `start` to `stop`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseProbe {
    pub contour: usize,
    pub samples: usize,
    pub start: f64,
    pub stop: f64,
    pub step: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingSettings {
    pub seed: u64,
    pub channel: ChannelKind,
    pub probes: Vec<PhaseProbe>,
}

impl Default for SamplingSettings {
    fn default() -> Self {
        Self {
            seed: 0,
            channel: ChannelKind::Phase,
            probes: Vec::new(),
        }
    }
}

/// Read-only settings snapshot for one pipeline run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub data_folder: PathBuf,
    pub output_folder: PathBuf,
    pub depth: DepthRange,
    pub cache: CacheSettings,
    pub source: SourceSettings,
    pub detection: DetectionSettings,
    pub focus: FocusSettings,
    pub merge: MergeSettings,
    pub refine: RefineSettings,
    pub sampling: SamplingSettings,
}

impl Settings {
    /// Load and validate a TOML settings file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let settings: Settings = toml::from_str(&text).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject ranges and budgets the pipeline cannot run with
    pub fn validate(&self) -> Result<(), SettingsError> {
        let d = &self.depth;
        if !(d.min.is_finite() && d.max.is_finite() && d.step.is_finite()) {
            return Err(SettingsError::Invalid("depth bounds must be finite".into()));
        }
        if d.min > d.max {
            return Err(SettingsError::Invalid(format!(
                "depth.min ({}) is greater than depth.max ({})",
                d.min, d.max
            )));
        }
        if d.step < DEPTH_RESOLUTION {
            return Err(SettingsError::Invalid(format!(
                "depth.step must be at least {DEPTH_RESOLUTION}, got {}",
                d.step
            )));
        }
        if self.cache.max_images == 0 || self.cache.max_lines == 0 {
            return Err(SettingsError::Invalid("cache budgets must be at least 1".into()));
        }
        if self.detection.min_area == 0 {
            return Err(SettingsError::Invalid("detection.min_area must be at least 1".into()));
        }
        if !(self.merge.depth_tolerance >= 0.0) {
            return Err(SettingsError::Invalid(format!(
                "merge.depth_tolerance must be non-negative, got {}",
                self.merge.depth_tolerance
            )));
        }
        if !(self.refine.divisor > 1.0) {
            return Err(SettingsError::Invalid(format!(
                "refine.divisor must be greater than 1, got {}",
                self.refine.divisor
            )));
        }
        if self.refine.enabled && d.step / self.refine.divisor < DEPTH_RESOLUTION {
            return Err(SettingsError::Invalid(format!(
                "refinement step {} is finer than the depth resolution {DEPTH_RESOLUTION}",
                d.step / self.refine.divisor
            )));
        }
        for probe in &self.sampling.probes {
            if !(probe.step > 0.0) || probe.start > probe.stop {
                return Err(SettingsError::Invalid(format!(
                    "phase probe for contour {} has an empty depth range",
                    probe.contour
                )));
            }
            if probe.step < DEPTH_RESOLUTION {
                return Err(SettingsError::Invalid(format!(
                    "phase probe for contour {} steps by {}, finer than {DEPTH_RESOLUTION}",
                    probe.contour, probe.step
                )));
            }
        }
        Ok(())
    }

    /// Storage budget matching the configured source kind
    pub fn cache_budget(&self) -> CacheBudget {
        if self.source.online {
            CacheBudget::Lines(self.cache.max_lines)
        } else {
            CacheBudget::Images(self.cache.max_images)
        }
    }

    pub fn contour_params(&self) -> ContourParams {
        ContourParams {
            threshold: self.detection.threshold,
            min_area: self.detection.min_area,
        }
    }

    pub fn merge_policy(&self) -> MergePolicy {
        MergePolicy {
            overlap: self.merge.overlap,
            depth_tolerance: self.merge.depth_tolerance,
            margin: self.merge.margin,
        }
    }

    /// Refinement needs a live source able to reconstruct intermediate depths
    pub fn refine_active(&self) -> bool {
        self.refine.enabled && self.source.online
    }
}
