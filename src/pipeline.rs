use std::path::PathBuf;

use anyhow::{Context, Result};
use image::DynamicImage;

use crate::cache::ImageCache;
use crate::detection::projection::MaxProjection;
use crate::models::{Contour, ContourId};
use crate::settings::Settings;

/// Data that flows through the pipeline
#[derive(Debug, Default, Clone)]
pub struct PipelineData {
    /// Maximum projection over the configured depth range
    pub projection: Option<MaxProjection>,

    /// Current contour set
    pub contours: Vec<Contour>,

    /// Merge passes run so far, including the final pass with no merge
    pub merge_passes: usize,

    /// Contours whose depth search assigned nothing
    pub failed: Vec<ContourId>,
}

impl PipelineData {
    /// Record a per-contour search failure once
    pub fn mark_failed(&mut self, id: ContourId) {
        if !self.has_failed(id) {
            self.failed.push(id);
        }
    }

    pub fn has_failed(&self, id: ContourId) -> bool {
        self.failed.contains(&id)
    }
}

/// Debug configuration for pipeline execution
#[derive(Clone, Debug)]
pub struct DebugConfig {
    /// Root directory for debug outputs
    pub output_dir: PathBuf,
    /// Whether debug mode is enabled
    pub enabled: bool,
}

/// Context available to all pipeline steps
pub struct PipelineContext<'a> {
    pub cache: &'a mut ImageCache,
    pub settings: &'a Settings,
    pub debug: Option<DebugConfig>,
    /// Index of the step currently running
    pub step_index: usize,
}

impl PipelineContext<'_> {
    /// Save an intermediate image under `NN_<step_name>/<file_name>` if debug mode is on
    pub fn save_debug(&self, step_name: &str, file_name: &str, image: &DynamicImage) -> Result<()> {
        let Some(debug_config) = &self.debug else {
            return Ok(());
        };
        if !debug_config.enabled {
            return Ok(());
        }

        let step_dir_name = format!(
            "{:02}_{}",
            self.step_index + 1,
            step_name.to_lowercase().replace(' ', "_")
        );
        let step_dir = debug_config.output_dir.join(&step_dir_name);
        std::fs::create_dir_all(&step_dir)?;

        let output_path = step_dir.join(file_name);
        image
            .save(&output_path)
            .with_context(|| format!("Failed to save debug image {:?}", output_path))?;
        log::debug!("debug: saved {}/{}", step_dir_name, file_name);
        Ok(())
    }
}

/// Trait that all pipeline steps must implement
pub trait PipelineStep {
    /// Advance the shared pipeline data by one stage
    fn process(&self, data: &mut PipelineData, context: &mut PipelineContext<'_>) -> Result<()>;

    /// Human-readable name for this step (used in log output and debug folders)
    fn name(&self) -> &str;
}

/// Composable pipeline builder
pub struct Pipeline {
    steps: Vec<Box<dyn PipelineStep>>,
    debug: Option<DebugConfig>,
}

impl Pipeline {
    /// Create a new empty pipeline
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            debug: None,
        }
    }

    /// Enable debug mode with output directory
    /// The directory must be empty or non-existent
    pub fn with_debug(mut self, output_dir: PathBuf) -> Result<Self> {
        // Check if directory exists and is empty
        if output_dir.exists() {
            let entries = std::fs::read_dir(&output_dir)?;
            if entries.count() > 0 {
                return Err(anyhow::anyhow!(
                    "Debug directory is not empty: {}",
                    output_dir.display()
                ));
            }
        } else {
            // Create directory if it doesn't exist
            std::fs::create_dir_all(&output_dir)?;
        }

        self.debug = Some(DebugConfig {
            output_dir,
            enabled: true,
        });

        Ok(self)
    }

    /// Add a processing step to the pipeline
    pub fn add_step(mut self, step: Box<dyn PipelineStep>) -> Self {
        self.steps.push(step);
        self
    }

    /// Names of the configured steps, in order
    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Run every step in order against the cache
    pub fn run(&self, cache: &mut ImageCache, settings: &Settings) -> Result<PipelineData> {
        self.run_partial(cache, settings, self.steps.len())
    }

    /// Run the pipeline but stop after `num_steps` steps (useful for debugging)
    pub fn run_partial(
        &self,
        cache: &mut ImageCache,
        settings: &Settings,
        num_steps: usize,
    ) -> Result<PipelineData> {
        let mut data = PipelineData::default();
        let mut context = PipelineContext {
            cache,
            settings,
            debug: self.debug.clone(),
            step_index: 0,
        };

        for (i, step) in self.steps.iter().take(num_steps).enumerate() {
            context.step_index = i;
            log::info!(
                "Running step {}: {} ({} contours)",
                i + 1,
                step.name(),
                data.contours.len()
            );
            step.process(&mut data, &mut context)
                .with_context(|| format!("step '{}' failed", step.name()))?;
            log::info!("  → {} contours", data.contours.len());
        }

        Ok(data)
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}
