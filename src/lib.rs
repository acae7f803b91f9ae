pub mod cache;
pub mod detection;
pub mod error;
pub mod logger;
pub mod models;
pub mod pipeline;
pub mod report;
pub mod settings;
pub mod source;

pub use cache::{CacheBudget, CacheStats, ImageCache, Region};
pub use detection::build_standard_pipeline;
pub use error::{DepthSearchError, ProjectionError, SettingsError, SourceError};
pub use models::{BoundingBox, Contour, ContourId, Point};
pub use pipeline::{DebugConfig, Pipeline, PipelineContext, PipelineData, PipelineStep};
pub use report::ReportWriter;
pub use settings::{DepthRange, Settings};
pub use source::{
    ChannelKind, DEPTH_RESOLUTION, DepthImage, DepthKey, FloatImage, ImageSource, LiveClient,
    MemorySource, OfflineReader,
};
