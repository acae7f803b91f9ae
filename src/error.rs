use std::path::PathBuf;

use crate::source::ChannelKind;

/// Errors raised by an image source or propagated through the cache.
#[derive(thiserror::Error, Debug)]
pub enum SourceError {
    #[error("image source unavailable: {0}")]
    Unavailable(String),
    #[error("image source used before a dataset was opened")]
    NotOpened,
    #[error("depth {depth} ({channel}) could not be retrieved: {reason}")]
    DepthRetrieval {
        depth: f64,
        channel: ChannelKind,
        reason: String,
    },
}

impl SourceError {
    pub fn retrieval(depth: f64, channel: ChannelKind, reason: impl Into<String>) -> Self {
        SourceError::DepthRetrieval {
            depth,
            channel,
            reason: reason.into(),
        }
    }

    /// A missing sample the caller may skip, as opposed to a dead source
    pub fn is_retrieval(&self) -> bool {
        matches!(self, SourceError::DepthRetrieval { .. })
    }
}

/// Per-contour outcome of a focus search that did not assign a depth.
#[derive(thiserror::Error, Debug)]
pub enum DepthSearchError {
    #[error("empty search interval [{min}, {max}] with step {step}")]
    EmptyInterval { min: f64, max: f64, step: f64 },
    #[error("no candidate depth in [{min}, {max}] produced a focus score")]
    NoScoredCandidate { min: f64, max: f64 },
    #[error(transparent)]
    Source(#[from] SourceError),
}

/// Errors building the maximum projection.
#[derive(thiserror::Error, Debug)]
pub enum ProjectionError {
    #[error("no depth slice in [{min}, {max}] could be read")]
    NoSlices { min: f64, max: f64 },
    #[error("slice at depth {depth} is {got:?}, expected {expected:?}")]
    DimensionMismatch {
        depth: f64,
        expected: (u32, u32),
        got: (u32, u32),
    },
    #[error(transparent)]
    Source(#[from] SourceError),
}

/// Errors loading or validating the settings file.
#[derive(thiserror::Error, Debug)]
pub enum SettingsError {
    #[error("failed to read settings {path:?}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse settings {path:?}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid settings: {0}")]
    Invalid(String),
}
