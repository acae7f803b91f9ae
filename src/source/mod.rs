pub mod live;
pub mod memory;
pub mod offline;

use std::fmt;

use image::{ImageBuffer, Luma};
use serde::{Deserialize, Serialize};

use crate::error::SourceError;

pub use live::LiveClient;
pub use memory::MemorySource;
pub use offline::OfflineReader;

/// Single-channel floating point raster used for every depth slice
pub type FloatImage = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Reconstruction channel of a depth slice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Phase,
    Intensity,
    Amplitude,
}

impl ChannelKind {
    pub const ALL: [ChannelKind; 3] = [
        ChannelKind::Phase,
        ChannelKind::Intensity,
        ChannelKind::Amplitude,
    ];

    /// Position of the channel inside a cache line
    pub fn index(self) -> usize {
        match self {
            ChannelKind::Phase => 0,
            ChannelKind::Intensity => 1,
            ChannelKind::Amplitude => 2,
        }
    }

    /// Directory name used by pre-recorded datasets
    pub fn dir_name(self) -> &'static str {
        match self {
            ChannelKind::Phase => "phase",
            ChannelKind::Intensity => "intensity",
            ChannelKind::Amplitude => "amplitude",
        }
    }

    pub fn to_wire(self) -> u8 {
        self.index() as u8
    }

    pub fn from_wire(byte: u8) -> Option<Self> {
        Self::ALL.get(byte as usize).copied()
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Smallest depth spacing the sources and the cache can tell apart
pub const DEPTH_RESOLUTION: f64 = 0.001;

/// Depth quantized to thousandths, used wherever depths are compared or hashed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DepthKey(pub i64);

impl DepthKey {
    /// Two depths name the same slice when they differ only by rounding noise
    pub fn same_depth(a: f64, b: f64) -> bool {
        (a - b).abs() <= 1e-9
    }

    pub fn from_depth(depth: f64) -> Self {
        Self((depth * 1000.0).round() as i64)
    }

    pub fn depth(self) -> f64 {
        self.0 as f64 / 1000.0
    }
}

/// One reconstructed image for a single depth and channel
#[derive(Debug, Clone, PartialEq)]
pub struct DepthImage {
    pub depth: f64,
    pub channel: ChannelKind,
    pub data: FloatImage,
}

impl DepthImage {
    pub fn new(depth: f64, channel: ChannelKind, data: FloatImage) -> Self {
        Self { depth, channel, data }
    }

    /// Build a slice from a row-major sample buffer
    pub fn from_raw(
        depth: f64,
        channel: ChannelKind,
        width: u32,
        height: u32,
        samples: Vec<f32>,
    ) -> Option<Self> {
        ImageBuffer::from_raw(width, height, samples).map(|data| Self { depth, channel, data })
    }

    pub fn width(&self) -> u32 {
        self.data.width()
    }

    pub fn height(&self) -> u32 {
        self.data.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.data.dimensions()
    }

    /// Sample at (x, y); None outside the image
    pub fn value(&self, x: u32, y: u32) -> Option<f32> {
        if x < self.width() && y < self.height() {
            Some(self.data.get_pixel(x, y)[0])
        } else {
            None
        }
    }
}

/// Capability shared by the pre-recorded reader and the live device client.
///
/// `fetch` must fail with [`SourceError::DepthRetrieval`] when a depth or
/// channel cannot be produced; it never fabricates a blank image.
pub trait ImageSource {
    /// Open a dataset (folder, archive or remote hologram name)
    fn open(&mut self, location: &str) -> Result<(), SourceError>;

    /// Produce the image for one depth and channel
    fn fetch(&mut self, depth: f64, channel: ChannelKind) -> Result<DepthImage, SourceError>;

    /// Whether the source reconstructs on demand (needed for refinement)
    fn is_live(&self) -> bool {
        false
    }

    /// Human-readable name for log output
    fn name(&self) -> &str;
}
