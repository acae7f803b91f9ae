#![allow(dead_code)]

mod device;
mod fixtures;
pub use device::*;
pub use fixtures::*;

// Re-export commonly used types from holocontours for tests
pub use holocontours::{
    BoundingBox, CacheBudget, ChannelKind, Contour, DepthImage, DepthRange, FloatImage,
    ImageCache, ImageSource, MemorySource, Point, Settings, SourceError,
};
