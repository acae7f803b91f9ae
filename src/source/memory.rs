use std::collections::HashMap;

use super::{ChannelKind, DepthImage, DepthKey, ImageSource};
use crate::error::SourceError;

/// In-memory depth stack, used for synthetic datasets and tests
#[derive(Debug, Default, Clone)]
pub struct MemorySource {
    slices: HashMap<(DepthKey, ChannelKind), DepthImage>,
    opened: bool,
    fetches: usize,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a slice
    pub fn insert(&mut self, image: DepthImage) {
        self.slices
            .insert((DepthKey::from_depth(image.depth), image.channel), image);
    }

    pub fn len(&self) -> usize {
        self.slices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }

    /// Number of successful fetches served so far
    pub fn fetch_count(&self) -> usize {
        self.fetches
    }

    /// Direct lookup that bypasses the fetch counter
    pub fn slice(&self, depth: f64, channel: ChannelKind) -> Option<&DepthImage> {
        self.slices.get(&(DepthKey::from_depth(depth), channel))
    }
}

impl ImageSource for MemorySource {
    fn open(&mut self, location: &str) -> Result<(), SourceError> {
        if self.slices.is_empty() {
            return Err(SourceError::Unavailable(format!(
                "in-memory stack for {location:?} holds no slices"
            )));
        }
        self.opened = true;
        Ok(())
    }

    fn fetch(&mut self, depth: f64, channel: ChannelKind) -> Result<DepthImage, SourceError> {
        if !self.opened {
            return Err(SourceError::NotOpened);
        }
        let image = self
            .slices
            .get(&(DepthKey::from_depth(depth), channel))
            .cloned()
            .ok_or_else(|| SourceError::retrieval(depth, channel, "no such slice in memory"))?;
        self.fetches += 1;
        Ok(image)
    }

    fn name(&self) -> &str {
        "memory"
    }
}
