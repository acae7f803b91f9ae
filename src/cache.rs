use std::collections::{BTreeMap, HashMap};

use image::imageops;

use crate::error::SourceError;
use crate::models::BoundingBox;
use crate::source::{ChannelKind, DepthImage, DepthKey, FloatImage, ImageSource};

/// Storage budget of the image cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBudget {
    /// At most `n` resident images (pre-recorded sources)
    Images(usize),
    /// At most `n` cache lines, one line per depth holding any of its channels (live sources)
    Lines(usize),
}

impl CacheBudget {
    /// Maximum number of resident slots, never below one
    pub fn limit(self) -> usize {
        match self {
            CacheBudget::Images(n) | CacheBudget::Lines(n) => n.max(1),
        }
    }
}

/// Hit/miss counters, reported at the end of a run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Rectangular copy of a cached slice, positioned in image coordinates
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub image: FloatImage,
}

impl Region {
    /// Sample at absolute image coordinates
    pub fn value(&self, x: u32, y: u32) -> Option<f32> {
        let lx = x.checked_sub(self.x)?;
        let ly = y.checked_sub(self.y)?;
        if lx < self.image.width() && ly < self.image.height() {
            Some(self.image.get_pixel(lx, ly)[0])
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct SlotKey {
    depth: DepthKey,
    // None for a whole cache line
    channel: Option<ChannelKind>,
}

// Image together with the exact depth it was requested at
#[derive(Debug)]
struct Entry {
    requested: f64,
    image: DepthImage,
}

#[derive(Debug)]
struct Slot {
    entries: [Option<Entry>; 3],
    tick: u64,
}

/// Memoizes depth images from an [`ImageSource`] under a storage budget.
///
/// The cache is the only owner of resident images. `get` hands out a borrow
/// that ends at the next cache call, so anything needed longer has to be
/// copied out (see [`ImageCache::crop`]).
pub struct ImageCache<S: ?Sized = dyn ImageSource> {
    budget: CacheBudget,
    slots: HashMap<SlotKey, Slot>,
    // tick -> slot, oldest first
    recency: BTreeMap<u64, SlotKey>,
    tick: u64,
    stats: CacheStats,
    source: Box<S>,
}

impl<S: ImageSource + ?Sized> ImageCache<S> {
    pub fn new(source: Box<S>, budget: CacheBudget) -> Self {
        Self {
            budget,
            slots: HashMap::new(),
            recency: BTreeMap::new(),
            tick: 0,
            stats: CacheStats::default(),
            source,
        }
    }

    /// Open a dataset on the underlying source and drop anything resident
    pub fn open(&mut self, location: &str) -> Result<(), SourceError> {
        self.source.open(location)?;
        self.clear();
        log::info!(
            "opened {:?} via {} source ({:?})",
            location,
            self.source.name(),
            self.budget
        );
        Ok(())
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn budget(&self) -> CacheBudget {
        self.budget
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Number of resident slots (images or lines, depending on the budget)
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.recency.clear();
    }

    /// Whether the image is resident, without touching recency.
    ///
    /// A resident image only counts when it was fetched for this exact depth,
    /// not merely for one that rounds to the same key.
    pub fn contains(&self, depth: f64, channel: ChannelKind) -> bool {
        self.slots
            .get(&self.slot_key(depth, channel))
            .and_then(|slot| slot.entries[channel.index()].as_ref())
            .is_some_and(|entry| DepthKey::same_depth(entry.requested, depth))
    }

    /// Return the image for (depth, channel), fetching it on a miss.
    ///
    /// Source failures are propagated and nothing is inserted for them.
    pub fn get(&mut self, depth: f64, channel: ChannelKind) -> Result<&DepthImage, SourceError> {
        let key = self.slot_key(depth, channel);
        let idx = channel.index();
        self.tick += 1;
        let tick = self.tick;

        if self.contains(depth, channel) {
            self.stats.hits += 1;
            self.touch(key, tick);
        } else {
            self.stats.misses += 1;
            let image = self.source.fetch(depth, channel)?;
            if self.slots.get(&key).is_some_and(|slot| slot.entries[idx].is_some()) {
                log::debug!("depth {depth} {channel}: replacing image cached for a nearby depth");
            }

            if self.slots.contains_key(&key) {
                // line already resident, only the channel was missing
                self.touch(key, tick);
            } else {
                while self.slots.len() >= self.budget.limit() {
                    if !self.evict_oldest() {
                        break;
                    }
                }
                self.slots.insert(
                    key,
                    Slot {
                        entries: [None, None, None],
                        tick,
                    },
                );
                self.recency.insert(tick, key);
            }

            if let Some(slot) = self.slots.get_mut(&key) {
                slot.entries[idx] = Some(Entry {
                    requested: depth,
                    image,
                });
            }
        }

        self.slots
            .get(&key)
            .and_then(|slot| slot.entries[idx].as_ref())
            .map(|entry| &entry.image)
            .ok_or_else(|| SourceError::retrieval(depth, channel, "image vanished from cache"))
    }

    /// Copy a rectangle out of the slice; the rectangle is clipped to the image
    pub fn crop(
        &mut self,
        depth: f64,
        channel: ChannelKind,
        bbox: &BoundingBox,
    ) -> Result<Region, SourceError> {
        let image = self.get(depth, channel)?;
        let (width, height) = image.dimensions();
        if bbox.min_x >= width || bbox.min_y >= height {
            return Err(SourceError::retrieval(
                depth,
                channel,
                format!("region {bbox:?} lies outside {width}x{height} slice"),
            ));
        }
        let max_x = bbox.max_x.min(width - 1);
        let max_y = bbox.max_y.min(height - 1);
        let cropped = imageops::crop_imm(
            &image.data,
            bbox.min_x,
            bbox.min_y,
            max_x - bbox.min_x + 1,
            max_y - bbox.min_y + 1,
        )
        .to_image();

        Ok(Region {
            x: bbox.min_x,
            y: bbox.min_y,
            image: cropped,
        })
    }

    /// Single sample; Ok(None) when (x, y) lies outside the slice
    pub fn value(
        &mut self,
        depth: f64,
        channel: ChannelKind,
        x: u32,
        y: u32,
    ) -> Result<Option<f32>, SourceError> {
        Ok(self.get(depth, channel)?.value(x, y))
    }

    fn slot_key(&self, depth: f64, channel: ChannelKind) -> SlotKey {
        let depth = DepthKey::from_depth(depth);
        match self.budget {
            CacheBudget::Images(_) => SlotKey {
                depth,
                channel: Some(channel),
            },
            CacheBudget::Lines(_) => SlotKey {
                depth,
                channel: None,
            },
        }
    }

    fn touch(&mut self, key: SlotKey, tick: u64) {
        if let Some(slot) = self.slots.get_mut(&key) {
            self.recency.remove(&slot.tick);
            slot.tick = tick;
            self.recency.insert(tick, key);
        }
    }

    fn evict_oldest(&mut self) -> bool {
        let Some((_, key)) = self.recency.pop_first() else {
            return false;
        };
        self.slots.remove(&key);
        self.stats.evictions += 1;
        log::trace!("evicted depth {} {:?}", key.depth.depth(), key.channel);
        true
    }
}
