//! Integration tests for the image cache.
//!
//! Tests cover:
//! - Hits return the source's image without refetching
//! - Image and line budgets bound the resident set
//! - Least-recently-used eviction order
//! - Failures propagate and leave nothing behind
//! - Region copies are clipped to the slice
//! - Nearby depths and sibling channels never share an image

mod common;

use common::*;
use holocontours::cache::Region;

fn depth_stack(depths: &[f64]) -> MemorySource {
    stack_from(depths, ChannelKind::Phase, |depth| blank(4, 4, depth as f32))
}

#[test]
fn test_get_returns_source_image() -> anyhow::Result<()> {
    let source = depth_stack(&[0.0, 1.0]);
    let expected = source.slice(1.0, ChannelKind::Phase).cloned();
    let mut cache = open_cache(source, CacheBudget::Images(4));

    let image = cache.get(1.0, ChannelKind::Phase)?.clone();
    assert_eq!(Some(image), expected);
    Ok(())
}

#[test]
fn test_second_get_is_a_hit() -> anyhow::Result<()> {
    let mut cache = open_cache(depth_stack(&[0.0, 1.0]), CacheBudget::Images(4));

    cache.get(0.0, ChannelKind::Phase)?;
    let value = cache.get(0.0, ChannelKind::Phase)?.value(0, 0);

    assert_eq!(value, Some(0.0));
    assert_eq!(cache.source().fetch_count(), 1);
    let stats = cache.stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hit_rate(), 0.5);
    Ok(())
}

#[test]
fn test_depths_are_quantized() -> anyhow::Result<()> {
    let mut cache = open_cache(depth_stack(&[0.3]), CacheBudget::Images(4));

    cache.get(0.1 + 0.2, ChannelKind::Phase)?;
    assert!(cache.contains(0.3, ChannelKind::Phase));
    cache.get(0.3, ChannelKind::Phase)?;
    assert_eq!(cache.source().fetch_count(), 1);
    Ok(())
}

#[test]
fn test_image_budget_bounds_resident_set() -> anyhow::Result<()> {
    let mut cache = open_cache(depth_stack(&[0.0, 1.0, 2.0, 3.0]), CacheBudget::Images(2));

    for depth in [0.0, 1.0, 2.0, 3.0] {
        cache.get(depth, ChannelKind::Phase)?;
        assert!(cache.len() <= 2);
    }
    assert_eq!(cache.len(), 2);
    assert_eq!(cache.stats().evictions, 2);
    Ok(())
}

#[test]
fn test_least_recently_used_is_evicted() -> anyhow::Result<()> {
    let mut cache = open_cache(depth_stack(&[0.0, 1.0, 2.0]), CacheBudget::Images(2));

    cache.get(0.0, ChannelKind::Phase)?;
    cache.get(1.0, ChannelKind::Phase)?;
    // touch depth 0 so depth 1 becomes the oldest
    cache.get(0.0, ChannelKind::Phase)?;
    cache.get(2.0, ChannelKind::Phase)?;

    assert!(cache.contains(0.0, ChannelKind::Phase));
    assert!(!cache.contains(1.0, ChannelKind::Phase));
    assert!(cache.contains(2.0, ChannelKind::Phase));
    Ok(())
}

#[test]
fn test_line_budget_counts_depths_not_channels() -> anyhow::Result<()> {
    let mut source = depth_stack(&[0.0, 1.0]);
    source.insert(DepthImage::new(0.0, ChannelKind::Intensity, blank(4, 4, 9.0)));
    let mut cache = open_cache(source, CacheBudget::Lines(1));

    cache.get(0.0, ChannelKind::Phase)?;
    cache.get(0.0, ChannelKind::Intensity)?;
    assert_eq!(cache.len(), 1);
    assert!(cache.contains(0.0, ChannelKind::Phase));
    assert!(cache.contains(0.0, ChannelKind::Intensity));

    cache.get(1.0, ChannelKind::Phase)?;
    assert_eq!(cache.len(), 1);
    assert!(!cache.contains(0.0, ChannelKind::Phase));
    assert!(!cache.contains(0.0, ChannelKind::Intensity));
    Ok(())
}

#[test]
fn test_zero_budget_keeps_one_slot() -> anyhow::Result<()> {
    let mut cache = open_cache(depth_stack(&[0.0, 1.0]), CacheBudget::Images(0));

    cache.get(0.0, ChannelKind::Phase)?;
    cache.get(1.0, ChannelKind::Phase)?;
    assert_eq!(cache.len(), 1);
    assert!(cache.contains(1.0, ChannelKind::Phase));
    Ok(())
}

#[test]
fn test_failed_fetch_is_not_cached() {
    let mut cache = open_cache(depth_stack(&[0.0]), CacheBudget::Images(4));

    let err = cache.get(7.0, ChannelKind::Phase).unwrap_err();
    assert!(err.is_retrieval());
    assert!(cache.is_empty());
    assert!(!cache.contains(7.0, ChannelKind::Phase));
    assert_eq!(cache.stats().misses, 1);

    // a second attempt asks the source again
    assert!(cache.get(7.0, ChannelKind::Phase).is_err());
    assert_eq!(cache.stats().misses, 2);
}

#[test]
fn test_get_before_open_fails() {
    let mut cache = ImageCache::new(Box::new(depth_stack(&[0.0])), CacheBudget::Images(4));

    let err = cache.get(0.0, ChannelKind::Phase).unwrap_err();
    assert!(matches!(err, SourceError::NotOpened));
    assert!(!err.is_retrieval());
}

#[test]
fn test_open_clears_resident_images() -> anyhow::Result<()> {
    let mut cache = open_cache(depth_stack(&[0.0]), CacheBudget::Images(4));
    cache.get(0.0, ChannelKind::Phase)?;
    assert_eq!(cache.len(), 1);

    cache.open("again")?;
    assert!(cache.is_empty());
    Ok(())
}

#[test]
fn test_crop_copies_and_clips() -> anyhow::Result<()> {
    let source = stack_from(&[0.0], ChannelKind::Phase, |_| {
        FloatImage::from_fn(8, 8, |x, y| image::Luma([(y * 8 + x) as f32]))
    });
    let mut cache = open_cache(source, CacheBudget::Images(1));

    let bbox = BoundingBox {
        min_x: 6,
        min_y: 5,
        max_x: 12,
        max_y: 6,
    };
    let region: Region = cache.crop(0.0, ChannelKind::Phase, &bbox)?;
    assert_eq!((region.x, region.y), (6, 5));
    assert_eq!(region.image.dimensions(), (2, 2));
    assert_eq!(region.value(7, 6), Some(55.0));
    assert_eq!(region.value(5, 5), None);

    // the copy survives eviction of its slice
    cache.clear();
    assert_eq!(region.value(6, 5), Some(46.0));
    Ok(())
}

#[test]
fn test_crop_outside_slice_fails() {
    let mut cache = open_cache(depth_stack(&[0.0]), CacheBudget::Images(1));
    let bbox = BoundingBox {
        min_x: 10,
        min_y: 0,
        max_x: 12,
        max_y: 2,
    };
    let err = cache.crop(0.0, ChannelKind::Phase, &bbox).unwrap_err();
    assert!(err.is_retrieval());
}

#[test]
fn test_value_outside_slice_is_none() -> anyhow::Result<()> {
    let mut cache = open_cache(depth_stack(&[1.0]), CacheBudget::Images(1));
    assert_eq!(cache.value(1.0, ChannelKind::Phase, 3, 3)?, Some(1.0));
    assert_eq!(cache.value(1.0, ChannelKind::Phase, 4, 0)?, None);
    Ok(())
}

/// Reconstructs every requested depth exactly, filling the slice with it
#[derive(Default)]
struct ExactDepthSource {
    fetches: usize,
}

impl ImageSource for ExactDepthSource {
    fn open(&mut self, _location: &str) -> Result<(), SourceError> {
        Ok(())
    }

    fn fetch(&mut self, depth: f64, channel: ChannelKind) -> Result<DepthImage, SourceError> {
        self.fetches += 1;
        Ok(DepthImage::new(depth, channel, blank(2, 2, depth as f32)))
    }

    fn is_live(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "exact"
    }
}

#[test]
fn test_nearby_depths_do_not_share_an_image() -> anyhow::Result<()> {
    for budget in [CacheBudget::Images(8), CacheBudget::Lines(8)] {
        let mut cache = ImageCache::new(Box::new(ExactDepthSource::default()), budget);
        cache.open("exact")?;

        let first = cache.get(1.0004, ChannelKind::Phase)?.clone();
        let second = cache.get(1.0, ChannelKind::Phase)?.clone();
        let direct = ExactDepthSource::default().fetch(1.0, ChannelKind::Phase)?;

        assert_eq!(first.depth, 1.0004);
        assert_eq!(second, direct, "{budget:?}");
        assert!(!cache.contains(1.0004, ChannelKind::Phase));
        assert_eq!(cache.stats().hits, 0);
        assert_eq!(cache.source().fetches, 2);

        // the replacement is itself cached
        cache.get(1.0, ChannelKind::Phase)?;
        assert_eq!(cache.stats().hits, 1);
    }
    Ok(())
}

#[test]
fn test_channels_at_one_depth_stay_separate() -> anyhow::Result<()> {
    for budget in [CacheBudget::Images(4), CacheBudget::Lines(4)] {
        let mut source = depth_stack(&[0.0, 1.0]);
        source.insert(DepthImage::new(1.0, ChannelKind::Intensity, blank(4, 4, 9.0)));
        source.insert(DepthImage::new(1.0, ChannelKind::Amplitude, blank(4, 4, -2.0)));
        let expected: Vec<Option<DepthImage>> = ChannelKind::ALL
            .iter()
            .map(|&c| source.slice(1.0, c).cloned())
            .collect();
        let mut cache = open_cache(source, budget);

        // fetch every channel, then read them back as hits
        for _ in 0..2 {
            for (channel, want) in ChannelKind::ALL.into_iter().zip(&expected) {
                let got = cache.get(1.0, channel)?.clone();
                assert_eq!(Some(got), *want, "{channel} under {budget:?}");
            }
        }
        assert_eq!(cache.stats().hits, 3);
        assert_eq!(cache.source().fetch_count(), 3);
    }
    Ok(())
}
