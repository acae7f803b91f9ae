//! Integration tests for the maximum projection and contour extraction.

mod common;

use common::*;
use holocontours::ProjectionError;
use holocontours::detection::contours::{ContourParams, Threshold, find_contours};
use holocontours::detection::projection::generate_max_map;

fn params(level: f32, min_area: u32) -> ContourParams {
    ContourParams {
        threshold: Threshold::Absolute(level),
        min_area,
    }
}

#[test]
fn test_max_map_is_pixelwise_maximum() -> anyhow::Result<()> {
    let mut source = MemorySource::new();
    source.insert(DepthImage::new(
        0.0,
        ChannelKind::Intensity,
        FloatImage::from_fn(2, 1, |x, _| image::Luma([if x == 0 { 5.0 } else { 1.0 }])),
    ));
    source.insert(DepthImage::new(
        1.0,
        ChannelKind::Intensity,
        FloatImage::from_fn(2, 1, |x, _| image::Luma([if x == 0 { 2.0 } else { 3.0 }])),
    ));
    let mut cache = open_cache(source, CacheBudget::Images(4));

    let projection = generate_max_map(
        &mut cache,
        &DepthRange::new(0.0, 1.0, 1.0),
        ChannelKind::Intensity,
    )?;

    assert_eq!(projection.values.as_raw(), &vec![5.0, 3.0]);
    assert_eq!(projection.depths.as_raw(), &vec![0.0, 1.0]);
    assert_eq!(projection.slices, 2);
    assert_eq!(projection.skipped, 0);
    Ok(())
}

#[test]
fn test_max_map_reads_each_slice_once() -> anyhow::Result<()> {
    let source = focus_stack(&[SQUARE_A]);
    let mut cache = open_cache(source, CacheBudget::Images(1));

    generate_max_map(&mut cache, &DepthRange::new(0.0, 2.0, 1.0), ChannelKind::Intensity)?;
    assert_eq!(cache.source().fetch_count(), 3);
    Ok(())
}

#[test]
fn test_max_map_skips_missing_depths() -> anyhow::Result<()> {
    let source = stack_from(&[0.0, 2.0], ChannelKind::Intensity, |d| blank(3, 3, d as f32));
    let mut cache = open_cache(source, CacheBudget::Images(4));

    let projection =
        generate_max_map(&mut cache, &DepthRange::new(0.0, 2.0, 1.0), ChannelKind::Intensity)?;
    assert_eq!(projection.slices, 2);
    assert_eq!(projection.skipped, 1);
    assert!(projection.values.as_raw().iter().all(|&v| v == 2.0));
    Ok(())
}

#[test]
fn test_max_map_without_slices_fails() {
    let source = stack_from(&[0.0], ChannelKind::Intensity, |_| blank(3, 3, 1.0));
    let mut cache = open_cache(source, CacheBudget::Images(4));

    let err = generate_max_map(&mut cache, &DepthRange::new(5.0, 6.0, 1.0), ChannelKind::Intensity)
        .unwrap_err();
    assert!(matches!(err, ProjectionError::NoSlices { .. }));
}

#[test]
fn test_max_map_rejects_mismatched_slices() {
    let mut source = MemorySource::new();
    source.insert(DepthImage::new(0.0, ChannelKind::Intensity, blank(3, 3, 0.0)));
    source.insert(DepthImage::new(1.0, ChannelKind::Intensity, blank(4, 3, 0.0)));
    let mut cache = open_cache(source, CacheBudget::Images(4));

    let err = generate_max_map(&mut cache, &DepthRange::new(0.0, 1.0, 1.0), ChannelKind::Intensity)
        .unwrap_err();
    assert!(matches!(err, ProjectionError::DimensionMismatch { .. }));
}

#[test]
fn test_two_squares_give_two_contours() {
    let projection = slice_with_squares(&[SQUARE_B, SQUARE_A], 1.0);

    let contours = find_contours(&projection, &params(0.5, 4));

    assert_eq!(contours.len(), 2);
    // numbered top-to-bottom
    assert_eq!(contours[0].id, 0);
    assert_eq!(contours[0].bbox.min_x, SQUARE_A.x);
    assert_eq!(contours[1].id, 1);
    assert_eq!(contours[1].bbox.min_x, SQUARE_B.x);
    for contour in &contours {
        assert_eq!(contour.area(), 25);
        assert_eq!(contour.bbox.width(), 5);
        assert_eq!(contour.depth, None);
        assert!(!contour.boundary.is_empty());
        assert!(contour.boundary.iter().all(|p| contour.contains(*p)));
    }
}

#[test]
fn test_min_area_drops_small_regions() {
    let mut projection = slice_with_squares(&[SQUARE_A], 1.0);
    projection.put_pixel(30, 30, image::Luma([1.0]));

    assert_eq!(find_contours(&projection, &params(0.5, 1)).len(), 2);
    let contours = find_contours(&projection, &params(0.5, 4));
    assert_eq!(contours.len(), 1);
    assert_eq!(contours[0].area(), 25);
}

#[test]
fn test_blank_projection_has_no_contours() {
    let projection = blank(WIDTH, HEIGHT, 0.0);
    assert!(find_contours(&projection, &params(0.5, 1)).is_empty());
}

#[test]
fn test_mean_std_threshold_finds_bright_regions() {
    let projection = slice_with_squares(&[SQUARE_A, SQUARE_B], 1.0);
    let params = ContourParams {
        threshold: Threshold::MeanStd(3.0),
        min_area: 4,
    };
    assert_eq!(find_contours(&projection, &params).len(), 2);
}

#[test]
fn test_diagonal_neighbours_are_connected() {
    let mut projection = blank(8, 8, 0.0);
    for (x, y) in [(1, 1), (2, 2), (3, 3), (4, 4)] {
        projection.put_pixel(x, y, image::Luma([1.0]));
    }
    let contours = find_contours(&projection, &params(0.5, 1));
    assert_eq!(contours.len(), 1);
    assert_eq!(contours[0].area(), 4);
}
