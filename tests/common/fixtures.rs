use std::path::Path;

use holocontours::detection::contours::Threshold;
use holocontours::{
    CacheBudget, ChannelKind, Contour, DepthImage, DepthRange, FloatImage, ImageCache,
    ImageSource, MemorySource, Point, Settings, SourceError,
};
use image::{GrayImage, Luma};

pub const WIDTH: u32 = 32;
pub const HEIGHT: u32 = 32;

/// Axis-aligned square: top-left corner, side length
#[derive(Debug, Clone, Copy)]
pub struct Square {
    pub x: u32,
    pub y: u32,
    pub size: u32,
}

pub const SQUARE_A: Square = Square { x: 4, y: 4, size: 5 };
pub const SQUARE_B: Square = Square { x: 20, y: 20, size: 5 };

/// Uniform slice
pub fn blank(width: u32, height: u32, value: f32) -> FloatImage {
    FloatImage::from_pixel(width, height, Luma([value]))
}

/// Slice with the given squares painted at `value` on a zero background
pub fn slice_with_squares(squares: &[Square], value: f32) -> FloatImage {
    FloatImage::from_fn(WIDTH, HEIGHT, |x, y| {
        let inside = squares
            .iter()
            .any(|s| x >= s.x && x < s.x + s.size && y >= s.y && y < s.y + s.size);
        Luma([if inside { value } else { 0.0 }])
    })
}

/// Footprint of a square as a pixel list
pub fn square_pixels(square: Square) -> Vec<Point> {
    let mut pixels = Vec::new();
    for y in square.y..square.y + square.size {
        for x in square.x..square.x + square.size {
            pixels.push(Point::new(x, y));
        }
    }
    pixels
}

/// Contour covering a square, optionally with a depth already assigned
pub fn square_contour(id: u32, square: Square, depth: Option<f64>) -> Contour {
    let mut contour =
        Contour::new(id, square_pixels(square), Vec::new()).expect("square is never empty");
    contour.depth = depth;
    contour
}

/// Stack where `channel` at each depth is produced by `make`
pub fn stack_from<F>(depths: &[f64], channel: ChannelKind, make: F) -> MemorySource
where
    F: Fn(f64) -> FloatImage,
{
    let mut source = MemorySource::new();
    for &depth in depths {
        source.insert(DepthImage::new(depth, channel, make(depth)));
    }
    source
}

/// Three intensity slices (depths 0, 1, 2) holding `squares`.
/// They are bright with sharp edges at depth 1 and dim elsewhere.
pub fn focus_stack(squares: &[Square]) -> MemorySource {
    stack_from(&[0.0, 1.0, 2.0], ChannelKind::Intensity, |depth| {
        let contrast = if depth == 1.0 { 1.0 } else { 0.3 };
        slice_with_squares(squares, contrast)
    })
}

/// Hollow 7x7 ring at (2, 2) with a 3x3 block inside it. The two are
/// separate components whose bounding boxes overlap.
pub fn ring_and_block(value: f32) -> FloatImage {
    FloatImage::from_fn(WIDTH, HEIGHT, |x, y| {
        let in_ring = (2..=8).contains(&x)
            && (2..=8).contains(&y)
            && (x == 2 || x == 8 || y == 2 || y == 8);
        let in_block = (4..=6).contains(&x) && (4..=6).contains(&y);
        Luma([if in_ring || in_block { value } else { 0.0 }])
    })
}

/// Settings sized for the synthetic stacks: depths 0..=2, fixed threshold
pub fn test_settings() -> Settings {
    let mut settings = Settings::default();
    settings.depth = DepthRange::new(0.0, 2.0, 1.0);
    settings.detection.channel = ChannelKind::Intensity;
    settings.detection.threshold = Threshold::Absolute(0.2);
    settings.detection.min_area = 4;
    settings.focus.channel = ChannelKind::Intensity;
    settings
}

/// Typed cache over an opened in-memory stack
pub fn open_cache(source: MemorySource, budget: CacheBudget) -> ImageCache<MemorySource> {
    let mut cache = ImageCache::new(Box::new(source), budget);
    cache.open("synthetic").expect("in-memory stack opens");
    cache
}

/// Type-erased cache over an opened source, as the pipeline uses it
pub fn open_dyn_cache<S: ImageSource + 'static>(source: S, budget: CacheBudget) -> ImageCache {
    let boxed: Box<dyn ImageSource> = Box::new(source);
    let mut cache = ImageCache::new(boxed, budget);
    cache.open("synthetic").expect("source opens");
    cache
}

/// Memory stack that reports itself as live, so refinement runs against it
pub struct LiveMemory(pub MemorySource);

impl ImageSource for LiveMemory {
    fn open(&mut self, location: &str) -> Result<(), SourceError> {
        self.0.open(location)
    }

    fn fetch(&mut self, depth: f64, channel: ChannelKind) -> Result<DepthImage, SourceError> {
        self.0.fetch(depth, channel)
    }

    fn is_live(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "live-memory"
    }
}

/// Save an 8-bit grayscale PNG filled with `value`
pub fn write_gray_png(path: &Path, width: u32, height: u32, value: u8) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("Failed to create image directory");
    }
    GrayImage::from_pixel(width, height, Luma([value]))
        .save(path)
        .expect("Failed to save test image");
}
