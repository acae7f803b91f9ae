use std::cmp::Ordering;

use serde::Serialize;

/// Integer pixel coordinate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Point {
    pub x: u32,
    pub y: u32,
}

impl Point {
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

// Row-major order, so sorted footprints can be merged and searched
impl Ord for Point {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.y, self.x).cmp(&(other.y, other.x))
    }
}

impl PartialOrd for Point {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Inclusive pixel bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BoundingBox {
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
}

impl BoundingBox {
    pub fn from_points(points: &[Point]) -> Option<Self> {
        let first = points.first()?;
        let mut bbox = BoundingBox {
            min_x: first.x,
            min_y: first.y,
            max_x: first.x,
            max_y: first.y,
        };
        for p in &points[1..] {
            bbox.min_x = bbox.min_x.min(p.x);
            bbox.min_y = bbox.min_y.min(p.y);
            bbox.max_x = bbox.max_x.max(p.x);
            bbox.max_y = bbox.max_y.max(p.y);
        }
        Some(bbox)
    }

    pub fn width(&self) -> u32 {
        self.max_x - self.min_x + 1
    }

    pub fn height(&self) -> u32 {
        self.max_y - self.min_y + 1
    }

    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }

    /// Grow on every side; the low side saturates at zero
    pub fn grow(&self, margin: u32) -> BoundingBox {
        BoundingBox {
            min_x: self.min_x.saturating_sub(margin),
            min_y: self.min_y.saturating_sub(margin),
            max_x: self.max_x.saturating_add(margin),
            max_y: self.max_y.saturating_add(margin),
        }
    }

    /// Inclusive intersection test: boxes sharing an edge pixel intersect
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_x <= other.max_x
            && other.min_x <= self.max_x
            && self.min_y <= other.max_y
            && other.min_y <= self.max_y
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.min_x && p.x <= self.max_x && p.y >= self.min_y && p.y <= self.max_y
    }
}

/// Stable identity of a contour, used in file names and reports
pub type ContourId = u32;

/// A detected region of interest and its best-focus depth
#[derive(Debug, Clone, PartialEq)]
pub struct Contour {
    pub id: ContourId,
    /// Closed outer boundary, in tracing order
    pub boundary: Vec<Point>,
    pub bbox: BoundingBox,
    /// Best-focus depth; None until a depth search succeeds
    pub depth: Option<f64>,
    /// Focus score at `depth`
    pub score: Option<f64>,
    // Interior footprint, sorted row-major without duplicates
    pixels: Vec<Point>,
}

impl Contour {
    /// Build a contour from its footprint. Returns None for an empty footprint.
    pub fn new(id: ContourId, mut pixels: Vec<Point>, boundary: Vec<Point>) -> Option<Self> {
        pixels.sort_unstable();
        pixels.dedup();
        let bbox = BoundingBox::from_points(&pixels)?;
        let boundary = if boundary.is_empty() {
            corners(&bbox)
        } else {
            boundary
        };
        Some(Self {
            id,
            boundary,
            bbox,
            depth: None,
            score: None,
            pixels,
        })
    }

    /// Enclosed area in pixels, always > 0
    pub fn area(&self) -> usize {
        self.pixels.len()
    }

    pub fn pixels(&self) -> &[Point] {
        &self.pixels
    }

    pub fn contains(&self, p: Point) -> bool {
        self.bbox.contains(p) && self.pixels.binary_search(&p).is_ok()
    }

    pub fn center(&self) -> (f64, f64) {
        let n = self.pixels.len() as f64;
        let (sx, sy) = self
            .pixels
            .iter()
            .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x as f64, sy + p.y as f64));
        (sx / n, sy / n)
    }

    /// Whether both footprints share at least one pixel
    pub fn shares_pixels(&self, other: &Contour) -> bool {
        if !self.bbox.intersects(&other.bbox) {
            return false;
        }
        let (mut i, mut j) = (0, 0);
        while i < self.pixels.len() && j < other.pixels.len() {
            match self.pixels[i].cmp(&other.pixels[j]) {
                Ordering::Less => i += 1,
                Ordering::Greater => j += 1,
                Ordering::Equal => return true,
            }
        }
        false
    }

    /// Footprint union of two contours; boundary and depth are left to the caller
    pub fn union_pixels(&self, other: &Contour) -> Vec<Point> {
        let mut merged = Vec::with_capacity(self.pixels.len() + other.pixels.len());
        let (mut i, mut j) = (0, 0);
        while i < self.pixels.len() && j < other.pixels.len() {
            match self.pixels[i].cmp(&other.pixels[j]) {
                Ordering::Less => {
                    merged.push(self.pixels[i]);
                    i += 1;
                }
                Ordering::Greater => {
                    merged.push(other.pixels[j]);
                    j += 1;
                }
                Ordering::Equal => {
                    merged.push(self.pixels[i]);
                    i += 1;
                    j += 1;
                }
            }
        }
        merged.extend_from_slice(&self.pixels[i..]);
        merged.extend_from_slice(&other.pixels[j..]);
        merged
    }
}

fn corners(bbox: &BoundingBox) -> Vec<Point> {
    vec![
        Point::new(bbox.min_x, bbox.min_y),
        Point::new(bbox.max_x, bbox.min_y),
        Point::new(bbox.max_x, bbox.max_y),
        Point::new(bbox.min_x, bbox.max_y),
    ]
}
