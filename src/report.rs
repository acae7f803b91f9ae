use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::cache::ImageCache;
use crate::detection::preprocessing;
use crate::detection::sampling::PixelProfile;
use crate::models::{BoundingBox, Contour, ContourId, Point};
use crate::source::{ChannelKind, FloatImage, ImageSource};

/// Padding around a contour when cropping its region of interest
const ROI_PADDING: u32 = 5;

#[derive(Debug, Serialize)]
struct ContourRecord {
    id: ContourId,
    area: usize,
    bbox: BoundingBox,
    center: [f64; 2],
    depth: Option<f64>,
    score: Option<f64>,
}

#[derive(Debug, Serialize)]
struct RunReport {
    generated_at: String,
    elapsed_seconds: f64,
    contour_count: usize,
    contours: Vec<ContourRecord>,
}

/// Writes run outputs (rasters, summary, sample dumps) into one directory
#[derive(Debug, Clone)]
pub struct ReportWriter {
    out_dir: PathBuf,
}

impl ReportWriter {
    /// Create the writer, creating `out_dir` if needed
    pub fn new<P: AsRef<Path>>(out_dir: P) -> Result<Self> {
        let out_dir = out_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&out_dir)
            .with_context(|| format!("Failed to create output directory {:?}", out_dir))?;
        Ok(Self { out_dir })
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    /// Save a float raster as an 8-bit PNG
    pub fn save_image(&self, image: &FloatImage, name: &str, normalize: bool) -> Result<PathBuf> {
        let path = self.out_dir.join(name);
        preprocessing::to_display(image, normalize)
            .save(&path)
            .with_context(|| format!("Failed to save image {:?}", path))?;
        Ok(path)
    }

    /// Save an overview of all contours on a `width` x `height` canvas
    pub fn save_contour_image(
        &self,
        contours: &[Contour],
        width: u32,
        height: u32,
        name: &str,
    ) -> Result<PathBuf> {
        let path = self.out_dir.join(name);
        render_contours(contours, width, height)
            .save(&path)
            .with_context(|| format!("Failed to save contour image {:?}", path))?;
        Ok(path)
    }

    /// Crop every contour at its best depth and save it as `roi_<id>.png`.
    ///
    /// Contours without a depth, or whose slice cannot be read, are skipped.
    pub fn save_roi_images<S: ImageSource + ?Sized>(
        &self,
        cache: &mut ImageCache<S>,
        contours: &[Contour],
        channel: ChannelKind,
    ) -> Result<Vec<PathBuf>> {
        let mut saved = Vec::new();
        for contour in contours {
            let Some(depth) = contour.depth else {
                continue;
            };
            let region = match cache.crop(depth, channel, &contour.bbox.grow(ROI_PADDING)) {
                Ok(region) => region,
                Err(e) if e.is_retrieval() => {
                    log::warn!("no ROI for contour {}: {}", contour.id, e);
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            saved.push(self.save_image(&region.image, &format!("roi_{}.png", contour.id), true)?);
        }
        Ok(saved)
    }

    /// Write the run summary as `report.json`
    pub fn write_report(&self, contours: &[Contour], elapsed: Duration) -> Result<PathBuf> {
        let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
        let report = RunReport {
            generated_at: now.format(&Rfc3339)?,
            elapsed_seconds: elapsed.as_secs_f64(),
            contour_count: contours.len(),
            contours: contours
                .iter()
                .map(|c| {
                    let (cx, cy) = c.center();
                    ContourRecord {
                        id: c.id,
                        area: c.area(),
                        bbox: c.bbox,
                        center: [cx, cy],
                        depth: c.depth,
                        score: c.score,
                    }
                })
                .collect(),
        };

        let path = self.out_dir.join("report.json");
        let file = File::create(&path).with_context(|| format!("Failed to create {:?}", path))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &report)
            .with_context(|| format!("Failed to write report {:?}", path))?;
        Ok(path)
    }

    /// Dump sampled coordinates as `phaseTesting_<id>.txt`, one `(x, y)` per line
    pub fn write_samples(&self, contour: &Contour, points: &[Point]) -> Result<PathBuf> {
        let path = self.out_dir.join(format!("phaseTesting_{}.txt", contour.id));
        let mut out = BufWriter::new(
            File::create(&path).with_context(|| format!("Failed to create {:?}", path))?,
        );
        for p in points {
            writeln!(out, "({}, {})", p.x, p.y)?;
        }
        out.flush()
            .with_context(|| format!("Error occurred writing phase testing file {:?}", path))?;
        Ok(path)
    }

    /// Dump a pixel profile as `phaseProfile_<id>.txt` with `x y depth value` rows
    pub fn write_profile(&self, contour: &Contour, profile: &PixelProfile) -> Result<PathBuf> {
        let path = self.out_dir.join(format!("phaseProfile_{}.txt", contour.id));
        let mut out = BufWriter::new(
            File::create(&path).with_context(|| format!("Failed to create {:?}", path))?,
        );
        writeln!(out, "# x y depth value")?;
        for (depth, row) in profile.depths.iter().zip(&profile.values) {
            for (p, value) in profile.points.iter().zip(row) {
                writeln!(out, "{} {} {} {}", p.x, p.y, depth, value)?;
            }
        }
        out.flush()?;
        Ok(path)
    }
}

/// Draw each contour's bounding box and boundary on a black canvas
pub fn render_contours(contours: &[Contour], width: u32, height: u32) -> RgbImage {
    let mut canvas = RgbImage::new(width.max(1), height.max(1));
    for contour in contours {
        // unsearched contours in grey, located ones in green
        let box_color = if contour.depth.is_some() {
            Rgb([0u8, 200, 0])
        } else {
            Rgb([128u8, 128, 128])
        };
        let rect = Rect::at(contour.bbox.min_x as i32, contour.bbox.min_y as i32)
            .of_size(contour.bbox.width(), contour.bbox.height());
        draw_hollow_rect_mut(&mut canvas, rect, box_color);

        for p in &contour.boundary {
            if p.x < canvas.width() && p.y < canvas.height() {
                canvas.put_pixel(p.x, p.y, Rgb([255u8, 255, 255]));
            }
        }
    }
    canvas
}
