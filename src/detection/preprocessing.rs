use image::{GrayImage, Luma};

use crate::source::FloatImage;

/// Mean and standard deviation of all finite samples
pub fn mean_std(img: &FloatImage) -> (f32, f32) {
    let mut n = 0usize;
    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;
    for &v in img.as_raw() {
        if v.is_finite() {
            n += 1;
            sum += v as f64;
            sum_sq += (v as f64) * (v as f64);
        }
    }
    if n == 0 {
        return (0.0, 0.0);
    }
    let mean = sum / n as f64;
    let var = (sum_sq / n as f64 - mean * mean).max(0.0);
    (mean as f32, var.sqrt() as f32)
}

/// Binary mask: 255 where the sample is strictly above `level`
pub fn binarize(img: &FloatImage, level: f32) -> GrayImage {
    let (width, height) = img.dimensions();
    GrayImage::from_fn(width, height, |x, y| {
        if img.get_pixel(x, y)[0] > level {
            Luma([255u8])
        } else {
            Luma([0u8])
        }
    })
}

/// Convert to 8 bits for display, stretching min..max when `normalize` is set
/// and clamping to 0..1 otherwise
pub fn to_display(img: &FloatImage, normalize: bool) -> GrayImage {
    let (lo, hi) = if normalize {
        img.as_raw()
            .iter()
            .filter(|v| v.is_finite())
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            })
    } else {
        (0.0, 1.0)
    };
    let span = if hi > lo { hi - lo } else { 1.0 };
    let lo = if lo.is_finite() { lo } else { 0.0 };

    let (width, height) = img.dimensions();
    GrayImage::from_fn(width, height, |x, y| {
        let v = img.get_pixel(x, y)[0];
        let scaled = if v.is_finite() { (v - lo) / span } else { 0.0 };
        Luma([(scaled.clamp(0.0, 1.0) * 255.0).round() as u8])
    })
}
