use image::imageops::{self, FilterType};
use image::{ImageError, RgbImage};
use std::path::Path;

use crate::core::device::Rect;

/// Source of decoded frames. The loader and matcher only ever see RGB pixels.
pub trait FrameDecoder: Send + Sync {
    fn decode(&self, path: &Path) -> Result<RgbImage, ImageError>;
}

/// Decodes frames from the filesystem with whatever formats `image` was built with.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsDecoder;

impl FrameDecoder for FsDecoder {
    fn decode(&self, path: &Path) -> Result<RgbImage, ImageError> {
        Ok(image::open(path)?.to_rgb8())
    }
}

/// Resize to exactly `width`×`height`, ignoring aspect ratio.
///
/// Always allocates a new buffer, even when the source already has the
/// requested dimensions.
pub fn resize_exact(img: &RgbImage, width: u32, height: u32) -> RgbImage {
    if img.dimensions() == (width, height) {
        return img.clone();
    }
    imageops::resize(img, width, height, FilterType::Triangle)
}

/// Copy out `rect`, or `None` when the rectangle does not fit inside `img`.
pub fn crop(img: &RgbImage, rect: Rect) -> Option<RgbImage> {
    if !rect.fits_within(img.width(), img.height()) {
        return None;
    }
    Some(imageops::crop_imm(img, rect.x, rect.y, rect.width, rect.height).to_image())
}

/// Perceptual closeness of two equally sized images in `[0, 1]`.
pub trait StructuralSimilarity: Send + Sync {
    /// Returns `None` when the images differ in size.
    fn similarity(&self, a: &RgbImage, b: &RgbImage) -> Option<f64>;
}

/// Mean SSIM over non-overlapping square windows of the luma plane.
#[derive(Debug, Clone, Copy)]
pub struct WindowedSsim {
    pub window: u32,
}

impl WindowedSsim {
    const C1: f64 = (0.01 * 255.0) * (0.01 * 255.0);
    const C2: f64 = (0.03 * 255.0) * (0.03 * 255.0);

    pub fn new(window: u32) -> Self {
        Self {
            window: window.max(1),
        }
    }

    fn luma(img: &RgbImage) -> Vec<f64> {
        img.pixels()
            .map(|p| 0.299 * p[0] as f64 + 0.587 * p[1] as f64 + 0.114 * p[2] as f64)
            .collect()
    }

    fn window_ssim(a: &[f64], b: &[f64], stride: usize, x0: usize, y0: usize, w: usize, h: usize) -> f64 {
        let n = (w * h) as f64;
        let mut sum_a = 0.0;
        let mut sum_b = 0.0;
        for y in y0..y0 + h {
            let row = y * stride;
            for x in x0..x0 + w {
                sum_a += a[row + x];
                sum_b += b[row + x];
            }
        }
        let mean_a = sum_a / n;
        let mean_b = sum_b / n;

        let mut var_a = 0.0;
        let mut var_b = 0.0;
        let mut cov = 0.0;
        for y in y0..y0 + h {
            let row = y * stride;
            for x in x0..x0 + w {
                let da = a[row + x] - mean_a;
                let db = b[row + x] - mean_b;
                var_a += da * da;
                var_b += db * db;
                cov += da * db;
            }
        }
        var_a /= n;
        var_b /= n;
        cov /= n;

        let numerator = (2.0 * mean_a * mean_b + Self::C1) * (2.0 * cov + Self::C2);
        let denominator = (mean_a * mean_a + mean_b * mean_b + Self::C1) * (var_a + var_b + Self::C2);
        numerator / denominator
    }
}

impl Default for WindowedSsim {
    fn default() -> Self {
        Self::new(8)
    }
}

impl StructuralSimilarity for WindowedSsim {
    fn similarity(&self, a: &RgbImage, b: &RgbImage) -> Option<f64> {
        if a.dimensions() != b.dimensions() {
            return None;
        }
        let (width, height) = a.dimensions();
        if width == 0 || height == 0 {
            return None;
        }

        let luma_a = Self::luma(a);
        let luma_b = Self::luma(b);
        let (width, height, window) = (width as usize, height as usize, self.window as usize);

        let mut total = 0.0;
        let mut windows = 0usize;
        for y0 in (0..height).step_by(window) {
            let h = window.min(height - y0);
            for x0 in (0..width).step_by(window) {
                let w = window.min(width - x0);
                total += Self::window_ssim(&luma_a, &luma_b, width, x0, y0, w, h);
                windows += 1;
            }
        }

        Some((total / windows as f64).clamp(0.0, 1.0))
    }
}
