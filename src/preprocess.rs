//! Working-resolution preparation.

use image::imageops::{self, FilterType};
use image::RgbImage;

use crate::error::{Error, Result};
use crate::matrix::FloatMap;

/// Luma weights (ITU-R BT.601).
const LUMA_R: f32 = 0.299;
const LUMA_G: f32 = 0.587;
const LUMA_B: f32 = 0.114;

/// Downscaling policy for one fidelity tier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Preprocessor {
    /// Upper bound for the longer side of the working image.
    pub max_side: u32,
    /// Additional factor applied after the bound, compounding the downscale.
    pub extra_factor: f32,
}

impl Preprocessor {
    /// Bound the longer side to `max_side` pixels.
    #[must_use]
    pub const fn bounded(max_side: u32) -> Self {
        Self {
            max_side,
            extra_factor: 1.0,
        }
    }

    /// Compound an extra downscale on top of the bound.
    #[must_use]
    pub const fn compounded(self, extra_factor: f32) -> Self {
        Self {
            extra_factor,
            ..self
        }
    }

    /// Scale factor (working / original) for an image of the given size.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn scale_for(&self, width: u32, height: u32) -> f32 {
        let longer = width.max(height).max(1) as f32;
        let bound = (self.max_side as f32 / longer).min(1.0);
        bound * self.extra_factor.clamp(f32::EPSILON, 1.0)
    }

    /// Produce the working image.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyImage`] when either dimension is zero.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn prepare(&self, image: &RgbImage) -> Result<WorkingImage> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(Error::EmptyImage { width, height });
        }

        let scale = self.scale_for(width, height);
        let pixels = if (scale - 1.0).abs() < f32::EPSILON {
            image.clone()
        } else {
            let w = ((width as f32 * scale).round() as u32).max(1);
            let h = ((height as f32 * scale).round() as u32).max(1);
            imageops::resize(image, w, h, FilterType::Triangle)
        };

        tracing::debug!(
            "preprocess: {width}x{height} -> {}x{} (scale {scale:.4})",
            pixels.width(),
            pixels.height()
        );

        Ok(WorkingImage { pixels, scale })
    }
}

/// The downscaled image every analysis stage runs on.
#[derive(Debug, Clone)]
pub struct WorkingImage {
    /// Working-resolution pixels.
    pub pixels: RgbImage,
    /// Cumulative scale factor, working / original.
    pub scale: f32,
}

impl WorkingImage {
    /// Working width in pixels.
    #[must_use]
    pub fn width(&self) -> usize {
        self.pixels.width() as usize
    }

    /// Working height in pixels.
    #[must_use]
    pub fn height(&self) -> usize {
        self.pixels.height() as usize
    }

    /// Map a working-resolution coordinate back to the original image.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn to_original(&self, v: f32) -> u32 {
        (v / self.scale).max(0.0) as u32
    }

    /// Map an original-resolution coordinate into the working image.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn to_working(&self, v: u32) -> usize {
        (v as f32 * self.scale) as usize
    }
}

/// Luma of every pixel, in `[0, 1]`.
#[must_use]
pub fn luma_map(image: &RgbImage) -> FloatMap {
    FloatMap::from_fn(image.width() as usize, image.height() as usize, |x, y| {
        #[allow(clippy::cast_possible_truncation)]
        let px = image.get_pixel(x as u32, y as u32);
        pixel_luma(px.0)
    })
}

/// Luma values of a clipped rectangular region, in `[0, 1]`.
#[must_use]
pub fn region_luma(image: &RgbImage, x0: u32, y0: u32, x1: u32, y1: u32) -> Vec<f32> {
    let x1 = x1.min(image.width());
    let y1 = y1.min(image.height());
    if x0 >= x1 || y0 >= y1 {
        return Vec::new();
    }
    let mut gray = Vec::with_capacity(((x1 - x0) * (y1 - y0)) as usize);
    for y in y0..y1 {
        for x in x0..x1 {
            gray.push(pixel_luma(image.get_pixel(x, y).0));
        }
    }
    gray
}

fn pixel_luma(rgb: [u8; 3]) -> f32 {
    (LUMA_R * f32::from(rgb[0]) + LUMA_G * f32::from(rgb[1]) + LUMA_B * f32::from(rgb[2])) / 255.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn large_images_are_bounded_on_the_longer_side() {
        let pre = Preprocessor::bounded(800);
        let img = RgbImage::new(1920, 1080);
        let working = pre.prepare(&img).unwrap();
        assert_eq!(working.pixels.width(), 800);
        assert_eq!(working.pixels.height(), 450);
        assert!((working.scale - 800.0 / 1920.0).abs() < 1e-6);
    }

    #[test]
    fn small_images_are_not_upscaled() {
        let pre = Preprocessor::bounded(800);
        let img = RgbImage::new(640, 360);
        let working = pre.prepare(&img).unwrap();
        assert_eq!(working.pixels.dimensions(), (640, 360));
        assert!((working.scale - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn extra_factor_compounds_the_downscale() {
        let pre = Preprocessor::bounded(400).compounded(0.5);
        let scale = pre.scale_for(1600, 900);
        assert!((scale - 0.125).abs() < 1e-6);
        let working = pre.prepare(&RgbImage::new(1600, 900)).unwrap();
        assert_eq!(working.pixels.dimensions(), (200, 113));
    }

    #[test]
    fn empty_images_are_rejected() {
        let pre = Preprocessor::bounded(800);
        let err = pre.prepare(&RgbImage::new(0, 10)).unwrap_err();
        assert!(matches!(err, Error::EmptyImage { width: 0, height: 10 }));
    }

    #[test]
    fn back_projection_divides_by_scale() {
        let working = Preprocessor::bounded(800)
            .prepare(&RgbImage::new(1600, 1200))
            .unwrap();
        assert_eq!(working.to_original(100.0), 200);
        assert_eq!(working.to_working(200), 100);
    }

    #[test]
    fn luma_of_white_is_one() {
        let img = RgbImage::from_pixel(3, 2, image::Rgb([255, 255, 255]));
        let luma = luma_map(&img);
        assert!((luma.at(2, 1) - 1.0).abs() < 1e-5);
        assert_eq!(region_luma(&img, 0, 0, 10, 10).len(), 6);
        assert!(region_luma(&img, 3, 0, 5, 2).is_empty());
    }
}
