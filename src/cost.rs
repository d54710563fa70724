//! Visual-complexity cost map.
//!
//! The full profile combines three independent signals:
//! 1. **Sharp edges** (50%): Canny hysteresis edges on luma
//! 2. **Colour complexity** (30%): Sobel magnitude of each CIE Lab channel
//! 3. **Texture variance** (20%): local variance of the luma gradient magnitude,
//!    high for structured busyness and low for uniform grain
//!
//! The weighted sum is dilated to widen keep-out margins and blurred into a
//! continuous gradient. The fast and minimal profiles trade signals for speed.

use image::imageops;
use image::RgbImage;
use imageproc::edges::canny;
use palette::white_point::D65;
use palette::{FromColor, Lab, Srgb};
use serde::{Deserialize, Serialize};

use crate::matrix::{FloatMap, Mask, SummedArea};

/// Signal weight: sharp edges.
const EDGE_WEIGHT: f32 = 0.50;
/// Signal weight: Lab colour gradient.
const COLOR_WEIGHT: f32 = 0.30;
/// Signal weight: texture variance.
const TEXTURE_WEIGHT: f32 = 0.20;
/// Canny hysteresis thresholds, in 0-255 luma units.
const CANNY_LOW: f32 = 50.0;
const CANNY_HIGH: f32 = 150.0;
/// Window radius for the texture variance (9x9).
const TEXTURE_RADIUS: usize = 4;
/// Minimal profile: gradient magnitude threshold, in 0-255 luma units.
const MINIMAL_GRADIENT_THRESHOLD: f32 = 30.0;
/// Fast profile quantization bands.
const FAST_BAND_HIGH: f32 = 0.30;
const FAST_BAND_MEDIUM: f32 = 0.20;
const FAST_MEDIUM_VALUE: f32 = 0.6;
/// Cost at or above this is "high complexity".
pub const HIGH_COMPLEXITY: f32 = 0.25;
/// Cost at or above this (and below [`HIGH_COMPLEXITY`]) is "medium complexity".
pub const MEDIUM_COMPLEXITY: f32 = 0.15;
/// Cells per side of the grid used for the edge-distribution term.
const SCENE_GRID: usize = 4;

/// Which signals a [`CostMapBuilder`] combines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CostProfile {
    /// Edges, Lab colour gradient and texture variance.
    Full,
    /// Edges and luma gradient, quantized into three bands.
    Fast,
    /// Thresholded luma gradient only.
    Minimal,
}

/// Builds a [`CostMap`] from a working-resolution image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostMapBuilder {
    /// Signals to combine.
    pub profile: CostProfile,
    /// Radius of the disk used to dilate the combined signal.
    pub dilation_radius: usize,
    /// Standard deviation of the smoothing blur; `0` disables it.
    pub blur_sigma: f32,
}

impl CostMapBuilder {
    /// The canonical three-signal builder.
    #[must_use]
    pub const fn full() -> Self {
        Self {
            profile: CostProfile::Full,
            dilation_radius: 5,
            blur_sigma: 3.5,
        }
    }

    /// Edge-and-gradient builder with banded output.
    #[must_use]
    pub const fn fast() -> Self {
        Self {
            profile: CostProfile::Fast,
            dilation_radius: 4,
            blur_sigma: 2.5,
        }
    }

    /// Single-signal builder for the lowest latency.
    #[must_use]
    pub const fn minimal() -> Self {
        Self {
            profile: CostProfile::Minimal,
            dilation_radius: 1,
            blur_sigma: 0.0,
        }
    }

    /// Compute the cost map. Deterministic for a given image.
    #[must_use]
    pub fn build(&self, image: &RgbImage) -> CostMap {
        let gray = imageops::grayscale(image);
        let (w, h) = (gray.width() as usize, gray.height() as usize);
        #[allow(clippy::cast_possible_truncation)]
        let luma = FloatMap::from_fn(w, h, |x, y| f32::from(gray.get_pixel(x as u32, y as u32)[0]));

        let combined = match self.profile {
            CostProfile::Full => {
                let edges = edge_signal(&gray);
                let color = color_signal(image);
                let texture = texture_signal(&luma);
                FloatMap::from_fn(w, h, |x, y| {
                    EDGE_WEIGHT * edges.at(x, y)
                        + COLOR_WEIGHT * color.at(x, y)
                        + TEXTURE_WEIGHT * texture.at(x, y)
                })
            }
            CostProfile::Fast => {
                let edges = edge_signal(&gray);
                let gradient = sobel_magnitude(&luma).normalized_by_max();
                FloatMap::from_fn(w, h, |x, y| edges.at(x, y).max(gradient.at(x, y)))
            }
            CostProfile::Minimal => sobel_magnitude(&luma).map(|g| {
                if g > MINIMAL_GRADIENT_THRESHOLD {
                    1.0
                } else {
                    0.0
                }
            }),
        };

        let expanded = combined.dilate(self.dilation_radius);
        let smoothed = expanded.gaussian_blur(self.blur_sigma);
        let values = match self.profile {
            CostProfile::Fast => smoothed.map(|v| {
                if v >= FAST_BAND_HIGH {
                    1.0
                } else if v >= FAST_BAND_MEDIUM {
                    FAST_MEDIUM_VALUE
                } else {
                    0.0
                }
            }),
            CostProfile::Full | CostProfile::Minimal => smoothed.map(|v| v.clamp(0.0, 1.0)),
        };

        tracing::debug!(
            "cost: {:?} profile, {w}x{h}, mean {:.3}",
            self.profile,
            values.mean()
        );
        CostMap::new(values)
    }
}

/// Per-pixel visual complexity at working resolution, values in `[0, 1]`.
#[derive(Debug, Clone)]
pub struct CostMap {
    values: FloatMap,
    table: SummedArea,
}

impl CostMap {
    /// Wrap precomputed values.
    #[must_use]
    pub fn new(values: FloatMap) -> Self {
        let table = SummedArea::new(&values);
        Self { values, table }
    }

    /// The underlying grid.
    #[must_use]
    pub fn values(&self) -> &FloatMap {
        &self.values
    }

    /// Mean cost over the clipped half-open window, `None` when it is empty.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn window_mean(&self, x0: usize, y0: usize, x1: usize, y1: usize) -> Option<f32> {
        self.table.mean(x0, y0, x1, y1).map(|m| m as f32)
    }

    /// Share of high, medium and safe pixels plus the mean cost.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn stats(&self) -> ComplexityStats {
        let n = self.values.len().max(1) as f32;
        let mut high = 0usize;
        let mut medium = 0usize;
        for &v in self.values.as_slice() {
            if v >= HIGH_COMPLEXITY {
                high += 1;
            } else if v >= MEDIUM_COMPLEXITY {
                medium += 1;
            }
        }
        ComplexityStats {
            high_complexity_ratio: high as f32 / n,
            medium_complexity_ratio: medium as f32 / n,
            safe_area_ratio: 1.0 - (high + medium) as f32 / n,
            average_complexity: self.values.mean(),
        }
    }

    /// Whole-image busyness in `[0, 1]`.
    ///
    /// `0.6 * busy density + 0.25 * (1 - clean ratio) + 0.15 * min(2 * spread, 1)`,
    /// where spread is the standard deviation of busy density over a 4x4 cell grid.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn scene_complexity(&self, permissible: &Mask) -> f32 {
        let (w, h) = (self.values.width(), self.values.height());
        if w == 0 || h == 0 {
            return 0.0;
        }
        let busy = Mask::above(&self.values, HIGH_COMPLEXITY - f32::EPSILON);
        let density = busy.fraction();
        let clean = permissible.fraction();

        let cell_w = (w / SCENE_GRID).max(1);
        let cell_h = (h / SCENE_GRID).max(1);
        let mut cells = Vec::with_capacity(SCENE_GRID * SCENE_GRID);
        for cy in 0..SCENE_GRID {
            for cx in 0..SCENE_GRID {
                let (x0, y0) = (cx * cell_w, cy * cell_h);
                let (x1, y1) = ((x0 + cell_w).min(w), (y0 + cell_h).min(h));
                if x0 >= x1 || y0 >= y1 {
                    continue;
                }
                let mut count = 0usize;
                for y in y0..y1 {
                    for x in x0..x1 {
                        if busy.at(x, y) {
                            count += 1;
                        }
                    }
                }
                cells.push(count as f32 / ((x1 - x0) * (y1 - y0)) as f32);
            }
        }
        let spread = crate::matrix::stddev(&cells);

        (density * 0.6 + (1.0 - clean) * 0.25 + (spread * 2.0).min(1.0) * 0.15).clamp(0.0, 1.0)
    }
}

/// Global complexity breakdown reported with every result.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComplexityStats {
    /// Share of pixels at or above the high-complexity level.
    pub high_complexity_ratio: f32,
    /// Share of pixels in the medium band.
    pub medium_complexity_ratio: f32,
    /// Share of pixels below the medium band.
    pub safe_area_ratio: f32,
    /// Mean cost.
    pub average_complexity: f32,
}

/// Canny edges as a 0/1 map.
#[allow(clippy::cast_possible_truncation)]
fn edge_signal(gray: &image::GrayImage) -> FloatMap {
    let edges = canny(gray, CANNY_LOW, CANNY_HIGH);
    let (w, h) = (edges.width() as usize, edges.height() as usize);
    FloatMap::from_fn(w, h, |x, y| {
        if edges.get_pixel(x as u32, y as u32)[0] > 0 {
            1.0
        } else {
            0.0
        }
    })
}

/// Sum of the Sobel magnitudes of the L, a and b channels, normalized to `[0, 1]`.
fn color_signal(image: &RgbImage) -> FloatMap {
    let (w, h) = (image.width() as usize, image.height() as usize);
    let mut channels = [FloatMap::new(w, h), FloatMap::new(w, h), FloatMap::new(w, h)];
    for (x, y, px) in image.enumerate_pixels() {
        let srgb = Srgb::new(
            f32::from(px[0]) / 255.0,
            f32::from(px[1]) / 255.0,
            f32::from(px[2]) / 255.0,
        );
        let lab = Lab::<D65, f32>::from_color(srgb);
        let (x, y) = (x as usize, y as usize);
        channels[0].set(x, y, lab.l);
        channels[1].set(x, y, lab.a);
        channels[2].set(x, y, lab.b);
    }

    let grads: Vec<FloatMap> = channels.iter().map(sobel_magnitude).collect();
    FloatMap::from_fn(w, h, |x, y| grads.iter().map(|g| g.at(x, y)).sum())
        .normalized_by_max()
}

/// Local variance of the normalized luma gradient magnitude, normalized to `[0, 1]`.
fn texture_signal(luma: &FloatMap) -> FloatMap {
    sobel_magnitude(luma)
        .normalized_by_max()
        .local_variance(TEXTURE_RADIUS)
        .normalized_by_max()
}

/// Compute Sobel gradient magnitude for a 2D float map.
///
/// Uses 3x3 Sobel kernels. Border pixels are set to 0.
pub(crate) fn sobel_magnitude(data: &FloatMap) -> FloatMap {
    let (width, height) = (data.width(), data.height());
    let mut result = FloatMap::new(width, height);
    if width < 3 || height < 3 {
        return result;
    }

    for y in 1..height - 1 {
        for x in 1..width - 1 {
            // y >= 1 and x >= 1, dy/dx in {-1, 0, 1}, so indices are always valid.
            #[allow(clippy::cast_sign_loss, clippy::cast_possible_wrap)]
            let idx = |dy: isize, dx: isize| -> f32 {
                data.at((x as isize + dx) as usize, (y as isize + dy) as usize)
            };

            let gx = -idx(-1, -1) + idx(-1, 1) - 2.0 * idx(0, -1) + 2.0 * idx(0, 1) - idx(1, -1)
                + idx(1, 1);

            let gy = -idx(-1, -1) - 2.0 * idx(-1, 0) - idx(-1, 1)
                + idx(1, -1)
                + 2.0 * idx(1, 0)
                + idx(1, 1);

            result.set(x, y, (gx * gx + gy * gy).sqrt());
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn square_on_field(size: u32, side: u32) -> RgbImage {
        let lo = (size - side) / 2;
        let hi = lo + side;
        RgbImage::from_fn(size, size, |x, y| {
            if (lo..hi).contains(&x) && (lo..hi).contains(&y) {
                Rgb([240, 240, 240])
            } else {
                Rgb([30, 30, 40])
            }
        })
    }

    #[test]
    fn sobel_returns_zero_for_flat_map() {
        let grad = sobel_magnitude(&FloatMap::filled(10, 10, 0.5));
        for &g in grad.as_slice() {
            assert!(g.abs() < 1e-6, "Flat map should have zero gradient");
        }
    }

    #[test]
    fn sobel_detects_vertical_edge() {
        let data = FloatMap::from_fn(10, 10, |x, _| if x >= 5 { 1.0 } else { 0.0 });
        let grad = sobel_magnitude(&data);
        assert!(grad.at(5, 5) > 0.1, "Edge should produce non-zero gradient");
    }

    #[test]
    fn uniform_image_has_zero_cost_for_every_profile() {
        let img = RgbImage::from_pixel(64, 48, Rgb([90, 120, 150]));
        for builder in [
            CostMapBuilder::full(),
            CostMapBuilder::fast(),
            CostMapBuilder::minimal(),
        ] {
            let cost = builder.build(&img);
            assert!(cost.values().max().abs() < 1e-6, "{:?}", builder.profile);
        }
    }

    #[test]
    fn cost_is_high_on_edges_and_low_far_away() {
        let img = square_on_field(120, 40);
        let cost = CostMapBuilder::full().build(&img);
        let values = cost.values();
        assert_eq!((values.width(), values.height()), (120, 120));
        assert!(values.at(40, 60) > 0.2, "edge cost {}", values.at(40, 60));
        assert!(values.at(5, 5) < 0.01, "corner cost {}", values.at(5, 5));
        for &v in values.as_slice() {
            assert!((0.0..=1.0).contains(&v));
        }
    }

    #[test]
    fn cost_map_is_deterministic() {
        let img = square_on_field(96, 30);
        let a = CostMapBuilder::full().build(&img);
        let b = CostMapBuilder::full().build(&img);
        assert_eq!(a.values(), b.values());
    }

    #[test]
    fn fast_profile_is_banded() {
        let img = square_on_field(96, 30);
        let cost = CostMapBuilder::fast().build(&img);
        for &v in cost.values().as_slice() {
            assert!(v == 0.0 || (v - FAST_MEDIUM_VALUE).abs() < 1e-6 || (v - 1.0).abs() < 1e-6);
        }
        assert!(cost.values().max() > 0.9);
    }

    #[test]
    fn stats_partition_the_image() {
        let img = square_on_field(96, 30);
        let stats = CostMapBuilder::full().build(&img).stats();
        let total =
            stats.high_complexity_ratio + stats.medium_complexity_ratio + stats.safe_area_ratio;
        assert!((total - 1.0).abs() < 1e-5);
        assert!(stats.high_complexity_ratio > 0.0);
        assert!(stats.safe_area_ratio > 0.5);
    }

    #[test]
    fn window_mean_matches_region() {
        let values = FloatMap::from_fn(10, 10, |x, _| if x < 5 { 0.0 } else { 1.0 });
        let cost = CostMap::new(values);
        assert!(cost.window_mean(0, 0, 5, 10).unwrap().abs() < 1e-6);
        assert!((cost.window_mean(5, 0, 10, 10).unwrap() - 1.0).abs() < 1e-6);
        assert!((cost.window_mean(3, 0, 7, 10).unwrap() - 0.5).abs() < 1e-6);
        assert!(cost.window_mean(12, 0, 14, 10).is_none());
    }

    #[test]
    fn scene_complexity_is_zero_for_clean_images() {
        let cost = CostMap::new(FloatMap::new(40, 40));
        let mask = Mask::at_or_below(cost.values(), 0.05);
        assert!(cost.scene_complexity(&mask).abs() < 1e-6);
    }
}
