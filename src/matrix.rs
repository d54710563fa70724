//! Dense float matrices, binary masks and percentile selection.
//!
//! Every analysis stage works on [`FloatMap`], a row-major `f32` grid at the
//! working resolution. Filters that `imageproc` already provides (Gaussian blur)
//! round-trip through [`GrayF32`]; the rest are implemented here.

use image::{GrayImage, ImageBuffer, Luma};
use imageproc::filter::gaussian_blur_f32;

/// Single-channel `f32` image, the representation `imageproc` filters accept.
pub type GrayF32 = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Values below this are treated as zero when normalizing.
const NORMALIZE_EPSILON: f32 = 1e-12;

/// A 2D grid of `f32` values stored row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct FloatMap {
    width: usize,
    height: usize,
    data: Vec<f32>,
}

impl FloatMap {
    /// Create a map filled with zeros.
    #[must_use]
    pub fn new(width: usize, height: usize) -> Self {
        Self::filled(width, height, 0.0)
    }

    /// Create a map with every cell set to `value`.
    #[must_use]
    pub fn filled(width: usize, height: usize, value: f32) -> Self {
        Self {
            width,
            height,
            data: vec![value; width * height],
        }
    }

    /// Create a map by evaluating `f(x, y)` for every cell in row-major order.
    pub fn from_fn(width: usize, height: usize, mut f: impl FnMut(usize, usize) -> f32) -> Self {
        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Self {
            width,
            height,
            data,
        }
    }

    /// Copy an `imageproc`-compatible float image into a map.
    #[must_use]
    pub fn from_gray_f32(image: &GrayF32) -> Self {
        Self {
            width: image.width() as usize,
            height: image.height() as usize,
            data: image.as_raw().clone(),
        }
    }

    /// Copy the map into an `imageproc`-compatible float image.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn to_gray_f32(&self) -> GrayF32 {
        ImageBuffer::from_fn(self.width as u32, self.height as u32, |x, y| {
            Luma([self.at(x as usize, y as usize)])
        })
    }

    /// Width in cells.
    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Height in cells.
    #[must_use]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Number of cells.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the map has no cells.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Raw row-major values.
    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Bounds-checked read.
    #[must_use]
    pub fn get(&self, x: usize, y: usize) -> Option<f32> {
        (x < self.width && y < self.height).then(|| self.data[y * self.width + x])
    }

    /// Unchecked-by-contract read; panics when `(x, y)` is outside the map.
    #[must_use]
    pub fn at(&self, x: usize, y: usize) -> f32 {
        assert!(x < self.width && y < self.height, "({x}, {y}) out of bounds");
        self.data[y * self.width + x]
    }

    /// Write a cell; panics when `(x, y)` is outside the map.
    pub fn set(&mut self, x: usize, y: usize, value: f32) {
        assert!(x < self.width && y < self.height, "({x}, {y}) out of bounds");
        self.data[y * self.width + x] = value;
    }

    /// Apply `f` to every cell.
    #[must_use]
    pub fn map(&self, f: impl Fn(f32) -> f32) -> Self {
        Self {
            width: self.width,
            height: self.height,
            data: self.data.iter().map(|&v| f(v)).collect(),
        }
    }

    /// Largest value, or `0.0` for an empty map.
    #[must_use]
    pub fn max(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.data.iter().copied().fold(f32::NEG_INFINITY, f32::max)
    }

    /// Arithmetic mean, or `0.0` for an empty map.
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    pub fn mean(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.data.iter().map(|&v| f64::from(v)).sum();
        (sum / self.data.len() as f64) as f32
    }

    /// Divide every cell by the maximum. A map whose maximum is zero is returned unchanged.
    #[must_use]
    pub fn normalized_by_max(&self) -> Self {
        let max = self.max();
        if max > NORMALIZE_EPSILON {
            self.map(|v| v / max)
        } else {
            self.clone()
        }
    }

    /// Value at percentile `q` (0-100) of all cells.
    #[must_use]
    pub fn percentile(&self, q: f32) -> f32 {
        percentile(&self.data, q)
    }

    /// Grey-level dilation with a disk-shaped structuring element of the given radius.
    #[must_use]
    #[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
    pub fn dilate(&self, radius: usize) -> Self {
        if radius == 0 || self.is_empty() {
            return self.clone();
        }
        let r = radius as isize;
        let offsets: Vec<(isize, isize)> = (-r..=r)
            .flat_map(|dy| (-r..=r).map(move |dx| (dx, dy)))
            .filter(|(dx, dy)| dx * dx + dy * dy <= r * r)
            .collect();

        let (w, h) = (self.width as isize, self.height as isize);
        Self::from_fn(self.width, self.height, |x, y| {
            let mut best = f32::NEG_INFINITY;
            for &(dx, dy) in &offsets {
                let sx = x as isize + dx;
                let sy = y as isize + dy;
                if sx >= 0 && sy >= 0 && sx < w && sy < h {
                    best = best.max(self.data[sy as usize * self.width + sx as usize]);
                }
            }
            best
        })
    }

    /// Gaussian blur with standard deviation `sigma`. Non-positive sigma is a no-op.
    #[must_use]
    pub fn gaussian_blur(&self, sigma: f32) -> Self {
        if sigma <= 0.0 || self.is_empty() {
            return self.clone();
        }
        Self::from_gray_f32(&gaussian_blur_f32(&self.to_gray_f32(), sigma))
    }

    /// Variance of the values in a `(2r+1)²` window around every cell, clipped at borders.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn local_variance(&self, radius: usize) -> Self {
        let sums = SummedArea::new(self);
        let squares = SummedArea::new(&self.map(|v| v * v));
        Self::from_fn(self.width, self.height, |x, y| {
            let x0 = x.saturating_sub(radius);
            let y0 = y.saturating_sub(radius);
            let x1 = (x + radius + 1).min(self.width);
            let y1 = (y + radius + 1).min(self.height);
            match (sums.mean(x0, y0, x1, y1), squares.mean(x0, y0, x1, y1)) {
                (Some(m), Some(m2)) => (m2 - m * m).max(0.0) as f32,
                _ => 0.0,
            }
        })
    }

    /// Quantize to an 8-bit grey image, mapping `[0, 1]` to `[0, 255]`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn to_gray_image(&self) -> GrayImage {
        GrayImage::from_fn(self.width as u32, self.height as u32, |x, y| {
            let v = self.at(x as usize, y as usize).clamp(0.0, 1.0);
            Luma([(v * 255.0).round() as u8])
        })
    }
}

/// Summed-area table for constant-time window sums.
#[derive(Debug, Clone)]
pub struct SummedArea {
    width: usize,
    height: usize,
    sums: Vec<f64>,
}

impl SummedArea {
    /// Build the table for `map`.
    #[must_use]
    pub fn new(map: &FloatMap) -> Self {
        let (w, h) = (map.width(), map.height());
        let stride = w + 1;
        let mut sums = vec![0.0_f64; stride * (h + 1)];
        for y in 0..h {
            let mut row = 0.0_f64;
            for x in 0..w {
                row += f64::from(map.at(x, y));
                sums[(y + 1) * stride + x + 1] = sums[y * stride + x + 1] + row;
            }
        }
        Self {
            width: w,
            height: h,
            sums,
        }
    }

    /// Sum over the half-open window `[x0, x1) × [y0, y1)`, clipped to the table.
    #[must_use]
    pub fn sum(&self, x0: usize, y0: usize, x1: usize, y1: usize) -> f64 {
        let x1 = x1.min(self.width);
        let y1 = y1.min(self.height);
        if x0 >= x1 || y0 >= y1 {
            return 0.0;
        }
        let stride = self.width + 1;
        self.sums[y1 * stride + x1] - self.sums[y0 * stride + x1] - self.sums[y1 * stride + x0]
            + self.sums[y0 * stride + x0]
    }

    /// Mean over the clipped window, or `None` when the window is empty.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn mean(&self, x0: usize, y0: usize, x1: usize, y1: usize) -> Option<f64> {
        let x1 = x1.min(self.width);
        let y1 = y1.min(self.height);
        if x0 >= x1 || y0 >= y1 {
            return None;
        }
        let area = ((x1 - x0) * (y1 - y0)) as f64;
        Some(self.sum(x0, y0, x1, y1) / area)
    }
}

/// A binary grid, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    width: usize,
    height: usize,
    data: Vec<bool>,
}

impl Mask {
    /// Cells of `map` whose value is at or below `threshold`.
    #[must_use]
    pub fn at_or_below(map: &FloatMap, threshold: f32) -> Self {
        Self {
            width: map.width(),
            height: map.height(),
            data: map.as_slice().iter().map(|&v| v <= threshold).collect(),
        }
    }

    /// Cells of `map` whose value is strictly above `threshold`.
    #[must_use]
    pub fn above(map: &FloatMap, threshold: f32) -> Self {
        Self {
            width: map.width(),
            height: map.height(),
            data: map.as_slice().iter().map(|&v| v > threshold).collect(),
        }
    }

    /// Width in cells.
    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Height in cells.
    #[must_use]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Bounds-checked read.
    #[must_use]
    pub fn get(&self, x: usize, y: usize) -> Option<bool> {
        (x < self.width && y < self.height).then(|| self.data[y * self.width + x])
    }

    /// Read a cell; panics when `(x, y)` is outside the mask.
    #[must_use]
    pub fn at(&self, x: usize, y: usize) -> bool {
        assert!(x < self.width && y < self.height, "({x}, {y}) out of bounds");
        self.data[y * self.width + x]
    }

    /// Number of set cells.
    #[must_use]
    pub fn count(&self) -> usize {
        self.data.iter().filter(|&&b| b).count()
    }

    /// Fraction of set cells, `0.0` for an empty mask.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn fraction(&self) -> f32 {
        if self.data.is_empty() {
            0.0
        } else {
            self.count() as f32 / self.data.len() as f32
        }
    }

    /// Set cells become 255, the rest 0.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn to_gray_image(&self) -> GrayImage {
        GrayImage::from_fn(self.width as u32, self.height as u32, |x, y| {
            Luma([if self.at(x as usize, y as usize) { 255 } else { 0 }])
        })
    }
}

/// Percentile `q` (0-100) of `values` with linear interpolation between ranks.
///
/// Sorts a copy of the sample; `0.0` for an empty slice. NaNs sort last.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn percentile(values: &[f32], q: f32) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable_by(f32::total_cmp);

    let rank = (q.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f32;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        return sorted[lo];
    }
    let frac = rank - lo as f32;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Standard deviation of a float slice.
#[must_use]
pub fn stddev(data: &[f32]) -> f32 {
    if data.is_empty() {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let n = data.len() as f32;
    let mean = data.iter().sum::<f32>() / n;
    let variance = data.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / n;
    variance.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentile_interpolates_between_ranks() {
        let data = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert!((percentile(&data, 0.0) - 1.0).abs() < 1e-6);
        assert!((percentile(&data, 50.0) - 3.0).abs() < 1e-6);
        assert!((percentile(&data, 100.0) - 5.0).abs() < 1e-6);
        assert!((percentile(&data, 75.0) - 4.0).abs() < 1e-6);
        assert!((percentile(&data, 90.0) - 4.6).abs() < 1e-5);
    }

    #[test]
    fn percentile_ignores_input_order() {
        let a = [5.0, 1.0, 4.0, 2.0, 3.0];
        let b = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert!((percentile(&a, 60.0) - percentile(&b, 60.0)).abs() < 1e-6);
    }

    #[test]
    fn percentile_of_empty_slice_is_zero() {
        assert!(percentile(&[], 90.0).abs() < 1e-6);
    }

    #[test]
    fn stddev_of_known_values() {
        let data: Vec<f32> = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        assert!((stddev(&data) - 2.0_f32.sqrt()).abs() < 1e-5);
        assert!(stddev(&[0.42; 16]).abs() < 1e-6);
    }

    #[test]
    fn get_is_bounds_checked() {
        let map = FloatMap::filled(4, 3, 1.5);
        assert_eq!(map.get(3, 2), Some(1.5));
        assert_eq!(map.get(4, 0), None);
        assert_eq!(map.get(0, 3), None);
    }

    #[test]
    fn normalized_by_max_scales_peak_to_one() {
        let map = FloatMap::from_fn(4, 1, |x, _| x as f32);
        let norm = map.normalized_by_max();
        assert!((norm.max() - 1.0).abs() < 1e-6);
        assert!((norm.at(1, 0) - 1.0 / 3.0).abs() < 1e-6);

        let zeros = FloatMap::new(3, 3);
        assert_eq!(zeros.normalized_by_max(), zeros);
    }

    #[test]
    fn dilate_spreads_a_single_peak_into_a_disk() {
        let mut map = FloatMap::new(11, 11);
        map.set(5, 5, 1.0);
        let dilated = map.dilate(2);
        assert!((dilated.at(5, 3) - 1.0).abs() < 1e-6);
        assert!((dilated.at(7, 5) - 1.0).abs() < 1e-6);
        assert!((dilated.at(6, 6) - 1.0).abs() < 1e-6);
        // Corner of the bounding square lies outside the disk.
        assert!(dilated.at(7, 7).abs() < 1e-6);
        assert!(dilated.at(5, 8).abs() < 1e-6);
    }

    #[test]
    fn gaussian_blur_preserves_constant_maps() {
        let map = FloatMap::filled(16, 16, 0.25);
        let blurred = map.gaussian_blur(2.0);
        for &v in blurred.as_slice() {
            assert!((v - 0.25).abs() < 1e-4);
        }
    }

    #[test]
    fn local_variance_is_zero_on_flat_regions() {
        let map = FloatMap::from_fn(20, 10, |x, _| if x < 10 { 0.0 } else { 1.0 });
        let var = map.local_variance(2);
        assert!(var.at(2, 5).abs() < 1e-6);
        assert!(var.at(17, 5).abs() < 1e-6);
        assert!(var.at(10, 5) > 0.1);
    }

    #[test]
    fn summed_area_matches_direct_sum() {
        let map = FloatMap::from_fn(6, 5, |x, y| (x + 2 * y) as f32);
        let table = SummedArea::new(&map);
        let direct: f32 = (1..4)
            .flat_map(|y| (2..5).map(move |x| (x, y)))
            .map(|(x, y)| map.at(x, y))
            .sum();
        assert!((table.sum(2, 1, 5, 4) - f64::from(direct)).abs() < 1e-9);
        assert!(table.mean(3, 3, 3, 4).is_none());
    }

    #[test]
    fn mask_counts_permissible_cells() {
        let map = FloatMap::from_fn(10, 1, |x, _| x as f32 / 10.0);
        let mask = Mask::at_or_below(&map, 0.35);
        assert_eq!(mask.count(), 4);
        assert!((mask.fraction() - 0.4).abs() < 1e-6);
        assert_eq!(Mask::above(&map, 0.35).count(), 6);
    }
}
