//! Logo and watermark candidates.
//!
//! Compact, filled, high-cost blobs are likely logos. The cost map is
//! thresholded at its 90th percentile and the external contours of the result
//! are filtered by area, aspect ratio and solidity (contour area over convex
//! hull area), which rejects sprawling texture in favour of solid shapes.

use imageproc::contours::{find_contours, BorderType};
use imageproc::geometry::convex_hull;
use imageproc::point::Point;
use serde::{Deserialize, Serialize};

use crate::cost::CostMap;
use crate::matrix::Mask;

/// Percentile of the cost map used as the blob threshold.
const LOGO_PERCENTILE: f32 = 90.0;
/// Accepted contour area, as a fraction of the image area.
const MIN_AREA_FRACTION: f32 = 0.001;
const MAX_AREA_FRACTION: f32 = 0.15;
/// Accepted bounding-box aspect ratio (width / height).
const MIN_ASPECT: f32 = 0.2;
const MAX_ASPECT: f32 = 5.0;
/// Minimum contour area / hull area.
const MIN_SOLIDITY: f32 = 0.4;

/// Axis-aligned pixel rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Left edge.
    pub x: u32,
    /// Top edge.
    pub y: u32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl BoundingBox {
    /// Whether `(px, py)` lies inside the box.
    #[must_use]
    pub fn contains(&self, px: f32, py: f32) -> bool {
        let (x0, y0) = (self.x as f32, self.y as f32);
        px >= x0 && py >= y0 && px < x0 + self.width as f32 && py < y0 + self.height as f32
    }

    /// Whether two boxes overlap.
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        self.x < other.x + other.width
            && other.x < self.x + self.width
            && self.y < other.y + other.height
            && other.y < self.y + self.height
    }
}

/// A detected logo or watermark candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogoRegion {
    /// Bounding box of the contour.
    pub bbox: BoundingBox,
    /// Area-weighted centroid of the contour polygon.
    pub centroid: (f32, f32),
    /// Contour polygon area in square pixels.
    pub area: f32,
    /// Contour area over convex hull area, in `[0, 1]`.
    pub solidity: f32,
}

impl LogoRegion {
    /// Map the region into another resolution by dividing by `scale`.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn rescaled(&self, scale: f32) -> Self {
        let s = |v: u32| (v as f32 / scale) as u32;
        Self {
            bbox: BoundingBox {
                x: s(self.bbox.x),
                y: s(self.bbox.y),
                width: s(self.bbox.width).max(1),
                height: s(self.bbox.height).max(1),
            },
            centroid: (self.centroid.0 / scale, self.centroid.1 / scale),
            area: self.area / (scale * scale),
            solidity: self.solidity,
        }
    }
}

/// Extract logo candidates from a cost map.
///
/// Regions are returned in contour discovery order (raster scan of the mask).
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn detect_logos(cost: &CostMap) -> Vec<LogoRegion> {
    let values = cost.values();
    let (w, h) = (values.width(), values.height());
    if w == 0 || h == 0 {
        return Vec::new();
    }

    let threshold = values.percentile(LOGO_PERCENTILE);
    let mask = Mask::above(values, threshold);
    if mask.count() == 0 {
        return Vec::new();
    }

    let image_area = (w * h) as f32;
    let logos: Vec<LogoRegion> = find_contours::<i32>(&mask.to_gray_image())
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .filter_map(|c| measure(&c.points, image_area))
        .collect();

    tracing::debug!(
        "logo: threshold {threshold:.3}, {} candidate(s) kept",
        logos.len()
    );
    logos
}

/// Apply the shape filters to one contour.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn measure(points: &[Point<i32>], image_area: f32) -> Option<LogoRegion> {
    if points.len() < 3 {
        return None;
    }

    let min_x = points.iter().map(|p| p.x).min()?;
    let max_x = points.iter().map(|p| p.x).max()?;
    let min_y = points.iter().map(|p| p.y).min()?;
    let max_y = points.iter().map(|p| p.y).max()?;
    let bw = (max_x - min_x + 1) as f32;
    let bh = (max_y - min_y + 1) as f32;

    let area = polygon_area(points);
    let fraction = area / image_area;
    if !(MIN_AREA_FRACTION..=MAX_AREA_FRACTION).contains(&fraction) {
        return None;
    }

    let aspect = bw / bh;
    if !(MIN_ASPECT..=MAX_ASPECT).contains(&aspect) {
        return None;
    }

    let hull = convex_hull(points);
    let hull_area = polygon_area(&hull);
    if hull_area <= 0.0 {
        return None;
    }
    let solidity = (area / hull_area).min(1.0);
    if solidity <= MIN_SOLIDITY {
        return None;
    }

    Some(LogoRegion {
        bbox: BoundingBox {
            x: min_x.max(0) as u32,
            y: min_y.max(0) as u32,
            width: bw as u32,
            height: bh as u32,
        },
        centroid: polygon_centroid(points),
        area,
        solidity,
    })
}

/// Absolute shoelace area of a closed polygon.
#[allow(clippy::cast_precision_loss)]
fn polygon_area(points: &[Point<i32>]) -> f32 {
    if points.len() < 3 {
        return 0.0;
    }
    let twice: i64 = points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(a, b)| i64::from(a.x) * i64::from(b.y) - i64::from(b.x) * i64::from(a.y))
        .sum();
    (twice.abs() as f64 / 2.0) as f32
}

/// Area-weighted centroid; falls back to the vertex mean for degenerate polygons.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
fn polygon_centroid(points: &[Point<i32>]) -> (f32, f32) {
    let mut twice_area = 0.0_f64;
    let mut cx = 0.0_f64;
    let mut cy = 0.0_f64;
    for (a, b) in points.iter().zip(points.iter().cycle().skip(1)) {
        let (ax, ay) = (f64::from(a.x), f64::from(a.y));
        let (bx, by) = (f64::from(b.x), f64::from(b.y));
        let cross = ax * by - bx * ay;
        twice_area += cross;
        cx += (ax + bx) * cross;
        cy += (ay + by) * cross;
    }
    if twice_area.abs() < 1e-9 {
        let n = points.len().max(1) as f64;
        let mx = points.iter().map(|p| f64::from(p.x)).sum::<f64>() / n;
        let my = points.iter().map(|p| f64::from(p.y)).sum::<f64>() / n;
        return (mx as f32, my as f32);
    }
    ((cx / (3.0 * twice_area)) as f32, (cy / (3.0 * twice_area)) as f32)
}
