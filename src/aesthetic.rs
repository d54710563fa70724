//! Placement desirability, independent of visual complexity.
//!
//! Every pixel starts at a base value of 0.5. A composition bonus is added
//! (lobes flanking detected logos, or rule-of-thirds and golden-ratio lobes
//! when there are none), then multiplicative factors are applied: an edge
//! margin falloff, an optional bottom-region falloff and a darkness preference.
//! The result is normalized by its own maximum.

use image::RgbImage;

use crate::logo::LogoRegion;
use crate::matrix::FloatMap;
use crate::preprocess::luma_map;

/// Desirability everywhere before bonuses and penalties.
const BASE: f32 = 0.5;
/// Bottom falloff starts at this fraction of the height...
const BOTTOM_START: f32 = 0.7;
/// ...and reaches this factor at the bottom edge.
const BOTTOM_FLOOR: f32 = 0.2;
/// Exponent of the darkness preference.
const DARKNESS_EXPONENT: f32 = 1.5;

const THIRDS: [f32; 2] = [1.0 / 3.0, 2.0 / 3.0];
const GOLDEN: [f32; 2] = [0.382, 0.618];
/// Lobe widths in normalized units.
const LINE_SIGMA: f32 = 0.03;
const POINT_SIGMA: f32 = 0.05;
const LINE_WEIGHT: f32 = 0.2;
const POINT_WEIGHT: f32 = 0.4;
/// Golden-ratio lobes relative to thirds lobes.
const GOLDEN_WEIGHT: f32 = 0.35;

/// Toggles and thresholds for [`build_aesthetic_map`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AestheticParams {
    /// Width of the border falloff, as a fraction of each dimension.
    pub edge_margin: f32,
    /// Penalize the lower 30% of the image.
    pub prefer_upper: bool,
    /// Add thirds/golden lobes when no logo was detected.
    pub use_rule_of_thirds: bool,
}

impl Default for AestheticParams {
    fn default() -> Self {
        Self {
            edge_margin: 0.10,
            prefer_upper: true,
            use_rule_of_thirds: true,
        }
    }
}

/// Build the aesthetic map for a working-resolution image.
///
/// `logos` must be in the same (working) coordinates as `image`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn build_aesthetic_map(
    image: &RgbImage,
    logos: &[LogoRegion],
    params: &AestheticParams,
) -> FloatMap {
    let luma = luma_map(image);
    let (w, h) = (luma.width(), luma.height());
    if w == 0 || h == 0 {
        return FloatMap::new(w, h);
    }
    let (wf, hf) = (w as f32, h as f32);

    let raw = FloatMap::from_fn(w, h, |x, y| {
        let (px, py) = (x as f32, y as f32);
        if logos.iter().any(|l| l.bbox.contains(px, py)) {
            return 0.0;
        }
        let (nx, ny) = (px / wf, py / hf);

        let bonus = if logos.is_empty() {
            if params.use_rule_of_thirds {
                composition_bonus(nx, ny)
            } else {
                0.0
            }
        } else {
            logos.iter().map(|l| flank_bonus(l, px, py)).sum()
        };

        let mut factor = edge_factor(nx, params.edge_margin) * edge_factor(ny, params.edge_margin);
        if params.prefer_upper {
            factor *= bottom_factor(ny);
        }
        let darkness = 1.0 + (1.0 - luma.at(x, y)).max(0.0).powf(DARKNESS_EXPONENT);

        (BASE + bonus) * factor * darkness
    });

    tracing::debug!(
        "aesthetic: {w}x{h}, {} logo(s), peak {:.3}",
        logos.len(),
        raw.max()
    );
    raw.normalized_by_max()
}

/// Linear falloff to zero within `margin` of either border of one axis.
fn edge_factor(n: f32, margin: f32) -> f32 {
    if margin <= 0.0 {
        return 1.0;
    }
    (n.min(1.0 - n) / margin).clamp(0.0, 1.0)
}

fn bottom_factor(ny: f32) -> f32 {
    if ny <= BOTTOM_START {
        return 1.0;
    }
    let t = ((ny - BOTTOM_START) / (1.0 - BOTTOM_START)).min(1.0);
    1.0 - (1.0 - BOTTOM_FLOOR) * t
}

fn gaussian(d2: f32, sigma: f32) -> f32 {
    (-d2 / (2.0 * sigma * sigma)).exp()
}

/// Line and intersection lobes for one family of grid positions.
fn grid_lobes(nx: f32, ny: f32, positions: [f32; 2]) -> f32 {
    let nearest = |v: f32| {
        positions
            .iter()
            .map(|p| (v - p).abs())
            .fold(f32::INFINITY, f32::min)
    };
    let (dx, dy) = (nearest(nx), nearest(ny));
    let lines = gaussian(dx * dx, LINE_SIGMA) + gaussian(dy * dy, LINE_SIGMA);
    let point = gaussian(dx * dx + dy * dy, POINT_SIGMA);
    LINE_WEIGHT * lines + POINT_WEIGHT * point
}

fn composition_bonus(nx: f32, ny: f32) -> f32 {
    grid_lobes(nx, ny, THIRDS) + GOLDEN_WEIGHT * grid_lobes(nx, ny, GOLDEN)
}

/// Lobes directly above and below a logo, one logo height away.
#[allow(clippy::cast_precision_loss)]
fn flank_bonus(logo: &LogoRegion, px: f32, py: f32) -> f32 {
    let (cx, cy) = logo.centroid;
    let offset = logo.bbox.height as f32;
    let sigma = (0.5 * logo.bbox.width.max(logo.bbox.height) as f32).max(1.0);
    let dx2 = (px - cx) * (px - cx);
    let above = py - (cy - offset);
    let below = py - (cy + offset);
    gaussian(dx2 + above * above, sigma) + gaussian(dx2 + below * below, sigma)
}
