//! Candidate search over the cost and aesthetic maps.
//!
//! Two strategies:
//!
//! - [`DistanceSearch`] (full fidelity): the Euclidean distance transform of the
//!   permissible mask gives, per pixel, the radius of the largest empty disk
//!   centered there. Score = normalized distance squared times aesthetic value.
//! - [`SampledSearch`] (fast and ultra-fast): a fixed list of compositional
//!   sample points, optionally followed by a coarse grid, gated by a sparse
//!   cleanliness probe and ranked by a penalty score.
//!
//! Both iterate in a fixed order and keep the first maximum (strict `>`).

use std::f32::consts::SQRT_2;

use image::{GrayImage, Luma};
use imageproc::distance_transform::euclidean_squared_distance_transform;

use crate::cost::CostMap;
use crate::logo::{BoundingBox, LogoRegion};
use crate::matrix::{FloatMap, Mask};

/// Permissible threshold never drops below this cost.
pub const MIN_PERMISSIBLE_COST: f32 = 0.05;

/// A scored placement at working resolution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    /// Center in working pixels.
    pub center: (usize, usize),
    /// Side of the placement square in working pixels.
    pub size: f32,
    /// Combined score; larger is better.
    pub score: f32,
}

/// Everything a search needs besides the maps.
#[derive(Debug, Clone, Copy)]
pub struct SearchContext<'a> {
    /// Widget footprint width in working pixels.
    pub footprint_width: f32,
    /// Widget footprint height in working pixels.
    pub footprint_height: f32,
    /// Penalize candidates in the lower part of the image.
    pub prefer_upper: bool,
    /// Score local complexity at all.
    pub complexity_avoidance: bool,
    /// Detected logos in working coordinates.
    pub logos: &'a [LogoRegion],
}

/// Pixels whose cost is at or below `max(percentile(q), MIN_PERMISSIBLE_COST)`.
#[must_use]
pub fn permissible_mask(cost: &CostMap, q: f32) -> Mask {
    let threshold = cost.values().percentile(q).max(MIN_PERMISSIBLE_COST);
    Mask::at_or_below(cost.values(), threshold)
}

/// Distance from every pixel to the nearest non-permissible pixel or to the
/// outside of the image, whichever is closer.
///
/// Non-permissible pixels have distance zero.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn distance_map(mask: &Mask) -> FloatMap {
    let (w, h) = (mask.width(), mask.height());
    if w == 0 || h == 0 {
        return FloatMap::new(w, h);
    }

    // One pixel of obstacle all around so the border limits the disk too.
    let padded = GrayImage::from_fn(w as u32 + 2, h as u32 + 2, |px, py| {
        let inside = px >= 1 && py >= 1 && (px as usize) <= w && (py as usize) <= h;
        if inside && mask.at(px as usize - 1, py as usize - 1) {
            Luma([0u8])
        } else {
            Luma([255u8])
        }
    });
    let squared = euclidean_squared_distance_transform(&padded);

    FloatMap::from_fn(w, h, |x, y| {
        let d2 = squared.get_pixel(x as u32 + 1, y as u32 + 1)[0];
        d2.sqrt() as f32
    })
}

/// Full-fidelity search over the distance transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceSearch {
    /// Cost percentile (0-100) used as the permissible threshold.
    pub percentile: f32,
}

impl Default for DistanceSearch {
    fn default() -> Self {
        Self { percentile: 60.0 }
    }
}

impl DistanceSearch {
    /// Best candidate, or `None` when nothing is permissible or every score is zero.
    ///
    /// Distances saturate at the footprint's inscribed radius (or at the largest
    /// distance in the image, if smaller), so among roomy enough positions the
    /// aesthetic map decides.
    #[must_use]
    pub fn search(
        &self,
        cost: &CostMap,
        aesthetic: &FloatMap,
        ctx: &SearchContext<'_>,
    ) -> Option<Candidate> {
        let mask = permissible_mask(cost, self.percentile);
        if mask.count() == 0 {
            tracing::warn!("search: permissible mask is empty");
            return None;
        }
        let distances = distance_map(&mask);
        let max_distance = distances.max();
        let inscribed = 0.5 * ctx.footprint_width.min(ctx.footprint_height);
        let reference = inscribed.min(max_distance).max(1.0);

        let mut best: Option<Candidate> = None;
        let mut best_score = 0.0_f32;
        for y in 0..mask.height() {
            for x in 0..mask.width() {
                if !mask.at(x, y) {
                    continue;
                }
                let d = distances.at(x, y);
                let nd = (d / reference).min(1.0);
                let score = nd * nd * aesthetic.get(x, y).unwrap_or(0.0);
                if score > best_score {
                    best_score = score;
                    best = Some(Candidate {
                        center: (x, y),
                        size: d * SQRT_2,
                        score,
                    });
                }
            }
        }

        if let Some(c) = &best {
            tracing::debug!(
                "search: distance transform picked {:?} (size {:.1}, score {:.3}, max distance {max_distance:.1})",
                c.center,
                c.size,
                c.score
            );
        }
        best
    }
}

/// How local complexity is sampled over the footprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComplexityProbe {
    /// `n x n` evenly spaced points covering the footprint.
    Lattice(usize),
    /// Center plus three points around it.
    Cross,
}

/// Sampled search used by the fast and ultra-fast tiers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampledSearch {
    /// Compositional sample points as fractions of the working size.
    pub points: &'static [(f32, f32)],
    /// Follow the sample points with a coarse grid scan.
    pub grid_scan: bool,
    /// Cleanliness probe offsets, in quarters of the candidate size.
    pub clean_probe: &'static [(f32, f32)],
    /// Minimum clean fraction (exclusive) for a candidate to be scored.
    pub clean_gate: f32,
    /// Cost percentile used for the cleanliness mask.
    pub clean_percentile: f32,
    /// Complexity sampling pattern.
    pub complexity_probe: ComplexityProbe,
    /// `(threshold, penalty)` pairs, checked in order; the first threshold
    /// reached applies.
    pub complexity_penalties: &'static [(f32, f32)],
    /// Bonus when local complexity is below [`CLEAN_BONUS_BELOW`].
    pub clean_bonus: f32,
    /// Penalty for being near an edge.
    pub edge_penalty: f32,
    /// Apply the edge penalty once per offending axis instead of once overall.
    pub edge_per_axis: bool,
    /// Bonus per axis within reach of a thirds line.
    pub thirds_bonus: f32,
    /// Bonus per axis within reach of a golden-ratio line.
    pub golden_bonus: f32,
}

/// Starting score of every sampled candidate.
const BASE_SCORE: f32 = 100.0;
/// Local complexity below this earns [`SampledSearch::clean_bonus`].
pub const CLEAN_BONUS_BELOW: f32 = 0.1;
/// Normalized distance to a border under which the edge penalty applies.
const EDGE_ZONE: f32 = 0.15;
const THIRDS_REACH: f32 = 0.1;
const GOLDEN_REACH: f32 = 0.05;
/// Normalized height below which the bottom penalty applies.
const BOTTOM_ZONE: f32 = 0.7;
const BOTTOM_PENALTY: f32 = 60.0;
const LOGO_OVERLAP_PENALTY: f32 = 150.0;
/// Candidate size as a fraction of the shorter working side.
const SAMPLED_SIZE_DIVISOR: usize = 6;
const MIN_GRID_STEP: usize = 12;
const GRID_DIVISOR: usize = 15;

const FAST_POINTS: [(f32, f32); 8] = [
    (0.33, 0.33),
    (0.67, 0.33),
    (0.33, 0.67),
    (0.67, 0.67),
    (0.5, 0.4),
    (0.4, 0.5),
    (0.5, 0.25),
    (0.3, 0.25),
];

const ULTRA_FAST_POINTS: [(f32, f32); 12] = [
    (0.33, 0.33),
    (0.67, 0.33),
    (0.33, 0.67),
    (0.67, 0.67),
    (0.382, 0.382),
    (0.618, 0.382),
    (0.5, 0.4),
    (0.4, 0.5),
    (0.6, 0.5),
    (0.5, 0.25),
    (0.3, 0.25),
    (0.7, 0.25),
];

const DIAGONAL_PROBE: [(f32, f32); 3] = [(-1.0, -1.0), (1.0, 1.0), (0.0, 0.0)];
const CORNER_PROBE: [(f32, f32); 5] = [
    (-1.0, -1.0),
    (1.0, -1.0),
    (-1.0, 1.0),
    (1.0, 1.0),
    (0.0, 0.0),
];

const FAST_PENALTIES: [(f32, f32); 3] = [(0.8, 120.0), (0.6, 80.0), (0.4, 40.0)];
const ULTRA_FAST_PENALTIES: [(f32, f32); 2] = [(0.7, 100.0), (0.4, 50.0)];

impl SampledSearch {
    /// Strategic points plus grid scan, 5x5 complexity lattice.
    #[must_use]
    pub const fn fast() -> Self {
        Self {
            points: &FAST_POINTS,
            grid_scan: true,
            clean_probe: &DIAGONAL_PROBE,
            clean_gate: 0.75,
            clean_percentile: 75.0,
            complexity_probe: ComplexityProbe::Lattice(5),
            complexity_penalties: &FAST_PENALTIES,
            clean_bonus: 20.0,
            edge_penalty: 30.0,
            edge_per_axis: true,
            thirds_bonus: 15.0,
            golden_bonus: 10.0,
        }
    }

    /// More strategic points, no grid, 4-point complexity probe.
    #[must_use]
    pub const fn ultra_fast() -> Self {
        Self {
            points: &ULTRA_FAST_POINTS,
            grid_scan: false,
            clean_probe: &CORNER_PROBE,
            clean_gate: 0.7,
            clean_percentile: 75.0,
            complexity_probe: ComplexityProbe::Cross,
            complexity_penalties: &ULTRA_FAST_PENALTIES,
            clean_bonus: 0.0,
            edge_penalty: 40.0,
            edge_per_axis: false,
            thirds_bonus: 20.0,
            golden_bonus: 0.0,
        }
    }

    /// Positions in evaluation order: strategic points, then the grid.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn positions(&self, width: usize, height: usize) -> Vec<(usize, usize)> {
        let mut positions: Vec<(usize, usize)> = self
            .points
            .iter()
            .map(|&(fx, fy)| ((width as f32 * fx) as usize, (height as f32 * fy) as usize))
            .collect();

        if self.grid_scan {
            let size = width.min(height) / SAMPLED_SIZE_DIVISOR;
            let half = size / 2;
            let step = (width.min(height) / GRID_DIVISOR).max(MIN_GRID_STEP);
            for y in (half..height.saturating_sub(half)).step_by(step) {
                for x in (half..width.saturating_sub(half)).step_by(step) {
                    positions.push((x, y));
                }
            }
        }
        positions
    }

    /// Best candidate, or `None` when no position passes the cleanliness gate.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn search(&self, cost: &CostMap, ctx: &SearchContext<'_>) -> Option<Candidate> {
        let (w, h) = (cost.values().width(), cost.values().height());
        let size = w.min(h) / SAMPLED_SIZE_DIVISOR;
        let half = size / 2;
        if w == 0 || h == 0 {
            return None;
        }
        let clean = permissible_mask(cost, self.clean_percentile);

        let mut best: Option<Candidate> = None;
        let mut evaluated = 0usize;
        for (x, y) in self.positions(w, h) {
            if x < half || y < half || x + half >= w || y + half >= h {
                continue;
            }
            if self.cleanliness(&clean, x, y, size) <= self.clean_gate {
                continue;
            }
            evaluated += 1;
            let score = self.score(cost, ctx, x, y);
            if best.is_none_or(|b| score > b.score) {
                best = Some(Candidate {
                    center: (x, y),
                    size: size as f32,
                    score,
                });
            }
        }

        tracing::debug!(
            "search: sampled {evaluated} clean position(s), best {:?}",
            best.map(|b| (b.center, b.score))
        );
        best
    }

    /// Fraction of probe points that fall on permissible pixels.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss,
        clippy::cast_possible_wrap
    )]
    fn cleanliness(&self, clean: &Mask, x: usize, y: usize, size: usize) -> f32 {
        if self.clean_probe.is_empty() {
            return 1.0;
        }
        let quarter = (size / 4) as f32;
        let hits = self
            .clean_probe
            .iter()
            .filter(|&&(ox, oy)| {
                let px = x as f32 + ox * quarter;
                let py = y as f32 + oy * quarter;
                px >= 0.0 && py >= 0.0 && clean.get(px as usize, py as usize).unwrap_or(false)
            })
            .count();
        hits as f32 / self.clean_probe.len() as f32
    }

    /// Penalty score of a position; higher is better.
    #[allow(clippy::cast_precision_loss)]
    fn score(&self, cost: &CostMap, ctx: &SearchContext<'_>, x: usize, y: usize) -> f32 {
        let (w, h) = (cost.values().width() as f32, cost.values().height() as f32);
        let (nx, ny) = (x as f32 / w, y as f32 / h);
        let mut score = BASE_SCORE;

        if ctx.complexity_avoidance {
            let complexity = self.local_complexity(cost, ctx, x, y);
            if let Some(&(_, penalty)) = self
                .complexity_penalties
                .iter()
                .find(|&&(threshold, _)| complexity >= threshold)
            {
                score -= penalty;
            } else if complexity < CLEAN_BONUS_BELOW {
                score += self.clean_bonus;
            }
        }

        let near_edge = |n: f32| n < EDGE_ZONE || n > 1.0 - EDGE_ZONE;
        if self.edge_per_axis {
            for n in [nx, ny] {
                if near_edge(n) {
                    score -= self.edge_penalty;
                }
            }
        } else if near_edge(nx) || near_edge(ny) {
            score -= self.edge_penalty;
        }

        let within =
            |n: f32, lines: &[f32], reach: f32| lines.iter().any(|l| (n - l).abs() < reach);
        for n in [nx, ny] {
            if within(n, &[0.33, 0.67], THIRDS_REACH) {
                score += self.thirds_bonus;
            }
            if within(n, &[0.382, 0.618], GOLDEN_REACH) {
                score += self.golden_bonus;
            }
        }

        if ctx.prefer_upper && ny > BOTTOM_ZONE {
            score -= BOTTOM_PENALTY;
        }

        if !ctx.logos.is_empty() {
            let footprint = footprint_box(x, y, ctx.footprint_width, ctx.footprint_height);
            if ctx.logos.iter().any(|l| l.bbox.intersects(&footprint)) {
                score -= LOGO_OVERLAP_PENALTY;
            }
        }

        score
    }

    /// Mean cost at the probe points of the footprint centered on `(x, y)`.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    fn local_complexity(
        &self,
        cost: &CostMap,
        ctx: &SearchContext<'_>,
        x: usize,
        y: usize,
    ) -> f32 {
        let values = cost.values();
        let (cx, cy) = (x as f32, y as f32);
        let (fw, fh) = (ctx.footprint_width, ctx.footprint_height);
        let offsets: Vec<(f32, f32)> = match self.complexity_probe {
            ComplexityProbe::Lattice(n) => {
                let n = n.max(2);
                let steps = (n - 1) as f32;
                (0..n)
                    .flat_map(|j| {
                        (0..n).map(move |i| {
                            (fw * (i as f32 / steps - 0.5), fh * (j as f32 / steps - 0.5))
                        })
                    })
                    .collect()
            }
            ComplexityProbe::Cross => vec![
                (0.0, 0.0),
                (-fw / 4.0, -fh / 4.0),
                (fw / 4.0, -fh / 4.0),
                (0.0, fh / 4.0),
            ],
        };

        let samples: Vec<f32> = offsets
            .iter()
            .filter_map(|&(ox, oy)| {
                let (px, py) = (cx + ox, cy + oy);
                if px < 0.0 || py < 0.0 {
                    return None;
                }
                values.get(px as usize, py as usize)
            })
            .collect();
        if samples.is_empty() {
            return 0.0;
        }
        samples.iter().sum::<f32>() / samples.len() as f32
    }
}

/// Footprint rectangle centered on `(x, y)`, clipped at the origin.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn footprint_box(x: usize, y: usize, width: f32, height: f32) -> BoundingBox {
    let x0 = (x as f32 - width / 2.0).max(0.0);
    let y0 = (y as f32 - height / 2.0).max(0.0);
    BoundingBox {
        x: x0 as u32,
        y: y0 as u32,
        width: width.max(1.0) as u32,
        height: height.max(1.0) as u32,
    }
}
