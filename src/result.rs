//! Final placement record and the diagnostics computed for it.

use std::fmt::Write as _;

use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::cost::{ComplexityStats, CostMap};
use crate::engine::{AnalysisOptions, Footprint, Tier};
use crate::error::Result;
use crate::logo::LogoRegion;
use crate::matrix::{percentile, stddev};
use crate::preprocess::{region_luma, WorkingImage};
use crate::search::Candidate;

/// Minimum square side is `min(width, height) / MIN_SIZE_DIVISOR`.
const MIN_SIZE_DIVISOR: u32 = 20;
/// Local complexity above which the full tier searches the neighbourhood.
const REPAIR_THRESHOLD: f32 = 0.7;
const REPAIR_MAX_RADIUS: u32 = 100;
const REPAIR_RADIUS_DIVISOR: u32 = 10;
const REPAIR_STEP: usize = 20;
const BRIGHT_ABOVE: f32 = 0.6;
const DARK_BELOW: f32 = 0.4;
const UNIFORM_STD_BELOW: f32 = 0.1;
const TRANSITION_COMPLEXITY: f32 = 0.3;
const TRANSITION_STD: f32 = 0.15;
/// Brightness reported when the footprint covers no pixels.
const NEUTRAL_BRIGHTNESS: f32 = 0.5;

/// Luma statistics under the footprint, in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BackgroundAnalysis {
    /// Mean luma.
    pub average_brightness: f32,
    /// Luma standard deviation.
    pub brightness_std: f32,
    /// 25th luma percentile.
    pub brightness_25: f32,
    /// 75th luma percentile.
    pub brightness_75: f32,
    /// Mean luma above 0.6.
    pub is_bright_background: bool,
    /// Mean luma below 0.4.
    pub is_dark_background: bool,
    /// Standard deviation below 0.1.
    pub is_uniform: bool,
}

impl BackgroundAnalysis {
    /// Statistics of a set of luma samples.
    #[must_use]
    pub fn from_samples(luma: &[f32]) -> Self {
        let average = if luma.is_empty() {
            NEUTRAL_BRIGHTNESS
        } else {
            #[allow(clippy::cast_precision_loss)]
            let n = luma.len() as f32;
            luma.iter().sum::<f32>() / n
        };
        let std = stddev(luma);
        Self {
            average_brightness: average,
            brightness_std: std,
            brightness_25: if luma.is_empty() { average } else { percentile(luma, 25.0) },
            brightness_75: if luma.is_empty() { average } else { percentile(luma, 75.0) },
            is_bright_background: average > BRIGHT_ABOVE,
            is_dark_background: average < DARK_BELOW,
            is_uniform: std < UNIFORM_STD_BELOW,
        }
    }
}

/// How calm the final position is.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColorUniformity {
    /// Mean cost under the footprint.
    pub complexity_score: f32,
    /// Busy or high-contrast footprint.
    pub has_color_transitions: bool,
    /// `1 - min(1, 2 * luma std + complexity)`.
    pub uniformity_score: f32,
}

/// Complexity-avoidance bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComplexityAvoidance {
    /// Whether complexity avoidance was on.
    pub enabled: bool,
    /// Whether the repair pass moved the widget.
    pub repaired: bool,
    /// Local complexity at the searched position.
    pub initial_complexity_score: f32,
    /// Local complexity at the final position.
    pub final_complexity_score: f32,
}

/// Center handed to the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockPosition {
    /// Horizontal center.
    pub x: u32,
    /// Vertical center.
    pub y: u32,
}

/// Summary the renderer uses to pick its colours.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RendererHints {
    /// Mean luma under the footprint.
    pub background_brightness: f32,
    /// See [`BackgroundAnalysis::is_bright_background`].
    pub is_bright_background: bool,
    /// See [`BackgroundAnalysis::is_dark_background`].
    pub is_dark_background: bool,
    /// Local complexity at the final position.
    pub complexity_score: f32,
}

/// A complete placement, in original-resolution pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacementResult {
    /// Tier that produced the placement.
    pub algorithm: Tier,
    /// Image size.
    pub image_size: (u32, u32),
    /// Widget center.
    pub center: (u32, u32),
    /// Side of the empty square around the center.
    pub square_size: u32,
    /// That square as `(x1, y1, x2, y2)`, clipped to the image.
    pub coordinates: (u32, u32, u32, u32),
    /// Widget footprint used for clamping and diagnostics.
    pub footprint: Footprint,
    /// Whole-image busyness in `[0, 1]`.
    pub complexity_score: f32,
    /// Global cost breakdown.
    pub complexity_stats: ComplexityStats,
    /// Luma statistics under the footprint, when enabled.
    pub background_analysis: Option<BackgroundAnalysis>,
    /// Calmness of the final position.
    pub color_uniformity: ColorUniformity,
    /// Repair-pass bookkeeping.
    pub complexity_avoidance: ComplexityAvoidance,
    /// Detected logos.
    pub logos: Vec<LogoRegion>,
    /// The search found nothing and the image center was used.
    pub fallback: bool,
    /// Same as `center`, in the renderer's format.
    pub suggested_clock_position: ClockPosition,
    /// Brightness summary for the renderer.
    pub analysis: RendererHints,
}

impl PlacementResult {
    /// Line-oriented `key: value` block, headed by `--- RESULT ---`.
    #[must_use]
    pub fn to_debug_text(&self) -> String {
        let mut out = String::from("--- RESULT ---\n");
        let (x1, y1, x2, y2) = self.coordinates;
        // Writing to a String cannot fail.
        let _ = writeln!(out, "algorithm: {}", self.algorithm);
        let _ = writeln!(out, "image_size: {}x{}", self.image_size.0, self.image_size.1);
        let _ = writeln!(out, "center: ({}, {})", self.center.0, self.center.1);
        let _ = writeln!(out, "square_size: {}", self.square_size);
        let _ = writeln!(out, "coordinates: ({x1}, {y1}, {x2}, {y2})");
        let _ = writeln!(
            out,
            "footprint: {}x{} (margin {})",
            self.footprint.width, self.footprint.height, self.footprint.margin
        );
        let _ = writeln!(out, "complexity_score: {:.3}", self.complexity_score);
        let s = &self.complexity_stats;
        let _ = writeln!(
            out,
            "complexity_stats: high {:.3}, medium {:.3}, safe {:.3}, average {:.3}",
            s.high_complexity_ratio,
            s.medium_complexity_ratio,
            s.safe_area_ratio,
            s.average_complexity
        );
        if let Some(bg) = &self.background_analysis {
            let _ = writeln!(
                out,
                "background_analysis: brightness {:.3} (std {:.3}, p25 {:.3}, p75 {:.3}), bright {}, dark {}, uniform {}",
                bg.average_brightness,
                bg.brightness_std,
                bg.brightness_25,
                bg.brightness_75,
                bg.is_bright_background,
                bg.is_dark_background,
                bg.is_uniform
            );
        }
        let u = &self.color_uniformity;
        let _ = writeln!(
            out,
            "color_uniformity: score {:.3}, complexity {:.3}, transitions {}",
            u.uniformity_score, u.complexity_score, u.has_color_transitions
        );
        let a = &self.complexity_avoidance;
        let _ = writeln!(
            out,
            "complexity_avoidance: enabled {}, repaired {}, {:.3} -> {:.3}",
            a.enabled, a.repaired, a.initial_complexity_score, a.final_complexity_score
        );
        let _ = writeln!(out, "logos: {}", self.logos.len());
        let _ = writeln!(out, "fallback: {}", self.fallback);
        out
    }

    /// Pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Json`] if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Allowed center range on one axis, so the footprint plus margin stays on screen.
///
/// When the image is too small for that, both ends collapse to the midpoint.
#[must_use]
pub fn axis_bounds(dimension: u32, extent: u32, margin: u32) -> (u32, u32) {
    let reach = (extent / 2).saturating_add(margin);
    let low = reach;
    let high = dimension.saturating_sub(reach);
    if low > high {
        (dimension / 2, dimension / 2)
    } else {
        (low, high)
    }
}

/// Allowed center range on the vertical axis.
///
/// Like [`axis_bounds`], but the center also stays a full footprint height
/// above the bottom edge: 1080 rows with a 120 px widget give `(110, 960)`.
#[must_use]
pub fn vertical_bounds(height: u32, extent: u32, margin: u32) -> (u32, u32) {
    let (low, high) = axis_bounds(height, extent, margin);
    (low, high.min(height.saturating_sub(extent)).max(low))
}

/// Turns a working-resolution candidate into a [`PlacementResult`].
#[derive(Debug, Clone, Copy)]
pub struct ResultAssembler<'a> {
    /// Original image.
    pub image: &'a RgbImage,
    /// Working image the search ran on.
    pub working: &'a WorkingImage,
    /// Cost map at working resolution.
    pub cost: &'a CostMap,
    /// Analysis options.
    pub options: &'a AnalysisOptions,
    /// Tier being assembled.
    pub tier: Tier,
}

impl ResultAssembler<'_> {
    /// Back-project, clamp, repair if needed and compute diagnostics.
    ///
    /// `logos` are in working coordinates; `scene_complexity` is reported as-is.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn assemble(
        &self,
        candidate: Option<Candidate>,
        logos: &[LogoRegion],
        scene_complexity: f32,
    ) -> PlacementResult {
        let (width, height) = self.image.dimensions();
        let footprint = self.options.footprint;
        let x_bounds = axis_bounds(width, footprint.width, footprint.margin);
        let y_bounds = vertical_bounds(height, footprint.height, footprint.margin);
        let min_size = width.min(height) / MIN_SIZE_DIVISOR;

        let (mut center, square_size, fallback) = match candidate {
            Some(c) => {
                let x = self.working.to_original(c.center.0 as f32);
                let y = self.working.to_original(c.center.1 as f32);
                let size = (c.size / self.working.scale) as u32;
                (
                    (x.clamp(x_bounds.0, x_bounds.1), y.clamp(y_bounds.0, y_bounds.1)),
                    size.max(min_size),
                    false,
                )
            }
            None => {
                tracing::warn!("result: search found no candidate, falling back to the image center");
                (
                    (
                        (width / 2).clamp(x_bounds.0, x_bounds.1),
                        (height / 2).clamp(y_bounds.0, y_bounds.1),
                    ),
                    min_size,
                    true,
                )
            }
        };

        let initial = self.local_complexity(center);
        let mut complexity = initial;
        let mut repaired = false;
        if self.tier == Tier::Full
            && self.options.complexity_avoidance
            && initial > REPAIR_THRESHOLD
        {
            if let Some((better, c)) = self.repair(center, initial, x_bounds, y_bounds) {
                tracing::warn!(
                    "result: complexity {initial:.2} at {center:?}, moved to {better:?} ({c:.2})"
                );
                center = better;
                complexity = c;
                repaired = true;
            }
        }

        let luma = region_luma(
            self.image,
            center.0.saturating_sub(footprint.width / 2),
            center.1.saturating_sub(footprint.height / 2),
            center.0.saturating_add(footprint.width / 2),
            center.1.saturating_add(footprint.height / 2),
        );
        let background = BackgroundAnalysis::from_samples(&luma);
        let uniformity = ColorUniformity {
            complexity_score: complexity,
            has_color_transitions: complexity > TRANSITION_COMPLEXITY
                || background.brightness_std > TRANSITION_STD,
            uniformity_score: (1.0 - (2.0 * background.brightness_std + complexity).min(1.0))
                .max(0.0),
        };

        let half = square_size / 2;
        let coordinates = (
            center.0.saturating_sub(half),
            center.1.saturating_sub(half),
            center.0.saturating_add(half).min(width),
            center.1.saturating_add(half).min(height),
        );

        PlacementResult {
            algorithm: self.tier,
            image_size: (width, height),
            center,
            square_size,
            coordinates,
            footprint,
            complexity_score: scene_complexity,
            complexity_stats: self.cost.stats(),
            background_analysis: self.options.background_analysis.then_some(background),
            color_uniformity: uniformity,
            complexity_avoidance: ComplexityAvoidance {
                enabled: self.options.complexity_avoidance,
                repaired,
                initial_complexity_score: initial,
                final_complexity_score: complexity,
            },
            logos: logos
                .iter()
                .map(|l| l.rescaled(self.working.scale))
                .collect(),
            fallback,
            suggested_clock_position: ClockPosition {
                x: center.0,
                y: center.1,
            },
            analysis: RendererHints {
                background_brightness: background.average_brightness,
                is_bright_background: background.is_bright_background,
                is_dark_background: background.is_dark_background,
                complexity_score: complexity,
            },
        }
    }

    /// Mean cost under the footprint centered at an original-resolution point.
    fn local_complexity(&self, center: (u32, u32)) -> f32 {
        let fp = self.options.footprint;
        let w = self.working;
        let x0 = w.to_working(center.0.saturating_sub(fp.width / 2));
        let y0 = w.to_working(center.1.saturating_sub(fp.height / 2));
        let x1 = w.to_working(center.0.saturating_add(fp.width / 2)).max(x0 + 1);
        let y1 = w.to_working(center.1.saturating_add(fp.height / 2)).max(y0 + 1);
        self.cost.window_mean(x0, y0, x1, y1).unwrap_or(0.0)
    }

    /// Grid search around `center` for a strictly calmer position inside the bounds.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn repair(
        &self,
        center: (u32, u32),
        complexity: f32,
        x_bounds: (u32, u32),
        y_bounds: (u32, u32),
    ) -> Option<((u32, u32), f32)> {
        let (width, height) = self.image.dimensions();
        let radius = i64::from(REPAIR_MAX_RADIUS.min(width.min(height) / REPAIR_RADIUS_DIVISOR));
        let (cx, cy) = (i64::from(center.0), i64::from(center.1));

        let mut best: Option<((u32, u32), f32)> = None;
        let mut best_complexity = complexity;
        for dy in (-radius..=radius).step_by(REPAIR_STEP) {
            for dx in (-radius..=radius).step_by(REPAIR_STEP) {
                let (x, y) = (cx + dx, cy + dy);
                if x < i64::from(x_bounds.0)
                    || x > i64::from(x_bounds.1)
                    || y < i64::from(y_bounds.0)
                    || y > i64::from(y_bounds.1)
                {
                    continue;
                }
                let candidate = (x as u32, y as u32);
                let c = self.local_complexity(candidate);
                if c < best_complexity {
                    best_complexity = c;
                    best = Some((candidate, c));
                }
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::CostMapBuilder;
    use crate::matrix::FloatMap;
    use crate::preprocess::Preprocessor;
    use image::Rgb;

    struct Fixture {
        image: RgbImage,
        working: WorkingImage,
        cost: CostMap,
        options: AnalysisOptions,
    }

    impl Fixture {
        fn new(image: RgbImage, cost: FloatMap) -> Self {
            let working = Preprocessor::bounded(10_000).prepare(&image).unwrap();
            Self {
                image,
                working,
                cost: CostMap::new(cost),
                options: AnalysisOptions::default(),
            }
        }

        fn assembler(&self, tier: Tier) -> ResultAssembler<'_> {
            ResultAssembler {
                image: &self.image,
                working: &self.working,
                cost: &self.cost,
                options: &self.options,
                tier,
            }
        }
    }

    fn dark(w: u32, h: u32) -> RgbImage {
        RgbImage::from_pixel(w, h, Rgb([20, 20, 20]))
    }

    #[test]
    fn axis_bounds_for_a_1080p_screen() {
        assert_eq!(axis_bounds(1920, 280, 50), (190, 1730));
        assert_eq!(axis_bounds(1080, 120, 50), (110, 970));
        assert_eq!(axis_bounds(300, 280, 50), (150, 150));
        assert_eq!(vertical_bounds(1080, 120, 50), (110, 960));
        assert_eq!(vertical_bounds(240, 120, 50), (110, 120));
        assert_eq!(vertical_bounds(200, 120, 50), (100, 100));
    }

    #[test]
    fn candidate_is_clamped_into_bounds() {
        let fx = Fixture::new(dark(800, 600), FloatMap::new(800, 600));
        let result = fx.assembler(Tier::Fast).assemble(
            Some(Candidate {
                center: (5, 590),
                size: 10.0,
                score: 1.0,
            }),
            &[],
            0.0,
        );
        assert_eq!(result.center, (190, 480));
        assert_eq!(result.square_size, 30);
        assert!(!result.fallback);
        assert_eq!(
            result.suggested_clock_position,
            ClockPosition { x: 190, y: 480 }
        );
    }

    #[test]
    fn extreme_footprint_collapses_to_the_midpoint() {
        let mut fx = Fixture::new(dark(640, 480), FloatMap::new(640, 480));
        fx.options.footprint = Footprint {
            width: u32::MAX,
            height: u32::MAX,
            margin: u32::MAX,
        };
        let candidate = Some(Candidate {
            center: (600, 20),
            size: 50.0,
            score: 1.0,
        });
        let result = fx.assembler(Tier::Full).assemble(candidate, &[], 0.0);
        assert_eq!(result.center, (320, 240));
        assert!(result.coordinates.2 <= 640 && result.coordinates.3 <= 480);
    }

    #[test]
    fn missing_candidate_falls_back_to_the_center() {
        let fx = Fixture::new(dark(800, 600), FloatMap::new(800, 600));
        let result = fx.assembler(Tier::Full).assemble(None, &[], 0.0);
        assert!(result.fallback);
        assert_eq!(result.center, (400, 300));
        assert_eq!(result.square_size, 30);
        assert_eq!(result.coordinates, (385, 285, 415, 315));
    }

    #[test]
    fn busy_position_is_repaired_by_the_full_tier() {
        // Busy everywhere left of x = 600.
        let cost = FloatMap::from_fn(800, 600, |x, _| if x < 600 { 1.0 } else { 0.0 });
        let fx = Fixture::new(dark(800, 600), cost);
        let candidate = Some(Candidate {
            center: (480, 300),
            size: 40.0,
            score: 1.0,
        });

        let full = fx.assembler(Tier::Full).assemble(candidate, &[], 0.5);
        assert!(full.complexity_avoidance.repaired);
        assert!(full.center.0 > 480);
        assert!(
            full.complexity_avoidance.final_complexity_score
                < full.complexity_avoidance.initial_complexity_score
        );

        let fast = fx.assembler(Tier::Fast).assemble(candidate, &[], 0.5);
        assert!(!fast.complexity_avoidance.repaired);
        assert_eq!(fast.center, (480, 300));
    }

    #[test]
    fn background_flags_follow_brightness() {
        let bright = BackgroundAnalysis::from_samples(&[0.9; 16]);
        assert!(bright.is_bright_background && !bright.is_dark_background && bright.is_uniform);

        let dark = BackgroundAnalysis::from_samples(&[0.1, 0.1, 0.2, 0.2]);
        assert!(dark.is_dark_background);
        assert!((dark.brightness_25 - 0.1).abs() < 1e-6);

        let empty = BackgroundAnalysis::from_samples(&[]);
        assert!((empty.average_brightness - NEUTRAL_BRIGHTNESS).abs() < 1e-6);
    }

    #[test]
    fn background_analysis_can_be_disabled() {
        let mut fx = Fixture::new(dark(640, 480), FloatMap::new(640, 480));
        fx.options.background_analysis = false;
        let result = fx.assembler(Tier::UltraFast).assemble(None, &[], 0.0);
        assert!(result.background_analysis.is_none());
        assert!(result.analysis.is_dark_background);
    }

    #[test]
    fn logos_are_reported_at_original_resolution() {
        let image = dark(1600, 1200);
        let working = Preprocessor::bounded(800).prepare(&image).unwrap();
        let cost = CostMapBuilder::minimal().build(&working.pixels);
        let options = AnalysisOptions::default();
        let logo = LogoRegion {
            bbox: crate::logo::BoundingBox {
                x: 100,
                y: 50,
                width: 20,
                height: 10,
            },
            centroid: (110.0, 55.0),
            area: 200.0,
            solidity: 1.0,
        };
        let result = ResultAssembler {
            image: &image,
            working: &working,
            cost: &cost,
            options: &options,
            tier: Tier::Full,
        }
        .assemble(None, &[logo], 0.0);
        assert_eq!(result.logos[0].bbox.x, 200);
        assert_eq!(result.logos[0].bbox.width, 40);
    }

    #[test]
    fn debug_text_and_json_carry_the_renderer_fields() {
        let fx = Fixture::new(dark(800, 600), FloatMap::new(800, 600));
        let result = fx.assembler(Tier::Full).assemble(None, &[], 0.25);
        let text = result.to_debug_text();
        assert!(text.starts_with("--- RESULT ---\n"));
        assert!(text.contains("center: (400, 300)"));
        assert!(text.contains("algorithm: original"));

        let json: serde_json::Value = serde_json::from_str(&result.to_json().unwrap()).unwrap();
        assert_eq!(json["suggested_clock_position"]["x"], 400);
        assert_eq!(json["analysis"]["is_dark_background"], true);
        assert_eq!(json["algorithm"], "original");
        assert_eq!(json["center"][1], 300);
    }
}
