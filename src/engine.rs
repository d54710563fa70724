//! Fidelity tiers and the shared analysis pipeline.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::aesthetic::{build_aesthetic_map, AestheticParams};
use crate::cost::{CostMap, CostMapBuilder};
use crate::error::{Error, Result};
use crate::logo::{detect_logos, LogoRegion};
use crate::matrix::FloatMap;
use crate::preprocess::{Preprocessor, WorkingImage};
use crate::result::{PlacementResult, ResultAssembler};
use crate::search::{permissible_mask, Candidate, DistanceSearch, SampledSearch, SearchContext};

/// Working side of the full-fidelity tier.
const FULL_MAX_SIDE: u32 = 800;
/// Working side of the fast tier.
const FAST_MAX_SIDE: u32 = 480;
/// Working side of the ultra-fast tier, before the extra factor.
const ULTRA_FAST_MAX_SIDE: u32 = 400;
const ULTRA_FAST_EXTRA_FACTOR: f32 = 0.5;
/// Percentile used for the scene-level clean ratio.
const SCENE_PERMISSIBLE_PERCENTILE: f32 = 60.0;

/// Placement algorithm, trading accuracy for latency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tier {
    /// Distance transform over the full cost map.
    #[serde(rename = "original")]
    Full,
    /// Strategic points and a coarse grid.
    #[serde(rename = "fast")]
    Fast,
    /// Strategic points only, at a very small working size.
    #[serde(rename = "ultra_fast")]
    UltraFast,
}

impl Tier {
    /// Every tier, fastest last.
    pub const ALL: [Self; 3] = [Self::Full, Self::Fast, Self::UltraFast];

    /// Configuration name of the tier.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Full => "original",
            Self::Fast => "fast",
            Self::UltraFast => "ultra_fast",
        }
    }

    /// Resolve a configuration name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownAlgorithm`] for anything but `original`, `fast`
    /// or `ultra_fast`.
    pub fn from_name(name: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.name() == name.trim())
            .ok_or_else(|| Error::UnknownAlgorithm(name.to_string()))
    }
}

impl FromStr for Tier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_name(s)
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// On-screen size of the widget, in original pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Footprint {
    /// Widget width.
    pub width: u32,
    /// Widget height.
    pub height: u32,
    /// Minimum gap between the widget and the screen edge.
    pub margin: u32,
}

impl Default for Footprint {
    fn default() -> Self {
        Self {
            width: 280,
            height: 120,
            margin: 50,
        }
    }
}

/// Options controlling a single analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisOptions {
    /// Widget footprint.
    pub footprint: Footprint,
    /// Penalize busy positions and run the repair pass.
    pub complexity_avoidance: bool,
    /// Report brightness statistics under the footprint.
    pub background_analysis: bool,
    /// Prefer the upper part of the image.
    pub prefer_upper: bool,
    /// Detect logos and steer around them.
    pub avoid_logos: bool,
    /// Favour rule-of-thirds and golden-ratio positions.
    pub rule_of_thirds: bool,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            footprint: Footprint::default(),
            complexity_avoidance: true,
            background_analysis: true,
            prefer_upper: true,
            avoid_logos: true,
            rule_of_thirds: true,
        }
    }
}

/// Output of one analysis: the result plus the intermediate maps.
#[derive(Debug, Clone)]
pub struct Analysis {
    /// The placement.
    pub result: PlacementResult,
    /// Cost map at working resolution.
    pub cost: CostMap,
    /// Aesthetic map, for tiers that build one.
    pub aesthetic: Option<FloatMap>,
}

impl Analysis {
    /// Write the intermediate maps as 8-bit PNGs into `dir`.
    ///
    /// Files are named `<stem>_cost.png` and `<stem>_aesthetic.png`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or a file cannot be written.
    pub fn save_debug_images(&self, dir: &Path, stem: &str) -> Result<Vec<PathBuf>> {
        if !dir.exists() {
            std::fs::create_dir_all(dir)?;
        }
        let mut written = Vec::with_capacity(2);

        let cost_path = dir.join(format!("{stem}_cost.png"));
        self.cost.values().to_gray_image().save(&cost_path)?;
        written.push(cost_path);

        if let Some(aesthetic) = &self.aesthetic {
            let path = dir.join(format!("{stem}_aesthetic.png"));
            aesthetic.to_gray_image().save(&path)?;
            written.push(path);
        }
        Ok(written)
    }
}

/// A placement strategy.
///
/// Implementations are stateless, so one instance can serve many images,
/// including from several threads.
pub trait PlacementEngine: Send + Sync {
    /// The tier this engine implements.
    fn tier(&self) -> Tier;

    /// Analyze one image.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyImage`] for images without pixels.
    fn analyze(&self, image: &RgbImage, options: &AnalysisOptions) -> Result<Analysis>;
}

/// Construct the engine for a tier.
#[must_use]
pub fn engine_for(tier: Tier) -> Box<dyn PlacementEngine> {
    match tier {
        Tier::Full => Box::new(FullFidelityEngine::default()),
        Tier::Fast => Box::new(SampledEngine::fast()),
        Tier::UltraFast => Box::new(SampledEngine::ultra_fast()),
    }
}

/// Distance transform over the full cost map, with an aesthetic map.
#[derive(Debug, Clone)]
pub struct FullFidelityEngine {
    preprocessor: Preprocessor,
    costs: CostMapBuilder,
    search: DistanceSearch,
}

impl Default for FullFidelityEngine {
    fn default() -> Self {
        Self {
            preprocessor: Preprocessor::bounded(FULL_MAX_SIDE),
            costs: CostMapBuilder::full(),
            search: DistanceSearch::default(),
        }
    }
}

impl PlacementEngine for FullFidelityEngine {
    fn tier(&self) -> Tier {
        Tier::Full
    }

    fn analyze(&self, image: &RgbImage, options: &AnalysisOptions) -> Result<Analysis> {
        run_pipeline(
            Tier::Full,
            &self.preprocessor,
            &self.costs,
            image,
            options,
            |working, cost, ctx| {
                let params = AestheticParams {
                    prefer_upper: options.prefer_upper,
                    use_rule_of_thirds: options.rule_of_thirds,
                    ..AestheticParams::default()
                };
                let aesthetic = build_aesthetic_map(&working.pixels, ctx.logos, &params);
                let candidate = self.search.search(cost, &aesthetic, ctx);
                (candidate, Some(aesthetic))
            },
        )
    }
}

/// Sampled search at reduced resolution (fast and ultra-fast tiers).
#[derive(Debug, Clone)]
pub struct SampledEngine {
    tier: Tier,
    preprocessor: Preprocessor,
    costs: CostMapBuilder,
    search: SampledSearch,
}

impl SampledEngine {
    /// Fast tier: 480 px working side, banded cost map, grid scan.
    #[must_use]
    pub const fn fast() -> Self {
        Self {
            tier: Tier::Fast,
            preprocessor: Preprocessor::bounded(FAST_MAX_SIDE),
            costs: CostMapBuilder::fast(),
            search: SampledSearch::fast(),
        }
    }

    /// Ultra-fast tier: 400 px working side halved again, binary gradient cost map.
    #[must_use]
    pub const fn ultra_fast() -> Self {
        Self {
            tier: Tier::UltraFast,
            preprocessor: Preprocessor::bounded(ULTRA_FAST_MAX_SIDE)
                .compounded(ULTRA_FAST_EXTRA_FACTOR),
            costs: CostMapBuilder::minimal(),
            search: SampledSearch::ultra_fast(),
        }
    }
}

impl PlacementEngine for SampledEngine {
    fn tier(&self) -> Tier {
        self.tier
    }

    fn analyze(&self, image: &RgbImage, options: &AnalysisOptions) -> Result<Analysis> {
        run_pipeline(
            self.tier,
            &self.preprocessor,
            &self.costs,
            image,
            options,
            |_, cost, ctx| (self.search.search(cost, ctx), None),
        )
    }
}

/// Preprocess, build the cost map, detect logos, search and assemble.
#[allow(clippy::cast_precision_loss)]
fn run_pipeline<F>(
    tier: Tier,
    preprocessor: &Preprocessor,
    costs: &CostMapBuilder,
    image: &RgbImage,
    options: &AnalysisOptions,
    search: F,
) -> Result<Analysis>
where
    F: FnOnce(&WorkingImage, &CostMap, &SearchContext<'_>) -> (Option<Candidate>, Option<FloatMap>),
{
    let working = preprocessor.prepare(image)?;
    let cost = costs.build(&working.pixels);

    let logos: Vec<LogoRegion> = if options.avoid_logos {
        detect_logos(&cost)
    } else {
        Vec::new()
    };

    let ctx = SearchContext {
        footprint_width: options.footprint.width as f32 * working.scale,
        footprint_height: options.footprint.height as f32 * working.scale,
        prefer_upper: options.prefer_upper,
        complexity_avoidance: options.complexity_avoidance,
        logos: &logos,
    };
    let (candidate, aesthetic) = search(&working, &cost, &ctx);

    let scene = cost.scene_complexity(&permissible_mask(&cost, SCENE_PERMISSIBLE_PERCENTILE));
    let result = ResultAssembler {
        image,
        working: &working,
        cost: &cost,
        options,
        tier,
    }
    .assemble(candidate, &logos, scene);

    tracing::debug!(
        "engine: {tier} placed widget at {:?} (size {}, fallback {})",
        result.center,
        result.square_size,
        result.fallback
    );

    Ok(Analysis {
        result,
        cost,
        aesthetic,
    })
}
