//! Tier selection and delegation.

use std::path::{Path, PathBuf};

use image::RgbImage;

use crate::config::Config;
use crate::engine::{engine_for, Analysis, AnalysisOptions, Footprint, PlacementEngine, Tier};
use crate::error::{Error, Result};
use crate::result::PlacementResult;

/// Outcome for one image of a batch.
#[derive(Debug)]
pub struct BatchResult {
    /// Source image.
    pub path: PathBuf,
    /// Placement, or why there is none.
    pub outcome: Result<PlacementResult>,
}

/// Routes analyses to the configured tier.
///
/// The dispatcher does no image analysis itself. An unknown tier name fails
/// every call with [`Error::UnknownAlgorithm`]; no other tier is substituted.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    config: Config,
    footprint: Footprint,
}

impl Dispatcher {
    /// Create a dispatcher.
    #[must_use]
    pub fn new(config: Config, footprint: Footprint) -> Self {
        Self { config, footprint }
    }

    /// The configuration in use.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The configured tier.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownAlgorithm`] if `ALGORITHM` names no tier.
    pub fn tier(&self) -> Result<Tier> {
        Tier::from_name(&self.config.algorithm)
    }

    /// Options passed to the engine.
    #[must_use]
    pub fn options(&self) -> AnalysisOptions {
        self.config.analysis_options(self.footprint)
    }

    /// Analyze a decoded image.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownAlgorithm`] for an unknown tier, or whatever the
    /// engine reports.
    pub fn analyze_image(&self, image: &RgbImage) -> Result<Analysis> {
        let engine = engine_for(self.tier()?);
        self.run(engine.as_ref(), image)
    }

    /// Load and analyze an image file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InputNotFound`] for a missing file, [`Error::Image`] if
    /// it cannot be decoded, [`Error::UnknownAlgorithm`] for an unknown tier.
    pub fn analyze_path(&self, path: &Path) -> Result<Analysis> {
        let engine = engine_for(self.tier()?);
        let image = load_image(path)?;
        self.run(engine.as_ref(), &image)
    }

    /// Analyze several independent images.
    ///
    /// Runs in parallel when the `parallel` feature is enabled (via rayon). Results
    /// keep the order of `paths`.
    #[must_use]
    pub fn analyze_batch(&self, paths: &[PathBuf]) -> Vec<BatchResult> {
        let engine = match self.tier() {
            Ok(tier) => engine_for(tier),
            Err(_) => {
                return paths
                    .iter()
                    .map(|p| BatchResult {
                        path: p.clone(),
                        outcome: Err(Error::UnknownAlgorithm(self.config.algorithm.clone())),
                    })
                    .collect();
            }
        };
        let engine = engine.as_ref();
        let one = |path: &PathBuf| BatchResult {
            path: path.clone(),
            outcome: load_image(path)
                .and_then(|image| self.run(engine, &image))
                .map(|analysis| analysis.result),
        };

        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;
            paths.par_iter().map(one).collect()
        }

        #[cfg(not(feature = "parallel"))]
        {
            paths.iter().map(one).collect()
        }
    }

    fn run(&self, engine: &dyn PlacementEngine, image: &RgbImage) -> Result<Analysis> {
        tracing::debug!(
            "dispatch: {} on {}x{}",
            engine.tier(),
            image.width(),
            image.height()
        );
        engine.analyze(image, &self.options())
    }
}

/// Decode an image file to RGB.
///
/// # Errors
///
/// Returns [`Error::InputNotFound`] for a missing file and [`Error::Image`]
/// if it cannot be decoded.
pub fn load_image(path: &Path) -> Result<RgbImage> {
    if !path.exists() {
        return Err(Error::InputNotFound(path.to_path_buf()));
    }
    Ok(image::open(path)?.to_rgb8())
}
