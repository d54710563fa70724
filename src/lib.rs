//! Find the calmest, best-composed spot on a wallpaper for a fixed-size widget.
//!
//! The engine scores every location of a still image for visual complexity
//! (edges, colour gradients, structured texture), detects logo-like blobs,
//! builds a composition-aware desirability map, and picks a center where a
//! widget footprint fits on a calm background. Three fidelity tiers trade
//! accuracy for latency; all of them keep the widget fully on screen.
//!
//! # Quick Start
//!
//! ```no_run
//! use widget_placement::{engine_for, AnalysisOptions, Tier};
//!
//! let img = image::open("wallpaper.png").unwrap().to_rgb8();
//! let analysis = engine_for(Tier::Full)
//!     .analyze(&img, &AnalysisOptions::default())
//!     .expect("image has pixels");
//! println!("{}", analysis.result.to_debug_text());
//! ```
//!
//! # Configuration
//!
//! The [`Dispatcher`] reads a `key=value` [`Config`] and routes to the
//! configured tier. An unknown tier name is an error, never a silent fallback.
//!
//! ```no_run
//! use std::path::Path;
//! use widget_placement::{default_config_path, Config, Dispatcher, Footprint};
//!
//! let config = Config::load(&default_config_path()).unwrap();
//! let dispatcher = Dispatcher::new(config, Footprint::default());
//! let analysis = dispatcher.analyze_path(Path::new("wallpaper.png")).unwrap();
//! println!("{}", analysis.result.to_json().unwrap());
//! ```

#![deny(missing_docs)]

pub mod aesthetic;
pub mod artifact;
pub mod config;
pub mod cost;
mod dispatch;
mod engine;
pub mod error;
pub mod logo;
pub mod matrix;
pub mod preprocess;
pub mod result;
pub mod search;

pub use artifact::{
    default_artifact_path, default_config_path, PlacementArtifact, SourceFingerprint,
};
pub use config::Config;
pub use dispatch::{load_image, BatchResult, Dispatcher};
pub use engine::{
    engine_for, Analysis, AnalysisOptions, Footprint, FullFidelityEngine, PlacementEngine,
    SampledEngine, Tier,
};
pub use error::{Error, Result};
pub use result::PlacementResult;
