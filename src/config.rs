//! `key=value` configuration file.
//!
//! ```text
//! # Placement algorithm: original, fast or ultra_fast
//! ALGORITHM=fast
//! ENABLE_COMPLEXITY_AVOIDANCE=true
//! ```
//!
//! Blank lines and `#` comments are ignored, as are unknown keys. Lines
//! without `=`, with an empty key or with a non-boolean value for a boolean
//! key are skipped with a warning.

use std::fmt;
use std::path::Path;

use crate::engine::{AnalysisOptions, Footprint};
use crate::error::Result;

const ALGORITHM: &str = "ALGORITHM";
const COMPLEXITY_AVOIDANCE: &str = "ENABLE_COMPLEXITY_AVOIDANCE";
const BACKGROUND_ANALYSIS: &str = "ENABLE_BACKGROUND_ANALYSIS";
const POSITION_CACHING: &str = "ENABLE_POSITION_CACHING";
const PREFER_UPPER: &str = "PREFER_UPPER_POSITIONS";
const AVOID_CENTER_LOGO: &str = "AVOID_CENTER_LOGO";
const RULE_OF_THIRDS: &str = "USE_RULE_OF_THIRDS";
const DEBUG_OUTPUT: &str = "ENABLE_DEBUG_OUTPUT";
const SAVE_DEBUG_IMAGES: &str = "SAVE_DEBUG_IMAGES";

/// Tier used when the file does not name one.
pub const DEFAULT_ALGORITHM: &str = "ultra_fast";

/// Dispatcher configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Tier name, resolved by the dispatcher.
    pub algorithm: String,
    /// Penalize busy positions; enables the repair pass.
    pub complexity_avoidance: bool,
    /// Report brightness statistics under the widget.
    pub background_analysis: bool,
    /// Reuse the previous artifact for an unchanged image.
    pub position_caching: bool,
    /// Prefer the upper part of the image.
    pub prefer_upper: bool,
    /// Detect logos and steer around them.
    pub avoid_center_logo: bool,
    /// Favour rule-of-thirds positions.
    pub rule_of_thirds: bool,
    /// Raise the log level to debug.
    pub debug_output: bool,
    /// Write the cost and aesthetic maps next to the artifact.
    pub save_debug_images: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            algorithm: DEFAULT_ALGORITHM.to_string(),
            complexity_avoidance: true,
            background_analysis: true,
            position_caching: false,
            prefer_upper: true,
            avoid_center_logo: true,
            rule_of_thirds: true,
            debug_output: false,
            save_debug_images: false,
        }
    }
}

impl Config {
    /// Parse configuration text on top of the defaults.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let mut config = Self::default();
        for (index, raw) in text.lines().enumerate() {
            let line_no = index + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                tracing::warn!("config: line {line_no}: expected KEY=VALUE, skipping {line:?}");
                continue;
            };
            let key = key.trim();
            let value = unquote(value.trim());
            if key.is_empty() {
                tracing::warn!("config: line {line_no}: empty key, skipping");
                continue;
            }

            if key == ALGORITHM {
                config.algorithm = value.to_string();
                continue;
            }
            let Some(slot) = config.flag_mut(key) else {
                tracing::debug!("config: line {line_no}: ignoring unknown key {key}");
                continue;
            };
            match parse_bool(value) {
                Some(b) => *slot = b,
                None => {
                    tracing::warn!(
                        "config: line {line_no}: {key} expects true or false, got {value:?}"
                    );
                }
            }
        }
        config
    }

    /// Load from a file. A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Io`] if the file exists but cannot be read.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("config: {} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        Ok(Self::parse(&text))
    }

    /// Write in the same `key=value` format, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Io`] if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, self.to_string())?;
        Ok(())
    }

    /// Analysis options for the given footprint.
    #[must_use]
    pub fn analysis_options(&self, footprint: Footprint) -> AnalysisOptions {
        AnalysisOptions {
            footprint,
            complexity_avoidance: self.complexity_avoidance,
            background_analysis: self.background_analysis,
            prefer_upper: self.prefer_upper,
            avoid_logos: self.avoid_center_logo,
            rule_of_thirds: self.rule_of_thirds,
        }
    }

    fn flags(&self) -> [(&'static str, bool); 8] {
        [
            (COMPLEXITY_AVOIDANCE, self.complexity_avoidance),
            (BACKGROUND_ANALYSIS, self.background_analysis),
            (POSITION_CACHING, self.position_caching),
            (PREFER_UPPER, self.prefer_upper),
            (AVOID_CENTER_LOGO, self.avoid_center_logo),
            (RULE_OF_THIRDS, self.rule_of_thirds),
            (DEBUG_OUTPUT, self.debug_output),
            (SAVE_DEBUG_IMAGES, self.save_debug_images),
        ]
    }

    fn flag_mut(&mut self, key: &str) -> Option<&mut bool> {
        match key {
            COMPLEXITY_AVOIDANCE => Some(&mut self.complexity_avoidance),
            BACKGROUND_ANALYSIS => Some(&mut self.background_analysis),
            POSITION_CACHING => Some(&mut self.position_caching),
            PREFER_UPPER => Some(&mut self.prefer_upper),
            AVOID_CENTER_LOGO => Some(&mut self.avoid_center_logo),
            RULE_OF_THIRDS => Some(&mut self.rule_of_thirds),
            DEBUG_OUTPUT => Some(&mut self.debug_output),
            SAVE_DEBUG_IMAGES => Some(&mut self.save_debug_images),
            _ => None,
        }
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "# Placement algorithm: original, fast or ultra_fast")?;
        writeln!(f, "{ALGORITHM}={}", self.algorithm)?;
        for (key, value) in self.flags() {
            writeln!(f, "{key}={value}")?;
        }
        Ok(())
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    if value.eq_ignore_ascii_case("true") {
        Some(true)
    } else if value.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

/// Strip one pair of matching surrounding quotes.
fn unquote(value: &str) -> &str {
    for q in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(q) && value.ends_with(q) {
            return &value[1..value.len() - 1];
        }
    }
    value
}
