//! The JSON document handed to the renderer.
//!
//! The artifact is the [`PlacementResult`] plus a fingerprint of the source
//! image, so an unchanged wallpaper can reuse the previous placement. It is
//! written to a temporary sibling and renamed into place; readers never see a
//! partial document.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::engine::{AnalysisOptions, Tier};
use crate::error::{Error, Result};
use crate::result::PlacementResult;

/// Artifact location below the config directory.
const ARTIFACT_RELATIVE: [&str; 3] = ["hypr", "colorgen", "empty_areas.json"];
/// Configuration location below the config directory.
const CONFIG_RELATIVE: [&str; 3] = ["hypr", "empty_area", "config.conf"];

/// Identifies the inputs a placement was computed from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFingerprint {
    /// Source image path.
    pub path: PathBuf,
    /// File size in bytes.
    pub len: u64,
    /// Modification time, whole seconds since the Unix epoch.
    pub modified_secs: u64,
    /// Sub-second part of the modification time.
    pub modified_nanos: u32,
    /// Tier used.
    pub algorithm: Tier,
    /// Footprint and flags the placement was computed with.
    pub options: AnalysisOptions,
}

impl SourceFingerprint {
    /// Fingerprint an image file for a given tier and set of options.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InputNotFound`] if the file does not exist, or
    /// [`Error::Io`] if its metadata cannot be read.
    pub fn of(path: &Path, algorithm: Tier, options: &AnalysisOptions) -> Result<Self> {
        if !path.exists() {
            return Err(Error::InputNotFound(path.to_path_buf()));
        }
        let meta = std::fs::metadata(path)?;
        let modified = meta
            .modified()?
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Ok(Self {
            path: std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf()),
            len: meta.len(),
            modified_secs: modified.as_secs(),
            modified_nanos: modified.subsec_nanos(),
            algorithm,
            options: options.clone(),
        })
    }
}

/// A persisted placement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacementArtifact {
    /// What the placement was computed from.
    pub source: SourceFingerprint,
    /// The placement itself, flattened into the top-level object.
    #[serde(flatten)]
    pub result: PlacementResult,
}

impl PlacementArtifact {
    /// Pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write atomically, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization, writing or the final rename fails.
    pub fn write(&self, path: &Path) -> Result<()> {
        let json = self.to_json()?;
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        if !dir.exists() {
            std::fs::create_dir_all(&dir)?;
        }

        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(json.as_bytes())?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| Error::Io(e.error))?;

        tracing::debug!("artifact: wrote {}", path.display());
        Ok(())
    }

    /// Read an artifact.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be read or [`Error::Json`] if
    /// it is not a valid artifact.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// The artifact at `path`, if it exists, parses and matches `fingerprint`.
    #[must_use]
    pub fn load_cached(path: &Path, fingerprint: &SourceFingerprint) -> Option<Self> {
        if !path.exists() {
            return None;
        }
        match Self::load(path) {
            Ok(artifact) if artifact.source == *fingerprint => Some(artifact),
            Ok(_) => {
                tracing::debug!("artifact: {} is stale", path.display());
                None
            }
            Err(e) => {
                tracing::warn!("artifact: ignoring unreadable {}: {e}", path.display());
                None
            }
        }
    }
}

/// `$XDG_CONFIG_HOME`, or `~/.config` when it is unset or empty.
#[must_use]
pub fn config_home() -> Option<PathBuf> {
    match std::env::var_os("XDG_CONFIG_HOME") {
        Some(dir) if !dir.is_empty() => Some(PathBuf::from(dir)),
        _ => dirs::home_dir().map(|home| home.join(".config")),
    }
}

fn under_config_home(parts: &[&str]) -> PathBuf {
    let mut path = config_home().unwrap_or_else(|| PathBuf::from("."));
    path.extend(parts);
    path
}

/// Where the renderer expects the artifact.
#[must_use]
pub fn default_artifact_path() -> PathBuf {
    under_config_home(&ARTIFACT_RELATIVE)
}

/// Where the configuration file lives by default.
#[must_use]
pub fn default_config_path() -> PathBuf {
    under_config_home(&CONFIG_RELATIVE)
}
