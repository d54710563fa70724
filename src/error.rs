//! Error types for the widget-placement crate.

use std::path::PathBuf;

/// Errors that can occur while loading, analysing or persisting a placement.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The source image does not exist.
    #[error("file not found: {}", .0.display())]
    InputNotFound(PathBuf),

    /// The source image could not be decoded.
    #[error("could not load image: {0}")]
    Image(#[from] image::ImageError),

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The image has no pixels to analyse.
    #[error("image has no pixels ({width}x{height})")]
    EmptyImage {
        /// Image width in pixels.
        width: u32,
        /// Image height in pixels.
        height: u32,
    },

    /// The configured algorithm does not name an available fidelity tier.
    #[error("unknown placement algorithm {0:?} (expected original, fast or ultra_fast)")]
    UnknownAlgorithm(String),

    /// The result artifact could not be serialized or parsed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A specialized `Result` type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
