//! Error kinds surfaced by the compression pipeline.
//!
//! Construction failures are typed so the caller decides whether a condition
//! aborts the run or is skipped. End of stream is never an error: sources
//! return `Ok(None)` from `read()`.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Source path or external binary does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Decoder or probe output could not be interpreted.
    #[error("format error: {0}")]
    Format(String),

    /// The source reports unusable geometry (zero width/height).
    #[error("invalid source: {0}")]
    InvalidSource(String),

    /// Inconsistent configuration or input layout (e.g. numbering gaps).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Container layout or checksum failure.
    #[error("corrupt container {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Toml(#[from] toml::de::Error),
}

impl Error {
    pub(crate) fn not_found(path: impl AsRef<std::path::Path>) -> Self {
        Error::NotFound(path.as_ref().display().to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
