//! Manifest loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::{Manifest, ManifestDocument};
use crate::error::ManifestError;

/// Error type for manifest loading.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported manifest format: {0:?}")]
    UnsupportedFormat(String),

    #[error("Validation failed: {0}")]
    Manifest(#[from] ManifestError),
}

impl Manifest {
    /// Decode and validate a TOML manifest.
    pub fn from_toml_str(content: &str) -> Result<Manifest, LoadError> {
        let doc: ManifestDocument = toml::from_str(content)?;
        Ok(Manifest::try_from(doc)?)
    }

    /// Decode and validate a JSON manifest.
    pub fn from_json_str(content: &str) -> Result<Manifest, LoadError> {
        let doc: ManifestDocument = serde_json::from_str(content)?;
        Ok(Manifest::try_from(doc)?)
    }
}

/// Load and validate a manifest file. The format follows the extension
/// (`.toml` or `.json`).
pub fn load_manifest(path: &Path) -> Result<Manifest, LoadError> {
    let content = fs::read_to_string(path)?;
    match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => Manifest::from_toml_str(&content),
        Some("json") => Manifest::from_json_str(&content),
        other => Err(LoadError::UnsupportedFormat(other.unwrap_or_default().to_string())),
    }
}
