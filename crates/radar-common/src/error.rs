//! Error types for the radar data model.

use thiserror::Error;

/// Result type alias using RadarError.
pub type RadarResult<T> = Result<T, RadarError>;

/// Errors raised while building or validating data model values.
#[derive(Debug, Error)]
pub enum RadarError {
    // === Date handling ===
    #[error("Invalid date '{0}': expected YYYYMMDD")]
    InvalidDate(String),

    #[error("End date {end} is older than start date {start}")]
    EndBeforeStart { start: String, end: String },

    // === Data model ===
    #[error("Shape mismatch: expected {expected} values, found {found}")]
    ShapeMismatch { expected: usize, found: usize },

    #[error("Invalid grid specification '{name}': {message}")]
    InvalidGridSpec { name: String, message: String },

    #[error("Volume has no rays")]
    EmptyVolume,

    // === Catalog files ===
    #[error("Failed to read catalog: {0}")]
    CatalogRead(String),

    #[error("Failed to parse catalog: {0}")]
    CatalogParse(String),
}

impl From<serde_yaml::Error> for RadarError {
    fn from(err: serde_yaml::Error) -> Self {
        RadarError::CatalogParse(err.to_string())
    }
}
