//! Error types for the gridding crate.

use thiserror::Error;

use radar_common::RadarError;

/// Errors that can occur while producing grid products.
#[derive(Error, Debug)]
pub enum GriddingError {
    /// The input volume could not be decoded.
    #[error("failed to read volume: {0}")]
    Read(String),

    /// The volume lacks fields the pipeline cannot work without.
    #[error("unusable volume: {0}")]
    Normalization(String),

    /// The engine could not grid the volume (e.g. no valid gates).
    #[error("interpolation failed: {0}")]
    Interpolation(String),

    /// The product could not be persisted.
    #[error("failed to write grid: {0}")]
    Write(String),

    /// The backend needed for this operation is not compiled in.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Filesystem error around output directories and files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid data model value.
    #[error(transparent)]
    Model(#[from] RadarError),
}

impl GriddingError {
    /// Create a Read error.
    pub fn read(msg: impl Into<String>) -> Self {
        Self::Read(msg.into())
    }

    /// Create an Interpolation error.
    pub fn interpolation(msg: impl Into<String>) -> Self {
        Self::Interpolation(msg.into())
    }

    /// Create a Write error.
    pub fn write(msg: impl Into<String>) -> Self {
        Self::Write(msg.into())
    }
}

/// Result type for gridding operations.
pub type Result<T> = std::result::Result<T, GriddingError>;
