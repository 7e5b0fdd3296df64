//! Grid production pipeline for radar volumes.
//!
//! For one input volume the pipeline normalizes its fields, then for each
//! grid spec of the catalog resolves the output path, grids the volume,
//! post-processes the product and persists it. Specs fail independently.
//!
//! # Architecture
//!
//! ```text
//! WorkItem
//!      │
//!      ▼
//! VolumeReader::read ──► normalize (FieldPolicy)
//!      │
//!      └─► for each GridSpec
//!               │
//!               ├─► resolver::resolve ──► exists? ──► SkippedExists
//!               │
//!               ├─► GriddingEngine::grid (MaskPolicy)
//!               │
//!               ├─► postprocess::finalize
//!               │
//!               └─► GridWriter::write + append_fields ──► publish
//! ```
//!
//! The NetCDF backend (CfRadial and ODIM_H5 readers, grid writer) is the
//! default `netcdf` feature. Built with `--no-default-features`,
//! [`default_reader`] and [`default_writer`] return a backend that reports
//! every call as unavailable.

pub mod barnes;
pub mod collab;
pub mod error;
#[cfg(feature = "netcdf")]
pub mod netcdf_io;
pub mod normalize;
pub mod outcome;
pub mod pipeline;
pub mod postprocess;
pub mod projection;
pub mod resolver;

// Re-export commonly used types at crate root
pub use barnes::BarnesEngine;
pub use collab::{
    default_reader, default_writer, GridWriter, GriddingEngine, MaskPolicy, UnavailableBackend,
    VolumeReader, WriteOptions,
};
pub use error::{GriddingError, Result};
pub use normalize::{normalize, FieldPolicy, NormalizationReport};
pub use outcome::{ItemReport, SpecOutcome};
pub use pipeline::{run_item, Pipeline};
