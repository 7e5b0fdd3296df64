//! Common types shared by the radar gridding crates and services.
//!
//! - [`field`]: typed field arrays and attribute maps
//! - [`volume`]: polar radar volumes as handed over by a volume reader
//! - [`product`]: Cartesian grid products produced by a gridding engine
//! - [`grid`]: the grid specification catalog and file naming conventions
//! - [`time`]: calendar-day ranges for batch runs
//! - [`work`]: work items exchanged between scheduler and workers

pub mod error;
pub mod field;
pub mod grid;
pub mod product;
pub mod time;
pub mod volume;
pub mod work;

pub use error::{RadarError, RadarResult};
pub use field::{AttrValue, Attributes, DataType, Field, FieldMap, FieldValues};
pub use grid::{GridCatalog, GridSpec, NamingConvention, Roi, WeightingFunction};
pub use product::GridProduct;
pub use time::DateRange;
pub use volume::{RadarSite, RadarVolume};
pub use work::WorkItem;
