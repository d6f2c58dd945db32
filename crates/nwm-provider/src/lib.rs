//! Query pipeline for National Water Model datasets.
//!
//! The pipeline runs fetch, project, encode:
//!
//! ```text
//!   QueryParams ──► fetch (variable selection, single-feature
//!                   short-circuit, time narrowing, spatial narrowing,
//!                   pagination, one load)
//!               ──► project (storage CRS to output CRS)
//!               ──► encode (CoverageJSON or GeoJSON)
//! ```
//!
//! [`NwmProvider`] ties the stages to one configured dataset and exposes
//! them through the [`EdrQueries`] and [`FeatureQueries`] traits.

pub mod bbox;
pub mod config;
pub mod crs;
pub mod encode;
pub mod error;
pub mod fetch;
pub mod project;
pub mod provider;
pub mod query;
pub mod spatial;
pub mod time_range;

pub use bbox::BoundingBox;
pub use config::{BboxPolicy, DatetimePolicy, ProviderConfig};
pub use crs::{detect_storage_crs, Crs};
pub use error::{ProviderError, Result};
pub use fetch::fetch;
pub use project::{project_dataset, PointTransformer};
pub use provider::{
    CoverageResponse, EdrQueries, FeatureQueries, FieldInfo, NwmProvider,
};
pub use query::QueryParams;
pub use time_range::DatetimeFilter;
