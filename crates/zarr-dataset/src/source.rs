//! The data source seam between providers and storage.
//!
//! Providers depend on [`DataSource`] rather than on zarr directly, so
//! tests can substitute an in-memory fixture and so a future backend
//! (kerchunked NetCDF, for example) can slot in without touching the
//! query pipeline.

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::plan::{RealizedDataset, SelectionPlan};

/// Read access to one opened dataset.
///
/// Coordinate reads (`read_f64`, `read_i64`, `read_times`) pull whole
/// one-dimensional axes; implementations are expected to cache them.
/// Data variables are only ever read through [`DataSource::load`], which
/// materializes exactly the region a [`SelectionPlan`] selects.
pub trait DataSource: Send + Sync {
    /// Names of the data variables in the dataset.
    fn variable_names(&self) -> Vec<String>;

    /// Dimension names of one variable, outermost first.
    fn dimensions_of(&self, name: &str) -> Result<Vec<String>>;

    /// Root attributes of the dataset.
    fn attributes(&self) -> &serde_json::Map<String, serde_json::Value>;

    /// Attributes of one variable.
    fn variable_attributes(&self, name: &str) -> Result<serde_json::Map<String, serde_json::Value>>;

    /// Read a full one-dimensional coordinate axis as f64.
    fn read_f64(&self, name: &str) -> Result<Vec<f64>>;

    /// Read a full one-dimensional axis as i64 (feature identifiers).
    fn read_i64(&self, name: &str) -> Result<Vec<i64>>;

    /// Read and decode the time coordinate to UTC timestamps.
    fn read_times(&self, name: &str) -> Result<Vec<DateTime<Utc>>>;

    /// Materialize the selected region of the dataset.
    fn load(&self, plan: &SelectionPlan) -> Result<RealizedDataset>;
}
