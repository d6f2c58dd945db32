//! Provider configuration.
//!
//! A [`ProviderConfig`] is built once at startup and read-only afterwards.
//! It names the dataset's axis fields, declares its shape (vector features
//! or raster grid), and sets the policies that decide what happens when a
//! query omits a bbox or a datetime filter.

use serde::{Deserialize, Serialize};
use zarr_dataset::StoreConfig;

use crate::bbox::BoundingBox;
use crate::error::{ProviderError, Result};

/// What to do when a query supplies no bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BboxPolicy {
    /// No bbox means no spatial filtering.
    None,
    /// Refuse the query.
    Reject,
    /// Substitute a fixed bbox and log a warning.
    Fallback(BoundingBox),
}

/// What to do when a query supplies no datetime filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatetimePolicy {
    /// Refuse the query. The safety rail against loading a full time axis.
    Reject,
    /// Select the instant at the highest time index.
    LatestWhenAbsent,
}

/// Immutable description of one provider's dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Store connection settings.
    pub store: StoreConfig,
    /// Dataset root within the store (for example "chrtout.zarr").
    pub subpath: String,
    /// Time coordinate variable.
    pub time_field: String,
    /// X coordinate variable (longitude or easting).
    pub x_field: String,
    /// Y coordinate variable (latitude or northing).
    pub y_field: String,
    /// Feature identifier variable; required for vector datasets.
    pub feature_id_field: Option<String>,
    /// True for gridded (raster) datasets.
    pub raster: bool,
    /// Storage CRS override as a proj4 string or "EPSG:<code>".
    /// When absent the CRS is detected from dataset metadata.
    pub storage_crs: Option<String>,
    /// Output CRS as an EPSG code. Defaults to 4326.
    pub output_epsg: u16,
    /// Behavior when a query has no bbox.
    pub bbox_policy: BboxPolicy,
    /// Behavior when a query has no datetime filter.
    pub datetime_policy: DatetimePolicy,
}

impl ProviderConfig {
    /// A vector (discrete features) provider with default policies.
    pub fn vector(
        store: StoreConfig,
        subpath: impl Into<String>,
        time_field: impl Into<String>,
        x_field: impl Into<String>,
        y_field: impl Into<String>,
        feature_id_field: impl Into<String>,
    ) -> Self {
        Self {
            store,
            subpath: subpath.into(),
            time_field: time_field.into(),
            x_field: x_field.into(),
            y_field: y_field.into(),
            feature_id_field: Some(feature_id_field.into()),
            raster: false,
            storage_crs: None,
            output_epsg: 4326,
            bbox_policy: BboxPolicy::None,
            datetime_policy: DatetimePolicy::Reject,
        }
    }

    /// A raster (gridded) provider with default policies.
    pub fn raster(
        store: StoreConfig,
        subpath: impl Into<String>,
        time_field: impl Into<String>,
        x_field: impl Into<String>,
        y_field: impl Into<String>,
    ) -> Self {
        Self {
            store,
            subpath: subpath.into(),
            time_field: time_field.into(),
            x_field: x_field.into(),
            y_field: y_field.into(),
            feature_id_field: None,
            raster: true,
            storage_crs: None,
            output_epsg: 4326,
            bbox_policy: BboxPolicy::None,
            datetime_policy: DatetimePolicy::Reject,
        }
    }

    pub fn with_storage_crs(mut self, crs: impl Into<String>) -> Self {
        self.storage_crs = Some(crs.into());
        self
    }

    pub fn with_output_epsg(mut self, epsg: u16) -> Self {
        self.output_epsg = epsg;
        self
    }

    pub fn with_bbox_policy(mut self, policy: BboxPolicy) -> Self {
        self.bbox_policy = policy;
        self
    }

    pub fn with_datetime_policy(mut self, policy: DatetimePolicy) -> Self {
        self.datetime_policy = policy;
        self
    }

    /// Validate field names and shape flags. Called at provider startup.
    pub fn validate(&self) -> Result<()> {
        for (label, value) in [
            ("time_field", &self.time_field),
            ("x_field", &self.x_field),
            ("y_field", &self.y_field),
        ] {
            if value.is_empty() {
                return Err(ProviderError::query(format!("{label} must not be empty")));
            }
        }
        if !self.raster && self.feature_id_field.is_none() {
            return Err(ProviderError::query(
                "vector providers require a feature_id_field",
            ));
        }
        if self.raster && self.feature_id_field.is_some() {
            return Err(ProviderError::query(
                "raster providers must not set feature_id_field",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> StoreConfig {
        StoreConfig::local("/data/nwm")
    }

    #[test]
    fn test_vector_config_validates() {
        let config = ProviderConfig::vector(
            store(),
            "chrtout.zarr",
            "time",
            "longitude",
            "latitude",
            "feature_id",
        );
        assert!(config.validate().is_ok());
        assert_eq!(config.output_epsg, 4326);
        assert_eq!(config.datetime_policy, DatetimePolicy::Reject);
    }

    #[test]
    fn test_vector_without_feature_id_rejected() {
        let mut config =
            ProviderConfig::vector(store(), "x.zarr", "time", "x", "y", "feature_id");
        config.feature_id_field = None;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_raster_with_feature_id_rejected() {
        let mut config = ProviderConfig::raster(store(), "x.zarr", "time", "x", "y");
        config.feature_id_field = Some("feature_id".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_axis_field_rejected() {
        let mut config =
            ProviderConfig::vector(store(), "x.zarr", "time", "x", "y", "feature_id");
        config.time_field = String::new();
        assert!(config.validate().is_err());
    }
}
