//! The concrete provider and its capability traits.
//!
//! One [`NwmProvider`] type serves both the EDR surface (cube, locations,
//! fields) and the features surface (items, get); whether a given dataset
//! is raster or vector is configuration, not a subclass. Operations that
//! do not apply to the configured shape return not-implemented errors.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use covjson_protocol::{Coverage, CoverageCollection, FeatureResponse};
use serde::Serialize;
use zarr_dataset::{
    create_storage, DataSource, DatasetCache, DatasetKey, RealizedDataset, ZarrDataset,
};

use crate::config::ProviderConfig;
use crate::crs::{detect_storage_crs, Crs};
use crate::encode;
use crate::error::{ProviderError, Result};
use crate::fetch;
use crate::project::project_dataset;
use crate::query::QueryParams;

/// A coverage response body: a collection for point data, a single
/// coverage for grids.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum CoverageResponse {
    Collection(CoverageCollection),
    Grid(Box<Coverage>),
}

/// Field metadata served by `fields`, one entry per data variable.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FieldInfo {
    pub title: String,
    pub description: String,
    #[serde(rename = "x-ogc-unit")]
    pub unit: String,
    #[serde(rename = "type")]
    pub data_type: String,
}

/// OGC EDR query surface.
pub trait EdrQueries {
    /// Spatio-temporal subset: a grid coverage for raster providers, a
    /// point-series collection for vector providers.
    fn cube(&self, params: &QueryParams) -> Result<CoverageResponse>;

    /// Time series at discrete locations. Vector providers only.
    fn locations(&self, params: &QueryParams) -> Result<CoverageCollection>;

    /// Arbitrary-polygon subset. Not supported by any NWM provider.
    fn area(&self, params: &QueryParams) -> Result<CoverageResponse>;

    /// Per-variable field metadata.
    fn fields(&self) -> Result<BTreeMap<String, FieldInfo>>;
}

/// OGC API - Features query surface. Vector providers only.
pub trait FeatureQueries {
    /// Paged feature listing.
    fn items(&self, params: &QueryParams) -> Result<FeatureResponse>;

    /// A single feature by identifier.
    fn get(&self, id: &str) -> Result<FeatureResponse>;
}

/// A provider over one NWM dataset.
pub struct NwmProvider<S: DataSource> {
    config: ProviderConfig,
    source: Arc<S>,
    fields_cache: Mutex<Option<BTreeMap<String, FieldInfo>>>,
}

impl NwmProvider<ZarrDataset> {
    /// Open (or reuse) the configured dataset through the handle cache.
    pub fn open(config: ProviderConfig, cache: &DatasetCache<ZarrDataset>) -> Result<Self> {
        config.validate()?;
        let key = DatasetKey {
            backend: config.store.backend,
            locator: config.store.locator.clone(),
            bucket: config.store.bucket.clone(),
            subpath: config.subpath.clone(),
        };
        let source = cache.get_or_open(&key, || {
            let storage = create_storage(&config.store)?;
            ZarrDataset::open(storage, &config.subpath)
        })?;
        Ok(Self {
            config,
            source,
            fields_cache: Mutex::new(None),
        })
    }
}

impl<S: DataSource> NwmProvider<S> {
    /// Build a provider over an already-opened source. Used by tests and
    /// by callers that manage handles themselves.
    pub fn with_source(config: ProviderConfig, source: Arc<S>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            source,
            fields_cache: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// Fetch, then reproject to the output CRS.
    fn fetch_projected(&self, params: &QueryParams) -> Result<RealizedDataset> {
        let result = fetch::fetch(self.source.as_ref(), &self.config, params)?;
        let storage_crs =
            detect_storage_crs(self.source.as_ref(), self.config.storage_crs.as_deref())?;
        let output_crs = Crs::from_epsg(self.config.output_epsg)?;
        project_dataset(result, &storage_crs, &output_crs)
    }

    fn output_crs(&self) -> Result<Crs> {
        Crs::from_epsg(self.config.output_epsg)
    }
}

/// EDR coverage queries must name the parameters they want; a coverage
/// with no ranges is never the intent. Feature queries have a legitimate
/// coordinates-only mode and skip this check.
fn require_properties(params: &QueryParams) -> Result<()> {
    if params.properties.is_empty() {
        return Err(ProviderError::query(
            "at least one parameter name must be selected",
        ));
    }
    Ok(())
}

impl<S: DataSource> EdrQueries for NwmProvider<S> {
    fn cube(&self, params: &QueryParams) -> Result<CoverageResponse> {
        require_properties(params)?;
        let result = self.fetch_projected(params)?;
        let output_crs = self.output_crs()?;
        let parameters = encode::build_parameters(self.source.as_ref(), &params.properties)?;
        if self.config.raster {
            let coverage = encode::to_grid_coverage(&result, &output_crs, &parameters)?;
            Ok(CoverageResponse::Grid(Box::new(coverage)))
        } else {
            let collection = encode::to_point_collection(&result, &output_crs, &parameters)?;
            Ok(CoverageResponse::Collection(collection))
        }
    }

    fn locations(&self, params: &QueryParams) -> Result<CoverageCollection> {
        if self.config.raster {
            return Err(ProviderError::not_implemented(
                "locations queries against gridded datasets",
            ));
        }
        require_properties(params)?;
        let result = self.fetch_projected(params)?;
        let output_crs = self.output_crs()?;
        let parameters = encode::build_parameters(self.source.as_ref(), &params.properties)?;
        encode::to_point_collection(&result, &output_crs, &parameters)
    }

    fn area(&self, _params: &QueryParams) -> Result<CoverageResponse> {
        Err(ProviderError::not_implemented("area queries"))
    }

    fn fields(&self) -> Result<BTreeMap<String, FieldInfo>> {
        if let Some(fields) = self.fields_cache.lock().unwrap().as_ref() {
            return Ok(fields.clone());
        }

        let mut fields = BTreeMap::new();
        for name in self.source.variable_names() {
            let attrs = self.source.variable_attributes(&name)?;
            let title = attrs
                .get("long_name")
                .and_then(|v| v.as_str())
                .unwrap_or(&name)
                .to_string();
            let unit = attrs
                .get("units")
                .and_then(|v| v.as_str())
                .unwrap_or("1")
                .to_string();
            fields.insert(
                name,
                FieldInfo {
                    description: title.clone(),
                    title,
                    unit,
                    data_type: "number".to_string(),
                },
            );
        }

        *self.fields_cache.lock().unwrap() = Some(fields.clone());
        Ok(fields)
    }
}

impl<S: DataSource> FeatureQueries for NwmProvider<S> {
    fn items(&self, params: &QueryParams) -> Result<FeatureResponse> {
        if self.config.raster {
            return Err(ProviderError::not_implemented(
                "feature queries against gridded datasets",
            ));
        }
        let result = self.fetch_projected(params)?;
        encode::to_feature_response(&result, params.feature_id.is_some())
    }

    fn get(&self, id: &str) -> Result<FeatureResponse> {
        self.items(&QueryParams::new().with_feature_id(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_utils::{grid_dataset, vector_dataset};
    use zarr_dataset::StoreConfig;

    fn vector_provider() -> NwmProvider<test_utils::MemoryDataset> {
        let config = ProviderConfig::vector(
            StoreConfig::local("/data"),
            "chrtout.zarr",
            "time",
            "longitude",
            "latitude",
            "feature_id",
        );
        NwmProvider::with_source(config, Arc::new(vector_dataset())).unwrap()
    }

    fn raster_provider() -> NwmProvider<test_utils::MemoryDataset> {
        let config =
            ProviderConfig::raster(StoreConfig::local("/data"), "ldasout.zarr", "time", "x", "y");
        NwmProvider::with_source(config, Arc::new(grid_dataset())).unwrap()
    }

    #[test]
    fn test_cube_vector_returns_collection() {
        let provider = vector_provider();
        let params = QueryParams::new()
            .with_properties(["streamflow"])
            .with_datetime("2020-01-01T00:00:00Z/..");
        let response = provider.cube(&params).unwrap();
        let CoverageResponse::Collection(collection) = response else {
            panic!("expected a coverage collection");
        };
        assert_eq!(collection.coverages.len(), 4);
    }

    #[test]
    fn test_cube_raster_returns_grid() {
        let provider = raster_provider();
        let params = QueryParams::new()
            .with_properties(["depth"])
            .with_datetime("2020-01-01T00:00:00Z");
        let response = provider.cube(&params).unwrap();
        let CoverageResponse::Grid(coverage) = response else {
            panic!("expected a grid coverage");
        };
        assert_eq!(coverage.ranges["depth"].shape, vec![1, 4, 5]);
    }

    #[test]
    fn test_cube_requires_properties() {
        let provider = vector_provider();
        let params = QueryParams::new().with_datetime("2020-01-01T00:00:00Z");
        let err = provider.cube(&params).unwrap_err();
        assert!(matches!(err, ProviderError::Query(_)));
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn test_locations_require_properties() {
        let provider = vector_provider();
        let params = QueryParams::new().with_datetime("2020-01-01T00:00:00Z");
        let err = provider.locations(&params).unwrap_err();
        assert!(matches!(err, ProviderError::Query(_)));
    }

    #[test]
    fn test_items_allows_coordinates_only() {
        let provider = vector_provider();
        let params = QueryParams::new().with_datetime("2020-01-01T00:00:00Z");
        assert!(provider.items(&params).is_ok());
    }

    #[test]
    fn test_locations_raster_not_implemented() {
        let provider = raster_provider();
        let err = provider.locations(&QueryParams::new()).unwrap_err();
        assert!(matches!(err, ProviderError::NotImplemented(_)));
    }

    #[test]
    fn test_area_not_implemented() {
        let provider = vector_provider();
        let err = provider.area(&QueryParams::new()).unwrap_err();
        assert_eq!(err.status_code(), 501);
    }

    #[test]
    fn test_elevation_filter_not_implemented() {
        let provider = vector_provider();
        let params = QueryParams::new()
            .with_datetime("2020-01-01T00:00:00Z")
            .with_z("10");
        let err = provider.items(&params).unwrap_err();
        assert!(matches!(err, ProviderError::NotImplemented(_)));
    }

    #[test]
    fn test_fields_metadata() {
        let provider = vector_provider();
        let fields = provider.fields().unwrap();
        assert_eq!(
            fields["streamflow"],
            FieldInfo {
                title: "River Flow".to_string(),
                description: "River Flow".to_string(),
                unit: "m3 s-1".to_string(),
                data_type: "number".to_string(),
            }
        );
        // elevation has no long_name; the title falls back to the name.
        assert_eq!(fields["elevation"].title, "elevation");
        assert_eq!(fields["elevation"].unit, "m");
    }

    #[test]
    fn test_fields_cached() {
        let provider = vector_provider();
        let first = provider.fields().unwrap();
        let second = provider.fields().unwrap();
        assert_eq!(first, second);
        assert!(provider.fields_cache.lock().unwrap().is_some());
    }

    #[test]
    fn test_get_returns_bare_feature() {
        let provider = vector_provider();
        let response = provider.get("102").unwrap();
        let FeatureResponse::Single(feature) = response else {
            panic!("expected a bare feature");
        };
        assert_eq!(feature.id, "102");
    }

    #[test]
    fn test_get_unknown_id_is_no_data() {
        let provider = vector_provider();
        let err = provider.get("999").unwrap_err();
        assert!(matches!(err, ProviderError::NoData(_)));
    }

    #[test]
    fn test_items_lists_features() {
        let provider = vector_provider();
        let params = QueryParams::new()
            .with_datetime("2020-01-01T00:00:00Z")
            .with_limit(2);
        let response = provider.items(&params).unwrap();
        let FeatureResponse::Collection(collection) = response else {
            panic!("expected a collection");
        };
        assert_eq!(collection.features.len(), 2);
        assert_eq!(collection.features[0].id, "101");
    }
}
