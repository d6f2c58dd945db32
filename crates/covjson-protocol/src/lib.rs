//! CoverageJSON and EDR GeoJSON response types.
//!
//! These are the two serialization targets of the NWM query pipeline:
//! time-series coverage collections (point data), single grid coverages
//! (raster data), and GeoJSON feature collections (OGC API - Features).
//!
//! See: <https://covjson.org/>

pub mod coverage;
pub mod geojson;
pub mod parameters;

pub use coverage::{
    Axis, AxisValue, Coverage, CoverageCollection, Domain, DomainType, NdArray, ReferenceSystem,
    ReferenceSystemConnection,
};
pub use geojson::{Feature, FeatureCollection, FeatureResponse, Geometry};
pub use parameters::{CovParameter, I18nString, ObservedProperty, Unit};
