//! CoverageJSON document types.
//!
//! The point providers emit a `CoverageCollection` with one PointSeries
//! coverage per feature; the raster providers emit a single Grid coverage.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::parameters::CovParameter;

/// A collection of coverages sharing parameters and reference systems.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CoverageCollection {
    /// Document type (always "CoverageCollection").
    #[serde(rename = "type")]
    pub type_: String,

    /// Parameter definitions shared by all coverages.
    pub parameters: HashMap<String, CovParameter>,

    /// Reference systems for the axes.
    pub referencing: Vec<ReferenceSystemConnection>,

    /// The coverages, one per feature.
    pub coverages: Vec<Coverage>,
}

impl CoverageCollection {
    /// Create a collection referencing the given CRS URI, with the standard
    /// Gregorian temporal reference system.
    pub fn new(crs_uri: impl Into<String>) -> Self {
        Self {
            type_: "CoverageCollection".to_string(),
            parameters: HashMap::new(),
            referencing: vec![
                ReferenceSystemConnection::geographic(crs_uri),
                ReferenceSystemConnection::gregorian(),
            ],
            coverages: Vec::new(),
        }
    }

    /// Register a parameter definition.
    pub fn with_parameter(mut self, name: impl Into<String>, param: CovParameter) -> Self {
        self.parameters.insert(name.into(), param);
        self
    }

    /// Append a coverage.
    pub fn push(&mut self, coverage: Coverage) {
        self.coverages.push(coverage);
    }
}

/// A single coverage: a domain plus per-parameter value arrays.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Coverage {
    /// Type (always "Coverage").
    #[serde(rename = "type")]
    pub type_: String,

    /// The spatial/temporal domain.
    pub domain: Domain,

    /// Parameter definitions; present only on standalone (grid) coverages,
    /// collections carry them at the collection level instead.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<HashMap<String, CovParameter>>,

    /// Data ranges keyed by parameter name.
    pub ranges: HashMap<String, NdArray>,
}

impl Coverage {
    /// A PointSeries coverage at one location across the given times.
    pub fn point_series(x: f64, y: f64, t_values: Vec<String>) -> Self {
        Self {
            type_: "Coverage".to_string(),
            domain: Domain::point_series(x, y, t_values),
            parameters: None,
            ranges: HashMap::new(),
        }
    }

    /// A standalone Grid coverage with explicit axis value arrays.
    pub fn grid(
        x_values: Vec<f64>,
        y_values: Vec<f64>,
        t_values: Vec<String>,
        crs_uri: impl Into<String>,
    ) -> Self {
        Self {
            type_: "Coverage".to_string(),
            domain: Domain::grid(x_values, y_values, t_values, crs_uri),
            parameters: Some(HashMap::new()),
            ranges: HashMap::new(),
        }
    }

    /// Attach a range array for a parameter.
    pub fn with_range(mut self, name: impl Into<String>, range: NdArray) -> Self {
        self.ranges.insert(name.into(), range);
        self
    }

    /// Attach a parameter definition (standalone coverages only).
    pub fn with_parameter(mut self, name: impl Into<String>, param: CovParameter) -> Self {
        self.parameters
            .get_or_insert_with(HashMap::new)
            .insert(name.into(), param);
        self
    }
}

/// The domain of a coverage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Domain {
    /// Type (always "Domain").
    #[serde(rename = "type")]
    pub type_: String,

    /// The domain type (PointSeries or Grid).
    #[serde(rename = "domainType")]
    pub domain_type: DomainType,

    /// Axis definitions.
    pub axes: HashMap<String, Axis>,

    /// Reference systems; standalone coverages carry them in the domain.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referencing: Option<Vec<ReferenceSystemConnection>>,
}

impl Domain {
    /// A PointSeries domain: single x/y, list of time values.
    pub fn point_series(x: f64, y: f64, t_values: Vec<String>) -> Self {
        let mut axes = HashMap::new();
        axes.insert("x".to_string(), Axis::of_floats(vec![x]));
        axes.insert("y".to_string(), Axis::of_floats(vec![y]));
        axes.insert("t".to_string(), Axis::of_strings(t_values));

        Self {
            type_: "Domain".to_string(),
            domain_type: DomainType::PointSeries,
            axes,
            referencing: None,
        }
    }

    /// A Grid domain with literal coordinate arrays on every axis.
    pub fn grid(
        x_values: Vec<f64>,
        y_values: Vec<f64>,
        t_values: Vec<String>,
        crs_uri: impl Into<String>,
    ) -> Self {
        let mut axes = HashMap::new();
        axes.insert("x".to_string(), Axis::of_floats(x_values));
        axes.insert("y".to_string(), Axis::of_floats(y_values));
        axes.insert("t".to_string(), Axis::of_strings(t_values));

        Self {
            type_: "Domain".to_string(),
            domain_type: DomainType::Grid,
            axes,
            referencing: Some(vec![
                ReferenceSystemConnection::geographic(crs_uri),
                ReferenceSystemConnection::gregorian(),
            ]),
        }
    }
}

/// Domain types emitted by the NWM providers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum DomainType {
    /// Time series at a point.
    PointSeries,
    /// Structured grid.
    Grid,
}

/// An axis carrying an explicit list of values.
///
/// Regular start/stop/num axes are deliberately not modeled: reprojected
/// grids need not be regularly spaced, so value arrays are the contract.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Axis {
    pub values: Vec<AxisValue>,
}

impl Axis {
    pub fn of_floats(values: Vec<f64>) -> Self {
        Self {
            values: values.into_iter().map(AxisValue::Float).collect(),
        }
    }

    pub fn of_strings(values: Vec<String>) -> Self {
        Self {
            values: values.into_iter().map(AxisValue::String).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A value on an axis.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum AxisValue {
    /// Coordinate value.
    Float(f64),
    /// Timestamp.
    String(String),
}

/// Connection between axes and their reference system.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReferenceSystemConnection {
    /// Axes that use this reference system.
    pub coordinates: Vec<String>,

    /// The reference system.
    pub system: ReferenceSystem,
}

impl ReferenceSystemConnection {
    /// Geographic CRS covering the y/x axes.
    pub fn geographic(crs_uri: impl Into<String>) -> Self {
        Self {
            coordinates: vec!["y".to_string(), "x".to_string()],
            system: ReferenceSystem::Geographic { id: crs_uri.into() },
        }
    }

    /// Gregorian temporal reference system for the t axis. Source calendars
    /// are always advertised as Gregorian.
    pub fn gregorian() -> Self {
        Self {
            coordinates: vec!["t".to_string()],
            system: ReferenceSystem::Temporal {
                calendar: "Gregorian".to_string(),
            },
        }
    }
}

/// Reference system definitions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ReferenceSystem {
    /// Geographic coordinate reference system.
    #[serde(rename = "GeographicCRS")]
    Geographic {
        /// CRS identifier URI.
        id: String,
    },

    /// Temporal reference system.
    #[serde(rename = "TemporalRS")]
    Temporal {
        /// Calendar system.
        calendar: String,
    },
}

/// N-dimensional array of parameter values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NdArray {
    /// Type (always "NdArray").
    #[serde(rename = "type")]
    pub type_: String,

    /// Data type of values (always "float").
    #[serde(rename = "dataType")]
    pub data_type: String,

    /// Names of axes in order.
    #[serde(rename = "axisNames")]
    pub axis_names: Vec<String>,

    /// Shape of the array.
    pub shape: Vec<usize>,

    /// The data values; `None` serializes as JSON null (missing data).
    pub values: Vec<Option<f32>>,
}

impl NdArray {
    /// A 1-D time series along the t axis.
    pub fn time_series(values: Vec<Option<f32>>) -> Self {
        let shape = vec![values.len()];
        Self {
            type_: "NdArray".to_string(),
            data_type: "float".to_string(),
            axis_names: vec!["t".to_string()],
            shape,
            values,
        }
    }

    /// A row-major [t, y, x] grid array.
    pub fn grid(values: Vec<Option<f32>>, t_len: usize, y_len: usize, x_len: usize) -> Self {
        debug_assert_eq!(values.len(), t_len * y_len * x_len);
        Self {
            type_: "NdArray".to_string(),
            data_type: "float".to_string(),
            axis_names: vec!["t".to_string(), "y".to_string(), "x".to_string()],
            shape: vec![t_len, y_len, x_len],
            values,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_series_coverage() {
        let times = vec![
            "2020-01-01T00:00:00Z".to_string(),
            "2020-01-02T00:00:00Z".to_string(),
            "2020-01-03T00:00:00Z".to_string(),
        ];

        let cov = Coverage::point_series(-111.9, 33.4, times)
            .with_range("streamflow", NdArray::time_series(vec![Some(1.0), Some(2.0), None]));

        assert_eq!(cov.domain.domain_type, DomainType::PointSeries);
        assert_eq!(cov.domain.axes["t"].len(), 3);
        assert_eq!(cov.domain.axes["x"].len(), 1);
        assert_eq!(cov.ranges["streamflow"].shape, vec![3]);
        assert_eq!(cov.ranges["streamflow"].axis_names, vec!["t"]);
    }

    #[test]
    fn test_collection_serialization() {
        let mut collection =
            CoverageCollection::new("http://www.opengis.net/def/crs/EPSG/0/4326")
                .with_parameter("streamflow", CovParameter::named("streamflow"));
        collection.push(
            Coverage::point_series(-111.9, 33.4, vec!["2020-01-01T00:00:00Z".to_string()])
                .with_range("streamflow", NdArray::time_series(vec![Some(5.5)])),
        );

        let json = serde_json::to_value(&collection).unwrap();
        assert_eq!(json["type"], "CoverageCollection");
        assert_eq!(json["coverages"][0]["type"], "Coverage");
        assert_eq!(json["coverages"][0]["domain"]["domainType"], "PointSeries");
        assert_eq!(
            json["referencing"][0]["system"]["type"],
            "GeographicCRS"
        );
        assert_eq!(json["referencing"][1]["system"]["calendar"], "Gregorian");
        assert_eq!(
            json["coverages"][0]["ranges"]["streamflow"]["shape"][0],
            1
        );
    }

    #[test]
    fn test_grid_coverage_serialization() {
        let cov = Coverage::grid(
            vec![-112.0, -111.0],
            vec![33.0, 34.0],
            vec!["2020-01-01T00:00:00Z".to_string()],
            "http://www.opengis.net/def/crs/EPSG/0/4326",
        )
        .with_parameter("depth", CovParameter::named("depth"))
        .with_range(
            "depth",
            NdArray::grid(vec![Some(1.0), None, Some(3.0), Some(4.0)], 1, 2, 2),
        );

        let json = serde_json::to_value(&cov).unwrap();
        assert_eq!(json["type"], "Coverage");
        assert_eq!(json["domain"]["domainType"], "Grid");
        // NaN positions must serialize as explicit nulls, never NaN tokens.
        assert!(json["ranges"]["depth"]["values"][1].is_null());
        assert_eq!(
            json["ranges"]["depth"]["axisNames"],
            serde_json::json!(["t", "y", "x"])
        );
        assert!(json["domain"]["referencing"].is_array());
    }

    #[test]
    fn test_roundtrip() {
        let collection = CoverageCollection::new("http://www.opengis.net/def/crs/EPSG/0/4326");
        let json = serde_json::to_string(&collection).unwrap();
        let parsed: CoverageCollection = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.type_, "CoverageCollection");
        assert_eq!(parsed.referencing.len(), 2);
    }
}
