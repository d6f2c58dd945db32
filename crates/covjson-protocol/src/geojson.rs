//! GeoJSON feature types for the OGC API - Features provider.
//!
//! Multi-feature queries return a `FeatureCollection`; a query for one
//! identifier returns the bare `Feature` object without the wrapper, so
//! callers must branch on `FeatureResponse`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A GeoJSON FeatureCollection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeatureCollection {
    /// Type identifier (always "FeatureCollection").
    #[serde(rename = "type")]
    pub type_: String,

    /// Array of features.
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    /// Create a new empty FeatureCollection.
    pub fn new() -> Self {
        Self {
            type_: "FeatureCollection".to_string(),
            features: Vec::new(),
        }
    }

    /// Add a feature to the collection.
    pub fn with_feature(mut self, feature: Feature) -> Self {
        self.features.push(feature);
        self
    }
}

impl Default for FeatureCollection {
    fn default() -> Self {
        Self::new()
    }
}

/// A GeoJSON Feature with a Point geometry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Feature {
    /// Type identifier (always "Feature").
    #[serde(rename = "type")]
    pub type_: String,

    /// Feature identifier (the NWM feature id, stringified).
    pub id: String,

    /// The geometry of this feature.
    pub geometry: Geometry,

    /// Flat property bag; all values stringified.
    pub properties: HashMap<String, String>,
}

impl Feature {
    /// Create a feature with a point geometry.
    pub fn point(id: impl Into<String>, x: f64, y: f64) -> Self {
        Self {
            type_: "Feature".to_string(),
            id: id.into(),
            geometry: Geometry::Point {
                coordinates: [x, y],
            },
            properties: HashMap::new(),
        }
    }

    /// Add a stringified property.
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }
}

/// GeoJSON geometry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Geometry {
    /// A point geometry.
    Point {
        /// Coordinates as [x, y] in the output CRS.
        coordinates: [f64; 2],
    },
}

/// Response shape for items queries: a collection for multi-feature
/// results, the bare feature for single-identifier lookups.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum FeatureResponse {
    Collection(FeatureCollection),
    Single(Feature),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_serialization() {
        let feature = Feature::point("101", -111.9, 33.4).with_property("elevation", "412.5");
        let json = serde_json::to_value(&feature).unwrap();

        assert_eq!(json["type"], "Feature");
        assert_eq!(json["id"], "101");
        assert_eq!(json["geometry"]["type"], "Point");
        assert_eq!(json["geometry"]["coordinates"][0], -111.9);
        assert_eq!(json["properties"]["elevation"], "412.5");
    }

    #[test]
    fn test_collection_wraps_features() {
        let fc = FeatureCollection::new()
            .with_feature(Feature::point("1", 0.0, 0.0))
            .with_feature(Feature::point("2", 1.0, 1.0));

        let json = serde_json::to_value(&fc).unwrap();
        assert_eq!(json["type"], "FeatureCollection");
        assert_eq!(json["features"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_single_feature_response_has_no_wrapper() {
        let response = FeatureResponse::Single(Feature::point("42", 2.0, 3.0));
        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(json["type"], "Feature");
        assert!(json.get("features").is_none());
    }
}
