//! Encoding realized results into response structures.
//!
//! The input is always rank-normalized: time-major values with explicit
//! time and feature counts, so the one-feature and one-time-step edge
//! cases need no special handling here. NaN survives up to this boundary
//! and becomes an explicit JSON null; it never reaches serialization.

use std::collections::HashMap;

use chrono::SecondsFormat;
use covjson_protocol::{
    CovParameter, Coverage, CoverageCollection, Feature, FeatureCollection, FeatureResponse,
    NdArray,
};
use zarr_dataset::{DataSource, RealizedDataset, ResultShape, VariableValues};

use crate::crs::Crs;
use crate::error::{ProviderError, Result};

/// Build CoverageJSON parameter metadata for the named variables.
///
/// Description comes from the `long_name` attribute when present, the
/// unit symbol from `units` (dimensionless otherwise), and the observed
/// property id is the variable's own name.
pub fn build_parameters(
    source: &dyn DataSource,
    names: &[String],
) -> Result<HashMap<String, CovParameter>> {
    let mut parameters = HashMap::new();
    for name in names {
        let attrs = source.variable_attributes(name)?;
        let mut param = CovParameter::named(name);
        if let Some(long_name) = attrs.get("long_name").and_then(|v| v.as_str()) {
            param = param.with_description(long_name);
        }
        if let Some(units) = attrs.get("units").and_then(|v| v.as_str()) {
            param = param.with_unit_symbol(units);
        }
        parameters.insert(name.clone(), param);
    }
    Ok(parameters)
}

fn time_strings(result: &RealizedDataset) -> Vec<String> {
    result
        .times
        .iter()
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
        .collect()
}

fn nullable(values: &[f32]) -> Vec<Option<f32>> {
    values
        .iter()
        .map(|&v| if v.is_nan() { None } else { Some(v) })
        .collect()
}

/// Encode a vector result as a PointSeries coverage collection: one
/// coverage per feature, each range shaped `[time_count]`.
pub fn to_point_collection(
    result: &RealizedDataset,
    output_crs: &Crs,
    parameters: &HashMap<String, CovParameter>,
) -> Result<CoverageCollection> {
    let ResultShape::Features { feature_count, .. } = result.shape else {
        return Err(ProviderError::invalid_data(
            "point encoding requires a feature-shaped result",
        ));
    };

    let mut collection = CoverageCollection::new(output_crs.uri());
    for (name, param) in parameters {
        collection = collection.with_parameter(name, param.clone());
    }

    let times = time_strings(result);
    for f in 0..feature_count {
        let mut coverage = Coverage::point_series(result.x[f], result.y[f], times.clone());
        for name in parameters.keys() {
            if let Some(series) = result.series_for(name, f) {
                coverage = coverage.with_range(name, NdArray::time_series(nullable(&series)));
            }
        }
        collection.push(coverage);
    }
    Ok(collection)
}

/// Encode a gridded result as one Grid coverage with literal axis value
/// arrays and row-major `["t","y","x"]` ranges.
pub fn to_grid_coverage(
    result: &RealizedDataset,
    output_crs: &Crs,
    parameters: &HashMap<String, CovParameter>,
) -> Result<Coverage> {
    let ResultShape::Grid {
        time_count,
        rows,
        cols,
    } = result.shape
    else {
        return Err(ProviderError::invalid_data(
            "grid encoding requires a grid-shaped result",
        ));
    };

    let mut coverage = Coverage::grid(
        result.x.clone(),
        result.y.clone(),
        time_strings(result),
        output_crs.uri(),
    );
    for (name, param) in parameters {
        coverage = coverage.with_parameter(name, param.clone());
        if let Some(VariableValues::Grid(values)) = result.variables.get(name) {
            coverage = coverage.with_range(
                name,
                NdArray::grid(nullable(values), time_count, rows, cols),
            );
        }
    }
    Ok(coverage)
}

/// Encode a vector result as GeoJSON features.
///
/// The property bag holds every per-feature variable, stringified.
/// When `single` is set the bare feature is returned without the
/// collection wrapper; the query must have resolved to exactly one
/// feature.
pub fn to_feature_response(result: &RealizedDataset, single: bool) -> Result<FeatureResponse> {
    let ResultShape::Features { feature_count, .. } = result.shape else {
        return Err(ProviderError::invalid_data(
            "feature encoding requires a feature-shaped result",
        ));
    };

    let mut features = Vec::with_capacity(feature_count);
    for f in 0..feature_count {
        let mut feature = Feature::point(
            result.feature_ids[f].to_string(),
            result.x[f],
            result.y[f],
        );
        let mut names: Vec<&String> = result.variables.keys().collect();
        names.sort();
        for name in names {
            if let VariableValues::PerFeature(values) = &result.variables[name] {
                feature = feature.with_property(name, values[f].to_string());
            }
        }
        features.push(feature);
    }

    if single {
        let feature = features.into_iter().next().ok_or_else(|| {
            ProviderError::no_data("single-feature query matched no feature")
        })?;
        return Ok(FeatureResponse::Single(feature));
    }

    let mut collection = FeatureCollection::new();
    for feature in features {
        collection = collection.with_feature(feature);
    }
    Ok(FeatureResponse::Collection(collection))
}
