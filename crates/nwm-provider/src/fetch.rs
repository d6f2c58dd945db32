//! The fetch pipeline.
//!
//! Composes variable selection, single-feature short-circuit, time
//! narrowing, spatial narrowing, and pagination into one
//! [`SelectionPlan`], then materializes it with a single
//! [`DataSource::load`] call. Every step before the load only narrows the
//! plan; no chunk data moves until the end. Pagination is applied last so
//! it pages the filtered result, not an arbitrary prefix of the raw data.

use zarr_dataset::{AxisFields, DataSource, FeatureSelection, GridWindow, SelectionPlan};

use crate::bbox::BoundingBox;
use crate::config::{BboxPolicy, DatetimePolicy, ProviderConfig};
use crate::error::{ProviderError, Result};
use crate::query::QueryParams;
use crate::spatial;
use crate::time_range::DatetimeFilter;

/// Run the fetch pipeline and return the realized narrowed subset.
pub fn fetch(
    source: &dyn DataSource,
    config: &ProviderConfig,
    params: &QueryParams,
) -> Result<zarr_dataset::RealizedDataset> {
    if params.z.is_some() {
        return Err(ProviderError::not_implemented("elevation filtering"));
    }

    let axes = AxisFields {
        time: config.time_field.clone(),
        x: config.x_field.clone(),
        y: config.y_field.clone(),
        feature_id: config.feature_id_field.clone(),
    };

    // Step 1: variable selection. Every requested property and every
    // configured axis must exist; report all missing names at once.
    let mut selected: Vec<String> = Vec::new();
    for name in &params.properties {
        if !selected.contains(name) {
            selected.push(name.clone());
        }
    }
    let mut missing: Vec<String> = Vec::new();
    let known = source.variable_names();
    for name in &selected {
        if !known.contains(name) {
            missing.push(name.clone());
        }
    }
    let mut required_axes = vec![&axes.time, &axes.x, &axes.y];
    if let Some(feature_axis) = &axes.feature_id {
        required_axes.push(feature_axis);
    }
    for name in required_axes {
        if source.dimensions_of(name).is_err() {
            missing.push(name.clone());
        }
    }
    if !missing.is_empty() {
        return Err(ProviderError::FieldNotFound(missing.join(", ")));
    }

    let mut plan = SelectionPlan::all(selected, axes);

    // Step 2: single-feature short-circuit. The feature is uniquely
    // resolved, so time/space/pagination filtering is skipped.
    if let Some(id_str) = &params.feature_id {
        if config.raster {
            return Err(ProviderError::not_implemented(
                "feature identifier queries against gridded datasets",
            ));
        }
        let feature_axis = plan.axes.feature_id.as_deref().ok_or_else(|| {
            ProviderError::query("feature identifier queries require a feature_id_field")
        })?;
        let id: i64 = id_str
            .parse()
            .map_err(|_| ProviderError::query(format!("invalid feature identifier: {id_str}")))?;
        let ids = source.read_i64(feature_axis)?;
        let position = ids.iter().position(|&v| v == id).ok_or_else(|| {
            ProviderError::no_data(format!("feature {id} not found"))
        })?;
        plan.features = FeatureSelection::Indices(vec![position]);
        tracing::debug!(feature = id, "single-feature fetch");
        return Ok(source.load(&plan)?);
    }

    // Step 3: datetime filter, required by default. Loading a full time
    // axis of a multi-terabyte archive is never an accident we allow.
    let filter = match (&params.datetime, config.datetime_policy) {
        (Some(datetime), _) => DatetimeFilter::parse(datetime)?,
        (None, DatetimePolicy::LatestWhenAbsent) => {
            tracing::warn!("no datetime filter supplied, selecting latest instant");
            DatetimeFilter::Latest
        }
        (None, DatetimePolicy::Reject) => {
            return Err(ProviderError::query(
                "a datetime filter is required; use an instant or a start/end range",
            ))
        }
    };
    let times = source.read_times(&plan.axes.time)?;
    plan.time = filter.resolve(&times)?;

    // Step 4: spatial filter.
    let bbox = effective_bbox(params, config)?;
    if config.raster {
        let x_axis = source.read_f64(&plan.axes.x)?;
        let y_axis = source.read_f64(&plan.axes.y)?;
        let window = match &bbox {
            Some(bbox) => spatial::grid_window(&x_axis, &y_axis, bbox)?,
            None => GridWindow {
                rows: 0..y_axis.len(),
                cols: 0..x_axis.len(),
            },
        };
        // The window may be empty; checked here, at materialization time.
        if window.is_empty() {
            return Err(ProviderError::no_data(match &bbox {
                Some(bbox) => format!("no grid cells inside bbox {bbox}"),
                None => "dataset grid is empty".to_string(),
            }));
        }
        plan.window = Some(window);
    } else if let Some(bbox) = &bbox {
        let x = source.read_f64(&plan.axes.x)?;
        let y = source.read_f64(&plan.axes.y)?;
        let indices = spatial::filter_features(&x, &y, bbox)?;
        plan.features = FeatureSelection::Indices(indices);
    }

    // Step 5: pagination, vector only, last narrowing step.
    if !config.raster {
        if let Some(limit) = params.limit {
            if limit == 0 {
                return Err(ProviderError::query("limit must be positive"));
            }
            plan.features = paginate(plan.features, params.offset, limit);
        }
    }

    tracing::debug!(
        variables = plan.variables.len(),
        time_steps = plan.time.count(times.len()),
        "materializing selection"
    );

    // Step 6: the one load.
    Ok(source.load(&plan)?)
}

fn effective_bbox(params: &QueryParams, config: &ProviderConfig) -> Result<Option<BoundingBox>> {
    match (params.bbox, config.bbox_policy) {
        (Some(bbox), _) => Ok(Some(bbox)),
        (None, BboxPolicy::Fallback(bbox)) => {
            tracing::warn!(%bbox, "no bbox supplied, using configured fallback");
            Ok(Some(bbox))
        }
        (None, BboxPolicy::Reject) => Err(ProviderError::query(
            "a bounding box is required for this dataset",
        )),
        (None, BboxPolicy::None) => Ok(None),
    }
}

/// Page a feature selection: the slice `[offset, offset + limit)` of the
/// already-filtered selection.
fn paginate(features: FeatureSelection, offset: usize, limit: usize) -> FeatureSelection {
    match features {
        FeatureSelection::All => FeatureSelection::Slice { offset, len: limit },
        FeatureSelection::Indices(indices) => {
            let start = offset.min(indices.len());
            let end = (offset + limit).min(indices.len());
            FeatureSelection::Indices(indices[start..end].to_vec())
        }
        FeatureSelection::Slice { offset: base, len } => {
            let start = base + offset.min(len);
            let new_len = limit.min(len.saturating_sub(offset));
            FeatureSelection::Slice {
                offset: start,
                len: new_len,
            }
        }
    }
}
