//! Deferred selection plans and their materialized results.
//!
//! A [`SelectionPlan`] describes what slice of a dataset a query needs
//! without reading any chunk data. Filtering operations narrow the plan;
//! only a final `load` call touches the store, retrieving exactly the
//! selected region. This is what keeps multi-terabyte datasets usable:
//! memory cost is proportional to the selection, never the dataset.

use std::collections::HashMap;
use std::ops::Range;

use chrono::{DateTime, Utc};

/// Names of the coordinate variables backing each axis of a dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AxisFields {
    /// Time coordinate variable.
    pub time: String,
    /// X (longitude or projected easting) coordinate variable.
    pub x: String,
    /// Y (latitude or projected northing) coordinate variable.
    pub y: String,
    /// Feature identifier variable, present for vector datasets only.
    pub feature_id: Option<String>,
}

/// Which time steps a plan selects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeSelection {
    /// Every time step.
    All,
    /// Specific time indices, ascending.
    Indices(Vec<usize>),
}

impl TimeSelection {
    /// Resolve to concrete indices given the axis length.
    pub fn resolve(&self, len: usize) -> Vec<usize> {
        match self {
            TimeSelection::All => (0..len).collect(),
            TimeSelection::Indices(idx) => idx.clone(),
        }
    }

    pub fn count(&self, len: usize) -> usize {
        match self {
            TimeSelection::All => len,
            TimeSelection::Indices(idx) => idx.len(),
        }
    }
}

/// Which features a plan selects (vector datasets).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeatureSelection {
    /// Every feature.
    All,
    /// Specific feature indices, ascending.
    Indices(Vec<usize>),
    /// A contiguous window, used for pagination.
    Slice { offset: usize, len: usize },
}

impl FeatureSelection {
    /// Resolve to concrete indices given the axis length.
    pub fn resolve(&self, len: usize) -> Vec<usize> {
        match self {
            FeatureSelection::All => (0..len).collect(),
            FeatureSelection::Indices(idx) => idx.clone(),
            FeatureSelection::Slice { offset, len: n } => {
                let start = (*offset).min(len);
                let end = (offset + n).min(len);
                (start..end).collect()
            }
        }
    }

    pub fn count(&self, len: usize) -> usize {
        self.resolve(len).len()
    }
}

/// A rectangular window into a gridded dataset, in array index space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridWindow {
    pub rows: Range<usize>,
    pub cols: Range<usize>,
}

impl GridWindow {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() || self.cols.is_empty()
    }
}

/// A deferred description of the data a query needs.
#[derive(Debug, Clone)]
pub struct SelectionPlan {
    /// Data variables to materialize, always including coordinate axes.
    pub variables: Vec<String>,
    /// Coordinate variable names for each axis.
    pub axes: AxisFields,
    /// Time axis selection.
    pub time: TimeSelection,
    /// Feature axis selection (vector datasets).
    pub features: FeatureSelection,
    /// Spatial window (gridded datasets).
    pub window: Option<GridWindow>,
}

impl SelectionPlan {
    /// A plan selecting everything, to be narrowed by filters.
    pub fn all(variables: Vec<String>, axes: AxisFields) -> Self {
        Self {
            variables,
            axes,
            time: TimeSelection::All,
            features: FeatureSelection::All,
            window: None,
        }
    }
}

/// The values of one materialized variable.
#[derive(Debug, Clone, PartialEq)]
pub enum VariableValues {
    /// One value per feature, no time dependence. Length = feature count.
    PerFeature(Vec<f32>),
    /// Time-major feature series: index = t * feature_count + f.
    TimeSeries(Vec<f32>),
    /// Time-major grid: index = t * rows * cols + row * cols + col.
    Grid(Vec<f32>),
}

impl VariableValues {
    pub fn as_slice(&self) -> &[f32] {
        match self {
            VariableValues::PerFeature(v) => v,
            VariableValues::TimeSeries(v) => v,
            VariableValues::Grid(v) => v,
        }
    }
}

/// The logical shape of a realized selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultShape {
    /// Vector result: features with time series.
    Features {
        time_count: usize,
        feature_count: usize,
    },
    /// Gridded result.
    Grid {
        time_count: usize,
        rows: usize,
        cols: usize,
    },
}

/// An in-memory materialization of a [`SelectionPlan`].
#[derive(Debug, Clone)]
pub struct RealizedDataset {
    /// Selected time steps, ascending.
    pub times: Vec<DateTime<Utc>>,
    /// X coordinates: per-feature for vector data, per-column for grids.
    pub x: Vec<f64>,
    /// Y coordinates: per-feature for vector data, per-row for grids.
    pub y: Vec<f64>,
    /// Feature identifiers (vector datasets; empty for grids).
    pub feature_ids: Vec<i64>,
    /// Materialized data variables keyed by name.
    pub variables: HashMap<String, VariableValues>,
    pub shape: ResultShape,
}

impl RealizedDataset {
    /// The time series for one feature of a time-dependent variable.
    /// Returns None for per-feature variables or unknown names.
    pub fn series_for(&self, variable: &str, feature_index: usize) -> Option<Vec<f32>> {
        let feature_count = match self.shape {
            ResultShape::Features { feature_count, .. } => feature_count,
            ResultShape::Grid { .. } => return None,
        };
        match self.variables.get(variable)? {
            VariableValues::TimeSeries(values) => Some(
                (0..self.times.len())
                    .map(|t| values[t * feature_count + feature_index])
                    .collect(),
            ),
            _ => None,
        }
    }
}

/// Group ascending indices into contiguous runs.
///
/// Scattered index selections are retrieved as one subset read per run,
/// which keeps the request count low when a filter matches dense spans.
pub fn contiguous_runs(indices: &[usize]) -> Vec<Range<usize>> {
    let mut runs = Vec::new();
    let mut iter = indices.iter().copied();
    let Some(first) = iter.next() else {
        return runs;
    };
    let mut start = first;
    let mut prev = first;
    for idx in iter {
        if idx == prev + 1 {
            prev = idx;
        } else {
            runs.push(start..prev + 1);
            start = idx;
            prev = idx;
        }
    }
    runs.push(start..prev + 1);
    runs
}
