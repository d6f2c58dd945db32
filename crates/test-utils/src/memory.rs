//! In-memory dataset fixture.
//!
//! [`MemoryDataset`] implements [`DataSource`] over plain vectors and
//! mirrors the load semantics of the zarr handle: time-major output,
//! positional selections, per-variable kind from dimension count. The
//! builders produce small datasets with deterministic values so tests can
//! assert exact numbers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, TimeZone, Utc};
use zarr_dataset::{
    DataSource, DatasetError, FeatureSelection, RealizedDataset, ResultShape, SelectionPlan,
    VariableValues,
};

/// One data variable held in memory.
#[derive(Debug, Clone)]
pub struct MemoryVariable {
    /// Dimension names, outermost first.
    pub dims: Vec<String>,
    pub attrs: serde_json::Map<String, serde_json::Value>,
    /// Row-major values covering the full shape.
    pub values: Vec<f32>,
    pub shape: Vec<usize>,
}

/// An in-memory [`DataSource`].
#[derive(Debug, Default)]
pub struct MemoryDataset {
    pub attributes: serde_json::Map<String, serde_json::Value>,
    pub f64_axes: HashMap<String, Vec<f64>>,
    pub i64_axes: HashMap<String, Vec<i64>>,
    pub time_axes: HashMap<String, Vec<DateTime<Utc>>>,
    pub variables: HashMap<String, MemoryVariable>,
    loads: AtomicUsize,
}

impl MemoryDataset {
    /// How many times [`DataSource::load`] has run. The pipeline must
    /// materialize exactly once per fetch.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    fn axis_len(&self, name: &str) -> usize {
        self.f64_axes
            .get(name)
            .map(Vec::len)
            .or_else(|| self.i64_axes.get(name).map(Vec::len))
            .or_else(|| self.time_axes.get(name).map(Vec::len))
            .unwrap_or(0)
    }
}

impl DataSource for MemoryDataset {
    fn variable_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.variables.keys().cloned().collect();
        names.sort();
        names
    }

    fn dimensions_of(&self, name: &str) -> zarr_dataset::Result<Vec<String>> {
        if let Some(var) = self.variables.get(name) {
            return Ok(var.dims.clone());
        }
        if self.f64_axes.contains_key(name)
            || self.i64_axes.contains_key(name)
            || self.time_axes.contains_key(name)
        {
            return Ok(vec![name.to_string()]);
        }
        Err(DatasetError::MissingVariable(name.to_string()))
    }

    fn attributes(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.attributes
    }

    fn variable_attributes(
        &self,
        name: &str,
    ) -> zarr_dataset::Result<serde_json::Map<String, serde_json::Value>> {
        if let Some(var) = self.variables.get(name) {
            return Ok(var.attrs.clone());
        }
        if self.dimensions_of(name).is_ok() {
            return Ok(serde_json::Map::new());
        }
        Err(DatasetError::MissingVariable(name.to_string()))
    }

    fn read_f64(&self, name: &str) -> zarr_dataset::Result<Vec<f64>> {
        self.f64_axes
            .get(name)
            .cloned()
            .ok_or_else(|| DatasetError::MissingVariable(name.to_string()))
    }

    fn read_i64(&self, name: &str) -> zarr_dataset::Result<Vec<i64>> {
        self.i64_axes
            .get(name)
            .cloned()
            .ok_or_else(|| DatasetError::MissingVariable(name.to_string()))
    }

    fn read_times(&self, name: &str) -> zarr_dataset::Result<Vec<DateTime<Utc>>> {
        self.time_axes
            .get(name)
            .cloned()
            .ok_or_else(|| DatasetError::MissingVariable(name.to_string()))
    }

    fn load(&self, plan: &SelectionPlan) -> zarr_dataset::Result<RealizedDataset> {
        self.loads.fetch_add(1, Ordering::SeqCst);

        let times_full = self.read_times(&plan.axes.time)?;
        let time_indices = plan.time.resolve(times_full.len());
        let times: Vec<DateTime<Utc>> =
            time_indices.iter().map(|&i| times_full[i]).collect();

        let mut variables = HashMap::new();

        if let Some(window) = &plan.window {
            let x_full = self.read_f64(&plan.axes.x)?;
            let y_full = self.read_f64(&plan.axes.y)?;
            let x = x_full[window.cols.clone()].to_vec();
            let y = y_full[window.rows.clone()].to_vec();
            let full_rows = y_full.len();
            let full_cols = x_full.len();

            for name in &plan.variables {
                let var = self
                    .variables
                    .get(name)
                    .ok_or_else(|| DatasetError::MissingVariable(name.to_string()))?;
                debug_assert_eq!(var.shape, vec![times_full.len(), full_rows, full_cols]);
                let mut values =
                    Vec::with_capacity(times.len() * window.rows.len() * window.cols.len());
                for &t in &time_indices {
                    for r in window.rows.clone() {
                        for c in window.cols.clone() {
                            values.push(var.values[(t * full_rows + r) * full_cols + c]);
                        }
                    }
                }
                variables.insert(name.clone(), VariableValues::Grid(values));
            }

            return Ok(RealizedDataset {
                times,
                x,
                y,
                feature_ids: Vec::new(),
                variables,
                shape: ResultShape::Grid {
                    time_count: time_indices.len(),
                    rows: window.rows.len(),
                    cols: window.cols.len(),
                },
            });
        }

        let feature_axis = plan.axes.feature_id.as_deref().ok_or_else(|| {
            DatasetError::invalid_metadata("vector selection without a feature axis")
        })?;
        let axis_len = self.axis_len(feature_axis);
        let feature_indices = match &plan.features {
            FeatureSelection::All => (0..axis_len).collect::<Vec<_>>(),
            other => other.resolve(axis_len),
        };

        let ids_full = self.read_i64(feature_axis)?;
        let x_full = self.read_f64(&plan.axes.x)?;
        let y_full = self.read_f64(&plan.axes.y)?;
        let feature_ids: Vec<i64> = feature_indices.iter().map(|&i| ids_full[i]).collect();
        let x: Vec<f64> = feature_indices.iter().map(|&i| x_full[i]).collect();
        let y: Vec<f64> = feature_indices.iter().map(|&i| y_full[i]).collect();

        for name in &plan.variables {
            let var = self
                .variables
                .get(name)
                .ok_or_else(|| DatasetError::MissingVariable(name.to_string()))?;
            let values = match var.dims.len() {
                1 => VariableValues::PerFeature(
                    feature_indices.iter().map(|&f| var.values[f]).collect(),
                ),
                2 => {
                    let feature_len = var.shape[1];
                    let mut out =
                        Vec::with_capacity(time_indices.len() * feature_indices.len());
                    for &t in &time_indices {
                        for &f in &feature_indices {
                            out.push(var.values[t * feature_len + f]);
                        }
                    }
                    VariableValues::TimeSeries(out)
                }
                n => {
                    return Err(DatasetError::invalid_metadata(format!(
                        "variable {name} has unsupported rank {n}"
                    )))
                }
            };
            variables.insert(name.clone(), values);
        }

        Ok(RealizedDataset {
            times,
            x,
            y,
            feature_ids,
            variables,
            shape: ResultShape::Features {
                time_count: time_indices.len(),
                feature_count: feature_indices.len(),
            },
        })
    }
}

fn attrs(pairs: &[(&str, &str)]) -> serde_json::Map<String, serde_json::Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.to_string())))
        .collect()
}

/// A vector dataset: 4 features, 3 hourly time steps starting
/// 2020-01-01T00:00:00Z.
///
/// Axes: `time`, `feature_id` (101..104), `longitude`
/// (-100, -95, -90, -85), `latitude` (35, 32, 38, 35). Variables:
/// `streamflow` `[time, feature_id]` with value `t * 10 + f`, and
/// `elevation` `[feature_id]` with value `100 * (f + 1)`.
pub fn vector_dataset() -> MemoryDataset {
    let times: Vec<DateTime<Utc>> = (0..3)
        .map(|h| Utc.with_ymd_and_hms(2020, 1, 1, h, 0, 0).unwrap())
        .collect();

    let mut dataset = MemoryDataset::default();
    dataset.time_axes.insert("time".to_string(), times);
    dataset
        .i64_axes
        .insert("feature_id".to_string(), vec![101, 102, 103, 104]);
    dataset
        .f64_axes
        .insert("longitude".to_string(), vec![-100.0, -95.0, -90.0, -85.0]);
    dataset
        .f64_axes
        .insert("latitude".to_string(), vec![35.0, 32.0, 38.0, 35.0]);

    let streamflow: Vec<f32> = (0..3)
        .flat_map(|t| (0..4).map(move |f| (t * 10 + f) as f32))
        .collect();
    dataset.variables.insert(
        "streamflow".to_string(),
        MemoryVariable {
            dims: vec!["time".to_string(), "feature_id".to_string()],
            attrs: attrs(&[("units", "m3 s-1"), ("long_name", "River Flow")]),
            values: streamflow,
            shape: vec![3, 4],
        },
    );
    dataset.variables.insert(
        "elevation".to_string(),
        MemoryVariable {
            dims: vec!["feature_id".to_string()],
            attrs: attrs(&[("units", "m")]),
            values: vec![100.0, 200.0, 300.0, 400.0],
            shape: vec![4],
        },
    );
    dataset
}

/// A gridded dataset: 3 time steps, 4 rows, 5 columns.
///
/// Axes: `time`, `y` descending (33, 32, 31, 30), `x`
/// (-110, -109, -108, -107, -106). Variable `depth` `[time, y, x]` with
/// value `t * 100 + row * 10 + col`, except NaN at (t=0, row=1, col=1).
pub fn grid_dataset() -> MemoryDataset {
    let times: Vec<DateTime<Utc>> = (0..3)
        .map(|h| Utc.with_ymd_and_hms(2020, 1, 1, h, 0, 0).unwrap())
        .collect();

    let mut dataset = MemoryDataset::default();
    dataset.time_axes.insert("time".to_string(), times);
    dataset
        .f64_axes
        .insert("y".to_string(), vec![33.0, 32.0, 31.0, 30.0]);
    dataset.f64_axes.insert(
        "x".to_string(),
        vec![-110.0, -109.0, -108.0, -107.0, -106.0],
    );

    let mut depth: Vec<f32> = (0..3)
        .flat_map(|t| {
            (0..4).flat_map(move |r| (0..5).map(move |c| (t * 100 + r * 10 + c) as f32))
        })
        .collect();
    depth[6] = f32::NAN; // t=0, row=1, col=1
    dataset.variables.insert(
        "depth".to_string(),
        MemoryVariable {
            dims: vec!["time".to_string(), "y".to_string(), "x".to_string()],
            attrs: attrs(&[("units", "m"), ("long_name", "Ponded Depth")]),
            values: depth,
            shape: vec![3, 4, 5],
        },
    );
    dataset
}
