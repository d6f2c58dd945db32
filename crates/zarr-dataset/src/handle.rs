//! Lazily-opened zarr dataset handles.
//!
//! A [`ZarrDataset`] is opened from a store's consolidated metadata
//! (`.zmetadata`), so opening costs one small object read regardless of
//! dataset size. Individual arrays are opened on first use and chunk data
//! is only retrieved when a [`SelectionPlan`] is materialized through
//! [`DataSource::load`].

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use zarrs::array::{Array, DataType};
use zarrs::array_subset::ArraySubset;
use zarrs::storage::{ReadableStorage, ReadableStorageTraits};
use zarrs_storage::StoreKey;

use crate::cf_time::CfTimeUnits;
use crate::error::{DatasetError, Result};
use crate::plan::{
    contiguous_runs, FeatureSelection, RealizedDataset, ResultShape, SelectionPlan,
    VariableValues,
};
use crate::source::DataSource;

/// Metadata for one array, parsed from consolidated metadata.
#[derive(Debug, Clone)]
pub struct VariableMeta {
    /// Dimension names, outermost first (`_ARRAY_DIMENSIONS`).
    pub dims: Vec<String>,
    /// The array's `.zattrs` contents.
    pub attrs: serde_json::Map<String, serde_json::Value>,
    /// Array shape.
    pub shape: Vec<u64>,
}

/// Parsed `.zmetadata` for a dataset.
#[derive(Debug, Clone)]
pub struct ConsolidatedMetadata {
    /// Root `.zattrs` of the dataset.
    pub attributes: serde_json::Map<String, serde_json::Value>,
    /// All arrays in the dataset, keyed by name.
    pub arrays: HashMap<String, VariableMeta>,
}

impl ConsolidatedMetadata {
    /// Parse the JSON body of a `.zmetadata` object.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let doc: serde_json::Value = serde_json::from_slice(bytes)?;
        let metadata = doc
            .get("metadata")
            .and_then(|m| m.as_object())
            .ok_or_else(|| {
                DatasetError::invalid_metadata("consolidated metadata missing 'metadata' object")
            })?;

        let attributes = metadata
            .get(".zattrs")
            .and_then(|a| a.as_object())
            .cloned()
            .unwrap_or_default();

        let mut arrays = HashMap::new();
        for (key, value) in metadata {
            let Some(name) = key.strip_suffix("/.zarray") else {
                continue;
            };
            let shape = value
                .get("shape")
                .and_then(|s| s.as_array())
                .map(|s| s.iter().filter_map(|v| v.as_u64()).collect::<Vec<_>>())
                .unwrap_or_default();

            let attrs = metadata
                .get(&format!("{name}/.zattrs"))
                .and_then(|a| a.as_object())
                .cloned()
                .unwrap_or_default();

            let dims = attrs
                .get("_ARRAY_DIMENSIONS")
                .and_then(|d| d.as_array())
                .map(|d| {
                    d.iter()
                        .filter_map(|v| v.as_str().map(String::from))
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default();

            arrays.insert(name.to_string(), VariableMeta { dims, attrs, shape });
        }

        Ok(Self { attributes, arrays })
    }

    /// Names of the data variables, excluding coordinate arrays.
    ///
    /// An array counts as a coordinate if its name matches its only
    /// dimension, or if any other array lists it in a `coordinates`
    /// attribute. This mirrors the xarray convention.
    pub fn data_variable_names(&self) -> Vec<String> {
        let mut coordinates: HashSet<&str> = HashSet::new();
        for (name, meta) in &self.arrays {
            if meta.dims.len() == 1 && meta.dims[0] == *name {
                coordinates.insert(name.as_str());
            }
            if let Some(coords) = meta.attrs.get("coordinates").and_then(|c| c.as_str()) {
                coordinates.extend(coords.split_whitespace());
            }
        }
        let mut names: Vec<String> = self
            .arrays
            .keys()
            .filter(|name| !coordinates.contains(name.as_str()))
            .cloned()
            .collect();
        names.sort();
        names
    }
}

/// Value decoding parameters for one array.
#[derive(Debug, Clone, Copy)]
struct Decode {
    fill: Option<f64>,
    scale: f64,
    offset: f64,
}

impl Decode {
    fn from_attrs(
        attrs: &serde_json::Map<String, serde_json::Value>,
        fill: Option<f64>,
    ) -> Self {
        Self {
            fill,
            scale: attrs
                .get("scale_factor")
                .and_then(|v| v.as_f64())
                .unwrap_or(1.0),
            offset: attrs
                .get("add_offset")
                .and_then(|v| v.as_f64())
                .unwrap_or(0.0),
        }
    }

    /// Decode a raw stored value. Fill values come back as NaN.
    fn apply(&self, raw: f64) -> f64 {
        if raw.is_nan() {
            return f64::NAN;
        }
        if let Some(fill) = self.fill {
            if raw == fill {
                return f64::NAN;
            }
        }
        raw * self.scale + self.offset
    }
}

/// How a data variable maps onto the dataset's axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VariableKind {
    /// One value per feature, no time axis.
    PerFeature,
    /// `[time, feature]`.
    TimeSeries,
    /// `[time, row, col]`.
    Grid,
}

/// A lazily-opened zarr dataset.
pub struct ZarrDataset {
    storage: ReadableStorage,
    subpath: String,
    meta: ConsolidatedMetadata,
    arrays: Mutex<HashMap<String, Arc<Array<dyn ReadableStorageTraits>>>>,
    coord_cache: Mutex<HashMap<String, Arc<Vec<f64>>>>,
}

impl ZarrDataset {
    /// Open a dataset rooted at `subpath` within `storage`.
    ///
    /// Reads only the consolidated metadata object; no chunk data is
    /// touched.
    pub fn open(storage: ReadableStorage, subpath: &str) -> Result<Self> {
        let subpath = subpath.trim_matches('/').to_string();
        let key_str = if subpath.is_empty() {
            ".zmetadata".to_string()
        } else {
            format!("{subpath}/.zmetadata")
        };
        let key = StoreKey::new(&key_str)
            .map_err(|e| DatasetError::open_failed(format!("bad store key {key_str}: {e}")))?;
        let bytes = storage
            .get(&key)
            .map_err(|e| DatasetError::open_failed(format!("failed to read {key_str}: {e}")))?
            .ok_or_else(|| {
                DatasetError::open_failed(format!("no consolidated metadata at {key_str}"))
            })?;

        let meta = ConsolidatedMetadata::parse(&bytes)?;
        tracing::debug!(
            subpath = %subpath,
            arrays = meta.arrays.len(),
            "opened zarr dataset"
        );

        Ok(Self {
            storage,
            subpath,
            meta,
            arrays: Mutex::new(HashMap::new()),
            coord_cache: Mutex::new(HashMap::new()),
        })
    }

    /// Parsed consolidated metadata.
    pub fn metadata(&self) -> &ConsolidatedMetadata {
        &self.meta
    }

    fn array_meta(&self, name: &str) -> Result<&VariableMeta> {
        self.meta
            .arrays
            .get(name)
            .ok_or_else(|| DatasetError::MissingVariable(name.to_string()))
    }

    fn array(&self, name: &str) -> Result<Arc<Array<dyn ReadableStorageTraits>>> {
        if let Some(array) = self.arrays.lock().unwrap().get(name) {
            return Ok(array.clone());
        }
        let path = if self.subpath.is_empty() {
            format!("/{name}")
        } else {
            format!("/{}/{name}", self.subpath)
        };
        let array = Array::open(self.storage.clone(), &path)
            .map_err(|e| DatasetError::open_failed(format!("failed to open array {name}: {e}")))?;
        let array = Arc::new(array);
        self.arrays
            .lock()
            .unwrap()
            .insert(name.to_string(), array.clone());
        Ok(array)
    }

    fn kind_of(&self, name: &str) -> Result<VariableKind> {
        let meta = self.array_meta(name)?;
        match meta.dims.len() {
            1 => Ok(VariableKind::PerFeature),
            2 => Ok(VariableKind::TimeSeries),
            3 => Ok(VariableKind::Grid),
            n => Err(DatasetError::invalid_metadata(format!(
                "variable {name} has unsupported rank {n}"
            ))),
        }
    }

    /// Retrieve a subset of an array as decoded f64 values.
    fn retrieve_f64(
        &self,
        array: &Array<dyn ReadableStorageTraits>,
        name: &str,
        subset: &ArraySubset,
        decode: &Decode,
    ) -> Result<Vec<f64>> {
        let read_err =
            |e: zarrs::array::ArrayError| DatasetError::read_failed(format!("{name}: {e}"));
        let raw: Vec<f64> = match array.data_type() {
            DataType::Float32 => array
                .retrieve_array_subset_elements::<f32>(subset)
                .map_err(read_err)?
                .into_iter()
                .map(f64::from)
                .collect(),
            DataType::Float64 => array
                .retrieve_array_subset_elements::<f64>(subset)
                .map_err(read_err)?,
            DataType::Int16 => array
                .retrieve_array_subset_elements::<i16>(subset)
                .map_err(read_err)?
                .into_iter()
                .map(f64::from)
                .collect(),
            DataType::Int32 => array
                .retrieve_array_subset_elements::<i32>(subset)
                .map_err(read_err)?
                .into_iter()
                .map(f64::from)
                .collect(),
            DataType::Int64 => array
                .retrieve_array_subset_elements::<i64>(subset)
                .map_err(read_err)?
                .into_iter()
                .map(|v| v as f64)
                .collect(),
            DataType::UInt8 => array
                .retrieve_array_subset_elements::<u8>(subset)
                .map_err(read_err)?
                .into_iter()
                .map(f64::from)
                .collect(),
            DataType::UInt16 => array
                .retrieve_array_subset_elements::<u16>(subset)
                .map_err(read_err)?
                .into_iter()
                .map(f64::from)
                .collect(),
            DataType::UInt32 => array
                .retrieve_array_subset_elements::<u32>(subset)
                .map_err(read_err)?
                .into_iter()
                .map(f64::from)
                .collect(),
            other => {
                return Err(DatasetError::invalid_metadata(format!(
                    "variable {name} has unsupported data type {other}"
                )))
            }
        };
        Ok(raw.into_iter().map(|v| decode.apply(v)).collect())
    }

    /// The array's declared fill value as f64, if the data type has one.
    fn fill_as_f64(array: &Array<dyn ReadableStorageTraits>) -> Option<f64> {
        let bytes = array.fill_value().as_ne_bytes();
        match array.data_type() {
            DataType::Float32 => bytes
                .try_into()
                .ok()
                .map(|b| f64::from(f32::from_ne_bytes(b))),
            DataType::Float64 => bytes.try_into().ok().map(f64::from_ne_bytes),
            DataType::Int16 => bytes
                .try_into()
                .ok()
                .map(|b| f64::from(i16::from_ne_bytes(b))),
            DataType::Int32 => bytes
                .try_into()
                .ok()
                .map(|b| f64::from(i32::from_ne_bytes(b))),
            DataType::Int64 => bytes
                .try_into()
                .ok()
                .map(|b| i64::from_ne_bytes(b) as f64),
            DataType::UInt8 => bytes
                .try_into()
                .ok()
                .map(|b| f64::from(u8::from_ne_bytes(b))),
            DataType::UInt16 => bytes
                .try_into()
                .ok()
                .map(|b| f64::from(u16::from_ne_bytes(b))),
            DataType::UInt32 => bytes
                .try_into()
                .ok()
                .map(|b| f64::from(u32::from_ne_bytes(b))),
            _ => None,
        }
    }

    /// Read and cache a full one-dimensional axis as raw f64 values.
    fn read_axis_raw(&self, name: &str) -> Result<Arc<Vec<f64>>> {
        if let Some(values) = self.coord_cache.lock().unwrap().get(name) {
            return Ok(values.clone());
        }
        let meta = self.array_meta(name)?;
        if meta.dims.len() != 1 {
            return Err(DatasetError::invalid_metadata(format!(
                "axis {name} is not one-dimensional"
            )));
        }
        let array = self.array(name)?;
        let subset = ArraySubset::new_with_shape(meta.shape.clone());
        let decode = Decode {
            fill: None,
            scale: 1.0,
            offset: 0.0,
        };
        let values = Arc::new(self.retrieve_f64(&array, name, &subset, &decode)?);
        self.coord_cache
            .lock()
            .unwrap()
            .insert(name.to_string(), values.clone());
        Ok(values)
    }

    fn axis_len(&self, name: &str) -> Result<usize> {
        let meta = self.array_meta(name)?;
        Ok(meta.shape.first().copied().unwrap_or(0) as usize)
    }

    /// Load a `[feature]` variable for the selected feature runs.
    fn load_per_feature(
        &self,
        name: &str,
        feature_runs: &[std::ops::Range<usize>],
        feature_count: usize,
    ) -> Result<Vec<f32>> {
        let array = self.array(name)?;
        let meta = self.array_meta(name)?;
        let decode = Decode::from_attrs(&meta.attrs, Self::fill_as_f64(&array));
        let mut out = Vec::with_capacity(feature_count);
        for run in feature_runs {
            let subset = ArraySubset::new_with_start_shape(
                vec![run.start as u64],
                vec![run.len() as u64],
            )
            .map_err(|e| DatasetError::read_failed(format!("{name}: {e}")))?;
            let block = self.retrieve_f64(&array, name, &subset, &decode)?;
            out.extend(block.into_iter().map(|v| v as f32));
        }
        Ok(out)
    }

    /// Load a `[time, feature]` variable into a time-major buffer.
    fn load_time_series(
        &self,
        name: &str,
        time_runs: &[std::ops::Range<usize>],
        feature_runs: &[std::ops::Range<usize>],
        time_count: usize,
        feature_count: usize,
    ) -> Result<Vec<f32>> {
        let array = self.array(name)?;
        let meta = self.array_meta(name)?;
        let decode = Decode::from_attrs(&meta.attrs, Self::fill_as_f64(&array));
        let mut out = vec![f32::NAN; time_count * feature_count];

        let mut t_base = 0usize;
        for time_run in time_runs {
            let mut f_base = 0usize;
            for feature_run in feature_runs {
                let subset = ArraySubset::new_with_start_shape(
                    vec![time_run.start as u64, feature_run.start as u64],
                    vec![time_run.len() as u64, feature_run.len() as u64],
                )
                .map_err(|e| DatasetError::read_failed(format!("{name}: {e}")))?;
                let block = self.retrieve_f64(&array, name, &subset, &decode)?;
                let f_len = feature_run.len();
                for ti in 0..time_run.len() {
                    let dst = (t_base + ti) * feature_count + f_base;
                    for fi in 0..f_len {
                        out[dst + fi] = block[ti * f_len + fi] as f32;
                    }
                }
                f_base += f_len;
            }
            t_base += time_run.len();
        }
        Ok(out)
    }

    /// Load a `[time, row, col]` variable for one spatial window.
    fn load_grid(
        &self,
        name: &str,
        time_runs: &[std::ops::Range<usize>],
        window: &crate::plan::GridWindow,
    ) -> Result<Vec<f32>> {
        let array = self.array(name)?;
        let meta = self.array_meta(name)?;
        let decode = Decode::from_attrs(&meta.attrs, Self::fill_as_f64(&array));
        let mut out = Vec::new();
        for time_run in time_runs {
            let subset = ArraySubset::new_with_start_shape(
                vec![
                    time_run.start as u64,
                    window.rows.start as u64,
                    window.cols.start as u64,
                ],
                vec![
                    time_run.len() as u64,
                    window.rows.len() as u64,
                    window.cols.len() as u64,
                ],
            )
            .map_err(|e| DatasetError::read_failed(format!("{name}: {e}")))?;
            let block = self.retrieve_f64(&array, name, &subset, &decode)?;
            out.extend(block.into_iter().map(|v| v as f32));
        }
        Ok(out)
    }
}

impl DataSource for ZarrDataset {
    fn variable_names(&self) -> Vec<String> {
        self.meta.data_variable_names()
    }

    fn dimensions_of(&self, name: &str) -> Result<Vec<String>> {
        Ok(self.array_meta(name)?.dims.clone())
    }

    fn attributes(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.meta.attributes
    }

    fn variable_attributes(
        &self,
        name: &str,
    ) -> Result<serde_json::Map<String, serde_json::Value>> {
        Ok(self.array_meta(name)?.attrs.clone())
    }

    fn read_f64(&self, name: &str) -> Result<Vec<f64>> {
        Ok(self.read_axis_raw(name)?.as_ref().clone())
    }

    fn read_i64(&self, name: &str) -> Result<Vec<i64>> {
        let meta = self.array_meta(name)?;
        if meta.dims.len() != 1 {
            return Err(DatasetError::invalid_metadata(format!(
                "axis {name} is not one-dimensional"
            )));
        }
        let array = self.array(name)?;
        let subset = ArraySubset::new_with_shape(meta.shape.clone());
        let read_err =
            |e: zarrs::array::ArrayError| DatasetError::read_failed(format!("{name}: {e}"));
        match array.data_type() {
            DataType::Int32 => Ok(array
                .retrieve_array_subset_elements::<i32>(&subset)
                .map_err(read_err)?
                .into_iter()
                .map(i64::from)
                .collect()),
            DataType::Int64 => array
                .retrieve_array_subset_elements::<i64>(&subset)
                .map_err(read_err),
            DataType::UInt32 => Ok(array
                .retrieve_array_subset_elements::<u32>(&subset)
                .map_err(read_err)?
                .into_iter()
                .map(i64::from)
                .collect()),
            other => Err(DatasetError::invalid_metadata(format!(
                "variable {name} has non-integer data type {other}"
            ))),
        }
    }

    fn read_times(&self, name: &str) -> Result<Vec<DateTime<Utc>>> {
        let raw = self.read_axis_raw(name)?;
        let meta = self.array_meta(name)?;
        let units = meta
            .attrs
            .get("units")
            .and_then(|u| u.as_str())
            .ok_or_else(|| {
                DatasetError::invalid_metadata(format!("time axis {name} has no units attribute"))
            })?;
        let cf = CfTimeUnits::parse(units)?;
        Ok(cf.decode_all(&raw))
    }

    fn load(&self, plan: &SelectionPlan) -> Result<RealizedDataset> {
        let times_full = self.read_times(&plan.axes.time)?;
        let time_indices = plan.time.resolve(times_full.len());
        let time_runs = contiguous_runs(&time_indices);
        let times: Vec<DateTime<Utc>> =
            time_indices.iter().map(|&i| times_full[i]).collect();
        let time_count = times.len();

        let mut variables = HashMap::new();

        if let Some(window) = &plan.window {
            let x_full = self.read_axis_raw(&plan.axes.x)?;
            let y_full = self.read_axis_raw(&plan.axes.y)?;
            let x = x_full[window.cols.clone()].to_vec();
            let y = y_full[window.rows.clone()].to_vec();

            for name in &plan.variables {
                if self.kind_of(name)? != VariableKind::Grid {
                    return Err(DatasetError::invalid_metadata(format!(
                        "variable {name} is not gridded"
                    )));
                }
                let values = self.load_grid(name, &time_runs, window)?;
                variables.insert(name.clone(), VariableValues::Grid(values));
            }

            tracing::debug!(
                times = time_count,
                rows = window.rows.len(),
                cols = window.cols.len(),
                variables = variables.len(),
                "materialized grid selection"
            );

            return Ok(RealizedDataset {
                times,
                x,
                y,
                feature_ids: Vec::new(),
                variables,
                shape: ResultShape::Grid {
                    time_count,
                    rows: window.rows.len(),
                    cols: window.cols.len(),
                },
            });
        }

        let feature_axis = plan.axes.feature_id.as_deref().ok_or_else(|| {
            DatasetError::invalid_metadata("vector selection without a feature axis")
        })?;
        let axis_len = self.axis_len(feature_axis)?;
        let feature_indices = match &plan.features {
            FeatureSelection::All => (0..axis_len).collect::<Vec<_>>(),
            other => other.resolve(axis_len),
        };
        let feature_runs = contiguous_runs(&feature_indices);
        let feature_count = feature_indices.len();

        let ids_full = self.read_i64(feature_axis)?;
        let x_full = self.read_axis_raw(&plan.axes.x)?;
        let y_full = self.read_axis_raw(&plan.axes.y)?;
        let feature_ids: Vec<i64> = feature_indices.iter().map(|&i| ids_full[i]).collect();
        let x: Vec<f64> = feature_indices.iter().map(|&i| x_full[i]).collect();
        let y: Vec<f64> = feature_indices.iter().map(|&i| y_full[i]).collect();

        for name in &plan.variables {
            let values = match self.kind_of(name)? {
                VariableKind::PerFeature => VariableValues::PerFeature(
                    self.load_per_feature(name, &feature_runs, feature_count)?,
                ),
                VariableKind::TimeSeries => VariableValues::TimeSeries(self.load_time_series(
                    name,
                    &time_runs,
                    &feature_runs,
                    time_count,
                    feature_count,
                )?),
                VariableKind::Grid => {
                    return Err(DatasetError::invalid_metadata(format!(
                        "variable {name} is gridded but no spatial window was selected"
                    )))
                }
            };
            variables.insert(name.clone(), values);
        }

        tracing::debug!(
            times = time_count,
            features = feature_count,
            variables = variables.len(),
            "materialized feature selection"
        );

        Ok(RealizedDataset {
            times,
            x,
            y,
            feature_ids,
            variables,
            shape: ResultShape::Features {
                time_count,
                feature_count,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ZMETADATA: &str = r#"{
        "metadata": {
            ".zattrs": {"title": "test dataset"},
            "time/.zarray": {"shape": [4], "dtype": "<i4"},
            "time/.zattrs": {"_ARRAY_DIMENSIONS": ["time"], "units": "hours since 1990-01-01"},
            "feature_id/.zarray": {"shape": [3], "dtype": "<i8"},
            "feature_id/.zattrs": {"_ARRAY_DIMENSIONS": ["feature_id"]},
            "latitude/.zarray": {"shape": [3], "dtype": "<f8"},
            "latitude/.zattrs": {"_ARRAY_DIMENSIONS": ["feature_id"]},
            "longitude/.zarray": {"shape": [3], "dtype": "<f8"},
            "longitude/.zattrs": {"_ARRAY_DIMENSIONS": ["feature_id"]},
            "streamflow/.zarray": {"shape": [4, 3], "dtype": "<f4"},
            "streamflow/.zattrs": {
                "_ARRAY_DIMENSIONS": ["time", "feature_id"],
                "coordinates": "latitude longitude",
                "units": "m3 s-1"
            },
            "elevation/.zarray": {"shape": [3], "dtype": "<f4"},
            "elevation/.zattrs": {"_ARRAY_DIMENSIONS": ["feature_id"]}
        },
        "zarr_consolidated_format": 1
    }"#;

    #[test]
    fn test_parse_consolidated_metadata() {
        let meta = ConsolidatedMetadata::parse(ZMETADATA.as_bytes()).unwrap();
        assert_eq!(meta.attributes.get("title").unwrap(), "test dataset");
        assert_eq!(meta.arrays.len(), 6);
        let streamflow = &meta.arrays["streamflow"];
        assert_eq!(streamflow.dims, vec!["time", "feature_id"]);
        assert_eq!(streamflow.shape, vec![4, 3]);
    }

    #[test]
    fn test_data_variables_exclude_coordinates() {
        let meta = ConsolidatedMetadata::parse(ZMETADATA.as_bytes()).unwrap();
        // time and feature_id are excluded by the name==dim rule;
        // latitude and longitude by the coordinates attribute.
        assert_eq!(meta.data_variable_names(), vec!["elevation", "streamflow"]);
    }

    #[test]
    fn test_parse_rejects_missing_metadata_object() {
        assert!(ConsolidatedMetadata::parse(b"{\"oops\": 1}").is_err());
    }

    #[test]
    fn test_decode_scale_offset_and_fill() {
        let mut attrs = serde_json::Map::new();
        attrs.insert("scale_factor".into(), serde_json::json!(0.01));
        attrs.insert("add_offset".into(), serde_json::json!(100.0));
        let decode = Decode::from_attrs(&attrs, Some(-999.0));

        assert!((decode.apply(50.0) - 100.5).abs() < 1e-9);
        assert!(decode.apply(-999.0).is_nan());
        assert!(decode.apply(f64::NAN).is_nan());
    }

    #[test]
    fn test_decode_defaults_identity() {
        let decode = Decode::from_attrs(&serde_json::Map::new(), None);
        assert_eq!(decode.apply(42.0), 42.0);
    }
}
