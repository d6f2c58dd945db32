//! Reprojection of realized results.
//!
//! Point mode transforms the x/y coordinate vectors in place. Raster mode
//! warps the whole grid: a new output grid is laid over the transformed
//! footprint and each output cell samples the source by inverse transform
//! and bilinear interpolation. Identical source and target CRS are a
//! cheap equality short-circuit, not a transform.

use proj4rs::proj::Proj;
use proj4rs::transform::transform;
use zarr_dataset::{RealizedDataset, ResultShape, VariableValues};

use crate::crs::Crs;
use crate::error::{ProviderError, Result};

/// A CRS-to-CRS point transformer. Inputs and outputs are always x,y
/// order; degrees are converted to radians and back for geographic CRS.
pub struct PointTransformer {
    source: Proj,
    target: Proj,
    source_geographic: bool,
    target_geographic: bool,
}

impl PointTransformer {
    pub fn new(source: &Crs, target: &Crs) -> Result<Self> {
        let parse = |crs: &Crs| {
            Proj::from_proj_string(&crs.proj4).map_err(|e| {
                ProviderError::invalid_data(format!("invalid proj4 definition: {e:?}"))
            })
        };
        Ok(Self {
            source: parse(source)?,
            target: parse(target)?,
            source_geographic: source.is_geographic(),
            target_geographic: target.is_geographic(),
        })
    }

    pub fn transform(&self, x: f64, y: f64) -> Result<(f64, f64)> {
        let mut point = if self.source_geographic {
            (x.to_radians(), y.to_radians(), 0.0)
        } else {
            (x, y, 0.0)
        };
        transform(&self.source, &self.target, &mut point)
            .map_err(|e| ProviderError::invalid_data(format!("transform failed: {e:?}")))?;
        if self.target_geographic {
            Ok((point.0.to_degrees(), point.1.to_degrees()))
        } else {
            Ok((point.0, point.1))
        }
    }
}

/// Reproject a realized result from `storage` to `output` CRS.
pub fn project_dataset(
    mut dataset: RealizedDataset,
    storage: &Crs,
    output: &Crs,
) -> Result<RealizedDataset> {
    if storage.same_as(output) {
        return Ok(dataset);
    }
    match dataset.shape {
        ResultShape::Features { .. } => {
            let forward = PointTransformer::new(storage, output)?;
            for i in 0..dataset.x.len() {
                let (x, y) = forward.transform(dataset.x[i], dataset.y[i])?;
                dataset.x[i] = x;
                dataset.y[i] = y;
            }
            Ok(dataset)
        }
        ResultShape::Grid { .. } => warp_grid(dataset, storage, output),
    }
}

/// Warp a gridded result to the output CRS.
///
/// The output grid keeps the source row/column counts; its axes span the
/// transformed footprint of the source grid. Cells that map outside the
/// source footprint are NaN.
fn warp_grid(
    dataset: RealizedDataset,
    storage: &Crs,
    output: &Crs,
) -> Result<RealizedDataset> {
    let ResultShape::Grid {
        time_count,
        rows,
        cols,
    } = dataset.shape
    else {
        return Err(ProviderError::invalid_data("warp requires a gridded result"));
    };
    if rows == 0 || cols == 0 {
        return Ok(dataset);
    }

    let forward = PointTransformer::new(storage, output)?;
    let inverse = PointTransformer::new(output, storage)?;

    // Output footprint from the transformed source grid edges.
    let mut min_x = f64::INFINITY;
    let mut max_x = f64::NEG_INFINITY;
    let mut min_y = f64::INFINITY;
    let mut max_y = f64::NEG_INFINITY;
    for &sy in &dataset.y {
        for sx in [dataset.x[0], dataset.x[cols - 1]] {
            let (x, y) = forward.transform(sx, sy)?;
            min_x = min_x.min(x);
            max_x = max_x.max(x);
            min_y = min_y.min(y);
            max_y = max_y.max(y);
        }
    }
    for &sx in &dataset.x {
        for sy in [dataset.y[0], dataset.y[rows - 1]] {
            let (x, y) = forward.transform(sx, sy)?;
            min_x = min_x.min(x);
            max_x = max_x.max(x);
            min_y = min_y.min(y);
            max_y = max_y.max(y);
        }
    }

    let out_x: Vec<f64> = (0..cols)
        .map(|c| min_x + (max_x - min_x) * c as f64 / (cols.max(2) - 1) as f64)
        .collect();
    // Keep the source's row direction (north-up grids run max to min).
    let y_descending = dataset.y[0] > dataset.y[rows - 1];
    let out_y: Vec<f64> = (0..rows)
        .map(|r| {
            let frac = r as f64 / (rows.max(2) - 1) as f64;
            if y_descending {
                max_y - (max_y - min_y) * frac
            } else {
                min_y + (max_y - min_y) * frac
            }
        })
        .collect();

    let mut variables = std::collections::HashMap::new();
    for (name, values) in &dataset.variables {
        let VariableValues::Grid(source) = values else {
            return Err(ProviderError::invalid_data(format!(
                "variable {name} is not gridded"
            )));
        };
        let mut warped = vec![f32::NAN; time_count * rows * cols];
        for (r, &oy) in out_y.iter().enumerate() {
            for (c, &ox) in out_x.iter().enumerate() {
                let (sx, sy) = inverse.transform(ox, oy)?;
                let (Some(fx), Some(fy)) = (
                    fractional_index(&dataset.x, sx),
                    fractional_index(&dataset.y, sy),
                ) else {
                    continue;
                };
                for t in 0..time_count {
                    let plane = &source[t * rows * cols..(t + 1) * rows * cols];
                    warped[t * rows * cols + r * cols + c] =
                        bilinear(plane, rows, cols, fy, fx);
                }
            }
        }
        variables.insert(name.clone(), VariableValues::Grid(warped));
    }

    Ok(RealizedDataset {
        times: dataset.times,
        x: out_x,
        y: out_y,
        feature_ids: Vec::new(),
        variables,
        shape: dataset.shape,
    })
}

/// Fractional position of `value` along a monotonic axis, or None when
/// outside the axis extent.
fn fractional_index(axis: &[f64], value: f64) -> Option<f64> {
    if axis.len() < 2 {
        return None;
    }
    let ascending = axis[0] <= axis[axis.len() - 1];
    for i in 0..axis.len() - 1 {
        let (lo, hi) = if ascending {
            (axis[i], axis[i + 1])
        } else {
            (axis[i + 1], axis[i])
        };
        if value >= lo && value <= hi {
            let span = axis[i + 1] - axis[i];
            if span == 0.0 {
                return Some(i as f64);
            }
            return Some(i as f64 + (value - axis[i]) / span);
        }
    }
    None
}

/// Sample a row-major plane at a fractional (row, col) position.
fn bilinear(plane: &[f32], rows: usize, cols: usize, row: f64, col: f64) -> f32 {
    let r0 = (row.floor() as usize).min(rows - 1);
    let c0 = (col.floor() as usize).min(cols - 1);
    let r1 = (r0 + 1).min(rows - 1);
    let c1 = (c0 + 1).min(cols - 1);
    let fr = (row - r0 as f64) as f32;
    let fc = (col - c0 as f64) as f32;

    let v00 = plane[r0 * cols + c0];
    let v01 = plane[r0 * cols + c1];
    let v10 = plane[r1 * cols + c0];
    let v11 = plane[r1 * cols + c1];
    if v00.is_nan() || v01.is_nan() || v10.is_nan() || v11.is_nan() {
        // Nearest neighbor when any corner is missing.
        let r = if fr < 0.5 { r0 } else { r1 };
        let c = if fc < 0.5 { c0 } else { c1 };
        return plane[r * cols + c];
    }
    let top = v00 * (1.0 - fc) + v01 * fc;
    let bottom = v10 * (1.0 - fc) + v11 * fc;
    top * (1.0 - fr) + bottom * fr
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::HashMap;

    fn point_result(x: Vec<f64>, y: Vec<f64>) -> RealizedDataset {
        let n = x.len();
        RealizedDataset {
            times: vec![Utc::now()],
            x,
            y,
            feature_ids: (0..n as i64).collect(),
            variables: HashMap::new(),
            shape: ResultShape::Features {
                time_count: 1,
                feature_count: n,
            },
        }
    }

    #[test]
    fn test_identity_projection_is_untouched() {
        let wgs84 = Crs::wgs84();
        let input = point_result(vec![-95.0, -90.0], vec![35.0, 40.0]);
        let output = project_dataset(input, &wgs84, &Crs::from_epsg(4326).unwrap()).unwrap();
        assert_eq!(output.x, vec![-95.0, -90.0]);
        assert_eq!(output.y, vec![35.0, 40.0]);
    }

    #[test]
    fn test_projection_changes_coordinates() {
        let wgs84 = Crs::wgs84();
        let mercator = Crs::from_epsg(3857).unwrap();
        let input = point_result(vec![-95.0], vec![35.0]);
        let output = project_dataset(input, &wgs84, &mercator).unwrap();
        // Web Mercator of (-95, 35), within a meter.
        assert!((output.x[0] - -10_575_351.6).abs() < 1.0);
        assert!((output.y[0] - 4_163_881.1).abs() < 1.0);
    }

    #[test]
    fn test_round_trip_recovers_coordinates() {
        let wgs84 = Crs::wgs84();
        let mercator = Crs::from_epsg(3857).unwrap();
        let forward = PointTransformer::new(&wgs84, &mercator).unwrap();
        let back = PointTransformer::new(&mercator, &wgs84).unwrap();
        let (mx, my) = forward.transform(-95.0, 35.0).unwrap();
        let (lon, lat) = back.transform(mx, my).unwrap();
        assert!((lon - -95.0).abs() < 1e-6);
        assert!((lat - 35.0).abs() < 1e-6);
    }

    fn grid_result(x: Vec<f64>, y: Vec<f64>, values: Vec<f32>) -> RealizedDataset {
        let (rows, cols) = (y.len(), x.len());
        RealizedDataset {
            times: vec![Utc::now()],
            x,
            y,
            feature_ids: Vec::new(),
            variables: HashMap::from([("depth".to_string(), VariableValues::Grid(values))]),
            shape: ResultShape::Grid {
                time_count: 1,
                rows,
                cols,
            },
        }
    }

    #[test]
    fn test_warp_grid_resamples_between_source_rows() {
        let x = vec![-110.0, -109.0, -108.0, -107.0, -106.0];
        let y = vec![33.0, 32.0, 31.0, 30.0];
        let values: Vec<f32> = (0..4)
            .flat_map(|r| (0..5).map(move |c| (r * 10 + c) as f32))
            .collect();
        let input = grid_result(x, y, values);

        let wgs84 = Crs::wgs84();
        let mercator = Crs::from_epsg(3857).unwrap();
        let output = project_dataset(input, &wgs84, &mercator).unwrap();

        assert_eq!(
            output.shape,
            ResultShape::Grid {
                time_count: 1,
                rows: 4,
                cols: 5
            }
        );
        // The x axis spans the mercator footprint of the source lons.
        assert!((output.x[0] - -12_245_143.99).abs() < 1.0);
        assert!((output.x[4] - -11_799_866.03).abs() < 1.0);
        // The source's north-up row direction survives the warp.
        assert!(output.y[0] > output.y[3]);

        let VariableValues::Grid(warped) = &output.variables["depth"] else {
            panic!("expected grid values");
        };
        // Mercator y is nonlinear in latitude, so interior rows of the
        // evenly spaced output grid fall between source rows and must
        // interpolate, not copy.
        let mid = warped[5 + 2];
        assert!(mid > 2.0 && mid < 12.0);
        assert!((mid - 12.0).abs() < 0.5);
        let lower = warped[2 * 5 + 2];
        assert!(lower > 12.0 && lower < 22.0);
        assert!((lower - 22.0).abs() < 0.5);
    }

    #[test]
    fn test_warp_grid_marks_cells_outside_footprint_nan() {
        // A conic target: the source footprint becomes a fan, so the
        // rectangular output grid has corner cells with no source data.
        let lcc = Crs::from_proj4(
            "+proj=lcc +lat_1=30 +lat_2=60 +lat_0=40 +lon_0=-97 \
             +x_0=0 +y_0=0 +a=6370000 +b=6370000 +units=m +no_defs",
        )
        .unwrap();
        let x = vec![-110.0, -105.0, -100.0, -95.0, -90.0];
        let y = vec![50.0, 45.0, 40.0, 35.0, 30.0];
        let input = grid_result(x, y, vec![1.0; 25]);

        let output = project_dataset(input, &Crs::wgs84(), &lcc).unwrap();
        let VariableValues::Grid(warped) = &output.variables["depth"] else {
            panic!("expected grid values");
        };
        // The top-left bbox corner lies outside the fan.
        assert!(warped[0].is_nan());
        // The grid center lies inside it and samples the source.
        assert!((warped[2 * 5 + 2] - 1.0).abs() < 1e-5);
        assert!(warped.iter().any(|v| v.is_finite()));
    }

    #[test]
    fn test_fractional_index() {
        let axis = [0.0, 1.0, 2.0, 3.0];
        assert_eq!(fractional_index(&axis, 1.5), Some(1.5));
        assert_eq!(fractional_index(&axis, 0.0), Some(0.0));
        assert_eq!(fractional_index(&axis, 5.0), None);

        let descending = [3.0, 2.0, 1.0, 0.0];
        assert_eq!(fractional_index(&descending, 2.5), Some(0.5));
    }

    #[test]
    fn test_bilinear_interpolation() {
        // 2x2 plane
        let plane = [0.0_f32, 1.0, 2.0, 3.0];
        assert_eq!(bilinear(&plane, 2, 2, 0.0, 0.0), 0.0);
        assert_eq!(bilinear(&plane, 2, 2, 1.0, 1.0), 3.0);
        assert_eq!(bilinear(&plane, 2, 2, 0.5, 0.5), 1.5);
    }

    #[test]
    fn test_bilinear_nan_corner_falls_back_to_nearest() {
        let plane = [f32::NAN, 1.0, 2.0, 3.0];
        assert_eq!(bilinear(&plane, 2, 2, 0.9, 0.9), 3.0);
    }
}
