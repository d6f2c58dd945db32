//! Bounding-box filtering over coordinate arrays.
//!
//! Vector datasets are filtered eagerly: the x/y coordinate vectors are
//! already in memory and the predicate yields positional indices. Raster
//! datasets are narrowed to a row/column window recorded in the plan;
//! the window may be empty, which is only reported at load time.

use zarr_dataset::GridWindow;

use crate::bbox::BoundingBox;
use crate::error::{ProviderError, Result};

/// Select features inside `bbox`, as positional indices.
///
/// The predicate is inclusive on all four edges. Selection is positional
/// rather than value-based so a chunked backing store never sees a boolean
/// mask.
pub fn filter_features(x: &[f64], y: &[f64], bbox: &BoundingBox) -> Result<Vec<usize>> {
    let indices: Vec<usize> = x
        .iter()
        .zip(y.iter())
        .enumerate()
        .filter(|(_, (&px, &py))| bbox.contains_point(px, py))
        .map(|(i, _)| i)
        .collect();

    if indices.is_empty() {
        return Err(ProviderError::no_data(format!(
            "no features inside bbox {bbox}"
        )));
    }
    Ok(indices)
}

/// Convert `bbox` to a row/column window over a grid's 1-D axis
/// coordinates.
///
/// Axes must be monotonic; descending axes (NWM grids store y north-up)
/// are handled. An empty window is returned as such, not an error.
pub fn grid_window(
    x_axis: &[f64],
    y_axis: &[f64],
    bbox: &BoundingBox,
) -> Result<GridWindow> {
    let cols = axis_window(x_axis, bbox.min_x, bbox.max_x, "x")?;
    let rows = axis_window(y_axis, bbox.min_y, bbox.max_y, "y")?;
    Ok(GridWindow { rows, cols })
}

/// Index range of axis values inside `[lo, hi]` inclusive.
fn axis_window(axis: &[f64], lo: f64, hi: f64, label: &str) -> Result<std::ops::Range<usize>> {
    if axis.len() < 2 {
        let inside = axis.first().map(|&v| v >= lo && v <= hi).unwrap_or(false);
        return Ok(if inside { 0..axis.len() } else { 0..0 });
    }
    let ascending = axis[0] <= axis[axis.len() - 1];
    if !is_monotonic(axis, ascending) {
        return Err(ProviderError::invalid_data(format!(
            "{label} axis is not monotonic"
        )));
    }

    let mut first = None;
    let mut last = 0;
    for (i, &v) in axis.iter().enumerate() {
        if v >= lo && v <= hi {
            if first.is_none() {
                first = Some(i);
            }
            last = i;
        }
    }
    Ok(match first {
        Some(first) => first..last + 1,
        None => 0..0,
    })
}

fn is_monotonic(axis: &[f64], ascending: bool) -> bool {
    axis.windows(2).all(|w| {
        if ascending {
            w[0] <= w[1]
        } else {
            w[0] >= w[1]
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_features_inclusive() {
        let x = [-100.0, -95.0, -90.0, -85.0];
        let y = [35.0, 32.0, 38.0, 35.0];
        let bbox = BoundingBox::new(-95.0, 30.0, -85.0, 36.0).unwrap();
        assert_eq!(filter_features(&x, &y, &bbox).unwrap(), vec![1, 3]);
    }

    #[test]
    fn test_filter_features_empty_is_no_data() {
        let bbox = BoundingBox::new(0.0, 0.0, 1.0, 1.0).unwrap();
        let err = filter_features(&[-100.0], &[35.0], &bbox).unwrap_err();
        match err {
            ProviderError::NoData(msg) => assert!(msg.contains("[0, 0, 1, 1]")),
            other => panic!("expected NoData, got {other:?}"),
        }
    }

    #[test]
    fn test_grid_window_ascending() {
        let x = [-110.0, -109.0, -108.0, -107.0];
        let y = [30.0, 31.0, 32.0, 33.0];
        let bbox = BoundingBox::new(-109.5, 30.5, -107.5, 32.5).unwrap();
        let window = grid_window(&x, &y, &bbox).unwrap();
        assert_eq!(window.cols, 1..3);
        assert_eq!(window.rows, 1..3);
    }

    #[test]
    fn test_grid_window_descending_y() {
        // North-up grids store y from max to min.
        let x = [-110.0, -109.0, -108.0];
        let y = [33.0, 32.0, 31.0, 30.0];
        let bbox = BoundingBox::new(-111.0, 30.5, -107.0, 32.5).unwrap();
        let window = grid_window(&x, &y, &bbox).unwrap();
        assert_eq!(window.rows, 1..3);
        assert_eq!(window.cols, 0..3);
    }

    #[test]
    fn test_grid_window_empty_not_an_error() {
        let x = [-110.0, -109.0];
        let y = [30.0, 31.0];
        let bbox = BoundingBox::new(0.0, 0.0, 1.0, 1.0).unwrap();
        let window = grid_window(&x, &y, &bbox).unwrap();
        assert!(window.is_empty());
    }

    #[test]
    fn test_non_monotonic_axis_rejected() {
        let x = [0.0, 2.0, 1.0];
        let y = [0.0, 1.0, 2.0];
        let bbox = BoundingBox::new(0.0, 0.0, 3.0, 3.0).unwrap();
        assert!(grid_window(&x, &y, &bbox).is_err());
    }
}
