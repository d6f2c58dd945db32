//! Datetime filter parsing and time-axis resolution.
//!
//! A filter is either a single instant or an `A/B` interval where either
//! bound may be `..`. Resolution narrows the filter against the time
//! values actually present in a dataset: instants require an exact match,
//! ranges are clipped to the observed extent and matched inclusively.
//! Nothing is ever interpolated or snapped.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use zarr_dataset::TimeSelection;

use crate::error::{ProviderError, Result};

/// A parsed datetime filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatetimeFilter {
    /// A specific instant, exact match required.
    Instant(DateTime<Utc>),
    /// An interval; `None` bounds are open (`..`).
    Range {
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    },
    /// The instant at the highest time index. Reachable only through the
    /// provider's datetime policy, never from a filter string.
    Latest,
}

impl DatetimeFilter {
    /// Parse a filter string: an instant or `A/B` with `..` open bounds.
    ///
    /// A range whose parsed start is at or after its parsed end is a query
    /// error. This check applies before clipping and only when both bounds
    /// are user-supplied.
    pub fn parse(datetime: &str) -> Result<Self> {
        let datetime = datetime.trim();
        if datetime.is_empty() {
            return Err(ProviderError::query("empty datetime filter"));
        }

        if let Some((start_str, end_str)) = datetime.split_once('/') {
            let start = parse_bound(start_str)?;
            let end = parse_bound(end_str)?;
            if let (Some(s), Some(e)) = (start, end) {
                if s >= e {
                    return Err(ProviderError::query(format!(
                        "invalid datetime range: start {start_str} is not before end {end_str}"
                    )));
                }
            }
            return Ok(DatetimeFilter::Range { start, end });
        }

        Ok(DatetimeFilter::Instant(parse_timestamp(datetime)?))
    }

    /// Resolve the filter against the dataset's time axis, producing the
    /// indices of the time values it selects.
    pub fn resolve(&self, times: &[DateTime<Utc>]) -> Result<TimeSelection> {
        if times.is_empty() {
            return Err(ProviderError::no_data("dataset has an empty time axis"));
        }
        let observed_min = *times.iter().min().unwrap();
        let observed_max = *times.iter().max().unwrap();

        match self {
            DatetimeFilter::Instant(instant) => {
                let indices: Vec<usize> = times
                    .iter()
                    .enumerate()
                    .filter(|(_, t)| *t == instant)
                    .map(|(i, _)| i)
                    .collect();
                if indices.is_empty() {
                    return Err(ProviderError::no_data(format!(
                        "no data at {}; dataset covers {} to {}",
                        instant.to_rfc3339(),
                        observed_min.to_rfc3339(),
                        observed_max.to_rfc3339()
                    )));
                }
                Ok(TimeSelection::Indices(indices))
            }
            DatetimeFilter::Range { start, end } => {
                // Open bounds resolve to the observed extent; supplied
                // bounds outside it are silently clipped.
                let start = start.unwrap_or(observed_min).max(observed_min);
                let end = end.unwrap_or(observed_max).min(observed_max);

                let indices: Vec<usize> = times
                    .iter()
                    .enumerate()
                    .filter(|(_, t)| **t >= start && **t <= end)
                    .map(|(i, _)| i)
                    .collect();
                if indices.is_empty() {
                    return Err(ProviderError::no_data(format!(
                        "no data between {} and {}",
                        start.to_rfc3339(),
                        end.to_rfc3339()
                    )));
                }
                Ok(TimeSelection::Indices(indices))
            }
            DatetimeFilter::Latest => Ok(TimeSelection::Indices(vec![times.len() - 1])),
        }
    }
}

fn parse_bound(s: &str) -> Result<Option<DateTime<Utc>>> {
    let s = s.trim();
    if s == ".." || s.is_empty() {
        return Ok(None);
    }
    parse_timestamp(s).map(Some)
}

/// Parse a timestamp in RFC 3339, naive ISO 8601, or date-only form.
fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Ok(naive.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return Ok(naive.and_utc());
        }
    }
    Err(ProviderError::query(format!(
        "invalid datetime '{s}'; expected ISO 8601 (e.g. 2020-01-01T00:00:00Z)"
    )))
}
