//! CF convention time decoding.
//!
//! Zarr time coordinates are stored as numeric offsets with a `units`
//! attribute like "hours since 1990-01-01 00:00:00". This module parses the
//! units string and converts raw coordinate values to UTC timestamps.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::error::{DatasetError, Result};

/// Time unit granularity from a CF units string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    fn seconds(&self) -> i64 {
        match self {
            TimeUnit::Seconds => 1,
            TimeUnit::Minutes => 60,
            TimeUnit::Hours => 3600,
            TimeUnit::Days => 86400,
        }
    }
}

/// A parsed CF time encoding: unit plus epoch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CfTimeUnits {
    pub unit: TimeUnit,
    pub epoch: DateTime<Utc>,
}

impl CfTimeUnits {
    /// Parse a CF units string of the form "<unit> since <epoch>".
    pub fn parse(units: &str) -> Result<Self> {
        let mut parts = units.splitn(2, " since ");
        let unit_str = parts.next().unwrap_or("").trim();
        let epoch_str = parts.next().ok_or_else(|| {
            DatasetError::invalid_metadata(format!("time units missing 'since': {units}"))
        })?;

        let unit = match unit_str {
            "seconds" | "second" | "secs" | "sec" | "s" => TimeUnit::Seconds,
            "minutes" | "minute" | "mins" | "min" => TimeUnit::Minutes,
            "hours" | "hour" | "hrs" | "hr" | "h" => TimeUnit::Hours,
            "days" | "day" | "d" => TimeUnit::Days,
            other => {
                return Err(DatasetError::invalid_metadata(format!(
                    "unsupported time unit: {other}"
                )))
            }
        };

        let epoch = parse_epoch(epoch_str.trim())?;
        Ok(Self { unit, epoch })
    }

    /// Convert a raw coordinate value to a UTC timestamp.
    pub fn decode(&self, value: f64) -> DateTime<Utc> {
        let secs = value * self.unit.seconds() as f64;
        self.epoch + chrono::Duration::milliseconds((secs * 1000.0).round() as i64)
    }

    /// Decode a full coordinate array.
    pub fn decode_all(&self, values: &[f64]) -> Vec<DateTime<Utc>> {
        values.iter().map(|&v| self.decode(v)).collect()
    }
}

/// Parse an epoch timestamp in any of the common CF formats.
fn parse_epoch(s: &str) -> Result<DateTime<Utc>> {
    // RFC 3339 with explicit offset
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    // ISO 8601 without offset, T or space separated
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(naive.and_utc());
        }
    }

    // Date only
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return Ok(naive.and_utc());
        }
    }

    Err(DatasetError::invalid_metadata(format!(
        "unparseable time epoch: {s}"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_hours_since() {
        let units = CfTimeUnits::parse("hours since 1990-01-01 00:00:00").unwrap();
        assert_eq!(units.unit, TimeUnit::Hours);
        assert_eq!(units.epoch, Utc.with_ymd_and_hms(1990, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_date_only_epoch() {
        let units = CfTimeUnits::parse("days since 1970-01-01").unwrap();
        assert_eq!(units.unit, TimeUnit::Days);
        assert_eq!(units.epoch, Utc.with_ymd_and_hms(1970, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_decode_hours() {
        let units = CfTimeUnits::parse("hours since 1990-01-01").unwrap();
        let dt = units.decode(24.0);
        assert_eq!(dt, Utc.with_ymd_and_hms(1990, 1, 2, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_decode_fractional_minutes() {
        let units = CfTimeUnits::parse("minutes since 2000-01-01 00:00:00").unwrap();
        let dt = units.decode(90.5);
        assert_eq!(dt, Utc.with_ymd_and_hms(2000, 1, 1, 1, 30, 30).unwrap());
    }

    #[test]
    fn test_missing_since_rejected() {
        assert!(CfTimeUnits::parse("hours").is_err());
    }

    #[test]
    fn test_unknown_unit_rejected() {
        assert!(CfTimeUnits::parse("fortnights since 1990-01-01").is_err());
    }

    #[test]
    fn test_decode_all() {
        let units = CfTimeUnits::parse("hours since 1990-01-01").unwrap();
        let times = units.decode_all(&[0.0, 1.0, 2.0]);
        assert_eq!(times.len(), 3);
        assert_eq!(times[2], Utc.with_ymd_and_hms(1990, 1, 1, 2, 0, 0).unwrap());
    }
}
