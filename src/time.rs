//! # Time Axis
//!
//! Resolves the relative CF time encoding of a NetCDF file
//! (`"hours since 1900-01-01 00:00:00.0"` for ERA5) into absolute timestamps
//! and maps requested timestamps back to array indices.
//!
//! Timestamps are computed as `epoch + offset × unit` with chrono calendar
//! arithmetic, so any offset resolves regardless of how far it lies from the
//! epoch.

use crate::error::{Nc2ShetranError, Result};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use log::debug;
use serde::{Deserialize, Serialize};

/// Format used for timestamps in configuration files and output tables
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Units used by ERA5 files that carry no `units` attribute
pub const DEFAULT_TIME_UNITS: &str = "hours since 1900-01-01 00:00:00.0";

/// Time units for CF offsets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    /// Convert the time unit to a multiplier for milliseconds
    pub fn to_millis_multiplier(&self) -> f64 {
        match self {
            TimeUnit::Seconds => 1_000.0,
            TimeUnit::Minutes => 60_000.0,
            TimeUnit::Hours => 3_600_000.0,
            TimeUnit::Days => 86_400_000.0,
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "second" | "seconds" | "sec" | "secs" | "s" => Some(TimeUnit::Seconds),
            "minute" | "minutes" | "min" | "mins" => Some(TimeUnit::Minutes),
            "hour" | "hours" | "hr" | "hrs" | "h" => Some(TimeUnit::Hours),
            "day" | "days" | "d" => Some(TimeUnit::Days),
            _ => None,
        }
    }
}

/// Parsed CF time units: an offset unit and the epoch it counts from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeUnits {
    pub unit: TimeUnit,
    pub epoch: NaiveDateTime,
}

impl TimeUnits {
    pub fn new(unit: TimeUnit, epoch: NaiveDateTime) -> Self {
        Self { unit, epoch }
    }

    /// Parses a CF units string of the form `"<unit> since <reference>"`.
    ///
    /// ```rust
    /// use nc2shetran::time::{TimeUnit, TimeUnits};
    ///
    /// let units = TimeUnits::parse("hours since 1900-01-01 00:00:00.0")?;
    /// assert_eq!(units.unit, TimeUnit::Hours);
    /// # Ok::<(), nc2shetran::error::Nc2ShetranError>(())
    /// ```
    pub fn parse(units: &str) -> Result<Self> {
        let invalid = || Nc2ShetranError::InvalidTimeUnits(units.to_string());

        let (unit_part, reference) = units.trim().split_once(" since ").ok_or_else(invalid)?;
        let unit = TimeUnit::parse(unit_part.trim()).ok_or_else(invalid)?;
        let epoch = parse_timestamp(reference).map_err(|_| invalid())?;

        Ok(Self { unit, epoch })
    }

    /// Absolute timestamp of a single offset
    pub fn resolve(&self, offset: f64) -> Result<NaiveDateTime> {
        if !offset.is_finite() {
            return Err(Nc2ShetranError::InvalidTimestamp(offset.to_string()));
        }
        let millis = (offset * self.unit.to_millis_multiplier()).round();
        let delta = Duration::try_milliseconds(millis as i64)
            .ok_or_else(|| Nc2ShetranError::InvalidTimestamp(offset.to_string()))?;
        self.epoch
            .checked_add_signed(delta)
            .ok_or_else(|| Nc2ShetranError::InvalidTimestamp(offset.to_string()))
    }
}

impl Default for TimeUnits {
    fn default() -> Self {
        Self {
            unit: TimeUnit::Hours,
            epoch: NaiveDate::from_ymd_opt(1900, 1, 1)
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .unwrap_or_default(),
        }
    }
}

/// Rejects CF calendars that do not follow the Gregorian rules chrono implements
pub fn check_calendar(calendar: &str) -> Result<()> {
    match calendar.to_lowercase().as_str() {
        "standard" | "gregorian" | "proleptic_gregorian" => Ok(()),
        other => Err(Nc2ShetranError::UnsupportedCalendar(other.to_string())),
    }
}

/// Parses a timestamp written as a date, a date and time, or an ISO 8601 string
pub fn parse_timestamp(s: &str) -> Result<NaiveDateTime> {
    let trimmed = s
        .trim()
        .trim_end_matches(" UTC")
        .trim_end_matches('Z')
        .trim();

    const FORMATS: [&str; 4] = [
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ];
    for format in FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(ts);
        }
    }

    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| Nc2ShetranError::InvalidTimestamp(s.to_string()))
}

/// Inclusive range of time-step indices
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexRange {
    pub start: usize,
    pub end: usize,
}

impl IndexRange {
    /// Number of time steps covered (`end - start + 1`)
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.end - self.start + 1
    }
}

/// Requested `[start, end]` window; an absent bound means the axis extent
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
}

/// Ordered absolute timestamps, one per time step
#[derive(Debug, Clone, PartialEq)]
pub struct TimeAxis {
    timestamps: Vec<NaiveDateTime>,
}

impl TimeAxis {
    /// Resolves raw offsets into a strictly increasing axis
    pub fn from_offsets(units: &TimeUnits, offsets: &[f64]) -> Result<Self> {
        let timestamps = offsets
            .iter()
            .map(|&offset| units.resolve(offset))
            .collect::<Result<Vec<_>>>()?;
        Self::from_timestamps(timestamps)
    }

    pub fn from_timestamps(timestamps: Vec<NaiveDateTime>) -> Result<Self> {
        if let Some(index) = timestamps.windows(2).position(|w| w[1] <= w[0]) {
            return Err(Nc2ShetranError::NonMonotonicTime { index: index + 1 });
        }
        Ok(Self { timestamps })
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn timestamps(&self) -> &[NaiveDateTime] {
        &self.timestamps
    }

    pub fn get(&self, index: usize) -> Option<NaiveDateTime> {
        self.timestamps.get(index).copied()
    }

    pub fn first(&self) -> Option<NaiveDateTime> {
        self.timestamps.first().copied()
    }

    pub fn last(&self) -> Option<NaiveDateTime> {
        self.timestamps.last().copied()
    }

    /// Exact index of `ts`; there is no nearest-match fallback
    pub fn index_of(&self, ts: NaiveDateTime) -> Result<usize> {
        self.timestamps
            .binary_search(&ts)
            .map_err(|_| Nc2ShetranError::TimestampNotFound(ts))
    }

    /// Resolves a window into inclusive indices
    pub fn resolve_window(&self, window: &TimeWindow) -> Result<IndexRange> {
        if let (Some(start), Some(end)) = (window.start, window.end) {
            if start > end {
                return Err(Nc2ShetranError::InvalidTimeWindow { start, end });
            }
        }
        if self.is_empty() {
            return Err(Nc2ShetranError::EmptySelection(
                "time axis has no steps".to_string(),
            ));
        }

        let start = match window.start {
            Some(ts) => self.index_of(ts)?,
            None => 0,
        };
        let end = match window.end {
            Some(ts) => self.index_of(ts)?,
            None => self.len() - 1,
        };
        debug!("Resolved time window to indices {}..={}", start, end);

        Ok(IndexRange { start, end })
    }

    /// Timestamps of a resolved range formatted for output tables
    pub fn format_range(&self, range: IndexRange) -> Vec<String> {
        self.timestamps[range.start..=range.end]
            .iter()
            .map(|ts| ts.format(TIMESTAMP_FORMAT).to_string())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> NaiveDateTime {
        parse_timestamp(s).unwrap()
    }

    #[test]
    fn test_parse_era5_units() {
        let units = TimeUnits::parse("hours since 1900-01-01 00:00:00.0").unwrap();
        assert_eq!(units.unit, TimeUnit::Hours);
        assert_eq!(units.epoch, ts("1900-01-01 00:00:00"));
        assert_eq!(units, TimeUnits::parse(DEFAULT_TIME_UNITS).unwrap());
        assert_eq!(units, TimeUnits::default());
    }

    #[test]
    fn test_parse_other_units() {
        let units = TimeUnits::parse("seconds since 1970-01-01").unwrap();
        assert_eq!(units.unit, TimeUnit::Seconds);
        assert_eq!(units.epoch, ts("1970-01-01 00:00:00"));

        let units = TimeUnits::parse("days since 2000-01-01T12:00:00Z").unwrap();
        assert_eq!(units.unit, TimeUnit::Days);
        assert_eq!(units.epoch, ts("2000-01-01 12:00:00"));

        assert!(TimeUnits::parse("fortnights since 2000-01-01").is_err());
        assert!(TimeUnits::parse("hours after 2000-01-01").is_err());
        assert!(TimeUnits::parse("hours since yesterday").is_err());
    }

    #[test]
    fn test_resolve_across_leap_years() {
        let units = TimeUnits::default();
        // 1900 is not a leap year: 24 leap days between 1900 and 2000
        assert_eq!(units.resolve(876_576.0).unwrap(), ts("2000-01-01 00:00:00"));
        assert_eq!(units.resolve(876_600.0).unwrap(), ts("2000-01-02 00:00:00"));
        // 2000 is a leap year
        let feb_29 = units.resolve(876_576.0 + 59.0 * 24.0).unwrap();
        assert_eq!(feb_29, ts("2000-02-29 00:00:00"));
    }

    #[test]
    fn test_resolve_is_idempotent_and_unbounded() {
        let units = TimeUnits::default();
        for offset in [0.0, 1.0, 876_576.0, 1_100_000.0, 2_000_000.0] {
            assert_eq!(units.resolve(offset).unwrap(), units.resolve(offset).unwrap());
        }
        // Beyond 2022, where a pre-built hourly table would have ended
        assert_eq!(units.resolve(1_104_504.0).unwrap(), ts("2026-01-01 00:00:00"));
        assert!(units.resolve(f64::NAN).is_err());
    }

    #[test]
    fn test_index_of_exact_match() {
        let t0 = ts("2000-01-01 00:00:00");
        let axis = TimeAxis::from_offsets(&TimeUnits::new(TimeUnit::Hours, t0), &[0.0, 1.0, 2.0, 3.0])
            .unwrap();
        assert_eq!(axis.index_of(ts("2000-01-01 02:00:00")).unwrap(), 2);

        let err = axis.index_of(ts("2000-01-01 02:30:00")).unwrap_err();
        assert!(err.is_lookup_error());
        assert!(matches!(err, Nc2ShetranError::TimestampNotFound(_)));
    }

    #[test]
    fn test_resolve_window() {
        let axis = TimeAxis::from_offsets(&TimeUnits::default(), &[876_576.0, 876_600.0, 876_624.0, 876_648.0])
            .unwrap();

        let full = axis.resolve_window(&TimeWindow::default()).unwrap();
        assert_eq!(full, IndexRange { start: 0, end: 3 });
        assert_eq!(full.len(), 4);

        let window = TimeWindow {
            start: Some(ts("2000-01-02")),
            end: Some(ts("2000-01-03")),
        };
        let range = axis.resolve_window(&window).unwrap();
        assert_eq!(range, IndexRange { start: 1, end: 2 });
        assert_eq!(range.len(), 2);
        assert_eq!(axis.format_range(range), vec!["2000-01-02 00:00:00", "2000-01-03 00:00:00"]);

        let reversed = TimeWindow {
            start: Some(ts("2000-01-03")),
            end: Some(ts("2000-01-02")),
        };
        assert!(matches!(
            axis.resolve_window(&reversed),
            Err(Nc2ShetranError::InvalidTimeWindow { .. })
        ));

        let missing = TimeWindow {
            start: Some(ts("1999-12-31")),
            end: None,
        };
        assert!(matches!(
            axis.resolve_window(&missing),
            Err(Nc2ShetranError::TimestampNotFound(_))
        ));
    }

    #[test]
    fn test_non_monotonic_axis_rejected() {
        let result = TimeAxis::from_offsets(&TimeUnits::default(), &[0.0, 2.0, 1.0]);
        assert!(matches!(result, Err(Nc2ShetranError::NonMonotonicTime { index: 2 })));

        let result = TimeAxis::from_offsets(&TimeUnits::default(), &[0.0, 0.0]);
        assert!(matches!(result, Err(Nc2ShetranError::NonMonotonicTime { index: 1 })));
    }

    #[test]
    fn test_calendar_check() {
        assert!(check_calendar("gregorian").is_ok());
        assert!(check_calendar("proleptic_gregorian").is_ok());
        assert!(check_calendar("Standard").is_ok());
        assert!(matches!(
            check_calendar("noleap"),
            Err(Nc2ShetranError::UnsupportedCalendar(_))
        ));
    }

    #[test]
    fn test_parse_timestamp_formats() {
        assert_eq!(ts("2000-01-01"), ts("2000-01-01 00:00:00"));
        assert_eq!(ts("2000-01-01T06:00"), ts("2000-01-01 06:00:00"));
        assert_eq!(ts("2000-01-01 06:00:00 UTC"), ts("2000-01-01 06:00:00"));
        assert!(parse_timestamp("01/01/2000").is_err());
    }
}
