//! Calendar-day ranges for batch processing.

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{RadarError, RadarResult};

/// An inclusive range of calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> RadarResult<Self> {
        if end < start {
            return Err(RadarError::EndBeforeStart {
                start: start.format("%Y-%m-%d").to_string(),
                end: end.format("%Y-%m-%d").to_string(),
            });
        }
        Ok(Self { start, end })
    }

    /// Parse `YYYYMMDD` bounds.
    pub fn parse(start: &str, end: &str) -> RadarResult<Self> {
        Self::new(parse_day(start)?, parse_day(end)?)
    }

    /// Number of days in the range.
    pub fn num_days(&self) -> usize {
        (self.end - self.start).num_days() as usize + 1
    }

    /// Iterate every day from start to end, inclusive.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let start = self.start;
        (0..self.num_days() as u64).filter_map(move |offset| start.checked_add_days(Days::new(offset)))
    }
}

/// Parse a single `YYYYMMDD` day.
pub fn parse_day(s: &str) -> RadarResult<NaiveDate> {
    let s = s.trim();
    if s.len() != 8 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(RadarError::InvalidDate(s.to_string()));
    }
    NaiveDate::parse_from_str(s, "%Y%m%d").map_err(|_| RadarError::InvalidDate(s.to_string()))
}
