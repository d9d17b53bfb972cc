//! # Day Range Module
//!
//! Turns calendar dates in a user's timezone into UTC instant ranges for
//! intake aggregation.

use chrono::{DateTime, Days, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Serialize;

use crate::errors::{NutritionError, Result};
use crate::record_types::TimeRange;

/// A range of whole local days, as UTC instants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DayRange {
    /// Local midnight starting `start_date`
    pub start: DateTime<Utc>,
    /// Local midnight following `end_date` (exclusive)
    pub end: DateTime<Utc>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl DayRange {
    pub fn time_range(&self) -> TimeRange {
        TimeRange::new(self.start, self.end)
    }
}

/// Resolves calendar days into instant ranges
pub trait DayRangeResolver: Send + Sync {
    /// Today in the resolver's timezone
    fn current_date(&self) -> NaiveDate;

    /// The single local day `date`, today when absent
    fn day_range(&self, date: Option<NaiveDate>) -> Result<DayRange>;

    /// The seven local days ending on `end_date` inclusive, today when absent
    fn seven_day_range(&self, end_date: Option<NaiveDate>) -> Result<DayRange>;
}

/// Day ranges in an IANA timezone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZonedDayRanges {
    tz: Tz,
}

impl ZonedDayRanges {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    /// Parse an IANA timezone name such as `Asia/Taipei`
    pub fn from_name(name: &str) -> Result<Self> {
        name.trim()
            .parse::<Tz>()
            .map(Self::new)
            .map_err(|e| NutritionError::Config(format!("Unknown timezone {name:?}: {e}")))
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    /// First instant of `date` in the timezone
    ///
    /// Where midnight falls in a DST gap the day starts at the first local
    /// hour that exists.
    fn start_of_day(&self, date: NaiveDate) -> Result<DateTime<Utc>> {
        (0..24)
            .filter_map(|hour| NaiveTime::from_hms_opt(hour, 0, 0))
            .find_map(|time| self.tz.from_local_datetime(&date.and_time(time)).earliest())
            .map(|local| local.with_timezone(&Utc))
            .ok_or_else(|| NutritionError::Config(format!("No local midnight for {date} in {}", self.tz)))
    }

    fn range(&self, start_date: NaiveDate, end_date: NaiveDate) -> Result<DayRange> {
        let next_day = end_date
            .checked_add_days(Days::new(1))
            .ok_or_else(|| NutritionError::Config(format!("Date out of range: {end_date}")))?;
        Ok(DayRange {
            start: self.start_of_day(start_date)?,
            end: self.start_of_day(next_day)?,
            start_date,
            end_date,
        })
    }
}

impl DayRangeResolver for ZonedDayRanges {
    fn current_date(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.tz).date_naive()
    }

    fn day_range(&self, date: Option<NaiveDate>) -> Result<DayRange> {
        let date = date.unwrap_or_else(|| self.current_date());
        self.range(date, date)
    }

    fn seven_day_range(&self, end_date: Option<NaiveDate>) -> Result<DayRange> {
        let end_date = end_date.unwrap_or_else(|| self.current_date());
        let start_date = end_date
            .checked_sub_days(Days::new(6))
            .ok_or_else(|| NutritionError::Config(format!("Date out of range: {end_date}")))?;
        self.range(start_date, end_date)
    }
}
