//! Calendar date ranges for the statistics queries.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Days, Months, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, Result};

/// Longest range a statistics query may cover.
pub const MAX_RANGE_DAYS: u64 = 36_600;

/// A validated, inclusive range of calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    /// Validates the bounds against `today`.
    ///
    /// Both bounds are required, `start` may not be after `end`, and `start`
    /// may not be in the future. `end` may be.
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>, today: NaiveDate) -> Result<Self> {
        let (Some(start), Some(end)) = (start, end) else {
            return Err(DomainError::InvalidArgument(
                "Start date and end date cannot be null".to_string(),
            ));
        };
        if start > end {
            return Err(DomainError::InvalidArgument(
                "Start date cannot be after end date".to_string(),
            ));
        }
        if start > today {
            return Err(DomainError::InvalidArgument(
                "Start date cannot be in the future".to_string(),
            ));
        }

        let range = Self { start, end };
        if range.day_count() > MAX_RANGE_DAYS {
            return Err(DomainError::InvalidArgument(format!(
                "Date range cannot exceed {MAX_RANGE_DAYS} days"
            )));
        }
        Ok(range)
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Number of days in the range, both ends included.
    pub fn day_count(&self) -> u64 {
        (self.end - self.start).num_days().unsigned_abs() + 1
    }

    /// Every day of the range in ascending order.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end;
        self.start.iter_days().take_while(move |day| *day <= end)
    }

    /// The UTC instants `[first midnight, midnight after the last day)`.
    pub fn bounds(&self) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
        let after_end = self
            .end
            .checked_add_days(Days::new(1))
            .ok_or_else(|| DomainError::InvalidArgument("End date is out of range".to_string()))?;
        Ok((
            self.start.and_time(NaiveTime::MIN).and_utc(),
            after_end.and_time(NaiveTime::MIN).and_utc(),
        ))
    }
}

/// Unit of a [`TimeRange`] shorthand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Day,
    Week,
    Month,
    Year,
}

impl Period {
    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Day => "day",
            Period::Week => "week",
            Period::Month => "month",
            Period::Year => "year",
        }
    }
}

impl FromStr for Period {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "day" => Ok(Period::Day),
            "week" => Ok(Period::Week),
            "month" => Ok(Period::Month),
            "year" => Ok(Period::Year),
            _ => Err(DomainError::InvalidArgument(format!(
                "Invalid time range period: {s}"
            ))),
        }
    }
}

/// Relative range shorthand such as `week` or `month:3`.
///
/// Resolves to `[today - count * period, today]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub period: Period,
    pub count: u32,
}

impl TimeRange {
    pub fn new(period: Period, count: u32) -> Self {
        Self { period, count }
    }

    /// Parses `period` or `period:count`, where `count` is at least 1.
    pub fn parse(s: &str) -> Result<Self> {
        let (period, count) = match s.split_once(':') {
            Some((period, count)) => {
                let count: u32 = count.trim().parse().map_err(|_| {
                    DomainError::InvalidArgument(format!("Invalid time range count: {count}"))
                })?;
                (period, count)
            }
            None => (s, 1),
        };
        if count == 0 {
            return Err(DomainError::InvalidArgument(
                "Time range count must be at least 1".to_string(),
            ));
        }
        Ok(Self::new(period.parse()?, count))
    }

    /// Resolves the shorthand into a validated range ending `today`.
    pub fn resolve(&self, today: NaiveDate) -> Result<DateRange> {
        let start = match self.period {
            Period::Day => today.checked_sub_days(Days::new(u64::from(self.count))),
            Period::Week => today.checked_sub_days(Days::new(7 * u64::from(self.count))),
            Period::Month => today.checked_sub_months(Months::new(self.count)),
            Period::Year => self
                .count
                .checked_mul(12)
                .and_then(|months| today.checked_sub_months(Months::new(months))),
        };
        let start = start.ok_or_else(|| {
            DomainError::InvalidArgument(format!("Time range {self} is out of range"))
        })?;
        DateRange::new(Some(start), Some(today), today)
    }
}

impl FromStr for TimeRange {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.period.as_str(), self.count)
    }
}
