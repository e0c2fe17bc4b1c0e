//! Calendar year-month periods.
//!
//! Every table in the pipeline is keyed by a `Period`. On disk it is the
//! numeric `YYYYMM` form (`202403`); sources spell it many other ways, all of
//! which funnel through [`Period::parse`].

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PeriodError {
    #[error("month out of range: {0}")]
    MonthOutOfRange(u32),

    #[error("year out of range: {0}")]
    YearOutOfRange(i32),

    #[error("unrecognized period '{0}'")]
    Unrecognized(String),

    #[error("empty month range: {start} is after {end}")]
    InvertedRange { start: Period, end: Period },
}

/// A calendar month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Period {
    year: i32,
    month: u32,
}

impl Period {
    pub fn new(year: i32, month: u32) -> Result<Self, PeriodError> {
        if !(1..=12).contains(&month) {
            return Err(PeriodError::MonthOutOfRange(month));
        }
        if !(1000..=9999).contains(&year) {
            return Err(PeriodError::YearOutOfRange(year));
        }
        Ok(Self { year, month })
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// Decode the numeric `YYYYMM` form.
    pub fn from_month_id(id: i64) -> Result<Self, PeriodError> {
        let year = i32::try_from(id / 100).map_err(|_| PeriodError::Unrecognized(id.to_string()))?;
        let month = u32::try_from(id % 100).map_err(|_| PeriodError::Unrecognized(id.to_string()))?;
        Self::new(year, month)
    }

    /// Numeric `YYYYMM` form used as the join key in every table.
    pub fn month_id(&self) -> i64 {
        i64::from(self.year) * 100 + i64::from(self.month)
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// The following calendar month. December rolls into January of the next year.
    pub fn next(&self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    pub fn first_day(&self) -> NaiveDate {
        // year and month are validated at construction
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    pub fn last_day(&self) -> NaiveDate {
        self.next()
            .first_day()
            .pred_opt()
            .unwrap_or(NaiveDate::MAX)
    }

    /// Parse any of the period spellings found in the inputs:
    /// `202403`, `20240331`, `2024-03`, `2024-03-31`, `2024-M03`, `2024M03`.
    /// A trailing time component after a full date is ignored.
    pub fn parse(raw: &str) -> Result<Self, PeriodError> {
        let s = raw.trim();
        let unrecognized = || PeriodError::Unrecognized(raw.to_string());

        if s.len() < 6 || !s.is_char_boundary(4) {
            return Err(unrecognized());
        }
        let (year_part, rest) = s.split_at(4);
        if !year_part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(unrecognized());
        }
        let year: i32 = year_part.parse().map_err(|_| unrecognized())?;

        let rest = rest.strip_prefix('-').unwrap_or(rest);
        let rest = rest
            .strip_prefix('M')
            .or_else(|| rest.strip_prefix('m'))
            .unwrap_or(rest);

        let month_part = rest.get(..2).ok_or_else(unrecognized)?;
        if !month_part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(unrecognized());
        }
        let month: u32 = month_part.parse().map_err(|_| unrecognized())?;
        let period = Self::new(year, month).map_err(|_| unrecognized())?;

        let tail = &rest[2..];
        if tail.is_empty() {
            return Ok(period);
        }

        let day_part = tail.strip_prefix('-').unwrap_or(tail);
        let day = day_part
            .get(..2)
            .filter(|d| d.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|d| d.parse::<u32>().ok())
            .ok_or_else(unrecognized)?;
        let after_day = &day_part[2..];
        if !(after_day.is_empty() || after_day.starts_with(' ') || after_day.starts_with('T')) {
            return Err(unrecognized());
        }
        NaiveDate::from_ymd_opt(year, month, day).ok_or_else(unrecognized)?;
        Ok(period)
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl From<Period> for i64 {
    fn from(p: Period) -> Self {
        p.month_id()
    }
}

impl TryFrom<i64> for Period {
    type Error = PeriodError;

    fn try_from(id: i64) -> Result<Self, Self::Error> {
        Self::from_month_id(id)
    }
}

/// Inclusive range of calendar months.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthRange {
    pub start: Period,
    pub end: Period,
}

impl MonthRange {
    pub fn new(start: Period, end: Period) -> Result<Self, PeriodError> {
        if start > end {
            return Err(PeriodError::InvertedRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// Months touched by the date interval `[start, end]`.
    pub fn from_dates(start: NaiveDate, end: NaiveDate) -> Result<Self, PeriodError> {
        Self::new(Period::from_date(start), Period::from_date(end))
    }

    pub fn contains(&self, period: Period) -> bool {
        self.start <= period && period <= self.end
    }

    /// True if every month of `other` lies inside this range.
    pub fn covers(&self, other: &MonthRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    pub fn months(&self) -> Vec<Period> {
        let mut out = Vec::new();
        let mut current = self.start;
        while current <= self.end {
            out.push(current);
            current = current.next();
        }
        out
    }
}

impl fmt::Display for MonthRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}
