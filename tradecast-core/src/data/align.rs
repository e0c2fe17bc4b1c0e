//! Monthly alignment of external series.
//!
//! Each source returns a set of named series observed at irregular dates.
//! They are reduced to one value per calendar month (the last observation in
//! the month) and laid out on the union of months seen across all series.
//! A month missing from one series is null in that column; nothing is
//! forward-filled.

use super::error::DataError;
use super::schema::PERIOD;
use crate::domain::{MonthRange, Period};
use chrono::NaiveDate;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Period column shifted one month forward. Trade rows of month `P` join on
/// `join_period = P`, i.e. the external observation of month `P - 1`.
pub const JOIN_PERIOD: &str = "join_period";

/// Month-end values per series.
pub type MonthlySeries = BTreeMap<Period, f64>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesColumn {
    pub name: String,
    /// One entry per element of [`MonthlyTable::periods`].
    pub values: Vec<Option<f64>>,
}

/// Several series on a common monthly timeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonthlyTable {
    /// Sorted ascending, no duplicates.
    pub periods: Vec<Period>,
    pub columns: Vec<SeriesColumn>,
}

/// Reduce dated observations to the last non-null value of each month.
pub fn resample_month_end(observations: &[(NaiveDate, Option<f64>)]) -> MonthlySeries {
    let mut latest: BTreeMap<Period, (NaiveDate, f64)> = BTreeMap::new();
    for &(date, value) in observations {
        let Some(value) = value else { continue };
        let period = Period::from_date(date);
        match latest.get(&period) {
            Some(&(seen, _)) if seen > date => {}
            _ => {
                latest.insert(period, (date, value));
            }
        }
    }
    latest.into_iter().map(|(p, (_, v))| (p, v)).collect()
}

/// Lay out named series on the union of their months.
pub fn align_series(series: &BTreeMap<String, MonthlySeries>) -> MonthlyTable {
    let periods: Vec<Period> = series
        .values()
        .flat_map(|s| s.keys().copied())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let columns = series
        .iter()
        .map(|(name, values)| SeriesColumn {
            name: name.clone(),
            values: periods.iter().map(|p| values.get(p).copied()).collect(),
        })
        .collect();

    MonthlyTable { periods, columns }
}

impl MonthlyTable {
    pub fn series_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.periods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.periods.is_empty()
    }

    pub fn value(&self, series: &str, period: Period) -> Option<f64> {
        let row = self.periods.binary_search(&period).ok()?;
        self.columns
            .iter()
            .find(|c| c.name == series)
            .and_then(|c| c.values[row])
    }

    /// Keep only the months inside `range`.
    pub fn restrict(&self, range: &MonthRange) -> MonthlyTable {
        let keep: Vec<usize> = self
            .periods
            .iter()
            .enumerate()
            .filter(|(_, p)| range.contains(**p))
            .map(|(i, _)| i)
            .collect();
        MonthlyTable {
            periods: keep.iter().map(|&i| self.periods[i]).collect(),
            columns: self
                .columns
                .iter()
                .map(|c| SeriesColumn {
                    name: c.name.clone(),
                    values: keep.iter().map(|&i| c.values[i]).collect(),
                })
                .collect(),
        }
    }

    /// `period`, `join_period`, then one column per series.
    pub fn to_frame(&self) -> PolarsResult<DataFrame> {
        let mut columns = vec![
            Column::new(
                PERIOD.into(),
                self.periods.iter().map(|p| p.month_id()).collect::<Vec<i64>>(),
            ),
            Column::new(
                JOIN_PERIOD.into(),
                self.periods
                    .iter()
                    .map(|p| p.next().month_id())
                    .collect::<Vec<i64>>(),
            ),
        ];
        for c in &self.columns {
            columns.push(Column::new(c.name.as_str().into(), c.values.clone()));
        }
        DataFrame::new(columns)
    }

    /// Right side of the lag join: `join_period` exposed as `period`.
    pub fn join_frame(&self) -> PolarsResult<DataFrame> {
        let mut columns = vec![Column::new(
            PERIOD.into(),
            self.periods
                .iter()
                .map(|p| p.next().month_id())
                .collect::<Vec<i64>>(),
        )];
        for c in &self.columns {
            columns.push(Column::new(c.name.as_str().into(), c.values.clone()));
        }
        DataFrame::new(columns)
    }

    /// Rebuild from a frame written by [`MonthlyTable::to_frame`].
    pub fn from_frame(df: &DataFrame) -> Result<Self, DataError> {
        let periods = df
            .column(PERIOD)?
            .i64()?
            .into_iter()
            .map(|id| {
                id.ok_or_else(|| DataError::CacheError("null period in series table".into()))
                    .and_then(|id| {
                        Period::from_month_id(id)
                            .map_err(|e| DataError::CacheError(format!("bad period {id}: {e}")))
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut columns = Vec::new();
        for name in df.get_column_names() {
            if name.as_str() == PERIOD || name.as_str() == JOIN_PERIOD {
                continue;
            }
            let cast = df.column(name.as_str())?.cast(&DataType::Float64)?;
            columns.push(SeriesColumn {
                name: name.to_string(),
                values: cast.f64()?.into_iter().collect(),
            });
        }
        Ok(Self { periods, columns })
    }
}
