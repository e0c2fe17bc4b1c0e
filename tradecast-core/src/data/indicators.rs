//! Macro indicators and REER, reshaped and joined by (country, period).
//!
//! Two reference inputs:
//! - a long table of national-accounts indicators, filtered to constant-price
//!   seasonally adjusted series and pivoted to one column per indicator
//! - a wide REER table with one column per month (`2021-M01`, ...), melted to
//!   one row per (country, month)
//!
//! Both pivots refuse duplicate keys instead of picking a row.

use super::decode::read_table;
use super::error::{require_input, DataError};
use super::schema::{COUNTRY_ID, PERIOD};
use crate::domain::Period;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::{info, warn};

pub const REER_COLUMN: &str = "reer";

/// Long-format indicator column names.
pub mod long {
    pub const ISO3: &str = "ISO3";
    pub const PERIOD: &str = "PERIOD";
    pub const INDICATOR: &str = "INDICATOR";
    pub const PRICE_TYPE: &str = "PRICE_TYPE";
    pub const S_ADJUSTMENT: &str = "S_ADJUSTMENT";
    pub const VALUE: &str = "VALUE";
}

/// REER table column names.
pub mod reer {
    pub const COUNTRY: &str = "COUNTRY.ID";
    pub const INDICATOR: &str = "INDICATOR";
    /// Marker identifying a month column header (`2021-M01`).
    pub const MONTH_MARKER: &str = "-M";
    pub const KEYWORD: &str = "REER";
}

/// Which rows of the long indicator table are kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorFilter {
    /// Case-insensitive substrings; an indicator matching any one is kept.
    pub keywords: Vec<String>,
    pub price_type: String,
    pub adjustment: String,
}

impl Default for IndicatorFilter {
    fn default() -> Self {
        Self {
            keywords: vec![
                "GDP".into(),
                "consumption expenditure".into(),
                "capital formation".into(),
                "inventories".into(),
            ],
            price_type: "Constant prices".into(),
            adjustment: "Seasonally adjusted (SA)".into(),
        }
    }
}

impl IndicatorFilter {
    pub fn matches(&self, indicator: &str, price_type: &str, adjustment: &str) -> bool {
        if price_type != self.price_type || adjustment != self.adjustment {
            return false;
        }
        let lowered = indicator.to_lowercase();
        self.keywords
            .iter()
            .any(|k| lowered.contains(&k.to_lowercase()))
    }
}

/// Output column for an indicator description.
pub fn indicator_column(indicator: &str) -> String {
    if indicator.contains("GDP") || indicator.contains("Gross domestic product") {
        return "gdp_constant_sa".into();
    }
    if indicator.contains("Final consumption expenditure") {
        return "final_consumption_constant_sa".into();
    }
    if indicator.contains("Gross capital formation") {
        return "gross_capital_formation_constant_sa".into();
    }
    if indicator.contains("Changes in inventories") {
        return "changes_inventories_constant_sa".into();
    }
    indicator_slug(indicator)
}

/// Snake-case column built from the full description.
pub fn indicator_slug(indicator: &str) -> String {
    let mut slug = String::with_capacity(indicator.len());
    for c in indicator.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('_') {
            slug.push('_');
        }
    }
    format!("{}_constant_sa", slug.trim_matches('_'))
}

/// Column name for each distinct indicator, in first-seen order.
///
/// The first indicator mapping to a short name gets it; later ones sharing
/// that short name fall back to their full slug.
fn assign_columns(
    indicators: &[String],
    context: &str,
) -> Result<BTreeMap<String, String>, DataError> {
    let mut taken: BTreeMap<String, &str> = BTreeMap::new();
    let mut assigned = BTreeMap::new();
    for indicator in indicators {
        let short = indicator_column(indicator);
        let column = if taken.contains_key(&short) {
            indicator_slug(indicator)
        } else {
            short
        };
        if let Some(other) = taken.get(&column) {
            return Err(DataError::schema(
                context,
                format!("indicators \"{other}\" and \"{indicator}\" both map to column {column}"),
            ));
        }
        taken.insert(column.clone(), indicator);
        assigned.insert(indicator.clone(), column);
    }
    Ok(assigned)
}

/// Wide indicator table keyed by (country, period).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndicatorTable {
    pub columns: BTreeSet<String>,
    pub values: BTreeMap<(String, Period), BTreeMap<String, Option<f64>>>,
}

impl IndicatorTable {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn to_frame(&self) -> PolarsResult<DataFrame> {
        let keys: Vec<&(String, Period)> = self.values.keys().collect();
        let mut columns = vec![
            Column::new(
                COUNTRY_ID.into(),
                keys.iter().map(|(c, _)| c.as_str()).collect::<Vec<&str>>(),
            ),
            Column::new(
                PERIOD.into(),
                keys.iter().map(|(_, p)| p.month_id()).collect::<Vec<i64>>(),
            ),
        ];
        for name in &self.columns {
            let values: Vec<Option<f64>> = self
                .values
                .values()
                .map(|row| row.get(name).copied().flatten())
                .collect();
            columns.push(Column::new(name.as_str().into(), values));
        }
        DataFrame::new(columns)
    }
}

fn duplicate_error(table: &str, duplicates: usize, example: String) -> DataError {
    DataError::AmbiguousPivot {
        table: table.to_string(),
        duplicates,
        example,
    }
}

/// Load, filter and pivot the long indicator table.
pub fn load_indicators(path: &Path, filter: &IndicatorFilter) -> Result<IndicatorTable, DataError> {
    require_input(path)?;
    let table = read_table(path)?;
    let context = path.display().to_string();
    let idx = table.require_columns(
        &[
            long::ISO3,
            long::PERIOD,
            long::INDICATOR,
            long::PRICE_TYPE,
            long::S_ADJUSTMENT,
            long::VALUE,
        ],
        &context,
    )?;

    let mut cells: BTreeMap<(String, Period), BTreeMap<String, Option<f64>>> = BTreeMap::new();
    let mut seen: Vec<String> = Vec::new();
    let mut matched = 0usize;
    let mut bad_period = 0usize;
    let mut duplicates = 0usize;
    let mut first_duplicate: Option<String> = None;

    for row in &table.rows {
        let get = |i: usize| row.get(idx[i]).unwrap_or("").trim();
        if !filter.matches(get(2), get(3), get(4)) {
            continue;
        }
        matched += 1;
        let Ok(period) = Period::parse(get(1)) else {
            bad_period += 1;
            continue;
        };
        let country = get(0).to_ascii_uppercase();
        let indicator = get(2).to_string();
        let value = get(5).parse::<f64>().ok().filter(|v| v.is_finite());

        let row_cells = cells.entry((country.clone(), period)).or_default();
        if row_cells.contains_key(&indicator) {
            duplicates += 1;
            first_duplicate.get_or_insert_with(|| format!("({country}, {period}, {indicator})"));
            continue;
        }
        if !seen.contains(&indicator) {
            seen.push(indicator.clone());
        }
        row_cells.insert(indicator, value);
    }

    if let Some(example) = first_duplicate {
        return Err(duplicate_error(&context, duplicates, example));
    }

    let columns = assign_columns(&seen, &context)?;
    let mut out = IndicatorTable::default();
    out.columns.extend(columns.values().cloned());
    for (key, row_cells) in cells {
        let renamed = row_cells
            .into_iter()
            .filter_map(|(indicator, value)| columns.get(&indicator).map(|c| (c.clone(), value)))
            .collect();
        out.values.insert(key, renamed);
    }

    if bad_period > 0 {
        warn!(path = %context, skipped = bad_period, "indicator rows with unparseable period");
    }
    info!(
        path = %context,
        matched,
        keys = out.len(),
        columns = out.columns.len(),
        "prepared indicators"
    );
    Ok(out)
}

/// REER series keyed by (country, period).
pub type ReerTable = BTreeMap<(String, Period), f64>;

pub fn reer_to_frame(reer: &ReerTable) -> PolarsResult<DataFrame> {
    DataFrame::new(vec![
        Column::new(
            COUNTRY_ID.into(),
            reer.keys().map(|(c, _)| c.as_str()).collect::<Vec<&str>>(),
        ),
        Column::new(
            PERIOD.into(),
            reer.keys().map(|(_, p)| p.month_id()).collect::<Vec<i64>>(),
        ),
        Column::new(REER_COLUMN.into(), reer.values().copied().collect::<Vec<f64>>()),
    ])
}

/// Load the wide REER table and melt its month columns.
pub fn load_reer(path: &Path) -> Result<ReerTable, DataError> {
    require_input(path)?;
    let table = read_table(path)?;
    let context = path.display().to_string();
    let idx = table.require_columns(&[reer::COUNTRY, reer::INDICATOR], &context)?;

    let mut month_columns = Vec::new();
    let mut bad_headers = 0usize;
    for (i, header) in table.headers.iter().enumerate() {
        if !header.contains(reer::MONTH_MARKER) {
            continue;
        }
        match Period::parse(header) {
            Ok(period) => month_columns.push((i, period)),
            Err(_) => bad_headers += 1,
        }
    }
    if bad_headers > 0 {
        warn!(path = %context, skipped = bad_headers, "REER month columns with unparseable period");
    }

    let mut out = ReerTable::new();
    let mut duplicates = 0usize;
    let mut first_duplicate: Option<String> = None;
    let keyword = reer::KEYWORD.to_lowercase();

    for row in &table.rows {
        let indicator = row.get(idx[1]).unwrap_or("");
        if !indicator.to_lowercase().contains(&keyword) {
            continue;
        }
        let country = row.get(idx[0]).unwrap_or("").trim().to_ascii_uppercase();
        if country.is_empty() {
            continue;
        }
        for &(col_idx, period) in &month_columns {
            let Some(value) = row
                .get(col_idx)
                .and_then(|v| v.trim().parse::<f64>().ok())
                .filter(|v| v.is_finite())
            else {
                continue;
            };
            if out.insert((country.clone(), period), value).is_some() {
                duplicates += 1;
                first_duplicate.get_or_insert_with(|| format!("({country}, {period})"));
            }
        }
    }

    if let Some(example) = first_duplicate {
        return Err(duplicate_error(&context, duplicates, example));
    }
    info!(
        path = %context,
        months = month_columns.len(),
        observations = out.len(),
        "prepared REER"
    );
    Ok(out)
}

/// Indicator and REER frames ready to join.
#[derive(Debug, Clone)]
pub struct IndicatorFrames {
    pub indicators: DataFrame,
    pub reer: DataFrame,
}

impl IndicatorFrames {
    pub fn load(
        indicators_path: &Path,
        reer_path: &Path,
        filter: &IndicatorFilter,
    ) -> Result<Self, DataError> {
        let indicators = load_indicators(indicators_path, filter)?.to_frame()?;
        let reer = reer_to_frame(&load_reer(reer_path)?)?;
        Ok(Self { indicators, reer })
    }

    /// Left-join indicators then REER onto `trade` by (country_id, period).
    /// Both right sides are unique per key, so the row count is unchanged.
    pub fn merge(&self, trade: LazyFrame) -> LazyFrame {
        let keys = [col(COUNTRY_ID), col(PERIOD)];
        trade
            .join(
                self.indicators.clone().lazy(),
                keys.clone(),
                keys.clone(),
                JoinArgs::new(JoinType::Left),
            )
            .join(
                self.reer.clone().lazy(),
                keys.clone(),
                keys,
                JoinArgs::new(JoinType::Left),
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_requires_all_three_conditions() {
        let f = IndicatorFilter::default();
        assert!(f.matches(
            "Gross Domestic Product (GDP)",
            "Constant prices",
            "Seasonally adjusted (SA)"
        ));
        assert!(f.matches(
            "Changes in inventories",
            "Constant prices",
            "Seasonally adjusted (SA)"
        ));
        assert!(!f.matches("GDP", "Current prices", "Seasonally adjusted (SA)"));
        assert!(!f.matches("GDP", "Constant prices", "Not seasonally adjusted"));
        assert!(!f.matches("Exports of goods", "Constant prices", "Seasonally adjusted (SA)"));
    }

    #[test]
    fn indicator_columns() {
        assert_eq!(indicator_column("Gross Domestic Product (GDP)"), "gdp_constant_sa");
        assert_eq!(
            indicator_column("Final consumption expenditure, households"),
            "final_consumption_constant_sa"
        );
        assert_eq!(
            indicator_column("Gross capital formation"),
            "gross_capital_formation_constant_sa"
        );
        assert_eq!(
            indicator_column("Changes in inventories"),
            "changes_inventories_constant_sa"
        );
        assert_eq!(
            indicator_column("Government consumption expenditure"),
            "government_consumption_expenditure_constant_sa"
        );
    }

    #[test]
    fn shared_short_name_falls_back_to_slug() {
        let indicators = vec![
            "Final consumption expenditure, households".to_string(),
            "Final consumption expenditure, general government".to_string(),
        ];
        let columns = assign_columns(&indicators, "t").unwrap();
        assert_eq!(columns[&indicators[0]], "final_consumption_constant_sa");
        assert_eq!(
            columns[&indicators[1]],
            "final_consumption_expenditure_general_government_constant_sa"
        );
    }

    #[test]
    fn colliding_slugs_are_a_naming_error() {
        let indicators = vec![
            "Gross fixed capital".to_string(),
            "Gross fixed capital".to_string().to_uppercase(),
        ];
        let err = assign_columns(&indicators, "t").unwrap_err();
        assert!(matches!(err, DataError::SchemaMismatch { .. }), "{err:?}");
    }

    #[test]
    fn indicator_table_frame_has_nulls_for_gaps() {
        let mut table = IndicatorTable::default();
        let p = Period::new(2024, 1).unwrap();
        table.columns.insert("a".into());
        table.columns.insert("b".into());
        table
            .values
            .entry(("USA".into(), p))
            .or_default()
            .insert("a".into(), Some(1.0));
        let df = table.to_frame().unwrap();
        assert_eq!(df.height(), 1);
        assert_eq!(df.column("b").unwrap().null_count(), 1);
        assert_eq!(df.column(PERIOD).unwrap().i64().unwrap().get(0), Some(202401));
    }
}
