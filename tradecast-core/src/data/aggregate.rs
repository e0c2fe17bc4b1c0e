//! HS4 aggregation and partner qualification.
//!
//! Raw trade rows carry fine product ids (HS6 and deeper). Aggregation
//! collapses them to the 4-character coarse code per
//! (period, flow, reporter, partner), then keeps only partners that traded
//! more than `min_products` distinct coarse codes with the reporter in that
//! period. The same [`qualify`] step is applied to normalized comtrade tables.

use super::codes::ProductNames;
use super::decode::{read_table, DecodedTable};
use super::error::{require_input, DataError};
use super::schema::*;
use crate::domain::{Period, TradeFlow, TradeRecord};
use polars::prelude::*;
use std::path::Path;
use tracing::{info, warn};

/// Raw trade export column names.
pub mod raw {
    pub const MONTH_ID: &str = "month_id";
    pub const TRADE_FLOW_NAME: &str = "trade_flow_name";
    pub const COUNTRY_ID: &str = "country_id";
    pub const COUNTRY_NAME: &str = "country_name";
    pub const PRODUCT_ID: &str = "product_id";
    pub const TRADE_VALUE: &str = "trade_value";
    pub const QUANTITY: &str = "quantity";

    pub const REQUIRED: [&str; 6] = [
        MONTH_ID,
        TRADE_FLOW_NAME,
        COUNTRY_ID,
        COUNTRY_NAME,
        PRODUCT_ID,
        TRADE_VALUE,
    ];
}

/// Default qualification threshold: partners need more than this many
/// distinct HS4 codes in a period.
pub const DEFAULT_MIN_PRODUCTS: u32 = 200;

/// Counters for rows that could not be turned into records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowIssues {
    pub bad_period: usize,
    pub bad_flow: usize,
    pub bad_value: usize,
    pub missing_partner: usize,
}

impl RowIssues {
    pub fn total(&self) -> usize {
        self.bad_period + self.bad_flow + self.bad_value + self.missing_partner
    }
}

/// Outcome of aggregating one raw trade file.
#[derive(Debug)]
pub struct Aggregated {
    pub frame: DataFrame,
    pub input_rows: usize,
    pub issues: RowIssues,
}

impl Aggregated {
    pub fn partner_count(&self) -> usize {
        self.frame
            .column(COUNTRY_ID)
            .and_then(|c| c.n_unique())
            .unwrap_or(0)
    }
}

fn field<'a>(row: &'a csv::StringRecord, idx: usize) -> &'a str {
    row.get(idx).unwrap_or("").trim()
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

/// Parse a decoded raw trade export into records with fine product ids.
///
/// A missing trade value counts as zero. Rows with an unparseable period,
/// unknown flow, non-numeric value or blank partner are dropped and counted.
pub fn parse_trade_rows(
    table: &DecodedTable,
    reporter_id: &str,
    context: &str,
) -> Result<(Vec<TradeRecord>, RowIssues), DataError> {
    let idx = table.require_columns(&raw::REQUIRED, context)?;
    let quantity_idx = table.column_index(raw::QUANTITY);

    let mut records = Vec::with_capacity(table.len());
    let mut issues = RowIssues::default();

    for row in &table.rows {
        let Ok(period) = Period::parse(field(row, idx[0])) else {
            issues.bad_period += 1;
            continue;
        };
        let Ok(flow) = field(row, idx[1]).parse::<TradeFlow>() else {
            issues.bad_flow += 1;
            continue;
        };
        let country_id = field(row, idx[2]).to_ascii_uppercase();
        if country_id.is_empty() {
            issues.missing_partner += 1;
            continue;
        }
        let raw_value = field(row, idx[5]);
        let trade_value = if raw_value.is_empty() {
            0.0
        } else {
            match raw_value.parse::<f64>() {
                Ok(v) => v,
                Err(_) => {
                    issues.bad_value += 1;
                    continue;
                }
            }
        };
        let quantity = quantity_idx.and_then(|q| field(row, q).parse::<f64>().ok());

        records.push(TradeRecord {
            period,
            flow,
            reporter_id: reporter_id.to_string(),
            country_id,
            country_name: non_empty(field(row, idx[3])),
            product_code: field(row, idx[4]).to_string(),
            trade_value,
            quantity,
            product_name: None,
        });
    }

    Ok((records, issues))
}

/// Sum value and quantity per row key. Quantity stays null for a group in
/// which no row carried one.
pub fn summarize(lf: LazyFrame) -> LazyFrame {
    lf.group_by_stable(ROW_KEY.map(col))
        .agg([
            col(COUNTRY_NAME).drop_nulls().first(),
            col(TRADE_VALUE).sum(),
            when(col(QUANTITY).count().gt(lit(0)))
                .then(col(QUANTITY).sum())
                .otherwise(lit(NULL).cast(DataType::Float64))
                .alias(QUANTITY),
        ])
}

/// Attach `distinct_product_count` per (reporter, period, partner) and keep
/// only groups above `min_products`. Counts are taken over the whole input,
/// before anything is filtered.
pub fn qualify(lf: LazyFrame, min_products: u32) -> LazyFrame {
    let counts = lf
        .clone()
        .group_by(QUALIFICATION_KEY.map(col))
        .agg([col(PRODUCT_CODE)
            .n_unique()
            .cast(DataType::UInt32)
            .alias(DISTINCT_PRODUCT_COUNT)]);

    lf.join(
        counts,
        QUALIFICATION_KEY.map(col),
        QUALIFICATION_KEY.map(col),
        JoinArgs::new(JoinType::Left),
    )
    .filter(col(DISTINCT_PRODUCT_COUNT).gt(lit(min_products)))
}

/// Left-join product names by code; unmatched codes keep a null name.
pub fn attach_names(lf: LazyFrame, names: &ProductNames) -> Result<LazyFrame, DataError> {
    let (codes, labels): (Vec<&str>, Vec<&str>) = names.iter().unzip();
    let lookup = DataFrame::new(vec![
        Column::new(PRODUCT_CODE.into(), codes),
        Column::new(PRODUCT_NAME.into(), labels),
    ])?;
    Ok(lf.join(
        lookup.lazy(),
        [col(PRODUCT_CODE)],
        [col(PRODUCT_CODE)],
        JoinArgs::new(JoinType::Left),
    ))
}

/// Canonical column order and a stable row order for written files.
pub fn canonical_order(lf: LazyFrame) -> LazyFrame {
    lf.select(
        TradeSchema::columns()
            .into_iter()
            .map(|c| col(c))
            .collect::<Vec<_>>(),
    )
    .sort(
        [REPORTER_ID, PERIOD, TRADE_FLOW, COUNTRY_ID, PRODUCT_CODE],
        SortMultipleOptions::default().with_maintain_order(true),
    )
}

/// Collapse records to HS4, qualify partners and attach names.
pub fn aggregate_records(
    records: &[TradeRecord],
    names: &ProductNames,
    min_products: u32,
) -> Result<DataFrame, DataError> {
    let coarse: Vec<TradeRecord> = records
        .iter()
        .map(|r| TradeRecord {
            product_code: r.coarse_code().to_string(),
            ..r.clone()
        })
        .collect();

    let lf = TradeSchema::records_to_frame(&coarse)?.lazy();
    let lf = qualify(summarize(lf), min_products);
    let lf = attach_names(lf, names)?;
    Ok(canonical_order(lf).collect()?)
}

/// Aggregate one raw trade export file.
pub fn aggregate_trade_file(
    path: &Path,
    reporter_id: &str,
    names: &ProductNames,
    min_products: u32,
) -> Result<Aggregated, DataError> {
    require_input(path)?;
    let table = read_table(path)?;
    let context = path.display().to_string();
    let (records, issues) = parse_trade_rows(&table, reporter_id, &context)?;

    if issues.total() > 0 {
        warn!(
            path = %context,
            bad_period = issues.bad_period,
            bad_flow = issues.bad_flow,
            bad_value = issues.bad_value,
            missing_partner = issues.missing_partner,
            "dropped unparseable trade rows"
        );
    }

    let frame = aggregate_records(&records, names, min_products)?;
    let out = Aggregated {
        frame,
        input_rows: table.len(),
        issues,
    };
    info!(
        path = %context,
        encoding = table.encoding.label(),
        input_rows = out.input_rows,
        output_rows = out.frame.height(),
        partners = out.partner_count(),
        "aggregated trade file"
    );
    Ok(out)
}
