//! Comtrade monthly HS4 extracts.
//!
//! Files are named `{COUNTRY}_{X|M}_{YEAR}{MM}..._HS4.csv`, one per month and
//! flow. Their encodings and column counts vary from file to file. Merging
//! produces one table per (country, year, flow); normalization maps it onto
//! the canonical trade schema and applies the shared partner qualification.

use super::aggregate::{attach_names, canonical_order, qualify, summarize, RowIssues};
use super::codes::ProductNames;
use super::decode::{read_table, DecodedTable};
use super::error::{require_input, DataError};
use super::schema::TradeSchema;
use crate::domain::{coarse_product_code, Period, TradeFlow, TradeRecord};
use csv::StringRecord;
use polars::prelude::*;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Comtrade source column names.
pub mod source {
    pub const PERIOD: &str = "period";
    pub const FLOW_DESC: &str = "flowDesc";
    pub const PARTNER_ISO: &str = "partnerISO";
    pub const PARTNER_DESC: &str = "partnerDesc";
    pub const CMD_CODE: &str = "cmdCode";
    pub const PRIMARY_VALUE: &str = "primaryValue";
    pub const QTY: &str = "qty";
    pub const CMD_DESC: &str = "cmdDesc";

    /// Every column normalization maps onto the canonical schema.
    pub const REQUIRED: [&str; 8] = [
        PERIOD,
        FLOW_DESC,
        PARTNER_ISO,
        PARTNER_DESC,
        CMD_CODE,
        PRIMARY_VALUE,
        QTY,
        CMD_DESC,
    ];
}

/// All monthly files for one (country, year, flow).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComtradeGroup {
    pub country: String,
    pub year: i32,
    pub flow: TradeFlow,
    pub files: Vec<PathBuf>,
}

impl ComtradeGroup {
    /// Table name, e.g. `USA_2021_export`.
    pub fn name(&self) -> String {
        format!("{}_{}_{}", self.country, self.year, self.flow.file_tag())
    }
}

/// Flows in processing order.
const FLOW_ORDER: [TradeFlow; 2] = [TradeFlow::Import, TradeFlow::Export];

const FILE_SUFFIX: &str = "_HS4.csv";

/// Flow and period part of `{country}_{X|M}_{period}_HS4.csv`, or `None` for
/// files of another country or an unknown flow code.
fn parse_file_name<'a>(name: &'a str, country: &str) -> Option<(TradeFlow, &'a str)> {
    let rest = name
        .strip_suffix(FILE_SUFFIX)?
        .strip_prefix(country)?
        .strip_prefix('_')?;
    let (code, period) = rest.split_once('_')?;
    Some((TradeFlow::from_code(code)?, period))
}

/// Find the monthly files for `country` in each of `years`. Groups without
/// any file are logged and left out.
pub fn discover_groups(
    dir: &Path,
    country: &str,
    years: &[i32],
) -> Result<Vec<ComtradeGroup>, DataError> {
    require_input(dir)?;
    let mut names: Vec<String> = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| DataError::io(dir, e))? {
        let entry = entry.map_err(|e| DataError::io(dir, e))?;
        if let Some(name) = entry.file_name().to_str() {
            names.push(name.to_string());
        }
    }
    names.sort();

    let mut groups = Vec::new();
    for &year in years {
        let year_prefix = year.to_string();
        for flow in FLOW_ORDER {
            let files: Vec<PathBuf> = names
                .iter()
                .filter(|n| {
                    parse_file_name(n, country)
                        .is_some_and(|(f, period)| f == flow && period.starts_with(&year_prefix))
                })
                .map(|n| dir.join(n))
                .collect();
            if files.is_empty() {
                warn!(country, year, flow = %flow, "no comtrade files found");
                continue;
            }
            groups.push(ComtradeGroup {
                country: country.to_string(),
                year,
                flow,
                files,
            });
        }
    }
    Ok(groups)
}

/// Concatenation of a group's monthly files, columns aligned by name.
#[derive(Debug, Clone)]
pub struct MergedGroup {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub files_used: usize,
    pub files_skipped: usize,
    pub rows_dropped: usize,
}

impl MergedGroup {
    pub fn write_csv(&self, path: &Path) -> Result<(), DataError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| DataError::io(parent, e))?;
        }
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(&self.headers)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer.flush().map_err(|e| DataError::io(path, e))?;
        Ok(())
    }
}

/// Keep rows whose quantity is present and non-negative.
fn keep_row(row: &StringRecord, qty_idx: usize) -> bool {
    row.get(qty_idx)
        .and_then(|q| q.trim().parse::<f64>().ok())
        .is_some_and(|q| q >= 0.0)
}

/// Merge the monthly files of a group.
///
/// A file that cannot be decoded or has no `qty` column is skipped with a
/// log entry; the remaining files still produce a table. Returns `None` when
/// no file of the group was usable.
pub fn merge_group(group: &ComtradeGroup) -> Option<MergedGroup> {
    let mut headers: Vec<String> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut files_used = 0;
    let mut files_skipped = 0;
    let mut rows_dropped = 0;

    for path in &group.files {
        let table = match read_table(path) {
            Ok(t) => t,
            Err(e) => {
                error!(path = %path.display(), error = %e, "skipping unreadable comtrade file");
                files_skipped += 1;
                continue;
            }
        };
        let Some(qty_idx) = table.column_index(source::QTY) else {
            warn!(path = %path.display(), "'qty' column not found, skipping file");
            files_skipped += 1;
            continue;
        };
        if table.placeholder_columns > 0 {
            info!(
                path = %path.display(),
                extra = table.placeholder_columns,
                "named extra data columns"
            );
        }

        let slots: Vec<usize> = table
            .headers
            .iter()
            .map(|h| {
                *positions.entry(h.to_string()).or_insert_with(|| {
                    headers.push(h.to_string());
                    headers.len() - 1
                })
            })
            .collect();

        let before = rows.len();
        for row in &table.rows {
            if !keep_row(row, qty_idx) {
                rows_dropped += 1;
                continue;
            }
            let mut out = vec![String::new(); headers.len()];
            for (field, &slot) in row.iter().zip(&slots) {
                out[slot] = field.to_string();
            }
            rows.push(out);
        }
        files_used += 1;
        debug!(
            path = %path.display(),
            encoding = table.encoding.label(),
            kept = rows.len() - before,
            "merged comtrade file"
        );
    }

    if files_used == 0 {
        warn!(group = %group.name(), "no usable comtrade files in group");
        return None;
    }

    // rows merged before a later file introduced new columns are short
    let width = headers.len();
    for row in &mut rows {
        row.resize(width, String::new());
    }

    Some(MergedGroup {
        name: group.name(),
        headers,
        rows,
        files_used,
        files_skipped,
        rows_dropped,
    })
}

/// Map a decoded comtrade table onto the canonical schema.
///
/// The flow comes from `flowDesc`, falling back to `default_flow` (taken from
/// the file name) when the description is not recognized. Product names come
/// from `cmdDesc`, first description per code.
pub fn normalize_table(
    table: &DecodedTable,
    reporter_id: &str,
    default_flow: TradeFlow,
    min_products: u32,
    context: &str,
) -> Result<(DataFrame, RowIssues), DataError> {
    let idx = table.require_columns(&source::REQUIRED, context)?;
    let field = |row: &StringRecord, i: usize| row.get(idx[i]).unwrap_or("").trim().to_string();

    let mut records = Vec::with_capacity(table.len());
    let mut names = ProductNames::new();
    let mut issues = RowIssues::default();

    for row in &table.rows {
        let Ok(period) = Period::parse(&field(row, 0)) else {
            issues.bad_period += 1;
            continue;
        };
        let flow = field(row, 1).parse::<TradeFlow>().unwrap_or(default_flow);
        let country_id = field(row, 2).to_ascii_uppercase();
        if country_id.is_empty() {
            issues.missing_partner += 1;
            continue;
        }
        let Ok(trade_value) = field(row, 5).parse::<f64>() else {
            issues.bad_value += 1;
            continue;
        };
        let product_code = coarse_product_code(&field(row, 4)).to_string();
        let description = field(row, 7);
        if !description.is_empty() {
            names.insert(product_code.clone(), description);
        }
        let partner_name = field(row, 3);

        records.push(TradeRecord {
            period,
            flow,
            reporter_id: reporter_id.to_string(),
            country_id,
            country_name: (!partner_name.is_empty()).then_some(partner_name),
            product_code,
            trade_value,
            quantity: field(row, 6).parse::<f64>().ok(),
            product_name: None,
        });
    }

    let lf = TradeSchema::records_to_frame(&records)?.lazy();
    let lf = attach_names(qualify(summarize(lf), min_products), &names)?;
    Ok((canonical_order(lf).collect()?, issues))
}

/// Normalize a merged group file.
pub fn normalize_file(
    path: &Path,
    reporter_id: &str,
    default_flow: TradeFlow,
    min_products: u32,
) -> Result<DataFrame, DataError> {
    require_input(path)?;
    let table = read_table(path)?;
    let context = path.display().to_string();
    let (df, issues) = normalize_table(&table, reporter_id, default_flow, min_products, &context)?;
    if issues.total() > 0 {
        warn!(path = %context, dropped = issues.total(), "dropped unparseable comtrade rows");
    }
    info!(path = %context, input_rows = table.len(), output_rows = df.height(), "normalized comtrade table");
    Ok(df)
}
