//! Submission files: schema validation, scoring and the shared CSV reader.

pub mod evaluate;
pub mod metrics;
pub mod validate;

pub use evaluate::{evaluate, ScoreReport};
pub use metrics::{smape, MetricError};
pub use validate::{validate_table, SubmissionRules, ValidationReport, Violation};

use csv::StringRecord;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const COUNTRY1: &str = "Country1";
pub const COUNTRY2: &str = "Country2";
pub const PRODUCT_CODE: &str = "ProductCode";
pub const TRADE_FLOW: &str = "TradeFlow";
pub const VALUE: &str = "Value";

/// Columns identifying one forecast row.
pub const KEY_COLUMNS: [&str; 4] = [COUNTRY1, COUNTRY2, PRODUCT_CODE, TRADE_FLOW];

#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("{side} is missing required columns: {}", .columns.join(", "))]
    MissingColumns { side: String, columns: Vec<String> },

    #[error("{side} has {count} rows with duplicate keys, e.g. {example}")]
    DuplicateKeys {
        side: String,
        count: usize,
        example: String,
    },

    #[error("{side} row {row}: value '{value}' is not numeric")]
    InvalidValue {
        side: String,
        row: usize,
        value: String,
    },

    #[error("submission is missing {0} predictions matching the truth keys")]
    MissingPredictions(usize),

    #[error(transparent)]
    Metric(#[from] MetricError),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

/// A submission-shaped CSV held as raw strings. Nothing is coerced on read,
/// so `0101` stays a four-digit product code.
#[derive(Debug, Clone, Default)]
pub struct SubmissionTable {
    pub headers: StringRecord,
    pub rows: Vec<StringRecord>,
}

impl SubmissionTable {
    pub fn read(path: &Path) -> Result<Self, SubmissionError> {
        if !path.exists() {
            return Err(SubmissionError::NotFound(path.to_path_buf()));
        }
        let reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
        Self::from_reader(reader)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SubmissionError> {
        let reader = csv::ReaderBuilder::new().flexible(true).from_reader(bytes);
        Self::from_reader(reader)
    }

    fn from_reader<R: std::io::Read>(mut reader: csv::Reader<R>) -> Result<Self, SubmissionError> {
        let headers = reader.headers()?.clone();
        let rows = reader.records().collect::<Result<Vec<_>, _>>()?;
        Ok(Self { headers, rows })
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h.trim() == name)
    }

    /// Names from `required` that are not in the header.
    pub fn missing_columns(&self, required: &[String]) -> Vec<String> {
        required
            .iter()
            .filter(|c| self.column_index(c).is_none())
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Trimmed field of `row` in column `idx`; empty when the row is short.
    pub fn field(&self, row: usize, idx: usize) -> &str {
        self.rows[row].get(idx).unwrap_or("").trim()
    }

    /// Key tuple of `row` joined with `|`, given the key column indices.
    pub(crate) fn key(&self, row: usize, key_idx: &[usize]) -> String {
        key_idx
            .iter()
            .map(|&i| self.field(row, i))
            .collect::<Vec<_>>()
            .join("|")
    }
}

/// A `Value` field as read from a submission.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum ValueField {
    /// Blank or `NaN`.
    Missing,
    Invalid,
    Number(f64),
}

pub(crate) fn parse_value(raw: &str) -> ValueField {
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("nan") {
        return ValueField::Missing;
    }
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() => ValueField::Number(v),
        _ => ValueField::Invalid,
    }
}
