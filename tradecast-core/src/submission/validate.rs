//! Submission schema checks.
//!
//! Every rule is checked independently and reported once with the number of
//! offending rows. Only a missing required column stops the remaining checks.
//! A failed validation is a report, never an error.

use super::{
    parse_value, SubmissionTable, ValueField, COUNTRY1, COUNTRY2, PRODUCT_CODE, TRADE_FLOW, VALUE,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Shape a submission must have.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubmissionRules {
    pub required_columns: Vec<String>,
    /// Exact, case-sensitive.
    pub trade_flow_values: Vec<String>,
    pub country_code_len: usize,
    pub product_code_len: usize,
}

impl Default for SubmissionRules {
    fn default() -> Self {
        Self {
            required_columns: [COUNTRY1, COUNTRY2, PRODUCT_CODE, TRADE_FLOW, VALUE]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            trade_flow_values: vec!["Export".into(), "Import".into()],
            country_code_len: 3,
            product_code_len: 4,
        }
    }
}

impl SubmissionRules {
    /// Required columns other than `Value`.
    pub fn key_columns(&self) -> Vec<String> {
        self.required_columns
            .iter()
            .filter(|c| c.as_str() != VALUE)
            .cloned()
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub rule: String,
    pub message: String,
    /// Offending rows.
    pub rows: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub passed: bool,
    pub rows: usize,
    pub errors: Vec<Violation>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn has_rule(&self, rule: &str) -> bool {
        self.errors.iter().any(|v| v.rule == rule)
    }
}

fn is_country_code(s: &str, len: usize) -> bool {
    s.len() == len && s.bytes().all(|b| b.is_ascii_uppercase())
}

fn is_product_code(s: &str, len: usize) -> bool {
    s.len() == len && s.bytes().all(|b| b.is_ascii_digit())
}

/// Run every rule against `table`.
pub fn validate_table(table: &SubmissionTable, rules: &SubmissionRules) -> ValidationReport {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    let mut push = |rule: &str, message: String, rows: usize| {
        errors.push(Violation {
            rule: rule.to_string(),
            message,
            rows,
        })
    };

    let missing = table.missing_columns(&rules.required_columns);
    if !missing.is_empty() {
        push(
            "missing_columns",
            format!("missing required columns: {}", missing.join(", ")),
            table.len(),
        );
        return ValidationReport {
            passed: false,
            rows: table.len(),
            errors,
            warnings,
        };
    }

    // All required columns are present past this point.
    let idx = |name: &str| table.column_index(name).unwrap_or(usize::MAX);

    if table.is_empty() {
        warnings.push("submission has no data rows".to_string());
    }

    if rules.required_columns.iter().any(|c| c == VALUE) {
        let value_idx = idx(VALUE);
        let (mut blank, mut invalid, mut negative) = (0, 0, 0);
        for row in 0..table.len() {
            match parse_value(table.field(row, value_idx)) {
                ValueField::Missing => blank += 1,
                ValueField::Invalid => invalid += 1,
                ValueField::Number(v) if v < 0.0 => negative += 1,
                ValueField::Number(_) => {}
            }
        }
        if blank > 0 {
            push("missing_value", "column 'Value' contains missing values".into(), blank);
        }
        if invalid > 0 {
            push("non_numeric_value", "column 'Value' contains non-numeric values".into(), invalid);
        }
        if negative > 0 {
            push("negative_value", "column 'Value' contains negative values".into(), negative);
        }
    }

    let flow_idx = idx(TRADE_FLOW);
    let mut bad_flows = BTreeSet::new();
    let mut bad_flow_rows = 0;
    for row in 0..table.len() {
        let flow = table.field(row, flow_idx);
        if !rules.trade_flow_values.iter().any(|f| f == flow) {
            bad_flows.insert(flow.to_string());
            bad_flow_rows += 1;
        }
    }
    if bad_flow_rows > 0 {
        let mut allowed = rules.trade_flow_values.clone();
        allowed.sort();
        push(
            "invalid_trade_flow",
            format!(
                "invalid TradeFlow values: {:?}. Allowed: {:?}",
                bad_flows.into_iter().collect::<Vec<_>>(),
                allowed
            ),
            bad_flow_rows,
        );
    }

    for column in [COUNTRY1, COUNTRY2] {
        let col_idx = idx(column);
        let bad = (0..table.len())
            .filter(|&row| !is_country_code(table.field(row, col_idx), rules.country_code_len))
            .count();
        if bad > 0 {
            push(
                "invalid_country_code",
                format!(
                    "column '{column}' has invalid ISO-3 codes (must be A-Z uppercase, length {})",
                    rules.country_code_len
                ),
                bad,
            );
        }
    }

    let code_idx = idx(PRODUCT_CODE);
    let bad_codes = (0..table.len())
        .filter(|&row| !is_product_code(table.field(row, code_idx), rules.product_code_len))
        .count();
    if bad_codes > 0 {
        push(
            "invalid_product_code",
            format!(
                "column 'ProductCode' must be exactly {} digits (HS4)",
                rules.product_code_len
            ),
            bad_codes,
        );
    }

    let key_columns = rules.key_columns();
    let key_idx: Vec<usize> = key_columns.iter().map(|c| idx(c)).collect();
    let mut seen: HashMap<String, usize> = HashMap::new();
    for row in 0..table.len() {
        *seen.entry(table.key(row, &key_idx)).or_default() += 1;
    }
    let duplicated: usize = seen.values().filter(|&&n| n > 1).sum();
    if duplicated > 0 {
        push(
            "duplicate_keys",
            format!(
                "duplicate rows for key columns {key_columns:?}: {duplicated} duplicates detected"
            ),
            duplicated,
        );
    }

    ValidationReport {
        passed: errors.is_empty(),
        rows: table.len(),
        errors,
        warnings,
    }
}
