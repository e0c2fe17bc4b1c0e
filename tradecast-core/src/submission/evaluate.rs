//! Scoring a submission against ground truth.

use super::metrics::smape;
use super::validate::SubmissionRules;
use super::{parse_value, SubmissionError, SubmissionTable, ValueField, VALUE};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreReport {
    pub metric: String,
    pub score: f64,
    /// Truth rows scored.
    pub rows: usize,
}

/// Key → value, rejecting duplicate keys and non-numeric values.
fn index_values(
    table: &SubmissionTable,
    rules: &SubmissionRules,
    side: &str,
) -> Result<BTreeMap<String, f64>, SubmissionError> {
    let missing = table.missing_columns(&rules.required_columns);
    if !missing.is_empty() {
        return Err(SubmissionError::MissingColumns {
            side: side.to_string(),
            columns: missing,
        });
    }

    let key_idx: Vec<usize> = rules
        .key_columns()
        .iter()
        .filter_map(|c| table.column_index(c))
        .collect();
    let value_idx = table
        .column_index(VALUE)
        .ok_or_else(|| SubmissionError::MissingColumns {
            side: side.to_string(),
            columns: vec![VALUE.to_string()],
        })?;

    let mut values = BTreeMap::new();
    let mut counts: HashMap<String, usize> = HashMap::new();
    for row in 0..table.len() {
        let key = table.key(row, &key_idx);
        *counts.entry(key.clone()).or_default() += 1;
        let raw = table.field(row, value_idx);
        match parse_value(raw) {
            ValueField::Number(v) => {
                values.insert(key, v);
            }
            ValueField::Missing | ValueField::Invalid => {
                return Err(SubmissionError::InvalidValue {
                    side: side.to_string(),
                    row: row + 1,
                    value: raw.to_string(),
                });
            }
        }
    }

    let mut duplicated: Vec<(&String, &usize)> = counts.iter().filter(|(_, &n)| n > 1).collect();
    if !duplicated.is_empty() {
        duplicated.sort();
        return Err(SubmissionError::DuplicateKeys {
            side: side.to_string(),
            count: duplicated.iter().map(|(_, &n)| n).sum(),
            example: duplicated[0].0.clone(),
        });
    }
    Ok(values)
}

/// sMAPE of `submission` against `truth`, joined one-to-one on the key
/// columns. Every truth key needs a prediction; extra predictions are
/// ignored.
pub fn evaluate(
    submission: &SubmissionTable,
    truth: &SubmissionTable,
    rules: &SubmissionRules,
) -> Result<ScoreReport, SubmissionError> {
    let predicted = index_values(submission, rules, "submission")?;
    let actual = index_values(truth, rules, "truth")?;

    let mut y = Vec::with_capacity(actual.len());
    let mut yhat = Vec::with_capacity(actual.len());
    let mut missing = 0;
    for (key, &value) in &actual {
        match predicted.get(key) {
            Some(&p) => {
                y.push(value);
                yhat.push(p);
            }
            None => missing += 1,
        }
    }
    if missing > 0 {
        return Err(SubmissionError::MissingPredictions(missing));
    }

    Ok(ScoreReport {
        metric: "smape".to_string(),
        score: smape(&y, &yhat)?,
        rows: y.len(),
    })
}
