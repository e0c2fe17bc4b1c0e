//! Validation and score reports, written as JSON into the evaluation
//! directory.

use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;
use tradecast_core::submission::{
    evaluate, validate_table, ScoreReport, SubmissionError, SubmissionRules, SubmissionTable,
    ValidationReport,
};

pub const VALIDATION_REPORT: &str = "validation.json";
pub const SCORE_REPORT: &str = "score.json";

#[derive(Debug, Error)]
pub enum ReportError {
    #[error(transparent)]
    Submission(#[from] SubmissionError),
    #[error("failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

fn write_err(path: &Path) -> impl FnOnce(std::io::Error) -> ReportError + '_ {
    move |source| ReportError::Write {
        path: path.to_path_buf(),
        source,
    }
}

/// Pretty-print `report` to `{dir}/{file_name}`, creating `dir`.
pub fn write_json_report<T: Serialize>(
    dir: &Path,
    file_name: &str,
    report: &T,
) -> Result<PathBuf, ReportError> {
    fs::create_dir_all(dir).map_err(write_err(dir))?;
    let path = dir.join(file_name);
    let json = serde_json::to_string_pretty(report)?;
    fs::write(&path, json).map_err(write_err(&path))?;
    Ok(path)
}

/// Check the submission at `path` and write `validation.json`.
///
/// A submission that breaks rules still yields `Ok`; callers decide on the
/// exit status from `report.passed`.
pub fn validate_submission(
    path: &Path,
    rules: &SubmissionRules,
    evaluation_dir: &Path,
) -> Result<(ValidationReport, PathBuf), ReportError> {
    let table = SubmissionTable::read(path)?;
    let report = validate_table(&table, rules);
    let written = write_json_report(evaluation_dir, VALIDATION_REPORT, &report)?;
    info!(
        file = %path.display(),
        passed = report.passed,
        errors = report.errors.len(),
        "validated submission"
    );
    Ok((report, written))
}

/// Score `submission` against `truth` and write `score.json`.
pub fn evaluate_submission(
    submission: &Path,
    truth: &Path,
    rules: &SubmissionRules,
    evaluation_dir: &Path,
) -> Result<(ScoreReport, PathBuf), ReportError> {
    let predicted = SubmissionTable::read(submission)?;
    let actual = SubmissionTable::read(truth)?;
    let report = evaluate(&predicted, &actual, rules)?;
    let written = write_json_report(evaluation_dir, SCORE_REPORT, &report)?;
    info!(metric = %report.metric, score = report.score, rows = report.rows, "scored submission");
    Ok((report, written))
}
