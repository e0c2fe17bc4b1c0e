//! Naive baseline submission: the latest observed value per key.
//!
//! Not a forecast model. It produces a schema-correct file from model-ready
//! tables so the submission path can be exercised end to end.

use polars::prelude::*;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};
use tradecast_core::data::frame::scan_trade_csv;
use tradecast_core::data::schema::{
    COUNTRY_ID, PERIOD, PRODUCT_CODE, REPORTER_ID, TRADE_FLOW, TRADE_VALUE,
};
use tradecast_core::data::DataError;
use tradecast_core::submission::{
    SubmissionRules, ValidationReport, COUNTRY1, COUNTRY2, PRODUCT_CODE as SUB_PRODUCT_CODE,
    TRADE_FLOW as SUB_TRADE_FLOW, VALUE,
};

use crate::reports::{validate_submission, ReportError};
use crate::staging::StagedWrites;

pub const DEFAULT_FILE_NAME: &str = "baseline_submission.csv";

const KEY: [&str; 4] = [REPORTER_ID, COUNTRY_ID, PRODUCT_CODE, TRADE_FLOW];

fn used_columns() -> Vec<Expr> {
    KEY.iter()
        .chain([PERIOD, TRADE_VALUE].iter())
        .map(|c| col(*c))
        .collect()
}

#[derive(Debug, Error)]
pub enum BaselineError {
    #[error("no input tables given")]
    NoInputs,
    #[error(transparent)]
    Data(#[from] DataError),
    #[error("dataframe error: {0}")]
    Frame(#[from] PolarsError),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Report(#[from] ReportError),
}

/// One submission line.
#[derive(Debug, Clone, PartialEq)]
pub struct BaselineRow {
    pub country1: String,
    pub country2: String,
    pub product_code: String,
    pub trade_flow: String,
    pub value: f64,
}

#[derive(Debug, Clone)]
pub struct BaselineOutcome {
    pub path: PathBuf,
    pub rows: usize,
    pub report: ValidationReport,
}

/// Latest-period trade value per (reporter, partner, product, flow),
/// sorted by key. Rows sharing a key and period keep the input order, so
/// the later table wins.
pub fn latest_values(trade: LazyFrame) -> Result<Vec<BaselineRow>, BaselineError> {
    let sort_keeping_order = SortMultipleOptions::default().with_maintain_order(true);
    let df = trade
        .select(used_columns())
        .sort([PERIOD], sort_keeping_order.clone())
        .group_by(KEY.map(col))
        .agg([col(TRADE_VALUE).last()])
        .sort(KEY, sort_keeping_order)
        .collect()?;

    let reporter = df.column(REPORTER_ID)?.str()?;
    let partner = df.column(COUNTRY_ID)?.str()?;
    let code = df.column(PRODUCT_CODE)?.str()?;
    let flow = df.column(TRADE_FLOW)?.str()?;
    let value = df.column(TRADE_VALUE)?.f64()?;

    let mut rows = Vec::with_capacity(df.height());
    let mut incomplete = 0;
    for i in 0..df.height() {
        match (reporter.get(i), partner.get(i), code.get(i), flow.get(i), value.get(i)) {
            (Some(r), Some(p), Some(c), Some(f), Some(v)) => rows.push(BaselineRow {
                country1: r.to_string(),
                country2: p.to_string(),
                product_code: c.to_string(),
                trade_flow: f.to_string(),
                value: v,
            }),
            _ => incomplete += 1,
        }
    }
    if incomplete > 0 {
        warn!(rows = incomplete, "skipped keys with null fields");
    }
    Ok(rows)
}

/// Build a baseline from `inputs`, write it to `output` with every field
/// quoted, and validate the written file. The inputs may carry different
/// extra columns; only the key, period and value are read.
pub fn write_baseline(
    inputs: &[PathBuf],
    output: &Path,
    rules: &SubmissionRules,
    evaluation_dir: &Path,
) -> Result<BaselineOutcome, BaselineError> {
    if inputs.is_empty() {
        return Err(BaselineError::NoInputs);
    }
    let frames = inputs
        .iter()
        .map(|p| scan_trade_csv(p).map(|lf| lf.select(used_columns())))
        .collect::<Result<Vec<_>, _>>()?;
    let rows = latest_values(concat(frames, UnionArgs::default())?)?;

    let mut staged = StagedWrites::new();
    let tmp = staged.stage(output)?;
    let mut writer = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Always)
        .from_path(&tmp)?;
    writer.write_record([COUNTRY1, COUNTRY2, SUB_PRODUCT_CODE, SUB_TRADE_FLOW, VALUE])?;
    for row in &rows {
        writer.write_record([
            row.country1.as_str(),
            row.country2.as_str(),
            row.product_code.as_str(),
            row.trade_flow.as_str(),
            row.value.to_string().as_str(),
        ])?;
    }
    writer.flush().map_err(|e| DataError::io(&tmp, e))?;
    drop(writer);
    staged.commit()?;

    info!(path = %output.display(), rows = rows.len(), "wrote baseline submission");
    let (report, _) = validate_submission(output, rules, evaluation_dir)?;
    Ok(BaselineOutcome {
        path: output.to_path_buf(),
        rows: rows.len(),
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::fs;
    use tempfile::TempDir;

    fn history(periods: &[i64], values: &[f64]) -> LazyFrame {
        let n = periods.len();
        df!(
            REPORTER_ID => vec!["USA"; n],
            COUNTRY_ID => vec!["CHL"; n],
            PRODUCT_CODE => vec!["0101"; n],
            TRADE_FLOW => vec!["Export"; n],
            PERIOD => periods,
            TRADE_VALUE => values,
        )
        .unwrap()
        .lazy()
    }

    #[test]
    fn picks_latest_period_per_key() {
        let lf = df!(
            REPORTER_ID => ["USA", "USA", "USA", "CHN"],
            COUNTRY_ID => ["CHL", "CHL", "CHL", "BRA"],
            PRODUCT_CODE => ["0101", "0101", "0101", "8404"],
            TRADE_FLOW => ["Export", "Export", "Import", "Import"],
            PERIOD => [202_403i64, 202_401, 202_312, 202_401],
            TRADE_VALUE => [5.0, 9.0, 1.5, 7.0],
        )
        .unwrap()
        .lazy();

        let rows = latest_values(lf).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].country1, "CHN");
        let export = rows
            .iter()
            .find(|r| r.country1 == "USA" && r.trade_flow == "Export")
            .unwrap();
        assert_eq!(export.value, 5.0);
        assert_eq!(export.product_code, "0101");
    }

    #[test]
    fn written_file_is_quoted_and_valid() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("model_ready.csv");
        fs::write(
            &input,
            "period,trade_flow,reporter_id,country_id,country_name,product_code,trade_value,quantity,distinct_product_count,product_name\n\
             202402,Export,USA,CHL,Chile,0101,10.5,,250,Horses\n\
             202403,Export,USA,CHL,Chile,0101,12,,250,Horses\n",
        )
        .unwrap();
        let output = dir.path().join("forecasts").join(DEFAULT_FILE_NAME);

        let outcome =
            write_baseline(&[input], &output, &SubmissionRules::default(), dir.path()).unwrap();
        assert_eq!(outcome.rows, 1);
        assert!(outcome.report.passed, "{:?}", outcome.report.errors);

        let text = fs::read_to_string(&output).unwrap();
        assert_eq!(
            text,
            "\"Country1\",\"Country2\",\"ProductCode\",\"TradeFlow\",\"Value\"\n\
             \"USA\",\"CHL\",\"0101\",\"Export\",\"12\"\n"
        );
    }

    #[test]
    fn no_inputs_rejected() {
        let dir = TempDir::new().unwrap();
        let err = write_baseline(
            &[],
            &dir.path().join("out.csv"),
            &SubmissionRules::default(),
            dir.path(),
        )
        .unwrap_err();
        assert!(matches!(err, BaselineError::NoInputs));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn value_of_max_period_wins(
            obs in prop::collection::btree_map(201_001i64..202_412, 0.0f64..1e9, 1..20)
        ) {
            let (periods, values): (Vec<i64>, Vec<f64>) = obs.iter().rev().map(|(p, v)| (*p, *v)).unzip();
            let rows = latest_values(history(&periods, &values)).unwrap();
            prop_assert_eq!(rows.len(), 1);
            let (_, expected) = obs.iter().next_back().unwrap();
            prop_assert_eq!(rows[0].value, *expected);
        }
    }
}
