//! Indicator and REER merge onto trade tables.

use polars::prelude::*;
use std::fs;
use tempfile::TempDir;
use tradecast_core::data::indicators::REER_COLUMN;
use tradecast_core::data::schema::{COUNTRY_ID, PERIOD};
use tradecast_core::data::{DataError, IndicatorFilter, IndicatorFrames};
use tradecast_core::domain::Period;

const LONG: &str = "\
ISO3,PERIOD,INDICATOR,PRICE_TYPE,S_ADJUSTMENT,VALUE
CHL,2024-M01,Gross domestic product (GDP),Constant prices,Seasonally adjusted (SA),100.5
CHL,2024-M01,Final consumption expenditure,Constant prices,Seasonally adjusted (SA),70
CHL,2024-M01,Gross domestic product (GDP),Current prices,Seasonally adjusted (SA),999
CHL,2024-M01,Exports of goods,Constant prices,Seasonally adjusted (SA),5
CHL,2024-Q1,Gross domestic product (GDP),Constant prices,Seasonally adjusted (SA),1
MEX,2024-M02,Gross domestic product (GDP),Constant prices,Seasonally adjusted (SA),200
";

const REER: &str = "\
COUNTRY.ID,COUNTRY,INDICATOR,2024-M01,2024-M02
CHL,Chile,\"Real Effective Exchange Rate (REER), Index\",98.1,99.2
MEX,Mexico,\"Real Effective Exchange Rate (REER), Index\",,101.0
MEX,Mexico,Nominal Effective Exchange Rate,1,1
";

fn p(y: i32, m: u32) -> i64 {
    Period::new(y, m).unwrap().month_id()
}

fn write_inputs(dir: &TempDir, long: &str, reer: &str) -> (std::path::PathBuf, std::path::PathBuf) {
    let long_path = dir.path().join("df_long.csv");
    let reer_path = dir.path().join("EER_COUNTRIES.csv");
    fs::write(&long_path, long).unwrap();
    fs::write(&reer_path, reer).unwrap();
    (long_path, reer_path)
}

#[test]
fn merge_keeps_every_trade_row() {
    let dir = TempDir::new().unwrap();
    let (long, reer) = write_inputs(&dir, LONG, REER);
    let frames = IndicatorFrames::load(&long, &reer, &IndicatorFilter::default()).unwrap();

    // two products for CHL in January, one partner without any indicator
    let trade = df!(
        PERIOD => [p(2024, 1), p(2024, 1), p(2024, 2), p(2024, 1)],
        COUNTRY_ID => ["CHL", "CHL", "MEX", "ZZZ"],
        "product_code" => ["8404", "8405", "8404", "0101"],
    )
    .unwrap();

    let merged = frames.merge(trade.clone().lazy()).collect().unwrap();
    assert_eq!(merged.height(), trade.height());

    let gdp: Vec<Option<f64>> = merged
        .column("gdp_constant_sa")
        .unwrap()
        .f64()
        .unwrap()
        .into_iter()
        .collect();
    assert_eq!(gdp, vec![Some(100.5), Some(100.5), Some(200.0), None]);

    let consumption = merged.column("final_consumption_constant_sa").unwrap();
    assert_eq!(consumption.null_count(), 2);

    let reer: Vec<Option<f64>> = merged
        .column(REER_COLUMN)
        .unwrap()
        .f64()
        .unwrap()
        .into_iter()
        .collect();
    assert_eq!(reer, vec![Some(98.1), Some(98.1), Some(101.0), None]);
}

#[test]
fn duplicate_indicator_key_is_ambiguous() {
    let dir = TempDir::new().unwrap();
    let long = format!(
        "{LONG}CHL,2024-M01,Gross domestic product (GDP),Constant prices,Seasonally adjusted (SA),101\n"
    );
    let (long, reer) = write_inputs(&dir, &long, REER);

    let err = IndicatorFrames::load(&long, &reer, &IndicatorFilter::default()).unwrap_err();
    match err {
        DataError::AmbiguousPivot { duplicates, example, .. } => {
            assert_eq!(duplicates, 1);
            assert!(example.contains("CHL"));
        }
        other => panic!("expected ambiguous pivot, got {other:?}"),
    }
}

#[test]
fn distinct_indicators_sharing_a_short_name_keep_their_own_columns() {
    let dir = TempDir::new().unwrap();
    let long = "\
ISO3,PERIOD,INDICATOR,PRICE_TYPE,S_ADJUSTMENT,VALUE
CHL,2024-M01,\"Final consumption expenditure, households\",Constant prices,Seasonally adjusted (SA),70
CHL,2024-M01,\"Final consumption expenditure, general government\",Constant prices,Seasonally adjusted (SA),20
";
    let (long, reer) = write_inputs(&dir, long, REER);
    let frames = IndicatorFrames::load(&long, &reer, &IndicatorFilter::default()).unwrap();

    let households = frames.indicators.column("final_consumption_constant_sa").unwrap();
    let government = frames
        .indicators
        .column("final_consumption_expenditure_general_government_constant_sa")
        .unwrap();
    assert_eq!(frames.indicators.height(), 1);
    assert_eq!(households.f64().unwrap().get(0), Some(70.0));
    assert_eq!(government.f64().unwrap().get(0), Some(20.0));
}

#[test]
fn duplicate_reer_key_is_ambiguous() {
    let dir = TempDir::new().unwrap();
    let reer = format!("{REER}CHL,Chile,REER (alt),1,2\n");
    let (long, reer) = write_inputs(&dir, LONG, &reer);

    let err = IndicatorFrames::load(&long, &reer, &IndicatorFilter::default()).unwrap_err();
    assert!(matches!(err, DataError::AmbiguousPivot { duplicates: 2, .. }));
}

#[test]
fn missing_file_is_input_missing() {
    let dir = TempDir::new().unwrap();
    let err = IndicatorFrames::load(
        &dir.path().join("nope.csv"),
        &dir.path().join("nope2.csv"),
        &IndicatorFilter::default(),
    )
    .unwrap_err();
    assert!(matches!(err, DataError::InputMissing(_)));
}
