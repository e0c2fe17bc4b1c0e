//! Aggregation properties over generated trade records.
//!
//! 1. Conservation: coarse totals equal the sum of their fine ids
//! 2. Distinct counts are taken before filtering
//! 3. No group at or below the threshold survives

use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use tradecast_core::data::schema::{
    COUNTRY_ID, DISTINCT_PRODUCT_COUNT, PERIOD, PRODUCT_CODE, TRADE_FLOW, TRADE_VALUE,
};
use tradecast_core::data::{aggregate_records, ProductNames};
use tradecast_core::domain::{coarse_product_code, Period, TradeFlow, TradeRecord};

type GroupKey = (i64, String, String, String);

fn arb_record() -> impl Strategy<Value = TradeRecord> {
    (
        1u32..=3,
        prop::bool::ANY,
        prop::sample::select(vec!["CHL", "MEX", "DEU"]),
        0u32..12,
        10u32..13,
        0u32..10_000,
    )
        .prop_map(|(month, export, country, hs4, suffix, value)| TradeRecord {
            period: Period::new(2024, month).unwrap(),
            flow: if export { TradeFlow::Export } else { TradeFlow::Import },
            reporter_id: "USA".into(),
            country_id: country.into(),
            country_name: None,
            product_code: format!("{:04}{suffix}", 8400 + hs4),
            trade_value: value as f64,
            quantity: None,
            product_name: None,
        })
}

fn rows(df: &polars::prelude::DataFrame) -> Vec<(GroupKey, f64, u32)> {
    let period = df.column(PERIOD).unwrap().i64().unwrap();
    let flow = df.column(TRADE_FLOW).unwrap().str().unwrap();
    let country = df.column(COUNTRY_ID).unwrap().str().unwrap();
    let code = df.column(PRODUCT_CODE).unwrap().str().unwrap();
    let value = df.column(TRADE_VALUE).unwrap().f64().unwrap();
    let count = df.column(DISTINCT_PRODUCT_COUNT).unwrap().u32().unwrap();
    (0..df.height())
        .map(|i| {
            (
                (
                    period.get(i).unwrap(),
                    flow.get(i).unwrap().to_string(),
                    country.get(i).unwrap().to_string(),
                    code.get(i).unwrap().to_string(),
                ),
                value.get(i).unwrap(),
                count.get(i).unwrap(),
            )
        })
        .collect()
}

proptest! {
    #[test]
    fn coarse_totals_are_conserved(records in prop::collection::vec(arb_record(), 1..200)) {
        let df = aggregate_records(&records, &ProductNames::new(), 0).unwrap();

        let mut expected: BTreeMap<GroupKey, f64> = BTreeMap::new();
        for r in &records {
            let key = (
                r.period.month_id(),
                r.flow.as_str().to_string(),
                r.country_id.clone(),
                coarse_product_code(&r.product_code).to_string(),
            );
            *expected.entry(key).or_default() += r.trade_value;
        }

        let out = rows(&df);
        prop_assert_eq!(out.len(), expected.len());
        for (key, value, _) in out {
            prop_assert!((expected[&key] - value).abs() < 1e-6);
        }
    }

    #[test]
    fn thin_partners_are_dropped(
        records in prop::collection::vec(arb_record(), 1..200),
        threshold in 0u32..12,
    ) {
        let df = aggregate_records(&records, &ProductNames::new(), threshold).unwrap();

        // distinct coarse codes per (period, partner), both flows together
        let mut distinct: BTreeMap<(i64, String), BTreeSet<String>> = BTreeMap::new();
        for r in &records {
            distinct
                .entry((r.period.month_id(), r.country_id.clone()))
                .or_default()
                .insert(coarse_product_code(&r.product_code).to_string());
        }

        let out = rows(&df);
        for ((period, _, country, _), _, count) in &out {
            let want = distinct[&(*period, country.clone())].len() as u32;
            prop_assert_eq!(*count, want);
            prop_assert!(*count > threshold);
        }

        let kept: BTreeSet<(i64, String)> = out
            .iter()
            .map(|((p, _, c, _), _, _)| (*p, c.clone()))
            .collect();
        for (group, codes) in &distinct {
            prop_assert_eq!(kept.contains(group), codes.len() as u32 > threshold);
        }
    }
}

#[test]
fn default_threshold_is_two_hundred() {
    assert_eq!(tradecast_core::data::DEFAULT_MIN_PRODUCTS, 200);
}
