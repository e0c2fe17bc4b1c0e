//! Criterion benchmarks for the aggregation hot path.
//!
//! Benchmarks:
//! 1. Raw row parsing (decoded CSV to trade records)
//! 2. Coarse-code aggregation with partner qualification
//! 3. Month-end resampling of daily series

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use tradecast_core::data::aggregate::parse_trade_rows;
use tradecast_core::data::decode::decode_table;
use tradecast_core::data::{aggregate_records, resample_month_end, ProductNames};
use tradecast_core::domain::{Period, TradeFlow, TradeRecord};

// ── Helpers ──────────────────────────────────────────────────────────

const PARTNERS: [&str; 8] = ["CHL", "MEX", "DEU", "CHN", "JPN", "CAN", "BRA", "IND"];

fn make_records(n: usize) -> Vec<TradeRecord> {
    (0..n)
        .map(|i| TradeRecord {
            period: Period::new(2023, (i % 12) as u32 + 1).unwrap(),
            flow: if i % 2 == 0 { TradeFlow::Export } else { TradeFlow::Import },
            reporter_id: "USA".into(),
            country_id: PARTNERS[i % PARTNERS.len()].into(),
            country_name: None,
            product_code: format!("{:04}{:02}", (i * 7) % 1200, i % 90),
            trade_value: (i % 1000) as f64 * 1.5,
            quantity: Some((i % 37) as f64),
            product_name: None,
        })
        .collect()
}

fn make_csv(n: usize) -> Vec<u8> {
    let mut out = String::from("month_id,trade_flow_name,country_id,country_name,product_id,trade_value,quantity\n");
    for r in make_records(n) {
        out.push_str(&format!(
            "{},{},{},{},{},{},{}\n",
            r.period.month_id(),
            r.flow.as_str(),
            r.country_id,
            r.country_id,
            r.product_code,
            r.trade_value,
            r.quantity.unwrap_or_default(),
        ));
    }
    out.into_bytes()
}

fn make_names() -> ProductNames {
    (0..1200).map(|i| (format!("{i:04}"), format!("Product {i}"))).collect()
}

// ── Benchmarks ───────────────────────────────────────────────────────

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_trade_rows");
    for &rows in &[10_000, 100_000] {
        let table = decode_table(&make_csv(rows)).unwrap();
        group.bench_with_input(BenchmarkId::new("decoded", rows), &rows, |b, _| {
            b.iter(|| parse_trade_rows(black_box(&table), "USA", "bench"))
        });
    }
    group.finish();
}

fn bench_aggregate(c: &mut Criterion) {
    let mut group = c.benchmark_group("aggregate_records");
    let names = make_names();
    for &rows in &[10_000, 100_000] {
        let records = make_records(rows);
        group.bench_with_input(BenchmarkId::new("min_200", rows), &rows, |b, _| {
            b.iter(|| aggregate_records(black_box(&records), &names, 200))
        });
    }
    group.finish();
}

fn bench_resample(c: &mut Criterion) {
    let start = chrono::NaiveDate::from_ymd_opt(2000, 1, 1).unwrap();
    let daily: Vec<_> = (0..9000)
        .map(|d| (start + chrono::Duration::days(d), Some(d as f64)))
        .collect();
    c.bench_function("resample_month_end_9000_days", |b| {
        b.iter(|| resample_month_end(black_box(&daily)))
    });
}

criterion_group!(benches, bench_parse, bench_aggregate, bench_resample);
criterion_main!(benches);
