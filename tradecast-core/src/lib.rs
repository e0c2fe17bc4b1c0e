//! Tradecast Core: trade domain types, ETL stage algorithms, external series
//! and submission checks.
//!
//! - Domain types (periods, flows, trade records)
//! - Encoding-tolerant CSV decoding and the HS4 code lookup
//! - Trade aggregation and partner qualification
//! - Monthly external series (exchange rates, commodity prices) with a
//!   Parquet cache and the one-month lag join
//! - Comtrade merge/normalize and the macro indicator merge
//! - Submission validation and sMAPE scoring
//!
//! Stage orchestration, configuration and file layout live in
//! `tradecast-runner`.

pub mod data;
pub mod domain;
pub mod submission;
