//! Tradecast Runner: pipeline orchestration, configuration, reports.
//!
//! This crate builds on `tradecast-core` to provide:
//! - TOML pipeline configuration with defaults and validation
//! - The four-stage orchestrator with skip/resume and atomic stage commits
//! - A JSON run manifest with per-stage outputs and the config fingerprint
//! - Validation and score reports for submission files
//! - A latest-value baseline submission

pub mod baseline;
pub mod config;
pub mod manifest;
pub mod pipeline;
pub mod reports;
pub mod staging;

pub use baseline::{latest_values, write_baseline, BaselineError, BaselineOutcome, BaselineRow};
pub use config::{
    ComtradeConfig, ComtradeCountry, ConfigError, ExternalConfig, IndicatorsConfig, PathsConfig,
    PipelineConfig, TradeConfig, TradeDataset,
};
pub use manifest::{
    ExternalSummary, RunManifest, StageName, StageRecord, StageStatus, TableOutput,
};
pub use pipeline::{
    run_pipeline, ExternalOutcome, ExternalSources, PipelineError, PipelineOptions,
};
pub use reports::{evaluate_submission, validate_submission, write_json_report, ReportError};
pub use staging::StagedWrites;
