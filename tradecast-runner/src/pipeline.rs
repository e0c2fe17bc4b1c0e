//! Pipeline orchestrator: sequences the four data stages.
//!
//! `trade` → `external` → `comtrade` → `indicators`. Each stage reads the
//! tables materialized by the one before it and commits its own outputs only
//! when it finishes. A skipped stage hands on whatever an earlier run left
//! on disk.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use thiserror::Error;
use tracing::{info, warn};

use tradecast_core::data::error::require_input;
use tradecast_core::data::frame::scan_trade_csv;
use tradecast_core::data::{
    aggregate_trade_file, discover_groups, fetch_monthly, merge_external, merge_group,
    normalize_file, CircuitBreaker, DataError, FrankfurterSource, FredSource, IndicatorFrames,
    JsonClient, MonthlyTable, ProductNames, SeriesCache, SeriesSource,
};
use tradecast_core::domain::MonthRange;

use crate::config::{ConfigError, ExternalConfig, PipelineConfig};
use crate::manifest::{
    ExternalSummary, RunManifest, StageName, StageRecord, StageStatus, TableOutput,
};
use crate::staging::StagedWrites;

/// Errors that halt a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("{stage} stage failed: {source}")]
    Stage {
        stage: StageName,
        #[source]
        source: DataError,
    },
    #[error("could not write run manifest: {0}")]
    Manifest(DataError),
}

fn in_stage(stage: StageName) -> impl FnOnce(DataError) -> PipelineError {
    move |source| PipelineError::Stage { stage, source }
}

/// Per-run switches, separate from the persisted config.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineOptions {
    pub skip_trade: bool,
    pub skip_external: bool,
    pub skip_comtrade: bool,
    pub skip_indicators: bool,
    /// Ignore the external series cache.
    pub force_fetch: bool,
}

impl PipelineOptions {
    pub fn skips(&self, stage: StageName) -> bool {
        match stage {
            StageName::Trade => self.skip_trade,
            StageName::External => self.skip_external,
            StageName::Comtrade => self.skip_comtrade,
            StageName::Indicators => self.skip_indicators,
        }
    }
}

/// Providers queried by the external stage, in join order.
#[derive(Default)]
pub struct ExternalSources {
    sources: Vec<Box<dyn SeriesSource>>,
}

impl ExternalSources {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_source(mut self, source: Box<dyn SeriesSource>) -> Self {
        self.sources.push(source);
        self
    }

    /// Exchange rates always; commodity prices only with a FRED key.
    pub fn from_config(
        config: &ExternalConfig,
        fred_api_key: Option<&str>,
    ) -> Result<Self, DataError> {
        let retry_delay = Duration::from_millis(config.retry_base_ms);
        let client = || -> Result<JsonClient, DataError> {
            Ok(JsonClient::new(Arc::new(CircuitBreaker::for_api()))?
                .with_retries(config.max_retries, retry_delay))
        };

        let mut sources = Self::none().with_source(Box::new(FrankfurterSource::new(
            client()?,
            &config.frankfurter_url,
            &config.base_currency,
        )));
        match fred_api_key.map(str::trim).filter(|k| !k.is_empty()) {
            Some(key) => {
                sources = sources.with_source(Box::new(FredSource::new(
                    client()?,
                    &config.fred_url,
                    key,
                    config.commodities.clone(),
                )));
            }
            None => warn!("no FRED API key configured, skipping commodity prices"),
        }
        Ok(sources)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

/// Run every stage not skipped by `options`, then write the run manifest.
pub fn run_pipeline(
    config: &PipelineConfig,
    options: &PipelineOptions,
    sources: &ExternalSources,
) -> Result<RunManifest, PipelineError> {
    config.validate()?;
    let range = config.month_range()?;
    let mut manifest = RunManifest::start(config.fingerprint()?);
    info!(fingerprint = %manifest.config_fingerprint, "starting pipeline");

    // trade
    let trade = if options.skip_trade {
        let tables = resume_trade(config).map_err(in_stage(StageName::Trade))?;
        manifest.record(skipped(StageName::Trade, &tables));
        tables
    } else {
        let record = run_trade_stage(config).map_err(in_stage(StageName::Trade))?;
        let tables = record.outputs.clone();
        manifest.record(record);
        tables
    };

    // external
    let enriched = if options.skip_external {
        let tables = resume_external(config, &trade);
        manifest.record(skipped(StageName::External, &tables));
        tables
    } else {
        let outcome = run_external_stage(config, &range, options.force_fetch, sources, &trade)
            .map_err(in_stage(StageName::External))?;
        manifest.external = outcome.summaries;
        manifest.record(outcome.record);
        outcome.tables
    };

    // comtrade
    let comtrade = if options.skip_comtrade {
        let tables = resume_comtrade(config).map_err(in_stage(StageName::Comtrade))?;
        manifest.record(skipped(StageName::Comtrade, &tables));
        tables
    } else {
        let record = run_comtrade_stage(config).map_err(in_stage(StageName::Comtrade))?;
        let tables = record.outputs.clone();
        manifest.record(record);
        tables
    };

    // indicators
    if options.skip_indicators {
        manifest.record(skipped(StageName::Indicators, &[]));
    } else {
        let inputs: Vec<TableOutput> = enriched.into_iter().chain(comtrade).collect();
        let record =
            run_indicators_stage(config, &inputs).map_err(in_stage(StageName::Indicators))?;
        manifest.record(record);
    }

    manifest.finish();
    manifest
        .write(&config.manifest_path())
        .map_err(PipelineError::Manifest)?;
    info!(path = %config.manifest_path().display(), "pipeline finished");
    Ok(manifest)
}

fn skipped(stage: StageName, reused: &[TableOutput]) -> StageRecord {
    info!(%stage, reused = reused.len(), "stage skipped");
    StageRecord {
        stage,
        status: StageStatus::Skipped,
        outputs: reused.to_vec(),
        notes: Vec::new(),
    }
}

fn completed(stage: StageName, outputs: Vec<TableOutput>, notes: Vec<String>) -> StageRecord {
    info!(%stage, tables = outputs.len(), notes = notes.len(), "stage completed");
    StageRecord {
        stage,
        status: StageStatus::Completed,
        outputs,
        notes,
    }
}

fn csv_target(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.csv"))
}

// ── Trade ──

/// Aggregate every configured raw trade file to HS4.
pub fn run_trade_stage(config: &PipelineConfig) -> Result<StageRecord, DataError> {
    info!(stage = %StageName::Trade, datasets = config.trade.datasets.len(), "stage started");
    let names = ProductNames::load(&config.hs4_codes_path())?;
    for dataset in &config.trade.datasets {
        require_input(&config.trade_input_path(dataset))?;
    }

    let mut staged = StagedWrites::new();
    let mut outputs = Vec::new();
    let mut notes = Vec::new();
    for dataset in &config.trade.datasets {
        let input = config.trade_input_path(dataset);
        let aggregated =
            aggregate_trade_file(&input, &dataset.reporter, &names, config.trade.min_products)?;
        if aggregated.issues.total() > 0 {
            notes.push(format!(
                "{}: dropped {} unparseable rows",
                dataset.name,
                aggregated.issues.total()
            ));
        }
        let partners = aggregated.partner_count();
        let target = csv_target(&config.aggregated_dir(), &dataset.name);
        let mut frame = aggregated.frame;
        let rows = staged.write_frame(&mut frame, &target)?;
        info!(dataset = %dataset.name, rows, partners, "aggregated trade dataset");
        outputs.push(TableOutput::new(&dataset.name, target, rows));
    }

    staged.commit()?;
    Ok(completed(StageName::Trade, outputs, notes))
}

/// Aggregated tables from an earlier run. All of them must exist.
pub fn resume_trade(config: &PipelineConfig) -> Result<Vec<TableOutput>, DataError> {
    config
        .trade
        .datasets
        .iter()
        .map(|dataset| {
            let path = csv_target(&config.aggregated_dir(), &dataset.name);
            require_input(&path)?;
            Ok(TableOutput::reused(&dataset.name, path))
        })
        .collect()
}

// ── External ──

/// Result of the external stage: the tables handed downstream plus what
/// each provider delivered.
#[derive(Debug, Clone)]
pub struct ExternalOutcome {
    pub record: StageRecord,
    pub tables: Vec<TableOutput>,
    pub summaries: Vec<ExternalSummary>,
}

/// Fetch (or reuse) every external source and lag-join the series onto each
/// trade table.
///
/// A provider that cannot deliver anything is logged and left out. When no
/// provider delivers, the trade tables pass through unchanged.
pub fn run_external_stage(
    config: &PipelineConfig,
    range: &MonthRange,
    force_fetch: bool,
    sources: &ExternalSources,
    trade: &[TableOutput],
) -> Result<ExternalOutcome, DataError> {
    info!(stage = %StageName::External, sources = sources.len(), %range, "stage started");
    let cache = SeriesCache::new(config.external_cache_dir());

    let mut fetched: Vec<MonthlyTable> = Vec::new();
    let mut summaries = Vec::new();
    let mut notes = Vec::new();
    for source in &sources.sources {
        match fetch_monthly(source.as_ref(), &cache, range, force_fetch) {
            Ok(fetch) => {
                notes.extend(
                    fetch
                        .failures
                        .iter()
                        .map(|f| format!("{}: {f}", source.name())),
                );
                summaries.push(ExternalSummary {
                    source: source.name().to_string(),
                    from_cache: fetch.from_cache,
                    series: fetch.table.columns.len(),
                    months: fetch.table.len(),
                    failures: fetch.failures,
                });
                fetched.push(fetch.table);
            }
            Err(e) if e.is_external() => {
                warn!(source = source.name(), error = %e, "external source unavailable");
                notes.push(format!("{}: {e}", source.name()));
            }
            Err(e) => return Err(e),
        }
    }

    if fetched.is_empty() {
        warn!("no external series available, continuing with aggregated tables");
        return Ok(ExternalOutcome {
            record: completed(StageName::External, Vec::new(), notes),
            tables: trade.to_vec(),
            summaries,
        });
    }

    let tables: Vec<&MonthlyTable> = fetched.iter().collect();
    let mut staged = StagedWrites::new();
    let mut outputs = Vec::new();
    for table in trade {
        let merged = merge_external(scan_trade_csv(&table.path)?, &tables)?;
        let mut df = merged.collect()?;
        let target = csv_target(&config.with_external_dir(), &table.name);
        let rows = staged.write_frame(&mut df, &target)?;
        info!(table = %table.name, rows, columns = df.width(), "joined external series");
        outputs.push(TableOutput::new(&table.name, target, rows));
    }
    staged.commit()?;

    Ok(ExternalOutcome {
        record: completed(StageName::External, outputs.clone(), notes),
        tables: outputs,
        summaries,
    })
}

fn modified(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// For each trade table, the enriched table from an earlier run if it is at
/// least as new as the trade table, otherwise the trade table itself.
pub fn resume_external(config: &PipelineConfig, trade: &[TableOutput]) -> Vec<TableOutput> {
    trade
        .iter()
        .map(|table| {
            let enriched = csv_target(&config.with_external_dir(), &table.name);
            match (modified(&enriched), modified(&table.path)) {
                (Some(e), Some(t)) if e >= t => TableOutput::reused(&table.name, enriched),
                _ => table.clone(),
            }
        })
        .collect()
}

// ── Comtrade ──

/// Merge and normalize every configured (country, year, flow) group.
pub fn run_comtrade_stage(config: &PipelineConfig) -> Result<StageRecord, DataError> {
    let dir = config.comtrade_dir();
    info!(stage = %StageName::Comtrade, dir = %dir.display(), "stage started");
    require_input(&dir)?;

    let mut staged = StagedWrites::new();
    let mut outputs = Vec::new();
    let mut notes = Vec::new();
    for country in &config.comtrade.countries {
        for group in discover_groups(&dir, &country.code, &country.years)? {
            let name = group.name();
            let Some(merged) = merge_group(&group) else {
                notes.push(format!("{name}: no usable files"));
                continue;
            };
            if merged.files_skipped > 0 {
                notes.push(format!("{name}: skipped {} file(s)", merged.files_skipped));
            }

            let merged_tmp = staged.stage(&csv_target(&config.comtrade_merged_dir(), &name))?;
            merged.write_csv(&merged_tmp)?;

            let mut df = normalize_file(
                &merged_tmp,
                &group.country,
                group.flow,
                config.trade.min_products,
            )?;
            let target = csv_target(&config.comtrade_final_dir(), &name);
            let rows = staged.write_frame(&mut df, &target)?;
            info!(
                group = %name,
                files = merged.files_used,
                merged_rows = merged.rows.len(),
                rows,
                "normalized comtrade group"
            );
            outputs.push(TableOutput::new(name, target, rows));
        }
    }

    staged.commit()?;
    Ok(completed(StageName::Comtrade, outputs, notes))
}

/// Normalized comtrade tables left by an earlier run, if any.
pub fn resume_comtrade(config: &PipelineConfig) -> Result<Vec<TableOutput>, DataError> {
    let dir = config.comtrade_final_dir();
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut tables = Vec::new();
    for entry in fs::read_dir(&dir).map_err(|e| DataError::io(&dir, e))? {
        let path = entry.map_err(|e| DataError::io(&dir, e))?.path();
        if path.extension().is_some_and(|ext| ext == "csv") {
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                tables.push(TableOutput::reused(stem, path.clone()));
            }
        }
    }
    tables.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(tables)
}

// ── Indicators ──

/// Join macro indicators and REER onto every table.
pub fn run_indicators_stage(
    config: &PipelineConfig,
    tables: &[TableOutput],
) -> Result<StageRecord, DataError> {
    info!(stage = %StageName::Indicators, tables = tables.len(), "stage started");
    let frames = IndicatorFrames::load(
        &config.indicators_path(),
        &config.reer_path(),
        &config.indicators.filter,
    )?;

    let mut staged = StagedWrites::new();
    let mut outputs = Vec::new();
    for table in tables {
        let mut df = frames.merge(scan_trade_csv(&table.path)?).collect()?;
        let target = csv_target(&config.model_ready_dir(), &table.name);
        let rows = staged.write_frame(&mut df, &target)?;
        outputs.push(TableOutput::new(&table.name, target, rows));
    }

    staged.commit()?;
    Ok(completed(StageName::Indicators, outputs, Vec::new()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_map_to_stages() {
        let options = PipelineOptions {
            skip_external: true,
            skip_indicators: true,
            ..Default::default()
        };
        let skipped: Vec<_> = StageName::ALL
            .into_iter()
            .filter(|s| options.skips(*s))
            .collect();
        assert_eq!(skipped, vec![StageName::External, StageName::Indicators]);
    }

    #[test]
    fn missing_fred_key_skips_commodities() {
        let config = ExternalConfig::default();
        assert_eq!(ExternalSources::from_config(&config, None).unwrap().len(), 1);
        assert_eq!(ExternalSources::from_config(&config, Some("  ")).unwrap().len(), 1);
        assert_eq!(ExternalSources::from_config(&config, Some("key")).unwrap().len(), 2);
    }

    #[test]
    fn resume_external_prefers_newer_enriched_table() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig::default().rooted_at(dir.path());

        let trade_path = csv_target(&config.aggregated_dir(), "USA_2023");
        fs::create_dir_all(trade_path.parent().unwrap()).unwrap();
        fs::write(&trade_path, "period\n").unwrap();
        let trade = vec![TableOutput::reused("USA_2023", trade_path.clone())];

        // nothing enriched yet
        assert_eq!(resume_external(&config, &trade)[0].path, trade_path);

        let enriched = csv_target(&config.with_external_dir(), "USA_2023");
        fs::create_dir_all(enriched.parent().unwrap()).unwrap();
        fs::write(&enriched, "period\n").unwrap();
        assert_eq!(resume_external(&config, &trade)[0].path, enriched);

        // trade table rewritten after the enriched one
        let later = SystemTime::now() + Duration::from_secs(60);
        fs::File::options()
            .write(true)
            .open(&trade_path)
            .unwrap()
            .set_modified(later)
            .unwrap();
        assert_eq!(resume_external(&config, &trade)[0].path, trade_path);
    }

    #[test]
    fn resume_trade_requires_prior_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig::default().rooted_at(dir.path());
        let err = resume_trade(&config).unwrap_err();
        assert!(matches!(err, DataError::InputMissing(_)));
    }

    #[test]
    fn resume_comtrade_without_outputs_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig::default().rooted_at(dir.path());
        assert!(resume_comtrade(&config).unwrap().is_empty());
    }
}
