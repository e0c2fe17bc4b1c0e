//! Pipeline configuration, loaded from TOML.
//!
//! Every section is optional; missing sections and fields fall back to the
//! defaults below, so an empty file describes the standard competition
//! layout.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tradecast_core::data::{default_commodity_series, FredSeries, IndicatorFilter};
use tradecast_core::domain::MonthRange;
use tradecast_core::submission::SubmissionRules;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Directory layout. Relative paths resolve against the working directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub raw: PathBuf,
    pub reference: PathBuf,
    pub interim: PathBuf,
    pub processed: PathBuf,
    pub evaluation: PathBuf,
    pub forecasts: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            raw: "inputs/raw".into(),
            reference: "inputs/reference".into(),
            interim: "outputs/interim".into(),
            processed: "outputs/processed".into(),
            evaluation: "outputs/evaluation".into(),
            forecasts: "outputs/forecasts".into(),
        }
    }
}

/// One raw trade export and the country that reported it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeDataset {
    /// Output table name, e.g. `USA_2023`.
    pub name: String,
    pub reporter: String,
    /// File name under `{raw}/{input_subdir}`.
    pub file: String,
}

impl TradeDataset {
    fn new(name: &str, reporter: &str, file: &str) -> Self {
        Self {
            name: name.into(),
            reporter: reporter.into(),
            file: file.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TradeConfig {
    pub input_subdir: String,
    /// HS4 code list under the reference directory.
    pub hs4_codes_file: String,
    /// A (reporter, period, partner) group is kept only above this many
    /// distinct products.
    pub min_products: u32,
    pub datasets: Vec<TradeDataset>,
}

impl Default for TradeConfig {
    fn default() -> Self {
        Self {
            input_subdir: "ForParticipants".into(),
            hs4_codes_file: "code_hs4.csv".into(),
            min_products: tradecast_core::data::DEFAULT_MIN_PRODUCTS,
            datasets: vec![
                TradeDataset::new("USA_2023", "USA", "trade_s_usa_state_m_hs_2023.csv"),
                TradeDataset::new("USA_2024", "USA", "trade_s_usa_state_m_hs_2024.csv"),
                TradeDataset::new("china_2023", "CHN", "trade_s_chn_m_hs_2023.csv"),
                TradeDataset::new("china_2024", "CHN", "trade_s_chn_m_hs_2024.csv"),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExternalConfig {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub base_currency: String,
    pub frankfurter_url: String,
    pub fred_url: String,
    pub commodities: Vec<FredSeries>,
    pub max_retries: u32,
    pub retry_base_ms: u64,
}

impl Default for ExternalConfig {
    fn default() -> Self {
        Self {
            start_date: NaiveDate::from_ymd_opt(2022, 12, 31).unwrap_or_default(),
            end_date: NaiveDate::from_ymd_opt(2024, 11, 30).unwrap_or_default(),
            base_currency: "USD".into(),
            frankfurter_url: tradecast_core::data::frankfurter::DEFAULT_BASE_URL.into(),
            fred_url: tradecast_core::data::fred::DEFAULT_BASE_URL.into(),
            commodities: default_commodity_series(),
            max_retries: 3,
            retry_base_ms: 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComtradeCountry {
    pub code: String,
    pub years: Vec<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComtradeConfig {
    pub input_subdir: String,
    pub countries: Vec<ComtradeCountry>,
}

impl Default for ComtradeConfig {
    fn default() -> Self {
        Self {
            input_subdir: "comtrade_monthly_hs4_outputs".into(),
            countries: vec![
                ComtradeCountry {
                    code: "USA".into(),
                    years: vec![2021, 2022, 2025],
                },
                ComtradeCountry {
                    code: "CHN".into(),
                    years: vec![2021, 2022],
                },
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorsConfig {
    /// Long-format macro indicators, under the reference directory.
    pub indicators_file: String,
    /// Wide-format REER table, under the reference directory.
    pub reer_file: String,
    pub filter: IndicatorFilter,
}

impl Default for IndicatorsConfig {
    fn default() -> Self {
        Self {
            indicators_file: "df_long.csv".into(),
            reer_file: "EER_COUNTRIES.csv".into(),
            filter: IndicatorFilter::default(),
        }
    }
}

/// Complete, immutable description of a pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub paths: PathsConfig,
    pub trade: TradeConfig,
    pub external: ExternalConfig,
    pub comtrade: ComtradeConfig,
    pub indicators: IndicatorsConfig,
    pub submission: SubmissionRules,
}

impl PipelineConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate a config from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))
    }

    /// Rebase every relative directory onto `root`.
    pub fn rooted_at(mut self, root: &Path) -> Self {
        let rebase = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = root.join(&*p);
            }
        };
        let paths = &mut self.paths;
        for p in [
            &mut paths.raw,
            &mut paths.reference,
            &mut paths.interim,
            &mut paths.processed,
            &mut paths.evaluation,
            &mut paths.forecasts,
        ] {
            rebase(p);
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.month_range()?;
        if self.trade.min_products == 0 {
            return Err(ConfigError::Invalid(
                "trade.min_products must be greater than zero".into(),
            ));
        }

        let mut seen = HashSet::new();
        for dataset in &self.trade.datasets {
            if dataset.name.trim().is_empty() || dataset.reporter.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "trade dataset '{}' needs a name and a reporter",
                    dataset.name
                )));
            }
            if !seen.insert(dataset.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate trade dataset name '{}'",
                    dataset.name
                )));
            }
        }

        let mut series = HashSet::new();
        for s in &self.external.commodities {
            if !series.insert(s.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate commodity series '{}'",
                    s.name
                )));
            }
        }

        if self.comtrade.countries.iter().any(|c| c.code.trim().is_empty()) {
            return Err(ConfigError::Invalid("comtrade country code is empty".into()));
        }
        Ok(())
    }

    /// Months covered by the external date range.
    pub fn month_range(&self) -> Result<MonthRange, ConfigError> {
        MonthRange::from_dates(self.external.start_date, self.external.end_date)
            .map_err(|e| ConfigError::Invalid(format!("external date range: {e}")))
    }

    /// BLAKE3 hash of the serialized config. Two runs with identical
    /// configs share a fingerprint.
    pub fn fingerprint(&self) -> Result<String, ConfigError> {
        let json = serde_json::to_string(self).map_err(|e| ConfigError::Serialize(e.to_string()))?;
        Ok(blake3::hash(json.as_bytes()).to_hex().to_string())
    }

    // ── Input locations ──

    pub fn trade_input_path(&self, dataset: &TradeDataset) -> PathBuf {
        self.paths
            .raw
            .join(&self.trade.input_subdir)
            .join(&dataset.file)
    }

    pub fn hs4_codes_path(&self) -> PathBuf {
        self.paths.reference.join(&self.trade.hs4_codes_file)
    }

    pub fn comtrade_dir(&self) -> PathBuf {
        self.paths.raw.join(&self.comtrade.input_subdir)
    }

    pub fn indicators_path(&self) -> PathBuf {
        self.paths.reference.join(&self.indicators.indicators_file)
    }

    pub fn reer_path(&self) -> PathBuf {
        self.paths.reference.join(&self.indicators.reer_file)
    }

    // ── Output locations ──

    pub fn aggregated_dir(&self) -> PathBuf {
        self.paths.processed.join("aggregated")
    }

    pub fn external_cache_dir(&self) -> PathBuf {
        self.paths.interim.join("external")
    }

    pub fn with_external_dir(&self) -> PathBuf {
        self.paths.processed.join("with_external")
    }

    pub fn comtrade_merged_dir(&self) -> PathBuf {
        self.paths.interim.join("comtrade_merged")
    }

    pub fn comtrade_final_dir(&self) -> PathBuf {
        self.paths.processed.join("comtrade_final")
    }

    pub fn model_ready_dir(&self) -> PathBuf {
        self.paths.processed.join("model_ready")
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.paths.processed.join("run_manifest.json")
    }
}
