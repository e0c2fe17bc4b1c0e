//! Run manifest: what each stage did and which tables it produced.

use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tradecast_core::data::DataError;

/// Current schema version for persisted manifests.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    Trade,
    External,
    Comtrade,
    Indicators,
}

impl StageName {
    pub const ALL: [StageName; 4] = [
        StageName::Trade,
        StageName::External,
        StageName::Comtrade,
        StageName::Indicators,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StageName::Trade => "trade",
            StageName::External => "external",
            StageName::Comtrade => "comtrade",
            StageName::Indicators => "indicators",
        }
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Completed,
    Skipped,
}

impl StageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageStatus::Completed => "completed",
            StageStatus::Skipped => "skipped",
        }
    }
}

/// A materialized table handed from one stage to the next.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableOutput {
    pub name: String,
    pub path: PathBuf,
    /// Unknown for tables reused from an earlier run.
    pub rows: Option<usize>,
}

impl TableOutput {
    pub fn new(name: impl Into<String>, path: PathBuf, rows: usize) -> Self {
        Self {
            name: name.into(),
            path,
            rows: Some(rows),
        }
    }

    pub fn reused(name: impl Into<String>, path: PathBuf) -> Self {
        Self {
            name: name.into(),
            path,
            rows: None,
        }
    }
}

/// Per-provider outcome of the external stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalSummary {
    pub source: String,
    pub from_cache: bool,
    pub series: usize,
    pub months: usize,
    #[serde(default)]
    pub failures: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: StageName,
    pub status: StageStatus,
    pub outputs: Vec<TableOutput>,
    /// Recovered problems worth a look (skipped files, failed series).
    #[serde(default)]
    pub notes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub config_fingerprint: String,
    pub started_at: NaiveDateTime,
    pub finished_at: Option<NaiveDateTime>,
    pub stages: Vec<StageRecord>,
    #[serde(default)]
    pub external: Vec<ExternalSummary>,
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

impl RunManifest {
    pub fn start(config_fingerprint: String) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            config_fingerprint,
            started_at: Local::now().naive_local(),
            finished_at: None,
            stages: Vec::new(),
            external: Vec::new(),
        }
    }

    pub fn record(&mut self, record: StageRecord) {
        self.stages.push(record);
    }

    pub fn stage(&self, stage: StageName) -> Option<&StageRecord> {
        self.stages.iter().find(|r| r.stage == stage)
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Local::now().naive_local());
    }

    /// Write as pretty JSON via a temp file and rename.
    pub fn write(&self, path: &Path) -> Result<(), DataError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| DataError::io(parent, e))?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| DataError::CacheError(format!("manifest serialization: {e}")))?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|e| DataError::io(&tmp, e))?;
        fs::rename(&tmp, path).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            DataError::io(path, e)
        })
    }

    pub fn read(path: &Path) -> Result<Self, DataError> {
        let content = fs::read_to_string(path).map_err(|e| DataError::io(path, e))?;
        serde_json::from_str(&content)
            .map_err(|e| DataError::CacheError(format!("manifest {}: {e}", path.display())))
    }
}
