//! Parquet cache for fetched external series.
//!
//! Layout: `{cache_dir}/{source}.parquet` plus `{cache_dir}/{source}.meta.json`.
//!
//! - Atomic writes (write to .tmp, rename into place)
//! - Coverage check against the requested month range and source config
//! - Hash check on load; a file that fails it is quarantined
//!   (`{source}.parquet.quarantined`) and reported as a cache error

use super::align::MonthlyTable;
use super::error::DataError;
use crate::domain::MonthRange;
use chrono::NaiveDateTime;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Metadata sidecar for one cached source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesCacheMeta {
    pub source: String,
    pub series_key: String,
    pub range: MonthRange,
    pub series: Vec<String>,
    pub row_count: usize,
    /// False when some series or months failed to fetch.
    pub complete: bool,
    #[serde(default)]
    pub failures: Vec<String>,
    pub data_hash: String,
    pub cached_at: NaiveDateTime,
}

/// How well the cache serves a request.
#[derive(Debug, Clone, PartialEq)]
pub enum Coverage {
    Missing,
    Covered(SeriesCacheMeta),
    /// Present but not reusable.
    Stale { reason: String },
}

pub struct SeriesCache {
    cache_dir: PathBuf,
}

impl SeriesCache {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn data_path(&self, source: &str) -> PathBuf {
        self.cache_dir.join(format!("{source}.parquet"))
    }

    pub fn meta_path(&self, source: &str) -> PathBuf {
        self.cache_dir.join(format!("{source}.meta.json"))
    }

    /// Store `table` for `source`, replacing any previous entry.
    pub fn write(
        &self,
        source: &str,
        series_key: &str,
        range: MonthRange,
        table: &MonthlyTable,
        failures: &[String],
    ) -> Result<SeriesCacheMeta, DataError> {
        fs::create_dir_all(&self.cache_dir)
            .map_err(|e| DataError::CacheError(format!("failed to create dir: {e}")))?;

        let mut df = table.to_frame()?;
        let path = self.data_path(source);
        let tmp_path = path.with_extension("parquet.tmp");
        write_parquet(&mut df, &tmp_path)?;
        fs::rename(&tmp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            DataError::CacheError(format!("atomic rename failed: {e}"))
        })?;

        let meta = SeriesCacheMeta {
            source: source.to_string(),
            series_key: series_key.to_string(),
            range,
            series: table.series_names().into_iter().map(String::from).collect(),
            row_count: table.len(),
            complete: failures.is_empty(),
            failures: failures.to_vec(),
            data_hash: table_hash(table)?,
            cached_at: chrono::Local::now().naive_local(),
        };
        let meta_json = serde_json::to_string_pretty(&meta)
            .map_err(|e| DataError::CacheError(format!("meta serialization: {e}")))?;
        let meta_path = self.meta_path(source);
        let meta_tmp = meta_path.with_extension("json.tmp");
        fs::write(&meta_tmp, meta_json)
            .map_err(|e| DataError::CacheError(format!("meta write: {e}")))?;
        fs::rename(&meta_tmp, &meta_path).map_err(|e| {
            let _ = fs::remove_file(&meta_tmp);
            DataError::CacheError(format!("atomic rename failed: {e}"))
        })?;

        Ok(meta)
    }

    pub fn get_meta(&self, source: &str) -> Option<SeriesCacheMeta> {
        let content = fs::read_to_string(self.meta_path(source)).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Whether the entry for `source` can answer a request for `range` made
    /// with the given `series_key`.
    pub fn coverage(&self, source: &str, series_key: &str, range: &MonthRange) -> Coverage {
        let Some(meta) = self.get_meta(source) else {
            return Coverage::Missing;
        };
        if !self.data_path(source).exists() {
            return Coverage::Missing;
        }
        if meta.series_key != series_key {
            return Coverage::Stale {
                reason: "source configuration changed".into(),
            };
        }
        if !meta.range.covers(range) {
            return Coverage::Stale {
                reason: format!("cached {} does not cover {range}", meta.range),
            };
        }
        if !meta.complete {
            return Coverage::Stale {
                reason: format!("previous fetch incomplete ({} failures)", meta.failures.len()),
            };
        }
        Coverage::Covered(meta)
    }

    /// Load the cached table for `source`, verifying it against its sidecar.
    pub fn load(&self, source: &str) -> Result<MonthlyTable, DataError> {
        let meta = self
            .get_meta(source)
            .ok_or_else(|| DataError::CacheError(format!("no cache metadata for {source}")))?;
        let path = self.data_path(source);

        let table = read_parquet(&path).and_then(|df| MonthlyTable::from_frame(&df));
        let verified = table.and_then(|table| {
            let hash = table_hash(&table)?;
            if hash == meta.data_hash {
                Ok(table)
            } else {
                Err(DataError::CacheError(format!(
                    "hash mismatch for {source} (expected {}, found {hash})",
                    meta.data_hash
                )))
            }
        });

        verified.inspect_err(|e| {
            let quarantine = path.with_extension("parquet.quarantined");
            warn!(path = %path.display(), error = %e, "quarantining corrupt cache file");
            let _ = fs::rename(&path, &quarantine);
        })
    }
}

fn table_hash(table: &MonthlyTable) -> Result<String, DataError> {
    let bytes = serde_json::to_vec(table)
        .map_err(|e| DataError::CacheError(format!("hash serialization: {e}")))?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}

fn write_parquet(df: &mut DataFrame, path: &Path) -> Result<(), DataError> {
    let file = fs::File::create(path).map_err(|e| DataError::io(path, e))?;
    ParquetWriter::new(file)
        .finish(df)
        .map_err(|e| DataError::CacheError(format!("write parquet: {e}")))?;
    Ok(())
}

fn read_parquet(path: &Path) -> Result<DataFrame, DataError> {
    let file = fs::File::open(path).map_err(|e| DataError::io(path, e))?;
    ParquetReader::new(file)
        .finish()
        .map_err(|e| DataError::CacheError(format!("read parquet: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::align::{align_series, MonthlySeries};
    use crate::domain::Period;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn p(y: i32, m: u32) -> Period {
        Period::new(y, m).unwrap()
    }

    fn range(a: Period, b: Period) -> MonthRange {
        MonthRange::new(a, b).unwrap()
    }

    fn sample_table() -> MonthlyTable {
        let mut series = BTreeMap::new();
        let eur: MonthlySeries = [(p(2024, 1), 0.92), (p(2024, 2), 0.93)].into_iter().collect();
        let jpy: MonthlySeries = [(p(2024, 2), 149.5)].into_iter().collect();
        series.insert("EUR".to_string(), eur);
        series.insert("JPY".to_string(), jpy);
        align_series(&series)
    }

    #[test]
    fn write_and_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let cache = SeriesCache::new(dir.path());
        let table = sample_table();

        let meta = cache
            .write("exchange_rates", "k", range(p(2024, 1), p(2024, 2)), &table, &[])
            .unwrap();
        assert!(meta.complete);
        assert_eq!(meta.row_count, 2);

        let loaded = cache.load("exchange_rates").unwrap();
        assert_eq!(loaded, table);
        assert_eq!(loaded.value("JPY", p(2024, 1)), None);
    }

    #[test]
    fn coverage_rules() {
        let dir = TempDir::new().unwrap();
        let cache = SeriesCache::new(dir.path());
        let cached = range(p(2024, 1), p(2024, 6));

        assert_eq!(cache.coverage("fx", "k", &cached), Coverage::Missing);

        cache.write("fx", "k", cached, &sample_table(), &[]).unwrap();
        assert!(matches!(
            cache.coverage("fx", "k", &range(p(2024, 2), p(2024, 3))),
            Coverage::Covered(_)
        ));
        assert!(matches!(
            cache.coverage("fx", "k", &range(p(2024, 2), p(2024, 8))),
            Coverage::Stale { .. }
        ));
        assert!(matches!(
            cache.coverage("fx", "other", &cached),
            Coverage::Stale { .. }
        ));
    }

    #[test]
    fn incomplete_entry_is_stale() {
        let dir = TempDir::new().unwrap();
        let cache = SeriesCache::new(dir.path());
        let r = range(p(2024, 1), p(2024, 2));

        let meta = cache
            .write("fx", "k", r, &sample_table(), &["2024-03".to_string()])
            .unwrap();
        assert!(!meta.complete);
        assert!(matches!(cache.coverage("fx", "k", &r), Coverage::Stale { .. }));
    }

    #[test]
    fn tampered_hash_quarantines_file() {
        let dir = TempDir::new().unwrap();
        let cache = SeriesCache::new(dir.path());
        cache
            .write("fx", "k", range(p(2024, 1), p(2024, 2)), &sample_table(), &[])
            .unwrap();

        let mut meta = cache.get_meta("fx").unwrap();
        meta.data_hash = "0".repeat(64);
        fs::write(cache.meta_path("fx"), serde_json::to_string(&meta).unwrap()).unwrap();

        assert!(matches!(cache.load("fx"), Err(DataError::CacheError(_))));
        assert!(!cache.data_path("fx").exists());
        assert!(dir.path().join("fx.parquet.quarantined").exists());
    }
}
