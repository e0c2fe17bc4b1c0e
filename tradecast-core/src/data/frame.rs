//! CSV materialization of stage tables.

use super::error::DataError;
use super::schema::TradeSchema;
use polars::prelude::*;
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Write `df` as a headed CSV, creating parent directories.
pub fn write_csv(df: &mut DataFrame, path: &Path) -> Result<(), DataError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| DataError::io(parent, e))?;
    }
    let mut file = fs::File::create(path).map_err(|e| DataError::io(path, e))?;
    CsvWriter::new(&mut file).include_header(true).finish(df)?;
    Ok(())
}

/// Lazily scan a materialized trade table. Canonical columns are read with
/// their canonical dtypes; any extra columns are inferred.
pub fn scan_trade_csv(path: &Path) -> Result<LazyFrame, DataError> {
    if !path.exists() {
        return Err(DataError::InputMissing(path.to_path_buf()));
    }
    let lf = LazyCsvReader::new(path)
        .with_has_header(true)
        .with_dtype_overwrite(Some(Arc::new(TradeSchema::schema())))
        .finish()?;
    Ok(lf)
}

pub fn read_trade_csv(path: &Path) -> Result<DataFrame, DataError> {
    Ok(scan_trade_csv(path)?.collect()?)
}
