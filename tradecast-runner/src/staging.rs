//! All-or-nothing stage outputs.
//!
//! A stage writes every output to a sibling `.tmp` file first. `commit`
//! renames them into place once the whole stage has succeeded; dropping an
//! uncommitted set removes the temp files, so a failed stage leaves the
//! previous run's outputs untouched.

use polars::prelude::DataFrame;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use tradecast_core::data::frame::write_csv;
use tradecast_core::data::DataError;

#[derive(Debug, Default)]
pub struct StagedWrites {
    pending: Vec<(PathBuf, PathBuf)>,
}

impl StagedWrites {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve a temp path for `target`, creating its directory.
    pub fn stage(&mut self, target: &Path) -> Result<PathBuf, DataError> {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| DataError::io(parent, e))?;
        }
        let mut name = target
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        let tmp = target.with_file_name(name);
        self.pending.push((tmp.clone(), target.to_path_buf()));
        Ok(tmp)
    }

    /// Stage `df` as a CSV destined for `target`. Returns the row count.
    pub fn write_frame(&mut self, df: &mut DataFrame, target: &Path) -> Result<usize, DataError> {
        let tmp = self.stage(target)?;
        write_csv(df, &tmp)?;
        Ok(df.height())
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Move every staged file into place.
    pub fn commit(mut self) -> Result<Vec<PathBuf>, DataError> {
        let pending = std::mem::take(&mut self.pending);
        let mut committed = Vec::with_capacity(pending.len());
        for (i, (tmp, target)) in pending.iter().enumerate() {
            if let Err(e) = fs::rename(tmp, target) {
                // put the rest back so Drop cleans them up
                self.pending = pending[i..].to_vec();
                return Err(DataError::io(target, e));
            }
            debug!(path = %target.display(), "committed stage output");
            committed.push(target.clone());
        }
        Ok(committed)
    }
}

impl Drop for StagedWrites {
    fn drop(&mut self) {
        for (tmp, _) in &self.pending {
            if tmp.exists() {
                if let Err(e) = fs::remove_file(tmp) {
                    warn!(path = %tmp.display(), error = %e, "could not remove staged file");
                }
            }
        }
    }
}
