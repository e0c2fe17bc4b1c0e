//! Structured error types for the data stages.
//!
//! Stage-fatal conditions (missing inputs, ambiguous reshapes, schema
//! mismatches) and transport failures share one enum so the orchestrator can
//! report them uniformly. Per-series and per-file failures that are recovered
//! locally never surface as a `DataError`; they are logged and recorded in the
//! stage's summary instead.

use polars::prelude::PolarsError;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DataError {
    #[error("required input missing: {}", .0.display())]
    InputMissing(PathBuf),

    #[error("could not decode {} with any of: {tried}", .path.display())]
    EncodingFailure { path: PathBuf, tried: String },

    #[error("schema mismatch in {context}: {detail}")]
    SchemaMismatch { context: String, detail: String },

    #[error("no series could be fetched from {provider}: {detail}")]
    ExternalFetchFailure { provider: String, detail: String },

    #[error("ambiguous pivot in {table}: {duplicates} duplicate key(s), e.g. {example}")]
    AmbiguousPivot {
        table: String,
        duplicates: usize,
        example: String,
    },

    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("HTTP {status} from {endpoint}")]
    HttpStatus { status: u16, endpoint: String },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("hard stop: data provider has blocked requests (circuit breaker tripped)")]
    CircuitBreakerTripped,

    #[error("cache error: {0}")]
    CacheError(String),

    #[error("dataframe error: {0}")]
    Frame(#[from] PolarsError),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl DataError {
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        DataError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn schema(context: impl Into<String>, detail: impl Into<String>) -> Self {
        DataError::SchemaMismatch {
            context: context.into(),
            detail: detail.into(),
        }
    }

    /// True when a remote provider failed, as opposed to local inputs,
    /// files or frames.
    pub fn is_external(&self) -> bool {
        matches!(
            self,
            DataError::ExternalFetchFailure { .. }
                | DataError::NetworkUnreachable(_)
                | DataError::RateLimited { .. }
                | DataError::HttpStatus { .. }
                | DataError::ResponseFormatChanged(_)
                | DataError::CircuitBreakerTripped
        )
    }
}

/// Fail with `InputMissing` unless `path` exists.
pub fn require_input(path: &Path) -> Result<(), DataError> {
    if path.exists() {
        Ok(())
    } else {
        Err(DataError::InputMissing(path.to_path_buf()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_input_reports_path() {
        let missing = Path::new("/definitely/not/here.csv");
        let err = require_input(missing).unwrap_err();
        assert!(matches!(err, DataError::InputMissing(ref p) if p == missing));
        assert!(err.to_string().contains("here.csv"));
    }

    #[test]
    fn provider_failures_are_external() {
        assert!(DataError::CircuitBreakerTripped.is_external());
        assert!(DataError::HttpStatus {
            status: 503,
            endpoint: "fred".into()
        }
        .is_external());
        assert!(!DataError::InputMissing("x.csv".into()).is_external());
        assert!(!DataError::CacheError("bad".into()).is_external());
    }
}
