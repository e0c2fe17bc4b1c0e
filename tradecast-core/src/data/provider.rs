//! External series source trait.
//!
//! A `SeriesSource` abstracts over remote providers (currency rates,
//! commodity prices) so the fetch stage can be driven by mocks in tests.
//! The cache layer sits above this trait; sources don't know about the cache.

use super::align::MonthlySeries;
use super::error::DataError;
use crate::domain::MonthRange;
use std::collections::BTreeMap;

/// A series (or request unit) that could not be fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesFailure {
    pub series: String,
    pub reason: String,
}

/// Result of one source fetch: every series that came back, plus what failed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceFetch {
    pub series: BTreeMap<String, MonthlySeries>,
    pub failures: Vec<SeriesFailure>,
}

impl SourceFetch {
    pub fn record_failure(&mut self, series: impl Into<String>, error: &DataError) {
        self.failures.push(SeriesFailure {
            series: series.into(),
            reason: error.to_string(),
        });
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

pub trait SeriesSource: Send + Sync {
    /// Stable name, also used as the cache file stem.
    fn name(&self) -> &str;

    /// Fingerprint of what this source is configured to return (base
    /// currency, series codes). A cache written under a different key is
    /// not reused.
    fn series_key(&self) -> String;

    /// Fetch every configured series over `range`. Individual series
    /// failures are reported in [`SourceFetch::failures`]; an `Err` means the
    /// source could not be used at all.
    fn fetch(&self, range: &MonthRange) -> Result<SourceFetch, DataError>;

    /// False while the source is blocked (circuit breaker open).
    fn is_available(&self) -> bool;
}
