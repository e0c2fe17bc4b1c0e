//! Cache-aware fetching of external monthly series and the lag join onto
//! trade rows.

use super::align::{align_series, MonthlyTable};
use super::cache::{Coverage, SeriesCache};
use super::error::DataError;
use super::provider::SeriesSource;
use super::schema::PERIOD;
use crate::domain::MonthRange;
use polars::prelude::*;
use tracing::{info, warn};

/// Outcome of [`fetch_monthly`].
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalFetch {
    pub table: MonthlyTable,
    pub from_cache: bool,
    /// `"{series}: {reason}"` for every unit that failed on this fetch.
    pub failures: Vec<String>,
}

/// Monthly series from `source` over `range`.
///
/// A complete cache entry covering `range` is reused unless `force` is set.
/// Otherwise the source is queried, the result is restricted to `range`,
/// cached, and returned. Series that fail are left out and listed in
/// `failures`; only a fetch where nothing at all came back is an error.
pub fn fetch_monthly(
    source: &dyn SeriesSource,
    cache: &SeriesCache,
    range: &MonthRange,
    force: bool,
) -> Result<ExternalFetch, DataError> {
    let name = source.name();
    let key = source.series_key();

    if !force {
        match cache.coverage(name, &key, range) {
            Coverage::Covered(meta) => match cache.load(name) {
                Ok(table) => {
                    info!(source = name, cached_at = %meta.cached_at, "using cached series");
                    return Ok(ExternalFetch {
                        table: table.restrict(range),
                        from_cache: true,
                        failures: Vec::new(),
                    });
                }
                Err(e) => warn!(source = name, error = %e, "cached series unreadable, refetching"),
            },
            Coverage::Stale { reason } => info!(source = name, %reason, "cache stale, refetching"),
            Coverage::Missing => {}
        }
    }

    if !source.is_available() {
        warn!(source = name, "source blocked by circuit breaker");
        return Err(DataError::CircuitBreakerTripped);
    }

    let fetched = source.fetch(range)?;
    if !fetched.is_complete() {
        warn!(
            source = name,
            failed = fetched.failures.len(),
            "some series could not be fetched"
        );
    }
    let failures: Vec<String> = fetched
        .failures
        .iter()
        .map(|f| format!("{}: {}", f.series, f.reason))
        .collect();

    if fetched.series.is_empty() {
        let detail = if failures.is_empty() {
            "source returned no series".to_string()
        } else {
            failures.join("; ")
        };
        return Err(DataError::ExternalFetchFailure {
            provider: name.to_string(),
            detail,
        });
    }

    let table = align_series(&fetched.series).restrict(range);
    if let Err(e) = cache.write(name, &key, *range, &table, &failures) {
        warn!(source = name, error = %e, "could not cache fetched series");
    }

    info!(
        source = name,
        series = table.columns.len(),
        months = table.len(),
        failed = failures.len(),
        "fetched external series"
    );
    Ok(ExternalFetch {
        table,
        from_cache: false,
        failures,
    })
}

/// Left-join each table onto `trade` so a row of month `P` carries the
/// series values observed in month `P - 1`. Months without an observation
/// stay null; the row count of `trade` is unchanged.
pub fn merge_external(trade: LazyFrame, tables: &[&MonthlyTable]) -> Result<LazyFrame, DataError> {
    let mut merged = trade;
    for table in tables {
        let right = table.join_frame()?.lazy();
        merged = merged.join(
            right,
            [col(PERIOD)],
            [col(PERIOD)],
            JoinArgs::new(JoinType::Left),
        );
    }
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::align::MonthlySeries;
    use crate::data::provider::SourceFetch;
    use crate::domain::Period;
    use std::collections::BTreeMap;

    struct Empty;

    impl SeriesSource for Empty {
        fn name(&self) -> &str {
            "empty"
        }
        fn series_key(&self) -> String {
            "empty".into()
        }
        fn fetch(&self, _range: &MonthRange) -> Result<SourceFetch, DataError> {
            Ok(SourceFetch::default())
        }
        fn is_available(&self) -> bool {
            true
        }
    }

    fn p(y: i32, m: u32) -> Period {
        Period::new(y, m).unwrap()
    }

    #[test]
    fn nothing_fetched_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SeriesCache::new(dir.path());
        let range = MonthRange::new(p(2024, 1), p(2024, 2)).unwrap();
        let err = fetch_monthly(&Empty, &cache, &range, false).unwrap_err();
        assert!(matches!(err, DataError::ExternalFetchFailure { ref provider, .. } if provider == "empty"));
        assert!(!cache.data_path("empty").exists());
    }

    #[test]
    fn merge_shifts_by_one_month() {
        let series: MonthlySeries = [(p(2024, 2), 1.5)].into_iter().collect();
        let table = align_series(&BTreeMap::from([("EUR".to_string(), series)]));

        let trade = df!(PERIOD => [p(2024, 2).month_id(), p(2024, 3).month_id()])
            .unwrap()
            .lazy();
        let out = merge_external(trade, &[&table]).unwrap().collect().unwrap();

        let eur: Vec<Option<f64>> = out.column("EUR").unwrap().f64().unwrap().into_iter().collect();
        assert_eq!(eur, vec![None, Some(1.5)]);
    }
}
