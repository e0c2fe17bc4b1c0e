//! Commodity prices from FRED (Federal Reserve Economic Data).
//!
//! One request per configured series over the whole range. Daily series are
//! reduced to the last observation of each month; monthly series pass
//! through unchanged. FRED marks missing observations with `"."`.

use super::align::resample_month_end;
use super::error::DataError;
use super::http::JsonClient;
use super::provider::{SeriesSource, SourceFetch};
use crate::domain::MonthRange;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub const DEFAULT_BASE_URL: &str = "https://api.stlouisfed.org/fred/series/observations";

/// A named FRED series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FredSeries {
    /// Output column name.
    pub name: String,
    /// FRED series id.
    pub code: String,
}

impl FredSeries {
    pub fn new(name: &str, code: &str) -> Self {
        Self {
            name: name.to_string(),
            code: code.to_string(),
        }
    }
}

/// Energy, metal and agricultural benchmarks.
pub fn default_commodity_series() -> Vec<FredSeries> {
    [
        ("Crude Oil (WTI)", "DCOILWTICO"),
        ("Brent Oil", "DCOILBRENTEU"),
        ("Natural Gas (Henry Hub)", "DHHNGSP"),
        ("Copper", "PCOPPUSDM"),
        ("Aluminum", "PALUMUSDM"),
        ("Nickel", "PNICKUSDM"),
        ("Zinc", "PZINCUSDM"),
        ("Tin", "PTINUSDM"),
        ("Lead", "PLEADUSDM"),
        ("Iron Ore", "PIORECRUSDM"),
        ("Wheat", "PWHEAMTUSDM"),
        ("Corn", "PMAIZMTUSDM"),
        ("Soybeans", "PSOYBUSDM"),
        ("Rice (Thailand)", "PRICENPQUSDM"),
        ("Coffee (Arabica)", "PCOFFOTMUSDM"),
        ("Cocoa", "PCOCOUSDM"),
        ("Sugar No.11", "PSUGAISAUSDM"),
        ("Cotton", "PCOTTINDUSDM"),
    ]
    .into_iter()
    .map(|(name, code)| FredSeries::new(name, code))
    .collect()
}

#[derive(Debug, Deserialize)]
struct ObservationsResponse {
    observations: Vec<Observation>,
}

#[derive(Debug, Deserialize)]
struct Observation {
    date: String,
    value: String,
}

fn parse_observations(resp: ObservationsResponse) -> Result<Vec<(NaiveDate, Option<f64>)>, DataError> {
    resp.observations
        .into_iter()
        .map(|obs| {
            let date = NaiveDate::parse_from_str(&obs.date, "%Y-%m-%d").map_err(|e| {
                DataError::ResponseFormatChanged(format!("bad observation date '{}': {e}", obs.date))
            })?;
            Ok((date, obs.value.trim().parse::<f64>().ok()))
        })
        .collect()
}

pub struct FredSource {
    http: JsonClient,
    base_url: String,
    api_key: String,
    series: Vec<FredSeries>,
}

impl FredSource {
    pub fn new(
        http: JsonClient,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        series: Vec<FredSeries>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            api_key: api_key.into(),
            series,
        }
    }
}

impl SeriesSource for FredSource {
    fn name(&self) -> &str {
        "commodity_prices"
    }

    fn series_key(&self) -> String {
        let codes: Vec<String> = self
            .series
            .iter()
            .map(|s| format!("{}={}", s.name, s.code))
            .collect();
        format!("fred:{}", codes.join(","))
    }

    fn fetch(&self, range: &MonthRange) -> Result<SourceFetch, DataError> {
        let mut out = SourceFetch::default();
        let start = range.start.first_day().format("%Y-%m-%d").to_string();
        let end = range.end.last_day().format("%Y-%m-%d").to_string();

        for series in &self.series {
            let query = [
                ("series_id", series.code.clone()),
                ("api_key", self.api_key.clone()),
                ("file_type", "json".to_string()),
                ("observation_start", start.clone()),
                ("observation_end", end.clone()),
            ];
            let result = self
                .http
                .get_json::<ObservationsResponse>(&self.base_url, &query, &series.code)
                .and_then(parse_observations);

            match result {
                Ok(observations) => {
                    let monthly = resample_month_end(&observations);
                    if monthly.is_empty() {
                        let e = DataError::ResponseFormatChanged("no observations in range".into());
                        warn!(series = %series.name, code = %series.code, "no observations in range");
                        out.record_failure(&series.name, &e);
                    } else {
                        out.series.insert(series.name.clone(), monthly);
                    }
                }
                Err(e) => {
                    warn!(series = %series.name, code = %series.code, error = %e, "commodity series unavailable");
                    out.record_failure(&series.name, &e);
                }
            }
        }

        info!(
            fetched = out.series.len(),
            failed = out.failures.len(),
            "fetched commodity prices"
        );
        Ok(out)
    }

    fn is_available(&self) -> bool {
        self.http.is_available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Period;

    #[test]
    fn default_series_cover_all_benchmarks() {
        let series = default_commodity_series();
        assert_eq!(series.len(), 18);
        assert!(series.iter().any(|s| s.code == "DCOILWTICO"));
    }

    #[test]
    fn missing_marker_becomes_null() {
        let body = r#"{"observations":[
            {"date":"2024-01-30","value":"77.8"},
            {"date":"2024-01-31","value":"."},
            {"date":"2024-02-29","value":"78.3"}
        ]}"#;
        let resp: ObservationsResponse = serde_json::from_str(body).unwrap();
        let obs = parse_observations(resp).unwrap();
        assert_eq!(obs[1].1, None);

        let monthly = resample_month_end(&obs);
        assert_eq!(monthly.get(&Period::new(2024, 1).unwrap()), Some(&77.8));
        assert_eq!(monthly.get(&Period::new(2024, 2).unwrap()), Some(&78.3));
    }

    #[test]
    fn bad_date_is_a_format_change() {
        let resp = ObservationsResponse {
            observations: vec![Observation {
                date: "30/01/2024".into(),
                value: "1".into(),
            }],
        };
        assert!(matches!(
            parse_observations(resp),
            Err(DataError::ResponseFormatChanged(_))
        ));
    }
}
