//! Monthly currency rates from the Frankfurter API.
//!
//! One request per month for the month's last calendar day; the API answers
//! with the last published rates on or before that date, which is the
//! month-end observation. Each quote currency becomes one series.

use super::error::DataError;
use super::http::JsonClient;
use super::provider::{SeriesSource, SourceFetch};
use crate::domain::MonthRange;
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::{info, warn};

pub const DEFAULT_BASE_URL: &str = "https://api.frankfurter.app";

#[derive(Debug, Deserialize)]
struct RatesResponse {
    rates: BTreeMap<String, f64>,
}

pub struct FrankfurterSource {
    http: JsonClient,
    base_url: String,
    base_currency: String,
}

impl FrankfurterSource {
    pub fn new(http: JsonClient, base_url: impl Into<String>, base_currency: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            base_currency: base_currency.into(),
        }
    }
}

impl SeriesSource for FrankfurterSource {
    fn name(&self) -> &str {
        "exchange_rates"
    }

    fn series_key(&self) -> String {
        format!("frankfurter:{}", self.base_currency)
    }

    fn fetch(&self, range: &MonthRange) -> Result<SourceFetch, DataError> {
        let mut out = SourceFetch::default();
        let query = [("from", self.base_currency.clone())];

        for month in range.months() {
            let date = month.last_day().format("%Y-%m-%d").to_string();
            let url = format!("{}/{date}", self.base_url);
            match self.http.get_json::<RatesResponse>(&url, &query, "frankfurter") {
                Ok(resp) => {
                    for (currency, rate) in resp.rates {
                        out.series.entry(currency).or_default().insert(month, rate);
                    }
                }
                Err(e) => {
                    warn!(month = %month, error = %e, "exchange rates unavailable for month");
                    out.record_failure(month.to_string(), &e);
                }
            }
        }

        info!(
            currencies = out.series.len(),
            failed_months = out.failures.len(),
            "fetched exchange rates"
        );
        Ok(out)
    }

    fn is_available(&self) -> bool {
        self.http.is_available()
    }
}
