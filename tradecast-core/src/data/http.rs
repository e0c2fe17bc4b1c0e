//! Blocking JSON client with bounded retries and a circuit breaker.
//!
//! Retries with exponential backoff on connect errors, timeouts, 429 and 5xx.
//! Any other 4xx fails at once (a wrong series code will not start working on
//! the third try). 403 trips the breaker. Errors never carry the request URL,
//! since query strings may hold an API key.

use super::circuit_breaker::CircuitBreaker;
use super::error::DataError;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(500);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Delay before retry `attempt` (1-based): `base * 2^(attempt - 1)`.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base * 2u32.saturating_pow(attempt.saturating_sub(1))
}

pub struct JsonClient {
    client: reqwest::blocking::Client,
    breaker: Arc<CircuitBreaker>,
    max_retries: u32,
    base_delay: Duration,
}

impl JsonClient {
    pub fn new(breaker: Arc<CircuitBreaker>) -> Result<Self, DataError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("tradecast/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DataError::NetworkUnreachable(format!("HTTP client setup: {e}")))?;

        Ok(Self {
            client,
            breaker,
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
        })
    }

    pub fn with_retries(mut self, max_retries: u32, base_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.base_delay = base_delay;
        self
    }

    pub fn is_available(&self) -> bool {
        self.breaker.allows_request()
    }

    /// GET `url` with `query` and decode the JSON body. `endpoint` is the
    /// label used in errors and logs in place of the URL.
    pub fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
        endpoint: &str,
    ) -> Result<T, DataError> {
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = backoff_delay(self.base_delay, attempt);
                debug!(endpoint, attempt, delay_ms = delay.as_millis() as u64, "retrying");
                std::thread::sleep(delay);
            }

            if !self.breaker.allows_request() {
                return Err(DataError::CircuitBreakerTripped);
            }

            let resp = match self.client.get(url).query(query).send() {
                Ok(resp) => resp,
                Err(e) => {
                    let e = e.without_url();
                    if e.is_connect() || e.is_timeout() {
                        self.breaker.record_failure();
                        last_error = Some(DataError::NetworkUnreachable(e.to_string()));
                        continue;
                    }
                    return Err(DataError::NetworkUnreachable(e.to_string()));
                }
            };

            let status = resp.status();

            if status == StatusCode::FORBIDDEN {
                warn!(endpoint, "provider answered 403, blocking further requests");
                self.breaker.trip();
                return Err(DataError::CircuitBreakerTripped);
            }

            if status == StatusCode::TOO_MANY_REQUESTS {
                self.breaker.record_failure();
                let retry_after_secs = resp
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(60);
                last_error = Some(DataError::RateLimited { retry_after_secs });
                continue;
            }

            if status.is_server_error() {
                self.breaker.record_failure();
                last_error = Some(DataError::HttpStatus {
                    status: status.as_u16(),
                    endpoint: endpoint.to_string(),
                });
                continue;
            }

            if !status.is_success() {
                return Err(DataError::HttpStatus {
                    status: status.as_u16(),
                    endpoint: endpoint.to_string(),
                });
            }

            let body = resp.json::<T>().map_err(|e| {
                DataError::ResponseFormatChanged(format!("{endpoint}: {}", e.without_url()))
            })?;
            self.breaker.record_success();
            return Ok(body);
        }

        Err(last_error.unwrap_or_else(|| {
            DataError::NetworkUnreachable(format!("{endpoint}: retries exhausted"))
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles() {
        let base = Duration::from_millis(500);
        assert_eq!(backoff_delay(base, 1), Duration::from_millis(500));
        assert_eq!(backoff_delay(base, 2), Duration::from_millis(1000));
        assert_eq!(backoff_delay(base, 3), Duration::from_millis(2000));
    }

    #[test]
    fn tripped_breaker_short_circuits() {
        let breaker = Arc::new(CircuitBreaker::new(Duration::from_secs(60), 3));
        breaker.trip();
        let client = JsonClient::new(breaker).unwrap().with_retries(0, Duration::ZERO);
        let err = client
            .get_json::<serde_json::Value>("http://127.0.0.1:9/never", &[], "test")
            .unwrap_err();
        assert!(matches!(err, DataError::CircuitBreakerTripped));
    }
}
