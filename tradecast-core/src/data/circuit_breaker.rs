//! Circuit breaker for remote series providers.
//!
//! A provider that answers 403, or fails `failure_threshold` requests in a
//! row, is blocked for a cooldown period. Every later request fails fast with
//! `CircuitBreakerTripped` instead of hitting the network, so one banned API
//! does not stall the whole fetch stage in retries.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open { tripped_at: Instant },
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    consecutive_failures: u32,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    inner: Mutex<Inner>,
    cooldown: Duration,
    failure_threshold: u32,
}

impl CircuitBreaker {
    pub fn new(cooldown: Duration, failure_threshold: u32) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
            }),
            cooldown,
            failure_threshold: failure_threshold.max(1),
        }
    }

    /// 30-minute cooldown after 3 consecutive failures.
    pub fn for_api() -> Self {
        Self::new(Duration::from_secs(30 * 60), 3)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // state stays consistent even if a holder panicked
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether a request may be sent now. An expired cooldown closes the breaker.
    pub fn allows_request(&self) -> bool {
        let mut inner = self.lock();
        match inner.state {
            BreakerState::Closed => true,
            BreakerState::Open { tripped_at } if tripped_at.elapsed() >= self.cooldown => {
                inner.state = BreakerState::Closed;
                inner.consecutive_failures = 0;
                true
            }
            BreakerState::Open { .. } => false,
        }
    }

    pub fn record_success(&self) {
        self.lock().consecutive_failures = 0;
    }

    pub fn record_failure(&self) {
        let mut inner = self.lock();
        inner.consecutive_failures += 1;
        if inner.consecutive_failures >= self.failure_threshold {
            inner.state = BreakerState::Open {
                tripped_at: Instant::now(),
            };
        }
    }

    /// Open immediately, regardless of the failure count.
    pub fn trip(&self) {
        self.lock().state = BreakerState::Open {
            tripped_at: Instant::now(),
        };
    }

    pub fn state(&self) -> BreakerState {
        self.lock().state
    }

    pub fn remaining_cooldown(&self) -> Duration {
        match self.lock().state {
            BreakerState::Closed => Duration::ZERO,
            BreakerState::Open { tripped_at } => {
                self.cooldown.saturating_sub(tripped_at.elapsed())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_at_threshold() {
        let breaker = CircuitBreaker::new(Duration::from_secs(60), 2);
        breaker.record_failure();
        assert!(breaker.allows_request());
        breaker.record_failure();
        assert!(!breaker.allows_request());
        assert!(breaker.remaining_cooldown() > Duration::ZERO);
    }

    #[test]
    fn success_clears_streak() {
        let breaker = CircuitBreaker::new(Duration::from_secs(60), 2);
        breaker.record_failure();
        breaker.record_success();
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[test]
    fn trip_blocks_until_cooldown_passes() {
        let breaker = CircuitBreaker::new(Duration::from_millis(10), 5);
        breaker.trip();
        assert!(!breaker.allows_request());
        std::thread::sleep(Duration::from_millis(20));
        assert!(breaker.allows_request());
        assert_eq!(breaker.remaining_cooldown(), Duration::ZERO);
    }
}
