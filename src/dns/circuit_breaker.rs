//! Three-state circuit breaker guarding one DNS server

use crate::defaults;
use crate::error::{AppError, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Requests flow normally
    Closed,
    /// Requests are rejected until the timeout elapses
    Open,
    /// Trial requests decide whether to close again
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half-open",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    consecutive_successes: u32,
    last_failure: Option<Instant>,
}

/// Consecutive-failure circuit breaker
///
/// Closed opens after `failure_threshold` consecutive failures. Open moves
/// to half-open inside [`allow_request`](Self::allow_request) once `timeout`
/// has passed since the last failure. Half-open closes after
/// `success_threshold` consecutive successes and reopens on any failure.
#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    success_threshold: u32,
    timeout: Duration,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, success_threshold: u32, timeout_seconds: f64) -> Result<Self> {
        if failure_threshold == 0 {
            return Err(AppError::config("Circuit breaker failure threshold must be at least 1"));
        }
        if success_threshold == 0 {
            return Err(AppError::config("Circuit breaker success threshold must be at least 1"));
        }
        if !timeout_seconds.is_finite() || timeout_seconds <= 0.0 {
            return Err(AppError::config(format!(
                "Circuit breaker timeout must be a positive number of seconds, got {}",
                timeout_seconds
            )));
        }

        Ok(Self {
            failure_threshold,
            success_threshold,
            timeout: Duration::from_secs_f64(timeout_seconds),
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failure_count: 0,
                consecutive_successes: 0,
                last_failure: None,
            }),
        })
    }

    /// Whether a request may go through right now
    ///
    /// Performs the Open to HalfOpen transition under the lock, so only one
    /// caller observes each crossing.
    pub fn allow_request(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let elapsed = inner
                    .last_failure
                    .map(|at| at.elapsed() >= self.timeout)
                    .unwrap_or(true);
                if elapsed {
                    inner.state = CircuitState::HalfOpen;
                    inner.consecutive_successes = 0;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::HalfOpen => {
                inner.consecutive_successes += 1;
                if inner.consecutive_successes >= self.success_threshold {
                    inner.state = CircuitState::Closed;
                    inner.failure_count = 0;
                    inner.consecutive_successes = 0;
                }
            }
            CircuitState::Closed => {
                inner.failure_count = 0;
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.last_failure = Some(Instant::now());
        inner.consecutive_successes = 0;
        match inner.state {
            CircuitState::Closed => {
                inner.failure_count += 1;
                if inner.failure_count >= self.failure_threshold {
                    inner.state = CircuitState::Open;
                }
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
            }
            CircuitState::Open => {
                inner.failure_count += 1;
            }
        }
    }

    pub fn get_state(&self) -> CircuitState {
        self.inner.lock().state
    }

    pub fn failure_count(&self) -> u32 {
        self.inner.lock().failure_count
    }

    pub fn failure_threshold(&self) -> u32 {
        self.failure_threshold
    }

    pub fn success_threshold(&self) -> u32 {
        self.success_threshold
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self {
            failure_threshold: defaults::DEFAULT_FAILURE_THRESHOLD,
            success_threshold: defaults::DEFAULT_SUCCESS_THRESHOLD,
            timeout: Duration::from_secs_f64(defaults::DEFAULT_CIRCUIT_TIMEOUT_SECS),
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failure_count: 0,
                consecutive_successes: 0,
                last_failure: None,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_rejects_invalid_parameters() {
        assert!(CircuitBreaker::new(0, 3, 30.0).is_err());
        assert!(CircuitBreaker::new(5, 0, 30.0).is_err());
        assert!(CircuitBreaker::new(5, 3, 0.0).is_err());
        assert!(CircuitBreaker::new(5, 3, f64::NAN).is_err());
        assert_eq!(CircuitBreaker::new(0, 3, 30.0).unwrap_err().category(), "CONFIG");
    }

    #[test]
    fn test_defaults() {
        let breaker = CircuitBreaker::default();
        assert_eq!(breaker.failure_threshold(), 5);
        assert_eq!(breaker.success_threshold(), 3);
        assert_eq!(breaker.timeout(), Duration::from_secs(30));
        assert_eq!(breaker.get_state(), CircuitState::Closed);
    }

    #[test]
    fn test_opens_after_threshold() {
        let breaker = CircuitBreaker::new(3, 1, 30.0).unwrap();
        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.get_state(), CircuitState::Closed);
        assert!(breaker.allow_request());

        breaker.record_failure();
        assert_eq!(breaker.get_state(), CircuitState::Open);
        assert!(!breaker.allow_request());
    }

    #[test]
    fn test_success_resets_consecutive_failures() {
        let breaker = CircuitBreaker::new(3, 1, 30.0).unwrap();
        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();
        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.get_state(), CircuitState::Closed);
    }

    #[test]
    fn test_half_open_recovery() {
        let breaker = CircuitBreaker::new(1, 2, 0.05).unwrap();
        breaker.record_failure();
        assert!(!breaker.allow_request());

        std::thread::sleep(Duration::from_millis(70));
        assert!(breaker.allow_request());
        assert_eq!(breaker.get_state(), CircuitState::HalfOpen);

        breaker.record_success();
        assert_eq!(breaker.get_state(), CircuitState::HalfOpen);
        breaker.record_success();
        assert_eq!(breaker.get_state(), CircuitState::Closed);
        assert_eq!(breaker.failure_count(), 0);
    }

    #[test]
    fn test_half_open_failure_reopens() {
        let breaker = CircuitBreaker::new(1, 3, 0.05).unwrap();
        breaker.record_failure();
        std::thread::sleep(Duration::from_millis(70));
        assert!(breaker.allow_request());

        breaker.record_failure();
        assert_eq!(breaker.get_state(), CircuitState::Open);
        assert!(!breaker.allow_request());
    }

    #[test]
    fn test_single_half_open_crossing() {
        let breaker = Arc::new(CircuitBreaker::new(1, 1, 0.02).unwrap());
        breaker.record_failure();
        std::thread::sleep(Duration::from_millis(40));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let b = Arc::clone(&breaker);
                std::thread::spawn(move || b.allow_request())
            })
            .collect();
        let allowed = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|allowed| *allowed)
            .count();
        // Half-open admits every caller; the crossing itself happened once
        assert_eq!(allowed, 8);
        assert_eq!(breaker.get_state(), CircuitState::HalfOpen);
    }
}
