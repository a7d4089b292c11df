//! Per-server health metrics and scoring

use super::circuit_breaker::{CircuitBreaker, CircuitState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Samples kept in the response-time window
pub const RESPONSE_WINDOW: usize = 20;

/// Score in [0, 100] from error rate, mean latency and breaker state
pub fn calculate_score(error_rate: f64, avg_response_time_ms: f64, state: CircuitState) -> f64 {
    if state == CircuitState::Open {
        return 0.0;
    }

    let latency_penalty = if avg_response_time_ms < 100.0 {
        0.0
    } else if avg_response_time_ms < 300.0 {
        5.0
    } else if avg_response_time_ms < 600.0 {
        15.0
    } else if avg_response_time_ms < 1000.0 {
        25.0
    } else {
        40.0
    };

    (100.0 - error_rate * 50.0 - latency_penalty).clamp(0.0, 100.0)
}

/// Health record for one DNS server, owned by the pool
#[derive(Debug)]
pub struct ServerMetrics {
    pub server: String,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub response_times: VecDeque<f64>,
    pub last_success: Option<DateTime<Utc>>,
    pub last_failure: Option<DateTime<Utc>>,
    pub error_rate: f64,
    pub avg_response_time: f64,
    pub score: f64,
    pub circuit_breaker: CircuitBreaker,
    pub consecutive_successes: u32,
}

impl ServerMetrics {
    pub fn new(server: impl Into<String>, circuit_breaker: CircuitBreaker) -> Self {
        Self {
            server: server.into(),
            total_requests: 0,
            successful_requests: 0,
            failed_requests: 0,
            response_times: VecDeque::with_capacity(RESPONSE_WINDOW),
            last_success: None,
            last_failure: None,
            error_rate: 0.0,
            avg_response_time: 0.0,
            score: 100.0,
            circuit_breaker,
            consecutive_successes: 0,
        }
    }

    /// Fold in one observed request; the only place the score changes
    pub fn record(&mut self, success: bool, response_time_ms: f64) {
        if self.response_times.len() == RESPONSE_WINDOW {
            self.response_times.pop_front();
        }
        self.response_times.push_back(response_time_ms);

        self.total_requests += 1;
        if success {
            self.successful_requests += 1;
            self.consecutive_successes += 1;
            self.last_success = Some(Utc::now());
            self.circuit_breaker.record_success();
        } else {
            self.failed_requests += 1;
            self.consecutive_successes = 0;
            self.last_failure = Some(Utc::now());
            self.circuit_breaker.record_failure();
        }

        self.error_rate = self.failed_requests as f64 / self.total_requests as f64;
        self.avg_response_time =
            self.response_times.iter().sum::<f64>() / self.response_times.len() as f64;
        self.score = calculate_score(self.error_rate, self.avg_response_time, self.circuit_breaker.get_state());
    }

    pub fn state(&self) -> CircuitState {
        self.circuit_breaker.get_state()
    }

    pub fn snapshot(&self) -> ServerSnapshot {
        ServerSnapshot {
            server: self.server.clone(),
            total_requests: self.total_requests,
            successful_requests: self.successful_requests,
            failed_requests: self.failed_requests,
            error_rate: self.error_rate,
            avg_response_time: self.avg_response_time,
            score: self.score,
            state: self.state(),
            last_success: self.last_success,
            last_failure: self.last_failure,
        }
    }
}

/// Read-only copy of a server's metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSnapshot {
    pub server: String,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub error_rate: f64,
    pub avg_response_time: f64,
    pub score: f64,
    pub state: CircuitState,
    pub last_success: Option<DateTime<Utc>>,
    pub last_failure: Option<DateTime<Utc>>,
}
