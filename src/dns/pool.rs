//! Scored pool of DNS servers with circuit breaking and latency grouping

use super::circuit_breaker::{CircuitBreaker, CircuitState};
use super::grouper::{DnsServerGrouper, GroupStats};
use super::metrics::{ServerMetrics, ServerSnapshot};
use crate::defaults;
use crate::error::{AppError, Result};
use crate::models::dns::round2;
use crate::models::Config;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Score given to servers borrowed to reach `min_servers`
const PADDING_SCORE: f64 = 50.0;
const TOP_SERVERS: usize = 10;

/// Snapshot of the whole pool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolStats {
    pub total_servers: usize,
    pub closed_circuits: usize,
    pub open_circuits: usize,
    pub half_open_circuits: usize,
    pub avg_score: f64,
    /// Mean over servers that have answered at least once
    pub avg_response_time_ms: f64,
    pub top_servers: Vec<(String, f64)>,
}

/// Owns the health metrics of every configured server
///
/// Each server's entry has its own lock, so updates for different servers
/// proceed in parallel. Lock order is always entry, then grouper.
pub struct SmartDnsPool {
    servers: Vec<String>,
    entries: HashMap<String, Mutex<ServerMetrics>>,
    grouper: Mutex<DnsServerGrouper>,
    min_servers: usize,
    max_servers: usize,
}

impl SmartDnsPool {
    pub fn new(
        servers: Vec<String>,
        min_servers: usize,
        max_servers: usize,
        failure_threshold: u32,
        timeout_seconds: f64,
    ) -> Result<Self> {
        Self::build(
            servers,
            min_servers,
            max_servers,
            failure_threshold,
            defaults::DEFAULT_SUCCESS_THRESHOLD,
            timeout_seconds,
        )
    }

    /// Pool over the configured servers with the configured breaker thresholds
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::build(
            config.all_dns_servers(),
            defaults::DEFAULT_POOL_MIN_SERVERS,
            defaults::DEFAULT_POOL_MAX_SERVERS,
            config.failure_threshold,
            config.success_threshold,
            config.circuit_timeout,
        )
    }

    fn build(
        servers: Vec<String>,
        min_servers: usize,
        max_servers: usize,
        failure_threshold: u32,
        success_threshold: u32,
        timeout_seconds: f64,
    ) -> Result<Self> {
        if servers.is_empty() {
            return Err(AppError::validation("DNS server pool needs at least one server"));
        }

        let mut ordered: Vec<String> = Vec::with_capacity(servers.len());
        let mut entries = HashMap::with_capacity(servers.len());
        for server in servers {
            if entries.contains_key(&server) {
                continue;
            }
            let breaker = CircuitBreaker::new(failure_threshold, success_threshold, timeout_seconds)?;
            entries.insert(server.clone(), Mutex::new(ServerMetrics::new(server.clone(), breaker)));
            ordered.push(server);
        }

        Ok(Self {
            grouper: Mutex::new(DnsServerGrouper::new(&ordered)),
            servers: ordered,
            entries,
            min_servers,
            max_servers,
        })
    }

    /// Pool with the default sizing (min 8, max 20, 5 failures, 30 s)
    pub fn with_defaults(servers: Vec<String>) -> Result<Self> {
        Self::new(
            servers,
            defaults::DEFAULT_POOL_MIN_SERVERS,
            defaults::DEFAULT_POOL_MAX_SERVERS,
            defaults::DEFAULT_FAILURE_THRESHOLD,
            defaults::DEFAULT_CIRCUIT_TIMEOUT_SECS,
        )
    }

    /// Pool tuned for large server lists (min 10, max 20, 4 failures, 30 s)
    pub fn optimized(servers: Vec<String>) -> Result<Self> {
        Self::new(servers, 10, 20, 4, 30.0)
    }

    pub fn servers(&self) -> &[String] {
        &self.servers
    }

    fn default_count(&self, count: Option<usize>) -> usize {
        count.unwrap_or_else(|| self.max_servers.min(self.servers.len()))
    }

    /// Best-scored servers whose circuit admits a request
    ///
    /// Open circuits past their timeout move to half-open here and are
    /// selected as trials. When fewer than `min_servers` are admitted, the
    /// remaining servers are added at a neutral score in configured order
    /// before sorting.
    pub fn select_servers(&self, count: Option<usize>) -> Vec<String> {
        let count = self.default_count(count);

        let mut available: Vec<(String, f64)> = self
            .servers
            .iter()
            .filter_map(|server| {
                let metrics = self.entries.get(server)?.lock();
                metrics
                    .circuit_breaker
                    .allow_request()
                    .then(|| (server.clone(), metrics.score))
            })
            .collect();

        if available.len() < self.min_servers {
            for server in &self.servers {
                if available.len() >= self.min_servers {
                    break;
                }
                if !available.iter().any(|(s, _)| s == server) {
                    available.push((server.clone(), PADDING_SCORE));
                }
            }
        }

        available.sort_by(|a, b| b.1.total_cmp(&a.1));
        available.into_iter().take(count).map(|(s, _)| s).collect()
    }

    /// Servers in latency-group priority order
    pub fn select_servers_by_group(&self, count: Option<usize>) -> Vec<String> {
        let count = self.default_count(count);
        self.grouper.lock().get_servers_by_priority(Some(count))
    }

    /// Record one request outcome; unknown servers are ignored
    pub fn update_server_metrics(&self, server: &str, success: bool, latency_ms: f64) {
        let Some(entry) = self.entries.get(server) else {
            return;
        };
        let mut metrics = entry.lock();
        // A result from a cooled-down open server counts as its half-open trial
        metrics.circuit_breaker.allow_request();
        metrics.record(success, latency_ms);
        self.grouper.lock().update_server_latency(server, latency_ms);
    }

    /// Whether the server's circuit currently admits a request
    pub fn allow_request(&self, server: &str) -> bool {
        self.entries
            .get(server)
            .map(|entry| entry.lock().circuit_breaker.allow_request())
            .unwrap_or(false)
    }

    pub fn server_snapshot(&self, server: &str) -> Option<ServerSnapshot> {
        self.entries.get(server).map(|entry| entry.lock().snapshot())
    }

    pub fn top_servers(&self, n: usize) -> Vec<(String, f64)> {
        let mut scored: Vec<(String, f64)> = self
            .servers
            .iter()
            .filter_map(|s| self.entries.get(s).map(|e| (s.clone(), e.lock().score)))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(n);
        scored
    }

    pub fn get_group_stats(&self) -> GroupStats {
        self.grouper.lock().get_group_stats()
    }

    pub fn get_pool_stats(&self) -> PoolStats {
        let snapshots: Vec<ServerSnapshot> = self
            .servers
            .iter()
            .filter_map(|s| self.server_snapshot(s))
            .collect();

        let count_state = |state: CircuitState| snapshots.iter().filter(|s| s.state == state).count();

        let avg_score = if snapshots.is_empty() {
            0.0
        } else {
            snapshots.iter().map(|s| s.score).sum::<f64>() / snapshots.len() as f64
        };

        let answered: Vec<f64> = snapshots
            .iter()
            .map(|s| s.avg_response_time)
            .filter(|rt| *rt > 0.0)
            .collect();
        let avg_response = if answered.is_empty() {
            0.0
        } else {
            answered.iter().sum::<f64>() / answered.len() as f64
        };

        let mut top: Vec<(String, f64)> = snapshots.iter().map(|s| (s.server.clone(), s.score)).collect();
        top.sort_by(|a, b| b.1.total_cmp(&a.1));
        top.truncate(TOP_SERVERS);

        PoolStats {
            total_servers: snapshots.len(),
            closed_circuits: count_state(CircuitState::Closed),
            open_circuits: count_state(CircuitState::Open),
            half_open_circuits: count_state(CircuitState::HalfOpen),
            avg_score: round2(avg_score),
            avg_response_time_ms: round2(avg_response),
            top_servers: top,
        }
    }
}
