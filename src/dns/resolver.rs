//! Single-server DNS resolution with blocking, tiered timeouts and retry

use super::backend::{LookupError, RecordKind, ResolutionBackend};
use super::backoff::{resolver_retry_delay, RESOLVER_MAX_ATTEMPTS};
use super::timeout::{select_timeout, speed_tier_for};
use crate::error::{AppError, Result};
use crate::logging::ProbeLogger;
use crate::models::config::clamp_dns_threads;
use crate::models::dns::{dedup_preserving_order, round2};
use crate::models::{Config, FailureKind, ResolutionResult, SpeedTier, SystemResolution, SYSTEM_DNS_SOURCE};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Failures within the block window that take a server out of rotation
pub const BLOCK_FAILURE_COUNT: u32 = 3;
/// How long a failing server stays blocked
pub const BLOCK_WINDOW: Duration = Duration::from_secs(30);
const HISTORY_CAPACITY: usize = 20;
/// Bound on a host resolver lookup
const SYSTEM_LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Query counters for one resolver
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolverStats {
    pub total_queries: u64,
    pub successful_queries: u64,
    pub failed_queries: u64,
    pub total_response_time_ms: f64,
    pub fast_fail_count: u64,
}

impl ResolverStats {
    pub fn avg_response_time_ms(&self) -> f64 {
        if self.successful_queries == 0 {
            0.0
        } else {
            round2(self.total_response_time_ms / self.successful_queries as f64)
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_queries == 0 {
            0.0
        } else {
            self.successful_queries as f64 / self.total_queries as f64
        }
    }
}

#[derive(Debug, Default)]
struct ServerState {
    history: VecDeque<f64>,
    failure_count: u32,
    /// Reset on every failure; the block window counts from here
    failure_mark: Option<Instant>,
}

/// Resolves a domain against one DNS server at a time
///
/// Keeps per-server response history (for timeouts and speed tiers) and a
/// failure count that blocks a server for 30 s after 3 failures.
pub struct DnsResolver {
    backend: Arc<dyn ResolutionBackend>,
    servers: Vec<String>,
    dns_threads: usize,
    state: Mutex<HashMap<String, ServerState>>,
    first_query_ms: Mutex<Option<f64>>,
    stats: Mutex<ResolverStats>,
    logger: Option<Arc<ProbeLogger>>,
}

impl DnsResolver {
    pub fn new(servers: Vec<String>, dns_threads: usize, backend: Arc<dyn ResolutionBackend>) -> Result<Self> {
        if servers.is_empty() {
            return Err(AppError::validation("At least one DNS server is required"));
        }
        if dns_threads == 0 {
            return Err(AppError::validation("dns_threads must be greater than 0"));
        }

        Ok(Self {
            dns_threads: clamp_dns_threads(dns_threads, num_cpus::get(), servers.len()),
            backend,
            servers,
            state: Mutex::new(HashMap::new()),
            first_query_ms: Mutex::new(None),
            stats: Mutex::new(ResolverStats::default()),
            logger: None,
        })
    }

    pub fn from_config(config: &Config, backend: Arc<dyn ResolutionBackend>) -> Result<Self> {
        Self::new(config.all_dns_servers(), config.dns_threads, backend)
    }

    pub fn with_logger(mut self, logger: Arc<ProbeLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn servers(&self) -> &[String] {
        &self.servers
    }

    /// Effective concurrency after clamping
    pub fn dns_threads(&self) -> usize {
        self.dns_threads
    }

    pub fn logger(&self) -> Option<&Arc<ProbeLogger>> {
        self.logger.as_ref()
    }

    pub fn stats(&self) -> ResolverStats {
        self.stats.lock().clone()
    }

    pub(crate) fn record_fast_fail(&self) {
        self.stats.lock().fast_fail_count += 1;
    }

    /// Whether the server is inside its block window; clears expired entries
    pub fn is_blocked(&self, server: &str) -> bool {
        let mut state = self.state.lock();
        let Some(entry) = state.get_mut(server) else {
            return false;
        };
        if entry.failure_count < BLOCK_FAILURE_COUNT {
            return false;
        }
        match entry.failure_mark {
            Some(mark) if mark.elapsed() < BLOCK_WINDOW => true,
            _ => {
                entry.failure_count = 0;
                entry.failure_mark = None;
                false
            }
        }
    }

    /// Timeout the next query to `server` will use
    pub fn timeout_for(&self, server: &str) -> Duration {
        let first = *self.first_query_ms.lock();
        let state = self.state.lock();
        match state.get(server) {
            Some(entry) => select_timeout(&entry.history, first),
            None => select_timeout(&VecDeque::new(), first),
        }
    }

    pub fn server_speed_tier(&self, server: &str) -> SpeedTier {
        self.state
            .lock()
            .get(server)
            .map(|entry| speed_tier_for(&entry.history))
            .unwrap_or(SpeedTier::Unknown)
    }

    /// Resolve `domain` at `server`; failures come back as records, never `Err`
    pub async fn resolve_domain(&self, domain: &str, server: &str) -> ResolutionResult {
        if !self.backend.supports_server_targeting() {
            return self.resolve_via_host(domain).await;
        }

        if self.is_blocked(server) {
            if let Some(logger) = &self.logger {
                logger.log_circuit_block(server, "repeated recent failures").await;
            }
            return ResolutionResult::blocked(server);
        }

        let timeout = self.timeout_for(server);
        let started = Instant::now();
        let mut last_error = LookupError::Other("no attempt made".to_string());

        for attempt in 0..RESOLVER_MAX_ATTEMPTS {
            let attempt_start = Instant::now();
            match self.query_addresses(domain, server, timeout).await {
                Ok(ips) => {
                    let elapsed = round2(attempt_start.elapsed().as_secs_f64() * 1000.0);
                    self.record_success(server, elapsed);
                    if let Some(logger) = &self.logger {
                        logger.log_dns_attempt(domain, server, true, elapsed, None).await;
                    }
                    return ResolutionResult::success(server, ips, elapsed, self.server_speed_tier(server));
                }
                Err(err) => {
                    let retryable = err.is_retryable();
                    last_error = err;
                    if !retryable {
                        break;
                    }
                    if attempt + 1 < RESOLVER_MAX_ATTEMPTS {
                        tokio::time::sleep(resolver_retry_delay(attempt)).await;
                    }
                }
            }
        }

        let elapsed = started.elapsed().as_secs_f64() * 1000.0;
        self.record_failure(server);
        let message = format!("{} via {}: {}", domain, server, last_error);
        if let Some(logger) = &self.logger {
            logger.log_dns_attempt(domain, server, false, elapsed, Some(&message)).await;
        }
        ResolutionResult::failure(server, failure_kind(&last_error), message, elapsed, SpeedTier::Failed)
    }

    /// A and AAAA concurrently; the union wins if either family answers
    async fn query_addresses(
        &self,
        domain: &str,
        server: &str,
        timeout: Duration,
    ) -> std::result::Result<Vec<IpAddr>, LookupError> {
        let (v4, v6) = tokio::join!(
            self.backend.lookup(domain, server, RecordKind::A, timeout),
            self.backend.lookup(domain, server, RecordKind::Aaaa, timeout),
        );

        let mut ips = Vec::new();
        let mut errors = Vec::new();
        for outcome in [v4, v6] {
            match outcome {
                Ok(found) => ips.extend(found),
                Err(err) => errors.push(err),
            }
        }

        if !ips.is_empty() {
            return Ok(dedup_preserving_order(ips));
        }
        // Prefer an error worth retrying over a plain empty answer
        Err(errors
            .iter()
            .find(|e| e.is_retryable())
            .cloned()
            .unwrap_or(LookupError::NoRecords))
    }

    fn record_success(&self, server: &str, elapsed_ms: f64) {
        {
            let mut state = self.state.lock();
            let entry = state.entry(server.to_string()).or_default();
            if entry.history.len() == HISTORY_CAPACITY {
                entry.history.pop_front();
            }
            entry.history.push_back(elapsed_ms);
            entry.failure_count = entry.failure_count.saturating_sub(1);
        }
        {
            let mut first = self.first_query_ms.lock();
            if first.is_none() {
                *first = Some(elapsed_ms);
            }
        }
        let mut stats = self.stats.lock();
        stats.total_queries += 1;
        stats.successful_queries += 1;
        stats.total_response_time_ms += elapsed_ms;
    }

    fn record_failure(&self, server: &str) {
        {
            let mut state = self.state.lock();
            let entry = state.entry(server.to_string()).or_default();
            entry.failure_count += 1;
            entry.failure_mark = Some(Instant::now());
        }
        let mut stats = self.stats.lock();
        stats.total_queries += 1;
        stats.failed_queries += 1;
    }

    /// Resolve through the host resolver, ignoring the configured servers
    pub async fn resolve_with_system(&self, domain: &str) -> SystemResolution {
        let started = Instant::now();
        let outcome = tokio::time::timeout(SYSTEM_LOOKUP_TIMEOUT, self.backend.lookup_host(domain))
            .await
            .unwrap_or(Err(LookupError::Timeout));
        let elapsed_ms = round2(started.elapsed().as_secs_f64() * 1000.0);

        match outcome {
            Ok(ips) => SystemResolution {
                domain: domain.to_string(),
                ips: dedup_preserving_order(ips),
                elapsed_ms,
                source: SYSTEM_DNS_SOURCE.to_string(),
                error: None,
            },
            Err(err) => SystemResolution {
                domain: domain.to_string(),
                ips: Vec::new(),
                elapsed_ms,
                source: SYSTEM_DNS_SOURCE.to_string(),
                error: Some(err.to_string()),
            },
        }
    }

    async fn resolve_via_host(&self, domain: &str) -> ResolutionResult {
        let system = self.resolve_with_system(domain).await;
        match system.error {
            None if !system.ips.is_empty() => {
                ResolutionResult::success(SYSTEM_DNS_SOURCE, system.ips, system.elapsed_ms, SpeedTier::Unknown)
            }
            error => ResolutionResult::failure(
                SYSTEM_DNS_SOURCE,
                FailureKind::Other,
                error.unwrap_or_else(|| "host resolver returned no addresses".to_string()),
                system.elapsed_ms,
                SpeedTier::Failed,
            ),
        }
    }
}

fn failure_kind(error: &LookupError) -> FailureKind {
    match error {
        LookupError::Timeout => FailureKind::Timeout,
        LookupError::NoRecords => FailureKind::NoRecords,
        LookupError::Unreachable => FailureKind::Unreachable,
        LookupError::Other(_) => FailureKind::Other,
    }
}
