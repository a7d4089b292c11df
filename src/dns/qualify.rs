//! Sequential qualification of configured DNS servers against probe domains

use super::pool::SmartDnsPool;
use super::resolver::DnsResolver;
use super::timeout::AdaptiveTimeout;
use crate::models::dns::round2;
use crate::models::ResolutionResult;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const DEFAULT_PROBE_DOMAINS: &[&str] = &["google.com", "github.com", "cloudflare.com", "baidu.com"];
/// Minimum success rate for a server to qualify
pub const QUALIFY_THRESHOLD: f64 = 0.7;

/// Shared stop request, checked between qualification steps
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerQualification {
    pub server: String,
    pub attempts: usize,
    pub successes: usize,
    pub success_rate: f64,
    pub avg_latency_ms: f64,
    pub qualified: bool,
}

impl ServerQualification {
    fn from_samples(server: &str, samples: &[(bool, f64)]) -> Self {
        let attempts = samples.len();
        let latencies: Vec<f64> = samples.iter().filter(|(ok, _)| *ok).map(|(_, ms)| *ms).collect();
        let successes = latencies.len();
        let success_rate = if attempts == 0 { 0.0 } else { successes as f64 / attempts as f64 };
        let avg_latency_ms = if latencies.is_empty() {
            0.0
        } else {
            round2(latencies.iter().sum::<f64>() / successes as f64)
        };

        Self {
            server: server.to_string(),
            attempts,
            successes,
            success_rate,
            avg_latency_ms,
            qualified: attempts > 0 && success_rate >= QUALIFY_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QualificationReport {
    pub servers: Vec<ServerQualification>,
    /// Set when the run stopped early; `servers` holds what finished
    pub cancelled: bool,
}

impl QualificationReport {
    pub fn qualified_servers(&self) -> Vec<String> {
        self.servers
            .iter()
            .filter(|s| s.qualified)
            .map(|s| s.server.clone())
            .collect()
    }
}

/// Tests each server in turn; each lookup is bounded by an adaptive timeout
pub struct ServerQualifier {
    resolver: Arc<DnsResolver>,
    pool: Option<Arc<SmartDnsPool>>,
    probe_domains: Vec<String>,
    adaptive: Mutex<AdaptiveTimeout>,
}

impl ServerQualifier {
    pub fn new(resolver: Arc<DnsResolver>) -> Self {
        Self {
            resolver,
            pool: None,
            probe_domains: DEFAULT_PROBE_DOMAINS.iter().map(|d| d.to_string()).collect(),
            adaptive: Mutex::new(AdaptiveTimeout::default()),
        }
    }

    pub fn with_pool(mut self, pool: Arc<SmartDnsPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn with_probe_domains(mut self, domains: Vec<String>) -> Self {
        self.probe_domains = domains;
        self
    }

    pub fn current_timeout(&self, server: &str) -> Duration {
        self.adaptive.lock().get_timeout(server)
    }

    /// Qualify every server the resolver was configured with
    pub async fn qualify_all(&self, cancel: &CancellationFlag) -> QualificationReport {
        let servers = self.resolver.servers().to_vec();
        self.qualify(&servers, cancel).await
    }

    pub async fn qualify(&self, servers: &[String], cancel: &CancellationFlag) -> QualificationReport {
        let mut report = QualificationReport::default();

        for server in servers {
            let mut samples = Vec::with_capacity(self.probe_domains.len());
            for domain in &self.probe_domains {
                if cancel.is_cancelled() {
                    if !samples.is_empty() {
                        report.servers.push(ServerQualification::from_samples(server, &samples));
                    }
                    report.cancelled = true;
                    return report;
                }
                samples.push(self.probe(domain, server).await);
            }
            report.servers.push(ServerQualification::from_samples(server, &samples));
        }

        report.cancelled = cancel.is_cancelled();
        report
    }

    async fn probe(&self, domain: &str, server: &str) -> (bool, f64) {
        let limit = self.current_timeout(server);
        let started = Instant::now();
        let result = tokio::time::timeout(limit, self.resolver.resolve_domain(domain, server))
            .await
            .unwrap_or_else(|_| ResolutionResult::task_failed(server, "qualification lookup timed out"));
        let elapsed = started.elapsed();

        self.adaptive.lock().update(server, elapsed, result.success);
        if let Some(pool) = &self.pool {
            if result.was_attempted() {
                pool.update_server_metrics(server, result.success, elapsed.as_secs_f64() * 1000.0);
            }
        }
        (result.success, round2(elapsed.as_secs_f64() * 1000.0))
    }
}
