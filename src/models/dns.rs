//! Resolution result records

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;

/// Source label used when the host resolver answered instead of a DNS server
pub const SYSTEM_DNS_SOURCE: &str = "system_dns";

/// Why a per-server resolution failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Skipped without I/O because the server is blocked
    CircuitOpen,
    Timeout,
    NoRecords,
    Unreachable,
    Other,
    /// The worker task panicked or was aborted
    TaskFailed,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CircuitOpen => "circuit_open",
            Self::Timeout => "timeout",
            Self::NoRecords => "no_records",
            Self::Unreachable => "unreachable",
            Self::Other => "other",
            Self::TaskFailed => "task_failed",
        }
    }
}

/// Response-speed label attached to each per-server result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeedTier {
    VeryFast,
    Fast,
    Normal,
    Slow,
    VerySlow,
    Unknown,
    Blocked,
    Failed,
}

impl SpeedTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VeryFast => "very fast",
            Self::Fast => "fast",
            Self::Normal => "normal",
            Self::Slow => "slow",
            Self::VerySlow => "very slow",
            Self::Unknown => "unknown",
            Self::Blocked => "blocked",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for SpeedTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of resolving one domain against one server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionResult {
    pub server: String,
    /// Deduplicated A and AAAA answers
    pub ips: Vec<IpAddr>,
    pub success: bool,
    /// Wall-clock time in ms, rounded to 2 decimals
    pub elapsed_ms: f64,
    pub error: Option<String>,
    pub failure: Option<FailureKind>,
    pub speed_tier: SpeedTier,
}

impl ResolutionResult {
    pub fn success(server: impl Into<String>, ips: Vec<IpAddr>, elapsed_ms: f64, speed_tier: SpeedTier) -> Self {
        Self {
            server: server.into(),
            ips: dedup_preserving_order(ips),
            success: true,
            elapsed_ms: round2(elapsed_ms),
            error: None,
            failure: None,
            speed_tier,
        }
    }

    pub fn failure(
        server: impl Into<String>,
        kind: FailureKind,
        error: impl Into<String>,
        elapsed_ms: f64,
        speed_tier: SpeedTier,
    ) -> Self {
        Self {
            server: server.into(),
            ips: Vec::new(),
            success: false,
            elapsed_ms: round2(elapsed_ms),
            error: Some(error.into()),
            failure: Some(kind),
            speed_tier,
        }
    }

    /// Result for a server skipped because it is blocked
    pub fn blocked(server: impl Into<String>) -> Self {
        Self::failure(server, FailureKind::CircuitOpen, "server temporarily blocked", 0.0, SpeedTier::Blocked)
    }

    /// Result for a worker task that never reported back
    pub fn task_failed(server: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::failure(server, FailureKind::TaskFailed, detail, 0.0, SpeedTier::Failed)
    }

    /// Whether the server was actually queried
    pub fn was_attempted(&self) -> bool {
        self.failure != Some(FailureKind::CircuitOpen)
    }
}

/// One distinct IP found for a domain, with the servers that returned it
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UniqueIpRecord {
    pub sources: Vec<String>,
    /// Running mean of the elapsed times of the contributing servers
    pub avg_elapsed_ms: f64,
}

impl UniqueIpRecord {
    /// Fold in one more server that returned this IP
    pub fn merge(&mut self, source: &str, elapsed_ms: f64) {
        if self.sources.iter().any(|s| s == source) {
            return;
        }
        self.sources.push(source.to_string());
        let n = self.sources.len() as f64;
        self.avg_elapsed_ms = (self.avg_elapsed_ms * (n - 1.0) + elapsed_ms) / n;
    }
}

/// Aggregate counters over the per-server results of one domain
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolutionAnalysis {
    pub total_servers: usize,
    pub successful_servers: usize,
    pub failed_servers: usize,
    pub total_unique_ips: usize,
    /// Mean elapsed ms over successful servers, 0 when none succeeded
    pub avg_response_time_ms: f64,
}

impl ResolutionAnalysis {
    pub fn from_results(results: &[ResolutionResult], unique_ips: usize) -> Self {
        let successes: Vec<&ResolutionResult> = results.iter().filter(|r| r.success).collect();
        let avg = if successes.is_empty() {
            0.0
        } else {
            round2(successes.iter().map(|r| r.elapsed_ms).sum::<f64>() / successes.len() as f64)
        };

        Self {
            total_servers: results.len(),
            successful_servers: successes.len(),
            failed_servers: results.len() - successes.len(),
            total_unique_ips: unique_ips,
            avg_response_time_ms: avg,
        }
    }
}

/// Full multi-server result for one domain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainResolution {
    pub domain: String,
    pub analysis: ResolutionAnalysis,
    pub is_poisoned: bool,
    pub poison_message: String,
    pub suspect_server: Option<String>,
    pub unique_ips: BTreeMap<IpAddr, UniqueIpRecord>,
    pub raw_results: Vec<ResolutionResult>,
    pub used_system_fallback: bool,
}

impl DomainResolution {
    /// Placeholder for a domain whose resolution task did not complete
    pub fn failed(domain: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            analysis: ResolutionAnalysis::default(),
            is_poisoned: false,
            poison_message: message.into(),
            suspect_server: None,
            unique_ips: BTreeMap::new(),
            raw_results: Vec::new(),
            used_system_fallback: false,
        }
    }

    pub fn ips(&self) -> Vec<IpAddr> {
        self.unique_ips.keys().copied().collect()
    }

    pub fn has_ips(&self) -> bool {
        !self.unique_ips.is_empty()
    }
}

/// Answer from the host resolver, without server targeting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemResolution {
    pub domain: String,
    pub ips: Vec<IpAddr>,
    pub elapsed_ms: f64,
    pub source: String,
    pub error: Option<String>,
}

impl SystemResolution {
    pub fn success(&self) -> bool {
        !self.ips.is_empty()
    }
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub(crate) fn dedup_preserving_order(ips: Vec<IpAddr>) -> Vec<IpAddr> {
    let mut seen = std::collections::HashSet::with_capacity(ips.len());
    ips.into_iter().filter(|ip| seen.insert(*ip)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_success_dedups_and_rounds() {
        let result = ResolutionResult::success(
            "8.8.8.8",
            vec![ip("1.2.3.4"), ip("1.2.3.4"), ip("::1")],
            12.3456,
            SpeedTier::VeryFast,
        );
        assert_eq!(result.ips, vec![ip("1.2.3.4"), ip("::1")]);
        assert_eq!(result.elapsed_ms, 12.35);
        assert!(result.was_attempted());
    }

    #[test]
    fn test_blocked_result_is_not_attempted() {
        let result = ResolutionResult::blocked("9.9.9.9");
        assert!(!result.success);
        assert_eq!(result.failure, Some(FailureKind::CircuitOpen));
        assert_eq!(result.speed_tier, SpeedTier::Blocked);
        assert_eq!(result.elapsed_ms, 0.0);
        assert!(!result.was_attempted());
    }

    #[test]
    fn test_unique_ip_running_mean() {
        let mut record = UniqueIpRecord::default();
        record.merge("a", 10.0);
        record.merge("b", 20.0);
        record.merge("c", 60.0);
        assert_eq!(record.sources, vec!["a", "b", "c"]);
        assert!((record.avg_elapsed_ms - 30.0).abs() < 1e-9);

        record.merge("a", 1000.0);
        assert_eq!(record.sources.len(), 3);
    }

    #[test]
    fn test_analysis_counts() {
        let results = vec![
            ResolutionResult::success("a", vec![ip("1.1.1.1")], 10.0, SpeedTier::Fast),
            ResolutionResult::success("b", vec![ip("1.1.1.1")], 30.0, SpeedTier::Fast),
            ResolutionResult::failure("c", FailureKind::Timeout, "timed out", 2000.0, SpeedTier::Failed),
        ];
        let analysis = ResolutionAnalysis::from_results(&results, 1);
        assert_eq!(analysis.total_servers, 3);
        assert_eq!(analysis.successful_servers, 2);
        assert_eq!(analysis.failed_servers, 1);
        assert_eq!(analysis.avg_response_time_ms, 20.0);
    }

    #[test]
    fn test_failed_domain_placeholder() {
        let resolution = DomainResolution::failed("example.com", "resolution failed");
        assert!(!resolution.has_ips());
        assert_eq!(resolution.poison_message, "resolution failed");
        assert_eq!(resolution.analysis.total_servers, 0);
    }
}
