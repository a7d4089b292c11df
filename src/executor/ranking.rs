//! Ranking of tested IPs and hosts-file generation

use crate::models::{DomainResolution, NetworkTestRecord};
use crate::types::{HostsMode, SortBy};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use std::net::IpAddr;

/// Measured download speed for ranking; failed and estimated downloads count as 0
fn ranked_download(record: &NetworkTestRecord) -> f64 {
    record
        .speed
        .as_ref()
        .and_then(|s| s.download.as_ref())
        .filter(|d| d.success && !d.estimated)
        .map(|d| d.speed_mbps)
        .unwrap_or(0.0)
}

fn sort_key(record: &NetworkTestRecord, sort_by: SortBy) -> f64 {
    let avg = record.avg_delay().unwrap_or(f64::INFINITY);
    match sort_by {
        SortBy::Latency => avg,
        // Negated so every order sorts ascending
        SortBy::Speed => -ranked_download(record),
        SortBy::Balance => avg / 100.0 - ranked_download(record) / 10.0,
    }
}

/// The `top_n` best records among those whose ping succeeded
///
/// Equal keys fall back to IP order so the ranking is deterministic.
pub fn get_best_ips(results: &[NetworkTestRecord], sort_by: SortBy, top_n: usize) -> Vec<NetworkTestRecord> {
    let mut ranked: Vec<(f64, &NetworkTestRecord)> = results
        .iter()
        .filter(|r| r.ping_succeeded())
        .map(|r| (sort_key(r, sort_by), r))
        .collect();

    ranked.sort_by(|(ka, a), (kb, b)| {
        ka.partial_cmp(kb)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.ip.cmp(&b.ip))
    });

    ranked.into_iter().take(top_n).map(|(_, r)| r.clone()).collect()
}

/// Counts over one test batch; success means the ping succeeded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    /// Percentage, 0 for an empty batch
    pub success_rate: f64,
}

pub fn test_summary(results: &[NetworkTestRecord]) -> TestSummary {
    let total = results.len();
    let successful = results.iter().filter(|r| r.ping_succeeded()).count();
    let success_rate = if total == 0 {
        0.0
    } else {
        (successful as f64 / total as f64 * 10_000.0).round() / 100.0
    };
    TestSummary {
        total,
        successful,
        failed: total - successful,
        success_rate,
    }
}

/// One hosts-file line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostsEntry {
    pub ip: IpAddr,
    pub domain: String,
}

impl fmt::Display for HostsEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.ip, self.domain)
    }
}

/// Hosts lines for the ranked IPs
///
/// `UniqueIp` maps each ranked IP to every domain that resolved to it, in
/// rank order. `BestPerDomain` keeps the highest-ranked IP of each domain,
/// in domain order. Domains without a ranked IP produce no line.
pub fn hosts_entries(
    resolutions: &[DomainResolution],
    ranked: &[NetworkTestRecord],
    mode: HostsMode,
) -> Vec<HostsEntry> {
    let mut entries = Vec::new();
    match mode {
        HostsMode::UniqueIp => {
            let mut seen = HashSet::new();
            for record in ranked {
                for resolution in resolutions {
                    if resolution.unique_ips.contains_key(&record.ip) && seen.insert((record.ip, &resolution.domain)) {
                        entries.push(HostsEntry {
                            ip: record.ip,
                            domain: resolution.domain.clone(),
                        });
                    }
                }
            }
        }
        HostsMode::BestPerDomain => {
            for resolution in resolutions {
                if let Some(best) = ranked.iter().find(|r| resolution.unique_ips.contains_key(&r.ip)) {
                    entries.push(HostsEntry {
                        ip: best.ip,
                        domain: resolution.domain.clone(),
                    });
                }
            }
        }
    }
    entries
}
