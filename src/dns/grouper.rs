//! Latency-tier grouping of DNS servers

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// Servers at or below this mean latency are fast
pub const FAST_THRESHOLD_MS: f64 = 100.0;
/// Servers at or below this mean latency are medium
pub const MEDIUM_THRESHOLD_MS: f64 = 300.0;
const LATENCY_WINDOW: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LatencyGroup {
    Fast,
    Medium,
    Slow,
    Unknown,
}

/// Counts and members per group
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupStats {
    pub total_servers: usize,
    pub fast_count: usize,
    pub medium_count: usize,
    pub slow_count: usize,
    pub unknown_count: usize,
    pub fast_servers: Vec<String>,
    pub medium_servers: Vec<String>,
    pub slow_servers: Vec<String>,
}

/// Sorts servers into fast/medium/slow/unknown by their recent mean latency
///
/// Every server is in exactly one group at any time.
#[derive(Debug, Clone)]
pub struct DnsServerGrouper {
    all_servers: Vec<String>,
    fast: Vec<String>,
    medium: Vec<String>,
    slow: Vec<String>,
    unknown: Vec<String>,
    history: HashMap<String, VecDeque<f64>>,
}

impl DnsServerGrouper {
    pub fn new(servers: &[String]) -> Self {
        Self {
            all_servers: servers.to_vec(),
            fast: Vec::new(),
            medium: Vec::new(),
            slow: Vec::new(),
            unknown: servers.to_vec(),
            history: HashMap::new(),
        }
    }

    /// Record a latency sample and move the server to its new group
    pub fn update_server_latency(&mut self, server: &str, latency_ms: f64) {
        let history = self.history.entry(server.to_string()).or_default();
        if history.len() == LATENCY_WINDOW {
            history.pop_front();
        }
        history.push_back(latency_ms);
        let avg = history.iter().sum::<f64>() / history.len() as f64;

        self.remove_from_all_groups(server);
        let target = if avg <= FAST_THRESHOLD_MS {
            &mut self.fast
        } else if avg <= MEDIUM_THRESHOLD_MS {
            &mut self.medium
        } else {
            &mut self.slow
        };
        target.push(server.to_string());
    }

    fn remove_from_all_groups(&mut self, server: &str) {
        for group in [&mut self.fast, &mut self.medium, &mut self.slow, &mut self.unknown] {
            group.retain(|s| s != server);
        }
    }

    pub fn group_of(&self, server: &str) -> Option<LatencyGroup> {
        let contains = |group: &Vec<String>| group.iter().any(|s| s == server);
        if contains(&self.fast) {
            Some(LatencyGroup::Fast)
        } else if contains(&self.medium) {
            Some(LatencyGroup::Medium)
        } else if contains(&self.slow) {
            Some(LatencyGroup::Slow)
        } else if contains(&self.unknown) {
            Some(LatencyGroup::Unknown)
        } else {
            None
        }
    }

    /// Fast, then medium, then slow, then unknown, truncated to `count`
    pub fn get_servers_by_priority(&self, count: Option<usize>) -> Vec<String> {
        let count = count.unwrap_or(self.all_servers.len());
        self.fast
            .iter()
            .chain(&self.medium)
            .chain(&self.slow)
            .chain(&self.unknown)
            .take(count)
            .cloned()
            .collect()
    }

    pub fn get_fast_servers(&self, count: Option<usize>) -> Vec<String> {
        let count = count.unwrap_or(self.fast.len());
        self.fast.iter().take(count).cloned().collect()
    }

    pub fn get_group_stats(&self) -> GroupStats {
        GroupStats {
            total_servers: self.all_servers.len(),
            fast_count: self.fast.len(),
            medium_count: self.medium.len(),
            slow_count: self.slow.len(),
            unknown_count: self.unknown.len(),
            fast_servers: self.fast.clone(),
            medium_servers: self.medium.clone(),
            slow_servers: self.slow.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn servers() -> Vec<String> {
        ["a", "b", "c", "d"].iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_all_unknown_initially() {
        let grouper = DnsServerGrouper::new(&servers());
        let stats = grouper.get_group_stats();
        assert_eq!(stats.unknown_count, 4);
        assert_eq!(grouper.get_servers_by_priority(None), servers());
    }

    #[test]
    fn test_classification_thresholds() {
        let mut grouper = DnsServerGrouper::new(&servers());
        grouper.update_server_latency("a", 100.0);
        grouper.update_server_latency("b", 300.0);
        grouper.update_server_latency("c", 300.1);

        assert_eq!(grouper.group_of("a"), Some(LatencyGroup::Fast));
        assert_eq!(grouper.group_of("b"), Some(LatencyGroup::Medium));
        assert_eq!(grouper.group_of("c"), Some(LatencyGroup::Slow));
        assert_eq!(grouper.group_of("d"), Some(LatencyGroup::Unknown));
        assert_eq!(grouper.get_servers_by_priority(Some(3)), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_reclassification_moves_server() {
        let mut grouper = DnsServerGrouper::new(&servers());
        grouper.update_server_latency("a", 50.0);
        assert_eq!(grouper.get_fast_servers(None), vec!["a"]);

        for _ in 0..10 {
            grouper.update_server_latency("a", 900.0);
        }
        let stats = grouper.get_group_stats();
        assert_eq!(stats.fast_count, 0);
        assert_eq!(stats.slow_servers, vec!["a"]);
        assert_eq!(stats.fast_count + stats.medium_count + stats.slow_count + stats.unknown_count, 4);
    }

    #[test]
    fn test_mean_uses_last_ten_samples() {
        let mut grouper = DnsServerGrouper::new(&servers());
        grouper.update_server_latency("b", 5000.0);
        for _ in 0..10 {
            grouper.update_server_latency("b", 20.0);
        }
        assert_eq!(grouper.group_of("b"), Some(LatencyGroup::Fast));
    }
}
