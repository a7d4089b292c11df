//! Type definitions and aliases

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// Re-export commonly used types
pub use crate::error::{AppError, Result};

/// How the download measurement picks its data source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeedTestMethod {
    /// Pull straight from the target IP
    Direct,
    /// Pull from the well-known speed-test endpoints
    Server,
    /// Run both paths and report the faster one
    Both,
}

impl SpeedTestMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Server => "server",
            Self::Both => "both",
        }
    }

    pub fn uses_direct(&self) -> bool {
        matches!(self, Self::Direct | Self::Both)
    }

    pub fn uses_server(&self) -> bool {
        matches!(self, Self::Server | Self::Both)
    }
}

impl FromStr for SpeedTestMethod {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "direct" => Ok(Self::Direct),
            "server" => Ok(Self::Server),
            "both" => Ok(Self::Both),
            other => Err(AppError::parse(format!("Invalid speed test method: {}", other))),
        }
    }
}

impl fmt::Display for SpeedTestMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ranking order used when selecting the best IPs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortBy {
    /// Ascending average ping delay
    Latency,
    /// Descending download throughput
    Speed,
    /// Composite of latency and throughput
    Balance,
}

impl SortBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Latency => "latency",
            Self::Speed => "speed",
            Self::Balance => "balance",
        }
    }
}

impl FromStr for SortBy {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "latency" => Ok(Self::Latency),
            "speed" => Ok(Self::Speed),
            "balance" => Ok(Self::Balance),
            other => Err(AppError::parse(format!("Invalid sort order: {}", other))),
        }
    }
}

impl fmt::Display for SortBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Probe kinds a test batch can run per IP
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestType {
    Ping,
    Speed,
}

impl FromStr for TestType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "ping" => Ok(Self::Ping),
            "speed" => Ok(Self::Speed),
            other => Err(AppError::parse(format!("Invalid test type: {}", other))),
        }
    }
}

/// Which DNS servers the orchestrator queries for each domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerSelection {
    /// Every configured server
    All,
    /// Highest pool scores first, closed circuits only
    Scored,
    /// Fast, medium, slow, then unknown latency groups
    Grouped,
}

impl FromStr for ServerSelection {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "all" => Ok(Self::All),
            "scored" => Ok(Self::Scored),
            "grouped" => Ok(Self::Grouped),
            other => Err(AppError::parse(format!("Invalid server selection: {}", other))),
        }
    }
}

/// How hosts-file lines are generated from resolution and probe results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostsMode {
    /// Every ranked IP, mapped to each domain that resolved to it
    UniqueIp,
    /// One best IP per domain
    BestPerDomain,
}

impl HostsMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UniqueIp => "unique_ip",
            Self::BestPerDomain => "best_per_domain",
        }
    }
}

impl FromStr for HostsMode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "unique_ip" | "unique" => Ok(Self::UniqueIp),
            "best_per_domain" | "per_domain" => Ok(Self::BestPerDomain),
            other => Err(AppError::parse(format!("Invalid hosts mode: {}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_speed_test_method_parsing() {
        assert_eq!("direct".parse::<SpeedTestMethod>().unwrap(), SpeedTestMethod::Direct);
        assert_eq!(" Both ".parse::<SpeedTestMethod>().unwrap(), SpeedTestMethod::Both);
        assert!("udp".parse::<SpeedTestMethod>().is_err());
    }

    #[test]
    fn test_speed_test_method_paths() {
        assert!(SpeedTestMethod::Both.uses_direct());
        assert!(SpeedTestMethod::Both.uses_server());
        assert!(!SpeedTestMethod::Direct.uses_server());
        assert!(!SpeedTestMethod::Server.uses_direct());
    }

    #[test]
    fn test_sort_by_round_trip_names() {
        for sort in [SortBy::Latency, SortBy::Speed, SortBy::Balance] {
            assert_eq!(sort.as_str().parse::<SortBy>().unwrap(), sort);
        }
        assert!("fastest".parse::<SortBy>().is_err());
    }

    #[test]
    fn test_server_selection_parsing() {
        assert_eq!("GROUPED".parse::<ServerSelection>().unwrap(), ServerSelection::Grouped);
        assert!("random".parse::<ServerSelection>().is_err());
    }

    #[test]
    fn test_hosts_mode_accepts_dashes() {
        assert_eq!("best-per-domain".parse::<HostsMode>().unwrap(), HostsMode::BestPerDomain);
        assert_eq!("unique_ip".parse::<HostsMode>().unwrap(), HostsMode::UniqueIp);
        assert!("all".parse::<HostsMode>().is_err());
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&HostsMode::BestPerDomain).unwrap();
        assert_eq!(json, "\"best_per_domain\"");
        let method: SpeedTestMethod = serde_json::from_str("\"server\"").unwrap();
        assert_eq!(method, SpeedTestMethod::Server);
    }
}
