//! Configuration data model and validation

use crate::defaults;
use crate::types::{AppError, HostsMode, Result, ServerSelection, SortBy, SpeedTestMethod, TestType};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::net::IpAddr;
use std::str::FromStr;
use std::time::Duration;

/// Main application configuration
///
/// A snapshot built once per run (defaults, `.env`, environment, CLI) and
/// then shared read-only by every component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Domains to resolve and probe
    #[serde(default)]
    pub domains: Vec<String>,

    /// IPv4 DNS servers queried in parallel
    #[serde(default = "default_dns_servers")]
    pub dns_servers: Vec<String>,

    /// IPv6 DNS servers, used only when `enable_ipv6` is set
    #[serde(default = "default_ipv6_dns_servers")]
    pub ipv6_dns_servers: Vec<String>,

    /// Upper bound on concurrent DNS queries
    #[serde(default = "default_dns_threads")]
    pub dns_threads: usize,

    /// Baseline per-query DNS timeout in seconds
    #[serde(default = "default_dns_timeout")]
    pub dns_timeout: f64,

    /// Stop collecting answers after a handful of successes
    #[serde(default = "default_fast_fail")]
    pub fast_fail: bool,

    #[serde(default = "default_server_selection")]
    pub server_selection: ServerSelection,

    #[serde(default = "default_ping_count")]
    pub ping_count: u32,

    /// Per-echo timeout in seconds
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout: f64,

    /// Pause between echoes in seconds
    #[serde(default = "default_ping_interval")]
    pub ping_interval: f64,

    /// ICMP payload size in bytes
    #[serde(default = "default_packet_size")]
    pub packet_size: usize,

    /// Length of one throughput round in seconds
    #[serde(default = "default_test_duration")]
    pub test_duration: f64,

    /// Upload chunk size in bytes
    #[serde(default = "default_speed_packet_size")]
    pub speed_packet_size: usize,

    #[serde(default = "default_concurrent_connections")]
    pub concurrent_connections: usize,

    /// Concurrent per-IP test tasks
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    #[serde(default = "default_speed_test_method")]
    pub speed_test_method: SpeedTestMethod,

    /// Bulk download endpoints for the server speed path
    #[serde(default = "default_speed_endpoints")]
    pub speed_endpoints: Vec<String>,

    /// TCP port used by the direct speed path
    #[serde(default = "default_speed_port")]
    pub speed_port: u16,

    #[serde(default = "default_true")]
    pub enable_download_test: bool,

    #[serde(default)]
    pub enable_upload_test: bool,

    /// Skip throughput probing entirely
    #[serde(default)]
    pub skip_speed_test: bool,

    #[serde(default = "default_min_data_threshold")]
    pub min_data_threshold: u64,

    /// Bytes a round must move before its speed counts
    #[serde(default = "default_min_valid_data")]
    pub min_valid_data: u64,

    /// Mbps floor for reported speeds
    #[serde(default = "default_min_speed")]
    pub min_speed: f64,

    #[serde(default)]
    pub enable_ipv6: bool,

    #[serde(default = "default_top_n")]
    pub top_n: usize,

    #[serde(default = "default_sort_by")]
    pub sort_by: SortBy,

    #[serde(default = "default_hosts_mode")]
    pub hosts_mode: HostsMode,

    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,

    /// Seconds an open circuit waits before a trial request
    #[serde(default = "default_circuit_timeout")]
    pub circuit_timeout: f64,

    #[serde(default = "default_enable_color")]
    pub enable_color: bool,

    #[serde(default)]
    pub json_output: bool,

    #[serde(default)]
    pub verbose: bool,

    #[serde(default)]
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            domains: Vec::new(),
            dns_servers: default_dns_servers(),
            ipv6_dns_servers: default_ipv6_dns_servers(),
            dns_threads: default_dns_threads(),
            dns_timeout: default_dns_timeout(),
            fast_fail: default_fast_fail(),
            server_selection: default_server_selection(),
            ping_count: default_ping_count(),
            ping_timeout: default_ping_timeout(),
            ping_interval: default_ping_interval(),
            packet_size: default_packet_size(),
            test_duration: default_test_duration(),
            speed_packet_size: default_speed_packet_size(),
            concurrent_connections: default_concurrent_connections(),
            max_workers: default_max_workers(),
            speed_test_method: default_speed_test_method(),
            speed_endpoints: default_speed_endpoints(),
            speed_port: default_speed_port(),
            enable_download_test: true,
            enable_upload_test: false,
            skip_speed_test: false,
            min_data_threshold: default_min_data_threshold(),
            min_valid_data: default_min_valid_data(),
            min_speed: default_min_speed(),
            enable_ipv6: false,
            top_n: default_top_n(),
            sort_by: default_sort_by(),
            hosts_mode: default_hosts_mode(),
            failure_threshold: default_failure_threshold(),
            success_threshold: default_success_threshold(),
            circuit_timeout: default_circuit_timeout(),
            enable_color: default_enable_color(),
            json_output: false,
            verbose: false,
            debug: false,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    // The duration accessors fall back to the defaults for values `validate` rejects

    pub fn dns_timeout_duration(&self) -> Duration {
        seconds_or(self.dns_timeout, defaults::DEFAULT_DNS_TIMEOUT_SECS)
    }

    pub fn ping_timeout_duration(&self) -> Duration {
        seconds_or(self.ping_timeout, defaults::DEFAULT_PING_TIMEOUT_SECS)
    }

    pub fn ping_interval_duration(&self) -> Duration {
        Duration::try_from_secs_f64(self.ping_interval).unwrap_or(Duration::ZERO)
    }

    pub fn test_duration_value(&self) -> Duration {
        seconds_or(self.test_duration, defaults::DEFAULT_TEST_DURATION_SECS)
    }

    /// Servers the resolver queries: IPv4 list, plus the IPv6 list when enabled
    pub fn all_dns_servers(&self) -> Vec<String> {
        let mut servers = self.dns_servers.clone();
        if self.enable_ipv6 {
            for server in &self.ipv6_dns_servers {
                if !servers.contains(server) {
                    servers.push(server.clone());
                }
            }
        }
        servers
    }

    /// DNS concurrency clamped to CPU capacity and server count, never below 1
    pub fn effective_dns_threads(&self) -> usize {
        clamp_dns_threads(self.dns_threads, num_cpus::get(), self.all_dns_servers().len())
    }

    /// Probe kinds requested for each IP
    pub fn test_types(&self) -> Vec<TestType> {
        let mut types = vec![TestType::Ping];
        if !self.skip_speed_test && (self.enable_download_test || self.enable_upload_test) {
            types.push(TestType::Speed);
        }
        types
    }

    /// Validate the configuration and return the first problem found
    pub fn validate(&self) -> Result<()> {
        let servers = self.all_dns_servers();
        if servers.is_empty() {
            return Err(AppError::config("At least one DNS server is required"));
        }
        for server in &servers {
            if server.trim().is_empty() {
                return Err(AppError::config("DNS server cannot be empty"));
            }
            if IpAddr::from_str(server.trim()).is_err() {
                return Err(AppError::config(format!("Invalid DNS server IP address: {}", server)));
            }
        }

        if self.dns_threads == 0 {
            return Err(AppError::config("DNS threads must be greater than 0"));
        }
        check_seconds("DNS timeout", self.dns_timeout, 60.0)?;

        if self.ping_count == 0 {
            return Err(AppError::config("Ping count must be greater than 0"));
        }
        if self.ping_count > 100 {
            return Err(AppError::config("Ping count cannot exceed 100"));
        }
        check_seconds("Ping timeout", self.ping_timeout, MAX_SECONDS)?;
        if !self.ping_interval.is_finite() || self.ping_interval < 0.0 || self.ping_interval > 60.0 {
            return Err(AppError::config("Ping interval must be between 0 and 60 seconds"));
        }
        if self.packet_size == 0 || self.packet_size > 65_500 {
            return Err(AppError::config("Packet size must be between 1 and 65500 bytes"));
        }

        check_seconds("Test duration", self.test_duration, MAX_SECONDS)?;
        if self.speed_packet_size == 0 {
            return Err(AppError::config("Speed test packet size must be greater than 0"));
        }
        if self.concurrent_connections == 0 {
            return Err(AppError::config("Concurrent connections must be greater than 0"));
        }
        if self.max_workers == 0 {
            return Err(AppError::config("Max workers must be greater than 0"));
        }
        if !self.min_speed.is_finite() || self.min_speed < 0.0 {
            return Err(AppError::config("Minimum speed must be a non-negative number"));
        }
        for endpoint in &self.speed_endpoints {
            url::Url::parse(endpoint)
                .map_err(|e| AppError::config(format!("Invalid speed test endpoint '{}': {}", endpoint, e)))?;
        }

        if self.top_n == 0 {
            return Err(AppError::config("Top N must be greater than 0"));
        }

        if self.failure_threshold == 0 {
            return Err(AppError::config("Failure threshold must be at least 1"));
        }
        if self.success_threshold == 0 {
            return Err(AppError::config("Success threshold must be at least 1"));
        }
        check_seconds("Circuit timeout", self.circuit_timeout, MAX_SECONDS)?;

        Ok(())
    }

    /// Merge environment variables into this configuration
    pub fn merge_from_env(&mut self) -> Result<()> {
        self.merge_from_lookup(|key| std::env::var(key).ok())
    }

    /// Merge values from an arbitrary key lookup, using the environment variable names
    pub fn merge_from_lookup<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(list) = lookup("DOMAINS") {
            self.domains = split_list(&list);
        }
        if let Some(list) = lookup("DNS_SERVERS") {
            self.dns_servers = split_list(&list);
        }
        if let Some(list) = lookup("IPV6_DNS_SERVERS") {
            self.ipv6_dns_servers = split_list(&list);
        }
        if let Some(list) = lookup("SPEED_ENDPOINTS") {
            self.speed_endpoints = split_list(&list);
        }

        set_parsed(&lookup, "DNS_THREADS", &mut self.dns_threads)?;
        set_parsed(&lookup, "DNS_TIMEOUT", &mut self.dns_timeout)?;
        set_parsed(&lookup, "FAST_FAIL", &mut self.fast_fail)?;
        set_parsed(&lookup, "SERVER_SELECTION", &mut self.server_selection)?;
        set_parsed(&lookup, "PING_COUNT", &mut self.ping_count)?;
        set_parsed(&lookup, "PING_TIMEOUT", &mut self.ping_timeout)?;
        set_parsed(&lookup, "PING_INTERVAL", &mut self.ping_interval)?;
        set_parsed(&lookup, "PACKET_SIZE", &mut self.packet_size)?;
        set_parsed(&lookup, "TEST_DURATION", &mut self.test_duration)?;
        set_parsed(&lookup, "SPEED_PACKET_SIZE", &mut self.speed_packet_size)?;
        set_parsed(&lookup, "CONCURRENT_CONNECTIONS", &mut self.concurrent_connections)?;
        set_parsed(&lookup, "MAX_WORKERS", &mut self.max_workers)?;
        set_parsed(&lookup, "SPEED_TEST_METHOD", &mut self.speed_test_method)?;
        set_parsed(&lookup, "SPEED_PORT", &mut self.speed_port)?;
        set_parsed(&lookup, "ENABLE_DOWNLOAD_TEST", &mut self.enable_download_test)?;
        set_parsed(&lookup, "ENABLE_UPLOAD_TEST", &mut self.enable_upload_test)?;
        set_parsed(&lookup, "MIN_DATA_THRESHOLD", &mut self.min_data_threshold)?;
        set_parsed(&lookup, "MIN_VALID_DATA", &mut self.min_valid_data)?;
        set_parsed(&lookup, "MIN_SPEED", &mut self.min_speed)?;
        set_parsed(&lookup, "ENABLE_IPV6", &mut self.enable_ipv6)?;
        set_parsed(&lookup, "TOP_N", &mut self.top_n)?;
        set_parsed(&lookup, "SORT_BY", &mut self.sort_by)?;
        set_parsed(&lookup, "HOSTS_MODE", &mut self.hosts_mode)?;
        set_parsed(&lookup, "SKIP_SPEED_TEST", &mut self.skip_speed_test)?;
        set_parsed(&lookup, "FAILURE_THRESHOLD", &mut self.failure_threshold)?;
        set_parsed(&lookup, "SUCCESS_THRESHOLD", &mut self.success_threshold)?;
        set_parsed(&lookup, "CIRCUIT_TIMEOUT", &mut self.circuit_timeout)?;
        set_parsed(&lookup, "ENABLE_COLOR", &mut self.enable_color)?;

        Ok(())
    }
}

/// `min(requested, cpus * 2, servers)`, at least 1
pub fn clamp_dns_threads(requested: usize, cpus: usize, servers: usize) -> usize {
    requested.min(cpus.saturating_mul(2)).min(servers).max(1)
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn set_parsed<T, F>(lookup: &F, key: &str, target: &mut T) -> Result<()>
where
    T: FromStr,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = lookup(key) {
        *target = raw.trim().parse()
            .map_err(|e| AppError::config(format!("Invalid {} value '{}': {}", key, raw, e)))?;
    }
    Ok(())
}

// Default value functions for serde
fn default_dns_servers() -> Vec<String> {
    defaults::DEFAULT_DNS_SERVERS.iter().map(|s| s.to_string()).collect()
}

fn default_ipv6_dns_servers() -> Vec<String> {
    defaults::DEFAULT_IPV6_DNS_SERVERS.iter().map(|s| s.to_string()).collect()
}

fn default_speed_endpoints() -> Vec<String> {
    defaults::DEFAULT_SPEED_ENDPOINTS.iter().map(|s| s.to_string()).collect()
}

fn default_dns_threads() -> usize { defaults::DEFAULT_DNS_THREADS }
fn default_dns_timeout() -> f64 { defaults::DEFAULT_DNS_TIMEOUT_SECS }
fn default_fast_fail() -> bool { defaults::DEFAULT_FAST_FAIL }
fn default_server_selection() -> ServerSelection { ServerSelection::All }
fn default_ping_count() -> u32 { defaults::DEFAULT_PING_COUNT }
/// Upper bound for every duration setting, matching the env and CLI limits
const MAX_SECONDS: f64 = 300.0;

fn seconds_or(value: f64, fallback: f64) -> Duration {
    match Duration::try_from_secs_f64(value) {
        Ok(duration) if !duration.is_zero() => duration,
        _ => Duration::from_secs_f64(fallback),
    }
}

/// Finite, positive and at most `max` seconds
fn check_seconds(name: &str, value: f64, max: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 && value <= max {
        Ok(())
    } else {
        Err(AppError::config(format!("{} must be between 0 and {} seconds, got {}", name, max, value)))
    }
}

fn default_ping_timeout() -> f64 { defaults::DEFAULT_PING_TIMEOUT_SECS }
fn default_ping_interval() -> f64 { defaults::DEFAULT_PING_INTERVAL_SECS }
fn default_packet_size() -> usize { defaults::DEFAULT_PING_PACKET_SIZE }
fn default_test_duration() -> f64 { defaults::DEFAULT_TEST_DURATION_SECS }
fn default_speed_packet_size() -> usize { defaults::DEFAULT_SPEED_PACKET_SIZE }
fn default_concurrent_connections() -> usize { defaults::DEFAULT_CONCURRENT_CONNECTIONS }
fn default_max_workers() -> usize { defaults::DEFAULT_MAX_WORKERS }
fn default_speed_test_method() -> SpeedTestMethod { SpeedTestMethod::Both }
fn default_speed_port() -> u16 { defaults::DEFAULT_SPEED_PORT }
fn default_true() -> bool { true }
fn default_min_data_threshold() -> u64 { defaults::DEFAULT_MIN_DATA_THRESHOLD }
fn default_min_valid_data() -> u64 { defaults::DEFAULT_MIN_VALID_DATA }
fn default_min_speed() -> f64 { defaults::DEFAULT_MIN_SPEED }
fn default_top_n() -> usize { defaults::DEFAULT_TOP_N }
fn default_sort_by() -> SortBy { SortBy::Latency }
fn default_hosts_mode() -> HostsMode { HostsMode::UniqueIp }
fn default_failure_threshold() -> u32 { defaults::DEFAULT_FAILURE_THRESHOLD }
fn default_success_threshold() -> u32 { defaults::DEFAULT_SUCCESS_THRESHOLD }
fn default_circuit_timeout() -> f64 { defaults::DEFAULT_CIRCUIT_TIMEOUT_SECS }
fn default_enable_color() -> bool { defaults::DEFAULT_ENABLE_COLOR }
