//! Network IP Prober
//!
//! Resolves domains through many DNS servers in parallel, deduplicates the
//! answers, probes every resulting IP for latency and throughput, and ranks
//! the best IPs for each domain.

pub mod app;
pub mod cli;
pub mod config;
pub mod dns;
pub mod error;
pub mod executor;
pub mod logging;
pub mod models;
pub mod output;
pub mod probe;
pub mod types;

// Re-export commonly used types
pub use error::{AppError, Result};
pub use models::{Config, DomainResolution, NetworkTestRecord, PingResult, SpeedResult};
pub use dns::{CircuitBreaker, CircuitState, DnsResolver, ParallelResolver, SmartDnsPool};
pub use executor::NetworkTestManager;

/// Application version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");
pub const PKG_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Default configuration values
pub mod defaults {
    pub const DEFAULT_DNS_SERVERS: &[&str] = &[
        "8.8.8.8",         // Google DNS
        "1.1.1.1",         // Cloudflare DNS
        "9.9.9.9",         // Quad9 DNS
        "208.67.222.222",  // OpenDNS
        "4.2.2.1",         // Level3 DNS
    ];
    pub const DEFAULT_IPV6_DNS_SERVERS: &[&str] = &[
        "2001:4860:4860::8888",
        "2001:4860:4860::8844",
        "2606:4700:4700::1111",
        "2606:4700:4700::1001",
    ];

    pub const DEFAULT_DNS_THREADS: usize = 30;
    pub const DEFAULT_DNS_TIMEOUT_SECS: f64 = 2.0;
    pub const DEFAULT_FAST_FAIL: bool = true;
    /// Fast-fail collection stops after this many successful servers.
    pub const FAST_FAIL_SUCCESS_TARGET: usize = 5;

    pub const DEFAULT_PING_COUNT: u32 = 5;
    pub const DEFAULT_PING_TIMEOUT_SECS: f64 = 1.5;
    pub const DEFAULT_PING_INTERVAL_SECS: f64 = 0.2;
    pub const DEFAULT_PING_PACKET_SIZE: usize = 64;

    pub const DEFAULT_TEST_DURATION_SECS: f64 = 8.0;
    pub const DEFAULT_SPEED_PACKET_SIZE: usize = 1024;
    pub const DEFAULT_CONCURRENT_CONNECTIONS: usize = 6;
    pub const DEFAULT_MIN_DATA_THRESHOLD: u64 = 1_048_576;
    pub const DEFAULT_MIN_VALID_DATA: u64 = 102_400;
    pub const DEFAULT_MIN_SPEED: f64 = 1.0;
    /// Every measured or estimated speed is capped at this many Mbps.
    pub const MAX_SPEED_MBPS: f64 = 700.0;

    /// Well-known bulk download endpoints for the server speed path
    pub const DEFAULT_SPEED_ENDPOINTS: &[&str] = &[
        "http://speed.cloudflare.com/__down?bytes=20971520",
        "https://speed.cloudflare.com/__down?bytes=20971520",
        "http://httpbin.org/stream/20",
        "http://ipv6.speed.cloudflare.com/__down?bytes=20971520",
        "http://download.thinkbroadband.com/5MB.zip",
        "http://ipv4.download.thinkbroadband.com/5MB.zip",
        "http://ipv6.download.thinkbroadband.com/5MB.zip",
    ];
    pub const DEFAULT_SPEED_PORT: u16 = 80;

    pub const DEFAULT_MAX_WORKERS: usize = 50;
    pub const DEFAULT_TOP_N: usize = 10;

    pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
    pub const DEFAULT_SUCCESS_THRESHOLD: u32 = 3;
    pub const DEFAULT_CIRCUIT_TIMEOUT_SECS: f64 = 30.0;
    pub const DEFAULT_POOL_MIN_SERVERS: usize = 8;
    pub const DEFAULT_POOL_MAX_SERVERS: usize = 20;

    pub const DEFAULT_ENABLE_COLOR: bool = true;
}
