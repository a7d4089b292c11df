//! Environment variable handling and .env file management

use crate::error::{AppError, ErrorContext, Result};
use crate::types::{HostsMode, ServerSelection, SortBy, SpeedTestMethod};
use std::net::IpAddr;
use std::path::Path;

/// Environment variable configuration manager
pub struct EnvManager;

impl EnvManager {
    /// Load `.env` from the working directory if it exists
    pub fn load_env_file(debug: bool) -> Result<()> {
        Self::load_env_file_from(Path::new(".env"), debug)
    }

    /// Load an env file if it exists; variables already set are kept
    pub fn load_env_file_from(path: &Path, debug: bool) -> Result<()> {
        if path.exists() {
            dotenv::from_path(path).with_context(|| format!("Failed to load {}", path.display()))?;
            if debug {
                eprintln!("Loaded configuration from {}", path.display());
            }
        } else if debug {
            eprintln!("No {} found, using defaults and CLI arguments", path.display());
        }
        Ok(())
    }

    /// Create example .env file content
    pub fn create_example_env_content() -> String {
        let mut content = String::from(
            "# Network IP Prober Configuration\n\
             #\n\
             # Values here are defaults for every run and can be overridden by\n\
             # environment variables or command-line arguments.\n\n",
        );
        for (var, description, example) in Self::get_supported_env_vars() {
            content.push_str(&format!("# {}\n# {}={}\n\n", description, var, example));
        }
        content
    }

    /// Save example .env file to disk
    pub fn save_example_env_file(path: &Path) -> Result<()> {
        std::fs::write(path, Self::create_example_env_content())
            .with_context(|| format!("Failed to write example file {}", path.display()))
    }

    /// Validate environment variable format before parsing
    pub fn validate_env_var(key: &str, value: &str) -> Result<()> {
        match key {
            "DNS_SERVERS" | "IPV6_DNS_SERVERS" => {
                for server in split(value) {
                    server
                        .parse::<IpAddr>()
                        .map_err(|e| AppError::config(format!("Invalid {} entry '{}': {}", key, server, e)))?;
                }
            }
            "SPEED_ENDPOINTS" => {
                for endpoint in split(value) {
                    let parsed = url::Url::parse(endpoint)
                        .map_err(|e| AppError::config(format!("Invalid SPEED_ENDPOINTS entry '{}': {}", endpoint, e)))?;
                    if !matches!(parsed.scheme(), "http" | "https") {
                        return Err(AppError::config(format!("Speed endpoint must use HTTP(S): {}", endpoint)));
                    }
                }
            }
            "DOMAINS" => {
                for domain in split(value) {
                    if domain.contains(char::is_whitespace) {
                        return Err(AppError::config(format!("Invalid DOMAINS entry '{}'", domain)));
                    }
                }
            }
            "DNS_THREADS" | "MAX_WORKERS" | "CONCURRENT_CONNECTIONS" | "TOP_N" => {
                let count = parse_number::<usize>(key, value)?;
                if count == 0 {
                    return Err(AppError::config(format!("{} must be greater than 0", key)));
                }
            }
            "PING_COUNT" => {
                let count = parse_number::<u32>(key, value)?;
                if count == 0 || count > 100 {
                    return Err(AppError::config(format!("PING_COUNT must be between 1 and 100, got: {}", count)));
                }
            }
            "DNS_TIMEOUT" | "PING_TIMEOUT" | "TEST_DURATION" | "CIRCUIT_TIMEOUT" => {
                let secs = parse_number::<f64>(key, value)?;
                if !(secs > 0.0) || secs > 300.0 {
                    return Err(AppError::config(format!("{} must be between 0 and 300 seconds, got: {}", key, secs)));
                }
            }
            "SPEED_TEST_METHOD" => {
                value.parse::<SpeedTestMethod>().map_err(|e| AppError::config(e.to_string()))?;
            }
            "SORT_BY" => {
                value.parse::<SortBy>().map_err(|e| AppError::config(e.to_string()))?;
            }
            "SERVER_SELECTION" => {
                value.parse::<ServerSelection>().map_err(|e| AppError::config(e.to_string()))?;
            }
            "HOSTS_MODE" => {
                value.parse::<HostsMode>().map_err(|e| AppError::config(e.to_string()))?;
            }
            "FAST_FAIL" | "ENABLE_IPV6" | "ENABLE_COLOR" | "ENABLE_DOWNLOAD_TEST" | "ENABLE_UPLOAD_TEST"
            | "SKIP_SPEED_TEST" => {
                value
                    .trim()
                    .parse::<bool>()
                    .map_err(|e| AppError::config(format!("Invalid {} value '{}': {}", key, value, e)))?;
            }
            _ => {}
        }
        Ok(())
    }

    /// Supported environment variables as `(name, description, example)`
    pub fn get_supported_env_vars() -> Vec<(&'static str, &'static str, &'static str)> {
        vec![
            ("DOMAINS", "Comma-separated domains to resolve", "github.com,example.org"),
            ("DNS_SERVERS", "Comma-separated IPv4 DNS servers", "8.8.8.8,1.1.1.1,9.9.9.9"),
            ("IPV6_DNS_SERVERS", "Comma-separated IPv6 DNS servers", "2606:4700:4700::1111"),
            ("DNS_THREADS", "Concurrent DNS queries", "30"),
            ("DNS_TIMEOUT", "Baseline DNS timeout in seconds", "2.0"),
            ("FAST_FAIL", "Stop after a handful of successful servers", "true"),
            ("SERVER_SELECTION", "all, scored or grouped", "all"),
            ("PING_COUNT", "Echo requests per IP (1-100)", "5"),
            ("PING_TIMEOUT", "Per-echo timeout in seconds", "1.5"),
            ("TEST_DURATION", "Throughput round length in seconds", "8"),
            ("CONCURRENT_CONNECTIONS", "Parallel connections per round", "6"),
            ("MAX_WORKERS", "Concurrent per-IP tests", "50"),
            ("SPEED_TEST_METHOD", "direct, server or both", "both"),
            ("SPEED_ENDPOINTS", "Comma-separated bulk download URLs", "http://speed.cloudflare.com/__down?bytes=20971520"),
            ("ENABLE_UPLOAD_TEST", "Measure upload throughput", "false"),
            ("SKIP_SPEED_TEST", "Skip throughput tests", "false"),
            ("ENABLE_IPV6", "Include IPv6 servers and addresses", "false"),
            ("TOP_N", "Ranked IPs to keep", "10"),
            ("SORT_BY", "latency, speed or balance", "latency"),
            ("HOSTS_MODE", "unique_ip or best_per_domain", "unique_ip"),
            ("CIRCUIT_TIMEOUT", "Seconds an open circuit waits", "30"),
            ("ENABLE_COLOR", "Enable colored output", "true"),
        ]
    }

    /// Display environment variable help
    pub fn display_env_help() -> String {
        let mut help = String::new();
        help.push_str("Supported Environment Variables:\n\n");

        for (var, description, example) in Self::get_supported_env_vars() {
            help.push_str(&format!("  {:<24} {}\n", var, description));
            help.push_str(&format!("  {:<24} Example: {}\n\n", "", example));
        }

        help.push_str("Configuration Priority (highest to lowest):\n");
        help.push_str("  1. Command-line arguments\n");
        help.push_str("  2. Environment variables\n");
        help.push_str("  3. .env file values\n");
        help.push_str("  4. Default values\n");
        help
    }

    /// Validate all currently set environment variables
    pub fn validate_current_env() -> Vec<String> {
        Self::get_supported_env_vars()
            .into_iter()
            .filter_map(|(var, _, _)| {
                let value = std::env::var(var).ok()?;
                Self::validate_env_var(var, &value).err().map(|e| format!("Warning: {}", e))
            })
            .collect()
    }

    /// Validate every assignment in an env file, `None` when it does not exist
    pub fn check_env_file(path: &Path) -> Result<Option<Vec<String>>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::config(format!("Failed to read {}: {}", path.display(), e)))?;

        let mut warnings = Vec::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                if let Err(e) = Self::validate_env_var(key.trim(), value.trim()) {
                    warnings.push(format!("Line '{}': {}", line, e));
                }
            }
        }
        Ok(Some(warnings))
    }
}

fn split(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|s| !s.is_empty())
}

fn parse_number<T>(key: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| AppError::config(format!("Invalid {} value '{}': {}", key, value, e)))
}
