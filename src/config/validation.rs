//! Configuration validation utilities and rules

use crate::{
    error::Result,
    models::Config,
    types::SpeedTestMethod,
};
use colored::Colorize;
use std::net::IpAddr;

/// Upper bound on per-IP workers before the run is flagged as aggressive
const HIGH_WORKER_COUNT: usize = 200;

/// Throughput round length above which a run gets noticeably slow
const LONG_TEST_DURATION_SECS: f64 = 30.0;

/// Configuration validator with advisory rules on top of `Config::validate`
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate configuration and collect non-fatal warnings
    pub fn validate_comprehensive(config: &Config) -> Result<Vec<ValidationWarning>> {
        let mut warnings = Vec::new();

        config.validate()?;

        warnings.extend(Self::validate_domains(&config.domains));
        warnings.extend(Self::validate_dns_servers(config));
        warnings.extend(Self::validate_probe_settings(config));
        warnings.extend(Self::validate_speed_settings(config));

        Ok(warnings)
    }

    fn validate_domains(domains: &[String]) -> Vec<ValidationWarning> {
        let mut warnings = Vec::new();

        if domains.is_empty() {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Warning,
                "No domains configured; nothing will be resolved".to_string(),
            ));
        }

        for domain in domains {
            if domain.parse::<IpAddr>().is_ok() {
                warnings.push(ValidationWarning::new(
                    ValidationLevel::Info,
                    format!("'{}' is an IP address and will be probed without resolution", domain),
                ));
            } else if domain.contains("://") || domain.contains('/') {
                warnings.push(ValidationWarning::new(
                    ValidationLevel::Warning,
                    format!("'{}' looks like a URL; only the host part is resolved", domain),
                ));
            }
        }

        warnings
    }

    fn validate_dns_servers(config: &Config) -> Vec<ValidationWarning> {
        let mut warnings = Vec::new();
        let servers = config.all_dns_servers();

        for server in &servers {
            if let Ok(ip) = server.parse::<IpAddr>() {
                let local = match ip {
                    IpAddr::V4(v4) => v4.is_private() || v4.is_loopback(),
                    IpAddr::V6(v6) => v6.is_loopback(),
                };
                if local {
                    warnings.push(ValidationWarning::new(
                        ValidationLevel::Info,
                        format!("DNS server {} is on a private or loopback network", ip),
                    ));
                }
            }
        }

        if config.dns_threads > servers.len() {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Info,
                format!(
                    "DNS threads ({}) exceed the number of servers ({}); effective concurrency is {}",
                    config.dns_threads,
                    servers.len(),
                    config.effective_dns_threads()
                ),
            ));
        }

        if servers.len() < 2 {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Warning,
                "A single DNS server cannot detect poisoned answers".to_string(),
            ));
        }

        warnings
    }

    fn validate_probe_settings(config: &Config) -> Vec<ValidationWarning> {
        let mut warnings = Vec::new();

        if config.ping_count < 3 {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Warning,
                format!(
                    "Ping count of {} may not provide reliable statistics (recommended: >= 3)",
                    config.ping_count
                ),
            ));
        }

        if config.max_workers > HIGH_WORKER_COUNT {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Warning,
                format!(
                    "{} concurrent workers may saturate the local network and skew results",
                    config.max_workers
                ),
            ));
        }

        warnings
    }

    fn validate_speed_settings(config: &Config) -> Vec<ValidationWarning> {
        let mut warnings = Vec::new();

        if config.skip_speed_test {
            return warnings;
        }

        if config.test_duration > LONG_TEST_DURATION_SECS {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Info,
                format!(
                    "Throughput rounds of {}s per IP will make the run slow",
                    config.test_duration
                ),
            ));
        }

        if config.enable_upload_test && config.speed_test_method == SpeedTestMethod::Server {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Info,
                "Upload tests always target the probed IP directly, not the server endpoints".to_string(),
            ));
        }

        if config.speed_test_method != SpeedTestMethod::Direct && config.speed_endpoints.is_empty() {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Warning,
                "No speed endpoints configured; server downloads will fall back to estimates".to_string(),
            ));
        }

        warnings
    }
}

/// Validation warning levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationLevel {
    Info,
    Warning,
}

impl ValidationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warning => "WARNING",
        }
    }
}

/// Configuration validation warning
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub level: ValidationLevel,
    pub message: String,
}

impl ValidationWarning {
    pub fn new(level: ValidationLevel, message: String) -> Self {
        Self { level, message }
    }

    /// Format warning for display
    pub fn format(&self, use_color: bool) -> String {
        let tag = format!("[{}]", self.level.as_str());
        if !use_color {
            return format!("{} {}", tag, self.message);
        }
        let tag = match self.level {
            ValidationLevel::Info => tag.blue(),
            ValidationLevel::Warning => tag.yellow().bold(),
        };
        format!("{} {}", tag, self.message)
    }
}

/// Convenience function for comprehensive configuration validation
pub fn validate_config(config: &Config) -> Result<Vec<ValidationWarning>> {
    ConfigValidator::validate_comprehensive(config)
}
