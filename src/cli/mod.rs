//! Command-line interface

use crate::types::{HostsMode, ServerSelection, SortBy, SpeedTestMethod};
use clap::{ArgAction, Parser};
use std::path::PathBuf;

/// Network IP Prober - resolve domains through many DNS servers and rank the answers
#[derive(Parser, Debug, Clone)]
#[command(name = "nip")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Domains to resolve (comma-separated lists are accepted)
    #[arg(value_name = "DOMAIN", action = ArgAction::Append)]
    pub domains: Vec<String>,

    /// DNS servers to query (comma-separated)
    #[arg(long)]
    pub dns_servers: Option<String>,

    /// Concurrent DNS queries
    #[arg(long)]
    pub dns_threads: Option<usize>,

    /// Baseline DNS timeout in seconds
    #[arg(long, value_parser = parse_seconds)]
    pub dns_timeout: Option<f64>,

    /// Wait for every server instead of stopping after a few answers
    #[arg(long)]
    pub exhaustive: bool,

    /// Server selection strategy (all, scored, grouped)
    #[arg(long)]
    pub selection: Option<ServerSelection>,

    /// Qualify DNS servers before resolving and keep only the reliable ones
    #[arg(long)]
    pub qualify: bool,

    /// Echo requests per IP
    #[arg(short = 'c', long)]
    pub ping_count: Option<u32>,

    /// Per-echo timeout in seconds
    #[arg(long, value_parser = parse_seconds)]
    pub ping_timeout: Option<f64>,

    /// ICMP payload size in bytes
    #[arg(long)]
    pub packet_size: Option<usize>,

    /// Throughput round length in seconds
    #[arg(long, value_parser = parse_seconds)]
    pub duration: Option<f64>,

    /// Parallel connections per throughput round
    #[arg(long)]
    pub connections: Option<usize>,

    /// Concurrent per-IP tests
    #[arg(short = 'w', long)]
    pub max_workers: Option<usize>,

    /// Download source (direct, server, both)
    #[arg(long)]
    pub speed_method: Option<SpeedTestMethod>,

    /// Ranking order (latency, speed, balance)
    #[arg(short = 's', long)]
    pub sort_by: Option<SortBy>,

    /// How many ranked IPs to keep
    #[arg(short = 'n', long)]
    pub top: Option<usize>,

    /// Hosts line generation (unique-ip, best-per-domain)
    #[arg(long)]
    pub hosts_mode: Option<HostsMode>,

    /// Skip throughput tests
    #[arg(long)]
    pub no_speed: bool,

    /// Also measure upload throughput
    #[arg(long)]
    pub upload: bool,

    /// Include IPv6 DNS servers and addresses
    #[arg(long)]
    pub ipv6: bool,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,

    /// Force colored output
    #[arg(long)]
    pub color: bool,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,

    /// Enable verbose output
    #[arg(long)]
    pub verbose: bool,

    /// Enable debug output
    #[arg(long)]
    pub debug: bool,

    /// Read settings from this file instead of ./.env
    #[arg(long, value_name = "PATH")]
    pub env_file: Option<PathBuf>,

    /// List supported environment variables and exit
    #[arg(long)]
    pub env_help: bool,

    /// Write an example .env file to PATH and exit
    #[arg(long, value_name = "PATH")]
    pub write_example_env: Option<PathBuf>,
}

impl Cli {
    /// Check for flag combinations clap cannot express
    pub fn validate(&self) -> Result<(), String> {
        if self.color && self.no_color {
            return Err("Cannot specify both --color and --no-color".to_string());
        }
        if self.no_speed && self.upload {
            return Err("--upload has no effect together with --no-speed".to_string());
        }
        if self.json && self.verbose {
            return Err("--json cannot be combined with --verbose".to_string());
        }
        Ok(())
    }

    /// Whether the run exits after printing help text or writing a file
    pub fn is_informational(&self) -> bool {
        self.env_help || self.write_example_env.is_some()
    }

    /// Positional domains with comma-separated entries split out
    pub fn domain_list(&self) -> Vec<String> {
        self.domains
            .iter()
            .flat_map(|d| d.split(','))
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty())
            .collect()
    }

    pub fn use_colors(&self) -> bool {
        if self.color {
            true
        } else if self.no_color || self.json {
            false
        } else {
            supports_color()
        }
    }

    pub fn get_config_summary(&self) -> String {
        let mut summary = String::new();
        summary.push_str("Command-line Summary:\n");
        summary.push_str(&format!("  Domains: {}\n", self.domain_list().join(", ")));
        if let Some(ref servers) = self.dns_servers {
            summary.push_str(&format!("  DNS servers: {}\n", servers));
        }
        summary.push_str(&format!("  Fast fail: {}\n", !self.exhaustive));
        summary.push_str(&format!("  Speed tests: {}\n", !self.no_speed));
        summary.push_str(&format!("  IPv6: {}\n", self.ipv6));
        summary.push_str(&format!("  Colored output: {}\n", self.use_colors()));
        summary.push_str(&format!("  Verbose mode: {}\n", self.verbose));
        summary.push_str(&format!("  Debug mode: {}\n", self.debug));
        summary
    }
}

/// Parse a positive number of seconds, at most 300
fn parse_seconds(s: &str) -> Result<f64, String> {
    if s.starts_with('+') {
        return Err(format!("Invalid duration: {}", s));
    }
    let secs: f64 = s.parse().map_err(|_| format!("Invalid duration: {}", s))?;
    if !secs.is_finite() || secs <= 0.0 {
        Err("Duration must be greater than 0".to_string())
    } else if secs > 300.0 {
        Err("Duration cannot exceed 300 seconds".to_string())
    } else {
        Ok(secs)
    }
}

/// Check if the terminal supports color output
fn supports_color() -> bool {
    if let Ok(term) = std::env::var("TERM") {
        if term == "dumb" {
            return false;
        }
    }
    if std::env::var("NO_COLOR").is_ok() {
        return false;
    }
    if std::env::var("FORCE_COLOR").is_ok() {
        return true;
    }

    #[cfg(target_os = "windows")]
    {
        if std::env::var("ANSICON").is_ok() || std::env::var("ConEmuANSI").is_ok() {
            return true;
        }
    }

    cfg!(unix)
}
