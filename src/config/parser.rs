//! Configuration parsing from CLI arguments and environment variables

use crate::{
    cli::Cli,
    config::env::EnvManager,
    error::{AppError, Result},
    models::Config,
};
use std::path::Path;

/// Configuration parser that layers defaults, `.env`, environment and CLI
pub struct ConfigParser {
    cli: Cli,
}

impl ConfigParser {
    /// Create a new configuration parser with CLI arguments
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Parse and build the complete configuration
    pub fn parse(&self) -> Result<Config> {
        let mut config = Config::default();

        self.load_env_file()?;
        config.merge_from_env()?;
        self.apply_cli_overrides(&mut config)?;
        config.validate()?;

        Ok(config)
    }

    /// Parse without touching the process environment; used by tests and embedders
    pub fn parse_with_lookup<F>(&self, lookup: F) -> Result<Config>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();
        config.merge_from_lookup(lookup)?;
        self.apply_cli_overrides(&mut config)?;
        config.validate()?;
        Ok(config)
    }

    fn load_env_file(&self) -> Result<()> {
        match &self.cli.env_file {
            Some(path) if !path.exists() => Err(AppError::config(format!(
                "Environment file not found: {}",
                path.display()
            ))),
            Some(path) => EnvManager::load_env_file_from(path, self.cli.debug),
            None => EnvManager::load_env_file_from(Path::new(".env"), self.cli.debug),
        }
    }

    /// Apply CLI argument overrides to configuration
    fn apply_cli_overrides(&self, config: &mut Config) -> Result<()> {
        let cli = &self.cli;

        let domains = cli.domain_list();
        if !domains.is_empty() {
            config.domains = domains;
        }

        if let Some(ref servers) = cli.dns_servers {
            config.dns_servers = servers
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(threads) = cli.dns_threads {
            config.dns_threads = threads;
        }
        if let Some(timeout) = cli.dns_timeout {
            config.dns_timeout = timeout;
        }
        if cli.exhaustive {
            config.fast_fail = false;
        }
        if let Some(selection) = cli.selection {
            config.server_selection = selection;
        }

        if let Some(count) = cli.ping_count {
            config.ping_count = count;
        }
        if let Some(timeout) = cli.ping_timeout {
            config.ping_timeout = timeout;
        }
        if let Some(size) = cli.packet_size {
            config.packet_size = size;
        }

        if let Some(duration) = cli.duration {
            config.test_duration = duration;
        }
        if let Some(connections) = cli.connections {
            config.concurrent_connections = connections;
        }
        if let Some(workers) = cli.max_workers {
            config.max_workers = workers;
        }
        if let Some(method) = cli.speed_method {
            config.speed_test_method = method;
        }
        if cli.no_speed {
            config.skip_speed_test = true;
        }
        if cli.upload {
            config.enable_upload_test = true;
        }

        if let Some(sort_by) = cli.sort_by {
            config.sort_by = sort_by;
        }
        if let Some(top) = cli.top {
            config.top_n = top;
        }
        if let Some(mode) = cli.hosts_mode {
            config.hosts_mode = mode;
        }

        if cli.ipv6 {
            config.enable_ipv6 = true;
        }
        if cli.no_color || cli.json {
            config.enable_color = false;
        } else if cli.color {
            config.enable_color = true;
        }

        // CLI-only flags
        config.json_output = cli.json;
        config.verbose = cli.verbose;
        config.debug = cli.debug;

        if config.debug {
            eprintln!("Applied CLI overrides to configuration");
            eprintln!(
                "Final config: domains={}, dns_servers={}, dns_threads={}, max_workers={}",
                config.domains.len(),
                config.all_dns_servers().len(),
                config.dns_threads,
                config.max_workers
            );
        }

        Ok(())
    }
}

/// Convenience function to load complete configuration from CLI arguments
pub fn load_config(cli: Cli) -> Result<Config> {
    ConfigParser::new(cli).parse()
}

/// Display configuration summary for debug purposes
pub fn display_config_summary(config: &Config) -> String {
    let mut summary = Vec::new();

    summary.push(format!("Domains: {}", config.domains.join(", ")));
    summary.push(format!("DNS Servers: {}", config.all_dns_servers().join(", ")));
    summary.push(format!(
        "DNS Threads: {} (effective {})",
        config.dns_threads,
        config.effective_dns_threads()
    ));
    summary.push(format!("DNS Timeout: {}s", config.dns_timeout));
    summary.push(format!("Fast Fail: {}", config.fast_fail));
    summary.push(format!(
        "Ping: count={}, timeout={}s, size={}",
        config.ping_count, config.ping_timeout, config.packet_size
    ));
    summary.push(format!(
        "Speed Test: {} ({}s, {} connections)",
        if config.skip_speed_test { "skipped".to_string() } else { config.speed_test_method.to_string() },
        config.test_duration,
        config.concurrent_connections
    ));
    summary.push(format!("Max Workers: {}", config.max_workers));
    summary.push(format!("Ranking: {} (top {})", config.sort_by, config.top_n));
    summary.push(format!("IPv6: {}", config.enable_ipv6));
    summary.push(format!("Color Output: {}", config.enable_color));
    summary.push(format!("Verbose: {}", config.verbose));
    summary.push(format!("Debug: {}", config.debug));

    summary.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SortBy, SpeedTestMethod};
    use clap::Parser;
    use std::collections::HashMap;
    use tempfile::NamedTempFile;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::parse_from([
            "nip",
            "github.com",
            "-c", "3",
            "--dns-servers", "1.1.1.1, 9.9.9.9",
            "--exhaustive",
            "--no-speed",
            "--no-color",
            "--verbose",
        ]);
        let config = ConfigParser::new(cli).parse_with_lookup(no_env).unwrap();

        assert_eq!(config.domains, vec!["github.com"]);
        assert_eq!(config.ping_count, 3);
        assert_eq!(config.dns_servers, vec!["1.1.1.1", "9.9.9.9"]);
        assert!(!config.fast_fail);
        assert!(config.skip_speed_test);
        assert!(!config.enable_color);
        assert!(config.verbose);
    }

    #[test]
    fn test_cli_overrides_env_values() {
        let env: HashMap<&str, &str> = [("PING_COUNT", "8"), ("SORT_BY", "speed"), ("MAX_WORKERS", "12")]
            .into_iter()
            .collect();
        let cli = Cli::parse_from(["nip", "a.com", "-c", "2"]);
        let config = ConfigParser::new(cli)
            .parse_with_lookup(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.ping_count, 2);
        assert_eq!(config.sort_by, SortBy::Speed);
        assert_eq!(config.max_workers, 12);
    }

    #[test]
    fn test_json_turns_color_off() {
        let cli = Cli::parse_from(["nip", "a.com", "--json", "--speed-method", "server"]);
        let config = ConfigParser::new(cli).parse_with_lookup(no_env).unwrap();
        assert!(config.json_output);
        assert!(!config.enable_color);
        assert_eq!(config.speed_test_method, SpeedTestMethod::Server);
    }

    #[test]
    fn test_invalid_override_fails_validation() {
        let cli = Cli::parse_from(["nip", "a.com", "--dns-threads", "0"]);
        let err = ConfigParser::new(cli).parse_with_lookup(no_env).unwrap_err();
        assert_eq!(err.category(), "CONFIG");

        let cli = Cli::parse_from(["nip", "a.com", "--dns-servers", "dns.google"]);
        assert!(ConfigParser::new(cli).parse_with_lookup(no_env).is_err());
    }

    #[test]
    fn test_missing_explicit_env_file() {
        let cli = Cli::parse_from(["nip", "a.com", "--env-file", "/nonexistent/prober.env"]);
        let err = ConfigParser::new(cli).parse().unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_explicit_env_file_is_loaded() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "NIP_PARSER_TEST_MARKER=loaded\n").unwrap();

        let cli = Cli::parse_from(["nip", "a.com", "--env-file", file.path().to_str().unwrap()]);
        ConfigParser::new(cli).parse().unwrap();
        assert_eq!(std::env::var("NIP_PARSER_TEST_MARKER").as_deref(), Ok("loaded"));
    }

    #[test]
    fn test_config_summary() {
        let config = Config {
            domains: vec!["github.com".to_string()],
            ..Default::default()
        };
        let summary = display_config_summary(&config);

        assert!(summary.contains("Domains: github.com"));
        assert!(summary.contains("DNS Servers: 8.8.8.8"));
        assert!(summary.contains("Fast Fail: true"));
        assert!(summary.contains("Ranking: latency (top 10)"));
    }
}
