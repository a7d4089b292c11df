//! Additional comprehensive tests for configuration parsing and validation

use super::{ConfigParser, EnvManager};
use crate::{
    cli::Cli,
    models::{config::clamp_dns_threads, Config},
    types::{HostsMode, ServerSelection, SortBy},
};
use clap::Parser;
use proptest::prelude::*;
use std::collections::HashMap;

fn lookup_from<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
    let map: HashMap<&str, &str> = pairs.iter().copied().collect();
    move |key| map.get(key).map(|v| v.to_string())
}

/// Test edge cases in configuration values
mod config_edge_cases {
    use super::*;

    #[test]
    fn test_config_boundary_ping_count() {
        let mut config = Config::default();
        config.ping_count = 100;
        assert!(config.validate().is_ok());

        config.ping_count = 101;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_non_finite_durations_rejected() {
        let cases: Vec<(&str, Box<dyn Fn(&mut Config, f64)>)> = vec![
            ("test_duration", Box::new(|c, v| c.test_duration = v)),
            ("ping_timeout", Box::new(|c, v| c.ping_timeout = v)),
            ("ping_interval", Box::new(|c, v| c.ping_interval = v)),
            ("dns_timeout", Box::new(|c, v| c.dns_timeout = v)),
            ("circuit_timeout", Box::new(|c, v| c.circuit_timeout = v)),
            ("min_speed", Box::new(|c, v| c.min_speed = v)),
        ];

        for (name, set) in &cases {
            for value in [f64::INFINITY, f64::NAN, 1e20] {
                let mut config = Config::default();
                set(&mut config, value);
                assert!(config.validate().is_err(), "{} = {} should be rejected", name, value);
            }
        }
    }

    #[test]
    fn test_duration_accessors_never_panic() {
        let mut config = Config::default();
        config.test_duration = f64::INFINITY;
        config.ping_timeout = f64::NAN;
        config.ping_interval = -1.0;
        config.dns_timeout = 1e30;

        assert_eq!(config.test_duration_value().as_secs_f64(), 8.0);
        assert_eq!(config.ping_timeout_duration().as_secs_f64(), 1.5);
        assert!(config.ping_interval_duration().is_zero());
        assert_eq!(config.dns_timeout_duration().as_secs_f64(), 2.0);
    }

    #[test]
    fn test_config_with_mixed_ip_types() {
        let mut config = Config::default();
        config.dns_servers = vec![
            "8.8.8.8".to_string(),
            "2001:4860:4860::8888".to_string(),
            "1.1.1.1".to_string(),
        ];
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_ipv6_servers_only_when_enabled() {
        let mut config = Config::default();
        let v4 = config.dns_servers.len();
        assert_eq!(config.all_dns_servers().len(), v4);

        config.enable_ipv6 = true;
        assert!(config.all_dns_servers().len() > v4);
        assert!(config.all_dns_servers().iter().any(|s| s.contains(':')));
    }

    #[test]
    fn test_ipv6_servers_deduplicated() {
        let mut config = Config::default();
        config.enable_ipv6 = true;
        config.dns_servers = vec!["2606:4700:4700::1111".to_string()];
        config.ipv6_dns_servers = vec!["2606:4700:4700::1111".to_string()];
        assert_eq!(config.all_dns_servers(), vec!["2606:4700:4700::1111"]);
    }

    #[test]
    fn test_test_types_follow_speed_switches() {
        let mut config = Config::default();
        assert_eq!(config.test_types().len(), 2);

        config.skip_speed_test = true;
        assert_eq!(config.test_types().len(), 1);

        config.skip_speed_test = false;
        config.enable_download_test = false;
        config.enable_upload_test = false;
        assert_eq!(config.test_types().len(), 1);
    }

    #[test]
    fn test_invalid_speed_endpoint_rejected() {
        let mut config = Config::default();
        config.speed_endpoints = vec!["not a url".to_string()];
        assert!(config.validate().is_err());
    }
}

/// Test environment variable parsing edge cases
mod env_parsing_tests {
    use super::*;

    #[test]
    fn test_env_var_server_lists() {
        assert!(EnvManager::validate_env_var("DNS_SERVERS", "8.8.8.8, 1.1.1.1").is_ok());
        assert!(EnvManager::validate_env_var("IPV6_DNS_SERVERS", "2620:fe::fe").is_ok());
        assert!(EnvManager::validate_env_var("DNS_SERVERS", "8.8.8.8,dns.google").is_err());
    }

    #[test]
    fn test_env_var_boundary_values() {
        assert!(EnvManager::validate_env_var("PING_COUNT", "1").is_ok());
        assert!(EnvManager::validate_env_var("PING_COUNT", "100").is_ok());
        assert!(EnvManager::validate_env_var("PING_COUNT", "0").is_err());
        assert!(EnvManager::validate_env_var("PING_COUNT", "101").is_err());
        assert!(EnvManager::validate_env_var("DNS_TIMEOUT", "0").is_err());
        assert!(EnvManager::validate_env_var("DNS_TIMEOUT", "0.5").is_ok());
        assert!(EnvManager::validate_env_var("MAX_WORKERS", "0").is_err());
    }

    #[test]
    fn test_env_var_enums_and_booleans() {
        assert!(EnvManager::validate_env_var("SORT_BY", "Balance").is_ok());
        assert!(EnvManager::validate_env_var("SORT_BY", "fastest").is_err());
        assert!(EnvManager::validate_env_var("HOSTS_MODE", "best-per-domain").is_ok());
        assert!(EnvManager::validate_env_var("FAST_FAIL", "false").is_ok());
        assert!(EnvManager::validate_env_var("FAST_FAIL", "yes").is_err());
    }

    #[test]
    fn test_speed_endpoint_scheme() {
        assert!(EnvManager::validate_env_var("SPEED_ENDPOINTS", "https://example.com/100mb.bin").is_ok());
        assert!(EnvManager::validate_env_var("SPEED_ENDPOINTS", "ftp://example.com/file").is_err());
    }

    #[test]
    fn test_unknown_keys_are_ignored() {
        assert!(EnvManager::validate_env_var("SOMETHING_ELSE", "whatever").is_ok());
    }

    #[test]
    fn test_lookup_merge_errors_name_the_key() {
        let mut config = Config::default();
        let err = config
            .merge_from_lookup(lookup_from(&[("DNS_THREADS", "many")]))
            .unwrap_err();
        assert!(err.to_string().contains("DNS_THREADS"));
    }

    #[test]
    fn test_lookup_merge_lists_and_enums() {
        let mut config = Config::default();
        config
            .merge_from_lookup(lookup_from(&[
                ("DOMAINS", "a.com, b.com,,"),
                ("SERVER_SELECTION", "grouped"),
                ("HOSTS_MODE", "best_per_domain"),
                ("FAST_FAIL", "false"),
            ]))
            .unwrap();

        assert_eq!(config.domains, vec!["a.com", "b.com"]);
        assert_eq!(config.server_selection, ServerSelection::Grouped);
        assert_eq!(config.hosts_mode, HostsMode::BestPerDomain);
        assert!(!config.fast_fail);
    }
}

/// Test CLI layering on top of environment values
mod cli_layering_tests {
    use super::*;

    #[test]
    fn test_priority_order() {
        let env = [("SORT_BY", "speed"), ("TOP_N", "3"), ("DNS_TIMEOUT", "4")];

        let cli = Cli::parse_from(["nip", "a.com"]);
        let config = ConfigParser::new(cli).parse_with_lookup(lookup_from(&env)).unwrap();
        assert_eq!(config.sort_by, SortBy::Speed);
        assert_eq!(config.top_n, 3);

        let cli = Cli::parse_from(["nip", "a.com", "-s", "balance", "-n", "7"]);
        let config = ConfigParser::new(cli).parse_with_lookup(lookup_from(&env)).unwrap();
        assert_eq!(config.sort_by, SortBy::Balance);
        assert_eq!(config.top_n, 7);
        assert_eq!(config.dns_timeout, 4.0);
    }

    #[test]
    fn test_comma_separated_positional_domains() {
        let cli = Cli::parse_from(["nip", "a.com,b.com", "c.com"]);
        let config = ConfigParser::new(cli).parse_with_lookup(|_| None).unwrap();
        assert_eq!(config.domains, vec!["a.com", "b.com", "c.com"]);
    }

    #[test]
    fn test_env_domains_used_without_positional() {
        let cli = Cli::parse_from(["nip"]);
        let config = ConfigParser::new(cli)
            .parse_with_lookup(lookup_from(&[("DOMAINS", "x.org")]))
            .unwrap();
        assert_eq!(config.domains, vec!["x.org"]);
    }

    #[test]
    fn test_cli_conflicting_options() {
        assert!(Cli::parse_from(["nip", "a.com", "--color", "--no-color"]).validate().is_err());
        assert!(Cli::parse_from(["nip", "a.com", "--no-speed", "--upload"]).validate().is_err());
        assert!(Cli::try_parse_from(["nip", "a.com", "--dns-timeout", "-1"]).is_err());
        assert!(Cli::try_parse_from(["nip", "a.com", "--sort-by", "fastest"]).is_err());
    }
}

proptest! {
    #[test]
    fn prop_clamped_threads_within_bounds(requested in 0usize..500, cpus in 1usize..64, servers in 0usize..100) {
        let threads = clamp_dns_threads(requested, cpus, servers);
        prop_assert!(threads >= 1);
        prop_assert!(threads <= requested.max(1));
        prop_assert!(threads <= (cpus * 2).max(1));
        prop_assert!(threads <= servers.max(1));
    }

    #[test]
    fn prop_valid_ping_counts_accepted(count in 1u32..=100) {
        let mut config = Config::default();
        config.ping_count = count;
        prop_assert!(config.validate().is_ok());
    }

    #[test]
    fn prop_ping_count_env_roundtrip(count in 1u32..=100) {
        let value = count.to_string();
        let mut config = Config::default();
        config.merge_from_lookup(|key| (key == "PING_COUNT").then(|| value.clone())).unwrap();
        prop_assert_eq!(config.ping_count, count);
    }
}
