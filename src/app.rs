//! Main application orchestration and execution

use crate::{
    cli::Cli,
    config::{display_config_summary, load_config, validate_config, EnvManager},
    dns::{
        all_unique_ips, CancellationFlag, DnsResolver, ParallelResolver, QualificationReport, ResolutionBackend,
        ServerQualifier, SmartDnsPool, TrustDnsBackend,
    },
    error::{AppError, Result},
    executor::{get_best_ips, hosts_entries, test_summary, NetworkTestManager},
    log_debug, log_info, log_warn,
    logging::{Logger, LoggerFactory, PerformanceLogger, ProbeLogger},
    models::Config,
    output::{report_to_json, OutputCoordinator, OutputFormatterFactory, RunReport},
    probe::{PingTest, SpeedTest},
};
use std::net::IpAddr;
use std::sync::Arc;

/// Main application struct that coordinates all components
pub struct App {
    cli: Cli,
    backend: Arc<dyn ResolutionBackend>,
}

impl App {
    /// Create a new application instance with CLI configuration
    pub fn new(cli: Cli) -> Self {
        Self {
            cli,
            backend: Arc::new(TrustDnsBackend::new()),
        }
    }

    /// Swap the DNS backend; used by integration tests
    pub fn with_backend(mut self, backend: Arc<dyn ResolutionBackend>) -> Self {
        self.backend = backend;
        self
    }

    /// Run the application
    pub async fn run(self) -> Result<()> {
        if self.handle_informational()? {
            return Ok(());
        }

        let config = load_config(self.cli.clone())?;
        let report = self.execute(&config).await?;

        if config.json_output {
            println!("{}", report_to_json(&report)?);
        } else {
            let formatter = OutputFormatterFactory::create_formatter(config.enable_color, config.verbose);
            println!("{}", OutputCoordinator::new(formatter).display_report(&report)?);
        }

        if report.resolutions.iter().all(|r| !r.has_ips()) {
            return Err(AppError::dns_resolution("No domain resolved to any IP address"));
        }
        Ok(())
    }

    /// `--env-help` and `--write-example-env`; true when the run should stop
    fn handle_informational(&self) -> Result<bool> {
        if self.cli.env_help {
            println!("{}", EnvManager::display_env_help());
        }
        if let Some(path) = &self.cli.write_example_env {
            EnvManager::save_example_env_file(path)?;
            println!("Example configuration written to {}", path.display());
        }
        Ok(self.cli.is_informational())
    }

    /// Resolve, probe and rank; the report is returned rather than printed
    pub async fn execute(&self, config: &Config) -> Result<RunReport> {
        if config.domains.is_empty() {
            return Err(AppError::validation(
                "No domains specified. Pass them as arguments or set DOMAINS",
            ));
        }

        // Logs on stdout would corrupt the JSON document
        let mut log_config = config.clone();
        if config.json_output {
            log_config.verbose = false;
            log_config.debug = false;
        }
        let factory = LoggerFactory::new(log_config);
        let logger = factory.create_logger("APP").await;
        let probe_logger = factory.create_probe_logger().await;
        let performance = Arc::new(factory.create_performance_logger());

        log_debug!(logger, "Network IP Prober v{} ({})", crate::VERSION, build_info());
        if config.debug && !config.json_output {
            eprintln!("Configuration Summary:\n{}", display_config_summary(config));
        }
        for warning in validate_config(config)? {
            if !config.json_output {
                eprintln!("{}", warning.format(config.enable_color));
            }
        }

        let mut report = RunReport::default();

        let mut effective = config.clone();
        if self.cli.qualify {
            performance.start_timing("server qualification").await;
            let qualification = self.qualify_servers(config, &probe_logger, &logger).await?;
            performance.end_timing("server qualification").await;

            let qualified = qualification.qualified_servers();
            if qualified.is_empty() {
                log_warn!(logger, "No DNS server qualified; keeping the configured list");
            } else {
                effective.dns_servers = qualified;
                effective.ipv6_dns_servers.clear();
            }
            report.qualification = Some(qualification);
        }

        performance.start_timing("dns resolution").await;
        let resolver = self.build_resolver(&effective, &probe_logger)?;
        report.resolutions = resolver.resolve_many(&effective.domains, effective.fast_fail).await;
        performance.end_timing("dns resolution").await;

        for resolution in report.resolutions.iter().filter(|r| r.is_poisoned) {
            log_warn!(logger, "{}: {}", resolution.domain, resolution.poison_message);
        }

        let ips: Vec<IpAddr> = all_unique_ips(&report.resolutions).into_iter().collect();
        log_info!(
            logger,
            "Resolved {} domains to {} unique IPs",
            report.resolutions.len(),
            ips.len()
        );
        if ips.is_empty() {
            return Ok(report);
        }

        performance.start_timing("network tests").await;
        let manager = self.build_manager(&effective, &probe_logger, Arc::clone(&performance))?;
        report.results = manager
            .test_ips(&ips, &effective.test_types(), effective.max_workers)
            .await?;
        performance.end_timing("network tests").await;

        report.summary = Some(test_summary(&report.results));
        report.ranked = get_best_ips(&report.results, effective.sort_by, effective.top_n);
        report.hosts = hosts_entries(&report.resolutions, &report.ranked, effective.hosts_mode);

        Ok(report)
    }

    /// Sequentially qualify every configured server; Ctrl-C stops early
    async fn qualify_servers(
        &self,
        config: &Config,
        probe_logger: &Arc<ProbeLogger>,
        logger: &Logger,
    ) -> Result<QualificationReport> {
        let resolver = DnsResolver::from_config(config, Arc::clone(&self.backend))?
            .with_logger(Arc::clone(probe_logger));
        let pool = Arc::new(SmartDnsPool::from_config(config)?);
        let qualifier = ServerQualifier::new(Arc::new(resolver)).with_pool(pool);

        let cancel = CancellationFlag::new();
        let watcher = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel.cancel();
                }
            })
        };
        let report = qualifier.qualify_all(&cancel).await;
        watcher.abort();

        if report.cancelled {
            log_warn!(logger, "Server qualification interrupted after {} servers", report.servers.len());
        }
        Ok(report)
    }

    fn build_resolver(&self, config: &Config, probe_logger: &Arc<ProbeLogger>) -> Result<ParallelResolver> {
        let resolver = DnsResolver::from_config(config, Arc::clone(&self.backend))?
            .with_logger(Arc::clone(probe_logger));
        let pool = Arc::new(SmartDnsPool::from_config(config)?);
        Ok(ParallelResolver::new(Arc::new(resolver))
            .with_pool(pool, config.server_selection)
            .with_logger(Arc::clone(probe_logger)))
    }

    fn build_manager(
        &self,
        config: &Config,
        probe_logger: &Arc<ProbeLogger>,
        performance: Arc<PerformanceLogger>,
    ) -> Result<NetworkTestManager> {
        let ping = PingTest::from_config(config).with_logger(Arc::clone(probe_logger));
        let speed = SpeedTest::from_config(config)?.with_logger(Arc::clone(probe_logger));
        Ok(NetworkTestManager::new(ping, speed, config)
            .with_logger(Arc::clone(probe_logger))
            .with_performance_logger(performance))
    }
}

/// Build time and commit stamped by the build script
pub fn build_info() -> String {
    format!(
        "built {}, commit {}",
        env!("BUILD_TIME"),
        option_env!("GIT_COMMIT").unwrap_or("unknown")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::{LookupError, RecordKind};
    use async_trait::async_trait;
    use clap::Parser;
    use std::time::Duration;

    /// Every server answers with TEST-NET addresses that nothing listens on
    struct StaticBackend;

    #[async_trait]
    impl ResolutionBackend for StaticBackend {
        async fn lookup(
            &self,
            domain: &str,
            _server: &str,
            kind: RecordKind,
            _timeout: Duration,
        ) -> std::result::Result<Vec<IpAddr>, LookupError> {
            match (domain, kind) {
                ("missing.test", _) | (_, RecordKind::Aaaa) => Err(LookupError::NoRecords),
                _ => Ok(vec!["127.0.0.1".parse().unwrap()]),
            }
        }

        async fn lookup_host(&self, _domain: &str) -> std::result::Result<Vec<IpAddr>, LookupError> {
            Err(LookupError::NoRecords)
        }
    }

    fn app(args: &[&str]) -> App {
        let mut full = vec!["nip"];
        full.extend_from_slice(args);
        App::new(Cli::parse_from(full)).with_backend(Arc::new(StaticBackend))
    }

    fn config(domains: &[&str]) -> Config {
        Config {
            domains: domains.iter().map(|d| d.to_string()).collect(),
            dns_servers: vec!["192.0.2.1".to_string(), "192.0.2.2".to_string()],
            skip_speed_test: true,
            ping_count: 1,
            ping_timeout: 0.2,
            enable_color: false,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_execute_requires_domains() {
        let err = app(&[]).execute(&config(&[])).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_execute_resolves_and_tests() {
        let report = app(&[]).execute(&config(&["a.test"])).await.unwrap();

        assert_eq!(report.resolutions.len(), 1);
        assert!(report.resolutions[0].has_ips());
        assert_eq!(report.results.len(), 1);
        assert_eq!(report.summary.as_ref().map(|s| s.total), Some(1));
        assert!(report.qualification.is_none());
    }

    #[tokio::test]
    async fn test_unresolvable_domain_skips_probing() {
        let report = app(&[]).execute(&config(&["missing.test"])).await.unwrap();
        assert!(report.results.is_empty());
        assert!(report.summary.is_none());
    }

    #[tokio::test]
    async fn test_qualification_report_attached() {
        let mut cfg = config(&["a.test"]);
        cfg.enable_ipv6 = false;
        let report = app(&["--qualify"]).execute(&cfg).await.unwrap();

        let qualification = report.qualification.unwrap();
        assert_eq!(qualification.servers.len(), 2);
        assert_eq!(qualification.qualified_servers().len(), 2);
    }

    #[test]
    fn test_build_info_mentions_commit() {
        assert!(build_info().contains("commit"));
    }
}
