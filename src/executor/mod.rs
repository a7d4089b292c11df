//! Parallel network testing of resolved IPs
//!
//! [`NetworkTestManager`] runs a ping and (for reachable IPs) a speed test
//! for every address, bounded by one worker semaphore. Ranking and hosts
//! output live in [`ranking`].

pub mod ranking;

pub use ranking::{get_best_ips, hosts_entries, test_summary, HostsEntry, TestSummary};

use crate::error::{AppError, Result};
use crate::logging::{PerformanceLogger, ProbeLogger};
use crate::models::{Config, NetworkTestRecord};
use crate::probe::{PingTest, SpeedTest};
use crate::types::TestType;
use std::collections::HashSet;
use std::future::Future;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Runs ping and speed tests across a batch of IPs
#[derive(Clone)]
pub struct NetworkTestManager {
    ping: PingTest,
    speed: SpeedTest,
    speed_port: u16,
    enable_download: bool,
    enable_upload: bool,
    enable_ipv6: bool,
    max_workers: usize,
    logger: Option<Arc<ProbeLogger>>,
    performance: Option<Arc<PerformanceLogger>>,
}

impl NetworkTestManager {
    pub fn new(ping: PingTest, speed: SpeedTest, config: &Config) -> Self {
        Self {
            ping,
            speed,
            speed_port: config.speed_port,
            enable_download: config.enable_download_test,
            enable_upload: config.enable_upload_test,
            enable_ipv6: config.enable_ipv6,
            max_workers: config.max_workers,
            logger: None,
            performance: None,
        }
    }

    /// Build both testers from `config`; needs a running tokio runtime
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(PingTest::from_config(config), SpeedTest::from_config(config)?, config))
    }

    pub fn with_logger(mut self, logger: Arc<ProbeLogger>) -> Self {
        self.ping = self.ping.with_logger(Arc::clone(&logger));
        self.speed = self.speed.with_logger(Arc::clone(&logger));
        self.logger = Some(logger);
        self
    }

    pub fn with_performance_logger(mut self, performance: Arc<PerformanceLogger>) -> Self {
        self.performance = Some(performance);
        self
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    pub fn ping_test(&self) -> &PingTest {
        &self.ping
    }

    pub fn speed_test(&self) -> &SpeedTest {
        &self.speed
    }

    /// Test one IP; speed only runs after a successful ping (or without one)
    pub async fn test_ip(&self, ip: IpAddr, test_types: &[TestType]) -> NetworkTestRecord {
        let mut record = NetworkTestRecord::new(ip);

        if test_types.contains(&TestType::Ping) {
            record.ping = Some(self.ping.ping_ip(ip).await);
        }

        let speed_allowed = record.ping.as_ref().map(|p| p.success).unwrap_or(true);
        if test_types.contains(&TestType::Speed) && speed_allowed {
            let results = self
                .speed
                .run_speed_test_on(ip, self.speed_port, self.enable_download, self.enable_upload, record.ping.as_ref())
                .await;
            record.speed = Some(results);
        }

        record
    }

    /// Test every IP with at most `max_workers` in flight
    ///
    /// Duplicates are tested once and IPv6 addresses are skipped unless
    /// IPv6 is enabled. Records come back in input order.
    pub async fn test_ips(
        &self,
        ips: &[IpAddr],
        test_types: &[TestType],
        max_workers: usize,
    ) -> Result<Vec<NetworkTestRecord>> {
        if max_workers == 0 {
            return Err(AppError::validation("max_workers must be greater than 0"));
        }

        let mut seen = HashSet::new();
        let targets: Vec<IpAddr> = ips
            .iter()
            .copied()
            .filter(|ip| self.enable_ipv6 || ip.is_ipv4())
            .filter(|ip| seen.insert(*ip))
            .collect();

        let started = Instant::now();
        let records = self
            .run_batch(&targets, max_workers, |ip| {
                let this = self.clone();
                let test_types = test_types.to_vec();
                async move { this.test_ip(ip, &test_types).await }
            })
            .await;

        if let Some(performance) = &self.performance {
            let succeeded = records.iter().filter(|r| r.ping_succeeded()).count();
            performance
                .log_batch_summary("network tests", records.len(), succeeded, started.elapsed())
                .await;
        }
        Ok(records)
    }

    /// Run `work` for every target under one semaphore, keeping target order
    ///
    /// A task that panics or never reports becomes an error-tagged record.
    async fn run_batch<F, Fut>(&self, targets: &[IpAddr], max_workers: usize, work: F) -> Vec<NetworkTestRecord>
    where
        F: Fn(IpAddr) -> Fut,
        Fut: Future<Output = NetworkTestRecord> + Send + 'static,
    {
        let semaphore = Arc::new(Semaphore::new(max_workers));
        let mut tasks = JoinSet::new();
        for (index, ip) in targets.iter().copied().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let job = work(ip);
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                (index, job.await)
            });
        }

        let mut slots: Vec<Option<NetworkTestRecord>> = vec![None; targets.len()];
        let mut task_error = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, record)) => slots[index] = Some(record),
                Err(e) => task_error = Some(AppError::from(e)),
            }
        }

        let mut records = Vec::with_capacity(targets.len());
        for (ip, slot) in targets.iter().zip(slots) {
            match slot {
                Some(record) => records.push(record),
                None => {
                    let error = task_error
                        .take()
                        .unwrap_or_else(|| AppError::test_execution("network test task did not report"));
                    if let Some(logger) = &self.logger {
                        logger.log_task_failure(&ip.to_string(), &error).await;
                    }
                    records.push(NetworkTestRecord::failed(*ip, error.to_string()));
                }
            }
        }
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::PingStrategy;
    use std::time::Duration;

    fn manager(config: &Config) -> NetworkTestManager {
        let ping = PingTest::new(1, Duration::from_millis(50), 16, PingStrategy::SystemPing);
        let speed = SpeedTest::from_config(config).unwrap().with_endpoints(Vec::new());
        NetworkTestManager::new(ping, speed, config)
    }

    #[tokio::test]
    async fn test_zero_workers_rejected() {
        let config = Config::default();
        let err = manager(&config)
            .test_ips(&["127.0.0.1".parse().unwrap()], &[TestType::Ping], 0)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_ipv6_filtered_when_disabled() {
        let config = Config::default();
        let ips: Vec<IpAddr> = vec!["2001:db8::1".parse().unwrap()];
        let records = manager(&config).test_ips(&ips, &[TestType::Ping], 4).await.unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_speed_without_ping_runs_against_target() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                tokio::spawn(async move {
                    use tokio::io::{AsyncReadExt, AsyncWriteExt};
                    let mut request = [0u8; 1024];
                    let _ = socket.read(&mut request).await;
                    let _ = socket.write_all(&vec![7u8; 300_000]).await;
                });
            }
        });

        let mut config = Config::default();
        config.speed_port = port;
        config.test_duration = 0.3;
        config.concurrent_connections = 2;
        config.speed_test_method = crate::types::SpeedTestMethod::Direct;

        let records = manager(&config)
            .test_ips(&["127.0.0.1".parse().unwrap(), "127.0.0.1".parse().unwrap()], &[TestType::Speed], 2)
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].ping.is_none());
        let download = records[0].speed.as_ref().unwrap().download.as_ref().unwrap();
        assert!(download.bytes_transferred >= 600_000);
        assert!(!download.estimated);
    }

    #[tokio::test]
    async fn test_failed_ping_skips_speed() {
        let config = Config::default();
        let unreachable: IpAddr = "192.0.2.1".parse().unwrap();

        let record = manager(&config)
            .test_ip(unreachable, &[TestType::Ping, TestType::Speed])
            .await;

        let ping = record.ping.as_ref().unwrap();
        assert!(!ping.success);
        assert!(record.speed.is_none());
        assert!(!record.ping_succeeded());
    }

    #[tokio::test]
    async fn test_panicking_task_becomes_error_record() {
        let config = Config::default();
        let manager = manager(&config);
        let targets: Vec<IpAddr> = ["10.9.0.1", "10.9.0.2", "10.9.0.3"]
            .iter()
            .map(|ip| ip.parse().unwrap())
            .collect();
        let crashing = targets[1];

        let records = manager
            .run_batch(&targets, 2, move |ip| async move {
                if ip == crashing {
                    panic!("ping worker crashed");
                }
                NetworkTestRecord::new(ip)
            })
            .await;

        let order: Vec<IpAddr> = records.iter().map(|r| r.ip).collect();
        assert_eq!(order, targets);
        assert!(records[0].error.is_none());
        assert!(records[2].error.is_none());
        let error = records[1].error.as_deref().unwrap();
        assert!(error.contains("panicked"), "unexpected error: {}", error);
        assert!(records[1].ping.is_none());
    }
}
