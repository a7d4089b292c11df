//! ICMP latency probing with a system `ping` fallback

use super::system_ping::{run_system_ping, SystemPingOptions};
use crate::logging::ProbeLogger;
use crate::models::dns::round2;
use crate::models::{Config, PingMethod, PingResult};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use surge_ping::{Client, Config as IcmpConfig, PingIdentifier, PingSequence, ICMP};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Invoked with `(completed, total)` as a batch progresses
pub type ProgressCallback = Arc<dyn Fn(usize, usize) + Send + Sync>;

/// Progress is reported every this many completions, and at the end
const PROGRESS_EVERY: usize = 10;
const MAX_MERGED_ERRORS: usize = 3;

/// How echoes are sent, decided once per `PingTest`
#[derive(Clone)]
pub enum PingStrategy {
    RawIcmp { v4: Client, v6: Option<Client> },
    SystemPing,
}

impl PingStrategy {
    /// Raw ICMP when a socket can be opened, otherwise the system binary
    ///
    /// Must be called inside a tokio runtime.
    pub fn detect() -> Self {
        match Client::new(&IcmpConfig::default()) {
            Ok(v4) => {
                let v6 = Client::new(&IcmpConfig::builder().kind(ICMP::V6).build()).ok();
                Self::RawIcmp { v4, v6 }
            }
            Err(_) => Self::SystemPing,
        }
    }

    pub fn method(&self) -> PingMethod {
        match self {
            Self::RawIcmp { .. } => PingMethod::RawIcmp,
            Self::SystemPing => PingMethod::SystemPing,
        }
    }
}

impl std::fmt::Debug for PingStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RawIcmp { v6, .. } => f
                .debug_struct("RawIcmp")
                .field("ipv6", &v6.is_some())
                .finish(),
            Self::SystemPing => f.write_str("SystemPing"),
        }
    }
}

/// Statistics over the replies to `sent` echoes
pub fn compute_ping_stats(ip: IpAddr, sent: u32, delays: Vec<f64>, method: PingMethod, errors: &[String]) -> PingResult {
    let received = delays.len() as u32;
    let mut result = PingResult::failed(ip, sent, method, "");
    result.error = merge_errors(errors);
    result.received = received;

    if !delays.is_empty() {
        result.success = true;
        result.min_delay = delays.iter().copied().fold(f64::INFINITY, f64::min);
        result.max_delay = delays.iter().copied().fold(0.0, f64::max);
        result.avg_delay = round2(delays.iter().sum::<f64>() / delays.len() as f64);
        if delays.len() > 1 {
            let diffs: f64 = delays.windows(2).map(|w| (w[1] - w[0]).abs()).sum();
            result.jitter = round2(diffs / (delays.len() - 1) as f64);
        }
    }

    result.packet_loss = if sent == 0 {
        100.0
    } else {
        round2(sent.saturating_sub(received) as f64 / sent as f64 * 100.0)
    };
    result.delays = delays;
    result
}

/// The most frequent messages first, at most three, joined with "; "
fn merge_errors(errors: &[String]) -> Option<String> {
    if errors.is_empty() {
        return None;
    }
    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
    for (order, error) in errors.iter().enumerate() {
        counts.entry(error.as_str()).or_insert((0, order)).0 += 1;
    }
    let mut ranked: Vec<(&str, (usize, usize))> = counts.into_iter().collect();
    // Ties keep first-seen order
    ranked.sort_by(|a, b| b.1 .0.cmp(&a.1 .0).then(a.1 .1.cmp(&b.1 .1)));
    Some(
        ranked
            .into_iter()
            .take(MAX_MERGED_ERRORS)
            .map(|(e, _)| e)
            .collect::<Vec<_>>()
            .join("; "),
    )
}

/// Latency prober for a batch of IPs
#[derive(Clone)]
pub struct PingTest {
    pub count: u32,
    pub timeout: Duration,
    pub packet_size: usize,
    pub interval: Duration,
    strategy: PingStrategy,
    logger: Option<Arc<ProbeLogger>>,
}

impl PingTest {
    pub fn new(count: u32, timeout: Duration, packet_size: usize, strategy: PingStrategy) -> Self {
        Self {
            count,
            timeout,
            packet_size,
            interval: Duration::ZERO,
            strategy,
            logger: None,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let mut test = Self::new(
            config.ping_count,
            config.ping_timeout_duration(),
            config.packet_size,
            PingStrategy::detect(),
        );
        test.interval = config.ping_interval_duration();
        test
    }

    pub fn with_logger(mut self, logger: Arc<ProbeLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn strategy(&self) -> &PingStrategy {
        &self.strategy
    }

    pub async fn ping_ip(&self, ip: IpAddr) -> PingResult {
        let result = match &self.strategy {
            PingStrategy::RawIcmp { v4, v6 } => {
                let client = if ip.is_ipv4() { Some(v4) } else { v6.as_ref() };
                match client {
                    Some(client) => self.icmp_ping(client, ip).await,
                    None => self.system_ping(ip).await,
                }
            }
            PingStrategy::SystemPing => self.system_ping(ip).await,
        };

        if let Some(logger) = &self.logger {
            logger.log_ping(&result).await;
        }
        result
    }

    async fn icmp_ping(&self, client: &Client, ip: IpAddr) -> PingResult {
        let payload = vec![0u8; self.packet_size];
        let mut pinger = client.pinger(ip, PingIdentifier(rand::random())).await;
        pinger.timeout(self.timeout);

        let mut delays = Vec::with_capacity(self.count as usize);
        let mut errors = Vec::new();
        for seq in 0..self.count {
            match pinger.ping(PingSequence(seq as u16), &payload).await {
                Ok((_, rtt)) => delays.push(round2(rtt.as_secs_f64() * 1000.0)),
                Err(err) => errors.push(format!("ICMP echo to {} failed: {}", ip, err)),
            }
            if seq + 1 < self.count && !self.interval.is_zero() {
                tokio::time::sleep(self.interval).await;
            }
        }

        compute_ping_stats(ip, self.count, delays, PingMethod::RawIcmp, &errors)
    }

    async fn system_ping(&self, ip: IpAddr) -> PingResult {
        let options = SystemPingOptions::new(self.count, self.timeout, self.packet_size);
        let (delays, error) = run_system_ping(ip, &options).await;
        let errors: Vec<String> = error.into_iter().collect();
        compute_ping_stats(ip, self.count, delays, PingMethod::SystemPing, &errors)
    }

    /// Ping every IP with at most `max_workers` in flight
    pub async fn ping_many(
        &self,
        ips: &[IpAddr],
        max_workers: usize,
        progress: Option<ProgressCallback>,
    ) -> Vec<PingResult> {
        let total = ips.len();
        let semaphore = Arc::new(Semaphore::new(max_workers.max(1)));
        let mut tasks = JoinSet::new();

        for (index, ip) in ips.iter().copied().enumerate() {
            let this = self.clone();
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                (index, this.ping_ip(ip).await)
            });
        }

        let mut slots: Vec<Option<PingResult>> = vec![None; total];
        let mut completed = 0;
        while let Some(joined) = tasks.join_next().await {
            completed += 1;
            if let Ok((index, result)) = joined {
                slots[index] = Some(result);
            }
            if let Some(callback) = &progress {
                if completed % PROGRESS_EVERY == 0 || completed == total {
                    callback(completed, total);
                }
            }
        }

        let method = self.strategy.method();
        ips.iter()
            .zip(slots)
            .map(|(ip, slot)| slot.unwrap_or_else(|| PingResult::failed(*ip, self.count, method, "ping task failed")))
            .collect()
    }
}
