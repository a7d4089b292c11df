//! Throughput probing over raw TCP and well-known HTTP endpoints

use crate::defaults::{self, MAX_SPEED_MBPS};
use crate::dns::ExponentialBackoff;
use crate::error::{AppError, Result};
use crate::logging::ProbeLogger;
use crate::models::dns::round2;
use crate::models::{Config, PingResult, SpeedResult, SpeedResults, TestDirection};
use crate::types::SpeedTestMethod;
use rand::seq::SliceRandom;
use rand::Rng;
use reqwest::Client;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinSet;

const ROUNDS: usize = 2;
const PRECHECK_TIMEOUT: Duration = Duration::from_secs(3);
const PRECHECK_RETRIES: u32 = 1;
const PRECHECK_BASE_DELAY: Duration = Duration::from_millis(100);
const PRECHECK_MAX_DELAY: Duration = Duration::from_millis(400);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const IO_TIMEOUT: Duration = Duration::from_secs(3);
const READ_CHUNK: usize = 256 * 1024;
const DIRECT_BYTE_CAP: u64 = 10 * 1024 * 1024;
const SERVER_BYTE_CAP: u64 = 20 * 1024 * 1024;
const SERVER_SAMPLE: usize = 3;

/// Megabits per second for `bytes` over `secs`, capped
pub fn mbps(bytes: u64, secs: f64) -> f64 {
    if secs <= 0.0 {
        return 0.0;
    }
    (bytes as f64 / secs * 8.0 / 1_000_000.0).min(MAX_SPEED_MBPS)
}

/// Mean after dropping the extremes (with three or more samples)
///
/// Non-empty input is floored at `min_speed`; empty input is 0.
pub fn filtered_average(speeds: &[f64], min_speed: f64) -> f64 {
    if speeds.is_empty() {
        return 0.0;
    }
    let mut sorted = speeds.to_vec();
    sorted.sort_by(f64::total_cmp);
    let kept = if sorted.len() >= 3 {
        &sorted[1..sorted.len() - 1]
    } else {
        &sorted[..]
    };
    round2(kept.iter().sum::<f64>() / kept.len() as f64).max(min_speed)
}

/// Rough throughput guess from latency and loss
pub fn estimate_from_ping(hint: Option<&PingResult>, min_speed: f64) -> f64 {
    let Some(ping) = hint.filter(|p| p.success) else {
        return min_speed;
    };
    let (avg, loss) = (ping.avg_delay, ping.packet_loss);
    if loss > 50.0 {
        min_speed
    } else if avg < 20.0 && loss < 5.0 {
        100.0
    } else if avg < 50.0 && loss < 10.0 {
        50.0
    } else if avg < 100.0 && loss < 20.0 {
        20.0
    } else if avg < 200.0 && loss < 30.0 {
        10.0
    } else {
        min_speed
    }
}

fn direct_request(ip: IpAddr) -> String {
    let nonce: u32 = rand::thread_rng().gen_range(1..=1_000_000);
    format!(
        "GET / HTTP/1.1\r\nHost: {}\r\nUser-Agent: Mozilla/5.0\r\nConnection: keep-alive\r\n\
         Cache-Control: no-cache\r\nPragma: no-cache\r\nRandom: {}\r\n\r\n",
        ip, nonce
    )
}

/// Bytes moved and time spent by one measurement path
#[derive(Debug, Clone, Copy, Default)]
struct Transfer {
    bytes: u64,
    secs: f64,
}

/// Download and upload measurement against one IP
#[derive(Clone)]
pub struct SpeedTest {
    pub test_duration: Duration,
    pub packet_size: usize,
    pub connections: usize,
    pub method: SpeedTestMethod,
    pub min_data_threshold: u64,
    pub min_valid_data: u64,
    pub min_speed: f64,
    pub rounds: usize,
    /// Retry schedule for the connect that precedes each direct round
    pub precheck: ExponentialBackoff,
    endpoints: Vec<String>,
    client: Client,
    logger: Option<Arc<ProbeLogger>>,
}

impl SpeedTest {
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("network-ip-prober/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| AppError::network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            test_duration: config.test_duration_value(),
            packet_size: config.speed_packet_size,
            connections: config.concurrent_connections.max(1),
            method: config.speed_test_method,
            min_data_threshold: config.min_data_threshold,
            min_valid_data: config.min_valid_data,
            min_speed: config.min_speed,
            rounds: ROUNDS,
            precheck: ExponentialBackoff::new(PRECHECK_BASE_DELAY, PRECHECK_MAX_DELAY, PRECHECK_RETRIES, true),
            endpoints: config.speed_endpoints.clone(),
            client,
            logger: None,
        })
    }

    /// Replace the HTTP client used for the endpoint path
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    pub fn with_endpoints(mut self, endpoints: Vec<String>) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn with_logger(mut self, logger: Arc<ProbeLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    /// Download throughput; falls back to a ping-based estimate
    ///
    /// The estimate fills `speed_mbps` when measurement falls short, but the
    /// result only counts as successful if some bytes actually arrived.
    pub async fn download_test(&self, ip: IpAddr, port: u16, ping_hint: Option<&PingResult>) -> SpeedResult {
        let target = SocketAddr::new(ip, port);
        let mut direct_speeds = Vec::new();
        let mut server_speeds = Vec::new();
        let mut total_bytes = 0u64;
        let mut total_secs = 0.0;

        for _ in 0..self.rounds {
            let round_start = Instant::now();

            if self.method.uses_direct() {
                let direct = self.direct_round(target).await;
                total_bytes += direct.bytes;
                if direct.bytes >= self.min_valid_data {
                    direct_speeds.push(mbps(direct.bytes, direct.secs));
                }
            }
            if self.method.uses_server() {
                let server = self.server_round().await;
                total_bytes += server.bytes;
                if server.bytes >= self.min_valid_data {
                    server_speeds.push(mbps(server.bytes, server.secs));
                }
            }

            total_secs += round_start.elapsed().as_secs_f64();
        }

        let direct_speed = filtered_average(&direct_speeds, self.min_speed);
        let server_speed = filtered_average(&server_speeds, self.min_speed);
        let (mut speed, mut success) = match self.method {
            SpeedTestMethod::Direct => (direct_speed, direct_speed >= self.min_speed),
            SpeedTestMethod::Server => (server_speed, server_speed >= self.min_speed),
            SpeedTestMethod::Both => (
                direct_speed.max(server_speed),
                direct_speed >= self.min_speed || server_speed >= self.min_speed,
            ),
        };

        let mut estimated = false;
        if speed < self.min_speed {
            speed = estimate_from_ping(ping_hint, self.min_speed);
            success = speed >= self.min_speed;
            estimated = true;
        }
        // An estimate alone never makes a download succeed
        let mut error = None;
        if total_bytes == 0 {
            success = false;
            error = Some(format!("no data received from {}", target));
        }

        let result = SpeedResult {
            ip,
            test_type: TestDirection::Download,
            success,
            speed_mbps: speed.min(MAX_SPEED_MBPS),
            bytes_transferred: total_bytes,
            duration_secs: if self.rounds == 0 { 0.0 } else { total_secs / self.rounds as f64 },
            direct_speed,
            server_speed,
            estimated,
            error,
        };
        if let Some(logger) = &self.logger {
            logger.log_speed(&result).await;
        }
        result
    }

    /// N concurrent raw GET streams to the target; 0 when it refuses a probe connect
    async fn direct_round(&self, target: SocketAddr) -> Transfer {
        let started = Instant::now();
        if let Err(e) = precheck(&self.precheck, target).await {
            if let Some(logger) = &self.logger {
                logger
                    .logger()
                    .debug("Direct download pre-check failed")
                    .field("target", target.to_string())
                    .field("error", e.to_string())
                    .error_info(&e)
                    .log()
                    .await;
            }
            return Transfer::default();
        }

        let mut tasks = JoinSet::new();
        for _ in 0..self.connections {
            let duration = self.test_duration;
            tasks.spawn(direct_stream(target, duration));
        }

        let mut bytes = 0;
        while let Some(joined) = tasks.join_next().await {
            bytes += joined.unwrap_or(0);
        }

        if bytes < self.min_data_threshold {
            if let Some(logger) = &self.logger {
                logger
                    .logger()
                    .debug("Direct download below data threshold")
                    .field("target", target.to_string())
                    .field("bytes", bytes)
                    .log()
                    .await;
            }
        }
        Transfer { bytes, secs: started.elapsed().as_secs_f64() }
    }

    /// Download from a random sample of the endpoint pool
    async fn server_round(&self) -> Transfer {
        let chosen: Vec<String> = {
            let mut rng = rand::thread_rng();
            self.endpoints
                .choose_multiple(&mut rng, SERVER_SAMPLE.min(self.endpoints.len()))
                .cloned()
                .collect()
        };
        if chosen.is_empty() {
            return Transfer::default();
        }

        let started = Instant::now();
        let mut tasks = JoinSet::new();
        for url in chosen {
            tasks.spawn(endpoint_stream(self.client.clone(), url, self.test_duration));
        }

        let mut bytes = 0;
        while let Some(joined) = tasks.join_next().await {
            bytes += joined.unwrap_or(0);
        }
        Transfer { bytes, secs: started.elapsed().as_secs_f64() }
    }

    /// Upload throughput from N connections writing filler for the test duration
    pub async fn upload_test(&self, ip: IpAddr, port: u16) -> SpeedResult {
        let target = SocketAddr::new(ip, port);
        let started = Instant::now();

        let mut tasks = JoinSet::new();
        for _ in 0..self.connections {
            tasks.spawn(upload_stream(target, self.packet_size.max(1), self.test_duration));
        }
        let mut bytes = 0;
        while let Some(joined) = tasks.join_next().await {
            bytes += joined.unwrap_or(0);
        }

        let secs = started.elapsed().as_secs_f64();
        let mut result = SpeedResult::failed(ip, TestDirection::Upload, format!("no data could be sent to {}", target));
        result.bytes_transferred = bytes;
        result.duration_secs = secs;
        if bytes > 0 {
            result.success = true;
            result.error = None;
            result.speed_mbps = round2(mbps(bytes, secs));
        }

        if let Some(logger) = &self.logger {
            logger.log_speed(&result).await;
        }
        result
    }

    pub async fn run_speed_test(
        &self,
        ip: IpAddr,
        download: bool,
        upload: bool,
        ping_hint: Option<&PingResult>,
    ) -> SpeedResults {
        self.run_speed_test_on(ip, defaults::DEFAULT_SPEED_PORT, download, upload, ping_hint)
            .await
    }

    pub async fn run_speed_test_on(
        &self,
        ip: IpAddr,
        port: u16,
        download: bool,
        upload: bool,
        ping_hint: Option<&PingResult>,
    ) -> SpeedResults {
        let mut results = SpeedResults::default();
        if download {
            results.download = Some(self.download_test(ip, port, ping_hint).await);
        }
        if upload {
            results.upload = Some(self.upload_test(ip, port).await);
        }
        results
    }
}

/// Connect once to see whether the target listens, retrying per `backoff`
async fn precheck(backoff: &ExponentialBackoff, target: SocketAddr) -> Result<()> {
    backoff
        .execute_with_retry(move || async move {
            tokio::time::timeout(PRECHECK_TIMEOUT, TcpStream::connect(target))
                .await
                .map_err(AppError::from)?
                .map(drop)
                .map_err(|e| AppError::network(format!("pre-check connect to {} failed: {}", target, e)))
        })
        .await
}

async fn direct_stream(target: SocketAddr, duration: Duration) -> u64 {
    let Ok(Ok(mut stream)) = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(target)).await else {
        return 0;
    };
    let _ = stream.set_nodelay(true);
    if stream.write_all(direct_request(target.ip()).as_bytes()).await.is_err() {
        return 0;
    }

    let mut buf = vec![0u8; READ_CHUNK];
    let mut bytes = 0u64;
    let started = Instant::now();
    while started.elapsed() < duration {
        match tokio::time::timeout(IO_TIMEOUT, stream.read(&mut buf)).await {
            Ok(Ok(0)) | Ok(Err(_)) | Err(_) => break,
            Ok(Ok(n)) => {
                bytes += n as u64;
                if bytes > DIRECT_BYTE_CAP {
                    break;
                }
            }
        }
    }
    bytes
}

async fn endpoint_stream(client: Client, url: String, duration: Duration) -> u64 {
    let Ok(Ok(mut response)) = tokio::time::timeout(CONNECT_TIMEOUT, client.get(&url).send()).await else {
        return 0;
    };

    let mut bytes = 0u64;
    let started = Instant::now();
    while started.elapsed() < duration {
        match tokio::time::timeout(IO_TIMEOUT, response.chunk()).await {
            Ok(Ok(Some(chunk))) => {
                bytes += chunk.len() as u64;
                if bytes > SERVER_BYTE_CAP {
                    break;
                }
            }
            _ => break,
        }
    }
    bytes
}

async fn upload_stream(target: SocketAddr, packet_size: usize, duration: Duration) -> u64 {
    let Ok(Ok(mut stream)) = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(target)).await else {
        return 0;
    };
    let _ = stream.set_nodelay(true);

    let filler = vec![b'X'; packet_size];
    let mut bytes = 0u64;
    let started = Instant::now();
    while started.elapsed() < duration {
        match tokio::time::timeout(IO_TIMEOUT, stream.write(&filler)).await {
            Ok(Ok(0)) | Ok(Err(_)) | Err(_) => break,
            Ok(Ok(n)) => bytes += n as u64,
        }
    }
    bytes
}
