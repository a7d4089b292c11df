//! Ping and throughput result records

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::net::IpAddr;

/// How echo round-trips were measured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PingMethod {
    RawIcmp,
    SystemPing,
}

impl PingMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RawIcmp => "raw_icmp",
            Self::SystemPing => "system_ping",
        }
    }
}

/// Latency statistics for one IP
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingResult {
    pub ip: IpAddr,
    pub success: bool,
    /// Smallest RTT in ms; infinite when nothing came back
    #[serde(serialize_with = "serialize_min_delay", deserialize_with = "deserialize_min_delay")]
    pub min_delay: f64,
    pub max_delay: f64,
    pub avg_delay: f64,
    /// Mean absolute difference of consecutive RTTs
    pub jitter: f64,
    /// Percent of echoes lost
    pub packet_loss: f64,
    pub sent: u32,
    pub received: u32,
    pub delays: Vec<f64>,
    pub error: Option<String>,
    pub method: PingMethod,
}

impl PingResult {
    /// Result with no replies at all
    pub fn failed(ip: IpAddr, sent: u32, method: PingMethod, error: impl Into<String>) -> Self {
        Self {
            ip,
            success: false,
            min_delay: f64::INFINITY,
            max_delay: 0.0,
            avg_delay: 0.0,
            jitter: 0.0,
            packet_loss: 100.0,
            sent,
            received: 0,
            delays: Vec::new(),
            error: Some(error.into()),
            method,
        }
    }
}

fn serialize_min_delay<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    if value.is_finite() {
        serializer.serialize_some(value)
    } else {
        serializer.serialize_none()
    }
}

fn deserialize_min_delay<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::INFINITY))
}

/// Direction of a throughput measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestDirection {
    Download,
    Upload,
}

impl TestDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Download => "download",
            Self::Upload => "upload",
        }
    }
}

/// Throughput measured (or estimated) for one IP in one direction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeedResult {
    pub ip: IpAddr,
    pub test_type: TestDirection,
    pub success: bool,
    /// Reported speed, never above 700 Mbps
    pub speed_mbps: f64,
    pub bytes_transferred: u64,
    pub duration_secs: f64,
    /// Filtered average of the direct path
    pub direct_speed: f64,
    /// Filtered average of the well-known endpoints
    pub server_speed: f64,
    /// Set when `speed_mbps` comes from ping statistics instead of transfers
    pub estimated: bool,
    pub error: Option<String>,
}

impl SpeedResult {
    pub fn failed(ip: IpAddr, test_type: TestDirection, error: impl Into<String>) -> Self {
        Self {
            ip,
            test_type,
            success: false,
            speed_mbps: 0.0,
            bytes_transferred: 0,
            duration_secs: 0.0,
            direct_speed: 0.0,
            server_speed: 0.0,
            estimated: false,
            error: Some(error.into()),
        }
    }
}

/// Download and upload results for one IP
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpeedResults {
    pub download: Option<SpeedResult>,
    pub upload: Option<SpeedResult>,
}

impl SpeedResults {
    pub fn download_mbps(&self) -> f64 {
        self.download.as_ref().map(|d| d.speed_mbps).unwrap_or(0.0)
    }
}

/// Combined per-IP outcome of the test batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkTestRecord {
    pub ip: IpAddr,
    pub ping: Option<PingResult>,
    pub speed: Option<SpeedResults>,
    pub error: Option<String>,
}

impl NetworkTestRecord {
    pub fn new(ip: IpAddr) -> Self {
        Self { ip, ping: None, speed: None, error: None }
    }

    pub fn failed(ip: IpAddr, error: impl Into<String>) -> Self {
        Self { ip, ping: None, speed: None, error: Some(error.into()) }
    }

    pub fn ping_succeeded(&self) -> bool {
        self.ping.as_ref().map(|p| p.success).unwrap_or(false)
    }

    pub fn avg_delay(&self) -> Option<f64> {
        self.ping.as_ref().filter(|p| p.success).map(|p| p.avg_delay)
    }

    /// Download speed, 0 when no measurement exists
    pub fn download_mbps(&self) -> f64 {
        self.speed.as_ref().map(SpeedResults::download_mbps).unwrap_or(0.0)
    }
}
