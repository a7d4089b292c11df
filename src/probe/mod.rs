//! Latency and throughput probes for resolved IPs

pub mod ping;
pub mod speed;
pub mod system_ping;

pub use ping::{compute_ping_stats, PingStrategy, PingTest, ProgressCallback};
pub use speed::{estimate_from_ping, filtered_average, SpeedTest};
