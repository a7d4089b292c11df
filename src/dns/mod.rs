//! Multi-server DNS resolution and server health tracking
//!
//! [`DnsResolver`] queries one server at a time with tiered timeouts, retry
//! and a short-term block on flaky servers. [`ParallelResolver`] fans a
//! domain out across every selected server, merges the answers and checks
//! them for poisoning. [`SmartDnsPool`] scores servers with per-server
//! circuit breakers so later runs can prefer the healthy ones.

pub mod backend;
pub mod backoff;
pub mod circuit_breaker;
pub mod grouper;
pub mod metrics;
pub mod orchestrator;
pub mod poisoning;
pub mod pool;
pub mod qualify;
pub mod resolver;
pub mod timeout;

pub use backend::{HostOnlyBackend, LookupError, RecordKind, ResolutionBackend, TrustDnsBackend};
pub use backoff::ExponentialBackoff;
pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use grouper::{DnsServerGrouper, GroupStats, LatencyGroup};
pub use metrics::{calculate_score, ServerMetrics, ServerSnapshot};
pub use orchestrator::{all_unique_ips, normalize_domains, ParallelResolver};
pub use poisoning::{detect_poisoning, PoisoningVerdict};
pub use pool::{PoolStats, SmartDnsPool};
pub use qualify::{CancellationFlag, QualificationReport, ServerQualification, ServerQualifier};
pub use resolver::{DnsResolver, ResolverStats};
pub use timeout::AdaptiveTimeout;
