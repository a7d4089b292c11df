//! Pluggable DNS lookup backends

use async_trait::async_trait;
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use trust_dns_resolver::{
    config::{NameServerConfig, Protocol, ResolverConfig, ResolverOpts},
    error::{ResolveError, ResolveErrorKind},
    proto::rr::RecordType,
    TokioAsyncResolver,
};

/// Address record family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    A,
    Aaaa,
}

impl RecordKind {
    fn record_type(self) -> RecordType {
        match self {
            Self::A => RecordType::A,
            Self::Aaaa => RecordType::AAAA,
        }
    }
}

/// Classified lookup failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("query timed out")]
    Timeout,
    #[error("no records found")]
    NoRecords,
    #[error("server unreachable")]
    Unreachable,
    #[error("{0}")]
    Other(String),
}

impl LookupError {
    /// Whether another attempt could plausibly succeed
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::NoRecords)
    }
}

impl From<ResolveError> for LookupError {
    fn from(error: ResolveError) -> Self {
        match error.kind() {
            ResolveErrorKind::NoRecordsFound { .. } => Self::NoRecords,
            ResolveErrorKind::Timeout => Self::Timeout,
            ResolveErrorKind::NoConnections | ResolveErrorKind::Io(_) => Self::Unreachable,
            _ => Self::Other(error.to_string()),
        }
    }
}

/// Source of DNS answers
#[async_trait]
pub trait ResolutionBackend: Send + Sync {
    /// Query one record family for `domain` at exactly `server`
    async fn lookup(
        &self,
        domain: &str,
        server: &str,
        kind: RecordKind,
        timeout: Duration,
    ) -> std::result::Result<Vec<IpAddr>, LookupError>;

    /// Resolve through the host's own resolver, without server targeting
    async fn lookup_host(&self, domain: &str) -> std::result::Result<Vec<IpAddr>, LookupError> {
        host_lookup(domain).await
    }

    /// False when this backend can only use the host resolver
    fn supports_server_targeting(&self) -> bool {
        true
    }
}

/// Host resolver lookup via `tokio::net::lookup_host`
pub async fn host_lookup(domain: &str) -> std::result::Result<Vec<IpAddr>, LookupError> {
    let addrs = tokio::net::lookup_host((domain, 0))
        .await
        .map_err(|e| LookupError::Other(e.to_string()))?;
    let mut ips: Vec<IpAddr> = Vec::new();
    for addr in addrs {
        if !ips.contains(&addr.ip()) {
            ips.push(addr.ip());
        }
    }
    if ips.is_empty() {
        Err(LookupError::NoRecords)
    } else {
        Ok(ips)
    }
}

/// Parse `ip` or `ip:port`, defaulting to port 53
pub fn parse_server_addr(server: &str) -> Option<SocketAddr> {
    let trimmed = server.trim();
    trimmed
        .parse::<SocketAddr>()
        .ok()
        .or_else(|| trimmed.parse::<IpAddr>().ok().map(|ip| SocketAddr::new(ip, 53)))
}

/// Upper bound on the resolver's own per-request timeout; callers bound each
/// lookup more tightly with `tokio::time::timeout`
const RESOLVER_CEILING: Duration = Duration::from_secs(10);

/// trust-dns backend with one cached resolver per server
pub struct TrustDnsBackend {
    resolvers: RwLock<HashMap<SocketAddr, TokioAsyncResolver>>,
}

impl TrustDnsBackend {
    pub fn new() -> Self {
        Self {
            resolvers: RwLock::new(HashMap::new()),
        }
    }

    fn build_resolver(addr: SocketAddr) -> TokioAsyncResolver {
        let mut config = ResolverConfig::new();
        config.add_name_server(NameServerConfig::new(addr, Protocol::Udp));
        config.add_name_server(NameServerConfig::new(addr, Protocol::Tcp));

        let mut opts = ResolverOpts::default();
        opts.timeout = RESOLVER_CEILING;
        opts.attempts = 1;
        opts.cache_size = 0;
        opts.use_hosts_file = false;

        TokioAsyncResolver::tokio(config, opts)
    }

    async fn resolver_for(&self, addr: SocketAddr) -> TokioAsyncResolver {
        if let Some(resolver) = self.resolvers.read().await.get(&addr) {
            return resolver.clone();
        }
        let mut resolvers = self.resolvers.write().await;
        resolvers
            .entry(addr)
            .or_insert_with(|| Self::build_resolver(addr))
            .clone()
    }

    pub async fn cached_resolvers(&self) -> usize {
        self.resolvers.read().await.len()
    }
}

impl Default for TrustDnsBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResolutionBackend for TrustDnsBackend {
    async fn lookup(
        &self,
        domain: &str,
        server: &str,
        kind: RecordKind,
        timeout: Duration,
    ) -> std::result::Result<Vec<IpAddr>, LookupError> {
        let addr = parse_server_addr(server)
            .ok_or_else(|| LookupError::Other(format!("invalid DNS server address: {}", server)))?;
        let resolver = self.resolver_for(addr).await;

        let lookup = tokio::time::timeout(timeout, resolver.lookup(domain, kind.record_type()))
            .await
            .map_err(|_| LookupError::Timeout)??;

        let ips: Vec<IpAddr> = lookup.iter().filter_map(|rdata| rdata.ip_addr()).collect();
        if ips.is_empty() {
            Err(LookupError::NoRecords)
        } else {
            Ok(ips)
        }
    }
}

/// Backend without server targeting; every query goes to the host resolver
#[derive(Debug, Default, Clone)]
pub struct HostOnlyBackend;

#[async_trait]
impl ResolutionBackend for HostOnlyBackend {
    async fn lookup(
        &self,
        domain: &str,
        _server: &str,
        _kind: RecordKind,
        timeout: Duration,
    ) -> std::result::Result<Vec<IpAddr>, LookupError> {
        tokio::time::timeout(timeout, host_lookup(domain))
            .await
            .map_err(|_| LookupError::Timeout)?
    }

    fn supports_server_targeting(&self) -> bool {
        false
    }
}
