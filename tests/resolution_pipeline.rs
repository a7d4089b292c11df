//! Resolution pipeline tests against a scripted DNS backend
//!
//! Every server behaviour is simulated, so these run without network access.

use async_trait::async_trait;
use network_ip_prober::{
    dns::{
        all_unique_ips, LookupError, ParallelResolver, RecordKind, ResolutionBackend, SmartDnsPool,
    },
    models::{FailureKind, SYSTEM_DNS_SOURCE},
    types::ServerSelection,
    DnsResolver,
};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How a simulated server answers every A query
#[derive(Clone)]
enum Behaviour {
    Answer(Vec<&'static str>),
    /// Answer after a delay
    Slow(Duration, Vec<&'static str>),
    Timeout,
    NoRecords,
}

struct ScriptedBackend {
    servers: HashMap<&'static str, Behaviour>,
    host_answer: Option<Vec<&'static str>>,
    calls: AtomicUsize,
}

impl ScriptedBackend {
    fn new(servers: &[(&'static str, Behaviour)]) -> Self {
        Self {
            servers: servers.iter().cloned().collect(),
            host_answer: None,
            calls: AtomicUsize::new(0),
        }
    }

    fn with_host_answer(mut self, ips: Vec<&'static str>) -> Self {
        self.host_answer = Some(ips);
        self
    }

    fn a_queries(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn parse_all(ips: &[&str]) -> Vec<IpAddr> {
    ips.iter().map(|ip| ip.parse().unwrap()).collect()
}

#[async_trait]
impl ResolutionBackend for ScriptedBackend {
    async fn lookup(
        &self,
        _domain: &str,
        server: &str,
        kind: RecordKind,
        _timeout: Duration,
    ) -> Result<Vec<IpAddr>, LookupError> {
        if kind == RecordKind::Aaaa {
            return Err(LookupError::NoRecords);
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.servers.get(server) {
            Some(Behaviour::Answer(ips)) => Ok(parse_all(ips)),
            Some(Behaviour::Slow(delay, ips)) => {
                tokio::time::sleep(*delay).await;
                Ok(parse_all(ips))
            }
            Some(Behaviour::Timeout) => Err(LookupError::Timeout),
            Some(Behaviour::NoRecords) | None => Err(LookupError::NoRecords),
        }
    }

    async fn lookup_host(&self, _domain: &str) -> Result<Vec<IpAddr>, LookupError> {
        match &self.host_answer {
            Some(ips) => Ok(parse_all(ips)),
            None => Err(LookupError::NoRecords),
        }
    }
}

fn resolver(backend: Arc<ScriptedBackend>, servers: &[&str]) -> ParallelResolver {
    let servers: Vec<String> = servers.iter().map(|s| s.to_string()).collect();
    let resolver = DnsResolver::new(servers, 16, backend).unwrap();
    ParallelResolver::new(Arc::new(resolver))
}

#[tokio::test]
async fn test_two_agree_one_times_out() {
    let backend = Arc::new(ScriptedBackend::new(&[
        ("10.0.0.1", Behaviour::Answer(vec!["1.1.1.1"])),
        ("10.0.0.2", Behaviour::Answer(vec!["1.1.1.1"])),
        ("10.0.0.3", Behaviour::Timeout),
    ]));
    let resolution = resolver(backend, &["10.0.0.1", "10.0.0.2", "10.0.0.3"])
        .resolve("example.com", true)
        .await;

    assert_eq!(resolution.domain, "example.com");
    assert_eq!(resolution.analysis.total_servers, 3);
    assert_eq!(resolution.analysis.successful_servers, 2);
    assert_eq!(resolution.analysis.failed_servers, 1);
    assert_eq!(resolution.analysis.total_unique_ips, 1);
    assert!(!resolution.is_poisoned);
    assert!(!resolution.used_system_fallback);

    let ip: IpAddr = "1.1.1.1".parse().unwrap();
    let mut sources = resolution.unique_ips[&ip].sources.clone();
    sources.sort();
    assert_eq!(sources, vec!["10.0.0.1", "10.0.0.2"]);

    let failed = resolution.raw_results.iter().find(|r| !r.success).unwrap();
    assert_eq!(failed.server, "10.0.0.3");
    assert_eq!(failed.failure, Some(FailureKind::Timeout));
}

#[tokio::test]
async fn test_disjoint_late_answer_flagged_as_poisoning() {
    let backend = Arc::new(ScriptedBackend::new(&[
        ("10.0.0.1", Behaviour::Answer(vec!["1.1.1.1"])),
        ("10.0.0.2", Behaviour::Answer(vec!["1.1.1.1", "1.0.0.1"])),
        ("10.0.0.3", Behaviour::Slow(Duration::from_millis(150), vec!["6.6.6.6"])),
    ]));
    let resolution = resolver(backend, &["10.0.0.1", "10.0.0.2", "10.0.0.3"])
        .resolve("bank.example", false)
        .await;

    assert!(resolution.is_poisoned);
    assert_eq!(resolution.suspect_server.as_deref(), Some("10.0.0.3"));
    assert!(resolution.poison_message.contains("10.0.0.3"));
    // Advisory only: the suspect answer is still reported
    assert_eq!(resolution.analysis.total_unique_ips, 3);
}

#[tokio::test]
async fn test_fast_fail_stops_after_five_answers() {
    let mut servers: Vec<(&'static str, Behaviour)> = vec![
        ("10.0.1.1", Behaviour::Answer(vec!["2.2.2.2"])),
        ("10.0.1.2", Behaviour::Answer(vec!["2.2.2.2"])),
        ("10.0.1.3", Behaviour::Answer(vec!["2.2.2.2"])),
        ("10.0.1.4", Behaviour::Answer(vec!["2.2.2.2"])),
        ("10.0.1.5", Behaviour::Answer(vec!["2.2.2.2"])),
    ];
    servers.push(("10.0.1.6", Behaviour::Slow(Duration::from_secs(5), vec!["3.3.3.3"])));
    servers.push(("10.0.1.7", Behaviour::Slow(Duration::from_secs(5), vec!["3.3.3.3"])));
    let names: Vec<&str> = servers.iter().map(|(s, _)| *s).collect();

    let backend = Arc::new(ScriptedBackend::new(&servers));
    let parallel = resolver(Arc::clone(&backend), &names);

    let started = Instant::now();
    let resolution = parallel.resolve("example.com", true).await;

    assert!(started.elapsed() < Duration::from_secs(3));
    assert_eq!(resolution.analysis.successful_servers, 5);
    assert_eq!(resolution.raw_results.len(), 5);
    assert!(!resolution.unique_ips.contains_key(&"3.3.3.3".parse::<IpAddr>().unwrap()));
    assert_eq!(parallel.resolver().stats().fast_fail_count, 1);
}

#[tokio::test]
async fn test_system_fallback_when_every_server_fails() {
    let backend = Arc::new(
        ScriptedBackend::new(&[
            ("10.0.2.1", Behaviour::NoRecords),
            ("10.0.2.2", Behaviour::NoRecords),
        ])
        .with_host_answer(vec!["9.9.9.9"]),
    );
    let resolution = resolver(backend, &["10.0.2.1", "10.0.2.2"])
        .resolve("intranet.example", true)
        .await;

    assert!(resolution.used_system_fallback);
    assert_eq!(resolution.analysis.successful_servers, 0);
    let ip: IpAddr = "9.9.9.9".parse().unwrap();
    assert_eq!(resolution.unique_ips[&ip].sources, vec![SYSTEM_DNS_SOURCE]);
}

#[tokio::test]
async fn test_failing_server_is_blocked_without_io() {
    let backend = Arc::new(ScriptedBackend::new(&[("10.0.3.1", Behaviour::NoRecords)]));
    let parallel = resolver(Arc::clone(&backend), &["10.0.3.1"]);

    for _ in 0..3 {
        parallel.resolver().resolve_domain("example.com", "10.0.3.1").await;
    }
    assert!(parallel.resolver().is_blocked("10.0.3.1"));

    let before = backend.a_queries();
    let result = parallel.resolver().resolve_domain("example.com", "10.0.3.1").await;
    assert_eq!(result.failure, Some(FailureKind::CircuitOpen));
    assert!(!result.was_attempted());
    assert_eq!(backend.a_queries(), before);
}

#[tokio::test]
async fn test_resolve_many_normalizes_and_keeps_order() {
    let backend = Arc::new(ScriptedBackend::new(&[
        ("10.0.4.1", Behaviour::Answer(vec!["4.4.4.4"])),
        ("10.0.4.2", Behaviour::Answer(vec!["4.4.4.4", "5.5.5.5"])),
    ]));
    let parallel = resolver(backend, &["10.0.4.1", "10.0.4.2"]);
    let domains = vec![
        " B.example ".to_string(),
        "a.example".to_string(),
        "b.example".to_string(),
        String::new(),
    ];

    let resolutions = parallel.resolve_many(&domains, false).await;
    let names: Vec<&str> = resolutions.iter().map(|r| r.domain.as_str()).collect();
    assert_eq!(names, vec!["b.example", "a.example"]);

    let ips = all_unique_ips(&resolutions);
    assert_eq!(ips.len(), 2);

    let (by_domain, all) = parallel.comprehensive_resolve(&domains, false).await;
    assert_eq!(by_domain.len(), 2);
    assert_eq!(all, ips);
}

#[tokio::test]
async fn test_scored_selection_feeds_pool_metrics() {
    let backend = Arc::new(ScriptedBackend::new(&[
        ("10.0.5.1", Behaviour::Answer(vec!["7.7.7.7"])),
        ("10.0.5.2", Behaviour::Timeout),
    ]));
    let servers = vec!["10.0.5.1".to_string(), "10.0.5.2".to_string()];
    let pool = Arc::new(SmartDnsPool::with_defaults(servers.clone()).unwrap());
    let resolver = DnsResolver::new(servers, 4, backend).unwrap();
    let parallel = ParallelResolver::new(Arc::new(resolver)).with_pool(Arc::clone(&pool), ServerSelection::Scored);

    parallel.resolve("example.com", false).await;

    let good = pool.server_snapshot("10.0.5.1").unwrap();
    let bad = pool.server_snapshot("10.0.5.2").unwrap();
    assert!(good.score > bad.score);
    assert_eq!(parallel.select_servers().first().map(String::as_str), Some("10.0.5.1"));
}
