//! Fan-out of one domain across many DNS servers, and of many domains

use super::backend::ResolutionBackend;
use super::poisoning::detect_poisoning;
use super::pool::SmartDnsPool;
use super::resolver::DnsResolver;
use crate::defaults::FAST_FAIL_SUCCESS_TARGET;
use crate::error::{AppError, Result};
use crate::logging::ProbeLogger;
use crate::models::{
    Config, DomainResolution, ResolutionAnalysis, ResolutionResult, UniqueIpRecord, SYSTEM_DNS_SOURCE,
};
use crate::types::ServerSelection;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Resolves domains against every selected server concurrently
#[derive(Clone)]
pub struct ParallelResolver {
    resolver: Arc<DnsResolver>,
    pool: Option<Arc<SmartDnsPool>>,
    selection: ServerSelection,
    logger: Option<Arc<ProbeLogger>>,
}

impl ParallelResolver {
    pub fn new(resolver: Arc<DnsResolver>) -> Self {
        Self {
            logger: resolver.logger().cloned(),
            resolver,
            pool: None,
            selection: ServerSelection::All,
        }
    }

    /// Resolver plus a health pool, both built from `config`
    pub fn from_config(config: &Config, backend: Arc<dyn ResolutionBackend>) -> Result<Self> {
        let resolver = Arc::new(DnsResolver::from_config(config, backend)?);
        let pool = Arc::new(SmartDnsPool::from_config(config)?);
        Ok(Self::new(resolver).with_pool(pool, config.server_selection))
    }

    pub fn with_pool(mut self, pool: Arc<SmartDnsPool>, selection: ServerSelection) -> Self {
        self.pool = Some(pool);
        self.selection = selection;
        self
    }

    pub fn with_logger(mut self, logger: Arc<ProbeLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn resolver(&self) -> &Arc<DnsResolver> {
        &self.resolver
    }

    pub fn pool(&self) -> Option<&Arc<SmartDnsPool>> {
        self.pool.as_ref()
    }

    /// Servers queried for each domain
    pub fn select_servers(&self) -> Vec<String> {
        match (&self.pool, self.selection) {
            (Some(pool), ServerSelection::Scored) => pool.select_servers(None),
            (Some(pool), ServerSelection::Grouped) => pool.select_servers_by_group(None),
            _ => self.resolver.servers().to_vec(),
        }
    }

    /// Resolve one domain through all selected servers
    ///
    /// With `fast_fail`, collection stops once five servers have answered and
    /// the remaining lookups are aborted.
    pub async fn resolve(&self, domain: &str, fast_fail: bool) -> DomainResolution {
        let servers = self.select_servers();
        let permits = self.resolver.dns_threads().min(servers.len()).max(1);
        let semaphore = Arc::new(Semaphore::new(permits));
        let mut tasks = JoinSet::new();

        for (index, server) in servers.iter().enumerate() {
            let resolver = Arc::clone(&self.resolver);
            let semaphore = Arc::clone(&semaphore);
            let domain = domain.to_string();
            let server = server.clone();
            tasks.spawn(async move {
                let result = match semaphore.acquire_owned().await {
                    Ok(_permit) => resolver.resolve_domain(&domain, &server).await,
                    Err(_) => ResolutionResult::task_failed(server, "worker pool closed"),
                };
                (index, result)
            });
        }

        let mut reported = vec![false; servers.len()];
        let mut results = Vec::with_capacity(servers.len());
        let mut successes = 0usize;
        let mut stopped_early = false;
        let mut task_error = None;

        while let Some(joined) = tasks.join_next().await {
            let (index, result) = match joined {
                Ok(done) => done,
                Err(e) => {
                    // Attributed to its server once collection finishes
                    task_error = Some(AppError::from(e));
                    continue;
                }
            };
            reported[index] = true;

            if let Some(pool) = &self.pool {
                if result.was_attempted() {
                    pool.update_server_metrics(&result.server, result.success, result.elapsed_ms);
                }
            }
            if result.success {
                successes += 1;
            }
            results.push(result);

            if fast_fail && successes >= FAST_FAIL_SUCCESS_TARGET && !tasks.is_empty() {
                tasks.abort_all();
                self.resolver.record_fast_fail();
                stopped_early = true;
                break;
            }
        }

        if !stopped_early {
            for (server, _) in servers.iter().zip(&reported).filter(|(_, seen)| !**seen) {
                let error = task_error
                    .take()
                    .unwrap_or_else(|| AppError::test_execution("resolution task did not report"));
                if let Some(logger) = &self.logger {
                    logger.log_task_failure(server, &error).await;
                }
                results.push(ResolutionResult::task_failed(server.as_str(), error.to_string()));
            }
        }

        self.assemble(domain, results).await
    }

    async fn assemble(&self, domain: &str, results: Vec<ResolutionResult>) -> DomainResolution {
        let mut unique_ips: BTreeMap<IpAddr, UniqueIpRecord> = BTreeMap::new();
        for result in results.iter().filter(|r| r.success) {
            for ip in &result.ips {
                unique_ips.entry(*ip).or_default().merge(&result.server, result.elapsed_ms);
            }
        }

        let analysis = ResolutionAnalysis::from_results(&results, unique_ips.len());
        let verdict = detect_poisoning(&results);
        if verdict.is_poisoned {
            if let Some(logger) = &self.logger {
                logger
                    .log_poisoning(domain, verdict.suspect_server.as_deref(), &verdict.message)
                    .await;
            }
        }

        let mut used_system_fallback = false;
        if analysis.successful_servers == 0 {
            let system = self.resolver.resolve_with_system(domain).await;
            if let Some(logger) = &self.logger {
                logger.log_system_fallback(domain, system.ips.len()).await;
            }
            for ip in &system.ips {
                unique_ips.entry(*ip).or_default().merge(SYSTEM_DNS_SOURCE, system.elapsed_ms);
            }
            used_system_fallback = true;
        }

        DomainResolution {
            domain: domain.to_string(),
            analysis,
            is_poisoned: verdict.is_poisoned,
            poison_message: verdict.message,
            suspect_server: verdict.suspect_server,
            unique_ips,
            raw_results: results,
            used_system_fallback,
        }
    }

    /// Resolve many domains concurrently, returned in input order
    pub async fn resolve_many(&self, domains: &[String], fast_fail: bool) -> Vec<DomainResolution> {
        let domains = normalize_domains(domains);
        if domains.is_empty() {
            return Vec::new();
        }

        let permits = self.resolver.dns_threads().min(domains.len()).max(1);
        let semaphore = Arc::new(Semaphore::new(permits));
        let mut tasks = JoinSet::new();

        for (index, domain) in domains.iter().enumerate() {
            let this = self.clone();
            let semaphore = Arc::clone(&semaphore);
            let domain = domain.clone();
            tasks.spawn(async move {
                let resolution = match semaphore.acquire_owned().await {
                    Ok(_permit) => this.resolve(&domain, fast_fail).await,
                    Err(_) => DomainResolution::failed(domain, "resolution failed"),
                };
                (index, resolution)
            });
        }

        let mut slots: Vec<Option<DomainResolution>> = vec![None; domains.len()];
        while let Some(joined) = tasks.join_next().await {
            if let Ok((index, resolution)) = joined {
                slots[index] = Some(resolution);
            }
        }

        let mut resolutions = Vec::with_capacity(domains.len());
        for (domain, slot) in domains.into_iter().zip(slots) {
            match slot {
                Some(resolution) => resolutions.push(resolution),
                None => {
                    if let Some(logger) = &self.logger {
                        logger
                            .log_task_failure(&domain, &AppError::test_execution("domain resolution task failed"))
                            .await;
                    }
                    resolutions.push(DomainResolution::failed(domain, "resolution failed"));
                }
            }
        }
        resolutions
    }

    /// One domain at a time, each still fanned out across servers
    pub async fn resolve_sequential(&self, domains: &[String], fast_fail: bool) -> Vec<DomainResolution> {
        let mut resolutions = Vec::new();
        for domain in normalize_domains(domains) {
            resolutions.push(self.resolve(&domain, fast_fail).await);
        }
        resolutions
    }

    /// Resolutions keyed by domain together with every IP seen
    pub async fn comprehensive_resolve(
        &self,
        domains: &[String],
        fast_fail: bool,
    ) -> (BTreeMap<String, DomainResolution>, BTreeSet<IpAddr>) {
        let resolutions = self.resolve_many(domains, fast_fail).await;
        let ips = all_unique_ips(&resolutions);
        let by_domain = resolutions.into_iter().map(|r| (r.domain.clone(), r)).collect();
        (by_domain, ips)
    }
}

/// Trim, lowercase, drop empties and duplicates; first occurrence wins
pub fn normalize_domains(domains: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    domains
        .iter()
        .map(|d| d.trim().to_lowercase())
        .filter(|d| !d.is_empty())
        .filter(|d| seen.insert(d.clone()))
        .collect()
}

/// Union of the unique IPs of every resolution
pub fn all_unique_ips<'a, I>(resolutions: I) -> BTreeSet<IpAddr>
where
    I: IntoIterator<Item = &'a DomainResolution>,
{
    resolutions
        .into_iter()
        .flat_map(|r| r.unique_ips.keys().copied())
        .collect()
}
