use crate::model::CanonicalRow;
use crate::traits::{LookupError, VersionSource};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

/// Outcome of one enrichment pass.
#[derive(Debug, Default, Clone)]
pub struct EnrichmentReport {
    /// Package name to latest version; failed lookups map to "".
    pub latest: HashMap<String, String>,
    pub attempted: usize,
    pub failed: usize,
}

/// Fans registry lookups out over tokio tasks with bounded concurrency.
pub struct EnrichmentExecutor {
    semaphore: Arc<Semaphore>,
    lookup_timeout: Option<Duration>,
}

impl EnrichmentExecutor {
    pub fn new(concurrency_limit: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(concurrency_limit.max(1))),
            lookup_timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.lookup_timeout = timeout;
        self
    }

    /// Looks up the latest version of one package, absorbing every failure.
    #[instrument(skip(self, source))]
    pub async fn lookup<S>(&self, source: Arc<S>, package: &str) -> String
    where
        S: VersionSource + ?Sized + 'static,
    {
        match self.try_lookup(source, package).await {
            Ok(version) => version,
            Err(e) => {
                warn!(package, error = %e, "Latest version lookup failed");
                String::new()
            }
        }
    }

    async fn try_lookup<S>(&self, source: Arc<S>, package: &str) -> Result<String, LookupError>
    where
        S: VersionSource + ?Sized + 'static,
    {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|e| LookupError::Unknown(format!("Semaphore error: {}", e)))?;

        debug!("Querying {} for {}", source.registry_id(), package);

        match self.lookup_timeout {
            Some(limit) => tokio::time::timeout(limit, source.latest_version(package))
                .await
                .map_err(|_| LookupError::Timeout(limit))?,
            None => source.latest_version(package).await,
        }
    }

    /// Looks up every distinct package name in `packages` concurrently.
    #[instrument(skip_all, fields(packages = packages.len()))]
    pub async fn enrich<S>(self: &Arc<Self>, source: Arc<S>, packages: &[String]) -> EnrichmentReport
    where
        S: VersionSource + ?Sized + 'static,
    {
        let mut report = EnrichmentReport::default();
        let mut tasks = JoinSet::new();

        for package in packages {
            if report.latest.contains_key(package) {
                continue;
            }
            report.latest.insert(package.clone(), String::new());

            let executor = Arc::clone(self);
            let source = Arc::clone(&source);
            let package = package.clone();
            tasks.spawn(async move {
                let version = executor.lookup(source, &package).await;
                (package, version)
            });
        }
        report.attempted = report.latest.len();

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((package, version)) => {
                    report.latest.insert(package, version);
                }
                Err(e) => warn!("Lookup task panicked or was cancelled: {}", e),
            }
        }

        report.failed = report.latest.values().filter(|v| v.is_empty()).count();
        info!(
            attempted = report.attempted,
            failed = report.failed,
            "Finished latest version lookups"
        );
        report
    }
}

impl EnrichmentReport {
    /// Writes looked-up versions into `rows`. Rows without a result keep "".
    pub fn apply(&self, rows: &mut [CanonicalRow]) {
        for row in rows {
            row.latest_version = self
                .latest
                .get(&row.discovery.package)
                .cloned()
                .unwrap_or_default();
        }
    }
}
