//! Store lifecycle: seeding the current version's store on install and
//! reclaiming every other store on activation.
//!
//! Both operations are best effort. They log what went wrong and return a
//! report; neither can abort the install or activate sequence.

use std::sync::Arc;

use anyhow::{Context, Result};
use futures::future::{join_all, try_join_all};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use url::Url;

use crate::fetch::{FetchError, Fetcher};
use crate::http::{Request, RequestKey};
use crate::store::{CacheStorage, CachedResponse};

/// Fixed, ordered list of resources seeded into a fresh store. Entries are
/// relative to the application URL or absolute.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    entries: Vec<String>,
}

impl Manifest {
    pub fn new(entries: Vec<String>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve every entry against the application URL, in order.
    pub fn resolve(&self, base: &Url) -> Result<Vec<Url>, url::ParseError> {
        self.entries.iter().map(|entry| base.join(entry)).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeedReport {
    Seeded { entries: usize },
    Failed { reason: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReclaimReport {
    pub deleted: Vec<String>,
    pub failed: Vec<String>,
}

#[derive(Clone)]
pub struct StoreLifecycle {
    storage: Arc<dyn CacheStorage>,
    fetcher: Arc<dyn Fetcher>,
    base_url: Url,
}

impl StoreLifecycle {
    pub fn new(storage: Arc<dyn CacheStorage>, fetcher: Arc<dyn Fetcher>, base_url: Url) -> Self {
        Self {
            storage,
            fetcher,
            base_url,
        }
    }

    /// Open the store for `version` and seed it with the manifest.
    ///
    /// Resources are fetched in parallel and stored as one batch: if any of
    /// them fails, nothing is stored. The failure is logged and the store is
    /// left open, so installation still completes.
    pub async fn initialize(&self, version: &str, manifest: &Manifest) -> SeedReport {
        if let Err(e) = self.storage.open(version).await {
            warn!(store = version, error = %e, "Could not open store");
            return SeedReport::Failed {
                reason: e.to_string(),
            };
        }

        info!(store = version, resources = manifest.len(), "Caching essential resources");
        match self.seed(version, manifest).await {
            Ok(entries) => SeedReport::Seeded { entries },
            Err(e) => {
                let reason = format!("{:#}", e);
                warn!(store = version, error = %reason, "Some resources could not be cached");
                SeedReport::Failed { reason }
            }
        }
    }

    async fn seed(&self, version: &str, manifest: &Manifest) -> Result<usize> {
        let urls = manifest
            .resolve(&self.base_url)
            .context("Invalid manifest entry")?;

        let entries = try_join_all(urls.into_iter().map(|url| self.fetch_entry(url))).await?;
        let count = entries.len();

        self.storage
            .put_all(version, entries)
            .await
            .context("Failed to store manifest resources")?;
        Ok(count)
    }

    async fn fetch_entry(&self, url: Url) -> Result<(RequestKey, CachedResponse)> {
        let request = Request::get(url);
        let response = self
            .fetcher
            .fetch(&request)
            .await
            .with_context(|| format!("Failed to fetch {}", request.url))?;
        FetchError::require_success(request.url.as_str(), response.status)?;
        Ok((request.key(), CachedResponse::capture(&response)))
    }

    /// Delete every store not named `current`. Deletions run in parallel;
    /// failures are logged and reported, never raised.
    pub async fn reclaim_stale(&self, current: &str) -> ReclaimReport {
        let names = match self.storage.list_names().await {
            Ok(names) => names,
            Err(e) => {
                warn!(error = %e, "Could not list stores, skipping cleanup");
                return ReclaimReport::default();
            }
        };

        let stale: Vec<String> = names.into_iter().filter(|name| name != current).collect();
        let results = join_all(stale.iter().map(|name| self.storage.delete_named(name))).await;

        let mut report = ReclaimReport::default();
        for (name, result) in stale.into_iter().zip(results) {
            match result {
                Ok(_) => {
                    info!(store = %name, "Deleted old store");
                    report.deleted.push(name);
                }
                Err(e) => {
                    warn!(store = %name, error = %e, "Could not delete old store");
                    report.failed.push(name);
                }
            }
        }
        report
    }
}

// ============================================================================
// Tests
// ============================================================================
