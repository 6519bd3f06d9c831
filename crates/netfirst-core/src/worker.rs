//! Event facade binding the lifecycle manager, router and retrieval policy to
//! the host runtime.
//!
//! The host calls `on_install` when a new version is first started,
//! `on_activate` right after, and `on_intercept` for every outgoing request.
//! Install asks to be activated immediately and activation takes control of
//! already-open clients, so a new version is live as soon as possible.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, warn};
use url::Url;

use crate::fetch::Fetcher;
use crate::http::Request;
use crate::lifecycle::{Manifest, ReclaimReport, SeedReport, StoreLifecycle};
use crate::offline::OfflineFallback;
use crate::policy::{Retrieval, RetrievalPolicy};
use crate::router::{Classification, Scope};
use crate::store::CacheStorage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Parsed,
    Installing,
    Installed,
    Activating,
    Activated,
}

/// Everything a worker needs besides its store and network handles.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub version: String,
    pub app_url: Url,
    pub scope: Scope,
    pub manifest: Manifest,
    pub offline: OfflineFallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOutcome {
    pub seed: SeedReport,
    /// Activate right away instead of waiting for older instances to finish.
    pub skip_waiting: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivateOutcome {
    pub reclaim: ReclaimReport,
    /// Take control of already-open clients without a reload.
    pub claim_clients: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootOutcome {
    /// The current store already existed; seeding was skipped.
    Resumed(ActivateOutcome),
    /// First start of this version: installed, then activated.
    Fresh(InstallOutcome, ActivateOutcome),
}

#[derive(Debug)]
pub enum Interception {
    /// Not ours. The host performs the request itself, unchanged.
    PassThrough(Request),
    Respond(Retrieval),
}

pub struct Worker {
    version: String,
    manifest: Manifest,
    scope: Scope,
    storage: Arc<dyn CacheStorage>,
    lifecycle: StoreLifecycle,
    policy: RetrievalPolicy,
    state: RwLock<WorkerState>,
}

impl Worker {
    pub fn new(
        settings: WorkerSettings,
        storage: Arc<dyn CacheStorage>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Self {
        let lifecycle = StoreLifecycle::new(
            Arc::clone(&storage),
            Arc::clone(&fetcher),
            settings.app_url,
        );
        let policy = RetrievalPolicy::new(
            fetcher,
            Arc::clone(&storage),
            settings.version.clone(),
            settings.offline,
        );

        Self {
            version: settings.version,
            manifest: settings.manifest,
            scope: settings.scope,
            storage,
            lifecycle,
            policy,
            state: RwLock::new(WorkerState::Parsed),
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn state(&self) -> WorkerState {
        *self.state.read()
    }

    fn set_state(&self, state: WorkerState) {
        *self.state.write() = state;
    }

    pub async fn on_install(&self) -> InstallOutcome {
        info!(version = %self.version, "Installing");
        self.set_state(WorkerState::Installing);
        let seed = self.lifecycle.initialize(&self.version, &self.manifest).await;
        self.set_state(WorkerState::Installed);

        InstallOutcome {
            seed,
            skip_waiting: true,
        }
    }

    pub async fn on_activate(&self) -> ActivateOutcome {
        info!(version = %self.version, "Activating");
        self.set_state(WorkerState::Activating);
        let reclaim = self.lifecycle.reclaim_stale(&self.version).await;
        self.set_state(WorkerState::Activated);

        ActivateOutcome {
            reclaim,
            claim_clients: true,
        }
    }

    /// Start-up as the host runtime does it: a version whose store already
    /// exists is resumed without re-seeding; anything else is installed and
    /// activated.
    pub async fn boot(&self) -> BootOutcome {
        let installed = match self.storage.list_names().await {
            Ok(names) => names.iter().any(|name| *name == self.version),
            Err(e) => {
                warn!(error = %e, "Could not list stores, reinstalling");
                false
            }
        };

        if installed {
            debug!(version = %self.version, "Store present, resuming");
            BootOutcome::Resumed(self.on_activate().await)
        } else {
            let install = self.on_install().await;
            let activate = self.on_activate().await;
            BootOutcome::Fresh(install, activate)
        }
    }

    /// Classify and, for managed requests, run the retrieval policy.
    /// Nothing is intercepted before activation.
    pub async fn on_intercept(&self, request: Request) -> Interception {
        if self.state() != WorkerState::Activated {
            debug!(url = %request.url, "Not active yet, passing through");
            return Interception::PassThrough(request);
        }

        match self.scope.classify(&request) {
            Classification::PassThrough => Interception::PassThrough(request),
            Classification::Managed => Interception::Respond(self.policy.retrieve(&request).await),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::offline::RETRY_BUTTON_TEXT;
    use crate::policy::ResponseSource;
    use crate::store::MemoryStorage;
    use crate::testing::{key, snapshot, url, ScriptedFetcher};
    use reqwest::StatusCode;

    const APP: &str = "https://joseprico.github.io/CNT/";
    const INDEX: &str = "https://joseprico.github.io/CNT/index.html";

    fn settings(version: &str) -> WorkerSettings {
        let app_url = url(APP);
        WorkerSettings {
            version: version.to_string(),
            scope: Scope::from_app_url(&app_url).unwrap(),
            app_url,
            manifest: Manifest::new(vec!["./index.html".to_string()]),
            offline: OfflineFallback::default(),
        }
    }

    fn worker(version: &str, fetcher: Arc<ScriptedFetcher>, storage: Arc<MemoryStorage>) -> Worker {
        Worker::new(settings(version), storage, fetcher)
    }

    fn page(u: &str) -> Request {
        Request::get(url(u)).with_accept("text/html")
    }

    #[tokio::test]
    async fn test_install_then_activate() {
        let fetcher = Arc::new(ScriptedFetcher::new().respond(INDEX, StatusCode::OK, "<html>"));
        let worker = worker("cnt-v3", fetcher, Arc::new(MemoryStorage::new()));
        assert_eq!(worker.state(), WorkerState::Parsed);

        let install = worker.on_install().await;
        assert_eq!(install.seed, SeedReport::Seeded { entries: 1 });
        assert!(install.skip_waiting);
        assert_eq!(worker.state(), WorkerState::Installed);

        let activate = worker.on_activate().await;
        assert!(activate.claim_clients);
        assert_eq!(worker.state(), WorkerState::Activated);
    }

    #[tokio::test]
    async fn test_passes_through_before_activation() {
        let fetcher = Arc::new(ScriptedFetcher::new().respond(INDEX, StatusCode::OK, "<html>"));
        let worker = worker("cnt-v3", fetcher.clone(), Arc::new(MemoryStorage::new()));

        assert!(matches!(
            worker.on_intercept(page(INDEX)).await,
            Interception::PassThrough(_)
        ));
        assert_eq!(fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn test_foreign_host_is_not_touched() {
        let fetcher = Arc::new(ScriptedFetcher::new());
        let storage = Arc::new(MemoryStorage::new());
        let worker = worker("cnt-v3", fetcher.clone(), storage.clone());
        worker.on_activate().await;

        let request = Request::get(url("https://other.example.org/data.json"));
        match worker.on_intercept(request).await {
            Interception::PassThrough(back) => {
                assert_eq!(back.url.as_str(), "https://other.example.org/data.json")
            }
            other => panic!("expected pass-through, got {:?}", other),
        }

        assert_eq!(fetcher.calls(), 0);
        assert!(storage.list_names().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_offline_page_load_uses_store_then_offline_document() {
        let fetcher = Arc::new(ScriptedFetcher::new());
        let storage = Arc::new(MemoryStorage::new());
        let worker = worker("cnt-v3", fetcher, storage.clone());
        worker.on_activate().await;

        // Nothing stored yet
        match worker.on_intercept(page(INDEX)).await {
            Interception::Respond(r) => {
                assert_eq!(r.source, ResponseSource::Synthetic);
                assert!(r.response.text().contains(RETRY_BUTTON_TEXT));
            }
            other => panic!("expected response, got {:?}", other),
        }

        storage.put("cnt-v3", key(INDEX), snapshot("cached index")).await.unwrap();
        match worker.on_intercept(page(INDEX)).await {
            Interception::Respond(r) => {
                assert_eq!(r.source, ResponseSource::Store);
                assert_eq!(r.response.text(), "cached index");
            }
            other => panic!("expected response, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_new_version_replaces_old_store() {
        let storage = Arc::new(MemoryStorage::new());
        storage.put("cnt-v2", key(INDEX), snapshot("v2 index")).await.unwrap();

        let fetcher = Arc::new(ScriptedFetcher::new().respond(INDEX, StatusCode::OK, "v3 index"));
        let worker = worker("cnt-v3", fetcher, storage.clone());

        let outcome = worker.boot().await;
        assert!(matches!(outcome, BootOutcome::Fresh(..)));

        assert_eq!(storage.list_names().await.unwrap(), vec!["cnt-v3"]);
        assert!(storage.get("cnt-v2", &key(INDEX)).await.unwrap().is_none());
        let current = storage.get("cnt-v3", &key(INDEX)).await.unwrap().unwrap();
        assert_eq!(current.body, b"v3 index");
    }

    #[tokio::test]
    async fn test_boot_resumes_without_reseeding() {
        let storage = Arc::new(MemoryStorage::new());
        storage.open("cnt-v3").await.unwrap();
        storage.open("cnt-v1").await.unwrap();

        let fetcher = Arc::new(ScriptedFetcher::new().respond(INDEX, StatusCode::OK, "<html>"));
        let worker = worker("cnt-v3", fetcher.clone(), storage.clone());

        match worker.boot().await {
            BootOutcome::Resumed(activate) => assert_eq!(activate.reclaim.deleted, vec!["cnt-v1"]),
            other => panic!("expected resume, got {:?}", other),
        }
        assert_eq!(fetcher.calls(), 0);
        assert_eq!(worker.state(), WorkerState::Activated);
    }
}
