//! Network-first retrieval with store and synthetic fallback.
//!
//! For a managed request:
//! 1. fetch from the network
//! 2. a 200 is written back to the current store in a detached task and
//!    returned unchanged; any other status is returned as-is, uncached
//! 3. only a transport failure falls back to the store (no freshness check)
//! 4. a store miss ends in a synthetic response: the offline page for HTML
//!    requests, a 408 otherwise
//!
//! `retrieve` cannot fail. Every path ends in a response.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::fetch::Fetcher;
use crate::http::{Request, RequestKey, Response};
use crate::offline::OfflineFallback;
use crate::store::{CacheStorage, CachedResponse};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Network,
    Store,
    Synthetic,
}

/// Handle on a detached write-back task.
///
/// Dropping it leaves the task running. Failures are logged inside the task
/// and never reach the caller.
#[derive(Debug)]
pub struct WriteBack {
    handle: JoinHandle<()>,
}

impl WriteBack {
    /// Wait for the write to finish, for hosts that must not exit early.
    pub async fn settled(self) {
        if let Err(e) = self.handle.await {
            warn!(error = %e, "Write-back task aborted");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

#[derive(Debug)]
pub struct Retrieval {
    pub response: Response,
    pub source: ResponseSource,
    pub write_back: Option<WriteBack>,
}

impl Retrieval {
    fn new(response: Response, source: ResponseSource) -> Self {
        Self {
            response,
            source,
            write_back: None,
        }
    }
}

#[derive(Clone)]
pub struct RetrievalPolicy {
    fetcher: Arc<dyn Fetcher>,
    storage: Arc<dyn CacheStorage>,
    store_name: String,
    offline: OfflineFallback,
}

impl RetrievalPolicy {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        storage: Arc<dyn CacheStorage>,
        store_name: impl Into<String>,
        offline: OfflineFallback,
    ) -> Self {
        Self {
            fetcher,
            storage,
            store_name: store_name.into(),
            offline,
        }
    }

    pub fn store_name(&self) -> &str {
        &self.store_name
    }

    pub async fn retrieve(&self, request: &Request) -> Retrieval {
        match self.fetcher.fetch(request).await {
            Ok(response) => {
                let write_back = if response.is_storable() {
                    Some(self.spawn_write_back(request.key(), &response))
                } else {
                    debug!(
                        url = %request.url,
                        status = response.status.as_u16(),
                        "Not caching non-200 response"
                    );
                    None
                };
                Retrieval {
                    response,
                    source: ResponseSource::Network,
                    write_back,
                }
            }
            Err(e) => {
                debug!(url = %request.url, error = %e, "Network failed, falling back to store");
                self.fallback(request).await
            }
        }
    }

    fn spawn_write_back(&self, key: RequestKey, response: &Response) -> WriteBack {
        let storage = Arc::clone(&self.storage);
        let store_name = self.store_name.clone();
        let snapshot = CachedResponse::capture(response);

        let handle = tokio::spawn(async move {
            if let Err(e) = storage.put(&store_name, key.clone(), snapshot).await {
                warn!(store = %store_name, key = %key, error = %e, "Write-back failed");
            }
        });
        WriteBack { handle }
    }

    async fn fallback(&self, request: &Request) -> Retrieval {
        let key = request.key();
        match self.storage.get(&self.store_name, &key).await {
            Ok(Some(cached)) => match cached.to_response() {
                Ok(response) => {
                    info!(url = %request.url, "Serving from store");
                    return Retrieval::new(response, ResponseSource::Store);
                }
                Err(e) => warn!(key = %key, error = %e, "Ignoring unusable store entry"),
            },
            Ok(None) => {}
            Err(e) => {
                warn!(store = %self.store_name, key = %key, error = %e, "Store lookup failed")
            }
        }

        debug!(url = %request.url, html = request.accepts_html(), "Store miss, answering offline");
        Retrieval::new(self.offline.respond_to(request), ResponseSource::Synthetic)
    }
}

// ============================================================================
// Tests
// ============================================================================
