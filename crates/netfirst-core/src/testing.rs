//! Shared helpers for unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::header::{self, HeaderValue};
use reqwest::{Method, StatusCode};
use url::Url;

use crate::fetch::{FetchError, Fetcher};
use crate::http::{Request, RequestKey, Response};
use crate::store::CachedResponse;

pub fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
}

pub fn key(s: &str) -> RequestKey {
    RequestKey::new(&Method::GET, &url(s))
}

pub fn snapshot(body: &str) -> CachedResponse {
    CachedResponse::capture(&Response::new(StatusCode::OK, body))
}

/// Fetcher answering from a fixed table. Unknown URLs fail as unreachable.
#[derive(Default)]
pub struct ScriptedFetcher {
    routes: Mutex<HashMap<String, Response>>,
    calls: AtomicUsize,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, url: &str, status: StatusCode, body: &str) -> Self {
        let response = Response::new(status, body)
            .with_header(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        self.routes.lock().insert(url.to_string(), response);
        self
    }

    /// Take the network down for one URL.
    pub fn fail(&self, url: &str) {
        self.routes.lock().remove(url);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.routes
            .lock()
            .get(request.url.as_str())
            .cloned()
            .ok_or_else(|| FetchError::Unreachable(request.url.to_string()))
    }
}
