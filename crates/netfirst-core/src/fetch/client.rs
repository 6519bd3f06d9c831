//! reqwest-backed fetcher.
//!
//! Requests are forwarded as-is: same method, URL and headers. The full body
//! is read before returning so the response can be both handed to the caller
//! and snapshotted into a store.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use super::{FetchError, Fetcher};
use crate::http::{Request, Response};

/// HTTP fetcher over a pooled reqwest client.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Create a fetcher with no timeout of its own; failures are whatever the
    /// network layer reports.
    pub fn new() -> Result<Self, FetchError> {
        Self::with_timeout(None)
    }

    pub fn with_timeout(timeout: Option<Duration>) -> Result<Self, FetchError> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
        })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        let response = self
            .client
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone())
            .send()
            .await
            .map_err(FetchError::from_transport)?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(FetchError::from_transport)?
            .to_vec();

        debug!(url = %request.url, status = status.as_u16(), bytes = body.len(), "Fetched");

        Ok(Response {
            status,
            headers,
            body,
        })
    }
}
