//! Network access module.
//!
//! This module provides the `Fetcher` trait the retrieval policy and the
//! lifecycle manager use to reach the network, and `HttpFetcher`, its
//! reqwest-backed implementation.
//!
//! A fetcher only fails on transport problems. Any HTTP status, including
//! 4xx and 5xx, is a successful fetch.

pub mod client;
pub mod error;

use async_trait::async_trait;

use crate::http::{Request, Response};

pub use client::HttpFetcher;
pub use error::FetchError;

#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError>;
}
