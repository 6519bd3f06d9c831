//! netfirst core library.
//!
//! A network-first caching intermediary for a single-page web application.
//! Requests for resources the application deploys itself are fetched live and
//! written back to a versioned local store; when the network fails they are
//! answered from that store, or with a synthetic offline response.
//!
//! The pieces, bottom-up:
//! - `fetch`: the network side (`Fetcher` trait, reqwest-backed `HttpFetcher`)
//! - `store`: versioned key→response stores (`CacheStorage`, memory and disk)
//! - `lifecycle`: seeding the current store and reclaiming stale ones
//! - `router`: pass-through vs. managed classification
//! - `policy`: network-first retrieval with store and synthetic fallback
//! - `worker`: the install / activate / intercept event facade

pub mod config;
pub mod fetch;
pub mod http;
pub mod lifecycle;
pub mod offline;
pub mod policy;
pub mod router;
pub mod store;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use config::Config;
pub use fetch::{FetchError, Fetcher, HttpFetcher};
pub use http::{Request, RequestKey, Response};
pub use lifecycle::{Manifest, ReclaimReport, SeedReport, StoreLifecycle};
pub use offline::OfflineFallback;
pub use policy::{ResponseSource, Retrieval, RetrievalPolicy, WriteBack};
pub use router::{Classification, Scope};
pub use store::{CacheStorage, CachedResponse, DiskStorage, MemoryStorage, StoreError};
pub use worker::{
    ActivateOutcome, BootOutcome, InstallOutcome, Interception, Worker, WorkerSettings, WorkerState,
};
