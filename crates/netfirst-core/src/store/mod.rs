//! Versioned response stores.
//!
//! A store is a named key→response mapping. The name doubles as the version
//! identifier: only the store named after the running version is current,
//! every other store is stale and gets reclaimed on activation.
//!
//! Two backends implement `CacheStorage`:
//! - `MemoryStorage`: process-local, used for tests and embedding
//! - `DiskStorage`: one directory per store, one JSON file per entry
//!
//! Every single operation is atomic on its own. There are no multi-operation
//! transactions, so concurrent writes to one key are last-write-wins.

pub mod disk;
pub mod memory;
pub mod snapshot;

use async_trait::async_trait;
use thiserror::Error;

use crate::http::RequestKey;

pub use disk::DiskStorage;
pub use memory::MemoryStorage;
pub use snapshot::CachedResponse;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Invalid store name: {0:?}")]
    InvalidName(String),

    #[error("Store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode or decode store entry: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt store entry: {0}")]
    Corrupt(String),
}

#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Open the named store, creating it if absent.
    async fn open(&self, name: &str) -> Result<(), StoreError>;

    /// Look up a key. A missing store is simply a miss.
    async fn get(
        &self,
        name: &str,
        key: &RequestKey,
    ) -> Result<Option<CachedResponse>, StoreError>;

    /// Insert or replace one entry, creating the store if absent.
    async fn put(
        &self,
        name: &str,
        key: RequestKey,
        response: CachedResponse,
    ) -> Result<(), StoreError>;

    /// Insert a batch of entries. Either all of them land or none do.
    async fn put_all(
        &self,
        name: &str,
        entries: Vec<(RequestKey, CachedResponse)>,
    ) -> Result<(), StoreError>;

    /// Delete a whole store. Returns whether it existed.
    async fn delete_named(&self, name: &str) -> Result<bool, StoreError>;

    /// Names of all existing stores, sorted.
    async fn list_names(&self) -> Result<Vec<String>, StoreError>;

    /// All entries of a store, sorted by key. A missing store is empty.
    async fn entries(
        &self,
        name: &str,
    ) -> Result<Vec<(RequestKey, CachedResponse)>, StoreError>;
}

/// Store names become directory names, so they must be a single plain path
/// component.
pub(crate) fn validate_name(name: &str) -> Result<(), StoreError> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.starts_with('.')
        || name.contains(['/', '\\', '\0']);
    if bad {
        Err(StoreError::InvalidName(name.to_string()))
    } else {
        Ok(())
    }
}
