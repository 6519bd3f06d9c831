use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{validate_name, CacheStorage, CachedResponse, StoreError};
use crate::http::RequestKey;

type Entries = HashMap<RequestKey, CachedResponse>;

/// In-process store backend. Each operation runs inside a single lock
/// critical section.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    stores: RwLock<BTreeMap<String, Entries>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStorage for MemoryStorage {
    async fn open(&self, name: &str) -> Result<(), StoreError> {
        validate_name(name)?;
        self.stores
            .write()
            .await
            .entry(name.to_string())
            .or_default();
        Ok(())
    }

    async fn get(
        &self,
        name: &str,
        key: &RequestKey,
    ) -> Result<Option<CachedResponse>, StoreError> {
        Ok(self
            .stores
            .read()
            .await
            .get(name)
            .and_then(|entries| entries.get(key))
            .cloned())
    }

    async fn put(
        &self,
        name: &str,
        key: RequestKey,
        response: CachedResponse,
    ) -> Result<(), StoreError> {
        validate_name(name)?;
        self.stores
            .write()
            .await
            .entry(name.to_string())
            .or_default()
            .insert(key, response);
        Ok(())
    }

    async fn put_all(
        &self,
        name: &str,
        entries: Vec<(RequestKey, CachedResponse)>,
    ) -> Result<(), StoreError> {
        validate_name(name)?;
        self.stores
            .write()
            .await
            .entry(name.to_string())
            .or_default()
            .extend(entries);
        Ok(())
    }

    async fn delete_named(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self.stores.write().await.remove(name).is_some())
    }

    async fn list_names(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.stores.read().await.keys().cloned().collect())
    }

    async fn entries(
        &self,
        name: &str,
    ) -> Result<Vec<(RequestKey, CachedResponse)>, StoreError> {
        let mut entries: Vec<_> = self
            .stores
            .read()
            .await
            .get(name)
            .map(|entries| {
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(entries)
    }
}
