//! Filesystem store backend.
//!
//! Layout under the storage root:
//!
//! ```text
//! <root>/<store name>/<sha256(key) hex>.json
//! ```
//!
//! Each entry file holds the request key next to the snapshot so a store can
//! be listed without knowing the keys up front. Writes go to a unique temp
//! file in the same directory and are renamed into place.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::{debug, warn};

use super::{validate_name, CacheStorage, CachedResponse, StoreError};
use crate::http::RequestKey;

const ENTRY_EXTENSION: &str = "json";

/// Distinguishes storage instances within this process in temp file names.
static INSTANCE_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Serialize, Deserialize)]
struct DiskEntry {
    key: RequestKey,
    #[serde(flatten)]
    response: CachedResponse,
}

#[derive(Debug, Clone)]
pub struct DiskStorage {
    root: PathBuf,
    instance: u64,
    /// Shared by clones so concurrent writers never pick the same temp file.
    temp_seq: Arc<AtomicU64>,
}

impl DiskStorage {
    pub fn new(root: PathBuf) -> Result<Self, StoreError> {
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            instance: INSTANCE_COUNTER.fetch_add(1, Ordering::Relaxed),
            temp_seq: Arc::new(AtomicU64::new(0)),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn store_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn entry_file_name(key: &RequestKey) -> String {
        let digest = Sha256::digest(key.as_str().as_bytes());
        format!("{}.{}", hex::encode(digest), ENTRY_EXTENSION)
    }

    fn entry_path(&self, name: &str, key: &RequestKey) -> PathBuf {
        self.store_dir(name).join(Self::entry_file_name(key))
    }

    fn temp_path(&self, name: &str, key: &RequestKey, seq: u64) -> PathBuf {
        self.store_dir(name).join(format!(
            ".{}.{}-{}-{}.tmp",
            Self::entry_file_name(key),
            std::process::id(),
            self.instance,
            seq
        ))
    }

    /// Serialize an entry to a fresh temp file next to its final path.
    async fn write_temp(
        &self,
        name: &str,
        key: &RequestKey,
        response: CachedResponse,
    ) -> Result<(PathBuf, PathBuf), StoreError> {
        let target = self.entry_path(name, key);
        let temp = self.temp_path(name, key, self.temp_seq.fetch_add(1, Ordering::Relaxed));

        let entry = DiskEntry {
            key: key.clone(),
            response,
        };
        let contents = serde_json::to_vec_pretty(&entry)?;
        fs::write(&temp, contents).await?;
        Ok((temp, target))
    }

    async fn read_entry(path: &Path) -> Result<Option<DiskEntry>, StoreError> {
        let contents = match fs::read(path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_slice(&contents)?))
    }
}

#[async_trait]
impl CacheStorage for DiskStorage {
    async fn open(&self, name: &str) -> Result<(), StoreError> {
        validate_name(name)?;
        fs::create_dir_all(self.store_dir(name)).await?;
        Ok(())
    }

    async fn get(
        &self,
        name: &str,
        key: &RequestKey,
    ) -> Result<Option<CachedResponse>, StoreError> {
        validate_name(name)?;
        match Self::read_entry(&self.entry_path(name, key)).await? {
            Some(entry) if entry.key == *key => Ok(Some(entry.response)),
            Some(entry) => Err(StoreError::Corrupt(format!(
                "entry for {} holds {}",
                key, entry.key
            ))),
            None => Ok(None),
        }
    }

    async fn put(
        &self,
        name: &str,
        key: RequestKey,
        response: CachedResponse,
    ) -> Result<(), StoreError> {
        self.open(name).await?;
        let (temp, target) = self.write_temp(name, &key, response).await?;
        if let Err(e) = fs::rename(&temp, &target).await {
            let _ = fs::remove_file(&temp).await;
            return Err(e.into());
        }
        debug!(store = name, key = %key, "Stored entry");
        Ok(())
    }

    async fn put_all(
        &self,
        name: &str,
        entries: Vec<(RequestKey, CachedResponse)>,
    ) -> Result<(), StoreError> {
        self.open(name).await?;

        // Stage every entry first so a failed write leaves the store untouched
        let mut staged = Vec::with_capacity(entries.len());
        for (key, response) in entries {
            match self.write_temp(name, &key, response).await {
                Ok(paths) => staged.push(paths),
                Err(e) => {
                    for (temp, _) in &staged {
                        let _ = fs::remove_file(temp).await;
                    }
                    return Err(e);
                }
            }
        }

        let count = staged.len();
        for (temp, target) in staged {
            fs::rename(&temp, &target).await?;
        }
        debug!(store = name, entries = count, "Stored batch");
        Ok(())
    }

    async fn delete_named(&self, name: &str) -> Result<bool, StoreError> {
        validate_name(name)?;
        match fs::remove_dir_all(self.store_dir(name)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_names(&self) -> Result<Vec<String>, StoreError> {
        let mut dir = match fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if validate_name(name).is_ok() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    async fn entries(&self, name: &str) -> Result<Vec<(RequestKey, CachedResponse)>, StoreError> {
        validate_name(name)?;
        let mut dir = match fs::read_dir(self.store_dir(name)).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        while let Some(file) = dir.next_entry().await? {
            let path = file.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXTENSION) {
                continue;
            }
            match Self::read_entry(&path).await {
                Ok(Some(entry)) => entries.push((entry.key, entry.response)),
                Ok(None) => {}
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable store entry")
                }
            }
        }
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(entries)
    }
}

// ============================================================================
// Tests
// ============================================================================
