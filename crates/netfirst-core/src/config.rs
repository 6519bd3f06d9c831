//! Application configuration management.
//!
//! This module handles loading and saving the deployment configuration: the
//! store version identifier, the application URL (which fixes the managed
//! host and subtree), the seed manifest and a few host-side settings.
//!
//! Configuration is stored at `~/.config/netfirst/config.json`. A missing
//! file means the built-in defaults for the CNT Stats deployment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::lifecycle::Manifest;
use crate::offline::OfflineFallback;
use crate::router::Scope;
use crate::worker::WorkerSettings;

/// Application name used for config/store directory paths
const APP_NAME: &str = "netfirst";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Bumping this discards every previously stored response.
pub const DEFAULT_VERSION: &str = "cnt-v3";

pub const DEFAULT_APP_URL: &str = "https://joseprico.github.io/CNT/";

/// Entry pages plus third-party libraries pinned to exact versions.
pub const DEFAULT_MANIFEST: &[&str] = &[
    "./index.html",
    "./debug-pwa.html",
    "https://cdn.jsdelivr.net/npm/chart.js@4.4.0/dist/chart.umd.min.js",
    "https://cdnjs.cloudflare.com/ajax/libs/jspdf/2.5.1/jspdf.umd.min.js",
    "https://cdnjs.cloudflare.com/ajax/libs/html2canvas/1.4.1/html2canvas.min.js",
    "https://clubnatacioterrassa.cat/wp-content/uploads/CNT_Escut_Blau.png.webp",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub version: String,
    pub app_url: String,
    pub manifest: Manifest,
    /// Store root; defaults to `~/.cache/netfirst`.
    pub storage_dir: Option<PathBuf>,
    /// Unset means no timeout beyond what the network layer reports.
    pub request_timeout_secs: Option<u64>,
    /// Replacement for the built-in offline page.
    pub offline_page: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: DEFAULT_VERSION.to_string(),
            app_url: DEFAULT_APP_URL.to_string(),
            manifest: Manifest::new(DEFAULT_MANIFEST.iter().map(|s| s.to_string()).collect()),
            storage_dir: None,
            request_timeout_secs: None,
            offline_page: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn save(&self) -> Result<PathBuf> {
        let path = Self::config_path()?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn storage_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.storage_dir {
            return Ok(dir.clone());
        }
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    pub fn app_url(&self) -> Result<Url> {
        Url::parse(&self.app_url).with_context(|| format!("Invalid app_url: {}", self.app_url))
    }

    /// The app URL's path is the scope prefix, so it must end in `/` or it
    /// would also match sibling paths (`/CNT` vs `/CNTX/`).
    pub fn scope(&self) -> Result<Scope> {
        let app_url = self.app_url()?;
        if !app_url.path().ends_with('/') {
            anyhow::bail!("app_url path must end with '/': {}", self.app_url);
        }
        Scope::from_app_url(&app_url)
            .ok_or_else(|| anyhow::anyhow!("app_url has no host: {}", self.app_url))
    }

    pub fn offline_fallback(&self) -> Result<OfflineFallback> {
        match self.offline_page {
            Some(ref path) => {
                let page = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read offline page: {}", path.display()))?;
                Ok(OfflineFallback::new(page))
            }
            None => Ok(OfflineFallback::default()),
        }
    }

    /// Validate and assemble what the worker needs.
    pub fn worker_settings(&self) -> Result<WorkerSettings> {
        if self.version.trim().is_empty() {
            anyhow::bail!("version must not be empty");
        }
        let app_url = self.app_url()?;
        self.manifest
            .resolve(&app_url)
            .context("Invalid manifest entry")?;

        Ok(WorkerSettings {
            version: self.version.clone(),
            scope: self.scope()?,
            app_url,
            manifest: self.manifest.clone(),
            offline: self.offline_fallback()?,
        })
    }
}
