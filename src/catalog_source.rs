//! Where the catalog comes from: remote JSON, local cache, built-in list.
//!
//! # Fallback order
//!
//! 1. Remote URL (bounded timeout). A valid remote catalog is also written to
//!    the cache.
//! 2. Cache file.
//! 3. `Catalog::builtin()`.
//!
//! Every failure on the way (network, HTTP status, timeout, malformed JSON,
//! validation) is logged with its source and downgrades to the next step.
//! Loading never fails. `load_local` runs steps 2 and 3 only, so an update
//! check has a local baseline to compare the remote list with.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use strum::Display;
use tracing::{debug, info, warn};

use crate::catalog::{self, Catalog};
use crate::config::AppConfig;
use crate::error::{PostInstallError, Result};

/// Which source produced the active catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum CatalogOrigin {
    #[strum(serialize = "remote")]
    Remote,
    #[strum(serialize = "cache")]
    Cache,
    #[strum(serialize = "built-in")]
    BuiltIn,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedCatalog {
    pub catalog: Catalog,
    pub origin: CatalogOrigin,
}

/// Result of comparing the remote catalog with the active one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateCheck {
    /// The remote catalog differs; it has already been written to the cache.
    Available(Catalog),
    UpToDate,
    /// The remote catalog could not be fetched or validated.
    Unavailable(String),
}

impl UpdateCheck {
    /// The new catalog, if there is one.
    pub fn into_option(self) -> Option<Catalog> {
        match self {
            Self::Available(catalog) => Some(catalog),
            Self::UpToDate | Self::Unavailable(_) => None,
        }
    }
}

/// HTTP source of the catalog.
#[derive(Debug, Clone)]
pub struct RemoteSource {
    url: String,
    client: reqwest::blocking::Client,
}

impl RemoteSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("postinstall/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PostInstallError::Http(e.to_string()))?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// GET and validate the remote catalog.
    pub fn fetch(&self) -> Result<Catalog> {
        debug!("Fetching catalog from {}", self.url);
        let body = self
            .client
            .get(&self.url)
            .send()
            .and_then(|resp| resp.error_for_status())
            .and_then(|resp| resp.text())
            .map_err(|e| PostInstallError::source_unavailable(format!("{}: {}", self.url, e)))?;

        let value: serde_json::Value = serde_json::from_str(&body).map_err(|e| {
            PostInstallError::source_unavailable(format!("{}: malformed JSON: {}", self.url, e))
        })?;
        catalog::validate(&value, &self.url)
    }
}

/// Loads the catalog and keeps the cache in sync with the remote copy.
#[derive(Debug, Clone)]
pub struct CatalogLoader {
    remote: RemoteSource,
    cache_path: PathBuf,
}

impl CatalogLoader {
    pub fn new(remote: RemoteSource, cache_path: impl Into<PathBuf>) -> Self {
        Self {
            remote,
            cache_path: cache_path.into(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let remote = RemoteSource::new(config.catalog_url.clone(), config.fetch_timeout())?;
        Ok(Self::new(remote, config.cache_path.clone()))
    }

    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    /// Remote, then cache, then built-in.
    pub fn load(&self) -> LoadedCatalog {
        match self.remote.fetch() {
            Ok(catalog) => {
                info!(
                    "Loaded {} package(s) from {}",
                    catalog.len(),
                    self.remote.url()
                );
                if let Err(e) = self.save_cache(&catalog) {
                    warn!(
                        "Failed to write catalog cache {}: {}",
                        self.cache_path.display(),
                        e
                    );
                }
                return LoadedCatalog {
                    catalog,
                    origin: CatalogOrigin::Remote,
                };
            }
            Err(e) => warn!("Remote catalog unavailable: {}", e),
        }

        self.load_local()
    }

    /// Cache, then built-in. Never touches the network.
    pub fn load_local(&self) -> LoadedCatalog {
        match self.load_cache() {
            Ok(catalog) => {
                info!(
                    "Loaded {} package(s) from cache {}",
                    catalog.len(),
                    self.cache_path.display()
                );
                LoadedCatalog {
                    catalog,
                    origin: CatalogOrigin::Cache,
                }
            }
            Err(e) => {
                warn!("Catalog cache unusable: {}", e);
                info!("Using the built-in catalog");
                LoadedCatalog {
                    catalog: Catalog::builtin(),
                    origin: CatalogOrigin::BuiltIn,
                }
            }
        }
    }

    /// Fetch the remote catalog and compare it with `current`.
    ///
    /// A differing catalog is written to the cache but never becomes active
    /// here; the caller decides whether to apply it.
    pub fn check_for_update(&self, current: &Catalog) -> UpdateCheck {
        let remote = match self.remote.fetch() {
            Ok(catalog) => catalog,
            Err(e) => {
                warn!("Update check failed: {}", e);
                return UpdateCheck::Unavailable(e.to_string());
            }
        };

        if !remote.differs_from(current) {
            info!("Catalog is up to date");
            return UpdateCheck::UpToDate;
        }

        info!(
            "Catalog update available ({} -> {} package(s))",
            current.len(),
            remote.len()
        );
        if let Err(e) = self.save_cache(&remote) {
            warn!(
                "Failed to write catalog cache {}: {}",
                self.cache_path.display(),
                e
            );
        }
        UpdateCheck::Available(remote)
    }

    /// Write `catalog` as pretty-printed UTF-8 JSON, creating parent directories.
    pub fn save_cache(&self, catalog: &Catalog) -> Result<()> {
        save_catalog(&self.cache_path, catalog)
    }

    /// Read and validate the cache file.
    pub fn load_cache(&self) -> Result<Catalog> {
        load_catalog(&self.cache_path)
    }
}

/// Write a catalog file.
pub fn save_catalog(path: &Path, catalog: &Catalog) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(catalog)?;
    fs::write(path, json)?;
    debug!("Wrote {} package(s) to {}", catalog.len(), path.display());
    Ok(())
}

/// Read and validate a catalog file.
pub fn load_catalog(path: &Path) -> Result<Catalog> {
    let source = path.display().to_string();
    let text = fs::read_to_string(path)
        .map_err(|e| PostInstallError::source_unavailable(format!("{}: {}", source, e)))?;
    let value: serde_json::Value = serde_json::from_str(&text).map_err(|e| {
        PostInstallError::source_unavailable(format!("{}: malformed JSON: {}", source, e))
    })?;
    catalog::validate(&value, &source)
}
