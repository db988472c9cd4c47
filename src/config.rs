//! Application configuration: remote source, file locations, timeouts and the
//! DNS preset.
//!
//! Every field has a default, so a config file only needs to name what it
//! overrides. Loading and saving follow the JSON-on-disk approach with
//! `anyhow` context on every IO step.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Remote package list published with the project.
pub const DEFAULT_CATALOG_URL: &str =
    "https://raw.githubusercontent.com/Vvyiloff/Post-Install/main/packages.json";

/// DNS servers and DoH template applied by `dns set` when nothing else is given.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DnsPreset {
    pub primary: String,
    pub secondary: String,
    pub doh_template: String,
}

impl Default for DnsPreset {
    fn default() -> Self {
        Self {
            primary: "176.99.11.77".to_string(),
            secondary: "80.78.247.254".to_string(),
            doh_template: "https://xbox-dns.ru/dns-query".to_string(),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub catalog_url: String,
    pub cache_path: PathBuf,
    pub log_path: PathBuf,

    pub fetch_timeout_secs: u64,
    /// `winget show` / `winget list`
    pub query_timeout_secs: u64,
    pub install_timeout_secs: u64,
    pub uninstall_timeout_secs: u64,
    /// netsh, reg, ver, net session
    pub network_timeout_secs: u64,

    /// Extra install attempts after a failure. 0 keeps the plain
    /// continue-on-failure behaviour.
    pub install_retries: u32,
    pub reboot_delay_secs: u32,

    pub dns: DnsPreset,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            catalog_url: DEFAULT_CATALOG_URL.to_string(),
            cache_path: PathBuf::from("packages.json"),
            log_path: PathBuf::from("installer.log"),
            fetch_timeout_secs: 10,
            query_timeout_secs: 30,
            install_timeout_secs: 300,
            uninstall_timeout_secs: 60,
            network_timeout_secs: 15,
            install_retries: 0,
            reboot_delay_secs: 15,
            dns: DnsPreset::default(),
        }
    }
}

impl AppConfig {
    /// Save configuration to a JSON file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .context("Failed to serialize configuration to JSON")?;

        fs::write(&path, json)
            .with_context(|| format!("Failed to write configuration to {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Load configuration from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read configuration from {:?}", path.as_ref()))?;

        let config: Self =
            serde_json::from_str(&content).context("Failed to parse configuration JSON")?;

        Ok(config)
    }

    /// Load the file if one was given, otherwise use the defaults. Either way
    /// the result is validated.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(p) => Self::load_from_file(p)?,
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let url = self.catalog_url.trim();
        if !(url.starts_with("https://") || url.starts_with("http://")) {
            anyhow::bail!("catalog_url must be an http(s) URL, got '{}'", url);
        }
        if self.cache_path.as_os_str().is_empty() {
            anyhow::bail!("cache_path must not be empty");
        }
        if self.log_path.as_os_str().is_empty() {
            anyhow::bail!("log_path must not be empty");
        }

        for (name, secs) in [
            ("fetch_timeout_secs", self.fetch_timeout_secs),
            ("query_timeout_secs", self.query_timeout_secs),
            ("install_timeout_secs", self.install_timeout_secs),
            ("uninstall_timeout_secs", self.uninstall_timeout_secs),
            ("network_timeout_secs", self.network_timeout_secs),
        ] {
            if secs == 0 {
                anyhow::bail!("{} must be greater than zero", name);
            }
        }

        if self.install_retries > 5 {
            anyhow::bail!("install_retries must be at most 5");
        }

        self.dns
            .primary
            .parse::<IpAddr>()
            .with_context(|| format!("dns.primary '{}' is not an IP address", self.dns.primary))?;
        self.dns.secondary.parse::<IpAddr>().with_context(|| {
            format!("dns.secondary '{}' is not an IP address", self.dns.secondary)
        })?;
        if !self.dns.doh_template.starts_with("https://") {
            anyhow::bail!("dns.doh_template must start with https://");
        }

        Ok(())
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    pub fn install_timeout(&self) -> Duration {
        Duration::from_secs(self.install_timeout_secs)
    }

    pub fn uninstall_timeout(&self) -> Duration {
        Duration::from_secs(self.uninstall_timeout_secs)
    }

    pub fn network_timeout(&self) -> Duration {
        Duration::from_secs(self.network_timeout_secs)
    }
}
