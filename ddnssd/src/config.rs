use std::path::{Path, PathBuf};
use serde::Deserialize;
use anyhow::{Context, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

/// Naming and addressing facts every derived record depends on
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryConfig {
    pub base_domain: String,
    /// Resolved from the system hostname when left empty
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub host_ipv4_address: Option<String>,
    #[serde(default)]
    pub host_ipv6_address: Option<String>,
    #[serde(default = "default_record_ttl")]
    pub record_ttl: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_backend_kind")]
    pub kind: BackendKind,
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    /// Zone the records are filed under; defaults to the base domain
    #[serde(default)]
    pub zone: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
}

fn default_record_ttl() -> u32 {
    60
}

fn default_backend_kind() -> BackendKind {
    BackendKind::Sqlite
}

fn default_db_path() -> PathBuf {
    PathBuf::from("/var/lib/ddnssd/records.db")
}

fn default_listen() -> String {
    "[::]:9218".to_string()
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: default_backend_kind(),
            db_path: default_db_path(),
            zone: None,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

impl DiscoveryConfig {
    /// `<hostname>.<base_domain>`, the name host-level address records live at
    pub fn host_dns_name(&self) -> String {
        format!("{}.{}", self.hostname, self.base_domain)
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    fn from_toml(contents: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(contents)?;

        if config.discovery.base_domain.trim().is_empty() {
            anyhow::bail!("discovery.base_domain must not be empty");
        }

        config.discovery.base_domain = shared::types::canonicalize_name(&config.discovery.base_domain);

        if config.discovery.hostname.is_empty() {
            config.discovery.hostname = hostname::get()
                .context("Failed to get system hostname")?
                .to_string_lossy()
                .to_string();
        }
        config.discovery.hostname = config.discovery.hostname.to_ascii_lowercase();

        Ok(config)
    }

    pub fn zone(&self) -> &str {
        self.backend
            .zone
            .as_deref()
            .unwrap_or(&self.discovery.base_domain)
    }
}
