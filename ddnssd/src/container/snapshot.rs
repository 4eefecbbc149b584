//! Deserialized form of `docker inspect` output: only the fields the
//! container model reads.

use std::collections::HashMap;
use std::path::Path;
use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerSnapshot {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub names: Option<Vec<String>>,
    #[serde(default)]
    pub config: SnapshotConfig,
    #[serde(default)]
    pub host_config: Option<HostConfig>,
    #[serde(default)]
    pub network_settings: NetworkSettings,
    #[serde(default)]
    pub state: Option<SnapshotState>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SnapshotConfig {
    /// Insertion order is kept: it decides service instance order
    #[serde(default)]
    pub labels: Option<IndexMap<String, String>>,
    #[serde(default)]
    pub exposed_ports: Option<IndexMap<String, serde_json::Value>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HostConfig {
    #[serde(default)]
    pub network_mode: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NetworkSettings {
    #[serde(rename = "IPAddress", default)]
    pub ip_address: Option<String>,
    #[serde(rename = "GlobalIPv6Address", default)]
    pub global_ipv6_address: Option<String>,
    /// Unpublished exposed ports appear with a null binding list
    #[serde(rename = "Ports", default)]
    pub ports: Option<HashMap<String, Option<Vec<PortBinding>>>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PortBinding {
    #[serde(default)]
    pub host_ip: Option<String>,
    #[serde(default)]
    pub host_port: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SnapshotState {
    #[serde(default)]
    pub running: bool,
    #[serde(default)]
    pub exit_code: i64,
    /// `created`, `running`, `exited`, `removing`, `dead`, ...
    #[serde(default)]
    pub status: Option<String>,
}

impl SnapshotState {
    /// The container is being torn down for good, not just stopped
    pub fn is_gone(&self) -> bool {
        matches!(self.status.as_deref(), Some("removing") | Some("dead"))
    }
}

impl ContainerSnapshot {
    /// Container name without the leading `/` docker prepends
    pub fn container_name(&self) -> Option<String> {
        self.name
            .as_deref()
            .or_else(|| self.names.as_ref().and_then(|n| n.first()).map(String::as_str))
            .map(|n| n.strip_prefix('/').unwrap_or(n).to_string())
    }
}

/// Read a `docker inspect` JSON array from disk
pub fn load_snapshots(path: impl AsRef<Path>) -> Result<Vec<ContainerSnapshot>> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read container snapshots: {}", path.display()))?;

    serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse container snapshots: {}", path.display()))
}
