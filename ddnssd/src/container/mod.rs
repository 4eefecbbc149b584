mod labels;
pub mod lifecycle;
pub mod registry;
pub mod service_instance;
pub mod snapshot;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use anyhow::Result;
use shared::protocol::{IGNORE_EXPOSE_DIRECTIVE, LABEL_NAMESPACE, SERVICES_ENUMERATION};
use shared::types::{DnsRecord, RecordType};
use crate::config::DiscoveryConfig;
use crate::error::ContainerError;
use crate::store::{RecordQuery, RecordStore};
use self::registry::ContainerRegistry;
use self::service_instance::ServiceInstance;
use self::snapshot::{ContainerSnapshot, PortBinding};

/// One runtime container as observed in a single snapshot.
///
/// Immutable once built: a container that changes state is rebuilt from a
/// fresh snapshot. Lifecycle state is tracked alongside, see [`lifecycle`].
#[derive(Debug)]
pub struct Container {
    id: String,
    name: String,
    host_network: bool,
    ipv4_address: Option<String>,
    ipv6_address: Option<String>,
    exposed_ports: HashSet<String>,
    published_ports: HashMap<String, Vec<PortBinding>>,
    expose_all_ports: bool,
    service_instances: Vec<ServiceInstance>,
    config: Arc<DiscoveryConfig>,
}

impl Container {
    /// Build a container from a snapshot.
    ///
    /// Addresses are resolved before any service instance is parsed. A
    /// container named `root__suffix` takes its addresses from `root`, which
    /// must already be in `registry`. `root` is everything before the first
    /// `__`, so it never delegates in turn.
    pub fn new(
        snapshot: &ContainerSnapshot,
        config: Arc<DiscoveryConfig>,
        registry: &ContainerRegistry,
    ) -> Result<Self, ContainerError> {
        let id = snapshot.id.clone();
        let short_id = short_id_of(&id).to_string();
        let name = snapshot
            .container_name()
            .ok_or_else(|| ContainerError::MissingName { id: id.clone() })?;

        let host_network = snapshot
            .host_config
            .as_ref()
            .and_then(|hc| hc.network_mode.as_deref())
            .is_some_and(|mode| mode.eq_ignore_ascii_case("host"));

        let (ipv4_address, ipv6_address) = if host_network {
            (None, None)
        } else if let Some(root_name) = root_name_of(&name) {
            tracing::info!(
                container = %short_id,
                "Using {} as source of network address information",
                root_name
            );
            let root = registry.get(root_name).ok_or_else(|| ContainerError::RootNotFound {
                name: name.clone(),
                root: root_name.to_string(),
            })?;
            (root.ipv4_address.clone(), root.ipv6_address.clone())
        } else {
            (
                snapshot.network_settings.ip_address.clone(),
                snapshot.network_settings.global_ipv6_address.clone(),
            )
        };

        let exposed_ports: HashSet<String> = snapshot
            .config
            .exposed_ports
            .as_ref()
            .map(|ports| ports.keys().cloned().collect())
            .unwrap_or_default();

        let published_ports: HashMap<String, Vec<PortBinding>> = snapshot
            .network_settings
            .ports
            .as_ref()
            .map(|ports| {
                ports
                    .iter()
                    .filter_map(|(spec, bindings)| {
                        bindings.as_ref().map(|b| (spec.clone(), b.clone()))
                    })
                    .collect()
            })
            .unwrap_or_default();

        let empty = Default::default();
        let labels = snapshot.config.labels.as_ref().unwrap_or(&empty);
        let expose_all_ports = labels
            .get(&format!("{}{}", LABEL_NAMESPACE, IGNORE_EXPOSE_DIRECTIVE))
            .is_some_and(|v| labels::parse_flag(v));

        tracing::debug!(container = %short_id, "IPv4 address: {:?}", ipv4_address);
        tracing::debug!(container = %short_id, "IPv6 address: {:?}", ipv6_address);
        tracing::debug!(container = %short_id, "Exposed ports: {:?}", exposed_ports);
        tracing::debug!(container = %short_id, "Published ports: {:?}", published_ports);

        let service_instances = labels::parse_service_instances(labels, &short_id);

        Ok(Self {
            id,
            name,
            host_network,
            ipv4_address,
            ipv6_address,
            exposed_ports,
            published_ports,
            expose_all_ports,
            service_instances,
            config,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn short_id(&self) -> &str {
        short_id_of(&self.id)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn host_network(&self) -> bool {
        self.host_network
    }

    pub fn ipv4_address(&self) -> Option<&str> {
        self.ipv4_address.as_deref()
    }

    pub fn ipv6_address(&self) -> Option<&str> {
        self.ipv6_address.as_deref()
    }

    pub fn expose_all_ports(&self) -> bool {
        self.expose_all_ports
    }

    pub fn service_instances(&self) -> &[ServiceInstance] {
        &self.service_instances
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// True when this container borrows another container's network namespace
    pub fn is_dependent(&self) -> bool {
        root_name_of(&self.name).is_some()
    }

    /// `<short_id>.<hostname>.<base_domain>`
    pub fn dns_name(&self) -> String {
        format!("{}.{}", self.short_id(), self.config.host_dns_name())
    }

    pub fn port_exposed(&self, spec: &str) -> bool {
        self.expose_all_ports || self.host_network || self.exposed_ports.contains(spec)
    }

    pub fn addressable(&self) -> bool {
        self.host_network
            || self.ipv4_address.as_deref().is_some_and(|a| !a.is_empty())
            || self.ipv6_address.as_deref().is_some_and(|a| !a.is_empty())
    }

    /// Host-side port for a `port/proto` spec, if the runtime published one
    pub fn host_port_for(&self, spec: &str) -> Option<u16> {
        let port = if self.host_network {
            spec.split('/').next().and_then(|p| p.parse().ok())
        } else {
            self.first_binding(spec)
                .and_then(|b| b.host_port.as_deref())
                .and_then(|p| p.parse().ok())
        };

        tracing::debug!(container = %self.short_id(), "host_port_for({:?}) => {:?}", spec, port);
        port
    }

    /// Host address a published port is bound to, unless it is bound to all addresses
    pub fn host_address_for(&self, spec: &str) -> Option<String> {
        let addr = self
            .first_binding(spec)
            .and_then(|b| b.host_ip.as_deref())
            .filter(|ip| !ip.is_empty() && *ip != "0.0.0.0")
            .map(str::to_string);

        tracing::debug!(container = %self.short_id(), "host_address_for({:?}) => {:?}", spec, addr);
        addr
    }

    fn first_binding(&self, spec: &str) -> Option<&PortBinding> {
        self.published_ports.get(spec).and_then(|b| b.first())
    }

    pub fn dns_records(&self) -> Vec<DnsRecord> {
        self.service_instances
            .iter()
            .flat_map(|si| si.dns_records(self))
            .collect()
    }

    pub fn publish_records(&self, store: &mut dyn RecordStore) -> Result<()> {
        for rr in self.dns_records() {
            store.publish(&rr)?;
        }
        Ok(())
    }

    /// Withdraw address and service records. TXT and PTR records stay; they
    /// are cleaned up by [`Container::retire_records`].
    pub fn suppress_records(&self, store: &mut dyn RecordStore) -> Result<()> {
        for rr in self.dns_records().iter().filter(|rr| !rr.rtype.is_metadata()) {
            store.suppress(rr)?;
        }
        Ok(())
    }

    /// Remove everything this container published, metadata included.
    ///
    /// The service-type enumeration PTR is shared by every instance of a
    /// service type, so it only goes once no instance PTR for the type is left.
    pub fn retire_records(&self, store: &mut dyn RecordStore) -> Result<()> {
        let enumeration = format!("{}.{}", SERVICES_ENUMERATION, self.config.base_domain);
        let (shared, own): (Vec<_>, Vec<_>) = self
            .dns_records()
            .into_iter()
            .partition(|rr| rr.rtype == RecordType::Ptr && rr.name == enumeration);

        for rr in &own {
            store.remove(rr)?;
        }

        for rr in &shared {
            let remaining = store.lookup(&RecordQuery::by_name(&rr.content).with_type(RecordType::Ptr))?;
            if remaining.is_empty() {
                store.remove(rr)?;
            }
        }
        Ok(())
    }
}

fn short_id_of(id: &str) -> &str {
    id.get(..12).unwrap_or(id)
}

/// `root` for a name of the form `root__suffix`
fn root_name_of(name: &str) -> Option<&str> {
    name.split_once("__").map(|(root, _)| root)
}
