use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use indexmap::IndexMap;
use shared::protocol::{
    FIELD_INSTANCE, FIELD_PORT, FIELD_PRIORITY, FIELD_PROTOCOL, FIELD_TXT_PREFIX, FIELD_WEIGHT,
    SERVICES_ENUMERATION,
};
use shared::types::{DnsRecord, RecordType};
use crate::config::DiscoveryConfig;
use super::Container;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        }
    }
}

/// What a label group publishes, decided once from its fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceKind {
    /// Address records for the container only
    Address,
    /// Address records plus a TXT carrying the `txt.*` fields
    Text { txt: BTreeMap<String, String> },
    /// A DNS-SD service: SRV, TXT and PTRs, plus the container's addresses
    /// when the SRV targets the container itself
    Service(ServiceSpec),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSpec {
    pub port: u16,
    pub protocol: Protocol,
    pub priority: u16,
    pub weight: u16,
    pub instance: Option<String>,
    pub txt: BTreeMap<String, String>,
}

/// One named service exposed by a container.
///
/// Holds no reference to its container; the container passes itself in
/// when records are derived.
#[derive(Debug, Clone)]
pub struct ServiceInstance {
    name: String,
    /// The `N` of `_<service>.<N>.<field>`
    ordinal: Option<String>,
    labels: IndexMap<String, String>,
    /// `None` when the labels were unusable; such an instance derives nothing
    kind: Option<InstanceKind>,
}

impl ServiceInstance {
    pub fn new(
        name: &str,
        ordinal: Option<&str>,
        labels: IndexMap<String, String>,
        short_id: &str,
    ) -> Self {
        let kind = match parse_kind(&labels) {
            Ok(kind) => Some(kind),
            Err(reason) => {
                tracing::warn!(
                    container = %short_id,
                    "Service instance {} will not be published: {}",
                    name,
                    reason
                );
                None
            }
        };

        Self {
            name: name.to_string(),
            ordinal: ordinal.map(str::to_string),
            labels,
            kind,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ordinal(&self) -> Option<&str> {
        self.ordinal.as_deref()
    }

    pub fn labels(&self) -> &IndexMap<String, String> {
        &self.labels
    }

    pub fn kind(&self) -> Option<&InstanceKind> {
        self.kind.as_ref()
    }

    /// Records this instance implies, given its container's network facts
    pub fn dns_records(&self, container: &Container) -> Vec<DnsRecord> {
        let ttl = container.config().record_ttl;

        match &self.kind {
            None => Vec::new(),
            Some(InstanceKind::Address) => container_address_records(container),
            Some(InstanceKind::Text { txt }) => {
                let mut rrs = container_address_records(container);
                if container.addressable() {
                    let name = format!("_{}.{}", self.label(), container.dns_name());
                    rrs.push(DnsRecord::new(name, ttl, RecordType::Txt, txt_content(txt)));
                }
                rrs
            }
            Some(InstanceKind::Service(spec)) => self.service_records(spec, container),
        }
    }

    fn service_records(&self, spec: &ServiceSpec, container: &Container) -> Vec<DnsRecord> {
        let config = container.config();
        let ttl = config.record_ttl;
        let port_spec = format!("{}/{}", spec.port, spec.protocol.as_str());

        // The host name's own addresses come from `host_records`, never from a container
        let (target, port, mut rrs) = if let Some(host_port) = container.host_port_for(&port_spec) {
            let specific = container
                .host_address_for(&port_spec)
                .and_then(|a| a.parse::<IpAddr>().ok())
                .filter(|ip| !ip.is_unspecified());
            if let Some(ip) = specific.filter(|ip| !is_host_address(config, ip)) {
                tracing::warn!(
                    container = %container.short_id(),
                    "Port {} is bound to {}, which is not a configured host address; SRV still targets {}",
                    port_spec,
                    ip,
                    config.host_dns_name()
                );
            }
            (config.host_dns_name(), host_port, Vec::new())
        } else if container.port_exposed(&port_spec) && container.addressable() {
            (container.dns_name(), spec.port, container_address_records(container))
        } else {
            tracing::warn!(
                container = %container.short_id(),
                "Port {} for service {} is neither published nor exposed; not publishing",
                port_spec,
                self.name
            );
            return Vec::new();
        };

        let service_type = format!("_{}._{}.{}", self.name, spec.protocol.as_str(), config.base_domain);
        let instance = match (&spec.instance, &self.ordinal) {
            (Some(instance), _) => instance.clone(),
            (None, Some(n)) => format!("{}-{}", container.name(), n),
            (None, None) => container.name().to_string(),
        };
        let instance_name = format!("{}.{}", instance, service_type);

        rrs.push(DnsRecord::new(
            instance_name.clone(),
            ttl,
            RecordType::Srv,
            format!("{} {} {} {}", spec.priority, spec.weight, port, target),
        ));
        rrs.push(DnsRecord::new(
            instance_name.clone(),
            ttl,
            RecordType::Txt,
            txt_content(&spec.txt),
        ));
        rrs.push(DnsRecord::new(service_type.clone(), ttl, RecordType::Ptr, instance_name));
        rrs.push(DnsRecord::new(
            format!("{}.{}", SERVICES_ENUMERATION, config.base_domain),
            ttl,
            RecordType::Ptr,
            service_type,
        ));

        rrs
    }

    /// `<service>` or `<service>-<N>` for numbered instances
    fn label(&self) -> String {
        match &self.ordinal {
            Some(n) => format!("{}-{}", self.name, n),
            None => self.name.clone(),
        }
    }
}

/// A and AAAA records for the host name that published ports resolve to.
///
/// These belong to the daemon, not to any container: they are published
/// once at startup and never suppressed or retired with a container.
pub fn host_records(config: &DiscoveryConfig) -> Vec<DnsRecord> {
    address_records(
        &config.host_dns_name(),
        config.record_ttl,
        config.host_ipv4_address.as_deref(),
        config.host_ipv6_address.as_deref(),
    )
}

fn is_host_address(config: &DiscoveryConfig, ip: &IpAddr) -> bool {
    [&config.host_ipv4_address, &config.host_ipv6_address]
        .into_iter()
        .flatten()
        .filter_map(|a| a.parse::<IpAddr>().ok())
        .any(|a| a == *ip)
}

fn parse_kind(labels: &IndexMap<String, String>) -> Result<InstanceKind, String> {
    let txt: BTreeMap<String, String> = labels
        .iter()
        .filter_map(|(k, v)| {
            k.strip_prefix(FIELD_TXT_PREFIX)
                .filter(|key| !key.is_empty())
                .map(|key| (key.to_string(), v.clone()))
        })
        .collect();

    for field in labels.keys() {
        let known = [FIELD_PORT, FIELD_PROTOCOL, FIELD_INSTANCE, FIELD_PRIORITY, FIELD_WEIGHT]
            .contains(&field.as_str())
            || field.starts_with(FIELD_TXT_PREFIX);
        if !known {
            tracing::debug!("Ignoring unknown service field {:?}", field);
        }
    }

    let Some(port) = labels.get(FIELD_PORT) else {
        return Ok(if txt.is_empty() {
            InstanceKind::Address
        } else {
            InstanceKind::Text { txt }
        });
    };

    let port = match port.trim().parse::<u16>() {
        Ok(p) if p > 0 => p,
        _ => return Err(format!("invalid port {:?}", port)),
    };

    let protocol = match labels.get(FIELD_PROTOCOL).map(|p| p.trim().to_ascii_lowercase()) {
        None => Protocol::Tcp,
        Some(p) if p == "tcp" => Protocol::Tcp,
        Some(p) if p == "udp" => Protocol::Udp,
        Some(p) => return Err(format!("invalid protocol {:?}", p)),
    };

    let priority = parse_u16_field(labels, FIELD_PRIORITY)?;
    let weight = parse_u16_field(labels, FIELD_WEIGHT)?;

    let instance = labels
        .get(FIELD_INSTANCE)
        .map(|i| i.trim().to_string())
        .filter(|i| !i.is_empty());

    Ok(InstanceKind::Service(ServiceSpec {
        port,
        protocol,
        priority,
        weight,
        instance,
        txt,
    }))
}

fn parse_u16_field(labels: &IndexMap<String, String>, field: &str) -> Result<u16, String> {
    match labels.get(field) {
        None => Ok(0),
        Some(v) => v
            .trim()
            .parse::<u16>()
            .map_err(|_| format!("invalid {} {:?}", field, v)),
    }
}

/// A host-networked container has no addresses of its own; the host
/// records cover it.
fn container_address_records(container: &Container) -> Vec<DnsRecord> {
    if container.host_network() {
        return Vec::new();
    }
    address_records(
        &container.dns_name(),
        container.config().record_ttl,
        container.ipv4_address(),
        container.ipv6_address(),
    )
}

/// A and AAAA records for whichever addresses are present and well-formed
fn address_records(name: &str, ttl: u32, ipv4: Option<&str>, ipv6: Option<&str>) -> Vec<DnsRecord> {
    let mut rrs = Vec::new();

    if let Some(addr) = ipv4.filter(|a| !a.is_empty()) {
        match addr.parse::<Ipv4Addr>() {
            Ok(ip) => rrs.push(DnsRecord::new(name, ttl, RecordType::A, ip.to_string())),
            Err(_) => tracing::warn!("Not publishing malformed IPv4 address {:?} for {}", addr, name),
        }
    }

    if let Some(addr) = ipv6.filter(|a| !a.is_empty()) {
        match addr.parse::<Ipv6Addr>() {
            Ok(ip) => rrs.push(DnsRecord::new(name, ttl, RecordType::Aaaa, ip.to_string())),
            Err(_) => tracing::warn!("Not publishing malformed IPv6 address {:?} for {}", addr, name),
        }
    }

    rrs
}

/// Presentation form of a TXT rdata: `"k=v" "k2=v2"`, or `""` when empty
fn txt_content(txt: &BTreeMap<String, String>) -> String {
    if txt.is_empty() {
        return "\"\"".to_string();
    }

    txt.iter()
        .map(|(k, v)| {
            let escaped = format!("{}={}", k, v).replace('\\', "\\\\").replace('"', "\\\"");
            format!("\"{}\"", escaped)
        })
        .collect::<Vec<_>>()
        .join(" ")
}
