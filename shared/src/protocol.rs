/// Namespace shared by every service-discovery container label
pub const LABEL_NAMESPACE: &str = "org.discourse.service.";

/// Reserved directive (under the namespace) that treats every port as exposed
pub const IGNORE_EXPOSE_DIRECTIVE: &str = "ignore-expose";

/// DNS-SD service type enumeration name, relative to the base domain
pub const SERVICES_ENUMERATION: &str = "_services._dns-sd._udp";

/// Field paths understood on a service instance label group
pub const FIELD_PORT: &str = "port";
pub const FIELD_PROTOCOL: &str = "protocol";
pub const FIELD_INSTANCE: &str = "instance";
pub const FIELD_PRIORITY: &str = "priority";
pub const FIELD_WEIGHT: &str = "weight";
pub const FIELD_TXT_PREFIX: &str = "txt.";

/// API path prefix
pub const API_PREFIX: &str = "/v1";
