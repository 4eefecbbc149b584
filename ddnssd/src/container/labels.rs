use indexmap::IndexMap;
use shared::protocol::{IGNORE_EXPOSE_DIRECTIVE, LABEL_NAMESPACE};
use super::service_instance::ServiceInstance;

/// Group namespaced labels into service instances.
///
/// Keys look like `org.discourse.service._<service>[.<N>].<field-path>`.
/// Groups come out in the order their instance key is first seen. Keys
/// that don't fit the grammar are logged and skipped.
pub(super) fn parse_service_instances(
    labels: &IndexMap<String, String>,
    short_id: &str,
) -> Vec<ServiceInstance> {
    let mut groups: IndexMap<&str, IndexMap<String, String>> = IndexMap::new();

    for (key, value) in labels {
        let Some(lbl) = key.strip_prefix(LABEL_NAMESPACE) else {
            continue;
        };

        match split_instance_key(lbl) {
            Some((instance_key, field)) => {
                groups
                    .entry(instance_key)
                    .or_default()
                    .insert(field.to_string(), value.clone());
            }
            None if lbl == IGNORE_EXPOSE_DIRECTIVE => {}
            None => {
                tracing::warn!(
                    container = %short_id,
                    "Ignoring invalid label {}{}.",
                    LABEL_NAMESPACE,
                    lbl
                );
            }
        }
    }

    groups
        .into_iter()
        .map(|(instance_key, fields)| {
            // The numeric suffix distinguishes instances of one service
            let (service, ordinal) = match instance_key.split_once('.') {
                Some((service, ordinal)) => (service, Some(ordinal)),
                None => (instance_key, None),
            };
            ServiceInstance::new(service, ordinal, fields, short_id)
        })
        .collect()
}

/// Split `_<name>[.<digits>].<field>` into (`<name>[.<digits>]`, `<field>`).
fn split_instance_key(lbl: &str) -> Option<(&str, &str)> {
    let rest = lbl.strip_prefix('_')?;
    let (head, after) = rest.split_once('.')?;
    if head.is_empty() {
        return None;
    }

    let digits = after.bytes().take_while(u8::is_ascii_digit).count();
    if digits > 0 && after.as_bytes().get(digits) == Some(&b'.') {
        let split = head.len() + 1 + digits;
        return Some((&rest[..split], &rest[split + 1..]));
    }

    Some((head, after))
}

/// Boolean-like label values: yes/true/on/1, case-insensitive. Anything else is false.
pub(super) fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "yes" | "true" | "on" | "1"
    )
}
