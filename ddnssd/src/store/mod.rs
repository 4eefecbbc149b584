//! Record store backends.
//!
//! Every backend implements [`RecordStore`]. Record identity is
//! (name, type, content); names are compared and written lowercase.

pub mod hash;
pub mod memory;
pub mod sqlite;

use anyhow::Result;
use serde::Deserialize;
use shared::types::{canonicalize_name, DnsRecord, RecordType, StoredRecord};
use crate::config::{BackendConfig, BackendKind};

/// Lookup criteria; unset fields match anything
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RecordQuery {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type", default)]
    pub rtype: Option<RecordType>,
    #[serde(default)]
    pub content: Option<String>,
}

impl RecordQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn by_name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn with_type(mut self, rtype: RecordType) -> Self {
        self.rtype = Some(rtype);
        self
    }

    pub fn matches(&self, row: &StoredRecord) -> bool {
        self.name
            .as_deref()
            .map_or(true, |n| canonicalize_name(n) == row.name)
            && self.rtype.map_or(true, |t| t == row.rtype)
            && self.content.as_deref().map_or(true, |c| c == row.content)
    }
}

/// The contract every backend satisfies.
pub trait RecordStore: Send {
    /// Rows matching `query`, oldest first
    fn lookup(&self, query: &RecordQuery) -> Result<Vec<StoredRecord>>;

    /// Insert unless a row with the same identity exists. Returns rows inserted.
    fn add(&mut self, record: &DnsRecord) -> Result<usize>;

    /// Delete the row with this identity. Returns rows removed.
    fn remove(&mut self, record: &DnsRecord) -> Result<usize>;

    /// Replace every row with this name and type by `record`, atomically.
    /// On failure the store is left as it was before the call.
    fn upsert(&mut self, record: &DnsRecord) -> Result<usize>;

    /// Called for every record a running container exposes.
    ///
    /// PTR owner names are shared by every instance of a service type, so
    /// they are added alongside each other; everything else replaces.
    fn publish(&mut self, record: &DnsRecord) -> Result<()> {
        let count = match record.rtype {
            RecordType::Ptr => self.add(record)?,
            _ => self.upsert(record)?,
        };
        tracing::debug!("Published {} ({} row(s) written)", record, count);
        Ok(())
    }

    /// Called for every record being withdrawn
    fn suppress(&mut self, record: &DnsRecord) -> Result<()> {
        let count = self.remove(record)?;
        tracing::debug!("Suppressed {} ({} row(s) removed)", record, count);
        Ok(())
    }
}

/// Open the backend selected in config
pub fn open(config: &BackendConfig, zone: &str) -> Result<Box<dyn RecordStore>> {
    match config.kind {
        BackendKind::Sqlite => Ok(Box::new(sqlite::SqliteStore::open(&config.db_path, zone)?)),
        BackendKind::Memory => Ok(Box::new(memory::MemoryStore::new())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(name: &str, rtype: RecordType, content: &str) -> StoredRecord {
        StoredRecord {
            id: 1,
            name: name.to_string(),
            ttl: 60,
            rtype,
            content: content.to_string(),
            changed_at: None,
        }
    }

    #[test]
    fn test_query_matching() {
        let r = row("power.sd.example.com", RecordType::A, "192.0.2.42");

        assert!(RecordQuery::all().matches(&r));
        assert!(RecordQuery::by_name("POWER.sd.example.com.").matches(&r));
        assert!(RecordQuery::by_name("power.sd.example.com").with_type(RecordType::A).matches(&r));
        assert!(!RecordQuery::by_name("power.sd.example.com").with_type(RecordType::Aaaa).matches(&r));
        let other = RecordQuery { content: Some("192.0.2.24".to_string()), ..RecordQuery::all() };
        assert!(!other.matches(&r));
    }

    #[test]
    fn test_open_memory_backend() {
        let config = BackendConfig {
            kind: BackendKind::Memory,
            ..Default::default()
        };
        let store = open(&config, "example.com").unwrap();
        assert!(store.lookup(&RecordQuery::all()).unwrap().is_empty());
    }
}
