use anyhow::Result;
use chrono::Utc;
use shared::types::{DnsRecord, StoredRecord};
use super::{RecordQuery, RecordStore};

/// In-process store for dry runs. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: Vec<StoredRecord>,
    next_id: i64,
    max_rows: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse inserts beyond `max_rows`
    pub fn with_max_rows(max_rows: usize) -> Self {
        Self {
            max_rows: Some(max_rows),
            ..Self::default()
        }
    }

    fn position(&self, record: &DnsRecord) -> Option<usize> {
        let name = record.canonical_name();
        self.rows
            .iter()
            .position(|r| r.name == name && r.rtype == record.rtype && r.content == record.content)
    }
}

impl RecordStore for MemoryStore {
    fn lookup(&self, query: &RecordQuery) -> Result<Vec<StoredRecord>> {
        Ok(self.rows.iter().filter(|r| query.matches(r)).cloned().collect())
    }

    fn add(&mut self, record: &DnsRecord) -> Result<usize> {
        if self.position(record).is_some() {
            tracing::warn!("Not adding {}: an identical record already exists", record);
            return Ok(0);
        }

        if let Some(max) = self.max_rows {
            if self.rows.len() >= max {
                anyhow::bail!("Failed to add record {}: store is full ({} rows)", record, max);
            }
        }

        self.next_id += 1;
        self.rows.push(StoredRecord {
            id: self.next_id,
            name: record.canonical_name(),
            ttl: record.ttl,
            rtype: record.rtype,
            content: record.content.clone(),
            changed_at: Some(Utc::now()),
        });
        Ok(1)
    }

    fn remove(&mut self, record: &DnsRecord) -> Result<usize> {
        match self.position(record) {
            Some(idx) => {
                self.rows.remove(idx);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    fn upsert(&mut self, record: &DnsRecord) -> Result<usize> {
        let before = self.rows.clone();
        let name = record.canonical_name();
        self.rows.retain(|r| !(r.name == name && r.rtype == record.rtype));

        match self.add(record) {
            Ok(count) => Ok(count),
            Err(e) => {
                self.rows = before;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::types::RecordType;

    fn a_record() -> DnsRecord {
        DnsRecord::new("power.sd.example.com", 42, RecordType::A, "192.0.2.42")
    }

    fn old_record() -> DnsRecord {
        DnsRecord::new("power.sd.example.com", 42, RecordType::A, "192.0.2.24")
    }

    #[test]
    fn test_add_and_remove() {
        let mut store = MemoryStore::new();
        assert_eq!(store.add(&a_record()).unwrap(), 1);
        assert_eq!(store.add(&a_record()).unwrap(), 0);
        assert_eq!(store.lookup(&RecordQuery::all()).unwrap().len(), 1);

        assert_eq!(store.remove(&old_record()).unwrap(), 0);
        assert_eq!(store.remove(&a_record()).unwrap(), 1);
        assert!(store.lookup(&RecordQuery::all()).unwrap().is_empty());
    }

    #[test]
    fn test_upsert_replaces() {
        let mut store = MemoryStore::new();
        store.add(&old_record()).unwrap();

        assert_eq!(store.upsert(&a_record()).unwrap(), 1);
        let rows = store.lookup(&RecordQuery::by_name("power.sd.example.com")).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].content, "192.0.2.42");
    }

    #[test]
    fn test_upsert_restores_on_failure() {
        let mut store = MemoryStore::with_max_rows(2);
        store.add(&old_record()).unwrap();
        store
            .add(&DnsRecord::new("other.sd.example.com", 42, RecordType::A, "192.0.2.1"))
            .unwrap();

        // Replacing frees a slot, so this one goes through
        assert_eq!(store.upsert(&a_record()).unwrap(), 1);

        // A brand-new name needs a third row and fails after nothing was removed
        let result = store.upsert(&DnsRecord::new("third.sd.example.com", 42, RecordType::A, "192.0.2.3"));
        assert!(result.is_err());
        assert_eq!(store.lookup(&RecordQuery::all()).unwrap().len(), 2);
    }

    #[test]
    fn test_upsert_restores_removed_row() {
        let mut store = MemoryStore::with_max_rows(0);
        store.rows.push(StoredRecord {
            id: 7,
            name: "power.sd.example.com".to_string(),
            ttl: 42,
            rtype: RecordType::A,
            content: "192.0.2.24".to_string(),
            changed_at: None,
        });

        assert!(store.upsert(&a_record()).is_err());

        let rows = store.lookup(&RecordQuery::all()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, 7);
        assert_eq!(rows[0].content, "192.0.2.24");
    }
}
