use std::path::Path;
use std::time::Duration;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, TransactionBehavior};
use shared::types::{DnsRecord, RecordType, StoredRecord};
use super::{RecordQuery, RecordStore};

/// Records in a PowerDNS-style `domains`/`records` schema, scoped to one zone.
pub struct SqliteStore {
    conn: Connection,
    domain_id: i64,
}

impl SqliteStore {
    /// Open or create the SQLite database with WAL mode enabled
    pub fn open(path: impl AsRef<Path>, zone: &str) -> Result<Self> {
        let path = path.as_ref();

        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;

        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .context("Failed to enable WAL mode")?;

        // Other writers (another ddnssd, the DNS server) hold the lock briefly
        conn.busy_timeout(Duration::from_secs(5))
            .context("Failed to set busy timeout")?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS domains (
                id   INTEGER PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                type TEXT NOT NULL DEFAULT 'NATIVE'
            );

            CREATE TABLE IF NOT EXISTS records (
                id          INTEGER PRIMARY KEY,
                domain_id   INTEGER NOT NULL REFERENCES domains(id),
                name        TEXT NOT NULL,
                type        TEXT NOT NULL,
                content     TEXT NOT NULL,
                ttl         INTEGER NOT NULL,
                disabled    INTEGER NOT NULL DEFAULT 0,
                change_date INTEGER
            );

            CREATE INDEX IF NOT EXISTS idx_records_name ON records(name);
            CREATE INDEX IF NOT EXISTS idx_records_name_type ON records(name, type);
            "#,
        )
        .context("Failed to create database schema")?;

        let zone = shared::types::canonicalize_name(zone);
        conn.execute(
            "INSERT OR IGNORE INTO domains (name, type) VALUES (?1, 'NATIVE')",
            params![&zone],
        )
        .context("Failed to register zone")?;

        let domain_id = conn
            .query_row("SELECT id FROM domains WHERE name = ?1", params![&zone], |row| row.get(0))
            .with_context(|| format!("Failed to look up zone {}", zone))?;

        Ok(Self { conn, domain_id })
    }

    /// Helper to convert a database row to StoredRecord
    fn row_to_record(row: &rusqlite::Row) -> Result<StoredRecord, rusqlite::Error> {
        let type_str: String = row.get(2)?;
        let change_date: Option<i64> = row.get(5)?;

        let rtype = type_str
            .parse::<RecordType>()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(
                2,
                rusqlite::types::Type::Text,
                Box::new(e),
            ))?;

        Ok(StoredRecord {
            id: row.get(0)?,
            name: row.get(1)?,
            rtype,
            content: row.get(3)?,
            ttl: row.get::<_, u32>(4)?,
            changed_at: change_date.and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0)),
        })
    }
}

/// Insert unless the identity is already present. Runs on a plain connection
/// or inside a transaction.
fn insert_record(conn: &Connection, domain_id: i64, record: &DnsRecord) -> Result<usize> {
    let count = conn
        .execute(
            r#"
            INSERT INTO records (domain_id, name, type, content, ttl, change_date)
            SELECT ?1, ?2, ?3, ?4, ?5, ?6
            WHERE NOT EXISTS (
                SELECT 1 FROM records
                WHERE domain_id = ?1 AND name = ?2 AND type = ?3 AND content = ?4
            )
            "#,
            params![
                domain_id,
                record.canonical_name(),
                record.rtype.as_str(),
                &record.content,
                record.ttl,
                Utc::now().timestamp(),
            ],
        )
        .with_context(|| format!("Failed to add record {}", record))?;

    if count == 0 {
        tracing::warn!("Not adding {}: an identical record already exists", record);
    }

    Ok(count)
}

impl RecordStore for SqliteStore {
    fn lookup(&self, query: &RecordQuery) -> Result<Vec<StoredRecord>> {
        let mut sql = String::from(
            "SELECT id, name, type, content, ttl, change_date FROM records WHERE domain_id = ?",
        );
        let mut args = vec![Value::Integer(self.domain_id)];

        if let Some(name) = &query.name {
            sql.push_str(" AND name = ?");
            args.push(Value::Text(shared::types::canonicalize_name(name)));
        }
        if let Some(rtype) = query.rtype {
            sql.push_str(" AND type = ?");
            args.push(Value::Text(rtype.as_str().to_string()));
        }
        if let Some(content) = &query.content {
            sql.push_str(" AND content = ?");
            args.push(Value::Text(content.clone()));
        }
        sql.push_str(" ORDER BY id");

        let mut stmt = self
            .conn
            .prepare(&sql)
            .context("Failed to prepare query")?;

        let records = stmt
            .query_map(params_from_iter(args), Self::row_to_record)
            .context("Failed to query records")?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to collect records")?;

        Ok(records)
    }

    fn add(&mut self, record: &DnsRecord) -> Result<usize> {
        insert_record(&self.conn, self.domain_id, record)
    }

    fn remove(&mut self, record: &DnsRecord) -> Result<usize> {
        let count = self
            .conn
            .execute(
                "DELETE FROM records
                 WHERE domain_id = ?1 AND name = ?2 AND type = ?3 AND content = ?4",
                params![
                    self.domain_id,
                    record.canonical_name(),
                    record.rtype.as_str(),
                    &record.content,
                ],
            )
            .with_context(|| format!("Failed to remove record {}", record))?;

        Ok(count)
    }

    fn upsert(&mut self, record: &DnsRecord) -> Result<usize> {
        let domain_id = self.domain_id;

        // IMMEDIATE takes the write lock up front, so concurrent upserts of the
        // same name and type from other connections queue behind this one.
        // Dropping `tx` without commit rolls both statements back.
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .context("Failed to begin upsert transaction")?;

        let removed = tx
            .execute(
                "DELETE FROM records WHERE domain_id = ?1 AND name = ?2 AND type = ?3",
                params![domain_id, record.canonical_name(), record.rtype.as_str()],
            )
            .with_context(|| format!("Failed to clear existing records for {}", record))?;

        let added = insert_record(&tx, domain_id, record)?;

        tx.commit().context("Failed to commit upsert")?;

        tracing::debug!("Upserted {} (replaced {} row(s))", record, removed);
        Ok(added)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SqliteStore {
        SqliteStore::open(":memory:", "example.com").unwrap()
    }

    fn a_record() -> DnsRecord {
        DnsRecord::new("power.sd.example.com", 42, RecordType::A, "192.0.2.42")
    }

    fn by_name(store: &SqliteStore, name: &str) -> Vec<StoredRecord> {
        store.lookup(&RecordQuery::by_name(name)).unwrap()
    }

    #[test]
    fn test_add_new_record() {
        let mut store = store();
        let count = store.add(&a_record()).unwrap();
        assert_eq!(count, 1);

        let rows = by_name(&store, "power.sd.example.com");
        assert_eq!(rows.len(), 1);
        let r = &rows[0];
        assert_eq!(r.name, "power.sd.example.com");
        assert_eq!(r.ttl, 42);
        assert_eq!(r.rtype, RecordType::A);
        assert_eq!(r.content, "192.0.2.42");
        assert!(r.changed_at.is_some());
    }

    #[test]
    fn test_add_lowercases_name() {
        let mut store = store();
        let count = store
            .add(&DnsRecord::new("SHOUT.sd.example.com", 42, RecordType::A, "192.0.2.42"))
            .unwrap();
        assert_eq!(count, 1);

        let rows = by_name(&store, "shout.sd.example.com");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "shout.sd.example.com");

        // Same identity in a different case is still a duplicate
        let count = store
            .add(&DnsRecord::new("shout.SD.example.com", 42, RecordType::A, "192.0.2.42"))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_add_is_idempotent() {
        let mut store = store();
        store.add(&a_record()).unwrap();

        let count = store.add(&a_record()).unwrap();
        assert_eq!(count, 0);
        assert_eq!(by_name(&store, "power.sd.example.com").len(), 1);
    }

    #[test]
    fn test_add_ignores_ttl_for_identity() {
        let mut store = store();
        store.add(&a_record()).unwrap();

        let mut longer = a_record();
        longer.ttl = 3600;
        assert_eq!(store.add(&longer).unwrap(), 0);
    }

    #[test]
    fn test_remove_matching_record() {
        let mut store = store();
        store.add(&a_record()).unwrap();

        let count = store.remove(&a_record()).unwrap();
        assert_eq!(count, 1);
        assert!(by_name(&store, "power.sd.example.com").is_empty());
    }

    #[test]
    fn test_remove_missing_record() {
        let mut store = store();
        store
            .add(&DnsRecord::new("power.sd.example.com", 42, RecordType::A, "192.0.2.24"))
            .unwrap();

        let count = store.remove(&a_record()).unwrap();
        assert_eq!(count, 0);

        let rows = by_name(&store, "power.sd.example.com");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].content, "192.0.2.24");
    }

    #[test]
    fn test_upsert_adds_new_record() {
        let mut store = store();
        let count = store.upsert(&a_record()).unwrap();
        assert_eq!(count, 1);

        let rows = by_name(&store, "power.sd.example.com");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].content, "192.0.2.42");
        assert_eq!(rows[0].ttl, 42);
    }

    #[test]
    fn test_upsert_replaces_existing_record() {
        let mut store = store();
        store
            .add(&DnsRecord::new("power.sd.example.com", 42, RecordType::A, "192.0.2.24"))
            .unwrap();

        let count = store.upsert(&a_record()).unwrap();
        assert_eq!(count, 1);

        let rows = by_name(&store, "power.sd.example.com");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].rtype, RecordType::A);
        assert_eq!(rows[0].content, "192.0.2.42");
    }

    #[test]
    fn test_upsert_leaves_other_types_alone() {
        let mut store = store();
        store
            .add(&DnsRecord::new("power.sd.example.com", 42, RecordType::Aaaa, "2001:db8::42"))
            .unwrap();

        store.upsert(&a_record()).unwrap();

        let rows = by_name(&store, "power.sd.example.com");
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_upsert_rolls_back_on_failure() {
        let mut store = store();
        store
            .add(&DnsRecord::new("power.sd.example.com", 42, RecordType::A, "192.0.2.24"))
            .unwrap();

        // Fail the insert half of the upsert after the delete has run
        store
            .conn
            .execute_batch(
                "CREATE TRIGGER fail_insert BEFORE INSERT ON records
                 WHEN NEW.content = '192.0.2.42'
                 BEGIN SELECT RAISE(ABORT, 'Fail'); END;",
            )
            .unwrap();

        let result = store.upsert(&a_record());
        assert!(result.is_err());

        let rows = by_name(&store, "power.sd.example.com");
        assert_eq!(rows.len(), 1);
        let r = &rows[0];
        assert_eq!(r.name, "power.sd.example.com");
        assert_eq!(r.ttl, 42);
        assert_eq!(r.rtype, RecordType::A);
        assert_eq!(r.content, "192.0.2.24");

        // The connection is usable again after the rollback
        store.add(&DnsRecord::new("other.sd.example.com", 42, RecordType::A, "192.0.2.1")).unwrap();
    }

    #[test]
    fn test_lookup_filters() {
        let mut store = store();
        store.add(&a_record()).unwrap();
        store
            .add(&DnsRecord::new("power.sd.example.com", 42, RecordType::Txt, "\"\""))
            .unwrap();
        store
            .add(&DnsRecord::new("other.sd.example.com", 42, RecordType::A, "192.0.2.1"))
            .unwrap();

        assert_eq!(store.lookup(&RecordQuery::all()).unwrap().len(), 3);
        assert_eq!(
            store
                .lookup(&RecordQuery::by_name("POWER.sd.example.com").with_type(RecordType::Txt))
                .unwrap()
                .len(),
            1
        );
        assert_eq!(
            store
                .lookup(&RecordQuery { content: Some("192.0.2.1".to_string()), ..RecordQuery::all() })
                .unwrap()[0]
                .name,
            "other.sd.example.com"
        );
    }

    #[test]
    fn test_reopen_keeps_zone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("records.db");

        {
            let mut store = SqliteStore::open(&path, "example.com").unwrap();
            store.add(&a_record()).unwrap();
        }

        let store = SqliteStore::open(&path, "Example.com.").unwrap();
        assert_eq!(by_name(&store, "power.sd.example.com").len(), 1);

        let other_zone = SqliteStore::open(&path, "example.net").unwrap();
        assert!(other_zone.lookup(&RecordQuery::all()).unwrap().is_empty());
    }

    #[test]
    fn test_upserts_from_two_connections_leave_one_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.db");

        // Open both before racing; WAL setup wants the database to itself
        let first = SqliteStore::open(&path, "example.com").unwrap();
        let second = SqliteStore::open(&path, "example.com").unwrap();

        std::thread::scope(|s| {
            for (mut store, content) in [(first, "192.0.2.1"), (second, "192.0.2.2")] {
                s.spawn(move || {
                    let record = DnsRecord::new("race.sd.example.com", 60, RecordType::A, content);
                    for _ in 0..50 {
                        store.upsert(&record).unwrap();
                    }
                });
            }
        });

        let store = SqliteStore::open(&path, "example.com").unwrap();
        let rows = by_name(&store, "race.sd.example.com");
        assert_eq!(rows.len(), 1);
        assert!(["192.0.2.1", "192.0.2.2"].contains(&rows[0].content.as_str()));
    }
}
