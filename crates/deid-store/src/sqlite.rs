//! SQLite vault holding the latest mapping snapshot of every document.
//!
//! Saving replaces a document's snapshot inside a single transaction, so a
//! reader sees either the previous snapshot or the new one, never a mix.

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use tracing::info;

use crate::mapping::MappingStore;
use crate::schema::SCHEMA_SQL;
use crate::snapshot::{MappingSnapshot, SnapshotSink};
use deid_core::{Error, MappingEntry, PiiType, Result};

/// Summary row returned by [`SnapshotVault::list`].
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotSummary {
    pub source_document: String,
    pub entry_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

/// SQLite-backed snapshot storage.
pub struct SnapshotVault {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl SnapshotVault {
    /// Open or create the vault. The database file is `db_dir/deid.db`.
    pub fn open(db_dir: impl AsRef<Path>) -> Result<Self> {
        let db_dir = db_dir.as_ref();
        std::fs::create_dir_all(db_dir).map_err(|e| Error::Storage(e.to_string()))?;
        let db_path = db_dir.join("deid.db");

        let conn = Connection::open(&db_path).map_err(|e| Error::Database(e.to_string()))?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA synchronous = NORMAL;",
        )
        .map_err(|e| Error::Database(e.to_string()))?;
        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| Error::Database(format!("Schema init failed: {}", e)))?;

        let vault = Self {
            conn: Mutex::new(conn),
            db_path,
        };
        info!(
            "SnapshotVault opened: {} documents, path={}",
            vault.count()?,
            vault.db_path.display()
        );
        Ok(vault)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Store `snapshot`, replacing any previous one for the same document.
    pub fn save(&self, snapshot: &MappingSnapshot) -> Result<()> {
        let now = chrono::Utc::now().timestamp_millis();
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| Error::Database(e.to_string()))?;

        tx.execute(
            "DELETE FROM snapshots WHERE source_document = ?1",
            params![snapshot.source_document],
        )
        .map_err(|e| Error::Database(e.to_string()))?;
        tx.execute(
            "INSERT INTO snapshots (source_document, version, created_at, saved_at) VALUES (?1, ?2, ?3, ?4)",
            params![snapshot.source_document, snapshot.version, snapshot.created_at, now],
        )
        .map_err(|e| Error::Database(e.to_string()))?;

        {
            let mut stmt = tx
                .prepare_cached(
                    "INSERT INTO mapping_entries
                     (source_document, seq, pii_type, original_value, surrogate_value, occurrence_count)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                )
                .map_err(|e| Error::Database(e.to_string()))?;
            for (seq, entry) in snapshot.entries.iter().enumerate() {
                stmt.execute(params![
                    snapshot.source_document,
                    seq as i64,
                    entry.pii_type.label(),
                    entry.original_value,
                    entry.surrogate_value,
                    entry.occurrence_count as i64,
                ])
                .map_err(|e| {
                    if e.to_string().contains("UNIQUE constraint") {
                        Error::Collision(format!("entry {seq}: {e}"))
                    } else {
                        Error::Database(e.to_string())
                    }
                })?;
            }
        }

        tx.commit().map_err(|e| Error::Database(e.to_string()))?;
        info!(
            "Vault saved {} mappings for {}",
            snapshot.entries.len(),
            snapshot.source_document
        );
        Ok(())
    }

    /// Load the snapshot for `source_document`, if any.
    pub fn load(&self, source_document: &str) -> Result<Option<MappingSnapshot>> {
        let conn = self.conn.lock();
        let header: Option<(u32, Option<String>)> = conn
            .prepare_cached("SELECT version, created_at FROM snapshots WHERE source_document = ?1")
            .map_err(|e| Error::Database(e.to_string()))?
            .query_row(params![source_document], |row| Ok((row.get(0)?, row.get(1)?)))
            .optional()
            .map_err(|e| Error::Database(e.to_string()))?;

        let Some((version, created_at)) = header else {
            return Ok(None);
        };

        let mut stmt = conn
            .prepare_cached(
                "SELECT pii_type, original_value, surrogate_value, occurrence_count
                 FROM mapping_entries WHERE source_document = ?1 ORDER BY seq",
            )
            .map_err(|e| Error::Database(e.to_string()))?;
        let rows = stmt
            .query_map(params![source_document], |row| {
                Ok(MappingEntry {
                    pii_type: PiiType::from_label(&row.get::<_, String>(0)?),
                    original_value: row.get(1)?,
                    surrogate_value: row.get(2)?,
                    occurrence_count: row.get::<_, i64>(3)? as u64,
                })
            })
            .map_err(|e| Error::Database(e.to_string()))?;
        let entries = rows
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::CorruptMapping(e.to_string()))?;

        Ok(Some(MappingSnapshot {
            version,
            source_document: source_document.to_string(),
            created_at,
            entries,
        }))
    }

    /// Load and validate a store for `source_document`.
    pub fn load_store(&self, source_document: &str) -> Result<Option<MappingStore>> {
        self.load(source_document)?
            .map(MappingStore::from_snapshot)
            .transpose()
    }

    /// List stored documents, most recently saved first.
    pub fn list(&self) -> Result<Vec<SnapshotSummary>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT s.source_document, s.created_at,
                        (SELECT COUNT(*) FROM mapping_entries e WHERE e.source_document = s.source_document)
                 FROM snapshots s ORDER BY s.saved_at DESC, s.source_document",
            )
            .map_err(|e| Error::Database(e.to_string()))?;
        let rows = stmt
            .query_map([], |row| {
                Ok(SnapshotSummary {
                    source_document: row.get(0)?,
                    created_at: row.get(1)?,
                    entry_count: row.get(2)?,
                })
            })
            .map_err(|e| Error::Database(e.to_string()))?;
        let summaries: Vec<SnapshotSummary> = rows.filter_map(|r| r.ok()).collect();
        Ok(summaries)
    }

    /// Delete a document's snapshot. Returns whether one existed.
    pub fn delete(&self, source_document: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let count = conn
            .execute(
                "DELETE FROM snapshots WHERE source_document = ?1",
                params![source_document],
            )
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(count > 0)
    }

    pub fn count(&self) -> Result<i64> {
        let conn = self.conn.lock();
        conn.query_row("SELECT COUNT(*) FROM snapshots", [], |row| row.get(0))
            .map_err(|e| Error::Database(e.to_string()))
    }
}

impl SnapshotSink for SnapshotVault {
    fn persist(&self, snapshot: &MappingSnapshot) -> Result<()> {
        self.save(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_vault() -> (SnapshotVault, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let vault = SnapshotVault::open(dir.path()).unwrap();
        (vault, dir)
    }

    fn sample_store(source: &str) -> MappingStore {
        let mut store = MappingStore::new(source);
        store.insert(PiiType::Name, "John Smith", "Alan Turner").unwrap();
        store.insert(PiiType::Ssn, "123-45-6789", "421-88-1093").unwrap();
        store.increment_occurrence(PiiType::Name, "John Smith").unwrap();
        store
    }

    #[test]
    fn test_save_and_load() {
        let (vault, _dir) = test_vault();
        let store = sample_store("a.pdf");
        vault.save(&store.snapshot()).unwrap();

        let loaded = vault.load_store("a.pdf").unwrap().unwrap();
        assert_eq!(loaded.entries(), store.entries());
        assert_eq!(
            loaded.get(PiiType::Name, "John Smith").unwrap().occurrence_count,
            2
        );
        assert!(vault.load("missing.pdf").unwrap().is_none());
    }

    #[test]
    fn test_save_replaces_previous_snapshot() {
        let (vault, _dir) = test_vault();
        vault.save(&sample_store("a.pdf").snapshot()).unwrap();

        let mut smaller = MappingStore::new("a.pdf");
        smaller.insert(PiiType::Email, "j@corp.com", "k@example.org").unwrap();
        vault.save(&smaller.snapshot()).unwrap();

        let loaded = vault.load_store("a.pdf").unwrap().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(vault.count().unwrap(), 1);
    }

    #[test]
    fn test_failed_save_keeps_previous_snapshot() {
        let (vault, _dir) = test_vault();
        vault.save(&sample_store("a.pdf").snapshot()).unwrap();

        let mut bad = sample_store("a.pdf").snapshot();
        let mut dup = bad.entries[0].clone();
        dup.original_value = "Other Person".into();
        bad.entries.push(dup);
        assert!(matches!(vault.save(&bad), Err(Error::Collision(_))));

        let loaded = vault.load_store("a.pdf").unwrap().unwrap();
        assert_eq!(loaded.len(), 2);
    }

    #[test]
    fn test_list_and_delete() {
        let (vault, _dir) = test_vault();
        vault.save(&sample_store("a.pdf").snapshot()).unwrap();
        vault.save(&sample_store("b.pdf").snapshot()).unwrap();

        let listed = vault.list().unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().all(|s| s.entry_count == 2));

        assert!(vault.delete("a.pdf").unwrap());
        assert!(!vault.delete("a.pdf").unwrap());
        assert_eq!(vault.count().unwrap(), 1);
    }
}
