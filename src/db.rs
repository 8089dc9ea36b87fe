use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::models::{Posting, SyncRecord};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no stored posting for {source_name}/{source_id}")]
    NotFound { source_name: String, source_id: String },

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("stored posting is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Keyed persistence for postings and their sync state.
///
/// Writes must be visible to the next read on the same store; there is no
/// locking layer above it.
pub trait PostingStore {
    /// Store or replace a posting. Sync state of an existing record is kept.
    fn upsert(&self, posting: &Posting) -> Result<(), StoreError>;
    fn exists(&self, source: &str, source_id: &str) -> Result<bool, StoreError>;
    fn mark_synced(
        &self,
        source: &str,
        source_id: &str,
        account_id: &str,
        opportunity_id: &str,
    ) -> Result<(), StoreError>;
    fn list_unsynced(&self) -> Result<Vec<SyncRecord>, StoreError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub total: i64,
    pub synced: i64,
    pub pending: i64,
}

pub struct Database {
    conn: Connection,
    path: PathBuf,
}

const RECORD_COLUMNS: &str = "source, source_id, source_url, company_name, title,
     scraped_at, synced_at, account_id, opportunity_id";

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create data directory: {}", parent.display())
                })?;
            }
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let db = Self {
            conn: Connection::open_in_memory()?,
            path: PathBuf::from(":memory:"),
        };
        db.init()?;
        Ok(db)
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    pub fn init(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS postings (
                source TEXT NOT NULL,
                source_id TEXT NOT NULL,
                source_url TEXT NOT NULL,
                company_name TEXT NOT NULL,
                title TEXT NOT NULL,
                data TEXT NOT NULL,
                scraped_at TEXT NOT NULL,
                synced_at TEXT,
                account_id TEXT,
                opportunity_id TEXT,
                PRIMARY KEY (source, source_id)
            );

            CREATE INDEX IF NOT EXISTS idx_postings_synced ON postings(synced_at);
            "#,
        )?;
        Ok(())
    }

    pub fn ensure_initialized(&self) -> Result<()> {
        let tables: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='postings'",
            [],
            |row| row.get(0),
        )?;
        if tables == 0 {
            return Err(anyhow!(
                "Database not initialized. Run 'leadpipe init' first."
            ));
        }
        Ok(())
    }

    pub fn get_posting(&self, source: &str, source_id: &str) -> Result<Option<Posting>, StoreError> {
        let data: Option<String> = self
            .conn
            .query_row(
                "SELECT data FROM postings WHERE source = ?1 AND source_id = ?2",
                [source, source_id],
                |row| row.get(0),
            )
            .optional()?;
        match data {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    pub fn get_record(&self, source: &str, source_id: &str) -> Result<Option<SyncRecord>, StoreError> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM postings WHERE source = ?1 AND source_id = ?2"
        );
        let record = self
            .conn
            .query_row(&sql, [source, source_id], Self::row_to_record)
            .optional()?;
        Ok(record)
    }

    pub fn stats(&self) -> Result<StoreStats, StoreError> {
        let (total, synced): (i64, i64) = self.conn.query_row(
            "SELECT COUNT(*), COUNT(synced_at) FROM postings",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(StoreStats {
            total,
            synced,
            pending: total - synced,
        })
    }

    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<SyncRecord> {
        Ok(SyncRecord {
            source: row.get(0)?,
            source_id: row.get(1)?,
            source_url: row.get(2)?,
            company_name: row.get(3)?,
            title: row.get(4)?,
            scraped_at: row.get(5)?,
            synced_at: row.get(6)?,
            account_id: row.get(7)?,
            opportunity_id: row.get(8)?,
        })
    }
}

impl PostingStore for Database {
    fn upsert(&self, posting: &Posting) -> Result<(), StoreError> {
        let data = serde_json::to_string(posting)?;
        let now: DateTime<Utc> = Utc::now();
        // Content is refreshed; scraped_at, synced_at and CRM ids are left alone.
        self.conn.execute(
            "INSERT INTO postings (source, source_id, source_url, company_name, title, data, scraped_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(source, source_id) DO UPDATE SET
                source_url = excluded.source_url,
                company_name = excluded.company_name,
                title = excluded.title,
                data = excluded.data",
            params![
                posting.source,
                posting.source_id,
                posting.source_url,
                posting.company_name,
                posting.title,
                data,
                now,
            ],
        )?;
        Ok(())
    }

    fn exists(&self, source: &str, source_id: &str) -> Result<bool, StoreError> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM postings WHERE source = ?1 AND source_id = ?2",
                [source, source_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn mark_synced(
        &self,
        source: &str,
        source_id: &str,
        account_id: &str,
        opportunity_id: &str,
    ) -> Result<(), StoreError> {
        let updated = self.conn.execute(
            "UPDATE postings
             SET synced_at = ?1, account_id = ?2, opportunity_id = ?3
             WHERE source = ?4 AND source_id = ?5 AND synced_at IS NULL",
            params![Utc::now(), account_id, opportunity_id, source, source_id],
        )?;
        if updated > 0 {
            return Ok(());
        }
        if self.exists(source, source_id)? {
            // synced_at never moves once set
            tracing::warn!(source, source_id, "posting already synced, keeping first sync");
            return Ok(());
        }
        Err(StoreError::NotFound {
            source_name: source.to_string(),
            source_id: source_id.to_string(),
        })
    }

    fn list_unsynced(&self) -> Result<Vec<SyncRecord>, StoreError> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM postings WHERE synced_at IS NULL
             ORDER BY scraped_at, source, source_id"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], Self::row_to_record)?;
        let records = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_posting;

    #[test]
    fn test_upsert_then_exists() {
        let db = Database::open_in_memory().unwrap();
        let posting = sample_posting();
        assert!(!db.exists(&posting.source, &posting.source_id).unwrap());

        db.upsert(&posting).unwrap();
        assert!(db.exists(&posting.source, &posting.source_id).unwrap());
        assert!(!db.exists("indeed", &posting.source_id).unwrap());
    }

    #[test]
    fn test_upsert_initializes_unsynced_record() {
        let db = Database::open_in_memory().unwrap();
        let posting = sample_posting();
        db.upsert(&posting).unwrap();

        let record = db.get_record("hn_hiring", "12345").unwrap().unwrap();
        assert!(record.synced_at.is_none());
        assert!(record.account_id.is_none());
        assert!(record.opportunity_id.is_none());
        assert_eq!(record.company_name, "Acme Corp");
    }

    #[test]
    fn test_upsert_replaces_content() {
        let db = Database::open_in_memory().unwrap();
        db.upsert(&sample_posting()).unwrap();

        let mut updated = sample_posting();
        updated.title = "Platform Engineer".to_string();
        db.upsert(&updated).unwrap();

        let stored = db.get_posting("hn_hiring", "12345").unwrap().unwrap();
        assert_eq!(stored, updated);
        assert_eq!(db.stats().unwrap().total, 1);
    }

    #[test]
    fn test_upsert_twice_keeps_sync_state() {
        let db = Database::open_in_memory().unwrap();
        let posting = sample_posting();
        db.upsert(&posting).unwrap();
        db.mark_synced("hn_hiring", "12345", "acc1", "opp1").unwrap();
        let before = db.get_record("hn_hiring", "12345").unwrap().unwrap();

        db.upsert(&posting).unwrap();
        let after = db.get_record("hn_hiring", "12345").unwrap().unwrap();

        assert_eq!(after.synced_at, before.synced_at);
        assert_eq!(after.scraped_at, before.scraped_at);
        assert_eq!(after.account_id.as_deref(), Some("acc1"));
        assert_eq!(after.opportunity_id.as_deref(), Some("opp1"));
    }

    #[test]
    fn test_mark_synced_records_ids() {
        let db = Database::open_in_memory().unwrap();
        db.upsert(&sample_posting()).unwrap();
        db.mark_synced("hn_hiring", "12345", "acc1", "opp1").unwrap();

        let record = db.get_record("hn_hiring", "12345").unwrap().unwrap();
        assert!(record.is_synced());
        assert_eq!(record.account_id.as_deref(), Some("acc1"));
        assert_eq!(record.opportunity_id.as_deref(), Some("opp1"));
    }

    #[test]
    fn test_mark_synced_is_not_overwritten() {
        let db = Database::open_in_memory().unwrap();
        db.upsert(&sample_posting()).unwrap();
        db.mark_synced("hn_hiring", "12345", "acc1", "opp1").unwrap();
        let first = db.get_record("hn_hiring", "12345").unwrap().unwrap();

        db.mark_synced("hn_hiring", "12345", "acc2", "opp2").unwrap();
        let second = db.get_record("hn_hiring", "12345").unwrap().unwrap();
        assert_eq!(second.synced_at, first.synced_at);
        assert_eq!(second.account_id.as_deref(), Some("acc1"));
    }

    #[test]
    fn test_mark_synced_without_upsert_is_not_found() {
        let db = Database::open_in_memory().unwrap();
        let err = db.mark_synced("hn_hiring", "missing", "acc1", "opp1").unwrap_err();
        assert!(matches!(err, StoreError::NotFound { ref source_id, .. } if source_id == "missing"));
    }

    #[test]
    fn test_list_unsynced() {
        let db = Database::open_in_memory().unwrap();
        let first = sample_posting();
        let mut second = sample_posting();
        second.source_id = "67890".to_string();
        db.upsert(&first).unwrap();
        db.upsert(&second).unwrap();
        db.mark_synced("hn_hiring", "12345", "acc1", "opp1").unwrap();

        let unsynced = db.list_unsynced().unwrap();
        assert_eq!(unsynced.len(), 1);
        assert_eq!(unsynced[0].source_id, "67890");
    }

    #[test]
    fn test_stats_counts_pending() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.stats().unwrap(), StoreStats::default());

        db.upsert(&sample_posting()).unwrap();
        let mut other = sample_posting();
        other.source = "indeed".to_string();
        db.upsert(&other).unwrap();
        db.mark_synced("indeed", "12345", "acc", "opp").unwrap();

        assert_eq!(
            db.stats().unwrap(),
            StoreStats {
                total: 2,
                synced: 1,
                pending: 1
            }
        );
    }

    #[test]
    fn test_get_posting_missing() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.get_posting("hn_hiring", "nope").unwrap().is_none());
        assert!(db.get_record("hn_hiring", "nope").unwrap().is_none());
    }

    #[test]
    fn test_ensure_initialized_on_fresh_connection() {
        let db = Database {
            conn: Connection::open_in_memory().unwrap(),
            path: PathBuf::from(":memory:"),
        };
        assert!(db.ensure_initialized().is_err());
        db.init().unwrap();
        assert!(db.ensure_initialized().is_ok());
    }
}
