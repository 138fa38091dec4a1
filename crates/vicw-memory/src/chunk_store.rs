use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::Connection;

use vicw_core::types::{ChunkId, ChunkRecord};

use crate::error::{Result, StoreError};
use crate::traits::ChunkStore;

/// SQLite-backed chunk store.
///
/// Thread-safe: wraps the connection in a Mutex. A single middleware node
/// writes chunks from one background worker, so contention is negligible.
pub struct SqliteChunkStore {
    db: Mutex<Connection>,
}

impl SqliteChunkStore {
    pub fn new(conn: Connection) -> Self {
        Self {
            db: Mutex::new(conn),
        }
    }
}

impl ChunkStore for SqliteChunkStore {
    fn put(&self, record: &ChunkRecord) -> Result<()> {
        let db = self.db.lock().unwrap();
        let metadata = record.metadata.as_ref().map(|v| v.to_string());
        db.execute(
            "INSERT OR REPLACE INTO chunks
             (chunk_id, chunk_text, summary, metadata, token_count, message_count, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                record.chunk_id.as_str(),
                record.chunk_text,
                record.summary,
                metadata,
                record.token_count,
                record.message_count,
                record.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn get(&self, chunk_id: &ChunkId) -> Result<Option<ChunkRecord>> {
        let db = self.db.lock().unwrap();
        match db.query_row(
            "SELECT chunk_id, chunk_text, summary, metadata, token_count, message_count,
                    created_at
             FROM chunks WHERE chunk_id = ?1",
            rusqlite::params![chunk_id.as_str()],
            row_to_record,
        ) {
            Ok(r) => Ok(Some(r)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::Database(e)),
        }
    }

    fn summaries(&self, chunk_ids: &[ChunkId]) -> Result<Vec<(ChunkId, String)>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare("SELECT summary FROM chunks WHERE chunk_id = ?1")?;
        let mut out = Vec::with_capacity(chunk_ids.len());
        for id in chunk_ids {
            match stmt.query_row(rusqlite::params![id.as_str()], |row| {
                row.get::<_, String>(0)
            }) {
                Ok(summary) => out.push((id.clone(), summary)),
                Err(rusqlite::Error::QueryReturnedNoRows) => continue,
                Err(e) => return Err(StoreError::Database(e)),
            }
        }
        Ok(out)
    }

    fn count(&self) -> Result<u64> {
        let db = self.db.lock().unwrap();
        let n: u64 = db.query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))?;
        Ok(n)
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChunkRecord> {
    let id: String = row.get(0)?;
    let metadata: Option<String> = row.get(3)?;
    let created: String = row.get(6)?;
    Ok(ChunkRecord {
        chunk_id: ChunkId(id),
        chunk_text: row.get(1)?,
        summary: row.get(2)?,
        metadata: metadata.and_then(|s| serde_json::from_str(&s).ok()),
        token_count: row.get(4)?,
        message_count: row.get(5)?,
        created_at: DateTime::parse_from_rfc3339(&created)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}
