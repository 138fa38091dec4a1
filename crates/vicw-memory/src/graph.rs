use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tracing::debug;
use uuid::Uuid;

use vicw_core::types::{ChunkId, StateNode, StateStatus, StateType};

use crate::error::{Result, StoreError};
use crate::traits::GraphStore;

/// SQLite-backed labeled property graph.
///
/// Chunk and Entity nodes live in `graph_nodes` / `graph_edges`; State nodes
/// get their own `states` table because they carry counters the relational
/// search never touches.
pub struct SqliteGraphStore {
    db: Mutex<Connection>,
}

impl SqliteGraphStore {
    pub fn new(conn: Connection) -> Self {
        Self {
            db: Mutex::new(conn),
        }
    }
}

impl GraphStore for SqliteGraphStore {
    fn merge_chunk(
        &self,
        chunk_id: &ChunkId,
        summary: &str,
        created_at: DateTime<Utc>,
    ) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO graph_nodes (id, label, name, summary, created_at)
             VALUES (?1, 'Chunk', ?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET summary = excluded.summary",
            rusqlite::params![chunk_id.as_str(), summary, created_at.to_rfc3339()],
        )?;
        Ok(())
    }

    fn merge_entity_mention(
        &self,
        chunk_id: &ChunkId,
        entity: &str,
        entity_type: &str,
    ) -> Result<()> {
        let db = self.db.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        let entity_id = format!("entity:{}", entity.to_lowercase());
        db.execute(
            "INSERT OR IGNORE INTO graph_nodes (id, label, name, summary, created_at)
             VALUES (?1, 'Entity', ?2, ?3, ?4)",
            rusqlite::params![entity_id, entity, entity_type, now],
        )?;
        db.execute(
            "INSERT OR IGNORE INTO graph_edges (src, rel, dst, created_at)
             VALUES (?1, 'MENTIONS', ?2, ?3)",
            rusqlite::params![chunk_id.as_str(), entity_id, now],
        )?;
        Ok(())
    }

    fn search_relations(&self, query: &str, limit: usize) -> Result<Vec<String>> {
        let db = self.db.lock().unwrap();
        let pattern = format!("%{}%", query);
        let mut stmt = db.prepare(
            "SELECT a.label, a.name, a.summary, e.rel, b.name
             FROM graph_edges e
             JOIN graph_nodes a ON a.id = e.src
             JOIN graph_nodes b ON b.id = e.dst
             WHERE a.name LIKE ?1 COLLATE NOCASE
                OR a.summary LIKE ?1 COLLATE NOCASE
                OR b.name LIKE ?1 COLLATE NOCASE
             ORDER BY e.created_at DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(rusqlite::params![pattern, limit], |row| {
            let a_label: String = row.get(0)?;
            let a_name: String = row.get(1)?;
            let a_summary: String = row.get(2)?;
            let rel: String = row.get(3)?;
            let b_name: String = row.get(4)?;
            // Chunk node names are opaque ids; show the summary instead.
            let a_display = if a_label == "Chunk" && !a_summary.is_empty() {
                a_summary
            } else {
                a_name
            };
            Ok(format!("({a_display})-[:{rel}]->({b_name})"))
        })?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    fn states(
        &self,
        state_type: Option<StateType>,
        status: StateStatus,
        limit: usize,
    ) -> Result<Vec<StateNode>> {
        let db = self.db.lock().unwrap();
        let mut out = Vec::new();
        match state_type {
            Some(t) => {
                let mut stmt = db.prepare(
                    "SELECT state_id, state_type, description, status, visit_count,
                            last_visited, created_at, updated_at
                     FROM states
                     WHERE state_type = ?1 AND status = ?2
                     ORDER BY updated_at DESC
                     LIMIT ?3",
                )?;
                let rows = stmt.query_map(
                    rusqlite::params![t.to_string(), status.to_string(), limit],
                    row_to_state,
                )?;
                out.extend(rows.filter_map(|r| r.ok()));
            }
            None => {
                let mut stmt = db.prepare(
                    "SELECT state_id, state_type, description, status, visit_count,
                            last_visited, created_at, updated_at
                     FROM states
                     WHERE status = ?1
                     ORDER BY updated_at DESC
                     LIMIT ?2",
                )?;
                let rows = stmt.query_map(
                    rusqlite::params![status.to_string(), limit],
                    row_to_state,
                )?;
                out.extend(rows.filter_map(|r| r.ok()));
            }
        }
        Ok(out)
    }

    fn create_state(
        &self,
        state_type: StateType,
        description: &str,
        normalized: &str,
        status: StateStatus,
    ) -> Result<StateNode> {
        let db = self.db.lock().unwrap();
        let now = Utc::now();
        let now_str = now.to_rfc3339();
        let state_id = format!("state-{}", Uuid::new_v4());

        db.execute(
            "INSERT INTO states
             (state_id, state_type, description, normalized, status,
              visit_count, last_visited, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 0, NULL, ?6, ?6)",
            rusqlite::params![
                state_id,
                state_type.to_string(),
                description,
                normalized,
                status.to_string(),
                now_str,
            ],
        )?;
        debug!(%state_id, %state_type, %description, "state created");

        Ok(StateNode {
            state_id,
            state_type,
            description: description.to_string(),
            status,
            visit_count: 0,
            last_visited: None,
            created_at: now,
            updated_at: now,
        })
    }

    fn set_state_status(&self, state_id: &str, status: StateStatus) -> Result<()> {
        let db = self.db.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        // Leaving `active` zeroes the visit counter.
        let n = db.execute(
            "UPDATE states SET status = ?1, visit_count = 0, updated_at = ?2
             WHERE state_id = ?3",
            rusqlite::params![status.to_string(), now, state_id],
        )?;
        if n == 0 {
            return Err(StoreError::NotFound {
                chunk_id: state_id.to_string(),
            });
        }
        Ok(())
    }

    fn record_visit(&self, state_id: &str, now: DateTime<Utc>) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "UPDATE states SET visit_count = visit_count + 1, last_visited = ?1
             WHERE state_id = ?2 AND status = 'active'",
            rusqlite::params![now.to_rfc3339(), state_id],
        )?;
        Ok(())
    }

    fn touch_state(&self, state_id: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "UPDATE states SET updated_at = ?1 WHERE state_id = ?2",
            rusqlite::params![Utc::now().to_rfc3339(), state_id],
        )?;
        Ok(())
    }
}

fn row_to_state(row: &rusqlite::Row<'_>) -> rusqlite::Result<StateNode> {
    let type_str: String = row.get(1)?;
    let status_str: String = row.get(3)?;
    let last_visited: Option<String> = row.get(5)?;
    let created: String = row.get(6)?;
    let updated: String = row.get(7)?;
    Ok(StateNode {
        state_id: row.get(0)?,
        state_type: type_str.parse().unwrap_or(StateType::Fact),
        description: row.get(2)?,
        status: status_str.parse().unwrap_or(StateStatus::Active),
        visit_count: row.get(4)?,
        last_visited: last_visited.and_then(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
        }),
        created_at: parse_ts(&created),
        updated_at: parse_ts(&updated),
    })
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
