use rusqlite::{Connection, Result};

/// Initialise chunk, graph, and state tables. Safe to call on every startup
/// (idempotent).
pub fn init_db(conn: &Connection) -> Result<()> {
    create_chunks_table(conn)?;
    create_graph_tables(conn)?;
    create_states_table(conn)?;
    Ok(())
}

fn create_chunks_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS chunks (
            chunk_id      TEXT PRIMARY KEY,
            chunk_text    TEXT NOT NULL,
            summary       TEXT NOT NULL,
            metadata      TEXT,
            token_count   INTEGER NOT NULL DEFAULT 0,
            message_count INTEGER NOT NULL DEFAULT 0,
            created_at    TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_chunks_created
            ON chunks(created_at);",
    )
}

/// Labeled property graph: one node table, one edge table.
/// Node identity is (label, name) for entities and the chunk_id for chunks.
fn create_graph_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS graph_nodes (
            id         TEXT PRIMARY KEY,
            label      TEXT NOT NULL,
            name       TEXT NOT NULL,
            summary    TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL,
            UNIQUE(label, name)
        );
        CREATE TABLE IF NOT EXISTS graph_edges (
            src        TEXT NOT NULL,
            rel        TEXT NOT NULL,
            dst        TEXT NOT NULL,
            created_at TEXT NOT NULL,
            UNIQUE(src, rel, dst)
        );
        CREATE INDEX IF NOT EXISTS idx_edges_src ON graph_edges(src);",
    )
}

fn create_states_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS states (
            state_id     TEXT PRIMARY KEY,
            state_type   TEXT NOT NULL,
            description  TEXT NOT NULL,
            normalized   TEXT NOT NULL,
            status       TEXT NOT NULL DEFAULT 'active',
            visit_count  INTEGER NOT NULL DEFAULT 0,
            last_visited TEXT,
            created_at   TEXT NOT NULL,
            updated_at   TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_states_type_status
            ON states(state_type, status);",
    )
}
