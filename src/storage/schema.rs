//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the crawl store.

/// SQL schema for the crawl store
pub const SCHEMA_SQL: &str = r#"
-- Track crawl runs
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL
);

-- References known to the current run
CREATE TABLE IF NOT EXISTS refs (
    reference TEXT PRIMARY KEY,
    stage TEXT NOT NULL,
    seq INTEGER NOT NULL,
    state TEXT NOT NULL,
    data TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_refs_stage_seq ON refs(stage, seq);
CREATE INDEX IF NOT EXISTS idx_refs_state ON refs(state);

-- References processed by the previous run
CREATE TABLE IF NOT EXISTS cache (
    reference TEXT PRIMARY KEY,
    state TEXT NOT NULL,
    data TEXT NOT NULL
);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
