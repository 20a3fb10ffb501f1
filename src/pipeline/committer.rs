//! Committers receive accepted documents and deletions

use crate::pipeline::Metadata;
use crate::state::CrawlReference;
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;

/// Errors that can occur while committing
#[derive(Debug, Error)]
pub enum CommitError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A document ready to be committed
#[derive(Debug, Clone)]
pub struct CommitDocument {
    pub reference: String,
    pub content: String,
    pub metadata: Metadata,
    pub checksum: Option<String>,
}

/// Destination of crawled documents
#[async_trait]
pub trait Committer: Send + Sync {
    /// Adds or replaces a document
    async fn commit(
        &self,
        document: &CommitDocument,
        cached: Option<&CrawlReference>,
    ) -> Result<(), CommitError>;

    /// Removes a document that no longer exists
    async fn remove(
        &self,
        reference: &str,
        cached: Option<&CrawlReference>,
    ) -> Result<(), CommitError>;
}

/// A document as stored by [`SqliteCommitter`]
#[derive(Debug, Clone)]
pub struct CommittedDocument {
    pub reference: String,
    pub content: String,
    pub metadata: Metadata,
    pub checksum: Option<String>,
    pub committed_at: String,
}

const DOCUMENTS_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS documents (
    reference TEXT PRIMARY KEY,
    content TEXT NOT NULL,
    metadata TEXT NOT NULL,
    checksum TEXT,
    committed_at TEXT NOT NULL
);
"#;

/// Committer writing documents to a SQLite table
pub struct SqliteCommitter {
    conn: Mutex<Connection>,
}

impl SqliteCommitter {
    /// Opens (or creates) the documents database at `path`
    pub fn open(path: &Path) -> Result<Self, CommitError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;")?;
        Self::from_connection(conn)
    }

    /// Creates an in-memory committer (for testing)
    pub fn new_in_memory() -> Result<Self, CommitError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, CommitError> {
        conn.execute_batch(DOCUMENTS_SQL)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, CommitError> {
        self.conn
            .lock()
            .map_err(|e| CommitError::Database(format!("Failed to lock connection: {}", e)))
    }

    /// Gets a committed document
    pub fn get(&self, reference: &str) -> Result<Option<CommittedDocument>, CommitError> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT reference, content, metadata, checksum, committed_at
                 FROM documents WHERE reference = ?1",
                params![reference],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()?;

        row.map(|(reference, content, metadata, checksum, committed_at)| {
            Ok(CommittedDocument {
                reference,
                content,
                metadata: serde_json::from_str(&metadata)?,
                checksum,
                committed_at,
            })
        })
        .transpose()
    }

    /// Number of committed documents
    pub fn count(&self) -> Result<u64, CommitError> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

#[async_trait]
impl Committer for SqliteCommitter {
    async fn commit(
        &self,
        document: &CommitDocument,
        _cached: Option<&CrawlReference>,
    ) -> Result<(), CommitError> {
        let metadata = serde_json::to_string(&document.metadata)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO documents (reference, content, metadata, checksum, committed_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(reference) DO UPDATE SET
                content = excluded.content,
                metadata = excluded.metadata,
                checksum = excluded.checksum,
                committed_at = excluded.committed_at",
            params![
                document.reference,
                document.content,
                metadata,
                document.checksum,
                chrono::Utc::now().to_rfc3339()
            ],
        )?;
        tracing::debug!("Committed {}", document.reference);
        Ok(())
    }

    async fn remove(
        &self,
        reference: &str,
        _cached: Option<&CrawlReference>,
    ) -> Result<(), CommitError> {
        let conn = self.lock()?;
        let removed = conn.execute(
            "DELETE FROM documents WHERE reference = ?1",
            params![reference],
        )?;
        tracing::debug!("Removed {} ({} row)", reference, removed);
        Ok(())
    }
}
