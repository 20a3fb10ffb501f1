//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the CrawlStore trait.
//! All access goes through a single connection guarded by a mutex, which is
//! what makes queue operations linearizable across crawl workers.

use crate::state::{CachedReference, CrawlReference, CrawlState};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{CrawlStore, StorageError, StorageResult};
use crate::storage::{ResumeMode, RunRecord, RunStatus, Stage};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// SQLite crawl store
pub struct SqliteStore {
    conn: Mutex<Connection>,
    run_id: i64,
    resuming: bool,
}

impl SqliteStore {
    /// Opens (or creates) a crawl store
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    /// * `mode` - Whether an interrupted run may be resumed
    /// * `config_hash` - Hash of the configuration driving this run
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStore)` - Store ready for a new or resumed run
    /// * `Err(StorageError)` - Failed to open or prepare the database
    pub fn open(path: &Path, mode: ResumeMode, config_hash: &str) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        // Configure SQLite for better performance
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        Self::from_connection(conn, mode, config_hash)
    }

    /// Opens an existing crawl store for inspection
    ///
    /// No run is started, resumed or rolled over.
    pub fn open_existing(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;
        initialize_schema(&conn)?;
        let run_id = query_latest_run(&conn)?.map(|run| run.id).unwrap_or(0);
        Ok(Self {
            conn: Mutex::new(conn),
            run_id,
            resuming: false,
        })
    }

    /// Creates an in-memory store that starts a fresh run
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn, ResumeMode::Fresh, "in-memory")
    }

    fn from_connection(
        mut conn: Connection,
        mode: ResumeMode,
        config_hash: &str,
    ) -> StorageResult<Self> {
        initialize_schema(&conn)?;

        let latest_run = query_latest_run(&conn)?;
        let unfinished: i64 = conn.query_row(
            "SELECT COUNT(*) FROM refs WHERE stage IN (?1, ?2)",
            params![Stage::Queued.to_db_string(), Stage::Active.to_db_string()],
            |row| row.get(0),
        )?;

        let resumable = latest_run
            .as_ref()
            .filter(|run| run.status == RunStatus::Running && unfinished > 0);

        let (run_id, resuming) = match (mode, resumable) {
            (ResumeMode::Auto, Some(run)) => {
                tracing::info!(
                    "Resuming interrupted run {} ({} references left)",
                    run.id,
                    unfinished
                );
                if run.config_hash != config_hash {
                    tracing::warn!("Configuration changed since run {} started", run.id);
                }
                // References that were being processed when the run stopped
                // go back to the queue.
                conn.execute(
                    "UPDATE refs SET stage = ?1 WHERE stage = ?2",
                    params![Stage::Queued.to_db_string(), Stage::Active.to_db_string()],
                )?;
                (run.id, true)
            }
            _ => {
                let tx = conn.transaction()?;
                if mode == ResumeMode::Clean {
                    tx.execute_batch("DELETE FROM refs; DELETE FROM cache;")?;
                    tracing::info!("Crawl store cleaned");
                } else {
                    roll_over_cache(&tx)?;
                }
                let now = Utc::now().to_rfc3339();
                tx.execute(
                    "INSERT INTO runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
                    params![now, config_hash, RunStatus::Running.to_db_string()],
                )?;
                let run_id = tx.last_insert_rowid();
                tx.commit()?;
                tracing::info!("Starting new run {}", run_id);
                (run_id, false)
            }
        };

        Ok(Self {
            conn: Mutex::new(conn),
            run_id,
            resuming,
        })
    }

    /// Returns the ID of the run this store is serving
    pub fn run_id(&self) -> i64 {
        self.run_id
    }

    /// Gets the most recent run
    pub fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let conn = self.lock()?;
        query_latest_run(&conn)
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::Poisoned)
    }

    fn stage_of(&self, reference: &str) -> StorageResult<Option<Stage>> {
        let stage: Option<String> = self
            .lock()?
            .query_row(
                "SELECT stage FROM refs WHERE reference = ?1",
                params![reference],
                |row| row.get(0),
            )
            .optional()?;
        Ok(stage.and_then(|s| Stage::from_db_string(&s)))
    }

    fn count_stage(&self, stage: Stage) -> StorageResult<u64> {
        let count: i64 = self.lock()?.query_row(
            "SELECT COUNT(*) FROM refs WHERE stage = ?1",
            params![stage.to_db_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

/// Turns the previous run's results into the cache for a new run
///
/// Good documents replace their cached version. Documents that failed
/// transiently keep their older cached version so their children can still be
/// recovered; any other final state drops the cached version.
fn roll_over_cache(conn: &Connection) -> StorageResult<()> {
    let processed = Stage::Processed.to_db_string();
    conn.execute(
        "DELETE FROM cache WHERE reference IN (
             SELECT reference FROM refs WHERE stage = ?1 AND state NOT IN (?2, ?3)
         )",
        params![
            processed,
            CrawlState::BadStatus.to_db_string(),
            CrawlState::Error.to_db_string()
        ],
    )?;
    conn.execute(
        "INSERT OR REPLACE INTO cache (reference, state, data)
         SELECT reference, state, data FROM refs
         WHERE stage = ?1 AND state IN (?2, ?3, ?4)
           AND json_extract(data, '$.variation_of') IS NULL",
        params![
            processed,
            CrawlState::New.to_db_string(),
            CrawlState::Modified.to_db_string(),
            CrawlState::Unmodified.to_db_string()
        ],
    )?;
    conn.execute("DELETE FROM refs", [])?;
    Ok(())
}

fn query_latest_run(conn: &Connection) -> StorageResult<Option<RunRecord>> {
    let run = conn
        .query_row(
            "SELECT id, started_at, finished_at, config_hash, status FROM runs ORDER BY id DESC LIMIT 1",
            [],
            |row| {
                Ok(RunRecord {
                    id: row.get(0)?,
                    started_at: row.get(1)?,
                    finished_at: row.get(2)?,
                    config_hash: row.get(3)?,
                    status: RunStatus::from_db_string(&row.get::<_, String>(4)?)
                        .unwrap_or(RunStatus::Running),
                })
            },
        )
        .optional()?;
    Ok(run)
}

fn decode(data: &str) -> StorageResult<CrawlReference> {
    Ok(serde_json::from_str(data)?)
}

impl CrawlStore for SqliteStore {
    // ===== Queue Management =====

    fn queued(&self, reference: &CrawlReference) -> StorageResult<bool> {
        let mut queued = reference.clone();
        queued.state = CrawlState::Queued;
        let data = serde_json::to_string(&queued)?;

        let inserted = self.lock()?.execute(
            "INSERT OR IGNORE INTO refs (reference, stage, seq, state, data)
             VALUES (?1, ?2, (SELECT COALESCE(MAX(seq), 0) + 1 FROM refs), ?3, ?4)",
            params![
                queued.reference,
                Stage::Queued.to_db_string(),
                CrawlState::Queued.to_db_string(),
                data
            ],
        )?;
        Ok(inserted == 1)
    }

    fn next_queued(&self) -> StorageResult<Option<CrawlReference>> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let next: Option<(String, String)> = tx
            .query_row(
                "SELECT reference, data FROM refs WHERE stage = ?1 ORDER BY seq ASC LIMIT 1",
                params![Stage::Queued.to_db_string()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((key, data)) = next else {
            return Ok(None);
        };

        tx.execute(
            "UPDATE refs SET stage = ?1 WHERE reference = ?2",
            params![Stage::Active.to_db_string(), key],
        )?;
        tx.commit()?;

        decode(&data).map(Some)
    }

    fn processed(&self, reference: &CrawlReference) -> StorageResult<()> {
        let data = serde_json::to_string(reference)?;
        self.lock()?.execute(
            "INSERT INTO refs (reference, stage, seq, state, data)
             VALUES (?1, ?2, (SELECT COALESCE(MAX(seq), 0) + 1 FROM refs), ?3, ?4)
             ON CONFLICT(reference) DO UPDATE SET
                 stage = excluded.stage, state = excluded.state, data = excluded.data",
            params![
                reference.reference,
                Stage::Processed.to_db_string(),
                reference.state.to_db_string(),
                data
            ],
        )?;
        Ok(())
    }

    // ===== Lookups =====

    fn is_queued(&self, reference: &str) -> StorageResult<bool> {
        Ok(self.stage_of(reference)? == Some(Stage::Queued))
    }

    fn is_active(&self, reference: &str) -> StorageResult<bool> {
        Ok(self.stage_of(reference)? == Some(Stage::Active))
    }

    fn is_processed(&self, reference: &str) -> StorageResult<bool> {
        Ok(self.stage_of(reference)? == Some(Stage::Processed))
    }

    fn get(&self, reference: &str) -> StorageResult<Option<CrawlReference>> {
        let data: Option<String> = self
            .lock()?
            .query_row(
                "SELECT data FROM refs WHERE reference = ?1",
                params![reference],
                |row| row.get(0),
            )
            .optional()?;
        data.as_deref().map(decode).transpose()
    }

    fn get_cached(&self, reference: &str) -> StorageResult<Option<CachedReference>> {
        let data: Option<String> = self
            .lock()?
            .query_row(
                "SELECT data FROM cache WHERE reference = ?1",
                params![reference],
                |row| row.get(0),
            )
            .optional()?;
        data.as_deref().map(decode).transpose()
    }

    fn cached_references(&self) -> StorageResult<Vec<CachedReference>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT data FROM cache
             WHERE reference NOT IN (SELECT reference FROM refs)
             ORDER BY reference",
        )?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        rows.iter().map(|data| decode(data)).collect()
    }

    fn is_resuming(&self) -> bool {
        self.resuming
    }

    // ===== Statistics =====

    fn queue_size(&self) -> StorageResult<u64> {
        self.count_stage(Stage::Queued)
    }

    fn active_count(&self) -> StorageResult<u64> {
        self.count_stage(Stage::Active)
    }

    fn processed_count(&self) -> StorageResult<u64> {
        self.count_stage(Stage::Processed)
    }

    fn count_by_state(&self) -> StorageResult<HashMap<CrawlState, u64>> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT state, COUNT(*) FROM refs WHERE stage = ?1 GROUP BY state")?;

        let mut counts = HashMap::new();
        let rows = stmt.query_map(params![Stage::Processed.to_db_string()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        for row in rows {
            let (state_str, count) = row?;
            if let Some(state) = CrawlState::from_db_string(&state_str) {
                counts.insert(state, count as u64);
            }
        }

        Ok(counts)
    }

    // ===== Maintenance =====

    fn complete_run(&self) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.lock()?.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2 WHERE id = ?3",
            params![RunStatus::Completed.to_db_string(), now, self.run_id],
        )?;
        Ok(())
    }

    fn reset(&self) -> StorageResult<()> {
        self.lock()?
            .execute_batch("DELETE FROM refs; DELETE FROM cache;")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn processed_ref(url: &str, state: CrawlState, links: &[&str]) -> CrawlReference {
        let mut reference = CrawlReference::new(url, 0);
        reference.state = state;
        reference.referenced_urls = links.iter().map(|l| l.to_string()).collect();
        reference
    }

    #[test]
    fn test_create_in_memory() {
        let store = SqliteStore::new_in_memory().unwrap();
        assert!(store.run_id() > 0);
        assert!(!store.is_resuming());
    }

    #[test]
    fn test_no_next_on_empty_store() {
        let store = SqliteStore::new_in_memory().unwrap();
        assert!(store.next_queued().unwrap().is_none());
    }

    #[test]
    fn test_queue_is_fifo() {
        let store = SqliteStore::new_in_memory().unwrap();
        for path in ["c", "a", "b"] {
            let url = format!("https://example.com/{}", path);
            assert!(store.queued(&CrawlReference::new(url, 0)).unwrap());
        }

        let order: Vec<String> = std::iter::from_fn(|| store.next_queued().unwrap())
            .map(|r| r.reference)
            .collect();
        assert_eq!(
            order,
            vec![
                "https://example.com/c",
                "https://example.com/a",
                "https://example.com/b"
            ]
        );
    }

    #[test]
    fn test_queue_same_reference_twice() {
        let store = SqliteStore::new_in_memory().unwrap();
        let reference = CrawlReference::new("https://example.com/", 0);

        assert!(store.queued(&reference).unwrap());
        assert!(!store.queued(&reference).unwrap());

        assert!(store.next_queued().unwrap().is_some());
        assert!(store.next_queued().unwrap().is_none());
    }

    #[test]
    fn test_processed_reference_is_never_requeued() {
        let store = SqliteStore::new_in_memory().unwrap();
        let reference = CrawlReference::new("https://example.com/", 0);

        store.queued(&reference).unwrap();
        let mut active = store.next_queued().unwrap().unwrap();
        assert!(store.is_active(&active.reference).unwrap());

        active.state = CrawlState::New;
        store.processed(&active).unwrap();

        assert!(store.is_processed(&active.reference).unwrap());
        assert!(!store.is_active(&active.reference).unwrap());
        assert!(!store.queued(&reference).unwrap());
        assert!(store.next_queued().unwrap().is_none());
        assert_eq!(store.get(&active.reference).unwrap().unwrap().state, CrawlState::New);
    }

    #[test]
    fn test_processed_without_being_queued() {
        let store = SqliteStore::new_in_memory().unwrap();
        let reference = processed_ref("http://a.com", CrawlState::New, &[]);

        store.processed(&reference).unwrap();
        assert!(store.is_processed("http://a.com").unwrap());
        assert_eq!(store.processed_count().unwrap(), 1);
    }

    #[test]
    fn test_count_by_state() {
        let store = SqliteStore::new_in_memory().unwrap();
        store
            .processed(&processed_ref("https://a.com/1", CrawlState::New, &[]))
            .unwrap();
        store
            .processed(&processed_ref("https://a.com/2", CrawlState::New, &[]))
            .unwrap();
        store
            .processed(&processed_ref("https://a.com/3", CrawlState::Error, &[]))
            .unwrap();
        store.queued(&CrawlReference::new("https://a.com/4", 1)).unwrap();

        let counts = store.count_by_state().unwrap();
        assert_eq!(counts.get(&CrawlState::New), Some(&2));
        assert_eq!(counts.get(&CrawlState::Error), Some(&1));
        assert_eq!(counts.get(&CrawlState::Queued), None);
        assert_eq!(store.queue_size().unwrap(), 1);
    }

    #[test]
    fn test_resume_requeues_active_references() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("crawl.db");

        {
            let store = SqliteStore::open(&path, ResumeMode::Auto, "hash").unwrap();
            store.queued(&CrawlReference::new("https://a.com/1", 0)).unwrap();
            store.queued(&CrawlReference::new("https://a.com/2", 0)).unwrap();
            store
                .processed(&processed_ref("https://a.com/0", CrawlState::New, &[]))
                .unwrap();
            // Simulate a worker that was interrupted mid-reference
            store.next_queued().unwrap().unwrap();
        }

        let store = SqliteStore::open(&path, ResumeMode::Auto, "hash").unwrap();
        assert!(store.is_resuming());
        assert_eq!(store.queue_size().unwrap(), 2);
        assert_eq!(store.active_count().unwrap(), 0);
        assert!(store.is_processed("https://a.com/0").unwrap());
        assert_eq!(
            store.next_queued().unwrap().unwrap().reference,
            "https://a.com/1"
        );
    }

    #[test]
    fn test_completed_run_is_not_resumed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("crawl.db");

        {
            let store = SqliteStore::open(&path, ResumeMode::Auto, "hash").unwrap();
            store.queued(&CrawlReference::new("https://a.com/1", 0)).unwrap();
            store.complete_run().unwrap();
        }

        let store = SqliteStore::open(&path, ResumeMode::Auto, "hash").unwrap();
        assert!(!store.is_resuming());
        assert_eq!(store.queue_size().unwrap(), 0);
    }

    #[test]
    fn test_fresh_run_turns_processed_into_cache() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("crawl.db");

        {
            let store = SqliteStore::open(&path, ResumeMode::Fresh, "hash").unwrap();
            store
                .processed(&processed_ref(
                    "https://a.com/",
                    CrawlState::New,
                    &["https://a.com/x"],
                ))
                .unwrap();
            store
                .processed(&processed_ref("https://a.com/gone", CrawlState::NotFound, &[]))
                .unwrap();
            store.complete_run().unwrap();
        }

        let store = SqliteStore::open(&path, ResumeMode::Fresh, "hash").unwrap();
        assert!(!store.is_processed("https://a.com/").unwrap());

        let cached = store.get_cached("https://a.com/").unwrap().unwrap();
        assert_eq!(cached.state, CrawlState::New);
        assert!(cached.referenced_urls.contains("https://a.com/x"));
        assert!(store.get_cached("https://a.com/gone").unwrap().is_none());
    }

    #[test]
    fn test_transient_failure_keeps_older_cache() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("crawl.db");

        {
            let store = SqliteStore::open(&path, ResumeMode::Fresh, "hash").unwrap();
            store
                .processed(&processed_ref(
                    "https://a.com/",
                    CrawlState::New,
                    &["https://a.com/x"],
                ))
                .unwrap();
            store.complete_run().unwrap();
        }
        {
            let store = SqliteStore::open(&path, ResumeMode::Fresh, "hash").unwrap();
            store
                .processed(&processed_ref("https://a.com/", CrawlState::BadStatus, &[]))
                .unwrap();
            store.complete_run().unwrap();
        }

        let store = SqliteStore::open(&path, ResumeMode::Fresh, "hash").unwrap();
        let cached = store.get_cached("https://a.com/").unwrap().unwrap();
        assert_eq!(cached.state, CrawlState::New);
        assert_eq!(cached.referenced_urls.len(), 1);
    }

    #[test]
    fn test_cached_references_excludes_current_run() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("crawl.db");

        {
            let store = SqliteStore::open(&path, ResumeMode::Fresh, "hash").unwrap();
            store
                .processed(&processed_ref("https://a.com/1", CrawlState::New, &[]))
                .unwrap();
            store
                .processed(&processed_ref("https://a.com/2", CrawlState::New, &[]))
                .unwrap();
            store.complete_run().unwrap();
        }

        let store = SqliteStore::open(&path, ResumeMode::Fresh, "hash").unwrap();
        store
            .processed(&processed_ref("https://a.com/1", CrawlState::Unmodified, &[]))
            .unwrap();

        let orphans = store.cached_references().unwrap();
        assert_eq!(orphans.len(), 1);
        assert_eq!(orphans[0].reference, "https://a.com/2");
    }

    #[test]
    fn test_reset_clears_everything() {
        let store = SqliteStore::new_in_memory().unwrap();
        store.queued(&CrawlReference::new("https://a.com/1", 0)).unwrap();
        store
            .processed(&processed_ref("https://a.com/2", CrawlState::New, &[]))
            .unwrap();

        store.reset().unwrap();
        assert_eq!(store.queue_size().unwrap(), 0);
        assert_eq!(store.processed_count().unwrap(), 0);
    }

    #[test]
    fn test_clean_open_forgets_previous_runs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("crawl.db");

        {
            let store = SqliteStore::open(&path, ResumeMode::Fresh, "hash").unwrap();
            store
                .processed(&processed_ref("https://a.com/", CrawlState::New, &[]))
                .unwrap();
            store.queued(&CrawlReference::new("https://a.com/next", 1)).unwrap();
        }

        let store = SqliteStore::open(&path, ResumeMode::Clean, "hash").unwrap();
        assert!(!store.is_resuming());
        assert_eq!(store.queue_size().unwrap(), 0);
        assert!(store.get_cached("https://a.com/").unwrap().is_none());
    }

    #[test]
    fn test_latest_run_reflects_completion() {
        let store = SqliteStore::new_in_memory().unwrap();
        let run = store.get_latest_run().unwrap().unwrap();
        assert_eq!(run.id, store.run_id());
        assert_eq!(run.status, RunStatus::Running);

        store.complete_run().unwrap();
        let run = store.get_latest_run().unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Completed);
    }

    #[test]
    fn test_variations_do_not_enter_the_cache() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("crawl.db");

        {
            let store = SqliteStore::open(&path, ResumeMode::Fresh, "hash").unwrap();
            let mut reference =
                processed_ref("https://a.com/", CrawlState::New, &["https://a.com/x"]);
            reference.original_reference = Some("https://A.com".to_string());
            let variation = reference.original_variation().unwrap();
            store.processed(&reference).unwrap();
            store.processed(&variation).unwrap();
            store.complete_run().unwrap();
        }

        let store = SqliteStore::open(&path, ResumeMode::Fresh, "hash").unwrap();
        assert!(store.get_cached("https://a.com/").unwrap().is_some());
        assert!(store.get_cached("https://A.com").unwrap().is_none());
        assert!(store.cached_references().unwrap().iter().all(|c| !c.is_variation()));
    }

    #[test]
    fn test_concurrent_workers_take_each_reference_once() {
        const PRODUCERS: usize = 4;
        const CONSUMERS: usize = 4;
        const PER_PRODUCER: usize = 50;

        let store = SqliteStore::new_in_memory().unwrap();
        let producers_done = AtomicUsize::new(0);
        let taken = Mutex::new(Vec::new());

        std::thread::scope(|scope| {
            for producer in 0..PRODUCERS {
                let store = &store;
                let producers_done = &producers_done;
                scope.spawn(move || {
                    // Every producer offers the full set, so inserts race on the same keys
                    for i in 0..PER_PRODUCER {
                        let url = format!("https://a.com/{}", (i + producer) % PER_PRODUCER);
                        store.queued(&CrawlReference::new(url, 0)).unwrap();
                    }
                    producers_done.fetch_add(1, Ordering::SeqCst);
                });
            }
            for _ in 0..CONSUMERS {
                let store = &store;
                let producers_done = &producers_done;
                let taken = &taken;
                scope.spawn(move || loop {
                    match store.next_queued().unwrap() {
                        Some(mut reference) => {
                            reference.state = CrawlState::New;
                            store.processed(&reference).unwrap();
                            assert!(!store.is_queued(&reference.reference).unwrap());
                            taken.lock().unwrap().push(reference.reference);
                        }
                        None if producers_done.load(Ordering::SeqCst) == PRODUCERS => break,
                        None => std::thread::yield_now(),
                    }
                });
            }
        });

        // Producers may finish while a consumer still sees an empty queue
        while let Some(mut reference) = store.next_queued().unwrap() {
            reference.state = CrawlState::New;
            store.processed(&reference).unwrap();
            taken.lock().unwrap().push(reference.reference);
        }

        let mut taken = taken.into_inner().unwrap();
        assert_eq!(taken.len(), PER_PRODUCER);
        taken.sort();
        taken.dedup();
        assert_eq!(taken.len(), PER_PRODUCER);
        assert_eq!(store.processed_count().unwrap(), PER_PRODUCER as u64);
        assert_eq!(store.queue_size().unwrap(), 0);
        assert_eq!(store.active_count().unwrap(), 0);
    }
}
