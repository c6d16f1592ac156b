//! Database connection and schema management.

use rusqlite::Connection;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::info;

use crate::storage::error::StorageResult;

/// Database connection wrapper.
///
/// Manages the SQLite connection and schema initialization. Foreign keys are
/// enforced on every connection.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Opens a database file at `path`, creating it and its schema if needed.
    ///
    /// # Errors
    /// * `StorageError::Connection` - If the database connection fails
    pub fn open(path: &str) -> StorageResult<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        let db = Self { conn };
        db.init_schema()?;
        Ok(db)
    }

    /// Opens an in-memory database for testing.
    ///
    /// # Errors
    /// * `StorageError::Connection` - If the database connection fails
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init_schema()?;
        Ok(db)
    }

    /// Gets a reference to the underlying connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Gets a mutable reference to the underlying connection.
    pub fn conn_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    /// Creates every table and index. Idempotent.
    fn init_schema(&self) -> StorageResult<()> {
        info!("Initializing database schema");

        self.conn.pragma_update(None, "foreign_keys", "ON")?;

        self.conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS datasets (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                version TEXT NOT NULL,
                source_path TEXT NOT NULL,
                format TEXT NOT NULL DEFAULT 'jsonl',
                description TEXT NOT NULL DEFAULT '',
                license TEXT NOT NULL DEFAULT 'unknown',
                pii_checked INTEGER NOT NULL DEFAULT 0,
                tags TEXT NOT NULL DEFAULT '[]',
                row_count INTEGER,
                parent_dataset_id TEXT,
                checksum TEXT NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE(name, version)
            )
            "#,
            [],
        )?;

        self.conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS runs (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                base_model TEXT NOT NULL,
                dataset_id TEXT NOT NULL,
                recipe TEXT NOT NULL,
                config TEXT NOT NULL DEFAULT '{}',
                status TEXT NOT NULL DEFAULT 'pending',
                num_gpus INTEGER NOT NULL DEFAULT 1,
                priority INTEGER NOT NULL DEFAULT 0,
                tags TEXT NOT NULL DEFAULT '[]',
                error_message TEXT,
                retry_count INTEGER NOT NULL DEFAULT 0,
                started_at TEXT,
                completed_at TEXT,
                created_at TEXT NOT NULL,
                FOREIGN KEY (dataset_id) REFERENCES datasets(id)
            )
            "#,
            [],
        )?;

        // Append-only; one row per training step
        self.conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS run_metrics (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                run_id TEXT NOT NULL,
                step INTEGER NOT NULL,
                loss REAL NOT NULL,
                learning_rate REAL NOT NULL,
                epoch REAL NOT NULL,
                gpu_memory_mb REAL,
                throughput_samples_sec REAL,
                timestamp TEXT NOT NULL,
                UNIQUE(run_id, step),
                FOREIGN KEY (run_id) REFERENCES runs(id)
            )
            "#,
            [],
        )?;

        self.conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS models (
                id TEXT PRIMARY KEY,
                run_id TEXT NOT NULL,
                name TEXT NOT NULL,
                version TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                status TEXT NOT NULL DEFAULT 'staging',
                base_model TEXT NOT NULL,
                recipe TEXT NOT NULL,
                artifact_path TEXT,
                eval_scores TEXT NOT NULL DEFAULT '{}',
                promoted_at TEXT,
                created_at TEXT NOT NULL,
                UNIQUE(name, version),
                FOREIGN KEY (run_id) REFERENCES runs(id)
            )
            "#,
            [],
        )?;

        self.conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS evals (
                id TEXT PRIMARY KEY,
                model_id TEXT NOT NULL,
                suite TEXT NOT NULL DEFAULT 'default',
                status TEXT NOT NULL DEFAULT 'queued',
                regression_baseline_id TEXT,
                overall_score REAL,
                error_message TEXT,
                started_at TEXT,
                completed_at TEXT,
                created_at TEXT NOT NULL,
                FOREIGN KEY (model_id) REFERENCES models(id)
            )
            "#,
            [],
        )?;

        self.conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS eval_results (
                eval_id TEXT NOT NULL,
                position INTEGER NOT NULL,
                benchmark TEXT NOT NULL,
                score REAL NOT NULL,
                passed INTEGER NOT NULL,
                threshold REAL NOT NULL,
                details TEXT NOT NULL DEFAULT '{}',
                PRIMARY KEY (eval_id, position),
                FOREIGN KEY (eval_id) REFERENCES evals(id) ON DELETE CASCADE
            )
            "#,
            [],
        )?;

        self.conn.execute_batch(
            r#"
            CREATE INDEX IF NOT EXISTS idx_runs_dataset_id ON runs(dataset_id);
            CREATE INDEX IF NOT EXISTS idx_runs_status ON runs(status);
            CREATE INDEX IF NOT EXISTS idx_run_metrics_run_id ON run_metrics(run_id, step);
            CREATE INDEX IF NOT EXISTS idx_models_run_id ON models(run_id);
            CREATE INDEX IF NOT EXISTS idx_evals_model_id ON evals(model_id);
            "#,
        )?;

        info!("Database schema initialized successfully");
        Ok(())
    }

    /// Runs a transaction with the provided closure.
    ///
    /// The transaction commits if the closure returns `Ok` and rolls back otherwise.
    ///
    /// # Errors
    /// * `StorageError::Connection` - If the transaction fails
    pub fn transaction<F, R>(&mut self, f: F) -> StorageResult<R>
    where
        F: FnOnce(&rusqlite::Transaction) -> StorageResult<R>,
    {
        let tx = self.conn.transaction()?;
        match f(&tx) {
            Ok(result) => {
                tx.commit()?;
                Ok(result)
            }
            Err(e) => {
                tx.rollback()?;
                Err(e)
            }
        }
    }
}

/// One connection shared by the platform services.
///
/// Guards are short-lived and must never be held across an `.await`.
#[derive(Clone)]
pub struct SharedDatabase(Arc<Mutex<Database>>);

impl SharedDatabase {
    pub fn new(db: Database) -> Self {
        Self(Arc::new(Mutex::new(db)))
    }

    pub fn lock(&self) -> MutexGuard<'_, Database> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
