//! SQLite database setup and connection management for receipt scanning.
//! Handles database initialization and schema versioning.

use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use super::repository::SnapshotRepository;
use crate::infra::app_config;

const SCHEMA_VERSION: i32 = 1;

/// Database wrapper that manages the SQLite connection
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl Database {
    /// Create or open the database at the default location
    pub fn open() -> Result<Self> {
        Self::open_at(Self::default_path())
    }

    /// Create an in-memory database (useful for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
            path: None,
        };
        db.init()?;
        Ok(db)
    }

    /// Create or open the database at a specific path
    pub fn open_at(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create database directory {}", parent.display()))?;
        }

        let conn = Connection::open(&path)
            .with_context(|| format!("open database {}", path.display()))?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
            path: Some(path),
        };
        db.init()?;
        Ok(db)
    }

    /// Default database path: `RECEIPT_SCAN_DB_PATH`, else the app data dir.
    pub fn default_path() -> PathBuf {
        if let Ok(path) = std::env::var("RECEIPT_SCAN_DB_PATH") {
            return PathBuf::from(path);
        }
        app_config::app_data_dir().join("db.sqlite")
    }

    /// File backing this database, `None` when in memory.
    pub fn path(&self) -> Option<&PathBuf> {
        self.path.as_ref()
    }

    fn init(&self) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| anyhow::anyhow!("database lock poisoned"))?;

        let existing_version: i32 =
            conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

        if existing_version == 0 {
            // Fresh database: create the current schema directly
            Self::create_schema(&conn)?;
            conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        } else if existing_version > SCHEMA_VERSION {
            anyhow::bail!(
                "database schema v{existing_version} is newer than supported v{SCHEMA_VERSION}"
            );
        }

        Ok(())
    }

    /// Get a handle to the shared connection
    pub fn connection(&self) -> Arc<Mutex<Connection>> {
        self.conn.clone()
    }

    pub fn snapshot_repo(&self) -> SnapshotRepository {
        SnapshotRepository::new(self.connection())
    }

    fn create_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS scan_snapshots (
                user_id TEXT PRIMARY KEY,
                payload TEXT NOT NULL,
                phase TEXT NOT NULL DEFAULT 'capturing',
                persisted_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_scan_snapshots_persisted_at ON scan_snapshots(persisted_at);
            "#,
        )?;
        Ok(())
    }
}
