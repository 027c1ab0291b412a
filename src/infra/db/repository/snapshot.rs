use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Row, params};
use std::str::FromStr;

use super::{DbConn, Repository, lock};
use crate::domain::ScanPhase;
use crate::infra::snapshot::SnapshotSlot;

/// Summary row of a pending snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredSnapshot {
    pub user_id: String,
    pub phase: ScanPhase,
    pub persisted_at: DateTime<Utc>,
}

/// One snapshot row per user in `scan_snapshots`.
pub struct SnapshotRepository {
    conn: DbConn,
}

impl Repository for SnapshotRepository {}

impl SnapshotRepository {
    pub fn new(conn: DbConn) -> Self {
        Self { conn }
    }

    pub fn save(&self, user_id: &str, phase: ScanPhase, payload: &str) -> Result<()> {
        let conn = lock(&self.conn)?;
        conn.execute(
            r#"
            INSERT INTO scan_snapshots (user_id, payload, phase, persisted_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(user_id) DO UPDATE SET
                payload = excluded.payload,
                phase = excluded.phase,
                persisted_at = excluded.persisted_at
            "#,
            params![user_id, payload, phase.to_string(), Utc::now().to_rfc3339()],
        )
        .context("save scan snapshot")?;
        Ok(())
    }

    pub fn find_payload(&self, user_id: &str) -> Result<Option<String>> {
        let conn = lock(&self.conn)?;
        conn.query_row(
            "SELECT payload FROM scan_snapshots WHERE user_id = ?1",
            [user_id],
            |row| row.get(0),
        )
        .optional()
        .context("load scan snapshot")
    }

    pub fn delete(&self, user_id: &str) -> Result<usize> {
        let conn = lock(&self.conn)?;
        let affected = conn
            .execute("DELETE FROM scan_snapshots WHERE user_id = ?1", [user_id])
            .context("delete scan snapshot")?;
        Ok(affected)
    }

    /// Users with a pending snapshot, most recent first.
    pub fn list(&self) -> Result<Vec<StoredSnapshot>> {
        let conn = lock(&self.conn)?;
        let mut stmt = conn.prepare(
            r#"
            SELECT user_id, phase, persisted_at
            FROM scan_snapshots
            ORDER BY persisted_at DESC
            "#,
        )?;
        let rows = stmt.query_map([], Self::row_to_summary)?;
        let mut snapshots = Vec::new();
        for row in rows {
            snapshots.push(row?);
        }
        Ok(snapshots)
    }

    pub fn list_users(&self) -> Result<Vec<String>> {
        Ok(self.list()?.into_iter().map(|s| s.user_id).collect())
    }

    fn row_to_summary(row: &Row<'_>) -> rusqlite::Result<StoredSnapshot> {
        let phase: String = row.get(1)?;
        let persisted_at: String = row.get(2)?;
        Ok(StoredSnapshot {
            user_id: row.get(0)?,
            phase: ScanPhase::from_str(&phase).unwrap_or(ScanPhase::Error),
            persisted_at: DateTime::parse_from_rfc3339(&persisted_at)
                .map(|at| at.with_timezone(&Utc))
                .unwrap_or_default(),
        })
    }
}

impl SnapshotSlot for SnapshotRepository {
    fn read(&self, user_id: &str) -> Result<Option<String>> {
        self.find_payload(user_id)
    }

    fn write(&self, user_id: &str, phase: ScanPhase, payload: &str) -> Result<()> {
        self.save(user_id, phase, payload)
    }

    fn clear(&self, user_id: &str) -> Result<()> {
        self.delete(user_id).map(|_| ())
    }
}
