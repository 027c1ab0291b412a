//! Repository implementations for data access.

mod snapshot;

pub use snapshot::{SnapshotRepository, StoredSnapshot};

use anyhow::Result;
use rusqlite::Connection;
use std::sync::{Arc, Mutex, MutexGuard};

pub(super) type DbConn = Arc<Mutex<Connection>>;

/// Marker trait for repository types constructed over a shared [`DbConn`].
pub trait Repository {}

fn lock(conn: &DbConn) -> Result<MutexGuard<'_, Connection>> {
    conn.lock()
        .map_err(|_| anyhow::anyhow!("Failed to acquire database lock"))
}
