use anyhow::{Result, bail};
use parking_lot::Mutex;
use std::collections::HashMap;

use super::SnapshotSlot;
use crate::domain::ScanPhase;

/// Process-local snapshot storage.
#[derive(Debug, Default)]
pub struct MemorySnapshotSlot {
    payloads: Mutex<HashMap<String, String>>,
    writes: Mutex<usize>,
    fail_writes: Mutex<bool>,
}

impl MemorySnapshotSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn payload(&self, user_id: &str) -> Option<String> {
        self.payloads.lock().get(user_id).cloned()
    }

    /// Number of successful writes so far.
    pub fn writes(&self) -> usize {
        *self.writes.lock()
    }

    pub fn set_fail_writes(&self, fail: bool) {
        *self.fail_writes.lock() = fail;
    }
}

impl SnapshotSlot for MemorySnapshotSlot {
    fn read(&self, user_id: &str) -> Result<Option<String>> {
        Ok(self.payload(user_id))
    }

    fn write(&self, user_id: &str, _phase: ScanPhase, payload: &str) -> Result<()> {
        if *self.fail_writes.lock() {
            bail!("snapshot storage is read-only");
        }
        self.payloads
            .lock()
            .insert(user_id.to_string(), payload.to_string());
        *self.writes.lock() += 1;
        Ok(())
    }

    fn clear(&self, user_id: &str) -> Result<()> {
        self.payloads.lock().remove(user_id);
        Ok(())
    }
}
