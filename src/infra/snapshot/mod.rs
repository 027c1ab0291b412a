//! Versioned per-user snapshots of the scan request.
//!
//! Every transition overwrites the user's slot with
//! `{ "version", "state", "persistedAt" }`. Loading is fail-open: anything
//! that cannot be turned back into a request is treated as no snapshot.

mod memory;
mod migrate;

pub use memory::MemorySnapshotSlot;

use anyhow::Result;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::domain::{ScanPhase, ScanRequest, SnapshotError};

/// Version written by [`encode`].
pub const SNAPSHOT_VERSION: u32 = 2;

/// Storage for one snapshot blob per user.
pub trait SnapshotSlot: Send + Sync {
    fn read(&self, user_id: &str) -> Result<Option<String>>;
    fn write(&self, user_id: &str, phase: ScanPhase, payload: &str) -> Result<()>;
    fn clear(&self, user_id: &str) -> Result<()>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EnvelopeOut<'a> {
    version: u32,
    state: &'a ScanRequest,
    persisted_at: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnvelopeIn {
    version: u32,
    state: serde_json::Value,
    #[serde(default)]
    persisted_at: i64,
}

/// A decoded snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub state: ScanRequest,
    pub persisted_at: DateTime<Utc>,
    /// Version the payload was written with, before migration.
    pub version: u32,
}

pub fn encode(state: &ScanRequest, persisted_at: DateTime<Utc>) -> Result<String, SnapshotError> {
    let envelope = EnvelopeOut {
        version: SNAPSHOT_VERSION,
        state,
        persisted_at: persisted_at.timestamp_millis(),
    };
    Ok(serde_json::to_string(&envelope)?)
}

pub fn decode(payload: &str) -> Result<Snapshot, SnapshotError> {
    let envelope: EnvelopeIn = serde_json::from_str(payload)?;
    let state = match envelope.version {
        SNAPSHOT_VERSION => serde_json::from_value(envelope.state)?,
        1 => migrate::from_v1(envelope.state)?,
        other => return Err(SnapshotError::UnsupportedVersion(other)),
    };
    let persisted_at = Utc
        .timestamp_millis_opt(envelope.persisted_at)
        .single()
        .unwrap_or_default();
    Ok(Snapshot {
        state,
        persisted_at,
        version: envelope.version,
    })
}

/// Reads and writes scan snapshots through a [`SnapshotSlot`].
#[derive(Clone)]
pub struct ScanPersistence {
    slot: Arc<dyn SnapshotSlot>,
}

impl ScanPersistence {
    pub fn new(slot: Arc<dyn SnapshotSlot>) -> Self {
        Self { slot }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemorySnapshotSlot::new()))
    }

    /// Replaces the user's snapshot; an idle request clears the slot instead.
    pub fn persist(&self, user_id: &str, state: &ScanRequest) -> Result<()> {
        if state.is_idle() {
            return self.slot.clear(user_id);
        }
        let payload = encode(state, Utc::now())?;
        self.slot.write(user_id, state.phase, &payload)
    }

    /// Returns the user's snapshot, or `None` when absent or unreadable.
    pub fn load(&self, user_id: &str) -> Option<Snapshot> {
        let payload = match self.slot.read(user_id) {
            Ok(Some(payload)) => payload,
            Ok(None) => return None,
            Err(err) => {
                log::warn!("Failed to read scan snapshot for {user_id}: {err:#}");
                return None;
            }
        };
        match decode(&payload).and_then(|snapshot| check_owner(user_id, snapshot)) {
            Ok(snapshot) => {
                if snapshot.version != SNAPSHOT_VERSION {
                    log::info!(
                        "Migrated scan snapshot for {user_id} from v{} to v{SNAPSHOT_VERSION}",
                        snapshot.version
                    );
                }
                Some(snapshot)
            }
            Err(err) => {
                log::warn!("Discarding scan snapshot for {user_id}: {err}");
                None
            }
        }
    }

    pub fn clear(&self, user_id: &str) -> Result<()> {
        self.slot.clear(user_id)
    }
}

fn check_owner(user_id: &str, snapshot: Snapshot) -> Result<Snapshot, SnapshotError> {
    match snapshot.state.user_id.as_deref() {
        Some(owner) if owner != user_id => Err(SnapshotError::ForeignUser(owner.to_string())),
        _ => Ok(snapshot),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CreditState, ImagePayload, ScanMode};

    fn capturing(user: &str) -> ScanRequest {
        ScanRequest {
            phase: ScanPhase::Capturing,
            mode: ScanMode::Batch,
            images: vec![ImagePayload::jpeg(vec![1, 2, 3])],
            request_id: Some("req-1".into()),
            user_id: Some(user.into()),
            started_at: Some(Utc.with_ymd_and_hms(2026, 5, 1, 9, 30, 0).unwrap()),
            ..Default::default()
        }
    }

    #[test]
    fn envelope_carries_version_and_millis() {
        let at = Utc.with_ymd_and_hms(2026, 5, 1, 10, 0, 0).unwrap();
        let payload = encode(&capturing("u1"), at).unwrap();
        let json: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(json["version"], SNAPSHOT_VERSION);
        assert_eq!(json["persistedAt"], at.timestamp_millis());
        assert_eq!(json["state"]["phase"], "capturing");

        let snapshot = decode(&payload).unwrap();
        assert_eq!(snapshot.state, capturing("u1"));
        assert_eq!(snapshot.persisted_at, at);
    }

    #[test]
    fn unknown_version_is_rejected() {
        let payload = r#"{"version":99,"state":{},"persistedAt":0}"#;
        assert!(matches!(
            decode(payload),
            Err(SnapshotError::UnsupportedVersion(99))
        ));
    }

    #[test]
    fn load_is_fail_open() {
        let slot = Arc::new(MemorySnapshotSlot::new());
        let persistence = ScanPersistence::new(slot.clone());

        slot.write("u1", ScanPhase::Scanning, "{not json").unwrap();
        assert!(persistence.load("u1").is_none());

        slot.write("u1", ScanPhase::Scanning, r#"{"version":7,"state":{}}"#)
            .unwrap();
        assert!(persistence.load("u1").is_none());

        assert!(persistence.load("nobody").is_none());
    }

    #[test]
    fn snapshot_of_another_user_is_ignored() {
        let persistence = ScanPersistence::in_memory();
        persistence.persist("u1", &capturing("u2")).unwrap();
        assert!(persistence.load("u1").is_none());
    }

    #[test]
    fn idle_clears_the_slot() {
        let slot = Arc::new(MemorySnapshotSlot::new());
        let persistence = ScanPersistence::new(slot.clone());
        persistence.persist("u1", &capturing("u1")).unwrap();
        assert!(slot.payload("u1").is_some());

        persistence.persist("u1", &ScanRequest::default()).unwrap();
        assert!(slot.payload("u1").is_none());
    }

    #[test]
    fn later_writes_replace_earlier_ones() {
        let persistence = ScanPersistence::in_memory();
        persistence.persist("u1", &capturing("u1")).unwrap();

        let mut scanning = capturing("u1");
        scanning.phase = ScanPhase::Scanning;
        scanning.credit_state = CreditState::Reserved;
        persistence.persist("u1", &scanning).unwrap();

        let loaded = persistence.load("u1").unwrap();
        assert_eq!(loaded.state.phase, ScanPhase::Scanning);
        assert_eq!(loaded.version, SNAPSHOT_VERSION);
    }
}
