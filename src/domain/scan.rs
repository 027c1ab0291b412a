use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use super::dialog::ActiveDialog;
use super::receipt::ParsedReceipt;

/// Unique identifier for a scan request.
pub type RequestId = String;

/// Identifier of the user owning a scan request.
pub type UserId = String;

/// Hard ceiling on the number of images in one request.
pub const MAX_IMAGES: usize = 10;

/// Error shown when a persisted request was mid-analysis when the process died.
pub const INTERRUPTED_MESSAGE: &str = "The scan was interrupted before it finished. Please scan again.";

/// Error shown when a persisted request was mid-save when the process died.
pub const SAVE_INTERRUPTED_MESSAGE: &str =
    "Saving was interrupted. Check your expenses before saving again.";

/// Primary lifecycle stage of a scan request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanPhase {
    #[default]
    Idle,
    Capturing,
    Scanning,
    Reviewing,
    Saving,
    Error,
}

impl ScanPhase {
    pub const ALL: [ScanPhase; 6] = [
        Self::Idle,
        Self::Capturing,
        Self::Scanning,
        Self::Reviewing,
        Self::Saving,
        Self::Error,
    ];
}

impl fmt::Display for ScanPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Capturing => write!(f, "capturing"),
            Self::Scanning => write!(f, "scanning"),
            Self::Reviewing => write!(f, "reviewing"),
            Self::Saving => write!(f, "saving"),
            Self::Error => write!(f, "error"),
        }
    }
}

impl FromStr for ScanPhase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "idle" => Ok(Self::Idle),
            "capturing" | "capture" => Ok(Self::Capturing),
            "scanning" | "processing" => Ok(Self::Scanning),
            "reviewing" | "review" => Ok(Self::Reviewing),
            "saving" => Ok(Self::Saving),
            "error" | "failed" => Ok(Self::Error),
            other => Err(format!("unknown scan phase: {other}")),
        }
    }
}

/// How many receipts a request covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanMode {
    #[default]
    Single,
    Batch,
    /// Reserved for bank-statement imports; not implemented.
    Statement,
}

impl fmt::Display for ScanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single => write!(f, "single"),
            Self::Batch => write!(f, "batch"),
            Self::Statement => write!(f, "statement"),
        }
    }
}

impl FromStr for ScanMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "single" => Ok(Self::Single),
            "batch" | "multi" => Ok(Self::Batch),
            "statement" => Ok(Self::Statement),
            other => Err(format!("unknown scan mode: {other}")),
        }
    }
}

/// Metering lifecycle of the credits spent on a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditState {
    #[default]
    None,
    /// Debited; no analysis has come back yet.
    Reserved,
    /// At least one analysis succeeded. Final.
    Confirmed,
    /// Debited, then returned because no analysis could complete.
    Refunded,
}

impl CreditState {
    /// Whether moving from `self` to `next` respects credit monotonicity.
    pub fn can_become(self, next: CreditState) -> bool {
        match (self, next) {
            (a, b) if a == b => true,
            (Self::Confirmed, _) => false,
            (_, Self::None) => false,
            (Self::None | Self::Refunded, Self::Confirmed) => false,
            (Self::None, Self::Refunded) => false,
            // a retry after a refund debits again
            _ => true,
        }
    }
}

impl fmt::Display for CreditState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Reserved => write!(f, "reserved"),
            Self::Confirmed => write!(f, "confirmed"),
            Self::Refunded => write!(f, "refunded"),
        }
    }
}

/// An opaque captured photo.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImagePayload {
    pub mime_type: String,
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

impl ImagePayload {
    pub fn new(mime_type: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }

    pub fn jpeg(data: impl Into<Vec<u8>>) -> Self {
        Self::new("image/jpeg", data)
    }
}

impl fmt::Debug for ImagePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImagePayload")
            .field("mime_type", &self.mime_type)
            .field("bytes", &self.data.len())
            .finish()
    }
}

mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

/// A batch image whose analysis succeeded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSuccess {
    pub index: usize,
    pub receipt: ParsedReceipt,
}

/// A batch image whose analysis failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchFailure {
    pub index: usize,
    pub message: String,
}

/// Per-image progress of a batch request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchProgress {
    pub total: usize,
    /// Indices whose analysis has been dispatched.
    #[serde(default)]
    pub started: BTreeSet<usize>,
    /// Kept sorted by index.
    #[serde(default)]
    pub succeeded: Vec<BatchSuccess>,
    /// Kept sorted by index.
    #[serde(default)]
    pub failed: Vec<BatchFailure>,
}

impl BatchProgress {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Default::default()
        }
    }

    pub fn started_count(&self) -> usize {
        self.started.len()
    }

    pub fn settled_count(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn is_settled(&self, index: usize) -> bool {
        self.succeeded.iter().any(|s| s.index == index)
            || self.failed.iter().any(|f| f.index == index)
    }

    pub fn is_complete(&self) -> bool {
        self.settled_count() >= self.total
    }
}

/// The aggregate tracking one capture → analyze → review → save cycle.
///
/// `ScanRequest::default()` is the idle request; every other field is
/// meaningless while `phase` is [`ScanPhase::Idle`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRequest {
    pub phase: ScanPhase,
    #[serde(default)]
    pub mode: ScanMode,
    #[serde(default)]
    pub images: Vec<ImagePayload>,
    #[serde(default)]
    pub results: Vec<ParsedReceipt>,
    #[serde(default)]
    pub active_dialog: Option<ActiveDialog>,
    #[serde(default)]
    pub credit_state: CreditState,
    /// Credits debited for the current processing attempt.
    #[serde(default)]
    pub credits_charged: u32,
    #[serde(default)]
    pub batch_progress: Option<BatchProgress>,
    #[serde(default)]
    pub request_id: Option<RequestId>,
    #[serde(default)]
    pub user_id: Option<UserId>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ScanRequest {
    pub fn is_idle(&self) -> bool {
        self.phase == ScanPhase::Idle
    }

    /// A modal decision is pending.
    pub fn is_blocking(&self) -> bool {
        self.active_dialog.is_some()
    }

    pub fn can_navigate_freely(&self) -> bool {
        !self.is_blocking()
    }

    /// Remote work (analysis or store write) is in flight.
    pub fn is_processing(&self) -> bool {
        matches!(self.phase, ScanPhase::Scanning | ScanPhase::Saving)
    }

    /// An error raised before any receipt was produced, retried by processing again.
    pub fn is_scan_failure(&self) -> bool {
        self.phase == ScanPhase::Error && self.results.is_empty()
    }

    /// An error raised while storing reviewed receipts, retried by saving again.
    pub fn is_save_failure(&self) -> bool {
        self.phase == ScanPhase::Error && !self.results.is_empty()
    }

    /// Checks the structural invariants of the aggregate.
    pub fn violations(&self) -> Vec<String> {
        let mut out = Vec::new();
        if self.images.len() > MAX_IMAGES {
            out.push(format!(
                "{} images exceeds the ceiling of {MAX_IMAGES}",
                self.images.len()
            ));
        }
        if self.active_dialog.is_some()
            && !matches!(self.phase, ScanPhase::Reviewing | ScanPhase::Error)
        {
            out.push(format!("dialog open while {}", self.phase));
        }
        if self.error.is_some() && self.phase != ScanPhase::Error {
            out.push(format!("error message set while {}", self.phase));
        }
        if self.phase == ScanPhase::Error && self.error.is_none() {
            out.push("error phase without a message".to_string());
        }
        if self.credit_state == CreditState::Confirmed
            && self.results.is_empty()
            && self
                .batch_progress
                .as_ref()
                .is_none_or(|p| p.succeeded.is_empty())
            && !self.is_idle()
        {
            out.push("credit confirmed without a successful analysis".to_string());
        }
        if !self.is_idle() && self.request_id.is_none() {
            out.push(format!("{} request without an id", self.phase));
        }
        out
    }

    pub fn is_consistent(&self) -> bool {
        self.violations().is_empty()
    }
}
