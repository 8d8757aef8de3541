//! Append-only registration ledger.
//!
//! The ledger is a dumb, auditable store: it assigns ids and timestamps,
//! keeps every committed record forever, and arbitrates watermark status
//! updates with compare-and-swap. Business policy (what a duplicate means,
//! how close is "similar") lives in the pipeline and the verification
//! engine, never here.
//!
//! # Backends
//!
//! - [`MemoryLedger`]: in-process store for tests and embedded use
//! - [`JsonlLedger`]: durable append-only journal of JSON lines

pub mod jsonl;
pub mod memory;

pub use jsonl::JsonlLedger;
pub use memory::MemoryLedger;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::fingerprint::{ContentDigest, PerceptualCode};

/// Opaque unique identifier of a ledger record. Assigned at commit, never
/// reused, never reassigned.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct RecordId(Uuid);

impl RecordId {
    /// Generate a fresh id. Only ledger backends assign ids.
    pub(crate) fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse an id from its canonical string form.
    pub fn parse(s: &str) -> Result<Self> {
        let uuid = Uuid::parse_str(s).map_err(|e| {
            crate::error::HatchmarkError::Serialization(format!("invalid record id: {e}"))
        })?;
        Ok(Self(uuid))
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Watermark lifecycle of a committed record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WatermarkStatus {
    /// Committed, watermark not yet embedded.
    Pending,
    /// Watermarked copy produced.
    Embedded,
    /// Embedding gave up after retries. A valid, permanent end state; the
    /// registration itself stands.
    Failed,
}

impl std::fmt::Display for WatermarkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Embedded => write!(f, "embedded"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// One committed registration.
///
/// Identity fields (`id`, `content_digest`, `perceptual_code`, `creator`,
/// `original_filename`, `registered_at`) are immutable once committed. Only
/// `watermark_status` and `state_version` change afterwards, and only
/// through [`Ledger::update_watermark_status`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerRecord {
    pub id: RecordId,
    pub content_digest: ContentDigest,
    pub perceptual_code: PerceptualCode,
    /// Free-form attribution supplied at registration time.
    pub creator: String,
    /// Advisory; not part of identity.
    pub original_filename: String,
    /// Assigned by the ledger at commit time, monotonic per instance.
    pub registered_at: DateTime<Utc>,
    pub watermark_status: WatermarkStatus,
    /// Incremented on every mutation; the compare-and-swap token.
    pub state_version: u64,
}

/// Input for a new registration. The ledger assigns everything else.
#[derive(Debug, Clone)]
pub struct NewRecord {
    pub content_digest: ContentDigest,
    pub perceptual_code: PerceptualCode,
    pub creator: String,
    pub original_filename: String,
}

/// Append-only record store.
///
/// Implementations must be safe under concurrent calls: `append`s never
/// collide on id and are all visible to later queries; status updates are
/// arbitrated by compare-and-swap, never last-write-wins. Deleting records
/// is not an operation; corrections are new records.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Commit a new record: assign `id` and `registered_at`, set
    /// `state_version = 0` and `watermark_status = Pending`, persist
    /// durably, return the committed record.
    ///
    /// This is the durability point of a registration: once it returns, the
    /// record survives regardless of what happens afterwards.
    async fn append(&self, record: NewRecord) -> Result<LedgerRecord>;

    /// Point lookup by id.
    async fn get(&self, id: RecordId) -> Result<Option<LedgerRecord>>;

    /// Every record with exactly this digest, ascending `registered_at`
    /// (ties by id). The ledger imposes no uniqueness on digests; callers
    /// decide precedence.
    async fn find_by_digest(&self, digest: &ContentDigest) -> Result<Vec<LedgerRecord>>;

    /// Point-in-time snapshot of every committed record.
    ///
    /// At least as fresh as the call: never omits a record committed before
    /// it, never yields a partially-written record, and does not hold locks
    /// while the caller iterates.
    async fn scan_all(&self) -> Result<Vec<LedgerRecord>>;

    /// Compare-and-swap the watermark status.
    ///
    /// Fails with [`HatchmarkError::Conflict`] when `expected_state_version`
    /// does not match the stored version; the caller re-reads and retries or
    /// abandons. Never a blind overwrite.
    ///
    /// [`HatchmarkError::Conflict`]: crate::error::HatchmarkError::Conflict
    async fn update_watermark_status(
        &self,
        id: RecordId,
        expected_state_version: u64,
        status: WatermarkStatus,
    ) -> Result<LedgerRecord>;
}

/// Sort records into query order: ascending `registered_at`, ties by id.
pub(crate) fn sort_records(records: &mut [LedgerRecord]) {
    records.sort_by(|a, b| {
        a.registered_at
            .cmp(&b.registered_at)
            .then_with(|| a.id.cmp(&b.id))
    });
}
