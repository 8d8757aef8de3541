//! In-memory ledger backend.
//!
//! Keeps every record in process memory. Suitable for tests and for
//! embedding the core in a host that provides its own durability; the
//! contract is identical to the durable backends.

use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use super::{sort_records, Ledger, LedgerRecord, NewRecord, RecordId, WatermarkStatus};
use crate::error::{HatchmarkError, Result};
use crate::fingerprint::ContentDigest;

#[derive(Default)]
struct MemoryState {
    records: Vec<LedgerRecord>,
    last_registered_at: Option<DateTime<Utc>>,
}

impl MemoryState {
    /// Next commit timestamp, strictly after the previous one.
    fn next_timestamp(&mut self) -> DateTime<Utc> {
        let mut now = Utc::now();
        if let Some(last) = self.last_registered_at {
            if now <= last {
                now = last + Duration::microseconds(1);
            }
        }
        self.last_registered_at = Some(now);
        now
    }
}

/// In-memory [`Ledger`].
#[derive(Default)]
pub struct MemoryLedger {
    state: RwLock<MemoryState>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of committed records.
    pub fn len(&self) -> usize {
        self.state.read().map(|s| s.records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> HatchmarkError {
    HatchmarkError::LedgerUnavailable("ledger lock poisoned".into())
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn append(&self, record: NewRecord) -> Result<LedgerRecord> {
        let mut state = self.state.write().map_err(|_| poisoned())?;

        let committed = LedgerRecord {
            id: RecordId::generate(),
            content_digest: record.content_digest,
            perceptual_code: record.perceptual_code,
            creator: record.creator,
            original_filename: record.original_filename,
            registered_at: state.next_timestamp(),
            watermark_status: WatermarkStatus::Pending,
            state_version: 0,
        };
        state.records.push(committed.clone());

        debug!(id = %committed.id, digest = %committed.content_digest, "record committed");
        Ok(committed)
    }

    async fn get(&self, id: RecordId) -> Result<Option<LedgerRecord>> {
        let state = self.state.read().map_err(|_| poisoned())?;
        Ok(state.records.iter().find(|r| r.id == id).cloned())
    }

    async fn find_by_digest(&self, digest: &ContentDigest) -> Result<Vec<LedgerRecord>> {
        let state = self.state.read().map_err(|_| poisoned())?;
        let mut matches: Vec<LedgerRecord> = state
            .records
            .iter()
            .filter(|r| r.content_digest == *digest)
            .cloned()
            .collect();
        drop(state);

        sort_records(&mut matches);
        Ok(matches)
    }

    async fn scan_all(&self) -> Result<Vec<LedgerRecord>> {
        // Clone under a briefly-held read lock; the caller iterates the
        // snapshot without blocking writers.
        let state = self.state.read().map_err(|_| poisoned())?;
        Ok(state.records.clone())
    }

    async fn update_watermark_status(
        &self,
        id: RecordId,
        expected_state_version: u64,
        status: WatermarkStatus,
    ) -> Result<LedgerRecord> {
        let mut state = self.state.write().map_err(|_| poisoned())?;

        let record = state
            .records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(HatchmarkError::RecordNotFound(id))?;

        if record.state_version != expected_state_version {
            return Err(HatchmarkError::Conflict {
                expected: expected_state_version,
                found: record.state_version,
            });
        }

        record.watermark_status = status;
        record.state_version += 1;
        Ok(record.clone())
    }
}
