//! File-backed ledger journal.
//!
//! One JSON object per line. The file itself is append-only: a watermark
//! status update appends a superseding line carrying the same id and a
//! bumped `state_version`, so the full mutation history stays auditable on
//! disk. Replay on open keeps the newest version of each record while
//! preserving first-commit order.
//!
//! I/O failures surface as [`HatchmarkError::LedgerUnavailable`]; the caller
//! resubmits. A registration is durable once its line is synced.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use super::{sort_records, Ledger, LedgerRecord, NewRecord, RecordId, WatermarkStatus};
use crate::error::{HatchmarkError, Result};
use crate::fingerprint::ContentDigest;

#[derive(Default, Debug)]
struct JournalState {
    /// Latest version of each record, in first-commit order.
    records: Vec<LedgerRecord>,
    by_id: HashMap<RecordId, usize>,
    last_registered_at: Option<DateTime<Utc>>,
}

impl JournalState {
    /// Fold one journal line into the replayed state. Later lines supersede
    /// earlier ones for the same id.
    fn apply(&mut self, record: LedgerRecord) {
        if let Some(ts) = self.last_registered_at {
            if record.registered_at > ts {
                self.last_registered_at = Some(record.registered_at);
            }
        } else {
            self.last_registered_at = Some(record.registered_at);
        }

        match self.by_id.get(&record.id) {
            Some(&index) => {
                if record.state_version >= self.records[index].state_version {
                    self.records[index] = record;
                }
            }
            None => {
                self.by_id.insert(record.id, self.records.len());
                self.records.push(record);
            }
        }
    }

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

/// Durable [`Ledger`] backed by a JSON-lines journal.
#[derive(Debug)]
pub struct JsonlLedger {
    path: PathBuf,
    state: Mutex<JournalState>,
}

impl JsonlLedger {
    /// Open the journal at `path`, creating it on first write, replaying any
    /// existing lines.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut state = JournalState::default();

        if path.exists() {
            let file = File::open(&path).map_err(unavailable)?;
            for (lineno, line) in BufReader::new(file).lines().enumerate() {
                let line = line.map_err(unavailable)?;
                if line.trim().is_empty() {
                    continue;
                }
                let record: LedgerRecord = serde_json::from_str(&line).map_err(|e| {
                    HatchmarkError::Serialization(format!(
                        "journal line {}: {e}",
                        lineno + 1
                    ))
                })?;
                state.apply(record);
            }
        }

        info!(
            path = %path.display(),
            records = state.records.len(),
            "ledger journal opened"
        );
        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    /// Journal file location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one line and sync it to disk.
    fn write_line(&self, record: &LedgerRecord) -> Result<()> {
        let mut line = serde_json::to_string(record)
            .map_err(|e| HatchmarkError::Serialization(e.to_string()))?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(unavailable)?;
        file.write_all(line.as_bytes()).map_err(unavailable)?;
        file.sync_data().map_err(unavailable)?;
        Ok(())
    }
}

fn unavailable(e: std::io::Error) -> HatchmarkError {
    HatchmarkError::LedgerUnavailable(e.to_string())
}

fn poisoned() -> HatchmarkError {
    HatchmarkError::LedgerUnavailable("ledger lock poisoned".into())
}

#[async_trait]
impl Ledger for JsonlLedger {
    async fn append(&self, record: NewRecord) -> Result<LedgerRecord> {
        let mut state = self.state.lock().map_err(|_| poisoned())?;

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

        // Disk first: the record only enters the replayed state once its
        // line is durable.
        self.write_line(&committed)?;
        let index = state.records.len();
        state.by_id.insert(committed.id, index);
        state.records.push(committed.clone());

        debug!(id = %committed.id, digest = %committed.content_digest, "record committed");
        Ok(committed)
    }

    async fn get(&self, id: RecordId) -> Result<Option<LedgerRecord>> {
        let state = self.state.lock().map_err(|_| poisoned())?;
        Ok(state
            .by_id
            .get(&id)
            .map(|&index| state.records[index].clone()))
    }

    async fn find_by_digest(&self, digest: &ContentDigest) -> Result<Vec<LedgerRecord>> {
        let state = self.state.lock().map_err(|_| poisoned())?;
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
        let state = self.state.lock().map_err(|_| poisoned())?;
        Ok(state.records.clone())
    }

    async fn update_watermark_status(
        &self,
        id: RecordId,
        expected_state_version: u64,
        status: WatermarkStatus,
    ) -> Result<LedgerRecord> {
        let mut state = self.state.lock().map_err(|_| poisoned())?;

        let index = *state
            .by_id
            .get(&id)
            .ok_or(HatchmarkError::RecordNotFound(id))?;
        let current = &state.records[index];

        if current.state_version != expected_state_version {
            return Err(HatchmarkError::Conflict {
                expected: expected_state_version,
                found: current.state_version,
            });
        }

        let mut updated = current.clone();
        updated.watermark_status = status;
        updated.state_version += 1;

        self.write_line(&updated)?;
        state.records[index] = updated.clone();
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::PerceptualCode;

    fn new_record(tag: &str) -> NewRecord {
        NewRecord {
            content_digest: ContentDigest::from_bytes(tag.as_bytes()),
            perceptual_code: PerceptualCode(0xABCD),
            creator: "Bob".into(),
            original_filename: format!("{tag}.jpg"),
        }
    }

    #[tokio::test]
    async fn test_append_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.jsonl");

        let first;
        {
            let ledger = JsonlLedger::open(&path).unwrap();
            first = ledger.append(new_record("a")).await.unwrap();
            ledger.append(new_record("b")).await.unwrap();
        }

        let reopened = JsonlLedger::open(&path).unwrap();
        let records = reopened.scan_all().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, first.id);
        assert_eq!(
            reopened.get(first.id).await.unwrap().unwrap().creator,
            "Bob"
        );
    }

    #[tokio::test]
    async fn test_status_update_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.jsonl");

        let record;
        {
            let ledger = JsonlLedger::open(&path).unwrap();
            record = ledger.append(new_record("a")).await.unwrap();
            ledger
                .update_watermark_status(record.id, 0, WatermarkStatus::Embedded)
                .await
                .unwrap();
        }

        let reopened = JsonlLedger::open(&path).unwrap();
        let replayed = reopened.get(record.id).await.unwrap().unwrap();
        assert_eq!(replayed.watermark_status, WatermarkStatus::Embedded);
        assert_eq!(replayed.state_version, 1);
        // One record, two journal lines: history is kept, state is folded.
        assert_eq!(reopened.scan_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cas_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = JsonlLedger::open(dir.path().join("ledger.jsonl")).unwrap();
        let record = ledger.append(new_record("a")).await.unwrap();

        ledger
            .update_watermark_status(record.id, 0, WatermarkStatus::Embedded)
            .await
            .unwrap();
        let err = ledger
            .update_watermark_status(record.id, 0, WatermarkStatus::Failed)
            .await
            .unwrap_err();
        assert!(matches!(err, HatchmarkError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_duplicate_digests_preserved() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = JsonlLedger::open(dir.path().join("ledger.jsonl")).unwrap();

        let first = ledger.append(new_record("dup")).await.unwrap();
        let second = ledger.append(new_record("dup")).await.unwrap();

        let matches = ledger
            .find_by_digest(&ContentDigest::from_bytes(b"dup"))
            .await
            .unwrap();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].id, first.id);
        assert_eq!(matches[1].id, second.id);
    }

    #[tokio::test]
    async fn test_open_rejects_corrupt_journal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.jsonl");
        std::fs::write(&path, "not json\n").unwrap();

        let err = JsonlLedger::open(&path).unwrap_err();
        assert!(matches!(err, HatchmarkError::Serialization(_)));
    }
}
