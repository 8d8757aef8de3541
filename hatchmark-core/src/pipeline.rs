//! Notarization pipeline.
//!
//! Drives one submission from raw bytes to a committed ledger record:
//!
//! ```text
//! Received -> Fingerprinted -> DuplicateChecked -> Committed
//!                                                     |
//!                                   WatermarkPending -+-> WatermarkComplete
//! ```
//!
//! The left half is synchronous: any failure there aborts the submission and
//! is reported with a specific reason. [`Ledger::append`] is the durability
//! point; nothing after it can un-register the content. The watermark half
//! runs on a separate worker fed over a bounded channel; it only ever
//! touches `watermark_status`, may be retried independently, and may end in
//! a permanent `Failed` status without affecting the registration.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use backoff::{future::retry_notify, ExponentialBackoff};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use crate::embedder::{WatermarkEmbedder, WatermarkPayload};
use crate::error::{HatchmarkError, Result};
use crate::fingerprint::Fingerprint;
use crate::ledger::{Ledger, LedgerRecord, NewRecord, RecordId, WatermarkStatus};

/// Embed attempts before a watermark is marked `Failed`.
const DEFAULT_MAX_EMBED_RETRIES: u32 = 3;

/// Initial retry interval.
const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(100);

/// Maximum retry interval.
const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(2);

/// Watermark jobs buffered between the pipeline and its worker.
const DEFAULT_QUEUE_DEPTH: usize = 64;

/// Tunables for the asynchronous watermark phase.
///
/// Retry counts and backoff windows are policy, not correctness invariants:
/// whatever their values, a committed registration survives every watermark
/// outcome.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub max_embed_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub queue_depth: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_embed_retries: DEFAULT_MAX_EMBED_RETRIES,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
            queue_depth: DEFAULT_QUEUE_DEPTH,
        }
    }
}

/// Outcome of the synchronous registration phase.
#[derive(Debug, Clone)]
pub struct RegistrationReceipt {
    /// The committed record. Permanent from this point on.
    pub record: LedgerRecord,
    /// Earliest previously committed record with the same content digest,
    /// if any. Duplicates are flagged for the caller, never rejected.
    pub duplicate_of: Option<RecordId>,
}

/// Work item handed from the pipeline to the watermark worker.
#[derive(Debug)]
struct WatermarkJob {
    record_id: RecordId,
    state_version: u64,
    content: Vec<u8>,
    payload: Vec<u8>,
}

/// Completion event emitted by the watermark worker.
#[derive(Debug)]
pub struct WatermarkEvent {
    pub record_id: RecordId,
    pub status: WatermarkStatus,
    /// The marked copy on success. Where it is persisted is the caller's
    /// concern.
    pub watermarked: Option<Vec<u8>>,
}

/// Synchronous half of the registration flow.
pub struct NotarizationPipeline {
    ledger: Arc<dyn Ledger>,
    jobs: mpsc::Sender<WatermarkJob>,
}

impl NotarizationPipeline {
    /// Build a pipeline together with its watermark worker and the stream of
    /// completion events.
    ///
    /// The worker must be driven (`tokio::spawn(worker.run())`) for
    /// watermark statuses to progress; registrations themselves never depend
    /// on it. Dropping the pipeline closes the job channel and lets the
    /// worker drain and stop.
    pub fn new(
        ledger: Arc<dyn Ledger>,
        embedder: Arc<dyn WatermarkEmbedder>,
        config: PipelineConfig,
    ) -> (Self, WatermarkWorker, mpsc::Receiver<WatermarkEvent>) {
        let (jobs_tx, jobs_rx) = mpsc::channel(config.queue_depth);
        let (events_tx, events_rx) = mpsc::channel(config.queue_depth);

        let worker = WatermarkWorker {
            ledger: ledger.clone(),
            embedder,
            jobs: jobs_rx,
            events: events_tx,
            config,
        };
        let pipeline = Self {
            ledger,
            jobs: jobs_tx,
        };
        (pipeline, worker, events_rx)
    }

    /// Run the synchronous phase for one submission: validate, fingerprint,
    /// duplicate-check, commit, then hand the watermark job off.
    ///
    /// Errors before the commit abort the whole registration and carry a
    /// specific reason ([`HatchmarkError::UnsupportedContent`],
    /// [`HatchmarkError::LedgerUnavailable`], ...). Once this returns `Ok`,
    /// the registration is permanent regardless of the watermark outcome.
    #[instrument(level = "info", skip_all, fields(creator = %creator, filename = %original_filename, bytes = content.len()))]
    pub async fn register(
        &self,
        content: &[u8],
        creator: &str,
        original_filename: &str,
    ) -> Result<RegistrationReceipt> {
        if content.is_empty() {
            return Err(HatchmarkError::EmptySubmission);
        }

        // Received -> Fingerprinted. UnsupportedContent aborts here and is
        // reported to the caller, never retried.
        let fingerprint = Fingerprint::compute(content)?;
        debug!(digest = %fingerprint.digest, code = %fingerprint.code, "fingerprinted");

        // -> DuplicateChecked. Re-registration is always allowed; the
        // earliest matching record is surfaced for caller visibility.
        let matches = self.ledger.find_by_digest(&fingerprint.digest).await?;
        let duplicate_of = matches.first().map(|r| r.id);
        if let Some(prior) = duplicate_of {
            info!(duplicate_of = %prior, "content digest already registered");
        }

        // -> Committed. The durability point.
        let record = self
            .ledger
            .append(NewRecord {
                content_digest: fingerprint.digest,
                perceptual_code: fingerprint.code,
                creator: creator.to_string(),
                original_filename: original_filename.to_string(),
            })
            .await?;
        info!(id = %record.id, "registration committed");

        // -> WatermarkPending. Hand off to the worker. A stopped worker or
        // full queue leaves the record Pending; it never unwinds the commit.
        match (WatermarkPayload {
            record_id: record.id,
            content_digest: record.content_digest,
        })
        .to_cbor()
        {
            Ok(payload) => {
                let job = WatermarkJob {
                    record_id: record.id,
                    state_version: record.state_version,
                    content: content.to_vec(),
                    payload,
                };
                if let Err(e) = self.jobs.try_send(job) {
                    warn!(id = %record.id, error = %e, "watermark hand-off failed, record stays pending");
                }
            }
            Err(e) => {
                warn!(id = %record.id, error = %e, "payload encoding failed, record stays pending");
            }
        }

        Ok(RegistrationReceipt {
            record,
            duplicate_of,
        })
    }
}

/// Asynchronous half: consumes watermark jobs, embeds with bounded retries,
/// settles each record's status via compare-and-swap.
pub struct WatermarkWorker {
    ledger: Arc<dyn Ledger>,
    embedder: Arc<dyn WatermarkEmbedder>,
    jobs: mpsc::Receiver<WatermarkJob>,
    events: mpsc::Sender<WatermarkEvent>,
    config: PipelineConfig,
}

impl WatermarkWorker {
    /// Consume jobs until the pipeline side closes, emitting one completion
    /// event per job.
    pub async fn run(mut self) {
        while let Some(job) = self.jobs.recv().await {
            let record_id = job.record_id;
            let event = self.process(job).await;
            if self.events.send(event).await.is_err() {
                debug!(id = %record_id, "no completion event listener");
            }
        }
        debug!("watermark worker stopped");
    }

    #[instrument(level = "info", skip_all, fields(id = %job.record_id))]
    async fn process(&self, job: WatermarkJob) -> WatermarkEvent {
        match self.embed_with_retry(&job).await {
            Ok(marked) => {
                self.settle_status(job.record_id, job.state_version, WatermarkStatus::Embedded)
                    .await;
                WatermarkEvent {
                    record_id: job.record_id,
                    status: WatermarkStatus::Embedded,
                    watermarked: Some(marked),
                }
            }
            Err(e) => {
                warn!(error = %e, "embedding failed after retries");
                self.settle_status(job.record_id, job.state_version, WatermarkStatus::Failed)
                    .await;
                WatermarkEvent {
                    record_id: job.record_id,
                    status: WatermarkStatus::Failed,
                    watermarked: None,
                }
            }
        }
    }

    fn build_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.config.initial_backoff,
            max_interval: self.config.max_backoff,
            max_elapsed_time: None,
            ..Default::default()
        }
    }

    /// Invoke the embedder with exponential backoff, giving up after the
    /// configured attempt budget. The embedder is not assumed idempotent,
    /// only tolerant of repeated invocation for the same record.
    async fn embed_with_retry(&self, job: &WatermarkJob) -> Result<Vec<u8>> {
        let max_attempts = self.config.max_embed_retries.max(1);
        let attempts = AtomicU32::new(0);

        retry_notify(
            self.build_backoff(),
            || async {
                let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                self.embedder
                    .embed(&job.content, &job.payload)
                    .await
                    .map_err(|e| {
                        if attempt >= max_attempts {
                            backoff::Error::permanent(e)
                        } else {
                            backoff::Error::transient(e)
                        }
                    })
            },
            |err: HatchmarkError, after: Duration| {
                warn!(
                    error = %err,
                    retry_after_ms = after.as_millis() as u64,
                    "embed attempt failed, retry scheduled"
                );
            },
        )
        .await
    }

    /// Settle the record's final watermark status.
    ///
    /// A `Conflict` means another writer (typically a concurrent retry of
    /// the same job) advanced the state version: re-read, and either adopt
    /// the observed version or stop once the record has left `Pending`.
    /// The outcome is correct either way, and conflicts never escape the
    /// pipeline.
    async fn settle_status(&self, id: RecordId, mut expected: u64, status: WatermarkStatus) {
        loop {
            match self
                .ledger
                .update_watermark_status(id, expected, status)
                .await
            {
                Ok(record) => {
                    info!(id = %id, status = %record.watermark_status, "watermark status settled");
                    return;
                }
                Err(HatchmarkError::Conflict { .. }) => match self.ledger.get(id).await {
                    Ok(Some(current)) if current.watermark_status == WatermarkStatus::Pending => {
                        debug!(id = %id, "raced on state version, retrying");
                        expected = current.state_version;
                    }
                    Ok(Some(current)) => {
                        debug!(id = %id, status = %current.watermark_status, "already settled by another writer");
                        return;
                    }
                    Ok(None) => {
                        warn!(id = %id, "record missing during status update");
                        return;
                    }
                    Err(e) => {
                        warn!(id = %id, error = %e, "re-read failed, leaving record pending");
                        return;
                    }
                },
                Err(e) => {
                    warn!(id = %id, error = %e, "status update failed, record stays pending");
                    return;
                }
            }
        }
    }
}
