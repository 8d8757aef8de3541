//! Hatchmark Core - content notarization library
//!
//! This crate provides the fingerprinting, ledger and verification
//! primitives behind Hatchmark: register a file's fingerprints immutably,
//! then answer whether later content is a registered original, a modified
//! copy, or unknown.
//!
//! # Features
//!
//! - SHA3-256 content digests paired with 64-bit perceptual codes
//! - Pluggable append-only [`Ledger`] with in-memory and JSON-lines backends
//! - Asynchronous notarization pipeline with watermark hand-off and
//!   compare-and-swap status settlement
//! - Deterministic three-way verification verdicts
//! - Optional BK-tree nearest-neighbor matcher for large ledgers
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use hatchmark_core::{
//!     MatchPolicy, MemoryLedger, NotarizationPipeline, PipelineConfig,
//!     TrailerEmbedder, VerificationEngine, Verdict,
//! };
//!
//! # async fn example() -> hatchmark_core::Result<()> {
//! let ledger = Arc::new(MemoryLedger::new());
//!
//! let (pipeline, worker, _events) = NotarizationPipeline::new(
//!     ledger.clone(),
//!     Arc::new(TrailerEmbedder),
//!     PipelineConfig::default(),
//! );
//! tokio::spawn(worker.run());
//!
//! let image = std::fs::read("artwork.png")?;
//! let receipt = pipeline.register(&image, "Alice", "artwork.png").await?;
//! println!("registered as {}", receipt.record.id);
//!
//! let engine = VerificationEngine::new(ledger, MatchPolicy::default());
//! match engine.verify(&image).await? {
//!     Verdict::Verified { record } => println!("original from {}", record.registered_at),
//!     Verdict::PotentiallyAltered { distance, .. } => println!("altered copy ({distance} bits off)"),
//!     Verdict::NotRegistered => println!("unknown content"),
//! }
//! # Ok(())
//! # }
//! ```

pub mod embedder;
pub mod error;
pub mod fingerprint;
pub mod index;
pub mod ledger;
pub mod pipeline;
pub mod verify;

// Re-export main types for convenience
pub use embedder::{
    MockEmbedder, TrailerEmbedder, TrailerExtractor, WatermarkEmbedder, WatermarkExtractor,
    WatermarkPayload,
};
pub use error::{HatchmarkError, Result};
pub use fingerprint::{ContentDigest, Fingerprint, PerceptualCode};
pub use index::PerceptualIndex;
pub use ledger::{
    JsonlLedger, Ledger, LedgerRecord, MemoryLedger, NewRecord, RecordId, WatermarkStatus,
};
pub use pipeline::{
    NotarizationPipeline, PipelineConfig, RegistrationReceipt, WatermarkEvent, WatermarkWorker,
};
pub use verify::{MatchPolicy, Verdict, VerificationEngine};
