//! Watermark collaborator contracts.
//!
//! Embedding and extraction are external, opaque transforms: possibly slow,
//! possibly failing, and not assumed idempotent. The pipeline owns the retry
//! policy; implementations must tolerate being invoked twice for the same
//! record.
//!
//! # Implementations
//!
//! - [`TrailerEmbedder`] / [`TrailerExtractor`]: payload in a tagged trailer
//!   after the image stream; a working default for local workflows.
//! - [`MockEmbedder`]: deterministic test double with injectable failures.

pub mod mock;
pub mod trailer;

pub use mock::MockEmbedder;
pub use trailer::{TrailerEmbedder, TrailerExtractor};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{HatchmarkError, Result};
use crate::fingerprint::ContentDigest;
use crate::ledger::RecordId;

/// Payload carried inside a watermark, binding a marked copy back to its
/// ledger record. CBOR-encoded on the wire for compactness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatermarkPayload {
    pub record_id: RecordId,
    pub content_digest: ContentDigest,
}

impl WatermarkPayload {
    /// Serialize the payload to CBOR bytes.
    pub fn to_cbor(&self) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        ciborium::into_writer(self, &mut bytes)
            .map_err(|e| HatchmarkError::Serialization(e.to_string()))?;
        Ok(bytes)
    }

    /// Deserialize a payload from CBOR bytes.
    pub fn from_cbor(bytes: &[u8]) -> Result<Self> {
        ciborium::from_reader(bytes).map_err(|e| HatchmarkError::Serialization(e.to_string()))
    }
}

/// Produces a watermarked copy of content carrying an opaque payload.
#[async_trait]
pub trait WatermarkEmbedder: Send + Sync {
    /// Return a copy of `content` carrying `payload`.
    async fn embed(&self, content: &[u8], payload: &[u8]) -> Result<Vec<u8>>;
}

/// Recovers a payload previously embedded by the matching embedder.
#[async_trait]
pub trait WatermarkExtractor: Send + Sync {
    /// Return the embedded payload, or `None` when the content carries no
    /// recognizable watermark.
    async fn extract(&self, content: &[u8]) -> Result<Option<Vec<u8>>>;
}
