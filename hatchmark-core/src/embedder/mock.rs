//! Mock embedder implementation for testing.

use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;

use super::WatermarkEmbedder;
use crate::error::{HatchmarkError, Result};

/// Mock embedder for testing retry and failure paths.
///
/// Succeeds by echoing the content with the payload appended, after failing
/// a configurable number of leading attempts. Not a real watermark; for
/// testing only.
pub struct MockEmbedder {
    /// Attempts that fail before the first success. `u32::MAX` never
    /// succeeds.
    fail_first: u32,
    attempts: AtomicU32,
}

impl MockEmbedder {
    /// An embedder that succeeds on the first attempt.
    pub fn new() -> Self {
        Self::failing(0)
    }

    /// An embedder whose first `fail_first` attempts fail.
    pub fn failing(fail_first: u32) -> Self {
        Self {
            fail_first,
            attempts: AtomicU32::new(0),
        }
    }

    /// An embedder that never succeeds.
    pub fn always_failing() -> Self {
        Self::failing(u32::MAX)
    }

    /// Total attempts observed so far.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WatermarkEmbedder for MockEmbedder {
    async fn embed(&self, content: &[u8], payload: &[u8]) -> Result<Vec<u8>> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.fail_first {
            return Err(HatchmarkError::EmbedderFailure(format!(
                "injected failure on attempt {}",
                attempt + 1
            )));
        }

        let mut marked = content.to_vec();
        marked.extend_from_slice(payload);
        Ok(marked)
    }
}
