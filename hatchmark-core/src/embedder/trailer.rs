//! Trailer-based watermarking.
//!
//! Carries the payload in a tagged trailer appended after the image stream.
//! JPEG and PNG decoders stop at their end-of-stream markers, so the marked
//! copy still renders everywhere while the payload rides along byte-exact
//! storage and transport. It does not survive re-encoding; robust
//! steganographic embedding is a separate, external concern.
//!
//! Trailer layout: `magic (8) | payload length (4, big-endian) | payload`.
//! Re-embedding simply appends another trailer; extraction returns the last
//! one, so retrying the same record is harmless.

use async_trait::async_trait;

use super::{WatermarkEmbedder, WatermarkExtractor};
use crate::error::{HatchmarkError, Result};

const TRAILER_MAGIC: &[u8; 8] = b"HMRKWM01";

/// Maximum payload size the trailer format carries.
const MAX_PAYLOAD_LEN: usize = u32::MAX as usize;

/// [`WatermarkEmbedder`] appending a tagged trailer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrailerEmbedder;

/// [`WatermarkExtractor`] reading the last tagged trailer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrailerExtractor;

#[async_trait]
impl WatermarkEmbedder for TrailerEmbedder {
    async fn embed(&self, content: &[u8], payload: &[u8]) -> Result<Vec<u8>> {
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(HatchmarkError::EmbedderFailure(format!(
                "payload too large: {} bytes",
                payload.len()
            )));
        }

        let mut marked =
            Vec::with_capacity(content.len() + TRAILER_MAGIC.len() + 4 + payload.len());
        marked.extend_from_slice(content);
        marked.extend_from_slice(TRAILER_MAGIC);
        marked.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        marked.extend_from_slice(payload);
        Ok(marked)
    }
}

#[async_trait]
impl WatermarkExtractor for TrailerExtractor {
    async fn extract(&self, content: &[u8]) -> Result<Option<Vec<u8>>> {
        // The payload sits at the very end, so the last magic occurrence is
        // the authoritative trailer; earlier ones are stale re-embeddings or
        // coincidental content bytes.
        let Some(pos) = content
            .windows(TRAILER_MAGIC.len())
            .rposition(|w| w == TRAILER_MAGIC)
        else {
            return Ok(None);
        };

        let rest = &content[pos + TRAILER_MAGIC.len()..];
        if rest.len() < 4 {
            return Ok(None);
        }
        let declared = u32::from_be_bytes([rest[0], rest[1], rest[2], rest[3]]) as usize;
        let payload = &rest[4..];
        if payload.len() != declared {
            return Ok(None);
        }
        Ok(Some(payload.to_vec()))
    }
}
