use thiserror::Error;

use crate::ledger::RecordId;

#[derive(Error, Debug)]
pub enum HatchmarkError {
    /// The bytes could not be interpreted as decodable visual content.
    /// Recoverable: reported to the immediate caller, never retried.
    #[error("unsupported content: {0}")]
    UnsupportedContent(String),

    /// A submission carrying no bytes at all.
    #[error("submission contains no bytes")]
    EmptySubmission,

    /// The ledger cannot be reached or is not durable at the moment of call.
    #[error("ledger unavailable: {0}")]
    LedgerUnavailable(String),

    /// Compare-and-swap race on a watermark status update: another writer
    /// advanced the record's state version first.
    #[error("stale state version: expected {expected}, found {found}")]
    Conflict { expected: u64, found: u64 },

    /// No record with the given id exists in the ledger.
    #[error("record not found: {0}")]
    RecordNotFound(RecordId),

    /// Watermark embedding failed.
    #[error("watermark embedding failed: {0}")]
    EmbedderFailure(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HatchmarkError>;
