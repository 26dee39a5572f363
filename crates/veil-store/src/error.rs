//! Store failure taxonomy.
//!
//! The split that matters operationally is transient versus permanent:
//! transient failures (busy database, lock contention) are safe to
//! retry with backoff, permanent ones (missing schema, corruption)
//! need an operator. Integrity failures are scoped to a single entry
//! so that maintenance operations can isolate the entry and continue.

use crate::posting::MAX_POSTING_BYTES;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Retryable: contention or timeout inside the backend.
    #[error("store temporarily unavailable: {reason}")]
    Transient { reason: String },

    /// Not retryable: the backend rejected the operation outright.
    #[error("store failure: {reason}")]
    Permanent { reason: String },

    /// The on-disk schema is from a different, unsupported version.
    #[error("store schema version {found} unsupported (expected {expected})")]
    SchemaMismatch { found: u32, expected: u32 },

    /// The posting list at `key` would exceed the backend cap. The key
    /// is carried for offline remediation.
    #[error("posting list at {key} would exceed {MAX_POSTING_BYTES} bytes")]
    PostingOverflow { key: String },

    /// A stored entry failed decoding. Fatal for that entry only.
    #[error("corrupt index entry at {key}: {reason}")]
    Integrity { key: String, reason: String },

    /// The token contains the posting delimiter, which the encoding
    /// cannot represent.
    #[error("record reference {token:?} contains the posting delimiter")]
    InvalidToken { token: String },
}

impl StoreError {
    /// Whether a retry with backoff can reasonably succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient { .. })
    }
}
