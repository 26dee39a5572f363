//! Engine failure taxonomy, as surfaced to callers.
//!
//! Invalid input and too-short queries fail fast and carry enough for
//! a one-line message; store failures pass through unwrapped so the
//! transient/permanent distinction survives to the retry policy. No
//! variant ever carries plaintext query or value material.

use crate::collab::CollabError;
use veil_core::{FragmentError, UnknownFieldError};
use veil_store::StoreError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The field label matches neither a full name nor an alias.
    #[error("unknown field: {label:?}")]
    UnknownField { label: String },

    /// The operator label is outside the closed set.
    #[error("unknown operator: {label:?}")]
    UnknownOperator { label: String },

    /// A `contains` query with fewer characters than the gram width.
    #[error("substring query is {len} characters, minimum is {min}")]
    QueryTooShort { len: usize, min: usize },

    /// A composed query with no predicates at all.
    #[error("query has no predicates")]
    EmptyQuery,

    /// Decrypted value material that is not valid UTF-8.
    #[error("decrypted value is not valid utf-8")]
    InvalidValue,

    /// The cooperative deadline fired mid-operation.
    #[error("deadline exceeded during {operation}")]
    DeadlineExceeded { operation: &'static str },

    /// Store failure, transient or permanent; never wrapped so the
    /// caller can apply its retry policy.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The key-management collaborator failed.
    #[error("key management: {0}")]
    KeyManagement(CollabError),

    /// The record-store collaborator failed.
    #[error("record store: {0}")]
    RecordStore(CollabError),
}

impl From<FragmentError> for Error {
    fn from(error: FragmentError) -> Self {
        match error {
            FragmentError::QueryTooShort { len, min } => Error::QueryTooShort { len, min },
        }
    }
}

impl From<UnknownFieldError> for Error {
    fn from(error: UnknownFieldError) -> Self {
        Error::UnknownField { label: error.label }
    }
}
