//! Ingestion: turning one decrypted value into its full fragment
//! batch, atomically.
//!
//! The enumeration cost lives here so queries stay cheap. Every add
//! for one value travels in a single store batch: a concurrent query
//! sees either none of the value's keys or all of them. Erasure walks
//! the same enumeration in reverse. Bulk ingestion runs values
//! concurrently under a semaphore and reports per-value failures in an
//! aggregate summary instead of aborting the run.

use crate::collab::KeyManagement;
use crate::core::Core;
use crate::error::{Error, Result};
use crate::util::with_deadline;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};
use veil_core::{fragments, normalize, Field};
use veil_store::{PostingAdd, PostingRemove};

/// What happened to one presented value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOutcome {
    /// The value was enumerated and its postings committed.
    Indexed {
        /// Number of index keys the value landed on.
        keys: usize,
    },
    /// The value normalized to the empty string and was not indexed.
    SkippedEmpty,
}

/// One tagged plaintext value for bulk ingestion.
#[derive(Debug, Clone)]
pub struct IngestItem {
    pub field: Field,
    pub value: String,
    pub token: String,
}

/// A value that failed during bulk ingestion.
#[derive(Debug, Clone)]
pub struct IngestFailure {
    pub token: String,
    pub error: String,
}

/// Aggregate outcome of a bulk run. Failures are collected, never
/// silently dropped; single-value ingestion does not use this path and
/// propagates errors directly.
#[derive(Debug, Clone, Default)]
pub struct IngestSummary {
    pub indexed: u64,
    pub skipped_empty: u64,
    pub failures: Vec<IngestFailure>,
}

/// Ingestion front end over a shared [`Core`].
#[derive(Clone)]
pub struct Indexer {
    core: Arc<Core>,
}

impl Indexer {
    pub(crate) fn new(core: Arc<Core>) -> Self {
        Self { core }
    }

    /// Indexes one decrypted value under the caller's opaque token.
    ///
    /// Normalizes, enumerates fragments across all operator tags,
    /// derives the keys, and commits them as one atomic batch with the
    /// configured retention applied.
    pub async fn index_value(
        &self,
        field: Field,
        value: &str,
        token: &str,
        deadline: Option<Duration>,
    ) -> Result<IndexOutcome> {
        let normalized = normalize(value);
        if normalized.is_empty() {
            debug!(field = %field, "skipping empty value");
            return Ok(IndexOutcome::SkippedEmpty);
        }

        let expires_at = self.core.clock().now() + self.core.retention_ms();
        let adds: Vec<PostingAdd> = fragments::enumerate(&normalized, self.core.gram_width())
            .into_iter()
            .map(|(tag, fragment)| PostingAdd {
                key: self.core.deriver().index_key(field, tag, &fragment),
                token: token.to_string(),
                field_tag: field.name().to_string(),
                expires_at,
            })
            .collect();
        let keys = adds.len();

        with_deadline(deadline, "index", self.core.store().add_batch(adds)).await?;
        debug!(field = %field, keys, "indexed value");
        Ok(IndexOutcome::Indexed { keys })
    }

    /// Decrypts a ciphertext through the key-management collaborator
    /// and indexes the result. This is the only place the engine ever
    /// asks for a decryption; queries never do.
    pub async fn ingest_ciphertext(
        &self,
        field: Field,
        ciphertext: &[u8],
        token: &str,
        kms: &dyn KeyManagement,
        deadline: Option<Duration>,
    ) -> Result<IndexOutcome> {
        let plaintext = kms
            .decrypt(ciphertext)
            .await
            .map_err(Error::KeyManagement)?;
        let value = String::from_utf8(plaintext).map_err(|_| Error::InvalidValue)?;
        self.index_value(field, &value, token, deadline).await
    }

    /// Removes every posting the value created for this token. The
    /// mirror of [`Indexer::index_value`]: same normalization, same
    /// enumeration, one atomic removal batch. Updates are modelled as
    /// erase followed by re-index; there is no in-place rewrite.
    pub async fn erase_value(
        &self,
        field: Field,
        value: &str,
        token: &str,
        deadline: Option<Duration>,
    ) -> Result<()> {
        let normalized = normalize(value);
        if normalized.is_empty() {
            return Ok(());
        }
        let removes: Vec<PostingRemove> = fragments::enumerate(&normalized, self.core.gram_width())
            .into_iter()
            .map(|(tag, fragment)| PostingRemove {
                key: self.core.deriver().index_key(field, tag, &fragment),
                token: token.to_string(),
            })
            .collect();
        with_deadline(deadline, "erase", self.core.store().remove_batch(removes)).await?;
        debug!(field = %field, "erased value postings");
        Ok(())
    }

    /// Bulk ingestion with bounded concurrency. Per-value failures are
    /// swallowed into the summary so one bad record cannot sink a
    /// load; callers inspect `failures` afterwards.
    pub async fn index_all(&self, items: Vec<IngestItem>, concurrency: usize) -> IngestSummary {
        let limit = concurrency.max(1);
        let semaphore = Arc::new(Semaphore::new(limit));
        let mut tasks = JoinSet::new();

        for item in items {
            let indexer = self.clone();
            let semaphore = semaphore.clone();
            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("ingest semaphore is never closed");
                let outcome = indexer
                    .index_value(item.field, &item.value, &item.token, None)
                    .await;
                (item.token, outcome)
            });
        }

        let mut summary = IngestSummary::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(IndexOutcome::Indexed { .. }))) => summary.indexed += 1,
                Ok((_, Ok(IndexOutcome::SkippedEmpty))) => summary.skipped_empty += 1,
                Ok((token, Err(error))) => {
                    warn!(%error, "value failed during bulk ingest");
                    summary.failures.push(IngestFailure {
                        token,
                        error: error.to_string(),
                    });
                }
                Err(join_error) => {
                    warn!(%join_error, "ingest task aborted");
                    summary.failures.push(IngestFailure {
                        token: String::new(),
                        error: join_error.to_string(),
                    });
                }
            }
        }
        summary
    }
}
