//! Index stores: the only stateful component of the system.
//!
//! A store is a map from opaque index keys to posting lists (sets of
//! opaque record references) with per-entry expiry. Two backends are
//! provided, [`MemoryStore`] for RAM-resident indexes and
//! [`SqliteStore`] for durable single-table persistence, and they are
//! interchangeable: for the same logical state both answer every
//! lookup with the same set. The conformance suite in
//! `tests/backend_equivalence.rs` holds them to that.
//!
//! Stores never see plaintext. Keys arrive pre-hashed, references are
//! uninterpreted strings, and the only cleartext column is the audit
//! field tag, which names a field, not a value.

pub mod error;
pub mod memory;
pub mod posting;
pub mod sqlite;
pub mod stats;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use stats::StoreStats;

use async_trait::async_trait;
use std::collections::HashSet;
use veil_core::Timestamp;

/// Result alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// One posting append: attach `token` to the list at `key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostingAdd {
    /// Derived index key.
    pub key: String,
    /// Opaque record reference to append.
    pub token: String,
    /// Full field name, recorded on first create for audit reporting.
    pub field_tag: String,
    /// Entry expiry; an existing entry keeps the later of old and new.
    pub expires_at: Timestamp,
}

/// One posting removal, the erasure counterpart of [`PostingAdd`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostingRemove {
    pub key: String,
    pub token: String,
}

/// The backend-independent store contract.
///
/// Batch operations are atomic with respect to concurrent readers:
/// either none of a batch is visible or all of it is. Lookups never
/// return entries past their expiry, swept or not.
#[async_trait]
pub trait IndexStore: Send + Sync {
    /// Appends `token` to the posting list at `key`, creating the
    /// entry if absent.
    async fn add(&self, add: PostingAdd) -> Result<()>;

    /// Applies every append atomically; a rejected batch leaves the
    /// store untouched.
    async fn add_batch(&self, adds: Vec<PostingAdd>) -> Result<()>;

    /// Idempotent removal. Posting lists that empty out are deleted.
    async fn remove(&self, key: &str, token: &str) -> Result<()>;

    /// Atomic bulk removal, same visibility contract as [`IndexStore::add_batch`].
    async fn remove_batch(&self, removes: Vec<PostingRemove>) -> Result<()>;

    /// The posting list at `key`; empty if the key is absent or the
    /// entry has expired.
    async fn lookup(&self, key: &str) -> Result<HashSet<String>>;

    /// Fold of [`IndexStore::lookup`] under set intersection, observed
    /// at a single snapshot. An empty key list yields an empty set.
    async fn intersect(&self, keys: &[String]) -> Result<HashSet<String>>;

    /// Deletes every entry with `expires_at <= now`; returns how many.
    async fn expire_sweep(&self, now: Timestamp) -> Result<u64>;

    /// Reporting counters over the whole store.
    async fn stats(&self) -> Result<StoreStats>;
}
