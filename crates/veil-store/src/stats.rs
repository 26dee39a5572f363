//! Reporting counters over a store.

use serde::Serialize;
use std::collections::BTreeMap;
use veil_core::Timestamp;

/// Aggregate counters for operational reporting. Entries past their
/// expiry but not yet swept count toward `total_keys` and show up in
/// `expired_pending`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    /// Number of index entries, expired-pending included.
    pub total_keys: u64,
    /// Entry counts grouped by the operator-tag segment of the key.
    pub per_tag: BTreeMap<String, u64>,
    /// Entry counts grouped by the audit field tag.
    pub per_field: BTreeMap<String, u64>,
    /// Creation time of the oldest entry.
    pub oldest_created_at: Option<Timestamp>,
    /// Creation time of the newest entry.
    pub newest_created_at: Option<Timestamp>,
    /// Entries already past expiry, awaiting a sweep.
    pub expired_pending: u64,
}

impl StoreStats {
    /// Folds one entry into the counters. The operator tag is taken
    /// from the key; malformed keys bucket under `"invalid"`.
    pub(crate) fn record(
        &mut self,
        key: &str,
        field_tag: &str,
        created_at: Timestamp,
        expires_at: Timestamp,
        now: Timestamp,
    ) {
        self.total_keys += 1;
        let tag = veil_core::fingerprint::tag_segment(key).unwrap_or("invalid");
        *self.per_tag.entry(tag.to_string()).or_insert(0) += 1;
        *self.per_field.entry(field_tag.to_string()).or_insert(0) += 1;
        self.oldest_created_at = Some(self.oldest_created_at.map_or(created_at, |t| t.min(created_at)));
        self.newest_created_at = Some(self.newest_created_at.map_or(created_at, |t| t.max(created_at)));
        if expires_at <= now {
            self.expired_pending += 1;
        }
    }
}
