//! The caller-facing query result.

use serde::{Deserialize, Serialize};

/// Outcome of one composed query. References are sorted so equal
/// result sets render identically; the two flags tell the caller why
/// the list may be smaller than the true match set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResponse {
    /// Matching opaque references, sorted, post-gate, post-cap.
    pub refs: Vec<String>,
    /// The true result set was non-empty but below the anonymity
    /// threshold, so it was withheld.
    pub suppressed_for_anonymity: bool,
    /// The result set exceeded the configured cap and was cut down.
    pub truncated_to_max_results: bool,
}

impl QueryResponse {
    /// How many references survived gating and capping.
    pub fn len(&self) -> usize {
        self.refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }
}
