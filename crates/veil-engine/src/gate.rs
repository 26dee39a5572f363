//! The k-anonymity gate and the result cap.
//!
//! Small non-empty result sets re-identify individuals: a query
//! constructed to match exactly one person reveals that person's
//! presence even though every reference is opaque. The gate withholds
//! any result whose cardinality sits strictly between zero and the
//! threshold. Zero passes through untouched (there is nobody to
//! protect) and a threshold of 1 disables the gate.

use crate::response::QueryResponse;
use std::collections::HashSet;
use tracing::debug;

/// Applies suppression and the result cap, producing the response.
pub fn apply(tokens: HashSet<String>, k_anonymity: usize, max_results: usize) -> QueryResponse {
    let cardinality = tokens.len();
    if cardinality > 0 && cardinality < k_anonymity {
        debug!(cardinality, threshold = k_anonymity, "suppressing small result set");
        return QueryResponse {
            refs: Vec::new(),
            suppressed_for_anonymity: true,
            truncated_to_max_results: false,
        };
    }

    let mut refs: Vec<String> = tokens.into_iter().collect();
    refs.sort_unstable();
    let truncated = refs.len() > max_results;
    refs.truncate(max_results);
    QueryResponse {
        refs,
        suppressed_for_anonymity: false,
        truncated_to_max_results: truncated,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(n: usize) -> HashSet<String> {
        (0..n).map(|i| format!("T{i:03}")).collect()
    }

    #[test]
    fn empty_passes_unflagged() {
        let response = apply(set(0), 5, 100);
        assert!(response.refs.is_empty());
        assert!(!response.suppressed_for_anonymity);
    }

    #[test]
    fn small_sets_are_suppressed() {
        for n in 1..5 {
            let response = apply(set(n), 5, 100);
            assert!(response.refs.is_empty(), "n = {n}");
            assert!(response.suppressed_for_anonymity, "n = {n}");
        }
    }

    #[test]
    fn threshold_sets_pass() {
        let response = apply(set(5), 5, 100);
        assert_eq!(response.len(), 5);
        assert!(!response.suppressed_for_anonymity);
    }

    #[test]
    fn threshold_of_one_disables_suppression() {
        let response = apply(set(1), 1, 100);
        assert_eq!(response.len(), 1);
        assert!(!response.suppressed_for_anonymity);
    }

    #[test]
    fn cap_truncates_and_flags() {
        let response = apply(set(10), 5, 7);
        assert_eq!(response.len(), 7);
        assert!(response.truncated_to_max_results);
        assert!(!response.suppressed_for_anonymity);
        // Sorted output: truncation keeps a deterministic slice.
        let mut sorted = response.refs.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, response.refs);
    }
}
