//! One level of Boolean composition over predicate results.

use std::collections::HashSet;
use veil_core::BoolOp;

/// Folds the per-predicate reference sets: intersection for AND,
/// union for OR. Associative; an empty input folds to the empty set.
pub fn compose(results: Vec<HashSet<String>>, op: BoolOp) -> HashSet<String> {
    let mut iter = results.into_iter();
    let first = match iter.next() {
        Some(first) => first,
        None => return HashSet::new(),
    };
    match op {
        BoolOp::And => iter.fold(first, |acc, next| {
            acc.intersection(&next).cloned().collect()
        }),
        BoolOp::Or => iter.fold(first, |mut acc, next| {
            acc.extend(next);
            acc
        }),
    }
}
