//! Fragment enumeration: the indexing side emits every fragment a
//! future query could land on; the querying side mirrors it with as few
//! keys as possible.
//!
//! For a normalized value `v` of n code points and gram width K:
//!
//! - `eq`:  the whole value, one fragment
//! - `pre`: every non-empty prefix of `v`
//! - `suf`: every non-empty prefix of the reversed value
//! - `gK`:  every K-point sliding window; none when n < K
//!
//! for `1 + 2n + max(0, n - K + 1)` fragments in total. The asymmetry
//! is deliberate: enumeration cost is paid once per ingested value so
//! that a query of any supported operator resolves to one key (`eq`,
//! `pre`, `suf`) or `|q| - K + 1` keys (`contains`).
//!
//! All positions are code points, never bytes.

use crate::fingerprint::OperatorTag;
use crate::predicate::Operator;

/// Canonical gram width for `contains` queries.
pub const DEFAULT_GRAM_WIDTH: u8 = 3;

/// Narrowest gram width a deployment may configure. Below this the
/// posting lists degenerate toward per-character buckets.
pub const MIN_GRAM_WIDTH: u8 = 2;

/// A query that cannot be answered from the index as posed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FragmentError {
    /// `contains` needs at least `min` code points to form one gram.
    #[error("substring query is {len} characters, minimum is {min}")]
    QueryTooShort { len: usize, min: usize },
}

/// Code-point reversal.
pub fn reverse(value: &str) -> String {
    value.chars().rev().collect()
}

/// Every `(tag, fragment)` pair the given normalized value must be
/// indexed under. Empty values produce nothing; callers skip them
/// before reaching this point.
pub fn enumerate(value: &str, gram_width: u8) -> Vec<(OperatorTag, String)> {
    let points: Vec<char> = value.chars().collect();
    if points.is_empty() {
        return Vec::new();
    }
    let n = points.len();
    let k = gram_width as usize;

    let mut fragments = Vec::with_capacity(1 + 2 * n + n.saturating_sub(k.saturating_sub(1)));
    fragments.push((OperatorTag::Eq, value.to_string()));

    for end in 1..=n {
        fragments.push((OperatorTag::Pre, points[..end].iter().collect()));
    }

    let reversed: Vec<char> = points.iter().rev().copied().collect();
    for end in 1..=n {
        fragments.push((OperatorTag::Suf, reversed[..end].iter().collect()));
    }

    if k > 0 && n >= k {
        for start in 0..=(n - k) {
            fragments.push((OperatorTag::Gram(gram_width), points[start..start + k].iter().collect()));
        }
    }

    fragments
}

/// The query-side mirror: the `(tag, fragment)` pairs whose keys must
/// be looked up to answer `operator` over the normalized query `query`.
///
/// Returns an empty list for an empty non-equality query (nothing was
/// ever indexed under an empty fragment either, so equality on `""`
/// resolves to a key that cannot be populated).
pub fn query_fragments(
    operator: Operator,
    query: &str,
    gram_width: u8,
) -> Result<Vec<(OperatorTag, String)>, FragmentError> {
    if query.is_empty() && operator != Operator::Eq {
        return Ok(Vec::new());
    }
    match operator {
        Operator::Eq => Ok(vec![(OperatorTag::Eq, query.to_string())]),
        Operator::StartsWith => Ok(vec![(OperatorTag::Pre, query.to_string())]),
        Operator::EndsWith => Ok(vec![(OperatorTag::Suf, reverse(query))]),
        Operator::Contains => {
            let points: Vec<char> = query.chars().collect();
            let k = gram_width as usize;
            if points.len() < k {
                return Err(FragmentError::QueryTooShort {
                    len: points.len(),
                    min: k,
                });
            }
            Ok((0..=(points.len() - k))
                .map(|start| (OperatorTag::Gram(gram_width), points[start..start + k].iter().collect()))
                .collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frags_of(value: &str, tag: OperatorTag) -> Vec<String> {
        enumerate(value, 3)
            .into_iter()
            .filter(|(t, _)| *t == tag)
            .map(|(_, f)| f)
            .collect()
    }

    #[test]
    fn enumerates_arjun_completely() {
        let all = enumerate("arjun", 3);
        // 1 + 2*5 + 3
        assert_eq!(all.len(), 14);
        assert_eq!(frags_of("arjun", OperatorTag::Eq), vec!["arjun"]);
        assert_eq!(
            frags_of("arjun", OperatorTag::Pre),
            vec!["a", "ar", "arj", "arju", "arjun"]
        );
        assert_eq!(
            frags_of("arjun", OperatorTag::Suf),
            vec!["n", "nu", "nuj", "nujr", "nujra"]
        );
        assert_eq!(
            frags_of("arjun", OperatorTag::Gram(3)),
            vec!["arj", "rju", "jun"]
        );
    }

    #[test]
    fn short_values_emit_no_grams() {
        assert!(frags_of("ab", OperatorTag::Gram(3)).is_empty());
        assert_eq!(enumerate("ab", 3).len(), 5); // eq + 2 pre + 2 suf
    }

    #[test]
    fn empty_value_emits_nothing() {
        assert!(enumerate("", 3).is_empty());
    }

    #[test]
    fn windows_count_code_points_not_bytes() {
        // Three code points, nine bytes: exactly one 3-gram.
        assert_eq!(frags_of("日本語", OperatorTag::Gram(3)), vec!["日本語"]);
        assert_eq!(reverse("日本語"), "語本日");
    }

    #[test]
    fn query_mirror_equality_and_prefix() {
        let eq = query_fragments(Operator::Eq, "kumar", 3).unwrap();
        assert_eq!(eq, vec![(OperatorTag::Eq, "kumar".to_string())]);
        let pre = query_fragments(Operator::StartsWith, "ku", 3).unwrap();
        assert_eq!(pre, vec![(OperatorTag::Pre, "ku".to_string())]);
    }

    #[test]
    fn query_mirror_reverses_suffix() {
        let suf = query_fragments(Operator::EndsWith, "mar", 3).unwrap();
        assert_eq!(suf, vec![(OperatorTag::Suf, "ram".to_string())]);
    }

    #[test]
    fn query_mirror_windows_contains() {
        let grams = query_fragments(Operator::Contains, "gmail", 3).unwrap();
        let frags: Vec<&str> = grams.iter().map(|(_, f)| f.as_str()).collect();
        assert_eq!(frags, vec!["gma", "mai", "ail"]);
    }

    #[test]
    fn contains_below_gram_width_is_an_error() {
        let err = query_fragments(Operator::Contains, "oo", 3).unwrap_err();
        assert_eq!(err, FragmentError::QueryTooShort { len: 2, min: 3 });
    }

    #[test]
    fn empty_query_yields_no_keys_except_eq() {
        assert!(query_fragments(Operator::StartsWith, "", 3).unwrap().is_empty());
        assert!(query_fragments(Operator::Contains, "", 3).unwrap().is_empty());
        assert_eq!(query_fragments(Operator::Eq, "", 3).unwrap().len(), 1);
    }
}
