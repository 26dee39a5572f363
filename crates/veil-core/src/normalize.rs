//! Canonicalization of raw values before hashing.
//!
//! Every string that reaches the keyed hash goes through [`normalize`]
//! first, on both the indexing and the querying side. Two values that
//! differ only by case, compatibility variants, or surrounding
//! whitespace must produce identical fingerprints.

use unicode_normalization::UnicodeNormalization;

/// Canonical form used for all fingerprinting: NFKC, lowercased,
/// outer whitespace trimmed. Internal whitespace is preserved.
///
/// Never fails. An empty or whitespace-only input yields an empty
/// string, which callers treat as "do not index / do not query".
pub fn normalize(raw: &str) -> String {
    let folded: String = raw.nfkc().collect::<String>().to_lowercase();
    folded.trim().to_string()
}
