//! The posting-list wire encoding shared by both backends.
//!
//! A posting list is persisted as its references joined by a single
//! comma, sorted for deterministic output. The delimiter is wire
//! contract: references containing a comma are rejected at the add
//! boundary rather than escaped. The encoded size cap is the backend
//! limit referenced by the overflow error.

use crate::error::StoreError;
use std::collections::HashSet;

/// Separator between references inside an encoded posting list.
pub const DELIMITER: char = ',';

/// Cap on the encoded size of one posting list.
pub const MAX_POSTING_BYTES: usize = 1 << 20;

/// Rejects tokens the encoding cannot represent.
pub fn validate_token(token: &str) -> Result<(), StoreError> {
    if token.is_empty() || token.contains(DELIMITER) {
        return Err(StoreError::InvalidToken {
            token: token.to_string(),
        });
    }
    Ok(())
}

/// Encoded size of a token set: token bytes plus one delimiter between
/// each pair.
pub fn encoded_len(tokens: &HashSet<String>) -> usize {
    let bytes: usize = tokens.iter().map(String::len).sum();
    bytes + tokens.len().saturating_sub(1)
}

/// Serializes a posting list. Sorted so that equal sets encode
/// identically regardless of insertion order.
pub fn encode(tokens: &HashSet<String>) -> String {
    let mut sorted: Vec<&str> = tokens.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    sorted.join(",")
}

/// Deserializes a posting list. An empty column, an empty segment, or
/// a duplicate reference all mean the row was not written by this
/// encoding and surface as integrity failures.
pub fn decode(key: &str, encoded: &str) -> Result<HashSet<String>, StoreError> {
    if encoded.is_empty() {
        return Err(StoreError::Integrity {
            key: key.to_string(),
            reason: "empty posting list".to_string(),
        });
    }
    let mut tokens = HashSet::new();
    for segment in encoded.split(DELIMITER) {
        if segment.is_empty() {
            return Err(StoreError::Integrity {
                key: key.to_string(),
                reason: "empty reference segment".to_string(),
            });
        }
        if !tokens.insert(segment.to_string()) {
            return Err(StoreError::Integrity {
                key: key.to_string(),
                reason: format!("duplicate reference {segment:?}"),
            });
        }
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(tokens: &[&str]) -> HashSet<String> {
        tokens.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn encode_is_sorted_and_stable() {
        assert_eq!(encode(&set(&["b", "a", "c"])), "a,b,c");
        assert_eq!(encode(&set(&["c", "b", "a"])), "a,b,c");
    }

    #[test]
    fn round_trips() {
        let tokens = set(&["T1", "T2", "T3"]);
        assert_eq!(decode("k", &encode(&tokens)).unwrap(), tokens);
    }

    #[test]
    fn encoded_len_matches_encode() {
        let tokens = set(&["T1", "T22", "T333"]);
        assert_eq!(encoded_len(&tokens), encode(&tokens).len());
        assert_eq!(encoded_len(&HashSet::new()), 0);
    }

    #[test]
    fn rejects_delimiter_in_token() {
        assert!(validate_token("a,b").is_err());
        assert!(validate_token("").is_err());
        assert!(validate_token("a-b_c").is_ok());
    }

    #[test]
    fn decode_flags_corruption() {
        assert!(matches!(decode("k", ""), Err(StoreError::Integrity { .. })));
        assert!(matches!(decode("k", "a,,b"), Err(StoreError::Integrity { .. })));
        assert!(matches!(decode("k", "a,a"), Err(StoreError::Integrity { .. })));
    }
}
