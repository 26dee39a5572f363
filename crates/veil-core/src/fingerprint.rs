//! Keyed fingerprinting and index-key derivation.
//!
//! The only primitive that ever turns a fragment into an index key is
//! HMAC-SHA256 under the process secret, applied to the message
//! `<alias>|<fragment>`. The alias inside the message gives domain
//! separation: the same fragment indexed under two fields derives two
//! unrelated keys. The derived key string is
//! `idx:<alias>:<tag>:<hash>`, where `<hash>` is the URL-safe unpadded
//! base64 of the 32-byte tag. The literal `idx:` prefix, the `:`
//! separators, and the `|` message separator are wire contract.

use crate::field::Field;
use crate::secret::IndexSecret;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;

type HmacSha256 = Hmac<Sha256>;

/// Literal prefix of every index key.
pub const KEY_PREFIX: &str = "idx";

/// Separator between the alias and the fragment in the PRF message.
const MESSAGE_SEPARATOR: u8 = b'|';

/// The kind of predicate an index key serves. Appears literally as the
/// third segment of the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OperatorTag {
    /// Whole-value equality.
    Eq,
    /// Prefix match: the fragment is a prefix of the value.
    Pre,
    /// Suffix match: the fragment is a prefix of the reversed value.
    Suf,
    /// N-gram window of the given width, for substring match.
    Gram(u8),
}

impl OperatorTag {
    /// Parses the tag segment of an index key.
    pub fn parse(segment: &str) -> Option<OperatorTag> {
        match segment {
            "eq" => Some(OperatorTag::Eq),
            "pre" => Some(OperatorTag::Pre),
            "suf" => Some(OperatorTag::Suf),
            _ => {
                let width = segment.strip_prefix('g')?;
                width.parse::<u8>().ok().map(OperatorTag::Gram)
            }
        }
    }
}

impl fmt::Display for OperatorTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperatorTag::Eq => f.write_str("eq"),
            OperatorTag::Pre => f.write_str("pre"),
            OperatorTag::Suf => f.write_str("suf"),
            OperatorTag::Gram(width) => write!(f, "g{width}"),
        }
    }
}

/// Extracts the tag segment from a derived key, for per-tag reporting.
/// Returns `None` for strings that are not well-formed index keys.
pub fn tag_segment(key: &str) -> Option<&str> {
    let mut parts = key.splitn(4, ':');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(KEY_PREFIX), Some(_alias), Some(tag), Some(hash)) if !hash.is_empty() => Some(tag),
        _ => None,
    }
}

/// Derives index keys from fragments under the process secret.
///
/// Pure and cheap to call; owns the secret for the process lifetime.
pub struct KeyDeriver {
    secret: IndexSecret,
}

impl KeyDeriver {
    pub fn new(secret: IndexSecret) -> Self {
        Self { secret }
    }

    /// Version of the secret family the deriver is keyed with.
    pub fn secret_version(&self) -> u32 {
        self.secret.version()
    }

    /// The keyed hash over `alias|fragment`, URL-safe base64 without
    /// padding. 43 ASCII characters for a 32-byte tag.
    pub fn fingerprint(&self, alias: &str, fragment: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.secret.material())
            .expect("HMAC can take key of any size");
        mac.update(alias.as_bytes());
        mac.update(&[MESSAGE_SEPARATOR]);
        mac.update(fragment.as_bytes());
        URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
    }

    /// The full index key for one `(field, tag, fragment)` triple.
    pub fn index_key(&self, field: Field, tag: OperatorTag, fragment: &str) -> String {
        let alias = field.alias();
        format!("{KEY_PREFIX}:{alias}:{tag}:{}", self.fingerprint(alias, fragment))
    }
}

impl fmt::Debug for KeyDeriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyDeriver")
            .field("secret_version", &self.secret.version())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deriver() -> KeyDeriver {
        KeyDeriver::new(IndexSecret::new([42u8; 32], 1))
    }

    #[test]
    fn key_has_four_segments() {
        let key = deriver().index_key(Field::Email, OperatorTag::Eq, "x@y.example");
        let parts: Vec<&str> = key.splitn(4, ':').collect();
        assert_eq!(parts[0], "idx");
        assert_eq!(parts[1], "email");
        assert_eq!(parts[2], "eq");
        assert_eq!(parts[3].len(), 43);
    }

    #[test]
    fn hash_is_url_safe_ascii() {
        let key = deriver().index_key(Field::City, OperatorTag::Gram(3), "mum");
        let hash = key.rsplit(':').next().unwrap();
        assert!(hash
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn derivation_is_deterministic() {
        let a = deriver().index_key(Field::LastName, OperatorTag::Pre, "kum");
        let b = deriver().index_key(Field::LastName, OperatorTag::Pre, "kum");
        assert_eq!(a, b);
    }

    #[test]
    fn different_secret_changes_hash() {
        let a = deriver().fingerprint("ln", "kumar");
        let b = KeyDeriver::new(IndexSecret::new([43u8; 32], 2)).fingerprint("ln", "kumar");
        assert_ne!(a, b);
    }

    #[test]
    fn alias_gives_domain_separation() {
        let d = deriver();
        assert_ne!(d.fingerprint("fn", "kumar"), d.fingerprint("ln", "kumar"));
    }

    #[test]
    fn tag_display_round_trips() {
        for tag in [OperatorTag::Eq, OperatorTag::Pre, OperatorTag::Suf, OperatorTag::Gram(3)] {
            assert_eq!(OperatorTag::parse(&tag.to_string()), Some(tag));
        }
        assert_eq!(OperatorTag::parse("g"), None);
        assert_eq!(OperatorTag::parse("xyz"), None);
    }

    #[test]
    fn tag_segment_parses_keys_only() {
        let key = deriver().index_key(Field::Phone, OperatorTag::Suf, "012");
        assert_eq!(tag_segment(&key), Some("suf"));
        assert_eq!(tag_segment("idx:phone:suf:"), None);
        assert_eq!(tag_segment("not-a-key"), None);
        assert_eq!(tag_segment("row:phone:suf:abc"), None);
    }
}
