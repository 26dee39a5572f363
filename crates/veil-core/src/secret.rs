//! The process-wide index secret.
//!
//! The secret keys every fingerprint the index ever derives. It is
//! loaded exactly once at startup, held read-only for the process
//! lifetime, and zeroized on drop. Rotation is modelled as a versioned
//! family: the version number travels with the secret for reporting,
//! and rotating means rebuilding the index under the new material, so
//! live operation never needs two active secrets.

use std::fs;
use std::path::Path;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// 32 bytes of keyed-hash material plus a reporting-only version.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct IndexSecret {
    material: [u8; Self::LEN],
    #[zeroize(skip)]
    version: u32,
}

/// Failure to obtain usable secret material. Fatal at startup: the
/// process refuses service rather than derive keys from nothing.
#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    /// No secret was configured at all.
    #[error("no index secret configured; set `secret`, `secret_file`, or VEIL_SECRET")]
    Missing,
    /// The secret file could not be read.
    #[error("failed to read secret file {path}: {source}")]
    Unreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// The encoded material was neither valid hex nor valid base64.
    #[error("secret material is neither hex nor base64")]
    Malformed,
    /// The decoded material has the wrong length.
    #[error("secret material is {got} bytes, expected {expected}")]
    WrongLength { got: usize, expected: usize },
}

impl IndexSecret {
    /// Required length of the decoded material.
    pub const LEN: usize = 32;

    pub fn new(material: [u8; Self::LEN], version: u32) -> Self {
        Self { material, version }
    }

    /// Decodes hex (64 chars) or base64 (standard or URL-safe, padded
    /// or not) into secret material.
    pub fn from_encoded(encoded: &str, version: u32) -> Result<Self, SecretError> {
        let trimmed = encoded.trim();
        let mut decoded = decode_hex(trimmed)
            .or_else(|| decode_base64(trimmed))
            .ok_or(SecretError::Malformed)?;
        if decoded.len() != Self::LEN {
            let got = decoded.len();
            decoded.zeroize();
            return Err(SecretError::WrongLength {
                got,
                expected: Self::LEN,
            });
        }
        let mut material = [0u8; Self::LEN];
        material.copy_from_slice(&decoded);
        decoded.zeroize();
        Ok(Self::new(material, version))
    }

    /// Reads and decodes secret material from a file.
    pub fn from_file(path: &Path, version: u32) -> Result<Self, SecretError> {
        let mut encoded = fs::read_to_string(path).map_err(|source| SecretError::Unreadable {
            path: path.display().to_string(),
            source,
        })?;
        let secret = Self::from_encoded(&encoded, version);
        encoded.zeroize();
        secret
    }

    /// Version of the secret family this material belongs to.
    pub fn version(&self) -> u32 {
        self.version
    }

    pub(crate) fn material(&self) -> &[u8; Self::LEN] {
        &self.material
    }
}

impl std::fmt::Debug for IndexSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexSecret")
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

fn decode_hex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}

fn decode_base64(s: &str) -> Option<Vec<u8>> {
    use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};
    use base64::Engine;

    [STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD]
        .iter()
        .find_map(|engine| engine.decode(s).ok())
}
