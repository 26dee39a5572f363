//! External collaborators, behind traits.
//!
//! The engine indexes decrypted values and returns opaque references;
//! the ciphertexts themselves and the keys that open them belong to
//! other systems. These traits are the whole surface the engine sees.
//! The in-memory implementations exist for tests and local drivers;
//! they model the contract (a vault that holds material the caller
//! never sees), not real envelope encryption.

use async_trait::async_trait;
use rand::RngCore;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Collaborator failure, as the engine distinguishes it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CollabError {
    /// The service could not be reached at all.
    #[error("unavailable: {reason}")]
    Unavailable { reason: String },
    /// The service answered with a failure.
    #[error("{reason}")]
    Failed { reason: String },
}

/// Envelope encryption service. `decrypt` is called during ingestion
/// only; nothing in the query path ever touches it.
#[async_trait]
pub trait KeyManagement: Send + Sync {
    async fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CollabError>;
    async fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CollabError>;
}

/// Maps opaque references to stored ciphertexts.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn fetch_ciphertext(&self, token: &str) -> Result<Vec<u8>, CollabError>;
}

/// A vault-style stand-in for the key-management service: `encrypt`
/// banks the plaintext under a random handle and hands the handle
/// back as the "ciphertext"; `decrypt` redeems it. Plaintext never
/// round-trips through the caller-visible bytes.
#[derive(Default)]
pub struct InMemoryKeyManagement {
    vault: RwLock<HashMap<[u8; 16], Vec<u8>>>,
}

impl InMemoryKeyManagement {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyManagement for InMemoryKeyManagement {
    async fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CollabError> {
        let mut handle = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut handle);
        self.vault.write().await.insert(handle, plaintext.to_vec());
        Ok(handle.to_vec())
    }

    async fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CollabError> {
        let handle: [u8; 16] = ciphertext.try_into().map_err(|_| CollabError::Failed {
            reason: "malformed ciphertext handle".to_string(),
        })?;
        self.vault
            .read()
            .await
            .get(&handle)
            .cloned()
            .ok_or_else(|| CollabError::Failed {
                reason: "unknown ciphertext handle".to_string(),
            })
    }
}

/// In-memory token-to-ciphertext map.
#[derive(Default)]
pub struct InMemoryRecordStore {
    records: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put(&self, token: impl Into<String>, ciphertext: Vec<u8>) {
        self.records.write().await.insert(token.into(), ciphertext);
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn fetch_ciphertext(&self, token: &str) -> Result<Vec<u8>, CollabError> {
        self.records
            .read()
            .await
            .get(token)
            .cloned()
            .ok_or_else(|| CollabError::Failed {
                reason: format!("no record for token {token:?}"),
            })
    }
}
