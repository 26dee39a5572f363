//! The RAM-resident backend: a hash map of posting sets behind one
//! read-write lock.
//!
//! Read latency is a single hash probe; batch writes take the write
//! lock once, which is what makes them atomic with respect to
//! concurrent lookups. The same posting-size cap as the persistent
//! backend applies, so an operation sequence that overflows one
//! backend overflows both.

use crate::error::StoreError;
use crate::posting;
use crate::stats::StoreStats;
use crate::{IndexStore, PostingAdd, PostingRemove, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use veil_core::{Clock, Timestamp};

#[derive(Debug, Clone)]
struct MemoryEntry {
    tokens: HashSet<String>,
    field_tag: String,
    created_at: Timestamp,
    expires_at: Timestamp,
}

/// In-memory index store.
pub struct MemoryStore {
    entries: RwLock<HashMap<String, MemoryEntry>>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Applies one append to the map. Callers hold the write lock and
    /// have already validated tokens and projected overflow.
    fn apply_add(entries: &mut HashMap<String, MemoryEntry>, add: PostingAdd, now: Timestamp) {
        match entries.get_mut(&add.key) {
            Some(entry) => {
                entry.tokens.insert(add.token);
                entry.expires_at = entry.expires_at.max(add.expires_at);
            }
            None => {
                entries.insert(
                    add.key,
                    MemoryEntry {
                        tokens: HashSet::from([add.token]),
                        field_tag: add.field_tag,
                        created_at: now,
                        expires_at: add.expires_at,
                    },
                );
            }
        }
    }

    /// Projects the encoded posting size each key in the batch would
    /// reach, rejecting before anything mutates.
    fn check_overflow(entries: &HashMap<String, MemoryEntry>, adds: &[PostingAdd]) -> Result<()> {
        let mut projected: HashMap<&str, HashSet<&str>> = HashMap::new();
        for add in adds {
            projected.entry(&add.key).or_default().insert(&add.token);
        }
        for (key, new_tokens) in projected {
            let mut bytes: usize = new_tokens.iter().map(|t| t.len()).sum();
            let mut count = new_tokens.len();
            if let Some(entry) = entries.get(key) {
                for token in &entry.tokens {
                    if !new_tokens.contains(token.as_str()) {
                        bytes += token.len();
                        count += 1;
                    }
                }
            }
            if bytes + count.saturating_sub(1) > posting::MAX_POSTING_BYTES {
                return Err(StoreError::PostingOverflow {
                    key: key.to_string(),
                });
            }
        }
        Ok(())
    }
}

#[async_trait]
impl IndexStore for MemoryStore {
    async fn add(&self, add: PostingAdd) -> Result<()> {
        self.add_batch(vec![add]).await
    }

    async fn add_batch(&self, adds: Vec<PostingAdd>) -> Result<()> {
        for add in &adds {
            posting::validate_token(&add.token)?;
        }
        let now = self.clock.now();
        let mut entries = self.entries.write().await;
        Self::check_overflow(&entries, &adds)?;
        for add in adds {
            Self::apply_add(&mut entries, add, now);
        }
        Ok(())
    }

    async fn remove(&self, key: &str, token: &str) -> Result<()> {
        self.remove_batch(vec![PostingRemove {
            key: key.to_string(),
            token: token.to_string(),
        }])
        .await
    }

    async fn remove_batch(&self, removes: Vec<PostingRemove>) -> Result<()> {
        let mut entries = self.entries.write().await;
        for remove in removes {
            if let Some(entry) = entries.get_mut(&remove.key) {
                entry.tokens.remove(&remove.token);
                if entry.tokens.is_empty() {
                    entries.remove(&remove.key);
                }
            }
        }
        Ok(())
    }

    async fn lookup(&self, key: &str) -> Result<HashSet<String>> {
        let now = self.clock.now();
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.tokens.clone())
            .unwrap_or_default())
    }

    async fn intersect(&self, keys: &[String]) -> Result<HashSet<String>> {
        let now = self.clock.now();
        // One read guard for the whole fold: a single logical snapshot.
        let entries = self.entries.read().await;
        let mut result: Option<HashSet<String>> = None;
        for key in keys {
            let tokens = entries
                .get(key)
                .filter(|entry| entry.expires_at > now)
                .map(|entry| &entry.tokens);
            let tokens = match tokens {
                Some(tokens) => tokens,
                None => return Ok(HashSet::new()),
            };
            result = Some(match result {
                None => tokens.clone(),
                Some(acc) => acc.intersection(tokens).cloned().collect(),
            });
            if result.as_ref().is_some_and(HashSet::is_empty) {
                return Ok(HashSet::new());
            }
        }
        Ok(result.unwrap_or_default())
    }

    async fn expire_sweep(&self, now: Timestamp) -> Result<u64> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        Ok((before - entries.len()) as u64)
    }

    async fn stats(&self) -> Result<StoreStats> {
        let now = self.clock.now();
        let entries = self.entries.read().await;
        let mut stats = StoreStats::default();
        for (key, entry) in entries.iter() {
            stats.record(key, &entry.field_tag, entry.created_at, entry.expires_at, now);
        }
        Ok(stats)
    }
}
