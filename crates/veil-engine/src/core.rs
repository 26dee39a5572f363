//! The single dependency-injection point.
//!
//! A [`Core`] is constructed once at startup from validated
//! configuration, the loaded secret, a store handle, and a clock, and
//! is then shared read-only by every indexing and query task. There is
//! no module-level state anywhere in the engine; everything flows
//! through this value.

use crate::evaluator::Evaluator;
use crate::indexer::Indexer;
use std::sync::Arc;
use tracing::{info, warn};
use veil_core::{Clock, Config, ConfigError, IndexSecret, KeyDeriver};
use veil_store::{IndexStore, StoreStats};

pub struct Core {
    store: Arc<dyn IndexStore>,
    deriver: KeyDeriver,
    clock: Arc<dyn Clock>,
    gram_width: u8,
    k_anonymity: usize,
    max_results: usize,
    retention_ms: u64,
}

impl Core {
    /// Validates the configuration and assembles the engine. The
    /// secret is taken by value: it lives here and nowhere else.
    pub fn new(
        config: &Config,
        secret: IndexSecret,
        store: Arc<dyn IndexStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Arc<Self>, ConfigError> {
        config.validate()?;
        let deriver = KeyDeriver::new(secret);
        info!(
            secret_version = deriver.secret_version(),
            gram_width = config.gram_width,
            k_anonymity = config.k_anonymity,
            "engine assembled"
        );
        Ok(Arc::new(Self {
            store,
            deriver,
            clock,
            gram_width: config.gram_width,
            k_anonymity: config.k_anonymity,
            max_results: config.max_results,
            retention_ms: config.retention_secs.saturating_mul(1000),
        }))
    }

    pub fn indexer(self: &Arc<Self>) -> Indexer {
        Indexer::new(self.clone())
    }

    pub fn evaluator(self: &Arc<Self>) -> Evaluator {
        Evaluator::new(self.clone())
    }

    /// Deletes every entry whose expiry has passed; returns the count.
    ///
    /// Transient store failures are retried a bounded number of times
    /// with doubling backoff; a sweep that still fails is reported to
    /// the caller and simply runs again next cycle. Queries are never
    /// affected either way.
    pub async fn sweep_expired(&self) -> crate::Result<u64> {
        const ATTEMPTS: u32 = 3;
        let mut backoff = std::time::Duration::from_millis(50);
        let mut attempt = 1;
        loop {
            match self.store.expire_sweep(self.clock.now()).await {
                Ok(swept) => return Ok(swept),
                Err(error) if error.is_transient() && attempt < ATTEMPTS => {
                    warn!(%error, attempt, "sweep hit transient store failure, retrying");
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                    attempt += 1;
                }
                Err(error) => return Err(error.into()),
            }
        }
    }

    /// Store-wide reporting counters.
    pub async fn stats(&self) -> crate::Result<StoreStats> {
        Ok(self.store.stats().await?)
    }

    pub(crate) fn store(&self) -> &dyn IndexStore {
        self.store.as_ref()
    }

    pub(crate) fn deriver(&self) -> &KeyDeriver {
        &self.deriver
    }

    pub(crate) fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub(crate) fn gram_width(&self) -> u8 {
        self.gram_width
    }

    pub(crate) fn k_anonymity(&self) -> usize {
        self.k_anonymity
    }

    pub(crate) fn max_results(&self) -> usize {
        self.max_results
    }

    pub(crate) fn retention_ms(&self) -> u64 {
        self.retention_ms
    }
}

impl std::fmt::Debug for Core {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Core")
            .field("gram_width", &self.gram_width)
            .field("k_anonymity", &self.k_anonymity)
            .field("max_results", &self.max_results)
            .field("retention_ms", &self.retention_ms)
            .finish_non_exhaustive()
    }
}
