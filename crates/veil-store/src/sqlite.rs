//! The durable backend: one SQLite table of index entries.
//!
//! The row layout is wire contract: `key` is the primary key, `refs`
//! is the comma-joined posting list, `field_tag` carries the full
//! field name for audit queries, and the two timestamps drive
//! retention. Secondary indices on `field_tag` and on
//! `(expires_at, field_tag)` serve audit reporting and bulk sweeps.
//!
//! The connection is synchronous and lives behind an async mutex;
//! batch writes run inside one transaction, which provides the
//! all-or-nothing visibility the indexer relies on.

use crate::error::StoreError;
use crate::posting;
use crate::stats::StoreStats;
use crate::{IndexStore, PostingAdd, PostingRemove, Result};
use async_trait::async_trait;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, TransactionBehavior};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use veil_core::{Clock, Timestamp};

/// Schema generation this build reads and writes.
const SCHEMA_VERSION: u32 = 1;

/// Durable index store over a single SQLite database.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Opens (or creates) the database at `path` and verifies the
    /// schema generation.
    pub fn open(path: &Path, clock: Arc<dyn Clock>) -> Result<Self> {
        let conn = Connection::open(path).map_err(classify)?;
        Self::with_connection(conn, clock)
    }

    /// A private throwaway database, for tests and ephemeral use.
    pub fn open_in_memory(clock: Arc<dyn Clock>) -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(classify)?;
        Self::with_connection(conn, clock)
    }

    fn with_connection(conn: Connection, clock: Arc<dyn Clock>) -> Result<Self> {
        setup(&conn)?;
        ensure_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            clock,
        })
    }

    fn apply_add(tx: &rusqlite::Transaction<'_>, add: &PostingAdd, now: Timestamp) -> Result<()> {
        let existing: Option<(String, i64)> = tx
            .query_row(
                "SELECT refs, expires_at FROM index_entries WHERE key = ?1",
                params![add.key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(classify)?;

        match existing {
            Some((encoded, expires_at)) => {
                let mut tokens = posting::decode(&add.key, &encoded)?;
                tokens.insert(add.token.clone());
                if posting::encoded_len(&tokens) > posting::MAX_POSTING_BYTES {
                    return Err(StoreError::PostingOverflow {
                        key: add.key.clone(),
                    });
                }
                tx.execute(
                    "UPDATE index_entries SET refs = ?2, expires_at = ?3 WHERE key = ?1",
                    params![add.key, posting::encode(&tokens), expires_at.max(add.expires_at as i64)],
                )
                .map_err(classify)?;
            }
            None => {
                // A singleton posting list encodes as the bare token.
                if add.token.len() > posting::MAX_POSTING_BYTES {
                    return Err(StoreError::PostingOverflow {
                        key: add.key.clone(),
                    });
                }
                tx.execute(
                    "INSERT INTO index_entries (key, refs, field_tag, created_at, expires_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![add.key, add.token, add.field_tag, now as i64, add.expires_at as i64],
                )
                .map_err(classify)?;
            }
        }
        Ok(())
    }

    fn apply_remove(tx: &rusqlite::Transaction<'_>, remove: &PostingRemove) -> Result<()> {
        let existing: Option<String> = tx
            .query_row(
                "SELECT refs FROM index_entries WHERE key = ?1",
                params![remove.key],
                |row| row.get(0),
            )
            .optional()
            .map_err(classify)?;

        let encoded = match existing {
            Some(encoded) => encoded,
            None => return Ok(()),
        };
        let mut tokens = posting::decode(&remove.key, &encoded)?;
        if !tokens.remove(&remove.token) {
            return Ok(());
        }
        if tokens.is_empty() {
            tx.execute("DELETE FROM index_entries WHERE key = ?1", params![remove.key])
                .map_err(classify)?;
        } else {
            tx.execute(
                "UPDATE index_entries SET refs = ?2 WHERE key = ?1",
                params![remove.key, posting::encode(&tokens)],
            )
            .map_err(classify)?;
        }
        Ok(())
    }
}

#[async_trait]
impl IndexStore for SqliteStore {
    async fn add(&self, add: PostingAdd) -> Result<()> {
        self.add_batch(vec![add]).await
    }

    async fn add_batch(&self, adds: Vec<PostingAdd>) -> Result<()> {
        for add in &adds {
            posting::validate_token(&add.token)?;
        }
        let now = self.clock.now();
        let mut conn = self.conn.lock().await;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(classify)?;
        for add in &adds {
            Self::apply_add(&tx, add, now)?;
        }
        tx.commit().map_err(classify)?;
        debug!(appends = adds.len(), "committed posting batch");
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
        let mut conn = self.conn.lock().await;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(classify)?;
        for remove in &removes {
            Self::apply_remove(&tx, remove)?;
        }
        tx.commit().map_err(classify)?;
        Ok(())
    }

    async fn lookup(&self, key: &str) -> Result<HashSet<String>> {
        let now = self.clock.now();
        let conn = self.conn.lock().await;
        let encoded: Option<String> = conn
            .query_row(
                "SELECT refs FROM index_entries WHERE key = ?1 AND expires_at > ?2",
                params![key, now as i64],
                |row| row.get(0),
            )
            .optional()
            .map_err(classify)?;
        match encoded {
            Some(encoded) => posting::decode(key, &encoded),
            None => Ok(HashSet::new()),
        }
    }

    async fn intersect(&self, keys: &[String]) -> Result<HashSet<String>> {
        let unique: Vec<&String> = {
            let mut seen = HashSet::new();
            keys.iter().filter(|k| seen.insert(k.as_str())).collect()
        };
        if unique.is_empty() {
            return Ok(HashSet::new());
        }
        let now = self.clock.now() as i64;
        let conn = self.conn.lock().await;

        let placeholders = vec!["?"; unique.len()].join(",");
        let sql = format!(
            "SELECT key, refs FROM index_entries WHERE key IN ({placeholders}) AND expires_at > ?"
        );
        let mut statement = conn.prepare(&sql).map_err(classify)?;
        let mut sql_params: Vec<&dyn rusqlite::ToSql> =
            unique.iter().map(|k| *k as &dyn rusqlite::ToSql).collect();
        sql_params.push(&now);

        let rows = statement
            .query_map(sql_params.as_slice(), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(classify)?;

        // Count per-reference key appearances; a reference survives only
        // when it appeared under every supplied key.
        let mut appearances: HashMap<String, usize> = HashMap::new();
        let mut matched_keys = 0usize;
        for row in rows {
            let (key, encoded) = row.map_err(classify)?;
            matched_keys += 1;
            for token in posting::decode(&key, &encoded)? {
                *appearances.entry(token).or_insert(0) += 1;
            }
        }
        if matched_keys < unique.len() {
            return Ok(HashSet::new());
        }
        Ok(appearances
            .into_iter()
            .filter(|(_, count)| *count == unique.len())
            .map(|(token, _)| token)
            .collect())
    }

    async fn expire_sweep(&self, now: Timestamp) -> Result<u64> {
        let conn = self.conn.lock().await;
        let swept = conn
            .execute("DELETE FROM index_entries WHERE expires_at <= ?1", params![now as i64])
            .map_err(classify)? as u64;
        if swept > 0 {
            info!(swept, "removed expired index entries");
        }
        Ok(swept)
    }

    async fn stats(&self) -> Result<StoreStats> {
        let now = self.clock.now();
        let conn = self.conn.lock().await;
        let mut statement = conn
            .prepare("SELECT key, field_tag, created_at, expires_at FROM index_entries")
            .map_err(classify)?;
        let rows = statement
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            })
            .map_err(classify)?;

        let mut stats = StoreStats::default();
        for row in rows {
            let (key, field_tag, created_at, expires_at) = row.map_err(classify)?;
            stats.record(&key, &field_tag, created_at as Timestamp, expires_at as Timestamp, now);
        }
        Ok(stats)
    }
}

/// Pragmas applied to every connection before use.
fn setup(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA temp_store = MEMORY;
         PRAGMA secure_delete = ON;
         PRAGMA foreign_keys = ON;
        ",
    )
    .map_err(classify)
}

/// Creates the schema on a fresh database; refuses databases written
/// by a newer schema generation.
fn ensure_schema(conn: &Connection) -> Result<()> {
    let found: u32 = conn
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .map_err(classify)?;
    match found {
        0 => {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS index_entries(
                   key        TEXT PRIMARY KEY,
                   refs       TEXT NOT NULL,
                   field_tag  TEXT NOT NULL,
                   created_at INTEGER NOT NULL,
                   expires_at INTEGER NOT NULL
                 ) WITHOUT ROWID;

                 CREATE INDEX IF NOT EXISTS index_entries_field_tag
                   ON index_entries(field_tag);

                 CREATE INDEX IF NOT EXISTS index_entries_expiry
                   ON index_entries(expires_at, field_tag);
                ",
            )
            .map_err(classify)?;
            conn.pragma_update(None, "user_version", SCHEMA_VERSION)
                .map_err(classify)?;
            Ok(())
        }
        SCHEMA_VERSION => Ok(()),
        newer => Err(StoreError::SchemaMismatch {
            found: newer,
            expected: SCHEMA_VERSION,
        }),
    }
}

/// Splits backend failures into retryable contention and permanent
/// faults. Corruption surfaces as permanent; decode failures never
/// reach here (they are [`StoreError::Integrity`] already).
fn classify(error: rusqlite::Error) -> StoreError {
    match &error {
        rusqlite::Error::SqliteFailure(inner, _)
            if matches!(inner.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) =>
        {
            StoreError::Transient {
                reason: error.to_string(),
            }
        }
        _ => {
            warn!(%error, "sqlite operation failed");
            StoreError::Permanent {
                reason: error.to_string(),
            }
        }
    }
}
