//! Backend bi-equivalence: for any sequence of store operations, the
//! in-memory and SQLite backends must behave identically — the same
//! operation outcome (acceptance or rejection), and the same answer to
//! every observation afterwards. The persistent backend is an
//! independent implementation of the contract, not a mirror of the
//! memory code, and this suite is the arbiter of that claim.

use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;
use veil_core::{Clock, ManualClock};
use veil_store::posting::MAX_POSTING_BYTES;
use veil_store::{IndexStore, MemoryStore, PostingAdd, SqliteStore, StoreError};

const KEYS: [&str; 5] = [
    "idx:email:eq:aGFzaDA",
    "idx:email:g3:aGFzaDE",
    "idx:fn:pre:aGFzaDI",
    "idx:ln:suf:aGFzaDM",
    "idx:city:g3:aGFzaDQ",
];

const TOKENS: [&str; 6] = ["T1", "T2", "T3", "T4", "T5", "T6"];

const FIELD_TAGS: [&str; 3] = ["EMAIL", "FIRST_NAME", "CITY"];

#[derive(Debug, Clone)]
enum Op {
    Add { key: usize, token: usize, field: usize, ttl: u64 },
    Batch { adds: Vec<(usize, usize)>, ttl: u64 },
    /// One token sized past the posting cap; both backends must
    /// reject it the same way, populated key or fresh.
    AddOversized { key: usize },
    Remove { key: usize, token: usize },
    Advance { millis: u64 },
    Sweep,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0..KEYS.len(), 0..TOKENS.len(), 0..FIELD_TAGS.len(), 1u64..500).prop_map(
            |(key, token, field, ttl)| Op::Add { key, token, field, ttl }
        ),
        2 => (
            proptest::collection::vec((0..KEYS.len(), 0..TOKENS.len()), 1..6),
            1u64..500,
        )
            .prop_map(|(adds, ttl)| Op::Batch { adds, ttl }),
        1 => (0..KEYS.len()).prop_map(|key| Op::AddOversized { key }),
        2 => (0..KEYS.len(), 0..TOKENS.len()).prop_map(|(key, token)| Op::Remove { key, token }),
        1 => (1u64..300).prop_map(|millis| Op::Advance { millis }),
        1 => Just(Op::Sweep),
    ]
}

fn add(key: usize, token: usize, field: usize, expires_at: u64) -> PostingAdd {
    PostingAdd {
        key: KEYS[key].to_string(),
        token: TOKENS[token].to_string(),
        field_tag: FIELD_TAGS[field].to_string(),
        expires_at,
    }
}

fn oversized(key: usize, expires_at: u64) -> PostingAdd {
    PostingAdd {
        key: KEYS[key].to_string(),
        token: "x".repeat(MAX_POSTING_BYTES + 1),
        field_tag: FIELD_TAGS[0].to_string(),
        expires_at,
    }
}

async fn apply(store: &dyn IndexStore, clock: &ManualClock, op: &Op) -> Result<(), StoreError> {
    match op {
        Op::Add { key, token, field, ttl } => {
            store.add(add(*key, *token, *field, clock.now() + ttl)).await
        }
        Op::Batch { adds, ttl } => {
            let expires_at = clock.now() + ttl;
            let batch = adds
                .iter()
                .map(|(key, token)| add(*key, *token, 0, expires_at))
                .collect();
            store.add_batch(batch).await
        }
        Op::AddOversized { key } => store.add(oversized(*key, clock.now() + 500)).await,
        Op::Remove { key, token } => store.remove(KEYS[*key], TOKENS[*token]).await,
        Op::Advance { .. } | Op::Sweep => Ok(()),
    }
}

/// Collapses an operation result into a comparable shape: success, a
/// typed rejection with its key, or any other failure's message.
fn outcome(result: &Result<(), StoreError>) -> String {
    match result {
        Ok(()) => "ok".to_string(),
        Err(StoreError::PostingOverflow { key }) => format!("overflow:{key}"),
        Err(StoreError::InvalidToken { token }) => format!("invalid-token:{token}"),
        Err(other) => format!("error:{other}"),
    }
}

/// Every observable the contract defines, collected in one pass.
async fn observe(store: &dyn IndexStore) -> (Vec<HashSet<String>>, Vec<HashSet<String>>, veil_store::StoreStats) {
    let mut lookups = Vec::new();
    for key in KEYS {
        lookups.push(store.lookup(key).await.expect("lookup"));
    }
    let mut intersections = Vec::new();
    for a in 0..KEYS.len() {
        for b in (a + 1)..KEYS.len() {
            let keys = vec![KEYS[a].to_string(), KEYS[b].to_string()];
            intersections.push(store.intersect(&keys).await.expect("intersect"));
        }
    }
    let all: Vec<String> = KEYS.iter().map(|k| k.to_string()).collect();
    intersections.push(store.intersect(&all).await.expect("intersect all"));
    let stats = store.stats().await.expect("stats");
    (lookups, intersections, stats)
}

async fn run_sequence(ops: Vec<Op>) {
    let clock = Arc::new(ManualClock::new(1_000));
    let memory = MemoryStore::new(clock.clone());
    let sqlite = SqliteStore::open_in_memory(clock.clone()).expect("open sqlite");

    for op in &ops {
        // Clock movement and sweeps are shared events; data operations
        // go to both stores against the same timeline.
        match op {
            Op::Advance { millis } => clock.advance(*millis),
            Op::Sweep => {
                let now = clock.now();
                memory.expire_sweep(now).await.expect("sweep memory");
                sqlite.expire_sweep(now).await.expect("sweep sqlite");
            }
            _ => {
                let memory_result = apply(&memory, &clock, op).await;
                let sqlite_result = apply(&sqlite, &clock, op).await;
                assert_eq!(
                    outcome(&memory_result),
                    outcome(&sqlite_result),
                    "outcome divergence on {op:?}"
                );
            }
        }

        let (memory_lookups, memory_intersections, memory_stats) = observe(&memory).await;
        let (sqlite_lookups, sqlite_intersections, sqlite_stats) = observe(&sqlite).await;
        assert_eq!(memory_lookups, sqlite_lookups, "lookup divergence after {op:?}");
        assert_eq!(
            memory_intersections, sqlite_intersections,
            "intersect divergence after {op:?}"
        );
        assert_eq!(memory_stats, sqlite_stats, "stats divergence after {op:?}");
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn backends_answer_identically(ops in proptest::collection::vec(op_strategy(), 1..32)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .expect("runtime");
        runtime.block_on(run_sequence(ops));
    }
}

#[tokio::test]
async fn scripted_equivalence_with_expiry() {
    run_sequence(vec![
        Op::Add { key: 0, token: 0, field: 0, ttl: 100 },
        Op::Add { key: 0, token: 1, field: 0, ttl: 300 },
        Op::Batch { adds: vec![(1, 0), (2, 0), (1, 1)], ttl: 200 },
        Op::Advance { millis: 150 },
        Op::Remove { key: 1, token: 1 },
        Op::Sweep,
        Op::Advance { millis: 200 },
        Op::Sweep,
        Op::Add { key: 3, token: 4, field: 1, ttl: 50 },
        Op::Remove { key: 3, token: 4 },
    ])
    .await;
}

#[tokio::test]
async fn oversized_postings_are_rejected_identically() {
    let clock = Arc::new(ManualClock::new(1_000));
    let memory = MemoryStore::new(clock.clone());
    let sqlite = SqliteStore::open_in_memory(clock.clone()).expect("open sqlite");
    let stores: [&dyn IndexStore; 2] = [&memory, &sqlite];

    // A fresh key rejects a single reference past the cap outright.
    for store in stores {
        let err = store.add(oversized(0, 2_000)).await.unwrap_err();
        assert!(matches!(err, StoreError::PostingOverflow { key } if key == KEYS[0]));
    }

    // A key filled exactly to the cap accepts, then rejects the next
    // append; a batch carrying the overflow leaves no partial effects.
    let at_cap = PostingAdd {
        key: KEYS[1].to_string(),
        token: "a".repeat(MAX_POSTING_BYTES),
        field_tag: FIELD_TAGS[0].to_string(),
        expires_at: 2_000,
    };
    for store in stores {
        store.add(at_cap.clone()).await.expect("fill to cap");
        let batch = vec![add(2, 0, 1, 2_000), add(1, 0, 0, 2_000)];
        let err = store.add_batch(batch).await.unwrap_err();
        assert!(matches!(err, StoreError::PostingOverflow { key } if key == KEYS[1]));
        assert!(store.lookup(KEYS[2]).await.expect("lookup").is_empty());
    }

    let (memory_lookups, memory_intersections, memory_stats) = observe(&memory).await;
    let (sqlite_lookups, sqlite_intersections, sqlite_stats) = observe(&sqlite).await;
    assert_eq!(memory_lookups, sqlite_lookups);
    assert_eq!(memory_intersections, sqlite_intersections);
    assert_eq!(memory_stats, sqlite_stats);
}
