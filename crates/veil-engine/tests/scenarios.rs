//! End-to-end query scenarios, run against both store backends.

use std::sync::Arc;
use veil_core::{BoolOp, Config, Field, IndexSecret, ManualClock, Operator, Predicate};
use veil_engine::{Core, Error};
use veil_store::{IndexStore, MemoryStore, SqliteStore};

#[derive(Clone, Copy, Debug)]
enum Backend {
    Memory,
    Sqlite,
}

fn build(backend: Backend, k_anonymity: usize) -> (Arc<ManualClock>, Arc<Core>) {
    let clock = Arc::new(ManualClock::new(1_000));
    let store: Arc<dyn IndexStore> = match backend {
        Backend::Memory => Arc::new(MemoryStore::new(clock.clone())),
        Backend::Sqlite => Arc::new(SqliteStore::open_in_memory(clock.clone()).expect("open sqlite")),
    };
    let config = Config {
        k_anonymity,
        ..Config::default()
    };
    let core = Core::new(&config, IndexSecret::new([21u8; 32], 1), store, clock.clone())
        .expect("core assembles");
    (clock, core)
}

async fn index(core: &Arc<Core>, field: Field, value: &str, token: &str) {
    core.indexer()
        .index_value(field, value, token, None)
        .await
        .expect("index");
}

async fn refs(core: &Arc<Core>, predicate: Predicate) -> Vec<String> {
    core.evaluator()
        .search_one(&predicate, None)
        .await
        .expect("search")
        .refs
}

async fn exact_email(backend: Backend) {
    let (_, core) = build(backend, 1);
    index(&core, Field::Email, "priya.sharma@example.com", "T1").await;

    let hit = refs(&core, Predicate::eq(Field::Email, "PRIYA.SHARMA@EXAMPLE.COM")).await;
    assert_eq!(hit, vec!["T1"]);

    let miss = refs(&core, Predicate::eq(Field::Email, "priya@example.com")).await;
    assert!(miss.is_empty());
}

async fn first_name_prefix(backend: Backend) {
    let (_, core) = build(backend, 1);
    index(&core, Field::FirstName, "Arjun", "T2").await;
    index(&core, Field::FirstName, "Arnav", "T3").await;

    let both = refs(&core, Predicate::starts_with(Field::FirstName, "Ar")).await;
    assert_eq!(both, vec!["T2", "T3"]);

    let one = refs(&core, Predicate::starts_with(Field::FirstName, "Arj")).await;
    assert_eq!(one, vec!["T2"]);
}

async fn surname_suffix(backend: Backend) {
    let (_, core) = build(backend, 1);
    index(&core, Field::LastName, "Kumar", "T4").await;
    index(&core, Field::LastName, "Parmar", "T5").await;

    let both = refs(&core, Predicate::ends_with(Field::LastName, "mar")).await;
    assert_eq!(both, vec!["T4", "T5"]);

    let one = refs(&core, Predicate::ends_with(Field::LastName, "umar")).await;
    assert_eq!(one, vec!["T4"]);
}

async fn contains_grams(backend: Backend) {
    let (_, core) = build(backend, 1);
    index(&core, Field::Email, "x@gmail.com", "TX").await;
    index(&core, Field::Email, "y@yahoo.com", "TY").await;

    let gmail = refs(&core, Predicate::contains(Field::Email, "gma")).await;
    assert_eq!(gmail, vec!["TX"]);

    let too_short = core
        .evaluator()
        .search_one(&Predicate::contains(Field::Email, "oo"), None)
        .await;
    assert!(matches!(too_short, Err(Error::QueryTooShort { len: 2, min: 3 })));

    let yahoo = refs(&core, Predicate::contains(Field::Email, "hoo")).await;
    assert_eq!(yahoo, vec!["TY"]);
}

async fn anonymity_suppression(backend: Backend) {
    let (_, core) = build(backend, 5);
    for (i, token) in ["C1", "C2", "C3"].iter().enumerate() {
        index(&core, Field::City, &format!("Mumbai {i}"), token).await;
    }

    let predicate = Predicate::starts_with(Field::City, "Mum");
    let suppressed = core
        .evaluator()
        .search_one(&predicate, None)
        .await
        .expect("search");
    assert!(suppressed.refs.is_empty());
    assert!(suppressed.suppressed_for_anonymity);

    index(&core, Field::City, "Mumbai Central", "C4").await;
    index(&core, Field::City, "Mumbra", "C5").await;

    let released = core
        .evaluator()
        .search_one(&predicate, None)
        .await
        .expect("search");
    assert_eq!(released.refs, vec!["C1", "C2", "C3", "C4", "C5"]);
    assert!(!released.suppressed_for_anonymity);
}

async fn and_composition(backend: Backend) {
    let (_, core) = build(backend, 1);
    index(&core, Field::FirstName, "Stephen", "S1").await;
    index(&core, Field::FirstName, "Stella", "S2").await;

    let predicates = vec![
        Predicate::starts_with(Field::FirstName, "Ste"),
        Predicate::ends_with(Field::FirstName, "hen"),
    ];
    let response = core
        .evaluator()
        .search(&predicates, BoolOp::And, None)
        .await
        .expect("search");
    assert_eq!(response.refs, vec!["S1"]);

    let either = core
        .evaluator()
        .search(&predicates, BoolOp::Or, None)
        .await
        .expect("search");
    assert_eq!(either.refs, vec!["S1", "S2"]);
}

async fn cross_field_isolation(backend: Backend) {
    // The same fragment under two fields must not cross-match.
    let (_, core) = build(backend, 1);
    index(&core, Field::FirstName, "Kumar", "F1").await;

    let wrong_field = refs(&core, Predicate::eq(Field::LastName, "Kumar")).await;
    assert!(wrong_field.is_empty());
}

async fn empty_query_behaviour(backend: Backend) {
    let (_, core) = build(backend, 1);
    index(&core, Field::FirstName, "Arjun", "T1").await;

    let empty_prefix = refs(&core, Predicate::starts_with(Field::FirstName, "  ")).await;
    assert!(empty_prefix.is_empty());

    let empty_eq = refs(&core, Predicate::eq(Field::FirstName, "")).await;
    assert!(empty_eq.is_empty());
}

async fn run_all(backend: Backend) {
    exact_email(backend).await;
    first_name_prefix(backend).await;
    surname_suffix(backend).await;
    contains_grams(backend).await;
    anonymity_suppression(backend).await;
    and_composition(backend).await;
    cross_field_isolation(backend).await;
    empty_query_behaviour(backend).await;
}

#[tokio::test]
async fn scenarios_pass_on_memory() {
    run_all(Backend::Memory).await;
}

#[tokio::test]
async fn scenarios_pass_on_sqlite() {
    run_all(Backend::Sqlite).await;
}

#[tokio::test]
async fn operators_parse_from_labels() {
    let (_, core) = build(Backend::Memory, 1);
    index(&core, Field::Email, "x@gmail.com", "T1").await;

    let predicate = veil_engine::parse_predicate("EMAIL", "contains", "gma").expect("parse");
    assert_eq!(predicate.operator, Operator::Contains);
    assert_eq!(refs(&core, predicate).await, vec!["T1"]);
}
