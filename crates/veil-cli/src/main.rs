//! Thin command-line driver over the veil engine.
//!
//! Everything substantive lives in the library crates; this binary
//! parses arguments, assembles a [`Core`] from configuration, runs one
//! operation, and maps failures onto stable exit codes:
//!
//! `0` success, `2` configuration error, `3` store unavailable,
//! `4` key management unavailable, `5` schema mismatch, `1` other.

use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::error;
use veil_core::{BackendKind, BoolOp, Config, Field, SystemClock};
use veil_engine::{parse_predicate, Core, Error as EngineError, IngestItem};
use veil_store::{IndexStore, MemoryStore, SqliteStore, StoreError};

const EXIT_OTHER: u8 = 1;
const EXIT_CONFIG: u8 = 2;
const EXIT_STORE: u8 = 3;
const EXIT_KMS: u8 = 4;
const EXIT_SCHEMA: u8 = 5;

#[derive(Parser)]
#[command(name = "veil")]
#[command(about = "Privacy-preserving substring search over encrypted PII", long_about = None)]
struct Cli {
    /// Config file path
    #[arg(short, long, global = true, default_value = "veil.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index tagged plaintext records from a JSON-lines file
    Ingest {
        /// Input file; one JSON object per line with `field`, `value`,
        /// and an optional `token`
        #[arg(short, long)]
        input: PathBuf,
        /// Maximum values indexed concurrently
        #[arg(long, default_value_t = 8)]
        concurrency: usize,
    },

    /// Evaluate predicates against the index
    Query {
        /// Predicate in `field:operator:value` form; repeatable
        #[arg(short = 'p', long = "predicate", required = true)]
        predicates: Vec<String>,
        /// How multiple predicates combine
        #[arg(long, default_value = "and")]
        combine: String,
    },

    /// Delete entries past their expiry
    Sweep,

    /// Print store counters
    Stats,
}

#[derive(Debug, Deserialize)]
struct IngestLine {
    /// Field label; when absent the field is inferred from the value's
    /// shape, and lines that defeat inference are rejected.
    field: Option<String>,
    value: String,
    token: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(failure) => {
            error!("{}", failure.message);
            ExitCode::from(failure.exit_code)
        }
    }
}

struct Failure {
    exit_code: u8,
    message: String,
}

impl Failure {
    fn new(exit_code: u8, message: impl ToString) -> Self {
        Self {
            exit_code,
            message: message.to_string(),
        }
    }
}

impl From<EngineError> for Failure {
    fn from(error: EngineError) -> Self {
        let code = match &error {
            EngineError::Store(StoreError::SchemaMismatch { .. }) => EXIT_SCHEMA,
            EngineError::Store(_) => EXIT_STORE,
            EngineError::KeyManagement(_) => EXIT_KMS,
            _ => EXIT_OTHER,
        };
        Failure::new(code, error)
    }
}

async fn run(cli: Cli) -> Result<(), Failure> {
    let config =
        Config::load(Some(cli.config.as_path())).map_err(|e| Failure::new(EXIT_CONFIG, e))?;
    let secret = config
        .load_secret()
        .map_err(|e| Failure::new(EXIT_CONFIG, e))?;

    let clock = Arc::new(SystemClock);
    let store: Arc<dyn IndexStore> = match config.backend {
        BackendKind::Memory => Arc::new(MemoryStore::new(clock.clone())),
        BackendKind::Sqlite => {
            let path = config
                .sqlite_path
                .clone()
                .ok_or_else(|| Failure::new(EXIT_CONFIG, "sqlite backend needs sqlite_path"))?;
            let store = SqliteStore::open(&path, clock.clone()).map_err(|e| match e {
                StoreError::SchemaMismatch { .. } => Failure::new(EXIT_SCHEMA, e),
                other => Failure::new(EXIT_STORE, other),
            })?;
            Arc::new(store)
        }
    };
    let core = Core::new(&config, secret, store, clock)
        .map_err(|e| Failure::new(EXIT_CONFIG, e))?;

    match cli.command {
        Commands::Ingest { input, concurrency } => ingest(&core, &input, concurrency).await,
        Commands::Query { predicates, combine } => query(&core, &predicates, &combine).await,
        Commands::Sweep => {
            let swept = core.sweep_expired().await.map_err(Failure::from)?;
            println!("{}", serde_json::json!({ "swept": swept }));
            Ok(())
        }
        Commands::Stats => {
            let stats = core.stats().await.map_err(Failure::from)?;
            println!(
                "{}",
                serde_json::to_string_pretty(&stats)
                    .map_err(|e| Failure::new(EXIT_OTHER, e))?
            );
            Ok(())
        }
    }
}

async fn ingest(core: &Arc<Core>, input: &PathBuf, concurrency: usize) -> Result<(), Failure> {
    let file = std::fs::File::open(input)
        .map_err(|e| Failure::new(EXIT_OTHER, format!("cannot open {}: {e}", input.display())))?;

    let mut items = Vec::new();
    for (number, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| Failure::new(EXIT_OTHER, e))?;
        if line.trim().is_empty() {
            continue;
        }
        let parsed: IngestLine = serde_json::from_str(&line).map_err(|e| {
            Failure::new(EXIT_OTHER, format!("line {}: {e}", number + 1))
        })?;
        let field = match &parsed.field {
            Some(label) => Field::parse(label)
                .map_err(|e| Failure::new(EXIT_OTHER, format!("line {}: {e}", number + 1)))?,
            None => Field::infer(&parsed.value).ok_or_else(|| {
                Failure::new(
                    EXIT_OTHER,
                    format!("line {}: no field label and the value's shape is not inferable", number + 1),
                )
            })?,
        };
        items.push(IngestItem {
            field,
            value: parsed.value,
            token: parsed
                .token
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
        });
    }

    let summary = core.indexer().index_all(items, concurrency).await;
    println!(
        "{}",
        serde_json::json!({
            "indexed": summary.indexed,
            "skipped_empty": summary.skipped_empty,
            "failed": summary.failures.len(),
        })
    );
    for failure in &summary.failures {
        error!(token = %failure.token, "ingest failure: {}", failure.error);
    }
    if summary.failures.is_empty() {
        Ok(())
    } else {
        Err(Failure::new(EXIT_OTHER, "some values failed to index"))
    }
}

async fn query(core: &Arc<Core>, raw_predicates: &[String], combine: &str) -> Result<(), Failure> {
    let op = match combine {
        "and" => BoolOp::And,
        "or" => BoolOp::Or,
        other => {
            return Err(Failure::new(
                EXIT_OTHER,
                format!("--combine must be `and` or `or`, got {other:?}"),
            ))
        }
    };

    let mut predicates = Vec::with_capacity(raw_predicates.len());
    for raw in raw_predicates {
        let mut parts = raw.splitn(3, ':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(field), Some(operator), Some(value)) => {
                predicates.push(parse_predicate(field, operator, value).map_err(Failure::from)?);
            }
            _ => {
                return Err(Failure::new(
                    EXIT_OTHER,
                    format!("predicate {raw:?} is not in field:operator:value form"),
                ))
            }
        }
    }

    let response = core
        .evaluator()
        .search(&predicates, op, None)
        .await
        .map_err(Failure::from)?;
    println!(
        "{}",
        serde_json::to_string_pretty(&response).map_err(|e| Failure::new(EXIT_OTHER, e))?
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_query_command() {
        let cli = Cli::try_parse_from([
            "veil",
            "query",
            "-p",
            "email:contains:gma",
            "-p",
            "fn:eq:arjun",
            "--combine",
            "or",
        ])
        .unwrap();
        match cli.command {
            Commands::Query { predicates, combine } => {
                assert_eq!(predicates.len(), 2);
                assert_eq!(combine, "or");
            }
            _ => panic!("expected query command"),
        }
    }

    #[test]
    fn parses_ingest_with_defaults() {
        let cli = Cli::try_parse_from(["veil", "ingest", "--input", "people.jsonl"]).unwrap();
        match cli.command {
            Commands::Ingest { concurrency, .. } => assert_eq!(concurrency, 8),
            _ => panic!("expected ingest command"),
        }
    }
}
