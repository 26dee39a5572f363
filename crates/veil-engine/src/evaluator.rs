//! Predicate evaluation: from one `(field, operator, query)` triple to
//! a set of opaque references, without ever consulting plaintext.
//!
//! A predicate becomes index keys through the same normalize/derive
//! pipeline ingestion used, then resolves with a single lookup
//! (equality, prefix, suffix) or one intersection (substring). Each
//! predicate runs against a single store snapshot; a failed lookup
//! fails the whole predicate rather than half-reporting.

use crate::compose::compose;
use crate::core::Core;
use crate::error::{Error, Result};
use crate::gate;
use crate::response::QueryResponse;
use crate::util::with_deadline;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use veil_core::{fragments, normalize, BoolOp, Field, Operator, Predicate};

/// Query front end over a shared [`Core`].
#[derive(Clone)]
pub struct Evaluator {
    core: Arc<Core>,
}

impl Evaluator {
    pub(crate) fn new(core: Arc<Core>) -> Self {
        Self { core }
    }

    /// Resolves one predicate to its raw reference set, ungated.
    ///
    /// An empty result is a value, not an error; only malformed
    /// predicates and store failures raise.
    pub async fn evaluate(
        &self,
        predicate: &Predicate,
        deadline: Option<Duration>,
    ) -> Result<HashSet<String>> {
        let query = normalize(&predicate.query);
        let pairs = fragments::query_fragments(predicate.operator, &query, self.core.gram_width())?;
        let keys: Vec<String> = pairs
            .into_iter()
            .map(|(tag, fragment)| self.core.deriver().index_key(predicate.field, tag, &fragment))
            .collect();
        debug!(
            field = %predicate.field,
            operator = %predicate.operator,
            keys = keys.len(),
            "evaluating predicate"
        );

        match keys.as_slice() {
            [] => Ok(HashSet::new()),
            [single] => with_deadline(deadline, "lookup", self.core.store().lookup(single)).await,
            many => with_deadline(deadline, "intersect", self.core.store().intersect(many)).await,
        }
    }

    /// Evaluates a one-level Boolean query and applies the anonymity
    /// gate and result cap. The deadline bounds each predicate's store
    /// traffic; predicates run sequentially and may observe slightly
    /// skewed snapshots, which composition tolerates.
    pub async fn search(
        &self,
        predicates: &[Predicate],
        op: BoolOp,
        deadline: Option<Duration>,
    ) -> Result<QueryResponse> {
        if predicates.is_empty() {
            return Err(Error::EmptyQuery);
        }
        let mut results = Vec::with_capacity(predicates.len());
        for predicate in predicates {
            results.push(self.evaluate(predicate, deadline).await?);
        }
        let combined = compose(results, op);
        Ok(gate::apply(
            combined,
            self.core.k_anonymity(),
            self.core.max_results(),
        ))
    }

    /// Single-predicate convenience over [`Evaluator::search`].
    pub async fn search_one(
        &self,
        predicate: &Predicate,
        deadline: Option<Duration>,
    ) -> Result<QueryResponse> {
        self.search(std::slice::from_ref(predicate), BoolOp::And, deadline)
            .await
    }

    /// Fetches the encrypted records behind a gated response, for
    /// callers that opted in. Purely a pass-through to the record
    /// store; nothing is decrypted here.
    pub async fn fetch_ciphertexts(
        &self,
        response: &QueryResponse,
        records: &dyn crate::collab::RecordStore,
    ) -> Result<Vec<(String, Vec<u8>)>> {
        let mut fetched = Vec::with_capacity(response.refs.len());
        for token in &response.refs {
            let ciphertext = records
                .fetch_ciphertext(token)
                .await
                .map_err(Error::RecordStore)?;
            fetched.push((token.clone(), ciphertext));
        }
        Ok(fetched)
    }
}

/// Resolves caller-supplied labels into a typed predicate, rejecting
/// unknown fields and operators before any store traffic.
pub fn parse_predicate(field_label: &str, operator_label: &str, query: &str) -> Result<Predicate> {
    let field = Field::parse(field_label)?;
    let operator = Operator::parse(operator_label).ok_or_else(|| Error::UnknownOperator {
        label: operator_label.to_string(),
    })?;
    Ok(Predicate::new(field, operator, query))
}
