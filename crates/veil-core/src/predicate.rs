//! The closed query surface: one predicate per `(field, operator,
//! query)` triple, composed one level deep with AND or OR.
//!
//! This is intentionally a serialized, planner-free language. No
//! overloading, no nesting; callers with deeper Boolean trees
//! pre-normalize into conjunctive or disjunctive form before handing
//! the predicates over.

use crate::field::Field;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A match operator over a single field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    /// Whole-value equality after normalization.
    Eq,
    /// The value starts with the query.
    StartsWith,
    /// The value ends with the query.
    EndsWith,
    /// The query occurs anywhere in the value. Needs at least the
    /// configured gram width of characters.
    Contains,
}

impl Operator {
    /// Parses a caller-supplied operator label.
    pub fn parse(label: &str) -> Option<Operator> {
        match label.trim() {
            "eq" | "equals" => Some(Operator::Eq),
            "starts_with" | "startswith" | "prefix" => Some(Operator::StartsWith),
            "ends_with" | "endswith" | "suffix" => Some(Operator::EndsWith),
            "contains" | "substring" => Some(Operator::Contains),
            _ => None,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operator::Eq => f.write_str("eq"),
            Operator::StartsWith => f.write_str("starts_with"),
            Operator::EndsWith => f.write_str("ends_with"),
            Operator::Contains => f.write_str("contains"),
        }
    }
}

/// One field predicate. The query is raw caller input; normalization
/// happens at evaluation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Predicate {
    pub field: Field,
    pub operator: Operator,
    pub query: String,
}

impl Predicate {
    pub fn new(field: Field, operator: Operator, query: impl Into<String>) -> Self {
        Self {
            field,
            operator,
            query: query.into(),
        }
    }

    pub fn eq(field: Field, query: impl Into<String>) -> Self {
        Self::new(field, Operator::Eq, query)
    }

    pub fn starts_with(field: Field, query: impl Into<String>) -> Self {
        Self::new(field, Operator::StartsWith, query)
    }

    pub fn ends_with(field: Field, query: impl Into<String>) -> Self {
        Self::new(field, Operator::EndsWith, query)
    }

    pub fn contains(field: Field, query: impl Into<String>) -> Self {
        Self::new(field, Operator::Contains, query)
    }
}

/// Top-level composition over a list of predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoolOp {
    /// Set intersection of the predicate results.
    And,
    /// Set union of the predicate results.
    Or,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operator_labels_parse() {
        assert_eq!(Operator::parse("eq"), Some(Operator::Eq));
        assert_eq!(Operator::parse("startswith"), Some(Operator::StartsWith));
        assert_eq!(Operator::parse("ends_with"), Some(Operator::EndsWith));
        assert_eq!(Operator::parse(" contains "), Some(Operator::Contains));
        assert_eq!(Operator::parse("matches"), None);
    }

    #[test]
    fn display_round_trips_through_parse() {
        for op in [Operator::Eq, Operator::StartsWith, Operator::EndsWith, Operator::Contains] {
            assert_eq!(Operator::parse(&op.to_string()), Some(op));
        }
    }

    #[test]
    fn constructors_fill_fields() {
        let p = Predicate::contains(Field::Email, "gma");
        assert_eq!(p.field, Field::Email);
        assert_eq!(p.operator, Operator::Contains);
        assert_eq!(p.query, "gma");
    }
}
