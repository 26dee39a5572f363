//! The closed registry of indexable PII fields.
//!
//! Each field carries a short stable alias that appears inside index
//! keys. The alias set is part of the on-disk format: renaming an alias
//! silently orphans every key derived under the old one, so additions
//! are append-only and renames require a rebuild.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An indexable PII field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    FirstName,
    LastName,
    MiddleName,
    FullName,
    Email,
    Phone,
    DateOfBirth,
    StreetAddress,
    City,
    Country,
    TaxId,
    PassportId,
}

/// A field label that matches neither a full name nor an alias.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown field: {label:?}")]
pub struct UnknownFieldError {
    /// The label as the caller supplied it.
    pub label: String,
}

impl Field {
    /// Every field, in registry order.
    pub const ALL: [Field; 12] = [
        Field::FirstName,
        Field::LastName,
        Field::MiddleName,
        Field::FullName,
        Field::Email,
        Field::Phone,
        Field::DateOfBirth,
        Field::StreetAddress,
        Field::City,
        Field::Country,
        Field::TaxId,
        Field::PassportId,
    ];

    /// The short alias used inside index keys. Wire-stable.
    pub const fn alias(self) -> &'static str {
        match self {
            Field::FirstName => "fn",
            Field::LastName => "ln",
            Field::MiddleName => "mn",
            Field::FullName => "full",
            Field::Email => "email",
            Field::Phone => "phone",
            Field::DateOfBirth => "dob",
            Field::StreetAddress => "addr",
            Field::City => "city",
            Field::Country => "country",
            Field::TaxId => "tax",
            Field::PassportId => "passport",
        }
    }

    /// The full field name, used as the audit tag on index entries.
    /// Plays no role in key derivation or query matching.
    pub const fn name(self) -> &'static str {
        match self {
            Field::FirstName => "FIRST_NAME",
            Field::LastName => "LAST_NAME",
            Field::MiddleName => "MIDDLE_NAME",
            Field::FullName => "FULL_NAME",
            Field::Email => "EMAIL",
            Field::Phone => "PHONE",
            Field::DateOfBirth => "DATE_OF_BIRTH",
            Field::StreetAddress => "STREET_ADDRESS",
            Field::City => "CITY",
            Field::Country => "COUNTRY",
            Field::TaxId => "TAX_ID",
            Field::PassportId => "PASSPORT_ID",
        }
    }

    /// Resolves an alias back to its field.
    pub fn from_alias(alias: &str) -> Option<Field> {
        Field::ALL.iter().copied().find(|f| f.alias() == alias)
    }

    /// Parses a caller-supplied label: the full field name or the alias,
    /// case-insensitively.
    pub fn parse(label: &str) -> Result<Field, UnknownFieldError> {
        let trimmed = label.trim();
        Field::ALL
            .iter()
            .copied()
            .find(|f| f.name().eq_ignore_ascii_case(trimmed) || f.alias().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| UnknownFieldError {
                label: label.to_string(),
            })
    }

    /// Best-effort field inference for untagged corpora.
    ///
    /// A courtesy only: tagged ingestion bypasses this entirely, and a
    /// `None` here means "do not guess". The checks run on the raw
    /// value, cheapest first.
    pub fn infer(raw: &str) -> Option<Field> {
        let value = raw.trim();
        if value.is_empty() {
            return None;
        }
        if looks_like_email(value) {
            return Some(Field::Email);
        }
        if looks_like_date(value) {
            return Some(Field::DateOfBirth);
        }
        if looks_like_phone(value) {
            return Some(Field::Phone);
        }
        if looks_like_tax_id(value) {
            return Some(Field::TaxId);
        }
        if looks_like_passport(value) {
            return Some(Field::PassportId);
        }
        None
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn looks_like_email(value: &str) -> bool {
    match value.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !value.contains(char::is_whitespace),
        None => false,
    }
}

/// Ten or more digits once separators are stripped, and nothing that
/// isn't a digit, separator, or leading `+`.
fn looks_like_phone(value: &str) -> bool {
    let mut digits = 0usize;
    for (i, c) in value.chars().enumerate() {
        match c {
            '0'..='9' => digits += 1,
            ' ' | '-' | '(' | ')' | '.' => {}
            '+' if i == 0 => {}
            _ => return false,
        }
    }
    digits >= 10
}

/// `YYYY-MM-DD` or `DD/MM/YYYY` shapes, digits only in the slots.
fn looks_like_date(value: &str) -> bool {
    let b = value.as_bytes();
    let digit = |i: usize| b[i].is_ascii_digit();
    match b.len() {
        10 if b[4] == b'-' && b[7] == b'-' => (0..4).all(digit) && (5..7).all(digit) && (8..10).all(digit),
        10 if b[2] == b'/' && b[5] == b'/' => (0..2).all(digit) && (3..5).all(digit) && (6..10).all(digit),
        _ => false,
    }
}

/// US-style SSN shape `DDD-DD-DDDD` or India-style PAN `AAAAA9999A`.
fn looks_like_tax_id(value: &str) -> bool {
    let b = value.as_bytes();
    match b.len() {
        11 => {
            b[3] == b'-'
                && b[6] == b'-'
                && b.iter().enumerate().all(|(i, c)| matches!(i, 3 | 6) || c.is_ascii_digit())
        }
        10 => {
            b[..5].iter().all(u8::is_ascii_uppercase)
                && b[5..9].iter().all(u8::is_ascii_digit)
                && b[9].is_ascii_uppercase()
        }
        _ => false,
    }
}

/// One or two leading uppercase letters followed by seven digits.
fn looks_like_passport(value: &str) -> bool {
    let b = value.as_bytes();
    let (letters, rest) = match b.len() {
        8 => (&b[..1], &b[1..]),
        9 => (&b[..2], &b[2..]),
        _ => return false,
    };
    letters.iter().all(u8::is_ascii_uppercase) && rest.len() == 7 && rest.iter().all(u8::is_ascii_digit)
}
