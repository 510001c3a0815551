use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::schema::{FieldDefinition, FieldKind, FormSchema, ValueSet};

/// Field errors for a batch, keyed by batch index then by field path.
///
/// Only indexes with at least one error are present, so an empty report is a valid batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationReport(BTreeMap<usize, BTreeMap<String, String>>);

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.0.is_empty()
    }

    pub fn errors(&self) -> &BTreeMap<usize, BTreeMap<String, String>> {
        &self.0
    }

    pub fn for_index(&self, index: usize) -> Option<&BTreeMap<String, String>> {
        self.0.get(&index)
    }

    pub fn error_count(&self) -> usize {
        self.0.values().map(BTreeMap::len).sum()
    }

    /// First offending path, used when a single field must be highlighted.
    pub fn first(&self) -> Option<(usize, &str, &str)> {
        self.0.iter().find_map(|(index, fields)| {
            fields
                .iter()
                .next()
                .map(|(path, message)| (*index, path.as_str(), message.as_str()))
        })
    }

    fn record(&mut self, index: usize, path: String, message: String) {
        self.0.entry(index).or_default().insert(path, message);
    }
}

/// Validate every value set of a batch against the schema.
pub fn validate(schema: &FormSchema, batch: &[ValueSet]) -> ValidationReport {
    let mut report = ValidationReport::default();
    for (index, values) in batch.iter().enumerate() {
        for (path, field) in schema.walk() {
            if let Some(message) = check_field(field, values.get(&path)) {
                report.record(index, path, message);
            }
        }
    }
    report
}

fn check_field(field: &FieldDefinition, value: Option<&str>) -> Option<String> {
    let name = display_name(field);
    let Some(value) = value else {
        return field
            .is_enforced()
            .then(|| format!("{name} is required"));
    };

    match &field.kind {
        FieldKind::ShortText | FieldKind::FileReference => None,
        FieldKind::Email => (!is_email(value)).then(|| format!("{name} must be a valid email address")),
        FieldKind::Phone => (!is_phone(value)).then(|| format!("{name} must be a valid phone number")),
        FieldKind::Number => match Decimal::from_str(value) {
            Ok(number) if number.is_sign_negative() && !number.is_zero() => {
                Some(format!("{name} must not be negative"))
            }
            Ok(_) => None,
            Err(_) => Some(format!("{name} must be a number")),
        },
        FieldKind::SingleSelect { options } => (!options.iter().any(|option| option == value))
            .then(|| format!("{name} must be one of: {}", options.join(", "))),
    }
}

fn display_name(field: &FieldDefinition) -> &str {
    if field.label.trim().is_empty() {
        &field.key
    } else {
        &field.label
    }
}

/// `local@domain.tld`: no whitespace, dotted domain, labels never start or end with a dash.
static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[^\s@]+@[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?)+$",
    )
    .expect("email regex is valid")
});

/// Optional leading `+`, then 8 to 15 digits; spaces, dashes, dots and parentheses allowed.
static PHONE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\+?(?:[ ().-]*[0-9]){8,15}[ ().-]*$").expect("phone regex is valid")
});

pub(crate) fn is_email(value: &str) -> bool {
    EMAIL_PATTERN.is_match(value)
}

pub(crate) fn is_phone(value: &str) -> bool {
    PHONE_PATTERN.is_match(value)
}
