//! Typed per-program beneficiary attributes.
//!
//! Programs declare the custom attributes they collect (postal address parts, household size,
//! consent flags) in a schema keyed by attribute name. Stored values are validated against the
//! schema when a payment needs them, so amounts stay numeric and flags stay boolean instead of
//! round-tripping through an untyped property bag.
use std::{collections::HashMap, fmt::Display, str::FromStr};

use sqlx::Type;
use thiserror::Error;

use crate::db_types::ConversionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Type)]
pub enum AttributeKind {
    Text,
    Number,
    Boolean,
}

impl Display for AttributeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttributeKind::Text => write!(f, "Text"),
            AttributeKind::Number => write!(f, "Number"),
            AttributeKind::Boolean => write!(f, "Boolean"),
        }
    }
}

impl FromStr for AttributeKind {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Text" => Ok(Self::Text),
            "Number" => Ok(Self::Number),
            "Boolean" => Ok(Self::Boolean),
            s => Err(ConversionError::new(format!("Invalid attribute kind: {s}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Text(String),
    Number(f64),
    Boolean(bool),
}

#[derive(Debug, Clone, Error)]
pub enum AttributeError {
    #[error("Attribute '{0}' is not declared in the program schema")]
    UnknownAttribute(String),
    #[error("Attribute '{key}' should be a {kind} but the stored value '{raw}' is not")]
    InvalidValue { key: String, kind: AttributeKind, raw: String },
    #[error("Attribute '{0}' is required for this payment but missing")]
    MissingAttribute(String),
}

/// The declared attributes for one program.
#[derive(Debug, Clone, Default)]
pub struct AttributeSchema {
    pub program_id: i64,
    entries: HashMap<String, AttributeKind>,
}

impl AttributeSchema {
    pub fn new(program_id: i64) -> Self {
        Self { program_id, entries: HashMap::new() }
    }

    pub fn declare(&mut self, key: &str, kind: AttributeKind) -> &mut Self {
        self.entries.insert(key.to_string(), kind);
        self
    }

    pub fn kind_of(&self, key: &str) -> Option<AttributeKind> {
        self.entries.get(key).copied()
    }

    pub fn validate(&self, key: &str, raw: &str) -> Result<AttributeValue, AttributeError> {
        let kind = self.kind_of(key).ok_or_else(|| AttributeError::UnknownAttribute(key.to_string()))?;
        let invalid = || AttributeError::InvalidValue { key: key.to_string(), kind, raw: raw.to_string() };
        match kind {
            AttributeKind::Text => Ok(AttributeValue::Text(raw.to_string())),
            AttributeKind::Number => raw.parse::<f64>().map(AttributeValue::Number).map_err(|_| invalid()),
            AttributeKind::Boolean => match raw {
                "true" | "1" => Ok(AttributeValue::Boolean(true)),
                "false" | "0" => Ok(AttributeValue::Boolean(false)),
                _ => Err(invalid()),
            },
        }
    }
}

/// A beneficiary's attribute values, validated against the program schema.
#[derive(Debug, Clone, Default)]
pub struct AttributeBag {
    values: HashMap<String, AttributeValue>,
}

impl AttributeBag {
    pub fn from_rows(schema: &AttributeSchema, rows: &[(String, String)]) -> Result<Self, AttributeError> {
        let mut values = HashMap::with_capacity(rows.len());
        for (key, raw) in rows {
            let value = schema.validate(key, raw)?;
            values.insert(key.clone(), value);
        }
        Ok(Self { values })
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        match self.values.get(key) {
            Some(AttributeValue::Text(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    /// The text value for `key`, or an error naming the missing attribute. Used for the address
    /// fields a card issuer refuses to proceed without.
    pub fn require_text(&self, key: &str) -> Result<&str, AttributeError> {
        self.text(key).ok_or_else(|| AttributeError::MissingAttribute(key.to_string()))
    }

    pub fn number(&self, key: &str) -> Option<f64> {
        match self.values.get(key) {
            Some(AttributeValue::Number(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn boolean(&self, key: &str) -> Option<bool> {
        match self.values.get(key) {
            Some(AttributeValue::Boolean(b)) => Some(*b),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn schema() -> AttributeSchema {
        let mut schema = AttributeSchema::new(3);
        schema
            .declare("lastName", AttributeKind::Text)
            .declare("householdSize", AttributeKind::Number)
            .declare("consentGiven", AttributeKind::Boolean);
        schema
    }

    #[test]
    fn undeclared_attributes_are_rejected() {
        let err = schema().validate("favouriteColour", "blue").unwrap_err();
        assert!(matches!(err, AttributeError::UnknownAttribute(_)));
    }

    #[test]
    fn values_keep_their_declared_types() {
        let schema = schema();
        let rows = vec![
            ("lastName".to_string(), "de Vries".to_string()),
            ("householdSize".to_string(), "4".to_string()),
            ("consentGiven".to_string(), "true".to_string()),
        ];
        let bag = AttributeBag::from_rows(&schema, &rows).unwrap();
        assert_eq!(bag.text("lastName"), Some("de Vries"));
        assert_eq!(bag.number("householdSize"), Some(4.0));
        assert_eq!(bag.boolean("consentGiven"), Some(true));
        // A number read through the wrong accessor is not silently coerced.
        assert_eq!(bag.text("householdSize"), None);
    }

    #[test]
    fn malformed_values_are_rejected() {
        let err = schema().validate("householdSize", "four").unwrap_err();
        assert!(matches!(err, AttributeError::InvalidValue { .. }));
        let err = schema().validate("consentGiven", "maybe").unwrap_err();
        assert!(matches!(err, AttributeError::InvalidValue { .. }));
    }

    #[test]
    fn missing_required_text() {
        let bag = AttributeBag::default();
        assert!(matches!(bag.require_text("lastName"), Err(AttributeError::MissingAttribute(_))));
    }
}
