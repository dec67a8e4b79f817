use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Declared storage kind of an entity field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Integer,
    BigInteger,
    Uuid,
    Text,
    Timestamp,
    Boolean,
    Float,
    Date,
}

impl FieldKind {
    /// Semantic kind used when issuing key values for this field.
    pub fn key_kind(self) -> KeyKind {
        match self {
            FieldKind::Integer => KeyKind::Integer,
            FieldKind::BigInteger => KeyKind::BigInteger,
            FieldKind::Uuid => KeyKind::Uuid,
            FieldKind::Text => KeyKind::Text,
            FieldKind::Timestamp => KeyKind::Timestamp,
            FieldKind::Boolean | FieldKind::Float | FieldKind::Date => KeyKind::Other,
        }
    }
}

/// Key value families the counter store knows how to issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyKind {
    Integer,
    BigInteger,
    Uuid,
    Text,
    Timestamp,
    /// Anything else; issued as the type default.
    Other,
}

/// A single field value held by an [`crate::Entity`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Null,
    Bool(bool),
    Int(i32),
    BigInt(i64),
    Float(f64),
    Uuid(Uuid),
    Text(String),
    Date(NaiveDate),
    Timestamp(DateTime<Utc>),
}

/// Ordered key values, one per key property.
pub type KeyTuple = Vec<Value>;

impl Value {
    /// The type-default value a freshly constructed field of `kind` holds.
    pub fn default_for(kind: FieldKind) -> Self {
        match kind {
            FieldKind::Integer => Value::Int(0),
            FieldKind::BigInteger => Value::BigInt(0),
            FieldKind::Uuid => Value::Uuid(Uuid::nil()),
            FieldKind::Text => Value::Text(String::new()),
            FieldKind::Timestamp => Value::Timestamp(DateTime::<Utc>::default()),
            FieldKind::Boolean => Value::Bool(false),
            FieldKind::Float => Value::Float(0.0),
            FieldKind::Date => Value::Date(NaiveDate::default()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// True for `Null` and for every type-default value.
    pub fn is_default(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Bool(value) => !value,
            Value::Int(value) => *value == 0,
            Value::BigInt(value) => *value == 0,
            Value::Float(value) => *value == 0.0,
            Value::Uuid(value) => value.is_nil(),
            Value::Text(value) => value.is_empty(),
            Value::Date(value) => *value == NaiveDate::default(),
            Value::Timestamp(value) => *value == DateTime::<Utc>::default(),
        }
    }

    /// Whether a field declared as `kind` may hold this value. `Null` fits any kind.
    pub fn fits(&self, kind: FieldKind) -> bool {
        matches!(
            (self, kind),
            (Value::Null, _)
                | (Value::Bool(_), FieldKind::Boolean)
                | (Value::Int(_), FieldKind::Integer)
                | (Value::BigInt(_), FieldKind::BigInteger)
                | (Value::Float(_), FieldKind::Float)
                | (Value::Uuid(_), FieldKind::Uuid)
                | (Value::Text(_), FieldKind::Text)
                | (Value::Date(_), FieldKind::Date)
                | (Value::Timestamp(_), FieldKind::Timestamp)
        )
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(value) => Some(i64::from(*value)),
            Value::BigInt(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(value) => Some(value.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("<null>"),
            Value::Bool(value) => write!(f, "{value}"),
            Value::Int(value) => write!(f, "{value}"),
            Value::BigInt(value) => write!(f, "{value}"),
            Value::Float(value) => write!(f, "{value}"),
            Value::Uuid(value) => write!(f, "{value}"),
            Value::Text(value) => f.write_str(value),
            Value::Date(value) => write!(f, "{}", value.format("%Y-%m-%d")),
            Value::Timestamp(value) => write!(f, "{}", value.to_rfc3339()),
        }
    }
}
