use thiserror::Error;

/// Core error type shared across keyseed crates.
#[derive(Debug, Error)]
pub enum Error {
    /// The schema description violates internal invariants.
    #[error("invalid schema: {0}")]
    InvalidSchema(String),
    /// No key metadata is registered for the entity type.
    #[error("no metadata registered for entity type '{0}'")]
    MetadataNotFound(String),
    /// A field is unknown, read-only, or cannot hold the given value.
    #[error("field '{entity_type}.{field}' is not accessible: {reason}")]
    FieldAccess {
        entity_type: String,
        field: String,
        reason: String,
    },
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn field_access(
        entity_type: &str,
        field: &str,
        reason: impl Into<String>,
    ) -> Self {
        Error::FieldAccess {
            entity_type: entity_type.to_string(),
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

/// Convenience alias for results returned by keyseed crates.
pub type Result<T> = std::result::Result<T, Error>;
