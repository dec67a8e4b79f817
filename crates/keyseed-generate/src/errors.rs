use thiserror::Error;

/// Errors emitted by the generation engine.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("could not generate a unique primary key for '{entity_type}' after {attempts} attempts")]
    UniqueKeyGenerationFailure { entity_type: String, attempts: u32 },
    #[error("recursion depth {depth} exceeds limit {limit} while fabricating '{entity_type}'")]
    RecursionDepthExceeded {
        entity_type: String,
        depth: u32,
        limit: u32,
    },
    #[error("unknown entity type: {0}")]
    UnknownEntityType(String),
    #[error("invalid options: {0}")]
    InvalidOptions(String),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("core error: {0}")]
    Core(#[from] keyseed_core::Error),
    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),
    #[error("logging error: {0}")]
    Logging(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors emitted by a backing store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The pending batch violates a key constraint; the batch is discarded.
    #[error("constraint violation on '{entity_type}': {message}")]
    ConstraintViolation {
        entity_type: String,
        message: String,
    },
    /// The store accepted the row but reported no rows written.
    #[error("'{entity_type}' row was not written by commit")]
    NotWritten { entity_type: String },
    #[error("store lock poisoned")]
    Poisoned,
}
