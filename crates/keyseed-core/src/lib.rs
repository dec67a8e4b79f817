//! Core contracts for keyseed.
//!
//! This crate defines the schema description consumed by the key seeder,
//! the dynamic entity record it fills in, the metadata provider seam, and
//! schema validation and dependency diagnostics.

pub mod entity;
pub mod error;
pub mod graph;
pub mod metadata;
pub mod schema;
pub mod types;
pub mod validation;

pub use entity::{Entity, Field};
pub use error::{Error, Result};
pub use graph::{DependencyReport, DependencySummary, build_dependency_report};
pub use metadata::{EntityMetadata, ForeignKeyGroup, KeyExtractor, MetadataProvider};
pub use schema::{EntityDef, FieldDef, ForeignKeyDef, ReferenceDef, SchemaModel};
pub use types::{FieldKind, KeyKind, KeyTuple, Value};
pub use validation::validate_schema;

/// Current contract version for schema description files.
pub const SCHEMA_VERSION: &str = "0.1";
