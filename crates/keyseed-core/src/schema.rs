use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::FieldKind;

/// Top-level description of the entity types keyseed can fabricate.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SchemaModel {
    /// Contract version for this schema format.
    pub schema_version: String,
    /// Optional model name, used in logs only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Entity types in declaration order.
    pub entities: Vec<EntityDef>,
}

/// An entity type with its field table and key metadata.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct EntityDef {
    pub name: String,
    pub fields: Vec<FieldDef>,
    /// Ordered primary key fields. Empty for key-less value objects.
    #[serde(default)]
    pub primary_key: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub foreign_keys: Vec<ForeignKeyDef>,
    /// Single-valued navigation references to other entity types.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<ReferenceDef>,
}

/// A field registered on an entity type.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FieldDef {
    pub name: String,
    pub kind: FieldKind,
    /// Read-only fields are never written by the seeder or fabricator.
    #[serde(default = "default_writable")]
    pub writable: bool,
    #[serde(default)]
    pub nullable: bool,
}

/// Foreign key definition preserving column ordering.
///
/// Columns map positionally onto the principal's primary key.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ForeignKeyDef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub columns: Vec<String>,
    pub principal: String,
}

/// Navigation from a dependent entity to a principal object.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ReferenceDef {
    pub name: String,
    pub target: String,
}

fn default_writable() -> bool {
    true
}

impl SchemaModel {
    pub fn from_json_str(input: &str) -> Result<Self> {
        Ok(serde_json::from_str(input)?)
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    pub fn entity(&self, name: &str) -> Option<&EntityDef> {
        self.entities.iter().find(|entity| entity.name == name)
    }
}

impl EntityDef {
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// True when `name` is part of the primary key or any foreign key.
    pub fn is_key_field(&self, name: &str) -> bool {
        self.primary_key.iter().any(|column| column == name)
            || self
                .foreign_keys
                .iter()
                .any(|fk| fk.columns.iter().any(|column| column == name))
    }
}
