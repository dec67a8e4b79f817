use crate::entity::Entity;
use crate::error::{Error, Result};
use crate::schema::SchemaModel;
use crate::types::KeyTuple;

/// One relationship from a dependent entity to its principal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyGroup {
    /// Dependent fields, matched positionally to the principal's primary key.
    pub foreign_key_property_names: Vec<String>,
    pub principal_entity_type: String,
}

/// Key metadata for one entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityMetadata {
    pub entity_type: String,
    /// Ordered; order is significant for composite key comparisons.
    pub primary_key_property_names: Vec<String>,
    pub foreign_key_groups: Vec<ForeignKeyGroup>,
}

impl EntityMetadata {
    pub fn foreign_key_property_names(&self) -> impl Iterator<Item = &String> {
        self.foreign_key_groups
            .iter()
            .flat_map(|group| group.foreign_key_property_names.iter())
    }

    pub fn is_foreign_key_property(&self, name: &str) -> bool {
        self.foreign_key_property_names().any(|fk| fk == name)
    }

    /// True when some primary key field is also filled by foreign key resolution.
    pub fn primary_key_overlaps_foreign_keys(&self) -> bool {
        self.primary_key_property_names
            .iter()
            .any(|name| self.is_foreign_key_property(name))
    }
}

/// Extracts an ordered key tuple from an entity instance.
pub type KeyExtractor = Box<dyn Fn(&Entity) -> Option<KeyTuple> + Send + Sync>;

/// Supplies key metadata for entity types.
pub trait MetadataProvider: Send + Sync {
    /// Key metadata for `entity_type`, or [`Error::MetadataNotFound`] when the
    /// type is unknown or has no primary key.
    fn metadata_for(&self, entity_type: &str) -> Result<EntityMetadata>;

    fn composite_key_extractor(
        &self,
        _entity_type: &str,
        key_property_names: &[String],
    ) -> KeyExtractor {
        let names = key_property_names.to_vec();
        Box::new(move |entity: &Entity| entity.key_tuple(&names))
    }
}

impl MetadataProvider for SchemaModel {
    fn metadata_for(&self, entity_type: &str) -> Result<EntityMetadata> {
        let def = self
            .entity(entity_type)
            .filter(|def| !def.primary_key.is_empty())
            .ok_or_else(|| Error::MetadataNotFound(entity_type.to_string()))?;

        Ok(EntityMetadata {
            entity_type: def.name.clone(),
            primary_key_property_names: def.primary_key.clone(),
            foreign_key_groups: def
                .foreign_keys
                .iter()
                .map(|fk| ForeignKeyGroup {
                    foreign_key_property_names: fk.columns.clone(),
                    principal_entity_type: fk.principal.clone(),
                })
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::types::Value;

    fn schema() -> SchemaModel {
        SchemaModel::from_value(json!({
            "schema_version": "0.1",
            "entities": [
                {
                    "name": "Customer",
                    "fields": [{"name": "Id", "kind": "integer"}],
                    "primary_key": ["Id"]
                },
                {
                    "name": "OrderLine",
                    "fields": [
                        {"name": "OrderId", "kind": "integer"},
                        {"name": "LineNo", "kind": "integer"},
                        {"name": "CustomerId", "kind": "integer"}
                    ],
                    "primary_key": ["OrderId", "LineNo"],
                    "foreign_keys": [
                        {"columns": ["CustomerId"], "principal": "Customer"},
                        {"columns": ["OrderId"], "principal": "Order"}
                    ]
                },
                {
                    "name": "Note",
                    "fields": [{"name": "Body", "kind": "text"}]
                }
            ]
        }))
        .expect("schema")
    }

    #[test]
    fn metadata_lists_keys_in_declaration_order() {
        let metadata = schema().metadata_for("OrderLine").expect("metadata");
        assert_eq!(metadata.primary_key_property_names, vec!["OrderId", "LineNo"]);
        assert_eq!(metadata.foreign_key_groups.len(), 2);
        assert_eq!(metadata.foreign_key_groups[1].principal_entity_type, "Order");
        assert!(metadata.primary_key_overlaps_foreign_keys());
        assert!(metadata.is_foreign_key_property("CustomerId"));
    }

    #[test]
    fn unknown_and_keyless_types_have_no_metadata() {
        let schema = schema();
        assert!(matches!(
            schema.metadata_for("Missing"),
            Err(Error::MetadataNotFound(name)) if name == "Missing"
        ));
        assert!(matches!(
            schema.metadata_for("Note"),
            Err(Error::MetadataNotFound(_))
        ));
    }

    #[test]
    fn composite_extractor_reads_tuple_in_order() {
        let schema = schema();
        let def = schema.entity("OrderLine").expect("def");
        let mut line = Entity::from_def(def);
        line.set("OrderId", Value::Int(4)).expect("set");
        line.set("LineNo", Value::Int(2)).expect("set");

        let names = vec!["LineNo".to_string(), "OrderId".to_string()];
        let extract = schema.composite_key_extractor("OrderLine", &names);
        assert_eq!(extract(&line), Some(vec![Value::Int(2), Value::Int(4)]));
    }
}
