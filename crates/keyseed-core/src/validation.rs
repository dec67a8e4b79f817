use std::collections::{BTreeMap, BTreeSet};

use crate::error::{Error, Result};
use crate::SCHEMA_VERSION;
use crate::schema::SchemaModel;

/// Validate internal consistency of a schema description.
///
/// This checks:
/// - the contract version
/// - duplicate entities/fields
/// - primary key fields exist
/// - foreign key fields and principals exist
/// - foreign key arity matches the principal's primary key
pub fn validate_schema(schema: &SchemaModel) -> Result<()> {
    if schema.schema_version != SCHEMA_VERSION {
        return Err(Error::InvalidSchema(format!(
            "unsupported schema_version {} (expected {SCHEMA_VERSION})",
            schema.schema_version
        )));
    }

    let mut catalog: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();

    for entity in &schema.entities {
        if catalog.contains_key(entity.name.as_str()) {
            return Err(Error::InvalidSchema(format!(
                "duplicate entity name: {}",
                entity.name
            )));
        }

        let mut fields = BTreeSet::new();
        for field in &entity.fields {
            if !fields.insert(field.name.as_str()) {
                return Err(Error::InvalidSchema(format!(
                    "duplicate field name: {}.{}",
                    entity.name, field.name
                )));
            }
        }

        catalog.insert(entity.name.as_str(), fields);
    }

    for entity in &schema.entities {
        let fields = catalog.get(entity.name.as_str()).ok_or_else(|| {
            Error::InvalidSchema(format!("missing entity in catalog: {}", entity.name))
        })?;

        for column in &entity.primary_key {
            if !fields.contains(column.as_str()) {
                return Err(Error::InvalidSchema(format!(
                    "primary key field not found: {}.{}",
                    entity.name, column
                )));
            }
        }

        for fk in &entity.foreign_keys {
            for column in &fk.columns {
                if !fields.contains(column.as_str()) {
                    return Err(Error::InvalidSchema(format!(
                        "foreign key field not found: {}.{}",
                        entity.name, column
                    )));
                }
            }

            let principal = schema.entity(&fk.principal).ok_or_else(|| {
                Error::InvalidSchema(format!(
                    "principal entity not found: {} (from {})",
                    fk.principal, entity.name
                ))
            })?;

            if principal.primary_key.len() != fk.columns.len() {
                return Err(Error::InvalidSchema(format!(
                    "foreign key {}.{:?} has {} fields but {} has a {}-field primary key",
                    entity.name,
                    fk.columns,
                    fk.columns.len(),
                    principal.name,
                    principal.primary_key.len()
                )));
            }
        }

        for reference in &entity.references {
            if schema.entity(&reference.target).is_none() {
                return Err(Error::InvalidSchema(format!(
                    "reference target not found: {}.{} -> {}",
                    entity.name, reference.name, reference.target
                )));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn schema(order_fk: serde_json::Value) -> SchemaModel {
        SchemaModel::from_value(json!({
            "schema_version": "0.1",
            "entities": [
                {
                    "name": "Customer",
                    "fields": [{"name": "Id", "kind": "integer"}],
                    "primary_key": ["Id"]
                },
                {
                    "name": "Order",
                    "fields": [
                        {"name": "Id", "kind": "integer"},
                        {"name": "CustomerId", "kind": "integer"},
                        {"name": "Region", "kind": "text"}
                    ],
                    "primary_key": ["Id"],
                    "foreign_keys": [order_fk]
                }
            ]
        }))
        .expect("schema")
    }

    #[test]
    fn accepts_consistent_schema() {
        let schema = schema(json!({"columns": ["CustomerId"], "principal": "Customer"}));
        validate_schema(&schema).expect("valid schema");
    }

    #[test]
    fn rejects_missing_principal() {
        let schema = schema(json!({"columns": ["CustomerId"], "principal": "Client"}));
        assert!(matches!(
            validate_schema(&schema),
            Err(Error::InvalidSchema(message)) if message.contains("Client")
        ));
    }

    #[test]
    fn rejects_foreign_key_arity_mismatch() {
        let schema = schema(json!({
            "columns": ["CustomerId", "Region"],
            "principal": "Customer"
        }));
        assert!(matches!(
            validate_schema(&schema),
            Err(Error::InvalidSchema(_))
        ));
    }

    #[test]
    fn rejects_unknown_schema_version() {
        let mut schema = schema(json!({"columns": ["CustomerId"], "principal": "Customer"}));
        schema.schema_version = "9.9".to_string();
        assert!(matches!(
            validate_schema(&schema),
            Err(Error::InvalidSchema(message)) if message.contains("schema_version")
        ));
    }
}
