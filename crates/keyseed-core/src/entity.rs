use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::schema::EntityDef;
use crate::types::{FieldKind, KeyTuple, Value};

/// A field slot registered on an entity instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub kind: FieldKind,
    pub writable: bool,
    pub value: Value,
}

/// In-memory record of one entity type.
///
/// The set of fields is fixed when the record is built from its
/// [`EntityDef`]; writes to unregistered or read-only fields fail with
/// [`Error::FieldAccess`] instead of growing the record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    entity_type: String,
    fields: BTreeMap<String, Field>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    references: BTreeMap<String, Box<Entity>>,
}

impl Entity {
    pub fn new(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            fields: BTreeMap::new(),
            references: BTreeMap::new(),
        }
    }

    /// Build a record with every registered field at its type default.
    pub fn from_def(def: &EntityDef) -> Self {
        let mut entity = Self::new(def.name.clone());
        for field in &def.fields {
            entity.register_field(&field.name, field.kind, field.writable);
        }
        entity
    }

    /// Register a field slot holding its type default.
    pub fn register_field(&mut self, name: &str, kind: FieldKind, writable: bool) {
        self.fields.insert(
            name.to_string(),
            Field {
                kind,
                writable,
                value: Value::default_for(kind),
            },
        );
    }

    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name).map(|field| &field.value)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Field)> {
        self.fields.iter().map(|(name, field)| (name.as_str(), field))
    }

    pub fn set(&mut self, name: &str, value: Value) -> Result<()> {
        let field = self
            .fields
            .get_mut(name)
            .ok_or_else(|| Error::field_access(&self.entity_type, name, "unknown field"))?;
        if !field.writable {
            return Err(Error::field_access(&self.entity_type, name, "read-only"));
        }
        if !value.fits(field.kind) {
            return Err(Error::field_access(
                &self.entity_type,
                name,
                format!("value {value} does not fit {:?}", field.kind),
            ));
        }
        field.value = value;
        Ok(())
    }

    /// Reset a field to its type default.
    pub fn reset(&mut self, name: &str) -> Result<()> {
        let kind = self
            .fields
            .get(name)
            .map(|field| field.kind)
            .ok_or_else(|| Error::field_access(&self.entity_type, name, "unknown field"))?;
        self.set(name, Value::default_for(kind))
    }

    /// Values of `names` in order, or `None` if any field is missing.
    pub fn key_tuple(&self, names: &[String]) -> Option<KeyTuple> {
        names
            .iter()
            .map(|name| self.get(name).cloned())
            .collect()
    }

    pub fn reference(&self, name: &str) -> Option<&Entity> {
        self.references.get(name).map(Box::as_ref)
    }

    pub fn references(&self) -> impl Iterator<Item = (&str, &Entity)> {
        self.references
            .iter()
            .map(|(name, entity)| (name.as_str(), entity.as_ref()))
    }

    pub fn set_reference(&mut self, name: &str, entity: Entity) {
        self.references.insert(name.to_string(), Box::new(entity));
    }

    pub fn clear_reference(&mut self, name: &str) -> Option<Entity> {
        self.references.remove(name).map(|entity| *entity)
    }

    /// Drop every navigation reference, returning how many were set.
    pub fn clear_references(&mut self) -> usize {
        let cleared = self.references.len();
        self.references.clear();
        cleared
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn customer() -> Entity {
        let mut entity = Entity::new("Customer");
        entity.register_field("Id", FieldKind::Integer, true);
        entity.register_field("Code", FieldKind::Text, false);
        entity
    }

    #[test]
    fn registered_fields_start_at_default() {
        let entity = customer();
        assert_eq!(entity.get("Id"), Some(&Value::Int(0)));
        assert_eq!(entity.get("Code"), Some(&Value::Text(String::new())));
        assert!(entity.get("Missing").is_none());
    }

    #[test]
    fn set_rejects_unknown_read_only_and_mismatched_fields() {
        let mut entity = customer();
        assert!(matches!(
            entity.set("Missing", Value::Int(1)),
            Err(Error::FieldAccess { .. })
        ));
        assert!(matches!(
            entity.set("Code", Value::Text("x".to_string())),
            Err(Error::FieldAccess { .. })
        ));
        assert!(matches!(
            entity.set("Id", Value::BigInt(1)),
            Err(Error::FieldAccess { .. })
        ));
        entity.set("Id", Value::Int(9)).expect("writable field");
        assert_eq!(entity.get("Id"), Some(&Value::Int(9)));
    }

    #[test]
    fn key_tuple_preserves_order_and_fails_on_missing_fields() {
        let mut entity = customer();
        entity.set("Id", Value::Int(3)).expect("set id");
        let tuple = entity
            .key_tuple(&["Id".to_string(), "Code".to_string()])
            .expect("tuple");
        assert_eq!(tuple, vec![Value::Int(3), Value::Text(String::new())]);
        assert!(entity.key_tuple(&["Nope".to_string()]).is_none());
    }

    #[test]
    fn references_can_be_set_and_cleared() {
        let mut order = Entity::new("Order");
        order.set_reference("Customer", customer());
        assert!(order.reference("Customer").is_some());
        assert_eq!(order.clear_references(), 1);
        assert!(order.reference("Customer").is_none());
    }
}
