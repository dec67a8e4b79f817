use std::sync::Arc;

use chrono::{Duration, NaiveTime};
use fake::Fake;
use fake::faker::address::en::{CityName, CountryName, StreetName};
use fake::faker::company::en::CompanyName;
use fake::faker::internet::en::SafeEmail;
use fake::faker::lorem::en::{Sentence, Word};
use fake::faker::name::en::{FirstName, LastName, Name};
use fake::faker::phone_number::en::PhoneNumber;
use keyseed_core::{Entity, EntityDef, FieldDef, FieldKind, MetadataProvider, SchemaModel, Value};
use rand::{Rng, RngCore};
use tracing::debug;

use crate::errors::GenerationError;
use crate::model::FabricatorOptions;
use crate::store::EntityStore;

/// Produces entity instances with plausible non-key values.
pub trait ValueFabricator: Send + Sync {
    /// A fresh instance of `entity_type`; key fields hold whatever the
    /// fabricator chose and are cleared by the seeder afterwards.
    fn fabricate(
        &self,
        entity_type: &str,
        rng: &mut dyn RngCore,
    ) -> Result<Entity, GenerationError>;

    /// Drop every navigation reference, returning how many were removed.
    fn strip_relationship_references(&self, entity: &mut Entity) -> usize {
        entity.clear_references()
    }

    /// Drop references to objects the store has not persisted.
    fn strip_unpersisted_relationship_references(
        &self,
        entity: &mut Entity,
        store: &dyn EntityStore,
    ) -> Result<usize, GenerationError>;
}

/// Schema-driven fabricator backed by the `fake` crate.
pub struct FakeFabricator {
    schema: Arc<SchemaModel>,
    options: FabricatorOptions,
}

impl FakeFabricator {
    pub fn new(schema: Arc<SchemaModel>, options: FabricatorOptions) -> Result<Self, GenerationError> {
        options.validate()?;
        Ok(Self { schema, options })
    }

    pub fn options(&self) -> &FabricatorOptions {
        &self.options
    }

    fn fake_value(&self, field: &FieldDef, rng: &mut dyn RngCore) -> Value {
        if field.nullable && self.options.null_rate > 0.0 && rng.random_bool(self.options.null_rate) {
            return Value::Null;
        }
        let base_date = self.options.base_date;
        match field.kind {
            FieldKind::Integer => Value::Int(rng.random_range(1..=100000)),
            FieldKind::BigInteger => Value::BigInt(rng.random_range(1..=1_000_000)),
            FieldKind::Float => {
                let value: f64 = rng.random_range(0.0..=100000.0);
                Value::Float((value * 100.0).round() / 100.0)
            }
            FieldKind::Boolean => Value::Bool(rng.random_bool(0.5)),
            FieldKind::Uuid => Value::Uuid(random_uuid(rng)),
            FieldKind::Date => {
                let offset = rng.random_range(0..=365);
                Value::Date(base_date + Duration::days(offset))
            }
            FieldKind::Timestamp => {
                let offset = rng.random_range(0..=365);
                let seconds = rng.random_range(0..86400);
                let time = NaiveTime::from_num_seconds_from_midnight_opt(seconds, 0)
                    .unwrap_or_default();
                let date = base_date + Duration::days(offset);
                Value::Timestamp(date.and_time(time).and_utc())
            }
            FieldKind::Text => Value::Text(fake_text(&field.name, rng)),
        }
    }
}

impl ValueFabricator for FakeFabricator {
    fn fabricate(
        &self,
        entity_type: &str,
        rng: &mut dyn RngCore,
    ) -> Result<Entity, GenerationError> {
        let def = self
            .schema
            .entity(entity_type)
            .ok_or_else(|| GenerationError::UnknownEntityType(entity_type.to_string()))?;

        let mut entity = Entity::from_def(def);
        for field in fillable_fields(def) {
            let value = self.fake_value(field, rng);
            entity.set(&field.name, value)?;
        }
        Ok(entity)
    }

    fn strip_unpersisted_relationship_references(
        &self,
        entity: &mut Entity,
        store: &dyn EntityStore,
    ) -> Result<usize, GenerationError> {
        let mut unpersisted = Vec::new();
        for (name, target) in entity.references() {
            let persisted = match self.schema.metadata_for(target.entity_type()) {
                Ok(metadata) => {
                    let extract = self.schema.composite_key_extractor(
                        target.entity_type(),
                        &metadata.primary_key_property_names,
                    );
                    match extract(target) {
                        Some(key) => store.contains_key(target.entity_type(), &extract, &key)?,
                        None => false,
                    }
                }
                Err(_) => false,
            };
            if !persisted {
                unpersisted.push(name.to_string());
            }
        }

        for name in &unpersisted {
            entity.clear_reference(name);
            debug!(
                entity_type = entity.entity_type(),
                reference = name.as_str(),
                "stripped reference to unpersisted object"
            );
        }
        Ok(unpersisted.len())
    }
}

fn fillable_fields(def: &EntityDef) -> impl Iterator<Item = &FieldDef> {
    def.fields
        .iter()
        .filter(move |field| field.writable && !def.is_key_field(&field.name))
}

/// Pick a faker by field-name hint; anything unrecognized gets a lorem word.
fn fake_text(field_name: &str, rng: &mut dyn RngCore) -> String {
    let hint = field_name.to_ascii_lowercase().replace(['_', '-'], "");
    if hint.contains("email") {
        SafeEmail().fake_with_rng(rng)
    } else if hint.contains("firstname") {
        FirstName().fake_with_rng(rng)
    } else if hint.contains("lastname") || hint.contains("surname") {
        LastName().fake_with_rng(rng)
    } else if hint.contains("city") {
        CityName().fake_with_rng(rng)
    } else if hint.contains("company") {
        CompanyName().fake_with_rng(rng)
    } else if hint.contains("country") {
        CountryName().fake_with_rng(rng)
    } else if hint.contains("street") || hint.contains("address") {
        StreetName().fake_with_rng(rng)
    } else if hint.contains("phone") {
        PhoneNumber().fake_with_rng(rng)
    } else if hint.contains("name") {
        Name().fake_with_rng(rng)
    } else if ["title", "description", "note", "comment"]
        .iter()
        .any(|word| hint.contains(word))
    {
        Sentence(3..8).fake_with_rng(rng)
    } else {
        Word().fake_with_rng(rng)
    }
}

fn random_uuid(rng: &mut dyn RngCore) -> uuid::Uuid {
    let mut bytes = [0_u8; 16];
    rng.fill_bytes(&mut bytes);
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;
    uuid::Uuid::from_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use serde_json::json;

    use super::*;
    use crate::store::InMemoryStore;

    fn schema() -> Arc<SchemaModel> {
        Arc::new(
            SchemaModel::from_value(json!({
                "schema_version": "0.1",
                "entities": [
                    {
                        "name": "Customer",
                        "fields": [
                            {"name": "Id", "kind": "integer"},
                            {"name": "Email", "kind": "text"},
                            {"name": "FirstName", "kind": "text"},
                            {"name": "Active", "kind": "boolean"},
                            {"name": "Code", "kind": "text", "writable": false},
                            {"name": "Nickname", "kind": "text", "nullable": true}
                        ],
                        "primary_key": ["Id"]
                    },
                    {
                        "name": "Order",
                        "fields": [
                            {"name": "Id", "kind": "integer"},
                            {"name": "CustomerId", "kind": "integer"},
                            {"name": "PlacedOn", "kind": "date"},
                            {"name": "Token", "kind": "uuid"}
                        ],
                        "primary_key": ["Id"],
                        "foreign_keys": [{"columns": ["CustomerId"], "principal": "Customer"}],
                        "references": [{"name": "Customer", "target": "Customer"}]
                    }
                ]
            }))
            .expect("schema"),
        )
    }

    #[test]
    fn fabricate_fills_non_key_fields_only() {
        let fabricator = FakeFabricator::new(schema(), FabricatorOptions::default()).expect("fabricator");
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let order = fabricator.fabricate("Order", &mut rng).expect("order");

        assert_eq!(order.get("Id"), Some(&Value::Int(0)));
        assert_eq!(order.get("CustomerId"), Some(&Value::Int(0)));
        let Some(Value::Date(placed_on)) = order.get("PlacedOn") else {
            panic!("expected date");
        };
        let base = fabricator.options().base_date;
        assert!(*placed_on >= base && *placed_on <= base + Duration::days(365));
        assert!(matches!(order.get("Token"), Some(Value::Uuid(token)) if token.get_version_num() == 4));
        assert_eq!(order.references().count(), 0);
    }

    #[test]
    fn text_fields_follow_name_hints() {
        let fabricator = FakeFabricator::new(schema(), FabricatorOptions::default()).expect("fabricator");
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let customer = fabricator.fabricate("Customer", &mut rng).expect("customer");

        let email = customer.get("Email").and_then(Value::as_str).expect("email");
        assert!(email.contains('@'));
        let first = customer.get("FirstName").and_then(Value::as_str).expect("first name");
        assert!(!first.is_empty());
        assert_eq!(customer.get("Code"), Some(&Value::Text(String::new())));
    }

    #[test]
    fn same_seed_gives_same_values() {
        let fabricator = FakeFabricator::new(schema(), FabricatorOptions::default()).expect("fabricator");
        let mut left = ChaCha8Rng::seed_from_u64(99);
        let mut right = ChaCha8Rng::seed_from_u64(99);
        assert_eq!(
            fabricator.fabricate("Customer", &mut left).expect("left"),
            fabricator.fabricate("Customer", &mut right).expect("right")
        );
    }

    #[test]
    fn null_rate_one_nulls_nullable_fields() {
        let options = FabricatorOptions {
            null_rate: 1.0,
            ..FabricatorOptions::default()
        };
        let fabricator = FakeFabricator::new(schema(), options).expect("fabricator");
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let customer = fabricator.fabricate("Customer", &mut rng).expect("customer");
        assert_eq!(customer.get("Nickname"), Some(&Value::Null));
        assert!(!customer.get("Email").expect("email").is_null());
    }

    #[test]
    fn unknown_entity_type_is_an_error() {
        let fabricator = FakeFabricator::new(schema(), FabricatorOptions::default()).expect("fabricator");
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert!(matches!(
            fabricator.fabricate("Invoice", &mut rng),
            Err(GenerationError::UnknownEntityType(name)) if name == "Invoice"
        ));
    }

    #[test]
    fn strips_only_unpersisted_references() {
        let schema = schema();
        let fabricator = FakeFabricator::new(schema.clone(), FabricatorOptions::default()).expect("fabricator");
        let store = InMemoryStore::new(schema.clone());
        let mut rng = ChaCha8Rng::seed_from_u64(8);

        let mut persisted = fabricator.fabricate("Customer", &mut rng).expect("customer");
        persisted.set("Id", Value::Int(1)).expect("id");
        store.add(persisted.clone()).expect("add");
        store.commit().expect("commit");

        let mut order = fabricator.fabricate("Order", &mut rng).expect("order");
        order.set_reference("Customer", persisted);
        assert_eq!(
            fabricator
                .strip_unpersisted_relationship_references(&mut order, &store)
                .expect("strip"),
            0
        );

        let mut fresh = fabricator.fabricate("Customer", &mut rng).expect("customer");
        fresh.set("Id", Value::Int(2)).expect("id");
        order.set_reference("Customer", fresh);
        assert_eq!(
            fabricator
                .strip_unpersisted_relationship_references(&mut order, &store)
                .expect("strip"),
            1
        );
        assert!(order.reference("Customer").is_none());
    }

    #[test]
    fn rejects_invalid_null_rate() {
        let options = FabricatorOptions {
            null_rate: -0.1,
            ..FabricatorOptions::default()
        };
        assert!(matches!(
            FakeFabricator::new(schema(), options),
            Err(GenerationError::InvalidOptions(_))
        ));
    }
}
