use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use keyseed_core::{Entity, MetadataProvider, SchemaModel, build_dependency_report, validate_schema};
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{info, warn};

use crate::counters::KeyCounterStore;
use crate::equality::KeyEqualityCache;
use crate::errors::GenerationError;
use crate::fabricate::{FakeFabricator, ValueFabricator};
use crate::model::{FabricatorOptions, GenerationReport, KeyFetchOverride, KeyseedConfig, SeederOptions};
use crate::seeder::{GenerationContext, KeySeeder, MAX_RECURSION_DEPTH, SeedResources};
use crate::store::{EntityStore, InMemoryStore};

/// Result of one `generate` call.
#[derive(Debug, Clone)]
pub struct GenerationResult {
    /// Persisted instances in creation order.
    pub entities: Vec<Entity>,
    pub report: GenerationReport,
}

/// Entry point for fabricating persisted, key-consistent entity instances.
///
/// The engine is `Send + Sync`; concurrent calls share the counter store and
/// equality cache but get no isolation from each other in the store.
pub struct GenerationEngine {
    metadata: Arc<dyn MetadataProvider>,
    fabricator: Arc<dyn ValueFabricator>,
    store: Arc<dyn EntityStore>,
    counters: Arc<KeyCounterStore>,
    equality: Arc<KeyEqualityCache>,
    options: SeederOptions,
    key_fetch: Option<KeyFetchOverride>,
    rng: Mutex<ChaCha8Rng>,
}

impl GenerationEngine {
    pub fn new(
        metadata: Arc<dyn MetadataProvider>,
        fabricator: Arc<dyn ValueFabricator>,
        store: Arc<dyn EntityStore>,
        options: SeederOptions,
    ) -> Result<Self, GenerationError> {
        options.validate()?;
        let rng = match options.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_rng(&mut rand::rng()),
        };
        Ok(Self {
            metadata,
            fabricator,
            store,
            counters: Arc::new(KeyCounterStore::new()),
            equality: Arc::new(KeyEqualityCache::new()),
            options,
            key_fetch: None,
            rng: Mutex::new(rng),
        })
    }

    /// Engine over a validated schema with the fake fabricator and an
    /// in-memory store.
    pub fn from_schema(schema: SchemaModel, options: SeederOptions) -> Result<Self, GenerationError> {
        Self::from_schema_parts(schema, options, FabricatorOptions::default())
    }

    pub fn from_config(schema: SchemaModel, config: &KeyseedConfig) -> Result<Self, GenerationError> {
        Self::from_schema_parts(schema, config.seeder.clone(), config.fabricator.clone())
    }

    fn from_schema_parts(
        schema: SchemaModel,
        options: SeederOptions,
        fabricator_options: FabricatorOptions,
    ) -> Result<Self, GenerationError> {
        validate_schema(&schema)?;
        let report = build_dependency_report(&schema);
        if let Some(cycle) = &report.cycle {
            warn!(
                entities = ?cycle,
                "schema has a foreign key cycle; generation may hit the recursion limit"
            );
        }
        if let Some(chain) = report.longest_chain.filter(|chain| *chain > MAX_RECURSION_DEPTH as usize) {
            warn!(
                longest_chain = chain,
                limit = MAX_RECURSION_DEPTH,
                "foreign key chain longer than recursion limit"
            );
        }

        let schema = Arc::new(schema);
        let fabricator = FakeFabricator::new(Arc::clone(&schema), fabricator_options)?;
        let store = InMemoryStore::new(schema.clone());
        Self::new(schema, Arc::new(fabricator), Arc::new(store), options)
    }

    /// Share a counter store with other engines.
    pub fn with_counters(mut self, counters: Arc<KeyCounterStore>) -> Self {
        self.counters = counters;
        self
    }

    pub fn with_store(mut self, store: Arc<dyn EntityStore>) -> Self {
        self.store = store;
        self
    }

    /// Consult `key_fetch` before the counter store for every issued key.
    pub fn with_key_fetch(mut self, key_fetch: KeyFetchOverride) -> Self {
        self.key_fetch = Some(key_fetch);
        self
    }

    pub fn store(&self) -> &Arc<dyn EntityStore> {
        &self.store
    }

    pub fn counters(&self) -> &Arc<KeyCounterStore> {
        &self.counters
    }

    pub fn options(&self) -> &SeederOptions {
        &self.options
    }

    pub fn generate(&self, entity_type: &str, quantity: usize) -> Result<GenerationResult, GenerationError> {
        self.generate_with(entity_type, quantity, |_| {})
    }

    /// Generate `quantity` instances, calling `customize` on each one after
    /// its keys are cleared and before keys are assigned.
    ///
    /// Key groups the customization fully sets are kept; partially set
    /// groups are regenerated.
    pub fn generate_with<F>(
        &self,
        entity_type: &str,
        quantity: usize,
        mut customize: F,
    ) -> Result<GenerationResult, GenerationError>
    where
        F: FnMut(&mut Entity),
    {
        let (entities, report) = self.instrumented(
            entity_type,
            quantity,
            |seeder| {
                let mut entities = Vec::with_capacity(quantity);
                for _ in 0..quantity {
                    entities.push(materialize_one(seeder, entity_type, &mut customize)?);
                }
                Ok(entities)
            },
            Vec::len,
        )?;
        Ok(GenerationResult { entities, report })
    }

    pub fn generate_one(&self, entity_type: &str) -> Result<Entity, GenerationError> {
        let (entity, _) = self.instrumented(
            entity_type,
            1,
            |seeder| materialize_one(seeder, entity_type, &mut |_| {}),
            |_| 1,
        )?;
        Ok(entity)
    }

    /// Runs `run` with a seeder over a fresh call stream, logging the start
    /// and outcome and filling the report's timing and generated count.
    fn instrumented<T>(
        &self,
        entity_type: &str,
        quantity: usize,
        run: impl FnOnce(&mut KeySeeder<'_>) -> Result<T, GenerationError>,
        generated: fn(&T) -> usize,
    ) -> Result<(T, GenerationReport), GenerationError> {
        let start = Instant::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        let mut report = GenerationReport::new(run_id.clone(), entity_type, quantity as u64);

        info!(
            run_id = %run_id,
            entity_type,
            quantity,
            "generation started"
        );

        let mut rng = self.call_rng();
        let resources = SeedResources {
            metadata: self.metadata.as_ref(),
            fabricator: self.fabricator.as_ref(),
            store: self.store.as_ref(),
            counters: self.counters.as_ref(),
            equality: self.equality.as_ref(),
            key_fetch: self.key_fetch.as_ref(),
        };
        let outcome = {
            let mut seeder = KeySeeder::new(resources, &self.options, &mut rng, &mut report);
            run(&mut seeder)
        };
        report.duration_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(value) => {
                report.generated = generated(&value) as u64;
                info!(
                    run_id = %run_id,
                    entity_type,
                    generated = report.generated,
                    principals_created = report.principals_created,
                    principals_reused = report.principals_reused,
                    retries = report.primary_key_retries,
                    duration_ms = report.duration_ms,
                    "generation completed"
                );
                Ok((value, report))
            }
            Err(err) => {
                warn!(run_id = %run_id, entity_type, error = %err, "generation failed");
                Err(err)
            }
        }
    }

    /// Per-call stream drawn from the engine's seeded stream.
    fn call_rng(&self) -> ChaCha8Rng {
        let seed = self
            .rng
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .next_u64();
        ChaCha8Rng::seed_from_u64(seed)
    }
}

/// Prepares, customizes, keys and persists one top-level instance.
fn materialize_one(
    seeder: &mut KeySeeder<'_>,
    entity_type: &str,
    customize: &mut dyn FnMut(&mut Entity),
) -> Result<Entity, GenerationError> {
    let mut entity = seeder.prepare(entity_type)?;
    customize(&mut entity);
    let primary_keys_set = seeder.all_primary_keys_set(&entity);
    let foreign_keys_set = seeder.all_foreign_keys_set(&entity);
    seeder.assign_keys(
        &mut entity,
        GenerationContext::root(),
        primary_keys_set,
        foreign_keys_set,
    )?;
    seeder.persist(&mut entity)?;
    Ok(entity)
}

#[cfg(test)]
mod tests {
    use keyseed_core::Value;
    use serde_json::json;

    use super::*;

    fn schema() -> SchemaModel {
        SchemaModel::from_value(json!({
            "schema_version": "0.1",
            "entities": [
                {
                    "name": "Customer",
                    "fields": [
                        {"name": "Id", "kind": "integer"},
                        {"name": "Name", "kind": "text"}
                    ],
                    "primary_key": ["Id"]
                },
                {
                    "name": "Order",
                    "fields": [
                        {"name": "Id", "kind": "integer"},
                        {"name": "CustomerId", "kind": "integer"}
                    ],
                    "primary_key": ["Id"],
                    "foreign_keys": [{"columns": ["CustomerId"], "principal": "Customer"}]
                }
            ]
        }))
        .expect("schema")
    }

    #[test]
    fn rejects_invalid_options() {
        let options = SeederOptions {
            existing_reference_chance: 2.0,
            ..SeederOptions::default()
        };
        assert!(matches!(
            GenerationEngine::from_schema(schema(), options),
            Err(GenerationError::InvalidOptions(_))
        ));
    }

    #[test]
    fn rejects_invalid_schema() {
        let mut schema = schema();
        schema.entities[1].foreign_keys[0].principal = "Missing".to_string();
        assert!(matches!(
            GenerationEngine::from_schema(schema, SeederOptions::default()),
            Err(GenerationError::Core(_))
        ));
    }

    #[test]
    fn report_counts_generated_and_principals() {
        let options = SeederOptions {
            existing_reference_chance: 0.0,
            seed: Some(1),
            ..SeederOptions::default()
        };
        let engine = GenerationEngine::from_schema(schema(), options).expect("engine");
        let result = engine.generate("Order", 4).expect("generate");
        assert_eq!(result.entities.len(), 4);
        assert_eq!(result.report.requested, 4);
        assert_eq!(result.report.generated, 4);
        assert_eq!(result.report.principals_created, 4);
        assert_eq!(result.report.principals_reused, 0);
        assert_eq!(result.report.max_depth, 1);
    }

    #[test]
    fn generate_one_persists_a_single_instance() {
        let engine = GenerationEngine::from_schema(schema(), SeederOptions::default()).expect("engine");
        let customer = engine.generate_one("Customer").expect("customer");
        assert_eq!(customer.get("Id"), Some(&Value::Int(1)));
        assert_eq!(engine.store().query("Customer").expect("query").len(), 1);
    }

    #[test]
    fn unknown_entity_type_fails() {
        let engine = GenerationEngine::from_schema(schema(), SeederOptions::default()).expect("engine");
        assert!(matches!(
            engine.generate("Invoice", 1),
            Err(GenerationError::UnknownEntityType(_))
        ));
        assert!(matches!(
            engine.generate_one("Invoice"),
            Err(GenerationError::UnknownEntityType(_))
        ));
    }

    #[test]
    fn generate_one_retries_past_a_reset_counter() {
        let engine = GenerationEngine::from_schema(schema(), SeederOptions::default()).expect("engine");
        engine.generate_one("Customer").expect("first");
        engine.counters().reset();
        assert!(matches!(
            engine.generate_one("Customer"),
            Ok(ref customer) if customer.get("Id") == Some(&Value::Int(2))
        ));
        assert_eq!(engine.store().query("Customer").expect("query").len(), 2);
    }

    #[test]
    fn seeded_engines_produce_identical_values() {
        let options = SeederOptions {
            seed: Some(42),
            ..SeederOptions::default()
        };
        let left = GenerationEngine::from_schema(schema(), options.clone()).expect("left");
        let right = GenerationEngine::from_schema(schema(), options).expect("right");
        let left = left.generate("Order", 5).expect("left run").entities;
        let right = right.generate("Order", 5).expect("right run").entities;
        assert_eq!(left, right);
    }
}
