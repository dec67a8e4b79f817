use std::sync::Arc;

use keyseed_core::{Entity, EntityMetadata, FieldKind, ForeignKeyGroup, KeyTuple, MetadataProvider, Value};
use rand::{Rng, RngCore};
use tracing::{debug, warn};

use crate::counters::KeyCounterStore;
use crate::equality::{KeyEqualityCache, KeyPredicate, KeyShape};
use crate::errors::{GenerationError, StoreError};
use crate::fabricate::ValueFabricator;
use crate::model::{GenerationReport, KeyFetchOverride, SeederOptions};
use crate::store::EntityStore;

/// Primary key tuples tried before giving up on an instance.
pub const MAX_KEY_ATTEMPTS: u32 = 1000;
/// Deepest level at which a principal may be fabricated; the top-level
/// instance is depth 0.
pub const MAX_RECURSION_DEPTH: u32 = 5;

/// Per top-level call state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GenerationContext {
    depth: u32,
}

impl GenerationContext {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Context for a principal fabricated on behalf of this level.
    pub fn descend(&self) -> Self {
        Self {
            depth: self.depth + 1,
        }
    }
}

/// Collaborators shared by every seeding step of one call.
#[derive(Clone, Copy)]
pub struct SeedResources<'a> {
    pub metadata: &'a dyn MetadataProvider,
    pub fabricator: &'a dyn ValueFabricator,
    pub store: &'a dyn EntityStore,
    pub counters: &'a KeyCounterStore,
    pub equality: &'a KeyEqualityCache,
    pub key_fetch: Option<&'a KeyFetchOverride>,
}

/// Assigns primary and foreign keys to entity instances.
pub struct KeySeeder<'a> {
    resources: SeedResources<'a>,
    options: &'a SeederOptions,
    rng: &'a mut dyn RngCore,
    report: &'a mut GenerationReport,
}

impl<'a> KeySeeder<'a> {
    pub fn new(
        resources: SeedResources<'a>,
        options: &'a SeederOptions,
        rng: &'a mut dyn RngCore,
        report: &'a mut GenerationReport,
    ) -> Self {
        Self {
            resources,
            options,
            rng,
            report,
        }
    }

    /// Fabricate an instance with references stripped and key fields cleared.
    pub fn prepare(&mut self, entity_type: &str) -> Result<Entity, GenerationError> {
        let mut entity = self.resources.fabricator.fabricate(entity_type, &mut *self.rng)?;
        self.resources
            .fabricator
            .strip_relationship_references(&mut entity);
        self.clear_key_properties(&mut entity);
        Ok(entity)
    }

    /// Reset every primary and foreign key field to its type default.
    pub fn clear_key_properties(&mut self, entity: &mut Entity) {
        let Some(metadata) = self.metadata(entity.entity_type()) else {
            return;
        };
        let names = metadata
            .primary_key_property_names
            .iter()
            .chain(metadata.foreign_key_property_names());
        for name in names {
            if let Err(err) = entity.reset(name) {
                debug!(
                    entity_type = entity.entity_type(),
                    field = name.as_str(),
                    error = %err,
                    "skipped key field while clearing"
                );
                self.report.record_skipped_field();
            }
        }
    }

    /// True when every writable primary key field holds a non-default value.
    pub fn all_primary_keys_set(&self, entity: &Entity) -> bool {
        match self.metadata(entity.entity_type()) {
            Some(metadata) => all_set(entity, &metadata.primary_key_property_names),
            None => true,
        }
    }

    /// True when every writable foreign key field holds a non-default value.
    pub fn all_foreign_keys_set(&self, entity: &Entity) -> bool {
        match self.metadata(entity.entity_type()) {
            Some(metadata) => {
                let names: Vec<String> = metadata.foreign_key_property_names().cloned().collect();
                all_set(entity, &names)
            }
            None => true,
        }
    }

    /// Assign primary keys, then foreign keys.
    pub fn assign_keys(
        &mut self,
        entity: &mut Entity,
        ctx: GenerationContext,
        all_primary_keys_set: bool,
        all_foreign_keys_set: bool,
    ) -> Result<(), GenerationError> {
        let Some(metadata) = self.metadata(entity.entity_type()) else {
            return Ok(());
        };
        if metadata.primary_key_overlaps_foreign_keys() {
            return self.assign_overlapping_keys(
                entity,
                &metadata,
                ctx,
                all_primary_keys_set,
                all_foreign_keys_set,
            );
        }
        self.assign_primary_keys(entity, all_primary_keys_set)?;
        self.assign_foreign_keys(entity, ctx, all_foreign_keys_set)
    }

    /// Give `entity` a primary key tuple no persisted instance holds.
    pub fn assign_primary_keys(
        &mut self,
        entity: &mut Entity,
        already_set: bool,
    ) -> Result<(), GenerationError> {
        if already_set {
            return Ok(());
        }
        let Some(metadata) = self.metadata(entity.entity_type()) else {
            return Ok(());
        };
        let fields = self.generated_key_fields(entity, &metadata);
        if metadata.primary_key_overlaps_foreign_keys() {
            // uniqueness is checked once the foreign key parts are resolved
            self.fill_key_fields(entity, &fields);
            return Ok(());
        }

        let names = &metadata.primary_key_property_names;
        let predicate = self.key_predicate(entity.entity_type(), names);
        let existing = self.resources.store.query(entity.entity_type())?;

        for attempt in 1..=MAX_KEY_ATTEMPTS {
            self.fill_key_fields(entity, &fields);
            let Some(key) = predicate.extract(entity) else {
                debug!(
                    entity_type = entity.entity_type(),
                    "primary key fields missing; uniqueness not checked"
                );
                return Ok(());
            };
            if !predicate.matches_any(&existing, &key) {
                self.report.record_retries(u64::from(attempt - 1));
                debug!(
                    entity_type = entity.entity_type(),
                    key = %render(&key),
                    attempt,
                    "assigned primary key"
                );
                return Ok(());
            }
        }

        warn!(
            entity_type = entity.entity_type(),
            attempts = MAX_KEY_ATTEMPTS,
            "primary key generation exhausted"
        );
        Err(GenerationError::UniqueKeyGenerationFailure {
            entity_type: entity.entity_type().to_string(),
            attempts: MAX_KEY_ATTEMPTS,
        })
    }

    /// Point every foreign key group at an existing or freshly fabricated principal.
    pub fn assign_foreign_keys(
        &mut self,
        entity: &mut Entity,
        ctx: GenerationContext,
        already_set: bool,
    ) -> Result<(), GenerationError> {
        if already_set {
            return Ok(());
        }
        let Some(metadata) = self.metadata(entity.entity_type()) else {
            return Ok(());
        };
        for group in &metadata.foreign_key_groups {
            self.assign_foreign_key_group(entity, group, ctx)?;
        }
        Ok(())
    }

    /// Stage and commit `entity` as one store operation.
    ///
    /// Fails with [`StoreError::NotWritten`] when the store reports that
    /// nothing was written.
    pub fn persist(&mut self, entity: &mut Entity) -> Result<(), GenerationError> {
        let store = self.resources.store;
        self.resources
            .fabricator
            .strip_unpersisted_relationship_references(entity, store)?;
        let written = store.add_and_commit(entity.clone())?;
        if written == 0 {
            warn!(entity_type = entity.entity_type(), "store wrote no rows");
            return Err(StoreError::NotWritten {
                entity_type: entity.entity_type().to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Memoized key predicate reading tuples through the provider's extractor.
    fn key_predicate(&self, entity_type: &str, names: &[String]) -> Arc<KeyPredicate> {
        let metadata = self.resources.metadata;
        self.resources.equality.compile(
            entity_type,
            names,
            KeyShape::for_arity(names.len()),
            || metadata.composite_key_extractor(entity_type, names),
        )
    }

    fn metadata(&self, entity_type: &str) -> Option<EntityMetadata> {
        match self.resources.metadata.metadata_for(entity_type) {
            Ok(metadata) => Some(metadata),
            Err(err) => {
                debug!(entity_type, error = %err, "no key metadata; keys left as-is");
                None
            }
        }
    }

    fn assign_foreign_key_group(
        &mut self,
        entity: &mut Entity,
        group: &ForeignKeyGroup,
        ctx: GenerationContext,
    ) -> Result<(), GenerationError> {
        let principal_type = group.principal_entity_type.as_str();
        let Some(principal) = self.metadata(principal_type) else {
            return Ok(());
        };
        let Some(key) = self.resolve_principal(&principal, ctx)? else {
            debug!(
                entity_type = entity.entity_type(),
                principal = principal_type,
                "principal has no readable key; foreign key left as-is"
            );
            return Ok(());
        };

        for (name, value) in group.foreign_key_property_names.iter().zip(key) {
            if let Err(err) = entity.set(name, value) {
                debug!(
                    entity_type = entity.entity_type(),
                    field = name.as_str(),
                    error = %err,
                    "skipped foreign key field"
                );
                self.report.record_skipped_field();
            }
        }
        Ok(())
    }

    /// Primary key tuple of the principal a foreign key group should point at.
    fn resolve_principal(
        &mut self,
        principal: &EntityMetadata,
        ctx: GenerationContext,
    ) -> Result<Option<KeyTuple>, GenerationError> {
        let predicate = self.key_predicate(
            &principal.entity_type,
            &principal.primary_key_property_names,
        );
        let candidates: Vec<KeyTuple> = if self.options.allow_existing_foreign_keys {
            self.resources
                .store
                .query(&principal.entity_type)?
                .iter()
                .filter_map(|existing| predicate.extract(existing))
                .collect()
        } else {
            Vec::new()
        };

        if !candidates.is_empty() {
            let roll: f64 = self.rng.random();
            if roll < self.options.existing_reference_chance {
                let index = self.rng.random_range(0..candidates.len());
                self.report.record_principal_reused();
                debug!(
                    principal = principal.entity_type.as_str(),
                    candidates = candidates.len(),
                    "reused existing principal"
                );
                return Ok(candidates.into_iter().nth(index));
            }
        }

        self.fabricate_principal(principal, ctx)
    }

    fn fabricate_principal(
        &mut self,
        principal: &EntityMetadata,
        ctx: GenerationContext,
    ) -> Result<Option<KeyTuple>, GenerationError> {
        let next = ctx.descend();
        if next.depth() > MAX_RECURSION_DEPTH {
            warn!(
                entity_type = principal.entity_type.as_str(),
                depth = next.depth(),
                limit = MAX_RECURSION_DEPTH,
                "principal recursion limit reached"
            );
            return Err(GenerationError::RecursionDepthExceeded {
                entity_type: principal.entity_type.clone(),
                depth: next.depth(),
                limit: MAX_RECURSION_DEPTH,
            });
        }

        let mut entity = self.prepare(&principal.entity_type)?;
        self.assign_keys(&mut entity, next, false, false)?;
        self.persist(&mut entity)?;
        self.report.record_principal_created(next.depth());
        debug!(
            principal = principal.entity_type.as_str(),
            depth = next.depth(),
            "fabricated principal"
        );
        let predicate = self.key_predicate(
            &principal.entity_type,
            &principal.primary_key_property_names,
        );
        Ok(predicate.extract(&entity))
    }

    /// Join-table style keys: foreign key resolution fills part of the
    /// primary key, so uniqueness is checked on the combined tuple.
    fn assign_overlapping_keys(
        &mut self,
        entity: &mut Entity,
        metadata: &EntityMetadata,
        ctx: GenerationContext,
        all_primary_keys_set: bool,
        all_foreign_keys_set: bool,
    ) -> Result<(), GenerationError> {
        if all_primary_keys_set && all_foreign_keys_set {
            return Ok(());
        }
        let names = &metadata.primary_key_property_names;
        let fields = self.generated_key_fields(entity, metadata);
        let predicate = self.key_predicate(entity.entity_type(), names);
        let existing = self.resources.store.query(entity.entity_type())?;
        let regenerates_primary = !all_primary_keys_set && !fields.is_empty();

        for attempt in 1..=MAX_KEY_ATTEMPTS {
            if !all_primary_keys_set {
                self.fill_key_fields(entity, &fields);
            }
            if !all_foreign_keys_set {
                for group in &metadata.foreign_key_groups {
                    self.assign_foreign_key_group(entity, group, ctx)?;
                }
            }
            let Some(key) = predicate.extract(entity) else {
                return Ok(());
            };
            if !predicate.matches_any(&existing, &key) {
                self.report.record_retries(u64::from(attempt - 1));
                return Ok(());
            }
            // nothing left to vary
            if !regenerates_primary && all_foreign_keys_set {
                return Err(GenerationError::UniqueKeyGenerationFailure {
                    entity_type: entity.entity_type().to_string(),
                    attempts: attempt,
                });
            }
        }

        warn!(
            entity_type = entity.entity_type(),
            attempts = MAX_KEY_ATTEMPTS,
            "primary key generation exhausted"
        );
        Err(GenerationError::UniqueKeyGenerationFailure {
            entity_type: entity.entity_type().to_string(),
            attempts: MAX_KEY_ATTEMPTS,
        })
    }

    /// Primary key fields the seeder issues values for: writable and not
    /// filled by foreign key resolution.
    fn generated_key_fields(
        &mut self,
        entity: &Entity,
        metadata: &EntityMetadata,
    ) -> Vec<(String, FieldKind)> {
        let mut fields = Vec::new();
        for name in &metadata.primary_key_property_names {
            if metadata.is_foreign_key_property(name) {
                continue;
            }
            match entity.field(name) {
                Some(field) if field.writable => fields.push((name.clone(), field.kind)),
                _ => {
                    debug!(
                        entity_type = entity.entity_type(),
                        field = name.as_str(),
                        "skipped primary key field that is unknown or read-only"
                    );
                    self.report.record_skipped_field();
                }
            }
        }
        fields
    }

    fn fill_key_fields(&mut self, entity: &mut Entity, fields: &[(String, FieldKind)]) {
        for (name, kind) in fields {
            let value = self.next_key_value(entity.entity_type(), name, *kind);
            if let Err(err) = entity.set(name, value) {
                debug!(
                    entity_type = entity.entity_type(),
                    field = name.as_str(),
                    error = %err,
                    "rejected issued key value"
                );
            }
        }
    }

    fn next_key_value(&self, entity_type: &str, property: &str, kind: FieldKind) -> Value {
        self.resources
            .key_fetch
            .and_then(|fetch| fetch(entity_type, property, kind))
            .unwrap_or_else(|| self.resources.counters.next(entity_type, property, kind))
    }
}

fn all_set(entity: &Entity, names: &[String]) -> bool {
    names.iter().all(|name| match entity.field(name) {
        Some(field) if field.writable => !field.value.is_default(),
        _ => true,
    })
}

fn render(values: &[Value]) -> String {
    let parts: Vec<String> = values.iter().map(Value::to_string).collect();
    parts.join(", ")
}
