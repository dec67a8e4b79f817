use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use keyseed_core::{Entity, KeyExtractor, MetadataProvider, Value};
use tracing::{debug, warn};

use crate::errors::StoreError;

/// Backing store the seeder reads from and persists into.
pub trait EntityStore: Send + Sync {
    /// Persisted instances of `entity_type`.
    fn query(&self, entity_type: &str) -> Result<Vec<Entity>, StoreError>;
    /// Stage an instance for the next commit.
    fn add(&self, entity: Entity) -> Result<(), StoreError>;
    /// Persist staged instances, returning how many were written.
    fn commit(&self) -> Result<usize, StoreError>;

    /// Stage `entity` and commit it, returning how many rows were written.
    ///
    /// Stores shared between callers override this so that a failing row
    /// does not take other callers' staged rows down with it.
    fn add_and_commit(&self, entity: Entity) -> Result<usize, StoreError> {
        self.add(entity)?;
        self.commit()
    }

    /// True when a persisted instance of `entity_type` yields `key` through `extract`.
    fn contains_key(
        &self,
        entity_type: &str,
        extract: &KeyExtractor,
        key: &[Value],
    ) -> Result<bool, StoreError> {
        Ok(self
            .query(entity_type)?
            .iter()
            .any(|entity| extract(entity).is_some_and(|existing| existing == key)))
    }
}

#[derive(Debug, Default)]
struct StoreState {
    committed: BTreeMap<String, Vec<Entity>>,
    pending: Vec<Entity>,
}

/// Relational-style in-memory store.
///
/// `commit` enforces non-null unique primary keys and foreign key integrity
/// using the same metadata and key extractors the seeder reads; a violating
/// batch is discarded. `add_and_commit` checks and writes a single row under
/// one lock and never touches the pending batch.
pub struct InMemoryStore {
    metadata: Arc<dyn MetadataProvider>,
    state: RwLock<StoreState>,
}

impl InMemoryStore {
    pub fn new(metadata: Arc<dyn MetadataProvider>) -> Self {
        Self {
            metadata,
            state: RwLock::new(StoreState::default()),
        }
    }

    pub fn count(&self, entity_type: &str) -> Result<usize, StoreError> {
        Ok(self
            .read()?
            .committed
            .get(entity_type)
            .map(Vec::len)
            .unwrap_or(0))
    }

    pub fn clear(&self) -> Result<(), StoreError> {
        let mut state = self.write()?;
        state.committed.clear();
        state.pending.clear();
        Ok(())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, StoreState>, StoreError> {
        self.state.read().map_err(|_| StoreError::Poisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, StoreState>, StoreError> {
        self.state.write().map_err(|_| StoreError::Poisoned)
    }

    /// Checks `rows` against `committed` and against each other, in order.
    fn check_rows(
        &self,
        committed: &BTreeMap<String, Vec<Entity>>,
        rows: &[Entity],
    ) -> Result<(), StoreError> {
        for (index, entity) in rows.iter().enumerate() {
            let Ok(metadata) = self.metadata.metadata_for(entity.entity_type()) else {
                continue;
            };
            let earlier = rows.get(..index).unwrap_or_default();
            self.check_primary_key(committed, earlier, entity, &metadata.primary_key_property_names)?;
            for group in &metadata.foreign_key_groups {
                self.check_foreign_key(
                    committed,
                    rows,
                    entity,
                    &group.foreign_key_property_names,
                    &group.principal_entity_type,
                )?;
            }
        }
        Ok(())
    }

    fn check_primary_key(
        &self,
        committed: &BTreeMap<String, Vec<Entity>>,
        earlier: &[Entity],
        entity: &Entity,
        names: &[String],
    ) -> Result<(), StoreError> {
        let extract = self
            .metadata
            .composite_key_extractor(entity.entity_type(), names);
        let Some(key) = extract(entity) else {
            return Err(violation(entity, format!("primary key fields {names:?} missing")));
        };
        if key.iter().any(Value::is_null) {
            return Err(violation(entity, "primary key contains null".to_string()));
        }
        let duplicate = rows_of(committed, earlier, entity.entity_type())
            .any(|row| extract(row).is_some_and(|existing| existing == key));
        if duplicate {
            return Err(violation(
                entity,
                format!("duplicate primary key {}", render(&key)),
            ));
        }
        Ok(())
    }

    fn check_foreign_key(
        &self,
        committed: &BTreeMap<String, Vec<Entity>>,
        staged: &[Entity],
        entity: &Entity,
        columns: &[String],
        principal_type: &str,
    ) -> Result<(), StoreError> {
        let foreign = self
            .metadata
            .composite_key_extractor(entity.entity_type(), columns);
        let Some(value) = foreign(entity) else {
            return Err(violation(entity, format!("foreign key fields {columns:?} missing")));
        };
        // NULL foreign keys are not checked
        if value.iter().any(Value::is_null) {
            return Ok(());
        }
        let Ok(principal) = self.metadata.metadata_for(principal_type) else {
            return Err(violation(
                entity,
                format!("principal '{principal_type}' has no primary key"),
            ));
        };
        let primary = self
            .metadata
            .composite_key_extractor(principal_type, &principal.primary_key_property_names);
        let found = rows_of(committed, staged, principal_type)
            .any(|row| primary(row).is_some_and(|key| key == value));
        if found {
            Ok(())
        } else {
            Err(violation(
                entity,
                format!(
                    "foreign key {columns:?} = {} has no '{principal_type}' row",
                    render(&value)
                ),
            ))
        }
    }
}

/// Committed rows of `entity_type` followed by the matching rows of `staged`.
fn rows_of<'a>(
    committed: &'a BTreeMap<String, Vec<Entity>>,
    staged: &'a [Entity],
    entity_type: &'a str,
) -> impl Iterator<Item = &'a Entity> + 'a {
    committed
        .get(entity_type)
        .into_iter()
        .flatten()
        .chain(staged.iter().filter(move |row| row.entity_type() == entity_type))
}

fn violation(entity: &Entity, message: String) -> StoreError {
    StoreError::ConstraintViolation {
        entity_type: entity.entity_type().to_string(),
        message,
    }
}

fn render(values: &[Value]) -> String {
    let parts: Vec<String> = values.iter().map(Value::to_string).collect();
    format!("({})", parts.join(", "))
}

impl EntityStore for InMemoryStore {
    fn query(&self, entity_type: &str) -> Result<Vec<Entity>, StoreError> {
        Ok(self
            .read()?
            .committed
            .get(entity_type)
            .cloned()
            .unwrap_or_default())
    }

    fn add(&self, entity: Entity) -> Result<(), StoreError> {
        self.write()?.pending.push(entity);
        Ok(())
    }

    fn commit(&self) -> Result<usize, StoreError> {
        let mut state = self.write()?;
        if let Err(err) = self.check_rows(&state.committed, &state.pending) {
            let discarded = state.pending.len();
            state.pending.clear();
            warn!(error = %err, discarded, "commit rejected");
            return Err(err);
        }

        let pending = std::mem::take(&mut state.pending);
        let written = pending.len();
        for entity in pending {
            state
                .committed
                .entry(entity.entity_type().to_string())
                .or_default()
                .push(entity);
        }
        debug!(written, "commit applied");
        Ok(written)
    }

    fn add_and_commit(&self, entity: Entity) -> Result<usize, StoreError> {
        let mut state = self.write()?;
        if let Err(err) = self.check_rows(&state.committed, std::slice::from_ref(&entity)) {
            warn!(error = %err, "row rejected");
            return Err(err);
        }
        state
            .committed
            .entry(entity.entity_type().to_string())
            .or_default()
            .push(entity);
        debug!(written = 1, "row applied");
        Ok(1)
    }
}
