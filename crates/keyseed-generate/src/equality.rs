use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use keyseed_core::{Entity, KeyExtractor, KeyTuple, Value};

/// Whether a key is one scalar or an ordered tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyShape {
    Scalar,
    Composite(usize),
}

impl KeyShape {
    pub fn for_arity(arity: usize) -> Self {
        if arity == 1 {
            KeyShape::Scalar
        } else {
            KeyShape::Composite(arity)
        }
    }

    pub fn arity(self) -> usize {
        match self {
            KeyShape::Scalar => 1,
            KeyShape::Composite(arity) => arity,
        }
    }
}

type Matcher = Box<dyn Fn(&[Value], &[Value]) -> bool + Send + Sync>;

/// Compiled comparison of a candidate key against an existing record.
///
/// Key tuples are read through the provider's composite key extractor.
pub struct KeyPredicate {
    entity_type: String,
    property_names: Vec<String>,
    shape: KeyShape,
    extractor: KeyExtractor,
    matcher: Matcher,
}

impl KeyPredicate {
    fn compile(
        entity_type: &str,
        property_names: &[String],
        shape: KeyShape,
        extractor: KeyExtractor,
    ) -> Self {
        let matcher: Matcher = if shape.arity() != property_names.len() {
            Box::new(|_: &[Value], _: &[Value]| false)
        } else {
            match shape {
                KeyShape::Scalar => Box::new(|existing: &[Value], candidate: &[Value]| {
                    matches!((existing, candidate), ([current], [value]) if current == value)
                }),
                KeyShape::Composite(arity) => {
                    Box::new(move |existing: &[Value], candidate: &[Value]| {
                        existing.len() == arity
                            && candidate.len() == arity
                            && existing.iter().zip(candidate).all(|(current, value)| current == value)
                    })
                }
            }
        };

        Self {
            entity_type: entity_type.to_string(),
            property_names: property_names.to_vec(),
            shape,
            extractor,
            matcher,
        }
    }

    /// Key tuple of `entity`, or `None` when a key property cannot be read.
    pub fn extract(&self, entity: &Entity) -> Option<KeyTuple> {
        (self.extractor)(entity)
    }

    /// True when `existing` holds exactly `candidate` in its key properties.
    pub fn matches(&self, existing: &Entity, candidate: &[Value]) -> bool {
        existing.entity_type() == self.entity_type
            && self
                .extract(existing)
                .is_some_and(|current| (self.matcher)(&current, candidate))
    }

    pub fn matches_any<'a>(
        &self,
        existing: impl IntoIterator<Item = &'a Entity>,
        candidate: &[Value],
    ) -> bool {
        existing
            .into_iter()
            .any(|entity| self.matches(entity, candidate))
    }
}

impl fmt::Debug for KeyPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPredicate")
            .field("entity_type", &self.entity_type)
            .field("property_names", &self.property_names)
            .field("shape", &self.shape)
            .finish_non_exhaustive()
    }
}

type PredicateKey = (String, Vec<String>, KeyShape);

/// Memoized key predicates, one per `(entity type, key properties, shape)`.
#[derive(Debug, Default)]
pub struct KeyEqualityCache {
    compiled: Mutex<HashMap<PredicateKey, Arc<KeyPredicate>>>,
}

impl KeyEqualityCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached predicate for the key; `extractor` is only called on a miss.
    pub fn compile<F>(
        &self,
        entity_type: &str,
        property_names: &[String],
        shape: KeyShape,
        extractor: F,
    ) -> Arc<KeyPredicate>
    where
        F: FnOnce() -> KeyExtractor,
    {
        let mut compiled = self.compiled.lock().unwrap_or_else(PoisonError::into_inner);
        let key = (entity_type.to_string(), property_names.to_vec(), shape);
        Arc::clone(compiled.entry(key).or_insert_with(|| {
            Arc::new(KeyPredicate::compile(
                entity_type,
                property_names,
                shape,
                extractor(),
            ))
        }))
    }

    pub fn compiled_len(&self) -> usize {
        self.compiled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
