use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{SubsecRound, Utc};
use keyseed_core::{FieldKind, KeyKind, Value};
use uuid::Uuid;

type CounterKey = (String, String);

/// Last issued key value per `(entity type, property)`.
///
/// Values live as long as the store. Share one store to keep sequences
/// continuous across engines; build a fresh one for isolated sequences.
#[derive(Debug, Default)]
pub struct KeyCounterStore {
    entries: Mutex<HashMap<CounterKey, Value>>,
}

impl KeyCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue the next key value for a property of the given kind.
    ///
    /// Integer kinds continue from the last issued value (starting at 1);
    /// uuid and text kinds are random; timestamps are the current time at
    /// microsecond precision and may repeat; other kinds get the type default.
    pub fn next(&self, entity_type: &str, property: &str, kind: FieldKind) -> Value {
        let mut entries = self.lock();
        let key = (entity_type.to_string(), property.to_string());
        let previous = entries.get(&key);

        let value = match kind.key_kind() {
            KeyKind::Integer => {
                let last = match previous {
                    Some(Value::Int(last)) => *last,
                    _ => 0,
                };
                Value::Int(last.saturating_add(1))
            }
            KeyKind::BigInteger => {
                let last = match previous {
                    Some(Value::BigInt(last)) => *last,
                    _ => 0,
                };
                Value::BigInt(last.saturating_add(1))
            }
            KeyKind::Uuid => Value::Uuid(Uuid::new_v4()),
            KeyKind::Text => Value::Text(Uuid::new_v4().simple().to_string()),
            KeyKind::Timestamp => Value::Timestamp(Utc::now().trunc_subsecs(6)),
            KeyKind::Other => Value::default_for(kind),
        };

        entries.insert(key, value.clone());
        value
    }

    pub fn last(&self, entity_type: &str, property: &str) -> Option<Value> {
        self.lock()
            .get(&(entity_type.to_string(), property.to_string()))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Forget every issued value; integer sequences restart at 1.
    pub fn reset(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<CounterKey, Value>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
