//! Key seeding and dependency resolution for keyseed.
//!
//! This crate turns schema metadata into persisted, referentially consistent
//! fixture records: it issues unique primary keys, resolves foreign keys by
//! reusing or recursively fabricating principals, and persists the result.

pub mod counters;
pub mod engine;
pub mod equality;
pub mod errors;
pub mod fabricate;
pub mod logging;
pub mod model;
pub mod seeder;
pub mod store;

pub use counters::KeyCounterStore;
pub use engine::{GenerationEngine, GenerationResult};
pub use equality::{KeyEqualityCache, KeyPredicate, KeyShape};
pub use errors::{GenerationError, StoreError};
pub use fabricate::{FakeFabricator, ValueFabricator};
pub use logging::{LogFormat, init_logging};
pub use model::{FabricatorOptions, GenerationReport, KeyFetchOverride, KeyseedConfig, SeederOptions};
pub use seeder::{GenerationContext, KeySeeder, MAX_KEY_ATTEMPTS, MAX_RECURSION_DEPTH, SeedResources};
pub use store::{EntityStore, InMemoryStore};
