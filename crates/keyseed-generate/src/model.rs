use std::path::Path;
use std::sync::Arc;

use chrono::NaiveDate;
use keyseed_core::{FieldKind, Value};
use serde::{Deserialize, Serialize};

use crate::errors::GenerationError;
use crate::logging::LogFormat;

/// Custom key source consulted before the counter store.
///
/// Receives the entity type, the property name and its declared kind;
/// returning `None` falls back to the counter store.
pub type KeyFetchOverride = Arc<dyn Fn(&str, &str, FieldKind) -> Option<Value> + Send + Sync>;

/// Tuning knobs for foreign key resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SeederOptions {
    /// Probability of reusing an existing principal instead of fabricating one.
    pub existing_reference_chance: f64,
    /// When false every foreign key gets a freshly fabricated principal.
    pub allow_existing_foreign_keys: bool,
    /// Seed for the engine's random stream; `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl Default for SeederOptions {
    fn default() -> Self {
        Self {
            existing_reference_chance: 0.7,
            allow_existing_foreign_keys: true,
            seed: None,
        }
    }
}

impl SeederOptions {
    pub fn validate(&self) -> Result<(), GenerationError> {
        let chance = self.existing_reference_chance;
        if !(0.0..=1.0).contains(&chance) {
            return Err(GenerationError::InvalidOptions(format!(
                "existing_reference_chance must be within [0, 1], got {chance}"
            )));
        }
        Ok(())
    }
}

/// Options for the fake-value fabricator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FabricatorOptions {
    /// Dates and timestamps are drawn from the year after this date.
    pub base_date: NaiveDate,
    /// Probability that a nullable field is left null.
    pub null_rate: f64,
}

impl Default for FabricatorOptions {
    fn default() -> Self {
        Self {
            base_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or_default(),
            null_rate: 0.0,
        }
    }
}

impl FabricatorOptions {
    pub fn validate(&self) -> Result<(), GenerationError> {
        if !(0.0..=1.0).contains(&self.null_rate) {
            return Err(GenerationError::InvalidOptions(format!(
                "null_rate must be within [0, 1], got {}",
                self.null_rate
            )));
        }
        Ok(())
    }
}

/// File-level configuration, usually loaded from `keyseed.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyseedConfig {
    pub seeder: SeederOptions,
    pub fabricator: FabricatorOptions,
    pub log_format: LogFormat,
}

impl KeyseedConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, GenerationError> {
        let config: KeyseedConfig = toml::from_str(input)?;
        config.seeder.validate()?;
        config.fabricator.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, GenerationError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}

/// Report for one `generate` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationReport {
    pub run_id: String,
    pub entity_type: String,
    pub requested: u64,
    pub generated: u64,
    /// Principals fabricated recursively while resolving foreign keys.
    pub principals_created: u64,
    /// Foreign keys satisfied by an existing principal.
    pub principals_reused: u64,
    pub primary_key_retries: u64,
    /// Key fields skipped because they were unknown or not writable.
    pub skipped_fields: u64,
    pub max_depth: u32,
    pub duration_ms: u64,
}

impl GenerationReport {
    pub fn new(run_id: String, entity_type: &str, requested: u64) -> Self {
        Self {
            run_id,
            entity_type: entity_type.to_string(),
            requested,
            generated: 0,
            principals_created: 0,
            principals_reused: 0,
            primary_key_retries: 0,
            skipped_fields: 0,
            max_depth: 0,
            duration_ms: 0,
        }
    }

    pub fn record_principal_created(&mut self, depth: u32) {
        self.principals_created += 1;
        self.max_depth = self.max_depth.max(depth);
    }

    pub fn record_principal_reused(&mut self) {
        self.principals_reused += 1;
    }

    pub fn record_retries(&mut self, retries: u64) {
        self.primary_key_retries += retries;
    }

    pub fn record_skipped_field(&mut self) {
        self.skipped_fields += 1;
    }
}
