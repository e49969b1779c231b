//! Orchestrator policy.
//!
//! Every field has a default; a JSON file only needs to name what it changes.

use std::path::Path;

use locus_primitives::{
    ProximityCode, DEFAULT_AUTHORIZATION_VALIDITY_MS, DEFAULT_FRAGMENT_COUNT, DEFAULT_FRAGMENT_LENGTH_MS,
    DEFAULT_IDENTIFIER_LENGTH, DEFAULT_RUN_GRACE_MS, MAX_BEACON_PERIOD_MS, MIN_BEACON_PERIOD_MS,
    WITNESS_SAMPLING_PERIOD_MS,
};
use locus_adaptation::AdaptationConfig;
use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OrchestratorConfig {
    pub fragment_count: u32,
    pub fragment_length_ms: u64,
    pub identifier_length: usize,
    pub authorization_validity_ms: u64,
    /// Weakest proximity a beacon may have to the claim and still be selected.
    pub min_proximity: ProximityCode,
    /// Added to the run duration before the driver stops a device.
    pub run_grace_ms: u64,
    /// Period bounds of the fragment schedule. Devices driven under this
    /// policy take them through [`AdaptationConfig::from`].
    pub min_period_ms: u64,
    pub max_period_ms: u64,
    pub witness_period_ms: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            fragment_count: DEFAULT_FRAGMENT_COUNT,
            fragment_length_ms: DEFAULT_FRAGMENT_LENGTH_MS,
            identifier_length: DEFAULT_IDENTIFIER_LENGTH,
            authorization_validity_ms: DEFAULT_AUTHORIZATION_VALIDITY_MS,
            min_proximity: ProximityCode::Near,
            run_grace_ms: DEFAULT_RUN_GRACE_MS,
            min_period_ms: MIN_BEACON_PERIOD_MS,
            max_period_ms: MAX_BEACON_PERIOD_MS,
            witness_period_ms: WITNESS_SAMPLING_PERIOD_MS,
        }
    }
}

impl OrchestratorConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fragment_count == 0 {
            return Err(ConfigError::Invalid("fragment_count must be positive"));
        }
        if self.fragment_length_ms == 0 || i64::try_from(self.fragment_length_ms).is_err() {
            return Err(ConfigError::Invalid("fragment_length_ms must be positive and fit an i64"));
        }
        if self.identifier_length == 0 {
            return Err(ConfigError::Invalid("identifier_length must be positive"));
        }
        if self.min_period_ms == 0 || self.min_period_ms > self.max_period_ms {
            return Err(ConfigError::Invalid("beacon period range is empty"));
        }
        if self.witness_period_ms == 0 {
            return Err(ConfigError::Invalid("witness_period_ms must be positive"));
        }
        Ok(())
    }

    pub const fn run_duration_ms(&self) -> u64 {
        locus_primitives::run_duration_ms(self.fragment_count, self.fragment_length_ms)
    }
}

impl From<&OrchestratorConfig> for AdaptationConfig {
    fn from(config: &OrchestratorConfig) -> Self {
        Self {
            min_period_ms: config.min_period_ms,
            max_period_ms: config.max_period_ms,
            witness_period_ms: config.witness_period_ms,
        }
    }
}
