//! Healing configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::FlowError;

/// Immutable retry and timeout budget handed to the orchestrator at
/// construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealingConfig {
    /// Tier-1 (replacement locator) attempts per step
    pub tier1_attempts: u32,

    /// Tier-2 (direct action) attempts per step
    pub tier2_attempts: u32,

    /// Candidates below this confidence are unconfirmed
    pub confidence_floor: f64,

    /// Budget for a single AI call, independent of step timeouts
    pub healing_timeout_ms: u64,

    /// Budget for snapshots and URL lookups outside a step's own timeout
    pub driver_timeout_ms: u64,
}

impl Default for HealingConfig {
    fn default() -> Self {
        Self {
            tier1_attempts: 2,
            tier2_attempts: 2,
            confidence_floor: 0.7,
            healing_timeout_ms: 120_000,
            driver_timeout_ms: 10_000,
        }
    }
}

impl HealingConfig {
    pub fn with_tier1_attempts(mut self, attempts: u32) -> Self {
        self.tier1_attempts = attempts;
        self
    }

    pub fn with_tier2_attempts(mut self, attempts: u32) -> Self {
        self.tier2_attempts = attempts;
        self
    }

    pub fn with_confidence_floor(mut self, floor: f64) -> Self {
        self.confidence_floor = floor;
        self
    }

    pub fn with_healing_timeout(mut self, timeout_ms: u64) -> Self {
        self.healing_timeout_ms = timeout_ms;
        self
    }

    /// Upper bound on attempts (and therefore trace entries) for one step
    pub fn max_attempts(&self) -> u32 {
        1 + self.tier1_attempts + self.tier2_attempts
    }

    pub fn healing_timeout(&self) -> Duration {
        Duration::from_millis(self.healing_timeout_ms)
    }

    pub fn driver_timeout(&self) -> Duration {
        Duration::from_millis(self.driver_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), FlowError> {
        if !self.confidence_floor.is_finite() || !(0.0..=1.0).contains(&self.confidence_floor) {
            return Err(FlowError::InvalidConfig(format!(
                "confidence_floor must be within [0, 1], got {}",
                self.confidence_floor
            )));
        }
        if self.healing_timeout_ms == 0 {
            return Err(FlowError::InvalidConfig(
                "healing_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.driver_timeout_ms == 0 {
            return Err(FlowError::InvalidConfig(
                "driver_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
