//! Configuration for the clearance engine

use clearance_ledger::{FeePolicy, DEFAULT_GRADUATION_FEE_PATTERN};
use clearance_types::{ClearanceError, ClearanceResult};
use serde::{Deserialize, Serialize};

/// Engine configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Graduation-fee rules
    #[serde(default)]
    pub fees: FeeConfig,

    /// Commit retries and event delivery
    #[serde(default)]
    pub propagation: PropagationConfig,
}

/// Graduation-fee configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeConfig {
    /// Case-insensitive regex matched against ledger descriptions
    #[serde(default = "default_fee_pattern")]
    pub graduation_fee_pattern: String,

    /// Residue in minor units that still counts as paid
    #[serde(default)]
    pub tolerance_minor: i64,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            graduation_fee_pattern: default_fee_pattern(),
            tolerance_minor: 0,
        }
    }
}

/// Propagation configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropagationConfig {
    /// Fresh-read retries of a conflicting commit before giving up
    #[serde(default = "default_max_commit_attempts")]
    pub max_commit_attempts: u32,

    /// Bound on one event-sink delivery, in milliseconds
    #[serde(default = "default_sink_timeout_ms")]
    pub sink_timeout_ms: u64,
}

impl Default for PropagationConfig {
    fn default() -> Self {
        Self {
            max_commit_attempts: default_max_commit_attempts(),
            sink_timeout_ms: default_sink_timeout_ms(),
        }
    }
}

fn default_fee_pattern() -> String {
    DEFAULT_GRADUATION_FEE_PATTERN.to_string()
}

fn default_max_commit_attempts() -> u32 {
    5
}

fn default_sink_timeout_ms() -> u64 {
    2_000
}

impl EngineConfig {
    /// Check values a config file could get wrong
    pub fn validate(&self) -> ClearanceResult<()> {
        if self.propagation.max_commit_attempts == 0 {
            return Err(ClearanceError::Validation(
                "propagation.max_commit_attempts must be at least 1".into(),
            ));
        }
        if self.propagation.sink_timeout_ms == 0 {
            return Err(ClearanceError::Validation(
                "propagation.sink_timeout_ms must be at least 1".into(),
            ));
        }
        self.fee_policy().map(|_| ())
    }

    pub fn fee_policy(&self) -> ClearanceResult<FeePolicy> {
        FeePolicy::new(&self.fees.graduation_fee_pattern, self.fees.tolerance_minor)
    }

    /// Accept a one-cent residue as paid
    pub fn with_fee_tolerance(mut self, tolerance_minor: i64) -> Self {
        self.fees.tolerance_minor = tolerance_minor;
        self
    }

    pub fn with_max_commit_attempts(mut self, attempts: u32) -> Self {
        self.propagation.max_commit_attempts = attempts;
        self
    }

    pub fn with_sink_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.propagation.sink_timeout_ms = timeout_ms;
        self
    }
}
