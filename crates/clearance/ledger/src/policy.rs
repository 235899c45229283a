//! Graduation-fee policy

use clearance_types::{ClearanceError, ClearanceResult};
use regex::Regex;

/// Matches descriptions such as "Graduation Fee 2025" or "graduation  fee"
pub const DEFAULT_GRADUATION_FEE_PATTERN: &str = r"(?i)\bgraduation\s+fee\b";

/// Which entries count toward the graduation fee, and how much residue
/// still counts as paid
#[derive(Debug, Clone)]
pub struct FeePolicy {
    pattern: Regex,
    tolerance_minor: i64,
}

impl FeePolicy {
    pub fn new(pattern: &str, tolerance_minor: i64) -> ClearanceResult<Self> {
        let pattern = Regex::new(pattern).map_err(|err| {
            ClearanceError::Validation(format!("invalid graduation fee pattern: {}", err))
        })?;
        if tolerance_minor < 0 {
            return Err(ClearanceError::Validation(format!(
                "fee tolerance must not be negative (got {})",
                tolerance_minor
            )));
        }
        Ok(Self {
            pattern,
            tolerance_minor,
        })
    }

    pub fn matches(&self, description: &str) -> bool {
        self.pattern.is_match(description)
    }

    pub fn tolerance_minor(&self) -> i64 {
        self.tolerance_minor
    }

    /// The fee is settled once the remainder is within the tolerance
    pub fn is_settled(&self, remaining_minor: i64) -> bool {
        remaining_minor <= self.tolerance_minor
    }
}
