//! Budget policy configuration.

use serde::{Deserialize, Serialize};

/// How much of a completed call is charged when its output fails the
/// response contract (malformed JSON or a schema violation).
///
/// Transport failures and cancellations are never charged regardless of
/// this setting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargePolicy {
    /// Charge input and output characters, same as a usable response.
    #[default]
    Full,
    /// Charge only the characters sent to the model.
    InputOnly,
    /// Do not charge unusable responses at all.
    None,
}

/// Immutable budget policy shared by every AI-assisted feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetPolicy {
    /// Daily ceiling in budget units.
    pub daily_limit_units: u64,

    /// Multiplier converting content length (in characters) to budget units.
    /// This is an estimate, not an exact token count.
    pub units_per_character: f64,

    /// Warning threshold as a fraction of the daily limit (0.0 - 1.0)
    pub warning_threshold: f64,

    /// Critical threshold as a fraction of the daily limit (0.0 - 1.0)
    pub critical_threshold: f64,

    /// Charging rule for calls whose output fails validation
    pub charge_policy: ChargePolicy,
}

impl Default for BudgetPolicy {
    fn default() -> Self {
        Self {
            daily_limit_units: 50_000,
            units_per_character: 1.0,
            warning_threshold: 0.7,
            critical_threshold: 0.9,
            charge_policy: ChargePolicy::Full,
        }
    }
}

impl BudgetPolicy {
    /// Create a policy with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// A policy that never rejects a call.
    pub fn unlimited() -> Self {
        Self {
            daily_limit_units: u64::MAX,
            units_per_character: 1.0,
            warning_threshold: 1.0,
            critical_threshold: 1.0,
            charge_policy: ChargePolicy::Full,
        }
    }

    /// A stricter policy for shared or free-tier deployments.
    pub fn conservative() -> Self {
        Self {
            daily_limit_units: 10_000,
            units_per_character: 1.3,
            warning_threshold: 0.5,
            critical_threshold: 0.8,
            charge_policy: ChargePolicy::Full,
        }
    }

    /// Set the daily limit in budget units.
    pub fn with_daily_limit(mut self, units: u64) -> Self {
        self.daily_limit_units = units;
        self
    }

    /// Set the character-to-unit multiplier. Negative values are treated as zero.
    pub fn with_units_per_character(mut self, multiplier: f64) -> Self {
        self.units_per_character = multiplier.max(0.0);
        self
    }

    /// Set the warning threshold.
    pub fn with_warning_threshold(mut self, threshold: f64) -> Self {
        self.warning_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    /// Set the critical threshold.
    pub fn with_critical_threshold(mut self, threshold: f64) -> Self {
        self.critical_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    /// Set how unusable responses are charged.
    pub fn with_charge_policy(mut self, policy: ChargePolicy) -> Self {
        self.charge_policy = policy;
        self
    }

    /// Whether the policy can ever reject a call.
    pub fn is_enforced(&self) -> bool {
        self.daily_limit_units != u64::MAX
    }
}
