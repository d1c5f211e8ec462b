//! Budget unit estimation.
//!
//! The model provider's exact token counts are not available before a call,
//! so budget units are derived from character counts and a configured
//! multiplier. Characters are Unicode scalar values, not bytes.

use serde::{Deserialize, Serialize};

use super::config::BudgetPolicy;

/// Relative floating point error absorbed before rounding up, in ULPs, so
/// that `1000 * 1.3` charges 1300 units rather than 1301.
const ROUNDING_ULPS: f64 = 4.0;

/// Converts character counts into budget units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnitEstimator {
    units_per_character: f64,
}

impl Default for UnitEstimator {
    fn default() -> Self {
        Self {
            units_per_character: 1.0,
        }
    }
}

impl UnitEstimator {
    /// Create an estimator with the given multiplier.
    pub fn new(units_per_character: f64) -> Self {
        Self {
            units_per_character: units_per_character.max(0.0),
        }
    }

    /// Create an estimator from a budget policy.
    pub fn from_policy(policy: &BudgetPolicy) -> Self {
        Self::new(policy.units_per_character)
    }

    /// The configured multiplier.
    pub fn units_per_character(&self) -> f64 {
        self.units_per_character
    }

    /// Units for a raw character count, rounded up.
    pub fn units_for_chars(&self, chars: usize) -> u64 {
        let raw = chars as f64 * self.units_per_character;
        if raw <= 0.0 {
            return 0;
        }
        let slack = raw * f64::EPSILON * ROUNDING_ULPS;
        (raw - slack).ceil().max(0.0) as u64
    }

    /// Units for a piece of text.
    pub fn units_for_text(&self, text: &str) -> u64 {
        self.units_for_chars(text.chars().count())
    }

    /// Pre-flight estimate for a call: the content plus the largest output the
    /// caller expects back.
    pub fn estimate_call(&self, content: &str, expected_max_output_chars: usize) -> u64 {
        self.units_for_chars(content.chars().count() + expected_max_output_chars)
    }

    /// Charge for a completed call from what was actually exchanged.
    pub fn actual_call(&self, input_chars: usize, output_chars: usize) -> UnitCount {
        UnitCount::new(
            self.units_for_chars(input_chars),
            self.units_for_chars(output_chars),
        )
    }
}

/// Units split by direction for a completed call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitCount {
    /// Units for the instruction sent to the model
    pub input_units: u64,
    /// Units for the text returned by the model
    pub output_units: u64,
}

impl UnitCount {
    /// Create a new unit count.
    pub fn new(input: u64, output: u64) -> Self {
        Self {
            input_units: input,
            output_units: output,
        }
    }

    /// Get total units.
    pub fn total(&self) -> u64 {
        self.input_units.saturating_add(self.output_units)
    }
}

impl std::ops::Add for UnitCount {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            input_units: self.input_units.saturating_add(other.input_units),
            output_units: self.output_units.saturating_add(other.output_units),
        }
    }
}
