//! Quota admission and ledger commits.
//!
//! [`QuotaGuard`] is the only writer of the usage ledger. Every ledger
//! mutation, and every reservation, happens while holding the guard's mutex,
//! so concurrent commits are applied one at a time and never lost.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::config::BudgetPolicy;
use super::ledger::{LedgerBook, LedgerError, LedgerResult, UsageLedger};
use crate::error::PipelineError;

/// Daily budget exhausted for the requested call.
///
/// Waiting for the next UTC day is the only remedy; retrying sooner cannot
/// succeed.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("daily AI budget exhausted: {used}/{limit} units used, {requested} more requested")]
pub struct QuotaExceeded {
    /// Configured daily limit.
    pub limit: u64,
    /// Units already spent (plus any units held by in-flight calls).
    pub used: u64,
    /// Units the rejected call asked for.
    pub requested: u64,
}

/// Outcome of a pre-flight admission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// The call fits in today's remaining budget.
    Allow,
    /// The call would push usage past the daily limit.
    Reject(QuotaExceeded),
}

impl Admission {
    /// Whether the call was admitted.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allow)
    }
}

/// Status of budget usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BudgetStatus {
    /// Under warning threshold, all good
    Ok,
    /// Approaching budget limit (over warning threshold)
    Warning,
    /// Near budget limit (over critical threshold)
    Critical,
    /// Budget exhausted
    Exceeded,
}

impl BudgetStatus {
    /// Compute status from a usage fraction.
    pub fn from_usage(usage: f64, policy: &BudgetPolicy) -> Self {
        if usage >= 1.0 {
            BudgetStatus::Exceeded
        } else if usage >= policy.critical_threshold {
            BudgetStatus::Critical
        } else if usage >= policy.warning_threshold {
            BudgetStatus::Warning
        } else {
            BudgetStatus::Ok
        }
    }

    /// Check if further calls can be admitted at all.
    pub fn should_continue(&self) -> bool {
        !matches!(self, BudgetStatus::Exceeded)
    }

    /// Check if warnings should be emitted.
    pub fn should_warn(&self) -> bool {
        matches!(self, BudgetStatus::Warning | BudgetStatus::Critical)
    }

    /// Short label for display.
    pub fn as_str(&self) -> &'static str {
        match self {
            BudgetStatus::Ok => "OK",
            BudgetStatus::Warning => "WARNING",
            BudgetStatus::Critical => "CRITICAL",
            BudgetStatus::Exceeded => "EXCEEDED",
        }
    }
}

/// Snapshot of today's quota.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotaStatus {
    pub date: NaiveDate,
    pub used: u64,
    pub reserved: u64,
    pub in_flight: u32,
    pub limit: u64,
    /// Units a new reservation could still take, net of in-flight holds.
    pub remaining: u64,
    pub level: BudgetStatus,
}

impl QuotaStatus {
    /// Format as a human-readable string.
    pub fn format(&self) -> String {
        let mut output = format!("## AI Budget for {}\n\n", self.date);

        if self.limit == u64::MAX {
            output.push_str(&format!("**Used**: {} units (no limit)\n", self.used));
        } else {
            let percent = (self.used as f64 / self.limit.max(1) as f64) * 100.0;
            output.push_str(&format!(
                "**Used**: {}/{} units ({:.1}%) [{}]\n",
                self.used,
                self.limit,
                percent,
                self.level.as_str()
            ));
            output.push_str(&format!("**Remaining**: {} units\n", self.remaining));
        }

        if self.in_flight > 0 {
            output.push_str(&format!(
                "**In flight**: {} calls holding {} units\n",
                self.in_flight, self.reserved
            ));
        }

        output
    }
}

#[derive(Debug, Default)]
struct GuardState {
    /// Units held by admitted calls that have not committed yet.
    reserved: u64,
    in_flight: u32,
}

#[derive(Debug)]
struct GuardShared {
    policy: BudgetPolicy,
    book: LedgerBook,
    state: Mutex<GuardState>,
}

/// Owner of the usage ledger.
#[derive(Debug, Clone)]
pub struct QuotaGuard {
    shared: Arc<GuardShared>,
}

impl QuotaGuard {
    /// Create a guard enforcing `policy` over the ledger in `book`.
    pub fn new(policy: BudgetPolicy, book: LedgerBook) -> Self {
        Self {
            shared: Arc::new(GuardShared {
                policy,
                book,
                state: Mutex::new(GuardState::default()),
            }),
        }
    }

    /// The policy being enforced.
    pub fn policy(&self) -> &BudgetPolicy {
        &self.shared.policy
    }

    /// Today's ledger, with the reset rule applied. Read-only.
    pub fn ledger(&self) -> LedgerResult<UsageLedger> {
        self.shared.book.load()
    }

    /// Pre-flight check: would `estimated_units` fit in today's budget?
    ///
    /// Considers only committed usage and never touches the ledger.
    pub fn admit(&self, estimated_units: u64) -> LedgerResult<Admission> {
        let ledger = self.shared.book.load()?;
        Ok(self.decide(ledger.used_units, estimated_units))
    }

    /// Admit a call and hold `estimated_units` against the budget until the
    /// returned reservation is committed or released.
    ///
    /// Held units count against later admissions, which bounds overshoot from
    /// concurrent calls to the difference between estimates and actual costs.
    pub fn reserve(&self, estimated_units: u64) -> Result<Reservation, PipelineError> {
        let mut state = self.lock_state()?;
        let ledger = self.shared.book.load()?;
        let held = ledger.used_units.saturating_add(state.reserved);

        if let Admission::Reject(exceeded) = self.decide(held, estimated_units) {
            tracing::warn!(
                limit = exceeded.limit,
                used = ledger.used_units,
                reserved = state.reserved,
                requested = estimated_units,
                "AI budget admission rejected"
            );
            return Err(PipelineError::QuotaExceeded(exceeded));
        }

        state.reserved = state.reserved.saturating_add(estimated_units);
        state.in_flight += 1;
        tracing::debug!(
            units = estimated_units,
            reserved = state.reserved,
            in_flight = state.in_flight,
            "AI budget reserved"
        );

        Ok(Reservation {
            guard: self.clone(),
            units: estimated_units,
            settled: false,
        })
    }

    /// Record `actual_units` of consumption against today's ledger and persist it.
    ///
    /// The reset rule is applied again here, since a call may have crossed
    /// midnight while it was in flight.
    pub fn commit(&self, actual_units: u64) -> LedgerResult<UsageLedger> {
        let _state = self.lock_state()?;
        self.commit_locked(actual_units)
    }

    /// Snapshot of today's usage, reservations and threshold level.
    pub fn status(&self) -> LedgerResult<QuotaStatus> {
        let state = self.lock_state()?;
        let ledger = self.shared.book.load()?;
        let limit = self.shared.policy.daily_limit_units;
        let usage = if limit == 0 {
            1.0
        } else {
            ledger.used_units as f64 / limit as f64
        };

        Ok(QuotaStatus {
            date: ledger.date,
            used: ledger.used_units,
            reserved: state.reserved,
            in_flight: state.in_flight,
            limit,
            remaining: limit.saturating_sub(ledger.used_units.saturating_add(state.reserved)),
            level: BudgetStatus::from_usage(usage, &self.shared.policy),
        })
    }

    fn decide(&self, used: u64, requested: u64) -> Admission {
        let limit = self.shared.policy.daily_limit_units;
        if used.saturating_add(requested) > limit {
            Admission::Reject(QuotaExceeded {
                limit,
                used,
                requested,
            })
        } else {
            Admission::Allow
        }
    }

    fn lock_state(&self) -> LedgerResult<MutexGuard<'_, GuardState>> {
        self.shared.state.lock().map_err(|_| LedgerError::Poisoned)
    }

    /// Caller must hold the state lock.
    fn commit_locked(&self, actual_units: u64) -> LedgerResult<UsageLedger> {
        let mut ledger = self.shared.book.load()?;
        ledger.charge(actual_units);
        self.shared.book.store(&ledger)?;

        let level = BudgetStatus::from_usage(
            ledger.used_units as f64 / self.shared.policy.daily_limit_units.max(1) as f64,
            &self.shared.policy,
        );
        tracing::info!(
            date = %ledger.date,
            charged = actual_units,
            used = ledger.used_units,
            limit = self.shared.policy.daily_limit_units,
            level = level.as_str(),
            "AI budget committed"
        );
        if level.should_warn() {
            tracing::warn!(
                used = ledger.used_units,
                limit = self.shared.policy.daily_limit_units,
                "AI budget is running low"
            );
        }

        Ok(ledger)
    }

    fn release_units(&self, state: &mut GuardState, units: u64) {
        state.reserved = state.reserved.saturating_sub(units);
        state.in_flight = state.in_flight.saturating_sub(1);
    }
}

/// Budget held for one admitted call.
///
/// Dropping a reservation without committing releases the held units, so an
/// abandoned call is never charged.
#[derive(Debug)]
#[must_use = "a reservation holds budget until committed or released"]
pub struct Reservation {
    guard: QuotaGuard,
    units: u64,
    settled: bool,
}

impl Reservation {
    /// Units held by this reservation.
    pub fn units(&self) -> u64 {
        self.units
    }

    /// Replace the hold with the actual charge and persist it.
    pub fn commit(mut self, actual_units: u64) -> LedgerResult<UsageLedger> {
        let mut state = self.guard.lock_state()?;
        self.guard.release_units(&mut state, self.units);
        self.settled = true;
        self.guard.commit_locked(actual_units)
    }

    /// Give the held units back without charging anything.
    pub fn release(mut self) {
        self.release_held();
    }

    fn release_held(&mut self) {
        if self.settled {
            return;
        }
        self.settled = true;
        if let Ok(mut state) = self.guard.shared.state.lock() {
            self.guard.release_units(&mut state, self.units);
            tracing::debug!(units = self.units, "AI budget reservation released");
        }
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        self.release_held();
    }
}
