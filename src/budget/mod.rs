//! Daily AI budget management.
//!
//! This module owns the one piece of shared mutable state in the pipeline: a
//! persisted per-day counter of consumed budget units.
//!
//! # Overview
//!
//! - **BudgetPolicy**: daily limit, character multiplier, thresholds, charge rule
//! - **UnitEstimator**: converts character counts to budget units
//! - **LedgerBook**: loads/stores the [`UsageLedger`] and applies the UTC day reset rule
//! - **QuotaGuard**: admission checks, reservations and serialized commits
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use auditgate::budget::{BudgetPolicy, LedgerBook, MemoryLedgerStore, QuotaGuard, SystemClock};
//!
//! let book = LedgerBook::new(Arc::new(MemoryLedgerStore::new()), Arc::new(SystemClock));
//! let guard = QuotaGuard::new(BudgetPolicy::new().with_daily_limit(1_000), book);
//!
//! let reservation = guard.reserve(400)?;
//! // ... call the model ...
//! reservation.commit(380)?;
//! ```

mod config;
mod estimator;
mod guard;
mod ledger;

pub use config::{BudgetPolicy, ChargePolicy};
pub use estimator::{UnitCount, UnitEstimator};
pub use guard::{Admission, BudgetStatus, QuotaExceeded, QuotaGuard, QuotaStatus, Reservation};
pub use ledger::{
    Clock, FileLedgerStore, LedgerBook, LedgerError, LedgerResult, LedgerStore, ManualClock,
    MemoryLedgerStore, SystemClock, UsageLedger, DEFAULT_LEDGER_KEY,
};
