//! Dispatch journal.
//!
//! Every dispatch that reaches a terminal state is appended as one JSON line
//! to `dispatches-YYYY-MM-DD.jsonl`. The journal is an audit trail only; the
//! usage ledger remains the source of truth for budget accounting, and a
//! failed journal write never fails the dispatch.

pub mod config;
pub mod record;
pub mod store;

pub use config::{JournalConfig, DEFAULT_RETENTION_DAYS};
pub use record::{DispatchOutcome, DispatchRecord, JOURNAL_SCHEMA_VERSION};
pub use store::{generate_dispatch_id, JournalError, JournalResult, JournalStore};
