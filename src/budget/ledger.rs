//! Persisted daily usage ledger.
//!
//! The ledger is a single record (`date`, `used_units`) kept under a fixed key
//! in a [`LedgerStore`]. Dates are UTC calendar days. A ledger read on a new
//! day is reported as empty but is not written back until the next commit.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default key the ledger is stored under.
pub const DEFAULT_LEDGER_KEY: &str = "ai_usage_ledger";

/// Errors raised while reading or writing the ledger.
///
/// These are faults, not budget decisions: a corrupt or unreachable ledger
/// means spend can no longer be accounted for.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// IO error in the backing store.
    #[error("ledger store IO error: {0}")]
    Io(#[from] io::Error),

    /// Stored bytes could not be decoded as a ledger.
    #[error("ledger under key '{key}' is corrupt: {reason}")]
    Corrupt { key: String, reason: String },

    /// Ledger could not be encoded.
    #[error("ledger could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),

    /// A previous holder of the ledger lock panicked.
    #[error("ledger lock poisoned")]
    Poisoned,
}

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Consumed budget for one UTC day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageLedger {
    /// Calendar day (UTC) this count belongs to.
    pub date: NaiveDate,
    /// Units consumed on `date`.
    pub used_units: u64,
}

impl UsageLedger {
    /// An empty ledger for the given day.
    pub fn fresh(date: NaiveDate) -> Self {
        Self {
            date,
            used_units: 0,
        }
    }

    /// Apply the reset rule: a ledger from any other day is replaced by an
    /// empty one for `today`.
    pub fn rolled_to(self, today: NaiveDate) -> Self {
        if self.date == today {
            self
        } else {
            Self::fresh(today)
        }
    }

    /// Add units, saturating at `u64::MAX`.
    pub fn charge(&mut self, units: u64) {
        self.used_units = self.used_units.saturating_add(units);
    }
}

/// Source of "today" for the reset rule.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// The current calendar day in UTC.
    fn today(&self) -> NaiveDate;
}

/// Wall clock, normalized to UTC.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Utc::now().date_naive()
    }
}

/// A clock that only moves when told to. Useful for simulating day
/// boundaries.
#[derive(Debug, Clone)]
pub struct ManualClock {
    today: Arc<Mutex<NaiveDate>>,
}

impl ManualClock {
    /// Create a clock fixed at `date`.
    pub fn new(date: NaiveDate) -> Self {
        Self {
            today: Arc::new(Mutex::new(date)),
        }
    }

    /// Move the clock to `date`.
    pub fn set(&self, date: NaiveDate) {
        let mut today = self.today.lock().unwrap_or_else(|e| e.into_inner());
        *today = date;
    }

    /// Move the clock forward by whole days.
    pub fn advance_days(&self, days: u64) {
        let mut today = self.today.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(next) = today.checked_add_days(chrono::Days::new(days)) {
            *today = next;
        }
    }
}

impl Clock for ManualClock {
    fn today(&self) -> NaiveDate {
        *self.today.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Durable key/value storage for the ledger.
pub trait LedgerStore: Send + Sync + std::fmt::Debug {
    /// Read the bytes stored under `key`, if any.
    fn get(&self, key: &str) -> LedgerResult<Option<Vec<u8>>>;

    /// Overwrite the bytes stored under `key`.
    fn set(&self, key: &str, bytes: &[u8]) -> LedgerResult<()>;
}

/// In-process store. Contents are lost with the process.
#[derive(Debug, Clone, Default)]
pub struct MemoryLedgerStore {
    entries: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryLedgerStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl LedgerStore for MemoryLedgerStore {
    fn get(&self, key: &str) -> LedgerResult<Option<Vec<u8>>> {
        let entries = self.entries.lock().map_err(|_| LedgerError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, bytes: &[u8]) -> LedgerResult<()> {
        let mut entries = self.entries.lock().map_err(|_| LedgerError::Poisoned)?;
        entries.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }
}

/// Store backed by one JSON file per key inside a directory.
#[derive(Debug, Clone)]
pub struct FileLedgerStore {
    dir: PathBuf,
}

impl FileLedgerStore {
    /// Create a store rooted at `dir`, creating the directory if needed.
    pub fn new(dir: impl Into<PathBuf>) -> LedgerResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Directory holding the ledger files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file backing `key`.
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl LedgerStore for FileLedgerStore {
    fn get(&self, key: &str) -> LedgerResult<Option<Vec<u8>>> {
        match fs::read(self.path_for(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(LedgerError::Io(err)),
        }
    }

    fn set(&self, key: &str, bytes: &[u8]) -> LedgerResult<()> {
        let path = self.path_for(key);
        let temp_path = self.dir.join(format!("{}.json.tmp", key));

        let mut file = fs::File::create(&temp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&temp_path, &path)?;

        Ok(())
    }
}

/// Reads and writes the ledger record, applying the reset rule on load.
#[derive(Debug, Clone)]
pub struct LedgerBook {
    store: Arc<dyn LedgerStore>,
    clock: Arc<dyn Clock>,
    key: String,
}

impl LedgerBook {
    /// Create a book over `store` using `clock` for the current day.
    pub fn new(store: Arc<dyn LedgerStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            key: DEFAULT_LEDGER_KEY.to_string(),
        }
    }

    /// Use a different store key.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    /// Store key for the ledger record.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Current day according to the book's clock.
    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    /// Load the ledger for today. Never writes.
    pub fn load(&self) -> LedgerResult<UsageLedger> {
        let today = self.clock.today();
        let Some(bytes) = self.store.get(&self.key)? else {
            return Ok(UsageLedger::fresh(today));
        };

        let stored: UsageLedger =
            serde_json::from_slice(&bytes).map_err(|e| LedgerError::Corrupt {
                key: self.key.clone(),
                reason: e.to_string(),
            })?;

        Ok(stored.rolled_to(today))
    }

    /// Persist the ledger, overwriting whatever was stored.
    pub fn store(&self, ledger: &UsageLedger) -> LedgerResult<()> {
        let bytes = serde_json::to_vec_pretty(ledger)?;
        self.store.set(&self.key, &bytes)
    }
}
