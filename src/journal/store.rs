use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{Duration, NaiveDate, Utc};
use thiserror::Error;

use crate::journal::config::JournalConfig;
use crate::journal::record::DispatchRecord;

const FILE_PREFIX: &str = "dispatches-";
const FILE_SUFFIX: &str = ".jsonl";

/// Errors that can occur during journal operations.
#[derive(Error, Debug)]
pub enum JournalError {
    /// IO error during file operations.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Dispatch identifier was empty.
    #[error("Invalid dispatch ID")]
    InvalidDispatchId,
}

/// Result type for journal operations.
pub type JournalResult<T> = Result<T, JournalError>;

/// Append-only dispatch journal, one JSON-lines file per UTC day.
#[derive(Debug, Clone)]
pub struct JournalStore {
    dir: PathBuf,
    retention_days: u64,
    write_lock: Arc<Mutex<()>>,
}

impl JournalStore {
    /// Create a journal rooted at `dir`.
    pub fn new(dir: impl Into<PathBuf>, config: &JournalConfig) -> JournalResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            retention_days: config.retention_days,
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    /// Append one record to the file for its day.
    pub fn append(&self, record: &DispatchRecord) -> JournalResult<()> {
        if record.dispatch_id.trim().is_empty() {
            return Err(JournalError::InvalidDispatchId);
        }

        let json = serde_json::to_string(record)?;
        let path = self.day_path(record.recorded_at.date_naive());

        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        writeln!(file, "{}", json)?;
        file.sync_all()?;

        Ok(())
    }

    /// All records for one day, in append order.
    pub fn read_day(&self, date: NaiveDate) -> JournalResult<Vec<DispatchRecord>> {
        let file = match fs::File::open(self.day_path(date)) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(JournalError::Io(err)),
        };

        let mut records = Vec::new();
        for line in io::BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            records.push(serde_json::from_str(&line)?);
        }
        Ok(records)
    }

    /// Delete day files older than the retention period. Returns how many
    /// files were removed.
    pub fn enforce_retention(&self) -> JournalResult<usize> {
        if self.retention_days == 0 {
            return Ok(0);
        }

        let cutoff = Utc::now().date_naive() - Duration::days(self.retention_days as i64);
        let mut deleted = 0;

        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let Some(date) = parse_day(&entry.file_name().to_string_lossy()) else {
                continue;
            };
            if date < cutoff {
                fs::remove_file(entry.path())?;
                deleted += 1;
            }
        }

        if deleted > 0 {
            tracing::info!(deleted, dir = %self.dir.display(), "pruned dispatch journal");
        }
        Ok(deleted)
    }

    /// Directory holding the journal files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn day_path(&self, date: NaiveDate) -> PathBuf {
        self.dir
            .join(format!("{}{}{}", FILE_PREFIX, date.format("%Y-%m-%d"), FILE_SUFFIX))
    }
}

fn parse_day(file_name: &str) -> Option<NaiveDate> {
    let date = file_name.strip_prefix(FILE_PREFIX)?.strip_suffix(FILE_SUFFIX)?;
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}

/// Process-unique dispatch identifier.
pub fn generate_dispatch_id() -> String {
    static SEQUENCE: AtomicU64 = AtomicU64::new(0);
    let timestamp_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("dispatch-{}-{}-{}", timestamp_ms, std::process::id(), seq)
}
