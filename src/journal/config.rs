use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Default retention period in days.
pub const DEFAULT_RETENTION_DAYS: u64 = 30;

/// Settings for the dispatch journal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JournalConfig {
    /// Whether dispatches are journaled at all.
    pub enabled: bool,
    /// Journal directory. `None` uses the default data directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
    /// Retention period in days (0 disables retention pruning).
    pub retention_days: u64,
}

impl JournalConfig {
    /// Create a config with the specified retention period.
    pub fn new(retention_days: u64) -> Self {
        Self {
            enabled: true,
            dir: None,
            retention_days,
        }
    }

    pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self::new(DEFAULT_RETENTION_DAYS)
    }
}
