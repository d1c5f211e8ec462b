use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current journal schema version.
pub const JOURNAL_SCHEMA_VERSION: u32 = 1;

/// Terminal state a dispatch ended in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchOutcome {
    Done,
    Rejected,
    Failed,
    Cancelled,
}

impl DispatchOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchOutcome::Done => "done",
            DispatchOutcome::Rejected => "rejected",
            DispatchOutcome::Failed => "failed",
            DispatchOutcome::Cancelled => "cancelled",
        }
    }
}

/// One line of the dispatch journal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchRecord {
    /// Journal schema version.
    pub schema_version: u32,
    /// Identifier correlating log lines for one dispatch.
    pub dispatch_id: String,
    /// When the dispatch reached its terminal state.
    pub recorded_at: DateTime<Utc>,
    /// Subject label from the domain context.
    pub subject_label: String,
    /// Response shape name (`free_text` or the schema name).
    pub shape: String,
    pub outcome: DispatchOutcome,
    /// Error label when the outcome is not `done`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_label: Option<String>,
    /// Units estimated before admission.
    pub estimated_units: u64,
    /// Units committed to the ledger.
    pub charged_units: u64,
    /// Wall time from dispatch to terminal state.
    pub duration_ms: u64,
}

impl DispatchRecord {
    /// Create a record stamped with the current time.
    pub fn new(
        dispatch_id: impl Into<String>,
        subject_label: impl Into<String>,
        shape: impl Into<String>,
        outcome: DispatchOutcome,
    ) -> Self {
        Self {
            schema_version: JOURNAL_SCHEMA_VERSION,
            dispatch_id: dispatch_id.into(),
            recorded_at: Utc::now(),
            subject_label: subject_label.into(),
            shape: shape.into(),
            outcome,
            error_label: None,
            estimated_units: 0,
            charged_units: 0,
            duration_ms: 0,
        }
    }
}
