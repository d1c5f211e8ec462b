//! Caller-facing error taxonomy for a dispatch.

use thiserror::Error;

use crate::budget::{LedgerError, QuotaExceeded};
use crate::contract::ResponseError;
use crate::transport::TransportError;

/// Every way a dispatch can end without a usable result.
///
/// Callers must tell quota exhaustion apart from transient failures: only the
/// latter are worth retrying before the next daily reset.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Daily budget would be exceeded. Not charged.
    #[error(transparent)]
    QuotaExceeded(#[from] QuotaExceeded),

    /// Content is longer than the configured maximum. Not charged.
    #[error("content too large: {actual} characters, maximum is {max}")]
    ContentTooLarge { max: usize, actual: usize },

    /// The model could not be reached or refused the call. Not charged.
    #[error("upstream model call failed: {0}")]
    Upstream(#[from] TransportError),

    /// The model answered but its output is unusable. Charged per the
    /// configured charge policy.
    #[error("unusable model response ({charged_units} units charged): {source}")]
    Contract {
        #[source]
        source: ResponseError,
        charged_units: u64,
    },

    /// The caller cancelled before the model answered. Not charged.
    #[error("dispatch cancelled")]
    Cancelled,

    /// The usage ledger could not be read or written.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl PipelineError {
    /// Stable snake_case label for logs and the dispatch journal.
    pub fn label(&self) -> &'static str {
        match self {
            PipelineError::QuotaExceeded(_) => "quota_exceeded",
            PipelineError::ContentTooLarge { .. } => "content_too_large",
            PipelineError::Upstream(_) => "upstream_error",
            PipelineError::Contract { source, .. } => source.label(),
            PipelineError::Cancelled => "cancelled",
            PipelineError::Ledger(_) => "ledger_fault",
        }
    }

    /// Whether the caller may reasonably retry the same input.
    ///
    /// Quota exhaustion and oversized content never succeed on retry.
    /// Contract failures are reported as not retryable even though a
    /// nondeterministic model might answer differently the second time.
    pub fn is_retryable(&self) -> bool {
        match self {
            PipelineError::Upstream(err) => err.is_transient(),
            PipelineError::Cancelled => true,
            _ => false,
        }
    }

    /// Units charged to the ledger by the failed call.
    pub fn charged_units(&self) -> u64 {
        match self {
            PipelineError::Contract { charged_units, .. } => *charged_units,
            _ => 0,
        }
    }

    /// The response contract error, if that is why the call failed.
    pub fn response_error(&self) -> Option<&ResponseError> {
        match self {
            PipelineError::Contract { source, .. } => Some(source),
            _ => None,
        }
    }
}
