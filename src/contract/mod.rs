//! Response contract between the pipeline and the model.
//!
//! A [`ResponseShape`] says what the caller expects back: free text, or a JSON
//! object matching a [`ResponseSchema`]. [`parse_response`] turns raw model
//! output into an [`AuditResult`] or a typed [`ResponseError`].

pub mod catalog;
mod parse;
mod schema;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use parse::parse_response;
pub use schema::{Bounds, FieldKind, FieldSpec, ResponseSchema, ResponseShape};

/// Why a model response could not be used.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResponseError {
    /// Nothing but whitespace came back.
    #[error("model returned an empty response")]
    EmptyResponse,

    /// No JSON object could be decoded.
    #[error("model output is not valid JSON: {reason}")]
    MalformedJson { reason: String },

    /// JSON decoded but a required field is missing, mistyped or out of range.
    #[error("schema violation at '{field}': expected {expected}, got {actual}")]
    SchemaViolation {
        field: String,
        expected: String,
        actual: String,
    },
}

impl ResponseError {
    /// Stable label for logs and the dispatch journal.
    pub fn label(&self) -> &'static str {
        match self {
            ResponseError::EmptyResponse => "empty_response",
            ResponseError::MalformedJson { .. } => "malformed_json",
            ResponseError::SchemaViolation { .. } => "schema_violation",
        }
    }
}

/// Successful model response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditResult {
    /// Text exactly as returned by the model.
    pub raw: String,
    /// Validated object; present only for structured shapes.
    pub parsed: Option<Value>,
    /// Units charged against the ledger for this call.
    pub estimated_cost: u64,
}

impl AuditResult {
    /// Deserialize the validated object into a typed view.
    ///
    /// Returns `Ok(None)` for free-text results.
    pub fn parsed_as<T: DeserializeOwned>(&self) -> Result<Option<T>, serde_json::Error> {
        self.parsed
            .as_ref()
            .map(|value| serde_json::from_value(value.clone()))
            .transpose()
    }

    pub(crate) fn with_cost(mut self, units: u64) -> Self {
        self.estimated_cost = units;
        self
    }
}
