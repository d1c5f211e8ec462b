//! Response schemas for the application's AI-assisted features.
//!
//! Each use case declares its schema here once. The same value drives the
//! instruction text and the validation, and the typed structs below read a
//! validated result.

use serde::{Deserialize, Serialize};

use super::schema::{FieldKind, FieldSpec, ResponseSchema};

pub const DOCUMENT_AUDIT: &str = "document_audit";
pub const PROFILE_EVALUATION: &str = "profile_evaluation";

/// Audit of a document against a blueprint's checkpoints.
pub fn document_audit() -> ResponseSchema {
    ResponseSchema::new(DOCUMENT_AUDIT)
        .describe("Audit the document against every checkpoint of the blueprint.")
        .field(
            FieldSpec::number("score")
                .bounded(0.0, 100.0)
                .describe("overall quality score"),
        )
        .field(FieldSpec::array(
            "checkpointFeedback",
            FieldKind::Object {
                fields: vec![
                    FieldSpec::string("id").describe("checkpoint id from the blueprint"),
                    FieldSpec::boolean("pass"),
                    FieldSpec::string("tip").describe("one concrete improvement"),
                ],
            },
        ))
        .field(FieldSpec::string("overallVerdict"))
}

/// Fit of a candidate profile against a program's admission criteria.
pub fn profile_evaluation() -> ResponseSchema {
    ResponseSchema::new(PROFILE_EVALUATION)
        .describe("Evaluate the candidate profile against the admission criteria.")
        .field(FieldSpec::number("fitScore").bounded(0.0, 100.0))
        .field(FieldSpec::array("strengths", FieldKind::String))
        .field(FieldSpec::array("gaps", FieldKind::String))
        .field(FieldSpec::string("recommendation"))
}

/// Look up a built-in schema by name.
pub fn by_name(name: &str) -> Option<ResponseSchema> {
    match name {
        DOCUMENT_AUDIT => Some(document_audit()),
        PROFILE_EVALUATION => Some(profile_evaluation()),
        _ => None,
    }
}

/// Names of all built-in schemas.
pub fn names() -> &'static [&'static str] {
    &[DOCUMENT_AUDIT, PROFILE_EVALUATION]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentAudit {
    pub score: f64,
    pub checkpoint_feedback: Vec<CheckpointFeedback>,
    pub overall_verdict: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointFeedback {
    pub id: String,
    pub pass: bool,
    pub tip: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileEvaluation {
    pub fit_score: f64,
    pub strengths: Vec<String>,
    pub gaps: Vec<String>,
    pub recommendation: String,
}
