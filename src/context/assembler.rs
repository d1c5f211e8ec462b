//! Builds model instructions from domain context.

use serde_json::Value;

use super::{ContextPurpose, DomainContext, Fact, Instruction};
use crate::contract::ResponseShape;
use crate::error::PipelineError;

/// Default ceiling on caller content, in characters.
pub const DEFAULT_MAX_CONTENT_CHARS: usize = 20_000;

/// Assembles a system directive and user content for one request.
///
/// Content is never truncated: oversized content is rejected with
/// [`PipelineError::ContentTooLarge`].
#[derive(Debug, Clone)]
pub struct ContextAssembler {
    max_content_chars: usize,
}

impl Default for ContextAssembler {
    fn default() -> Self {
        Self {
            max_content_chars: DEFAULT_MAX_CONTENT_CHARS,
        }
    }
}

impl ContextAssembler {
    pub fn new(max_content_chars: usize) -> Self {
        Self { max_content_chars }
    }

    pub fn max_content_chars(&self) -> usize {
        self.max_content_chars
    }

    /// Reject content longer than the configured maximum.
    pub fn check_content(&self, content: &str) -> Result<(), PipelineError> {
        let actual = content.chars().count();
        if actual > self.max_content_chars {
            return Err(PipelineError::ContentTooLarge {
                max: self.max_content_chars,
                actual,
            });
        }
        Ok(())
    }

    /// Build the instruction for `content` under `context`, asking for `shape`.
    pub fn build(
        &self,
        content: &str,
        context: &DomainContext,
        shape: &ResponseShape,
    ) -> Result<Instruction, PipelineError> {
        self.check_content(content)?;

        let mut directive = purpose_directive(&context.purpose, &context.subject_label);
        directive.push_str(&build_facts(&context.facts));
        directive.push_str("\n\n");
        match shape {
            ResponseShape::FreeText => {
                directive.push_str("Answer in plain text.");
            }
            ResponseShape::Structured(schema) => {
                directive.push_str(&schema.render_instruction());
            }
        }

        Ok(Instruction {
            system_directive: directive,
            user_content: content.to_string(),
        })
    }
}

fn purpose_directive(purpose: &ContextPurpose, subject: &str) -> String {
    match purpose {
        ContextPurpose::DocumentAudit => format!(
            "You audit documents against a blueprint. The document under review is: {}.\n\
Judge it only against the blueprint and checkpoints listed below, one checkpoint at a time.",
            subject
        ),
        ContextPurpose::MissionBriefing => format!(
            "You answer questions about the mission \"{}\".\n\
Use only the facts listed below. If they do not answer the question, say that the \
information is not available.",
            subject
        ),
        ContextPurpose::ProfileEvaluation => format!(
            "You evaluate a candidate profile: {}.\n\
Compare it with the admission criteria listed below and stay factual.",
            subject
        ),
        ContextPurpose::Custom { directive } => directive.replace("{subject}", subject),
    }
}

fn build_facts(facts: &[Fact]) -> String {
    if facts.is_empty() {
        return String::new();
    }

    let mut section = String::from("\n\n### Context\n\n");
    for fact in facts {
        section.push_str("- ");
        section.push_str(&fact.key);
        section.push(':');
        match &fact.value {
            Value::Array(items) => {
                section.push('\n');
                for item in items {
                    section.push_str("  - ");
                    section.push_str(&inline_value(item));
                    section.push('\n');
                }
            }
            Value::Object(map) => {
                section.push('\n');
                for (key, value) in map {
                    section.push_str(&format!("  - {}: {}\n", key, inline_value(value)));
                }
            }
            value => {
                section.push(' ');
                section.push_str(&inline_value(value));
                section.push('\n');
            }
        }
    }

    // Trailing newline is re-added by the caller's separator.
    section.truncate(section.trim_end().len());
    section
}

/// One-line rendering: strings unquoted, objects as `key=value` pairs.
fn inline_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "(none)".to_string(),
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| format!("{}={}", k, inline_value(v)))
            .collect::<Vec<_>>()
            .join(", "),
        Value::Array(items) => items
            .iter()
            .map(inline_value)
            .collect::<Vec<_>>()
            .join("; "),
        other => other.to_string(),
    }
}
