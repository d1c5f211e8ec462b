//! Domain context and model instruction assembly.

mod assembler;

pub use assembler::{ContextAssembler, DEFAULT_MAX_CONTENT_CHARS};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What the model is being asked to do with the context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContextPurpose {
    /// Audit a document against a blueprint and its checkpoints.
    DocumentAudit,
    /// Answer questions restricted to one mission's facts.
    MissionBriefing,
    /// Evaluate a candidate profile against admission criteria.
    ProfileEvaluation,
    /// Caller-supplied directive. `{subject}` is replaced by the subject label.
    Custom { directive: String },
}

/// One named fact. Values may be strings, numbers, lists or objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    pub key: String,
    pub value: Value,
}

/// Structured facts steering one request. Owned by the caller; the pipeline
/// only reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainContext {
    pub purpose: ContextPurpose,
    /// What is being evaluated, e.g. "Motivation letter for Summer Mission 2026".
    pub subject_label: String,
    /// Facts in the order they should appear in the instruction.
    #[serde(default)]
    pub facts: Vec<Fact>,
}

impl DomainContext {
    pub fn new(purpose: ContextPurpose, subject_label: impl Into<String>) -> Self {
        Self {
            purpose,
            subject_label: subject_label.into(),
            facts: Vec::new(),
        }
    }

    /// Append a fact.
    pub fn fact(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.facts.push(Fact {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    /// Look up a fact by key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.facts.iter().find(|f| f.key == key).map(|f| &f.value)
    }
}

/// What is sent to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    pub system_directive: String,
    pub user_content: String,
}

impl Instruction {
    /// Characters sent to the model, counted as Unicode scalar values.
    pub fn input_chars(&self) -> usize {
        self.system_directive.chars().count() + self.user_content.chars().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_context_builder_keeps_order() {
        let context = DomainContext::new(ContextPurpose::MissionBriefing, "Harbor cleanup")
            .fact("organizer", "Blue Coast e.V.")
            .fact("capacity", 40)
            .fact("checkpoints", json!(["Arrive 8:00", "Bring gloves"]));

        let keys: Vec<_> = context.facts.iter().map(|f| f.key.as_str()).collect();
        assert_eq!(keys, vec!["organizer", "capacity", "checkpoints"]);
        assert_eq!(context.get("capacity"), Some(&json!(40)));
        assert!(context.get("missing").is_none());
    }

    #[test]
    fn test_context_from_json() {
        let context: DomainContext = serde_json::from_value(json!({
            "purpose": {"kind": "custom", "directive": "Summarize {subject}."},
            "subjectLabel": "Meeting notes"
        }))
        .unwrap();
        assert!(context.facts.is_empty());
        assert_eq!(
            context.purpose,
            ContextPurpose::Custom {
                directive: "Summarize {subject}.".into()
            }
        );
    }

    #[test]
    fn test_instruction_input_chars() {
        let instruction = Instruction {
            system_directive: "abc".into(),
            user_content: "héllo".into(),
        };
        assert_eq!(instruction.input_chars(), 8);
    }
}
