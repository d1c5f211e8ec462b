//! Parsing raw model output against a [`ResponseShape`].

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use super::schema::{ResponseSchema, ResponseShape};
use super::{AuditResult, ResponseError};

fn fenced_block() -> Option<&'static Regex> {
    static FENCED: OnceLock<Option<Regex>> = OnceLock::new();
    FENCED
        .get_or_init(|| Regex::new(r"(?s)```(?:json|JSON)?\s*(\{.*?\})\s*```").ok())
        .as_ref()
}

/// Validate `raw` against `shape`.
///
/// The returned result carries no charge yet; the gateway fills in
/// `estimated_cost` once the ledger has been committed.
pub fn parse_response(raw: &str, shape: &ResponseShape) -> Result<AuditResult, ResponseError> {
    if raw.trim().is_empty() {
        return Err(ResponseError::EmptyResponse);
    }

    let parsed = match shape {
        ResponseShape::FreeText => None,
        ResponseShape::Structured(schema) => Some(parse_structured(raw, schema)?),
    };

    Ok(AuditResult {
        raw: raw.to_string(),
        parsed,
        estimated_cost: 0,
    })
}

fn parse_structured(raw: &str, schema: &ResponseSchema) -> Result<Value, ResponseError> {
    let value = decode_json(raw)?;
    schema.validate(&value)?;
    Ok(value)
}

/// Decode the whole string strictly, falling back to a fenced block or the
/// first balanced object only when the strict decode fails.
fn decode_json(raw: &str) -> Result<Value, ResponseError> {
    let strict_err = match serde_json::from_str::<Value>(raw.trim()) {
        Ok(value) => return Ok(value),
        Err(err) => err,
    };

    if let Some(value) = extract_embedded_object(raw) {
        tracing::debug!("model output carried prose around its JSON; used embedded object");
        return Ok(value);
    }

    Err(ResponseError::MalformedJson {
        reason: strict_err.to_string(),
    })
}

fn extract_embedded_object(raw: &str) -> Option<Value> {
    if let Some(captures) = fenced_block().and_then(|re| re.captures(raw)) {
        if let Ok(value) = serde_json::from_str::<Value>(&captures[1]) {
            return Some(value);
        }
    }

    // Each candidate decodes only its first value and stops at the first
    // error; serde_json's recursion limit bounds how far a failed decode
    // of an unbalanced object can read.
    raw.match_indices('{').find_map(|(start, _)| {
        match serde_json::Deserializer::from_str(&raw[start..])
            .into_iter::<Value>()
            .next()
        {
            Some(Ok(value @ Value::Object(_))) => Some(value),
            _ => None,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::schema::FieldSpec;

    fn score_shape() -> ResponseShape {
        ResponseShape::structured(
            ResponseSchema::new("score_only").field(FieldSpec::number("score").bounded(0.0, 100.0)),
        )
    }

    #[test]
    fn test_free_text_passes_through() {
        let result = parse_response("  The mission starts at 9am.  ", &ResponseShape::FreeText).unwrap();
        assert_eq!(result.raw, "  The mission starts at 9am.  ");
        assert!(result.parsed.is_none());
    }

    #[test]
    fn test_free_text_whitespace_is_empty() {
        let err = parse_response(" \n\t ", &ResponseShape::FreeText).unwrap_err();
        assert_eq!(err, ResponseError::EmptyResponse);
    }

    #[test]
    fn test_not_json_is_malformed() {
        let err = parse_response("not json", &score_shape()).unwrap_err();
        assert!(matches!(err, ResponseError::MalformedJson { .. }));
    }

    #[test]
    fn test_out_of_range_score() {
        let err = parse_response(r#"{"score":150}"#, &score_shape()).unwrap_err();
        assert_eq!(
            err,
            ResponseError::SchemaViolation {
                field: "score".into(),
                expected: "0..100".into(),
                actual: "150".into(),
            }
        );
    }

    #[test]
    fn test_strict_json_parsed() {
        let result = parse_response(r#"{"score": 72}"#, &score_shape()).unwrap();
        assert_eq!(result.parsed.unwrap()["score"], 72);
    }

    #[test]
    fn test_fenced_json_tolerated() {
        let raw = "Here is the audit:\n```json\n{\"score\": 40}\n```\nThanks!";
        let result = parse_response(raw, &score_shape()).unwrap();
        assert_eq!(result.parsed.unwrap()["score"], 40);
    }

    #[test]
    fn test_prose_wrapped_object_tolerated() {
        let raw = r#"Sure {not this} - result: {"score": 12, "note": "a } in a string"} done"#;
        let result = parse_response(raw, &score_shape()).unwrap();
        assert_eq!(result.parsed.unwrap()["note"], "a } in a string");
    }

    #[test]
    fn test_embedded_object_still_validated() {
        let raw = "Result: {\"grade\": \"A\"}";
        let err = parse_response(raw, &score_shape()).unwrap_err();
        assert!(matches!(err, ResponseError::SchemaViolation { field, .. } if field == "score"));
    }

    #[test]
    fn test_strict_non_object_is_violation() {
        let err = parse_response("[1,2,3]", &score_shape()).unwrap_err();
        assert!(matches!(err, ResponseError::SchemaViolation { field, .. } if field == "$"));
    }

    #[test]
    fn test_nested_object_returned_whole() {
        let raw = r#"Audit: {"score": 5, "detail": {"a": "}"}} end"#;
        let result = parse_response(raw, &score_shape()).unwrap();
        let parsed = result.parsed.unwrap();
        assert_eq!(parsed["score"], 5);
        assert_eq!(parsed["detail"]["a"], "}");
    }

    #[test]
    fn test_long_unbalanced_output_fails_in_linear_time() {
        let raw = format!("Result: {}", "{\"a\":".repeat(10_000));
        let started = std::time::Instant::now();
        let err = parse_response(&raw, &score_shape()).unwrap_err();
        assert!(matches!(err, ResponseError::MalformedJson { .. }));
        assert!(
            started.elapsed() < std::time::Duration::from_secs(5),
            "took {:?}",
            started.elapsed()
        );
    }
}
