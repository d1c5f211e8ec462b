//! Declarative response schemas.
//!
//! A [`ResponseSchema`] is declared once per use case. The context assembler
//! renders it into the model instruction and the validator checks model
//! output against the same value.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::ResponseError;

/// Longest rendering of an offending value kept in a violation.
const MAX_ACTUAL_LEN: usize = 80;

/// Expected shape of a model response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResponseShape {
    /// Any non-empty text.
    FreeText,
    /// A JSON object with the given required fields.
    Structured(ResponseSchema),
}

impl ResponseShape {
    /// Structured shape for `schema`.
    pub fn structured(schema: ResponseSchema) -> Self {
        ResponseShape::Structured(schema)
    }

    /// Stable name for logs and the dispatch journal.
    pub fn name(&self) -> &str {
        match self {
            ResponseShape::FreeText => "free_text",
            ResponseShape::Structured(schema) => &schema.name,
        }
    }

    /// The schema, when structured.
    pub fn schema(&self) -> Option<&ResponseSchema> {
        match self {
            ResponseShape::FreeText => None,
            ResponseShape::Structured(schema) => Some(schema),
        }
    }
}

/// Inclusive numeric range. Either side may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

impl Bounds {
    pub fn new(min: f64, max: f64) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
        }
    }

    pub fn is_open(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }

    pub fn contains(&self, value: f64) -> bool {
        self.min.map_or(true, |min| value >= min) && self.max.map_or(true, |max| value <= max)
    }

    /// Render as `0..100`, `>= 0` or `<= 100`.
    pub fn describe(&self) -> String {
        match (self.min, self.max) {
            (Some(min), Some(max)) => format!("{}..{}", format_bound(min), format_bound(max)),
            (Some(min), None) => format!(">= {}", format_bound(min)),
            (None, Some(max)) => format!("<= {}", format_bound(max)),
            (None, None) => String::new(),
        }
    }
}

fn format_bound(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

/// Type of a schema field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldKind {
    String,
    Number {
        #[serde(default, skip_serializing_if = "Bounds::is_open")]
        bounds: Bounds,
    },
    Integer {
        #[serde(default, skip_serializing_if = "Bounds::is_open")]
        bounds: Bounds,
    },
    Boolean,
    Array {
        items: Box<FieldKind>,
    },
    Object {
        fields: Vec<FieldSpec>,
    },
}

impl FieldKind {
    /// Short type name, e.g. `number` or `array<object>`.
    pub fn type_name(&self) -> String {
        match self {
            FieldKind::String => "string".to_string(),
            FieldKind::Number { .. } => "number".to_string(),
            FieldKind::Integer { .. } => "integer".to_string(),
            FieldKind::Boolean => "boolean".to_string(),
            FieldKind::Array { items } => format!("array<{}>", items.type_name()),
            FieldKind::Object { .. } => "object".to_string(),
        }
    }

    /// Placeholder value showing the expected shape.
    pub fn skeleton(&self) -> Value {
        match self {
            FieldKind::String => Value::String(String::new()),
            FieldKind::Number { bounds } | FieldKind::Integer { bounds } => {
                Value::from(bounds.min.unwrap_or(0.0) as i64)
            }
            FieldKind::Boolean => Value::Bool(false),
            FieldKind::Array { items } => Value::Array(vec![items.skeleton()]),
            FieldKind::Object { fields } => object_skeleton(fields),
        }
    }

    fn check(&self, path: &str, value: &Value) -> Result<(), ResponseError> {
        match self {
            FieldKind::String => {
                if !value.is_string() {
                    return Err(violation(path, "string", value));
                }
            }
            FieldKind::Boolean => {
                if !value.is_boolean() {
                    return Err(violation(path, "boolean", value));
                }
            }
            FieldKind::Number { bounds } => {
                let Some(number) = value.as_f64() else {
                    return Err(violation(path, "number", value));
                };
                check_bounds(path, bounds, number, value)?;
            }
            FieldKind::Integer { bounds } => {
                if !(value.is_i64() || value.is_u64()) {
                    return Err(violation(path, "integer", value));
                }
                let number = value.as_f64().unwrap_or_default();
                check_bounds(path, bounds, number, value)?;
            }
            FieldKind::Array { items } => {
                let Some(elements) = value.as_array() else {
                    return Err(violation(path, &self.type_name(), value));
                };
                for (index, element) in elements.iter().enumerate() {
                    items.check(&format!("{}[{}]", path, index), element)?;
                }
            }
            FieldKind::Object { fields } => {
                let Some(map) = value.as_object() else {
                    return Err(violation(path, "object", value));
                };
                check_fields(Some(path), fields, map)?;
            }
        }
        Ok(())
    }
}

/// One required field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    #[serde(flatten)]
    pub kind: FieldKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            description: None,
        }
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::String)
    }

    pub fn number(name: impl Into<String>) -> Self {
        Self::new(
            name,
            FieldKind::Number {
                bounds: Bounds::default(),
            },
        )
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(
            name,
            FieldKind::Integer {
                bounds: Bounds::default(),
            },
        )
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Boolean)
    }

    pub fn array(name: impl Into<String>, items: FieldKind) -> Self {
        Self::new(
            name,
            FieldKind::Array {
                items: Box::new(items),
            },
        )
    }

    pub fn object(name: impl Into<String>, fields: Vec<FieldSpec>) -> Self {
        Self::new(name, FieldKind::Object { fields })
    }

    /// Restrict a number or integer field to `min..=max`. Ignored for other kinds.
    pub fn bounded(mut self, min: f64, max: f64) -> Self {
        if let FieldKind::Number { bounds } | FieldKind::Integer { bounds } = &mut self.kind {
            *bounds = Bounds::new(min, max);
        }
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    fn render(&self, out: &mut String, depth: usize) {
        let pad = "  ".repeat(depth);
        out.push_str(&pad);
        out.push_str("- ");
        out.push_str(&self.name);
        out.push_str(": ");
        out.push_str(&self.kind.type_name());
        if let FieldKind::Number { bounds } | FieldKind::Integer { bounds } = &self.kind {
            if !bounds.is_open() {
                out.push_str(&format!(" in range {}", bounds.describe()));
            }
        }
        if let Some(description) = &self.description {
            out.push_str(" (");
            out.push_str(description);
            out.push(')');
        }
        out.push('\n');

        let nested = match &self.kind {
            FieldKind::Object { fields } => Some(fields),
            FieldKind::Array { items } => match items.as_ref() {
                FieldKind::Object { fields } => Some(fields),
                _ => None,
            },
            _ => None,
        };
        if let Some(fields) = nested {
            for field in fields {
                field.render(out, depth + 1);
            }
        }
    }
}

/// Named set of required top-level fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseSchema {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub fields: Vec<FieldSpec>,
}

impl ResponseSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            fields: Vec::new(),
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    /// Example object with every required field present.
    pub fn skeleton(&self) -> Value {
        object_skeleton(&self.fields)
    }

    /// Instruction text telling the model to answer with this schema only.
    pub fn render_instruction(&self) -> String {
        let mut out = format!(
            "Respond with exactly one JSON object conforming to the schema \"{}\" and nothing else: \
no prose, no markdown, no code fences.\n",
            self.name
        );
        if let Some(description) = &self.description {
            out.push_str(description);
            out.push('\n');
        }
        out.push_str("Required fields:\n");
        for field in &self.fields {
            field.render(&mut out, 0);
        }
        out.push_str("Example of the expected shape:\n");
        out.push_str(&self.skeleton().to_string());
        out
    }

    /// Check that `value` is an object carrying every required field with the
    /// declared type and range. Extra fields are allowed.
    pub fn validate(&self, value: &Value) -> Result<(), ResponseError> {
        let Some(map) = value.as_object() else {
            return Err(violation("$", "object", value));
        };
        check_fields(None, &self.fields, map)
    }
}

fn object_skeleton(fields: &[FieldSpec]) -> Value {
    let mut map = Map::new();
    for field in fields {
        map.insert(field.name.clone(), field.kind.skeleton());
    }
    Value::Object(map)
}

fn check_fields(
    parent: Option<&str>,
    fields: &[FieldSpec],
    map: &Map<String, Value>,
) -> Result<(), ResponseError> {
    for field in fields {
        let path = match parent {
            Some(parent) => format!("{}.{}", parent, field.name),
            None => field.name.clone(),
        };
        let Some(value) = map.get(&field.name) else {
            return Err(ResponseError::SchemaViolation {
                field: path,
                expected: field.kind.type_name(),
                actual: "missing".to_string(),
            });
        };
        field.kind.check(&path, value)?;
    }
    Ok(())
}

fn check_bounds(path: &str, bounds: &Bounds, number: f64, value: &Value) -> Result<(), ResponseError> {
    if bounds.contains(number) {
        Ok(())
    } else {
        Err(violation(path, &bounds.describe(), value))
    }
}

fn violation(path: &str, expected: &str, actual: &Value) -> ResponseError {
    let mut rendered = actual.to_string();
    if rendered.len() > MAX_ACTUAL_LEN {
        let cut = (0..=MAX_ACTUAL_LEN)
            .rev()
            .find(|i| rendered.is_char_boundary(*i))
            .unwrap_or(0);
        rendered.truncate(cut);
        rendered.push_str("...");
    }
    ResponseError::SchemaViolation {
        field: path.to_string(),
        expected: expected.to_string(),
        actual: rendered,
    }
}
