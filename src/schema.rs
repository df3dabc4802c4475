//! Challenge schema: validation of untrusted model output and the JSON Schema
//! we send to the provider as the structured-output contract.
//!
//! Validation walks every field and collects all violations instead of
//! stopping at the first one, so callers (and logs) see the full picture.
//! Accepted values are returned exactly as received, never trimmed or rewritten.

use serde_json::{json, Map, Value};

use crate::domain::{Challenge, Difficulty};
use crate::error::{FieldViolation, ValidationError, ViolationKind};

/// Validate an arbitrary JSON value as a `Challenge`.
pub fn validate_challenge(value: &Value) -> Result<Challenge, ValidationError> {
  let obj = match value.as_object() {
    Some(o) => o,
    None => {
      return Err(ValidationError {
        violations: vec![violation("$", ViolationKind::WrongType { expected: "object", found: type_name(value) })],
      })
    }
  };

  let mut violations = Vec::new();

  let title = required_text(obj, "title", &mut violations);
  let estimated_time = required_string(obj, "estimatedTime", &mut violations);
  let fun_fact = required_text(obj, "funFact", &mut violations);
  let difficulty = required_difficulty(obj, &mut violations);
  let steps = required_steps(obj, &mut violations);

  match (title, difficulty, estimated_time, steps, fun_fact) {
    (Some(title), Some(difficulty), Some(estimated_time), Some(steps), Some(fun_fact)) if violations.is_empty() => {
      Ok(Challenge { title, difficulty, estimated_time, steps, fun_fact })
    }
    _ => Err(ValidationError { violations }),
  }
}

/// Parse raw model text and validate it. Non-JSON text is a validation failure
/// at path `$`, not a transport failure: the provider answered, just badly.
pub fn validate_challenge_text(text: &str) -> Result<Challenge, ValidationError> {
  let payload = strip_code_fence(text);
  let value: Value = serde_json::from_str(payload).map_err(|e| ValidationError {
    violations: vec![violation("$", ViolationKind::NotJson { detail: e.to_string() })],
  })?;
  validate_challenge(&value)
}

/// JSON Schema for a challenge, in the subset accepted by OpenAI-style
/// `response_format: json_schema` (strict mode needs every property required
/// and `additionalProperties: false`).
pub fn challenge_json_schema() -> Value {
  json!({
    "type": "object",
    "properties": {
      "title": { "type": "string", "description": "Short, catchy name of the dare." },
      "difficulty": { "type": "string", "enum": Difficulty::ALL.iter().map(|d| d.as_str()).collect::<Vec<_>>() },
      "estimatedTime": { "type": "string", "description": "Human readable duration, e.g. \"30 minutes\"." },
      "steps": { "type": "array", "items": { "type": "string" }, "minItems": 1 },
      "funFact": { "type": "string" }
    },
    "required": ["title", "difficulty", "estimatedTime", "steps", "funFact"],
    "additionalProperties": false
  })
}

fn violation(field: &str, kind: ViolationKind) -> FieldViolation {
  FieldViolation { field: field.to_string(), kind }
}

fn type_name(v: &Value) -> &'static str {
  match v {
    Value::Null => "null",
    Value::Bool(_) => "boolean",
    Value::Number(_) => "number",
    Value::String(_) => "string",
    Value::Array(_) => "array",
    Value::Object(_) => "object",
  }
}

/// Present and a string; may be empty.
fn required_string(obj: &Map<String, Value>, field: &str, out: &mut Vec<FieldViolation>) -> Option<String> {
  match obj.get(field) {
    None | Some(Value::Null) => {
      out.push(violation(field, ViolationKind::Missing));
      None
    }
    Some(Value::String(s)) => Some(s.clone()),
    Some(other) => {
      out.push(violation(field, ViolationKind::WrongType { expected: "string", found: type_name(other) }));
      None
    }
  }
}

/// Present, a string, and not blank.
fn required_text(obj: &Map<String, Value>, field: &str, out: &mut Vec<FieldViolation>) -> Option<String> {
  let s = required_string(obj, field, out)?;
  if s.trim().is_empty() {
    out.push(violation(field, ViolationKind::Empty));
    return None;
  }
  Some(s)
}

fn required_difficulty(obj: &Map<String, Value>, out: &mut Vec<FieldViolation>) -> Option<Difficulty> {
  let raw = required_string(obj, "difficulty", out)?;
  match Difficulty::from_wire(&raw) {
    Some(d) => Some(d),
    None => {
      out.push(violation("difficulty", ViolationKind::NotInEnum { value: raw }));
      None
    }
  }
}

fn required_steps(obj: &Map<String, Value>, out: &mut Vec<FieldViolation>) -> Option<Vec<String>> {
  let items = match obj.get("steps") {
    None | Some(Value::Null) => {
      out.push(violation("steps", ViolationKind::Missing));
      return None;
    }
    Some(Value::Array(items)) => items,
    Some(other) => {
      out.push(violation("steps", ViolationKind::WrongType { expected: "array", found: type_name(other) }));
      return None;
    }
  };

  if items.is_empty() {
    out.push(violation("steps", ViolationKind::Empty));
    return None;
  }

  let before = out.len();
  let mut steps = Vec::with_capacity(items.len());
  for (i, item) in items.iter().enumerate() {
    let path = format!("steps[{i}]");
    match item {
      Value::String(s) if s.trim().is_empty() => out.push(violation(&path, ViolationKind::Empty)),
      Value::String(s) => steps.push(s.clone()),
      other => out.push(violation(&path, ViolationKind::WrongType { expected: "string", found: type_name(other) })),
    }
  }
  if out.len() > before { None } else { Some(steps) }
}

/// Models sometimes wrap JSON in a Markdown fence even when asked not to.
fn strip_code_fence(text: &str) -> &str {
  let t = text.trim();
  let Some(rest) = t.strip_prefix("```") else { return t };
  let rest = rest.strip_prefix("json").unwrap_or(rest);
  rest.strip_suffix("```").unwrap_or(rest).trim()
}
