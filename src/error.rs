//! Error types for generation, validation, and the dare store.
//!
//! Every failure in the core is returned as one of these; none of them is fatal
//! to the process. The HTTP layer maps them to status codes in `routes::http`.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::domain::{Collection, DareId};

/// What is wrong with a single field of a candidate challenge.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ViolationKind {
  Missing,
  WrongType { expected: &'static str, found: &'static str },
  NotInEnum { value: String },
  Empty,
  NotJson { detail: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FieldViolation {
  pub field: String,
  #[serde(flatten)]
  pub kind: ViolationKind,
}

impl fmt::Display for FieldViolation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.kind {
      ViolationKind::Missing => write!(f, "{}: missing", self.field),
      ViolationKind::WrongType { expected, found } => {
        write!(f, "{}: expected {}, found {}", self.field, expected, found)
      }
      ViolationKind::NotInEnum { value } => {
        write!(f, "{}: '{}' is not one of Easy, Medium, Hard", self.field, value)
      }
      ViolationKind::Empty => write!(f, "{}: must not be empty", self.field),
      ViolationKind::NotJson { detail } => write!(f, "{}: not valid JSON ({})", self.field, detail),
    }
  }
}

/// Candidate challenge rejected by the schema. Holds every violation found.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("challenge failed validation: {}", join_violations(.violations))]
pub struct ValidationError {
  pub violations: Vec<FieldViolation>,
}

fn join_violations(v: &[FieldViolation]) -> String {
  v.iter().map(|x| x.to_string()).collect::<Vec<_>>().join("; ")
}

/// Failure talking to the model provider.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
  #[error("no model provider configured (set OPENAI_API_KEY or GOOGLE_GENERATIVE_AI_API_KEY)")]
  NotConfigured,

  #[error("model call timed out after {0:?}")]
  Timeout(Duration),

  #[error("network error: {0}")]
  Network(String),

  #[error("provider HTTP {status}: {message}")]
  Http { status: u16, message: String },

  #[error("malformed provider response: {0}")]
  MalformedResponse(String),
}

/// Outcome of a failed generation attempt. Terminal for that attempt.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
  #[error("invalid generation request: {0}")]
  InvalidRequest(String),

  #[error(transparent)]
  Validation(#[from] ValidationError),

  #[error(transparent)]
  Transport(#[from] TransportError),
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
  #[error("dare store has not finished loading")]
  NotLoaded,

  #[error("dare {id} not found in {collection}")]
  NotFound { id: DareId, collection: Collection },

  #[error("failed to persist '{key}': {source}")]
  Persistence {
    key: &'static str,
    #[source]
    source: std::io::Error,
  },

  #[error("could not read '{key}'; it will not be overwritten: {source}")]
  Unreadable {
    key: &'static str,
    #[source]
    source: std::io::Error,
  },

  #[error("no dare id left after {last}")]
  IdsExhausted { last: DareId },
}

/// Errors from presentation-level commands.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
  #[error("there is no generated challenge to accept")]
  NoPreview,

  #[error(transparent)]
  Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn validation_error_lists_every_field() {
    let err = ValidationError {
      violations: vec![
        FieldViolation { field: "steps".into(), kind: ViolationKind::Missing },
        FieldViolation { field: "difficulty".into(), kind: ViolationKind::NotInEnum { value: "Insane".into() } },
      ],
    };
    let msg = err.to_string();
    assert!(msg.contains("steps: missing"), "{msg}");
    assert!(msg.contains("'Insane' is not one of"), "{msg}");
  }

  #[test]
  fn violation_serializes_with_kind_tag() {
    let v = FieldViolation {
      field: "title".into(),
      kind: ViolationKind::WrongType { expected: "string", found: "number" },
    };
    let json = serde_json::to_value(&v).expect("serialize");
    assert_eq!(json["field"], "title");
    assert_eq!(json["kind"], "wrong_type");
    assert_eq!(json["expected"], "string");
  }
}
