//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use serde::{Deserialize, Serialize};

use crate::domain::{Category, Challenge, Collection, Dare, DareId};
use crate::error::{FieldViolation, GenerationError};
use crate::state::{GenerationOutcome, ViewSnapshot};

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    GetState,
    RequestGeneration {
        category: String,
        #[serde(default)]
        context: String,
        #[serde(default)]
        difficulty: Option<String>,
    },
    AcceptPreview,
    CompleteDare {
        id: DareId,
    },
    DeleteDare {
        id: DareId,
        origin: Collection,
    },
    Reset,
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    State {
        view: ViewOut,
    },
    Generation {
        generation: GenerationOut,
        applied: bool,
    },
    Accepted {
        dare: Dare,
    },
    Completed {
        dare: Dare,
    },
    Deleted {
        dare: Dare,
        origin: Collection,
    },
    Error {
        code: &'static str,
        message: String,
    },
}

/// Render-ready view of the last generation request.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GenerationOut {
    Idle,
    Pending {
        ticket: u64,
        category: String,
        difficulty: String,
    },
    Success {
        ticket: u64,
        challenge: Challenge,
    },
    Failure {
        ticket: u64,
        error: ErrorBody,
    },
}

/// JSON error body used by HTTP responses and generation failures.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub error: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<FieldViolation>,
}

impl ErrorBody {
    pub fn new(code: &'static str, error: impl Into<String>) -> Self {
        Self { code, error: error.into(), violations: Vec::new() }
    }
}

/// Stable error codes for generation failures.
pub fn generation_error_body(e: &GenerationError) -> ErrorBody {
    match e {
        GenerationError::InvalidRequest(msg) => ErrorBody::new("INVALID_REQUEST", msg.clone()),
        GenerationError::Validation(v) => ErrorBody {
            code: "GENERATION_INVALID",
            error: "The generated challenge was malformed. Try again.".into(),
            violations: v.violations.clone(),
        },
        GenerationError::Transport(crate::error::TransportError::Timeout(_)) => {
            ErrorBody::new("GENERATION_TIMEOUT", e.to_string())
        }
        GenerationError::Transport(crate::error::TransportError::NotConfigured) => {
            ErrorBody::new("GENERATION_UNAVAILABLE", e.to_string())
        }
        GenerationError::Transport(t) => ErrorBody::new("GENERATION_FAILED", t.to_string()),
    }
}

pub fn to_generation_out(g: &GenerationOutcome) -> GenerationOut {
    match g {
        GenerationOutcome::Idle => GenerationOut::Idle,
        GenerationOutcome::Pending { ticket, category, difficulty } => GenerationOut::Pending {
            ticket: *ticket,
            category: category.clone(),
            difficulty: difficulty.to_string(),
        },
        GenerationOutcome::Success { ticket, challenge } => GenerationOut::Success {
            ticket: *ticket,
            challenge: challenge.clone(),
        },
        GenerationOutcome::Failure { ticket, error } => GenerationOut::Failure {
            ticket: *ticket,
            error: generation_error_body(error),
        },
    }
}

/// Everything the UI renders in one payload.
#[derive(Clone, Debug, Serialize)]
pub struct ViewOut {
    pub ongoing: Vec<Dare>,
    pub completed: Vec<Dare>,
    pub generation: GenerationOut,
}

pub fn to_view_out(v: ViewSnapshot) -> ViewOut {
    ViewOut {
        generation: to_generation_out(&v.generation),
        ongoing: v.ongoing,
        completed: v.completed,
    }
}

//
// HTTP request/response DTOs
//

#[derive(Debug, Deserialize)]
pub struct GenerateIn {
    pub category: String,
    #[serde(default)]
    pub context: String,
    #[serde(default)]
    pub difficulty: Option<String>,
}

#[derive(Serialize)]
pub struct GenerateOut {
    pub applied: bool,
    pub generation: GenerationOut,
}

#[derive(Debug, Deserialize)]
pub struct DeleteQuery {
    pub origin: Collection,
}

#[derive(Debug, Deserialize)]
pub struct ModelsQuery {
    pub contains: Option<String>,
}

#[derive(Serialize)]
pub struct ModelsOut {
    pub models: Vec<String>,
}

#[derive(Serialize)]
pub struct CategoriesOut {
    pub categories: Vec<Category>,
}

#[derive(Serialize)]
pub struct DareOut {
    pub dare: Dare,
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
    pub store_loaded: bool,
    pub generation_enabled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{TransportError, ValidationError, ViolationKind};

    #[test]
    fn client_messages_parse_from_tagged_json() {
        let m: ClientWsMessage = serde_json::from_str(r#"{"type":"request_generation","category":"tech"}"#).expect("parse");
        assert!(matches!(m, ClientWsMessage::RequestGeneration { ref context, difficulty: None, .. } if context.is_empty()));

        let m: ClientWsMessage = serde_json::from_str(r#"{"type":"delete_dare","id":17,"origin":"completed"}"#).expect("parse");
        assert!(matches!(m, ClientWsMessage::DeleteDare { id: DareId(17), origin: Collection::Completed }));
    }

    #[test]
    fn failure_view_keeps_field_detail() {
        let err = GenerationError::Validation(ValidationError {
            violations: vec![FieldViolation { field: "steps".into(), kind: ViolationKind::Missing }],
        });
        let out = to_generation_out(&GenerationOutcome::Failure { ticket: 3, error: err });
        let json = serde_json::to_value(&out).expect("serialize");
        assert_eq!(json["status"], "failure");
        assert_eq!(json["error"]["code"], "GENERATION_INVALID");
        assert_eq!(json["error"]["violations"][0]["field"], "steps");
        assert_eq!(json["error"]["violations"][0]["kind"], "missing");
    }

    #[test]
    fn timeout_has_its_own_code() {
        let body = generation_error_body(&GenerationError::Transport(TransportError::Timeout(std::time::Duration::from_secs(2))));
        assert_eq!(body.code, "GENERATION_TIMEOUT");
        assert!(body.violations.is_empty());
    }

    #[test]
    fn idle_serializes_as_status_only() {
        let json = serde_json::to_value(GenerationOut::Idle).expect("serialize");
        assert_eq!(json, serde_json::json!({ "status": "idle" }));
    }
}
