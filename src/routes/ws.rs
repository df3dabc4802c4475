//! WebSocket upgrade + message loop. Each client message is parsed as JSON and
//! forwarded to `AppState`. We reply with a single JSON message per request.
//!
//! Generation requests run in their own task, so a `reset` or a newer request
//! on the same socket is handled while the model call is still in flight.

use std::sync::Arc;
use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use tokio::sync::mpsc;
use tracing::{info, error, instrument, debug};

use crate::protocol::{generation_error_body, to_view_out, ClientWsMessage, GenerationOut, ServerWsMessage};
use crate::routes::http::{parse_difficulty, store_error_status, ApiError};
use crate::error::{CommandError, StoreError};
use crate::state::AppState;

#[instrument(level = "info", skip(ws, state))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
  info!(target: "dare_yourself", "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state))
}

#[instrument(level = "info", skip(socket, state))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
  info!(target: "dare_yourself", "WebSocket connected");
  let (tx, mut rx) = mpsc::unbounded_channel::<ServerWsMessage>();

  loop {
    tokio::select! {
      incoming = socket.recv() => {
        let Some(Ok(msg)) = incoming else { break };
        match msg {
          Message::Text(txt) => match serde_json::from_str::<ClientWsMessage>(&txt) {
            Ok(incoming) => {
              debug!(target: "dare_yourself", "WS received: {:?}", &incoming);
              dispatch_client_ws(incoming, &state, &tx).await;
            }
            Err(e) => {
              let _ = tx.send(ServerWsMessage::Error { code: "BAD_REQUEST", message: format!("Invalid JSON: {}", e) });
            }
          },
          Message::Ping(payload) => { let _ = socket.send(Message::Pong(payload)).await; }
          Message::Close(_) => break,
          _ => {}
        }
      }
      Some(reply) = rx.recv() => {
        let out = serde_json::to_string(&reply).unwrap_or_else(|e| {
          serde_json::json!({ "type": "error", "code": "INTERNAL_ERROR", "message": format!("Serialization error: {}", e) }).to_string()
        });
        if let Err(e) = socket.send(Message::Text(out)).await {
          error!(target: "dare_yourself", error = %e, "WS send error");
          break;
        }
      }
    }
  }
  info!(target: "dare_yourself", "WebSocket disconnected");
}

/// Queue the reply for one client message. Generation requests are spawned
/// and reply when the model call settles; everything else replies in order.
pub(crate) async fn dispatch_client_ws(msg: ClientWsMessage, state: &Arc<AppState>, tx: &mpsc::UnboundedSender<ServerWsMessage>) {
  if matches!(msg, ClientWsMessage::RequestGeneration { .. }) {
    let state = state.clone();
    let tx = tx.clone();
    tokio::spawn(async move {
      let reply = handle_client_ws(msg, &state).await;
      let _ = tx.send(reply);
    });
  } else {
    let _ = tx.send(handle_client_ws(msg, state).await);
  }
}

fn store_error_msg(e: &StoreError) -> ServerWsMessage {
  ServerWsMessage::Error { code: store_error_status(e).1, message: e.to_string() }
}

#[instrument(level = "info", skip(state))]
pub(crate) async fn handle_client_ws(msg: ClientWsMessage, state: &AppState) -> ServerWsMessage {
  match msg {
    ClientWsMessage::Ping => ServerWsMessage::Pong,

    ClientWsMessage::GetState => ServerWsMessage::State { view: to_view_out(state.snapshot().await) },

    ClientWsMessage::RequestGeneration { category, context, difficulty } => {
      let difficulty = match parse_difficulty(difficulty.as_deref()) {
        Ok(d) => d,
        Err(e) => return ServerWsMessage::Error { code: "BAD_REQUEST", message: e.to_string() },
      };
      let report = state.request_generation(&category, &context, difficulty).await;
      info!(target: "generation", ticket = report.ticket, applied = report.applied, ok = report.result.is_ok(), "WS generation finished");
      let generation = match report.result {
        Ok(challenge) => GenerationOut::Success { ticket: report.ticket, challenge },
        Err(error) => GenerationOut::Failure { ticket: report.ticket, error: generation_error_body(&error) },
      };
      ServerWsMessage::Generation { generation, applied: report.applied }
    }

    ClientWsMessage::AcceptPreview => match state.accept_preview().await {
      Ok(dare) => ServerWsMessage::Accepted { dare },
      Err(CommandError::Store(e)) => store_error_msg(&e),
      Err(e) => ServerWsMessage::Error { code: "NO_PREVIEW", message: ApiError::from(e).to_string() },
    },

    ClientWsMessage::CompleteDare { id } => match state.complete_dare(id).await {
      Ok(dare) => ServerWsMessage::Completed { dare },
      Err(e) => store_error_msg(&e),
    },

    ClientWsMessage::DeleteDare { id, origin } => match state.delete_dare(id, origin).await {
      Ok(dare) => ServerWsMessage::Deleted { dare, origin },
      Err(e) => store_error_msg(&e),
    },

    ClientWsMessage::Reset => {
      state.reset().await;
      ServerWsMessage::State { view: to_view_out(state.snapshot().await) }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::{Collection, DareId};
  use std::time::Duration;

  use crate::generator::tests::{sprint_json, StubModel};
  use crate::state::tests::loaded_state;

  fn to_json(m: &ServerWsMessage) -> serde_json::Value {
    serde_json::to_value(m).expect("serialize")
  }

  #[tokio::test]
  async fn ws_commands_drive_the_lifecycle() {
    let state = loaded_state(Some(StubModel::ok(sprint_json()))).await;

    let reply = handle_client_ws(ClientWsMessage::RequestGeneration {
      category: "fitness".into(),
      context: String::new(),
      difficulty: Some("Hard".into()),
    }, &state).await;
    let json = to_json(&reply);
    assert_eq!(json["type"], "generation");
    assert_eq!(json["generation"]["challenge"]["title"], "10-Minute Sprint");

    let json = to_json(&handle_client_ws(ClientWsMessage::AcceptPreview, &state).await);
    assert_eq!(json["type"], "accepted");
    let id = DareId(json["dare"]["id"].as_u64().expect("id"));

    let json = to_json(&handle_client_ws(ClientWsMessage::DeleteDare { id, origin: Collection::Completed }, &state).await);
    assert_eq!(json["type"], "error");
    assert_eq!(json["code"], "NOT_FOUND");

    let json = to_json(&handle_client_ws(ClientWsMessage::CompleteDare { id }, &state).await);
    assert_eq!(json["type"], "completed");

    let json = to_json(&handle_client_ws(ClientWsMessage::GetState, &state).await);
    assert_eq!(json["view"]["completed"][0]["id"], id.0);
    assert_eq!(json["view"]["ongoing"], serde_json::json!([]));
  }

  #[tokio::test]
  async fn reset_on_the_same_socket_supersedes_a_pending_generation() {
    let mut slow = StubModel::ok(sprint_json());
    slow.delay = Some(Duration::from_millis(200));
    let state = Arc::new(loaded_state(Some(slow)).await);
    let (tx, mut rx) = mpsc::unbounded_channel();

    dispatch_client_ws(ClientWsMessage::RequestGeneration {
      category: "fitness".into(),
      context: String::new(),
      difficulty: None,
    }, &state, &tx).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    dispatch_client_ws(ClientWsMessage::Reset, &state, &tx).await;

    let first = to_json(&rx.recv().await.expect("reset reply"));
    assert_eq!(first["type"], "state");
    assert_eq!(first["view"]["generation"]["status"], "idle");

    let second = to_json(&rx.recv().await.expect("generation reply"));
    assert_eq!(second["type"], "generation");
    assert_eq!(second["applied"], false);
    assert_eq!(second["generation"]["status"], "success");

    // the stale result never reached the preview
    let json = to_json(&handle_client_ws(ClientWsMessage::GetState, &state).await);
    assert_eq!(json["view"]["generation"]["status"], "idle");
  }

  #[tokio::test]
  async fn accept_without_preview_is_an_error() {
    let state = loaded_state(None).await;
    let json = to_json(&handle_client_ws(ClientWsMessage::AcceptPreview, &state).await);
    assert_eq!(json["code"], "NO_PREVIEW");
    let json = to_json(&handle_client_ws(ClientWsMessage::Ping, &state).await);
    assert_eq!(json, serde_json::json!({ "type": "pong" }));
  }
}
