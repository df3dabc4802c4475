//! Dare Yourself · Challenge Backend
//!
//! - Generates "dare" challenges through an OpenAI-compatible model call and
//!   validates them against a fixed schema
//! - Tracks accepted dares (ongoing / completed) in a local JSON store
//! - Axum HTTP + WebSocket API, static SPA fallback (./static/index.html)
//!
//! Important env variables:
//!   PORT                          : u16 (default 3000)
//!   OPENAI_API_KEY                : enables generation via OpenAI
//!   GOOGLE_GENERATIVE_AI_API_KEY  : enables generation via Gemini (if no OpenAI key)
//!   OPENAI_BASE_URL               : override the provider endpoint
//!   OPENAI_MODEL                  : default "gpt-4o-mini" / "gemini-2.0-flash"
//!   DARE_CONFIG_PATH              : path to TOML config (prompts, limits, storage, categories)
//!   DARE_DATA_DIR                 : where ongoing.json / completed.json live (default ./data)
//!   LOG_LEVEL                     : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT                    : "pretty" (default) or "json"

mod telemetry;
mod util;
mod domain;
mod error;
mod config;
mod schema;
mod generator;
mod openai;
mod store;
mod state;
mod protocol;
mod routes;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::routes::build_router;
use crate::state::AppState;
use crate::store::CollectionLoad;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Build shared application state (store medium, provider client, prompts).
  let state = Arc::new(AppState::from_env());

  // Load persisted dares before accepting any request that could overwrite them.
  let report = state.load_store().await;
  for (name, status) in [("ongoing", &report.ongoing), ("completed", &report.completed)] {
    match status {
      CollectionLoad::Corrupt { reason } => {
        warn!(target: "dares", collection = name, %reason, "Persisted dares were unparsable and have been reset");
      }
      CollectionLoad::Unreadable { reason } => {
        warn!(target: "dares", collection = name, %reason, "Persisted dares could not be read; changes to them are refused until they can");
      }
      _ => {}
    }
  }
  info!(target: "dares", ongoing = ?report.ongoing, completed = ?report.completed, repaired = report.repaired, "Persisted dares loaded");

  // Build the HTTP router with routes, CORS and tracing layers.
  let app = build_router(state.clone());

  // Read port from env or default to 3000.
  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "dare_yourself", %addr, "HTTP server listening");
  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await?;
  info!(target: "dare_yourself", "Server stopped");
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    warn!(target: "dare_yourself", error = %e, "Could not listen for Ctrl-C; running until killed");
    std::future::pending::<()>().await;
  }
}
