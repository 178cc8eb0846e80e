//! OneStep · Vocabulary Trainer Backend
//!
//! - Axum HTTP API: day catalog, Learn/Answer study sessions, contextual paragraphs
//! - Chat-completions proxy that injects the upstream credential
//! - Static SPA fallback (./static/index.html)
//!
//! Important env variables:
//!   PORT                     : u16 (default 3000)
//!   ONESTEP_CONFIG_PATH      : path to TOML config (vocabulary path, generation, proxy)
//!   VOCABULARY_PATH          : XML vocabulary source (default "Database/vocabulary_data.xml")
//!   HF_TOKEN                 : upstream bearer credential (generator + proxy)
//!   GENERATION_BASE_URL      : default "https://router.huggingface.co/v1"
//!   GENERATION_MODEL         : default "moonshotai/Kimi-K2-Instruct-0905"
//!   GENERATION_TIMEOUT_SECS  : optional client timeout
//!   LOG_LEVEL                : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT               : "pretty" (default) or "json"

mod telemetry;
mod util;
mod domain;
mod config;
mod catalog;
mod session;
mod upstream;
mod paragraph;
mod state;
mod protocol;
mod error;
mod routes;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::config::load_app_config_from_env;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  let config = load_app_config_from_env();

  // Catalog is loaded once here and shared read-only from then on.
  let state = Arc::new(AppState::new(&config));

  let app = build_router(state.clone());

  // Read port from env or default to 3000.
  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "onestep", %addr, "HTTP server listening");
  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await?;
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    warn!(target: "onestep", error = %e, "Failed to listen for Ctrl-C");
    std::future::pending::<()>().await;
  }
  info!(target: "onestep", "Shutdown signal received");
}
