//! Recall · Active Recall Study Backend
//!
//! - Axum HTTP API with cookie-based JWT sessions
//! - Question generation and answer grading via OpenAI
//! - PostgreSQL storage, Redis question cache (in-memory fallbacks for both)
//!
//! Important env variables:
//!   PORT                : u16 (default 3000)
//!   DATABASE_URL        : postgres connection string (or DB_USER/DB_PASSWORD/DB_HOST/DB_PORT/DB_NAME)
//!   DB_MAX_CONNECTIONS  : pool size (default 10)
//!   REDIS_URL           : e.g. "redis://127.0.0.1:6379"
//!   JWT_SECRET          : token signing key; authenticated routes answer 500 without it
//!   JWT_TTL_SECS        : token and cookie lifetime (default 86400)
//!   COOKIE_SECURE       : "true" to mark the session cookie Secure
//!   BCRYPT_COST         : default 10
//!   CORS_ALLOW_ORIGINS  : comma-separated; empty allows any origin without credentials
//!   MAX_INPUT_CHARS     : study text limit (default 20000)
//!   MAX_ANSWER_CHARS    : learner answer limit (default 5000)
//!   OPENAI_API_KEY      : enables OpenAI integration if present
//!   OPENAI_BASE_URL     : default "https://api.openai.com/v1"
//!   OPENAI_FAST_MODEL   : default "gpt-4o-mini" (grading)
//!   OPENAI_STRONG_MODEL : default "gpt-4o" (generation)
//!   PROMPTS_CONFIG_PATH : path to TOML prompt overrides
//!   LOG_LEVEL           : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT          : "pretty" (default) or "json"

mod telemetry;
mod util;
mod domain;
mod config;
mod validation;
mod error;
mod auth;
mod cache;
mod store;
mod openai;
mod state;
mod recall;
mod protocol;
mod routes;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::routes::{build_router, cors_layer};
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  // .env first so LOG_LEVEL/LOG_FORMAT from it reach the subscriber.
  let _ = dotenvy::dotenv();
  telemetry::init_tracing();
  let config = AppConfig::from_env();

  // Storage, cache and the OpenAI client.
  let state = Arc::new(AppState::connect(&config).await?);

  let app = build_router(state, cors_layer(&config.cors_origins));

  let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
  let listener = TcpListener::bind(addr).await?;
  info!(target: "recall_backend", %addr, "HTTP server listening");
  axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
  info!(target: "recall_backend", "Server stopped");
  Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() {
  let ctrl_c = async {
    if let Err(e) = tokio::signal::ctrl_c().await {
      warn!(target: "recall_backend", error = %e, "Failed to listen for Ctrl-C");
      std::future::pending::<()>().await;
    }
  };

  #[cfg(unix)]
  let terminate = async {
    match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
      Ok(mut sig) => {
        sig.recv().await;
      }
      Err(e) => {
        warn!(target: "recall_backend", error = %e, "Failed to listen for SIGTERM");
        std::future::pending::<()>().await;
      }
    }
  };
  #[cfg(not(unix))]
  let terminate = std::future::pending::<()>();

  tokio::select! {
    _ = ctrl_c => {},
    _ = terminate => {},
  }
  info!(target: "recall_backend", "Shutdown signal received");
}
