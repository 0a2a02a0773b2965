//! QuizPass · subscription-gated test series backend
//!
//! - Axum HTTP + WebSocket gateway API
//! - Payment-provider webhook for subscription activation
//! - In-memory session and subscription state
//!
//! Important env variables:
//!   PORT          : u16 (default 3000)
//!   QUIZ_CONFIG_PATH   : path to TOML config (engine tuning + question bank)
//!   PAYMENT_KEY_ID     : enables payment-link creation (with the secret)
//!   PAYMENT_KEY_SECRET : provider API secret
//!   PAYMENT_WEBHOOK_SECRET : enables webhook signature verification
//!   LOG_LEVEL    : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT      : "pretty" (default) or "json"

mod telemetry;
mod util;
mod domain;
mod config;
mod bank;
mod state;
mod protocol;
mod dispatch;
mod engine;
mod payments;
mod routes;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{info, instrument};

use crate::config::load_app_config_from_env;
use crate::dispatch::Dispatcher;
use crate::payments::PaymentsClient;
use crate::routes::build_router;
use crate::state::AppState;

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Engine tuning and the optional question bank come from TOML; missing or
  // broken config falls back to defaults plus the built-in seed bank.
  let cfg = load_app_config_from_env().unwrap_or_default();

  let payments = PaymentsClient::from_env();
  if payments.is_none() {
    info!(target: "quizpass_backend", "Payments disabled (no PAYMENT_KEY_ID / PAYMENT_KEY_SECRET).");
  }
  let webhook_secret = std::env::var("PAYMENT_WEBHOOK_SECRET").ok();
  if webhook_secret.is_none() {
    info!(target: "quizpass_backend", "Webhook verification disabled (no PAYMENT_WEBHOOK_SECRET).");
  }

  // Build shared application state (registries, bank, delivery channel).
  let state = Arc::new(AppState::new(cfg, Dispatcher::new(256), payments, webhook_secret));

  // Build the HTTP router with routes, CORS and tracing layers.
  let app = build_router(state.clone());

  // Read port from env or default to 3000.
  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "quizpass_backend", %addr, "HTTP server listening");
  axum::serve(listener, app)
    .with_graceful_shutdown(async {
      let _ = tokio::signal::ctrl_c().await;
      info!(target: "quizpass_backend", "Shutdown signal received");
    })
    .await?;
  Ok(())
}
