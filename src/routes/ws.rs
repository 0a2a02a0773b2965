//! Gateway WebSocket: the bridge to the chat transport. Inbound user events
//! arrive as JSON messages and are acknowledged per message; outbound
//! deliveries (question renders, summaries, payment confirmations) are
//! pushed to every connected gateway as they happen.

use std::sync::Arc;

use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, instrument, warn};

use crate::protocol::{EventAck, InboundEvent};
use crate::routes::http::handle_event;
use crate::state::AppState;

#[instrument(level = "info", skip(ws, state))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
  info!(target: "quizpass_backend", "Gateway WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_gateway(socket, state))
}

#[instrument(level = "info", skip(socket, state))]
async fn handle_gateway(socket: WebSocket, state: Arc<AppState>) {
  info!(target: "quizpass_backend", "Gateway connected");
  let (mut sender, mut receiver) = socket.split();

  // Funnel broadcast deliveries into a local queue so the single socket
  // sender can serve both acks and pushes.
  let (out_tx, mut out_rx) = tokio::sync::mpsc::unbounded_channel::<String>();
  let mut deliveries = state.dispatcher.subscribe();
  let forward = tokio::spawn(async move {
    loop {
      match deliveries.recv().await {
        Ok(delivery) => {
          let out = match serde_json::to_string(&delivery) {
            Ok(out) => out,
            Err(e) => {
              error!(target: "quizpass_backend", error = %e, "Delivery serialization error");
              continue;
            }
          };
          if out_tx.send(out).is_err() {
            break;
          }
        }
        Err(RecvError::Lagged(skipped)) => {
          warn!(target: "quizpass_backend", skipped, "Gateway fell behind; deliveries dropped");
        }
        Err(RecvError::Closed) => break,
      }
    }
  });

  loop {
    tokio::select! {
      inbound = receiver.next() => {
        match inbound {
          Some(Ok(Message::Text(txt))) => {
            // Parse, dispatch, acknowledge.
            let ack = match serde_json::from_str::<InboundEvent>(&txt) {
              Ok(event) => {
                debug!(target: "quizpass_backend", ?event, "WS event received");
                handle_event(&state, event).await
              }
              Err(e) => EventAck::Error { message: format!("Invalid JSON: {}", e) },
            };
            let out = serde_json::to_string(&ack).unwrap_or_else(|e| {
              serde_json::json!({ "type": "error", "message": format!("Serialization error: {}", e) }).to_string()
            });
            if sender.send(Message::Text(out)).await.is_err() {
              break;
            }
          }
          Some(Ok(Message::Ping(payload))) => {
            let _ = sender.send(Message::Pong(payload)).await;
          }
          Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
          Some(Ok(_)) => {}
        }
      }
      delivery = out_rx.recv() => {
        match delivery {
          Some(out) => {
            if sender.send(Message::Text(out)).await.is_err() {
              break;
            }
          }
          None => break,
        }
      }
    }
  }

  forward.abort();
  info!(target: "quizpass_backend", "Gateway disconnected");
}
