//! HTTP endpoint handlers. These are thin wrappers that forward to the
//! engine; rendered output travels through the delivery channel, so the
//! response body only acknowledges the request.

use std::sync::Arc;

use axum::{
  body::Bytes,
  extract::State,
  http::{HeaderMap, StatusCode},
  response::IntoResponse,
  Json,
};
use chrono::Utc;
use tracing::{debug, error, info, instrument, warn};

use crate::domain::{ChannelId, UserId};
use crate::engine;
use crate::payments::{self, Notification};
use crate::protocol::{DeliveryTarget, EventAck, HealthOut, InboundEvent, ServerMessage};
use crate::state::AppState;
use crate::util::trunc_for_log;

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse {
  Json(HealthOut { ok: true })
}

#[instrument(level = "info", skip(state, event))]
pub async fn http_post_event(
  State(state): State<Arc<AppState>>,
  Json(event): Json<InboundEvent>,
) -> Json<EventAck> {
  Json(handle_event(&state, event).await)
}

/// Dispatch one gateway event. Shared by the HTTP endpoint and the gateway
/// WebSocket.
pub async fn handle_event(state: &Arc<AppState>, event: InboundEvent) -> EventAck {
  debug!(target: "quizpass_backend", ?event, "Gateway event");
  match event {
    InboundEvent::StartTest { user_id, chat_id } => {
      engine::start_session(state, user_id, chat_id, Utc::now());
    }
    InboundEvent::AnswerSelected { user_id, chat_id, question_index, option_label } => {
      engine::submit_answer(state, user_id, chat_id, question_index, &option_label, Utc::now());
    }
    InboundEvent::Navigation { user_id, chat_id, command } => {
      engine::navigate(state, user_id, chat_id, command, Utc::now());
    }
    InboundEvent::Subscribe { user_id, chat_id } => {
      request_payment_link(state, user_id, chat_id).await;
    }
  }
  EventAck::Ack
}

/// Payment-link creation. Failure policy: log it, tell the user to try
/// again later, never retry automatically.
async fn request_payment_link(state: &Arc<AppState>, user: UserId, chat: ChannelId) {
  let Some(client) = state.payments.as_ref() else {
    warn!(target: "payments", user, "Subscribe requested but payments are not configured");
    state.dispatcher.deliver(
      DeliveryTarget::Chat(chat),
      ServerMessage::Notice { text: "Payments are temporarily unavailable. Please try again later.".into() },
    );
    return;
  };

  match client.create_payment_link(user).await {
    Ok(url) => {
      let text = format!(
        "Complete your payment here: {url}\nAccess activates automatically once the payment is confirmed."
      );
      state.dispatcher.deliver(DeliveryTarget::Chat(chat), ServerMessage::PaymentLink { url, text });
    }
    Err(err) => {
      error!(target: "payments", user, error = %err, "Payment link creation failed");
      state.dispatcher.deliver(
        DeliveryTarget::Chat(chat),
        ServerMessage::Notice { text: "Could not create a payment link right now. Please try again later.".into() },
      );
    }
  }
}

/// Payment-provider webhook. The signature is checked over the raw body
/// before anything is parsed; a bad signature mutates nothing.
#[instrument(level = "info", skip(state, headers, body), fields(body_len = body.len()))]
pub async fn http_post_payment_webhook(
  State(state): State<Arc<AppState>>,
  headers: HeaderMap,
  body: Bytes,
) -> StatusCode {
  let Some(secret) = state.webhook_secret.as_deref() else {
    warn!(target: "payments", "Webhook received but no webhook secret is configured");
    return StatusCode::BAD_REQUEST;
  };

  let signature = headers
    .get(payments::SIGNATURE_HEADER)
    .and_then(|v| v.to_str().ok())
    .unwrap_or_default();
  if !payments::verify_signature(secret, &body, signature) {
    warn!(target: "payments", "Webhook rejected: signature mismatch");
    return StatusCode::BAD_REQUEST;
  }

  match payments::parse_notification(&body) {
    Ok(Notification::Grant { user }) => {
      let expires_at = state.grant(user, Utc::now());
      info!(target: "payments", user, %expires_at, "Payment confirmed; subscription activated");
      // Confirmation goes straight to the user, not to any session channel;
      // no active session needs to exist.
      state.dispatcher.deliver(
        DeliveryTarget::User(user),
        ServerMessage::SubscriptionActivated {
          expires_at,
          text: format!(
            "Payment received. Your access is active until {}.",
            expires_at.format("%Y-%m-%d %H:%M UTC")
          ),
        },
      );
      StatusCode::OK
    }
    Ok(Notification::Ignored) => {
      debug!(target: "payments", "Webhook acknowledged without action");
      StatusCode::OK
    }
    Err(err) => {
      error!(
        target: "payments",
        error = %err,
        body = %trunc_for_log(&String::from_utf8_lossy(&body), 256),
        "Webhook body failed to parse"
      );
      StatusCode::INTERNAL_SERVER_ERROR
    }
  }
}
