//! Payment-provider boundary: hosted payment-link creation plus webhook
//! signature verification and notification parsing.
//!
//! NOTE: We never log credentials or the webhook secret, and payloads are
//! truncated before logging.

use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::{info, instrument};

use crate::domain::UserId;
use crate::util::trunc_for_log;

type HmacSha256 = Hmac<Sha256>;

pub const DEFAULT_BASE_URL: &str = "https://api.razorpay.com/v1";
/// Fixed access price in currency minor units (49 x 100).
pub const DEFAULT_AMOUNT_MINOR: u64 = 4900;
/// Header carrying the webhook signature (hex HMAC-SHA256 of the raw body).
pub const SIGNATURE_HEADER: &str = "x-razorpay-signature";

#[derive(Debug, Error)]
pub enum PaymentsError {
  #[error("payment provider request failed: {0}")]
  Http(#[from] reqwest::Error),
  #[error("payment provider response carried no short_url: {0}")]
  BadResponse(String),
}

/// Client for creating hosted payment pages. Present only when credentials
/// are configured; the rest of the service works without it.
pub struct PaymentsClient {
  http: reqwest::Client,
  base_url: String,
  key_id: String,
  key_secret: String,
  amount_minor: u64,
  currency: String,
}

impl PaymentsClient {
  /// Build from env. Returns None when credentials are absent.
  pub fn from_env() -> Option<Self> {
    let key_id = std::env::var("PAYMENT_KEY_ID").ok()?;
    let key_secret = std::env::var("PAYMENT_KEY_SECRET").ok()?;
    let base_url = std::env::var("PAYMENT_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.into());
    let currency = std::env::var("PAYMENT_CURRENCY").unwrap_or_else(|_| "INR".into());
    let http = reqwest::Client::builder()
      .timeout(std::time::Duration::from_secs(15))
      .build()
      .ok()?;
    Some(Self { http, base_url, key_id, key_secret, amount_minor: DEFAULT_AMOUNT_MINOR, currency })
  }

  /// Create a hosted payment page for one access period. The user id
  /// travels in the notes map and comes back in the webhook notification.
  #[instrument(level = "info", skip(self))]
  pub async fn create_payment_link(&self, user: UserId) -> Result<String, PaymentsError> {
    let body = json!({
      "amount": self.amount_minor,
      "currency": self.currency,
      "description": "Test series access",
      "notes": { "user_id": user.to_string() },
      "notify": { "sms": false, "email": false },
      "reminder_enable": true,
    });

    let response = self
      .http
      .post(format!("{}/payment_links", self.base_url))
      .basic_auth(&self.key_id, Some(&self.key_secret))
      .json(&body)
      .send()
      .await?
      .error_for_status()?;

    let value: Value = response.json().await?;
    match value.get("short_url").and_then(Value::as_str) {
      Some(url) => {
        info!(target: "payments", user, "Payment link created");
        Ok(url.to_string())
      }
      None => Err(PaymentsError::BadResponse(trunc_for_log(&value.to_string(), 256))),
    }
  }
}

/// Constant-time check of the hex signature against HMAC-SHA256 over the
/// raw body. Anything that fails to decode fails the check.
pub fn verify_signature(secret: &str, body: &[u8], signature_hex: &str) -> bool {
  let Ok(provided) = hex::decode(signature_hex.trim()) else {
    return false;
  };
  let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
    return false;
  };
  mac.update(body);
  let computed = mac.finalize().into_bytes();
  if provided.len() != computed.len() {
    return false;
  }
  computed.as_slice().ct_eq(provided.as_slice()).into()
}

/// Outcome of parsing a verified notification body.
#[derive(Debug, PartialEq, Eq)]
pub enum Notification {
  /// A successful payment carrying a usable user id.
  Grant { user: UserId },
  /// A recognized-but-irrelevant event, or a payment without a usable
  /// user id. Acknowledged and dropped.
  Ignored,
}

/// Extract the paying user from a notification. The two event shapes carry
/// their notes at different paths; any other event is acknowledged without
/// action, as is a missing or unparsable user id.
pub fn parse_notification(body: &[u8]) -> Result<Notification, serde_json::Error> {
  let value: Value = serde_json::from_slice(body)?;
  let notes = match value.get("event").and_then(Value::as_str) {
    Some("payment.captured") => value.pointer("/payload/payment/entity/notes"),
    Some("payment_link.paid") => value.pointer("/payload/payment_link/entity/notes"),
    _ => None,
  };
  let user = notes
    .and_then(|n| n.get("user_id"))
    .and_then(Value::as_str)
    .and_then(|s| s.parse::<UserId>().ok());
  Ok(match user {
    Some(user) => Notification::Grant { user },
    None => Notification::Ignored,
  })
}
