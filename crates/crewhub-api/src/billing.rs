//! Billing: checkout-session creation and the payment-provider webhook.
//!
//! The webhook verifies the provider's signature header — HMAC-SHA256 over
//! `"{timestamp}.{raw body}"` under the shared signing secret — then applies
//! the event through the store, which makes the subscription upsert and the
//! profile flag update one transaction and ignores replayed event ids.

use axum::{
  Json,
  body::Bytes,
  extract::State,
  http::HeaderMap,
};
use crewhub_core::{
  billing::{BillingEvent, EventOutcome, Subscription},
  error::AsCoreError,
  store::MarketStore,
};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::Sha256;
use uuid::Uuid;

use crate::{AppState, auth::CurrentUser, error::ApiError};

/// Header carrying the provider's signature.
pub const SIGNATURE_HEADER: &str = "stripe-signature";

// ─── Signature verification ──────────────────────────────────────────────────

/// Verify a `t=<ts>,v1=<hex>` signature header against the raw payload.
/// Comparison is constant-time via [`Mac::verify_slice`].
pub fn verify_signature(header: &str, payload: &[u8], secret: &str) -> bool {
  let mut timestamp = None;
  let mut candidates = Vec::new();

  for part in header.split(',') {
    let Some((key, value)) = part.trim().split_once('=') else {
      continue;
    };
    match key {
      "t" => timestamp = Some(value),
      "v1" => candidates.push(value),
      _ => {}
    }
  }

  let Some(timestamp) = timestamp else {
    return false;
  };
  let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
    return false;
  };
  mac.update(timestamp.as_bytes());
  mac.update(b".");
  mac.update(payload);

  candidates.iter().any(|candidate| {
    hex::decode(candidate)
      .is_ok_and(|sig| mac.clone().verify_slice(&sig).is_ok())
  })
}

// ─── Event decoding ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
  pub id:   String,
  #[serde(rename = "type")]
  pub kind: String,
  pub data: WebhookData,
}

#[derive(Debug, Deserialize)]
pub struct WebhookData {
  pub object: serde_json::Value,
}

/// Decode the two event types the system reacts to. `Ok(None)` means a type
/// we acknowledge and drop.
pub fn decode_event(event: &WebhookEvent) -> Result<Option<BillingEvent>, String> {
  let object = &event.data.object;
  let str_field = |name: &str| -> Result<String, String> {
    object
      .get(name)
      .and_then(|v| v.as_str())
      .map(str::to_owned)
      .ok_or_else(|| format!("missing field {name:?} in {} event", event.kind))
  };

  match event.kind.as_str() {
    "checkout.session.completed" => {
      let user_id = str_field("client_reference_id")?;
      let user_id = Uuid::parse_str(&user_id)
        .map_err(|_| format!("client_reference_id is not a uuid: {user_id:?}"))?;
      Ok(Some(BillingEvent::CheckoutCompleted {
        user_id,
        provider_customer_id:     str_field("customer")?,
        provider_subscription_id: str_field("subscription")?,
      }))
    }
    "customer.subscription.deleted" => {
      Ok(Some(BillingEvent::SubscriptionDeleted {
        provider_subscription_id: str_field("id")?,
      }))
    }
    _ => Ok(None),
  }
}

// ─── Webhook handler ─────────────────────────────────────────────────────────

/// `POST /billing/webhook`
///
/// 400 with the raw error on signature or payload failure; 200
/// `{"received": true}` otherwise, mirroring what the provider expects.
pub async fn webhook<S>(
  State(state): State<AppState<S>>,
  headers: HeaderMap,
  body: Bytes,
) -> Result<Json<serde_json::Value>, ApiError>
where
  S: MarketStore + Clone + Send + Sync + 'static,
  S::Error: std::error::Error + AsCoreError + Send + Sync + 'static,
{
  let signature = headers
    .get(SIGNATURE_HEADER)
    .and_then(|v| v.to_str().ok())
    .ok_or_else(|| ApiError::BadRequest("missing signature header".into()))?;

  if !verify_signature(signature, &body, &state.config.billing.webhook_secret) {
    tracing::warn!("webhook rejected: signature verification failed");
    return Err(ApiError::BadRequest("signature verification failed".into()));
  }

  let event: WebhookEvent = serde_json::from_slice(&body)
    .map_err(|e| ApiError::BadRequest(format!("malformed event payload: {e}")))?;

  match decode_event(&event).map_err(ApiError::BadRequest)? {
    None => {
      tracing::debug!(kind = %event.kind, "webhook event ignored");
    }
    Some(billing_event) => {
      let outcome = state
        .store
        .apply_billing_event(event.id.clone(), billing_event)
        .await
        .map_err(ApiError::from_store)?;

      match outcome {
        EventOutcome::Applied => {
          tracing::info!(id = %event.id, kind = %event.kind, "webhook event applied");
        }
        EventOutcome::AlreadyProcessed => {
          tracing::info!(id = %event.id, "webhook event replayed; ignored");
        }
        EventOutcome::NoMatch => {
          tracing::warn!(id = %event.id, "webhook event matched no records");
        }
      }
    }
  }

  Ok(Json(json!({ "received": true })))
}

// ─── Checkout ────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
  pub session_id: String,
}

/// `POST /billing/checkout` — ask the provider for a hosted checkout session
/// for the premium plan and hand the session id back to the client.
pub async fn create_checkout<S>(
  State(state): State<AppState<S>>,
  user: CurrentUser,
) -> Result<Json<CheckoutResponse>, ApiError>
where
  S: MarketStore + Clone + Send + Sync + 'static,
  S::Error: std::error::Error + AsCoreError + Send + Sync + 'static,
{
  let billing = &state.config.billing;
  let user_id = user.account.user_id.to_string();

  let response = reqwest::Client::new()
    .post("https://api.stripe.com/v1/checkout/sessions")
    .bearer_auth(&billing.secret_key)
    .form(&[
      ("mode", "subscription"),
      ("line_items[0][price]", billing.price_id.as_str()),
      ("line_items[0][quantity]", "1"),
      ("client_reference_id", user_id.as_str()),
      ("success_url", billing.success_url.as_str()),
      ("cancel_url", billing.cancel_url.as_str()),
    ])
    .send()
    .await
    .map_err(|e| ApiError::Upstream(format!("checkout request failed: {e}")))?;

  if !response.status().is_success() {
    let status = response.status();
    let detail = response.text().await.unwrap_or_default();
    tracing::warn!(%status, "checkout session creation rejected");
    return Err(ApiError::Upstream(format!(
      "provider returned {status}: {detail}"
    )));
  }

  let session: serde_json::Value = response
    .json()
    .await
    .map_err(|e| ApiError::Upstream(format!("malformed provider response: {e}")))?;

  let session_id = session
    .get("id")
    .and_then(|v| v.as_str())
    .ok_or_else(|| ApiError::Upstream("provider response missing id".into()))?;

  Ok(Json(CheckoutResponse { session_id: session_id.to_owned() }))
}

/// `GET /billing/subscription` — the caller's most recent subscription.
pub async fn subscription<S>(
  State(state): State<AppState<S>>,
  user: CurrentUser,
) -> Result<Json<Option<Subscription>>, ApiError>
where
  S: MarketStore + Clone + Send + Sync + 'static,
  S::Error: std::error::Error + AsCoreError + Send + Sync + 'static,
{
  let sub = state
    .store
    .subscription_for_user(user.account.user_id)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(sub))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn sign(payload: &[u8], secret: &str, timestamp: &str) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);
    format!("t={timestamp},v1={}", hex::encode(mac.finalize().into_bytes()))
  }

  #[test]
  fn valid_signature_accepted() {
    let payload = br#"{"id":"evt_1"}"#;
    let header = sign(payload, "whsec_test", "1700000000");
    assert!(verify_signature(&header, payload, "whsec_test"));
  }

  #[test]
  fn wrong_secret_rejected() {
    let payload = br#"{"id":"evt_1"}"#;
    let header = sign(payload, "whsec_test", "1700000000");
    assert!(!verify_signature(&header, payload, "whsec_other"));
  }

  #[test]
  fn tampered_payload_rejected() {
    let header = sign(br#"{"id":"evt_1"}"#, "whsec_test", "1700000000");
    assert!(!verify_signature(&header, br#"{"id":"evt_2"}"#, "whsec_test"));
  }

  #[test]
  fn garbage_header_rejected() {
    assert!(!verify_signature("", b"x", "whsec_test"));
    assert!(!verify_signature("v1=abcd", b"x", "whsec_test"));
    assert!(!verify_signature("t=123", b"x", "whsec_test"));
    assert!(!verify_signature("t=123,v1=zzzz", b"x", "whsec_test"));
  }

  #[test]
  fn extra_signature_versions_tolerated() {
    let payload = b"payload";
    let good = sign(payload, "whsec_test", "42");
    let header = format!("{good},v0=deadbeef");
    assert!(verify_signature(&header, payload, "whsec_test"));
  }

  #[test]
  fn decodes_checkout_completed() {
    let user = Uuid::new_v4();
    let event: WebhookEvent = serde_json::from_value(serde_json::json!({
      "id": "evt_1",
      "type": "checkout.session.completed",
      "data": { "object": {
        "client_reference_id": user.to_string(),
        "customer": "cus_9",
        "subscription": "sub_9"
      }}
    }))
    .unwrap();

    let decoded = decode_event(&event).unwrap().unwrap();
    assert_eq!(decoded, BillingEvent::CheckoutCompleted {
      user_id:                  user,
      provider_customer_id:     "cus_9".into(),
      provider_subscription_id: "sub_9".into(),
    });
  }

  #[test]
  fn decodes_subscription_deleted() {
    let event: WebhookEvent = serde_json::from_value(serde_json::json!({
      "id": "evt_2",
      "type": "customer.subscription.deleted",
      "data": { "object": { "id": "sub_9" } }
    }))
    .unwrap();

    let decoded = decode_event(&event).unwrap().unwrap();
    assert_eq!(decoded, BillingEvent::SubscriptionDeleted {
      provider_subscription_id: "sub_9".into(),
    });
  }

  #[test]
  fn unknown_event_type_is_dropped() {
    let event: WebhookEvent = serde_json::from_value(serde_json::json!({
      "id": "evt_3",
      "type": "invoice.paid",
      "data": { "object": {} }
    }))
    .unwrap();
    assert!(decode_event(&event).unwrap().is_none());
  }

  #[test]
  fn missing_fields_are_errors() {
    let event: WebhookEvent = serde_json::from_value(serde_json::json!({
      "id": "evt_4",
      "type": "checkout.session.completed",
      "data": { "object": { "customer": "cus_9" } }
    }))
    .unwrap();
    assert!(decode_event(&event).is_err());
  }
}
