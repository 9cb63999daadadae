//! Payment-provider webhook.
//!
//! Thin pass-through: a verified `checkout.completed` event flips the
//! profile's subscribed flag. Everything else about billing lives with
//! the provider.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::{Json, Router, routing::post};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use utoipa::ToSchema;

use crate::error::AppError;
use crate::state::AppState;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-billing-signature";

pub fn router() -> Router<AppState> {
    Router::new().route("/v1/billing/webhook", post(billing_webhook))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct BillingEvent {
    /// Event type, e.g. "checkout.completed"
    #[serde(rename = "type")]
    pub kind: String,
    pub data: BillingData,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct BillingData {
    /// Chat-platform user id carried through checkout metadata
    pub user_id: String,
    /// Purchased plan token
    pub plan: String,
}

/// Receive a payment-provider event
///
/// Authenticated by a hex HMAC-SHA256 signature over the raw body.
/// `checkout.completed` marks the user subscribed; other event types
/// are acknowledged and ignored.
#[utoipa::path(
    post,
    path = "/v1/billing/webhook",
    request_body = BillingEvent,
    responses(
        (status = 200, description = "Event processed or ignored"),
        (status = 400, description = "Malformed payload", body = ondam_core::error::ApiError),
        (status = 401, description = "Bad signature", body = ondam_core::error::ApiError)
    ),
    tag = "billing"
)]
pub async fn billing_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::InvalidSignature)?;
    if !verify_hex_signature(&state.billing_secret, &body, signature) {
        return Err(AppError::InvalidSignature);
    }

    let event: BillingEvent = serde_json::from_slice(&body).map_err(|e| {
        AppError::Validation {
            message: format!("invalid billing payload: {e}"),
            field: None,
        }
    })?;

    if event.kind != "checkout.completed" {
        tracing::debug!(kind = %event.kind, "ignoring billing event");
        return Ok((StatusCode::OK, Json(serde_json::json!({ "status": "ignored" }))));
    }

    state
        .store
        .set_subscribed(&event.data.user_id, &event.data.plan)
        .await
        .map_err(|e| AppError::Internal(format!("failed to record subscription: {e}")))?;

    tracing::info!(user_id = %event.data.user_id, plan = %event.data.plan, "subscription recorded");
    Ok((StatusCode::OK, Json(serde_json::json!({ "status": "ok" }))))
}

/// Verify hex(HMAC-SHA256(secret, raw body)) from the provider.
fn verify_hex_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_signature_round_trips() {
        let secret = "billing-secret";
        let body = br#"{"type":"checkout.completed"}"#;
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        let signature = hex::encode(mac.finalize().into_bytes());

        assert!(verify_hex_signature(secret, body, &signature));
        assert!(!verify_hex_signature(secret, b"tampered", &signature));
        assert!(!verify_hex_signature(secret, body, "zz-not-hex"));
    }

    #[test]
    fn checkout_event_parses() {
        let event: BillingEvent = serde_json::from_str(
            r#"{"type":"checkout.completed","data":{"user_id":"u1","plan":"monthly"}}"#,
        )
        .unwrap();
        assert_eq!(event.kind, "checkout.completed");
        assert_eq!(event.data.user_id, "u1");
        assert_eq!(event.data.plan, "monthly");
    }
}
