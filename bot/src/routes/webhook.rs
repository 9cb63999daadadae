//! Chat-platform webhook.
//!
//! The platform POSTs a batch of events with an HMAC signature over the
//! raw body. Each event is handed to the dispatcher on its own task so
//! one slow turn (an LLM call, a storage write) never delays other
//! users; the HTTP response returns as soon as the batch is accepted.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::{Json, Router, routing::post};
use serde::Deserialize;
use utoipa::ToSchema;

use crate::dispatch::{EventKind, InboundEvent};
use crate::error::AppError;
use crate::messenger;
use crate::state::AppState;

pub const SIGNATURE_HEADER: &str = "x-messenger-signature";

pub fn router() -> Router<AppState> {
    Router::new().route("/webhook", post(receive_events))
}

#[derive(Debug, Deserialize, ToSchema)]
struct WebhookPayload {
    #[serde(default)]
    events: Vec<PlatformEvent>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
struct PlatformEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    reply_token: Option<String>,
    #[serde(default)]
    source: Option<EventSource>,
    #[serde(default)]
    message: Option<EventMessage>,
    #[serde(default)]
    postback: Option<EventPostback>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
struct EventSource {
    #[serde(default)]
    user_id: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
struct EventMessage {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
struct EventPostback {
    data: String,
}

/// Receive a batch of chat events
///
/// Authenticated by the platform's HMAC-SHA256 signature over the raw
/// request body. Events are processed asynchronously; delivery uses the
/// reply token with a push fallback.
#[utoipa::path(
    post,
    path = "/webhook",
    request_body = WebhookPayload,
    responses(
        (status = 200, description = "Batch accepted"),
        (status = 400, description = "Malformed payload", body = ondam_core::error::ApiError),
        (status = 401, description = "Bad signature", body = ondam_core::error::ApiError)
    ),
    tag = "webhook"
)]
pub async fn receive_events(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::InvalidSignature)?;
    if !messenger::verify_signature(&state.channel_secret, &body, signature) {
        return Err(AppError::InvalidSignature);
    }

    let payload: WebhookPayload = serde_json::from_slice(&body).map_err(|e| {
        AppError::Validation {
            message: format!("invalid webhook payload: {e}"),
            field: None,
        }
    })?;

    for event in payload.events {
        let Some(inbound) = to_inbound(event) else {
            continue;
        };
        let bot = state.bot.clone();
        let messenger = state.messenger.clone();
        // One task per event: turns for different users proceed
        // independently; same-user races are last-write-wins.
        tokio::spawn(async move {
            let messages = bot.handle_event(&inbound).await;
            messenger
                .deliver(inbound.reply_token.as_deref(), &inbound.user_id, &messages)
                .await;
        });
    }

    Ok((StatusCode::OK, Json(serde_json::json!({ "status": "ok" }))))
}

/// Reduce a platform event to the dispatcher's shape. Events without a
/// user id or a usable payload (joins, unfollows, stickers) are skipped.
fn to_inbound(event: PlatformEvent) -> Option<InboundEvent> {
    let user_id = event.source.and_then(|s| s.user_id)?;
    let (kind, payload) = match event.kind.as_str() {
        "message" => (EventKind::Message, event.message?.text?),
        "postback" => (EventKind::Postback, event.postback?.data),
        _ => return None,
    };
    Some(InboundEvent {
        user_id,
        kind,
        payload,
        reply_token: event.reply_token,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_events_reduce_to_inbound() {
        let raw = serde_json::json!({
            "type": "message",
            "replyToken": "rt-1",
            "source": { "userId": "u1" },
            "message": { "type": "text", "text": "diagnosis" }
        });
        let event: PlatformEvent = serde_json::from_value(raw).unwrap();
        let inbound = to_inbound(event).unwrap();
        assert_eq!(inbound.user_id, "u1");
        assert_eq!(inbound.kind, EventKind::Message);
        assert_eq!(inbound.payload, "diagnosis");
        assert_eq!(inbound.reply_token.as_deref(), Some("rt-1"));
    }

    #[test]
    fn postback_events_reduce_to_inbound() {
        let raw = serde_json::json!({
            "type": "postback",
            "replyToken": "rt-2",
            "source": { "userId": "u2" },
            "postback": { "data": "dx_pain_1_A" }
        });
        let event: PlatformEvent = serde_json::from_value(raw).unwrap();
        let inbound = to_inbound(event).unwrap();
        assert_eq!(inbound.kind, EventKind::Postback);
        assert_eq!(inbound.payload, "dx_pain_1_A");
    }

    #[test]
    fn non_chat_events_are_skipped() {
        let raw = serde_json::json!({
            "type": "follow",
            "source": { "userId": "u3" }
        });
        let event: PlatformEvent = serde_json::from_value(raw).unwrap();
        assert!(to_inbound(event).is_none());

        let raw = serde_json::json!({
            "type": "message",
            "source": { "userId": "u4" },
            "message": { "type": "sticker" }
        });
        let event: PlatformEvent = serde_json::from_value(raw).unwrap();
        assert!(to_inbound(event).is_none());
    }
}
