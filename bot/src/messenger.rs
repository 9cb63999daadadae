//! Chat-platform delivery client.
//!
//! Two channels: "reply" consumes the single-use token attached to the
//! inbound event and only works for a short window; "push" goes to the
//! user's durable address and always works but counts against quota.
//! `deliver` tries reply first and falls back to push; both failing is
//! logged and swallowed (best-effort delivery, per the platform's
//! semantics for expired reply tokens).

use base64::Engine;
use hmac::{Hmac, Mac};
use ondam_core::message::OutboundMessage;
use serde_json::json;
use sha2::Sha256;
use std::time::Duration;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("send request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("platform rejected send with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

pub struct Messenger {
    client: reqwest::Client,
    api_base: String,
    access_token: String,
}

impl Messenger {
    pub fn new(api_base: String, access_token: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            api_base,
            access_token,
        }
    }

    /// Reply using the inbound event's single-use token.
    pub async fn reply(
        &self,
        reply_token: &str,
        messages: &[OutboundMessage],
    ) -> Result<(), SendError> {
        let body = json!({
            "replyToken": reply_token,
            "messages": render_messages(messages),
        });
        self.post("/v2/bot/message/reply", body).await
    }

    /// Push to the user's durable address.
    pub async fn push(
        &self,
        user_id: &str,
        messages: &[OutboundMessage],
    ) -> Result<(), SendError> {
        let body = json!({
            "to": user_id,
            "messages": render_messages(messages),
        });
        self.post("/v2/bot/message/push", body).await
    }

    /// Two-tier delivery: reply, then push, then give up with a log
    /// line. The user simply misses one turn if both fail.
    pub async fn deliver(
        &self,
        reply_token: Option<&str>,
        user_id: &str,
        messages: &[OutboundMessage],
    ) {
        if messages.is_empty() {
            return;
        }

        if let Some(token) = reply_token {
            match self.reply(token, messages).await {
                Ok(()) => return,
                Err(err) => {
                    tracing::warn!(user_id, %err, "reply failed, falling back to push");
                }
            }
        }

        if let Err(err) = self.push(user_id, messages).await {
            tracing::error!(user_id, %err, "push fallback failed, dropping outbound messages");
        }
    }

    async fn post(&self, path: &str, body: serde_json::Value) -> Result<(), SendError> {
        let res = self
            .client
            .post(format!("{}{}", self.api_base, path))
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await?;

        if !res.status().is_success() {
            let status = res.status().as_u16();
            let body = res.text().await.unwrap_or_default();
            return Err(SendError::Rejected { status, body });
        }
        Ok(())
    }
}

/// Verify the platform's webhook signature: base64(HMAC-SHA256(channel
/// secret, raw body)). Comparison is constant-time via the Mac verify.
pub fn verify_signature(channel_secret: &str, body: &[u8], signature: &str) -> bool {
    let Ok(expected) = base64::engine::general_purpose::STANDARD.decode(signature) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(channel_secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Render abstract messages to the platform wire format. Menus become
/// text with quick-reply postback buttons (13-item platform cap).
fn render_messages(messages: &[OutboundMessage]) -> Vec<serde_json::Value> {
    messages.iter().map(render_message).collect()
}

fn render_message(message: &OutboundMessage) -> serde_json::Value {
    match message {
        OutboundMessage::Text { text } => json!({ "type": "text", "text": text }),
        OutboundMessage::Menu {
            title,
            body,
            buttons,
        } => {
            let items: Vec<serde_json::Value> = buttons
                .iter()
                .take(13)
                .map(|b| {
                    json!({
                        "type": "action",
                        "action": {
                            "type": "postback",
                            "label": truncate_label(&b.label),
                            "data": b.token,
                            "displayText": truncate_label(&b.label),
                        }
                    })
                })
                .collect();
            json!({
                "type": "text",
                "text": format!("{title}\n{body}"),
                "quickReply": { "items": items },
            })
        }
    }
}

/// Quick-reply labels are capped at 20 characters by the platform.
fn truncate_label(label: &str) -> String {
    if label.chars().count() <= 20 {
        label.to_string()
    } else {
        let head: String = label.chars().take(19).collect();
        format!("{head}…")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ondam_core::message::MenuButton;

    #[test]
    fn signature_round_trips() {
        let secret = "channel-secret";
        let body = br#"{"events":[]}"#;
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        let signature =
            base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes());

        assert!(verify_signature(secret, body, &signature));
        assert!(!verify_signature(secret, b"tampered", &signature));
        assert!(!verify_signature("wrong-secret", body, &signature));
        assert!(!verify_signature(secret, body, "not-base64!!"));
    }

    #[test]
    fn menus_render_as_quick_replies() {
        let menu = OutboundMessage::menu(
            "Pick one",
            "Which bothers you most?",
            vec![
                MenuButton::new("Aches and pain", "pain"),
                MenuButton::new("Poor sleep", "sleep"),
            ],
        );
        let rendered = render_message(&menu);
        assert_eq!(rendered["type"], "text");
        let items = rendered["quickReply"]["items"].as_array().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["action"]["data"], "pain");
    }

    #[test]
    fn long_labels_are_truncated_for_the_platform_cap() {
        assert_eq!(truncate_label("short"), "short");
        let long = "a label far beyond the twenty character cap";
        assert_eq!(truncate_label(long).chars().count(), 20);
    }
}
