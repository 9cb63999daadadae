//! Self-care action logging.
//!
//! A recognized "care done" token bumps the user's counter and answers
//! with a short generated praise line. Generation failure falls back to
//! the canned line; a storage failure is the only way this turn fails.

use ondam_core::message::OutboundMessage;

use crate::consult;
use crate::llm::{CompletionOptions, TextGenerator};
use crate::store::ProfileStore;

pub async fn log_care(
    store: &dyn ProfileStore,
    llm: &dyn TextGenerator,
    user_id: &str,
) -> Vec<OutboundMessage> {
    let count = match store.increment_care_count(user_id).await {
        Ok(count) => count,
        Err(err) => {
            tracing::error!(user_id, %err, "failed to record self-care action");
            return vec![OutboundMessage::text(
                "I could not record that just now. Please try again later.",
            )];
        }
    };

    let options = CompletionOptions {
        temperature: Some(0.7),
        max_tokens: Some(80),
    };
    let praise = match llm.complete(&consult::praise_messages(count), options).await {
        Ok(text) => text,
        Err(err) => {
            tracing::warn!(user_id, %err, "praise generation failed, using canned message");
            consult::PRAISE_FALLBACK.to_string()
        }
    };

    vec![OutboundMessage::text(praise)]
}
