//! AI consult adapter: prompt assembly.
//!
//! Builds fully-formed chat-completion prompts from the stored profile,
//! recent follow-up history, and the user's free text. The system
//! prompt is assembled from context parts here and sent as a dedicated
//! system message; the generation call itself lives in `llm`.

use std::collections::BTreeMap;

use ondam_core::profile::{FollowupRecord, Profile};

use crate::llm::ChatMessage;

/// Canned reply when free-form consult generation fails.
pub const CONSULT_FALLBACK: &str =
    "I could not put together a proper answer just now. Please ask me again in a moment.";

/// Canned closing line when the follow-up summary generation fails.
pub const SUMMARY_FALLBACK: &str =
    "Your check-in is saved. Keep up the routines that worked this week, and be gentle with the ones that slipped.";

/// Canned praise when the care-log generation fails.
pub const PRAISE_FALLBACK: &str = "Logged. Small consistent steps are exactly how this works.";

const PERSONA: &str = "You are the advisor for ondam, a traditional East Asian medicine self-care service. \
    Answer in a warm, plain tone in a few short sentences. Ground advice in the user's \
    constitution context below. Never diagnose disease or name prescription medicines; for \
    alarming symptoms, advise seeing a practitioner.";

fn profile_context(parts: &mut Vec<String>, profile: &Profile) {
    if let Some(d) = &profile.diagnosis {
        parts.push(format!(
            "Constitution: {} (vigor {}, thermal {}, tilt {}).",
            d.type_label, d.score[0], d.score[1], d.score[2]
        ));
        parts.push(format!("Traits: {}", d.traits));
        parts.push(format!(
            "Main complaint: {}. Flow reading: {}. Organ focus: {}. Hardest motion: {}.",
            d.complaint, d.flow_label, d.organ_label, d.motion_label
        ));
        parts.push(format!("Standing advice: {}", d.advisory));
    } else {
        parts.push("The user has not completed a constitution diagnosis yet.".to_string());
    }
    if let Some(level) = profile.motion_difficulty {
        parts.push(format!("Latest self-rated motion difficulty: {level}/10."));
    }
}

fn history_context(parts: &mut Vec<String>, recent: &[FollowupRecord]) {
    for (i, r) in recent.iter().enumerate() {
        parts.push(format!(
            "Check-in {} ago: symptom {}, sleep {}, routines {}, motion re-test level {}, difficulty {}/10.",
            if i == 0 { "0 (latest)".to_string() } else { i.to_string() },
            r.symptom, r.sleep, r.habits, r.motion_level, r.difficulty
        ));
    }
}

/// Prompt for a free-form consult turn.
pub fn consult_messages(
    profile: &Profile,
    recent: &[FollowupRecord],
    user_text: &str,
) -> Vec<ChatMessage> {
    let mut parts = vec![PERSONA.to_string()];
    profile_context(&mut parts, profile);
    history_context(&mut parts, recent);

    vec![
        ChatMessage::system(parts.join("\n")),
        ChatMessage::user(user_text),
    ]
}

/// Prompt for the closing summary of a completed follow-up check-in.
pub fn summary_messages(
    profile: Option<&Profile>,
    answers: &BTreeMap<String, String>,
) -> Vec<ChatMessage> {
    let mut parts = vec![PERSONA.to_string()];
    if let Some(profile) = profile {
        profile_context(&mut parts, profile);
    }
    parts.push(
        "The user just finished this week's check-in. Write a 2-3 sentence summary comment: \
         acknowledge what went well, name one thing to watch, and close with one concrete \
         suggestion for the coming week."
            .to_string(),
    );

    let answer_lines: Vec<String> = answers.iter().map(|(k, v)| format!("{k}: {v}")).collect();

    vec![
        ChatMessage::system(parts.join("\n")),
        ChatMessage::user(format!("This week's answers:\n{}", answer_lines.join("\n"))),
    ]
}

/// Prompt for a one-line praise message after a logged self-care action.
pub fn praise_messages(care_count: i32) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(PERSONA),
        ChatMessage::user(format!(
            "I just completed today's self-care routine. That makes {care_count} logged so far. \
             Reply with a single short encouraging sentence."
        )),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ondam_core::profile::DiagnosisContext;
    use uuid::Uuid;

    fn diagnosed_profile() -> Profile {
        let mut profile = Profile::new("u1");
        profile.subscribed = true;
        profile.diagnosis = Some(DiagnosisContext {
            category_label: "aches and pain".into(),
            type_label: "Cold Depleted (blood-sparse)".into(),
            traits: "Reserves run low.".into(),
            score: [-1, -1, -1],
            flow_label: "qi stagnation".into(),
            organ_label: "lung".into(),
            advisory: "Guard warmth.".into(),
            complaint: "aches and pain".into(),
            motion_label: "Raising both arms straight overhead".into(),
        });
        profile
    }

    #[test]
    fn consult_prompt_grounds_in_profile_and_history() {
        let record = FollowupRecord {
            id: Uuid::now_v7(),
            user_id: "u1".into(),
            symptom: "better".into(),
            sleep: "fair".into(),
            habits: "kept".into(),
            motion_level: 2,
            difficulty: 4,
            recorded_at: Utc::now(),
        };
        let messages = consult_messages(&diagnosed_profile(), &[record], "Can I drink coffee?");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "system");
        assert!(messages[0].content.contains("Cold Depleted (blood-sparse)"));
        assert!(messages[0].content.contains("difficulty 4/10"));
        assert_eq!(messages[1].content, "Can I drink coffee?");
    }

    #[test]
    fn undiagnosed_profile_is_stated_not_invented() {
        let messages = consult_messages(&Profile::new("u2"), &[], "hello");
        assert!(messages[0].content.contains("not completed a constitution diagnosis"));
    }
}
