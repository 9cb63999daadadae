//! Boundary decode of chat-platform payload strings.
//!
//! Both text messages and postback `data` strings arrive as flat
//! strings. They are decoded exactly once, here, into a tagged union;
//! the dispatcher and the flow drivers never re-parse raw payloads.

/// Literal text/postback token that starts a fresh diagnosis.
pub const TRIGGER_DIAGNOSIS: &str = "diagnosis";
/// Literal text/postback token that starts a follow-up check-in.
pub const TRIGGER_FOLLOWUP: &str = "check-in";
/// Postback token logging one completed self-care action.
pub const CARE_DONE: &str = "care_done";
/// Prefix for diagnosis answer postbacks: `dx_<questionId>_<code>`.
pub const ANSWER_PREFIX: &str = "dx";

/// A decoded inbound payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// Start-diagnosis trigger (text or postback).
    StartDiagnosis,
    /// Start-follow-up trigger (text or postback).
    StartFollowup,
    /// "I did my self-care today" token.
    CareDone,
    /// Diagnosis answer: `dx_<questionId>_<code>`. The trailing token is
    /// the choice code; the question id is kept for logging only.
    StepChoice { question_id: String, code: String },
    /// Follow-up field answer: `<fieldKey>:<value>`.
    FieldChoice { key: String, value: String },
    /// Follow-up numeric-scale answer: `<fieldKey>=<digits>`.
    NumericChoice { key: String, value: String },
    /// Anything else: a bare category token or free-form text.
    Raw(String),
}

/// Decode one payload string. Triggers win over structured forms so a
/// category named like a trigger could never shadow it (and none is).
pub fn decode(payload: &str) -> Input {
    let payload = payload.trim();
    match payload {
        TRIGGER_DIAGNOSIS => return Input::StartDiagnosis,
        TRIGGER_FOLLOWUP => return Input::StartFollowup,
        CARE_DONE => return Input::CareDone,
        _ => {}
    }

    if let Some(rest) = payload.strip_prefix(format!("{ANSWER_PREFIX}_").as_str()) {
        // Choice code is the trailing token; everything before the last
        // underscore is the question id.
        if let Some((question_id, code)) = rest.rsplit_once('_') {
            if !question_id.is_empty() && !code.is_empty() {
                return Input::StepChoice {
                    question_id: question_id.to_string(),
                    code: code.to_string(),
                };
            }
        }
    }

    if let Some((key, value)) = payload.split_once(':') {
        if is_field_key(key) && !value.is_empty() {
            return Input::FieldChoice {
                key: key.to_string(),
                value: value.to_string(),
            };
        }
    }

    if let Some((key, value)) = payload.split_once('=') {
        if is_field_key(key) && !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
            return Input::NumericChoice {
                key: key.to_string(),
                value: value.to_string(),
            };
        }
    }

    Input::Raw(payload.to_string())
}

fn is_field_key(key: &str) -> bool {
    !key.is_empty()
        && key
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b == b'_' || b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn triggers_decode_before_anything_else() {
        assert_eq!(decode("diagnosis"), Input::StartDiagnosis);
        assert_eq!(decode("  check-in "), Input::StartFollowup);
        assert_eq!(decode("care_done"), Input::CareDone);
    }

    #[test]
    fn step_choice_takes_the_trailing_token() {
        assert_eq!(
            decode("dx_pain_q1_B"),
            Input::StepChoice {
                question_id: "pain_q1".into(),
                code: "B".into()
            }
        );
    }

    #[test]
    fn field_and_numeric_forms_decode() {
        assert_eq!(
            decode("sleep:well"),
            Input::FieldChoice {
                key: "sleep".into(),
                value: "well".into()
            }
        );
        assert_eq!(
            decode("difficulty=7"),
            Input::NumericChoice {
                key: "difficulty".into(),
                value: "7".into()
            }
        );
    }

    #[test]
    fn non_numeric_equals_form_falls_through_to_raw() {
        assert_eq!(decode("difficulty=lots"), Input::Raw("difficulty=lots".into()));
    }

    #[test]
    fn malformed_answer_postbacks_fall_through_to_raw() {
        assert_eq!(decode("dx_"), Input::Raw("dx_".into()));
        assert_eq!(decode("dx_q1"), Input::Raw("dx_q1".into()));
        assert_eq!(decode("how do I sleep better?"), Input::Raw("how do I sleep better?".into()));
    }
}
