use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Snapshot of the last completed diagnosis, kept on the profile so
/// follow-up questions and AI consults can be grounded in it.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DiagnosisContext {
    /// Display label of the complaint category the user picked
    pub category_label: String,
    /// Constitution type label from the classification table
    pub type_label: String,
    /// Trait text for the type
    pub traits: String,
    /// Ordered axis triple (vigor, thermal, qi/blood tilt), each in {-1, 0, 1}
    pub score: [i8; 3],
    pub flow_label: String,
    pub organ_label: String,
    /// Advisory text block shown with the result
    pub advisory: String,
    /// The user's complaint in their own words (falls back to the category label)
    pub complaint: String,
    /// Label of the motion the user found hardest in the motion test
    pub motion_label: String,
}

/// Stored user profile. The bot only ever reads and writes profiles
/// through the `ProfileStore` collaborator; this is the shared shape.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Profile {
    /// Stable chat-platform identifier of the end user
    pub user_id: String,
    /// Paid subscription flag, set by the billing webhook
    pub subscribed: bool,
    /// Trial flag, set manually for pilot users
    pub trial: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscribed_at: Option<DateTime<Utc>>,
    /// Completed self-care actions logged so far
    pub care_count: i32,
    /// Self-reported motion difficulty from the latest check-in (0-10)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub motion_difficulty: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnosis: Option<DiagnosisContext>,
}

impl Profile {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            subscribed: false,
            trial: false,
            subscribed_at: None,
            care_count: 0,
            motion_difficulty: None,
            diagnosis: None,
        }
    }

    /// Whether the user may start a follow-up check-in or free-form consult.
    pub fn entitled(&self) -> bool {
        self.subscribed || self.trial
    }
}

/// One completed follow-up check-in.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FollowupRecord {
    pub id: Uuid,
    pub user_id: String,
    /// How the original complaint has been ("better" / "same" / "worse")
    pub symptom: String,
    pub sleep: String,
    pub habits: String,
    /// Motion re-test outcome, 1 (much easier) to 3 (stiffer)
    pub motion_level: i32,
    /// Self-rated difficulty of the weak motion, 0-10
    pub difficulty: i32,
    pub recorded_at: DateTime<Utc>,
}

/// Fields every follow-up record must carry. `motion_level` and
/// `difficulty` must parse as integers; everything else is free text
/// from a fixed choice set.
pub const FOLLOWUP_REQUIRED_FIELDS: &[&str] =
    &["symptom", "sleep", "habits", "motion_level", "difficulty"];

/// Schema gate violation for a follow-up record write. Storage rejects
/// the whole record; the answers are not stored partially.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("missing required field '{0}'")]
    MissingField(&'static str),
    #[error("field '{field}' must be numeric, got '{value}'")]
    NotNumeric { field: &'static str, value: String },
}

/// Validated follow-up answer set, ready to persist. This is the strict
/// schema gate from the storage contract: it runs before any row is
/// written, and a violation rejects the entire record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowupAnswers {
    pub symptom: String,
    pub sleep: String,
    pub habits: String,
    pub motion_level: i32,
    pub difficulty: i32,
}

impl FollowupAnswers {
    pub fn from_fields(fields: &BTreeMap<String, String>) -> Result<Self, SchemaError> {
        fn required<'a>(
            fields: &'a BTreeMap<String, String>,
            key: &'static str,
        ) -> Result<&'a str, SchemaError> {
            fields
                .get(key)
                .map(String::as_str)
                .ok_or(SchemaError::MissingField(key))
        }

        fn numeric(
            fields: &BTreeMap<String, String>,
            key: &'static str,
        ) -> Result<i32, SchemaError> {
            let raw = required(fields, key)?;
            raw.trim().parse().map_err(|_| SchemaError::NotNumeric {
                field: key,
                value: raw.to_string(),
            })
        }

        Ok(Self {
            symptom: required(fields, "symptom")?.to_string(),
            sleep: required(fields, "sleep")?.to_string(),
            habits: required(fields, "habits")?.to_string(),
            motion_level: numeric(fields, "motion_level")?,
            difficulty: numeric(fields, "difficulty")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_fields() -> BTreeMap<String, String> {
        [
            ("symptom", "better"),
            ("sleep", "well"),
            ("habits", "kept"),
            ("motion_level", "2"),
            ("difficulty", "4"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    #[test]
    fn complete_answer_set_passes_the_gate() {
        let answers = FollowupAnswers::from_fields(&full_fields()).unwrap();
        assert_eq!(answers.symptom, "better");
        assert_eq!(answers.motion_level, 2);
        assert_eq!(answers.difficulty, 4);
    }

    #[test]
    fn missing_field_is_rejected() {
        let mut fields = full_fields();
        fields.remove("habits");
        assert_eq!(
            FollowupAnswers::from_fields(&fields),
            Err(SchemaError::MissingField("habits"))
        );
    }

    #[test]
    fn non_numeric_difficulty_is_rejected() {
        let mut fields = full_fields();
        fields.insert("difficulty".into(), "plenty".into());
        assert_eq!(
            FollowupAnswers::from_fields(&fields),
            Err(SchemaError::NotNumeric {
                field: "difficulty",
                value: "plenty".into()
            })
        );
    }

    #[test]
    fn entitlement_covers_trial_and_subscription() {
        let mut profile = Profile::new("u1");
        assert!(!profile.entitled());
        profile.trial = true;
        assert!(profile.entitled());
        profile.trial = false;
        profile.subscribed = true;
        assert!(profile.entitled());
    }
}
