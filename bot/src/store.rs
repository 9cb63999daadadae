//! Storage collaborator: profiles and follow-up records.
//!
//! The dispatcher only sees the `ProfileStore` trait; the production
//! implementation is Postgres single-row upserts. The follow-up write
//! runs the strict schema gate from `ondam_core::profile` before any
//! row is written — a malformed answer map rejects the whole record.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ondam_core::profile::{
    DiagnosisContext, FollowupAnswers, FollowupRecord, Profile, SchemaError,
};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("schema violation: {0}")]
    Schema(#[from] SchemaError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get_profile(&self, user_id: &str) -> Result<Option<Profile>, StoreError>;

    /// Mark the user subscribed (billing webhook pass-through).
    async fn set_subscribed(&self, user_id: &str, plan: &str) -> Result<(), StoreError>;

    /// Persist the result snapshot of a completed diagnosis.
    async fn save_diagnosis_context(
        &self,
        user_id: &str,
        ctx: &DiagnosisContext,
    ) -> Result<(), StoreError>;

    /// Append one completed follow-up answer set. Runs the schema gate;
    /// missing or non-numeric fields reject the record with
    /// `StoreError::Schema` and nothing is written.
    async fn append_followup_record(
        &self,
        user_id: &str,
        fields: &BTreeMap<String, String>,
    ) -> Result<FollowupRecord, StoreError>;

    async fn recent_followups(
        &self,
        user_id: &str,
        n: i64,
    ) -> Result<Vec<FollowupRecord>, StoreError>;

    /// Bump the self-care counter, returning the new total.
    async fn increment_care_count(&self, user_id: &str) -> Result<i32, StoreError>;

    /// Mirror the follow-up difficulty answer onto the profile.
    async fn set_motion_difficulty(&self, user_id: &str, level: i32) -> Result<(), StoreError>;
}

/// Postgres-backed store.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProfileStore for PgStore {
    async fn get_profile(&self, user_id: &str) -> Result<Option<Profile>, StoreError> {
        let row = sqlx::query_as::<_, ProfileRow>(
            r#"
            SELECT user_id, subscribed, trial, subscribed_at, care_count, motion_difficulty,
                   category_label, type_label, traits, score_vigor, score_thermal, score_tilt,
                   flow_label, organ_label, advisory, complaint, motion_label
            FROM profiles
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(ProfileRow::into_profile))
    }

    async fn set_subscribed(&self, user_id: &str, plan: &str) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO profiles (user_id, subscribed, subscribed_at, plan)
            VALUES ($1, TRUE, now(), $2)
            ON CONFLICT (user_id) DO UPDATE
            SET subscribed = TRUE, subscribed_at = now(), plan = EXCLUDED.plan, updated_at = now()
            "#,
        )
        .bind(user_id)
        .bind(plan)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn save_diagnosis_context(
        &self,
        user_id: &str,
        ctx: &DiagnosisContext,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO profiles (user_id, category_label, type_label, traits,
                                  score_vigor, score_thermal, score_tilt,
                                  flow_label, organ_label, advisory, complaint, motion_label)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (user_id) DO UPDATE
            SET category_label = EXCLUDED.category_label,
                type_label = EXCLUDED.type_label,
                traits = EXCLUDED.traits,
                score_vigor = EXCLUDED.score_vigor,
                score_thermal = EXCLUDED.score_thermal,
                score_tilt = EXCLUDED.score_tilt,
                flow_label = EXCLUDED.flow_label,
                organ_label = EXCLUDED.organ_label,
                advisory = EXCLUDED.advisory,
                complaint = EXCLUDED.complaint,
                motion_label = EXCLUDED.motion_label,
                updated_at = now()
            "#,
        )
        .bind(user_id)
        .bind(&ctx.category_label)
        .bind(&ctx.type_label)
        .bind(&ctx.traits)
        .bind(ctx.score[0] as i16)
        .bind(ctx.score[1] as i16)
        .bind(ctx.score[2] as i16)
        .bind(&ctx.flow_label)
        .bind(&ctx.organ_label)
        .bind(&ctx.advisory)
        .bind(&ctx.complaint)
        .bind(&ctx.motion_label)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn append_followup_record(
        &self,
        user_id: &str,
        fields: &BTreeMap<String, String>,
    ) -> Result<FollowupRecord, StoreError> {
        // Schema gate first; nothing is written on violation.
        let answers = FollowupAnswers::from_fields(fields)?;

        let id = Uuid::now_v7();
        let row = sqlx::query_as::<_, FollowupRow>(
            r#"
            INSERT INTO followup_records (id, user_id, symptom, sleep, habits, motion_level, difficulty)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, user_id, symptom, sleep, habits, motion_level, difficulty, recorded_at
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(&answers.symptom)
        .bind(&answers.sleep)
        .bind(&answers.habits)
        .bind(answers.motion_level)
        .bind(answers.difficulty)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into_record())
    }

    async fn recent_followups(
        &self,
        user_id: &str,
        n: i64,
    ) -> Result<Vec<FollowupRecord>, StoreError> {
        let rows = sqlx::query_as::<_, FollowupRow>(
            r#"
            SELECT id, user_id, symptom, sleep, habits, motion_level, difficulty, recorded_at
            FROM followup_records
            WHERE user_id = $1
            ORDER BY recorded_at DESC, id DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(n)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(FollowupRow::into_record).collect())
    }

    async fn increment_care_count(&self, user_id: &str) -> Result<i32, StoreError> {
        let count: i32 = sqlx::query_scalar(
            r#"
            INSERT INTO profiles (user_id, care_count)
            VALUES ($1, 1)
            ON CONFLICT (user_id) DO UPDATE
            SET care_count = profiles.care_count + 1, updated_at = now()
            RETURNING care_count
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn set_motion_difficulty(&self, user_id: &str, level: i32) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO profiles (user_id, motion_difficulty)
            VALUES ($1, $2)
            ON CONFLICT (user_id) DO UPDATE
            SET motion_difficulty = EXCLUDED.motion_difficulty, updated_at = now()
            "#,
        )
        .bind(user_id)
        .bind(level)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Internal row type for sqlx mapping
#[derive(sqlx::FromRow)]
struct ProfileRow {
    user_id: String,
    subscribed: bool,
    trial: bool,
    subscribed_at: Option<DateTime<Utc>>,
    care_count: i32,
    motion_difficulty: Option<i32>,
    category_label: Option<String>,
    type_label: Option<String>,
    traits: Option<String>,
    score_vigor: Option<i16>,
    score_thermal: Option<i16>,
    score_tilt: Option<i16>,
    flow_label: Option<String>,
    organ_label: Option<String>,
    advisory: Option<String>,
    complaint: Option<String>,
    motion_label: Option<String>,
}

impl ProfileRow {
    fn into_profile(self) -> Profile {
        let diagnosis = self.type_label.map(|type_label| DiagnosisContext {
            category_label: self.category_label.unwrap_or_default(),
            type_label,
            traits: self.traits.unwrap_or_default(),
            score: [
                self.score_vigor.unwrap_or(0) as i8,
                self.score_thermal.unwrap_or(0) as i8,
                self.score_tilt.unwrap_or(0) as i8,
            ],
            flow_label: self.flow_label.unwrap_or_default(),
            organ_label: self.organ_label.unwrap_or_default(),
            advisory: self.advisory.unwrap_or_default(),
            complaint: self.complaint.unwrap_or_default(),
            motion_label: self.motion_label.unwrap_or_default(),
        });

        Profile {
            user_id: self.user_id,
            subscribed: self.subscribed,
            trial: self.trial,
            subscribed_at: self.subscribed_at,
            care_count: self.care_count,
            motion_difficulty: self.motion_difficulty,
            diagnosis,
        }
    }
}

#[derive(sqlx::FromRow)]
struct FollowupRow {
    id: Uuid,
    user_id: String,
    symptom: String,
    sleep: String,
    habits: String,
    motion_level: i32,
    difficulty: i32,
    recorded_at: DateTime<Utc>,
}

impl FollowupRow {
    fn into_record(self) -> FollowupRecord {
        FollowupRecord {
            id: self.id,
            user_id: self.user_id,
            symptom: self.symptom,
            sleep: self.sleep,
            habits: self.habits,
            motion_level: self.motion_level,
            difficulty: self.difficulty,
            recorded_at: self.recorded_at,
        }
    }
}
