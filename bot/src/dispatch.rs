//! Turn dispatcher.
//!
//! One inbound chat event comes in; zero or more outbound messages come
//! out. Routing precedence is fixed and significant:
//!
//! 1. diagnosis-start trigger (restarts any prior session, last start wins)
//! 2. an active diagnosis session
//! 3. follow-up-start trigger (entitlement gated)
//! 4. an active follow-up session
//! 5. the care-log token
//! 6. free-form text from an entitled user (AI consult)
//! 7. fallback hint
//!
//! An active session therefore always owns its user's input before the
//! same literal could be reinterpreted, except for the diagnosis
//! trigger, which deliberately restarts.

use std::sync::Arc;
use std::sync::OnceLock;

use regex::Regex;

use ondam_core::compose;
use ondam_core::flow::{Advance, FormSession, FormStep, StepEcho, Submit};
use ondam_core::message::{MenuButton, OutboundMessage};
use ondam_core::postback::{self, ANSWER_PREFIX, Input};
use ondam_core::questions::{self, Category, DIFFICULTY_FIELD, PlaceholderCtx};

use crate::care;
use crate::consult;
use crate::llm::{CompletionOptions, TextGenerator};
use crate::sessions::{DiagnosisSession, FollowupSession, SessionStore};
use crate::store::ProfileStore;

/// Fallback when no flow owns the input.
pub const HINT_TEXT: &str = "To get started, type \"diagnosis\" for a constitution check, \
     or \"check-in\" to record how your week went.";

/// Terminal rejection for a follow-up start without entitlement.
pub const ENTITLEMENT_REJECTION: &str = "Weekly check-ins are part of the ondam care plan. \
     Subscribe to unlock them, then type \"check-in\" again.";

/// Generic user-facing failure when a storage call breaks a turn.
pub const GENERIC_FAILURE: &str = "Something went wrong on my side. Please try again later.";

/// User-facing failure when the completed check-in could not be saved.
pub const SAVE_FAILURE: &str = "I could not save your check-in. Your answers were not \
     recorded; please run the check-in again later.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Message,
    Postback,
}

/// One inbound chat event, already reduced to the parts the core needs.
/// `payload` is the message text or the postback data string.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    pub user_id: String,
    pub kind: EventKind,
    pub payload: String,
    pub reply_token: Option<String>,
}

#[derive(Debug, Clone, Copy)]
enum FlowKind {
    Diagnosis,
    Followup,
}

pub struct Dispatcher {
    store: Arc<dyn ProfileStore>,
    llm: Arc<dyn TextGenerator>,
    diagnosis: SessionStore<DiagnosisSession>,
    followup: SessionStore<FollowupSession>,
}

enum DxOutcome {
    Menu,
    Ask(&'static FormStep),
    Finished { category: Category, codes: Vec<String> },
}

enum FuOutcome {
    Ask(&'static FormStep, PlaceholderCtx),
    Silent,
    StepDone {
        echo: StepEcho,
        next: &'static FormStep,
        ctx: PlaceholderCtx,
    },
    Finished {
        echo: StepEcho,
        answers: std::collections::BTreeMap<String, String>,
    },
}

impl Dispatcher {
    pub fn new(store: Arc<dyn ProfileStore>, llm: Arc<dyn TextGenerator>) -> Self {
        Self {
            store,
            llm,
            diagnosis: SessionStore::new(),
            followup: SessionStore::new(),
        }
    }

    /// In-flight (diagnosis, follow-up) session counts, for operations.
    pub fn active_sessions(&self) -> (usize, usize) {
        (self.diagnosis.len(), self.followup.len())
    }

    /// Process one inbound event and return the outbound messages for
    /// this turn. Conversation-level failures are absorbed here; the
    /// caller only delivers.
    pub async fn handle_event(&self, event: &InboundEvent) -> Vec<OutboundMessage> {
        let input = postback::decode(&event.payload);

        if matches!(input, Input::StartDiagnosis) {
            return self.start_diagnosis(&event.user_id);
        }
        if self.diagnosis.contains(&event.user_id) {
            return self.drive_diagnosis(&event.user_id, &input).await;
        }
        if matches!(input, Input::StartFollowup) {
            return self.start_followup(&event.user_id).await;
        }
        if self.followup.contains(&event.user_id) {
            return self.drive_followup(&event.user_id, &input).await;
        }
        if matches!(input, Input::CareDone) {
            return care::log_care(self.store.as_ref(), self.llm.as_ref(), &event.user_id).await;
        }
        if event.kind == EventKind::Message {
            if let Input::Raw(text) = &input {
                if let Some(messages) = self.consult(&event.user_id, text).await {
                    return messages;
                }
            }
        }

        vec![OutboundMessage::text(HINT_TEXT)]
    }

    // --- diagnosis flow --------------------------------------------------

    fn start_diagnosis(&self, user_id: &str) -> Vec<OutboundMessage> {
        self.diagnosis.create(user_id, DiagnosisSession::default());
        tracing::info!(user_id, "diagnosis session started");
        vec![category_menu()]
    }

    async fn drive_diagnosis(&self, user_id: &str, input: &Input) -> Vec<OutboundMessage> {
        let outcome = self.diagnosis.with(user_id, |session| match session.category {
            None => match input {
                Input::Raw(token) => match Category::from_token(token) {
                    Some(category) => {
                        session.category = Some(category);
                        DxOutcome::Ask(&questions::tree(category)[0])
                    }
                    None => DxOutcome::Menu,
                },
                _ => DxOutcome::Menu,
            },
            Some(category) => {
                let steps = questions::tree(category);
                match input {
                    Input::StepChoice { code, .. } => {
                        match session.form.submit(steps, Submit::Single { code: code.as_str() }) {
                            Advance::Next { step, .. } => DxOutcome::Ask(step),
                            Advance::Complete { .. } => DxOutcome::Finished {
                                category,
                                codes: session
                                    .form
                                    .single_codes()
                                    .iter()
                                    .map(|c| c.to_string())
                                    .collect(),
                            },
                            // Rejected, or Pending (never produced by
                            // single-choice steps): re-ask the same step.
                            _ => match session.form.current(steps) {
                                Some(step) => DxOutcome::Ask(step),
                                None => DxOutcome::Menu,
                            },
                        }
                    }
                    _ => match session.form.current(steps) {
                        Some(step) => DxOutcome::Ask(step),
                        None => DxOutcome::Menu,
                    },
                }
            }
        });

        let Some(outcome) = outcome else {
            return vec![OutboundMessage::text(HINT_TEXT)];
        };

        match outcome {
            DxOutcome::Menu => vec![category_menu()],
            DxOutcome::Ask(step) => {
                let ctx = PlaceholderCtx::from_profile(None);
                vec![question_message(step, &ctx, FlowKind::Diagnosis)]
            }
            DxOutcome::Finished { category, codes } => {
                let code_refs: Vec<&str> = codes.iter().map(String::as_str).collect();
                let report = compose::compose(category, &code_refs);
                if !report.classified {
                    tracing::warn!(user_id, ?codes, "classification miss, returning unclassified result");
                }
                let context = compose::to_context(category, &report);
                if let Err(err) = self.store.save_diagnosis_context(user_id, &context).await {
                    // Result delivery still goes ahead; only the snapshot is lost.
                    tracing::error!(user_id, %err, "failed to persist diagnosis context");
                }
                self.diagnosis.delete(user_id);
                tracing::info!(user_id, type_label = %report.type_label, "diagnosis completed");
                compose::render(&report)
            }
        }
    }

    // --- follow-up flow --------------------------------------------------

    async fn start_followup(&self, user_id: &str) -> Vec<OutboundMessage> {
        let profile = match self.store.get_profile(user_id).await {
            Ok(profile) => profile,
            Err(err) => {
                tracing::error!(user_id, %err, "profile read failed at follow-up start");
                return vec![OutboundMessage::text(GENERIC_FAILURE)];
            }
        };

        let Some(profile) = profile.filter(|p| p.entitled()) else {
            tracing::info!(user_id, "follow-up refused: no entitlement");
            return vec![OutboundMessage::text(ENTITLEMENT_REJECTION)];
        };

        let ctx = PlaceholderCtx::from_profile(Some(&profile));
        self.followup.create(
            user_id,
            FollowupSession {
                form: FormSession::new(),
                ctx: ctx.clone(),
            },
        );
        tracing::info!(user_id, "follow-up session started");

        let step = &questions::followup_steps()[0];
        vec![question_message(step, &ctx, FlowKind::Followup)]
    }

    async fn drive_followup(&self, user_id: &str, input: &Input) -> Vec<OutboundMessage> {
        let result = self.followup.with(user_id, |session| {
            let steps = questions::followup_steps();
            let (key, value) = match input {
                Input::FieldChoice { key, value } | Input::NumericChoice { key, value } => {
                    (key.as_str(), value.as_str())
                }
                _ => {
                    let outcome = match session.form.current(steps) {
                        Some(step) => FuOutcome::Ask(step, session.ctx.clone()),
                        None => FuOutcome::Silent,
                    };
                    return (outcome, None);
                }
            };

            let advance = session.form.submit(steps, Submit::Field { key, value });
            let difficulty = match advance {
                Advance::Rejected => None,
                _ => difficulty_side_effect(key, value),
            };

            let outcome = match advance {
                Advance::Rejected => match session.form.current(steps) {
                    Some(step) => FuOutcome::Ask(step, session.ctx.clone()),
                    None => FuOutcome::Silent,
                },
                Advance::Pending => FuOutcome::Silent,
                Advance::Next { echo, step } => FuOutcome::StepDone {
                    echo,
                    next: step,
                    ctx: session.ctx.clone(),
                },
                Advance::Complete { echo } => FuOutcome::Finished {
                    echo,
                    answers: session.form.flatten(),
                },
            };
            (outcome, difficulty)
        });

        let Some((outcome, difficulty)) = result else {
            return vec![OutboundMessage::text(HINT_TEXT)];
        };

        if let Some(level) = difficulty {
            if let Err(err) = self.store.set_motion_difficulty(user_id, level).await {
                tracing::warn!(user_id, %err, "failed to mirror motion difficulty onto profile");
            }
        }

        match outcome {
            FuOutcome::Silent => Vec::new(),
            FuOutcome::Ask(step, ctx) => vec![question_message(step, &ctx, FlowKind::Followup)],
            FuOutcome::StepDone { echo, next, ctx } => vec![
                OutboundMessage::text(echo_text(&echo)),
                question_message(next, &ctx, FlowKind::Followup),
            ],
            FuOutcome::Finished { echo, answers } => {
                // Durable write gates completion: on failure the answers
                // are gone and the user is told, not left guessing.
                if let Err(err) = self.store.append_followup_record(user_id, &answers).await {
                    tracing::error!(user_id, %err, "failed to persist completed check-in");
                    self.followup.delete(user_id);
                    return vec![OutboundMessage::text(SAVE_FAILURE)];
                }

                let profile = self.store.get_profile(user_id).await.ok().flatten();
                let options = CompletionOptions {
                    temperature: Some(0.6),
                    max_tokens: Some(300),
                };
                let summary = match self
                    .llm
                    .complete(&consult::summary_messages(profile.as_ref(), &answers), options)
                    .await
                {
                    Ok(text) => text,
                    Err(err) => {
                        tracing::warn!(user_id, %err, "summary generation failed, using canned message");
                        consult::SUMMARY_FALLBACK.to_string()
                    }
                };

                self.followup.delete(user_id);
                tracing::info!(user_id, "follow-up completed and persisted");
                vec![
                    OutboundMessage::text(echo_text(&echo)),
                    OutboundMessage::text(summary),
                ]
            }
        }
    }

    // --- free-form consult -----------------------------------------------

    /// Returns `None` when the user does not qualify, so the caller
    /// falls through to the hint.
    async fn consult(&self, user_id: &str, text: &str) -> Option<Vec<OutboundMessage>> {
        let profile = match self.store.get_profile(user_id).await {
            Ok(profile) => profile?,
            Err(err) => {
                tracing::error!(user_id, %err, "profile read failed for consult");
                return Some(vec![OutboundMessage::text(GENERIC_FAILURE)]);
            }
        };
        if !profile.entitled() {
            return None;
        }

        let recent = match self.store.recent_followups(user_id, 2).await {
            Ok(records) => records,
            Err(err) => {
                tracing::warn!(user_id, %err, "follow-up history unavailable for consult");
                Vec::new()
            }
        };

        let options = CompletionOptions {
            temperature: Some(0.6),
            max_tokens: Some(400),
        };
        let reply = match self
            .llm
            .complete(&consult::consult_messages(&profile, &recent, text), options)
            .await
        {
            Ok(text) => text,
            Err(err) => {
                tracing::warn!(user_id, %err, "consult generation failed, using canned message");
                consult::CONSULT_FALLBACK.to_string()
            }
        };

        Some(vec![OutboundMessage::text(reply)])
    }
}

/// `difficulty=N` mirrors onto the profile when N looks numeric.
fn difficulty_side_effect(key: &str, value: &str) -> Option<i32> {
    static NUMERIC: OnceLock<Regex> = OnceLock::new();
    if key != DIFFICULTY_FIELD {
        return None;
    }
    let re = NUMERIC.get_or_init(|| Regex::new(r"^\d{1,2}$").expect("valid numeric pattern"));
    re.is_match(value).then(|| value.parse().ok()).flatten()
}

fn category_menu() -> OutboundMessage {
    let buttons = Category::ALL
        .iter()
        .map(|c| MenuButton::new(c.label(), c.token()))
        .collect();
    OutboundMessage::menu(
        "Constitution check",
        "What bothers you most these days? Pick the closest one.",
        buttons,
    )
}

fn question_message(
    step: &'static FormStep,
    ctx: &PlaceholderCtx,
    flow: FlowKind,
) -> OutboundMessage {
    let mut buttons = Vec::new();
    for field in step.fields {
        for choice in field.choices {
            let token = match flow {
                FlowKind::Diagnosis => format!("{ANSWER_PREFIX}_{}_{}", step.id, choice.code),
                FlowKind::Followup if field.key == DIFFICULTY_FIELD => {
                    format!("{}={}", field.key, choice.code)
                }
                FlowKind::Followup => format!("{}:{}", field.key, choice.code),
            };
            let label = if step.is_multi() {
                format!("{}: {}", field.label, choice.label)
            } else {
                choice.label.to_string()
            };
            buttons.push(MenuButton::new(label, token));
        }
    }

    OutboundMessage::menu(
        questions::render(step.header, ctx),
        questions::render(step.body, ctx),
        buttons,
    )
}

/// Human-readable echo of a completed step.
fn echo_text(echo: &StepEcho) -> String {
    let lines: Vec<String> = echo
        .iter()
        .map(|(field, value)| format!("{field}: {value}"))
        .collect();
    format!("Noted.\n{}", lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, HashMap};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use chrono::Utc;
    use ondam_core::profile::{
        DiagnosisContext, FollowupAnswers, FollowupRecord, Profile,
    };
    use uuid::Uuid;

    use crate::llm::{ChatMessage, LlmError};
    use crate::store::StoreError;

    #[derive(Default)]
    struct MemoryStore {
        profiles: Mutex<HashMap<String, Profile>>,
        records: Mutex<Vec<FollowupRecord>>,
        contexts: Mutex<Vec<DiagnosisContext>>,
        fail_append: AtomicBool,
    }

    impl MemoryStore {
        fn with_profile(profile: Profile) -> Self {
            let store = Self::default();
            store
                .profiles
                .lock()
                .unwrap()
                .insert(profile.user_id.clone(), profile);
            store
        }
    }

    #[async_trait]
    impl ProfileStore for MemoryStore {
        async fn get_profile(&self, user_id: &str) -> Result<Option<Profile>, StoreError> {
            Ok(self.profiles.lock().unwrap().get(user_id).cloned())
        }

        async fn set_subscribed(&self, user_id: &str, _plan: &str) -> Result<(), StoreError> {
            let mut profiles = self.profiles.lock().unwrap();
            let profile = profiles
                .entry(user_id.to_string())
                .or_insert_with(|| Profile::new(user_id));
            profile.subscribed = true;
            profile.subscribed_at = Some(Utc::now());
            Ok(())
        }

        async fn save_diagnosis_context(
            &self,
            user_id: &str,
            ctx: &DiagnosisContext,
        ) -> Result<(), StoreError> {
            let mut profiles = self.profiles.lock().unwrap();
            let profile = profiles
                .entry(user_id.to_string())
                .or_insert_with(|| Profile::new(user_id));
            profile.diagnosis = Some(ctx.clone());
            self.contexts.lock().unwrap().push(ctx.clone());
            Ok(())
        }

        async fn append_followup_record(
            &self,
            user_id: &str,
            fields: &BTreeMap<String, String>,
        ) -> Result<FollowupRecord, StoreError> {
            if self.fail_append.load(Ordering::SeqCst) {
                return Err(StoreError::Database(sqlx::Error::PoolClosed));
            }
            let answers = FollowupAnswers::from_fields(fields)?;
            let record = FollowupRecord {
                id: Uuid::now_v7(),
                user_id: user_id.to_string(),
                symptom: answers.symptom,
                sleep: answers.sleep,
                habits: answers.habits,
                motion_level: answers.motion_level,
                difficulty: answers.difficulty,
                recorded_at: Utc::now(),
            };
            self.records.lock().unwrap().push(record.clone());
            Ok(record)
        }

        async fn recent_followups(
            &self,
            user_id: &str,
            n: i64,
        ) -> Result<Vec<FollowupRecord>, StoreError> {
            let records = self.records.lock().unwrap();
            Ok(records
                .iter()
                .rev()
                .filter(|r| r.user_id == user_id)
                .take(n as usize)
                .cloned()
                .collect())
        }

        async fn increment_care_count(&self, user_id: &str) -> Result<i32, StoreError> {
            let mut profiles = self.profiles.lock().unwrap();
            let profile = profiles
                .entry(user_id.to_string())
                .or_insert_with(|| Profile::new(user_id));
            profile.care_count += 1;
            Ok(profile.care_count)
        }

        async fn set_motion_difficulty(
            &self,
            user_id: &str,
            level: i32,
        ) -> Result<(), StoreError> {
            let mut profiles = self.profiles.lock().unwrap();
            let profile = profiles
                .entry(user_id.to_string())
                .or_insert_with(|| Profile::new(user_id));
            profile.motion_difficulty = Some(level);
            Ok(())
        }
    }

    struct FakeLlm {
        reply: Option<&'static str>,
    }

    #[async_trait]
    impl TextGenerator for FakeLlm {
        async fn complete(
            &self,
            _messages: &[ChatMessage],
            _options: CompletionOptions,
        ) -> Result<String, LlmError> {
            match self.reply {
                Some(text) => Ok(text.to_string()),
                None => Err(LlmError::Empty),
            }
        }
    }

    fn dispatcher(store: MemoryStore, llm: FakeLlm) -> (Dispatcher, Arc<MemoryStore>) {
        let store = Arc::new(store);
        let dispatcher = Dispatcher::new(store.clone(), Arc::new(llm));
        (dispatcher, store)
    }

    fn message(user_id: &str, text: &str) -> InboundEvent {
        InboundEvent {
            user_id: user_id.to_string(),
            kind: EventKind::Message,
            payload: text.to_string(),
            reply_token: Some("rt".to_string()),
        }
    }

    fn postback_event(user_id: &str, data: &str) -> InboundEvent {
        InboundEvent {
            user_id: user_id.to_string(),
            kind: EventKind::Postback,
            payload: data.to_string(),
            reply_token: Some("rt".to_string()),
        }
    }

    fn subscribed_profile(user_id: &str) -> Profile {
        let mut profile = Profile::new(user_id);
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

    fn menu_of(messages: &[OutboundMessage]) -> (&str, &[MenuButton]) {
        match messages.last() {
            Some(OutboundMessage::Menu { title, buttons, .. }) => (title.as_str(), buttons),
            other => panic!("expected a menu, got {other:?}"),
        }
    }

    fn text_of(message: &OutboundMessage) -> &str {
        match message {
            OutboundMessage::Text { text } => text.as_str(),
            other => panic!("expected text, got {other:?}"),
        }
    }

    /// Walk a diagnosis tree by picking the button whose token ends in
    /// the given code on every step.
    async fn run_diagnosis(
        dispatcher: &Dispatcher,
        user_id: &str,
        category: &str,
        code: &str,
    ) -> Vec<OutboundMessage> {
        let mut response = dispatcher
            .handle_event(&postback_event(user_id, category))
            .await;
        for _ in 0..5 {
            let (_, buttons) = menu_of(&response);
            let button = buttons
                .iter()
                .find(|b| b.token.ends_with(&format!("_{code}")))
                .expect("choice button present");
            let token = button.token.clone();
            response = dispatcher.handle_event(&postback_event(user_id, &token)).await;
        }
        response
    }

    #[tokio::test]
    async fn full_diagnosis_happy_path_yields_the_fixture_label() {
        let (dispatcher, store) = dispatcher(MemoryStore::default(), FakeLlm { reply: None });

        let response = dispatcher.handle_event(&postback_event("u1", "diagnosis")).await;
        let (title, buttons) = menu_of(&response);
        assert_eq!(title, "Constitution check");
        assert_eq!(buttons.len(), 5);

        let result = run_diagnosis(&dispatcher, "u1", "pain", "A").await;
        assert_eq!(result.len(), 2);
        assert!(text_of(&result[0]).contains("Cold Depleted (blood-sparse)"));
        assert!(text_of(&result[0]).contains("qi stagnation"));
        assert!(text_of(&result[1]).contains("Recommended self-care"));

        // Session destroyed, context persisted with the exact label.
        assert!(!dispatcher.diagnosis.contains("u1"));
        let contexts = store.contexts.lock().unwrap();
        assert_eq!(contexts.len(), 1);
        assert_eq!(contexts[0].type_label, "Cold Depleted (blood-sparse)");
        assert_eq!(contexts[0].score, [-1, -1, -1]);
    }

    #[tokio::test]
    async fn unknown_category_re_prompts_the_menu_without_advancing() {
        let (dispatcher, _) = dispatcher(MemoryStore::default(), FakeLlm { reply: None });

        dispatcher.handle_event(&postback_event("u1", "diagnosis")).await;
        let response = dispatcher
            .handle_event(&postback_event("u1", "not_a_category"))
            .await;

        let (title, _) = menu_of(&response);
        assert_eq!(title, "Constitution check");
        let state = dispatcher
            .diagnosis
            .with("u1", |s| (s.category, s.form.step()))
            .unwrap();
        assert_eq!(state, (None, 0));
    }

    #[tokio::test]
    async fn invalid_choice_re_asks_the_same_question() {
        let (dispatcher, _) = dispatcher(MemoryStore::default(), FakeLlm { reply: None });

        dispatcher.handle_event(&postback_event("u1", "diagnosis")).await;
        dispatcher.handle_event(&postback_event("u1", "pain")).await;

        // Undeclared choice code.
        let response = dispatcher
            .handle_event(&postback_event("u1", "dx_pain_1_Z"))
            .await;
        let (title, _) = menu_of(&response);
        assert_eq!(title, "Question 1 of 5");

        // Free text mid-question is the invalid-choice situation too.
        let response = dispatcher.handle_event(&message("u1", "what?")).await;
        let (title, _) = menu_of(&response);
        assert_eq!(title, "Question 1 of 5");

        let step = dispatcher.diagnosis.with("u1", |s| s.form.step()).unwrap();
        assert_eq!(step, 0);
    }

    #[tokio::test]
    async fn restarting_discards_prior_answers() {
        let (dispatcher, store) = dispatcher(MemoryStore::default(), FakeLlm { reply: None });

        dispatcher.handle_event(&postback_event("u1", "diagnosis")).await;
        dispatcher.handle_event(&postback_event("u1", "pain")).await;
        dispatcher.handle_event(&postback_event("u1", "dx_pain_1_A")).await;

        // Restart and run a clean all-B pass on a different category.
        let response = dispatcher.handle_event(&postback_event("u1", "diagnosis")).await;
        let (title, _) = menu_of(&response);
        assert_eq!(title, "Constitution check");

        let result = run_diagnosis(&dispatcher, "u1", "sleep", "B").await;
        assert!(text_of(&result[0]).contains("Temperate Steady (even-keeled)"));

        let contexts = store.contexts.lock().unwrap();
        assert_eq!(contexts.len(), 1);
        assert_eq!(contexts[0].score, [0, 0, 0], "result depends only on post-restart answers");
    }

    #[tokio::test]
    async fn followup_requires_entitlement_and_creates_nothing_without_it() {
        let (dispatcher, store) =
            dispatcher(MemoryStore::with_profile(Profile::new("u1")), FakeLlm { reply: None });

        let response = dispatcher.handle_event(&message("u1", "check-in")).await;
        assert_eq!(text_of(&response[0]), ENTITLEMENT_REJECTION);
        assert!(!dispatcher.followup.contains("u1"));
        assert!(store.records.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn multi_field_step_waits_silently_until_complete() {
        let (dispatcher, _) = dispatcher(
            MemoryStore::with_profile(subscribed_profile("u1")),
            FakeLlm { reply: Some("ok") },
        );

        let response = dispatcher.handle_event(&message("u1", "check-in")).await;
        let (title, _) = menu_of(&response);
        assert_eq!(title, "Check-in 1 of 4");

        let response = dispatcher.handle_event(&postback_event("u1", "symptom:better")).await;
        assert_eq!(text_of(&response[0]), "Noted.\nSymptom: Noticeably better");
        let (title, _) = menu_of(&response);
        assert_eq!(title, "Check-in 2 of 4");

        // First of two fields: no outbound message, no advancement.
        let response = dispatcher.handle_event(&postback_event("u1", "sleep:well")).await;
        assert!(response.is_empty());
        let step = dispatcher.followup.with("u1", |s| s.form.step()).unwrap();
        assert_eq!(step, 1);

        // Second field completes the step exactly once.
        let response = dispatcher.handle_event(&postback_event("u1", "habits:kept")).await;
        assert!(text_of(&response[0]).contains("Sleep: Slept well"));
        assert!(text_of(&response[0]).contains("Routines: Kept them up"));
        let (title, _) = menu_of(&response);
        assert_eq!(title, "Check-in 3 of 4");
        let step = dispatcher.followup.with("u1", |s| s.form.step()).unwrap();
        assert_eq!(step, 2);
    }

    #[tokio::test]
    async fn followup_completion_persists_then_summarizes() {
        let (dispatcher, store) = dispatcher(
            MemoryStore::with_profile(subscribed_profile("u1")),
            FakeLlm { reply: Some("A steady week; keep the evening stretches going.") },
        );

        dispatcher.handle_event(&message("u1", "check-in")).await;
        dispatcher.handle_event(&postback_event("u1", "symptom:better")).await;
        dispatcher.handle_event(&postback_event("u1", "sleep:well")).await;
        dispatcher.handle_event(&postback_event("u1", "habits:kept")).await;
        dispatcher.handle_event(&postback_event("u1", "motion_level:2")).await;
        let response = dispatcher.handle_event(&postback_event("u1", "difficulty=6")).await;

        assert_eq!(response.len(), 2);
        assert!(text_of(&response[0]).starts_with("Noted."));
        assert_eq!(
            text_of(&response[1]),
            "A steady week; keep the evening stretches going."
        );

        let records = store.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].symptom, "better");
        assert_eq!(records[0].motion_level, 2);
        assert_eq!(records[0].difficulty, 6);
        drop(records);

        // Numeric-scale side effect mirrored onto the profile.
        let profiles = store.profiles.lock().unwrap();
        assert_eq!(profiles["u1"].motion_difficulty, Some(6));
        drop(profiles);

        assert!(!dispatcher.followup.contains("u1"));
    }

    #[tokio::test]
    async fn followup_persistence_failure_destroys_the_session() {
        let store = MemoryStore::with_profile(subscribed_profile("u1"));
        store.fail_append.store(true, Ordering::SeqCst);
        let (dispatcher, store) = dispatcher(store, FakeLlm { reply: Some("unused") });

        dispatcher.handle_event(&message("u1", "check-in")).await;
        dispatcher.handle_event(&postback_event("u1", "symptom:worse")).await;
        dispatcher.handle_event(&postback_event("u1", "sleep:poorly")).await;
        dispatcher.handle_event(&postback_event("u1", "habits:skipped")).await;
        dispatcher.handle_event(&postback_event("u1", "motion_level:3")).await;
        let response = dispatcher.handle_event(&postback_event("u1", "difficulty=9")).await;

        assert_eq!(text_of(&response[0]), SAVE_FAILURE);
        assert!(store.records.lock().unwrap().is_empty());
        assert!(!dispatcher.followup.contains("u1"));

        // A fresh start builds a new session, not a resumed one.
        let response = dispatcher.handle_event(&message("u1", "check-in")).await;
        let (title, _) = menu_of(&response);
        assert_eq!(title, "Check-in 1 of 4");
        let step = dispatcher.followup.with("u1", |s| s.form.step()).unwrap();
        assert_eq!(step, 0);
    }

    #[tokio::test]
    async fn followup_invalid_value_re_asks_without_advancing() {
        let (dispatcher, _) = dispatcher(
            MemoryStore::with_profile(subscribed_profile("u1")),
            FakeLlm { reply: Some("ok") },
        );

        dispatcher.handle_event(&message("u1", "check-in")).await;
        let response = dispatcher
            .handle_event(&postback_event("u1", "symptom:unlisted"))
            .await;
        let (title, _) = menu_of(&response);
        assert_eq!(title, "Check-in 1 of 4");
        let step = dispatcher.followup.with("u1", |s| s.form.step()).unwrap();
        assert_eq!(step, 0);
    }

    #[tokio::test]
    async fn followup_questions_render_profile_placeholders() {
        let (dispatcher, _) = dispatcher(
            MemoryStore::with_profile(subscribed_profile("u1")),
            FakeLlm { reply: Some("ok") },
        );

        let response = dispatcher.handle_event(&message("u1", "check-in")).await;
        match &response[0] {
            OutboundMessage::Menu { body, .. } => {
                assert!(body.contains("aches and pain"), "body was: {body}");
            }
            other => panic!("expected menu, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn care_done_increments_the_counter_and_praises() {
        let (dispatcher, store) = dispatcher(
            MemoryStore::with_profile(subscribed_profile("u1")),
            FakeLlm { reply: Some("Well done, keep it rolling.") },
        );

        let response = dispatcher.handle_event(&postback_event("u1", "care_done")).await;
        assert_eq!(text_of(&response[0]), "Well done, keep it rolling.");
        assert_eq!(store.profiles.lock().unwrap()["u1"].care_count, 1);

        dispatcher.handle_event(&postback_event("u1", "care_done")).await;
        assert_eq!(store.profiles.lock().unwrap()["u1"].care_count, 2);
    }

    #[tokio::test]
    async fn care_praise_falls_back_when_generation_fails() {
        let (dispatcher, _) = dispatcher(
            MemoryStore::with_profile(subscribed_profile("u1")),
            FakeLlm { reply: None },
        );

        let response = dispatcher.handle_event(&postback_event("u1", "care_done")).await;
        assert_eq!(text_of(&response[0]), consult::PRAISE_FALLBACK);
    }

    #[tokio::test]
    async fn free_text_from_entitled_user_gets_a_consult_reply() {
        let (dispatcher, _) = dispatcher(
            MemoryStore::with_profile(subscribed_profile("u1")),
            FakeLlm { reply: Some("Warm barley tea suits your type better.") },
        );

        let response = dispatcher.handle_event(&message("u1", "can I drink iced coffee?")).await;
        assert_eq!(text_of(&response[0]), "Warm barley tea suits your type better.");
    }

    #[tokio::test]
    async fn free_text_without_entitlement_falls_to_the_hint() {
        let (dispatcher, _) =
            dispatcher(MemoryStore::with_profile(Profile::new("u1")), FakeLlm { reply: Some("x") });

        let response = dispatcher.handle_event(&message("u1", "hello there")).await;
        assert_eq!(text_of(&response[0]), HINT_TEXT);
    }

    #[tokio::test]
    async fn raw_postbacks_never_reach_the_consult() {
        let (dispatcher, _) = dispatcher(
            MemoryStore::with_profile(subscribed_profile("u1")),
            FakeLlm { reply: Some("should not appear") },
        );

        let response = dispatcher.handle_event(&postback_event("u1", "stray_payload")).await;
        assert_eq!(text_of(&response[0]), HINT_TEXT);
    }

    #[tokio::test]
    async fn consult_falls_back_when_generation_fails() {
        let (dispatcher, _) = dispatcher(
            MemoryStore::with_profile(subscribed_profile("u1")),
            FakeLlm { reply: None },
        );

        let response = dispatcher.handle_event(&message("u1", "any advice?")).await;
        assert_eq!(text_of(&response[0]), consult::CONSULT_FALLBACK);
    }

    #[tokio::test]
    async fn active_diagnosis_owns_the_followup_trigger() {
        let (dispatcher, _) = dispatcher(
            MemoryStore::with_profile(subscribed_profile("u1")),
            FakeLlm { reply: Some("x") },
        );

        dispatcher.handle_event(&postback_event("u1", "diagnosis")).await;
        dispatcher.handle_event(&postback_event("u1", "pain")).await;

        // "check-in" mid-diagnosis is just invalid input for the step.
        let response = dispatcher.handle_event(&message("u1", "check-in")).await;
        let (title, _) = menu_of(&response);
        assert_eq!(title, "Question 1 of 5");
        assert!(!dispatcher.followup.contains("u1"));
    }
}
