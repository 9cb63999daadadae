//! Generic guided multi-step form engine.
//!
//! Both conversational flows — the initial diagnosis and the recurring
//! follow-up check-in — are the same machine: a fixed ordered list of
//! steps, each collecting one or more named fields from a fixed choice
//! set, advancing only when every field of the current step has a
//! recorded value. The engine is pure; all I/O (prompt rendering,
//! persistence, AI calls) belongs to the drivers in the bot crate.

use std::collections::BTreeMap;

/// One selectable choice. `axis` is the option's contribution to a
/// scored diagnosis axis; it is question metadata the form engine
/// itself never reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Choice {
    pub code: &'static str,
    pub label: &'static str,
    pub axis: Option<i8>,
}

impl Choice {
    pub const fn new(code: &'static str, label: &'static str) -> Self {
        Self {
            code,
            label,
            axis: None,
        }
    }

    pub const fn scored(code: &'static str, label: &'static str, axis: i8) -> Self {
        Self {
            code,
            label,
            axis: Some(axis),
        }
    }
}

/// A named sub-answer within a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDef {
    pub key: &'static str,
    pub label: &'static str,
    pub choices: &'static [Choice],
}

impl FieldDef {
    pub fn choice(&self, code: &str) -> Option<&'static Choice> {
        self.choices.iter().find(|c| c.code == code)
    }
}

/// One step of a guided form. A single-choice step has exactly one
/// field; a multi-field step declares several, all of which must be
/// answered before the step completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormStep {
    pub id: &'static str,
    /// Header template; may contain `{{symptom}}` / `{{motion}}`
    /// placeholders resolved by the caller against the profile.
    pub header: &'static str,
    pub body: &'static str,
    pub fields: &'static [FieldDef],
}

impl FormStep {
    pub fn is_multi(&self) -> bool {
        self.fields.len() > 1
    }

    /// The sole field of a single-choice step.
    pub fn single_field(&self) -> &'static FieldDef {
        &self.fields[0]
    }
}

/// An answer submission for the current step.
#[derive(Debug, Clone, Copy)]
pub enum Submit<'a> {
    /// Bare choice code for a single-choice step.
    Single { code: &'a str },
    /// Named field value (multi-field steps, and follow-up single steps
    /// whose postbacks carry the field key).
    Field { key: &'a str, value: &'a str },
}

/// Echo of a completed step: (field label, chosen choice label) in
/// declared field order.
pub type StepEcho = Vec<(String, String)>;

/// Outcome of a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advance<'s> {
    /// Input did not match the current step's declared fields/choices.
    /// No state changed; the caller re-prompts the same step.
    Rejected,
    /// A field of a multi-field step was recorded but others are still
    /// missing. No outbound message yet.
    Pending,
    /// Step completed; `step` is the next one to ask.
    Next { echo: StepEcho, step: &'s FormStep },
    /// The final step completed; the form is exhausted.
    Complete { echo: StepEcho },
}

/// Progress through a guided form. Holds the step cursor, the answers
/// of completed steps, and the partial answers of an in-progress
/// multi-field step. Invariant: `answers.len() == step` whenever the
/// next prompt is requested.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormSession {
    step: usize,
    answers: Vec<Vec<(&'static str, String)>>,
    partial: BTreeMap<&'static str, String>,
}

impl FormSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of the step currently being asked (0-based).
    pub fn step(&self) -> usize {
        self.step
    }

    /// Number of completed steps.
    pub fn answered(&self) -> usize {
        self.answers.len()
    }

    pub fn current<'s>(&self, steps: &'s [FormStep]) -> Option<&'s FormStep> {
        steps.get(self.step)
    }

    pub fn is_complete(&self, steps: &[FormStep]) -> bool {
        self.step >= steps.len()
    }

    /// Choice codes of completed steps, one per step, in order. Only
    /// meaningful for forms made of single-choice steps (diagnosis).
    pub fn single_codes(&self) -> Vec<&str> {
        self.answers
            .iter()
            .filter_map(|step| step.first().map(|(_, v)| v.as_str()))
            .collect()
    }

    /// All recorded field values keyed by field name, across steps.
    pub fn flatten(&self) -> BTreeMap<String, String> {
        self.answers
            .iter()
            .flatten()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    /// Submit one answer against the current step.
    pub fn submit<'s>(&mut self, steps: &'s [FormStep], input: Submit<'_>) -> Advance<'s> {
        let Some(step) = self.current(steps) else {
            return Advance::Rejected;
        };

        let (field, value) = match input {
            Submit::Single { code } => {
                if step.is_multi() {
                    return Advance::Rejected;
                }
                (step.single_field(), code)
            }
            Submit::Field { key, value } => {
                match step.fields.iter().find(|f| f.key == key) {
                    Some(field) => (field, value),
                    None => return Advance::Rejected,
                }
            }
        };

        if field.choice(value).is_none() {
            return Advance::Rejected;
        }

        self.partial.insert(field.key, value.to_string());

        if !step.fields.iter().all(|f| self.partial.contains_key(f.key)) {
            return Advance::Pending;
        }

        // All declared fields present: merge partials into the answer
        // list in declared order and advance, in one motion.
        let mut recorded = Vec::with_capacity(step.fields.len());
        let mut echo = Vec::with_capacity(step.fields.len());
        for f in step.fields {
            let value = self.partial.remove(f.key).unwrap_or_default();
            let label = f
                .choice(&value)
                .map(|c| c.label.to_string())
                .unwrap_or_else(|| value.clone());
            echo.push((f.label.to_string(), label));
            recorded.push((f.key, value));
        }
        self.partial.clear();
        self.answers.push(recorded);
        self.step += 1;

        match self.current(steps) {
            Some(next) => Advance::Next { echo, step: next },
            None => Advance::Complete { echo },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const YES_NO: &[Choice] = &[Choice::new("y", "Yes"), Choice::new("n", "No")];

    const STEPS: &[FormStep] = &[
        FormStep {
            id: "s1",
            header: "Step 1",
            body: "First?",
            fields: &[FieldDef {
                key: "first",
                label: "First",
                choices: YES_NO,
            }],
        },
        FormStep {
            id: "s2",
            header: "Step 2",
            body: "Pair?",
            fields: &[
                FieldDef {
                    key: "left",
                    label: "Left",
                    choices: YES_NO,
                },
                FieldDef {
                    key: "right",
                    label: "Right",
                    choices: YES_NO,
                },
            ],
        },
        FormStep {
            id: "s3",
            header: "Step 3",
            body: "Last?",
            fields: &[FieldDef {
                key: "last",
                label: "Last",
                choices: YES_NO,
            }],
        },
    ];

    #[test]
    fn valid_submissions_advance_one_step_each() {
        let mut form = FormSession::new();
        assert_eq!(form.step(), 0);

        match form.submit(STEPS, Submit::Single { code: "y" }) {
            Advance::Next { step, .. } => assert_eq!(step.id, "s2"),
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(form.step(), 1);
        assert_eq!(form.answered(), 1);
    }

    #[test]
    fn invalid_choice_leaves_state_unchanged() {
        let mut form = FormSession::new();
        assert_eq!(form.submit(STEPS, Submit::Single { code: "x" }), Advance::Rejected);
        assert_eq!(form.step(), 0);
        assert_eq!(form.answered(), 0);
    }

    #[test]
    fn unknown_field_key_is_rejected() {
        let mut form = FormSession::new();
        assert_eq!(
            form.submit(STEPS, Submit::Field { key: "nope", value: "y" }),
            Advance::Rejected
        );
        assert_eq!(form.step(), 0);
    }

    #[test]
    fn multi_field_step_gates_until_every_field_is_present() {
        let mut form = FormSession::new();
        form.submit(STEPS, Submit::Single { code: "y" });

        assert_eq!(
            form.submit(STEPS, Submit::Field { key: "left", value: "y" }),
            Advance::Pending
        );
        assert_eq!(form.step(), 1, "partial multi step must not advance");

        match form.submit(STEPS, Submit::Field { key: "right", value: "n" }) {
            Advance::Next { echo, step } => {
                assert_eq!(step.id, "s3");
                assert_eq!(
                    echo,
                    vec![
                        ("Left".to_string(), "Yes".to_string()),
                        ("Right".to_string(), "No".to_string())
                    ]
                );
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(form.step(), 2);
    }

    #[test]
    fn resubmitting_a_multi_field_overwrites_without_advancing() {
        let mut form = FormSession::new();
        form.submit(STEPS, Submit::Single { code: "y" });
        form.submit(STEPS, Submit::Field { key: "left", value: "y" });
        assert_eq!(
            form.submit(STEPS, Submit::Field { key: "left", value: "n" }),
            Advance::Pending
        );
        form.submit(STEPS, Submit::Field { key: "right", value: "y" });
        assert_eq!(form.flatten().get("left").map(String::as_str), Some("n"));
    }

    #[test]
    fn completing_the_last_step_reports_complete() {
        let mut form = FormSession::new();
        form.submit(STEPS, Submit::Single { code: "y" });
        form.submit(STEPS, Submit::Field { key: "left", value: "y" });
        form.submit(STEPS, Submit::Field { key: "right", value: "y" });
        match form.submit(STEPS, Submit::Single { code: "n" }) {
            Advance::Complete { .. } => {}
            other => panic!("unexpected: {other:?}"),
        }
        assert!(form.is_complete(STEPS));
        assert_eq!(form.single_codes(), vec!["y", "y", "n"]);
    }

    #[test]
    fn submissions_after_completion_are_rejected() {
        let mut form = FormSession::new();
        form.submit(STEPS, Submit::Single { code: "y" });
        form.submit(STEPS, Submit::Field { key: "left", value: "y" });
        form.submit(STEPS, Submit::Field { key: "right", value: "y" });
        form.submit(STEPS, Submit::Single { code: "n" });
        assert_eq!(form.submit(STEPS, Submit::Single { code: "y" }), Advance::Rejected);
    }
}
