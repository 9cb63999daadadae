//! Static question-tree registry.
//!
//! Trees are fixed at deploy time and read-only at runtime. Every
//! complaint category runs the same shape: five single-choice steps,
//! where steps 2 and 5 (environment temperature, motion test) are
//! shared across categories and steps 1/3/4 are category-specific.
//! Steps 1-3 carry axis contributions (vigor, thermal, qi/blood tilt);
//! step 4 keys the flow dictionary and step 5 the organ dictionary.
//!
//! The follow-up check-in form also lives here: four fixed steps, one
//! of them multi-field, one a numeric scale.
//!
//! `validate_data` checks the authoring rules; collisions or gaps in
//! the static data are defects, not runtime behavior.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::flow::{Choice, FieldDef, FormStep};
use crate::profile::{FOLLOWUP_REQUIRED_FIELDS, Profile};

/// Number of leading steps whose answers feed the axis score.
pub const SCORED_STEPS: usize = 3;
/// Step index (0-based) whose answer keys the flow dictionary.
pub const FLOW_STEP: usize = 3;
/// Step index (0-based) whose answer keys the organ dictionary.
pub const ORGAN_STEP: usize = 4;

/// The fixed set of complaint categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Digestion,
    Fatigue,
    Pain,
    Sleep,
    Skin,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Digestion,
        Category::Fatigue,
        Category::Pain,
        Category::Sleep,
        Category::Skin,
    ];

    /// Machine token used in category-selection postbacks.
    pub fn token(self) -> &'static str {
        match self {
            Category::Digestion => "digestion",
            Category::Fatigue => "fatigue",
            Category::Pain => "pain",
            Category::Sleep => "sleep",
            Category::Skin => "skin",
        }
    }

    /// Display label, also stored on the profile as the complaint label.
    pub fn label(self) -> &'static str {
        match self {
            Category::Digestion => "digestive trouble",
            Category::Fatigue => "low energy",
            Category::Pain => "aches and pain",
            Category::Sleep => "poor sleep",
            Category::Skin => "skin trouble",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.token() == token)
    }
}

// Shared step 2: thermal tendency (axis 2).
const ENV_TEMP: FormStep = FormStep {
    id: "env_temp",
    header: "Question 2 of 5",
    body: "Think of the rooms you spend your days in. Which is closer to you?",
    fields: &[FieldDef {
        key: "env_temp",
        label: "Temperature comfort",
        choices: &[
            Choice::scored("A", "I chill easily and reach for warm drinks and layers", -1),
            Choice::scored("B", "Room temperature rarely bothers me either way", 0),
            Choice::scored("C", "I run hot, open windows and want something cold", 1),
        ],
    }],
};

// Shared step 5: motion test, keys the organ-burden dictionary.
const MOTION_TEST: FormStep = FormStep {
    id: "motion_test",
    header: "Question 5 of 5",
    body: "Try each movement slowly and pick the one that feels stiffest or hardest.",
    fields: &[FieldDef {
        key: "motion_test",
        label: "Hardest motion",
        choices: &[
            Choice::new("A", "Raising both arms straight overhead"),
            Choice::new("B", "Twisting the upper body to look behind"),
            Choice::new("C", "Bending forward to touch the floor"),
            Choice::new("D", "Squatting down and standing back up"),
            Choice::new("E", "Tilting the head back to look at the ceiling"),
        ],
    }],
};

const DIGESTION_TREE: [FormStep; 5] = [
    FormStep {
        id: "digestion_1",
        header: "Question 1 of 5",
        body: "How does your stomach usually greet a full meal?",
        fields: &[FieldDef {
            key: "digestion_1",
            label: "Appetite and drive",
            choices: &[
                Choice::scored("A", "Small appetite, food sits heavy, I tire after eating", -1),
                Choice::scored("B", "Normal appetite, meals come and go without drama", 0),
                Choice::scored("C", "Strong appetite, I eat fast and still feel restless", 1),
            ],
        }],
    },
    ENV_TEMP,
    FormStep {
        id: "digestion_3",
        header: "Question 3 of 5",
        body: "Between meals, which set sounds more like you?",
        fields: &[FieldDef {
            key: "digestion_3",
            label: "Depletion pattern",
            choices: &[
                Choice::scored("A", "Pale lips, dizzy when standing, dry eyes at night", -1),
                Choice::scored("B", "Neither set fits me", 0),
                Choice::scored("C", "Short of breath, quiet voice, sweat at the slightest effort", 1),
            ],
        }],
    },
    FormStep {
        id: "digestion_4",
        header: "Question 4 of 5",
        body: "When the discomfort shows up, how does it behave?",
        fields: &[FieldDef {
            key: "digestion_4",
            label: "Discomfort pattern",
            choices: &[
                Choice::new("A", "Bloating that wanders and worsens with stress"),
                Choice::new("B", "A fixed, stabbing spot that hates pressure"),
                Choice::new("C", "Heaviness and nausea, worse on damp days"),
                Choice::new("D", "None of these patterns"),
            ],
        }],
    },
    MOTION_TEST,
];

const FATIGUE_TREE: [FormStep; 5] = [
    FormStep {
        id: "fatigue_1",
        header: "Question 1 of 5",
        body: "After a full night's sleep, how does your body feel?",
        fields: &[FieldDef {
            key: "fatigue_1",
            label: "Morning reserve",
            choices: &[
                Choice::scored("A", "Still drained, getting up is the hardest part of the day", -1),
                Choice::scored("B", "Recovered and ready after a normal night", 0),
                Choice::scored("C", "Wound up and restless even when I slept enough", 1),
            ],
        }],
    },
    ENV_TEMP,
    FormStep {
        id: "fatigue_3",
        header: "Question 3 of 5",
        body: "When the tiredness hits, which companions come with it?",
        fields: &[FieldDef {
            key: "fatigue_3",
            label: "Depletion pattern",
            choices: &[
                Choice::scored("A", "Pallor, light-headedness, numb fingertips", -1),
                Choice::scored("B", "Just tired, nothing else notable", 0),
                Choice::scored("C", "Breathlessness, a voice that fades, spontaneous sweat", 1),
            ],
        }],
    },
    FormStep {
        id: "fatigue_4",
        header: "Question 4 of 5",
        body: "Which best matches how the fatigue moves through your day?",
        fields: &[FieldDef {
            key: "fatigue_4",
            label: "Fatigue pattern",
            choices: &[
                Choice::new("A", "It swings with my mood and eases when I unwind"),
                Choice::new("B", "A fixed heaviness in one spot, worse at night"),
                Choice::new("C", "A foggy, swollen heaviness, worse in humid weather"),
                Choice::new("D", "None of these patterns"),
            ],
        }],
    },
    MOTION_TEST,
];

const PAIN_TREE: [FormStep; 5] = [
    FormStep {
        id: "pain_1",
        header: "Question 1 of 5",
        body: "How does your body hold up through an ordinary day?",
        fields: &[FieldDef {
            key: "pain_1",
            label: "Daily reserve",
            choices: &[
                Choice::scored("A", "I run out of strength early and ache when exhausted", -1),
                Choice::scored("B", "I get through the day without much trouble", 0),
                Choice::scored("C", "I push hard all day and tense up instead of tiring", 1),
            ],
        }],
    },
    ENV_TEMP,
    FormStep {
        id: "pain_3",
        header: "Question 3 of 5",
        body: "Alongside the aches, which set sounds more like you?",
        fields: &[FieldDef {
            key: "pain_3",
            label: "Depletion pattern",
            choices: &[
                Choice::scored("A", "Cramps at night, brittle nails, a pale face", -1),
                Choice::scored("B", "Neither set fits me", 0),
                Choice::scored("C", "Weak grip, heavy limbs, sweat from small efforts", 1),
            ],
        }],
    },
    FormStep {
        id: "pain_4",
        header: "Question 4 of 5",
        body: "When the pain speaks, what is its accent?",
        fields: &[FieldDef {
            key: "pain_4",
            label: "Pain pattern",
            choices: &[
                Choice::new("A", "It wanders and flares when I am stressed"),
                Choice::new("B", "Fixed and stabbing, always the same spot, worse at night"),
                Choice::new("C", "Dull, heavy and swollen, worse on rainy days"),
                Choice::new("D", "None of these patterns"),
            ],
        }],
    },
    MOTION_TEST,
];

const SLEEP_TREE: [FormStep; 5] = [
    FormStep {
        id: "sleep_1",
        header: "Question 1 of 5",
        body: "What does falling asleep usually look like for you?",
        fields: &[FieldDef {
            key: "sleep_1",
            label: "Sleep drive",
            choices: &[
                Choice::scored("A", "I am exhausted yet sleep stays thin and I wake unrefreshed", -1),
                Choice::scored("B", "I drift off within a reasonable time most nights", 0),
                Choice::scored("C", "My mind races and my body stays keyed up past midnight", 1),
            ],
        }],
    },
    ENV_TEMP,
    FormStep {
        id: "sleep_3",
        header: "Question 3 of 5",
        body: "On the bad nights, which extras show up?",
        fields: &[FieldDef {
            key: "sleep_3",
            label: "Depletion pattern",
            choices: &[
                Choice::scored("A", "Vivid dreams, palpitations, dry mouth at 3am", -1),
                Choice::scored("B", "Nothing beyond the sleeplessness itself", 0),
                Choice::scored("C", "Shallow breath, fatigue that sleep never repays", 1),
            ],
        }],
    },
    FormStep {
        id: "sleep_4",
        header: "Question 4 of 5",
        body: "Which best matches the nights themselves?",
        fields: &[FieldDef {
            key: "sleep_4",
            label: "Night pattern",
            choices: &[
                Choice::new("A", "Thoughts loop and tension keeps me turning"),
                Choice::new("B", "I wake at the same hour with a fixed discomfort"),
                Choice::new("C", "A heavy, groggy fog that lingers into the morning"),
                Choice::new("D", "None of these patterns"),
            ],
        }],
    },
    MOTION_TEST,
];

const SKIN_TREE: [FormStep; 5] = [
    FormStep {
        id: "skin_1",
        header: "Question 1 of 5",
        body: "How does your skin ride the rhythm of your weeks?",
        fields: &[FieldDef {
            key: "skin_1",
            label: "Skin resilience",
            choices: &[
                Choice::scored("A", "Thin, easily irritated, slow to heal when I am run down", -1),
                Choice::scored("B", "Mostly settled, the odd blemish comes and goes", 0),
                Choice::scored("C", "Oily and quick to flare red or break out", 1),
            ],
        }],
    },
    ENV_TEMP,
    FormStep {
        id: "skin_3",
        header: "Question 3 of 5",
        body: "Beyond the skin itself, which set sounds more like you?",
        fields: &[FieldDef {
            key: "skin_3",
            label: "Depletion pattern",
            choices: &[
                Choice::scored("A", "Dry flaking, brittle hair, pale complexion", -1),
                Choice::scored("B", "Neither set fits me", 0),
                Choice::scored("C", "Clammy sweat, fatigue, flare-ups after exertion", 1),
            ],
        }],
    },
    FormStep {
        id: "skin_4",
        header: "Question 4 of 5",
        body: "When a flare arrives, how does it behave?",
        fields: &[FieldDef {
            key: "skin_4",
            label: "Flare pattern",
            choices: &[
                Choice::new("A", "Itching that migrates and spikes under stress"),
                Choice::new("B", "Dark, fixed patches that sit in one place"),
                Choice::new("C", "Weeping, puffy eruptions, worse in muggy weather"),
                Choice::new("D", "None of these patterns"),
            ],
        }],
    },
    MOTION_TEST,
];

/// The five-step question tree for a category.
pub fn tree(category: Category) -> &'static [FormStep] {
    match category {
        Category::Digestion => &DIGESTION_TREE,
        Category::Fatigue => &FATIGUE_TREE,
        Category::Pain => &PAIN_TREE,
        Category::Sleep => &SLEEP_TREE,
        Category::Skin => &SKIN_TREE,
    }
}

/// Question definition for `(category, step)`, 0-based. `None` past the
/// end of the tree.
pub fn question(category: Category, step: usize) -> Option<&'static FormStep> {
    tree(category).get(step)
}

/// Axis contribution of `code` at a scored step. `None` when the step
/// is not scored or the code is not declared.
pub fn axis_value(category: Category, step: usize, code: &str) -> Option<i8> {
    if step >= SCORED_STEPS {
        return None;
    }
    question(category, step)?
        .single_field()
        .choice(code)
        .and_then(|c| c.axis)
}

// --- follow-up check-in -------------------------------------------------

const FOLLOWUP_STEPS: [FormStep; 4] = [
    FormStep {
        id: "fu_symptom",
        header: "Check-in 1 of 4",
        body: "Since your last check-in, how has your {{symptom}} been?",
        fields: &[FieldDef {
            key: "symptom",
            label: "Symptom",
            choices: &[
                Choice::new("better", "Noticeably better"),
                Choice::new("same", "About the same"),
                Choice::new("worse", "Worse than before"),
            ],
        }],
    },
    FormStep {
        id: "fu_rest",
        header: "Check-in 2 of 4",
        body: "How were your nights and your self-care routines this week? Answer both.",
        fields: &[
            FieldDef {
                key: "sleep",
                label: "Sleep",
                choices: &[
                    Choice::new("well", "Slept well"),
                    Choice::new("fair", "So-so"),
                    Choice::new("poorly", "Slept poorly"),
                ],
            },
            FieldDef {
                key: "habits",
                label: "Routines",
                choices: &[
                    Choice::new("kept", "Kept them up"),
                    Choice::new("partly", "Kept some"),
                    Choice::new("skipped", "Mostly skipped"),
                ],
            },
        ],
    },
    FormStep {
        id: "fu_motion",
        header: "Check-in 3 of 4",
        body: "Repeat your motion test ({{motion}}) and tell me how it went.",
        fields: &[FieldDef {
            key: "motion_level",
            label: "Motion re-test",
            choices: &[
                Choice::new("1", "Much easier than last time"),
                Choice::new("2", "About the same"),
                Choice::new("3", "Stiffer than before"),
            ],
        }],
    },
    FormStep {
        id: "fu_difficulty",
        header: "Check-in 4 of 4",
        body: "Rate how hard {{motion}} feels right now, from 0 (easy) to 10 (cannot do it).",
        fields: &[FieldDef {
            key: "difficulty",
            label: "Difficulty",
            choices: &[
                Choice::new("0", "0"),
                Choice::new("1", "1"),
                Choice::new("2", "2"),
                Choice::new("3", "3"),
                Choice::new("4", "4"),
                Choice::new("5", "5"),
                Choice::new("6", "6"),
                Choice::new("7", "7"),
                Choice::new("8", "8"),
                Choice::new("9", "9"),
                Choice::new("10", "10"),
            ],
        }],
    },
];

/// Field key of the numeric-scale step whose value is mirrored onto the
/// profile as the motion difficulty level.
pub const DIFFICULTY_FIELD: &str = "difficulty";

pub fn followup_steps() -> &'static [FormStep] {
    &FOLLOWUP_STEPS
}

// --- placeholder rendering ----------------------------------------------

/// Values substituted into `{{symptom}}` / `{{motion}}` question
/// templates, resolved from the stored profile with neutral fallbacks
/// for users without a diagnosis on file.
#[derive(Debug, Clone)]
pub struct PlaceholderCtx {
    pub symptom: String,
    pub motion: String,
}

impl PlaceholderCtx {
    pub fn from_profile(profile: Option<&Profile>) -> Self {
        let diagnosis = profile.and_then(|p| p.diagnosis.as_ref());
        Self {
            symptom: diagnosis
                .map(|d| d.complaint.clone())
                .unwrap_or_else(|| "main symptom".to_string()),
            motion: diagnosis
                .map(|d| d.motion_label.clone())
                .unwrap_or_else(|| "your hardest motion".to_string()),
        }
    }
}

/// Resolve named placeholders in a question template.
pub fn render(template: &str, ctx: &PlaceholderCtx) -> String {
    template
        .replace("{{symptom}}", &ctx.symptom)
        .replace("{{motion}}", &ctx.motion)
}

// --- data authoring checks ----------------------------------------------

/// Validate the static question data. Returns one message per defect;
/// empty means the data is sound. Run by a unit test and by
/// `ondam-cli validate`, never at request time.
pub fn validate_data() -> Vec<String> {
    let mut defects = Vec::new();

    for category in Category::ALL {
        let steps = tree(category);
        if steps.len() != 5 {
            defects.push(format!(
                "{}: expected 5 steps, found {}",
                category.token(),
                steps.len()
            ));
        }
        for (i, step) in steps.iter().enumerate() {
            for field in step.fields {
                let mut codes: Vec<&str> = field.choices.iter().map(|c| c.code).collect();
                codes.sort_unstable();
                codes.dedup();
                if codes.len() != field.choices.len() {
                    defects.push(format!("{}/{}: duplicate choice codes", step.id, field.key));
                }
            }
            if i < SCORED_STEPS {
                if step.is_multi() {
                    defects.push(format!("{}: scored steps must be single-choice", step.id));
                }
                for choice in step.single_field().choices {
                    match choice.axis {
                        Some(-1..=1) => {}
                        Some(v) => defects.push(format!(
                            "{}/{}: axis contribution {v} outside {{-1,0,1}}",
                            step.id, choice.code
                        )),
                        None => defects.push(format!(
                            "{}/{}: scored option missing axis contribution",
                            step.id, choice.code
                        )),
                    }
                }
            } else {
                for field in step.fields {
                    for choice in field.choices {
                        if choice.axis.is_some() {
                            defects.push(format!(
                                "{}/{}: auxiliary option must not carry an axis contribution",
                                step.id, choice.code
                            ));
                        }
                    }
                }
            }
        }
        if let Some(step) = steps.get(FLOW_STEP) {
            if step.single_field().choices.len() != 4 {
                defects.push(format!("{}: flow step must offer 4 choices", step.id));
            }
        }
        if let Some(step) = steps.get(ORGAN_STEP) {
            if step.single_field().choices.len() != 5 {
                defects.push(format!("{}: organ step must offer 5 choices", step.id));
            }
        }
    }

    let followup_keys: Vec<&str> = FOLLOWUP_STEPS
        .iter()
        .flat_map(|s| s.fields.iter().map(|f| f.key))
        .collect();
    for required in FOLLOWUP_REQUIRED_FIELDS {
        if !followup_keys.contains(required) {
            defects.push(format!("follow-up form missing required field '{required}'"));
        }
    }
    {
        let mut keys = followup_keys.clone();
        keys.sort_unstable();
        keys.dedup();
        if keys.len() != followup_keys.len() {
            defects.push("follow-up form declares a field key twice".to_string());
        }
    }
    for key in ["motion_level", DIFFICULTY_FIELD] {
        for step in &FOLLOWUP_STEPS {
            for field in step.fields.iter().filter(|f| f.key == key) {
                for choice in field.choices {
                    if choice.code.parse::<i32>().is_err() {
                        defects.push(format!(
                            "{}/{}: numeric field has non-numeric code '{}'",
                            step.id, key, choice.code
                        ));
                    }
                }
            }
        }
    }

    defects
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_data_has_no_authoring_defects() {
        let defects = validate_data();
        assert!(defects.is_empty(), "defects: {defects:?}");
    }

    #[test]
    fn every_category_resolves_from_its_token() {
        for category in Category::ALL {
            assert_eq!(Category::from_token(category.token()), Some(category));
        }
        assert_eq!(Category::from_token("not_a_category"), None);
    }

    #[test]
    fn shared_steps_appear_in_every_tree() {
        for category in Category::ALL {
            let steps = tree(category);
            assert_eq!(steps[1].id, "env_temp");
            assert_eq!(steps[4].id, "motion_test");
        }
    }

    #[test]
    fn question_lookup_is_absent_past_the_tree() {
        assert!(question(Category::Pain, 4).is_some());
        assert!(question(Category::Pain, 5).is_none());
    }

    #[test]
    fn axis_values_cover_only_scored_steps() {
        assert_eq!(axis_value(Category::Pain, 0, "A"), Some(-1));
        assert_eq!(axis_value(Category::Pain, 1, "C"), Some(1));
        assert_eq!(axis_value(Category::Pain, 2, "B"), Some(0));
        assert_eq!(axis_value(Category::Pain, 3, "A"), None);
        assert_eq!(axis_value(Category::Pain, 0, "Z"), None);
    }

    #[test]
    fn answer_count_tracks_the_step_cursor_through_a_whole_tree() {
        use crate::flow::{Advance, FormSession, Submit};

        let steps = tree(Category::Fatigue);
        let mut form = FormSession::new();
        for n in 0..steps.len() {
            assert_eq!(form.step(), n);
            assert_eq!(form.answered(), n);
            let advance = form.submit(steps, Submit::Single { code: "B" });
            assert_ne!(advance, Advance::Rejected, "code B is declared on every step");
        }
        assert!(form.is_complete(steps));
        assert_eq!(form.answered(), steps.len());
    }

    #[test]
    fn placeholders_render_from_the_template() {
        let ctx = PlaceholderCtx {
            symptom: "lower-back pain".into(),
            motion: "bending forward".into(),
        };
        assert_eq!(
            render("How has your {{symptom}} been?", &ctx),
            "How has your lower-back pain been?"
        );
        assert_eq!(
            render("Repeat {{motion}} now.", &ctx),
            "Repeat bending forward now."
        );
    }
}
