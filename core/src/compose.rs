//! Result/advisory composer.
//!
//! Turns a completed diagnosis answer list into the user-facing result
//! payload: constitution type, trait text, flow and organ readings, and
//! the self-care advisory. Also shapes the context snapshot persisted
//! on the profile.

use crate::classify;
use crate::message::OutboundMessage;
use crate::profile::DiagnosisContext;
use crate::questions::{self, Category, FLOW_STEP, ORGAN_STEP};

/// Label used when the score triple resolves to no table entry.
pub const UNCLASSIFIED_LABEL: &str = "Unclassified";

/// Assembled diagnosis result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosisReport {
    /// False when the classification lookup missed; the payload then
    /// carries the defined unclassified texts instead of a type.
    pub classified: bool,
    pub type_label: String,
    pub traits: String,
    pub advisory: String,
    pub remedy: Option<String>,
    pub care: Vec<String>,
    pub score: [i8; 3],
    pub flow_label: String,
    pub flow_text: String,
    pub organ_label: String,
    pub organ_text: String,
    /// Label of the motion the user picked as hardest
    pub motion_label: String,
}

/// Compose the result for a finished tree: the first three codes feed
/// the axis score, the fourth and fifth the auxiliary dictionaries.
pub fn compose(category: Category, codes: &[&str]) -> DiagnosisReport {
    let mut score = [0i8; 3];
    let mut scored = true;
    for (i, slot) in score.iter_mut().enumerate() {
        match codes
            .get(i)
            .and_then(|code| questions::axis_value(category, i, code))
        {
            Some(v) => *slot = v,
            None => scored = false,
        }
    }

    let flow = classify::lookup_flow(codes.get(FLOW_STEP).copied().unwrap_or(""));
    let organ_code = codes.get(ORGAN_STEP).copied().unwrap_or("");
    let organ = classify::lookup_organ(organ_code);
    let motion_label = questions::question(category, ORGAN_STEP)
        .and_then(|step| step.single_field().choice(organ_code))
        .map(|c| c.label.to_string())
        .unwrap_or_default();

    let entry = if scored {
        classify::classify(score[0], score[1], score[2])
    } else {
        None
    };

    match entry {
        Some(c) => DiagnosisReport {
            classified: true,
            type_label: c.label.to_string(),
            traits: c.traits.to_string(),
            advisory: c.advisory.to_string(),
            remedy: Some(c.remedy.to_string()),
            care: c.care.iter().map(|s| s.to_string()).collect(),
            score,
            flow_label: flow.label.to_string(),
            flow_text: flow.text.to_string(),
            organ_label: organ.label.to_string(),
            organ_text: organ.text.to_string(),
            motion_label,
        },
        None => DiagnosisReport {
            classified: false,
            type_label: UNCLASSIFIED_LABEL.to_string(),
            traits: "Your answers did not match a constitution type on file.".to_string(),
            advisory: "Please run the diagnosis once more; if this repeats, contact support."
                .to_string(),
            remedy: None,
            care: Vec::new(),
            score,
            flow_label: flow.label.to_string(),
            flow_text: flow.text.to_string(),
            organ_label: organ.label.to_string(),
            organ_text: organ.text.to_string(),
            motion_label,
        },
    }
}

/// Render the report as the outbound result messages: the reading
/// itself, then the advisory block.
pub fn render(report: &DiagnosisReport) -> Vec<OutboundMessage> {
    let mut messages = Vec::with_capacity(2);

    messages.push(OutboundMessage::text(format!(
        "Your constitution reading: {}\n\n{}\n\nFlow: {}. {}\n\nOrgan focus: {}. {}",
        report.type_label,
        report.traits,
        report.flow_label,
        report.flow_text,
        report.organ_label,
        report.organ_text,
    )));

    let mut advisory = report.advisory.clone();
    if !report.care.is_empty() {
        advisory.push_str("\n\nRecommended self-care: ");
        advisory.push_str(&report.care.join(", "));
    }
    if let Some(remedy) = &report.remedy {
        advisory.push_str("\nSuggested remedy: ");
        advisory.push_str(remedy);
    }
    messages.push(OutboundMessage::text(advisory));

    messages
}

/// Profile snapshot of this report for the storage collaborator.
pub fn to_context(category: Category, report: &DiagnosisReport) -> DiagnosisContext {
    DiagnosisContext {
        category_label: category.label().to_string(),
        type_label: report.type_label.clone(),
        traits: report.traits.clone(),
        score: report.score,
        flow_label: report.flow_label.clone(),
        organ_label: report.organ_label.clone(),
        advisory: report.advisory.clone(),
        complaint: category.label().to_string(),
        motion_label: report.motion_label.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_a_answers_on_the_pain_tree_compose_the_cold_depleted_type() {
        let report = compose(Category::Pain, &["A", "A", "A", "A", "A"]);
        assert!(report.classified);
        assert_eq!(report.score, [-1, -1, -1]);
        assert_eq!(report.type_label, "Cold Depleted (blood-sparse)");
        assert_eq!(report.flow_label, "qi stagnation");
        assert_eq!(report.organ_label, "lung");
        assert_eq!(report.motion_label, "Raising both arms straight overhead");
    }

    #[test]
    fn unknown_codes_compose_the_unclassified_result() {
        let report = compose(Category::Pain, &["Z", "A", "A", "A", "A"]);
        assert!(!report.classified);
        assert_eq!(report.type_label, UNCLASSIFIED_LABEL);
        assert!(report.remedy.is_none());
    }

    #[test]
    fn render_produces_reading_then_advisory() {
        let report = compose(Category::Sleep, &["B", "B", "B", "D", "C"]);
        let messages = render(&report);
        assert_eq!(messages.len(), 2);
        match &messages[0] {
            OutboundMessage::Text { text } => {
                assert!(text.contains("Temperate Steady (even-keeled)"));
                assert!(text.contains("kidney"));
            }
            other => panic!("unexpected: {other:?}"),
        }
        match &messages[1] {
            OutboundMessage::Text { text } => assert!(text.contains("Recommended self-care")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn context_snapshot_mirrors_the_report() {
        let report = compose(Category::Skin, &["C", "C", "C", "B", "E"]);
        let ctx = to_context(Category::Skin, &report);
        assert_eq!(ctx.category_label, "skin trouble");
        assert_eq!(ctx.type_label, report.type_label);
        assert_eq!(ctx.score, [1, 1, 1]);
        assert_eq!(ctx.organ_label, "heart");
        assert_eq!(ctx.motion_label, "Tilting the head back to look at the ceiling");
    }
}
