//! Constitution classification.
//!
//! Pure lookups over static tables. The classification key is the
//! ordered axis triple (vigor, thermal tendency, qi/blood tilt), each
//! axis in {-1, 0, 1}; the table carries exactly one entry per key, 27
//! in total. A miss is a defined "unclassified" outcome handled by the
//! composer, never a panic.

/// One constitution type: exact-match key plus the advisory payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Constitution {
    /// (vigor, thermal, tilt), each in {-1, 0, 1}
    pub key: [i8; 3],
    pub label: &'static str,
    pub traits: &'static str,
    pub advisory: &'static str,
    /// Link to the matching self-care remedy page
    pub remedy: &'static str,
    /// Recommended self-care categories
    pub care: &'static [&'static str],
}

/// Flow-issue dictionary entry, keyed by the step-4 choice code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowEntry {
    pub code: &'static str,
    pub label: &'static str,
    pub text: &'static str,
}

/// Organ-burden dictionary entry, keyed by the motion-test choice code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrganEntry {
    pub code: &'static str,
    pub label: &'static str,
    pub text: &'static str,
}

/// Fixed default for unmapped auxiliary codes.
pub const NO_INFORMATION: &str = "No information recorded for this answer.";

const FLOW_DEFAULT: FlowEntry = FlowEntry {
    code: "?",
    label: "unknown",
    text: NO_INFORMATION,
};

const ORGAN_DEFAULT: OrganEntry = OrganEntry {
    code: "?",
    label: "unknown",
    text: NO_INFORMATION,
};

/// Exact-match classification. `None` only for keys outside the table,
/// which the caller reports as the unclassified result.
pub fn classify(vigor: i8, thermal: i8, tilt: i8) -> Option<&'static Constitution> {
    TABLE.iter().find(|c| c.key == [vigor, thermal, tilt])
}

/// Flow-issue lookup for the 4-way step-4 answer.
pub fn lookup_flow(code: &str) -> &'static FlowEntry {
    FLOW_TABLE
        .iter()
        .find(|f| f.code == code)
        .unwrap_or(&FLOW_DEFAULT)
}

/// Organ-burden lookup for the 5-way motion-test answer.
pub fn lookup_organ(code: &str) -> &'static OrganEntry {
    ORGAN_TABLE
        .iter()
        .find(|o| o.code == code)
        .unwrap_or(&ORGAN_DEFAULT)
}

const FLOW_TABLE: [FlowEntry; 4] = [
    FlowEntry {
        code: "A",
        label: "qi stagnation",
        text: "Your discomfort moves around and tracks your stress. That points to stalled qi rather than damage in one place. Unwinding routines and long exhales help more than rest alone.",
    },
    FlowEntry {
        code: "B",
        label: "blood stasis",
        text: "A fixed, stabbing spot that worsens at night suggests blood that pools instead of flowing. Gentle sustained movement and warmth on the area encourage it to move again.",
    },
    FlowEntry {
        code: "C",
        label: "damp accumulation",
        text: "Heaviness that swells on humid days points to dampness collecting faster than your body clears it. Lighter evening meals and regular sweat-raising walks drain it gradually.",
    },
    FlowEntry {
        code: "D",
        label: "no notable blockage",
        text: "No clear circulation pattern stands out. Keep to the basics of your type and re-check if a fixed or wandering discomfort appears.",
    },
];

const ORGAN_TABLE: [OrganEntry; 5] = [
    OrganEntry {
        code: "A",
        label: "lung",
        text: "Overhead reach is the first motion to stiffen when the lung channel along the arm and chest is under load. Open the chest often and favor slow, full breaths during the day.",
    },
    OrganEntry {
        code: "B",
        label: "liver",
        text: "Trunk rotation leans on the liver channel along the flanks. Stiffness here often rides with tension and irregular hours, so unwinding counts as much as stretching.",
    },
    OrganEntry {
        code: "C",
        label: "kidney",
        text: "A forward fold strains the kidney channel through the lower back and hamstrings. Guard your lower back from cold and build the fold up slowly each morning.",
    },
    OrganEntry {
        code: "D",
        label: "spleen",
        text: "Squatting leans on the spleen and stomach channels through the thighs. Heaviness here often follows irregular meals, so steady mealtimes support the motion work.",
    },
    OrganEntry {
        code: "E",
        label: "heart",
        text: "Tilting the head back loads the channels of the neck and chest tied to the heart. Ease in carefully, and pair the stretch with a calm, unhurried breath.",
    },
];

const TABLE: [Constitution; 27] = [
    Constitution {
        key: [-1, -1, -1],
        label: "Cold Depleted (blood-sparse)",
        traits: "Reserves run low, cold settles in fast, and the blood side of the ledger is thinnest. Hands and feet chill easily and recovery from effort is slow.",
        advisory: "Guard warmth before anything else. Warm cooked breakfasts, covered ankles and early nights rebuild more than hard training would.",
        remedy: "https://ondam.care/remedies/cold-depleted-blood",
        care: &["warm meals", "early nights", "warm foot baths"],
    },
    Constitution {
        key: [-1, -1, 0],
        label: "Cold Depleted (even-keeled)",
        traits: "Energy runs shallow and warmth escapes quickly, though qi and blood stay roughly in step. Quiet fatigue is the main complaint.",
        advisory: "Favor warming food and short, regular movement over bursts of effort. Let sleep do the heavy lifting for a season.",
        remedy: "https://ondam.care/remedies/cold-depleted-even",
        care: &["warm meals", "daily walks", "early nights"],
    },
    Constitution {
        key: [-1, -1, 1],
        label: "Cold Depleted (qi-short)",
        traits: "Low reserve, a cold tendency, and breath that runs out before the body does. Small efforts bring sweat and a fading voice.",
        advisory: "Spare the lungs wind and chill. Eat warm, rest before exhaustion arrives, and grow activity in minutes, not leaps.",
        remedy: "https://ondam.care/remedies/cold-depleted-qi",
        care: &["breathing practice", "warm meals", "restorative naps"],
    },
    Constitution {
        key: [-1, 0, -1],
        label: "Temperate Depleted (blood-sparse)",
        traits: "Temperature sits comfortably but reserves are thin, with the blood side most drawn down. Dizziness on standing and dry eyes at night are typical.",
        advisory: "Feed steadily and sleep generously. Dark leafy and iron-rich cooked foods, plus unhurried evenings, suit you best.",
        remedy: "https://ondam.care/remedies/temperate-depleted-blood",
        care: &["warm meals", "early nights", "steady hydration"],
    },
    Constitution {
        key: [-1, 0, 0],
        label: "Temperate Depleted (even-keeled)",
        traits: "A balanced frame running on a low tank. Nothing is out of place except the missing spare capacity.",
        advisory: "Protect the basics: regular meals, a fixed bedtime and gentle daily movement. Add load only when mornings feel easy.",
        remedy: "https://ondam.care/remedies/temperate-depleted-even",
        care: &["daily walks", "early nights"],
    },
    Constitution {
        key: [-1, 0, 1],
        label: "Temperate Depleted (qi-short)",
        traits: "Comfortable temperature, low drive, and breath that tires first. Effort brings sweat sooner than it should.",
        advisory: "Build stamina from the breath outward. Short walks with long exhales, warm lunches and no training to failure.",
        remedy: "https://ondam.care/remedies/temperate-depleted-qi",
        care: &["breathing practice", "daily walks"],
    },
    Constitution {
        key: [-1, 1, -1],
        label: "Warm Depleted (blood-sparse)",
        traits: "Heat flares on an empty tank, the pattern of depletion warmth. Night sweats, a dry mouth and restless shallow sleep are common.",
        advisory: "Cool gently rather than aggressively. Moistening foods, earlier nights and quiet evenings settle the flare while you refill.",
        remedy: "https://ondam.care/remedies/warm-depleted-blood",
        care: &["cooling teas", "early nights", "steady hydration"],
    },
    Constitution {
        key: [-1, 1, 0],
        label: "Warm Depleted (even-keeled)",
        traits: "Warmth without the reserves to back it. You run hot yet tire quickly, especially late in the day.",
        advisory: "Avoid both chill and heavy heating foods. Midday rest and light, regular meals keep the flare from feeding on fatigue.",
        remedy: "https://ondam.care/remedies/warm-depleted-even",
        care: &["light evening meals", "restorative naps"],
    },
    Constitution {
        key: [-1, 1, 1],
        label: "Warm Depleted (qi-short)",
        traits: "Hot, tired and short of breath. Sweat comes unbidden and the voice thins by evening.",
        advisory: "Sweating drains you faster than most, so replace fluids deliberately and keep exertion short, shaded and unhurried.",
        remedy: "https://ondam.care/remedies/warm-depleted-qi",
        care: &["steady hydration", "breathing practice", "restorative naps"],
    },
    Constitution {
        key: [0, -1, -1],
        label: "Cold Steady (blood-sparse)",
        traits: "Energy holds but cold bites deep, and the blood side runs thin. Cramps at night and pale lips give it away.",
        advisory: "Warm the periphery: wrists, ankles and lower back. Cooked, mineral-rich meals serve you better than raw and cold ones.",
        remedy: "https://ondam.care/remedies/cold-steady-blood",
        care: &["warm foot baths", "warm meals"],
    },
    Constitution {
        key: [0, -1, 0],
        label: "Cold Steady (even-keeled)",
        traits: "A solid constitution that simply runs cold. Stiff mornings and a dislike of drafts are the main tax.",
        advisory: "You need heat more than rest. Morning movement to raise warmth, warm drinks through the day and no sleeping in the cold.",
        remedy: "https://ondam.care/remedies/cold-steady-even",
        care: &["daily walks", "warm meals"],
    },
    Constitution {
        key: [0, -1, 1],
        label: "Cold Steady (qi-short)",
        traits: "Steady overall, cold-leaning, with breath the weakest link. Cold air cuts exercise short.",
        advisory: "Warm up indoors before going out and breathe through the nose in cold wind. Stamina grows fastest in a warm room.",
        remedy: "https://ondam.care/remedies/cold-steady-qi",
        care: &["breathing practice", "warm meals"],
    },
    Constitution {
        key: [0, 0, -1],
        label: "Temperate Steady (blood-sparse)",
        traits: "Almost balanced, with only the blood side drawn down. Dry skin and eyes that tire at screens are the tell.",
        advisory: "Small corrections suffice. Moistening foods, screen breaks and a consistent bedtime cover most of the gap.",
        remedy: "https://ondam.care/remedies/temperate-steady-blood",
        care: &["steady hydration", "early nights"],
    },
    Constitution {
        key: [0, 0, 0],
        label: "Temperate Steady (even-keeled)",
        traits: "The balanced center of the map. No axis pulls hard in any direction.",
        advisory: "Maintenance is your whole program. Keep meals, movement and sleep regular, and treat deviations early while they are cheap.",
        remedy: "https://ondam.care/remedies/temperate-steady-even",
        care: &["daily walks", "posture breaks"],
    },
    Constitution {
        key: [0, 0, 1],
        label: "Temperate Steady (qi-short)",
        traits: "Balanced except for breath and drive, which fade a little early. A quiet afternoon slump is typical.",
        advisory: "Put movement where the slump is. A short brisk walk after lunch beats coffee, and open-window breaks beat pushing through.",
        remedy: "https://ondam.care/remedies/temperate-steady-qi",
        care: &["breathing practice", "posture breaks"],
    },
    Constitution {
        key: [0, 1, -1],
        label: "Warm Steady (blood-sparse)",
        traits: "Solid energy with a warm edge and a thin blood side. Flushing and dry, itchy skin show up under pressure.",
        advisory: "Cool and moisten together. Lighter dinners, fewer spicy late meals and steady water intake keep the edge soft.",
        remedy: "https://ondam.care/remedies/warm-steady-blood",
        care: &["cooling teas", "light evening meals", "steady hydration"],
    },
    Constitution {
        key: [0, 1, 0],
        label: "Warm Steady (even-keeled)",
        traits: "A robust, warm-running constitution. Energy is plentiful; overheating is the only real risk.",
        advisory: "Spend the surplus daily or it turns into irritation. Real exercise, not strolls, then cool down properly and sleep on time.",
        remedy: "https://ondam.care/remedies/warm-steady-even",
        care: &["daily walks", "cooling teas"],
    },
    Constitution {
        key: [0, 1, 1],
        label: "Warm Steady (qi-short)",
        traits: "Warm and capable but quick to sweat the tank dry. Long exertion in heat empties you suddenly.",
        advisory: "Pace beats intensity. Break effort into intervals, drink before thirst and keep salt in the picture on sweaty days.",
        remedy: "https://ondam.care/remedies/warm-steady-qi",
        care: &["steady hydration", "breathing practice"],
    },
    Constitution {
        key: [1, -1, -1],
        label: "Cold Surging (blood-sparse)",
        traits: "Drive exceeds supply on a cold frame with thin blood. Tension and cramps arrive together after hard days.",
        advisory: "Your engine revs higher than the fuel line feeds. Warm meals on schedule and deliberate wind-downs stop the evening cramps.",
        remedy: "https://ondam.care/remedies/cold-surging-blood",
        care: &["warm meals", "gentle stretching", "early nights"],
    },
    Constitution {
        key: [1, -1, 0],
        label: "Cold Surging (even-keeled)",
        traits: "Restless drive inside a cold shell. You push hard, then stiffen rather than tire.",
        advisory: "Channel the push into warming movement early in the day and stretch while warm. Cold plus tension is your injury recipe.",
        remedy: "https://ondam.care/remedies/cold-surging-even",
        care: &["gentle stretching", "daily walks"],
    },
    Constitution {
        key: [1, -1, 1],
        label: "Cold Surging (qi-short)",
        traits: "Wound up yet quickly winded, on a cold base. The mind sprints ahead of the lungs.",
        advisory: "Slow the breath to slow the engine. Warm up thoroughly, cap intensity and finish sessions while breath is still easy.",
        remedy: "https://ondam.care/remedies/cold-surging-qi",
        care: &["breathing practice", "gentle stretching"],
    },
    Constitution {
        key: [1, 0, -1],
        label: "Temperate Surging (blood-sparse)",
        traits: "High drive on an even temperature, with blood reserves lagging behind. Overwork shows up as dry eyes and night cramps.",
        advisory: "Match output with intake. Protein and dark cooked vegetables at dinner, plus a hard stop on late work, close the gap.",
        remedy: "https://ondam.care/remedies/temperate-surging-blood",
        care: &["warm meals", "early nights"],
    },
    Constitution {
        key: [1, 0, 0],
        label: "Temperate Surging (even-keeled)",
        traits: "Strong, even-tempered and always in motion. The risk is overreach, not weakness.",
        advisory: "Schedule rest like a meeting or it will not happen. One slow day a week keeps the other six productive.",
        remedy: "https://ondam.care/remedies/temperate-surging-even",
        care: &["gentle stretching", "posture breaks"],
    },
    Constitution {
        key: [1, 0, 1],
        label: "Temperate Surging (qi-short)",
        traits: "Ambition outpaces breath on an otherwise even frame. Sighing and chest tightness follow long desk stretches.",
        advisory: "Interrupt the desk day hourly. Stand, roll the shoulders open and take ten slow breaths; the tightness is postural as much as anything.",
        remedy: "https://ondam.care/remedies/temperate-surging-qi",
        care: &["posture breaks", "breathing practice"],
    },
    Constitution {
        key: [1, 1, -1],
        label: "Warm Surging (blood-sparse)",
        traits: "Hot, driven and running dry. Flare-ups, irritability and restless nights cluster after intense weeks.",
        advisory: "Cooling and moistening are not optional for you. Cut late spicy meals and alcohol first, and move the hard training to morning.",
        remedy: "https://ondam.care/remedies/warm-surging-blood",
        care: &["cooling teas", "light evening meals", "early nights"],
    },
    Constitution {
        key: [1, 1, 0],
        label: "Warm Surging (even-keeled)",
        traits: "The hottest, highest-output corner of the map. Immense capacity with a short fuse when blocked.",
        advisory: "Burn the surplus on purpose, daily and vigorously, then cool down completely. Unspent heat turns into temper and poor sleep.",
        remedy: "https://ondam.care/remedies/warm-surging-even",
        care: &["daily walks", "cooling teas"],
    },
    Constitution {
        key: [1, 1, 1],
        label: "Warm Surging (qi-short)",
        traits: "Hot and hard-driving while breath quietly falls behind. Crash days follow streaks of overcommitment.",
        advisory: "Treat breath as your fuel gauge. When it shortens, the day is over; hydrate, cool off and bank sleep before the crash does it for you.",
        remedy: "https://ondam.care/remedies/warm-surging-qi",
        care: &["breathing practice", "steady hydration", "restorative naps"],
    },
];

/// Validate the static tables. Returns one message per defect; empty
/// means the tables are sound.
pub fn validate_tables() -> Vec<String> {
    let mut defects = Vec::new();

    for vigor in -1..=1 {
        for thermal in -1..=1 {
            for tilt in -1..=1 {
                if classify(vigor, thermal, tilt).is_none() {
                    defects.push(format!(
                        "classification table missing key ({vigor}, {thermal}, {tilt})"
                    ));
                }
            }
        }
    }
    if TABLE.len() != 27 {
        defects.push(format!("classification table has {} entries, expected 27", TABLE.len()));
    }

    let mut labels: Vec<&str> = TABLE.iter().map(|c| c.label).collect();
    labels.sort_unstable();
    for pair in labels.windows(2) {
        if pair[0] == pair[1] {
            defects.push(format!("duplicate constitution label '{}'", pair[0]));
        }
    }

    let mut keys: Vec<[i8; 3]> = TABLE.iter().map(|c| c.key).collect();
    keys.sort_unstable();
    for pair in keys.windows(2) {
        if pair[0] == pair[1] {
            defects.push(format!("duplicate classification key {:?}", pair[0]));
        }
    }

    for table_codes in [
        FLOW_TABLE.iter().map(|f| f.code).collect::<Vec<_>>(),
        ORGAN_TABLE.iter().map(|o| o.code).collect::<Vec<_>>(),
    ] {
        let mut codes = table_codes.clone();
        codes.sort_unstable();
        codes.dedup();
        if codes.len() != table_codes.len() {
            defects.push("duplicate code in auxiliary dictionary".to_string());
        }
    }

    defects
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_is_total_over_the_key_space() {
        for vigor in -1..=1 {
            for thermal in -1..=1 {
                for tilt in -1..=1 {
                    let entry = classify(vigor, thermal, tilt);
                    assert!(entry.is_some(), "missing key ({vigor}, {thermal}, {tilt})");
                }
            }
        }
    }

    #[test]
    fn out_of_domain_keys_miss_cleanly() {
        assert!(classify(2, 0, 0).is_none());
        assert!(classify(0, -2, 1).is_none());
    }

    #[test]
    fn tables_have_no_authoring_defects() {
        let defects = validate_tables();
        assert!(defects.is_empty(), "defects: {defects:?}");
    }

    #[test]
    fn known_corner_entries_resolve_to_their_labels() {
        assert_eq!(
            classify(-1, -1, -1).unwrap().label,
            "Cold Depleted (blood-sparse)"
        );
        assert_eq!(
            classify(1, 1, 1).unwrap().label,
            "Warm Surging (qi-short)"
        );
        assert_eq!(
            classify(0, 0, 0).unwrap().label,
            "Temperate Steady (even-keeled)"
        );
    }

    #[test]
    fn auxiliary_lookups_fall_back_to_the_default() {
        assert_eq!(lookup_flow("A").label, "qi stagnation");
        assert_eq!(lookup_organ("C").label, "kidney");
        assert_eq!(lookup_flow("Z").text, NO_INFORMATION);
        assert_eq!(lookup_organ("9").text, NO_INFORMATION);
    }
}
