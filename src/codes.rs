//! Lookup tables for the shorthand codes found in legacy report exports.

use crate::models::{INFRACTION, NONE};

pub const INFRACTION_CODE: &str = "I";

const INTERACTION_CODES: &[(&str, &str)] = &[
    ("I", INFRACTION),
    ("S", "SHOUT_OUT"),
    ("C", "CHECK_IN"),
    ("A", "ACADEMIC_SUPPORT"),
    ("P", "PARENT_CONTACT"),
    ("T", "TARDY"),
    ("AB", "ABSENCE"),
    ("R", "REFERRAL"),
    ("N", "NURSE_VISIT"),
    ("CO", "COUNSELOR_REFERRAL"),
    ("DT", "DETENTION"),
    ("LD", "LUNCH_DETENTION"),
    ("SUS", "SUSPENSION"),
    ("RW", "REWARD"),
    ("PBIS", "PBIS_POINT"),
    ("MISC", "OTHER"),
];

const TEACHER_STRATEGY: &str = "Teacher Strategy (describe in notes)";

// Checked in order before the infraction name set.
const INFRACTION_PHRASES: &[(&str, &str)] = &[
    (TEACHER_STRATEGY, "FAILURE_TO_MEET_EXPECTATIONS"),
    ("Check-In", NONE),
    ("Parent Contact", NONE),
    ("Detention", NONE),
    ("Admin Referral", NONE),
];

pub const INFRACTION_NAMES: &[&str] = &[
    "CELL_PHONE",
    "DRESS_CODE",
    "TARDY",
    "DISRESPECT",
    "DISRUPTION",
    "FAILURE_TO_MEET_EXPECTATIONS",
    "HORSEPLAY",
    "INAPPROPRIATE_LANGUAGE",
    "UNPREPARED",
];

const INTERVENTION_PHRASES: &[(&str, &str)] = &[
    (TEACHER_STRATEGY, "VERBAL_WARNING"),
    ("Check-In", "VERBAL_WARNING"),
    ("Parent Contact", "PARENT_CONTACT"),
    ("Detention", "DETENTION"),
    ("Admin Referral", "ADMIN_REFERRAL"),
];

/// Canonical interaction for a legacy code. Unknown codes come back unchanged.
pub fn interaction_for_code(code: &str) -> String {
    INTERACTION_CODES
        .iter()
        .find(|(candidate, _)| *candidate == code)
        .map(|(_, name)| (*name).to_string())
        .unwrap_or_else(|| code.to_string())
}

/// Legacy code for a canonical interaction, or the name itself when it has none.
pub fn code_for_interaction(interaction: &str) -> String {
    INTERACTION_CODES
        .iter()
        .find(|(_, name)| *name == interaction)
        .map(|(code, _)| (*code).to_string())
        .unwrap_or_else(|| interaction.to_string())
}

pub fn infraction_from_response(response: &str) -> String {
    if let Some((_, value)) = INFRACTION_PHRASES.iter().find(|(phrase, _)| *phrase == response) {
        return (*value).to_string();
    }
    if INFRACTION_NAMES.contains(&response) {
        return response.to_string();
    }
    NONE.to_string()
}

pub fn intervention_from_response(response: &str) -> String {
    INTERVENTION_PHRASES
        .iter()
        .find(|(phrase, _)| *phrase == response)
        .map(|(_, value)| (*value).to_string())
        .unwrap_or_else(|| NONE.to_string())
}

/// Infraction and intervention for a legacy row. Only code "I" carries either.
pub fn derive_outcome(code: &str, response: &str) -> (String, String) {
    if code == INFRACTION_CODE {
        (
            infraction_from_response(response),
            intervention_from_response(response),
        )
    } else {
        (NONE.to_string(), NONE.to_string())
    }
}

pub fn interaction_codes() -> impl Iterator<Item = (&'static str, &'static str)> {
    INTERACTION_CODES.iter().copied()
}

/// Intervention names that the legacy phrases can produce.
pub fn intervention_names() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = INTERVENTION_PHRASES.iter().map(|(_, value)| *value).collect();
    names.sort_unstable();
    names.dedup();
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_known_codes() {
        assert_eq!(interaction_for_code("I"), "INFRACTION");
        assert_eq!(interaction_for_code("S"), "SHOUT_OUT");
        assert_eq!(interaction_for_code("PBIS"), "PBIS_POINT");
        assert_eq!(interaction_codes().count(), 16);
    }

    #[test]
    fn unmapped_codes_pass_through() {
        assert_eq!(interaction_for_code("ZZ"), "ZZ");
        assert_eq!(interaction_for_code("s"), "s");
    }

    #[test]
    fn reverse_lookup_matches_forward_table() {
        for (code, name) in interaction_codes() {
            assert_eq!(code_for_interaction(name), code);
        }
        assert_eq!(code_for_interaction("FIELD_TRIP"), "FIELD_TRIP");
    }

    #[test]
    fn teacher_strategy_is_an_infraction_with_a_warning() {
        let (infraction, intervention) = derive_outcome("I", "Teacher Strategy (describe in notes)");
        assert_eq!(infraction, "FAILURE_TO_MEET_EXPECTATIONS");
        assert_eq!(intervention, "VERBAL_WARNING");
    }

    #[test]
    fn check_in_has_no_infraction_but_a_warning() {
        let (infraction, intervention) = derive_outcome("I", "Check-In");
        assert_eq!(infraction, NONE);
        assert_eq!(intervention, "VERBAL_WARNING");
    }

    #[test]
    fn infraction_names_map_to_themselves() {
        for name in INFRACTION_NAMES {
            let (infraction, intervention) = derive_outcome("I", name);
            assert_eq!(infraction, *name);
            assert_eq!(intervention, NONE);
        }
    }

    #[test]
    fn unknown_responses_fall_back_to_none() {
        assert_eq!(derive_outcome("I", "Talked in class"), (NONE.to_string(), NONE.to_string()));
        assert_eq!(derive_outcome("I", "tardy"), (NONE.to_string(), NONE.to_string()));
    }

    #[test]
    fn non_infraction_codes_ignore_responses() {
        let (infraction, intervention) = derive_outcome("S", "Teacher Strategy (describe in notes)");
        assert_eq!(infraction, NONE);
        assert_eq!(intervention, NONE);
        let (infraction, intervention) = derive_outcome("C", "TARDY");
        assert_eq!(infraction, NONE);
        assert_eq!(intervention, NONE);
    }
}
