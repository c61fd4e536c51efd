//! The quality rulebook.
//!
//! Rules are fixed in code. Each rule evaluates one aspect of a record and
//! yields exactly one check.

use crate::models::{RecordKind, Severity};

/// What a rule inspects.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum RuleCheck {
    /// Every listed field is present and non-null.
    RequiredFields(&'static [&'static str]),
    /// A numeric field lies within `[min, max]`.
    Range {
        field: &'static str,
        min: f64,
        max: f64,
    },
    /// An array field has exactly `expected` items.
    ExactCount {
        field: &'static str,
        expected: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Rule {
    pub name: &'static str,
    pub severity: Severity,
    pub check: RuleCheck,
}

/// Players per match.
pub(crate) const PARTICIPANTS_PER_MATCH: usize = 10;

/// Shortest and longest plausible match duration (seconds).
pub(crate) const MIN_MATCH_DURATION_SECS: f64 = 300.0;
pub(crate) const MAX_MATCH_DURATION_SECS: f64 = 7200.0;

const MATCH_RULES: &[Rule] = &[
    Rule {
        name: "required_fields",
        severity: Severity::High,
        check: RuleCheck::RequiredFields(&[
            "matchId",
            "gameCreation",
            "gameDuration",
            "participants",
        ]),
    },
    Rule {
        name: "game_duration_range",
        severity: Severity::Medium,
        check: RuleCheck::Range {
            field: "gameDuration",
            min: MIN_MATCH_DURATION_SECS,
            max: MAX_MATCH_DURATION_SECS,
        },
    },
    Rule {
        name: "participant_count",
        severity: Severity::High,
        check: RuleCheck::ExactCount {
            field: "participants",
            expected: PARTICIPANTS_PER_MATCH,
        },
    },
];

const PARTICIPANT_RULES: &[Rule] = &[
    Rule {
        name: "required_fields",
        severity: Severity::High,
        check: RuleCheck::RequiredFields(&[
            "puuid",
            "championId",
            "kills",
            "deaths",
            "assists",
            "goldEarned",
            "win",
        ]),
    },
    Rule {
        name: "kills_range",
        severity: Severity::Low,
        check: RuleCheck::Range {
            field: "kills",
            min: 0.0,
            max: 60.0,
        },
    },
    Rule {
        name: "deaths_range",
        severity: Severity::Low,
        check: RuleCheck::Range {
            field: "deaths",
            min: 0.0,
            max: 60.0,
        },
    },
    Rule {
        name: "assists_range",
        severity: Severity::Low,
        check: RuleCheck::Range {
            field: "assists",
            min: 0.0,
            max: 80.0,
        },
    },
    Rule {
        name: "gold_earned_range",
        severity: Severity::Medium,
        check: RuleCheck::Range {
            field: "goldEarned",
            min: 0.0,
            max: 100_000.0,
        },
    },
];

pub(crate) fn rules_for(kind: RecordKind) -> &'static [Rule] {
    match kind {
        RecordKind::Match => MATCH_RULES,
        RecordKind::Participant => PARTICIPANT_RULES,
    }
}
