//! Declarative weighted rule table for intent classification.
//!
//! Every rule is `(intent, pattern, weight)`. Each match of a pattern in the
//! lowercased description adds `weight` to the intent's score. Rules are
//! evaluated uniformly; there is no first-match short circuit.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::core::types::Intent;

/// Minimum score for a non-primary intent to be reported as secondary.
pub const SECONDARY_INTENT_MIN_SCORE: u32 = 2;

/// One weighted keyword pattern for an intent.
#[derive(Debug, Clone, Copy)]
pub struct IntentRule {
    pub intent: Intent,
    pub pattern: &'static str,
    pub weight: u32,
}

const fn rule(intent: Intent, pattern: &'static str, weight: u32) -> IntentRule {
    IntentRule {
        intent,
        pattern,
        weight,
    }
}

/// Patterns are matched against ASCII-lowercased text.
pub const INTENT_RULES: &[IntentRule] = &[
    rule(Intent::Fix, r"\bfix(?:es|ed|ing)?\b", 3),
    rule(Intent::Fix, r"\bbugs?\b", 3),
    rule(Intent::Fix, r"\bnull pointer\b", 2),
    rule(Intent::Fix, r"\b(?:crash|crashes|crashing)\b", 2),
    rule(Intent::Fix, r"\bbroken\b", 2),
    rule(Intent::Fix, r"\bregressions?\b", 2),
    rule(Intent::Fix, r"\b(?:doesn'?t|does not|don'?t) work\b", 2),
    rule(Intent::Fix, r"\berrors?\b", 1),
    rule(Intent::Fix, r"\bexceptions?\b", 1),
    rule(Intent::Fix, r"\bissues?\b", 1),
    rule(Intent::Fix, r"\bpatch\b", 1),
    rule(
        Intent::Build,
        r"\b(?:build|create|implement|add|develop|write|make)\b",
        2,
    ),
    rule(Intent::Build, r"\bscaffold\w*\b", 2),
    rule(Intent::Build, r"\b(?:new|features?)\b", 1),
    rule(Intent::Build, r"\bsupport for\b", 1),
    rule(Intent::Review, r"\breview(?:s|ed|ing)?\b", 3),
    rule(Intent::Review, r"\baudit\w*\b", 2),
    rule(Intent::Review, r"\binspect\w*\b", 2),
    rule(Intent::Review, r"\bcritique\b", 2),
    rule(Intent::Review, r"\bcode quality\b", 2),
    rule(Intent::Test, r"\btests?\b", 2),
    rule(Intent::Test, r"\btesting\b", 2),
    rule(Intent::Test, r"\bcoverage\b", 2),
    rule(Intent::Test, r"\b(?:unit|integration|e2e|end-to-end) tests?\b", 1),
    rule(Intent::Test, r"\bassert\w*\b", 1),
    rule(Intent::Refactor, r"\brefactor\w*\b", 3),
    rule(Intent::Refactor, r"\bclean(?:\s|-)?up\b", 2),
    rule(Intent::Refactor, r"\brestructur\w*\b", 2),
    rule(Intent::Refactor, r"\btech(?:nical)? debt\b", 2),
    rule(Intent::Refactor, r"\bsimplif\w*\b", 1),
    rule(Intent::Refactor, r"\bextract\w*\b", 1),
    rule(Intent::Refactor, r"\brenam\w*\b", 1),
    rule(Intent::Refactor, r"\bdecoupl\w*\b", 1),
    rule(Intent::Optimize, r"\boptimi[sz]\w*\b", 3),
    rule(Intent::Optimize, r"\bperformance\b", 2),
    rule(Intent::Optimize, r"\bfaster\b", 2),
    rule(Intent::Optimize, r"\bspeed\s?up\b", 2),
    rule(Intent::Optimize, r"\bbottlenecks?\b", 2),
    rule(Intent::Optimize, r"\blatency\b", 1),
    rule(Intent::Optimize, r"\bthroughput\b", 1),
    rule(Intent::Optimize, r"\bmemory (?:usage|footprint)\b", 1),
    rule(Intent::Optimize, r"\bslow\b", 1),
    rule(Intent::Validate, r"\bvalidat\w*\b", 3),
    rule(
        Intent::Validate,
        r"\bcompar(?:e|es|ed|ing|ison|isons)\b",
        3,
    ),
    rule(
        Intent::Validate,
        r"\bverif(?:y|ies|ied|ication)\b",
        2,
    ),
    rule(
        Intent::Validate,
        r"\bexisting (?:implementation|code|approach|version)\b",
        2,
    ),
    rule(Intent::Validate, r"\b(?:versus|vs)\b", 1),
    rule(Intent::Validate, r"\bconfirm\w*\b", 1),
    rule(Intent::Explore, r"\bexplor\w*\b", 3),
    rule(Intent::Explore, r"\binvestigat\w*\b", 2),
    rule(Intent::Explore, r"\bresearch\w*\b", 2),
    rule(Intent::Explore, r"\bspike\b", 2),
    rule(Intent::Explore, r"\bunderstand\w*\b", 1),
    rule(Intent::Explore, r"\bhow (?:does|do|can)\b", 1),
    rule(Intent::Explore, r"\bwhat (?:is|are)\b", 1),
    rule(Intent::Explore, r"\bprototype\b", 1),
];

static COMPILED_RULES: LazyLock<Vec<(Intent, Regex, u32)>> = LazyLock::new(|| {
    INTENT_RULES
        .iter()
        .map(|rule| {
            let regex = Regex::new(rule.pattern).expect("intent rule pattern should be valid");
            (rule.intent, regex, rule.weight)
        })
        .collect()
});

/// Score every intent against `lowered` (ASCII-lowercased description).
///
/// The returned map always contains every intent, zero-scored ones included.
pub fn score_intents(lowered: &str) -> BTreeMap<Intent, u32> {
    let mut scores: BTreeMap<Intent, u32> =
        Intent::PRIORITY.into_iter().map(|intent| (intent, 0)).collect();
    for (intent, regex, weight) in COMPILED_RULES.iter() {
        let hits = regex.find_iter(lowered).count() as u32;
        if hits > 0 {
            *scores.entry(*intent).or_insert(0) += hits.saturating_mul(*weight);
        }
    }
    scores
}

/// Pick the primary intent and the secondary intents from a score map.
///
/// Highest score wins; ties go to the intent earlier in [`Intent::PRIORITY`].
/// If nothing scored, the task is treated as exploration with no secondaries.
pub fn rank_intents(scores: &BTreeMap<Intent, u32>) -> (Intent, Vec<Intent>) {
    let score_of = |intent: Intent| scores.get(&intent).copied().unwrap_or(0);
    let best = Intent::PRIORITY
        .into_iter()
        .map(score_of)
        .max()
        .unwrap_or(0);
    if best == 0 {
        return (Intent::Explore, Vec::new());
    }

    let primary = Intent::PRIORITY
        .into_iter()
        .find(|intent| score_of(*intent) == best)
        .unwrap_or(Intent::Explore);
    let secondary = Intent::PRIORITY
        .into_iter()
        .filter(|intent| *intent != primary && score_of(*intent) >= SECONDARY_INTENT_MIN_SCORE)
        .collect();
    (primary, secondary)
}
